#![allow(dead_code)]

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use gallery_backend::{app, auth::sign_init_data, config::Config, database, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOT_TOKEN: &str = "4242:integration-test-token";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

const BOUNDARY: &str = "gallery-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");

    let salt = SaltString::encode_b64(b"integration-salt").expect("salt");
    let admin_password_hash = Argon2::default()
        .hash_password(ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("hash")
        .to_string();

    let config = Config {
        host: "127.0.0.1".parse().expect("ip"),
        port: 0,
        database_url: dir
            .path()
            .join("gallery.db")
            .to_str()
            .expect("utf8 path")
            .to_string(),
        database_pool_size: 4,
        uploads_dir: dir.path().join("uploads"),
        bot_token: Some(BOT_TOKEN.to_string()),
        telegram_auth_insecure: false,
        init_data_max_age: Duration::hours(1),
        admin_password_hash: Some(admin_password_hash),
        cookies_secret: None,
        session_ttl: Duration::hours(1),
    };

    let pool = database::connect(&config.database_url, config.database_pool_size).expect("pool");
    database::migrate(&pool).await.expect("migrations");

    let state = AppState::from_config(pool, &config).expect("state");
    state.inner.storage.init().await.expect("uploads dir");

    TestApp {
        router: app(state.clone()),
        state,
        _dir: dir,
    }
}

/// `Authorization` value for a mini app user.
pub fn tma(user_id: i64, first_name: &str) -> String {
    let user = serde_json::json!({ "id": user_id, "first_name": first_name }).to_string();
    let auth_date = Utc::now().timestamp().to_string();

    format!(
        "tma {}",
        sign_init_data(BOT_TOKEN, &[("user", &user), ("auth_date", &auth_date)])
    )
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).expect("json body")
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();

        TestResponse {
            status,
            headers,
            bytes,
        }
    }

    pub async fn get(&self, uri: &str, auth: Option<&str>) -> TestResponse {
        let mut request = Request::get(uri);
        if let Some(auth) = auth {
            request = request.header(header::AUTHORIZATION, auth);
        }

        self.send(request.body(Body::empty()).expect("request")).await
    }

    pub async fn json(&self, method: &str, uri: &str, auth: Option<&str>, body: Value) -> TestResponse {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            request = request.header(header::AUTHORIZATION, auth);
        }

        self.send(request.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    /// Uploads `bytes` as `user_id` and returns the response.
    pub async fn upload(
        &self,
        auth: &str,
        user_id: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let body = multipart_body(
            &[("userId", user_id), ("userName", "Tester")],
            Some(("image", file_name, content_type, bytes)),
        );

        let request = Request::post("/api/gallery/upload")
            .header(header::AUTHORIZATION, auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .expect("request");

        self.send(request).await
    }

    /// Uploads a small png and returns its id.
    pub async fn upload_image(&self, user_id: i64, name: &str) -> String {
        let response = self
            .upload(
                &tma(user_id, name),
                &user_id.to_string(),
                "photo.png",
                "image/png",
                b"\x89PNG\r\n\x1a\nnot really a png",
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.json());

        response.json()["imageId"]
            .as_str()
            .expect("image id")
            .to_string()
    }

    pub async fn toggle_like(&self, image_id: &str, user_id: i64) -> Value {
        let response = self
            .json(
                "POST",
                &format!("/api/gallery/like/{image_id}"),
                Some(&tma(user_id, "Liker")),
                serde_json::json!({ "userId": user_id.to_string() }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.json());

        response.json()
    }
}

pub fn multipart_body(
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some((name, file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    body
}

/// `name=value` of the cookie set by `response`, ready for a `Cookie` header.
pub fn session_cookie(response: &TestResponse) -> String {
    response
        .headers
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .expect("set-cookie header")
        .to_string()
}
