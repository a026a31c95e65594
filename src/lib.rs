use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use deadpool_diesel::sqlite::Pool;
use diesel::{sql_query, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi, ToSchema,
};

use crate::{
    admin::routes::admin_router,
    auth::InitDataVerifier,
    config::{Config, ConfigError},
    gallery::routes::gallery_router,
    sessions::{SessionStore, SESSION_COOKIE_NAME},
    storage::Storage,
    users::routes::users_router,
};

pub mod admin;
pub mod auth;
pub mod config;
pub mod database;
pub mod gallery;
pub mod migrations;
pub mod schema;
pub mod sessions;
pub mod storage;
pub mod users;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub inner: Arc<InnerAppState>,
    pub pool: Pool,
    pub sessions: SessionStore,
    pub cookies_key: Key,
}

pub struct InnerAppState {
    pub pool: Pool,
    pub storage: Storage,
    pub verifier: InitDataVerifier,
    pub admin_password_hash: Option<String>,
}

impl AppState {
    pub fn from_config(pool: Pool, config: &Config) -> Result<Self, ConfigError> {
        let verifier = if config.telegram_auth_insecure {
            tracing::warn!("TELEGRAM_AUTH_INSECURE is set, init data signatures are NOT checked");
            InitDataVerifier::insecure()
        } else {
            if config.bot_token.is_none() {
                tracing::warn!("BOT_TOKEN not set, every authenticated request will be rejected");
            }
            InitDataVerifier::new(config.bot_token.clone(), config.init_data_max_age)
        };

        let cookies_key = match config.cookies_secret.as_deref() {
            Some(secret) => Key::try_from(secret).map_err(|e| ConfigError::InvalidValue {
                key: "COOKIES_SECRET",
                message: e.to_string(),
            })?,
            None => {
                tracing::warn!("COOKIES_SECRET not set, admin sessions will not survive a restart");
                Key::generate()
            }
        };

        Ok(Self {
            inner: Arc::new(InnerAppState {
                pool: pool.clone(),
                storage: Storage::new(&config.uploads_dir),
                verifier,
                admin_password_hash: config.admin_password_hash.clone(),
            }),
            sessions: SessionStore::new(pool.clone(), config.session_ttl),
            pool,
            cookies_key,
        })
    }
}

pub fn app(state: AppState) -> Router {
    let uploads = ServeDir::new(state.inner.storage.root());

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api-docs/openapi.json", get(openapi))
        .nest("/api/gallery", gallery_router())
        .nest("/api/user", users_router())
        .nest("/api/admin", admin_router(state.clone()))
        .nest_service("/uploads", uploads)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}

async fn status(State(pool): State<Pool>) -> impl IntoResponse {
    let database = database::run::<_, database::DatabaseError, _>(&pool, |conn| {
        sql_query("SELECT 1").execute(conn)?;
        Ok(())
    })
    .await;

    match database {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "running",
                "version": env!("CARGO_PKG_VERSION"),
                "database": "connected",
                "timestamp": Utc::now(),
            })),
        ),
        Err(e) => {
            tracing::error!("status check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "version": env!("CARGO_PKG_VERSION"),
                    "database": "unavailable",
                    "timestamp": Utc::now(),
                })),
            )
        }
    }
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        gallery::routes::list_images,
        gallery::routes::top_images,
        gallery::routes::get_image_file,
        gallery::routes::upload_image,
        gallery::routes::toggle_like,
        gallery::routes::delete_image,
        users::routes::get_user,
        users::routes::get_user_images,
        users::routes::get_user_likes,
        admin::routes::login,
        admin::routes::logout,
        admin::routes::stats,
        admin::routes::delete_image,
        admin::routes::reconcile,
    ),
    components(
        schemas(gallery::models::SortKey),
        schemas(gallery::models::ImageSummary),
        schemas(gallery::models::LikedImage),
        schemas(gallery::models::LikeToggle),
        schemas(gallery::models::GalleryStats),
        schemas(gallery::models::ToggleLikeRequest),
        schemas(gallery::models::DeleteImageRequest),
        schemas(gallery::models::UploadImageForm),
        schemas(gallery::models::UploadResponse),
        schemas(gallery::models::DeleteResponse),
        schemas(users::models::UserResponse),
        schemas(admin::models::AdminLogin),
        schemas(admin::models::AdminLoginResponse),
        schemas(admin::models::ReconcileResponse),
        schemas(ErrorResponse),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Gallery API"),
        (name = "Users API"),
        (name = "Admin API"),
    )
)]
pub struct ApiDoc;

#[derive(Serialize, Deserialize, ToSchema, Debug, Default)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "telegram",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "`tma <init data>` as provided by Telegram.WebApp.initData",
                ))),
            );
            components.add_security_scheme(
                "session",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE_NAME))),
            );
        }
    }
}
