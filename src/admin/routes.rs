use std::sync::Arc;

use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use axum::{
    extract::{Path, State},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use deadpool_diesel::sqlite::Pool;
use garde::Validate;
use serde_json::{json, Value};
use tower_cookies::{
    cookie::{Cookie, SameSite},
    Cookies, Key,
};

use crate::{
    auth::AdminExtractor,
    database,
    gallery::{
        models::{DeleteResponse, DeleteScope, GalleryStats},
        routes::remove_backing_file,
        store, GalleryError,
    },
    sessions::{refresh_session, SessionStore, SESSION_COOKIE_NAME},
    AppState, InnerAppState,
};

use super::{
    models::{AdminLogin, AdminLoginResponse, ReconcileResponse},
    AdminError,
};

pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/stats", get(stats))
        .route("/images/:image_id", delete(delete_image))
        .route("/reconcile", post(reconcile))
        .route_layer(middleware::from_fn_with_state(state, refresh_session))
        .route("/login", post(login))
}

fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

/// Administrator login
#[utoipa::path(
    post,
    path = "/api/admin/login",
    request_body(content = AdminLogin, content_type = "application/json"),
    responses(
        (status = 200, description = "Session cookie set", body = AdminLoginResponse),
        (status = StatusCode::UNAUTHORIZED, description = "Wrong password", body = ErrorResponse),
        (status = StatusCode::FORBIDDEN, description = "No administrator password configured", body = ErrorResponse),
    ),
    tag = "Admin API"
)]
pub async fn login(
    State(state): State<Arc<InnerAppState>>,
    State(sessions): State<SessionStore>,
    State(key): State<Key>,
    cookies: Cookies,
    Json(payload): Json<AdminLogin>,
) -> Result<Json<AdminLoginResponse>, AdminError> {
    payload.validate()?;

    let Some(password_hash) = state.admin_password_hash.as_deref() else {
        return Err(AdminError::AdminDisabled);
    };

    let parsed_hash = PasswordHash::new(password_hash)?;

    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AdminError::InvalidCredentials);
    }

    let session = sessions.create().await?;

    cookies.private(&key).add(session_cookie(session.id));

    tracing::info!("administrator logged in");

    Ok(Json(AdminLoginResponse {
        message: String::from("logged in"),
        expires_at: session.expires_at.and_utc(),
    }))
}

/// Administrator logout
#[utoipa::path(
    post,
    path = "/api/admin/logout",
    responses(
        (status = 200, description = "Session destroyed"),
        (status = StatusCode::UNAUTHORIZED, description = "No valid session", body = ErrorResponse),
    ),
    security(
        ("session" = [])
    ),
    tag = "Admin API"
)]
pub async fn logout(
    admin: AdminExtractor,
    State(sessions): State<SessionStore>,
    State(key): State<Key>,
    cookies: Cookies,
) -> Result<Json<Value>, AdminError> {
    sessions.destroy(admin.session_id).await?;

    cookies.private(&key).remove(session_cookie(String::new()));

    Ok(Json(json!({"message": "logged out"})))
}

/// Gallery statistics
#[utoipa::path(
    get,
    path = "/api/admin/stats",
    responses(
        (status = 200, description = "Totals over the whole gallery", body = GalleryStats),
        (status = StatusCode::UNAUTHORIZED, description = "No valid session", body = ErrorResponse),
    ),
    security(
        ("session" = [])
    ),
    tag = "Admin API"
)]
pub async fn stats(
    _admin: AdminExtractor,
    State(pool): State<Pool>,
) -> Result<Json<GalleryStats>, AdminError> {
    let stats = database::run::<_, GalleryError, _>(&pool, store::stats).await?;

    Ok(Json(stats))
}

/// Remove any image
#[utoipa::path(
    delete,
    path = "/api/admin/images/{image_id}",
    params(
        ("image_id" = String, Path, description = "Image id"),
    ),
    responses(
        (status = 200, description = "Image deleted", body = DeleteResponse),
        (status = StatusCode::UNAUTHORIZED, description = "No valid session", body = ErrorResponse),
        (status = StatusCode::NOT_FOUND, description = "Unknown image", body = ErrorResponse),
    ),
    security(
        ("session" = [])
    ),
    tag = "Admin API"
)]
pub async fn delete_image(
    _admin: AdminExtractor,
    State(state): State<Arc<InnerAppState>>,
    Path(image_id): Path<String>,
) -> Result<Json<DeleteResponse>, AdminError> {
    let deleted = database::run::<_, GalleryError, _>(&state.pool, move |conn| {
        store::delete_image(conn, &image_id, &DeleteScope::Moderator)
    })
    .await?;

    let Some(image) = deleted else {
        return Err(GalleryError::ImageNotFound.into());
    };

    remove_backing_file(&state.storage, &image.filename).await;

    tracing::info!("administrator removed image {}", image.id);

    Ok(Json(DeleteResponse {
        success: true,
        message: String::from("Image deleted successfully"),
    }))
}

/// Repair like counters
#[utoipa::path(
    post,
    path = "/api/admin/reconcile",
    responses(
        (status = 200, description = "Counters recomputed from the likes", body = ReconcileResponse),
        (status = StatusCode::UNAUTHORIZED, description = "No valid session", body = ErrorResponse),
    ),
    security(
        ("session" = [])
    ),
    tag = "Admin API"
)]
pub async fn reconcile(
    _admin: AdminExtractor,
    State(pool): State<Pool>,
) -> Result<Json<ReconcileResponse>, AdminError> {
    let corrected =
        database::run::<_, GalleryError, _>(&pool, store::reconcile_like_counts).await?;

    Ok(Json(ReconcileResponse { corrected }))
}
