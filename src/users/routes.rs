use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use deadpool_diesel::sqlite::Pool;

use crate::{
    auth::TelegramUser,
    database,
    gallery::{
        models::{ImageSummary, LikedImage},
        store as gallery_store,
    },
    AppState,
};

use super::{models::UserResponse, store, UsersError};

pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/:user_id", get(get_user))
        .route("/:user_id/images", get(get_user_images))
        .route("/:user_id/likes", get(get_user_likes))
}

/// Cached profile of a gallery user
#[utoipa::path(
    get,
    path = "/api/user/{user_id}",
    params(
        ("user_id" = String, Path, description = "Telegram user id"),
    ),
    responses(
        (status = 200, description = "Profile found", body = UserResponse),
        (status = StatusCode::NOT_FOUND, description = "User never used the gallery", body = ErrorResponse),
    ),
    tag = "Users API"
)]
pub async fn get_user(
    State(pool): State<Pool>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, UsersError> {
    let user = database::run::<_, UsersError, _>(&pool, move |conn| {
        Ok(store::get_user(conn, &user_id)?)
    })
    .await?;

    let Some(user) = user else {
        return Err(UsersError::UserNotFound);
    };

    Ok(Json(user.into()))
}

/// Images uploaded by the caller, newest first
#[utoipa::path(
    get,
    path = "/api/user/{user_id}/images",
    params(
        ("user_id" = String, Path, description = "Telegram user id, must be the caller"),
    ),
    responses(
        (status = 200, description = "Caller authorized", body = [ImageSummary]),
        (status = StatusCode::UNAUTHORIZED, description = "Caller unauthorized or asking for someone else", body = ErrorResponse),
    ),
    security(
        ("telegram" = [])
    ),
    tag = "Users API"
)]
pub async fn get_user_images(
    user: TelegramUser,
    State(pool): State<Pool>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ImageSummary>>, UsersError> {
    if user.id != user_id {
        return Err(UsersError::UserMismatch);
    }

    let images = database::run(&pool, move |conn| {
        let images = gallery_store::user_images(conn, &user_id)?;
        let liked = gallery_store::liked_among(
            conn,
            &user_id,
            &images.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
        )?;

        Ok::<_, UsersError>(
            images
                .into_iter()
                .map(|image| {
                    let liked_by_viewer = liked.contains(&image.id);
                    image.into_summary(Some(liked_by_viewer))
                })
                .collect::<Vec<_>>(),
        )
    })
    .await?;

    Ok(Json(images))
}

/// Images the caller liked, most recent like first
#[utoipa::path(
    get,
    path = "/api/user/{user_id}/likes",
    params(
        ("user_id" = String, Path, description = "Telegram user id, must be the caller"),
    ),
    responses(
        (status = 200, description = "Caller authorized", body = [LikedImage]),
        (status = StatusCode::UNAUTHORIZED, description = "Caller unauthorized or asking for someone else", body = ErrorResponse),
    ),
    security(
        ("telegram" = [])
    ),
    tag = "Users API"
)]
pub async fn get_user_likes(
    user: TelegramUser,
    State(pool): State<Pool>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<LikedImage>>, UsersError> {
    if user.id != user_id {
        return Err(UsersError::UserMismatch);
    }

    let liked = database::run(&pool, move |conn| {
        Ok::<_, UsersError>(gallery_store::user_likes(conn, &user_id)?)
    })
    .await?;

    Ok(Json(
        liked
            .into_iter()
            .map(|(image, liked_at)| LikedImage {
                image: image.into_summary(Some(true)),
                liked_at: liked_at.and_utc(),
            })
            .collect(),
    ))
}
