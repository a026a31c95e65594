use std::{io::ErrorKind, sync::Arc};

use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use deadpool_diesel::sqlite::Pool;
use garde::Validate;
use tokio_util::io::ReaderStream;
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

use crate::{
    auth::TelegramUser,
    database,
    storage::{generate_file_name, image_type, StagedFile, Storage, StorageError},
    users, AppState, InnerAppState,
};

use super::{
    models::{
        DeleteImageRequest, DeleteResponse, DeleteScope, Image, ImageSummary, ImageUpload,
        LikeToggle, ListImagesParams, ToggleLikeRequest, TopImagesParams, UploadResponse,
    },
    store, GalleryError,
};

pub const FILE_SIZE_LIMIT_MB: usize = 10;
pub const FILE_SIZE_LIMIT: usize = FILE_SIZE_LIMIT_MB * 1024 * 1024;
/// Room for the text fields and multipart boundaries around the image.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn gallery_router() -> Router<AppState> {
    Router::new()
        .route("/images", get(list_images))
        .route("/top", get(top_images))
        .route("/image/:image_id", get(get_image_file).delete(delete_image))
        .route("/like/:image_id", post(toggle_like))
        .merge(upload_router())
}

fn upload_router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(FILE_SIZE_LIMIT + MULTIPART_OVERHEAD))
        .layer(map_response(body_limit_as_gallery_error))
}

/// The body limit layer answers oversized requests with a bare 413 before
/// the handler runs.
async fn body_limit_as_gallery_error(response: Response) -> Response {
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return GalleryError::ImageTooLarge.into_response();
    }

    response
}

/// Gallery listing
///
/// When the request carries valid Telegram init data every image also says
/// whether the caller liked it.
#[utoipa::path(
    get,
    path = "/api/gallery/images",
    params(ListImagesParams),
    responses(
        (status = 200, description = "Images in the requested order", body = [ImageSummary]),
        (status = StatusCode::BAD_REQUEST, description = "Invalid limit", body = ErrorResponse),
        (status = StatusCode::INTERNAL_SERVER_ERROR, description = "Something went wrong", body = ErrorResponse),
    ),
    tag = "Gallery API"
)]
pub async fn list_images(
    viewer: Option<TelegramUser>,
    State(pool): State<Pool>,
    Query(params): Query<ListImagesParams>,
) -> Result<Json<Vec<ImageSummary>>, GalleryError> {
    params.validate()?;

    let viewer_id = viewer.map(|viewer| viewer.id);

    let images = database::run(&pool, move |conn| {
        let images = store::list_images(conn, params.limit, params.sort_by)?;

        let liked = match viewer_id {
            Some(viewer_id) => Some(store::liked_among(
                conn,
                &viewer_id,
                &images.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
            )?),
            None => None,
        };

        Ok::<_, GalleryError>(
            images
                .into_iter()
                .map(|image| {
                    let liked_by_viewer = liked.as_ref().map(|liked| liked.contains(&image.id));
                    image.into_summary(liked_by_viewer)
                })
                .collect::<Vec<_>>(),
        )
    })
    .await?;

    Ok(Json(images))
}

/// Most liked images
#[utoipa::path(
    get,
    path = "/api/gallery/top",
    params(TopImagesParams),
    responses(
        (status = 200, description = "Images with at least one like, most liked first", body = [ImageSummary]),
        (status = StatusCode::BAD_REQUEST, description = "Invalid limit", body = ErrorResponse),
    ),
    tag = "Gallery API"
)]
pub async fn top_images(
    State(pool): State<Pool>,
    Query(params): Query<TopImagesParams>,
) -> Result<Json<Vec<ImageSummary>>, GalleryError> {
    params.validate()?;

    let images = database::run(&pool, move |conn| store::top_images(conn, params.limit)).await?;

    Ok(Json(
        images
            .into_iter()
            .map(|image| image.into_summary(None))
            .collect(),
    ))
}

/// Image file
#[utoipa::path(
    get,
    path = "/api/gallery/image/{image_id}",
    params(
        ("image_id" = String, Path, description = "Image id"),
    ),
    responses(
        (status = 200, description = "Raw image bytes with their stored content type"),
        (status = StatusCode::NOT_FOUND, description = "Unknown image or missing file", body = ErrorResponse),
    ),
    tag = "Gallery API"
)]
pub async fn get_image_file(
    State(state): State<Arc<InnerAppState>>,
    Path(image_id): Path<String>,
) -> Result<Response, GalleryError> {
    let image = database::run(&state.pool, move |conn| store::get_image(conn, &image_id)).await?;

    let file = match state.storage.open(&image.filename).await {
        Ok(file) => file,
        Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            tracing::error!("image {} has no file {}", image.id, image.filename);
            return Err(GalleryError::ImageFileNotFound);
        }
        Err(e) => return Err(e.into()),
    };

    let body = Body::from_stream(ReaderStream::new(file));

    Ok(([(header::CONTENT_TYPE, image.mime_type)], body).into_response())
}

/// Upload image
#[utoipa::path(
    post,
    path = "/api/gallery/upload",
    request_body(content = UploadImageForm, description = "The image and its uploader", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = StatusCode::BAD_REQUEST, description = "Missing file, not an image or too large", body = ErrorResponse),
        (status = StatusCode::UNAUTHORIZED, description = "Caller unauthorized", body = ErrorResponse),
    ),
    security(
        ("telegram" = [])
    ),
    tag = "Gallery API"
)]
pub async fn upload_image(
    user: TelegramUser,
    State(state): State<Arc<InnerAppState>>,
    mut fields: Multipart,
) -> Result<Json<UploadResponse>, GalleryError> {
    let mut upload = ImageUpload::builder();
    let mut staged: Option<StagedFile> = None;

    while let Some(mut field) = fields.next_field().await.map_err(multipart_error)? {
        let Some(field_name) = field.name().map(str::to_owned) else {
            continue;
        };

        match field_name.as_str() {
            "userId" => {
                upload = upload.owner_id(field.text().await.map_err(multipart_error)?.trim());
            }
            "userName" => {
                let name = field.text().await.map_err(multipart_error)?;
                if !name.trim().is_empty() {
                    upload = upload.owner_name(name.trim());
                }
            }
            "image" => {
                let Some((mime_type, extension)) = field.content_type().and_then(image_type)
                else {
                    return Err(GalleryError::UnsupportedMediaType);
                };

                let original_name = field.file_name().unwrap_or("image").to_string();

                let mut file = state.storage.stage()?;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if file.write_chunk(&chunk).await? > FILE_SIZE_LIMIT as u64 {
                        return Err(GalleryError::ImageTooLarge);
                    }
                }

                upload = upload
                    .original_name(original_name)
                    .mime_type(mime_type)
                    .extension(extension)
                    .size_bytes(file.written() as i64);
                staged = Some(file);
            }
            _ => {
                tracing::debug!("upload_image: ignoring field {field_name}");
            }
        }
    }

    let Some(staged) = staged else {
        return Err(GalleryError::BadRequest(String::from("no image file provided")));
    };

    if staged.written() == 0 {
        return Err(GalleryError::BadRequest(String::from("empty image file")));
    }

    let upload = upload.build().map_err(|e| {
        tracing::debug!("upload_image: incomplete form: {e}");
        GalleryError::BadRequest(String::from("no user id provided"))
    })?;

    if upload.owner_id != user.id {
        return Err(GalleryError::UserMismatch);
    }

    let filename = generate_file_name(upload.extension);
    staged.persist(&state.storage, &filename).await?;

    let image = Image {
        id: Uuid::now_v7().to_string(),
        owner_id: upload.owner_id,
        owner_name: upload
            .owner_name
            .unwrap_or_else(|| user.display_name.clone()),
        filename: filename.clone(),
        original_name: upload.original_name,
        size_bytes: upload.size_bytes,
        mime_type: upload.mime_type,
        created_at: Utc::now().naive_utc(),
        like_count: 0,
    };
    let image_id = image.id.clone();

    let inserted = database::run(&state.pool, move |conn| store::create_image(conn, &image)).await;

    if let Err(e) = inserted {
        remove_backing_file(&state.storage, &filename).await;
        return Err(e);
    }

    users::store::touch(&state.pool, &user).await;

    tracing::info!("user {} uploaded image {image_id}", user.id);

    Ok(Json(UploadResponse {
        success: true,
        image_id,
        message: String::from("Image uploaded successfully"),
    }))
}

/// Like or unlike
#[utoipa::path(
    post,
    path = "/api/gallery/like/{image_id}",
    params(
        ("image_id" = String, Path, description = "Image id"),
    ),
    request_body(content = ToggleLikeRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "New like state of the caller", body = LikeToggle),
        (status = StatusCode::UNAUTHORIZED, description = "Caller unauthorized", body = ErrorResponse),
        (status = StatusCode::NOT_FOUND, description = "Unknown image", body = ErrorResponse),
    ),
    security(
        ("telegram" = [])
    ),
    tag = "Gallery API"
)]
pub async fn toggle_like(
    user: TelegramUser,
    State(pool): State<Pool>,
    Path(image_id): Path<String>,
    Json(payload): Json<ToggleLikeRequest>,
) -> Result<Json<LikeToggle>, GalleryError> {
    payload.validate()?;

    if payload.user_id != user.id {
        return Err(GalleryError::UserMismatch);
    }

    let toggle = database::run(&pool, move |conn| {
        store::toggle_like(conn, &image_id, &payload.user_id)
    })
    .await?;

    users::store::touch(&pool, &user).await;

    Ok(Json(toggle))
}

/// Delete own image
#[utoipa::path(
    delete,
    path = "/api/gallery/image/{image_id}",
    params(
        ("image_id" = String, Path, description = "Image id"),
    ),
    request_body(content = DeleteImageRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Image deleted", body = DeleteResponse),
        (status = StatusCode::UNAUTHORIZED, description = "Caller unauthorized", body = ErrorResponse),
        (status = StatusCode::FORBIDDEN, description = "Caller does not own the image", body = ErrorResponse),
        (status = StatusCode::NOT_FOUND, description = "Unknown image", body = ErrorResponse),
    ),
    security(
        ("telegram" = [])
    ),
    tag = "Gallery API"
)]
pub async fn delete_image(
    user: TelegramUser,
    State(state): State<Arc<InnerAppState>>,
    Path(image_id): Path<String>,
    Json(payload): Json<DeleteImageRequest>,
) -> Result<Json<DeleteResponse>, GalleryError> {
    payload.validate()?;

    if payload.user_id != user.id {
        return Err(GalleryError::UserMismatch);
    }

    let scope = DeleteScope::Owner(payload.user_id);

    let Some(image) =
        database::run(&state.pool, move |conn| store::delete_image(conn, &image_id, &scope))
            .await?
    else {
        return Err(GalleryError::ImageNotFound);
    };

    remove_backing_file(&state.storage, &image.filename).await;

    Ok(Json(DeleteResponse {
        success: true,
        message: String::from("Image deleted successfully"),
    }))
}

/// Best effort, the row is already gone and an orphaned file is harmless.
pub(crate) async fn remove_backing_file(storage: &Storage, filename: &str) {
    match storage.delete(filename).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("image file {filename} was already missing"),
        Err(e) => tracing::error!("failed to remove image file {filename}: {e}"),
    }
}

fn multipart_error(error: MultipartError) -> GalleryError {
    tracing::debug!("multipart error: {:#?}", error);

    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GalleryError::ImageTooLarge
    } else {
        GalleryError::BadRequest(error.body_text())
    }
}
