use axum::{http::StatusCode, response::IntoResponse};
use deadpool_diesel::sqlite::PoolError;
use diesel::result::{DatabaseErrorKind, Error::DatabaseError};

use crate::{database::TaskError, storage::StorageError, ErrorResponse};

use self::routes::FILE_SIZE_LIMIT_MB;

pub mod models;
pub mod routes;
pub mod store;

#[derive(thiserror::Error, Debug)]
pub enum GalleryError {
    #[error("image not found")]
    ImageNotFound,

    #[error("image file not found")]
    ImageFileNotFound,

    #[error("you can only delete your own images")]
    Forbidden,

    #[error("user id mismatch")]
    UserMismatch,

    #[error("{0}")]
    BadRequest(String),

    #[error("file too large, maximum size is {}MB", FILE_SIZE_LIMIT_MB)]
    ImageTooLarge,

    #[error("only image files are allowed")]
    UnsupportedMediaType,

    #[error("gave up after repeated conflicting writes")]
    Contended,

    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),

    #[error(transparent)]
    PoolError(#[from] PoolError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validator(#[from] garde::Report),
}

impl GalleryError {
    /// The store rejected a duplicate `(image, user)` like row.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            GalleryError::Diesel(DatabaseError(DatabaseErrorKind::UniqueViolation, _))
        )
    }
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("{:#?}", self);

        match self {
            GalleryError::ImageNotFound | GalleryError::ImageFileNotFound => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: self.to_string(),
                    ..Default::default()
                },
            )
                .into_response(),
            GalleryError::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorResponse {
                    error: self.to_string(),
                    ..Default::default()
                },
            )
                .into_response(),
            GalleryError::UserMismatch => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: self.to_string(),
                    ..Default::default()
                },
            )
                .into_response(),
            GalleryError::BadRequest(_)
            | GalleryError::ImageTooLarge
            | GalleryError::UnsupportedMediaType => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: self.to_string(),
                    ..Default::default()
                },
            )
                .into_response(),
            GalleryError::Validator(report) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: String::from("invalid input"),
                    details: Some(
                        report
                            .iter()
                            .map(|(path, error)| format!("{path}: {error}"))
                            .collect::<Vec<String>>(),
                    ),
                },
            )
                .into_response(),
            GalleryError::Diesel(diesel_error) => match diesel_error {
                diesel::result::Error::NotFound => (
                    StatusCode::NOT_FOUND,
                    ErrorResponse {
                        error: String::from("image not found"),
                        ..Default::default()
                    },
                )
                    .into_response(),
                DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => (
                    StatusCode::NOT_FOUND,
                    ErrorResponse {
                        error: String::from("image not found"),
                        ..Default::default()
                    },
                )
                    .into_response(),
                _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            },
            GalleryError::Contended
            | GalleryError::PoolError(_)
            | GalleryError::Task(_)
            | GalleryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
