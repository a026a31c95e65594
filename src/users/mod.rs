use axum::{http::StatusCode, response::IntoResponse};
use deadpool_diesel::sqlite::PoolError;

use crate::{database::TaskError, gallery::GalleryError, ErrorResponse};

pub mod models;
pub mod routes;
pub mod store;

#[derive(thiserror::Error, Debug)]
pub enum UsersError {
    #[error("user not found")]
    UserNotFound,

    #[error("user id mismatch")]
    UserMismatch,

    #[error(transparent)]
    Gallery(#[from] GalleryError),

    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),

    #[error(transparent)]
    PoolError(#[from] PoolError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl IntoResponse for UsersError {
    fn into_response(self) -> axum::response::Response {
        match self {
            UsersError::Gallery(e) => e.into_response(),
            UsersError::UserNotFound => {
                tracing::error!("{:#?}", self);
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse {
                        error: self.to_string(),
                        ..Default::default()
                    },
                )
                    .into_response()
            }
            UsersError::UserMismatch => {
                tracing::error!("{:#?}", self);
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse {
                        error: self.to_string(),
                        ..Default::default()
                    },
                )
                    .into_response()
            }
            UsersError::Diesel(_) | UsersError::PoolError(_) | UsersError::Task(_) => {
                tracing::error!("{:#?}", self);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
