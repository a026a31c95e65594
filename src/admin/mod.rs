use axum::{http::StatusCode, response::IntoResponse};

use crate::{gallery::GalleryError, sessions::SessionError, ErrorResponse};

pub mod models;
pub mod routes;

#[derive(thiserror::Error, Debug)]
pub enum AdminError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("admin access is not configured")]
    AdminDisabled,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Gallery(#[from] GalleryError),

    #[error(transparent)]
    Argon2(#[from] argon2::password_hash::Error),

    #[error(transparent)]
    Validator(#[from] garde::Report),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminError::Session(e) => e.into_response(),
            AdminError::Gallery(e) => e.into_response(),
            AdminError::InvalidCredentials => {
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
            AdminError::AdminDisabled => {
                tracing::error!("{:#?}", self);
                (
                    StatusCode::FORBIDDEN,
                    ErrorResponse {
                        error: self.to_string(),
                        ..Default::default()
                    },
                )
                    .into_response()
            }
            AdminError::Validator(report) => {
                tracing::error!("{:#?}", report);
                (
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
                    .into_response()
            }
            AdminError::Argon2(_) => {
                tracing::error!("{:#?}", self);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
