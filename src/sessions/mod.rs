pub mod models;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    RequestPartsExt,
};
use chrono::{Duration, Utc};
use deadpool_diesel::sqlite::{Pool, PoolError};
use diesel::prelude::*;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::{self, TaskError},
    schema::admin_sessions,
    sessions::models::AdminSession,
    AppState, ErrorResponse,
};

pub const SESSION_COOKIE_NAME: &str = "admin_session";

/// Session id read from the private admin cookie, if any.
pub struct CookieSession {
    pub session_id: Option<Uuid>,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("something went wrong")]
    SomethingWentWrong,

    #[error("something went wrong")]
    Diesel(#[from] diesel::result::Error),

    #[error("something went wrong")]
    PoolError(#[from] PoolError),

    #[error("something went wrong")]
    Task(#[from] TaskError),

    #[error("invalid session")]
    InvalidSession,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("{:#?}", self);

        match self {
            SessionError::InvalidSession => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: self.to_string(),
                    ..Default::default()
                },
            )
                .into_response(),
            SessionError::SomethingWentWrong
            | SessionError::Diesel(_)
            | SessionError::PoolError(_)
            | SessionError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Administrator sessions persisted in `admin_sessions`.
#[derive(Clone)]
pub struct SessionStore {
    pool: Pool,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(pool: Pool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub async fn create(&self) -> Result<AdminSession, SessionError> {
        let now = Utc::now().naive_utc();
        let session = AdminSession {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        database::run(&self.pool, move |conn| {
            diesel::insert_into(admin_sessions::table)
                .values(&session)
                .execute(conn)?;

            Ok(session)
        })
        .await
    }

    /// The session, unless it is unknown or expired.
    pub async fn find_valid(&self, session_id: Uuid) -> Result<Option<AdminSession>, SessionError> {
        let session_id = session_id.to_string();

        database::run(&self.pool, move |conn| {
            let session = admin_sessions::table
                .find(session_id)
                .filter(admin_sessions::expires_at.gt(Utc::now().naive_utc()))
                .select(AdminSession::as_select())
                .first(conn)
                .optional()?;

            Ok(session)
        })
        .await
    }

    /// Pushes expiry to a full ttl from now. Expired sessions stay expired.
    pub async fn refresh(&self, session_id: Uuid) -> Result<bool, SessionError> {
        let session_id = session_id.to_string();
        let ttl = self.ttl;

        database::run(&self.pool, move |conn| {
            let now = Utc::now().naive_utc();
            let updated = diesel::update(
                admin_sessions::table
                    .find(session_id)
                    .filter(admin_sessions::expires_at.gt(now)),
            )
            .set(admin_sessions::expires_at.eq(now + ttl))
            .execute(conn)?;

            Ok(updated > 0)
        })
        .await
    }

    pub async fn destroy(&self, session_id: Uuid) -> Result<bool, SessionError> {
        let session_id = session_id.to_string();

        database::run(&self.pool, move |conn| {
            let deleted = diesel::delete(admin_sessions::table.find(session_id)).execute(conn)?;

            Ok(deleted > 0)
        })
        .await
    }

    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        database::run(&self.pool, |conn| {
            let purged = diesel::delete(
                admin_sessions::table.filter(admin_sessions::expires_at.le(Utc::now().naive_utc())),
            )
            .execute(conn)?;

            Ok(purged)
        })
        .await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CookieSession {
    type Rejection = SessionError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies =
            parts
                .extract::<Cookies>()
                .await
                .map_err(|(_error_status, error_message)| {
                    tracing::error!(
                        "session-extractor: failed to get private cookie jar: {error_message}"
                    );
                    SessionError::SomethingWentWrong
                })?;

        if let Some(session_id) = cookies.private(&state.cookies_key).get(SESSION_COOKIE_NAME) {
            Ok(Self {
                session_id: Some(Uuid::parse_str(session_id.value()).map_err(|e| {
                    tracing::error!("session-extractor: invalid session_id: {e}");
                    SessionError::InvalidSession
                })?),
            })
        } else {
            Ok(Self { session_id: None })
        }
    }
}

pub async fn refresh_session(
    session: CookieSession,
    State(sessions): State<SessionStore>,
    request: Request,
    next: Next,
) -> Result<Response, SessionError> {
    if let Some(session_id) = session.session_id {
        if !sessions.refresh(session_id).await? {
            tracing::debug!("refresh_session: {session_id} is unknown or expired");
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_sessions_are_valid_until_destroyed() {
        let (pool, _dir) = database::test_pool().await;
        let store = SessionStore::new(pool, Duration::hours(1));

        let session = store.create().await.unwrap();
        let id = Uuid::parse_str(&session.id).unwrap();
        assert_eq!(session.expires_at - session.created_at, Duration::hours(1));

        assert_eq!(store.find_valid(id).await.unwrap(), Some(session));
        assert!(store.destroy(id).await.unwrap());
        assert_eq!(store.find_valid(id).await.unwrap(), None);
        assert!(!store.destroy(id).await.unwrap());
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_purged() {
        let (pool, _dir) = database::test_pool().await;
        let expired = SessionStore::new(pool.clone(), Duration::seconds(-1));
        let live = SessionStore::new(pool, Duration::hours(1));

        let stale = expired.create().await.unwrap();
        let fresh = live.create().await.unwrap();
        let stale_id = Uuid::parse_str(&stale.id).unwrap();

        assert_eq!(live.find_valid(stale_id).await.unwrap(), None);
        assert!(!live.refresh(stale_id).await.unwrap());

        assert_eq!(live.purge_expired().await.unwrap(), 1);
        assert!(live
            .find_valid(Uuid::parse_str(&fresh.id).unwrap())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn refresh_slides_the_expiry() {
        let (pool, _dir) = database::test_pool().await;
        let short = SessionStore::new(pool.clone(), Duration::minutes(1));
        let long = SessionStore::new(pool, Duration::hours(2));

        let session = short.create().await.unwrap();
        let id = Uuid::parse_str(&session.id).unwrap();

        assert!(long.refresh(id).await.unwrap());
        let refreshed = long.find_valid(id).await.unwrap().unwrap();
        assert!(refreshed.expires_at > session.expires_at + Duration::minutes(30));
    }
}
