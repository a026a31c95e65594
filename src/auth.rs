use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
    RequestPartsExt,
};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    sessions::{CookieSession, SessionError},
    AppState, ErrorResponse,
};

type HmacSha256 = Hmac<Sha256>;

/// Alternative to `Authorization: tma <init data>`.
pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("no init data provided")]
    MissingInitData,

    #[error("invalid auth data: {0}")]
    InvalidInitData(&'static str),

    #[error("invalid auth signature")]
    InvalidSignature,

    #[error("auth data expired")]
    Expired,

    #[error("authentication is not configured")]
    NotConfigured,

    #[error("invalid session")]
    InvalidSession,

    #[error(transparent)]
    SessionError(#[from] SessionError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("{:#?}", self);

        match self {
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            AuthError::SessionError(e) => e.into_response(),
            _ => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: format!("Unauthorized: {self}"),
                    ..Default::default()
                },
            )
                .into_response(),
        }
    }
}

/// Caller identity asserted by verified Telegram init data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramUser {
    pub id: String,
    pub display_name: String,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Deserialize)]
struct TelegramProfile {
    id: i64,
    first_name: String,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    language_code: Option<String>,
}

impl From<TelegramProfile> for TelegramUser {
    fn from(profile: TelegramProfile) -> Self {
        let display_name = match profile.last_name.as_deref() {
            Some(last_name) if !last_name.is_empty() => {
                format!("{} {}", profile.first_name, last_name)
            }
            _ => profile.first_name,
        };

        Self {
            id: profile.id.to_string(),
            display_name,
            username: profile.username,
            language_code: profile.language_code,
        }
    }
}

/// Checks Telegram Web App init data.
///
/// `insecure` keeps the legacy development behaviour: any payload with a
/// non-empty `hash` and a `user` is accepted without checking the signature
/// or its age.
#[derive(Clone, Debug)]
pub struct InitDataVerifier {
    bot_token: Option<String>,
    insecure: bool,
    max_age: Duration,
}

impl InitDataVerifier {
    pub fn new(bot_token: Option<String>, max_age: Duration) -> Self {
        Self {
            bot_token,
            insecure: false,
            max_age,
        }
    }

    pub fn insecure() -> Self {
        Self {
            bot_token: None,
            insecure: true,
            max_age: Duration::zero(),
        }
    }

    pub fn verify(&self, init_data: &str, now: DateTime<Utc>) -> Result<TelegramUser, AuthError> {
        if init_data.trim().is_empty() {
            return Err(AuthError::MissingInitData);
        }

        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(init_data)
            .map_err(|_| AuthError::InvalidInitData("invalid auth format"))?;

        let hash = field(&pairs, "hash")
            .filter(|hash| !hash.is_empty())
            .ok_or(AuthError::InvalidInitData("missing hash"))?;

        if !self.insecure {
            let bot_token = self.bot_token.as_deref().ok_or(AuthError::NotConfigured)?;
            let expected = hex::decode(hash).map_err(|_| AuthError::InvalidSignature)?;

            let mut mac = HmacSha256::new_from_slice(&secret_key(bot_token))
                .map_err(|_| AuthError::NotConfigured)?;
            mac.update(data_check_string(&pairs).as_bytes());
            mac.verify_slice(&expected)
                .map_err(|_| AuthError::InvalidSignature)?;

            let auth_date = field(&pairs, "auth_date")
                .and_then(|value| value.parse::<i64>().ok())
                .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
                .ok_or(AuthError::InvalidInitData("missing auth_date"))?;

            if now - auth_date > self.max_age {
                return Err(AuthError::Expired);
            }
        }

        let user = field(&pairs, "user").ok_or(AuthError::InvalidInitData("no user data"))?;
        let profile: TelegramProfile = serde_json::from_str(user)
            .map_err(|_| AuthError::InvalidInitData("malformed user data"))?;

        Ok(profile.into())
    }
}

fn field<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// Every pair except `hash`, sorted by key, as `key=value` lines.
fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut lines: Vec<String> = pairs
        .iter()
        .filter(|(key, _)| key != "hash")
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    lines.sort();

    lines.join("\n")
}

fn secret_key(bot_token: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(b"WebAppData").expect("hmac accepts any key length");
    mac.update(bot_token.as_bytes());

    mac.finalize().into_bytes().to_vec()
}

/// Builds init data signed for `bot_token` from `pairs` (without `hash`).
/// Only the unit and HTTP tests call this, to act as a mini app client.
pub fn sign_init_data(bot_token: &str, pairs: &[(&str, &str)]) -> String {
    let owned: Vec<(String, String)> = pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();

    let mut mac = HmacSha256::new_from_slice(&secret_key(bot_token)).expect("hmac accepts any key length");
    mac.update(data_check_string(&owned).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut signed = owned;
    signed.push((String::from("hash"), hash));

    serde_urlencoded::to_string(signed).expect("pairs encode")
}

fn init_data_from_headers(headers: &HeaderMap) -> Option<&str> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("tma "));

    authorization
        .or_else(|| {
            headers
                .get(INIT_DATA_HEADER)
                .and_then(|value| value.to_str().ok())
        })
        .map(str::trim)
}

#[async_trait]
impl FromRequestParts<AppState> for TelegramUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let init_data = init_data_from_headers(&parts.headers).ok_or_else(|| {
            tracing::debug!("telegram-extractor: no init data header");
            AuthError::MissingInitData
        })?;

        state.inner.verifier.verify(init_data, Utc::now())
    }
}

/// Requires a live administrator session.
pub struct AdminExtractor {
    pub session_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminExtractor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let session_id = parts
            .extract_with_state::<CookieSession, _>(state)
            .await?
            .session_id
            .ok_or_else(|| {
                tracing::error!("admin-extractor: missing session_id");
                AuthError::InvalidSession
            })?;

        let Some(_session) = state.sessions.find_valid(session_id).await? else {
            return Err(AuthError::InvalidSession);
        };

        Ok(AdminExtractor { session_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456:test-bot-token";
    const USER: &str = r#"{"id":42,"first_name":"Ada","last_name":"Lovelace","username":"ada","language_code":"en"}"#;

    fn verifier() -> InitDataVerifier {
        InitDataVerifier::new(Some(BOT_TOKEN.to_string()), Duration::hours(24))
    }

    fn signed(auth_date: i64) -> String {
        let auth_date = auth_date.to_string();
        sign_init_data(
            BOT_TOKEN,
            &[
                ("query_id", "AAH-test"),
                ("user", USER),
                ("auth_date", &auth_date),
            ],
        )
    }

    #[test]
    fn accepts_correctly_signed_init_data() {
        let now = Utc::now();
        let user = verifier().verify(&signed(now.timestamp()), now).unwrap();

        assert_eq!(
            user,
            TelegramUser {
                id: String::from("42"),
                display_name: String::from("Ada Lovelace"),
                username: Some(String::from("ada")),
                language_code: Some(String::from("en")),
            }
        );
    }

    #[test]
    fn rejects_tampered_payloads() {
        let now = Utc::now();
        let tampered = signed(now.timestamp()).replace("42", "43");

        assert!(matches!(
            verifier().verify(&tampered, now),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_data_signed_with_another_token() {
        let now = Utc::now();
        let init_data = sign_init_data(
            "999:other-bot",
            &[("user", USER), ("auth_date", &now.timestamp().to_string())],
        );

        assert!(matches!(
            verifier().verify(&init_data, now),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_stale_init_data() {
        let now = Utc::now();
        let day_and_a_bit_ago = (now - Duration::hours(25)).timestamp();

        assert!(matches!(
            verifier().verify(&signed(day_and_a_bit_ago), now),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn requires_a_hash() {
        let init_data = serde_urlencoded::to_string([("user", USER)]).unwrap();

        assert!(matches!(
            verifier().verify(&init_data, Utc::now()),
            Err(AuthError::InvalidInitData("missing hash"))
        ));
        assert!(matches!(
            InitDataVerifier::insecure().verify(&init_data, Utc::now()),
            Err(AuthError::InvalidInitData("missing hash"))
        ));
    }

    #[test]
    fn missing_bot_token_rejects_everything() {
        let now = Utc::now();
        let verifier = InitDataVerifier::new(None, Duration::hours(24));

        assert!(matches!(
            verifier.verify(&signed(now.timestamp()), now),
            Err(AuthError::NotConfigured)
        ));
    }

    #[test]
    fn insecure_mode_only_checks_shape() {
        let init_data =
            serde_urlencoded::to_string([("user", USER), ("hash", "not-a-signature")]).unwrap();

        let user = InitDataVerifier::insecure()
            .verify(&init_data, Utc::now())
            .unwrap();
        assert_eq!(user.id, "42");
    }

    #[test]
    fn data_check_string_is_sorted_and_skips_hash() {
        let pairs = vec![
            (String::from("user"), String::from("{}")),
            (String::from("hash"), String::from("abc")),
            (String::from("auth_date"), String::from("1")),
        ];

        assert_eq!(data_check_string(&pairs), "auth_date=1\nuser={}");
    }

    #[test]
    fn reads_init_data_from_either_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "tma a=1&hash=2".parse().unwrap());
        assert_eq!(init_data_from_headers(&headers), Some("a=1&hash=2"));

        let mut headers = HeaderMap::new();
        headers.insert(INIT_DATA_HEADER, "b=1".parse().unwrap());
        assert_eq!(init_data_from_headers(&headers), Some("b=1"));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer token".parse().unwrap());
        assert_eq!(init_data_from_headers(&headers), None);
    }
}
