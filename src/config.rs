use std::{env, fmt::Display, net::IpAddr, path::PathBuf, str::FromStr};

use chrono::Duration;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: String,
    pub database_pool_size: usize,
    pub uploads_dir: PathBuf,
    pub bot_token: Option<String>,
    pub telegram_auth_insecure: bool,
    pub init_data_max_age: Duration,
    pub admin_password_hash: Option<String>,
    /// hex encoded, at least 64 bytes once decoded
    pub cookies_secret: Option<Vec<u8>>,
    pub session_ttl: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let cookies_secret = match optional("COOKIES_SECRET") {
            Some(secret) => Some(hex::decode(secret).map_err(|e| ConfigError::InvalidValue {
                key: "COOKIES_SECRET",
                message: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            host: try_load("HOST", "0.0.0.0")?,
            port: try_load("PORT", "3000")?,
            database_url: try_load("DATABASE_URL", "data/gallery.db")?,
            database_pool_size: try_load("DATABASE_POOL_SIZE", "8")?,
            uploads_dir: try_load("UPLOADS_DIR", "uploads")?,
            bot_token: optional("BOT_TOKEN"),
            telegram_auth_insecure: try_load("TELEGRAM_AUTH_INSECURE", "false")?,
            init_data_max_age: Duration::seconds(try_load("INIT_DATA_MAX_AGE_SECS", "86400")?),
            admin_password_hash: optional("ADMIN_PASSWORD_HASH"),
            cookies_secret,
            session_ttl: Duration::hours(try_load("SESSION_TTL_HOURS", "12")?),
        })
    }
}

fn optional(key: &'static str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!("{key} not set");
            None
        }
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            message: e.to_string(),
        })
}
