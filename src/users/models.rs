use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{auth::TelegramUser, schema::users};

/// Last known Telegram profile of someone who used the gallery.
#[derive(Insertable, Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub last_active_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn seen(user: &TelegramUser, now: NaiveDateTime) -> Self {
        Self {
            id: user.id.clone(),
            display_name: user.display_name.clone(),
            username: user.username.clone(),
            language_code: user.language_code.clone(),
            last_active_at: now,
            created_at: now,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserResponse {
    pub id: String,
    pub display_name: String,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            username: user.username,
            language_code: user.language_code,
            last_active_at: user.last_active_at.and_utc(),
            created_at: user.created_at.and_utc(),
        }
    }
}
