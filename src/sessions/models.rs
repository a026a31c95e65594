use chrono::NaiveDateTime;
use diesel::{Insertable, Queryable, Selectable};

use crate::schema::admin_sessions;

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = admin_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AdminSession {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
