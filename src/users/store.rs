use chrono::Utc;
use deadpool_diesel::sqlite::Pool;
use diesel::prelude::*;

use crate::{auth::TelegramUser, database, schema::users};

use super::{models::User, UsersError};

/// Inserts the profile or refreshes the cached fields, keeping `created_at`.
pub fn upsert_user(conn: &mut SqliteConnection, user: &User) -> QueryResult<()> {
    diesel::insert_into(users::table)
        .values(user)
        .on_conflict(users::id)
        .do_update()
        .set((
            users::display_name.eq(&user.display_name),
            users::username.eq(&user.username),
            users::language_code.eq(&user.language_code),
            users::last_active_at.eq(user.last_active_at),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn get_user(conn: &mut SqliteConnection, user_id: &str) -> QueryResult<Option<User>> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()
}

/// Records that `user` was active. The cache is advisory, failures are only
/// logged.
pub async fn touch(pool: &Pool, user: &TelegramUser) {
    let user = User::seen(user, Utc::now().naive_utc());
    let user_id = user.id.clone();

    let result = database::run::<_, UsersError, _>(pool, move |conn| {
        upsert_user(conn, &user)?;
        Ok(())
    })
    .await;

    if let Err(e) = result {
        tracing::warn!("failed to refresh cached profile of {user_id}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn telegram_user(display_name: &str) -> TelegramUser {
        TelegramUser {
            id: String::from("7"),
            display_name: display_name.to_string(),
            username: Some(String::from("seven")),
            language_code: None,
        }
    }

    #[tokio::test]
    async fn upsert_refreshes_profile_but_keeps_first_seen() {
        let (pool, _dir) = database::test_pool().await;

        let first_seen = Utc::now().naive_utc() - Duration::days(3);
        let later = first_seen + Duration::days(2);

        let stored = database::run::<_, UsersError, _>(&pool, move |conn| {
            upsert_user(conn, &User::seen(&telegram_user("Old Name"), first_seen))?;
            upsert_user(conn, &User::seen(&telegram_user("New Name"), later))?;

            Ok(get_user(conn, "7")?)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(stored.display_name, "New Name");
        assert_eq!(stored.created_at, first_seen);
        assert_eq!(stored.last_active_at, later);
    }

    #[tokio::test]
    async fn touch_creates_missing_profiles() {
        let (pool, _dir) = database::test_pool().await;

        touch(&pool, &telegram_user("Seven")).await;

        let stored = database::run::<_, UsersError, _>(&pool, |conn| Ok(get_user(conn, "7")?))
            .await
            .unwrap();
        assert_eq!(stored.map(|u| u.display_name).as_deref(), Some("Seven"));
    }
}
