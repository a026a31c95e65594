//! Like toggling and ranking on top of the `images` and `likes` tables.
//!
//! `images.like_count` is denormalized: it must always equal the number of
//! `likes` rows for the image. Every mutation touching either table runs in
//! an `IMMEDIATE` transaction, which takes the sqlite write lock up front so
//! concurrent toggles are serialized by the store itself. The composite
//! primary key on `likes` is the final arbiter of "one like per user".

use std::collections::HashSet;

use chrono::{NaiveDateTime, Utc};
use diesel::{
    dsl::{count, exists},
    expression_methods::AggregateExpressionMethods,
    prelude::*,
    sql_query,
};

use crate::schema::{images, likes};

use super::{
    models::{DeleteScope, GalleryStats, Image, Like, LikeToggle, SortKey},
    GalleryError,
};

const MAX_TOGGLE_ATTEMPTS: u32 = 3;

pub fn create_image(conn: &mut SqliteConnection, image: &Image) -> Result<(), GalleryError> {
    diesel::insert_into(images::table)
        .values(image)
        .execute(conn)?;

    Ok(())
}

pub fn get_image(conn: &mut SqliteConnection, image_id: &str) -> Result<Image, GalleryError> {
    images::table
        .find(image_id)
        .select(Image::as_select())
        .first(conn)
        .optional()?
        .ok_or(GalleryError::ImageNotFound)
}

/// Flips the like of `user_id` on `image_id` and returns the new state.
///
/// A duplicate-row conflict rolls the transaction back and the toggle is
/// retried from scratch, callers never see it.
pub fn toggle_like(
    conn: &mut SqliteConnection,
    image_id: &str,
    user_id: &str,
) -> Result<LikeToggle, GalleryError> {
    retry_on_conflict(|| {
        conn.immediate_transaction(|conn| toggle_like_once(conn, image_id, user_id))
    })
}

/// Runs `attempt` until it stops failing with a unique violation. After
/// `MAX_TOGGLE_ATTEMPTS` conflicts the caller gets [`GalleryError::Contended`].
fn retry_on_conflict<T>(
    mut attempt: impl FnMut() -> Result<T, GalleryError>,
) -> Result<T, GalleryError> {
    for tries in 1..=MAX_TOGGLE_ATTEMPTS {
        match attempt() {
            Err(err) if err.is_conflict() => {
                tracing::warn!("conflicting write, retrying (attempt {tries}): {err}");
            }
            result => return result,
        }
    }

    Err(GalleryError::Contended)
}

fn toggle_like_once(
    conn: &mut SqliteConnection,
    image_id: &str,
    user_id: &str,
) -> Result<LikeToggle, GalleryError> {
    let image_exists =
        diesel::select(exists(images::table.find(image_id))).get_result::<bool>(conn)?;

    if !image_exists {
        return Err(GalleryError::ImageNotFound);
    }

    let removed = diesel::delete(likes::table.find((image_id, user_id))).execute(conn)?;

    let liked = if removed > 0 {
        diesel::update(images::table.find(image_id))
            .set(images::like_count.eq(images::like_count - 1))
            .execute(conn)?;

        false
    } else {
        diesel::insert_into(likes::table)
            .values(Like {
                image_id: image_id.to_owned(),
                user_id: user_id.to_owned(),
                created_at: Utc::now().naive_utc(),
            })
            .execute(conn)?;

        diesel::update(images::table.find(image_id))
            .set(images::like_count.eq(images::like_count + 1))
            .execute(conn)?;

        true
    };

    let total_likes = images::table
        .find(image_id)
        .select(images::like_count)
        .first::<i32>(conn)?;

    tracing::debug!("toggle_like: {image_id}/{user_id} liked={liked} total={total_likes}");

    Ok(LikeToggle { liked, total_likes })
}

pub fn list_images(
    conn: &mut SqliteConnection,
    limit: i64,
    sort: SortKey,
) -> Result<Vec<Image>, GalleryError> {
    let query = images::table
        .select(Image::as_select())
        .limit(limit)
        .into_boxed();

    // id breaks timestamp ties so the order is total
    let query = match sort {
        SortKey::Likes => query.order((
            images::like_count.desc(),
            images::created_at.desc(),
            images::id.desc(),
        )),
        SortKey::Recent => query.order((images::created_at.desc(), images::id.desc())),
    };

    Ok(query.load(conn)?)
}

/// Leaderboard: ranked like [`list_images`], unliked images left out.
pub fn top_images(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<Image>, GalleryError> {
    let images = images::table
        .filter(images::like_count.gt(0))
        .order((
            images::like_count.desc(),
            images::created_at.desc(),
            images::id.desc(),
        ))
        .limit(limit)
        .select(Image::as_select())
        .load(conn)?;

    Ok(images)
}

/// Removes the image and its likes. Returns the deleted row so the caller
/// can remove the backing file, `None` if there was nothing to delete.
pub fn delete_image(
    conn: &mut SqliteConnection,
    image_id: &str,
    scope: &DeleteScope,
) -> Result<Option<Image>, GalleryError> {
    conn.immediate_transaction(|conn| {
        let Some(image) = images::table
            .find(image_id)
            .select(Image::as_select())
            .first(conn)
            .optional()?
        else {
            return Ok(None);
        };

        if let DeleteScope::Owner(user_id) = scope {
            if image.owner_id != *user_id {
                return Err(GalleryError::Forbidden);
            }
        }

        let removed_likes =
            diesel::delete(likes::table.filter(likes::image_id.eq(image_id))).execute(conn)?;

        diesel::delete(images::table.find(image_id)).execute(conn)?;

        tracing::debug!("delete_image: {image_id} removed with {removed_likes} likes");

        Ok(Some(image))
    })
}

pub fn is_liked_by(
    conn: &mut SqliteConnection,
    image_id: &str,
    user_id: &str,
) -> Result<bool, GalleryError> {
    let image_exists =
        diesel::select(exists(images::table.find(image_id))).get_result::<bool>(conn)?;

    if !image_exists {
        return Err(GalleryError::ImageNotFound);
    }

    let liked = diesel::select(exists(likes::table.find((image_id, user_id))))
        .get_result::<bool>(conn)?;

    Ok(liked)
}

/// Which of `image_ids` the user has liked, in a single query.
pub fn liked_among(
    conn: &mut SqliteConnection,
    user_id: &str,
    image_ids: &[String],
) -> Result<HashSet<String>, GalleryError> {
    if image_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let liked = likes::table
        .filter(likes::user_id.eq(user_id))
        .filter(likes::image_id.eq_any(image_ids))
        .select(likes::image_id)
        .load::<String>(conn)?;

    Ok(liked.into_iter().collect())
}

pub fn user_images(
    conn: &mut SqliteConnection,
    owner_id: &str,
) -> Result<Vec<Image>, GalleryError> {
    let images = images::table
        .filter(images::owner_id.eq(owner_id))
        .order((images::created_at.desc(), images::id.desc()))
        .select(Image::as_select())
        .load(conn)?;

    Ok(images)
}

/// Images liked by `user_id` with the time of the like, latest like first.
pub fn user_likes(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<(Image, NaiveDateTime)>, GalleryError> {
    let liked = images::table
        .inner_join(likes::table)
        .filter(likes::user_id.eq(user_id))
        .order((likes::created_at.desc(), images::id.desc()))
        .select((Image::as_select(), likes::created_at))
        .load::<(Image, NaiveDateTime)>(conn)?;

    Ok(liked)
}

pub fn stats(conn: &mut SqliteConnection) -> Result<GalleryStats, GalleryError> {
    let total_images = images::table.count().get_result::<i64>(conn)?;
    let total_likes = likes::table.count().get_result::<i64>(conn)?;
    let total_creators = images::table
        .select(count(images::owner_id).aggregate_distinct())
        .get_result::<i64>(conn)?;
    let total_likers = likes::table
        .select(count(likes::user_id).aggregate_distinct())
        .get_result::<i64>(conn)?;

    Ok(GalleryStats {
        total_images,
        total_likes,
        total_creators,
        total_likers,
    })
}

/// Recomputes every `like_count` from the `likes` rows, returns how many
/// images had a drifted counter.
pub fn reconcile_like_counts(conn: &mut SqliteConnection) -> Result<usize, GalleryError> {
    conn.immediate_transaction(|conn| {
        let corrected = sql_query(
            "UPDATE images \
             SET like_count = (SELECT COUNT(*) FROM likes WHERE likes.image_id = images.id) \
             WHERE like_count <> (SELECT COUNT(*) FROM likes WHERE likes.image_id = images.id)",
        )
        .execute(conn)?;

        if corrected > 0 {
            tracing::warn!("reconcile_like_counts: corrected {corrected} images");
        }

        Ok(corrected)
    })
}
