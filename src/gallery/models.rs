use std::fs;

use chrono::{DateTime, NaiveDateTime, Utc};
use derive_builder::Builder;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::schema::{images, likes};

#[derive(Insertable, Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = images)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Image {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub filename: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: NaiveDateTime,
    pub like_count: i32,
}

impl Image {
    pub fn into_summary(self, liked_by_viewer: Option<bool>) -> ImageSummary {
        ImageSummary {
            url: format!("/uploads/{}", self.filename),
            id: self.id,
            owner_id: self.owner_id,
            owner_name: self.owner_name,
            filename: self.filename,
            original_name: self.original_name,
            size_bytes: self.size_bytes,
            mime_type: self.mime_type,
            created_at: self.created_at.and_utc(),
            like_count: self.like_count,
            liked_by_viewer,
        }
    }
}

#[derive(Insertable, Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = likes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Like {
    pub image_id: String,
    pub user_id: String,
    pub created_at: NaiveDateTime,
}

/// Ordering of the gallery listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SortKey {
    /// like count, newest first on ties
    #[default]
    Likes,
    Recent,
}

/// Who is asking for a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    Owner(String),
    Moderator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LikeToggle {
    pub liked: bool,
    pub total_likes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImageSummary {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub filename: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub like_count: i32,
    pub url: String,
    /// null for anonymous listings
    pub liked_by_viewer: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LikedImage {
    #[serde(flatten)]
    pub image: ImageSummary,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GalleryStats {
    pub total_images: i64,
    pub total_likes: i64,
    pub total_creators: i64,
    pub total_likers: i64,
}

#[derive(Debug, Deserialize, IntoParams, garde::Validate)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListImagesParams {
    #[serde(default = "default_list_limit")]
    #[garde(range(min = 1, max = 100))]
    pub limit: i64,
    #[serde(default)]
    #[garde(skip)]
    #[param(inline)]
    pub sort_by: SortKey,
}

fn default_list_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize, IntoParams, garde::Validate)]
#[into_params(parameter_in = Query)]
pub struct TopImagesParams {
    #[serde(default = "default_top_limit")]
    #[garde(range(min = 1, max = 100))]
    pub limit: i64,
}

fn default_top_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, ToSchema, garde::Validate)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLikeRequest {
    #[garde(length(min = 1, max = 64))]
    pub user_id: String,
}

#[derive(Debug, Deserialize, ToSchema, garde::Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImageRequest {
    #[garde(length(min = 1, max = 64))]
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UploadResponse {
    pub success: bool,
    pub image_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(ToSchema)]
#[allow(dead_code, non_snake_case)]
pub struct UploadImageForm {
    userId: String,
    userName: Option<String>,
    #[schema(value_type = String, format = Binary)]
    image: fs::File,
}

/// Metadata collected from the multipart fields of an upload.
#[derive(Builder, Debug)]
#[builder(pattern = "owned")]
pub struct ImageUpload {
    #[builder(setter(into))]
    pub owner_id: String,
    #[builder(setter(into, strip_option), default)]
    pub owner_name: Option<String>,
    #[builder(setter(into))]
    pub original_name: String,
    #[builder(setter(into))]
    pub mime_type: String,
    /// derived from `mime_type`, never from the client's file name
    pub extension: &'static str,
    pub size_bytes: i64,
}

impl ImageUpload {
    #[must_use]
    pub fn builder() -> ImageUploadBuilder {
        ImageUploadBuilder::default()
    }
}
