use uuid::Uuid;

pub mod interface;

pub use interface::{StagedFile, Storage};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Image types accepted for upload, with the extension they are stored
/// under. Anything else would be served with a browser-interpreted type.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Normalized mime type and file extension for a declared content type,
/// `None` if it is not an accepted image type.
pub fn image_type(content_type: &str) -> Option<(&'static str, &'static str)> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let essence = if essence == "image/jpg" {
        String::from("image/jpeg")
    } else {
        essence
    };

    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .copied()
}

/// Name under which an upload is stored. The extension never comes from the
/// client's file name.
pub fn generate_file_name(extension: &str) -> String {
    format!("gallery-{}.{}", Uuid::now_v7(), extension)
}
