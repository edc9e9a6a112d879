use axum::body::Bytes;
use std::path::Path;
use thiserror::Error;

use crate::db::models::NewPost;
use crate::identity::Identity;

pub const DEFAULT_AVATAR: &str = "/portrait-avatar.png";
pub const ANONYMOUS_NAME: &str = "Anonymous";
pub const DEFAULT_HANDLE: &str = "user";

/// Raster formats accepted for posts, with the extension they are stored
/// under. The stored extension decides the type the file is served as.
const ACCEPTED_IMAGES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/bmp", "bmp"),
];

const KB: usize = 1024;
const MB: usize = 1024 * 1024;

/// Rejections raised before anything is stored. The messages are shown to
/// the user as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please choose an image to upload.")]
    MissingImage,

    #[error("Please add a caption.")]
    EmptyCaption,

    #[error("Images must be {limit} or smaller.")]
    FileTooLarge { limit: String },

    #[error("Only image files can be posted.")]
    NotAnImage,
}

impl ValidationError {
    pub fn too_large(max_bytes: usize) -> Self {
        ValidationError::FileTooLarge {
            limit: describe_size(max_bytes),
        }
    }
}

/// "10MB", "512KB", or an exact byte count when neither divides evenly.
fn describe_size(bytes: usize) -> String {
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// An image file received from the create-post form.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedImage {
    /// Declared content type, else a guess from the file name.
    fn mime(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime_guess::Mime>().ok())
            .map(|m| m.essence_str().to_ascii_lowercase())
            .filter(|ct| ct != "application/octet-stream")
            .or_else(|| self.mime_from_name())
    }

    fn mime_from_name(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|m| m.essence_str().to_string())
    }

    /// Stored extension for an accepted image, `None` for anything else.
    ///
    /// The file name's own extension must also name an accepted image, so a
    /// page declared as `image/png` is refused.
    pub fn extension(&self) -> Option<&'static str> {
        if let Some(named) = self.mime_from_name() {
            accepted_extension(&named)?;
        }
        accepted_extension(&self.mime()?)
    }
}

fn accepted_extension(mime: &str) -> Option<&'static str> {
    ACCEPTED_IMAGES
        .iter()
        .find(|(accepted, _)| *accepted == mime)
        .map(|(_, ext)| *ext)
}

/// Checks the form in the order the user fills it in: image, size, type,
/// caption.
pub fn validate_upload(
    image: Option<&UploadedImage>,
    caption: &str,
    max_bytes: usize,
) -> Result<(), ValidationError> {
    let image = image.ok_or(ValidationError::MissingImage)?;
    if image.bytes.is_empty() {
        return Err(ValidationError::MissingImage);
    }
    if image.bytes.len() > max_bytes {
        return Err(ValidationError::too_large(max_bytes));
    }
    if image.extension().is_none() {
        return Err(ValidationError::NotAnImage);
    }
    if caption.trim().is_empty() {
        return Err(ValidationError::EmptyCaption);
    }
    Ok(())
}

/// Handle shown after "@": the email's local part, else the display name
/// lowercased without spaces, else [`DEFAULT_HANDLE`].
pub fn handle_for(identity: Option<&Identity>) -> String {
    let Some(identity) = identity else {
        return DEFAULT_HANDLE.to_string();
    };

    let from_email = identity
        .email
        .as_deref()
        .and_then(|email| email.split('@').next())
        .filter(|local| !local.is_empty());
    if let Some(local) = from_email {
        return local.to_string();
    }

    let from_name: String = identity
        .display_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect();
    if from_name.is_empty() {
        DEFAULT_HANDLE.to_string()
    } else {
        from_name
    }
}

/// A new post authored by `identity`, or by an anonymous poster.
pub fn new_post_for(identity: Option<&Identity>, image_src: String, caption: &str) -> NewPost {
    let (name, avatar, user_id) = match identity {
        Some(identity) => (
            identity.display_name.clone(),
            identity
                .avatar_url
                .clone()
                .unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            identity.uid.clone(),
        ),
        None => (
            ANONYMOUS_NAME.to_string(),
            DEFAULT_AVATAR.to_string(),
            String::new(),
        ),
    };

    NewPost {
        image_src,
        username: handle_for(identity),
        photographer_name: name,
        avatar_src: avatar,
        caption: caption.trim().to_string(),
        likes: 0,
        comments: 0,
        user_id,
    }
}

/// Write the image under `dir` and return the locator it is served at.
pub async fn store_image(dir: &Path, image: &UploadedImage) -> std::io::Result<String> {
    let extension = image.extension().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "upload is not an accepted image")
    })?;
    tokio::fs::create_dir_all(dir).await?;
    let file_name = format!("{}.{}", uuid::Uuid::now_v7(), extension);
    tokio::fs::write(dir.join(&file_name), &image.bytes).await?;
    Ok(format!("/uploads/{}", file_name))
}

/// Remove an image stored by [`store_image`] whose post was never created.
pub async fn discard_image(dir: &Path, locator: &str) {
    let Some(file_name) = locator.strip_prefix("/uploads/") else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(dir.join(file_name)).await {
        tracing::warn!("Could not discard orphaned upload {}: {}", locator, e);
    }
}
