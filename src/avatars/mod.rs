pub mod fetch;

use bytes::Bytes;
use thiserror::Error;

use crate::db::models::User;
use crate::social::{ImageSlot, SocialError, UserRepository, ValidationErrors};
use crate::storage::{BlobStore, StorageError, Variant};

pub use fetch::{AvatarFetcher, DynAvatarFetcher, FetchError, HttpAvatarFetcher, RetryPolicy};

pub const DEFAULT_AVATAR_SIZE: u32 = 80;
const GRAVATAR_BASE: &str = "https://www.gravatar.com/avatar";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Social(#[from] SocialError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub fn gravatar_url(email: &str, size: u32) -> String {
    let digest = md5::compute(email.trim().to_lowercase().as_bytes());
    format!("{GRAVATAR_BASE}/{digest:x}?s={size}")
}

/// Uploaded avatar cropped to a square, or the gravatar for the user's email.
pub fn avatar_url(user: &User, size: u32, blobs: &dyn BlobStore) -> String {
    match &user.avatar_key {
        Some(key) => blobs.variant_url(key, Variant::square(size)),
        None => gravatar_url(&user.email, size),
    }
}

/// Banner is twice as wide as `size`. No fallback image.
pub fn banner_url(user: &User, size: u32, blobs: &dyn BlobStore) -> Option<String> {
    user.banner_key
        .as_ref()
        .map(|key| blobs.variant_url(key, Variant::banner(size)))
}

/// The MIME type of an upload if it is an image: the declared type, or one
/// guessed from the file name.
pub fn image_content_type(declared: Option<&str>, file_name: Option<&str>) -> Option<String> {
    declared
        .filter(|ct| ct.starts_with("image/"))
        .map(str::to_string)
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first())
                .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
                .map(|mime| mime.essence_str().to_string())
        })
}

/// Store a new image for `slot` and drop the one it replaces.
pub async fn replace_image(
    users: &UserRepository,
    blobs: &dyn BlobStore,
    user_id: &str,
    slot: ImageSlot,
    data: Bytes,
    declared_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<User, UploadError> {
    let content_type = image_content_type(declared_type, file_name)
        .ok_or_else(|| ValidationErrors::single(slot.field(), "not an image"))?;
    if data.is_empty() {
        return Err(ValidationErrors::single(slot.field(), "is empty").into());
    }

    let key = blobs.put(data, &content_type).await?;
    let previous = match users.set_image(user_id, slot, Some(&key)) {
        Ok(previous) => previous,
        Err(e) => {
            if let Err(cleanup) = blobs.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned blob");
            }
            return Err(e.into());
        }
    };

    if let Some(old) = previous {
        if let Err(e) = blobs.delete(&old).await {
            tracing::warn!(key = %old, error = %e, "Failed to remove replaced blob");
        }
    }

    Ok(users.get(user_id)?)
}
