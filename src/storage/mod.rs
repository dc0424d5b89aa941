// Blob storage for uploaded images. Rendering of crops/resizes happens in
// front of the public URL; this module only stores originals and composes
// variant URLs.
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

/// A resized, cropped rendition of a stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub width: u32,
    pub height: u32,
}

impl Variant {
    /// `size`×`size`, cropped around the centre.
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }

    /// Twice as wide as it is high.
    pub fn banner(size: u32) -> Self {
        Self {
            width: size * 2,
            height: size,
        }
    }

    /// Query string understood by the image renderer.
    pub fn query(&self) -> String {
        let dims = format!("{}x{}", self.width, self.height);
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("auto_orient", "true")
            .append_pair("gravity", "center")
            .append_pair("resize", &format!("{dims}^"))
            .append_pair("crop", &format!("{dims}+0+0"))
            .finish()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` and return its key.
    async fn put(&self, data: Bytes, content_type: &str) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Returns whether anything was deleted.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// URL of a rendition of the blob at `key`.
    fn variant_url(&self, key: &str, variant: Variant) -> String;
}

pub type DynBlobStore = Arc<dyn BlobStore>;

/// Stores blobs as files in one directory, served under `public_prefix`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let single_file = relative.components().count() == 1
            && matches!(relative.components().next(), Some(Component::Normal(_)));
        if key.is_empty() || !single_file {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, data: Bytes, content_type: &str) -> Result<String, StorageError> {
        let extension = mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        let key = format!("{}.{}", uuid::Uuid::now_v7(), extension);

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(&key)?, &data).await?;

        tracing::debug!(key = %key, bytes = data.len(), "Blob stored");
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn variant_url(&self, key: &str, variant: Variant) -> String {
        format!("{}/{}?{}", self.public_prefix, key, variant.query())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_variant_query() {
        assert_eq!(
            Variant::square(80).query(),
            "auto_orient=true&gravity=center&resize=80x80%5E&crop=80x80%2B0%2B0"
        );
    }

    #[test]
    fn banner_variant_is_twice_as_wide() {
        assert_eq!(
            Variant::banner(200),
            Variant {
                width: 400,
                height: 200
            }
        );
    }

    #[test]
    fn variant_url_uses_public_prefix() {
        let store = LocalBlobStore::new("/tmp/unused", "/uploads/");
        let url = store.variant_url("abc.png", Variant::square(40));
        assert!(url.starts_with("/uploads/abc.png?"));
        assert!(url.contains("resize=40x40"));
    }

    #[tokio::test]
    async fn put_get_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path().join("blobs"), "/uploads");

        let key = store
            .put(Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        assert!(key.ends_with(".png"));
        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(Bytes::from_static(b"\x89PNG"))
        );

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_cannot_escape_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path(), "/uploads");

        assert!(matches!(
            store.get("../secret").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("a/b.png").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
