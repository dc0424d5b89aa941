use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AvatarConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned status {0}")]
    Status(u16),

    #[error("Not an image: {0}")]
    NotAnImage(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Image larger than {limit} bytes")]
    TooLarge { limit: u64 },
}

impl FetchError {
    /// Network trouble and server errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(_) => true,
            FetchError::Status(status) => *status >= 500 || *status == 429,
            FetchError::NotAnImage(_) | FetchError::InvalidUrl(_) | FetchError::TooLarge { .. } => {
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub data: Bytes,
    pub content_type: String,
}

/// Downloads profile pictures offered by an identity provider.
#[async_trait]
pub trait AvatarFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

pub type DynAvatarFetcher = Arc<dyn AvatarFetcher>;

#[derive(Clone)]
pub struct HttpAvatarFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpAvatarFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("odinbook/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, max_bytes })
    }

    pub fn from_config(config: &AvatarConfig) -> Result<Self, FetchError> {
        Self::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_bytes,
        )
    }
}

#[async_trait]
impl AvatarFetcher for HttpAvatarFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(FetchError::NotAnImage(content_type));
        }

        let too_large = FetchError::TooLarge {
            limit: self.max_bytes,
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(too_large);
        }

        // The declared length may be missing or wrong
        let mut data = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if (data.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large);
            }
            data.extend_from_slice(&chunk);
        }

        Ok(FetchedImage {
            data: data.freeze(),
            content_type,
        })
    }
}

/// Bounded retries with linear backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AvatarConfig) -> Self {
        Self {
            attempts: config.fetch_attempts.max(1),
            backoff: Duration::from_millis(config.fetch_backoff_ms),
        }
    }
}

/// Ask the provider for its large rendition of the picture at `image_url`.
pub fn large_image_url(image_url: &str) -> Result<String, FetchError> {
    let mut url =
        url::Url::parse(image_url).map_err(|e| FetchError::InvalidUrl(format!("{image_url}: {e}")))?;
    url.query_pairs_mut().append_pair("type", "large");
    Ok(url.into())
}

pub async fn fetch_with_retry(
    fetcher: &dyn AvatarFetcher,
    url: &str,
    policy: &RetryPolicy,
) -> Result<FetchedImage, FetchError> {
    let mut attempt = 1;
    loop {
        match fetcher.fetch(url).await {
            Ok(image) => return Ok(image),
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                tracing::warn!(url = %url, attempt, error = %e, "Avatar fetch failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(url = %url, attempt, error = %e, "Avatar fetch failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given status a fixed number of times, then serves a PNG.
    pub(crate) struct FlakyFetcher {
        pub failures: u32,
        pub status: u16,
        pub calls: AtomicU32,
    }

    impl FlakyFetcher {
        pub(crate) fn new(failures: u32, status: u16) -> Self {
            Self {
                failures,
                status,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl AvatarFetcher for FlakyFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedImage, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Status(self.status));
            }
            Ok(FetchedImage {
                data: Bytes::from_static(b"\x89PNG\r\n"),
                content_type: "image/png".to_string(),
            })
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let fetcher = FlakyFetcher::new(2, 503);
        let image = fetch_with_retry(&fetcher, "https://img.test/a", &policy(3))
            .await
            .unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let fetcher = FlakyFetcher::new(5, 503);
        let result = fetch_with_retry(&fetcher, "https://img.test/a", &policy(3)).await;
        assert!(matches!(result, Err(FetchError::Status(503))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let fetcher = FlakyFetcher::new(5, 404);
        let result = fetch_with_retry(&fetcher, "https://img.test/a", &policy(3)).await;
        assert!(matches!(result, Err(FetchError::Status(404))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn large_image_url_appends_type() {
        assert_eq!(
            large_image_url("https://graph.test/123/picture").unwrap(),
            "https://graph.test/123/picture?type=large"
        );
        assert_eq!(
            large_image_url("https://graph.test/p?id=1").unwrap(),
            "https://graph.test/p?id=1&type=large"
        );
        assert!(large_image_url("not a url").is_err());
    }

    /// Serve `size` bytes of PNG on a local port and return its URL.
    async fn serve_png(size: usize) -> String {
        use axum::http::header;
        use axum::routing::get;

        let app = axum::Router::new().route(
            "/avatar.png",
            get(move || async move { ([(header::CONTENT_TYPE, "image/png")], vec![0u8; size]) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/avatar.png")
    }

    #[tokio::test]
    async fn http_fetcher_accepts_images_within_limit() {
        let url = serve_png(512).await;
        let fetcher = HttpAvatarFetcher::new(Duration::from_secs(5), 1024).unwrap();
        let image = fetcher.fetch(&url).await.unwrap();
        assert_eq!(image.data.len(), 512);
        assert_eq!(image.content_type, "image/png");
    }

    #[tokio::test]
    async fn http_fetcher_rejects_oversized_images() {
        let url = serve_png(4096).await;
        let fetcher = HttpAvatarFetcher::new(Duration::from_secs(5), 1024).unwrap();
        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(FetchError::TooLarge { limit: 1024 })));
        assert!(!result.unwrap_err().is_retryable());
    }

    #[test]
    fn policy_always_tries_once() {
        let config = AvatarConfig {
            fetch_attempts: 0,
            ..AvatarConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).attempts, 1);
    }
}
