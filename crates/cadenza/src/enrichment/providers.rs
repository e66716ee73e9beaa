//! Remote metadata sources consulted by the enrichment loop.

use async_trait::async_trait;
use cadenza_core::ServiceResult;
use std::time::Duration;

use crate::enrichment::images::ImageFetchError;

/// Looks up an artist biography by name
#[async_trait]
pub trait BiographyProvider: Send + Sync {
    async fn fetch_biography(&self, artist_name: &str) -> ServiceResult<String>;
}

/// Looks up an artist image URL by name
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn fetch_image_url(&self, artist_name: &str) -> ServiceResult<String>;
}

/// Downloads image bytes
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageFetchError>;
}

/// Provider used when no source is configured; never stamps an artist
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl BiographyProvider for Unconfigured {
    async fn fetch_biography(&self, _artist_name: &str) -> ServiceResult<String> {
        ServiceResult::TemporaryError("no biography source configured".into())
    }
}

#[async_trait]
impl ImageProvider for Unconfigured {
    async fn fetch_image_url(&self, _artist_name: &str) -> ServiceResult<String> {
        ServiceResult::TemporaryError("no image source configured".into())
    }
}

/// Image downloader over HTTP
#[derive(Debug, Clone)]
pub struct HttpImageDownloader {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpImageDownloader {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            timeout: Duration::from_secs(20),
        }
    }
}

impl Default for HttpImageDownloader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageFetchError> {
        let response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ImageFetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageFetchError::Http(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageFetchError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Map an HTTP status onto the provider result taxonomy
pub(crate) fn classify_status<T>(status: reqwest::StatusCode) -> Option<ServiceResult<T>> {
    if status.is_success() {
        None
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(ServiceResult::TemporaryError(format!("http {}", status)))
    } else {
        Some(ServiceResult::PermanentError(format!("http {}", status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn test_unconfigured_is_inconclusive() {
        assert!(Unconfigured.fetch_biography("Anyone").await.is_inconclusive());
        assert!(Unconfigured.fetch_image_url("Anyone").await.is_inconclusive());
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status::<()>(StatusCode::OK).is_none());
        assert!(matches!(
            classify_status::<()>(StatusCode::TOO_MANY_REQUESTS),
            Some(ServiceResult::TemporaryError(_))
        ));
        assert!(matches!(
            classify_status::<()>(StatusCode::BAD_GATEWAY),
            Some(ServiceResult::TemporaryError(_))
        ));
        assert!(matches!(
            classify_status::<()>(StatusCode::FORBIDDEN),
            Some(ServiceResult::PermanentError(_))
        ));
    }
}
