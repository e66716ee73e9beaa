use super::config::ApiKeyConfig;
use super::rate_limiter::RateLimiter;
use super::types::*;
use async_trait::async_trait;
use cadenza_core::ServiceResult;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::enrichment::providers::BiographyProvider;

/// Last.fm API client
pub struct LastFmClient {
    config: ApiKeyConfig,
    rate_limiter: Arc<RateLimiter>,
    http_client: reqwest::Client,
    base_url: String,
}

impl LastFmClient {
    /// Create a new Last.fm API client from the environment
    pub fn new() -> Self {
        Self::with_config(ApiKeyConfig::load())
    }

    pub fn with_config(config: ApiKeyConfig) -> Self {
        Self {
            config,
            rate_limiter: Arc::new(RateLimiter::new()),
            http_client: reqwest::Client::new(),
            base_url: "https://ws.audioscrobbler.com/2.0/".to_string(),
        }
    }

    /// Check if API is properly configured
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Make an unauthenticated Last.fm API call
    ///
    /// # Arguments
    /// * `method` - Last.fm API method name (e.g., "artist.getInfo")
    /// * `params` - Parameters to send (excluding method, api_key, format)
    pub async fn api_call(
        &self,
        method: &str,
        params: BTreeMap<String, String>,
    ) -> Result<serde_json::Value, LastFmError> {
        let Some(api_key) = self.config.api_key() else {
            return Err(LastFmError::NotConfigured);
        };

        // Wait for rate limiting
        self.rate_limiter.wait_if_needed().await;

        let mut all_params = params;
        all_params.insert("method".to_string(), method.to_string());
        all_params.insert("api_key".to_string(), api_key.to_string());
        all_params.insert("format".to_string(), "json".to_string());

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&all_params)
            .send()
            .await
            .map_err(|e| LastFmError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LastFmError::NetworkError(e.to_string()))?;

        parse_response(status, &body)
    }

    /// Fetch an artist's biography via `artist.getInfo`
    pub async fn get_artist_bio(&self, artist: &str) -> Result<Option<String>, LastFmError> {
        let mut params = BTreeMap::new();
        params.insert("artist".to_string(), artist.to_string());
        params.insert("autocorrect".to_string(), "1".to_string());

        let response = self.api_call("artist.getInfo", params).await?;

        let info: ArtistInfoResponse = serde_json::from_value(response)
            .map_err(|e| LastFmError::ParseError(e.to_string()))?;

        Ok(info.artist.bio.and_then(|bio| bio.text()))
    }
}

impl Default for LastFmClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn an HTTP response into JSON or a typed error
fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<serde_json::Value, LastFmError> {
    let json = serde_json::from_str::<serde_json::Value>(body);

    // Last.fm reports API errors as JSON, often with a 4xx status
    if let Ok(Ok(error)) = json.as_ref().map(ErrorResponse::deserialize) {
        return Err(match error.error {
            6 => LastFmError::NotFound,
            11 | 16 => LastFmError::ServiceOffline,
            26 => LastFmError::Suspended,
            29 => LastFmError::RateLimitExceeded,
            code => LastFmError::ApiError(code, error.message),
        });
    }

    if !status.is_success() {
        return Err(LastFmError::HttpError(status.as_u16(), body.to_string()));
    }

    json.map_err(|e| LastFmError::ParseError(e.to_string()))
}

#[async_trait]
impl BiographyProvider for LastFmClient {
    async fn fetch_biography(&self, artist_name: &str) -> ServiceResult<String> {
        match self.get_artist_bio(artist_name).await {
            Ok(Some(bio)) => ServiceResult::Found(bio),
            Ok(None) => ServiceResult::NotFound,
            Err(e) => {
                debug!(artist = artist_name, error = %e, "Last.fm lookup failed");
                e.into_service_result()
            }
        }
    }
}

/// Last.fm API error types
#[derive(Debug, thiserror::Error)]
pub enum LastFmError {
    #[error("Last.fm API not configured (missing API key)")]
    NotConfigured,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Artist not found")]
    NotFound,

    #[error("Last.fm service is offline")]
    ServiceOffline,

    #[error("Account suspended")]
    Suspended,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Last.fm API error {0}: {1}")]
    ApiError(u32, String),

    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),
}

impl LastFmError {
    /// Classify for the enrichment loop: transient failures retry later
    pub fn into_service_result<T>(self) -> ServiceResult<T> {
        match self {
            LastFmError::NotFound => ServiceResult::NotFound,
            LastFmError::NotConfigured
            | LastFmError::NetworkError(_)
            | LastFmError::ServiceOffline
            | LastFmError::RateLimitExceeded => ServiceResult::TemporaryError(self.to_string()),
            LastFmError::HttpError(status, _) if status == 429 || status >= 500 => {
                ServiceResult::TemporaryError(self.to_string())
            }
            LastFmError::ParseError(_)
            | LastFmError::Suspended
            | LastFmError::ApiError(..)
            | LastFmError::HttpError(..) => ServiceResult::PermanentError(self.to_string()),
        }
    }
}
