//! TheAudioDB artist image lookup.

use async_trait::async_trait;
use cadenza_core::ServiceResult;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::enrichment::providers::{ImageProvider, classify_status};

#[derive(Deserialize)]
struct TheAudioDbArtistResponse {
    artists: Option<Vec<TheAudioDbArtist>>,
}

#[derive(Deserialize)]
struct TheAudioDbArtist {
    #[serde(rename = "strArtistThumb")]
    thumb: Option<String>,
    #[serde(rename = "strArtistWideThumb")]
    wide_thumb: Option<String>,
    #[serde(rename = "strArtistFanart")]
    fanart: Option<String>,
}

impl TheAudioDbArtist {
    fn image_url(self) -> Option<String> {
        clean_url(self.thumb)
            .or_else(|| clean_url(self.fanart))
            .or_else(|| clean_url(self.wide_thumb))
    }
}

/// Artist image provider backed by TheAudioDB
pub struct TheAudioDbClient {
    api_key: Option<String>,
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TheAudioDbClient {
    /// Client keyed by `THEAUDIODB_API_KEY`
    pub fn new() -> Self {
        Self::with_key(env::var("THEAUDIODB_API_KEY").ok())
    }

    pub fn with_key(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            http_client: reqwest::Client::new(),
            base_url: "https://www.theaudiodb.com/api/v1/json".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for TheAudioDbClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProvider for TheAudioDbClient {
    async fn fetch_image_url(&self, artist_name: &str) -> ServiceResult<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return ServiceResult::TemporaryError("TheAudioDB API key not configured".into());
        };

        let url = format!(
            "{}/{}/search.php?s={}",
            self.base_url,
            api_key,
            url_escape(artist_name)
        );
        let response = match self.http_client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => return ServiceResult::TemporaryError(e.to_string()),
        };
        if let Some(failure) = classify_status(response.status()) {
            debug!(artist = artist_name, status = %response.status(), "TheAudioDB lookup failed");
            return failure;
        }

        match response.json::<TheAudioDbArtistResponse>().await {
            Ok(payload) => pick_image(payload),
            Err(e) => ServiceResult::PermanentError(e.to_string()),
        }
    }
}

fn pick_image(payload: TheAudioDbArtistResponse) -> ServiceResult<String> {
    match payload
        .artists
        .and_then(|artists| artists.into_iter().find_map(TheAudioDbArtist::image_url))
    {
        Some(url) => ServiceResult::Found(url),
        None => ServiceResult::NotFound,
    }
}

fn clean_url(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn url_escape(input: &str) -> String {
    let mut out = String::new();
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
