//! Catalog search boundary
//!
//! [`CatalogSearch`] is the only way the core talks to a music service.
//! [`MusicBrainzSearch`] implements it over the MusicBrainz recording search
//! API (`/ws/2/recording?query=...&fmt=json`).

use crate::error::CatalogError;
use crate::types::CatalogSearchResult;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use spinlist_common::config::CatalogConfig;
use std::time::Duration;

/// External track search
///
/// Implementations perform exactly one attempt per call and classify any
/// failure; retrying and rate limiting belong to the resolver client.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Candidate tracks ordered by the service's own relevance ranking
    async fn search(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogSearchResult>, CatalogError>;
}

const RECORDING_URI_BASE: &str = "https://musicbrainz.org/recording";

/// MusicBrainz recording search response
#[derive(Debug, Deserialize)]
struct MBSearchResponse {
    #[serde(default)]
    recordings: Vec<MBRecording>,
}

#[derive(Debug, Deserialize)]
struct MBRecording {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MBArtistCredit>,
    #[serde(default)]
    releases: Vec<MBRelease>,
}

/// Artist credit; `joinphrase` links it to the next credit (" feat. ", " & ")
#[derive(Debug, Deserialize)]
struct MBArtistCredit {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Debug, Deserialize)]
struct MBRelease {
    title: String,
}

impl MBRecording {
    fn credited_artist(&self) -> String {
        self.artist_credit
            .iter()
            .map(|c| format!("{}{}", c.name, c.joinphrase))
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn into_result(self) -> CatalogSearchResult {
        let artist = self.credited_artist();
        let album = self.releases.into_iter().next().map(|r| r.title);
        CatalogSearchResult {
            artist,
            title: self.title,
            album,
            service_uri: format!("{}/{}", RECORDING_URI_BASE, self.id),
            service_id: self.id,
        }
    }
}

/// MusicBrainz recording search client
pub struct MusicBrainzSearch {
    http_client: reqwest::Client,
    base_url: String,
    result_limit: u32,
}

impl MusicBrainzSearch {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            result_limit: config.result_limit,
        })
    }

    /// Lucene query matching both fields as phrases
    fn build_query(artist: &str, title: &str) -> String {
        format!(
            "artist:\"{}\" AND recording:\"{}\"",
            escape_phrase(artist),
            escape_phrase(title)
        )
    }
}

fn escape_phrase(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Retry-After in delta-seconds form; HTTP-date hints are ignored
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl CatalogSearch for MusicBrainzSearch {
    async fn search(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogSearchResult>, CatalogError> {
        let url = format!("{}/recording", self.base_url);
        let query = Self::build_query(artist, title);
        let limit = self.result_limit.to_string();

        tracing::debug!(
            artist = %artist,
            title = %title,
            url = %url,
            "Querying MusicBrainz search API"
        );

        let response = self
            .http_client
            .get(&url)
            .query(&[("query", query.as_str()), ("fmt", "json"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::TooManyRequests {
                retry_after: parse_retry_after(&response),
            });
        }

        if status.is_server_error() {
            return Err(CatalogError::Server(status.as_u16()));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::Client {
                status: status.as_u16(),
                message,
            });
        }

        let body: MBSearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Malformed(e.to_string()))?;

        let results: Vec<CatalogSearchResult> =
            body.recordings.into_iter().map(MBRecording::into_result).collect();

        tracing::debug!(
            artist = %artist,
            title = %title,
            results = results.len(),
            "MusicBrainz search complete"
        );

        Ok(results)
    }
}
