//! SoundCloud provider — `soundcloud.com/<user>/<track>`.
//!
//! SoundCloud's public `api-v2` requires an anonymous `client_id` that is
//! embedded in the web app's bundled JS. It is fetched lazily and cached
//! for the process lifetime; a `401` from the API invalidates the cache
//! so the next call re-scrapes a fresh one.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

use super::traits::MediaProvider;

const BASE_URL: &str = "https://api-v2.soundcloud.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn track_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://(?:www\.|m\.)?soundcloud\.com/[a-zA-Z0-9_-]+/[a-zA-Z0-9_-]+/?(?:\?.*)?$")
            .expect("static regex is valid")
    })
}

fn client_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"client_id["=:]+([A-Za-z0-9]{32})"#).expect("static regex is valid"))
}

#[derive(Debug, Deserialize)]
struct Track {
    id: u64,
    title: String,
    duration: u64,
    artwork_url: Option<String>,
    user: TrackUser,
    media: Media,
    permalink_url: String,
}

#[derive(Debug, Deserialize)]
struct TrackUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct Media {
    transcodings: Vec<Transcoding>,
}

#[derive(Debug, Deserialize)]
struct Transcoding {
    url: String,
    format: TranscodingFormat,
}

#[derive(Debug, Deserialize)]
struct TranscodingFormat {
    protocol: String,
}

#[derive(Debug, Deserialize)]
struct StreamResp {
    url: String,
}

struct ClientIdCache {
    value: Mutex<Option<String>>,
}

impl ClientIdCache {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    fn get(&self) -> Option<String> {
        self.value.lock().clone()
    }

    fn set(&self, id: String) {
        *self.value.lock() = Some(id);
    }

    fn invalidate(&self) {
        *self.value.lock() = None;
    }
}

pub struct SoundcloudProvider {
    client: Client,
    client_id: ClientIdCache,
}

impl SoundcloudProvider {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .expect("soundcloud http client builds");
        Self {
            client,
            client_id: ClientIdCache::new(),
        }
    }

    async fn client_id(&self) -> Result<String, ProviderError> {
        if let Some(id) = self.client_id.get() {
            return Ok(id);
        }
        let home = self
            .client
            .get("https://soundcloud.com")
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let id = client_id_re()
            .captures(&home)
            .map(|c| c[1].to_string())
            .ok_or(ProviderError::Malformed("client_id not found".to_string()))?;
        self.client_id.set(id.clone());
        Ok(id)
    }

    async fn resolve_track(&self, url: &str) -> Result<Track, ProviderError> {
        let client_id = self.client_id().await?;
        let resp = self
            .client
            .get(format!("{BASE_URL}/resolve"))
            .query(&[("url", url), ("client_id", client_id.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status().as_u16() == 401 {
            self.client_id.invalidate();
            return Err(ProviderError::Expired);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::NotFound);
        }
        resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

impl Default for SoundcloudProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for SoundcloudProvider {
    fn name(&self) -> &'static str {
        "soundcloud"
    }

    fn source_tag(&self) -> SourceTag {
        SourceTag::Soundcloud
    }

    fn matches(&self, url: &str) -> bool {
        track_url_re().is_match(url)
    }

    async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
        let track = self.resolve_track(url).await?;
        Ok(TrackDescriptor {
            title: track.title,
            duration_ms: track.duration,
            canonical_url: track.permalink_url,
            uploader: Some(track.user.username),
            thumbnail_url: track.artwork_url,
            source_tag: SourceTag::Soundcloud,
        })
    }

    async fn resolve_playable(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<String, ProviderError> {
        let track = self.resolve_track(&descriptor.canonical_url).await?;
        let transcoding = track
            .media
            .transcodings
            .iter()
            .find(|t| t.format.protocol == "progressive")
            .or_else(|| track.media.transcodings.first())
            .ok_or(ProviderError::NotFound)?;

        let client_id = self.client_id().await?;
        let resp = self
            .client
            .get(&transcoding.url)
            .query(&[("client_id", client_id.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let stream: StreamResp = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(stream.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_user_track_urls() {
        let p = SoundcloudProvider::new();
        assert!(p.matches("https://soundcloud.com/artist-name/track-name"));
        assert!(!p.matches("https://soundcloud.com/artist-name"));
        assert!(!p.matches("https://soundcloud.com/artist-name/sets/a-playlist"));
    }
}
