//! Generic direct-audio provider — any http(s) URL ending in a recognized
//! audio extension. Lowest priority: only reached when no more
//! specific provider matched.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

use super::traits::MediaProvider;

const EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac", "aac", "opus", "wma"];

fn match_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = EXTENSIONS.join("|");
        Regex::new(&format!(r"(?i)^https?://.+\.({alternation})(?:\?.*)?$"))
            .expect("static regex is valid")
    })
}

fn filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/([^/?#]+)(?:\?.*)?$").expect("static regex is valid"))
}

pub struct GenericProvider {
    client: Client,
}

impl GenericProvider {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("generic http client builds");
        Self { client }
    }
}

impl Default for GenericProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for GenericProvider {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn source_tag(&self) -> SourceTag {
        SourceTag::Generic
    }

    fn matches(&self, url: &str) -> bool {
        match_re().is_match(url)
    }

    async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::NotFound);
        }

        let filename = filename_re()
            .captures(url)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| url.to_string());

        Ok(TrackDescriptor {
            title: filename,
            duration_ms: 0,
            canonical_url: url.to_string(),
            uploader: None,
            thumbnail_url: None,
            source_tag: SourceTag::Generic,
        })
    }

    async fn resolve_playable(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<String, ProviderError> {
        Ok(descriptor.canonical_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_audio_extensions() {
        let p = GenericProvider::new();
        assert!(p.matches("https://example.com/track.mp3"));
        assert!(p.matches("https://example.com/track.flac?x=1"));
        assert!(!p.matches("https://example.com/track.mp4"));
        assert!(!p.matches("ftp://example.com/track.mp3"));
    }
}
