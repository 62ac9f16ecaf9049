//! Catbox provider — direct-file audio hosted at `files.catbox.moe/...`.
//!
//! A direct-file source: `canonical_url` equals the file URL and
//! `resolve_playable` returns it unchanged.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

use super::traits::MediaProvider;

fn match_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://files\.catbox\.moe/").expect("static regex is valid")
    })
}

fn filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"files\.catbox\.moe/([^/?#]+)").expect("static regex is valid")
    })
}

pub struct CatboxProvider {
    client: Client,
}

impl CatboxProvider {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("catbox http client builds");
        Self { client }
    }
}

impl Default for CatboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for CatboxProvider {
    fn name(&self) -> &'static str {
        "catbox"
    }

    fn source_tag(&self) -> SourceTag {
        SourceTag::Catbox
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
            // Duration is unknown without decoding the file; left at 0
            // and enforced at playback time via the transport layer.
            duration_ms: 0,
            canonical_url: url.to_string(),
            uploader: None,
            thumbnail_url: None,
            source_tag: SourceTag::Catbox,
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
    fn matches_catbox_file_urls() {
        let p = CatboxProvider::new();
        assert!(p.matches("https://files.catbox.moe/abc123.mp3"));
        assert!(!p.matches("https://catbox.moe/c/abc123"));
    }
}
