//! YouTube provider — `youtube.com/watch?v=...`, `youtu.be/...`.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use rusty_ytdl::{Video, VideoOptions, VideoQuality, VideoSearchOptions};

use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

use super::traits::MediaProvider;

fn match_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://(?:www\.)?(?:youtube\.com/watch\?.*v=|youtu\.be/)")
            .expect("static regex is valid")
    })
}

pub struct YoutubeProvider;

impl YoutubeProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for YoutubeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for YoutubeProvider {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn source_tag(&self) -> SourceTag {
        SourceTag::Youtube
    }

    fn matches(&self, url: &str) -> bool {
        match_re().is_match(url)
    }

    async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
        let video = Video::new(url).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let info = video
            .get_basic_info()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let details = info.video_details;
        let duration_ms: u64 = details
            .length_seconds
            .parse::<u64>()
            .unwrap_or(0)
            .saturating_mul(1000);

        Ok(TrackDescriptor {
            title: details.title,
            duration_ms,
            canonical_url: format!("https://www.youtube.com/watch?v={}", details.video_id),
            uploader: details.author.map(|a| a.name),
            thumbnail_url: details.thumbnails.last().map(|t| t.url.clone()),
            source_tag: SourceTag::Youtube,
        })
    }

    async fn resolve_playable(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<String, ProviderError> {
        let options = VideoOptions {
            quality: VideoQuality::Lowest,
            filter: VideoSearchOptions::Audio,
            ..Default::default()
        };
        let video = Video::new_with_options(&descriptor.canonical_url, options)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let info = video
            .get_info()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        info.formats
            .first()
            .map(|f| f.url.clone())
            .ok_or(ProviderError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_watch_urls() {
        let p = YoutubeProvider::new();
        assert!(p.matches("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(p.matches("https://youtu.be/dQw4w9WgXcQ"));
        assert!(!p.matches("https://example.com/watch?v=dQw4w9WgXcQ"));
    }
}
