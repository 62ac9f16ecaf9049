//! NetEase Cloud Music provider — any host under `music.163.com` or
//! `music.126.net` with `id=` in path/query.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::config::NeteaseConfig;
use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

use super::traits::MediaProvider;

fn host_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://[^/]*\.?(music\.163\.com|music\.126\.net)[/?].*[?&]?id=")
            .expect("static regex is valid")
    })
}

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]id=(\d+)").expect("static regex is valid"))
}

#[derive(Debug, Deserialize)]
struct DetailResp {
    songs: Vec<SongDetail>,
}

#[derive(Debug, Deserialize)]
struct SongDetail {
    name: String,
    dt: u64,
    al: Album,
    ar: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(rename = "picUrl")]
    pic_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayUrlResp {
    data: Vec<PlayUrlItem>,
}

#[derive(Debug, Deserialize)]
struct PlayUrlItem {
    url: Option<String>,
    code: i32,
}

pub struct NeteaseProvider {
    client: Client,
    config: NeteaseConfig,
}

impl NeteaseProvider {
    #[must_use]
    pub fn new(config: NeteaseConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("netease http client builds");
        Self { client, config }
    }

    fn song_id(url: &str) -> Option<String> {
        id_re().captures(url).map(|c| c[1].to_string())
    }

    /// Apply the configured host/protocol overrides for the proxy.
    fn base_url(&self) -> String {
        let protocol = self.config.proxy_protocol.as_deref().unwrap_or("https");
        let host = self.config.proxy_host.as_deref().unwrap_or("music.163.com");
        format!("{protocol}://{host}")
    }

    fn with_cookie(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.member_cookie {
            Some(cookie) => builder.header("Cookie", cookie.clone()),
            None => builder,
        }
    }
}

#[async_trait]
impl MediaProvider for NeteaseProvider {
    fn name(&self) -> &'static str {
        "netease"
    }

    fn source_tag(&self) -> SourceTag {
        SourceTag::Netease
    }

    fn matches(&self, url: &str) -> bool {
        host_re().is_match(url)
    }

    async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
        let id = Self::song_id(url).ok_or(ProviderError::Malformed(url.to_string()))?;
        let endpoint = format!("{}/api/song/detail", self.base_url());
        let ids = format!("[{id}]");

        let resp = self
            .with_cookie(self.client.get(&endpoint).query(&[("ids", ids.as_str())]))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let body: DetailResp = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let song = body.songs.into_iter().next().ok_or(ProviderError::NotFound)?;

        Ok(TrackDescriptor {
            title: song.name,
            duration_ms: song.dt,
            // Permanent, re-resolvable reference — never the CDN URL.
            canonical_url: format!("https://music.163.com/song?id={id}"),
            uploader: song.ar.first().map(|a| a.name.clone()),
            thumbnail_url: song.al.pic_url,
            source_tag: SourceTag::Netease,
        })
    }

    async fn resolve_playable(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<String, ProviderError> {
        let id = Self::song_id(&descriptor.canonical_url)
            .ok_or(ProviderError::Malformed(descriptor.canonical_url.clone()))?;
        let endpoint = format!("{}/api/song/enhance/player/url", self.base_url());

        let resp = self
            .with_cookie(
                self.client
                    .get(&endpoint)
                    .query(&[("id", id.as_str()), ("br", "320000")]),
            )
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let body: PlayUrlResp = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let item = body.data.into_iter().next().ok_or(ProviderError::NotFound)?;

        if item.code == 401 {
            return Err(ProviderError::DrmBlocked);
        }
        item.url.ok_or(ProviderError::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_163_and_126_hosts_with_id_param() {
        let p = NeteaseProvider::new(NeteaseConfig::default());
        assert!(p.matches("https://music.163.com/song?id=1901371647"));
        assert!(p.matches("https://music.163.com/#/song?id=1901371647"));
        assert!(!p.matches("https://music.163.com/song/artist"));
    }

    #[test]
    fn extracts_numeric_song_id() {
        assert_eq!(
            NeteaseProvider::song_id("https://music.163.com/song?id=1901371647"),
            Some("1901371647".to_string())
        );
    }

    #[test]
    fn proxy_host_override_changes_base_url() {
        let cfg = NeteaseConfig {
            proxy_host: Some("mirror.example.com".to_string()),
            proxy_protocol: Some("http".to_string()),
            member_cookie: None,
        };
        let p = NeteaseProvider::new(cfg);
        assert_eq!(p.base_url(), "http://mirror.example.com");
    }
}
