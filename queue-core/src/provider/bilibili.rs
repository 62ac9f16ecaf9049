//! Bilibili provider — `bilibili.com/video/BV...` or `.../av...`.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

use super::traits::MediaProvider;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://www.bilibili.com";

fn match_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)bilibili\.com/video/(BV[0-9A-Za-z]+|av\d+)").expect("static regex is valid")
    })
}

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/video/(BV[0-9A-Za-z]+|av\d+)").expect("static regex is valid")
    })
}

#[derive(Debug, Deserialize)]
struct ViewResp {
    code: i32,
    data: Option<ViewData>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    bvid: String,
    title: String,
    pic: String,
    duration: u64,
    cid: u64,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayUrlResp {
    code: i32,
    data: Option<PlayUrlData>,
}

#[derive(Debug, Deserialize)]
struct PlayUrlData {
    durl: Vec<Durl>,
}

#[derive(Debug, Deserialize)]
struct Durl {
    url: String,
}

pub struct BilibiliProvider {
    client: Client,
}

impl BilibiliProvider {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .expect("bilibili http client builds");
        Self { client }
    }

    fn video_id(url: &str) -> Option<String> {
        id_re().captures(url).map(|c| c[1].to_string())
    }
}

impl Default for BilibiliProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for BilibiliProvider {
    fn name(&self) -> &'static str {
        "bilibili"
    }

    fn source_tag(&self) -> SourceTag {
        SourceTag::Bilibili
    }

    fn matches(&self, url: &str) -> bool {
        match_re().is_match(url)
    }

    async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
        let id = Self::video_id(url).ok_or(ProviderError::Malformed(url.to_string()))?;
        let query = if let Some(bvid) = id.strip_prefix("BV").map(|_| id.as_str()) {
            vec![("bvid", bvid.to_string())]
        } else {
            vec![("aid", id.trim_start_matches("av").to_string())]
        };

        let resp = self
            .client
            .get("https://api.bilibili.com/x/web-interface/view")
            .query(&query)
            .header("Referer", REFERER)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        let body: ViewResp = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if body.code != 0 {
            return Err(ProviderError::NotFound);
        }
        let data = body.data.ok_or(ProviderError::NotFound)?;

        Ok(TrackDescriptor {
            title: data.title,
            duration_ms: data.duration.saturating_mul(1000),
            canonical_url: format!("https://www.bilibili.com/video/{}", data.bvid),
            uploader: Some(data.owner.name),
            thumbnail_url: Some(data.pic),
            source_tag: SourceTag::Bilibili,
        })
    }

    async fn resolve_playable(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<String, ProviderError> {
        let id = Self::video_id(&descriptor.canonical_url)
            .ok_or(ProviderError::Malformed(descriptor.canonical_url.clone()))?;

        // cid must be re-fetched: it is not part of the canonical URL.
        let view_resp = self
            .client
            .get("https://api.bilibili.com/x/web-interface/view")
            .query(&[("bvid", id.as_str())])
            .header("Referer", REFERER)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        let view: ViewResp = view_resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let cid = view.data.ok_or(ProviderError::NotFound)?.cid;

        let resp = self
            .client
            .get("https://api.bilibili.com/x/player/playurl")
            .query(&[
                ("bvid", id.as_str()),
                ("cid", &cid.to_string()),
                ("fnval", "16"),
            ])
            .header("Referer", REFERER)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status().as_u16() == 403 {
            return Err(ProviderError::GeoBlocked);
        }
        let body: PlayUrlResp = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        if body.code != 0 {
            return Err(ProviderError::Expired);
        }
        body.data
            .and_then(|d| d.durl.into_iter().next())
            .map(|d| d.url)
            .ok_or(ProviderError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_bv_and_av_urls() {
        let p = BilibiliProvider::new();
        assert!(p.matches("https://www.bilibili.com/video/BV1GJ411x7h7"));
        assert!(p.matches("https://www.bilibili.com/video/av170001"));
        assert!(!p.matches("https://www.youtube.com/watch?v=x"));
    }

    #[test]
    fn extracts_bv_id() {
        assert_eq!(
            BilibiliProvider::video_id("https://www.bilibili.com/video/BV1GJ411x7h7?p=1"),
            Some("BV1GJ411x7h7".to_string())
        );
    }
}
