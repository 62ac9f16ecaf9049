//! Track descriptor — immutable metadata about a single track.

use serde::{Deserialize, Serialize};

/// The provider that recognized and extracted a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Youtube,
    Catbox,
    Netease,
    Bilibili,
    Soundcloud,
    Generic,
}

impl SourceTag {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Catbox => "catbox",
            Self::Netease => "netease",
            Self::Bilibili => "bilibili",
            Self::Soundcloud => "soundcloud",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable metadata about a single track, constructed exactly once per
/// request, at admission time, by the provider that recognized the URL.
///
/// `canonical_url` is a permanent, re-resolvable reference for catalog
/// sources (netease/youtube/bilibili) — never a transient CDN link. For
/// direct-file sources it equals the file URL itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub title: String,
    pub duration_ms: u64,
    pub canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub source_tag: SourceTag,
}
