//! Track identity — deterministic key derivation from a descriptor.
//!
//! The normalization regex and the platform-ID extraction rules are part
//! of the on-disk contract: changing them invalidates tracker state
//! reconstructed from older snapshots, so any change here requires a
//! snapshot schema bump (see `models::snapshot::SCHEMA_VERSION`).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::track::{SourceTag, TrackDescriptor};

/// `(normalized_title, duration_ms, url_key)` — the tuple that defines
/// whether two descriptors refer to "the same track" for fairness purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackIdentityKey {
    pub normalized_title: String,
    pub duration_ms: u64,
    pub url_key: String,
}

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\s*[\(\[\{]\s*(official (audio|video|mv)|lyrics?|hd|4k|remastered|m/?v)\s*[\)\]\}]",
        )
        .expect("static annotation regex is valid")
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace regex is valid"))
}

fn youtube_v_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:[?&]v=|youtu\.be/)([A-Za-z0-9_-]{6,})").expect("static regex is valid")
    })
}

fn bilibili_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/video/(BV[0-9A-Za-z]+|av\d+)").expect("static regex is valid")
    })
}

fn netease_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]id=(\d+)").expect("static regex is valid"))
}

fn catbox_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"files\.catbox\.moe/([^/?#]+)").expect("static regex is valid")
    })
}

/// Lower-case the title after stripping bracketed annotations like
/// `(Official Video)` or `[HD]`, then collapse redundant whitespace.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let stripped = annotation_re().replace_all(title, " ");
    let collapsed = whitespace_re().replace_all(stripped.trim(), " ");
    collapsed.trim().to_lowercase()
}

/// Extract the platform ID used as `url_key`, falling back to the full
/// canonical URL when no platform-specific ID can be found.
#[must_use]
pub fn extract_url_key(source_tag: SourceTag, canonical_url: &str) -> String {
    let found = match source_tag {
        SourceTag::Youtube => youtube_v_param_re()
            .captures(canonical_url)
            .map(|c| c[1].to_string()),
        SourceTag::Bilibili => bilibili_id_re()
            .captures(canonical_url)
            .map(|c| c[1].to_string()),
        SourceTag::Netease => netease_id_re()
            .captures(canonical_url)
            .map(|c| c[1].to_string()),
        SourceTag::Catbox => catbox_filename_re()
            .captures(canonical_url)
            .map(|c| c[1].to_string()),
        SourceTag::Soundcloud | SourceTag::Generic => None,
    };
    found.unwrap_or_else(|| canonical_url.to_string())
}

/// Derive the `TrackIdentityKey` for a descriptor. Pure and deterministic.
#[must_use]
pub fn identity_key(descriptor: &TrackDescriptor) -> TrackIdentityKey {
    TrackIdentityKey {
        normalized_title: normalize_title(&descriptor.title),
        duration_ms: descriptor.duration_ms,
        url_key: extract_url_key(descriptor.source_tag, &descriptor.canonical_url),
    }
}
