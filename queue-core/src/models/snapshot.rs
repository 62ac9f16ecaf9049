//! Persisted snapshot — the on-disk schema for a guild's queue.
//!
//! Schema-versioned; `SCHEMA_VERSION` must bump whenever the identity
//! derivation rules in `models::identity` change, since tracker state
//! reconstructed from a snapshot depends on them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::id::{GuildId, UserId};
use super::queue_entry::QueueEntry;
use super::track::{SourceTag, TrackDescriptor};

pub const SCHEMA_VERSION: u32 = 1;

/// A single queue entry as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    pub title: String,
    pub duration_ms: u64,
    pub canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    pub source_tag: SourceTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub requester_id: String,
    pub requester_display: String,
    pub enqueued_at_ms: i64,
}

impl From<&QueueEntry> for EntryRecord {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            title: entry.descriptor.title.clone(),
            duration_ms: entry.descriptor.duration_ms,
            canonical_url: entry.descriptor.canonical_url.clone(),
            uploader: entry.descriptor.uploader.clone(),
            source_tag: entry.descriptor.source_tag,
            thumbnail_url: entry.descriptor.thumbnail_url.clone(),
            requester_id: entry.requester_id.0.clone(),
            requester_display: entry.requester_display.clone(),
            enqueued_at_ms: entry.enqueued_at_wall.timestamp_millis(),
        }
    }
}

impl EntryRecord {
    /// Rehydrate a `QueueEntry`, assigning a fresh monotonic timestamp
    /// since `Instant` cannot be round-tripped across a process restart.
    #[must_use]
    pub fn into_entry(self, guild_id: GuildId) -> QueueEntry {
        let wall: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.enqueued_at_ms)
            .single()
            .unwrap_or_else(Utc::now);
        QueueEntry {
            descriptor: TrackDescriptor {
                title: self.title,
                duration_ms: self.duration_ms,
                canonical_url: self.canonical_url,
                uploader: self.uploader,
                thumbnail_url: self.thumbnail_url,
                source_tag: self.source_tag,
            },
            requester_id: UserId(self.requester_id),
            requester_display: self.requester_display,
            guild_id,
            enqueued_at_wall: wall,
            enqueued_at_monotonic: Instant::now(),
        }
    }
}

/// Self-contained per-guild document written on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub schema: u32,
    pub guild_id: String,
    #[serde(default)]
    pub current: Option<EntryRecord>,
    #[serde(default)]
    pub pending: Vec<EntryRecord>,
}

impl GuildSnapshot {
    #[must_use]
    pub fn empty(guild_id: &GuildId) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            guild_id: guild_id.0.clone(),
            current: None,
            pending: Vec::new(),
        }
    }
}
