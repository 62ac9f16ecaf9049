//! Queue Entry — a Track Descriptor plus requester and timing metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::id::{GuildId, UserId};
use super::track::TrackDescriptor;

/// One submission sitting in a guild's `pending` list or `current` slot.
///
/// Two entries may carry the same `TrackIdentityKey` (same song) while
/// remaining distinguishable entries, because they were requested by
/// different users.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub descriptor: TrackDescriptor,
    pub requester_id: UserId,
    pub requester_display: String,
    pub guild_id: GuildId,
    pub enqueued_at_wall: DateTime<Utc>,
    pub enqueued_at_monotonic: Instant,
}

impl QueueEntry {
    #[must_use]
    pub fn new(
        descriptor: TrackDescriptor,
        requester_id: UserId,
        requester_display: String,
        guild_id: GuildId,
    ) -> Self {
        Self {
            descriptor,
            requester_id,
            requester_display,
            guild_id,
            enqueued_at_wall: Utc::now(),
            enqueued_at_monotonic: Instant::now(),
        }
    }
}
