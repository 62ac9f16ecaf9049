//! Queue Manager — the authoritative per-guild queue state machine.
//!
//! Owns both the ordered `pending` list and the Fairness & Duplicate
//! Tracker for each guild, guarded by a single per-guild lock so the two
//! never observe each other mid-mutation. Admission (tracker check),
//! insertion, and the tracker's `on_enqueued` hook all happen inside one
//! critical section; the snapshot write that follows happens after the
//! lock is released, since persistence is a suspension point and must
//! never be held across a blocking in-memory mutation.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::QueueConfig;
use crate::error::{EngineError, QueueError};
use crate::models::{
    identity_key, EntryRecord, GuildId, GuildSnapshot, QueueEntry, TrackIdentityKey, UserId,
    SCHEMA_VERSION,
};
use crate::persistence::PersistenceStore;
use crate::tracker::{FairnessMode, Tracker};

/// Per-guild state: the ordered queue plus the tracker that mirrors it.
///
/// `pending` never contains `current`. `revision` increments on every
/// mutating operation and is included in every status view so callers can
/// detect whether a queue changed between two reads.
struct GuildState {
    pending: VecDeque<QueueEntry>,
    current: Option<QueueEntry>,
    revision: u64,
    tracker: Tracker,
}

impl GuildState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            revision: 0,
            tracker: Tracker::new(),
        }
    }

    fn to_snapshot(&self, guild_id: &GuildId) -> GuildSnapshot {
        GuildSnapshot {
            schema: SCHEMA_VERSION,
            guild_id: guild_id.0.clone(),
            current: self.current.as_ref().map(EntryRecord::from),
            pending: self.pending.iter().map(EntryRecord::from).collect(),
        }
    }
}

/// A read-only view of a guild's queue, returned by `status`.
#[derive(Debug, Clone)]
pub struct QueueStatus {
    pub revision: u64,
    pub current: Option<QueueEntry>,
    pub pending_head: Option<QueueEntry>,
    pub pending_count: usize,
    pub total_duration_ms: u64,
}

pub struct QueueManager {
    guilds: DashMap<GuildId, Arc<Mutex<GuildState>>>,
    persistence: Arc<PersistenceStore>,
    config: QueueConfig,
}

impl QueueManager {
    #[must_use]
    pub fn new(persistence: Arc<PersistenceStore>, config: QueueConfig) -> Self {
        Self {
            guilds: DashMap::new(),
            persistence,
            config,
        }
    }

    fn handle(&self, guild_id: &GuildId) -> Arc<Mutex<GuildState>> {
        self.guilds
            .entry(guild_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(GuildState::new())))
            .clone()
    }

    /// Admit `entry` for `user`, running the fairness/duplicate check and
    /// the insertion atomically under the guild lock, then persisting
    /// outside it. Returns the 1-based position in `pending`.
    pub async fn enqueue(
        &self,
        guild_id: &GuildId,
        user: &UserId,
        entry: QueueEntry,
    ) -> Result<usize, EngineError> {
        let handle = self.handle(guild_id);
        let (position, snapshot) = {
            let mut state = handle.lock();
            if state.pending.len() >= self.config.max_queue_length {
                return Err(QueueError::QueueFull.into());
            }

            let key = identity_key(&entry.descriptor);
            let pending_for_user = state
                .pending
                .iter()
                .filter(|e| &e.requester_id == user)
                .count();

            state.tracker.can_admit(
                user,
                &key,
                pending_for_user,
                state.pending.len(),
                self.config.max_pending_per_user,
                self.config.duplicate_threshold_queue_len,
                FairnessMode::from(self.config.fairness_mode),
            )?;

            state.pending.push_back(entry);
            state.tracker.on_enqueued(user, &key);
            state.revision += 1;
            (state.pending.len(), state.to_snapshot(guild_id))
        };
        self.persistence.save(guild_id, &snapshot).await?;
        Ok(position)
    }

    /// Inspect the head of `pending` without mutating anything. Distinct
    /// from `advance`: repeated calls return the same entry and never
    /// change `revision`.
    #[must_use]
    pub fn peek_next(&self, guild_id: &GuildId) -> Option<QueueEntry> {
        let handle = self.handle(guild_id);
        let state = handle.lock();
        state.pending.front().cloned()
    }

    /// Move the head of `pending` into `current`, discarding whatever was
    /// previously `current`. The previous entry's tracker lifecycle is the
    /// caller's responsibility (the pump calls `notify_finished` for it
    /// before calling `advance` again).
    pub async fn advance(&self, guild_id: &GuildId) -> Result<Option<QueueEntry>, EngineError> {
        let handle = self.handle(guild_id);
        let (next, snapshot) = {
            let mut state = handle.lock();
            let next = state.pending.pop_front();
            if let Some(entry) = &next {
                state.tracker.on_start_play(&entry.requester_id);
            }
            state.current = next.clone();
            state.revision += 1;
            (next, state.to_snapshot(guild_id))
        };
        self.persistence.save(guild_id, &snapshot).await?;
        Ok(next)
    }

    /// Discard the current entry. The pump's own completion wait is what
    /// actually fires `on_finished` for it once the interrupted stream
    /// returns, so this does not touch tracker state.
    pub async fn skip_current(&self, guild_id: &GuildId) -> Result<(), EngineError> {
        let handle = self.handle(guild_id);
        let snapshot = {
            let mut state = handle.lock();
            if state.current.is_none() {
                return Ok(());
            }
            state.current = None;
            state.revision += 1;
            state.to_snapshot(guild_id)
        };
        self.persistence.save(guild_id, &snapshot).await?;
        Ok(())
    }

    /// Remove the `pos`-th (1-based) pending entry. Because it never
    /// reaches `current`, the pump will never finalize it, so this call
    /// fires `on_finished` itself.
    pub async fn remove_at(&self, guild_id: &GuildId, pos: usize) -> Result<(), EngineError> {
        let handle = self.handle(guild_id);
        let snapshot = {
            let mut state = handle.lock();
            if pos == 0 || pos > state.pending.len() {
                return Err(QueueError::OutOfRange.into());
            }
            let entry = state
                .pending
                .remove(pos - 1)
                .expect("index already bounds-checked");
            let key = identity_key(&entry.descriptor);
            state.tracker.on_finished(&entry.requester_id, &key);
            state.revision += 1;
            state.to_snapshot(guild_id)
        };
        self.persistence.save(guild_id, &snapshot).await?;
        Ok(())
    }

    /// Drop all pending entries, keeping `current` untouched.
    pub async fn clear(&self, guild_id: &GuildId) -> Result<(), EngineError> {
        let handle = self.handle(guild_id);
        let snapshot = {
            let mut state = handle.lock();
            for entry in state.pending.drain(..).collect::<Vec<_>>() {
                let key = identity_key(&entry.descriptor);
                state.tracker.on_finished(&entry.requester_id, &key);
            }
            state.revision += 1;
            state.to_snapshot(guild_id)
        };
        self.persistence.save(guild_id, &snapshot).await?;
        Ok(())
    }

    /// Drop both `current` and `pending`, leaving the guild empty.
    pub async fn stop(&self, guild_id: &GuildId) -> Result<(), EngineError> {
        let handle = self.handle(guild_id);
        let snapshot = {
            let mut state = handle.lock();
            for entry in state.pending.drain(..).collect::<Vec<_>>() {
                let key = identity_key(&entry.descriptor);
                state.tracker.on_finished(&entry.requester_id, &key);
            }
            state.current = None;
            state.revision += 1;
            state.to_snapshot(guild_id)
        };
        self.persistence.save(guild_id, &snapshot).await?;
        Ok(())
    }

    /// Called by the pump once a track's stream has truly ended (by any
    /// path: natural completion, skip, stop-triggered cancellation, or a
    /// second `expired` resolve). The sole caller of tracker `on_finished`
    /// for entries that made it to `current`.
    pub fn notify_finished(&self, guild_id: &GuildId, requester: &UserId, key: &TrackIdentityKey) {
        let handle = self.handle(guild_id);
        let mut state = handle.lock();
        state.tracker.on_finished(requester, key);
    }

    /// Rehydrate a guild's state from a persisted snapshot, re-emitting
    /// the tracker hooks that would have fired had the entries been
    /// enqueued/started live.
    pub fn restore(&self, guild_id: &GuildId, snapshot: GuildSnapshot) -> Result<(), QueueError> {
        if snapshot.schema != SCHEMA_VERSION {
            return Err(QueueError::SchemaMismatch);
        }
        let handle = self.handle(guild_id);
        let mut state = handle.lock();
        *state = GuildState::new();

        for record in snapshot.pending {
            let entry = record.into_entry(guild_id.clone());
            let key = identity_key(&entry.descriptor);
            state.tracker.on_enqueued(&entry.requester_id, &key);
            state.pending.push_back(entry);
        }
        if let Some(record) = snapshot.current {
            let entry = record.into_entry(guild_id.clone());
            let key = identity_key(&entry.descriptor);
            state.tracker.on_enqueued(&entry.requester_id, &key);
            state.tracker.on_start_play(&entry.requester_id);
            state.current = Some(entry);
        }
        Ok(())
    }

    /// How many of `user`'s entries currently sit in `pending` or
    /// `current` for this guild.
    #[must_use]
    pub fn pending_for_user(&self, guild_id: &GuildId, user: &UserId) -> usize {
        let handle = self.handle(guild_id);
        let state = handle.lock();
        let mut count = state.pending.iter().filter(|e| &e.requester_id == user).count();
        if state.current.as_ref().is_some_and(|e| &e.requester_id == user) {
            count += 1;
        }
        count
    }

    /// An immutable view of a guild's queue: length, total duration,
    /// current track, and the head of `pending`.
    #[must_use]
    pub fn status(&self, guild_id: &GuildId) -> QueueStatus {
        let handle = self.handle(guild_id);
        let state = handle.lock();
        let total_duration_ms = state.pending.iter().map(|e| e.descriptor.duration_ms).sum();
        QueueStatus {
            revision: state.revision,
            current: state.current.clone(),
            pending_head: state.pending.front().cloned(),
            pending_count: state.pending.len(),
            total_duration_ms,
        }
    }

    /// All guild IDs with any in-memory state (used by `shutdown`).
    #[must_use]
    pub fn known_guilds(&self) -> Vec<GuildId> {
        self.guilds.iter().map(|e| e.key().clone()).collect()
    }
}
