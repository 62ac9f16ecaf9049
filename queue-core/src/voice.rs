//! Voice Session Manager — per-guild attach/detach to a voice transport.
//!
//! Owns no queue state; it is a thin, process-wide, internally
//! synchronized registry of per-guild transport handles. The raw
//! bytestream transport implementation is out of scope here — only the
//! seam it plugs into (`VoiceTransport`) is part of this crate, so the
//! engine can be exercised under test with an in-memory fake.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ProviderError;
use crate::models::{GuildId, UserId};

/// Outcome of a stream once it stops running, reported back to the pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Skipped,
    Cancelled,
    TransportExpired,
    TransportError(String),
}

/// Abstracts the raw audio bytestream transport so the engine's
/// concurrency and state machine can be tested without a real voice
/// connection. A real implementation streams `url` into a voice channel
/// and resolves the returned future when playback ends or fails.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn attach(&self, guild_id: &GuildId, channel_handle: &str) -> Result<(), ProviderError>;
    async fn detach(&self, guild_id: &GuildId);
    fn is_attached(&self, guild_id: &GuildId) -> bool;

    /// Whether `user` is currently present on the attached channel.
    /// Returns `false` (unreachable) if nothing is attached.
    fn is_reachable(&self, guild_id: &GuildId, user: &UserId) -> bool;

    /// Start streaming `url` for `guild_id`. Resolves once the stream
    /// stops, for any reason.
    async fn play(&self, guild_id: &GuildId, url: &str) -> PlaybackOutcome;

    /// Interrupt whatever is currently playing for `guild_id`, if
    /// anything, causing its `play` future to resolve with `Cancelled`.
    async fn stop(&self, guild_id: &GuildId);
}

pub struct VoiceSessionManager {
    transport: Arc<dyn VoiceTransport>,
}

impl VoiceSessionManager {
    #[must_use]
    pub fn new(transport: Arc<dyn VoiceTransport>) -> Self {
        Self { transport }
    }

    pub async fn attach(&self, guild_id: &GuildId, channel_handle: &str) -> Result<(), ProviderError> {
        self.transport.attach(guild_id, channel_handle).await
    }

    pub async fn detach(&self, guild_id: &GuildId) {
        self.transport.detach(guild_id).await;
    }

    #[must_use]
    pub fn is_attached(&self, guild_id: &GuildId) -> bool {
        self.transport.is_attached(guild_id)
    }

    #[must_use]
    pub fn is_reachable(&self, guild_id: &GuildId, user: &UserId) -> bool {
        self.transport.is_reachable(guild_id, user)
    }

    pub async fn play(&self, guild_id: &GuildId, url: &str) -> PlaybackOutcome {
        self.transport.play(guild_id, url).await
    }

    pub async fn stop(&self, guild_id: &GuildId) {
        self.transport.stop(guild_id).await;
    }
}

/// In-memory fake transport for tests: attachment is a set of reachable
/// users per guild, and `play` resolves according to a scripted outcome
/// queue so tests can simulate expiry, cancellation, and natural
/// completion deterministically.
pub struct FakeVoiceTransport {
    attached: Mutex<HashMap<GuildId, Vec<UserId>>>,
    scripted_outcomes: Mutex<HashMap<GuildId, Vec<PlaybackOutcome>>>,
    cancel_requested: Mutex<HashMap<GuildId, bool>>,
    /// Guilds whose next `play` call blocks until `stop` wakes it, instead
    /// of resolving immediately. Used to simulate a long-running stream
    /// that a `stop`/`skip` must interrupt.
    block_next_play: Mutex<HashMap<GuildId, bool>>,
    stop_notify: Mutex<HashMap<GuildId, Arc<Notify>>>,
    play_delay: Mutex<Duration>,
    active_plays: Mutex<u32>,
    max_concurrent_plays: Mutex<u32>,
}

impl FakeVoiceTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            attached: Mutex::new(HashMap::new()),
            scripted_outcomes: Mutex::new(HashMap::new()),
            cancel_requested: Mutex::new(HashMap::new()),
            block_next_play: Mutex::new(HashMap::new()),
            stop_notify: Mutex::new(HashMap::new()),
            play_delay: Mutex::new(Duration::ZERO),
            active_plays: Mutex::new(0),
            max_concurrent_plays: Mutex::new(0),
        }
    }

    pub fn set_reachable_users(&self, guild_id: &GuildId, users: Vec<UserId>) {
        self.attached.lock().insert(guild_id.clone(), users);
    }

    /// Queue outcomes to be returned by successive `play` calls for this
    /// guild, in order. When the queue is exhausted, `play` returns
    /// `Completed`.
    pub fn script_outcomes(&self, guild_id: &GuildId, outcomes: Vec<PlaybackOutcome>) {
        self.scripted_outcomes.lock().insert(guild_id.clone(), outcomes);
    }

    /// Make the next `play` call for `guild_id` hang until `stop` is
    /// called for that guild, then resolve with `Cancelled`.
    pub fn block_next_play(&self, guild_id: &GuildId) {
        self.block_next_play.lock().insert(guild_id.clone(), true);
    }

    /// Artificial delay every `play` call sleeps before resolving, used to
    /// open a window in which concurrent plays for the same guild would be
    /// observable if single-flight were ever violated.
    pub fn set_play_delay(&self, delay: Duration) {
        *self.play_delay.lock() = delay;
    }

    /// The largest number of `play` calls ever in flight at once, across
    /// all guilds.
    #[must_use]
    pub fn max_concurrent_plays(&self) -> u32 {
        *self.max_concurrent_plays.lock()
    }
}

impl Default for FakeVoiceTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceTransport for FakeVoiceTransport {
    async fn attach(&self, guild_id: &GuildId, _channel_handle: &str) -> Result<(), ProviderError> {
        self.attached.lock().entry(guild_id.clone()).or_default();
        Ok(())
    }

    async fn detach(&self, guild_id: &GuildId) {
        self.attached.lock().remove(guild_id);
    }

    fn is_attached(&self, guild_id: &GuildId) -> bool {
        self.attached.lock().contains_key(guild_id)
    }

    fn is_reachable(&self, guild_id: &GuildId, user: &UserId) -> bool {
        self.attached
            .lock()
            .get(guild_id)
            .is_some_and(|users| users.contains(user))
    }

    async fn play(&self, guild_id: &GuildId, _url: &str) -> PlaybackOutcome {
        {
            let mut active = self.active_plays.lock();
            *active += 1;
            let mut max = self.max_concurrent_plays.lock();
            if *active > *max {
                *max = *active;
            }
        }
        let outcome = self.play_inner(guild_id).await;
        *self.active_plays.lock() -= 1;
        outcome
    }

    async fn stop(&self, guild_id: &GuildId) {
        self.cancel_requested.lock().insert(guild_id.clone(), true);
        if let Some(notify) = self.stop_notify.lock().get(guild_id) {
            notify.notify_one();
        }
    }
}

impl FakeVoiceTransport {
    async fn play_inner(&self, guild_id: &GuildId) -> PlaybackOutcome {
        if self.block_next_play.lock().remove(guild_id).unwrap_or(false) {
            let notify = self
                .stop_notify
                .lock()
                .entry(guild_id.clone())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone();
            notify.notified().await;
            return PlaybackOutcome::Cancelled;
        }

        if self.cancel_requested.lock().remove(guild_id).unwrap_or(false) {
            return PlaybackOutcome::Cancelled;
        }

        let delay = *self.play_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut scripted = self.scripted_outcomes.lock();
        match scripted.get_mut(guild_id).and_then(|q| {
            if q.is_empty() {
                None
            } else {
                Some(q.remove(0))
            }
        }) {
            Some(outcome) => outcome,
            None => PlaybackOutcome::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_then_detach_round_trips() {
        let transport = FakeVoiceTransport::new();
        let guild = GuildId::from("g1");
        transport.attach(&guild, "chan").await.unwrap();
        assert!(transport.is_attached(&guild));
        transport.detach(&guild).await;
        assert!(!transport.is_attached(&guild));
    }

    #[tokio::test]
    async fn unreachable_when_not_attached() {
        let transport = FakeVoiceTransport::new();
        let guild = GuildId::from("g1");
        let user = UserId::from("u1");
        assert!(!transport.is_reachable(&guild, &user));
    }

    #[tokio::test]
    async fn scripted_outcomes_play_in_order() {
        let transport = FakeVoiceTransport::new();
        let guild = GuildId::from("g1");
        transport.script_outcomes(
            &guild,
            vec![PlaybackOutcome::TransportExpired, PlaybackOutcome::Completed],
        );
        assert_eq!(transport.play(&guild, "u").await, PlaybackOutcome::TransportExpired);
        assert_eq!(transport.play(&guild, "u").await, PlaybackOutcome::Completed);
        assert_eq!(transport.play(&guild, "u").await, PlaybackOutcome::Completed);
    }
}
