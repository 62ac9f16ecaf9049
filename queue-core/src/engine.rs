//! Engine Facade — the public surface orchestrating every other component.
//!
//! `submit` is the only place the full admission pipeline runs end to
//! end: extract a descriptor, check fairness, enqueue, notify the
//! tracker, then make sure a pump is running for the guild. Everything
//! else (`skip`, `stop`, `status`) is a thin pass-through to the owning
//! component.

use std::sync::Arc;

use tracing::{info_span, Instrument};

use crate::config::{Config, QueueConfig};
use crate::error::{EngineError, ProviderError};
use crate::models::{GuildId, QueueEntry, TrackDescriptor, UserId};
use crate::persistence::PersistenceStore;
use crate::provider::ProviderRegistry;
use crate::pump::PlaybackPump;
use crate::queue_manager::{QueueManager, QueueStatus};
use crate::voice::VoiceSessionManager;

/// Outcome of a successful `submit`.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub position: usize,
    pub descriptor: TrackDescriptor,
}

pub struct Engine {
    config: QueueConfig,
    providers: Arc<ProviderRegistry>,
    queue: Arc<QueueManager>,
    voice: Arc<VoiceSessionManager>,
    persistence: Arc<PersistenceStore>,
    pump: Arc<PlaybackPump>,
}

impl Engine {
    #[must_use]
    pub fn new(
        config: Config,
        providers: ProviderRegistry,
        voice: VoiceSessionManager,
    ) -> Self {
        let persistence = Arc::new(PersistenceStore::new(config.persistence.data_dir.clone()));
        let providers = Arc::new(providers);
        let voice = Arc::new(voice);
        let queue = Arc::new(QueueManager::new(persistence.clone(), config.queue.clone()));
        let pump = Arc::new(PlaybackPump::new(
            queue.clone(),
            providers.clone(),
            voice.clone(),
            config.queue.clone(),
        ));

        Self {
            config: config.queue,
            providers,
            queue,
            voice,
            persistence,
            pump,
        }
    }

    /// Ensure the data directory exists and rehydrate every guild with a
    /// persisted snapshot. Call once before accepting submissions.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.persistence.init().await?;
        for guild_id in self.persistence.list_guilds().await? {
            if let Some(snapshot) = self.persistence.load(&guild_id).await? {
                self.queue.restore(&guild_id, snapshot)?;
                if self.queue.status(&guild_id).current.is_some()
                    || self.queue.status(&guild_id).pending_count > 0
                {
                    self.pump.ensure_running(&guild_id);
                }
            }
        }
        Ok(())
    }

    /// Extract, admit, enqueue, and start the pump if needed.
    pub async fn submit(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        requester_display: String,
        url: &str,
    ) -> Result<SubmitOutcome, EngineError> {
        async {
            let descriptor = self.providers.extract(url).await?;
            if descriptor.duration_ms > self.config.max_track_duration_seconds * 1000 {
                return Err(EngineError::Provider(ProviderError::TrackTooLong));
            }

            let entry = QueueEntry::new(
                descriptor.clone(),
                user_id.clone(),
                requester_display,
                guild_id.clone(),
            );
            let position = self.queue.enqueue(guild_id, user_id, entry).await?;
            self.pump.ensure_running(guild_id);

            Ok(SubmitOutcome {
                position,
                descriptor,
            })
        }
        .instrument(info_span!("guild", guild_id = %guild_id))
        .await
    }

    /// Skip the currently playing track, if any.
    pub fn skip(&self, guild_id: &GuildId) -> Result<(), EngineError> {
        if self.queue.status(guild_id).current.is_none() {
            return Err(EngineError::NotPlaying);
        }
        self.pump.skip(guild_id);
        Ok(())
    }

    /// Stop playback and clear the guild's queue entirely.
    pub async fn stop(&self, guild_id: &GuildId) -> Result<(), EngineError> {
        self.pump.stop(guild_id);
        self.queue.stop(guild_id).await
    }

    /// Remove a single pending entry by its 1-based position.
    pub async fn remove_at(&self, guild_id: &GuildId, pos: usize) -> Result<(), EngineError> {
        self.queue.remove_at(guild_id, pos).await
    }

    /// Drop all pending entries, keeping whatever is currently playing.
    pub async fn clear(&self, guild_id: &GuildId) -> Result<(), EngineError> {
        self.queue.clear(guild_id).await
    }

    #[must_use]
    pub fn status(&self, guild_id: &GuildId) -> QueueStatus {
        self.queue.status(guild_id)
    }

    /// A user-scoped view: how many of their own entries are pending or
    /// currently playing.
    #[must_use]
    pub fn my_pending_count(&self, guild_id: &GuildId, user_id: &UserId) -> usize {
        self.queue.pending_for_user(guild_id, user_id)
    }

    pub async fn attach_voice(&self, guild_id: &GuildId, channel_handle: &str) -> Result<(), EngineError> {
        self.voice
            .attach(guild_id, channel_handle)
            .await
            .map_err(EngineError::Provider)
    }

    pub async fn detach_voice(&self, guild_id: &GuildId) {
        self.voice.detach(guild_id).await;
    }

    /// Snapshot every known guild, stop all pumps, and detach all voice
    /// sessions. Called once during graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.pump.shutdown().await;
        for guild_id in self.queue.known_guilds() {
            self.voice.detach(&guild_id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::provider::{MediaProvider, ProviderRegistry as Registry};
    use crate::voice::FakeVoiceTransport;
    use async_trait::async_trait;
    use std::sync::Arc as StdArc;

    struct MockProvider;

    #[async_trait]
    impl MediaProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }
        fn source_tag(&self) -> crate::models::SourceTag {
            crate::models::SourceTag::Generic
        }
        fn matches(&self, _url: &str) -> bool {
            true
        }
        async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
            Ok(TrackDescriptor {
                title: "Mock Track".to_string(),
                duration_ms: 1000,
                canonical_url: url.to_string(),
                uploader: None,
                thumbnail_url: None,
                source_tag: crate::models::SourceTag::Generic,
            })
        }
        async fn resolve_playable(&self, d: &TrackDescriptor) -> Result<String, ProviderError> {
            Ok(d.canonical_url.clone())
        }
    }

    async fn test_engine() -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.persistence.data_dir = dir.path().to_string_lossy().to_string();

        let mut registry = Registry::new();
        registry.register(StdArc::new(MockProvider));

        let transport = StdArc::new(FakeVoiceTransport::new());
        let voice = VoiceSessionManager::new(transport);

        let engine = Engine::new(config, registry, voice);
        engine.start().await.unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn submit_enqueues_and_starts_pump() {
        let (engine, _dir) = test_engine().await;
        let guild = GuildId::from("g1");
        let user = UserId::from("u1");
        let outcome = engine
            .submit(&guild, &user, "Alice".to_string(), "https://example.com/a")
            .await
            .unwrap();
        assert_eq!(outcome.position, 1);
    }

    #[tokio::test]
    async fn skip_without_current_is_not_playing() {
        let (engine, _dir) = test_engine().await;
        let guild = GuildId::from("g1");
        assert!(matches!(engine.skip(&guild), Err(EngineError::NotPlaying)));
    }

    #[tokio::test]
    async fn stop_clears_status() {
        let (engine, _dir) = test_engine().await;
        let guild = GuildId::from("g1");
        let user = UserId::from("u1");
        engine
            .submit(&guild, &user, "Alice".to_string(), "https://example.com/a")
            .await
            .unwrap();
        engine.stop(&guild).await.unwrap();
        let status = engine.status(&guild);
        assert_eq!(status.pending_count, 0);
    }
}
