//! Playback Pump — the single-flight, one-task-per-guild playback loop.
//!
//! Exactly one pump task runs per guild, spawned lazily on first enqueue
//! and torn down after the queue drains and an idle timer expires.
//! Cancellation (skip, stop) is delivered as a message on the pump's own
//! mailbox rather than a shared flag, so it can never race ahead of or
//! behind an in-flight state change for the same guild.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::config::QueueConfig;
use crate::models::{identity_key, GuildId, QueueEntry};
use crate::provider::ProviderRegistry;
use crate::queue_manager::QueueManager;
use crate::voice::{PlaybackOutcome, VoiceSessionManager};

#[derive(Debug, Clone, Copy)]
pub enum PumpCommand {
    Skip,
    Stop,
    /// Re-check the queue now instead of waiting out the idle timer.
    /// Sent on every enqueue so a pump sitting in the idle wait notices
    /// new work immediately.
    Wake,
}

struct PumpHandle {
    commands: mpsc::UnboundedSender<PumpCommand>,
    task: JoinHandle<()>,
}

/// Owns the set of running per-guild pump tasks.
pub struct PlaybackPump {
    queue: Arc<QueueManager>,
    providers: Arc<ProviderRegistry>,
    voice: Arc<VoiceSessionManager>,
    config: QueueConfig,
    handles: Arc<Mutex<HashMap<GuildId, PumpHandle>>>,
}

impl PlaybackPump {
    #[must_use]
    pub fn new(
        queue: Arc<QueueManager>,
        providers: Arc<ProviderRegistry>,
        voice: Arc<VoiceSessionManager>,
        config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            providers,
            voice,
            config,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a pump task for `guild_id` unless one is already running, and
    /// wake it so freshly enqueued work is noticed whether the pump was
    /// idle, mid-track, or just spawned.
    pub fn ensure_running(&self, guild_id: &GuildId) {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(guild_id) {
            if !handle.task.is_finished() {
                let _ = handle.commands.send(PumpCommand::Wake);
                return;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let queue = self.queue.clone();
        let providers = self.providers.clone();
        let voice = self.voice.clone();
        let idle_detach = Duration::from_secs(self.config.idle_detach_seconds);
        let guild = guild_id.clone();
        let handles_for_exit = self.handles.clone();
        let guild_for_exit = guild_id.clone();

        let task = tokio::spawn(async move {
            run_pump(guild.clone(), queue, providers, voice, idle_detach, rx)
                .instrument(info_span!("guild_pump", guild_id = %guild))
                .await;
            handles_for_exit.lock().remove(&guild_for_exit);
        });

        handles.insert(
            guild_id.clone(),
            PumpHandle {
                commands: tx,
                task,
            },
        );
    }

    /// Deliver a skip to the running pump for `guild_id`, if any.
    pub fn skip(&self, guild_id: &GuildId) {
        self.send(guild_id, PumpCommand::Skip);
    }

    /// Deliver a stop to the running pump for `guild_id`, if any.
    pub fn stop(&self, guild_id: &GuildId) {
        self.send(guild_id, PumpCommand::Stop);
    }

    fn send(&self, guild_id: &GuildId, cmd: PumpCommand) {
        if let Some(handle) = self.handles.lock().get(guild_id) {
            let _ = handle.commands.send(cmd);
        }
    }

    /// Stop every running pump and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = {
            let mut guard = self.handles.lock();
            guard.drain().collect()
        };
        for (_, handle) in &handles {
            let _ = handle.commands.send(PumpCommand::Stop);
        }
        for (_, handle) in handles {
            let _ = handle.task.await;
        }
    }
}

async fn run_pump(
    guild_id: GuildId,
    queue: Arc<QueueManager>,
    providers: Arc<ProviderRegistry>,
    voice: Arc<VoiceSessionManager>,
    idle_detach: Duration,
    mut commands: mpsc::UnboundedReceiver<PumpCommand>,
) {
    loop {
        let next = match queue.advance(&guild_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tokio::select! {
                    () = tokio::time::sleep(idle_detach) => {
                        info!("idle timeout reached, detaching voice session");
                        voice.detach(&guild_id).await;
                        break;
                    }
                    cmd = commands.recv() => {
                        match cmd {
                            Some(PumpCommand::Stop) | None => {
                                voice.detach(&guild_id).await;
                                break;
                            }
                            Some(PumpCommand::Skip) | Some(PumpCommand::Wake) => continue,
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to advance queue, stopping pump");
                break;
            }
        };

        let key = identity_key(&next.descriptor);
        if play_one(&guild_id, &next, &providers, &voice, &mut commands).await {
            voice.detach(&guild_id).await;
            queue.notify_finished(&guild_id, &next.requester_id, &key);
            let _ = queue.stop(&guild_id).await;
            break;
        }
        queue.notify_finished(&guild_id, &next.requester_id, &key);
    }
}

/// Run one track end to end. Returns `true` if a `Stop` command was
/// received and the pump should exit after this track.
async fn play_one(
    guild_id: &GuildId,
    entry: &QueueEntry,
    providers: &ProviderRegistry,
    voice: &VoiceSessionManager,
    commands: &mut mpsc::UnboundedReceiver<PumpCommand>,
) -> bool {
    let mut playable = match providers.resolve_playable(&entry.descriptor).await {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, title = %entry.descriptor.title, "failed to resolve playable url");
            return false;
        }
    };

    if !voice.is_reachable(guild_id, &entry.requester_id) {
        info!(
            requester = %entry.requester_id,
            "requester unreachable, skipping without streaming"
        );
        return false;
    }

    let mut retried_expired = false;
    loop {
        let mut play_fut = Box::pin(voice.play(guild_id, &playable));
        let outcome = loop {
            tokio::select! {
                outcome = &mut play_fut => break outcome,
                cmd = commands.recv() => {
                    match cmd {
                        Some(PumpCommand::Skip) => {
                            voice.stop(guild_id).await;
                        }
                        Some(PumpCommand::Stop) => {
                            voice.stop(guild_id).await;
                            let _ = play_fut.await;
                            return true;
                        }
                        None => {
                            voice.stop(guild_id).await;
                            let _ = play_fut.await;
                            return true;
                        }
                        Some(PumpCommand::Wake) => {}
                    }
                }
            }
        };

        match outcome {
            PlaybackOutcome::TransportExpired if !retried_expired => {
                retried_expired = true;
                match providers.resolve_playable(&entry.descriptor).await {
                    Ok(fresh_url) => {
                        drop(play_fut);
                        playable = fresh_url;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "re-resolve after expiry failed");
                        return false;
                    }
                }
            }
            PlaybackOutcome::TransportError(msg) => {
                warn!(error = %msg, "transport error, finalizing track");
                return false;
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
impl PlaybackPump {
    fn is_running(&self, guild_id: &GuildId) -> bool {
        self.handles.lock().contains_key(guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::ProviderError;
    use crate::models::{SourceTag, TrackDescriptor, UserId};
    use crate::persistence::PersistenceStore;
    use crate::provider::MediaProvider;
    use crate::voice::FakeVoiceTransport;

    struct CountingProvider {
        resolve_calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                resolve_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "mock"
        }
        fn source_tag(&self) -> SourceTag {
            SourceTag::Generic
        }
        fn matches(&self, _url: &str) -> bool {
            true
        }
        async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
            Ok(TrackDescriptor {
                title: "mock".to_string(),
                duration_ms: 1000,
                canonical_url: url.to_string(),
                uploader: None,
                thumbnail_url: None,
                source_tag: SourceTag::Generic,
            })
        }
        async fn resolve_playable(
            &self,
            descriptor: &TrackDescriptor,
        ) -> Result<String, ProviderError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            Ok(descriptor.canonical_url.clone())
        }
    }

    fn config() -> QueueConfig {
        QueueConfig {
            max_pending_per_user: 5,
            duplicate_threshold_queue_len: 5,
            fairness_mode: crate::config::FairnessMode::Strict,
            idle_detach_seconds: 300,
            max_track_duration_seconds: 3600,
            max_queue_length: 100,
        }
    }

    fn entry(guild: &GuildId, user: &str, title: &str) -> QueueEntry {
        QueueEntry::new(
            TrackDescriptor {
                title: title.to_string(),
                duration_ms: 1000,
                canonical_url: format!("https://example.com/{title}"),
                uploader: None,
                thumbnail_url: None,
                source_tag: SourceTag::Generic,
            },
            UserId::from(user),
            user.to_string(),
            guild.clone(),
        )
    }

    async fn harness(
        provider: Arc<dyn MediaProvider>,
    ) -> (Arc<QueueManager>, Arc<PlaybackPump>, Arc<FakeVoiceTransport>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(PersistenceStore::new(dir.path()));
        persistence.init().await.unwrap();
        let queue = Arc::new(QueueManager::new(persistence, config()));
        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        let providers = Arc::new(registry);
        let transport = Arc::new(FakeVoiceTransport::new());
        let voice = Arc::new(VoiceSessionManager::new(transport.clone()));
        let pump = Arc::new(PlaybackPump::new(queue.clone(), providers, voice, config()));
        (queue, pump, transport, dir)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met within timeout");
    }

    fn drained(queue: &QueueManager, guild: &GuildId) -> bool {
        let status = queue.status(guild);
        status.current.is_none() && status.pending_count == 0
    }

    #[tokio::test]
    async fn enqueue_wakes_an_idle_pump_instead_of_waiting_out_the_idle_timer() {
        let (queue, pump, transport, _dir) = harness(Arc::new(CountingProvider::new())).await;
        let guild = GuildId::from("g1");
        transport.set_reachable_users(&guild, vec![UserId::from("u1"), UserId::from("u2")]);

        queue
            .enqueue(&guild, &UserId::from("u1"), entry(&guild, "u1", "a"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        wait_until(|| drained(&queue, &guild)).await;

        // The pump is now idle (idle_detach_seconds is 300, far longer than
        // this test). A second submission must be picked up immediately.
        queue
            .enqueue(&guild, &UserId::from("u2"), entry(&guild, "u2", "b"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        wait_until(|| drained(&queue, &guild)).await;
    }

    #[tokio::test]
    async fn ensure_running_respawns_after_a_stop_clears_the_stale_handle() {
        let (queue, pump, transport, _dir) = harness(Arc::new(CountingProvider::new())).await;
        let guild = GuildId::from("g1");
        transport.set_reachable_users(&guild, vec![UserId::from("u1"), UserId::from("u2")]);

        queue
            .enqueue(&guild, &UserId::from("u1"), entry(&guild, "u1", "a"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        pump.stop(&guild);
        wait_until(|| !pump.is_running(&guild)).await;

        // Without removing the stale handle, this enqueue would find a dead
        // handle still in the map and never spawn a new pump.
        queue
            .enqueue(&guild, &UserId::from("u2"), entry(&guild, "u2", "b"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        wait_until(|| drained(&queue, &guild)).await;
    }

    #[tokio::test]
    async fn only_one_play_is_ever_in_flight_per_guild() {
        let (queue, pump, transport, _dir) = harness(Arc::new(CountingProvider::new())).await;
        let guild = GuildId::from("g1");
        transport.set_reachable_users(&guild, vec![UserId::from("u1"), UserId::from("u2")]);
        transport.set_play_delay(Duration::from_millis(20));

        queue
            .enqueue(&guild, &UserId::from("u1"), entry(&guild, "u1", "a"))
            .await
            .unwrap();
        queue
            .enqueue(&guild, &UserId::from("u2"), entry(&guild, "u2", "b"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        wait_until(|| drained(&queue, &guild)).await;

        assert_eq!(transport.max_concurrent_plays(), 1);
    }

    #[tokio::test]
    async fn stop_during_playback_interrupts_the_stream_and_finalizes_the_track() {
        let (queue, pump, transport, _dir) = harness(Arc::new(CountingProvider::new())).await;
        let guild = GuildId::from("g1");
        let user = UserId::from("u1");
        transport.set_reachable_users(&guild, vec![user.clone()]);
        transport.block_next_play(&guild);

        queue
            .enqueue(&guild, &user, entry(&guild, "u1", "a"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        wait_until(|| queue.status(&guild).current.is_some()).await;

        pump.stop(&guild);
        wait_until(|| drained(&queue, &guild)).await;
        wait_until(|| !pump.is_running(&guild)).await;

        // The pending cap is freed again, proving the track was finalized.
        queue
            .enqueue(&guild, &user, entry(&guild, "u1", "b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transport_expired_triggers_exactly_one_re_resolve() {
        let provider = Arc::new(CountingProvider::new());
        let (queue, pump, transport, _dir) = harness(provider.clone()).await;
        let guild = GuildId::from("g1");
        transport.set_reachable_users(&guild, vec![UserId::from("u1")]);
        transport.script_outcomes(
            &guild,
            vec![PlaybackOutcome::TransportExpired, PlaybackOutcome::Completed],
        );

        queue
            .enqueue(&guild, &UserId::from("u1"), entry(&guild, "u1", "a"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        wait_until(|| drained(&queue, &guild)).await;

        assert_eq!(provider.resolve_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_requester_is_skipped_without_streaming() {
        let (queue, pump, transport, _dir) = harness(Arc::new(CountingProvider::new())).await;
        let guild = GuildId::from("g1");
        // No reachable users configured for this guild.

        queue
            .enqueue(&guild, &UserId::from("u1"), entry(&guild, "u1", "a"))
            .await
            .unwrap();
        pump.ensure_running(&guild);
        wait_until(|| drained(&queue, &guild)).await;

        assert_eq!(transport.max_concurrent_plays(), 0);
    }
}
