//! Per-guild audio queue orchestration: track identity, provider
//! dispatch, fairness, persistence, and the playback pump that ties them
//! together behind a single `Engine` facade.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod provider;
pub mod pump;
pub mod queue_manager;
pub mod tracker;
pub mod voice;

pub use config::Config;
pub use engine::{Engine, SubmitOutcome};
pub use error::{EngineError, PersistError, ProviderError, QueueError, Result, TrackerError};
pub use models::{GuildId, QueueEntry, SourceTag, TrackDescriptor, UserId};
pub use provider::{build_default_registry, MediaProvider, ProviderRegistry};
pub use queue_manager::{QueueManager, QueueStatus};
pub use voice::{FakeVoiceTransport, PlaybackOutcome, VoiceSessionManager, VoiceTransport};
