//! Error taxonomy.
//!
//! Each owning component has its own closed `thiserror` enum; `EngineError`
//! composes them via `#[from]` so the facade can propagate with `?` while
//! still letting callers match on the specific error kind.

use thiserror::Error;

/// Errors raised while recognizing, extracting, or resolving a track
/// through the provider registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no provider recognizes this URL")]
    Unsupported,
    #[error("network error: {0}")]
    Network(String),
    #[error("resource not found")]
    NotFound,
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("malformed response from upstream: {0}")]
    Malformed(String),
    #[error("playable URL expired")]
    Expired,
    #[error("content is geo-blocked")]
    GeoBlocked,
    #[error("content is DRM-protected")]
    DrmBlocked,
    #[error("track exceeds maximum allowed duration")]
    TrackTooLong,
}

/// Errors raised by the fairness and duplicate tracker.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    #[error("user already has this track queued")]
    Duplicate,
    #[error("user has reached the per-user pending cap")]
    FairnessPending,
    #[error("user is currently playing and fairness mode is strict")]
    FairnessPlaying,
}

/// Errors raised by the queue manager.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("position out of range")]
    OutOfRange,
    #[error("queue is full")]
    QueueFull,
    #[error("snapshot schema does not match the running engine")]
    SchemaMismatch,
}

/// Errors raised by the persistence store.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),
}

/// The facade-level error surfaced to callers of `Engine`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("guild is not currently playing")]
    NotPlaying,
}

pub type Result<T> = std::result::Result<T, EngineError>;
