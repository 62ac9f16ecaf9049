//! Provider registry — core traits.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

/// A single upstream media source (youtube, bilibili, netease, ...).
///
/// Implementations MUST be deterministic about `matches`: exactly the URLs
/// described by the provider's recognition pattern return `true`.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Provider name, e.g. `"youtube"`.
    fn name(&self) -> &'static str;

    /// The `SourceTag` this provider stamps onto extracted descriptors.
    fn source_tag(&self) -> SourceTag;

    /// Whether this provider recognizes the given URL.
    fn matches(&self, url: &str) -> bool;

    /// Extract a full `TrackDescriptor` from a recognized URL.
    ///
    /// MUST populate `canonical_url` with a permanent, re-resolvable
    /// reference for catalog sources — never a transient CDN link.
    async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError>;

    /// Resolve a short-lived streamable URL immediately before playback.
    ///
    /// For direct-file sources this returns `descriptor.canonical_url`
    /// unchanged; for catalog sources it performs a fresh lookup every call.
    async fn resolve_playable(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<String, ProviderError>;
}
