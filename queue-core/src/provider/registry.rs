//! Provider registry — URL to provider dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::models::{SourceTag, TrackDescriptor};

use super::traits::MediaProvider;

/// Dispatches a URL to the first-matching registered provider, in a fixed
/// priority order, and exposes the registry-wide `extract`/`resolve_playable`
/// operations that extraction and resolution need.
///
/// Providers are registered in priority order; a disabled provider (per
/// `provider.<name>.enabled`) is simply never registered, so it is
/// excluded from `recognize` dispatch exactly as if it did not exist.
pub struct ProviderRegistry {
    ordered: Vec<Arc<dyn MediaProvider>>,
    by_tag: HashMap<SourceTag, Arc<dyn MediaProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ordered: Vec::new(),
            by_tag: HashMap::new(),
        }
    }

    /// Register a provider. Registration order is match priority order.
    pub fn register(&mut self, provider: Arc<dyn MediaProvider>) {
        self.by_tag.insert(provider.source_tag(), provider.clone());
        self.ordered.push(provider);
    }

    /// First-match lookup over registered providers, in registration order.
    #[must_use]
    pub fn recognize(&self, url: &str) -> Option<Arc<dyn MediaProvider>> {
        self.ordered.iter().find(|p| p.matches(url)).cloned()
    }

    /// Recognize then extract. Fails `Unsupported` if no provider matches.
    pub async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
        let provider = self.recognize(url).ok_or(ProviderError::Unsupported)?;
        provider.extract(url).await
    }

    /// Resolve a fresh playable URL for a descriptor, dispatching by the
    /// `source_tag` that was stamped onto it at extraction time.
    pub async fn resolve_playable(
        &self,
        descriptor: &TrackDescriptor,
    ) -> Result<String, ProviderError> {
        let provider = self
            .by_tag
            .get(&descriptor.source_tag)
            .cloned()
            .ok_or(ProviderError::Unsupported)?;
        provider.resolve_playable(descriptor).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct MockProvider {
        tag: SourceTag,
        prefix: &'static str,
    }

    #[async_trait]
    impl MediaProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }
        fn source_tag(&self) -> SourceTag {
            self.tag
        }
        fn matches(&self, url: &str) -> bool {
            url.starts_with(self.prefix)
        }
        async fn extract(&self, url: &str) -> Result<TrackDescriptor, ProviderError> {
            Ok(TrackDescriptor {
                title: "mock".to_string(),
                duration_ms: 1000,
                canonical_url: url.to_string(),
                uploader: None,
                thumbnail_url: None,
                source_tag: self.tag,
            })
        }
        async fn resolve_playable(
            &self,
            descriptor: &TrackDescriptor,
        ) -> Result<String, ProviderError> {
            Ok(format!("{}#resolved", descriptor.canonical_url))
        }
    }

    #[tokio::test]
    async fn first_match_wins_in_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider {
            tag: SourceTag::Youtube,
            prefix: "https://youtube.com",
        }));
        registry.register(Arc::new(MockProvider {
            tag: SourceTag::Generic,
            prefix: "https://",
        }));

        let provider = registry.recognize("https://youtube.com/watch?v=x").unwrap();
        assert_eq!(provider.source_tag(), SourceTag::Youtube);

        let provider = registry.recognize("https://example.com/a.mp3").unwrap();
        assert_eq!(provider.source_tag(), SourceTag::Generic);
    }

    #[tokio::test]
    async fn unregistered_provider_is_unsupported() {
        let registry = ProviderRegistry::new();
        let err = registry.extract("https://nowhere.example/x").await.unwrap_err();
        assert_eq!(err, ProviderError::Unsupported);
    }

    #[tokio::test]
    async fn resolve_dispatches_by_source_tag_not_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider {
            tag: SourceTag::Catbox,
            prefix: "https://files.catbox.moe",
        }));
        let descriptor = registry
            .extract("https://files.catbox.moe/x.mp3")
            .await
            .unwrap();
        let playable = registry.resolve_playable(&descriptor).await.unwrap();
        assert_eq!(playable, "https://files.catbox.moe/x.mp3#resolved");
    }
}
