//! Provider registry — URL recognition, metadata extraction,
//! and playable-URL resolution, dispatched across a fixed-priority list
//! of upstream media sources.

pub mod bilibili;
pub mod catbox;
pub mod generic;
pub mod netease;
pub mod registry;
pub mod soundcloud;
pub mod traits;
pub mod youtube;

pub use bilibili::BilibiliProvider;
pub use catbox::CatboxProvider;
pub use generic::GenericProvider;
pub use netease::NeteaseProvider;
pub use registry::ProviderRegistry;
pub use soundcloud::SoundcloudProvider;
pub use traits::MediaProvider;
pub use youtube::YoutubeProvider;

use std::sync::Arc;

use crate::config::ProvidersConfig;

/// Build a `ProviderRegistry` with the built-in providers, in the match
/// priority order, skipping any disabled by configuration.
#[must_use]
pub fn build_default_registry(config: &ProvidersConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    if config.youtube_enabled {
        registry.register(Arc::new(YoutubeProvider::new()));
    }
    if config.bilibili_enabled {
        registry.register(Arc::new(BilibiliProvider::new()));
    }
    if config.netease_enabled {
        registry.register(Arc::new(NeteaseProvider::new(config.netease.clone())));
    }
    if config.soundcloud_enabled {
        registry.register(Arc::new(SoundcloudProvider::new()));
    }
    if config.catbox_enabled {
        registry.register(Arc::new(CatboxProvider::new()));
    }
    if config.generic_enabled {
        registry.register(Arc::new(GenericProvider::new()));
    }
    registry
}
