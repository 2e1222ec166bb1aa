//! Registry of available chat providers.

use std::sync::Arc;

use crate::error::Result;
use crate::http::default_client;
use crate::provider::ChatProvider;
use crate::twitch::{TwitchCredentials, create_twitch_chat_provider};
use crate::youtube::YouTubeChatProvider;

/// Registry of available chat providers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a registry with the Twitch and YouTube providers.
    pub fn with_defaults(twitch_credentials: Option<TwitchCredentials>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(create_twitch_chat_provider(twitch_credentials, None)));
        registry.register(Arc::new(YouTubeChatProvider::new(default_client()?)));
        Ok(registry)
    }

    /// Register a provider. A later registration for the same platform wins.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.providers
            .retain(|p| !p.platform().eq_ignore_ascii_case(provider.platform()));
        self.providers.push(provider);
    }

    /// Get the provider for the given platform.
    pub fn get_by_platform(&self, platform: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .find(|p| p.platform().eq_ignore_ascii_case(platform))
            .cloned()
    }

    /// List all registered platforms.
    pub fn platforms(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.platform()).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_with_defaults() {
        let registry = ProviderRegistry::with_defaults(None).unwrap();
        let platforms = registry.platforms();

        assert_eq!(platforms.len(), 2);
        assert!(platforms.contains(&"twitch"));
        assert!(platforms.contains(&"youtube"));
    }

    #[test]
    fn test_get_by_platform() {
        let registry = ProviderRegistry::with_defaults(None).unwrap();

        assert!(registry.get_by_platform("Twitch").is_some());
        assert!(registry.get_by_platform("youtube").is_some());
        assert!(registry.get_by_platform("kick").is_none());
    }

    #[test]
    fn test_register_replaces_same_platform() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(create_twitch_chat_provider(None, None)));
        registry.register(Arc::new(create_twitch_chat_provider(None, None)));

        assert_eq!(registry.platforms(), vec!["twitch"]);
    }
}
