//! Model registry: `provider:model` resolution to capability handles.
//!
//! The manager owns no global state. It borrows a descriptor table and a
//! client cache, plus per-provider connection options configured by the
//! host, and turns fully-qualified model ids into model handles.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::client::{
    EmbeddingModel, ImageModel, LanguageModel, ProviderClient, SpeechModel, TranscriptionModel,
};
use crate::error::RelayError;
use crate::factory::{CacheStats, ClientCache};
use crate::provider::descriptor::ProviderInfo;
use crate::provider::{default_table, ProviderTable};
use crate::types::ProviderOptions;

pub mod hub;

pub use hub::HubProvider;

/// Separator between provider id and model id in a fully-qualified id.
pub const ID_SEPARATOR: char = ':';

/// Split `provider:model` at the first separator.
///
/// The model part may itself contain separators (hub addresses do), so only
/// the first one is structural.
pub fn split_id(full_id: &str) -> Result<(&str, &str), RelayError> {
    match full_id.split_once(ID_SEPARATOR) {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok((provider, model))
        }
        _ => Err(RelayError::InvalidParameter(format!(
            "model id '{full_id}' is not of the form provider{ID_SEPARATOR}model"
        ))),
    }
}

/// Resolves fully-qualified model ids against a descriptor table and hands
/// out capability handles backed by cached clients.
pub struct RegistryManager {
    table: Arc<ProviderTable>,
    cache: Arc<ClientCache>,
    options: RwLock<HashMap<String, ProviderOptions>>,
    /// Directly registered clients; these bypass descriptor resolution and
    /// the construction cache entirely.
    clients: RwLock<HashMap<String, Arc<dyn ProviderClient>>>,
}

impl RegistryManager {
    pub fn new(table: Arc<ProviderTable>, cache: Arc<ClientCache>) -> Self {
        Self {
            table,
            cache,
            options: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &Arc<ProviderTable> {
        &self.table
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Set the connection options used when constructing clients for this
    /// provider id. Replaces any previous options.
    pub fn configure(&self, provider_id: impl Into<String>, options: ProviderOptions) {
        let mut map = self.options.write().unwrap_or_else(|e| e.into_inner());
        map.insert(provider_id.into(), options);
    }

    fn options_for(&self, provider_id: &str) -> ProviderOptions {
        let map = self.options.read().unwrap_or_else(|e| e.into_inner());
        map.get(provider_id).cloned().unwrap_or_default()
    }

    /// Register a ready-made client under an id. Last write wins.
    pub fn register(&self, id: impl Into<String>, client: Arc<dyn ProviderClient>) {
        let id = id.into();
        debug!(provider_id = %id, "registering client instance");
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, client);
    }

    /// Register a batch of clients keyed by provider id.
    pub fn register_many(&self, clients: HashMap<String, Arc<dyn ProviderClient>>) {
        let mut map = self.clients.write().unwrap_or_else(|e| e.into_inner());
        for (id, client) in clients {
            debug!(provider_id = %id, "registering client instance");
            map.insert(id, client);
        }
    }

    /// Fetch a directly registered client.
    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn has_clients(&self) -> bool {
        !self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Drop every directly registered client.
    pub fn clear(&self) {
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Canonicalize a provider name through the alias map. Unmapped names
    /// pass through unchanged; the descriptor fallback handles unknown ids.
    pub fn resolve_provider(&self, name: &str) -> String {
        self.table
            .resolve_alias(name)
            .unwrap_or_else(|| name.to_string())
    }

    /// The client serving this provider id: a directly registered instance
    /// if one exists, otherwise constructed (or fetched from cache) through
    /// the descriptor table.
    pub async fn client_for(&self, provider_id: &str) -> Result<Arc<dyn ProviderClient>, RelayError> {
        let canonical = self.resolve_provider(provider_id);
        if let Some(client) = self.get(&canonical) {
            return Ok(client);
        }
        let descriptor = self
            .table
            .get(&canonical)
            .ok_or_else(|| RelayError::not_registered(&canonical))?;
        let options = self.options_for(&canonical);
        debug!(provider_id = %canonical, effective = %descriptor.id, "resolving provider client");
        self.cache.get_or_create(&descriptor, &options).await
    }

    /// The registered client serving a composite `provider:model` id.
    ///
    /// Composite lookups are strict: they only consult directly registered
    /// clients, and an unknown provider (or an empty registry) fails with
    /// `NotRegistered`. The descriptor fallback exists solely on the
    /// [`client_for`](Self::client_for) construction path.
    fn registered_for(&self, full_id: &str, provider: &str) -> Result<Arc<dyn ProviderClient>, RelayError> {
        let canonical = self.resolve_provider(provider);
        self.get(&canonical)
            .ok_or_else(|| RelayError::not_registered(full_id))
    }

    /// A client lacking the requested capability reads as an unknown
    /// address on the composite lookup surface.
    fn capability_as_not_registered(full_id: &str) -> impl FnOnce(RelayError) -> RelayError + '_ {
        move |e| match e {
            RelayError::UnsupportedCapability { .. } => RelayError::not_registered(full_id),
            other => other,
        }
    }

    pub async fn language_model(&self, full_id: &str) -> Result<Arc<dyn LanguageModel>, RelayError> {
        let (provider, model) = split_id(full_id)?;
        self.registered_for(full_id, provider)?
            .language_model(model)
            .map_err(Self::capability_as_not_registered(full_id))
    }

    pub async fn embedding_model(
        &self,
        full_id: &str,
    ) -> Result<Arc<dyn EmbeddingModel>, RelayError> {
        let (provider, model) = split_id(full_id)?;
        self.registered_for(full_id, provider)?
            .embedding_model(model)
            .map_err(Self::capability_as_not_registered(full_id))
    }

    pub async fn image_model(&self, full_id: &str) -> Result<Arc<dyn ImageModel>, RelayError> {
        let (provider, model) = split_id(full_id)?;
        self.registered_for(full_id, provider)?
            .image_model(model)
            .map_err(Self::capability_as_not_registered(full_id))
    }

    pub async fn speech_model(&self, full_id: &str) -> Result<Arc<dyn SpeechModel>, RelayError> {
        let (provider, model) = split_id(full_id)?;
        self.registered_for(full_id, provider)?
            .speech_model(model)
            .map_err(Self::capability_as_not_registered(full_id))
    }

    pub async fn transcription_model(
        &self,
        full_id: &str,
    ) -> Result<Arc<dyn TranscriptionModel>, RelayError> {
        let (provider, model) = split_id(full_id)?;
        self.registered_for(full_id, provider)?
            .transcription_model(model)
            .map_err(Self::capability_as_not_registered(full_id))
    }

    pub fn provider_info(&self, provider_id: &str) -> ProviderInfo {
        self.table.provider_info(&self.resolve_provider(provider_id))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Remove every dynamic registration, drop all cached clients and all
    /// directly registered clients. Base providers remain usable afterwards.
    pub async fn cleanup(&self) {
        self.table.cleanup();
        self.cache.clear().await;
        self.clear();
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<RegistryManager>> = Lazy::new(|| {
    Arc::new(RegistryManager::new(
        default_table(),
        Arc::new(ClientCache::new()),
    ))
});

/// Process-default registry wired to the default descriptor table.
pub fn default_registry() -> Arc<RegistryManager> {
    DEFAULT_REGISTRY.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_id_uses_first_separator() {
        assert_eq!(split_id("openai:gpt-4o").unwrap(), ("openai", "gpt-4o"));
        // Hub addresses keep their inner separator intact.
        assert_eq!(split_id("hub:openai:gpt-4o").unwrap(), ("hub", "openai:gpt-4o"));
    }

    #[test]
    fn split_id_rejects_malformed_ids() {
        assert!(split_id("gpt-4o").is_err());
        assert!(split_id(":gpt-4o").is_err());
        assert!(split_id("openai:").is_err());
        assert!(split_id("").is_err());
    }

    #[test]
    fn resolve_provider_passes_unmapped_names_through() {
        let registry = RegistryManager::new(
            Arc::new(ProviderTable::new()),
            Arc::new(ClientCache::new()),
        );
        assert_eq!(registry.resolve_provider("openai"), "openai");
        assert_eq!(registry.resolve_provider("unknown-vendor"), "unknown-vendor");
    }
}
