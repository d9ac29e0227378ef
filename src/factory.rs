//! Client construction and the fingerprint cache.
//!
//! Clients are expensive to build (connection pools, auth state), so the
//! factory keys each constructed client by a fingerprint of the connection
//! options and hands out the cached instance on repeat calls. Concurrent
//! requests for the same fingerprint are serialized through a per-key lock
//! so that at most one construction runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::ProviderClient;
use crate::error::RelayError;
use crate::provider::descriptor::ProviderDescriptor;
use crate::types::ProviderOptions;

/// Stable cache key for one (provider, connection options) pair.
///
/// The fields are serialized in a fixed order and absent fields are omitted
/// entirely, so two option sets differing only in unset fields fingerprint
/// identically. The api key contributes a truncated digest, never the raw
/// secret.
pub fn client_fingerprint(provider_id: &str, options: &ProviderOptions) -> String {
    let mut parts = vec![format!("provider={provider_id}")];
    if let Some(key) = &options.api_key {
        let digest = Sha256::digest(key.expose_secret().as_bytes());
        parts.push(format!("key={}", &hex::encode(digest)[..16]));
    }
    if let Some(url) = &options.base_url {
        parts.push(format!("base_url={url}"));
    }
    if let Some(org) = &options.organization {
        parts.push(format!("org={org}"));
    }
    if let Some(project) = &options.project {
        parts.push(format!("project={project}"));
    }
    if let Some(model) = &options.model {
        parts.push(format!("model={model}"));
    }
    if let Some(region) = &options.region {
        parts.push(format!("region={region}"));
    }
    parts.join("|")
}

/// Snapshot of the cache contents for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
    pub last_cleanup: Option<DateTime<Utc>>,
}

struct CacheEntry {
    client: Arc<dyn ProviderClient>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    last_cleanup: Option<DateTime<Utc>>,
}

/// Fingerprint-keyed cache of constructed clients.
pub struct ClientCache {
    state: RwLock<CacheState>,
    /// Per-fingerprint construction locks; holders of an entry's lock are
    /// the only task allowed to build that client.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached client for this descriptor + options, constructing
    /// it through the descriptor's factory on first use.
    ///
    /// A cached client that reports uninitialized or fails its config check
    /// is evicted and rebuilt instead of being returned.
    pub async fn get_or_create(
        &self,
        descriptor: &ProviderDescriptor,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ProviderClient>, RelayError> {
        let key = client_fingerprint(&descriptor.id, options);
        self.get_or_create_with(&key, descriptor, options, false).await
    }

    /// Like [`get_or_create`](Self::get_or_create) but routed through the
    /// descriptor's image factory when one is registered. Image clients live
    /// under their own fingerprint namespace.
    pub async fn get_or_create_image(
        &self,
        descriptor: &ProviderDescriptor,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ProviderClient>, RelayError> {
        if !descriptor.supports_image_generation {
            return Err(RelayError::unsupported(&descriptor.id, "image generation"));
        }
        let key = format!("{}|image", client_fingerprint(&descriptor.id, options));
        self.get_or_create_with(&key, descriptor, options, true).await
    }

    async fn get_or_create_with(
        &self,
        key: &str,
        descriptor: &ProviderDescriptor,
        options: &ProviderOptions,
        image: bool,
    ) -> Result<Arc<dyn ProviderClient>, RelayError> {
        if let Some(client) = self.lookup_healthy(key).await {
            return Ok(client);
        }

        // Serialize construction per fingerprint. The outer map lock is held
        // only long enough to fetch the per-key lock.
        let entry_lock = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let result = {
            let _guard = entry_lock.lock().await;
            // A racing task may have finished construction while this one
            // waited.
            match self.lookup_healthy(key).await {
                Some(client) => Ok(client),
                None => self.construct(key, descriptor, options, image).await,
            }
        };

        // The per-key lock is only needed while a construction is in flight;
        // drop the map entry so keys do not accumulate.
        self.in_flight.lock().await.remove(key);
        result
    }

    async fn construct(
        &self,
        key: &str,
        descriptor: &ProviderDescriptor,
        options: &ProviderOptions,
        image: bool,
    ) -> Result<Arc<dyn ProviderClient>, RelayError> {
        let factory = if image {
            descriptor.image_factory.as_ref().unwrap_or(&descriptor.factory)
        } else {
            &descriptor.factory
        };
        let client = factory.create(options).await.map_err(|e| match e {
            e @ (RelayError::ProviderConstruction { .. } | RelayError::ClientConfig { .. }) => e,
            other => RelayError::construction(&descriptor.id, other.to_string(), None),
        })?;
        client.validate_config()?;

        debug!(provider_id = %descriptor.id, fingerprint = %key, "constructed provider client");
        let mut state = self.write_state();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                client: client.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(client)
    }

    /// Cached lookup that evicts (and shuts down) unhealthy clients.
    async fn lookup_healthy(&self, key: &str) -> Option<Arc<dyn ProviderClient>> {
        let client = {
            let state = self.read_state();
            state.entries.get(key).map(|e| e.client.clone())
        }?;
        if client.is_initialized() && client.validate_config().is_ok() {
            return Some(client);
        }
        warn!(fingerprint = %key, "evicting unhealthy cached client");
        self.remove(key).await;
        None
    }

    /// Evict every entry belonging to one provider id, shutting the clients
    /// down. Returns the number of evicted entries.
    pub async fn invalidate(&self, provider_id: &str) -> usize {
        let prefix = format!("provider={provider_id}");
        let keys: Vec<String> = {
            let state = self.read_state();
            state
                .entries
                .keys()
                .filter(|k| {
                    k.as_str() == prefix || k.starts_with(&format!("{prefix}|"))
                })
                .cloned()
                .collect()
        };
        for key in &keys {
            self.remove(key).await;
        }
        debug!(provider_id, removed = keys.len(), "invalidated provider clients");
        keys.len()
    }

    /// Evict one entry, shutting the client down. Returns whether an entry
    /// existed.
    pub async fn remove(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.write_state();
            state.entries.remove(key)
        };
        match removed {
            Some(entry) => {
                entry.client.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Evict every entry whose client is uninitialized or fails its config
    /// check, and stamp the cleanup time.
    pub async fn cleanup(&self) -> usize {
        let stale: Vec<String> = {
            let state = self.read_state();
            state
                .entries
                .iter()
                .filter(|(_, e)| {
                    !e.client.is_initialized() || e.client.validate_config().is_err()
                })
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in &stale {
            self.remove(key).await;
        }
        let mut state = self.write_state();
        state.last_cleanup = Some(Utc::now());
        debug!(removed = stale.len(), "cache cleanup finished");
        stale.len()
    }

    /// Drop every entry, shutting each client down, and stamp the cleanup
    /// time.
    pub async fn clear(&self) {
        let entries: Vec<CacheEntry> = {
            let mut state = self.write_state();
            state.last_cleanup = Some(Utc::now());
            state.entries.drain().map(|(_, e)| e).collect()
        };
        for entry in entries {
            entry.client.shutdown().await;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read_state().entries.contains_key(key)
    }

    /// Construction time of a cached entry, if present.
    pub fn created_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.read_state().entries.get(key).map(|e| e.created_at)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.read_state();
        let mut keys: Vec<String> = state.entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: state.entries.len(),
            keys,
            last_cleanup: state.last_cleanup,
        }
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ProviderOptions {
        ProviderOptions::new()
            .with_api_key("sk-test-key")
            .with_base_url("https://api.example.com/v1")
    }

    #[test]
    fn fingerprint_is_stable_and_omits_unset_fields() {
        let a = client_fingerprint("openai", &options());
        let b = client_fingerprint("openai", &options());
        assert_eq!(a, b);
        assert!(!a.contains("sk-test-key"));
        assert!(!a.contains("org="));
        assert!(!a.contains("model="));
    }

    #[test]
    fn fingerprint_distinguishes_providers_and_keys() {
        let base = client_fingerprint("openai", &options());
        assert_ne!(base, client_fingerprint("anthropic", &options()));
        let other_key = options().with_api_key("sk-other");
        assert_ne!(base, client_fingerprint("openai", &other_key));
    }

    #[test]
    fn empty_cache_stats() {
        let cache = ClientCache::new();
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert!(stats.keys.is_empty());
        assert!(stats.last_cleanup.is_none());
    }

    fn descriptor() -> ProviderDescriptor {
        use crate::client::GenericClient;
        use crate::provider::descriptor::FnClientFactory;

        ProviderDescriptor::new(
            "openai",
            "OpenAI",
            Arc::new(FnClientFactory(|options: &ProviderOptions| {
                Ok(Arc::new(GenericClient::new("openai", options.clone()))
                    as Arc<dyn ProviderClient>)
            })),
        )
    }

    #[tokio::test]
    async fn construction_locks_are_dropped_after_use() {
        let cache = ClientCache::new();
        let descriptor = descriptor();

        cache.get_or_create(&descriptor, &options()).await.unwrap();
        cache
            .get_or_create(&descriptor, &options().with_api_key("sk-other"))
            .await
            .unwrap();
        // Repeat lookup of a cached key takes the fast path entirely.
        cache.get_or_create(&descriptor, &options()).await.unwrap();

        assert_eq!(cache.stats().size, 2);
        assert!(cache.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn failed_constructions_leave_no_lock_behind() {
        use crate::provider::descriptor::FnClientFactory;

        let cache = ClientCache::new();
        let descriptor = ProviderDescriptor::new(
            "broken",
            "Broken",
            Arc::new(FnClientFactory(
                |_options: &ProviderOptions| -> Result<Arc<dyn ProviderClient>, RelayError> {
                    Err(RelayError::construction("broken", "boom", None))
                },
            )),
        );

        assert!(cache.get_or_create(&descriptor, &options()).await.is_err());
        assert!(cache.in_flight.lock().await.is_empty());
        assert_eq!(cache.stats().size, 0);
    }
}
