//! Hub provider: one registered provider id that fans out to many.
//!
//! A hub is addressed as `hub-id:provider:model`. The registry strips the
//! hub id, the hub validates that the remainder is exactly
//! `provider:model`, resolves the sub-provider against the clients
//! registered with the same [`RegistryManager`], and hands back that
//! client's own model handle. Routing must be observably identical to
//! calling `provider:model` directly; a sub-provider that is not
//! registered, or lacks the requested capability, fails with
//! `HubRouting` naming both the hub and the sub-provider.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::{
    EmbeddingModel, ImageModel, LanguageModel, ProviderClient, SpeechModel, TranscriptionModel,
};
use crate::error::RelayError;
use crate::provider::descriptor::{DynamicRegistration, FnClientFactory, ProviderDescriptor};
use crate::types::ProviderOptions;

use super::RegistryManager;

/// A provider client that routes hub addresses to concrete providers.
pub struct HubProvider {
    hub_id: String,
    manager: Arc<RegistryManager>,
}

impl HubProvider {
    pub fn new(hub_id: impl Into<String>, manager: Arc<RegistryManager>) -> Self {
        Self {
            hub_id: hub_id.into(),
            manager,
        }
    }

    pub fn hub_id(&self) -> &str {
        &self.hub_id
    }

    /// A dynamic registration that installs this hub under its id.
    pub fn registration(
        hub_id: impl Into<String>,
        manager: Arc<RegistryManager>,
    ) -> DynamicRegistration {
        let hub_id = hub_id.into();
        let descriptor = ProviderDescriptor::new(
            hub_id.clone(),
            format!("Hub ({hub_id})"),
            Arc::new(FnClientFactory({
                let hub_id = hub_id.clone();
                move |_options: &ProviderOptions| {
                    Ok(Arc::new(HubProvider::new(hub_id.clone(), manager.clone()))
                        as Arc<dyn ProviderClient>)
                }
            })),
        );
        DynamicRegistration::new(descriptor)
    }

    /// Validate that a hub-relative address is exactly `provider:model`.
    fn parse_address(&self, address: &str) -> Result<(String, String), RelayError> {
        let parts: Vec<&str> = address.split(super::ID_SEPARATOR).collect();
        match parts.as_slice() {
            [provider, model] if !provider.is_empty() && !model.is_empty() => {
                Ok((provider.to_string(), model.to_string()))
            }
            [provider, ..] => Err(RelayError::hub_routing(
                &self.hub_id,
                Some(provider.to_string()),
                format!(
                    "hub address '{address}' must be exactly provider{sep}model",
                    sep = super::ID_SEPARATOR
                ),
            )),
            [] => Err(RelayError::hub_routing(
                &self.hub_id,
                None,
                "empty hub address".to_string(),
            )),
        }
    }

    /// The registered client behind a sub-provider name. Resolution is
    /// eager: a missing sub-provider surfaces when the handle is requested,
    /// not on first invocation.
    fn target_client(&self, provider: &str) -> Result<Arc<dyn ProviderClient>, RelayError> {
        let canonical = self.manager.resolve_provider(provider);
        self.manager.get(&canonical).ok_or_else(|| {
            RelayError::hub_routing(
                &self.hub_id,
                Some(provider.to_string()),
                format!("no provider '{provider}' registered behind this hub"),
            )
        })
    }

    fn route<T>(
        &self,
        model_id: &str,
        accessor: impl FnOnce(Arc<dyn ProviderClient>, &str) -> Result<T, RelayError>,
    ) -> Result<T, RelayError> {
        let (provider, model) = self.parse_address(model_id)?;
        let client = self.target_client(&provider)?;
        accessor(client, &model).map_err(|e| match e {
            RelayError::UnsupportedCapability { capability, .. } => RelayError::hub_routing(
                &self.hub_id,
                Some(provider.clone()),
                format!("provider '{provider}' does not support {capability}"),
            ),
            other => other,
        })
    }
}

#[async_trait]
impl ProviderClient for HubProvider {
    fn provider_id(&self) -> &str {
        &self.hub_id
    }

    fn language_model(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, RelayError> {
        self.route(model_id, |client, model| client.language_model(model))
    }

    fn embedding_model(&self, model_id: &str) -> Result<Arc<dyn EmbeddingModel>, RelayError> {
        self.route(model_id, |client, model| client.embedding_model(model))
    }

    fn image_model(&self, model_id: &str) -> Result<Arc<dyn ImageModel>, RelayError> {
        self.route(model_id, |client, model| client.image_model(model))
    }

    fn speech_model(&self, model_id: &str) -> Result<Arc<dyn SpeechModel>, RelayError> {
        self.route(model_id, |client, model| client.speech_model(model))
    }

    fn transcription_model(
        &self,
        model_id: &str,
    ) -> Result<Arc<dyn TranscriptionModel>, RelayError> {
        self.route(model_id, |client, model| client.transcription_model(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GenericClient;
    use crate::factory::ClientCache;
    use crate::provider::ProviderTable;

    fn manager() -> Arc<RegistryManager> {
        Arc::new(RegistryManager::new(
            Arc::new(ProviderTable::new()),
            Arc::new(ClientCache::new()),
        ))
    }

    #[test]
    fn parses_exact_two_part_addresses() {
        let hub = HubProvider::new("hub", manager());
        assert_eq!(
            hub.parse_address("openai:gpt-4o").unwrap(),
            ("openai".to_string(), "gpt-4o".to_string())
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        let hub = HubProvider::new("hub", manager());
        for bad in ["gpt-4o", "a:b:c", "openai:", ":gpt-4o", ""] {
            let err = hub.parse_address(bad).unwrap_err();
            assert!(err.is_hub_routing(), "address '{bad}' should fail routing");
        }
    }

    #[test]
    fn handle_lookup_resolves_the_sub_provider_eagerly() {
        let manager = manager();
        let hub = HubProvider::new("hub", manager.clone());

        let Err(err) = hub.language_model("openai:gpt-4o") else {
            panic!("unregistered sub-provider should fail at handle lookup");
        };
        assert!(matches!(
            err,
            RelayError::HubRouting {
                ref hub_id,
                provider_id: Some(ref provider),
                ..
            } if hub_id == "hub" && provider == "openai"
        ));

        manager.register(
            "openai",
            Arc::new(GenericClient::new("openai", ProviderOptions::new())),
        );
        assert!(hub.language_model("openai:gpt-4o").is_ok());
    }

    #[test]
    fn missing_capability_reads_as_a_routing_failure() {
        let manager = manager();
        manager.register(
            "openai",
            Arc::new(GenericClient::new("openai", ProviderOptions::new())),
        );
        let hub = HubProvider::new("hub", manager);

        // GenericClient has no embedding support.
        let Err(err) = hub.embedding_model("openai:text-embedding-3-small") else {
            panic!("missing capability should fail routing");
        };
        assert!(err.is_hub_routing());
    }
}
