//! Provider descriptors and the client factory capability.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ProviderClient;
use crate::error::RelayError;
use crate::types::ProviderOptions;

/// Constructs a backend client from connection options.
///
/// This replaces dynamic-import-plus-function-name registration: each
/// provider supplies a factory implementation, selected at registration time.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self, options: &ProviderOptions) -> Result<Arc<dyn ProviderClient>, RelayError>;
}

/// Adapter turning a plain closure into a [`ClientFactory`].
pub struct FnClientFactory<F>(pub F);

#[async_trait]
impl<F> ClientFactory for FnClientFactory<F>
where
    F: Fn(&ProviderOptions) -> Result<Arc<dyn ProviderClient>, RelayError> + Send + Sync,
{
    async fn create(
        &self,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ProviderClient>, RelayError> {
        (self.0)(options)
    }
}

/// Registration record describing how to build a client for one provider id.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub factory: Arc<dyn ClientFactory>,
    pub supports_image_generation: bool,
    /// Dedicated factory for image-generation clients, when the plain
    /// factory is not suitable.
    pub image_factory: Option<Arc<dyn ClientFactory>>,
}

impl ProviderDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            factory,
            supports_image_generation: false,
            image_factory: None,
        }
    }

    pub fn with_image_generation(mut self) -> Self {
        self.supports_image_generation = true;
        self
    }

    pub fn with_image_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.supports_image_generation = true;
        self.image_factory = Some(factory);
        self
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("supports_image_generation", &self.supports_image_generation)
            .field("image_factory", &self.image_factory.as_ref().map(|_| "<dyn>"))
            .finish()
    }
}

/// A dynamic registration: a descriptor plus alias mappings
/// (`sourceAlias -> canonicalProviderId`).
#[derive(Debug, Clone)]
pub struct DynamicRegistration {
    pub descriptor: ProviderDescriptor,
    pub mappings: HashMap<String, String>,
}

impl DynamicRegistration {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            mappings: HashMap::new(),
        }
    }

    pub fn with_mapping(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.mappings.insert(alias.into(), target.into());
        self
    }
}

/// Summary of how a provider id resolves, for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub is_supported: bool,
    /// The id whose descriptor actually serves this provider (the fallback
    /// id for unknown providers).
    pub effective_provider: String,
}
