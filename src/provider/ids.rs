//! Built-in provider ids and base descriptor seeds.
//!
//! The base set mirrors the providers every deployment understands out of
//! the box. All of them construct a [`GenericClient`] whose invocation
//! shapes run through the transport carried in the connection options;
//! native client implementations can be registered on top at runtime.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::{GenericClient, ProviderClient};
use crate::error::RelayError;
use crate::types::ProviderOptions;

use super::descriptor::{ClientFactory, ProviderDescriptor};

pub const OPENAI: &str = "openai";
pub const OPENAI_RESPONSES: &str = "openai-responses";
pub const OPENAI_COMPATIBLE: &str = "openai-compatible";
pub const ANTHROPIC: &str = "anthropic";
pub const GOOGLE: &str = "google";
pub const XAI: &str = "xai";
pub const AZURE: &str = "azure";
pub const DEEPSEEK: &str = "deepseek";

/// Factory that builds a [`GenericClient`] for a fixed provider id.
pub struct GenericClientFactory {
    provider_id: String,
}

impl GenericClientFactory {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

#[async_trait]
impl ClientFactory for GenericClientFactory {
    async fn create(
        &self,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ProviderClient>, RelayError> {
        Ok(Arc::new(GenericClient::new(
            self.provider_id.clone(),
            options.clone(),
        )))
    }
}

fn seed(id: &str, display_name: &str, image: bool) -> ProviderDescriptor {
    let descriptor =
        ProviderDescriptor::new(id, display_name, Arc::new(GenericClientFactory::new(id)));
    if image {
        descriptor.with_image_generation()
    } else {
        descriptor
    }
}

/// The immutable base descriptor set seeded into every default table.
pub(crate) fn base_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        seed(OPENAI, "OpenAI", true),
        seed(OPENAI_RESPONSES, "OpenAI Responses", true),
        seed(OPENAI_COMPATIBLE, "OpenAI Compatible", true),
        seed(ANTHROPIC, "Anthropic", false),
        seed(GOOGLE, "Google Generative AI", true),
        seed(XAI, "xAI (Grok)", true),
        seed(AZURE, "Azure OpenAI", true),
        seed(DEEPSEEK, "DeepSeek", false),
    ]
}

/// All built-in ids, in seed order.
pub fn base_provider_ids() -> Vec<&'static str> {
    vec![
        OPENAI,
        OPENAI_RESPONSES,
        OPENAI_COMPATIBLE,
        ANTHROPIC,
        GOOGLE,
        XAI,
        AZURE,
        DEEPSEEK,
    ]
}
