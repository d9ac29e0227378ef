//! Error types for the invocation layer.
//!
//! Every failure in this crate is scoped to a single call or registration
//! attempt; nothing here is fatal to the process. Registration-time errors
//! are surfaced synchronously, per-call errors always reach `on_error` hooks
//! before being re-raised to the caller.

use thiserror::Error;

/// Unified error type for registry, factory, plugin and call failures.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or colliding provider registration.
    #[error("Invalid provider descriptor: {0}")]
    InvalidDescriptor(String),

    /// Client construction failed (factory missing or returned an error).
    #[error("Failed to construct client for provider '{provider_id}': {message}")]
    ProviderConstruction {
        provider_id: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A freshly constructed client failed its configuration self-check.
    #[error("Invalid client configuration for provider '{provider_id}': {message}")]
    ClientConfig {
        provider_id: String,
        message: String,
    },

    /// Capability lookup against an unknown id or address.
    #[error("Not registered: {0}")]
    NotRegistered(String),

    /// Malformed hub address or missing sub-provider/capability.
    #[error("Hub '{hub_id}' routing failed: {message}")]
    HubRouting {
        hub_id: String,
        provider_id: Option<String>,
        message: String,
    },

    /// A plugin hook failed; `plugin` names the originating plugin.
    #[error("Plugin '{plugin}' failed: {message}")]
    PluginExecution { plugin: String, message: String },

    /// A registered client does not expose the requested capability.
    #[error("Provider '{provider_id}' does not support {capability}")]
    UnsupportedCapability {
        provider_id: String,
        capability: String,
    },

    /// The backend invocation itself failed. Passed through, never swallowed.
    #[error("Call execution failed: {0}")]
    CallExecution(String),

    /// Invalid caller-supplied parameter (e.g. a malformed `provider:model` id).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Internal invariant violation (poisoned lock, missing fallback).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Construction failure with an underlying cause.
    pub fn construction(
        provider_id: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ProviderConstruction {
            provider_id: provider_id.into(),
            message: message.into(),
            source,
        }
    }

    pub fn client_config(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClientConfig {
            provider_id: provider_id.into(),
            message: message.into(),
        }
    }

    pub fn not_registered(what: impl Into<String>) -> Self {
        Self::NotRegistered(what.into())
    }

    pub fn hub_routing(
        hub_id: impl Into<String>,
        provider_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::HubRouting {
            hub_id: hub_id.into(),
            provider_id,
            message: message.into(),
        }
    }

    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginExecution {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(provider_id: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::UnsupportedCapability {
            provider_id: provider_id.into(),
            capability: capability.into(),
        }
    }

    /// True for `NotRegistered`, used by callers that treat absence as a miss.
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NotRegistered(_))
    }

    pub fn is_hub_routing(&self) -> bool {
        matches!(self, Self::HubRouting { .. })
    }
}
