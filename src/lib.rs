//! Provider-agnostic model invocation layer.
//!
//! `modelrelay` routes fully-qualified model ids (`provider:model`) to
//! backend clients through a descriptor table, caches constructed clients by
//! connection fingerprint, and wraps every invocation in an ordered plugin
//! pipeline. The crate speaks no vendor wire format itself; backends plug in
//! through the [`client::BackendTransport`] seam or by implementing
//! [`client::ProviderClient`] directly.
//!
//! # Quick start
//!
//! ```no_run
//! use modelrelay::prelude::*;
//!
//! # async fn run() -> Result<(), RelayError> {
//! let executor = create_executor("openai", "gpt-4o", vec![]);
//! let params = CallParams::new(vec![Message::user("Hello!")]);
//! let result = executor.generate_text(params).await?;
//! println!("{}", result.text.unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`provider`] — descriptor table: base + dynamic provider registrations
//!   and alias mappings, with `openai-compatible` as the universal fallback.
//! - [`factory`] — fingerprint-keyed client cache; at most one construction
//!   per fingerprint even under concurrent lookups.
//! - [`registry`] — `provider:model` resolution to capability handles, and
//!   the hub router for `hub:provider:model` addresses.
//! - [`plugins`] — the hook pipeline: start hooks, model resolution,
//!   parameter/result transforms, stream decorators, end and error hooks.
//! - [`executor`] — the per-model façade tying the above together.

pub mod client;
pub mod error;
pub mod executor;
pub mod factory;
pub mod plugins;
pub mod provider;
pub mod registry;
pub mod stream;
pub mod test_support;
pub mod types;

pub use client::{
    BackendTransport, EmbeddingModel, GenericClient, ImageModel, LanguageModel, ProviderClient,
    SpeechModel, TranscriptionModel,
};
pub use error::RelayError;
pub use executor::{create_executor, Executor};
pub use factory::{client_fingerprint, CacheStats, ClientCache};
pub use plugins::{CallOutcome, Enforce, Plugin, PluginEngine, PluginStats, RequestContext};
pub use provider::{
    default_table, ClientFactory, DynamicRegistration, ProviderDescriptor, ProviderInfo,
    ProviderTable,
};
pub use registry::{default_registry, split_id, HubProvider, RegistryManager, ID_SEPARATOR};
pub use stream::{
    apply_stream_transforms, coalesce_text, stream_from_events, EventStream, StreamEvent,
    StreamTransform,
};
pub use types::{
    CallParams, CallResult, FinishReason, Message, MessageRole, ProviderOptions, ToolCall,
    ToolDefinition, Usage,
};

/// Everything most hosts need, importable in one line.
pub mod prelude {
    pub use crate::client::{BackendTransport, LanguageModel, ProviderClient};
    pub use crate::error::RelayError;
    pub use crate::executor::{create_executor, Executor};
    pub use crate::plugins::{CallOutcome, Enforce, Plugin, RequestContext};
    pub use crate::provider::{DynamicRegistration, ProviderDescriptor};
    pub use crate::registry::{default_registry, HubProvider, RegistryManager};
    pub use crate::stream::{EventStream, StreamEvent, StreamTransform};
    pub use crate::types::{
        CallParams, CallResult, FinishReason, Message, ProviderOptions, Usage,
    };
}
