//! Plugin surface: the hook trait and its supporting types.
//!
//! Every hook has a default no-op body, so a plugin implements only the
//! hooks it cares about. Hook errors are propagated to the caller exactly
//! as the hook raised them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::stream::StreamTransform;
use crate::types::{CallParams, CallResult};

pub mod context;
pub mod engine;
pub mod samples;

pub use context::RequestContext;
pub use engine::{PluginEngine, PluginStats};

/// Pipeline position constraint, independent of registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Enforce {
    /// Runs before all normally-ordered plugins.
    Pre,
    #[default]
    Normal,
    /// Runs after all normally-ordered plugins.
    Post,
}

/// What a finished call produced, as seen by `on_request_end`.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// A non-streaming call completed with this (post-transform) result.
    Completed(CallResult),
    /// A streaming call handed its event stream to the caller. The final
    /// result is not observable by the pipeline.
    StreamStarted,
}

/// A pipeline participant. All hooks default to no-ops.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn enforce(&self) -> Enforce {
        Enforce::Normal
    }

    /// Runs concurrently with other plugins' start hooks, before model
    /// resolution.
    async fn on_request_start(&self, _ctx: &RequestContext) -> Result<(), RelayError> {
        Ok(())
    }

    /// Rewrite the model id. The first plugin (in effective order) returning
    /// `Some` wins; later plugins are not consulted.
    async fn resolve_model(&self, _ctx: &RequestContext) -> Result<Option<String>, RelayError> {
        Ok(None)
    }

    /// Sequentially folded over the call parameters before invocation.
    async fn transform_params(
        &self,
        params: CallParams,
        _ctx: &RequestContext,
    ) -> Result<CallParams, RelayError> {
        Ok(params)
    }

    /// Sequentially folded over the result of a non-streaming call. Never
    /// invoked once streaming has started.
    async fn transform_result(
        &self,
        result: CallResult,
        _ctx: &RequestContext,
    ) -> Result<CallResult, RelayError> {
        Ok(result)
    }

    /// Contribute a stream decorator for streaming calls. Decorators are
    /// applied in effective plugin order.
    fn stream_transform(&self, _ctx: &RequestContext) -> Option<Arc<dyn StreamTransform>> {
        None
    }

    /// Runs concurrently with other plugins' end hooks after the call
    /// completed (or its stream was handed over).
    async fn on_request_end(
        &self,
        _ctx: &RequestContext,
        _outcome: &CallOutcome,
    ) -> Result<(), RelayError> {
        Ok(())
    }

    /// Runs concurrently when the call failed. The triggering error is
    /// rethrown afterwards regardless of what the hooks do.
    async fn on_error(&self, _ctx: &RequestContext, _error: &RelayError) -> Result<(), RelayError> {
        Ok(())
    }
}
