//! Hook pipeline execution.
//!
//! The engine owns an ordered plugin list and exposes one method per
//! pipeline phase. Effective order is registration order adjusted by each
//! plugin's [`Enforce`] position: `Pre` plugins first, `Post` plugins last,
//! ties broken by registration order. Plugin names are unique; re-adding a
//! name replaces the existing plugin in place.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::stream::StreamTransform;
use crate::types::{CallParams, CallResult};

use super::context::RequestContext;
use super::{CallOutcome, Plugin};

/// Count and names of the installed plugins, in effective order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginStats {
    pub count: usize,
    pub names: Vec<String>,
}

pub struct PluginEngine {
    /// Registration order; the position survives in-place replacement.
    registered: Vec<Arc<dyn Plugin>>,
    /// Registration order adjusted by enforce positions.
    ordered: Vec<Arc<dyn Plugin>>,
}

impl PluginEngine {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let mut engine = Self {
            registered: Vec::new(),
            ordered: Vec::new(),
        };
        engine.use_plugins(plugins);
        engine
    }

    /// Install a plugin. A plugin with the same name is replaced in place,
    /// keeping its registration position.
    pub fn use_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        match self
            .registered
            .iter()
            .position(|p| p.name() == plugin.name())
        {
            Some(i) => {
                debug!(plugin = plugin.name(), "replacing plugin in place");
                self.registered[i] = plugin;
            }
            None => self.registered.push(plugin),
        }
        self.resort();
    }

    pub fn use_plugins(&mut self, plugins: Vec<Arc<dyn Plugin>>) {
        for plugin in plugins {
            self.use_plugin(plugin);
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.registered.len();
        self.registered.retain(|p| p.name() != name);
        let removed = self.registered.len() != before;
        if removed {
            self.resort();
        }
        removed
    }

    fn resort(&mut self) {
        let mut ordered = self.registered.clone();
        // Stable sort keeps registration order within each enforce class.
        ordered.sort_by_key(|p| p.enforce());
        self.ordered = ordered;
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Plugins in effective order.
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.ordered
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.ordered.iter().map(|p| p.name()).collect()
    }

    pub fn stats(&self) -> PluginStats {
        PluginStats {
            count: self.ordered.len(),
            names: self.ordered.iter().map(|p| p.name().to_string()).collect(),
        }
    }

    /// Pick the first error in effective plugin order and log the rest.
    /// Keeps concurrent-phase failures deterministic for the caller.
    fn first_error(
        &self,
        phase: &str,
        results: Vec<Result<(), RelayError>>,
    ) -> Result<(), RelayError> {
        let mut first = None;
        for (plugin, result) in self.ordered.iter().zip(results) {
            if let Err(e) = result {
                if first.is_none() {
                    first = Some(e);
                } else {
                    warn!(plugin = plugin.name(), phase, error = %e, "suppressing additional hook failure");
                }
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run every `on_request_start` hook concurrently.
    pub async fn run_start(&self, ctx: &RequestContext) -> Result<(), RelayError> {
        let results = join_all(self.ordered.iter().map(|p| p.on_request_start(ctx))).await;
        self.first_error("on_request_start", results)
    }

    /// Consult plugins in order; the first `Some` rewrite wins and is
    /// recorded on the context.
    pub async fn resolve_model(&self, ctx: &RequestContext) -> Result<(), RelayError> {
        for plugin in &self.ordered {
            if let Some(model) = plugin.resolve_model(ctx).await? {
                debug!(
                    plugin = plugin.name(),
                    from = %ctx.model_id(),
                    to = %model,
                    "plugin rewrote model id"
                );
                ctx.set_model_id(model);
                return Ok(());
            }
        }
        Ok(())
    }

    /// Fold the parameters through every plugin, in order.
    pub async fn transform_params(
        &self,
        mut params: CallParams,
        ctx: &RequestContext,
    ) -> Result<CallParams, RelayError> {
        for plugin in &self.ordered {
            params = plugin.transform_params(params, ctx).await?;
        }
        Ok(params)
    }

    /// Fold the result through every plugin, in order. Callers must skip
    /// this once streaming has started.
    pub async fn transform_result(
        &self,
        mut result: CallResult,
        ctx: &RequestContext,
    ) -> Result<CallResult, RelayError> {
        for plugin in &self.ordered {
            result = plugin.transform_result(result, ctx).await?;
        }
        Ok(result)
    }

    /// Collect stream decorators in effective plugin order.
    pub fn stream_transforms(&self, ctx: &RequestContext) -> Vec<Arc<dyn StreamTransform>> {
        self.ordered
            .iter()
            .filter_map(|p| p.stream_transform(ctx))
            .collect()
    }

    /// Run every `on_request_end` hook concurrently.
    pub async fn run_end(
        &self,
        ctx: &RequestContext,
        outcome: &CallOutcome,
    ) -> Result<(), RelayError> {
        let results = join_all(self.ordered.iter().map(|p| p.on_request_end(ctx, outcome))).await;
        self.first_error("on_request_end", results)
    }

    /// Run every `on_error` hook concurrently. Hook failures never mask the
    /// triggering error; they are logged and dropped.
    pub async fn run_error(&self, ctx: &RequestContext, error: &RelayError) {
        let results = join_all(self.ordered.iter().map(|p| p.on_error(ctx, error))).await;
        for (plugin, result) in self.ordered.iter().zip(results) {
            if let Err(e) = result {
                warn!(plugin = plugin.name(), error = %e, "on_error hook itself failed");
            }
        }
    }
}

impl Default for PluginEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
