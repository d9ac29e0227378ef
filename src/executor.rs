//! Call executor: the façade tying registry, cache and plugins together.
//!
//! An executor is bound to one `provider:model` pair and one plugin set.
//! Every invocation runs the full hook pipeline: start hooks, model
//! resolution, parameter transforms, the backend call, result transforms
//! (materialized calls only) and end hooks. Failures anywhere in the
//! pipeline reach the `on_error` hooks and are then re-raised unchanged.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{LanguageModel, ProviderClient};
use crate::error::RelayError;
use crate::plugins::{CallOutcome, Plugin, PluginEngine, RequestContext};
use crate::registry::{default_registry, RegistryManager};
use crate::stream::{apply_stream_transforms, EventStream};
use crate::types::{CallParams, CallResult};

#[derive(Clone, Copy)]
enum CallKind {
    Text,
    Object,
}

/// Plugin-aware executor for one fully-qualified model.
pub struct Executor {
    registry: Arc<RegistryManager>,
    engine: PluginEngine,
    provider_id: String,
    model_id: String,
}

impl Executor {
    pub fn new(
        registry: Arc<RegistryManager>,
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Self {
        Self {
            registry,
            engine: PluginEngine::new(plugins),
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn registry(&self) -> &Arc<RegistryManager> {
        &self.registry
    }

    /// The plugin pipeline, for installing or removing plugins after
    /// construction.
    pub fn engine_mut(&mut self) -> &mut PluginEngine {
        &mut self.engine
    }

    pub async fn generate_text(&self, params: CallParams) -> Result<CallResult, RelayError> {
        self.generate_text_with_cancel(params, CancellationToken::new())
            .await
    }

    pub async fn generate_text_with_cancel(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<CallResult, RelayError> {
        self.execute(CallKind::Text, params, cancel).await
    }

    pub async fn generate_object(&self, params: CallParams) -> Result<CallResult, RelayError> {
        self.generate_object_with_cancel(params, CancellationToken::new())
            .await
    }

    pub async fn generate_object_with_cancel(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<CallResult, RelayError> {
        self.execute(CallKind::Object, params, cancel).await
    }

    pub async fn stream_text(&self, params: CallParams) -> Result<EventStream, RelayError> {
        self.stream_text_with_cancel(params, CancellationToken::new())
            .await
    }

    pub async fn stream_text_with_cancel(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<EventStream, RelayError> {
        self.execute_stream(CallKind::Text, params, cancel).await
    }

    pub async fn stream_object(&self, params: CallParams) -> Result<EventStream, RelayError> {
        self.stream_object_with_cancel(params, CancellationToken::new())
            .await
    }

    pub async fn stream_object_with_cancel(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<EventStream, RelayError> {
        self.execute_stream(CallKind::Object, params, cancel).await
    }

    /// Run the materialized pipeline around a caller-supplied invocation.
    ///
    /// The closure receives the effective model id (after plugin rewrites),
    /// the transformed parameters, the resolved client and the cancellation
    /// token. Result transforms and end hooks still run on what it returns.
    pub async fn execute_with<F, Fut>(
        &self,
        params: CallParams,
        cancel: CancellationToken,
        invoke: F,
    ) -> Result<CallResult, RelayError>
    where
        F: FnOnce(String, CallParams, Arc<dyn ProviderClient>, CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<CallResult, RelayError>> + Send,
    {
        let ctx = self.context(&cancel);
        let run = async {
            let (params, client) = self.prepare(params, &ctx).await?;
            let result = invoke(ctx.model_id(), params, client, cancel).await?;
            let result = self.engine.transform_result(result, &ctx).await?;
            self.engine
                .run_end(&ctx, &CallOutcome::Completed(result.clone()))
                .await?;
            Ok(result)
        };
        match run.await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.engine.run_error(&ctx, &e).await;
                Err(e)
            }
        }
    }

    /// Streaming counterpart of [`execute_with`](Self::execute_with):
    /// result transforms are skipped, plugin stream decorators are composed
    /// over the returned stream, and end hooks observe the stream-started
    /// outcome.
    pub async fn stream_with<F, Fut>(
        &self,
        params: CallParams,
        cancel: CancellationToken,
        invoke: F,
    ) -> Result<EventStream, RelayError>
    where
        F: FnOnce(String, CallParams, Arc<dyn ProviderClient>, CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<EventStream, RelayError>> + Send,
    {
        let ctx = self.context(&cancel);
        let run = async {
            let (params, client) = self.prepare(params, &ctx).await?;
            let stream = invoke(ctx.model_id(), params, client, cancel).await?;

            let transforms = self.engine.stream_transforms(&ctx);
            let stream = apply_stream_transforms(&transforms, stream);

            ctx.mark_stream_started();
            self.engine.run_end(&ctx, &CallOutcome::StreamStarted).await?;
            Ok(stream)
        };
        match run.await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                self.engine.run_error(&ctx, &e).await;
                Err(e)
            }
        }
    }

    fn context(&self, cancel: &CancellationToken) -> RequestContext {
        RequestContext::new(&self.provider_id, &self.model_id).with_cancellation(cancel.clone())
    }

    /// Shared front half of every call: start hooks, model resolution,
    /// parameter transforms, client resolution.
    async fn prepare(
        &self,
        params: CallParams,
        ctx: &RequestContext,
    ) -> Result<(CallParams, Arc<dyn ProviderClient>), RelayError> {
        self.engine.run_start(ctx).await?;
        self.engine.resolve_model(ctx).await?;
        let params = self.engine.transform_params(params, ctx).await?;

        debug!(
            request_id = %ctx.request_id,
            provider_id = %self.provider_id,
            model_id = %ctx.model_id(),
            "resolving provider client"
        );
        let client = self.registry.client_for(&self.provider_id).await?;
        Ok((params, client))
    }

    fn language_model(
        client: &Arc<dyn ProviderClient>,
        model_id: &str,
    ) -> Result<Arc<dyn LanguageModel>, RelayError> {
        client.language_model(model_id)
    }

    async fn execute(
        &self,
        kind: CallKind,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<CallResult, RelayError> {
        self.execute_with(params, cancel, move |model_id, params, client, cancel| async move {
            let model = Self::language_model(&client, &model_id)?;
            match kind {
                CallKind::Text => model.generate_text(params, cancel).await,
                CallKind::Object => model.generate_object(params, cancel).await,
            }
        })
        .await
    }

    async fn execute_stream(
        &self,
        kind: CallKind,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<EventStream, RelayError> {
        self.stream_with(params, cancel, move |model_id, params, client, cancel| async move {
            let model = Self::language_model(&client, &model_id)?;
            match kind {
                CallKind::Text => model.stream_text(params, cancel).await,
                CallKind::Object => model.stream_object(params, cancel).await,
            }
        })
        .await
    }
}

/// Build an executor against the process-default registry.
pub fn create_executor(
    provider_id: impl Into<String>,
    model_id: impl Into<String>,
    plugins: Vec<Arc<dyn Plugin>>,
) -> Executor {
    Executor::new(default_registry(), provider_id, model_id, plugins)
}
