//! Ready-made plugins covering common pipeline needs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::info;

use crate::error::RelayError;
use crate::stream::{EventStream, StreamEvent, StreamTransform};
use crate::types::{CallParams, CallResult};

use super::context::RequestContext;
use super::{CallOutcome, Enforce, Plugin};

/// Rewrites friendly model names to concrete model ids.
///
/// Runs in the `Pre` slot so every later plugin sees the concrete id.
pub struct ModelAliasPlugin {
    aliases: HashMap<String, String>,
}

impl ModelAliasPlugin {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    pub fn single(alias: impl Into<String>, target: impl Into<String>) -> Self {
        let mut aliases = HashMap::new();
        aliases.insert(alias.into(), target.into());
        Self { aliases }
    }
}

#[async_trait]
impl Plugin for ModelAliasPlugin {
    fn name(&self) -> &str {
        "model-alias"
    }

    fn enforce(&self) -> Enforce {
        Enforce::Pre
    }

    async fn resolve_model(&self, ctx: &RequestContext) -> Result<Option<String>, RelayError> {
        Ok(self.aliases.get(&ctx.model_id()).cloned())
    }
}

/// Fills in parameter defaults the caller left unset.
pub struct DefaultParamsPlugin {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[async_trait]
impl Plugin for DefaultParamsPlugin {
    fn name(&self) -> &str {
        "default-params"
    }

    async fn transform_params(
        &self,
        mut params: CallParams,
        _ctx: &RequestContext,
    ) -> Result<CallParams, RelayError> {
        if params.temperature.is_none() {
            params.temperature = self.temperature;
        }
        if params.max_tokens.is_none() {
            params.max_tokens = self.max_tokens;
        }
        Ok(params)
    }
}

/// Replaces a fixed pattern in model output, both materialized and
/// streamed. Streamed replacement is per-delta; patterns split across
/// delta boundaries pass through.
pub struct TextFilterPlugin {
    pattern: String,
    replacement: String,
}

impl TextFilterPlugin {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

#[async_trait]
impl Plugin for TextFilterPlugin {
    fn name(&self) -> &str {
        "text-filter"
    }

    async fn transform_result(
        &self,
        mut result: CallResult,
        _ctx: &RequestContext,
    ) -> Result<CallResult, RelayError> {
        if let Some(text) = result.text.take() {
            result.text = Some(text.replace(&self.pattern, &self.replacement));
        }
        Ok(result)
    }

    fn stream_transform(&self, _ctx: &RequestContext) -> Option<Arc<dyn StreamTransform>> {
        Some(Arc::new(TextFilterTransform {
            pattern: self.pattern.clone(),
            replacement: self.replacement.clone(),
        }))
    }
}

struct TextFilterTransform {
    pattern: String,
    replacement: String,
}

impl StreamTransform for TextFilterTransform {
    fn name(&self) -> &str {
        "text-filter"
    }

    fn transform(&self, stream: EventStream) -> EventStream {
        let pattern = self.pattern.clone();
        let replacement = self.replacement.clone();
        Box::pin(stream.map(move |ev| {
            ev.map(|ev| match ev {
                StreamEvent::TextDelta { delta } => StreamEvent::TextDelta {
                    delta: delta.replace(&pattern, &replacement),
                },
                other => other,
            })
        }))
    }
}

/// Emits one structured log line per request, at start and at end.
///
/// Runs in the `Post` slot so the logged model id reflects every rewrite.
pub struct RequestLoggingPlugin;

#[async_trait]
impl Plugin for RequestLoggingPlugin {
    fn name(&self) -> &str {
        "request-logging"
    }

    fn enforce(&self) -> Enforce {
        Enforce::Post
    }

    async fn on_request_start(&self, ctx: &RequestContext) -> Result<(), RelayError> {
        info!(
            request_id = %ctx.request_id,
            provider_id = %ctx.provider_id,
            model_id = %ctx.model_id(),
            "request started"
        );
        Ok(())
    }

    async fn on_request_end(
        &self,
        ctx: &RequestContext,
        outcome: &CallOutcome,
    ) -> Result<(), RelayError> {
        let elapsed_ms = (chrono::Utc::now() - ctx.started_at).num_milliseconds();
        match outcome {
            CallOutcome::Completed(result) => info!(
                request_id = %ctx.request_id,
                model_id = %ctx.model_id(),
                elapsed_ms,
                finish_reason = ?result.finish_reason,
                "request completed"
            ),
            CallOutcome::StreamStarted => info!(
                request_id = %ctx.request_id,
                model_id = %ctx.model_id(),
                elapsed_ms,
                "stream handed to caller"
            ),
        }
        Ok(())
    }

    async fn on_error(&self, ctx: &RequestContext, error: &RelayError) -> Result<(), RelayError> {
        info!(
            request_id = %ctx.request_id,
            model_id = %ctx.model_id(),
            error = %error,
            "request failed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alias_plugin_resolves_known_names_only() {
        let plugin = ModelAliasPlugin::single("fast", "gpt-4o-mini");
        let hit = RequestContext::new("openai", "fast");
        assert_eq!(
            plugin.resolve_model(&hit).await.unwrap(),
            Some("gpt-4o-mini".to_string())
        );
        let miss = RequestContext::new("openai", "gpt-4o");
        assert_eq!(plugin.resolve_model(&miss).await.unwrap(), None);
    }

    #[tokio::test]
    async fn text_filter_rewrites_results_and_deltas() {
        use crate::stream::stream_from_events;

        let plugin = TextFilterPlugin::new("secret", "[redacted]");
        let ctx = RequestContext::new("openai", "gpt-4o");

        let result = plugin
            .transform_result(CallResult::text("the secret word"), &ctx)
            .await
            .unwrap();
        assert_eq!(result.text.as_deref(), Some("the [redacted] word"));

        let transform = plugin.stream_transform(&ctx).unwrap();
        let stream = transform.transform(stream_from_events(vec![StreamEvent::TextDelta {
            delta: "a secret delta".into(),
        }]));
        let out: Vec<_> = stream.map(|e| e.unwrap()).collect().await;
        assert_eq!(
            out,
            vec![StreamEvent::TextDelta {
                delta: "a [redacted] delta".into()
            }]
        );
    }

    #[tokio::test]
    async fn default_params_respect_caller_values() {
        let plugin = DefaultParamsPlugin {
            temperature: Some(0.7),
            max_tokens: Some(1024),
        };
        let ctx = RequestContext::new("openai", "gpt-4o");

        let filled = plugin
            .transform_params(CallParams::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(filled.temperature, Some(0.7));
        assert_eq!(filled.max_tokens, Some(1024));

        let kept = plugin
            .transform_params(CallParams::default().with_temperature(0.1), &ctx)
            .await
            .unwrap();
        assert_eq!(kept.temperature, Some(0.1));
    }
}
