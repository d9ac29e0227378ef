//! Scripted transports and counting factories for tests.
//!
//! Used by this crate's own suites and handy for hosts testing their
//! integration without a live backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client::{BackendTransport, GenericClient, ProviderClient};
use crate::error::RelayError;
use crate::provider::descriptor::ClientFactory;
use crate::stream::{stream_from_events, EventStream, StreamEvent};
use crate::types::{CallParams, CallResult, FinishReason, ProviderOptions};

/// One invocation as seen by a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub provider_id: String,
    pub model_id: String,
    pub params: CallParams,
}

/// Transport that answers every call from a canned script and records what
/// it was asked.
pub struct ScriptedTransport {
    reply: String,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, provider_id: &str, model_id: &str, params: &CallParams) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                provider_id: provider_id.to_string(),
                model_id: model_id.to_string(),
                params: params.clone(),
            });
    }
}

#[async_trait]
impl BackendTransport for ScriptedTransport {
    async fn generate(
        &self,
        provider_id: &str,
        model_id: &str,
        params: &CallParams,
        _cancel: &CancellationToken,
    ) -> Result<CallResult, RelayError> {
        self.record(provider_id, model_id, params);
        if params.response_schema.is_some() {
            return Ok(CallResult::object(
                serde_json::json!({ "reply": self.reply }),
            ));
        }
        Ok(CallResult::text(self.reply.clone()))
    }

    async fn stream(
        &self,
        provider_id: &str,
        model_id: &str,
        params: &CallParams,
        _cancel: &CancellationToken,
    ) -> Result<EventStream, RelayError> {
        self.record(provider_id, model_id, params);
        Ok(stream_from_events(vec![
            StreamEvent::StreamStart {
                model_id: model_id.to_string(),
            },
            StreamEvent::TextDelta {
                delta: self.reply.clone(),
            },
            StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: None,
            },
        ]))
    }
}

/// Transport whose every call fails, for error-path tests.
pub struct FailingTransport;

#[async_trait]
impl BackendTransport for FailingTransport {
    async fn generate(
        &self,
        _provider_id: &str,
        _model_id: &str,
        _params: &CallParams,
        _cancel: &CancellationToken,
    ) -> Result<CallResult, RelayError> {
        Err(RelayError::CallExecution("backend unavailable".to_string()))
    }

    async fn stream(
        &self,
        _provider_id: &str,
        _model_id: &str,
        _params: &CallParams,
        _cancel: &CancellationToken,
    ) -> Result<EventStream, RelayError> {
        Err(RelayError::CallExecution("backend unavailable".to_string()))
    }
}

/// Factory that counts constructions and can stall, so tests can prove at
/// most one construction runs per fingerprint.
pub struct CountingFactory {
    pub provider_id: String,
    pub constructions: AtomicUsize,
    pub delay: Option<Duration>,
}

impl CountingFactory {
    pub fn new(provider_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            provider_id: provider_id.into(),
            constructions: AtomicUsize::new(0),
            delay: None,
        })
    }

    pub fn slow(provider_id: impl Into<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            provider_id: provider_id.into(),
            constructions: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for CountingFactory {
    async fn create(
        &self,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ProviderClient>, RelayError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Arc::new(GenericClient::new(
            self.provider_id.clone(),
            options.clone(),
        )))
    }
}
