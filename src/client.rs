//! Backend client boundary.
//!
//! The engine never implements a vendor wire format. It consumes clients
//! through [`ProviderClient`], which exposes per-capability model handles,
//! and those handles perform the actual backend invocation. The built-in
//! [`GenericClient`] covers every provider the crate seeds by delegating its
//! invocation shapes to an injected [`BackendTransport`]; native clients can
//! implement [`ProviderClient`] directly.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::stream::EventStream;
use crate::types::{CallParams, CallResult, ProviderOptions};

/// A constructed backend client, addressable by the registry and cacheable
/// by the client factory.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Liveness check consulted on cache lookup. A client reporting `false`
    /// is evicted and rebuilt.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Configuration self-check, run after construction and on cache lookup.
    fn validate_config(&self) -> Result<(), RelayError> {
        Ok(())
    }

    /// Release held resources. Called when the cache evicts this client.
    async fn shutdown(&self) {}

    fn language_model(&self, _model_id: &str) -> Result<Arc<dyn LanguageModel>, RelayError> {
        Err(RelayError::unsupported(self.provider_id(), "language models"))
    }

    fn embedding_model(&self, _model_id: &str) -> Result<Arc<dyn EmbeddingModel>, RelayError> {
        Err(RelayError::unsupported(self.provider_id(), "embedding models"))
    }

    fn image_model(&self, _model_id: &str) -> Result<Arc<dyn ImageModel>, RelayError> {
        Err(RelayError::unsupported(self.provider_id(), "image models"))
    }

    fn speech_model(&self, _model_id: &str) -> Result<Arc<dyn SpeechModel>, RelayError> {
        Err(RelayError::unsupported(self.provider_id(), "speech models"))
    }

    fn transcription_model(
        &self,
        _model_id: &str,
    ) -> Result<Arc<dyn TranscriptionModel>, RelayError> {
        Err(RelayError::unsupported(
            self.provider_id(),
            "transcription models",
        ))
    }
}

/// Language model handle: the four invocation shapes.
///
/// The cancellation token is the caller's; cancelling it must cancel
/// in-flight backend work rather than leaking it.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate_text(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<CallResult, RelayError>;

    async fn stream_text(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<EventStream, RelayError>;

    async fn generate_object(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<CallResult, RelayError>;

    async fn stream_object(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<EventStream, RelayError>;
}

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RelayError>;
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Returns generated images as base64 payloads or URLs, backend's choice.
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, RelayError>;
}

#[async_trait]
pub trait SpeechModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, RelayError>;
}

#[async_trait]
pub trait TranscriptionModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn transcribe(&self, audio: &[u8]) -> Result<String, RelayError>;
}

/// Wire-level collaborator for the generic client.
///
/// Structured-object calls arrive with `params.response_schema` set; the
/// transport decides how to map that onto the vendor API.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn generate(
        &self,
        provider_id: &str,
        model_id: &str,
        params: &CallParams,
        cancel: &CancellationToken,
    ) -> Result<CallResult, RelayError>;

    async fn stream(
        &self,
        provider_id: &str,
        model_id: &str,
        params: &CallParams,
        cancel: &CancellationToken,
    ) -> Result<EventStream, RelayError>;
}

/// Default client for providers without a native implementation.
///
/// Holds the provider id and connection options; all invocation shapes go
/// through the transport carried in [`ProviderOptions`]. Without a transport
/// the client still constructs and validates (so resolution of unknown
/// providers via the openai-compatible fallback succeeds), but invocation
/// fails with `CallExecution`.
pub struct GenericClient {
    provider_id: String,
    options: ProviderOptions,
}

impl GenericClient {
    pub fn new(provider_id: impl Into<String>, options: ProviderOptions) -> Self {
        Self {
            provider_id: provider_id.into(),
            options,
        }
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }
}

#[async_trait]
impl ProviderClient for GenericClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn validate_config(&self) -> Result<(), RelayError> {
        if let Some(url) = &self.options.base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(RelayError::client_config(
                &self.provider_id,
                format!("base_url must be an http(s) URL, got '{url}'"),
            ));
        }
        Ok(())
    }

    fn language_model(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, RelayError> {
        Ok(Arc::new(GenericLanguageModel {
            provider_id: self.provider_id.clone(),
            model_id: model_id.to_string(),
            transport: self.options.transport.clone(),
        }))
    }
}

struct GenericLanguageModel {
    provider_id: String,
    model_id: String,
    transport: Option<Arc<dyn BackendTransport>>,
}

impl GenericLanguageModel {
    fn transport(&self) -> Result<&Arc<dyn BackendTransport>, RelayError> {
        self.transport.as_ref().ok_or_else(|| {
            RelayError::CallExecution(format!(
                "no backend transport bound for provider '{}'",
                self.provider_id
            ))
        })
    }
}

#[async_trait]
impl LanguageModel for GenericLanguageModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<CallResult, RelayError> {
        self.transport()?
            .generate(&self.provider_id, &self.model_id, &params, &cancel)
            .await
    }

    async fn stream_text(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<EventStream, RelayError> {
        self.transport()?
            .stream(&self.provider_id, &self.model_id, &params, &cancel)
            .await
    }

    async fn generate_object(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<CallResult, RelayError> {
        if params.response_schema.is_none() {
            return Err(RelayError::InvalidParameter(
                "generate_object requires a response_schema".to_string(),
            ));
        }
        self.transport()?
            .generate(&self.provider_id, &self.model_id, &params, &cancel)
            .await
    }

    async fn stream_object(
        &self,
        params: CallParams,
        cancel: CancellationToken,
    ) -> Result<EventStream, RelayError> {
        if params.response_schema.is_none() {
            return Err(RelayError::InvalidParameter(
                "stream_object requires a response_schema".to_string(),
            ));
        }
        self.transport()?
            .stream(&self.provider_id, &self.model_id, &params, &cancel)
            .await
    }
}
