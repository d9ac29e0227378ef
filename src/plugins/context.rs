//! Per-call context shared across hook invocations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mutable call-scoped state visible to every hook of a pipeline run.
///
/// Hooks run concurrently in some phases, so the mutable pieces sit behind
/// their own locks and the context itself is only ever borrowed shared.
pub struct RequestContext {
    pub request_id: Uuid,
    pub provider_id: String,
    /// Model id as supplied by the caller, before any plugin rewrote it.
    pub original_model_id: String,
    pub started_at: DateTime<Utc>,
    /// Caller's cancellation token; hooks may cancel it or race against it.
    pub cancel: CancellationToken,
    model_id: RwLock<String>,
    stream_started: AtomicBool,
    metadata: Mutex<Map<String, Value>>,
}

impl RequestContext {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            request_id: Uuid::new_v4(),
            provider_id: provider_id.into(),
            original_model_id: model_id.clone(),
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            model_id: RwLock::new(model_id),
            stream_started: AtomicBool::new(false),
            metadata: Mutex::new(Map::new()),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The effective model id, reflecting any plugin rewrite.
    pub fn model_id(&self) -> String {
        self.model_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_model_id(&self, model_id: String) {
        *self.model_id.write().unwrap_or_else(|e| e.into_inner()) = model_id;
    }

    /// Whether stream events started flowing to the caller. Once set, result
    /// transforms no longer apply.
    pub fn stream_started(&self) -> bool {
        self.stream_started.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stream_started(&self) {
        self.stream_started.store(true, Ordering::Release);
    }

    /// Attach an arbitrary value for later hooks (or the host) to read.
    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn metadata_snapshot(&self) -> Map<String, Value> {
        self.metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
