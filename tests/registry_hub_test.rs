//! Registry resolution end to end: fallback, aliases, hub routing.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ScriptedTransport;
use modelrelay::provider::ids::GenericClientFactory;
use modelrelay::{
    CallParams, ClientCache, DynamicRegistration, Executor, GenericClient, HubProvider, Message,
    ProviderClient, ProviderDescriptor, ProviderOptions, ProviderTable, RegistryManager,
    RelayError, SpeechModel, TranscriptionModel,
};
use tokio_util::sync::CancellationToken;

fn manager() -> Arc<RegistryManager> {
    Arc::new(RegistryManager::new(
        Arc::new(ProviderTable::new()),
        Arc::new(ClientCache::new()),
    ))
}

fn params() -> CallParams {
    CallParams::new(vec![Message::user("ping")])
}

fn generic_client(id: &str, transport: Arc<dyn modelrelay::BackendTransport>) -> Arc<GenericClient> {
    Arc::new(GenericClient::new(
        id,
        ProviderOptions::new().with_transport(transport),
    ))
}

#[tokio::test]
async fn unknown_provider_id_executes_through_the_fallback() {
    common::init_tracing();
    let manager = manager();
    let transport = ScriptedTransport::new("pong");
    manager.configure(
        "my-gateway",
        ProviderOptions::new()
            .with_api_key("sk-gw")
            .with_base_url("https://gateway.example.com/v1")
            .with_transport(transport.clone()),
    );

    let executor = Executor::new(manager, "my-gateway", "custom-model", vec![]);
    let result = executor.generate_text(params()).await.unwrap();

    assert_eq!(result.text.as_deref(), Some("pong"));
    let calls = transport.recorded();
    assert_eq!(calls.len(), 1);
    // The fallback adapter serves the call.
    assert_eq!(calls[0].provider_id, "openai-compatible");
    assert_eq!(calls[0].model_id, "custom-model");
}

#[tokio::test]
async fn capability_lookups_require_a_registered_client() {
    let manager = manager();

    // Empty registry: nothing resolves, not even base provider ids.
    let Err(err) = manager.language_model("openai:gpt-4o").await else {
        panic!("empty registry must not resolve any model");
    };
    assert!(err.is_not_registered(), "got {err}");

    // Connection options alone do not register a client either; only the
    // executor's construction path falls back to descriptors.
    manager.configure("openai", ProviderOptions::new());
    let Err(err) = manager.language_model("openai:gpt-4o").await else {
        panic!("configured options alone must not resolve a model");
    };
    assert!(err.is_not_registered(), "got {err}");
}

#[tokio::test]
async fn aliases_route_to_the_canonical_provider() {
    let manager = manager();
    let transport = ScriptedTransport::new("ok");

    let reg = DynamicRegistration::new(ProviderDescriptor::new(
        "p",
        "Provider P",
        Arc::new(GenericClientFactory::new("p")),
    ))
    .with_mapping("a", "p")
    .with_mapping("b", "p");
    assert!(manager.table().register_dynamic(reg));
    manager.configure("p", ProviderOptions::new().with_transport(transport.clone()));

    for name in ["a", "b", "p"] {
        let executor = Executor::new(manager.clone(), name, "m1", vec![]);
        executor.generate_text(params()).await.unwrap();
    }

    let calls = transport.recorded();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.provider_id == "p"));
}

#[tokio::test]
async fn hub_routing_is_observably_identical_to_direct_calls() {
    let manager = manager();
    let transport = ScriptedTransport::new("same answer");
    manager.register("openai", generic_client("openai", transport.clone()));
    manager.register("hub", Arc::new(HubProvider::new("hub", manager.clone())));

    let direct = manager
        .language_model("openai:gpt-4o")
        .await
        .unwrap()
        .generate_text(params(), CancellationToken::new())
        .await
        .unwrap();
    let routed = manager
        .language_model("hub:openai:gpt-4o")
        .await
        .unwrap()
        .generate_text(params(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(direct.text, routed.text);
    let calls = transport.recorded();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].provider_id, calls[1].provider_id);
    assert_eq!(calls[0].model_id, calls[1].model_id);
}

#[tokio::test]
async fn hub_registration_serves_the_executor_path() {
    let manager = manager();
    let transport = ScriptedTransport::new("via hub");
    manager.register("openai", generic_client("openai", transport.clone()));
    assert!(manager
        .table()
        .register_dynamic(HubProvider::registration("hub", manager.clone())));

    let executor = Executor::new(manager, "hub", "openai:gpt-4o", vec![]);
    let result = executor.generate_text(params()).await.unwrap();

    assert_eq!(result.text.as_deref(), Some("via hub"));
    assert_eq!(transport.recorded()[0].provider_id, "openai");
}

#[tokio::test]
async fn malformed_hub_addresses_fail_with_a_routing_error() {
    let manager = manager();
    manager.register("hub", Arc::new(HubProvider::new("hub", manager.clone())));

    for bad in ["hub:gpt-4o", "hub:a:b:c", "hub::model"] {
        let Err(err) = manager.language_model(bad).await else {
            panic!("'{bad}' should fail routing");
        };
        assert!(err.is_hub_routing(), "'{bad}' should fail routing, got {err}");
    }
}

#[tokio::test]
async fn hub_addresses_naming_unregistered_providers_fail_eagerly() {
    let manager = manager();
    manager.register("hub", Arc::new(HubProvider::new("hub", manager.clone())));

    let Err(err) = manager.language_model("hub:ghost:some-model").await else {
        panic!("unregistered sub-provider should fail at handle lookup");
    };
    assert!(matches!(
        err,
        RelayError::HubRouting {
            ref hub_id,
            provider_id: Some(ref provider),
            ..
        } if hub_id == "hub" && provider == "ghost"
    ));
}

/// Client exposing only the audio capabilities.
struct VoiceClient;

struct EchoSpeech {
    model_id: String,
}

#[async_trait]
impl SpeechModel for EchoSpeech {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, RelayError> {
        Ok(text.as_bytes().to_vec())
    }
}

struct EchoTranscription {
    model_id: String,
}

#[async_trait]
impl TranscriptionModel for EchoTranscription {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String, RelayError> {
        Ok(String::from_utf8_lossy(audio).into_owned())
    }
}

#[async_trait]
impl ProviderClient for VoiceClient {
    fn provider_id(&self) -> &str {
        "voice"
    }

    fn speech_model(&self, model_id: &str) -> Result<Arc<dyn SpeechModel>, RelayError> {
        Ok(Arc::new(EchoSpeech {
            model_id: model_id.to_string(),
        }))
    }

    fn transcription_model(
        &self,
        model_id: &str,
    ) -> Result<Arc<dyn TranscriptionModel>, RelayError> {
        Ok(Arc::new(EchoTranscription {
            model_id: model_id.to_string(),
        }))
    }
}

#[tokio::test]
async fn hub_routes_speech_and_transcription() {
    let manager = manager();
    manager.register("voice", Arc::new(VoiceClient));
    manager.register("hub", Arc::new(HubProvider::new("hub", manager.clone())));

    let speech = manager.speech_model("hub:voice:tts-1").await.unwrap();
    assert_eq!(speech.model_id(), "tts-1");
    assert_eq!(speech.synthesize("hello").await.unwrap(), b"hello");

    let transcription = manager
        .transcription_model("hub:voice:whisper-1")
        .await
        .unwrap();
    assert_eq!(transcription.transcribe(b"spoken").await.unwrap(), "spoken");

    // The voice client has no language models: routed lookups say so too.
    let Err(err) = manager.language_model("hub:voice:m1").await else {
        panic!("language lookup against an audio-only provider should fail");
    };
    assert!(err.is_hub_routing(), "got {err}");
}

#[tokio::test]
async fn cleanup_keeps_base_providers_usable() {
    let manager = manager();
    let transport = ScriptedTransport::new("alive");
    manager.configure("openai", ProviderOptions::new().with_transport(transport.clone()));
    manager.register("hub", Arc::new(HubProvider::new("hub", manager.clone())));
    assert!(manager
        .table()
        .register_dynamic(HubProvider::registration("hub2", manager.clone())));

    manager.cleanup().await;
    assert!(manager.table().list_dynamic().is_empty());
    assert_eq!(manager.cache_stats().size, 0);
    assert!(!manager.has_clients());

    let executor = Executor::new(manager, "openai", "gpt-4o", vec![]);
    let result = executor.generate_text(params()).await.unwrap();
    assert_eq!(result.text.as_deref(), Some("alive"));
}

#[tokio::test]
async fn directly_registered_clients_bypass_construction() {
    let manager = manager();
    let transport = ScriptedTransport::new("direct");
    let client = generic_client("native", transport.clone());

    assert!(!manager.has_clients());
    manager.register("native", client);
    assert!(manager.has_clients());
    assert_eq!(manager.list_ids(), vec!["native"]);

    let result = manager
        .language_model("native:m1")
        .await
        .unwrap()
        .generate_text(params(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.text.as_deref(), Some("direct"));
    // Nothing was constructed through the cache.
    assert_eq!(manager.cache_stats().size, 0);

    assert!(manager.unregister("native"));
    assert!(!manager.unregister("native"));
    manager.clear();
    assert!(!manager.has_clients());
}

#[tokio::test]
async fn register_many_installs_every_client() {
    let manager = manager();
    let transport = ScriptedTransport::new("bulk");

    let mut clients: HashMap<String, Arc<dyn ProviderClient>> = HashMap::new();
    clients.insert("one".into(), generic_client("one", transport.clone()));
    clients.insert("two".into(), generic_client("two", transport.clone()));
    manager.register_many(clients);

    assert_eq!(manager.list_ids(), vec!["one", "two"]);
    let result = manager
        .language_model("two:m1")
        .await
        .unwrap()
        .generate_text(params(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.text.as_deref(), Some("bulk"));
    assert_eq!(transport.recorded()[0].provider_id, "two");
}

#[tokio::test]
async fn missing_capabilities_read_as_unregistered_addresses() {
    let manager = manager();
    manager.register(
        "openai",
        Arc::new(GenericClient::new("openai", ProviderOptions::new())),
    );

    // The generic client has no embedding support.
    let Err(err) = manager.embedding_model("openai:text-embedding-3-small").await else {
        panic!("embedding lookup against a text-only client should fail");
    };
    assert!(err.is_not_registered(), "got {err}");

    let Err(err) = manager.language_model("no-separator").await else {
        panic!("an id without a separator should be rejected");
    };
    assert!(matches!(err, RelayError::InvalidParameter(_)));
}
