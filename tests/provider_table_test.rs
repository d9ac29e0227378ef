//! Descriptor table lifecycle: dynamic registration, aliases, cleanup scope.

mod common;

use common::CountingFactory;
use modelrelay::provider::ids;
use modelrelay::{DynamicRegistration, ProviderDescriptor, ProviderTable};

fn registration(id: &str) -> DynamicRegistration {
    DynamicRegistration::new(ProviderDescriptor::new(
        id,
        format!("Provider {id}"),
        CountingFactory::new(id),
    ))
}

#[test]
fn every_base_id_rejects_dynamic_collision() {
    let table = ProviderTable::new();
    for base in ids::base_provider_ids() {
        assert!(
            !table.register_dynamic(registration(base)),
            "base id '{base}' must reject dynamic registration"
        );
        let descriptor = table.get(base).unwrap();
        assert_eq!(descriptor.id, base);
        assert!(table.is_base(base));
    }
}

#[test]
fn register_many_counts_only_successes() {
    let table = ProviderTable::new();
    let batch = vec![
        registration("alpha"),
        registration("openai"), // collides with a base id
        registration("beta"),
        DynamicRegistration::new(ProviderDescriptor::new(
            "",
            "Nameless",
            CountingFactory::new("nameless"),
        )),
    ];
    assert_eq!(table.register_many(batch), 2);
    assert_eq!(table.list_dynamic(), vec!["alpha", "beta"]);
}

#[test]
fn alias_chain_resolves_to_the_same_canonical_id() {
    let table = ProviderTable::new();
    let reg = registration("p").with_mapping("a", "p").with_mapping("b", "p");
    assert!(table.register_dynamic(reg));

    for name in ["a", "b", "p"] {
        assert_eq!(table.resolve_alias(name).as_deref(), Some("p"));
    }
    let info = table.provider_info("p");
    assert!(info.is_supported);
    assert_eq!(info.effective_provider, "p");
}

#[test]
fn cleanup_with_a_hundred_dynamic_entries_leaves_base_intact() {
    let table = ProviderTable::new();
    let base_count = table.list_descriptors().len();

    for i in 0..100 {
        let id = format!("dyn-{i}");
        let reg = registration(&id).with_mapping(format!("alias-{i}"), id.clone());
        assert!(table.register_dynamic(reg));
    }
    assert_eq!(table.list_dynamic().len(), 100);
    assert_eq!(table.alias_map().len(), 100);

    table.cleanup();

    assert!(table.list_dynamic().is_empty());
    assert!(table.alias_map().is_empty());
    assert_eq!(table.list_descriptors().len(), base_count);
    for base in ids::base_provider_ids() {
        assert_eq!(table.get(base).unwrap().id, base);
    }
}

#[test]
fn unknown_ids_fall_back_to_openai_compatible() {
    let table = ProviderTable::new();
    let descriptor = table.get("some-vendor-nobody-registered").unwrap();
    assert_eq!(descriptor.id, ids::OPENAI_COMPATIBLE);

    let info = table.provider_info("some-vendor-nobody-registered");
    assert!(info.is_supported);
    assert_eq!(info.effective_provider, ids::OPENAI_COMPATIBLE);
    assert!(!table.is_supported(""));
}

#[test]
fn dynamic_registration_overrides_resolve_before_fallback() {
    let table = ProviderTable::new();
    assert!(table.register_dynamic(registration("custom")));
    assert_eq!(table.get("custom").unwrap().id, "custom");

    assert!(table.unregister_dynamic("custom"));
    // Back to the fallback once the dynamic entry is gone.
    assert_eq!(table.get("custom").unwrap().id, ids::OPENAI_COMPATIBLE);
}
