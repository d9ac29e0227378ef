//! Pure validation of descriptors and dynamic registrations.
//!
//! No state lives here; the [`ProviderTable`](super::ProviderTable) calls
//! these checks before admitting a record into its id space.

use std::collections::HashSet;

use crate::error::RelayError;

use super::descriptor::{DynamicRegistration, ProviderDescriptor};

/// Schema-level id validity: any non-empty string.
pub fn is_valid_provider_id(id: &str) -> bool {
    !id.is_empty()
}

/// Validate the common descriptor shape. The construction capability itself
/// is guaranteed by the type system (a descriptor always carries a factory),
/// so only the identifying fields are checked.
pub fn validate_descriptor(descriptor: &ProviderDescriptor) -> Result<(), RelayError> {
    if descriptor.id.is_empty() {
        return Err(RelayError::InvalidDescriptor(
            "provider id must not be empty".to_string(),
        ));
    }
    if descriptor.display_name.is_empty() {
        return Err(RelayError::InvalidDescriptor(format!(
            "provider '{}' has an empty display name",
            descriptor.id
        )));
    }
    Ok(())
}

/// Validate a dynamic registration against the immutable base id space.
///
/// Alias values are checked for shape here; resolvability against the live
/// table is the table's concern since targets include the id being admitted.
pub fn validate_dynamic(
    registration: &DynamicRegistration,
    base_ids: &HashSet<String>,
) -> Result<(), RelayError> {
    validate_descriptor(&registration.descriptor)?;

    let id = &registration.descriptor.id;
    if base_ids.contains(id) {
        return Err(RelayError::InvalidDescriptor(format!(
            "dynamic provider id '{id}' collides with a base provider id"
        )));
    }

    for (alias, target) in &registration.mappings {
        if alias.is_empty() || target.is_empty() {
            return Err(RelayError::InvalidDescriptor(format!(
                "provider '{id}' has an empty alias mapping entry"
            )));
        }
        if base_ids.contains(alias) {
            return Err(RelayError::InvalidDescriptor(format!(
                "alias '{alias}' would shadow a base provider id"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::descriptor::FnClientFactory;
    use crate::types::ProviderOptions;
    use std::sync::Arc;

    fn descriptor(id: &str, name: &str) -> ProviderDescriptor {
        ProviderDescriptor::new(
            id,
            name,
            Arc::new(FnClientFactory(|options: &ProviderOptions| {
                Ok(Arc::new(crate::client::GenericClient::new(
                    "test",
                    options.clone(),
                )) as Arc<dyn crate::client::ProviderClient>)
            })),
        )
    }

    fn base_ids() -> HashSet<String> {
        ["openai", "anthropic"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn rejects_empty_id_and_name() {
        assert!(validate_descriptor(&descriptor("", "X")).is_err());
        assert!(validate_descriptor(&descriptor("x", "")).is_err());
        assert!(validate_descriptor(&descriptor("x", "X")).is_ok());
    }

    #[test]
    fn rejects_base_id_collision() {
        let reg = DynamicRegistration::new(descriptor("openai", "Clone"));
        assert!(validate_dynamic(&reg, &base_ids()).is_err());
    }

    #[test]
    fn rejects_alias_shadowing_base_id() {
        let reg =
            DynamicRegistration::new(descriptor("custom", "Custom")).with_mapping("openai", "custom");
        assert!(validate_dynamic(&reg, &base_ids()).is_err());
    }

    #[test]
    fn accepts_well_formed_registration() {
        let reg =
            DynamicRegistration::new(descriptor("custom", "Custom")).with_mapping("c", "custom");
        assert!(validate_dynamic(&reg, &base_ids()).is_ok());
    }
}
