//! Keys that make a function editable in one step.

use std::collections::BTreeMap;

use coderip_analysis::markup::DescriptorToken;

use crate::disclosure::{displayed_name, resolve_display_name};
use crate::error::UnlockError;
use crate::events::WorldEvent;
use crate::registry::PermissionLevel;
use crate::world::kinds::{ObjectKind, ALL_KINDS};
use crate::world::World;

/// Which key kind fits which object kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPolicy {
    keys: BTreeMap<ObjectKind, String>,
}

impl Default for KeyPolicy {
    /// Taken from each kind's profile.
    fn default() -> Self {
        let keys = ALL_KINDS
            .into_iter()
            .filter_map(|kind| kind.profile().key.map(|key| (kind, key.to_string())))
            .collect();
        Self { keys }
    }
}

impl KeyPolicy {
    pub fn required(&self, kind: ObjectKind) -> Option<&str> {
        self.keys.get(&kind).map(String::as_str)
    }

    pub fn with_key(mut self, kind: ObjectKind, key: impl Into<String>) -> Self {
        self.keys.insert(kind, key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockOutcome {
    pub object: String,
    pub function: String,
    pub previous: PermissionLevel,
    /// Tokens in the description that became visible with this unlock.
    pub offered_tokens: Vec<DescriptorToken>,
}

/// Spend one key to make the function shown as `shown` editable.
///
/// `shown` is matched against each function's displayed form, so a sealed
/// function is named by its mask. Nothing changes unless every check passes.
pub fn unlock(
    world: &mut World,
    policy: &KeyPolicy,
    object: &str,
    shown: &str,
    key: &str,
) -> Result<UnlockOutcome, UnlockError> {
    let entity = world.object(object).ok_or_else(|| UnlockError::UnknownObject {
        object: object.to_string(),
    })?;
    let required = policy.required(entity.kind);
    if required != Some(key) {
        return Err(UnlockError::WrongKey {
            object: object.to_string(),
            required: required.map(str::to_string),
            offered: key.to_string(),
        });
    }
    if world.inventory().key_count(key) == 0 {
        return Err(UnlockError::KeyExhausted {
            kind: key.to_string(),
        });
    }
    let entry = resolve_display_name(&entity.behaviors, shown).ok_or_else(|| {
        UnlockError::UnknownFunction {
            object: object.to_string(),
            shown: shown.to_string(),
        }
    })?;
    if entry.permission == PermissionLevel::Editable {
        return Err(UnlockError::AlreadyEditable {
            object: object.to_string(),
            function: entry.name.clone(),
        });
    }

    let function = entry.name.clone();
    let previous = entry.permission;
    let offered_tokens = if previous.shows_body() {
        Vec::new()
    } else {
        entry
            .description
            .as_deref()
            .map(coderip_analysis::markup::extract_tokens)
            .unwrap_or_default()
    };
    log::info!(
        "unlocking {object}.{function} (shown as {}) with a {key} key",
        displayed_name(entry)
    );

    world.inventory_mut().consume_key(key);
    if let Some(registry) = world.behaviors_mut(object) {
        registry.raise(&function, PermissionLevel::Editable);
    }
    world.refresh_discovery(object);
    world.emit(WorldEvent::Unlocked {
        object: object.to_string(),
        function: function.clone(),
        key: key.to_string(),
    });

    Ok(UnlockOutcome {
        object: object.to_string(),
        function,
        previous,
        offered_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use coderip_analysis::markup::TokenCategory;

    fn vault_world(keys: u32) -> World {
        let mut world = World::new(&WorldConfig::default()).unwrap();
        world.add_object(ObjectKind::Vault, None, 0.0, 0.0).unwrap();
        world.inventory_mut().add_keys("yellow", keys);
        world
    }

    #[test]
    fn sealed_function_jumps_to_editable_for_one_key() {
        let mut world = vault_world(2);
        let outcome = unlock(&mut world, &KeyPolicy::default(), "Vault", "o***", "yellow").unwrap();
        assert_eq!(outcome.function, "open");
        assert_eq!(outcome.previous, PermissionLevel::Sealed);
        assert_eq!(
            outcome.offered_tokens,
            vec![
                DescriptorToken::new(TokenCategory::Function, "open"),
                DescriptorToken::new(TokenCategory::Attribute, "dial"),
            ]
        );
        assert_eq!(world.get("Vault", "open").unwrap().permission, PermissionLevel::Editable);
        assert_eq!(world.inventory().key_count("yellow"), 1);
    }

    fn vault_with_lower_levels(keys: u32) -> World {
        let mut world = vault_world(keys);
        world
            .register(
                "Vault",
                "hint",
                "say('turn the dial')",
                Some(PermissionLevel::NamedOnly),
                Some("<attr>dial</attr> goes clockwise"),
            )
            .unwrap();
        world
            .register(
                "Vault",
                "spin",
                "self.dial = (self.dial or 0) + 1",
                Some(PermissionLevel::Readable),
                Some("<func>spin</func> the <attr>dial</attr>"),
            )
            .unwrap();
        world
    }

    #[test]
    fn named_only_function_jumps_straight_to_editable() {
        let mut world = vault_with_lower_levels(3);
        let outcome = unlock(&mut world, &KeyPolicy::default(), "Vault", "hint", "yellow").unwrap();
        assert_eq!(outcome.previous, PermissionLevel::NamedOnly);
        assert_eq!(
            outcome.offered_tokens,
            vec![DescriptorToken::new(TokenCategory::Attribute, "dial")]
        );
        assert_eq!(world.get("Vault", "hint").unwrap().permission, PermissionLevel::Editable);
        assert_eq!(world.inventory().key_count("yellow"), 2);
        assert_eq!(world.get("Vault", "spin").unwrap().permission, PermissionLevel::Readable);
    }

    #[test]
    fn readable_function_jumps_to_editable_without_new_tokens() {
        let mut world = vault_with_lower_levels(1);
        let outcome = unlock(&mut world, &KeyPolicy::default(), "Vault", "spin", "yellow").unwrap();
        assert_eq!(outcome.previous, PermissionLevel::Readable);
        assert!(outcome.offered_tokens.is_empty());
        assert_eq!(world.get("Vault", "spin").unwrap().permission, PermissionLevel::Editable);
        assert_eq!(world.inventory().key_count("yellow"), 0);
        assert!(matches!(
            unlock(&mut world, &KeyPolicy::default(), "Vault", "hint", "yellow"),
            Err(UnlockError::KeyExhausted { .. })
        ));
    }

    #[test]
    fn zero_keys_is_rejected_without_change() {
        let mut world = vault_world(0);
        assert_eq!(
            unlock(&mut world, &KeyPolicy::default(), "Vault", "o***", "yellow"),
            Err(UnlockError::KeyExhausted {
                kind: "yellow".into()
            })
        );
        assert_eq!(world.get("Vault", "open").unwrap().permission, PermissionLevel::Sealed);
    }

    #[test]
    fn real_name_of_sealed_function_does_not_resolve() {
        let mut world = vault_world(1);
        let error = unlock(&mut world, &KeyPolicy::default(), "Vault", "open", "yellow").unwrap_err();
        assert!(matches!(error, UnlockError::UnknownFunction { .. }));
        assert_eq!(world.inventory().key_count("yellow"), 1);
    }

    #[test]
    fn wrong_key_and_already_editable() {
        let mut world = vault_world(1);
        world.inventory_mut().add_keys("red", 1);
        assert!(matches!(
            unlock(&mut world, &KeyPolicy::default(), "Vault", "o***", "red"),
            Err(UnlockError::WrongKey { .. })
        ));
        unlock(&mut world, &KeyPolicy::default(), "Vault", "o***", "yellow").unwrap();
        world.inventory_mut().add_keys("yellow", 1);
        assert_eq!(
            unlock(&mut world, &KeyPolicy::default(), "Vault", "open", "yellow"),
            Err(UnlockError::AlreadyEditable {
                object: "Vault".into(),
                function: "open".into()
            })
        );
        assert_eq!(world.inventory().key_count("yellow"), 1);
    }

    #[test]
    fn unknown_object_and_custom_policy() {
        let mut world = vault_world(1);
        assert!(matches!(
            unlock(&mut world, &KeyPolicy::default(), "Safe", "o***", "yellow"),
            Err(UnlockError::UnknownObject { .. })
        ));
        let policy = KeyPolicy::default().with_key(ObjectKind::Vault, "blue");
        assert_eq!(policy.required(ObjectKind::Vault), Some("blue"));
        assert_eq!(policy.required(ObjectKind::Coin), None);
    }
}
