//! Deterministic fingerprints for delivery creation requests.
//!
//! The fingerprint is `sha256("<prefix>:<user_id>:<canonical json>")`, hex encoded.
//! Canonical JSON sorts object keys recursively and has no whitespace, so two
//! bodies that differ only in key order produce the same key.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const DELIVERY_PREFIX: &str = "delivery";

pub fn fingerprint(user_id: &Uuid, payload: &Value) -> String {
    fingerprint_with_prefix(DELIVERY_PREFIX, user_id, payload)
}

pub fn fingerprint_with_prefix(prefix: &str, user_id: &Uuid, payload: &Value) -> String {
    let raw = format!("{prefix}:{user_id}:{}", canonicalize(payload));
    hex::encode(Sha256::digest(raw.as_bytes()))
}

pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(key, _)| *key);
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(key, inner)| (key.clone(), canonicalize(inner)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{fingerprint, fingerprint_with_prefix};

    #[test]
    fn key_order_does_not_matter() {
        let user = Uuid::new_v4();

        assert_eq!(
            fingerprint(&user, &json!({"a": 1, "b": 2})),
            fingerprint(&user, &json!({"b": 2, "a": 1}))
        );
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let user = Uuid::new_v4();
        let a = json!({"outer": {"y": [1, {"q": 1, "p": 2}], "x": true}});
        let b = json!({"outer": {"x": true, "y": [1, {"p": 2, "q": 1}]}});

        assert_eq!(fingerprint(&user, &a), fingerprint(&user, &b));
    }

    #[test]
    fn different_user_changes_the_key() {
        let payload = json!({"a": 1, "b": 2});

        assert_ne!(
            fingerprint(&Uuid::new_v4(), &payload),
            fingerprint(&Uuid::new_v4(), &payload)
        );
    }

    #[test]
    fn any_value_change_changes_the_key() {
        let user = Uuid::new_v4();
        let base = fingerprint(&user, &json!({"a": 1, "b": 2}));

        assert_ne!(base, fingerprint(&user, &json!({"a": 1, "b": 3})));
        assert_ne!(base, fingerprint(&user, &json!({"a": "1", "b": 2})));
        assert_ne!(base, fingerprint(&user, &json!({"a": 1, "b": 2, "c": null})));
    }

    #[test]
    fn array_order_is_significant() {
        let user = Uuid::new_v4();

        assert_ne!(
            fingerprint(&user, &json!({"items": [1, 2]})),
            fingerprint(&user, &json!({"items": [2, 1]}))
        );
    }

    #[test]
    fn prefix_namespaces_the_key() {
        let user = Uuid::new_v4();
        let payload = json!({"a": 1});

        assert_ne!(
            fingerprint_with_prefix("delivery", &user, &payload),
            fingerprint_with_prefix("refund", &user, &payload)
        );
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = fingerprint(&Uuid::nil(), &json!({}));

        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
