//! Sensitive-key redaction for webhook bodies.

use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Normalised key fragments that mark a value as sensitive.
const DENY_LIST: &[&str] = &[
    "password",
    "secret",
    "token",
    "apikey",
    "privatekey",
    "passphrase",
];

/// Case-insensitive substring match, ignoring `_`, `-` and spaces.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalised: String = key
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect();
    DENY_LIST.iter().any(|word| normalised.contains(word))
}

/// Replace values of sensitive keys, recursing through objects and arrays.
///
/// Idempotent: redacting twice gives the same value.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *child = Value::String(REDACTED.to_string());
                } else {
                    redact(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}
