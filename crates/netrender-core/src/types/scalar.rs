//! Lenient scalar decoding for document fields.
//!
//! YAML gives `1234`, `yes` and `"1234"` different types, while network
//! documents treat them by context: a tunnel key or a wifi password is text
//! even when written as digits, and `yes`/`no`/`on`/`off` are booleans.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Text of a scalar: strings as-is, numbers and booleans as written.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Boolean spellings accepted in documents, case-insensitively.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "y" => Some(true),
        "false" | "no" | "off" | "n" => Some(false),
        _ => None,
    }
}

pub(crate) fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => scalar_text(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected a scalar value")),
    }
}

pub(crate) fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b)),
        Value::String(s) => parse_bool(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid boolean value '{}'", s))),
        _ => Err(D::Error::custom("expected a boolean")),
    }
}

pub(crate) fn list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_text(item).ok_or_else(|| D::Error::custom("expected a list of scalars"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        _ => Err(D::Error::custom("expected a sequence")),
    }
}

pub(crate) fn map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Mapping(entries) => entries
            .iter()
            .map(|(key, value)| match (scalar_text(key), scalar_text(value)) {
                (Some(key), Some(value)) => Ok((key, value)),
                _ => Err(D::Error::custom("expected a mapping of scalars")),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Some),
        _ => Err(D::Error::custom("expected a mapping")),
    }
}

/// Rewrite every non-string scalar mapping key as a string, recursively.
///
/// Keys such as an all-digit SSID or definition ID then decode into
/// `String`-keyed maps.
pub fn stringify_keys(value: Value) -> Value {
    match value {
        Value::Mapping(entries) => Value::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| {
                    let key = if matches!(key, Value::Number(_) | Value::Bool(_)) {
                        scalar_text(&key).map(Value::String).unwrap_or(key)
                    } else {
                        key
                    };
                    (key, stringify_keys(value))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(stringify_keys).collect()),
        other => other,
    }
}
