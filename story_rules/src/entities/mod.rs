//! Character and player records plus helpers for their open attribute maps.

mod character;
mod components;

pub use character::*;
pub use components::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Free-form attributes of a record (numbers, strings, lists).
pub type AttributeMap = BTreeMap<String, Value>;

/// Normalize a character name into its lookup key.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Case-insensitive key comparison, Unicode aware (`CONFIANÇA` == `confiança`).
pub fn keys_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Read a value as a number, accepting numeric strings.
///
/// Returns `None` for anything that does not coerce to a finite number.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Look up an attribute by name, falling back to a case-insensitive match.
pub fn lookup_attribute<'a>(attributes: &'a AttributeMap, name: &str) -> Option<&'a Value> {
    if let Some(value) = attributes.get(name) {
        return Some(value);
    }
    attributes
        .iter()
        .find(|(key, _)| keys_match(key, name))
        .map(|(_, value)| value)
}

/// Speaker colour as authored in `cor` ("r,g,b").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse an `"r,g,b"` triple.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(',').map(|p| p.trim().parse::<u8>());
        let r = parts.next()?.ok()?;
        let g = parts.next()?.ok()?;
        let b = parts.next()?.ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self(r, g, b))
    }
}
