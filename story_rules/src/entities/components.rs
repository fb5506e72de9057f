//! Per-attribute bounds loaded from a character's limits file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::keys_match;

/// Inclusive bounds for one numeric attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Clamp a value into the bounds. `min` wins when the bounds are inverted.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut value = value;
        if let Some(max) = self.max {
            value = value.min(max);
        }
        if let Some(min) = self.min {
            value = value.max(min);
        }
        value
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Bounds keyed by attribute name, as authored in `{attr: {min, max}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBounds {
    limits: BTreeMap<String, Bounds>,
}

impl AttributeBounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, attribute: impl Into<String>, bounds: Bounds) -> Self {
        self.limits.insert(attribute.into(), bounds);
        self
    }

    /// Bounds for an attribute, matched case-insensitively.
    pub fn get(&self, attribute: &str) -> Option<&Bounds> {
        self.limits.get(attribute).or_else(|| {
            self.limits
                .iter()
                .find(|(key, _)| keys_match(key, attribute))
                .map(|(_, bounds)| bounds)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}
