//! Predicate evaluation against the character store.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use super::{Clause, Expectation, FieldKey, Gated, Predicate, Redirect};
use crate::entities::value_as_f64;
use crate::world_state::CharacterStore;

/// Evaluates predicates against the characters and player of a store.
///
/// Evaluation is pure and total: missing characters, missing attributes and
/// non-numeric operands all make a clause false instead of failing.
pub struct ConditionEvaluator<'a> {
    store: &'a CharacterStore,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(store: &'a CharacterStore) -> Self {
        Self { store }
    }

    /// Target of the first redirect whose predicate holds.
    pub fn evaluate_scene_conditions<'c>(&self, conditions: &'c [Redirect]) -> Option<&'c str> {
        let matched = conditions.iter().find(|redirect| self.check(&redirect.predicate));
        match matched {
            Some(redirect) => {
                debug!(
                    label = redirect.label.as_deref().unwrap_or("N/A"),
                    target = %redirect.target,
                    "Condition met"
                );
                Some(redirect.target.as_str())
            }
            None => {
                if !conditions.is_empty() {
                    debug!(count = conditions.len(), "No condition met");
                }
                None
            }
        }
    }

    /// Keep the items that are ungated or whose condition holds, in order.
    pub fn filter_options<T: Gated + Clone>(&self, options: &[T]) -> Vec<T> {
        options
            .iter()
            .filter(|option| option.condition().map_or(true, |p| self.check(p)))
            .cloned()
            .collect()
    }

    /// Whether every clause of the predicate holds.
    pub fn check(&self, predicate: &Predicate) -> bool {
        predicate.clauses.iter().all(|clause| self.check_clause(clause))
    }

    pub fn check_clause(&self, clause: &Clause) -> bool {
        let player = self.store.player();
        let result = match &clause.field {
            FieldKey::Flag => membership(&player.flags, &clause.expected),
            FieldKey::Memory => membership(&player.memories, &clause.expected),
            FieldKey::Character { subject, attribute } => match self.store.get(subject) {
                Some(character) => compare(character.attribute(attribute), &clause.expected),
                None => {
                    debug!(field = %clause.source, character = %subject, "Character not found");
                    false
                }
            },
            FieldKey::Player { attribute } => {
                compare(player.character.attribute(attribute), &clause.expected)
            }
        };
        debug!(field = %clause.source, expected = ?clause.expected, result, "Clause evaluated");
        result
    }
}

fn membership(set: &BTreeSet<String>, expected: &Expectation) -> bool {
    match expected {
        Expectation::Tag { tag, negated } => set.contains(tag) != *negated,
        _ => false,
    }
}

/// Compare a current attribute value with an expectation.
pub fn compare(current: Option<&Value>, expected: &Expectation) -> bool {
    let Some(current) = current.filter(|v| !v.is_null()) else {
        return false;
    };

    match expected {
        Expectation::Compare { op, operand } => match (value_as_f64(current), operand) {
            (Some(current), Some(operand)) => op.holds(current, *operand),
            _ => false,
        },
        Expectation::Range { min, max } => {
            value_as_f64(current).map_or(false, |n| *min <= n && n <= *max)
        }
        Expectation::Number(expected) => value_as_f64(current).map_or(false, |n| n == *expected),
        Expectation::Text(expected) => {
            let numeric = expected.trim().parse::<f64>().ok().zip(value_as_f64(current));
            match numeric {
                Some((expected, current)) => expected == current,
                None => text_of(current).trim().to_lowercase() == expected.trim().to_lowercase(),
            }
        }
        Expectation::Exact(expected) => current == expected,
        Expectation::Tag { .. } | Expectation::Invalid => false,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
