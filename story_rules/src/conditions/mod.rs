//! Condition predicates over character attributes, player flags and memories.
//!
//! A predicate is authored as a JSON object whose keys are fields and whose
//! values are expectations:
//!
//! - `flag` / `memoria`: membership of the value in the player's flags or
//!   memories, negated by a leading `!`
//! - `yuno_afeto`: attribute `afeto` of character `yuno` (split on the first
//!   underscore)
//! - `afeto`: attribute of the player
//!
//! Expectations are `<=N`, `>=N`, `<N`, `>N`, an inclusive range `A-B`, a
//! number, or text compared case-insensitively. Predicates are parsed once
//! when content is loaded; evaluation lives in [`ConditionEvaluator`].

mod evaluator;

pub use evaluator::*;

use serde_json::{Map, Value};

/// Keys of a condition entry that carry metadata rather than predicates.
pub const NON_CONDITION_FIELDS: [&str; 4] = ["dev", "proximo_id", "texto", "cena"];

/// Which value a clause reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey {
    Flag,
    Memory,
    /// `subject` is stored lowercased.
    Character { subject: String, attribute: String },
    Player { attribute: String },
}

impl FieldKey {
    pub fn parse(field: &str) -> Self {
        let field = field.trim();
        if field.eq_ignore_ascii_case("flag") {
            return FieldKey::Flag;
        }
        if field.eq_ignore_ascii_case("memoria") {
            return FieldKey::Memory;
        }
        match field.split_once('_') {
            Some((subject, attribute)) => FieldKey::Character {
                subject: subject.to_lowercase(),
                attribute: attribute.to_string(),
            },
            None => FieldKey::Player {
                attribute: field.to_string(),
            },
        }
    }
}

/// Numeric comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Le,
    Ge,
    Lt,
    Gt,
}

impl Comparison {
    pub fn holds(self, current: f64, operand: f64) -> bool {
        match self {
            Comparison::Le => current <= operand,
            Comparison::Ge => current >= operand,
            Comparison::Lt => current < operand,
            Comparison::Gt => current > operand,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Gt => ">",
        }
    }
}

/// What a clause expects of its field.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Set membership for `flag` / `memoria`.
    Tag { tag: String, negated: bool },
    /// `operand` is `None` when the authored number did not parse.
    Compare { op: Comparison, operand: Option<f64> },
    Range { min: f64, max: f64 },
    Text(String),
    Number(f64),
    Exact(Value),
    /// Never satisfied (e.g. a non-string flag).
    Invalid,
}

impl Expectation {
    fn parse(field: &FieldKey, expected: &Value) -> Self {
        match field {
            FieldKey::Flag | FieldKey::Memory => match expected {
                Value::String(raw) => {
                    let raw = raw.trim();
                    match raw.strip_prefix('!') {
                        Some(tag) => Expectation::Tag {
                            tag: tag.trim().to_string(),
                            negated: true,
                        },
                        None => Expectation::Tag {
                            tag: raw.to_string(),
                            negated: false,
                        },
                    }
                }
                _ => Expectation::Invalid,
            },
            _ => match expected {
                Value::String(raw) => Self::parse_text(raw),
                Value::Number(n) => n.as_f64().map_or(Expectation::Invalid, Expectation::Number),
                other => Expectation::Exact(other.clone()),
            },
        }
    }

    fn parse_text(raw: &str) -> Self {
        const OPERATORS: [(&str, Comparison); 4] = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ];

        let trimmed = raw.trim();
        for (prefix, op) in OPERATORS {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                let operand = rest.trim().parse::<f64>().ok().filter(|n| n.is_finite());
                return Expectation::Compare { op, operand };
            }
        }

        if let Some((min, max)) = parse_range(trimmed) {
            return Expectation::Range { min, max };
        }

        Expectation::Text(raw.to_string())
    }
}

/// `^\d+-\d+$`
fn parse_range(raw: &str) -> Option<(f64, f64)> {
    let (min, max) = raw.split_once('-')?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(min) || !all_digits(max) {
        return None;
    }
    Some((min.parse().ok()?, max.parse().ok()?))
}

/// One `(field, expectation)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// Field as authored, for diagnostics.
    pub source: String,
    pub field: FieldKey,
    pub expected: Expectation,
}

impl Clause {
    pub fn new(field: &str, expected: &Value) -> Self {
        let key = FieldKey::parse(field);
        let expected = Expectation::parse(&key, expected);
        Self {
            source: field.to_string(),
            field: key,
            expected,
        }
    }
}

/// Conjunction of clauses. An empty predicate always holds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    pub clauses: Vec<Clause>,
}

impl Predicate {
    /// Build from an authored condition object, skipping metadata keys.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let clauses = map
            .iter()
            .filter(|(key, _)| !NON_CONDITION_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| Clause::new(key, value))
            .collect();
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// A scene-level redirect: when `predicate` holds, go to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub predicate: Predicate,
    pub target: String,
    /// Developer label (`dev`).
    pub label: Option<String>,
}

/// Anything whose visibility is gated by an optional predicate.
pub trait Gated {
    fn condition(&self) -> Option<&Predicate>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_key_parse() {
        assert_eq!(FieldKey::parse("flag"), FieldKey::Flag);
        assert_eq!(FieldKey::parse("Memoria"), FieldKey::Memory);
        assert_eq!(
            FieldKey::parse("afeto"),
            FieldKey::Player {
                attribute: "afeto".to_string()
            }
        );
        assert_eq!(
            FieldKey::parse("Mestre_yuno_forca"),
            FieldKey::Character {
                subject: "mestre".to_string(),
                attribute: "yuno_forca".to_string()
            }
        );
    }

    #[test]
    fn test_expectation_parse() {
        let player = FieldKey::parse("afeto");

        assert_eq!(
            Expectation::parse(&player, &json!(">= 5")),
            Expectation::Compare {
                op: Comparison::Ge,
                operand: Some(5.0)
            }
        );
        assert_eq!(
            Expectation::parse(&player, &json!("<x")),
            Expectation::Compare {
                op: Comparison::Lt,
                operand: None
            }
        );
        assert_eq!(
            Expectation::parse(&player, &json!("3-7")),
            Expectation::Range { min: 3.0, max: 7.0 }
        );
        assert_eq!(
            Expectation::parse(&player, &json!("3-x")),
            Expectation::Text("3-x".to_string())
        );
        assert_eq!(Expectation::parse(&player, &json!(4)), Expectation::Number(4.0));
        assert_eq!(
            Expectation::parse(&player, &json!(true)),
            Expectation::Exact(json!(true))
        );
    }

    #[test]
    fn test_flag_expectation() {
        assert_eq!(
            Expectation::parse(&FieldKey::Flag, &json!("!questDone")),
            Expectation::Tag {
                tag: "questDone".to_string(),
                negated: true
            }
        );
        assert_eq!(
            Expectation::parse(&FieldKey::Memory, &json!(3)),
            Expectation::Invalid
        );
    }

    #[test]
    fn test_predicate_skips_metadata() {
        let map = json!({
            "dev": "high affection route",
            "proximo_id": "7",
            "texto": "label",
            "afeto": ">=5",
            "flag": "met_yuno"
        });
        let predicate = Predicate::from_map(map.as_object().unwrap());

        assert_eq!(predicate.clauses.len(), 2);
        assert!(predicate.clauses.iter().all(|c| c.source != "dev"));
    }
}
