//! Status patches - named sets of attribute changes applied to a character.
//!
//! Merge rules per field of the record's file layout (`nome` and `ID` are
//! handled separately):
//! - list: union into the existing list, existing order first, no duplicates
//! - `"+N"` / `"-N"`: signed delta on the current number (absent or
//!   non-numeric counts as 0), clamped to the character's bounds
//! - anything else: overwrite
//!
//! A patch carrying an `ID` is applied at most once per character; the ID is
//! recorded in the character's ledger together with the merged attributes.

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::entities::{keys_match, value_as_f64, AttributeBounds, Bounds};
use crate::error::RulesError;
use crate::world_state::{CharacterStore, StoredRecord};

/// A status patch as authored in `status_infor`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct StatusPatch {
    /// Target character (`nome`), matched case-insensitively.
    pub name: String,
    /// Idempotency key (`ID`).
    pub id: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

impl StatusPatch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

impl TryFrom<Map<String, Value>> for StatusPatch {
    type Error = RulesError;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let name = match map.remove("nome") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            _ => return Err(RulesError::InvalidPatch("missing \"nome\"".to_string())),
        };
        let id = match map.remove("ID") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            Some(other) => {
                return Err(RulesError::InvalidPatch(format!(
                    "\"ID\" must be a string, found {other}"
                )))
            }
        };
        Ok(Self {
            name,
            id,
            fields: map.into_iter().collect(),
        })
    }
}

/// Result of applying a patch.
#[derive(Debug)]
pub enum PatchOutcome {
    /// Merged and written to the character's file.
    Applied,
    /// Merged in memory only; the character has no backing file.
    AppliedInMemory,
    /// The patch ID was already in the ledger.
    AlreadyApplied,
    UnknownCharacter,
    /// The merged record no longer fits its layout (e.g. `flags` set to a
    /// number). Nothing was changed.
    Rejected(RulesError),
    /// Writing failed; memory was left untouched.
    PersistFailed(RulesError),
}

impl PatchOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied | PatchOutcome::AppliedInMemory)
    }
}

/// Applies status patches to the records of a [`CharacterStore`].
pub struct StatusMutationEngine<'a> {
    store: &'a mut CharacterStore,
}

impl<'a> StatusMutationEngine<'a> {
    pub fn new(store: &'a mut CharacterStore) -> Self {
        Self { store }
    }

    pub fn apply(&mut self, patch: &StatusPatch) -> PatchOutcome {
        let current = match self.store.resolve(&patch.name) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(character = %patch.name, "Status patch target not found");
                return PatchOutcome::UnknownCharacter;
            }
            Err(err) => {
                error!(character = %patch.name, error = %err, "Failed to read status patch target");
                return PatchOutcome::PersistFailed(err);
            }
        };

        if let Some(id) = &patch.id {
            if current.character().has_applied(id) {
                info!(character = %patch.name, patch = %id, "Status patch already applied");
                return PatchOutcome::AlreadyApplied;
            }
        }

        let mut merged = match merge_patch(&current, patch) {
            Ok(merged) => merged,
            Err(err) => {
                warn!(character = %patch.name, error = %err, "Status patch rejected");
                return PatchOutcome::Rejected(err);
            }
        };
        if let Some(id) = &patch.id {
            merged.character_mut().applied_patches.push(id.clone());
        }

        match self.store.commit(&patch.name, merged) {
            Ok(true) => {
                info!(character = %patch.name, patch = ?patch.id, "Status patch applied");
                PatchOutcome::Applied
            }
            Ok(false) => {
                warn!(
                    character = %patch.name,
                    "No record file for character, status updated in memory only"
                );
                PatchOutcome::AppliedInMemory
            }
            Err(err) => {
                error!(character = %patch.name, error = %err, "Failed to persist status patch");
                PatchOutcome::PersistFailed(err)
            }
        }
    }
}

/// Merge a patch into a copy of `record` without touching the ledger.
///
/// Fields are merged against the record's file layout, so `flags`,
/// `memorias`, `inventario`, `cor` and the other named fields follow the
/// same rules as free attributes.
pub fn merge_patch(record: &StoredRecord, patch: &StatusPatch) -> Result<StoredRecord, RulesError> {
    let invalid = |e: serde_json::Error| RulesError::InvalidPatch(format!("{}: {e}", patch.name));

    let mut fields = record.to_fields().map_err(invalid)?;
    if fields.get("nome").and_then(Value::as_str) != Some(patch.name.as_str()) {
        fields.insert("nome".to_string(), Value::String(patch.name.clone()));
    }

    let bounds = &record.character().bounds;
    for (field, value) in &patch.fields {
        if RESERVED_FIELDS.iter().any(|reserved| keys_match(reserved, field)) {
            warn!(character = %patch.name, field = %field, "Ignoring reserved field in status patch");
            continue;
        }
        let key = existing_key(&fields, field);
        match value {
            Value::Array(items) => merge_list(&mut fields, key, items),
            Value::String(raw) if is_delta(raw) => apply_delta(&mut fields, bounds, key, raw),
            other => {
                fields.insert(key, other.clone());
            }
        }
    }

    record.with_fields(fields).map_err(invalid)
}

/// Layout keys a patch never merges into.
const RESERVED_FIELDS: [&str; 2] = ["nome", "ID"];

/// Key already used by the record for `field`, else `field` itself.
fn existing_key(fields: &Map<String, Value>, field: &str) -> String {
    if fields.contains_key(field) {
        return field.to_string();
    }
    fields
        .keys()
        .find(|key| keys_match(key, field))
        .cloned()
        .unwrap_or_else(|| field.to_string())
}

fn merge_list(fields: &mut Map<String, Value>, key: String, items: &[Value]) {
    match fields.get_mut(&key) {
        Some(Value::Array(existing)) => {
            for item in items {
                if !existing.contains(item) {
                    existing.push(item.clone());
                }
            }
        }
        Some(other) => *other = Value::Array(items.to_vec()),
        None => {
            let mut merged: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            fields.insert(key, Value::Array(merged));
        }
    }
}

/// `[+-]\d+`
fn is_delta(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(chars.next(), Some('+' | '-'))
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_digit())
}

fn apply_delta(fields: &mut Map<String, Value>, bounds: &AttributeBounds, key: String, raw: &str) {
    let Ok(delta) = raw.parse::<i64>() else {
        warn!(attribute = %key, delta = raw, "Delta out of range, ignored");
        return;
    };

    let current = fields.get(&key);
    let updated = match current {
        Some(Value::Number(n)) if n.is_i64() => {
            Value::from(n.as_i64().unwrap_or(0).saturating_add(delta))
        }
        Some(value @ Value::Number(_)) => {
            float_value(value_as_f64(value).unwrap_or(0.0) + delta as f64)
        }
        _ => Value::from(delta),
    };
    let updated = match bounds.get(&key) {
        Some(bounds) => clamp_value(updated, bounds),
        None => updated,
    };

    debug!(attribute = %key, before = ?current, after = %updated, delta = raw, "Delta applied");
    fields.insert(key, updated);
}

fn clamp_value(value: Value, bounds: &Bounds) -> Value {
    let Some(n) = value_as_f64(&value) else {
        return value;
    };
    if bounds.contains(n) {
        return value;
    }
    let clamped = bounds.clamp(n);
    if value.is_i64() && clamped.fract() == 0.0 {
        Value::from(clamped as i64)
    } else {
        float_value(clamped)
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CharacterRecord, PlayerRecord};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: Value) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    fn read(dir: &Path, name: &str) -> Value {
        serde_json::from_str(&fs::read_to_string(dir.join(name)).unwrap()).unwrap()
    }

    fn merged(record: CharacterRecord, patch: &StatusPatch) -> CharacterRecord {
        merge_patch(&StoredRecord::Character(record), patch)
            .unwrap()
            .character()
            .clone()
    }

    fn setup_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "player.json",
            json!({"nome": "Ari", "save": {"Cena": "1"}, "inventario": []}),
        );
        write(
            dir.path(),
            "npc/yuno.json",
            json!({"nome": "Yuno", "afeto": 2, "tags": ["a"], "ID": []}),
        );
        write(
            dir.path(),
            "npc/yuno.limits.json",
            json!({"afeto": {"min": 0, "max": 10}}),
        );
        dir
    }

    #[test]
    fn test_patch_from_json() {
        let patch: StatusPatch =
            serde_json::from_value(json!({"nome": "Yuno", "ID": "intro_bonus", "afeto": "+1"}))
                .unwrap();
        assert_eq!(patch.name, "Yuno");
        assert_eq!(patch.id.as_deref(), Some("intro_bonus"));
        assert_eq!(patch.fields.len(), 1);

        let missing = serde_json::from_value::<StatusPatch>(json!({"afeto": "+1"}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_is_delta() {
        assert!(is_delta("+5"));
        assert!(is_delta("-12"));
        assert!(!is_delta("+"));
        assert!(!is_delta("5"));
        assert!(!is_delta("-abc"));
        assert!(!is_delta("+5a"));
    }

    #[test]
    fn test_merge_list_union_preserves_order() {
        let record = CharacterRecord::new("Yuno").with_attribute("tags", json!(["a"]));
        let patch = StatusPatch::new("Yuno").with_field("tags", json!(["a", "b"]));

        let record = merged(record, &patch);
        assert_eq!(record.attributes["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_merge_list_into_missing_or_scalar() {
        let record = CharacterRecord::new("Yuno").with_attribute("humor", "calmo");
        let patch = StatusPatch::new("Yuno")
            .with_field("humor", json!(["x"]))
            .with_field("tags", json!(["b", "b", "c"]));

        let record = merged(record, &patch);
        assert_eq!(record.attributes["humor"], json!(["x"]));
        assert_eq!(record.attributes["tags"], json!(["b", "c"]));
    }

    #[test]
    fn test_delta_on_missing_attribute_starts_at_zero() {
        let record = merged(
            CharacterRecord::new("Yuno"),
            &StatusPatch::new("Yuno").with_field("afeto", "+5"),
        );
        assert_eq!(record.attributes["afeto"], json!(5));
    }

    #[test]
    fn test_delta_clamped_to_bounds() {
        let bounds = AttributeBounds::new().with("afeto", Bounds::new(0.0, 3.0));
        let record = CharacterRecord::new("Yuno").with_bounds(bounds);

        let record = merged(record, &StatusPatch::new("Yuno").with_field("afeto", "+5"));
        assert_eq!(record.attributes["afeto"], json!(3));

        let record = merged(record, &StatusPatch::new("Yuno").with_field("afeto", "-10"));
        assert_eq!(record.attributes["afeto"], json!(0));
    }

    #[test]
    fn test_delta_on_text_and_float() {
        let record = CharacterRecord::new("Yuno")
            .with_attribute("humor", "calmo")
            .with_attribute("energia", 1.5);
        let patch = StatusPatch::new("Yuno")
            .with_field("humor", "-2")
            .with_field("energia", "+1");

        let record = merged(record, &patch);
        assert_eq!(record.attributes["humor"], json!(-2));
        assert_eq!(record.attributes["energia"], json!(2.5));
    }

    #[test]
    fn test_overwrite_and_name() {
        let record = CharacterRecord::new("yuno").with_attribute("Humor", "calmo");
        let patch = StatusPatch::new("Yuno")
            .with_field("humor", "feliz")
            .with_field("+bonus", "+x");

        let record = merged(record, &patch);
        assert_eq!(record.name, "Yuno");
        assert_eq!(record.attributes["Humor"], json!("feliz"));
        assert!(!record.attributes.contains_key("humor"));
        assert_eq!(record.attributes["+bonus"], json!("+x"));
    }

    #[test]
    fn test_accented_attribute_names_match() {
        let bounds = AttributeBounds::new().with("confiança", Bounds::new(0.0, 4.0));
        let record = CharacterRecord::new("Yuno")
            .with_attribute("CONFIANÇA", 3)
            .with_bounds(bounds);

        let record = merged(record, &StatusPatch::new("Yuno").with_field("confiança", "+2"));
        assert_eq!(record.attributes["CONFIANÇA"], json!(4));
        assert!(!record.attributes.contains_key("confiança"));
    }

    #[test]
    fn test_named_fields_follow_merge_rules() {
        let record = CharacterRecord::new("Yuno");
        let record = StoredRecord::Character(CharacterRecord {
            color: Some("1,2,3".to_string()),
            ..record
        });
        let patch = StatusPatch::new("Yuno")
            .with_field("cor", "9,9,9")
            .with_field("id", json!(["forged"]));

        let merged = merge_patch(&record, &patch).unwrap();
        let yuno = merged.character();
        assert_eq!(yuno.rgb(), Some(crate::entities::Rgb(9, 9, 9)));
        assert!(yuno.applied_patches.is_empty());
        assert!(yuno.attributes.is_empty());
    }

    #[test]
    fn test_player_flags_are_unioned() {
        let mut player = PlayerRecord::new("Ari");
        player.flags.insert("met_yuno".to_string());
        let patch = StatusPatch::new("Ari")
            .with_field("flags", json!(["quest_done"]))
            .with_field("Memorias", json!(["festival"]));

        let StoredRecord::Player(player) = merge_patch(&StoredRecord::Player(player), &patch).unwrap()
        else {
            panic!("player patch must stay a player record");
        };
        assert!(player.has_flag("met_yuno"));
        assert!(player.has_flag("quest_done"));
        assert!(player.has_memory("festival"));
        assert!(player.character.attributes.is_empty());
    }

    #[test]
    fn test_patch_breaking_layout_is_rejected() {
        let mut store = CharacterStore::in_memory(PlayerRecord::new("Ari"));
        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("Ari").with_id("bad").with_field("flags", 3));

        assert!(matches!(outcome, PatchOutcome::Rejected(RulesError::InvalidPatch(_))));
        assert!(!outcome.applied());
        assert!(!store.player().character.has_applied("bad"));
    }

    #[test]
    fn test_apply_is_idempotent_by_id() {
        let dir = setup_dir();
        let mut store = CharacterStore::load(dir.path(), None).unwrap();
        let patch = StatusPatch::new("yuno")
            .with_id("intro_bonus")
            .with_field("afeto", "+1");

        let first = StatusMutationEngine::new(&mut store).apply(&patch);
        let second = StatusMutationEngine::new(&mut store).apply(&patch);

        assert!(matches!(first, PatchOutcome::Applied));
        assert!(matches!(second, PatchOutcome::AlreadyApplied));
        assert!(!second.applied());
        assert_eq!(store.get("Yuno").unwrap().attributes["afeto"], json!(3));

        let on_disk = read(dir.path(), "npc/yuno.json");
        assert_eq!(on_disk["afeto"], json!(3));
        assert_eq!(on_disk["ID"], json!(["intro_bonus"]));
    }

    #[test]
    fn test_apply_clamps_with_limits_file() {
        let dir = setup_dir();
        let mut store = CharacterStore::load(dir.path(), None).unwrap();

        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("Yuno").with_field("afeto", "+50"));

        assert!(outcome.applied());
        assert_eq!(read(dir.path(), "npc/yuno.json")["afeto"], json!(10));
    }

    #[test]
    fn test_apply_to_player_persists_full_record() {
        let dir = setup_dir();
        let mut store = CharacterStore::load(dir.path(), None).unwrap();

        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("Ari").with_id("p1").with_field("coragem", "+2"));

        assert!(matches!(outcome, PatchOutcome::Applied));
        let on_disk = read(dir.path(), "player.json");
        assert_eq!(on_disk["coragem"], json!(2));
        assert_eq!(on_disk["save"], json!({"Cena": "1"}));
        assert_eq!(store.player().character.attribute("coragem"), Some(&json!(2)));
    }

    #[test]
    fn test_player_flag_patch_on_disk() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "player.json",
            json!({"nome": "Ari", "flags": ["met_yuno"], "save": {"Cena": "1"}}),
        );
        let mut store = CharacterStore::load(dir.path(), None).unwrap();

        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("Ari").with_field("flags", json!(["quest_done"])));

        assert!(matches!(outcome, PatchOutcome::Applied));
        assert!(store.player().has_flag("met_yuno"));
        assert!(store.player().has_flag("quest_done"));

        let raw = fs::read_to_string(dir.path().join("player.json")).unwrap();
        assert_eq!(raw.matches("\"flags\"").count(), 1);

        let reloaded = CharacterStore::load(dir.path(), None).unwrap();
        assert!(reloaded.player().has_flag("met_yuno"));
        assert!(reloaded.player().has_flag("quest_done"));
    }

    #[test]
    fn test_colour_patch_writes_one_key() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "player.json", json!({"nome": "Ari", "save": {"Cena": "1"}}));
        write(dir.path(), "npc/yuno.json", json!({"nome": "Yuno", "cor": "1,2,3", "ID": []}));
        let mut store = CharacterStore::load(dir.path(), None).unwrap();

        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("Yuno").with_field("cor", "9,9,9"));

        assert!(outcome.applied());
        let raw = fs::read_to_string(dir.path().join("npc/yuno.json")).unwrap();
        assert_eq!(raw.matches("\"cor\"").count(), 1);
        assert_eq!(read(dir.path(), "npc/yuno.json")["cor"], json!("9,9,9"));
        assert_eq!(store.get("Yuno").unwrap().rgb(), Some(crate::entities::Rgb(9, 9, 9)));
    }

    #[test]
    fn test_apply_without_backing_file_updates_memory() {
        let mut store = CharacterStore::in_memory(PlayerRecord::new("Ari"));
        store.insert(CharacterRecord::new("Yuno"));

        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("Yuno").with_id("x").with_field("afeto", "+1"));

        assert!(matches!(outcome, PatchOutcome::AppliedInMemory));
        assert!(outcome.applied());
        assert!(store.get("yuno").unwrap().has_applied("x"));
    }

    #[test]
    fn test_apply_unknown_character() {
        let mut store = CharacterStore::in_memory(PlayerRecord::new("Ari"));
        let outcome = StatusMutationEngine::new(&mut store).apply(&StatusPatch::new("Nobody"));
        assert!(matches!(outcome, PatchOutcome::UnknownCharacter));
    }

    #[test]
    fn test_write_failure_leaves_memory_untouched() {
        let dir = setup_dir();
        let mut store = CharacterStore::load(dir.path(), None).unwrap();

        // Replace the record directory with a plain file so the write fails.
        fs::remove_dir_all(dir.path().join("npc")).unwrap();
        fs::write(dir.path().join("npc"), "blocked").unwrap();

        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("Yuno").with_id("boom").with_field("afeto", "+1"));

        assert!(matches!(outcome, PatchOutcome::PersistFailed(_)));
        assert!(!outcome.applied());
        let yuno = store.get("Yuno").unwrap();
        assert_eq!(yuno.attributes["afeto"], json!(2));
        assert!(!yuno.has_applied("boom"));
    }

    #[test]
    fn test_apply_reads_unloaded_indexed_file() {
        let dir = setup_dir();
        let mut store = CharacterStore::load(dir.path(), None).unwrap();
        write(dir.path(), "npc/mestre.json", json!({"nome": "Mestre", "forca": 1}));
        store.refresh_index().unwrap();

        let outcome = StatusMutationEngine::new(&mut store)
            .apply(&StatusPatch::new("mestre").with_field("forca", "+1"));

        assert!(matches!(outcome, PatchOutcome::Applied));
        assert_eq!(store.get("Mestre").unwrap().attributes["forca"], json!(2));
    }
}
