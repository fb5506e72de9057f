//! Character definitions.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::{lookup_attribute, AttributeBounds, AttributeMap, Rgb};

/// A character as stored in its JSON record file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    /// Display name, also the case-insensitive lookup key.
    #[serde(rename = "nome")]
    pub name: String,

    #[serde(rename = "cor", default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(rename = "img", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Ledger of status patch IDs already applied to this character.
    #[serde(rename = "ID", default)]
    pub applied_patches: Vec<String>,

    #[serde(flatten)]
    pub attributes: AttributeMap,

    /// Loaded from the sibling limits file, never written into the record.
    #[serde(skip)]
    pub bounds: AttributeBounds,
}

impl CharacterRecord {
    /// Create a new character with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            image: None,
            applied_patches: Vec::new(),
            attributes: AttributeMap::new(),
            bounds: AttributeBounds::default(),
        }
    }

    /// Set an attribute value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the attribute bounds.
    pub fn with_bounds(mut self, bounds: AttributeBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Look up an attribute (case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        lookup_attribute(&self.attributes, name)
    }

    /// Check if a status patch ID is already in the ledger.
    pub fn has_applied(&self, patch_id: &str) -> bool {
        self.applied_patches.iter().any(|id| id == patch_id)
    }

    /// Parsed speaker colour, if one is authored.
    pub fn rgb(&self) -> Option<Rgb> {
        self.color.as_deref().and_then(Rgb::parse)
    }
}

/// Initial resume pointer embedded in the player record (`save`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    #[serde(rename = "Cena", deserialize_with = "scene_id")]
    pub scene: String,
}

/// The player: a character plus inventory, flags and memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "inventario", default)]
    pub inventory: Vec<String>,

    #[serde(default)]
    pub flags: BTreeSet<String>,

    #[serde(rename = "memorias", default)]
    pub memories: BTreeSet<String>,

    #[serde(rename = "save", default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumePoint>,

    #[serde(flatten)]
    pub character: CharacterRecord,
}

impl PlayerRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inventory: Vec::new(),
            flags: BTreeSet::new(),
            memories: BTreeSet::new(),
            resume: None,
            character: CharacterRecord::new(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.character.name
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn has_memory(&self, memory: &str) -> bool {
        self.memories.contains(memory)
    }

    /// Append an item to the inventory. Duplicates are kept.
    pub fn add_item(&mut self, item: impl Into<String>) {
        self.inventory.push(item.into());
    }
}

fn scene_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected a scene id, found {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_character() {
        let character = CharacterRecord::new("Yuno").with_attribute("afeto", 3);
        assert_eq!(character.name, "Yuno");
        assert_eq!(character.attribute("AFETO"), Some(&json!(3)));
        assert!(character.applied_patches.is_empty());
    }

    #[test]
    fn test_character_record_round_trips_file_layout() {
        let raw = json!({
            "nome": "Yuno",
            "cor": "200,40,40",
            "img": "yuno.png",
            "afeto": 2,
            "tags": ["calm"],
            "ID": ["intro_bonus"]
        });

        let record: CharacterRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.rgb(), Some(Rgb(200, 40, 40)));
        assert!(record.has_applied("intro_bonus"));
        assert_eq!(record.attributes.len(), 2);

        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }

    #[test]
    fn test_player_record_fields() {
        let raw = json!({
            "nome": "Ari",
            "cor": "255,255,255",
            "inventario": ["chave"],
            "flags": ["met_yuno"],
            "memorias": ["festival"],
            "save": {"Cena": 12},
            "afeto": 1
        });

        let player: PlayerRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(player.name(), "Ari");
        assert_eq!(player.inventory, vec!["chave".to_string()]);
        assert!(player.has_flag("met_yuno"));
        assert!(player.has_memory("festival"));
        assert_eq!(player.resume.as_ref().unwrap().scene, "12");
        assert_eq!(player.character.attribute("afeto"), Some(&json!(1)));
        assert!(!player.character.attributes.contains_key("inventario"));
    }

    #[test]
    fn test_add_item_keeps_duplicates() {
        let mut player = PlayerRecord::new("Ari");
        player.add_item("potion");
        player.add_item("potion");
        assert_eq!(player.inventory.len(), 2);
    }
}
