//! Logical sprite stage - which character stands in which slot, with which
//! expression. Drawing is left to the host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use story_rules::CharacterStore;

use crate::commands::StageCommand;

/// A character standing in a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteSlot {
    /// Display name from the character record.
    pub character: String,
    pub expression: Option<String>,
    /// Image id from the record (`img`).
    pub image: Option<String>,
}

/// Sprite slots keyed by position (`left`, `center`, `right`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    slots: BTreeMap<String, SpriteSlot>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command. Returns whether the stage changed.
    pub fn apply(&mut self, command: &StageCommand, characters: &CharacterStore) -> bool {
        match command {
            StageCommand::Add {
                character,
                position,
                expression,
            } => {
                let Some(record) = characters.get(character) else {
                    warn!(character = %character, position = %position, "Sprite for unknown character skipped");
                    return false;
                };
                self.slots.insert(
                    position.clone(),
                    SpriteSlot {
                        character: record.name.clone(),
                        expression: expression.clone(),
                        image: record.image.clone(),
                    },
                );
                debug!(character = %record.name, position = %position, "Sprite added");
                true
            }
            StageCommand::Remove { position } => self.slots.remove(position).is_some(),
            StageCommand::ClearAll => {
                let changed = !self.slots.is_empty();
                self.slots.clear();
                changed
            }
            StageCommand::Expression {
                position,
                expression,
            } => match self.slots.get_mut(position) {
                Some(slot) => {
                    slot.expression = Some(expression.clone());
                    true
                }
                None => {
                    warn!(position = %position, expression = %expression, "Expression change on empty slot");
                    false
                }
            },
        }
    }

    pub fn slot(&self, position: &str) -> Option<&SpriteSlot> {
        self.slots.get(position)
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, &SpriteSlot)> {
        self.slots.iter().map(|(position, slot)| (position.as_str(), slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandParser;
    use story_rules::{CharacterRecord, PlayerRecord};

    fn setup_store() -> CharacterStore {
        let mut store = CharacterStore::in_memory(PlayerRecord::new("Ari"));
        let mut yuno = CharacterRecord::new("Yuno");
        yuno.image = Some("yuno.png".to_string());
        store.insert(yuno);
        store.insert(CharacterRecord::new("Mei"));
        store
    }

    fn run(stage: &mut Stage, store: &CharacterStore, line: &str) {
        for command in CommandParser::parse(line) {
            stage.apply(&command, store);
        }
    }

    #[test]
    fn test_add_replaces_slot_occupant() {
        let store = setup_store();
        let mut stage = Stage::new();

        run(&mut stage, &store, "{sprite:yuno:left:happy}");
        assert_eq!(
            stage.slot("left"),
            Some(&SpriteSlot {
                character: "Yuno".to_string(),
                expression: Some("happy".to_string()),
                image: Some("yuno.png".to_string()),
            })
        );

        run(&mut stage, &store, "{sprite:Mei:left}");
        assert_eq!(stage.slot("left").unwrap().character, "Mei");
        assert_eq!(stage.len(), 1);
    }

    #[test]
    fn test_unknown_character_is_skipped() {
        let store = setup_store();
        let mut stage = Stage::new();

        run(&mut stage, &store, "{sprite:Ghost:center}");
        assert!(stage.is_empty());
    }

    #[test]
    fn test_expression_and_removal() {
        let store = setup_store();
        let mut stage = Stage::new();
        run(&mut stage, &store, "{sprite:Yuno:left}{sprite:Mei:right}");

        run(&mut stage, &store, "{expr:left:sad}");
        assert_eq!(stage.slot("left").unwrap().expression.as_deref(), Some("sad"));

        let missing = StageCommand::Expression {
            position: "center".to_string(),
            expression: "sad".to_string(),
        };
        assert!(!stage.apply(&missing, &store));

        run(&mut stage, &store, "{sprite_clear:left}");
        assert!(stage.slot("left").is_none());
        assert_eq!(stage.len(), 1);

        run(&mut stage, &store, "{img_clear}");
        assert!(stage.is_empty());
    }

    #[test]
    fn test_later_command_for_same_slot_wins() {
        let store = setup_store();
        let mut stage = Stage::new();

        run(&mut stage, &store, "{sprite:Yuno:left}{sprite:Mei:left}");
        assert_eq!(stage.slot("left").unwrap().character, "Mei");
    }
}
