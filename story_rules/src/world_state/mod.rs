//! Character store - the single owner of every character and player record.
//!
//! Records are file-backed: each character lives in its own JSON file under a
//! base directory, optionally with a sibling `<stem>.limits.json` holding
//! attribute bounds. A name→path index is built once at load by a sorted
//! recursive scan and only rebuilt on [`CharacterStore::refresh_index`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::entities::{name_key, AttributeBounds, CharacterRecord, PlayerRecord};
use crate::error::RulesError;

/// Suffix of the per-character bounds file.
pub const LIMITS_SUFFIX: &str = ".limits.json";

/// Name used when no player record is found.
pub const DEFAULT_PLAYER_NAME: &str = "Jogador";

/// Case-insensitive character name → record file path.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    paths: BTreeMap<String, PathBuf>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a directory tree. Files are visited in sorted path order and the
    /// first file claiming a name wins, so the result is stable across runs.
    /// Unreadable or nameless files are skipped.
    pub fn scan(root: &Path) -> Result<Self, RulesError> {
        let mut index = Self::new();
        for path in collect_record_files(root)? {
            let name = match read_json(&path) {
                Ok(value) => record_name(&value),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "Skipping unreadable record");
                    None
                }
            };
            if let Some(name) = name {
                index.insert(&name, path);
            }
        }
        Ok(index)
    }

    /// Register a path unless the name is already claimed.
    pub fn insert(&mut self, name: &str, path: PathBuf) -> bool {
        let key = name_key(name);
        if let Some(existing) = self.paths.get(&key) {
            warn!(
                character = name,
                kept = %existing.display(),
                ignored = %path.display(),
                "Duplicate character name"
            );
            return false;
        }
        self.paths.insert(key, path);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.paths.get(&name_key(name)).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// All character records plus the player, keyed by normalized name.
#[derive(Debug, Clone)]
pub struct CharacterStore {
    root: Option<PathBuf>,
    characters: BTreeMap<String, CharacterRecord>,
    player: PlayerRecord,
    index: NameIndex,
}

impl CharacterStore {
    /// Create a store that is never written to disk.
    pub fn in_memory(player: PlayerRecord) -> Self {
        Self {
            root: None,
            characters: BTreeMap::new(),
            player,
            index: NameIndex::new(),
        }
    }

    /// Load every record under `root`.
    ///
    /// The player is the record at `player_file` when given, otherwise the
    /// first record carrying a `save` entry.
    pub fn load(root: impl AsRef<Path>, player_file: Option<&Path>) -> Result<Self, RulesError> {
        let root = root.as_ref();
        let mut characters = BTreeMap::new();
        let mut player: Option<PlayerRecord> = None;
        let mut index = NameIndex::new();

        for path in collect_record_files(root)? {
            let value = read_json(&path)?;
            let Some(name) = record_name(&value) else {
                debug!(path = %path.display(), "Skipping file without a name");
                continue;
            };
            if !index.insert(&name, path.clone()) {
                continue;
            }

            let bounds = load_bounds(&path)?;
            let is_player = match player_file {
                Some(player_path) => paths_match(&path, player_path),
                None => player.is_none() && value.get("save").is_some(),
            };

            if is_player {
                let mut record: PlayerRecord =
                    serde_json::from_value(value).map_err(|e| RulesError::json(&path, e))?;
                record.character.bounds = bounds;
                player = Some(record);
            } else {
                let mut record: CharacterRecord =
                    serde_json::from_value(value).map_err(|e| RulesError::json(&path, e))?;
                record.bounds = bounds;
                characters.insert(name_key(&name), record);
            }
        }

        let player = player.unwrap_or_else(|| {
            warn!(root = %root.display(), "No player record found, using default");
            PlayerRecord::new(DEFAULT_PLAYER_NAME)
        });

        info!(
            root = %root.display(),
            characters = characters.len(),
            player = %player.name(),
            "Character store loaded"
        );

        Ok(Self {
            root: Some(root.to_path_buf()),
            characters,
            player,
            index,
        })
    }

    /// Add or replace a character in memory only.
    pub fn insert(&mut self, record: CharacterRecord) {
        self.characters.insert(name_key(&record.name), record);
    }

    /// Get a character (or the player) by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&CharacterRecord> {
        let key = name_key(name);
        if key == name_key(self.player.name()) {
            return Some(&self.player.character);
        }
        self.characters.get(&key)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Copy of a character's current record.
    pub fn status(&self, name: &str) -> Option<CharacterRecord> {
        self.get(name).cloned()
    }

    pub fn is_player(&self, name: &str) -> bool {
        name_key(name) == name_key(self.player.name())
    }

    pub fn player(&self) -> &PlayerRecord {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut PlayerRecord {
        &mut self.player
    }

    /// Non-player characters in name order.
    pub fn characters(&self) -> impl Iterator<Item = &CharacterRecord> {
        self.characters.values()
    }

    /// Display names of every known character, player included.
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.player.name())
            .chain(self.characters.values().map(|c| c.name.as_str()))
            .collect()
    }

    /// Backing file of a character, if it has one.
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.index.get(name)
    }

    pub fn player_path(&self) -> Option<&Path> {
        self.index.get(self.player.name())
    }

    pub fn index(&self) -> &NameIndex {
        &self.index
    }

    /// Rebuild the name→path index from disk.
    pub fn refresh_index(&mut self) -> Result<(), RulesError> {
        if let Some(root) = &self.root {
            self.index = NameIndex::scan(root)?;
            debug!(entries = self.index.len(), "Character index refreshed");
        }
        Ok(())
    }

    /// Current record for `name`: from memory, else read from its backing file.
    pub(crate) fn resolve(&self, name: &str) -> Result<Option<StoredRecord>, RulesError> {
        if self.is_player(name) {
            return Ok(Some(StoredRecord::Player(self.player.clone())));
        }
        if let Some(record) = self.characters.get(&name_key(name)) {
            return Ok(Some(StoredRecord::Character(record.clone())));
        }
        match self.path_of(name) {
            Some(path) => read_record(path).map(|record| Some(StoredRecord::Character(record))),
            None => Ok(None),
        }
    }

    /// Persist `record` (when file-backed) and then install it in memory.
    ///
    /// Memory is only touched after a successful write. Returns whether the
    /// record was written to disk.
    pub(crate) fn commit(&mut self, name: &str, record: StoredRecord) -> Result<bool, RulesError> {
        let path = self.path_of(name).map(Path::to_path_buf);
        if let Some(path) = &path {
            match &record {
                StoredRecord::Player(player) => write_json_atomic(path, player)?,
                StoredRecord::Character(character) => write_json_atomic(path, character)?,
            }
        }

        match record {
            StoredRecord::Player(player) => self.player = player,
            StoredRecord::Character(character) => {
                self.characters.insert(name_key(name), character);
            }
        }
        Ok(path.is_some())
    }
}

/// A record as the store holds it. The player keeps its inventory, flags
/// and memories next to the character fields.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredRecord {
    Player(PlayerRecord),
    Character(CharacterRecord),
}

impl StoredRecord {
    pub fn character(&self) -> &CharacterRecord {
        match self {
            StoredRecord::Player(player) => &player.character,
            StoredRecord::Character(character) => character,
        }
    }

    pub fn character_mut(&mut self) -> &mut CharacterRecord {
        match self {
            StoredRecord::Player(player) => &mut player.character,
            StoredRecord::Character(character) => character,
        }
    }

    /// The record in its file layout, one key per field.
    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            StoredRecord::Player(player) => serde_json::to_value(player)?,
            StoredRecord::Character(character) => serde_json::to_value(character)?,
        };
        match value {
            Value::Object(fields) => Ok(fields),
            other => Err(serde::ser::Error::custom(format!("record is not an object: {other}"))),
        }
    }

    /// Rebuild a record of the same kind from its file layout. Bounds are
    /// carried over since they never appear in the layout.
    pub fn with_fields(&self, fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let bounds = self.character().bounds.clone();
        let mut rebuilt = match self {
            StoredRecord::Player(_) => StoredRecord::Player(serde_json::from_value(Value::Object(fields))?),
            StoredRecord::Character(_) => {
                StoredRecord::Character(serde_json::from_value(Value::Object(fields))?)
            }
        };
        rebuilt.character_mut().bounds = bounds;
        Ok(rebuilt)
    }
}

/// Serialize `value` as pretty JSON and move it into place with a rename, so
/// a crash never leaves a half-written file at `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RulesError> {
    let contents = serde_json::to_string_pretty(value).map_err(|e| RulesError::json(path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RulesError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let mut file = fs::File::create(&tmp_path).map_err(|e| RulesError::io(&tmp_path, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| RulesError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        RulesError::io(path, e)
    })?;

    debug!(path = %path.display(), "Record written");
    Ok(())
}

fn read_json(path: &Path) -> Result<Value, RulesError> {
    let raw = fs::read_to_string(path).map_err(|e| RulesError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| RulesError::json(path, e))
}

fn read_record(path: &Path) -> Result<CharacterRecord, RulesError> {
    let value = read_json(path)?;
    let mut record: CharacterRecord =
        serde_json::from_value(value).map_err(|e| RulesError::json(path, e))?;
    record.bounds = load_bounds(path)?;
    Ok(record)
}

fn record_name(value: &Value) -> Option<String> {
    value
        .get("nome")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Sibling `<stem>.limits.json` of a record file, if present.
fn load_bounds(record_path: &Path) -> Result<AttributeBounds, RulesError> {
    let Some(stem) = record_path.file_stem() else {
        return Ok(AttributeBounds::default());
    };
    let limits_path =
        record_path.with_file_name(format!("{}{}", stem.to_string_lossy(), LIMITS_SUFFIX));
    if !limits_path.is_file() {
        return Ok(AttributeBounds::default());
    }
    let raw = fs::read_to_string(&limits_path).map_err(|e| RulesError::io(&limits_path, e))?;
    serde_json::from_str(&raw).map_err(|e| RulesError::json(&limits_path, e))
}

fn collect_record_files(root: &Path) -> Result<Vec<PathBuf>, RulesError> {
    let mut files = Vec::new();
    if root.is_dir() {
        collect_into(root, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), RulesError> {
    for entry in fs::read_dir(dir).map_err(|e| RulesError::io(dir, e))? {
        let path = entry.map_err(|e| RulesError::io(dir, e))?.path();
        if path.is_dir() {
            collect_into(&path, files)?;
            continue;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if file_name.ends_with(".json") && !file_name.ends_with(LIMITS_SUFFIX) {
            files.push(path);
        }
    }
    Ok(())
}

fn paths_match(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
