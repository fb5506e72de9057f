//! Save points - the progress file plus the player record.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use story_rules::{write_json_atomic, PlayerRecord};

use crate::error::PersistError;

/// File name of the progress record inside the save directory.
pub const SAVE_FILE_NAME: &str = "save.json";

/// Where to resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSnapshot {
    #[serde(rename = "current_scene_id", deserialize_with = "scene_id")]
    pub scene_id: String,

    /// 1-based line of the scene.
    #[serde(rename = "current_text_index", default = "first_line")]
    pub line_index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
}

impl SaveSnapshot {
    pub fn new(scene_id: impl Into<String>, line_index: usize) -> Self {
        Self {
            scene_id: scene_id.into(),
            line_index,
            episode: None,
            chapter: None,
        }
    }

    pub fn with_episode(mut self, chapter: u32, episode: u32) -> Self {
        self.chapter = Some(chapter);
        self.episode = Some(episode);
        self
    }
}

fn first_line() -> usize {
    1
}

fn scene_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(D::Error::custom(format!("expected a scene id, found {other}"))),
    }
}

/// Checkpoint storage used by the interpreter.
pub trait PersistenceGateway {
    /// Write the snapshot and the full player record.
    fn save(&mut self, snapshot: &SaveSnapshot, player: &PlayerRecord) -> Result<(), PersistError>;

    /// Where to resume: the saved progress, else the player's initial
    /// position, else the default scene at line 1.
    fn load(&self, player: &PlayerRecord) -> SaveSnapshot;

    /// Forget saved progress. Returns whether anything was removed.
    fn delete_save(&mut self) -> Result<bool, PersistError>;
}

/// Saves under a directory on disk.
#[derive(Debug, Clone)]
pub struct FileSaveGateway {
    save_dir: PathBuf,
    player_path: Option<PathBuf>,
    default_scene: String,
}

impl FileSaveGateway {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            player_path: None,
            default_scene: "1".to_string(),
        }
    }

    /// File the player record is written to on save.
    pub fn with_player_path(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.player_path = path.map(Into::into);
        self
    }

    pub fn with_default_scene(mut self, scene: impl Into<String>) -> Self {
        self.default_scene = scene.into();
        self
    }

    pub fn save_path(&self) -> PathBuf {
        self.save_dir.join(SAVE_FILE_NAME)
    }

    pub fn player_path(&self) -> Option<&Path> {
        self.player_path.as_deref()
    }

    fn read_progress(&self) -> Option<SaveSnapshot> {
        let path = self.save_path();
        if !path.is_file() {
            return None;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<SaveSnapshot>(&raw).map_err(|e| e.to_string()));
        match parsed {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Unreadable save file, ignoring");
                None
            }
        }
    }
}

impl PersistenceGateway for FileSaveGateway {
    fn save(&mut self, snapshot: &SaveSnapshot, player: &PlayerRecord) -> Result<(), PersistError> {
        write_json_atomic(&self.save_path(), snapshot)?;
        match &self.player_path {
            Some(path) => write_json_atomic(path, player)?,
            None => warn!("No player record path, player data not saved"),
        }
        info!(scene = %snapshot.scene_id, line = snapshot.line_index, "Game saved");
        Ok(())
    }

    fn load(&self, player: &PlayerRecord) -> SaveSnapshot {
        if let Some(snapshot) = self.read_progress() {
            info!(scene = %snapshot.scene_id, line = snapshot.line_index, "Save loaded");
            return snapshot;
        }
        resume_point(player, &self.default_scene)
    }

    fn delete_save(&mut self) -> Result<bool, PersistError> {
        let path = self.save_path();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| PersistError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "Save deleted");
        Ok(true)
    }
}

/// Saves kept in memory, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySaveGateway {
    snapshot: Option<SaveSnapshot>,
    player: Option<PlayerRecord>,
    saves: usize,
    default_scene: Option<String>,
}

impl MemorySaveGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: SaveSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_default_scene(mut self, scene: impl Into<String>) -> Self {
        self.default_scene = Some(scene.into());
        self
    }

    pub fn snapshot(&self) -> Option<&SaveSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn player(&self) -> Option<&PlayerRecord> {
        self.player.as_ref()
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl PersistenceGateway for MemorySaveGateway {
    fn save(&mut self, snapshot: &SaveSnapshot, player: &PlayerRecord) -> Result<(), PersistError> {
        self.snapshot = Some(snapshot.clone());
        self.player = Some(player.clone());
        self.saves += 1;
        Ok(())
    }

    fn load(&self, player: &PlayerRecord) -> SaveSnapshot {
        match &self.snapshot {
            Some(snapshot) => snapshot.clone(),
            None => resume_point(player, self.default_scene.as_deref().unwrap_or("1")),
        }
    }

    fn delete_save(&mut self) -> Result<bool, PersistError> {
        Ok(self.snapshot.take().is_some())
    }
}

fn resume_point(player: &PlayerRecord, default_scene: &str) -> SaveSnapshot {
    match &player.resume {
        Some(resume) => {
            debug!(scene = %resume.scene, "Resuming from player record");
            SaveSnapshot::new(resume.scene.clone(), 1)
        }
        None => {
            debug!(scene = default_scene, "No save found, starting from default scene");
            SaveSnapshot::new(default_scene, 1)
        }
    }
}
