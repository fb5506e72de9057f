//! Engine configuration, read from TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the story engine. Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root holding `Cap_<n>/EP_<m>.json` episode files.
    pub script_root: PathBuf,

    /// Directory scanned for character records.
    pub characters_dir: PathBuf,

    /// Directory of the progress file.
    pub save_dir: PathBuf,

    /// Player record path. When unset, the first record with a `save`
    /// entry is the player.
    pub player_file: Option<PathBuf>,

    /// Scene used when neither a save nor the player record says where to start.
    pub default_scene: String,

    pub start_chapter: u32,
    pub start_episode: u32,

    /// How long an "item acquired" banner stays up, in frames.
    pub notification_frames: u32,

    pub frame_rate: u32,

    /// Maximum chain of condition redirects followed on one scene entry.
    pub max_redirect_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            script_root: PathBuf::from("Game/data/script/Cap"),
            characters_dir: PathBuf::from("Game/data/script/Base"),
            save_dir: PathBuf::from("Game/data/save"),
            player_file: None,
            default_scene: "1".to_string(),
            start_chapter: 1,
            start_episode: 1,
            notification_frames: 180,
            frame_rate: 60,
            max_redirect_depth: 64,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_script_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_root = path.into();
        self
    }

    pub fn with_characters_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.characters_dir = path.into();
        self
    }

    pub fn with_save_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_dir = path.into();
        self
    }

    pub fn with_player_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.player_file = Some(path.into());
        self
    }

    pub fn with_max_redirect_depth(mut self, depth: usize) -> Self {
        self.max_redirect_depth = depth;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Length of one tick. A zero frame rate is treated as 1.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}
