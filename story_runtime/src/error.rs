//! Error types for the runtime crate.

use std::path::PathBuf;
use thiserror::Error;

use story_rules::RulesError;

use crate::script::EpisodeRef;

/// Failures while loading or validating scene content.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid episode {episode}: {reason}")]
    Validation { episode: EpisodeRef, reason: String },

    #[error("episode {0} not found")]
    EpisodeNotFound(EpisodeRef),
}

/// Failures while writing or reading save data.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Write(#[from] RulesError),
}

/// Failures while loading the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures that halt the interpreter.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scene {scene} not found in episode {episode}")]
    SceneNotFound { scene: String, episode: EpisodeRef },

    #[error("scene redirects from {scene} exceeded depth {depth}")]
    RedirectDepthExceeded { scene: String, depth: usize },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
