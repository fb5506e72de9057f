//! Where episodes come from.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Episode, EpisodeRef};
use crate::error::ScriptError;

/// Source of episode content.
pub trait ScriptStore {
    fn load_episode(&self, reference: EpisodeRef) -> Result<Episode, ScriptError>;

    /// The episode that follows `after`, if any.
    fn next_episode(&self, after: EpisodeRef) -> Option<EpisodeRef>;
}

/// Episodes laid out as `<root>/Cap_<chapter>/EP_<episode>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryScriptStore {
    root: PathBuf,
}

impl DirectoryScriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, reference: EpisodeRef) -> PathBuf {
        self.root
            .join(format!("Cap_{}", reference.chapter))
            .join(format!("EP_{}.json", reference.episode))
    }

    fn exists(&self, reference: EpisodeRef) -> bool {
        self.path_of(reference).is_file()
    }
}

impl ScriptStore for DirectoryScriptStore {
    fn load_episode(&self, reference: EpisodeRef) -> Result<Episode, ScriptError> {
        let path = self.path_of(reference);
        if !path.is_file() {
            return Err(ScriptError::EpisodeNotFound(reference));
        }

        let raw = fs::read_to_string(&path).map_err(|source| ScriptError::Io {
            path: path.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| ScriptError::Json {
            path: path.clone(),
            source,
        })?;

        let episode = Episode::from_value(reference, value)?;
        info!(episode = %reference, scenes = episode.len(), "Episode loaded");
        Ok(episode)
    }

    fn next_episode(&self, after: EpisodeRef) -> Option<EpisodeRef> {
        let candidates = [
            EpisodeRef::new(after.chapter, after.episode + 1),
            EpisodeRef::new(after.chapter + 1, 1),
        ];
        let next = candidates.into_iter().find(|candidate| self.exists(*candidate));
        debug!(after = %after, next = ?next, "Next episode lookup");
        next
    }
}

/// Episodes held in memory, for hosts that embed their content.
#[derive(Debug, Clone, Default)]
pub struct MemoryScriptStore {
    episodes: BTreeMap<EpisodeRef, Episode>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, episode: Episode) {
        self.episodes.insert(episode.reference(), episode);
    }

    pub fn with_episode(mut self, episode: Episode) -> Self {
        self.insert(episode);
        self
    }
}

impl ScriptStore for MemoryScriptStore {
    fn load_episode(&self, reference: EpisodeRef) -> Result<Episode, ScriptError> {
        self.episodes
            .get(&reference)
            .cloned()
            .ok_or(ScriptError::EpisodeNotFound(reference))
    }

    fn next_episode(&self, after: EpisodeRef) -> Option<EpisodeRef> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.episodes
            .range((Excluded(after), Unbounded))
            .next()
            .map(|(reference, _)| *reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Scene;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_episode(root: &Path, chapter: u32, episode: u32) {
        let dir = root.join(format!("Cap_{chapter}"));
        fs::create_dir_all(&dir).unwrap();
        let doc = json!({
            format!("EP_{episode}"): [
                {"id": "1", "titulo": format!("c{chapter}e{episode}"), "texto": ["hi"]}
            ]
        });
        fs::write(dir.join(format!("EP_{episode}.json")), doc.to_string()).unwrap();
    }

    #[test]
    fn test_directory_store_loads_episode() {
        let dir = TempDir::new().unwrap();
        write_episode(dir.path(), 1, 1);
        let store = DirectoryScriptStore::new(dir.path());

        let episode = store.load_episode(EpisodeRef::new(1, 1)).unwrap();
        assert_eq!(episode.first().unwrap().title, "c1e1");

        let missing = store.load_episode(EpisodeRef::new(1, 2));
        assert!(matches!(missing, Err(ScriptError::EpisodeNotFound(_))));
    }

    #[test]
    fn test_directory_store_chains_episodes_and_chapters() {
        let dir = TempDir::new().unwrap();
        write_episode(dir.path(), 1, 1);
        write_episode(dir.path(), 1, 2);
        write_episode(dir.path(), 2, 1);
        let store = DirectoryScriptStore::new(dir.path());

        assert_eq!(store.next_episode(EpisodeRef::new(1, 1)), Some(EpisodeRef::new(1, 2)));
        assert_eq!(store.next_episode(EpisodeRef::new(1, 2)), Some(EpisodeRef::new(2, 1)));
        assert_eq!(store.next_episode(EpisodeRef::new(2, 1)), None);
    }

    #[test]
    fn test_directory_store_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Cap_1")).unwrap();
        fs::write(dir.path().join("Cap_1/EP_1.json"), "{ nope").unwrap();

        let err = DirectoryScriptStore::new(dir.path())
            .load_episode(EpisodeRef::new(1, 1))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Json { .. }));
    }

    #[test]
    fn test_memory_store_next_episode_in_order() {
        let ep = |c, e| Episode::new(EpisodeRef::new(c, e), vec![Scene::new("1", "t")]).unwrap();
        let store = MemoryScriptStore::new()
            .with_episode(ep(2, 1))
            .with_episode(ep(1, 1))
            .with_episode(ep(1, 3));

        assert_eq!(store.next_episode(EpisodeRef::new(1, 1)), Some(EpisodeRef::new(1, 3)));
        assert_eq!(store.next_episode(EpisodeRef::new(1, 3)), Some(EpisodeRef::new(2, 1)));
        assert_eq!(store.next_episode(EpisodeRef::new(2, 1)), None);
        assert!(store.load_episode(EpisodeRef::new(1, 3)).is_ok());
    }
}
