//! Scene schema - episodes, scenes and branch options as authored in the
//! episode JSON files, validated once at load.

mod store;

pub use store::*;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use story_rules::{Gated, Predicate, Redirect, StatusPatch};

use crate::error::ScriptError;

/// Option fields naming the target scene, in priority order.
pub const OPTION_TARGET_FIELDS: [&str; 6] = ["cena", "proximo_id", "proximo", "next", "scene", "id"];

/// Chapter and episode numbers of an episode file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub chapter: u32,
    pub episode: u32,
}

impl EpisodeRef {
    pub fn new(chapter: u32, episode: u32) -> Self {
        Self { chapter, episode }
    }

    /// Top-level key of the scene list, `EP_<n>`.
    pub fn key(&self) -> String {
        format!("EP_{}", self.episode)
    }
}

impl fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cap_{}/EP_{}", self.chapter, self.episode)
    }
}

/// A branch button.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneOption {
    pub label: String,
    /// `None` makes the option inert.
    pub target: Option<String>,
    pub condition: Option<Predicate>,
}

impl Gated for SceneOption {
    fn condition(&self) -> Option<&Predicate> {
        self.condition.as_ref()
    }
}

/// One scene of an episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub title: String,
    pub lines: Vec<String>,
    pub options: Vec<SceneOption>,
    /// Redirects checked in order on entry.
    pub conditions: Vec<Redirect>,
    pub save_point: bool,
    pub add_item: Option<String>,
    pub status_patch: Option<StatusPatch>,
    /// Explicit next scene (`proximo_id`, or the older `x_x`).
    pub next: Option<String>,
    /// Background id (`img_fundo`).
    pub background: Option<String>,
}

impl Scene {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            lines: Vec::new(),
            options: Vec::new(),
            conditions: Vec::new(),
            save_point: false,
            add_item: None,
            status_patch: None,
            next: None,
            background: None,
        }
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn with_option(mut self, label: impl Into<String>, target: impl Into<String>) -> Self {
        self.options.push(SceneOption {
            label: label.into(),
            target: Some(target.into()),
            condition: None,
        });
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Parse and validate one authored scene object.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let raw: RawScene = serde_json::from_value(value).map_err(|e| e.to_string())?;

        let id = match raw.id {
            Some(id) => scene_id(&id).ok_or("'id' must be a string or number")?,
            None => return Err("missing 'id'".to_string()),
        };
        let title = match raw.titulo {
            Some(Value::String(title)) => title,
            Some(_) => return Err(format!("scene {id}: 'titulo' must be a string")),
            None => return Err(format!("scene {id}: missing 'titulo'")),
        };
        let lines = match raw.texto {
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::String(line) => Ok(line),
                    _ => Err(format!("scene {id}: texto[{i}] must be a string")),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(format!("scene {id}: 'texto' must be a list")),
            None => return Err(format!("scene {id}: missing 'texto'")),
        };

        let options = raw
            .opcoes
            .into_iter()
            .map(|option| parse_option(&id, option))
            .collect();

        let conditions = raw
            .condicao
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let target = entry
                    .get("proximo_id")
                    .and_then(scene_id)
                    .ok_or_else(|| format!("scene {id}: condicao[{i}] missing 'proximo_id'"))?;
                Ok(Redirect {
                    predicate: Predicate::from_map(&entry),
                    target,
                    label: entry.get("dev").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        let next = raw
            .proximo_id
            .as_ref()
            .or(raw.x_x.as_ref())
            .and_then(scene_id);

        Ok(Self {
            id,
            title,
            lines,
            options,
            conditions,
            save_point: truthy(&raw.save_point),
            add_item: raw.add_item.filter(|item| !item.trim().is_empty()),
            status_patch: raw.status_infor,
            next,
            background: raw.img_fundo,
        })
    }
}

#[derive(Deserialize)]
struct RawScene {
    id: Option<Value>,
    titulo: Option<Value>,
    texto: Option<Value>,
    #[serde(default)]
    opcoes: Vec<Map<String, Value>>,
    #[serde(default)]
    condicao: Vec<Map<String, Value>>,
    #[serde(default)]
    save_point: Value,
    #[serde(default)]
    add_item: Option<String>,
    #[serde(default)]
    status_infor: Option<StatusPatch>,
    #[serde(default)]
    proximo_id: Option<Value>,
    #[serde(default)]
    x_x: Option<Value>,
    #[serde(default)]
    img_fundo: Option<String>,
}

fn parse_option(scene: &str, option: Map<String, Value>) -> SceneOption {
    let label = option
        .get("texto")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let target = OPTION_TARGET_FIELDS
        .iter()
        .find_map(|field| option.get(*field).and_then(scene_id));
    if target.is_none() {
        warn!(scene, option = %label, "Option has no target scene");
    }

    let condition = match option.get("condicao") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(Predicate::from_map(map)),
        Some(other) => {
            warn!(scene, option = %label, condition = %other, "Ignoring non-object option condition");
            None
        }
    };

    SceneOption {
        label,
        target,
        condition,
    }
}

/// Scene ids are authored as strings and sometimes as numbers.
fn scene_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// The scenes of one episode in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    reference: EpisodeRef,
    scenes: Vec<Scene>,
    index: HashMap<String, usize>,
}

impl Episode {
    /// Build an episode, rejecting duplicate scene ids.
    pub fn new(reference: EpisodeRef, scenes: Vec<Scene>) -> Result<Self, ScriptError> {
        let mut index = HashMap::with_capacity(scenes.len());
        for (position, scene) in scenes.iter().enumerate() {
            if index.insert(scene.id.clone(), position).is_some() {
                return Err(ScriptError::Validation {
                    episode: reference,
                    reason: format!("duplicate scene id {}", scene.id),
                });
            }
        }
        let episode = Self {
            reference,
            scenes,
            index,
        };
        for (scene, target) in episode.dangling_targets() {
            warn!(episode = %reference, scene, target, "Scene refers to a missing scene");
        }
        Ok(episode)
    }

    /// `(scene, target)` pairs whose option, redirect or next target is not
    /// a scene of this episode, in scene order.
    pub fn dangling_targets(&self) -> Vec<(&str, &str)> {
        let mut dangling = Vec::new();
        for scene in &self.scenes {
            let targets = scene
                .options
                .iter()
                .filter_map(|option| option.target.as_deref())
                .chain(scene.conditions.iter().map(|redirect| redirect.target.as_str()))
                .chain(scene.next.as_deref());
            for target in targets {
                if !self.index.contains_key(target) {
                    dangling.push((scene.id.as_str(), target));
                }
            }
        }
        dangling
    }

    /// Parse an episode document: either `{"EP_<n>": [scenes]}`, an object
    /// with a single list of scenes under another key, or a bare list.
    pub fn from_value(reference: EpisodeRef, value: Value) -> Result<Self, ScriptError> {
        let invalid = |reason: String| ScriptError::Validation {
            episode: reference,
            reason,
        };

        let scenes = match value {
            Value::Array(scenes) => scenes,
            Value::Object(mut map) => match map.remove(&reference.key()) {
                Some(Value::Array(scenes)) => scenes,
                Some(_) => return Err(invalid(format!("'{}' must be a list", reference.key()))),
                None => {
                    let mut lists = map.into_iter().filter_map(|(_, v)| match v {
                        Value::Array(scenes) => Some(scenes),
                        _ => None,
                    });
                    match (lists.next(), lists.next()) {
                        (Some(scenes), None) => scenes,
                        _ => return Err(invalid(format!("missing '{}' scene list", reference.key()))),
                    }
                }
            },
            _ => return Err(invalid("top level must be an object or a list".to_string())),
        };

        let scenes = scenes
            .into_iter()
            .enumerate()
            .map(|(i, scene)| Scene::from_value(scene).map_err(|reason| invalid(format!("[{i}] {reason}"))))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(reference, scenes)
    }

    pub fn reference(&self) -> EpisodeRef {
        self.reference
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.index.get(id).map(|&position| &self.scenes[position])
    }

    pub fn first(&self) -> Option<&Scene> {
        self.scenes.first()
    }

    /// The scene declared right after `id`.
    pub fn scene_after(&self, id: &str) -> Option<&Scene> {
        let position = *self.index.get(id)?;
        self.scenes.get(position + 1)
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}
