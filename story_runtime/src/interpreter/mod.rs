//! Scene interpreter - the state machine that walks scenes line by line.
//!
//! Entering a scene (ScanEntry) runs, in order:
//! 1. condition redirects, followed up to `max_redirect_depth` times
//! 2. the save point checkpoint
//! 3. `add_item` into the player's inventory, with a notification
//! 4. the status patch
//! 5. option filtering, cached until the next scene change
//! 6. landing on the first line with visible text, executing the stage
//!    commands of every line passed on the way
//!
//! The interpreter owns the character store; nothing else writes to it while
//! a story runs.

pub mod driver;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use story_rules::{CharacterStore, ConditionEvaluator, Rgb, StatusMutationEngine};

use crate::commands::CommandParser;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::notification::{NotificationTimer, DEFAULT_FADE_IN, DEFAULT_FADE_OUT};
use crate::persistence::{FileSaveGateway, PersistenceGateway, SaveSnapshot};
use crate::script::{DirectoryScriptStore, Episode, EpisodeRef, Scene, SceneOption, ScriptStore};
use crate::stage::{SpriteSlot, Stage};
use crate::text::{replace_placeholders, resolve_speaker, split_speaker};

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// No scene or episode left to play.
    EndOfContent,
    Quit,
    /// A fatal error halted the run.
    Fault,
}

/// Interpreter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Not started yet.
    Idle,
    AwaitingInput,
    /// Inside a scene entry.
    Transitioning,
    Terminated(EndReason),
}

impl Phase {
    pub fn is_terminated(self) -> bool {
        matches!(self, Phase::Terminated(_))
    }
}

/// Position in the story. `line_index` counts revealed lines (1-based),
/// 0 only for a scene without lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub scene_id: String,
    pub line_index: usize,
}

/// Player actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Advance,
    /// Pick a visible option by position.
    Select(usize),
    Quit,
}

/// What a selection did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Transitioned { target: String },
    /// The option has no target scene.
    Inert,
    OutOfRange,
    /// No options are showing.
    Ignored,
}

/// Notification banner state for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationView {
    pub item: String,
    pub alpha: u8,
}

/// Who speaks the current line, from a leading `{Name}:` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerView {
    pub name: String,
    /// The speaker's `cor`, when authored and well formed.
    pub color: Option<Rgb>,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub phase: Phase,
    pub scene_id: String,
    pub title: String,
    pub background: Option<String>,
    pub speaker: Option<SpeakerView>,
    /// Current line with the speaker token and commands stripped and
    /// placeholders resolved.
    pub text: Option<String>,
    /// Option labels, present only while options are showing.
    pub options: Vec<String>,
    pub stage: Vec<(String, SpriteSlot)>,
    pub notification: Option<NotificationView>,
}

/// Drives a story through its scenes.
pub struct SceneInterpreter<S, P> {
    scripts: S,
    saves: P,
    store: CharacterStore,
    episode: Episode,
    scene: Option<Scene>,
    cursor: Cursor,
    phase: Phase,
    options: Vec<SceneOption>,
    stage: Stage,
    notification: NotificationTimer,
    max_redirect_depth: usize,
    save_reached: bool,
}

impl SceneInterpreter<DirectoryScriptStore, FileSaveGateway> {
    /// Build an interpreter over the directories named in `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = CharacterStore::load(&config.characters_dir, config.player_file.as_deref())?;
        let player_path = config
            .player_file
            .clone()
            .or_else(|| store.player_path().map(|path| path.to_path_buf()));
        let saves = FileSaveGateway::new(&config.save_dir)
            .with_player_path(player_path)
            .with_default_scene(config.default_scene.clone());
        let scripts = DirectoryScriptStore::new(&config.script_root);
        Self::new(config, scripts, saves, store)
    }
}

impl<S: ScriptStore, P: PersistenceGateway> SceneInterpreter<S, P> {
    /// Create an interpreter positioned at the configured start episode.
    /// Nothing plays until [`start`](Self::start).
    pub fn new(
        config: &EngineConfig,
        scripts: S,
        saves: P,
        store: CharacterStore,
    ) -> Result<Self, EngineError> {
        let reference = EpisodeRef::new(config.start_chapter, config.start_episode);
        let episode = scripts.load_episode(reference)?;
        Ok(Self {
            scripts,
            saves,
            store,
            episode,
            scene: None,
            cursor: Cursor::default(),
            phase: Phase::Idle,
            options: Vec::new(),
            stage: Stage::new(),
            notification: NotificationTimer::new(config.notification_frames),
            max_redirect_depth: config.max_redirect_depth,
            save_reached: false,
        })
    }

    /// Resume from the saved position and enter that scene.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let snapshot = self.saves.load(self.store.player());
        if let (Some(chapter), Some(episode)) = (snapshot.chapter, snapshot.episode) {
            let reference = EpisodeRef::new(chapter, episode);
            if reference != self.episode.reference() {
                match self.scripts.load_episode(reference) {
                    Ok(episode) => self.episode = episode,
                    Err(err) => return Err(self.fault(err.into())),
                }
            }
        }
        info!(
            episode = %self.episode.reference(),
            scene = %snapshot.scene_id,
            line = snapshot.line_index,
            "Starting story"
        );
        self.enter(&snapshot.scene_id, snapshot.line_index)
    }

    pub fn handle(&mut self, input: Input) -> Result<(), EngineError> {
        match input {
            Input::Advance => self.advance(),
            Input::Select(index) => self.select(index).map(|_| ()),
            Input::Quit => {
                self.quit();
                Ok(())
            }
        }
    }

    /// Primary action: next line, else wait on options, else move on.
    pub fn advance(&mut self) -> Result<(), EngineError> {
        if self.phase != Phase::AwaitingInput {
            return Ok(());
        }
        let Some(scene) = &self.scene else {
            return Ok(());
        };

        if self.cursor.line_index < scene.lines.len() {
            let next = self.cursor.line_index + 1;
            self.reveal(next);
            self.auto_skip();
            return Ok(());
        }

        if !self.options.is_empty() {
            debug!(scene = %self.cursor.scene_id, "Waiting for an option");
            return Ok(());
        }

        self.transition_next()
    }

    pub fn select(&mut self, index: usize) -> Result<SelectOutcome, EngineError> {
        if !self.options_showing() {
            return Ok(SelectOutcome::Ignored);
        }
        let Some(option) = self.options.get(index) else {
            warn!(index, visible = self.options.len(), "Option index out of range");
            return Ok(SelectOutcome::OutOfRange);
        };
        let Some(target) = option.target.clone() else {
            warn!(scene = %self.cursor.scene_id, option = %option.label, "Selected option has no target");
            return Ok(SelectOutcome::Inert);
        };

        debug!(option = %option.label, target = %target, "Option selected");
        self.options.clear();
        self.enter(&target, 1)?;
        Ok(SelectOutcome::Transitioned { target })
    }

    /// Stop immediately. Nothing is saved.
    pub fn quit(&mut self) {
        if self.phase.is_terminated() {
            return;
        }
        info!(scene = %self.cursor.scene_id, save_reached = self.save_reached, "Quit");
        self.options.clear();
        self.phase = Phase::Terminated(EndReason::Quit);
    }

    /// Advance per-frame timers.
    pub fn tick(&mut self) {
        self.notification.tick();
    }

    pub fn frame(&self) -> Frame {
        let scene = self.scene.as_ref();
        let line = scene
            .and_then(|scene| scene.lines.get(self.cursor.line_index.checked_sub(1)?))
            .map(String::as_str);
        let split = line.and_then(split_speaker);
        let speaker = split.and_then(|(token, _)| self.speaker(token));
        let text = split
            .map(|(_, dialogue)| dialogue)
            .or(line)
            .map(CommandParser::strip_commands)
            .filter(|line| !line.is_empty())
            .map(|line| replace_placeholders(&line, self.store.player().name(), self.store.names()));

        Frame {
            phase: self.phase,
            scene_id: self.cursor.scene_id.clone(),
            title: scene.map(|scene| scene.title.clone()).unwrap_or_default(),
            background: scene.and_then(|scene| scene.background.clone()),
            speaker,
            text,
            options: self
                .visible_options()
                .iter()
                .map(|option| option.label.clone())
                .collect(),
            stage: self
                .stage
                .slots()
                .map(|(position, slot)| (position.to_string(), slot.clone()))
                .collect(),
            notification: self.notification.current().map(|item| NotificationView {
                item: item.to_string(),
                alpha: self.notification.alpha(DEFAULT_FADE_IN, DEFAULT_FADE_OUT),
            }),
        }
    }

    fn speaker(&self, token: &str) -> Option<SpeakerView> {
        let name = resolve_speaker(token, self.store.player().name(), self.store.names())?;
        Some(SpeakerView {
            name: name.to_string(),
            color: self.store.get(name).and_then(|record| record.rgb()),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    /// Options the player can pick right now.
    pub fn visible_options(&self) -> &[SceneOption] {
        if self.options_showing() {
            &self.options
        } else {
            &[]
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn notification(&self) -> &NotificationTimer {
        &self.notification
    }

    pub fn store(&self) -> &CharacterStore {
        &self.store
    }

    pub fn saves(&self) -> &P {
        &self.saves
    }

    /// Whether a save point was written during this run.
    pub fn save_reached(&self) -> bool {
        self.save_reached
    }

    fn options_showing(&self) -> bool {
        self.phase == Phase::AwaitingInput
            && !self.options.is_empty()
            && self
                .scene
                .as_ref()
                .map_or(false, |scene| self.cursor.line_index >= scene.lines.len())
    }

    /// ScanEntry: enter `target` and land at `landing` (1-based).
    fn enter(&mut self, target: &str, landing: usize) -> Result<(), EngineError> {
        self.phase = Phase::Transitioning;
        let scene = match self.resolve_redirects(target) {
            Ok(scene) => scene,
            Err(err) => return Err(self.fault(err)),
        };

        info!(scene = %scene.id, title = %scene.title, "Entering scene");
        self.cursor = Cursor {
            scene_id: scene.id.clone(),
            line_index: 0,
        };
        self.options.clear();
        self.stage.clear();

        if scene.save_point {
            self.checkpoint(&scene.id);
        }
        if let Some(item) = &scene.add_item {
            self.store.player_mut().add_item(item.clone());
            self.notification.show(item.clone());
            info!(item = %item, "Item added to inventory");
        }
        if let Some(patch) = &scene.status_patch {
            let outcome = StatusMutationEngine::new(&mut self.store).apply(patch);
            debug!(scene = %scene.id, character = %patch.name, outcome = ?outcome, "Scene status patch");
        }
        self.options = ConditionEvaluator::new(&self.store).filter_options(&scene.options);
        if self.options.len() < scene.options.len() {
            debug!(
                scene = %scene.id,
                total = scene.options.len(),
                visible = self.options.len(),
                "Options filtered"
            );
        }

        let landing = landing.max(1).min(scene.lines.len());
        self.scene = Some(scene);
        for line in 1..=landing {
            self.reveal(line);
        }
        self.auto_skip();

        self.phase = Phase::AwaitingInput;
        Ok(())
    }

    /// Follow condition redirects from `target` to the scene to show.
    fn resolve_redirects(&self, target: &str) -> Result<Scene, EngineError> {
        let evaluator = ConditionEvaluator::new(&self.store);
        let mut id = target.to_string();
        for depth in 0..=self.max_redirect_depth {
            let scene = self
                .episode
                .scene(&id)
                .ok_or_else(|| EngineError::SceneNotFound {
                    scene: id.clone(),
                    episode: self.episode.reference(),
                })?;
            match evaluator.evaluate_scene_conditions(&scene.conditions) {
                Some(next) => {
                    debug!(from = %id, to = next, depth, "Scene redirect");
                    id = next.to_string();
                }
                None => return Ok(scene.clone()),
            }
        }
        Err(EngineError::RedirectDepthExceeded {
            scene: target.to_string(),
            depth: self.max_redirect_depth,
        })
    }

    fn checkpoint(&mut self, scene_id: &str) {
        let reference = self.episode.reference();
        let snapshot =
            SaveSnapshot::new(scene_id, 1).with_episode(reference.chapter, reference.episode);
        match self.saves.save(&snapshot, self.store.player()) {
            Ok(()) => self.save_reached = true,
            Err(err) => warn!(scene = scene_id, error = %err, "Save point failed, continuing"),
        }
    }

    /// Make `line` current and run its stage commands.
    fn reveal(&mut self, line: usize) {
        self.cursor.line_index = line;
        let Some(scene) = &self.scene else {
            return;
        };
        let Some(text) = line.checked_sub(1).and_then(|i| scene.lines.get(i)) else {
            return;
        };
        for command in CommandParser::parse(text) {
            self.stage.apply(&command, &self.store);
        }
    }

    /// Move past lines with nothing visible, stopping at the last line.
    fn auto_skip(&mut self) {
        loop {
            let Some(scene) = &self.scene else {
                return;
            };
            let index = self.cursor.line_index;
            let skip = index >= 1
                && index < scene.lines.len()
                && CommandParser::is_command_only(&scene.lines[index - 1]);
            if !skip {
                return;
            }
            self.reveal(index + 1);
        }
    }

    /// Leave a finished scene without options.
    fn transition_next(&mut self) -> Result<(), EngineError> {
        let Some(scene) = &self.scene else {
            return Ok(());
        };

        if let Some(next) = scene.next.clone() {
            return self.enter(&next, 1);
        }
        if let Some(after) = self.episode.scene_after(&scene.id).map(|s| s.id.clone()) {
            return self.enter(&after, 1);
        }

        let Some(reference) = self.scripts.next_episode(self.episode.reference()) else {
            self.finish(EndReason::EndOfContent);
            return Ok(());
        };
        let episode = match self.scripts.load_episode(reference) {
            Ok(episode) => episode,
            Err(err) => return Err(self.fault(err.into())),
        };
        info!(episode = %reference, "Next episode");
        self.episode = episode;
        match self.episode.first().map(|s| s.id.clone()) {
            Some(first) => self.enter(&first, 1),
            None => {
                self.finish(EndReason::EndOfContent);
                Ok(())
            }
        }
    }

    fn finish(&mut self, reason: EndReason) {
        info!(scene = %self.cursor.scene_id, reason = ?reason, "Story ended");
        self.options.clear();
        self.phase = Phase::Terminated(reason);
    }

    fn fault(&mut self, err: EngineError) -> EngineError {
        error!(scene = %self.cursor.scene_id, error = %err, "Interpreter halted");
        self.options.clear();
        self.phase = Phase::Terminated(EndReason::Fault);
        err
    }
}
