//! # Story Runtime
//!
//! Plays branching dialogue stories authored as JSON scenes. This crate
//! interprets scenes on top of the character state held by `story_rules`.
//!
//! ## Core Components
//!
//! - **script**: Scene schema, validation and episode stores
//! - **commands**: Inline `{...}` stage commands in dialogue lines
//! - **interpreter**: The scene state machine and its frame loop
//! - **persistence**: Save points and resume
//!
//! Rendering, fonts, images and input devices belong to the host. The
//! interpreter hands out [`Frame`]s and takes [`Input`]s.

pub mod commands;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod notification;
pub mod persistence;
pub mod script;
pub mod stage;
pub mod text;

pub use commands::*;
pub use config::*;
pub use error::*;
pub use interpreter::driver::{run, FrameSink, InputSource};
pub use interpreter::*;
pub use notification::*;
pub use persistence::*;
pub use script::*;
pub use stage::*;
pub use text::*;
