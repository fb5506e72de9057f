//! # Story Rules
//!
//! The state crate of the story engine - character and player records, the
//! file-backed character store, condition predicates and status patches.
//! This crate knows nothing about scenes or how the story is driven.

pub mod conditions;
pub mod entities;
pub mod error;
pub mod status;
pub mod world_state;

pub use conditions::*;
pub use entities::*;
pub use error::*;
pub use status::*;
pub use world_state::*;
