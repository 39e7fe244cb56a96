//! Morpho - control-parameter mapping for granular synthesis
//!
//! Maps application control parameters (a game variable, a sensor value)
//! onto the numeric inputs of a granular synthesis engine, using
//! data-driven curve tables that morph between response shapes as the
//! driving values move. The engine itself is external; Morpho decides
//! which values and table numbers it is sent, and when.

pub mod config;
pub mod engine;
pub mod mapping;
pub mod playback;
pub mod tables;

pub use config::Config;
pub use engine::{Engine, OfflineEngine};
pub use playback::Conductor;
