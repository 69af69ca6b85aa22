//! Core types and definitions for wavesurf.
//!
//! This crate defines the vocabulary shared across all other crates:
//! kinematic states and their logs, arena geometry, the injected kinematic
//! rules, observations coming in from the host and reports going out.
//! It has no knowledge of waves, learning or the engine.

pub mod arena;
pub mod constants;
pub mod enums;
pub mod error;
pub mod events;
pub mod geometry;
pub mod rules;
pub mod state_log;
pub mod types;

pub use error::WavesurfError;
pub use types::{KinematicState, Point, Tick};
