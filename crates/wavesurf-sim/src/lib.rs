//! Tick engine for wavesurf.
//!
//! `SurfEngine` owns a hecs world with one entity per tracked opponent,
//! applies queued observations, runs the per-tick systems and returns a
//! `TickReport` with the aim and movement decisions. Completely headless;
//! the scripted duel in `scenario` drives it for deterministic testing.

pub mod components;
pub mod config;
pub mod engine;
pub mod gun;
pub mod mover;
pub mod own_state;
pub mod scenario;
pub mod systems;

pub use config::EngineConfig;
pub use engine::SurfEngine;

#[cfg(test)]
mod tests;
