//! Per-tick systems that operate on the opponent entities.
//!
//! Systems are plain functions over `&mut World` plus whatever engine state
//! they read. They keep no state of their own; everything lives in the
//! `Opponent`, `GunTracker` and `MoveTracker` components.

pub mod gun_waves;
pub mod move_waves;
pub mod surfing;
pub mod targeting;
