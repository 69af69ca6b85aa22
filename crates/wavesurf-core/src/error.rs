//! Error type shared by the wavesurf crates.

use thiserror::Error;

use crate::types::Tick;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WavesurfError {
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("cannot interpolate tick {tick} between {before} and {after}")]
    InvalidInterpolation { before: Tick, tick: Tick, after: Tick },

    #[error("unknown opponent `{0}`")]
    UnknownOpponent(String),

    #[error("wave position regressed from {from} to {to}")]
    PositionRegression { from: String, to: String },
}

impl WavesurfError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
