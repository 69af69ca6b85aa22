//! Enumeration types used throughout wavesurf.

use serde::{Deserialize, Serialize};

/// Where a wave stands relative to a body it is sweeping.
///
/// Ordered: a wave only ever moves forward through these.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum WavePosition {
    /// Front of the wave has not reached the hitbox.
    #[default]
    Midair,
    /// Front has reached the hitbox, source-side edge has not.
    BreakingFront,
    /// Both edges of this tick's band are over the hitbox.
    BreakingCenter,
    /// Wave has fully passed.
    Gone,
}

impl WavePosition {
    pub fn index(self) -> u8 {
        self as u8
    }

    /// A bullet on this wave could hit the body this tick.
    pub fn is_breaking(self) -> bool {
        matches!(self, Self::BreakingFront | Self::BreakingCenter)
    }
}

impl std::fmt::Display for WavePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Midair => "MIDAIR",
            Self::BreakingFront => "BREAKING_FRONT",
            Self::BreakingCenter => "BREAKING_CENTER",
            Self::Gone => "GONE",
        };
        f.write_str(name)
    }
}

/// Movement option considered by the surf search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfOption {
    CounterClockwise,
    #[default]
    Stop,
    Clockwise,
}

impl SurfOption {
    pub const ALL: [SurfOption; 3] = [Self::CounterClockwise, Self::Stop, Self::Clockwise];

    /// Orbit direction: -1, 0 or 1.
    pub fn direction(self) -> i32 {
        match self {
            Self::CounterClockwise => -1,
            Self::Stop => 0,
            Self::Clockwise => 1,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::CounterClockwise => 0,
            Self::Stop => 1,
            Self::Clockwise => 2,
        }
    }
}

/// Aim strategies competing for the real gun. Declaration order breaks ties.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StrategyKind {
    /// Guess-factor k-NN over the main targeting view.
    #[default]
    MainKnn,
    /// Multi-view k-NN tuned against adaptive movement.
    AntiSurfer,
    /// Kernel density over every melee opponent's projected locations.
    /// Not rated by the virtual guns.
    Melee,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [Self::MainKnn, Self::AntiSurfer];

    pub fn label(self) -> &'static str {
        match self {
            Self::MainKnn => "Main Gun",
            Self::AntiSurfer => "Anti-Surfer Gun",
            Self::Melee => "Melee Gun",
        }
    }
}

/// How a wave measures its target's distance to the walls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallDistanceStyle {
    /// Sample along the orbit arc at constant distance.
    #[default]
    Orbital,
    /// Straight line along the target's heading.
    Direct,
    /// Ratio of precise to rough escape angle.
    PreciseMea,
}

/// Side of the escape range relative to the orbit direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscapeSide {
    Positive,
    Negative,
}

impl EscapeSide {
    pub fn from_positive(positive: bool) -> Self {
        if positive {
            Self::Positive
        } else {
            Self::Negative
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// Movement mode chosen for a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveMode {
    /// Dodging at least one surfable wave.
    Surf,
    /// No surfable wave; circling at the desired distance.
    #[default]
    Orbit,
    /// Several opponents alive; driving to the least risky nearby point.
    Melee,
}
