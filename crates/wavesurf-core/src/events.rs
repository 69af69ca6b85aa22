//! Observations coming in from the host and reports going back out.

use serde::{Deserialize, Serialize};

use crate::enums::*;
use crate::types::{KinematicState, Point, Tick};

/// One thing the host saw happen. Queued and applied at the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Observation {
    /// Our own pose and gun, once per tick.
    OwnState {
        state: KinematicState,
        energy: f64,
        gun_heat: f64,
        opponents_alive: u32,
    },
    /// An opponent was scanned.
    Scan {
        name: String,
        state: KinematicState,
        energy: f64,
    },
    /// We fired a real bullet.
    ShotFired {
        power: f64,
        source: Point,
        angle: f64,
        tick: Tick,
    },
    /// One of the opponent's bullets hit us.
    HitByBullet {
        name: String,
        power: f64,
        location: Point,
        tick: Tick,
    },
    /// One of our bullets hit the opponent.
    BulletHit {
        name: String,
        power: f64,
        location: Point,
        tick: Tick,
    },
    /// Two bullets collided mid-air.
    BulletHitBullet {
        name: String,
        power: f64,
        location: Point,
        own_power: f64,
        own_location: Point,
        tick: Tick,
    },
    /// We crashed into a wall at `speed`.
    HitWall { speed: f64, tick: Tick },
    /// An opponent was destroyed.
    Eliminated { name: String },
    /// A new round began.
    RoundStart { round: u32 },
}

/// Absolute firing angle for the next real shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AimDecision {
    pub target: String,
    pub angle: f64,
    pub power: f64,
    pub strategy: StrategyKind,
    /// Gun will be cool next tick, so this aim is for a real shot.
    pub fire: bool,
}

/// Movement command for the coming tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveDecision {
    pub mode: MoveMode,
    /// Surf or orbit option, `None` for a melee destination.
    pub option: Option<SurfOption>,
    /// Where the chosen option leads, `None` when holding position.
    pub destination: Option<Point>,
    pub go_angle: f64,
    pub max_speed: f64,
    /// Body turn for this tick, radians (positive clockwise).
    pub turn: f64,
    /// Signed travel distance; negative drives backwards.
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRating {
    pub opponent: String,
    pub strategy: StrategyKind,
    pub rating: f64,
    pub shots: u32,
}

/// Optional structured trace of how decisions were reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExplainEvent {
    /// Density of each candidate angle (offset from head-on, density).
    AimDensity {
        strategy: StrategyKind,
        curve: Vec<[f64; 2]>,
    },
    /// Danger computed for one surf option.
    SurfDanger { option: SurfOption, danger: f64 },
    /// Destination the melee mover settled on and its risk.
    MeleeDestination { destination: Point, risk: f64 },
    /// A wave finished passing its target.
    WaveBroken {
        owner: String,
        fire_tick: Tick,
        guess_factor: f64,
        bandwidth: f64,
        firing: bool,
    },
    /// A skipped wave was reconstructed (or could not be).
    WaveInterpolated {
        owner: String,
        fire_tick: Tick,
        success: bool,
    },
    /// The strategy chosen for an opponent changed.
    StrategySwitched {
        opponent: String,
        from: StrategyKind,
        to: StrategyKind,
    },
}

/// Everything decided during one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: Tick,
    pub round: u32,
    pub aim: Option<AimDecision>,
    pub movement: Option<MoveDecision>,
    pub ratings: Vec<StrategyRating>,
    #[serde(default)]
    pub explain: Vec<ExplainEvent>,
}
