//! Geometry constants and default tuning parameters.
//!
//! Anything a caller may want to tune is mirrored by a config field; the
//! values here are the defaults those fields start from.

// --- Bodies ---

/// Half the side of the square hitbox every body occupies.
pub const BOT_HALF_WIDTH: f64 = 18.0;

/// Full side of the square hitbox.
pub const BOT_WIDTH: f64 = 36.0;

/// Distance from a hitbox center to its corners (18 / cos(pi/4)).
pub const MAX_BOT_RADIUS: f64 = 25.455_844_122_715_71;

/// Bodies are kept this far from the arena edges.
pub const WALL_MARGIN: f64 = BOT_HALF_WIDTH;

// --- Prediction ---

/// Upper bound on wall smoothing corrections per call.
pub const WALL_SMOOTHING_MAX_ITERATIONS: u32 = 25;

/// Extra rotation added on each wall smoothing correction (radians).
pub const WALL_SMOOTHING_FUDGE: f64 = 0.0005;

/// Refinement passes of the wall-smoothed escape angle search.
pub const PRECISE_MEA_ITERATIONS: u32 = 3;

/// Wall stick used when computing a wave's precise escape angles.
pub const PRECISE_MEA_WALL_STICK: f64 = 120.0;

/// Goal distance used for "keep driving" steering commands.
pub const STEERING_DISTANCE: f64 = 1000.0;

/// Hard cap on simulated ticks in any open-ended prediction loop.
pub const MAX_PREDICTION_TICKS: u32 = 500;

/// Samples along the orbit arc when measuring orbital wall distance.
pub const ORBITAL_WALL_SAMPLES: u32 = 200;

/// Wall distance reported when no wall is reached.
pub const NO_WALL_DISTANCE: f64 = 2.0;

/// Cap applied to stored wall distance features.
pub const WALL_DISTANCE_FEATURE_CAP: f64 = 1.5;

// --- Waves ---

/// Impacts further than this from a wave's expected radius are not matched.
pub const WAVE_MATCH_THRESHOLD: f64 = 50.0;

/// Tolerance used when matching bullet powers.
pub const POWER_MATCH_TOLERANCE: f64 = 0.001;

/// Speeds below this magnitude count as standing still.
pub const NON_ZERO_SPEED_THRESHOLD: f64 = 0.1;

/// Speed changes above this reset the velocity-change timer.
pub const SPEED_CHANGE_THRESHOLD: f64 = 0.5;

// --- Scoring ---

/// Candidate firing angles evaluated by the density aim.
pub const FIRING_ANGLES: usize = 59;

/// Angular width of a hitbox at a typical duel distance (radians).
pub const TYPICAL_ANGULAR_BOT_WIDTH: f64 = 0.1;

/// Escape angle range of a typical gun wave (radians).
pub const TYPICAL_GUN_ESCAPE_RANGE: f64 = 0.9;

/// Escape angle range of a typical surf wave (radians).
pub const TYPICAL_SURF_ESCAPE_RANGE: f64 = 0.98;

/// Base of the miss-distance decay in virtual hit scoring.
pub const VIRTUAL_HIT_DECAY_BASE: f64 = 1.6;

/// Floor applied to neighbor distances before inverse weighting.
pub const MIN_NEIGHBOR_DISTANCE: f64 = 1e-9;

/// z value of a 95% confidence interval.
pub const CONFIDENCE_Z: f64 = 1.96;
