//! Feature formulas: how a wave is turned into a point for nearest-neighbor
//! search.
//!
//! Every dimension is normalized to roughly `[0, 1]` so that the per-view
//! weights alone decide how much a feature matters.

use serde::{Deserialize, Serialize};

use wavesurf_waves::Wave;

/// Bullet flight time, in ticks, that maps to 1.0.
const MAX_FLIGHT_TICKS: f64 = 91.0;

/// Speed offset so that a stopped target is not exactly zero.
const SPEED_OFFSET: f64 = 0.1;

/// Speed range after the offset is applied.
const SPEED_RANGE: f64 = 8.1;

/// Distance to the nearest other bot that maps to 1.0.
const NEAREST_BOT_RANGE: f64 = 500.0;

/// Weights of the TripHammer formula while its view is empty.
const TRIP_HAMMER_INITIAL_WEIGHTS: [f64; 10] =
    [0.94, 10.0, 1.73, 3.7, 3.31, 2.13, 5.51, 1.26, 1.57, 5.51];

/// Weights the TripHammer formula settles on.
const TRIP_HAMMER_FINAL_WEIGHTS: [f64; 10] =
    [4.25, 5.43, 0.16, 4.25, 8.74, 3.39, 4.41, 8.03, 7.24, 4.41];

/// View size at which each TripHammer weight reaches its final value.
const TRIP_HAMMER_FINAL_SIZES: [usize; 10] =
    [28920, 23040, 23100, 1740, 16680, 5580, 0, 11280, 21420, 1920];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureFormula {
    /// Flight time, lateral velocity, acceleration.
    Simple,
    /// General purpose surf formula.
    Normal,
    /// Normal plus longer movement history, for flatteners.
    Flattener,
    /// Gun formula that also sees how virtual a wave is.
    AntiSurfer,
    /// Main gun formula with power and weights that migrate with data.
    TripHammer,
    /// Melee gun formula: walls along the heading and the nearest other bot.
    Melee,
}

impl FeatureFormula {
    pub fn dimensions(self) -> usize {
        match self {
            FeatureFormula::Simple => 3,
            FeatureFormula::Normal => 9,
            FeatureFormula::Flattener => 11,
            FeatureFormula::AntiSurfer => 9,
            FeatureFormula::TripHammer => 10,
            FeatureFormula::Melee => 8,
        }
    }

    pub fn default_weights(self) -> Vec<f64> {
        match self {
            FeatureFormula::Simple => vec![1.0, 1.0, 1.0],
            FeatureFormula::Normal => vec![4.0, 3.0, 3.0, 3.0, 2.0, 4.0, 1.0, 3.0, 2.0],
            FeatureFormula::Flattener => {
                vec![3.0, 4.0, 3.0, 5.0, 1.0, 4.0, 3.0, 3.0, 2.0, 2.0, 2.0]
            }
            FeatureFormula::AntiSurfer => vec![3.0, 4.0, 3.0, 2.0, 2.0, 4.0, 2.0, 3.0, 1.0],
            FeatureFormula::TripHammer => trip_hammer_weights(0).to_vec(),
            FeatureFormula::Melee => vec![3.0, 4.0, 3.0, 3.0, 2.0, 4.0, 2.0, 3.0],
        }
    }

    /// Feature vector of `wave`. `aiming` marks a query for a shot about to
    /// be fired, which has no virtuality yet.
    pub fn data_point(self, wave: &Wave, aiming: bool) -> Vec<f64> {
        let f = &wave.features;
        let flight = flight_ticks(wave);
        match self {
            FeatureFormula::Simple => vec![
                flight.min(MAX_FLIGHT_TICKS) / MAX_FLIGHT_TICKS,
                (wave.lateral_velocity() + SPEED_OFFSET) / SPEED_RANGE,
                normalized_accel(wave),
            ],
            FeatureFormula::Normal | FeatureFormula::Flattener | FeatureFormula::AntiSurfer => {
                let mut point = vec![
                    flight.min(MAX_FLIGHT_TICKS) / MAX_FLIGHT_TICKS,
                    signed_speed(wave),
                    wave.target_relative_heading.sin(),
                    (wave.target_relative_heading.cos() + 1.0) / 2.0,
                    normalized_accel(wave),
                    f.wall_distance.min(1.0),
                    f.rev_wall_distance.min(1.0),
                    (f.vchange_ticks as f64 / flight).min(1.0),
                ];
                match self {
                    FeatureFormula::Normal => point.push(f.dl8 / 64.0),
                    FeatureFormula::Flattener => {
                        point.extend([f.dl8 / 64.0, f.dl20 / 160.0, f.dl40 / 320.0])
                    }
                    _ => point.push(if aiming { 0.0 } else { wave.virtuality() }),
                }
                point
            }
            FeatureFormula::TripHammer => {
                let rules = &wave.predictor().rules;
                vec![
                    wave.bullet_power().min(3.0) / 3.0,
                    flight.min(MAX_FLIGHT_TICKS) / MAX_FLIGHT_TICKS,
                    signed_speed(wave),
                    wave.target_relative_heading.sin(),
                    (wave.target_relative_heading.cos() + 1.0) / 2.0,
                    (f.accel + rules.deceleration) / (rules.deceleration + rules.acceleration),
                    f.wall_distance.min(1.25),
                    f.rev_wall_distance.min(1.15),
                    (f.vchange_ticks as f64 / flight).min(1.0),
                    if aiming { 0.0 } else { wave.virtuality() },
                ]
            }
            FeatureFormula::Melee => vec![
                flight.min(MAX_FLIGHT_TICKS) / MAX_FLIGHT_TICKS,
                signed_speed(wave),
                wave.target_relative_heading.sin(),
                (wave.target_relative_heading.cos() + 1.0) / 2.0,
                normalized_accel(wave),
                f.wall_distance.min(1.0),
                f.rev_wall_distance.min(1.0),
                (f.distance_to_nearest_bot / NEAREST_BOT_RANGE).min(1.0),
            ],
        }
    }
}

/// TripHammer weights for a view holding `view_size` points. Each weight
/// moves linearly from its initial to its final value.
pub fn trip_hammer_weights(view_size: usize) -> [f64; 10] {
    let mut weights = TRIP_HAMMER_INITIAL_WEIGHTS;
    for (i, weight) in weights.iter_mut().enumerate() {
        let progress = match TRIP_HAMMER_FINAL_SIZES[i] {
            0 => 1.0,
            size => (view_size.saturating_sub(1) as f64 / size as f64).min(1.0),
        };
        *weight += progress * (TRIP_HAMMER_FINAL_WEIGHTS[i] - TRIP_HAMMER_INITIAL_WEIGHTS[i]);
    }
    weights
}

fn flight_ticks(wave: &Wave) -> f64 {
    wave.features.distance / wave.bullet_speed()
}

fn signed_speed(wave: &Wave) -> f64 {
    (wave.target_speed_sign as f64 * wave.target_speed + SPEED_OFFSET) / SPEED_RANGE
}

fn normalized_accel(wave: &Wave) -> f64 {
    let rules = &wave.predictor().rules;
    let accel = wave.features.accel;
    let cap = if accel < 0.0 { rules.deceleration } else { rules.acceleration };
    (accel / cap + 1.0) / 2.0
}
