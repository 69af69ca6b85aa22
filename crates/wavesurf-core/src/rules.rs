//! Kinematic and ballistic rules of the host simulation.
//!
//! The host owns the physics; these parameters are injected so prediction
//! and scoring can follow whatever rules the host actually runs.

use serde::{Deserialize, Serialize};

use crate::error::WavesurfError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicRules {
    /// Speed gained per tick when accelerating.
    pub acceleration: f64,
    /// Speed lost per tick when braking.
    pub deceleration: f64,
    pub max_speed: f64,
    /// Turn rate at rest, degrees per tick.
    pub max_turn_rate_deg: f64,
    /// Turn rate lost per unit of speed, degrees per tick.
    pub turn_rate_speed_penalty_deg: f64,
    /// Bullet speed = base - factor * power.
    pub bullet_speed_base: f64,
    pub bullet_speed_factor: f64,
    pub min_bullet_power: f64,
    pub max_bullet_power: f64,
    /// Gun heat added per shot = base + power / divisor.
    pub gun_heat_base: f64,
    pub gun_heat_divisor: f64,
    /// Gun heat removed per tick.
    pub gun_cooling_rate: f64,
    /// Gun heat at the start of a round.
    pub initial_gun_heat: f64,
}

impl Default for KinematicRules {
    fn default() -> Self {
        Self {
            acceleration: 1.0,
            deceleration: 2.0,
            max_speed: 8.0,
            max_turn_rate_deg: 10.0,
            turn_rate_speed_penalty_deg: 0.75,
            bullet_speed_base: 20.0,
            bullet_speed_factor: 3.0,
            min_bullet_power: 0.1,
            max_bullet_power: 3.0,
            gun_heat_base: 1.0,
            gun_heat_divisor: 5.0,
            gun_cooling_rate: 0.1,
            initial_gun_heat: 3.0,
        }
    }
}

impl KinematicRules {
    pub fn validate(&self) -> Result<(), WavesurfError> {
        let positive = [
            ("acceleration", self.acceleration),
            ("deceleration", self.deceleration),
            ("max_speed", self.max_speed),
            ("max_turn_rate_deg", self.max_turn_rate_deg),
            ("bullet_speed_base", self.bullet_speed_base),
            ("min_bullet_power", self.min_bullet_power),
            ("gun_heat_divisor", self.gun_heat_divisor),
            ("gun_cooling_rate", self.gun_cooling_rate),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(WavesurfError::config(field, format!("must be positive, got {value}")));
            }
        }
        if self.max_bullet_power < self.min_bullet_power {
            return Err(WavesurfError::config(
                "max_bullet_power",
                "must not be below min_bullet_power",
            ));
        }
        if self.bullet_speed(self.max_bullet_power) <= self.max_speed {
            return Err(WavesurfError::config(
                "bullet_speed_factor",
                "bullets must outrun bodies at every power",
            ));
        }
        Ok(())
    }

    /// Maximum turn per tick at `speed`, radians.
    pub fn turn_rate(&self, speed: f64) -> f64 {
        (self.max_turn_rate_deg - self.turn_rate_speed_penalty_deg * speed.abs())
            .max(0.0)
            .to_radians()
    }

    pub fn bullet_speed(&self, power: f64) -> f64 {
        self.bullet_speed_base - self.bullet_speed_factor * power
    }

    pub fn bullet_damage(&self, power: f64) -> f64 {
        let bonus = if power > 1.0 { 2.0 * (power - 1.0) } else { 0.0 };
        4.0 * power + bonus
    }

    /// Energy returned to the shooter on a hit.
    pub fn bullet_hit_bonus(&self, power: f64) -> f64 {
        3.0 * power
    }

    pub fn gun_heat(&self, power: f64) -> f64 {
        self.gun_heat_base + power / self.gun_heat_divisor
    }

    /// Heat of the hottest possible shot.
    pub fn max_gun_heat(&self) -> f64 {
        self.gun_heat(self.max_bullet_power)
    }

    /// Damage taken hitting a wall at `speed`.
    pub fn wall_hit_damage(&self, speed: f64) -> f64 {
        (speed.abs() / 2.0 - 1.0).max(0.0)
    }

    /// Rough maximum escape angle against a bullet of `bullet_speed`.
    pub fn max_escape_angle(&self, bullet_speed: f64) -> f64 {
        (self.max_speed / bullet_speed).clamp(-1.0, 1.0).asin()
    }
}
