//! A single expanding threat envelope and everything measured against it.

use std::f64::consts::PI;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use wavesurf_core::constants::{MAX_BOT_RADIUS, PRECISE_MEA_WALL_STICK, WALL_DISTANCE_FEATURE_CAP};
use wavesurf_core::enums::{EscapeSide, WallDistanceStyle, WavePosition};
use wavesurf_core::geometry::{
    absolute_bearing, bullet_ticks, distance_point_to_bot, normal_absolute_angle,
    normal_relative_angle, normalize_angle, project, Circle,
};
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_core::WavesurfError;

use crate::predictor::{EscapeQuery, EscapeTarget, MotionPredictor};

/// Upper bound on fixpoint passes when projecting a displacement vector.
const PROJECTION_PASSES: u32 = 50;

/// Identity of a wave within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WaveId(pub u64);

/// Where a wave comes from and the target it was aimed at.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveInit {
    pub owner: String,
    pub source: Point,
    pub target: Point,
    pub fire_round: u32,
    pub fire_tick: Tick,
    pub bullet_power: f64,
    pub target_heading: f64,
    /// Signed speed of the target.
    pub target_speed: f64,
    /// Direction of the last non-zero speed, 1 or -1.
    pub target_speed_sign: i32,
}

/// Situation of the target when the wave was fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetFeatures {
    pub accel: f64,
    pub distance: f64,
    pub distance_to_nearest_bot: f64,
    /// Ticks since the target last reversed direction.
    pub dchange_ticks: Tick,
    /// Ticks since the target last changed speed noticeably.
    pub vchange_ticks: Tick,
    pub wall_distance: f64,
    pub rev_wall_distance: f64,
    pub dl8: f64,
    pub dl20: f64,
    pub dl40: f64,
    pub target_energy: f64,
    pub source_energy: f64,
    pub gun_heat: f64,
    pub enemies_alive: u32,
    pub last_bullet_fired_tick: Tick,
}

/// Angular interval blocked by one of our bullets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulletShadow {
    pub min: f64,
    pub max: f64,
}

impl BulletShadow {
    pub fn overlaps(&self, that: &BulletShadow) -> bool {
        let that_min = normalize_angle(that.min, self.min);
        let that_max = normalize_angle(that.max, that_min);
        self.covers(that.min)
            || self.covers(that.max)
            || (that_min <= self.min && that_max >= self.max)
    }

    fn covers(&self, angle: f64) -> bool {
        let angle = normalize_angle(angle, self.min);
        self.min <= angle && self.max >= angle
    }
}

/// Angular extent of a hitbox as the wave crossed it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    /// Absolute bearing of the interval center.
    pub angle: f64,
    /// Half-width of the interval.
    pub bandwidth: f64,
}

#[derive(Debug, Clone)]
pub struct Wave {
    pub id: WaveId,
    pub owner: String,
    pub source: Point,
    pub target: Point,
    pub abs_bearing: f64,
    pub fire_round: u32,
    pub fire_tick: Tick,
    bullet_power: f64,
    bullet_speed: f64,
    max_escape_angle: f64,
    pub orbit_direction: i32,
    pub target_heading: f64,
    pub target_relative_heading: f64,
    pub target_speed: f64,
    pub target_speed_sign: i32,
    pub features: TargetFeatures,

    pub hit_by_bullet: bool,
    pub bullet_hit_bullet: bool,
    /// A real bullet was fired with this wave.
    pub firing: bool,
    /// Fired at an opponent other than the one this wave is tracked for.
    pub alt: bool,

    pub shadows: Vec<BulletShadow>,
    positive_escape: OnceLock<f64>,
    negative_escape: OnceLock<f64>,
    last_position: Option<WavePosition>,
    predictor: MotionPredictor,
}

impl Wave {
    pub fn new(id: WaveId, init: WaveInit, features: TargetFeatures, predictor: MotionPredictor) -> Self {
        let abs_bearing = absolute_bearing(init.source, init.target);
        let mut wave = Self {
            id,
            owner: init.owner,
            source: init.source,
            target: init.target,
            abs_bearing,
            fire_round: init.fire_round,
            fire_tick: init.fire_tick,
            bullet_power: 0.0,
            bullet_speed: 0.0,
            max_escape_angle: 0.0,
            orbit_direction: 1,
            target_heading: init.target_heading,
            target_relative_heading: 0.0,
            target_speed: init.target_speed,
            target_speed_sign: init.target_speed_sign,
            features,
            hit_by_bullet: false,
            bullet_hit_bullet: false,
            firing: false,
            alt: false,
            shadows: Vec::new(),
            positive_escape: OnceLock::new(),
            negative_escape: OnceLock::new(),
            last_position: None,
            predictor,
        };
        wave.set_bullet_power(init.bullet_power);
        let relative = normal_relative_angle(wave.effective_heading() - abs_bearing);
        wave.orbit_direction = if relative < 0.0 { -1 } else { 1 };
        wave.target_relative_heading = relative.abs();
        wave
    }

    pub fn bullet_power(&self) -> f64 {
        self.bullet_power
    }

    pub fn bullet_speed(&self) -> f64 {
        self.bullet_speed
    }

    pub fn max_escape_angle(&self) -> f64 {
        self.max_escape_angle
    }

    pub fn predictor(&self) -> &MotionPredictor {
        &self.predictor
    }

    /// Changes speed and escape angle; cached precise escape angles are
    /// dropped.
    pub fn set_bullet_power(&mut self, power: f64) {
        let rules = &self.predictor.rules;
        self.bullet_power = power;
        self.bullet_speed = rules.bullet_speed(power);
        self.max_escape_angle = rules.max_escape_angle(self.bullet_speed);
        self.clear_escape_angles();
    }

    /// Drops cached escape angles. The wave's geometry changed, so the
    /// position history restarts as well.
    pub fn clear_escape_angles(&mut self) {
        self.positive_escape = OnceLock::new();
        self.negative_escape = OnceLock::new();
        self.last_position = None;
    }

    /// Record the position observed for the tracked body this tick.
    ///
    /// Fails if it is earlier than the previous observation.
    pub fn observe_position(&mut self, position: WavePosition) -> Result<(), WavesurfError> {
        if let Some(last) = self.last_position {
            if position < last {
                return Err(WavesurfError::PositionRegression {
                    from: last.to_string(),
                    to: position.to_string(),
                });
            }
        }
        self.last_position = Some(position);
        Ok(())
    }

    /// Re-aim at a new source/target pair, recomputing the bearing.
    pub fn reposition(&mut self, source: Point, target: Point) {
        self.source = source;
        self.target = target;
        self.abs_bearing = absolute_bearing(source, target);
        self.clear_escape_angles();
    }

    pub fn effective_heading(&self) -> f64 {
        let flip = if self.target_speed_sign == 1 { 0.0 } else { PI };
        normal_absolute_angle(self.target_heading + flip)
    }

    pub fn distance_traveled(&self, tick: Tick) -> f64 {
        (tick - self.fire_tick) as f64 * self.bullet_speed
    }

    pub fn lateral_velocity(&self) -> f64 {
        self.target_relative_heading.sin() * (self.target_speed_sign as f64 * self.target_speed)
    }

    pub fn processed_bullet_hit(&self) -> bool {
        self.hit_by_bullet || self.bullet_hit_bullet
    }

    /// Target's room to move toward (and away from) the walls.
    pub fn set_wall_distances(&mut self, style: WallDistanceStyle) {
        let (forward, reverse) = match style {
            WallDistanceStyle::Orbital => (
                self.orbital_wall_distance(self.orbit_direction),
                self.orbital_wall_distance(-self.orbit_direction),
            ),
            WallDistanceStyle::Direct => (self.direct_wall_distance(true), self.direct_wall_distance(false)),
            WallDistanceStyle::PreciseMea => (
                self.precise_escape_angle(EscapeSide::Positive) / self.max_escape_angle,
                self.precise_escape_angle(EscapeSide::Negative) / self.max_escape_angle,
            ),
        };
        self.features.wall_distance = forward;
        self.features.rev_wall_distance = reverse;
    }

    /// Orbital wall distance as seen from `from`, capped for use as a feature.
    pub fn orbital_wall_distance_from(&self, from: Point, direction: i32) -> f64 {
        self.predictor
            .arena
            .orbital_wall_distance(from, self.target, self.max_escape_angle, direction)
            .min(WALL_DISTANCE_FEATURE_CAP)
    }

    fn orbital_wall_distance(&self, direction: i32) -> f64 {
        self.orbital_wall_distance_from(self.source, direction)
    }

    fn direct_wall_distance(&self, forward: bool) -> f64 {
        let heading = self.effective_heading() + if forward { 0.0 } else { PI };
        self.predictor
            .arena
            .direct_to_wall_distance(
                self.target,
                self.source.distance(self.target),
                heading,
                self.bullet_speed,
                self.predictor.rules.max_speed,
            )
            .min(WALL_DISTANCE_FEATURE_CAP)
    }

    /// How far this wave is from a real bullet, in units of eight ticks.
    /// Zero for waves that carried a real bullet.
    pub fn virtuality(&self) -> f64 {
        if self.firing {
            return 0.0;
        }
        let since_last = (self.fire_tick - self.features.last_bullet_fired_tick) as f64;
        let to_next = (self.features.gun_heat / self.predictor.rules.gun_cooling_rate).ceil();
        if self.features.last_bullet_fired_tick > 0 {
            since_last.min(to_next) / 8.0
        } else {
            (to_next / 8.0).min(1.0)
        }
    }

    pub fn firing_angle(&self, guess_factor: f64) -> f64 {
        self.abs_bearing + guess_factor * self.orbit_direction as f64 * self.max_escape_angle
    }

    pub fn firing_angle_to(&self, location: Point) -> f64 {
        normal_absolute_angle(absolute_bearing(self.source, location))
    }

    /// Signed deviation from head-on, positive in the orbit direction.
    pub fn guess_angle(&self, bearing: f64) -> f64 {
        self.orbit_direction as f64 * normal_relative_angle(bearing - self.abs_bearing)
    }

    pub fn guess_factor(&self, bearing: f64) -> f64 {
        self.guess_angle(bearing) / self.max_escape_angle
    }

    pub fn guess_factor_at(&self, location: Point) -> f64 {
        self.guess_factor(absolute_bearing(self.source, location))
    }

    /// Guess factor scaled by the precise escape angle on its side.
    pub fn guess_factor_precise(&self, bearing: f64) -> f64 {
        let angle = self.guess_angle(bearing);
        let side = EscapeSide::from_positive(angle >= 0.0);
        let mea = self.precise_escape_angle(side);
        if mea > 0.0 {
            angle / mea
        } else {
            0.0
        }
    }

    pub fn precise_escape_angle(&self, side: EscapeSide) -> f64 {
        let cell = match side {
            EscapeSide::Positive => &self.positive_escape,
            EscapeSide::Negative => &self.negative_escape,
        };
        *cell.get_or_init(|| self.calculate_precise_escape_angle(side).angle)
    }

    pub fn escape_angle_range(&self) -> f64 {
        self.precise_escape_angle(EscapeSide::Positive) + self.precise_escape_angle(EscapeSide::Negative)
    }

    pub fn calculate_precise_escape_angle(&self, side: EscapeSide) -> EscapeTarget {
        let query = EscapeQuery {
            source: self.source,
            fire_tick: self.fire_tick,
            bullet_speed: self.bullet_speed,
            start: KinematicState::new(
                self.target,
                self.target_heading,
                self.target_speed,
                self.fire_tick,
            ),
            attack_angle: 0.0,
            wall_stick: PRECISE_MEA_WALL_STICK,
        };
        let direction = self.orbit_direction * side.sign() as i32;
        self.predictor.precise_escape_angle(direction, &query)
    }

    /// Heading- and orbit-invariant per-tick displacement of the target
    /// between fire time and `tick`. `None` at or before fire time.
    pub fn displacement_vector(&self, location: Point, tick: Tick) -> Option<Point> {
        let elapsed = tick - self.fire_tick;
        if elapsed <= 0 {
            return None;
        }
        let bearing = normal_relative_angle(absolute_bearing(self.target, location) - self.effective_heading());
        let distance = self.target.distance(location) / elapsed as f64;
        Some(project(Point::ZERO, bearing * self.orbit_direction as f64, distance))
    }

    /// Where a target following `displacement` would be hit by this wave.
    pub fn project_displacement(&self, displacement: Point) -> Point {
        self.project_location(self.source, displacement, 0)
    }

    /// Like `project_displacement` for a shot we have not fired yet, fired
    /// from `next_location` after the ticks already elapsed since the wave.
    pub fn project_blind(&self, next_location: Point, displacement: Point, tick: Tick) -> Point {
        self.project_location(next_location, displacement, tick - self.fire_tick + 1)
    }

    fn project_location(&self, firing_location: Point, displacement: Point, extra_ticks: Tick) -> Point {
        let angle = self.effective_heading()
            + absolute_bearing(Point::ZERO, displacement) * self.orbit_direction as f64;
        let step = displacement.length();

        let mut projected = self.target;
        let mut ticks: Tick = -1;
        let mut previous: Tick = -1;
        for _ in 0..PROJECTION_PASSES {
            let before_previous = previous;
            previous = ticks;
            ticks = bullet_ticks(firing_location.distance(projected), self.bullet_speed) - 1;
            projected = project(self.target, angle, (ticks + extra_ticks) as f64 * step);
            if ticks == previous || ticks == before_previous {
                break;
            }
        }
        projected
    }

    pub fn check_wave_position(&self, state: &KinematicState) -> WavePosition {
        self.check_wave_position_with(state, false, None)
    }

    /// Classify `state` against this wave. `skip_midair` treats the body as
    /// already reached; `max_position` caps the result.
    pub fn check_wave_position_with(
        &self,
        state: &KinematicState,
        skip_midair: bool,
        max_position: Option<WavePosition>,
    ) -> WavePosition {
        let dist_sq = self.source.distance_squared(state.location);
        let end = self.distance_traveled(state.tick + 1);
        if !skip_midair
            && (max_position == Some(WavePosition::Midair)
                || dist_sq > (end + MAX_BOT_RADIUS).powi(2)
                || distance_point_to_bot(self.source, state) > end)
        {
            return WavePosition::Midair;
        }
        if max_position == Some(WavePosition::BreakingFront) || dist_sq > end * end {
            return WavePosition::BreakingFront;
        }
        if max_position == Some(WavePosition::BreakingCenter) {
            return WavePosition::BreakingCenter;
        }
        let start = self.distance_traveled(state.tick);
        let start_sq = start * start;
        if state
            .corners()
            .iter()
            .any(|corner| corner.distance_squared(self.source) > start_sq)
        {
            WavePosition::BreakingCenter
        } else {
            WavePosition::Gone
        }
    }

    /// Exact angular interval the hitbox covered over `break_states`.
    pub fn precise_intersection(&self, break_states: &[KinematicState]) -> Option<Intersection> {
        let mut angles = Vec::new();
        for state in break_states {
            let inner = Circle::new(self.source, self.distance_traveled(state.tick));
            let outer = Circle::new(self.source, self.distance_traveled(state.tick + 1));

            for corner in state.corners() {
                if outer.contains(corner) && !inner.contains(corner) {
                    angles.push(absolute_bearing(self.source, corner));
                }
            }
            for side in state.sides() {
                for hit in inner.intersect_segment(&side).into_iter().chain(outer.intersect_segment(&side)) {
                    angles.push(absolute_bearing(self.source, hit));
                }
            }
        }

        let reference = *angles.first()?;
        let (min, max) = angles.iter().fold((reference, reference), |(lo, hi), &a| {
            let a = normalize_angle(a, reference);
            (lo.min(a), hi.max(a))
        });
        let center = (min + max) / 2.0;
        Some(Intersection {
            angle: center,
            bandwidth: max - center,
        })
    }

    pub fn shadowed(&self, angle: f64) -> bool {
        self.shadows.iter().any(|shadow| {
            let a = normalize_angle(angle, shadow.min);
            a >= shadow.min && a <= shadow.max
        })
    }

    /// Block the firing angles between the bearings to `p1` and `p2`.
    pub fn cast_shadow(&mut self, p1: Point, p2: Point) {
        let a1 = normalize_angle(absolute_bearing(self.source, p1), self.abs_bearing);
        let a2 = normalize_angle(absolute_bearing(self.source, p2), a1);
        self.shadows.push(BulletShadow {
            min: a1.min(a2),
            max: a1.max(a2),
        });
        self.merge_shadows();
    }

    fn merge_shadows(&mut self) {
        let mut dead = vec![false; self.shadows.len()];
        for i in 0..self.shadows.len() {
            if dead[i] {
                continue;
            }
            for j in 0..self.shadows.len() {
                if i == j || dead[j] || !self.shadows[i].overlaps(&self.shadows[j]) {
                    continue;
                }
                let other = self.shadows[j];
                let shadow = &mut self.shadows[i];
                shadow.min = shadow.min.min(normalize_angle(other.min, shadow.min));
                shadow.max = shadow.max.max(normalize_angle(other.max, shadow.max));
                dead[j] = true;
            }
        }
        let mut index = 0;
        self.shadows.retain(|_| {
            let keep = !dead[index];
            index += 1;
            keep
        });
    }

    /// Fraction of `intersection` left uncovered by shadows.
    pub fn shadow_factor(&self, intersection: &Intersection) -> f64 {
        let min = intersection.angle - intersection.bandwidth;
        let max = intersection.angle + intersection.bandwidth;
        if max - min <= 0.0 {
            return if self.shadowed(intersection.angle) { 0.0 } else { 1.0 };
        }

        let mut factor = 1.0;
        for shadow in &self.shadows {
            let shadow_min = normalize_angle(shadow.min, min);
            let shadow_max = normalize_angle(shadow.max, shadow_min);
            if shadow_min <= min && shadow_max >= max {
                return 0.0;
            } else if shadow_min >= min && shadow_min <= max {
                factor -= (max.min(shadow_max) - shadow_min) / (max - min);
            } else if shadow_max >= min && shadow_max <= max {
                factor -= (shadow_max - min.max(shadow_min)) / (max - min);
            }
        }
        factor.max(0.0)
    }
}
