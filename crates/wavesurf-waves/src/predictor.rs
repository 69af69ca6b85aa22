//! Constrained motion prediction and maximum escape angle search.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use serde::{Deserialize, Serialize};

use wavesurf_core::arena::Arena;
use wavesurf_core::constants::{MAX_PREDICTION_TICKS, PRECISE_MEA_ITERATIONS, STEERING_DISTANCE, WALL_MARGIN};
use wavesurf_core::geometry::{absolute_bearing, limit, normal_relative_angle, project};
use wavesurf_core::rules::KinematicRules;
use wavesurf_core::types::{KinematicState, Point, Tick};

/// Farthest point reachable on one side of a wave before it catches up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscapeTarget {
    /// Angular deviation from the head-on bearing, positive in the
    /// searched direction.
    pub angle: f64,
    pub location: Point,
    pub tick: Tick,
    /// The straight-line search left the field.
    pub hit_wall: bool,
}

/// A threat to escape from, and how to move while escaping.
#[derive(Debug, Clone, Copy)]
pub struct EscapeQuery {
    pub source: Point,
    pub fire_tick: Tick,
    pub bullet_speed: f64,
    pub start: KinematicState,
    /// Extra angle beyond perpendicular, positive moves away from source.
    pub attack_angle: f64,
    pub wall_stick: f64,
}

impl EscapeQuery {
    fn wave_passed(&self, state: &KinematicState) -> bool {
        let threshold = self.bullet_speed * (state.tick - self.fire_tick) as f64 + self.bullet_speed;
        state.location.distance_squared(self.source) < threshold * threshold * threshold.signum()
    }
}

/// Simulates ticks of movement under the injected kinematic rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPredictor {
    pub arena: Arena,
    pub rules: KinematicRules,
}

impl MotionPredictor {
    pub fn new(arena: Arena, rules: KinematicRules) -> Self {
        Self { arena, rules }
    }

    /// Advance `start` by `ticks`, consuming `turn` and `distance` as the
    /// body's turn rate and acceleration allow.
    pub fn predict(
        &self,
        start: &KinematicState,
        mut distance: f64,
        mut turn: f64,
        max_speed: f64,
        ticks: u32,
        ignore_walls: bool,
    ) -> KinematicState {
        let mut state = *start;
        for _ in 0..ticks {
            let max_turn = self.rules.turn_rate(state.speed).abs();
            let mut heading = state.heading;
            if turn.abs() < max_turn {
                heading += turn;
                turn = 0.0;
            } else {
                let step = max_turn * turn.signum();
                heading += step;
                turn -= step;
            }

            let speed = self.new_speed(state.speed, distance, max_speed);
            distance -= speed;

            let mut location = project(state.location, heading, speed);
            if !ignore_walls && !self.arena.contains(location) {
                location = self.adjust_for_walls(location, heading);
            }
            state = KinematicState::new(location, heading, speed, state.tick + 1);
        }
        state
    }

    /// Speed next tick when trying to cover `distance` without overshoot.
    pub fn new_speed(&self, speed: f64, distance: f64, max_speed: f64) -> f64 {
        if distance < 0.0 {
            return -self.new_speed(-speed, -distance, max_speed);
        }
        let goal = if distance.is_infinite() {
            max_speed
        } else {
            self.max_speed_for_distance(distance).min(max_speed)
        };

        let accel = self.rules.acceleration;
        let decel = self.rules.deceleration;
        if speed >= 0.0 {
            limit(speed - decel, goal, speed + accel)
        } else {
            limit(speed - accel, goal, speed + self.max_decel(-speed))
        }
    }

    /// Highest speed from which the body can still stop within `distance`.
    pub fn max_speed_for_distance(&self, distance: f64) -> f64 {
        let decel = self.rules.deceleration;
        // Sum of 0..decel_time, solved for decel_time.
        let decel_time = (((4.0 * 2.0 / decel) * distance + 1.0).sqrt() - 1.0) / 2.0;
        let decel_time = decel_time.ceil().max(1.0);
        let decel_distance = (decel_time / 2.0) * (decel_time - 1.0) * decel;
        (decel_time - 1.0) * decel + (distance - decel_distance) / decel_time
    }

    /// Braking available at `speed`; below one tick of braking the rest of
    /// the tick accelerates the other way.
    pub fn max_decel(&self, speed: f64) -> f64 {
        let speed = speed.abs();
        let decel = self.rules.deceleration;
        if speed > decel {
            decel
        } else {
            let decel_fraction = speed / decel;
            decel_fraction * decel + (1.0 - decel_fraction) * self.rules.acceleration
        }
    }

    /// Pull an out-of-field location back along `heading`, keeping any
    /// component that was already in bounds.
    pub fn adjust_for_walls(&self, location: Point, heading: f64) -> Point {
        let max_x = self.arena.width - WALL_MARGIN;
        let max_y = self.arena.height - WALL_MARGIN;
        let mut x_out = (max_x - location.x).min(0.0);
        let mut y_out = (max_y - location.y).min(0.0);
        if x_out == 0.0 {
            x_out = (WALL_MARGIN - location.x).max(0.0);
        }
        if y_out == 0.0 {
            y_out = (WALL_MARGIN - location.y).max(0.0);
        }

        let mut x_offset = x_out;
        let mut y_offset = y_out;
        let heading = heading.rem_euclid(TAU);
        if heading % FRAC_PI_4 != 0.0 {
            let tan = heading.tan();
            if x_out.abs() > 0.0 {
                y_offset = x_out / tan;
            }
            if y_out.abs() > 0.0 {
                x_offset = y_out * tan;
            }
            if y_out.abs() > y_offset.abs() {
                y_offset = y_out;
            }
            if x_out.abs() > x_offset.abs() {
                x_offset = x_out;
            }
        }
        location + Point::new(x_offset, y_offset)
    }

    /// Location after one tick at constant heading and speed.
    pub fn next_location(state: &KinematicState) -> Point {
        project(state.location, state.heading, state.speed)
    }

    /// Turn and distance that steer toward `go_angle`, driving backwards
    /// when that needs less turning.
    pub fn steering(heading: f64, go_angle: f64) -> (f64, f64) {
        let turn = normal_relative_angle(go_angle - heading);
        if turn.abs() > FRAC_PI_2 {
            (turn - turn.signum() * PI, -STEERING_DISTANCE)
        } else {
            (turn, STEERING_DISTANCE)
        }
    }

    /// One tick of steering toward `go_angle`.
    pub fn step_toward(
        &self,
        state: &KinematicState,
        max_speed: f64,
        go_angle: f64,
        ignore_walls: bool,
    ) -> KinematicState {
        let (turn, distance) = Self::steering(state.heading, go_angle);
        self.predict(state, distance, turn, max_speed, 1, ignore_walls)
    }

    /// Goal angle perpendicular to `abs_bearing` in `orientation`, tilted
    /// by `attack_angle` and smoothed along walls when `wall_stick` > 0.
    pub fn perpendicular_angle(
        &self,
        location: Point,
        abs_bearing: f64,
        orientation: i32,
        attack_angle: f64,
        wall_stick: f64,
    ) -> f64 {
        let go = normal_relative_angle(abs_bearing + orientation as f64 * (FRAC_PI_2 + attack_angle));
        if wall_stick != 0.0 {
            self.arena.wall_smoothing(location, go, orientation, wall_stick)
        } else {
            go
        }
    }

    /// One tick of orbiting the point at `abs_bearing`.
    pub fn next_perpendicular(
        &self,
        state: &KinematicState,
        abs_bearing: f64,
        orientation: i32,
        attack_angle: f64,
        wall_stick: f64,
        ignore_walls: bool,
    ) -> KinematicState {
        let go = self.perpendicular_angle(state.location, abs_bearing, orientation, attack_angle, wall_stick);
        self.step_toward(state, self.rules.max_speed, go, ignore_walls)
    }

    /// Farthest angular escape in `direction` (1 or -1) before the wave
    /// passes, trying a straight run first and wall smoothing if that
    /// leaves the field.
    pub fn precise_escape_angle(&self, direction: i32, query: &EscapeQuery) -> EscapeTarget {
        let abs_bearing = absolute_bearing(query.source, query.start.location);
        let straight = self.straight_escape(direction, abs_bearing, query);
        if !straight.hit_wall {
            return straight;
        }
        let smoothed = self.smoothed_escape(direction, abs_bearing, query);
        if smoothed.angle > straight.angle {
            smoothed
        } else {
            straight
        }
    }

    fn straight_escape(&self, direction: i32, abs_bearing: f64, query: &EscapeQuery) -> EscapeTarget {
        let mut state = query.start;
        let mut hit_wall = false;
        for _ in 0..MAX_PREDICTION_TICKS {
            state = self.next_perpendicular(&state, abs_bearing, direction, query.attack_angle, 0.0, true);
            if !self.arena.contains(state.location) {
                hit_wall = true;
                break;
            }
            if query.wave_passed(&state) {
                break;
            }
        }
        self.escape_target(direction, abs_bearing, query, &state, hit_wall)
    }

    fn smoothed_escape(&self, direction: i32, abs_bearing: f64, query: &EscapeQuery) -> EscapeTarget {
        let start = query.start;
        let mut best = EscapeTarget {
            angle: 0.0,
            location: start.location,
            tick: start.tick,
            hit_wall: false,
        };

        let mut go = self.perpendicular_angle(start.location, abs_bearing, direction, query.attack_angle, 0.0);
        go = self.arena.wall_smoothing(start.location, go, direction, query.wall_stick);
        for pass in 0..PRECISE_MEA_ITERATIONS {
            let mut state = start;
            for _ in 0..MAX_PREDICTION_TICKS {
                state = self.step_toward(&state, self.rules.max_speed, go, true);
                if query.wave_passed(&state) {
                    break;
                }
                go = self.arena.wall_smoothing(state.location, go, direction, query.wall_stick);
            }

            let candidate = self.escape_target(direction, abs_bearing, query, &state, false);
            if candidate.angle > best.angle {
                best = candidate;
            }
            if pass + 1 < PRECISE_MEA_ITERATIONS {
                go = absolute_bearing(start.location, candidate.location);
            }
        }
        best
    }

    fn escape_target(
        &self,
        direction: i32,
        abs_bearing: f64,
        query: &EscapeQuery,
        state: &KinematicState,
        hit_wall: bool,
    ) -> EscapeTarget {
        let location = self.arena.translate_to_field(state.location);
        let angle = direction as f64
            * normal_relative_angle(absolute_bearing(query.source, location) - abs_bearing);
        EscapeTarget {
            angle,
            location,
            tick: state.tick,
            hit_wall,
        }
    }
}
