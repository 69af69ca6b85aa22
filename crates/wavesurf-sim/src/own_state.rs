//! Our own body as the trackers see it: pose history, movement timers
//! used as surf features, and the real bullets we have in flight.

use wavesurf_core::arena::Arena;
use wavesurf_core::constants::{NON_ZERO_SPEED_THRESHOLD, SPEED_CHANGE_THRESHOLD};
use wavesurf_core::geometry::{acceleration, limit, non_zero_sign, normal_absolute_angle, normal_relative_angle};
use wavesurf_core::rules::KinematicRules;
use wavesurf_core::state_log::KinematicLog;
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_waves::FiredBullet;

/// Heading swing that counts as reversing direction.
const DIRECTION_CHANGE_THRESHOLD: f64 = std::f64::consts::FRAC_PI_2;

/// How close a fired bullet must be to a reported collision to be the one
/// that died in it.
const BULLET_MATCH_DISTANCE: f64 = 40.0;

#[derive(Debug, Clone, Default)]
pub struct OwnState {
    pub state: KinematicState,
    pub log: KinematicLog,
    pub energy: f64,
    pub gun_heat: f64,
    pub opponents_alive: u32,
    /// Opponents at the start of the match.
    pub opponents_total: u32,
    pub last_bullet_fired_tick: Tick,
    pub fired_bullets: Vec<FiredBullet>,
    previous_speed: f64,
    last_speed: f64,
    last_non_zero_speed: f64,
    previous_heading: f64,
    current_heading: f64,
    pub time_since_reverse: Tick,
    pub time_since_speed_change: Tick,
    observed: bool,
}

impl OwnState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether we have seen our own state at least once this round.
    pub fn observed(&self) -> bool {
        self.observed
    }

    pub fn tick(&self) -> Tick {
        self.state.tick
    }

    pub fn observe(&mut self, state: KinematicState, energy: f64, gun_heat: f64, opponents_alive: u32) {
        self.previous_speed = if self.observed { self.state.speed } else { state.speed };
        self.state = state;
        self.log.add(state);
        self.energy = energy;
        self.gun_heat = gun_heat;
        self.opponents_alive = opponents_alive;
        self.opponents_total = self.opponents_total.max(opponents_alive);
        self.observed = true;

        self.previous_heading = self.current_heading;
        if state.speed.abs() > NON_ZERO_SPEED_THRESHOLD {
            self.last_non_zero_speed = state.speed;
        }
        let flip = if self.last_non_zero_speed < 0.0 { std::f64::consts::PI } else { 0.0 };
        self.current_heading = normal_absolute_angle(state.heading + flip);
    }

    pub fn location(&self) -> Point {
        self.state.location
    }

    pub fn is_duel(&self) -> bool {
        self.opponents_alive <= 1
    }

    /// Advance the direction and speed change timers for this tick.
    pub fn update_timers(&mut self) {
        if normal_relative_angle(self.current_heading - self.previous_heading).abs() > DIRECTION_CHANGE_THRESHOLD {
            self.time_since_reverse = 0;
        } else {
            self.time_since_reverse += 1;
        }

        let speed = self.state.speed;
        if (speed - self.last_speed).abs() > SPEED_CHANGE_THRESHOLD {
            self.time_since_speed_change = 0;
        } else {
            self.time_since_speed_change += 1;
        }
        self.last_speed = speed;
    }

    /// Direction of travel, holding the last one while stopped.
    pub fn speed_sign(&self) -> i32 {
        let speed = if self.state.speed.abs() > NON_ZERO_SPEED_THRESHOLD {
            self.state.speed
        } else {
            self.last_non_zero_speed
        };
        non_zero_sign(speed)
    }

    pub fn acceleration(&self, rules: &KinematicRules) -> f64 {
        limit(
            -rules.deceleration,
            acceleration(self.state.speed, self.previous_speed),
            rules.acceleration,
        )
    }

    pub fn add_fired_bullet(&mut self, bullet: FiredBullet) {
        self.fired_bullets.push(bullet);
    }

    /// Forget bullets that have left the field.
    pub fn remove_old_fired_bullets(&mut self, tick: Tick, arena: &Arena) {
        self.fired_bullets.retain(|b| arena.contains(b.position(tick)));
    }

    /// Mark the fired bullet nearest `location` as destroyed at `tick`.
    pub fn kill_fired_bullet(&mut self, location: Point, tick: Tick) {
        let closest = self
            .fired_bullets
            .iter_mut()
            .map(|b| (b.position(tick).distance_squared(location), b))
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((distance_sq, bullet)) = closest {
            if distance_sq < BULLET_MATCH_DISTANCE * BULLET_MATCH_DISTANCE {
                bullet.death_tick = Some(tick);
            }
        }
    }

    pub fn init_round(&mut self) {
        self.log.clear();
        self.fired_bullets.clear();
        self.previous_speed = 0.0;
        self.last_speed = 0.0;
        self.last_non_zero_speed = 0.0;
        self.previous_heading = 0.0;
        self.current_heading = 0.0;
        self.time_since_reverse = 0;
        self.time_since_speed_change = 0;
        self.last_bullet_fired_tick = 0;
        self.observed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversal_resets_timer() {
        let mut own = OwnState::new();
        own.observe(KinematicState::new(Point::new(100.0, 100.0), 0.0, 8.0, 1), 100.0, 0.0, 1);
        own.update_timers();
        own.observe(KinematicState::new(Point::new(100.0, 108.0), 0.0, 8.0, 2), 100.0, 0.0, 1);
        own.update_timers();
        assert_eq!(own.time_since_reverse, 1);

        own.observe(KinematicState::new(Point::new(100.0, 107.0), 0.0, -1.0, 3), 100.0, 0.0, 1);
        own.update_timers();
        assert_eq!(own.time_since_reverse, 0);
        assert_eq!(own.time_since_speed_change, 0);
        assert_eq!(own.speed_sign(), -1);
    }

    #[test]
    fn test_kill_nearest_bullet_only_when_close() {
        let mut own = OwnState::new();
        own.add_fired_bullet(FiredBullet::new(0, Point::new(100.0, 100.0), 0.0, 14.0));
        own.kill_fired_bullet(Point::new(400.0, 400.0), 5);
        assert_eq!(own.fired_bullets[0].death_tick, None);
        own.kill_fired_bullet(Point::new(105.0, 168.0), 5);
        assert_eq!(own.fired_bullets[0].death_tick, Some(5));
    }
}
