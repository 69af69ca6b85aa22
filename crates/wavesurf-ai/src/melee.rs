//! Melee movement: drive to the nearby point with the least risk from
//! every living opponent at once.
//!
//! Candidates are sampled in a ring around us, never farther than the
//! closest opponent. Each opponent adds risk by its energy relative to
//! ours, the damage it has done and how squarely the path lines up with
//! it; opponents with other bots closer to them than the candidate count
//! for less. Places we have recently been make a candidate riskier, so the
//! body keeps moving.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use log::{debug, error};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use wavesurf_core::enums::MoveMode;
use wavesurf_core::events::MoveDecision;
use wavesurf_core::geometry::{absolute_bearing, limit, project};
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_core::WavesurfError;
use wavesurf_waves::MotionPredictor;

/// Floor on squared distances in the risk terms.
const MIN_DISTANCE_SQ: f64 = 1.0;

/// Floor on our own energy in the energy ratio.
const MIN_ENERGY: f64 = 0.01;

const MIN_ENERGY_RATIO: f64 = 0.25;
const MAX_ENERGY_RATIO: f64 = 4.0;

/// An opponent with another bot within this share of the squared distance
/// to a candidate is assumed busy with that bot.
const CLOSER_BOT_FACTOR: f64 = 0.8;

/// Nearest a recent location is placed to us.
const RECENT_MIN_DISTANCE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeleeConfig {
    /// Candidate destinations sampled around us each tick.
    pub slices: usize,
    pub min_stick: f64,
    /// Random extra length on top of `min_stick`.
    pub stick_range: f64,
    /// Risk multiplier of the destination we are already driving to.
    pub current_destination_bias: f64,
    pub recent_locations: usize,
    /// Ticks between batches of recent locations.
    pub recent_interval: Tick,
    pub recent_batch: usize,
    pub recent_spread: f64,
    /// Risk a recent location adds at distance 1.
    pub recent_risk: f64,
    /// Ticks the path toward a destination must stay in the field.
    pub wall_check_ticks: u32,
}

impl Default for MeleeConfig {
    fn default() -> Self {
        Self {
            slices: 64,
            min_stick: 100.0,
            stick_range: 100.0,
            current_destination_bias: 0.8,
            recent_locations: 50,
            recent_interval: 7,
            recent_batch: 5,
            recent_spread: 200.0,
            recent_risk: 30.0,
            wall_check_ticks: 5,
        }
    }
}

impl MeleeConfig {
    pub fn validate(&self) -> Result<(), WavesurfError> {
        if self.slices == 0 {
            return Err(WavesurfError::config("melee.slices", "need at least one candidate"));
        }
        if !(self.min_stick.is_finite() && self.min_stick > 0.0) {
            return Err(WavesurfError::config("melee.min_stick", "must be positive"));
        }
        if !(self.stick_range.is_finite() && self.stick_range >= 0.0) {
            return Err(WavesurfError::config("melee.stick_range", "must not be negative"));
        }
        if !(self.current_destination_bias.is_finite() && self.current_destination_bias > 0.0) {
            return Err(WavesurfError::config("melee.current_destination_bias", "must be positive"));
        }
        if self.recent_interval <= 0 {
            return Err(WavesurfError::config("melee.recent_interval", "must be at least one tick"));
        }
        if self.wall_check_ticks == 0 {
            return Err(WavesurfError::config("melee.wall_check_ticks", "must be at least one tick"));
        }
        Ok(())
    }
}

/// One living opponent as the melee mover sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Threat {
    pub location: Point,
    pub energy: f64,
    /// Bearing from us to the opponent.
    pub abs_bearing: f64,
    /// Damage it has done to us, scaled by its average distance.
    pub damage_factor: f64,
    /// Squared distances from it to every other living opponent.
    pub bot_distances_sq: Vec<f64>,
}

impl Threat {
    /// Other opponents closer than `distance_sq` (squared) to this one.
    pub fn bots_closer(&self, distance_sq: f64) -> usize {
        self.bot_distances_sq.iter().filter(|&&d| d < distance_sq).count()
    }

    fn risk(&self, destination: Point, go_angle: f64, my_energy: f64) -> f64 {
        let distance_sq = destination.distance_squared(self.location).max(MIN_DISTANCE_SQ);
        let energy_ratio = limit(MIN_ENERGY_RATIO, self.energy / my_energy.max(MIN_ENERGY), MAX_ENERGY_RATIO);
        let alignment = 1.0 + (self.abs_bearing - go_angle).cos().abs();
        let busy = self.bots_closer(distance_sq * CLOSER_BOT_FACTOR) as f64 + 1.0;
        energy_ratio * alignment * self.damage_factor / (distance_sq * busy)
    }
}

/// Melee movement state carried between ticks.
#[derive(Debug, Clone)]
pub struct MeleeMover {
    config: MeleeConfig,
    predictor: MotionPredictor,
    rng: ChaCha8Rng,
    destination: Option<Point>,
    last_risk: f64,
    recent: VecDeque<Point>,
    last_recent_tick: Option<Tick>,
}

impl MeleeMover {
    pub fn new(config: MeleeConfig, predictor: MotionPredictor, seed: u64) -> Result<Self, WavesurfError> {
        config.validate()?;
        Ok(Self {
            config,
            predictor,
            rng: ChaCha8Rng::seed_from_u64(seed),
            destination: None,
            last_risk: f64::INFINITY,
            recent: VecDeque::new(),
            last_recent_tick: None,
        })
    }

    pub fn config(&self) -> &MeleeConfig {
        &self.config
    }

    pub fn init_round(&mut self) {
        self.destination = None;
        self.last_risk = f64::INFINITY;
        self.recent.clear();
        self.last_recent_tick = None;
    }

    pub fn destination(&self) -> Option<Point> {
        self.destination
    }

    /// Risk of the destination chosen last.
    pub fn last_risk(&self) -> f64 {
        self.last_risk
    }

    pub fn recent_count(&self) -> usize {
        self.recent.len()
    }

    /// Pick the least risky reachable destination and steer toward it.
    pub fn move_decision(&mut self, me: &KinematicState, my_energy: f64, threats: &[Threat]) -> MoveDecision {
        self.remember_location(me);
        let closest = threats
            .iter()
            .map(|t| me.location.distance(t.location))
            .fold(f64::INFINITY, f64::min);

        let mut candidates = Vec::with_capacity(self.config.slices + 1);
        if let Some(current) = self.destination.filter(|&d| me.location.distance(d) <= closest) {
            let risk = self.risk(me.location, current, my_energy, threats);
            candidates.push((current, risk * self.config.current_destination_bias));
        }
        for slice in 0..self.config.slices {
            let angle = slice as f64 * TAU / self.config.slices as f64;
            let stick = (self.config.min_stick + self.rng.gen::<f64>() * self.config.stick_range).min(closest);
            let point = self.predictor.arena.translate_to_field(project(me.location, angle, stick));
            candidates.push((point, self.risk(me.location, point, my_energy, threats)));
        }
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        let chosen = candidates.into_iter().find(|&(point, _)| self.clear_of_walls(me, point));
        match chosen {
            Some((point, risk)) => {
                self.destination = Some(point);
                self.last_risk = risk;
            }
            None => error!("no melee destination clear of the walls from {:?}", me.location),
        }
        let destination = self.destination.unwrap_or(me.location);
        debug!(
            "melee toward ({:.1}, {:.1}) at risk {:.3e} among {} opponents",
            destination.x,
            destination.y,
            self.last_risk,
            threats.len()
        );
        self.decision(me, destination)
    }

    fn risk(&self, from: Point, destination: Point, my_energy: f64, threats: &[Threat]) -> f64 {
        let go_angle = absolute_bearing(from, destination);
        let threat: f64 = threats.iter().map(|t| t.risk(destination, go_angle, my_energy)).sum();
        let crowding: f64 = self
            .recent
            .iter()
            .map(|&recent| self.config.recent_risk / destination.distance_squared(recent).max(MIN_DISTANCE_SQ))
            .sum();
        threat * (1.0 + crowding)
    }

    /// Full speed toward `destination` keeps the body in the field for the
    /// configured number of ticks.
    fn clear_of_walls(&self, me: &KinematicState, destination: Point) -> bool {
        let max_speed = self.predictor.rules.max_speed;
        let mut state = *me;
        for _ in 0..self.config.wall_check_ticks {
            let go_angle = absolute_bearing(state.location, destination);
            state = self.predictor.step_toward(&state, max_speed, go_angle, true);
            if !self.predictor.arena.contains(state.location) {
                return false;
            }
        }
        true
    }

    fn remember_location(&mut self, me: &KinematicState) {
        if self
            .last_recent_tick
            .is_some_and(|tick| me.tick - tick < self.config.recent_interval)
        {
            return;
        }
        self.last_recent_tick = Some(me.tick);
        for _ in 0..self.config.recent_batch {
            let angle = self.rng.gen::<f64>() * TAU;
            let length = RECENT_MIN_DISTANCE + self.rng.gen::<f64>() * self.rng.gen::<f64>() * self.config.recent_spread;
            self.recent.push_back(project(me.location, angle, length));
        }
        while self.recent.len() > self.config.recent_locations {
            self.recent.pop_front();
        }
    }

    fn decision(&self, me: &KinematicState, destination: Point) -> MoveDecision {
        let go_angle = absolute_bearing(me.location, destination);
        let (turn, direction) = MotionPredictor::steering(me.heading, go_angle);
        MoveDecision {
            mode: MoveMode::Melee,
            option: None,
            destination: Some(destination),
            go_angle,
            max_speed: self.predictor.rules.max_speed,
            turn,
            distance: direction.signum() * me.location.distance(destination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;
    use wavesurf_core::arena::Arena;
    use wavesurf_core::rules::KinematicRules;

    fn mover() -> MeleeMover {
        let predictor = MotionPredictor::new(Arena::default(), KinematicRules::default());
        MeleeMover::new(MeleeConfig::default(), predictor, 7).unwrap()
    }

    fn threats(me: Point, locations: &[Point]) -> Vec<Threat> {
        locations
            .iter()
            .map(|&location| Threat {
                location,
                energy: 100.0,
                abs_bearing: absolute_bearing(me, location),
                damage_factor: 500.0,
                bot_distances_sq: locations
                    .iter()
                    .filter(|&&other| other != location)
                    .map(|&other| other.distance_squared(location))
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn test_moves_away_from_densest_cluster() {
        let me = KinematicState::at(Point::new(400.0, 300.0), 20);
        let cluster = [Point::new(180.0, 160.0), Point::new(150.0, 200.0), Point::new(200.0, 210.0)];
        let centroid = cluster.iter().copied().sum::<Point>() / 3.0;
        let mut locations = cluster.to_vec();
        locations.push(Point::new(720.0, 420.0));

        let mut m = mover();
        let decision = m.move_decision(&me, 100.0, &threats(me.location, &locations));
        assert_eq!(decision.mode, MoveMode::Melee);
        assert_eq!(decision.option, None);
        let destination = decision.destination.unwrap();
        assert!(destination.distance(centroid) > me.location.distance(centroid));
        assert_eq!(m.destination(), Some(destination));
        assert!(m.last_risk().is_finite());
    }

    #[test]
    fn test_never_farther_than_closest_opponent() {
        let me = KinematicState::at(Point::new(400.0, 300.0), 0);
        let locations = [Point::new(400.0, 360.0), Point::new(100.0, 100.0)];
        let mut m = mover();
        let decision = m.move_decision(&me, 100.0, &threats(me.location, &locations));
        assert!(decision.destination.unwrap().distance(me.location) <= 60.0 + 1e-9);
    }

    #[test]
    fn test_busy_and_weak_opponents_carry_less_risk() {
        let mut threat = threats(Point::ZERO, &[Point::new(0.0, 100.0)]).remove(0);
        let destination = Point::new(100.0, 100.0);
        let alone = threat.risk(destination, PI / 2.0, 100.0);
        assert_abs_diff_eq!(alone, 500.0 / 10_000.0, epsilon = 1e-12);

        // Another bot sits closer to it than we would.
        threat.bot_distances_sq = vec![400.0];
        assert_abs_diff_eq!(threat.risk(destination, PI / 2.0, 100.0), alone / 2.0, epsilon = 1e-12);
        assert_eq!(threat.bots_closer(400.0), 0);
        assert_eq!(threat.bots_closer(401.0), 1);

        threat.bot_distances_sq.clear();
        threat.energy = 1.0;
        assert_abs_diff_eq!(threat.risk(destination, PI / 2.0, 100.0), alone * 0.25, epsilon = 1e-12);
        threat.energy = 1000.0;
        assert_abs_diff_eq!(threat.risk(destination, PI / 2.0, 100.0), alone * 4.0, epsilon = 1e-12);
        // Heading straight along the line to it doubles the risk.
        threat.energy = 100.0;
        assert_abs_diff_eq!(threat.risk(destination, 0.0, 100.0), alone * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reverses_away_from_wall() {
        // Heading west at full speed, just inside the west wall.
        let me = KinematicState::new(Point::new(45.0, 300.0), 1.5 * PI, 8.0, 0);
        let locations = [Point::new(700.0, 300.0), Point::new(700.0, 500.0)];
        let mut m = mover();
        let decision = m.move_decision(&me, 100.0, &threats(me.location, &locations));
        assert!(decision.destination.unwrap().x >= me.location.x - 1e-9);
        assert!(decision.distance < 0.0);
    }

    #[test]
    fn test_recent_locations_batched_and_capped() {
        let locations = [Point::new(700.0, 500.0), Point::new(100.0, 500.0)];
        let mut m = mover();
        for tick in 0..7 {
            let me = KinematicState::at(Point::new(400.0, 300.0), tick);
            m.move_decision(&me, 100.0, &threats(me.location, &locations));
        }
        assert_eq!(m.recent_count(), 5);
        for tick in 7..200 {
            let me = KinematicState::at(Point::new(400.0, 300.0), tick);
            m.move_decision(&me, 100.0, &threats(me.location, &locations));
        }
        assert_eq!(m.recent_count(), 50);

        m.init_round();
        assert_eq!(m.recent_count(), 0);
        assert_eq!(m.destination(), None);
        assert_eq!(m.last_risk(), f64::INFINITY);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MeleeConfig {
            slices: 0,
            ..Default::default()
        };
        let predictor = MotionPredictor::new(Arena::default(), KinematicRules::default());
        assert!(MeleeMover::new(config, predictor, 1).is_err());
    }
}
