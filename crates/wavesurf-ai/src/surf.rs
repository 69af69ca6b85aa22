//! Wave surfing: pick the movement option whose predicted path meets the
//! least danger across the next few waves.
//!
//! Each option (orbit counter-clockwise, stop, orbit clockwise) is
//! simulated tick by tick until the first wave passes. The ticks the wave
//! spends breaking over the hitbox give a precise intersection, scored
//! against the opponent's surf views. While the running danger stays under
//! the best option found so far, the search recurses into the next wave
//! from the point the first one passed.

use std::f64::consts::{FRAC_PI_2, PI};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use wavesurf_core::constants::{MAX_PREDICTION_TICKS, MIN_NEIGHBOR_DISTANCE};
use wavesurf_core::enums::{MoveMode, SurfOption, WavePosition};
use wavesurf_core::events::MoveDecision;
use wavesurf_core::geometry::{absolute_bearing, limit, normal_relative_angle, normalize_angle};
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_core::WavesurfError;
use wavesurf_waves::predictor::EscapeQuery;
use wavesurf_waves::{Intersection, MotionPredictor, Wave, WaveId, WaveManager};

use crate::knn::StatisticalView;
use crate::profiles::{surf_views, ViewConfig};
use crate::stats::HitStats;

/// Guess factors assumed dangerous before any view has data, with weights.
const DEFAULT_DANGER_CURVE: [(f64, f64); 2] = [(0.0, 3.0), (0.85, 1.0)];

/// Floor on intersection half-widths used as a kernel bandwidth.
const MIN_DANGER_BANDWIDTH: f64 = 1e-9;

/// Tuning of the surf movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfConfig {
    pub desired_distance: f64,
    pub wall_stick: f64,
    /// Wall stick when searching for a surf destination.
    pub mea_wall_stick: f64,
    /// Base of the penalty for ending closer to the opponent.
    pub distancing_base: f64,
    pub max_attack_angle: f64,
    pub surf_attack_multiplier: f64,
    pub orbit_attack_multiplier: f64,
    /// Weight of the opponent's overall hit rate as a danger floor.
    pub base_danger_factor: f64,
    pub waves_to_surf: usize,
    pub decay_rate: f64,
    pub views: Vec<ViewConfig>,
}

impl Default for SurfConfig {
    fn default() -> Self {
        let decay_rate = 1.8;
        Self {
            desired_distance: 650.0,
            wall_stick: 160.0,
            mea_wall_stick: 100.0,
            distancing_base: 2.5,
            max_attack_angle: PI * 0.45,
            surf_attack_multiplier: 0.6,
            orbit_attack_multiplier: 1.65,
            base_danger_factor: 1.0,
            waves_to_surf: 2,
            decay_rate,
            views: surf_views(decay_rate),
        }
    }
}

impl SurfConfig {
    pub fn validate(&self) -> Result<(), WavesurfError> {
        if !(self.desired_distance.is_finite() && self.desired_distance > 0.0) {
            return Err(WavesurfError::config("surf.desired_distance", "must be positive"));
        }
        if !(self.distancing_base.is_finite() && self.distancing_base > 0.0) {
            return Err(WavesurfError::config("surf.distancing_base", "must be positive"));
        }
        if !(self.decay_rate.is_finite() && self.decay_rate > 0.0) {
            return Err(WavesurfError::config("surf.decay_rate", "must be positive"));
        }
        if !(0.0..=FRAC_PI_2).contains(&self.max_attack_angle) {
            return Err(WavesurfError::config("surf.max_attack_angle", "must be within [0, pi/2]"));
        }
        if self.waves_to_surf == 0 {
            return Err(WavesurfError::config("surf.waves_to_surf", "must surf at least one wave"));
        }
        for view in &self.views {
            view.validate()?;
        }
        Ok(())
    }

    /// Tilt away from (positive) or toward the opponent to hold the
    /// desired distance.
    fn attack_angle(&self, distance: f64, multiplier: f64) -> f64 {
        let distance_factor = (distance - self.desired_distance) / self.desired_distance;
        limit(-self.max_attack_angle, distance_factor * multiplier, self.max_attack_angle)
    }
}

/// Waves that can be surfed, oldest first.
pub trait SurfableWaves {
    fn surfable_wave(&self, index: usize, state: &KinematicState) -> Option<&Wave>;
}

impl SurfableWaves for WaveManager {
    fn surfable_wave(&self, index: usize, state: &KinematicState) -> Option<&Wave> {
        self.find_surfable_wave(index, state, WavePosition::BreakingCenter)
    }
}

/// What the surf search reads about one opponent.
pub struct SurfContext<'a> {
    pub waves: &'a dyn SurfableWaves,
    pub views: &'a mut [StatisticalView<f64>],
    pub stats: &'a HitStats,
    /// Opponent's last scanned location.
    pub opponent: Point,
    pub now: Tick,
}

impl SurfContext<'_> {
    fn clear_neighbor_cache(&mut self) {
        for view in self.views.iter_mut() {
            view.clear_cache();
        }
    }
}

/// Surf movement state carried between ticks.
#[derive(Debug, Clone)]
pub struct SurfMover {
    config: SurfConfig,
    predictor: MotionPredictor,
    last_option: SurfOption,
    last_destination: Option<Point>,
    stop_destination: Option<Point>,
    option_dangers: [Option<f64>; 3],
    option_destinations: [Option<Point>; 3],
    last_wave_surfed: Option<WaveId>,
}

impl SurfMover {
    pub fn new(config: SurfConfig, predictor: MotionPredictor) -> Result<Self, WavesurfError> {
        config.validate()?;
        Ok(Self {
            config,
            predictor,
            last_option: SurfOption::Clockwise,
            last_destination: None,
            stop_destination: None,
            option_dangers: [None; 3],
            option_destinations: [None; 3],
            last_wave_surfed: None,
        })
    }

    pub fn config(&self) -> &SurfConfig {
        &self.config
    }

    pub fn init_round(&mut self) {
        self.last_destination = None;
        self.stop_destination = None;
    }

    /// Danger of each option from the last surf evaluation.
    pub fn option_dangers(&self) -> Vec<(SurfOption, f64)> {
        SurfOption::ALL
            .iter()
            .filter_map(|&option| self.option_dangers[option.index()].map(|d| (option, d)))
            .collect()
    }

    /// Movement for this tick: surf the first surfable wave, or orbit the
    /// opponent when there is none.
    pub fn move_decision(&mut self, me: &KinematicState, ctx: &mut SurfContext) -> MoveDecision {
        let waves = ctx.waves;
        let decision = match waves.surfable_wave(0, me) {
            Some(wave) => self.surf(me, wave.id, ctx),
            None => self.orbit(me, ctx.opponent),
        };
        debug!(
            "{:?} {:?} toward {:.3} at speed {}",
            decision.mode, decision.option, decision.go_angle, decision.max_speed
        );
        decision
    }

    /// Circle `opponent` at the desired distance, ignoring waves.
    pub fn orbit(&mut self, me: &KinematicState, opponent: Point) -> MoveDecision {
        let orbit_bearing = absolute_bearing(opponent, me.location);
        let attack = self
            .config
            .attack_angle(me.location.distance(opponent), self.config.orbit_attack_multiplier);
        let go_angle = |option: SurfOption| {
            let angle = orbit_bearing + option.direction() as f64 * (FRAC_PI_2 + attack);
            self.wall_smoothing(me.location, angle, option)
        };
        let counter = go_angle(SurfOption::CounterClockwise);
        let clockwise = go_angle(SurfOption::Clockwise);

        let (option, go) = if normal_relative_angle(clockwise - orbit_bearing).abs()
            < normal_relative_angle(counter - orbit_bearing).abs()
        {
            (SurfOption::Clockwise, clockwise)
        } else {
            (SurfOption::CounterClockwise, counter)
        };
        self.last_option = option;
        self.decision(MoveMode::Orbit, option, None, go, self.predictor.rules.max_speed, me)
    }

    fn surf(&mut self, me: &KinematicState, wave_id: WaveId, ctx: &mut SurfContext) -> MoveDecision {
        if self.last_wave_surfed != Some(wave_id) {
            ctx.clear_neighbor_cache();
            self.last_wave_surfed = Some(wave_id);
            self.last_destination = None;
            self.stop_destination = None;
        }

        let going_clockwise = self.last_option == SurfOption::Clockwise;
        self.update_surf_dangers(me, ctx, going_clockwise);
        let danger = |option: SurfOption| self.option_dangers[option.index()].unwrap_or(f64::INFINITY);
        let counter = danger(SurfOption::CounterClockwise);
        let stop = danger(SurfOption::Stop);
        let clockwise = danger(SurfOption::Clockwise);

        let stopping = stop <= counter && stop <= clockwise;
        let (destination, max_speed) = if stopping {
            if self.stop_destination.is_none() {
                self.stop_destination = self.option_destinations[self.last_option.index()];
            }
            self.last_destination = None;
            (self.stop_destination, 0.0)
        } else {
            self.last_option = if clockwise < counter {
                SurfOption::Clockwise
            } else {
                SurfOption::CounterClockwise
            };
            let destination = self.option_destinations[self.last_option.index()];
            self.last_destination = destination;
            self.stop_destination = None;
            (destination, self.predictor.rules.max_speed)
        };

        let go = destination.map_or(me.heading, |d| {
            self.wall_smoothing(me.location, absolute_bearing(me.location, d), self.last_option)
        });
        let option = if stopping { SurfOption::Stop } else { self.last_option };
        self.decision(MoveMode::Surf, option, destination, go, max_speed, me)
    }

    fn update_surf_dangers(&mut self, me: &KinematicState, ctx: &mut SurfContext, going_clockwise: bool) {
        let mut best = f64::INFINITY;
        for option in self.sorted_options() {
            let mut predicted_log = Vec::new();
            let danger = self.check_danger(ctx, me, me, option, going_clockwise, 0, best, &mut predicted_log);
            self.option_dangers[option.index()] = Some(danger);
            best = best.min(danger);
        }
    }

    /// Options ordered by their last danger, unknown counting as zero, so
    /// the likely best sets the cutoff early.
    fn sorted_options(&self) -> [SurfOption; 3] {
        let danger = |option: SurfOption| self.option_dangers[option.index()].unwrap_or(0.0);
        let mut options = SurfOption::ALL;
        for x in 0..options.len() {
            let mut lowest = danger(options[x]);
            for y in x + 1..options.len() {
                if danger(options[y]) < lowest {
                    lowest = danger(options[y]);
                    options.swap(x, y);
                }
            }
        }
        options
    }

    /// Danger of taking `option` from `start` against the `index`-th
    /// surfable wave, plus the best continuation over later waves.
    #[allow(clippy::too_many_arguments)]
    pub fn check_danger(
        &mut self,
        ctx: &mut SurfContext,
        me: &KinematicState,
        start: &KinematicState,
        option: SurfOption,
        previously_clockwise: bool,
        index: usize,
        cutoff: f64,
        predicted_log: &mut Vec<KinematicState>,
    ) -> f64 {
        let waves = ctx.waves;
        let Some(wave) = waves.surfable_wave(index, me) else {
            return 0.0;
        };

        let mut danger_states = Vec::new();
        let start_position = wave.check_wave_position(start);
        if index > 0 && start_position != WavePosition::Midair {
            danger_states.extend(
                predicted_log
                    .iter()
                    .filter(|s| wave.check_wave_position(s).is_breaking())
                    .copied(),
            );
        }
        if start_position == WavePosition::Gone && danger_states.is_empty() {
            return 0.0;
        }

        let predict_clockwise = match option {
            SurfOption::Stop => previously_clockwise,
            other => other == SurfOption::Clockwise,
        };
        let (max_speed, smoothing) = if option == SurfOption::Stop {
            let smoothing = if predict_clockwise {
                SurfOption::Clockwise
            } else {
                SurfOption::CounterClockwise
            };
            (0.0, smoothing)
        } else {
            (self.predictor.rules.max_speed, option)
        };

        let destination = match self.stop_destination {
            Some(stop) if index == 0 && option == SurfOption::Stop => stop,
            _ => self.surf_destination(wave, index, start, smoothing),
        };
        if index == 0 {
            self.option_destinations[option.index()] = Some(destination);
        }

        let mut predicted = *start;
        let mut passed = *start;
        let mut wave_hit = false;
        for _ in 0..MAX_PREDICTION_TICKS {
            if !wave_hit
                && wave.check_wave_position_with(&predicted, false, Some(WavePosition::BreakingFront))
                    == WavePosition::BreakingFront
            {
                let mut danger_state = predicted;
                for _ in 0..MAX_PREDICTION_TICKS {
                    danger_states.push(danger_state);
                    danger_state = self.predict_surf_location(&danger_state, destination, 0.0, smoothing);
                    if wave.check_wave_position_with(&danger_state, true, None) == WavePosition::Gone {
                        break;
                    }
                }
                wave_hit = true;
            }

            let position = wave.check_wave_position_with(&predicted, true, None);
            if matches!(position, WavePosition::BreakingCenter | WavePosition::Gone) {
                passed = predicted;
                break;
            }
            predicted_log.push(predicted);
            predicted = self.predict_surf_location(&predicted, destination, max_speed, smoothing);
        }

        let mut danger = match wave.precise_intersection(&danger_states) {
            Some(intersection) => {
                let mut danger = ctx.stats.normalized_hit_rate() * self.config.base_danger_factor
                    + self.danger_score(ctx, wave, &intersection, index);
                danger *= wave.shadow_factor(&intersection);
                danger *= self.predictor.rules.bullet_damage(wave.bullet_power());
                let distance_to_wave = me.location.distance(wave.source) - wave.distance_traveled(ctx.now);
                danger /= (distance_to_wave / wave.bullet_speed()).max(1.0);
                danger * self.distancing_danger(start.location, passed.location, ctx.opponent)
            }
            None => 0.0,
        };

        if index + 1 < self.config.waves_to_surf && danger < cutoff {
            let mut next_best = f64::INFINITY;
            for next_option in SurfOption::ALL {
                let mut branch_log = predicted_log.clone();
                let next = self.check_danger(
                    ctx,
                    me,
                    &passed,
                    next_option,
                    predict_clockwise,
                    index + 1,
                    cutoff,
                    &mut branch_log,
                );
                next_best = next_best.min(next);
            }
            danger += next_best;
        }
        danger
    }

    /// Weighted kernel density of the enabled views' neighbors around the
    /// intersection, or the default curve when no view is enabled.
    pub fn danger_score(
        &self,
        ctx: &mut SurfContext,
        wave: &Wave,
        intersection: &Intersection,
        index: usize,
    ) -> f64 {
        let hit_percentage = ctx.stats.normalized_hit_percentage();
        let margin_of_error = ctx.stats.margin_of_error_percentage();
        let bandwidth = intersection.bandwidth.max(MIN_DANGER_BANDWIDTH);

        let mut total_danger = 0.0;
        let mut total_scan_weight = 0.0;
        let mut enabled_size = 0;
        for view in ctx.views.iter_mut() {
            if !view.enabled(hit_percentage, margin_of_error) {
                continue;
            }
            enabled_size += view.len();
            let view_weight = view.weight();
            let neighbors = view.nearest_cached(index, wave).to_vec();
            let decay = view.decay_weights(&neighbors);

            let mut density = 0.0;
            let mut view_scan_weight = 0.0;
            for (neighbor, decay_weight) in neighbors.iter().zip(decay) {
                let scan_weight = decay_weight / neighbor.distance.max(MIN_NEIGHBOR_DISTANCE).sqrt();
                let angle = normalize_angle(wave.firing_angle(neighbor.value), intersection.angle);
                if !wave.shadowed(angle) {
                    let u = (angle - intersection.angle) / bandwidth;
                    density += scan_weight * 2f64.powf(-u.abs());
                }
                view_scan_weight += scan_weight;
            }
            total_scan_weight += view_scan_weight * view_weight;
            total_danger += view_weight * density;
        }

        if enabled_size == 0 || total_scan_weight <= 0.0 {
            return default_danger(wave, intersection);
        }
        total_danger / total_scan_weight
    }

    /// Penalty for ending closer to the opponent than we started.
    pub fn distancing_danger(&self, start: Point, predicted: Point, opponent: Point) -> f64 {
        let quotient = opponent.distance(start) / opponent.distance(predicted).max(1.0);
        self.config.distancing_base.powf(quotient) / self.config.distancing_base
    }

    pub fn round_over(&self, opponent: &str, stats: &HitStats) {
        info!(
            "{opponent} normalized hit %: {:.2}, raw hit %: {:.2}",
            stats.normalized_hit_percentage(),
            stats.raw_hit_percentage()
        );
    }

    fn surf_destination(&self, wave: &Wave, index: usize, start: &KinematicState, option: SurfOption) -> Point {
        if index == 0 && self.last_option == option {
            if let Some(destination) = self.last_destination {
                return destination;
            }
        }
        let attack_angle = self
            .config
            .attack_angle(wave.source.distance(start.location), self.config.surf_attack_multiplier);
        let query = EscapeQuery {
            source: wave.source,
            fire_tick: wave.fire_tick,
            bullet_speed: wave.bullet_speed(),
            start: *start,
            attack_angle,
            wall_stick: self.config.mea_wall_stick,
        };
        self.predictor.precise_escape_angle(option.direction(), &query).location
    }

    fn predict_surf_location(
        &self,
        state: &KinematicState,
        destination: Point,
        max_speed: f64,
        smoothing: SurfOption,
    ) -> KinematicState {
        let go = self.wall_smoothing(state.location, absolute_bearing(state.location, destination), smoothing);
        self.predictor.step_toward(state, max_speed, go, false)
    }

    fn wall_smoothing(&self, location: Point, go_angle: f64, option: SurfOption) -> f64 {
        self.predictor
            .arena
            .wall_smoothing(location, go_angle, option.direction(), self.config.wall_stick)
    }

    fn decision(
        &self,
        mode: MoveMode,
        option: SurfOption,
        destination: Option<Point>,
        go_angle: f64,
        max_speed: f64,
        me: &KinematicState,
    ) -> MoveDecision {
        let (turn, distance) = MotionPredictor::steering(me.heading, go_angle);
        MoveDecision {
            mode,
            option: Some(option),
            destination,
            go_angle,
            max_speed,
            turn,
            distance,
        }
    }
}

/// Danger of the fixed reference curve: head-on and near the edge.
pub fn default_danger(wave: &Wave, intersection: &Intersection) -> f64 {
    let bandwidth = intersection.bandwidth.max(MIN_DANGER_BANDWIDTH);
    DEFAULT_DANGER_CURVE
        .iter()
        .map(|&(guess_factor, weight)| {
            let angle = wave.firing_angle(guess_factor);
            let u = (angle - normalize_angle(intersection.angle, angle)) / bandwidth;
            weight * 2f64.powf(-u.abs())
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use wavesurf_core::arena::Arena;
    use wavesurf_core::rules::KinematicRules;

    fn mover() -> SurfMover {
        SurfMover::new(
            SurfConfig::default(),
            MotionPredictor::new(Arena::default(), KinematicRules::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_attack_angle_clamps() {
        let config = SurfConfig::default();
        assert_eq!(config.attack_angle(650.0, 0.6), 0.0);
        assert!(config.attack_angle(300.0, 0.6) < 0.0);
        assert_abs_diff_eq!(config.attack_angle(5000.0, 1.65), PI * 0.45, epsilon = 1e-12);
    }

    #[test]
    fn test_distancing_danger() {
        let m = mover();
        let opponent = Point::new(400.0, 300.0);
        let here = Point::new(400.0, 500.0);
        assert_abs_diff_eq!(m.distancing_danger(here, here, opponent), 1.0, epsilon = 1e-12);
        let closer = Point::new(400.0, 400.0);
        assert!(m.distancing_danger(here, closer, opponent) > 1.0);
    }

    #[test]
    fn test_sorted_options_follow_last_dangers() {
        let mut m = mover();
        assert_eq!(m.sorted_options(), SurfOption::ALL);
        m.option_dangers = [Some(3.0), Some(2.0), Some(1.0)];
        assert_eq!(
            m.sorted_options(),
            [SurfOption::Clockwise, SurfOption::Stop, SurfOption::CounterClockwise]
        );
    }

    #[test]
    fn test_orbit_without_waves() {
        let mut m = mover();
        let manager = WaveManager::new();
        let stats = HitStats::default();
        let mut views: Vec<StatisticalView<f64>> = Vec::new();
        let mut ctx = SurfContext {
            waves: &manager,
            views: &mut views,
            stats: &stats,
            opponent: Point::new(400.0, 150.0),
            now: 5,
        };
        let me = KinematicState::new(Point::new(400.0, 450.0), 0.0, 0.0, 5);
        let decision = m.move_decision(&me, &mut ctx);
        assert_eq!(decision.mode, MoveMode::Orbit);
        assert_eq!(decision.destination, None);
        assert_eq!(decision.max_speed, 8.0);
        assert!(decision.option.is_some());
        assert_ne!(decision.option, Some(SurfOption::Stop));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SurfConfig {
            waves_to_surf: 0,
            ..Default::default()
        };
        let predictor = MotionPredictor::new(Arena::default(), KinematicRules::default());
        assert!(SurfMover::new(config, predictor).is_err());
    }
}
