//! Targeting context kept against one opponent: our waves toward it, the
//! views every gun strategy aims from, and its movement timers.

use log::{debug, warn};

use wavesurf_ai::{GunConfig, GunSample, GunViews, StrategyArbiter};
use wavesurf_core::arena::Arena;
use wavesurf_core::constants::{NON_ZERO_SPEED_THRESHOLD, SPEED_CHANGE_THRESHOLD};
use wavesurf_core::enums::{StrategyKind, WallDistanceStyle, WavePosition};
use wavesurf_core::events::ExplainEvent;
use wavesurf_core::geometry::{absolute_bearing, acceleration, limit, non_zero_sign};
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_core::WavesurfError;
use wavesurf_waves::{MotionPredictor, TargetFeatures, Wave, WaveBreak, WaveFilter, WaveInit, WaveManager};

use crate::components::Opponent;

/// Advancing speed above which an opponent counts as coming at us.
const RAMMING_SPEED: f64 = 6.0;

/// Our side of a gun wave about to be fired.
#[derive(Debug, Clone, Copy)]
pub struct Shooter {
    /// Where we will be when the wave fires.
    pub location: Point,
    pub energy: f64,
    pub gun_heat: f64,
    pub last_bullet_fired_tick: Tick,
    pub enemies_alive: u32,
    pub round: u32,
}

#[derive(Debug, Clone)]
pub struct GunTracker {
    pub views: GunViews,
    pub waves: WaveManager,
    /// Newest non-alt wave, the one the next shot is aimed along.
    pub last_wave_fired: Option<Wave>,
    pub strategy: StrategyKind,
    duel_wall_distance: WallDistanceStyle,
    pub time_since_reverse: Tick,
    pub time_since_speed_change: Tick,
    pub previous_speed: f64,
    last_non_zero_speed: f64,
    pub time_alive_together: u32,
    pub time_moving_at_me: u32,
}

impl GunTracker {
    pub fn new(config: &GunConfig) -> Result<Self, WavesurfError> {
        Ok(Self {
            views: GunViews::new(config)?,
            waves: WaveManager::new(),
            last_wave_fired: None,
            strategy: StrategyKind::MainKnn,
            duel_wall_distance: config.duel_wall_distance,
            time_since_reverse: 0,
            time_since_speed_change: 0,
            previous_speed: 0.0,
            last_non_zero_speed: 0.0,
            time_alive_together: 0,
            time_moving_at_me: 0,
        })
    }

    pub fn init_round(&mut self) {
        self.waves.reset_round();
        self.views.clear_cache();
        self.last_wave_fired = None;
        self.time_since_reverse = 0;
        self.time_since_speed_change = 0;
        self.previous_speed = 0.0;
        self.last_non_zero_speed = 0.0;
    }

    /// Update timers from a new scan. `previous` is the prior scan, if any.
    pub fn on_scan(&mut self, previous: Option<&KinematicState>, state: &KinematicState, abs_bearing: f64) {
        if let Some(previous) = previous {
            let elapsed = state.tick - previous.tick;
            self.time_since_reverse += elapsed;
            self.time_since_speed_change += elapsed;
            self.previous_speed = previous.speed;
        }
        self.update_timers(state.speed);
        if previous.is_some() {
            self.time_alive_together += 1;
            let advancing = -(state.heading - abs_bearing).cos() * state.speed;
            if advancing > RAMMING_SPEED {
                self.time_moving_at_me += 1;
            }
        }
    }

    pub fn update_timers(&mut self, speed: f64) {
        if (speed - self.last_non_zero_speed).abs() > SPEED_CHANGE_THRESHOLD {
            self.time_since_speed_change = 0;
        }
        if speed.abs() > NON_ZERO_SPEED_THRESHOLD {
            if self.last_non_zero_speed == 0.0 || speed.signum() != self.last_non_zero_speed.signum() {
                self.time_since_reverse = 0;
            }
            self.last_non_zero_speed = speed;
        }
    }

    /// Spends more than half its time driving straight at us.
    pub fn is_rammer(&self) -> bool {
        self.time_alive_together > 0
            && self.time_moving_at_me as f64 / self.time_alive_together as f64 > 0.5
    }

    /// Create the wave for a shot we could fire next tick. Skipped gun
    /// waves since the last one are reconstructed in a duel.
    #[allow(clippy::too_many_arguments)]
    pub fn fire_next_tick_wave(
        &mut self,
        opponent: &mut Opponent,
        shooter: &Shooter,
        power: f64,
        tick: Tick,
        my_state: &KinematicState,
        predictor: &MotionPredictor,
        events: &mut Vec<ExplainEvent>,
    ) {
        let last_fire_tick = self.waves.last_fire_tick();
        let fire_tick = tick + 1;
        let wave = self.new_gun_wave(opponent, shooter.location, shooter.energy, shooter, power, fire_tick, predictor, false);
        self.last_wave_fired = Some(wave);

        if shooter.enemies_alive <= 1 {
            if let Some(last) = last_fire_tick.filter(|&t| t > 0) {
                for t in last + 1..fire_tick {
                    self.interpolate_gun_wave(opponent, t, my_state, events);
                }
            }
        }
    }

    /// Wave as if the other living opponent at `source` had fired at this
    /// one, for melee data.
    #[allow(clippy::too_many_arguments)]
    pub fn fire_alt_wave(
        &mut self,
        opponent: &mut Opponent,
        source: Point,
        source_energy: f64,
        shooter: &Shooter,
        power: f64,
        tick: Tick,
        predictor: &MotionPredictor,
    ) {
        self.new_gun_wave(opponent, source, source_energy, shooter, power, tick + 1, predictor, true);
    }

    #[allow(clippy::too_many_arguments)]
    fn new_gun_wave(
        &mut self,
        opponent: &mut Opponent,
        source: Point,
        source_energy: f64,
        shooter: &Shooter,
        power: f64,
        fire_tick: Tick,
        predictor: &MotionPredictor,
        alt: bool,
    ) -> Wave {
        let scan = opponent.last_scan;
        let target = predictor.arena.translate_to_field(MotionPredictor::next_location(&scan));
        let rules = &predictor.rules;
        let accel = limit(-rules.deceleration, acceleration(scan.speed, self.previous_speed), rules.acceleration);
        let features = TargetFeatures {
            accel,
            distance: source.distance(target),
            distance_to_nearest_bot: opponent.nearest_bot_distance(source.distance_squared(target)),
            dchange_ticks: self.time_since_reverse,
            vchange_ticks: self.time_since_speed_change,
            dl8: opponent.log.displacement_distance(scan.location, scan.tick, 8),
            dl20: opponent.log.displacement_distance(scan.location, scan.tick, 20),
            dl40: opponent.log.displacement_distance(scan.location, scan.tick, 40),
            target_energy: opponent.energy,
            source_energy,
            gun_heat: shooter.gun_heat,
            enemies_alive: shooter.enemies_alive,
            last_bullet_fired_tick: shooter.last_bullet_fired_tick,
            ..Default::default()
        };
        let init = WaveInit {
            owner: opponent.name.clone(),
            source,
            target,
            fire_round: shooter.round,
            fire_tick,
            bullet_power: power,
            target_heading: scan.heading,
            target_speed: scan.speed,
            target_speed_sign: non_zero_sign(self.last_non_zero_speed),
        };
        let mut wave = Wave::new(self.waves.next_id(), init, features, *predictor);
        wave.alt = alt;
        wave.set_wall_distances(if shooter.enemies_alive <= 1 {
            self.duel_wall_distance
        } else {
            WallDistanceStyle::Direct
        });
        if shooter.energy > 0.0 {
            self.waves.add_wave(wave.clone());
        }
        wave
    }

    fn interpolate_gun_wave(
        &mut self,
        opponent: &mut Opponent,
        fire_tick: Tick,
        my_state: &KinematicState,
        events: &mut Vec<ExplainEvent>,
    ) {
        let wave = self
            .waves
            .interpolate_wave_by_fire_tick(fire_tick, my_state.heading, my_state.speed, &mut opponent.log)
            .filter(|w| w.check_wave_position(&opponent.last_scan) == WavePosition::Midair);
        events.push(ExplainEvent::WaveInterpolated {
            owner: opponent.name.clone(),
            fire_tick,
            success: wave.is_some(),
        });
        if let Some(wave) = wave {
            self.waves.add_wave(wave);
        }
    }

    /// Refresh the features of waves firing this tick and re-aim them
    /// from where we actually are.
    pub fn update_current_waves(
        &mut self,
        tick: Tick,
        my_location: Point,
        gun_heat: f64,
        last_bullet_fired_tick: Tick,
        last_scan: &KinematicState,
    ) {
        self.waves.check_current_waves(tick, |wave| {
            if wave.alt {
                return;
            }
            wave.features.gun_heat = gun_heat;
            wave.features.last_bullet_fired_tick = last_bullet_fired_tick;
            if last_scan.tick == wave.fire_tick {
                wave.reposition(my_location, last_scan.location);
            }
        });
        if let Some(current) = self.waves.waves().find(|w| w.fire_tick == tick && !w.alt) {
            self.last_wave_fired = Some(current.clone());
        }
    }

    /// Our real shot left on `tick`: its waves become firing waves and, in
    /// a duel, every strategy fires a virtual bullet along them.
    pub fn mark_firing_waves(&mut self, tick: Tick, one_v_one: bool, arbiter: &mut StrategyArbiter, arena: &Arena) {
        let views = &mut self.views;
        self.waves.check_current_waves(tick, |wave| {
            if wave.alt {
                return;
            }
            wave.firing = true;
            if one_v_one {
                for kind in StrategyKind::ALL {
                    let aim = views.aim(kind, wave, arena, true);
                    arbiter.fire_virtual_bullet(kind, wave, aim.angle);
                }
            }
        });
    }

    /// Advance every wave against the opponent's latest scan and learn from
    /// the ones that passed it.
    pub fn check_active_waves(
        &mut self,
        tick: Tick,
        last_scan: &KinematicState,
        one_v_one: bool,
        arbiter: &mut StrategyArbiter,
        events: &mut Vec<ExplainEvent>,
    ) {
        for wave_break in self.waves.check_active_waves(tick, last_scan) {
            self.process_wave_break(wave_break, tick, one_v_one, arbiter, events);
        }
    }

    fn process_wave_break(
        &mut self,
        wave_break: WaveBreak,
        tick: Tick,
        one_v_one: bool,
        arbiter: &mut StrategyArbiter,
        events: &mut Vec<ExplainEvent>,
    ) {
        let WaveBreak { wave, break_states } = wave_break;
        let Some(median) = break_states.get(break_states.len() / 2) else {
            warn!("gun wave {:?} against {} broke without break states", wave.id, wave.owner);
            return;
        };

        let intersection = wave.precise_intersection(&break_states);
        let guess_factor = match (&intersection, one_v_one) {
            (Some(intersection), true) => wave.guess_factor_precise(intersection.angle),
            (None, true) => {
                warn!("no usable intersection for gun wave {:?} against {}", wave.id, wave.owner);
                return;
            }
            (_, false) => 0.0,
        };
        let displacement = wave.displacement_vector(median.location, median.tick).unwrap_or(Point::ZERO);
        self.views.log_wave(&wave, GunSample { guess_factor, displacement }, tick, true);

        if wave.features.enemies_alive == 1 && wave.firing && !wave.alt {
            if let Some(intersection) = &intersection {
                arbiter.register_wave_break(&wave, intersection.angle, intersection.bandwidth);
            }
        }
        debug!(
            "gun wave fired {} broke over {} at guess factor {:.3}",
            wave.fire_tick, wave.owner, guess_factor
        );
        events.push(ExplainEvent::WaveBroken {
            owner: wave.owner.clone(),
            fire_tick: wave.fire_tick,
            guess_factor,
            bandwidth: intersection.map_or(0.0, |i| i.bandwidth),
            firing: wave.firing,
        });
    }

    /// Match one of our bullets that stopped at `location` to its wave and,
    /// when `log` is set, learn where the opponent was.
    pub fn process_bullet_hit(
        &mut self,
        location: Point,
        power: f64,
        tick: Tick,
        one_v_one: bool,
        log: bool,
        opponent_location: Point,
    ) -> Option<&mut Wave> {
        let filter = WaveFilter {
            only_firing: true,
            owner: None,
            power: Some(power),
        };
        let wave = self.waves.find_closest_wave(location, tick, &filter)?;
        if log {
            let displacement = wave.displacement_vector(opponent_location, tick).unwrap_or(Point::ZERO);
            let guess_factor = if one_v_one {
                wave.guess_factor_precise(absolute_bearing(wave.source, opponent_location))
            } else {
                0.0
            };
            self.views.log_wave(wave, GunSample { guess_factor, displacement }, tick, false);
        }
        Some(wave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use wavesurf_core::enums::EscapeSide;
    use wavesurf_core::rules::KinematicRules;

    fn tracker() -> GunTracker {
        GunTracker::new(&GunConfig::default()).unwrap()
    }

    fn predictor() -> MotionPredictor {
        MotionPredictor::new(Arena::default(), KinematicRules::default())
    }

    fn shooter(energy: f64) -> Shooter {
        Shooter {
            location: Point::new(400.0, 100.0),
            energy,
            gun_heat: 0.0,
            last_bullet_fired_tick: 0,
            enemies_alive: 1,
            round: 0,
        }
    }

    #[test]
    fn test_timers_reset_on_reversal() {
        let mut gun = tracker();
        gun.update_timers(8.0);
        gun.time_since_reverse = 12;
        gun.time_since_speed_change = 12;
        gun.update_timers(8.0);
        assert_eq!(gun.time_since_reverse, 12);
        gun.update_timers(-2.0);
        assert_eq!(gun.time_since_reverse, 0);
        assert_eq!(gun.time_since_speed_change, 0);
    }

    #[test]
    fn test_rammer_detection() {
        let mut gun = tracker();
        let previous = KinematicState::at(Point::new(400.0, 400.0), 1);
        // Due North of us and heading South.
        let state = KinematicState::new(Point::new(400.0, 392.0), std::f64::consts::PI, 8.0, 2);
        gun.on_scan(Some(&previous), &state, 0.0);
        assert!(gun.is_rammer());
    }

    #[test]
    fn test_no_wave_added_without_energy() {
        let mut gun = tracker();
        let mut opponent = Opponent::new("finch", KinematicState::at(Point::new(400.0, 400.0), 5), 100.0);
        let mut events = Vec::new();
        let me = KinematicState::at(Point::new(400.0, 100.0), 5);
        gun.fire_next_tick_wave(&mut opponent, &shooter(0.0), 1.95, 5, &me, &predictor(), &mut events);
        assert!(gun.waves.is_empty());
        assert_eq!(gun.last_wave_fired.as_ref().map(|w| w.fire_tick), Some(6));

        gun.fire_next_tick_wave(&mut opponent, &shooter(50.0), 1.95, 5, &me, &predictor(), &mut events);
        assert_eq!(gun.waves.len(), 1);
    }

    #[test]
    fn test_duel_wall_distance_style_from_config() {
        let config = GunConfig {
            duel_wall_distance: WallDistanceStyle::PreciseMea,
            ..Default::default()
        };
        let mut gun = GunTracker::new(&config).unwrap();
        let scan = KinematicState::new(Point::new(400.0, 400.0), std::f64::consts::FRAC_PI_2, 8.0, 5);
        let mut opponent = Opponent::new("finch", scan, 100.0);
        let me = KinematicState::at(Point::new(400.0, 100.0), 5);
        let mut events = Vec::new();
        gun.fire_next_tick_wave(&mut opponent, &shooter(50.0), 1.95, 5, &me, &predictor(), &mut events);

        let wave = gun.last_wave_fired.as_ref().unwrap();
        let forward = wave.precise_escape_angle(EscapeSide::Positive) / wave.max_escape_angle();
        let reverse = wave.precise_escape_angle(EscapeSide::Negative) / wave.max_escape_angle();
        assert_abs_diff_eq!(wave.features.wall_distance, forward, epsilon = 1e-12);
        assert_abs_diff_eq!(wave.features.rev_wall_distance, reverse, epsilon = 1e-12);
        assert!(forward > 0.0);
    }

    #[test]
    fn test_marked_waves_fire_virtual_bullets() {
        let mut gun = tracker();
        let mut opponent = Opponent::new("finch", KinematicState::at(Point::new(400.0, 400.0), 5), 100.0);
        let me = KinematicState::at(Point::new(400.0, 100.0), 5);
        let mut events = Vec::new();
        gun.fire_next_tick_wave(&mut opponent, &shooter(50.0), 1.95, 5, &me, &predictor(), &mut events);

        let mut arbiter = StrategyArbiter::new();
        gun.mark_firing_waves(6, true, &mut arbiter, &Arena::default());
        assert!(gun.waves.waves().all(|w| w.firing));
        for kind in StrategyKind::ALL {
            assert_eq!(arbiter.stats(kind, "finch").map(|s| s.in_flight()), Some(1));
        }
    }

    #[test]
    fn test_alt_wave_from_another_opponent() {
        let mut gun = tracker();
        let scan = KinematicState::new(Point::new(400.0, 400.0), std::f64::consts::FRAC_PI_2, 8.0, 5);
        let mut opponent = Opponent::new("finch", scan, 100.0);
        opponent.bot_distances_sq.insert("wren".into(), 150.0 * 150.0);
        let me = KinematicState::at(Point::new(400.0, 100.0), 5);
        let shooter = Shooter {
            enemies_alive: 3,
            ..shooter(80.0)
        };
        let mut events = Vec::new();
        gun.fire_next_tick_wave(&mut opponent, &shooter, 1.95, 5, &me, &predictor(), &mut events);
        let other = Point::new(700.0, 400.0);
        gun.fire_alt_wave(&mut opponent, other, 60.0, &shooter, 1.95, 5, &predictor());

        assert_eq!(gun.waves.len(), 2);
        let alt = gun.waves.waves().find(|w| w.alt).unwrap();
        assert_eq!(alt.source, other);
        assert_eq!(alt.fire_tick, 6);
        assert_eq!(alt.features.source_energy, 60.0);
        assert_abs_diff_eq!(alt.features.distance_to_nearest_bot, 150.0, epsilon = 1e-9);
        // The next shot is still aimed along our own wave, and melee skips
        // interpolation.
        assert_eq!(gun.last_wave_fired.as_ref().map(|w| w.source), Some(shooter.location));
        assert!(events.is_empty());

        gun.mark_firing_waves(6, false, &mut StrategyArbiter::new(), &Arena::default());
        assert!(gun.waves.waves().all(|w| w.firing != w.alt));
    }
}
