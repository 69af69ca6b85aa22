//! Movement context kept against one opponent: the waves we believe it
//! fired at us, the surf views learned from them, its hit rate and an
//! estimate of its gun.

use log::{debug, warn};

use wavesurf_ai::{FeatureFormula, HitStats, Stamp, StatisticalView, SurfConfig, SurfableWaves, ViewConfig};
use wavesurf_core::arena::Arena;
use wavesurf_core::constants::BOT_WIDTH;
use wavesurf_core::enums::WavePosition;
use wavesurf_core::events::ExplainEvent;
use wavesurf_core::geometry::absolute_bearing;
use wavesurf_core::rules::KinematicRules;
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_core::WavesurfError;
use wavesurf_waves::{
    cast_bullet_shadows, FiredBullet, MotionPredictor, TargetFeatures, Wave, WaveBreak, WaveFilter, WaveInit,
    WaveManager,
};

use crate::components::Opponent;
use crate::own_state::OwnState;

/// Power assumed before any enemy shot was seen.
const DEFAULT_BULLET_POWER: f64 = 1.9;

/// Most past shots averaged when guessing the next power.
const POWER_NEIGHBORS: usize = 20;

/// Weights of distance, enemy energy and our energy in the power guess.
const POWER_WEIGHTS: [f64; 3] = [3.0, 5.0, 1.0];

/// Energy drops that can be a shot.
const MIN_FIRE_DROP: f64 = 0.0999;
const MAX_FIRE_DROP: f64 = 3.0001;

/// Gun heat at or below which the opponent can fire next tick.
const IMAGINARY_WAVE_GUN_HEAT: f64 = 0.100_000_1;

/// Average distance assumed before an opponent was ever tracked.
const INITIAL_TOTAL_DISTANCE: f64 = 500.0;

/// Damage credited to every opponent in the melee damage factor.
const BASE_DAMAGE: f64 = 10.0;

/// Enemy guns are still hot from the round start until this tick.
const EARLIEST_FIRE_TICK: Tick = 30;

const EPSILON: f64 = 1e-4;

/// Bounds on wall damage hidden in an energy drop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WallHitDamage {
    pub min: f64,
    pub max: f64,
}

/// The opponent's waves plus the imaginary wave for the shot it has not
/// fired yet.
#[derive(Debug, Clone, Default)]
pub struct EnemyWaves {
    pub manager: WaveManager,
    imaginary_fire_tick: Option<Tick>,
    imaginary_index: Option<usize>,
}

impl EnemyWaves {
    pub fn imaginary(&self) -> Option<&Wave> {
        self.manager.wave_by_fire_tick(self.imaginary_fire_tick?)
    }

    fn clear_imaginary(&mut self) {
        self.imaginary_fire_tick = None;
        self.imaginary_index = None;
    }
}

impl SurfableWaves for EnemyWaves {
    fn surfable_wave(&self, index: usize, state: &KinematicState) -> Option<&Wave> {
        self.manager
            .find_surfable_wave(index, state, WavePosition::BreakingCenter)
            .or_else(|| (self.imaginary_index == Some(index)).then(|| self.imaginary()).flatten())
    }
}

#[derive(Debug, Clone)]
pub struct MoveTracker {
    pub waves: EnemyWaves,
    pub views: Vec<StatisticalView<f64>>,
    pub stats: HitStats,
    power_view: StatisticalView<f64>,
    pub last_power: f64,
    pub last_fire_tick: Tick,
    pub wall_hit: WallHitDamage,
    /// Hitting a wall never cost this opponent energy.
    pub wall_damage_immune: bool,
    pub damage_taken: f64,
    pub total_power: f64,
    pub times_hit: u32,
    /// Summed distance to us over every tick both of us were alive.
    pub total_distance: f64,
    pub ticks_alive_together: u32,
}

impl MoveTracker {
    pub fn new(config: &SurfConfig) -> Result<Self, WavesurfError> {
        let views = config
            .views
            .iter()
            .cloned()
            .map(StatisticalView::new)
            .collect::<Result<_, _>>()?;
        let power_config = ViewConfig {
            name: "bullet power".into(),
            formula: FeatureFormula::Simple,
            k: POWER_NEIGHBORS,
            ..Default::default()
        };
        Ok(Self {
            waves: EnemyWaves::default(),
            views,
            stats: HitStats::default(),
            power_view: StatisticalView::with_weights(power_config, POWER_WEIGHTS.to_vec())?,
            last_power: 0.0,
            last_fire_tick: 0,
            wall_hit: WallHitDamage::default(),
            wall_damage_immune: false,
            damage_taken: 0.0,
            total_power: 0.0,
            times_hit: 0,
            total_distance: INITIAL_TOTAL_DISTANCE,
            ticks_alive_together: 1,
        })
    }

    pub fn init_round(&mut self) {
        self.waves.manager.reset_round();
        self.waves.clear_imaginary();
        self.stats.reset_round();
        self.last_power = 0.0;
        self.last_fire_tick = 0;
        self.wall_hit = WallHitDamage::default();
        self.clear_neighbor_cache();
    }

    pub fn clear_neighbor_cache(&mut self) {
        for view in &mut self.views {
            view.clear_cache();
        }
    }

    /// Estimated heat of the opponent's gun at `tick`.
    pub fn gun_heat(&self, tick: Tick, rules: &KinematicRules) -> f64 {
        let heat = if tick <= EARLIEST_FIRE_TICK {
            rules.initial_gun_heat - tick as f64 * rules.gun_cooling_rate
        } else {
            rules.gun_heat(self.last_power) - (tick - self.last_fire_tick) as f64 * rules.gun_cooling_rate
        };
        round6(heat.max(0.0))
    }

    /// One more tick alive together at `distance` from us.
    pub fn track_distance(&mut self, distance: f64) {
        self.total_distance += distance;
        self.ticks_alive_together += 1;
    }

    /// Damage done to us, scaled by the opponent's average distance: a bot
    /// that hurts us from afar is the bigger threat.
    pub fn damage_factor(&self) -> f64 {
        (self.damage_taken + BASE_DAMAGE) * self.total_distance / self.ticks_alive_together as f64
    }

    pub fn average_bullet_power(&self) -> Option<f64> {
        (self.times_hit > 0).then(|| self.total_power / self.times_hit as f64)
    }

    /// Wall damage that may hide in the energy change between `previous`
    /// and `state`.
    pub fn estimate_wall_hit(
        &mut self,
        previous: &KinematicState,
        state: &KinematicState,
        energy_change: f64,
        arena: &Arena,
        rules: &KinematicRules,
    ) {
        self.wall_hit = WallHitDamage::default();
        let stopped_at_wall = !self.wall_damage_immune
            && state.tick - previous.tick == 1
            && (previous.speed - state.speed).abs() > 2.0
            && state.speed.abs() < EPSILON
            && arena.distance_to_wall(state.location) < EPSILON;
        if !stopped_at_wall {
            return;
        }
        if energy_change.abs() < EPSILON {
            self.wall_damage_immune = true;
            return;
        }
        let speed = previous.speed.abs();
        self.wall_hit = WallHitDamage {
            min: rules.wall_hit_damage(speed - rules.deceleration),
            max: rules.wall_hit_damage((speed + rules.acceleration).min(rules.max_speed)),
        };
    }

    /// Guess the power of the opponent's next shot from the powers it used
    /// in similar situations.
    pub fn guess_bullet_power(&self, distance: f64, enemy_energy: f64, my_energy: f64) -> f64 {
        let shots = self.power_view.len();
        if shots == 0 {
            return DEFAULT_BULLET_POWER;
        }
        let k = POWER_NEIGHBORS.min(shots.div_ceil(3));
        let neighbors = self.power_view.nearest(&power_point(distance, enemy_energy, my_energy), k);
        let total: f64 = neighbors.iter().map(|n| n.value).sum();
        round6(total / neighbors.len() as f64)
    }

    /// Scan-time bookkeeping in a duel: detect a shot from the energy drop,
    /// add the wave for a shot next tick and relocate the wave of a shot
    /// just detected.
    #[allow(clippy::too_many_arguments)]
    pub fn update_enemy_waves(
        &mut self,
        opponent: &mut Opponent,
        previous_energy: f64,
        own: &mut OwnState,
        round: u32,
        tick: Tick,
        waves_to_surf: usize,
        predictor: &MotionPredictor,
        events: &mut Vec<ExplainEvent>,
    ) {
        let rules = &predictor.rules;
        let energy_drop = previous_energy - opponent.energy - self.wall_hit.max;
        let detected = energy_drop > MIN_FIRE_DROP && energy_drop < MAX_FIRE_DROP && self.gun_heat(tick, rules) < EPSILON;

        own.update_timers();
        let power = self.guess_bullet_power(opponent.distance, opponent.energy, own.energy);
        self.new_move_wave(opponent, own, power, round, tick, predictor);
        self.update_imaginary_wave(opponent, &own.state, tick, waves_to_surf, predictor);
        if detected && tick > EARLIEST_FIRE_TICK {
            self.update_firing_wave(opponent, own, energy_drop, round, tick, &predictor.arena, events);
        }
    }

    fn new_move_wave(
        &mut self,
        opponent: &Opponent,
        own: &mut OwnState,
        power: f64,
        round: u32,
        tick: Tick,
        predictor: &MotionPredictor,
    ) {
        let me = own.state;
        let source = predictor.arena.translate_to_field(MotionPredictor::next_location(&opponent.last_scan));
        let features = TargetFeatures {
            accel: own.acceleration(&predictor.rules),
            distance: source.distance(me.location),
            dchange_ticks: own.time_since_reverse,
            vchange_ticks: own.time_since_speed_change,
            dl8: own.log.displacement_distance(me.location, tick, 8),
            dl20: own.log.displacement_distance(me.location, tick, 20),
            dl40: own.log.displacement_distance(me.location, tick, 40),
            target_energy: own.energy,
            source_energy: opponent.energy,
            ..Default::default()
        };
        let init = WaveInit {
            owner: opponent.name.clone(),
            source,
            target: me.location,
            fire_round: round,
            fire_tick: tick + 1,
            bullet_power: power,
            target_heading: me.heading,
            target_speed: me.speed,
            target_speed_sign: own.speed_sign(),
        };
        let mut wave = Wave::new(self.waves.manager.next_id(), init, features, *predictor);
        wave.abs_bearing = absolute_bearing(opponent.last_scan.location, me.location);
        self.waves.manager.add_wave(wave);
    }

    /// Pick the wave to surf in place of a shot the opponent can fire now
    /// or next tick, when there are fewer real waves than we surf.
    pub fn update_imaginary_wave(
        &mut self,
        opponent: &mut Opponent,
        me: &KinematicState,
        tick: Tick,
        waves_to_surf: usize,
        predictor: &MotionPredictor,
    ) {
        let manager = &self.waves.manager;
        self.waves.imaginary_index = (0..waves_to_surf)
            .find(|&index| manager.find_surfable_wave(index, me, WavePosition::BreakingCenter).is_none());

        let heat = self.gun_heat(tick, &predictor.rules);
        if self.waves.imaginary_index.is_none() || heat >= IMAGINARY_WAVE_GUN_HEAT {
            return;
        }
        self.clear_neighbor_cache();

        let fires_now = heat < 1e-7 && self.waves.manager.len() >= 2;
        let (fire_tick, aimed_from) = if fires_now {
            (tick, opponent.state_at(tick - 1).location)
        } else {
            (tick + 1, opponent.last_scan.location)
        };
        let Some(wave) = self.waves.manager.wave_by_fire_tick_mut(fire_tick) else {
            self.waves.imaginary_fire_tick = None;
            return;
        };
        if !fires_now {
            let mut source = predictor.arena.translate_to_field(MotionPredictor::next_location(&opponent.last_scan));
            if source.distance(me.location) < BOT_WIDTH {
                source = opponent.last_scan.location;
            }
            let target = wave.target;
            wave.reposition(source, target);
        }
        wave.features.wall_distance = wave.orbital_wall_distance_from(aimed_from, wave.orbit_direction);
        wave.features.rev_wall_distance = wave.orbital_wall_distance_from(aimed_from, -wave.orbit_direction);
        wave.abs_bearing = absolute_bearing(aimed_from, wave.target);
        self.waves.imaginary_fire_tick = Some(fire_tick);
    }

    /// The opponent fired last tick with `power`: make that wave a firing
    /// wave, re-aimed from where the opponent really was.
    #[allow(clippy::too_many_arguments)]
    fn update_firing_wave(
        &mut self,
        opponent: &mut Opponent,
        own: &mut OwnState,
        power: f64,
        round: u32,
        tick: Tick,
        arena: &Arena,
        events: &mut Vec<ExplainEvent>,
    ) {
        let fire_tick = tick - 1;
        if self.waves.manager.wave_by_fire_tick(fire_tick).is_none() {
            let scan = opponent.last_scan;
            let interpolated = self
                .waves
                .manager
                .interpolate_wave_by_fire_tick(fire_tick, scan.heading, scan.speed, &mut own.log);
            warn!(
                "wave fired by {} on tick {fire_tick} was never created, interpolation {}",
                opponent.name,
                if interpolated.is_some() { "succeeded" } else { "failed" }
            );
            events.push(ExplainEvent::WaveInterpolated {
                owner: opponent.name.clone(),
                fire_tick,
                success: interpolated.is_some(),
            });
            let Some(mut wave) = interpolated else {
                return;
            };
            wave.firing = true;
            self.waves.manager.add_wave(wave);
        }

        let aimed_from = opponent.state_at(tick - 2).location;
        let source = opponent.state_at(tick - 1).location;
        let target = own.log.get(tick - 2).map_or(own.location(), |s| s.location);
        let Some(wave) = self.waves.manager.wave_by_fire_tick_mut(fire_tick) else {
            return;
        };
        wave.reposition(source, target);
        wave.abs_bearing = absolute_bearing(aimed_from, target);
        wave.set_bullet_power(power);
        wave.features.wall_distance = wave.orbital_wall_distance_from(aimed_from, wave.orbit_direction);
        wave.features.rev_wall_distance = wave.orbital_wall_distance_from(aimed_from, -wave.orbit_direction);
        wave.firing = true;
        for bullet in &own.fired_bullets {
            cast_bullet_shadows(wave, bullet, arena);
        }
        let point = power_point(wave.features.distance, wave.features.source_energy, wave.features.target_energy);
        debug!("{} fired power {power:.2} on tick {fire_tick}", opponent.name);

        if self.waves.imaginary_fire_tick.is_some() {
            self.clear_neighbor_cache();
        }
        self.waves.clear_imaginary();
        self.last_power = power;
        self.last_fire_tick = fire_tick;
        self.power_view.log(point, power, Stamp::new(round, tick));
    }

    /// Advance every wave against our location and learn from the firing
    /// waves that passed us.
    pub fn check_active_waves(&mut self, tick: Tick, my_location: Point, round: u32, events: &mut Vec<ExplainEvent>) {
        let state = KinematicState::at(my_location, tick);
        for WaveBreak { wave, break_states } in self.waves.manager.check_active_waves(tick, &state) {
            if !wave.firing {
                continue;
            }
            let Some(intersection) = wave.precise_intersection(&break_states) else {
                warn!("no usable intersection for wave fired by {} on {}", wave.owner, wave.fire_tick);
                continue;
            };
            let guess_factor = wave.guess_factor(intersection.angle);
            for view in self.views.iter_mut().filter(|v| v.config().log_visits) {
                view.log_wave(&wave, guess_factor, Stamp::new(round, tick));
            }
            self.stats.record_break(&wave, &intersection);
            debug!(
                "wave fired by {} on {} broke at guess factor {guess_factor:.3}",
                wave.owner, wave.fire_tick
            );
            events.push(ExplainEvent::WaveBroken {
                owner: wave.owner.clone(),
                fire_tick: wave.fire_tick,
                guess_factor,
                bandwidth: intersection.bandwidth,
                firing: true,
            });
        }
    }

    /// Match an enemy bullet that stopped at `location` to its wave and log
    /// where it was aimed.
    pub fn process_bullet(&mut self, location: Point, power: f64, owner: &str, tick: Tick, round: u32) -> Option<&mut Wave> {
        let filter = WaveFilter {
            only_firing: true,
            owner: Some(owner),
            power: Some(power),
        };
        let wave = self.waves.manager.find_closest_wave(location, tick, &filter)?;
        let guess_factor = wave.guess_factor_at(location);
        for view in self.views.iter_mut().filter(|v| v.config().log_bullet_hits) {
            view.log_wave(wave, guess_factor, Stamp::new(round, tick));
        }
        Some(wave)
    }

    /// Shadow every firing wave with one of our new bullets.
    pub fn cast_shadows(&mut self, bullet: &FiredBullet, arena: &Arena) {
        self.waves.manager.for_each_wave_mut(|wave| {
            if wave.firing {
                cast_bullet_shadows(wave, bullet, arena);
            }
        });
    }

    /// Rebuild shadows after one of our bullets died early.
    pub fn reset_bullet_shadows(&mut self, bullets: &[FiredBullet], arena: &Arena) {
        self.waves.manager.for_each_wave_mut(|wave| {
            if wave.firing {
                wave.shadows.clear();
                for bullet in bullets {
                    cast_bullet_shadows(wave, bullet, arena);
                }
            }
        });
    }
}

fn power_point(distance: f64, enemy_energy: f64, my_energy: f64) -> Vec<f64> {
    vec![
        distance.min(800.0) / 800.0,
        enemy_energy.min(125.0) / 125.0,
        my_energy.min(125.0) / 125.0,
    ]
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
