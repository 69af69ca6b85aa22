//! Lifecycle registry of the waves tracked against one body.

use log::warn;

use wavesurf_core::constants::{POWER_MATCH_TOLERANCE, WAVE_MATCH_THRESHOLD};
use wavesurf_core::enums::WavePosition;
use wavesurf_core::geometry::{non_zero_sign, project};
use wavesurf_core::state_log::{Interpolator, KinematicLog};
use wavesurf_core::types::{KinematicState, Point, Tick};

use crate::wave::{TargetFeatures, Wave, WaveId, WaveInit};

/// A wave that finished passing its target, with every tick it was
/// breaking over the target.
#[derive(Debug, Clone)]
pub struct WaveBreak {
    pub wave: Wave,
    pub break_states: Vec<KinematicState>,
}

/// Which waves an observed impact may be matched against.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveFilter<'a> {
    pub only_firing: bool,
    pub owner: Option<&'a str>,
    pub power: Option<f64>,
}

impl WaveFilter<'_> {
    fn accepts(&self, wave: &Wave) -> bool {
        !wave.alt
            && (!self.only_firing || wave.firing)
            && self
                .power
                .map_or(true, |p| (p - wave.bullet_power()).abs() < POWER_MATCH_TOLERANCE)
            && self
                .owner
                .map_or(true, |owner| owner.is_empty() || owner == wave.owner)
    }
}

#[derive(Debug, Clone)]
struct TrackedWave {
    wave: Wave,
    states: KinematicLog,
}

/// Waves in the order they were added, each with the target states
/// observed while it was active.
#[derive(Debug, Clone, Default)]
pub struct WaveManager {
    waves: Vec<TrackedWave>,
    next_id: u64,
}

impl WaveManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_round(&mut self) {
        self.waves.clear();
    }

    /// Fresh identity for a wave about to be added.
    pub fn next_id(&mut self) -> WaveId {
        self.next_id += 1;
        WaveId(self.next_id)
    }

    pub fn add_wave(&mut self, wave: Wave) {
        self.waves.push(TrackedWave {
            wave,
            states: KinematicLog::new(),
        });
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn waves(&self) -> impl Iterator<Item = &Wave> {
        self.waves.iter().map(|t| &t.wave)
    }

    pub fn for_each_wave_mut(&mut self, mut f: impl FnMut(&mut Wave)) {
        for tracked in &mut self.waves {
            f(&mut tracked.wave);
        }
    }

    /// Visit waves fired this very tick.
    pub fn check_current_waves(&mut self, tick: Tick, mut f: impl FnMut(&mut Wave)) {
        for tracked in &mut self.waves {
            if tracked.wave.fire_tick == tick {
                f(&mut tracked.wave);
            }
        }
    }

    /// Record `state` against every wave and remove the ones that have
    /// passed it. Does nothing unless `state` is from `tick`.
    pub fn check_active_waves(&mut self, tick: Tick, state: &KinematicState) -> Vec<WaveBreak> {
        if state.tick != tick {
            return Vec::new();
        }

        let mut breaks = Vec::new();
        let mut index = 0;
        while index < self.waves.len() {
            let tracked = &mut self.waves[index];
            tracked.states.add(*state);
            let position = tracked.wave.check_wave_position(state);
            let observed = tracked.wave.observe_position(position);
            debug_assert!(observed.is_ok(), "wave {:?} from {}: {observed:?}", tracked.wave.id, tracked.wave.owner);
            if let Err(err) = observed {
                warn!("skipping wave {:?} from {}: {err}", tracked.wave.id, tracked.wave.owner);
                index += 1;
                continue;
            }

            if position == WavePosition::Gone {
                let mut tracked = self.waves.remove(index);
                let break_states = Self::break_states(&mut tracked, tick);
                breaks.push(WaveBreak {
                    wave: tracked.wave,
                    break_states,
                });
            } else {
                index += 1;
            }
        }
        breaks
    }

    fn break_states(tracked: &mut TrackedWave, tick: Tick) -> Vec<KinematicState> {
        (tracked.wave.fire_tick..tick)
            .filter_map(|t| tracked.states.get(t))
            .filter(|s| tracked.wave.check_wave_position(s).is_breaking())
            .collect()
    }

    /// The wave whose front is nearest `location` at `tick`, within the
    /// match threshold.
    pub fn find_closest_wave(&mut self, location: Point, tick: Tick, filter: &WaveFilter) -> Option<&mut Wave> {
        let mut best: Option<(usize, f64)> = None;
        for (index, tracked) in self.waves.iter().enumerate() {
            let wave = &tracked.wave;
            if !filter.accepts(wave) {
                continue;
            }
            let dist_sq = wave.source.distance_squared(location);
            let traveled = wave.distance_traveled(tick);
            let outer = traveled + WAVE_MATCH_THRESHOLD;
            let inner = (traveled - WAVE_MATCH_THRESHOLD).max(0.0);
            if dist_sq < outer * outer && dist_sq > inner * inner {
                let miss = (dist_sq.sqrt() - traveled).abs();
                if best.map_or(true, |(_, d)| miss < d) {
                    best = Some((index, miss));
                }
            }
        }
        best.map(|(index, _)| &mut self.waves[index].wave)
    }

    /// The `index`-th firing wave, oldest first, that has not been resolved
    /// by an impact and has not reached `unsurfable` against `state`.
    pub fn find_surfable_wave(
        &self,
        index: usize,
        state: &KinematicState,
        unsurfable: WavePosition,
    ) -> Option<&Wave> {
        self.waves
            .iter()
            .map(|t| &t.wave)
            .filter(|w| w.firing && !w.processed_bullet_hit())
            .filter(|w| w.check_wave_position_with(state, false, Some(unsurfable)) < unsurfable)
            .nth(index)
    }

    pub fn wave_by_fire_tick(&self, fire_tick: Tick) -> Option<&Wave> {
        self.waves().find(|w| w.fire_tick == fire_tick)
    }

    pub fn wave_by_fire_tick_mut(&mut self, fire_tick: Tick) -> Option<&mut Wave> {
        self.waves
            .iter_mut()
            .map(|t| &mut t.wave)
            .find(|w| w.fire_tick == fire_tick)
    }

    /// Fire tick of the newest non-alt wave.
    pub fn last_fire_tick(&self) -> Option<Tick> {
        self.waves().filter(|w| !w.alt).map(|w| w.fire_tick).max()
    }

    /// Reconstruct the wave that should exist for `fire_tick`.
    ///
    /// Blends the nearest earlier and later non-alt waves when both exist,
    /// otherwise extrapolates the one that does, moving its source along
    /// `source_heading` at `source_speed`. `target_log` supplies the
    /// target's displacement history. The result is not added.
    pub fn interpolate_wave_by_fire_tick(
        &mut self,
        fire_tick: Tick,
        source_heading: f64,
        source_speed: f64,
        target_log: &mut KinematicLog,
    ) -> Option<Wave> {
        let mut before: Option<&Wave> = None;
        let mut after: Option<&Wave> = None;
        for wave in self.waves().filter(|w| !w.alt) {
            if wave.fire_tick < fire_tick && before.map_or(true, |b| wave.fire_tick > b.fire_tick) {
                before = Some(wave);
            }
            if wave.fire_tick > fire_tick && after.map_or(true, |a| wave.fire_tick < a.fire_tick) {
                after = Some(wave);
            }
        }

        let id = WaveId(self.next_id + 1);
        let wave = match (before, after) {
            (None, None) => None,
            (Some(base), None) | (None, Some(base)) => Some(Self::extrapolate(
                base,
                id,
                fire_tick - base.fire_tick,
                source_heading,
                source_speed,
            )),
            (Some(first), Some(second)) => Self::blend(first, second, id, fire_tick, target_log),
        }?;
        self.next_id += 1;
        Some(wave)
    }

    fn blend(first: &Wave, second: &Wave, id: WaveId, fire_tick: Tick, log: &mut KinematicLog) -> Option<Wave> {
        let interpolator = Interpolator::new(fire_tick, first.fire_tick, second.fire_tick).ok()?;
        let source = interpolator.location(first.source, second.source);
        let target = interpolator.location(first.target, second.target);
        let target_speed = interpolator.avg(first.target_speed, second.target_speed);
        let target_speed_sign = if non_zero_sign(target_speed) == non_zero_sign(first.target_speed) {
            first.target_speed_sign
        } else {
            second.target_speed_sign
        };

        let (f1, f2) = (&first.features, &second.features);
        let rules = first.predictor().rules;
        let mut last_bullet_fired_tick = f1.last_bullet_fired_tick;
        let mut gun_heat = f1.gun_heat - (fire_tick - first.fire_tick) as f64 * rules.gun_cooling_rate;
        if gun_heat <= 0.0 {
            last_bullet_fired_tick = first.fire_tick + (f1.gun_heat / rules.gun_cooling_rate).ceil() as Tick;
            gun_heat = (f2.gun_heat + (second.fire_tick - fire_tick) as f64 * rules.gun_cooling_rate)
                % rules.max_gun_heat();
        }

        let features = TargetFeatures {
            accel: interpolator.avg(f1.accel, f2.accel),
            distance: source.distance(target),
            distance_to_nearest_bot: interpolator.avg(f1.distance_to_nearest_bot, f2.distance_to_nearest_bot),
            dchange_ticks: interpolator.timer(f1.dchange_ticks, f2.dchange_ticks),
            vchange_ticks: interpolator.timer(f1.vchange_ticks, f2.vchange_ticks),
            wall_distance: interpolator.avg(f1.wall_distance, f2.wall_distance),
            rev_wall_distance: interpolator.avg(f1.rev_wall_distance, f2.rev_wall_distance),
            dl8: log.displacement_distance(target, fire_tick, 8),
            dl20: log.displacement_distance(target, fire_tick, 20),
            dl40: log.displacement_distance(target, fire_tick, 40),
            target_energy: interpolator.avg(f1.target_energy, f2.target_energy),
            source_energy: interpolator.avg(f1.source_energy, f2.source_energy),
            gun_heat,
            enemies_alive: f2.enemies_alive,
            last_bullet_fired_tick,
        };

        let init = WaveInit {
            owner: first.owner.clone(),
            source,
            target,
            fire_round: first.fire_round,
            fire_tick,
            bullet_power: interpolator.avg(first.bullet_power(), second.bullet_power()),
            target_heading: interpolator.heading(first.target_heading, second.target_heading),
            target_speed,
            target_speed_sign,
        };
        Some(Wave::new(id, init, features, *first.predictor()))
    }

    fn extrapolate(base: &Wave, id: WaveId, offset: Tick, source_heading: f64, source_speed: f64) -> Wave {
        let arena = base.predictor().arena;
        let source = arena.translate_to_field(project(base.source, source_heading, source_speed * offset as f64));
        let target = arena.translate_to_field(project(
            base.target,
            base.target_heading,
            base.target_speed * offset as f64,
        ));

        let mut wave = base.clone();
        wave.id = id;
        wave.fire_tick += offset;
        wave.reposition(source, target);
        wave.features.distance = source.distance(target);
        wave.firing = false;
        wave.hit_by_bullet = false;
        wave.bullet_hit_bullet = false;
        wave.shadows.clear();
        wave
    }
}
