//! Aim strategies: turning an opponent's logged wave outcomes into a
//! firing angle for a new wave.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use wavesurf_core::arena::Arena;
use wavesurf_core::constants::{FIRING_ANGLES, MIN_NEIGHBOR_DISTANCE};
use wavesurf_core::enums::{EscapeSide, StrategyKind, WallDistanceStyle};
use wavesurf_core::geometry::{
    absolute_bearing, bot_width_aim_angle, firing_angle_offsets, normal_absolute_angle, normal_relative_angle,
};
use wavesurf_core::types::{Point, Tick};
use wavesurf_core::WavesurfError;
use wavesurf_waves::{Wave, WaveId};

use crate::features::trip_hammer_weights;
use crate::knn::{Neighbor, Stamp, StatisticalView};
use crate::profiles::{anti_surfer_views, main_gun_view, melee_gun_view, ViewConfig};

/// Melee view size per neighbor the melee aim may ask for. Smaller views
/// sit the melee aim out.
const MELEE_POINTS_PER_NEIGHBOR: usize = 10;

/// Neighbors shared across all opponents in the melee aim.
const MELEE_NEIGHBORS: usize = 100;

/// Tuning of the gun side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GunConfig {
    /// Candidate angles evaluated across the escape range.
    pub firing_angles: usize,
    /// Wave breaks needed before virtual gun ratings are trusted.
    pub knn_data_threshold: usize,
    pub main_view: ViewConfig,
    pub anti_surfer_views: Vec<ViewConfig>,
    pub melee_view: ViewConfig,
    pub base_power: f64,
    /// Power used up close or against rammers.
    pub close_power: f64,
    pub close_distance: f64,
    /// Beyond this distance power drops as our energy runs low.
    pub power_down_distance: f64,
    /// How duel gun waves measure the opponent's room to the walls. Melee
    /// waves always measure along the heading.
    pub duel_wall_distance: WallDistanceStyle,
}

impl Default for GunConfig {
    fn default() -> Self {
        Self {
            firing_angles: FIRING_ANGLES,
            knn_data_threshold: 9,
            main_view: main_gun_view(),
            anti_surfer_views: anti_surfer_views(),
            melee_view: melee_gun_view(),
            base_power: 1.95,
            close_power: 2.95,
            close_distance: 150.0,
            power_down_distance: 325.0,
            duel_wall_distance: WallDistanceStyle::Orbital,
        }
    }
}

impl GunConfig {
    pub fn validate(&self) -> Result<(), WavesurfError> {
        if self.firing_angles < 3 {
            return Err(WavesurfError::config("gun.firing_angles", "need at least 3 candidate angles"));
        }
        self.main_view.validate()?;
        self.melee_view.validate()?;
        for view in &self.anti_surfer_views {
            view.validate()?;
        }
        for (field, power) in [("gun.base_power", self.base_power), ("gun.close_power", self.close_power)] {
            if !(power.is_finite() && power > 0.0) {
                return Err(WavesurfError::config(field, format!("must be positive, got {power}")));
            }
        }
        Ok(())
    }
}

/// Where an opponent ended up relative to one of our waves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GunSample {
    pub guess_factor: f64,
    /// Per-tick displacement, heading and orbit invariant.
    pub displacement: Point,
}

/// Chosen angle plus the density of every candidate offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AimResult {
    pub angle: f64,
    /// (offset from head-on, density) per candidate.
    pub curve: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Copy)]
enum Kernel {
    /// Compact support, `(1 - |u|^3)` inside one bandwidth.
    Tricube,
    Gaussian,
}

impl Kernel {
    fn density(self, u: f64) -> f64 {
        match self {
            Kernel::Tricube if u.abs() < 1.0 => 1.0 - u.abs().powi(3),
            Kernel::Tricube => 0.0,
            Kernel::Gaussian => (-0.5 * u * u).exp(),
        }
    }
}

/// Gun data kept per opponent: the views every strategy aims from.
#[derive(Debug, Clone)]
pub struct GunViews {
    firing_angles: usize,
    main: StatisticalView<GunSample>,
    anti_surfer: Vec<StatisticalView<GunSample>>,
    melee: StatisticalView<GunSample>,
    aim_cache: HashMap<(StrategyKind, WaveId), AimResult>,
    wave_breaks: usize,
}

impl GunViews {
    pub fn new(config: &GunConfig) -> Result<Self, WavesurfError> {
        let anti_surfer = config
            .anti_surfer_views
            .iter()
            .cloned()
            .map(StatisticalView::new)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            firing_angles: config.firing_angles,
            main: StatisticalView::new(config.main_view.clone())?,
            anti_surfer,
            melee: StatisticalView::new(config.melee_view.clone())?,
            aim_cache: HashMap::new(),
            wave_breaks: 0,
        })
    }

    /// Waves that broke over the opponent and were logged as visits.
    pub fn wave_breaks(&self) -> usize {
        self.wave_breaks
    }

    pub fn main_view(&self) -> &StatisticalView<GunSample> {
        &self.main
    }

    pub fn anti_surfer_views(&self) -> &[StatisticalView<GunSample>] {
        &self.anti_surfer
    }

    pub fn melee_view(&self) -> &StatisticalView<GunSample> {
        &self.melee
    }

    /// Log an outcome into every view that accepts it. `is_visit` marks a
    /// wave break rather than a bullet hit.
    pub fn log_wave(&mut self, wave: &Wave, sample: GunSample, tick: Tick, is_visit: bool) {
        let stamp = Stamp::new(wave.fire_round, tick);
        let views = std::iter::once(&mut self.main)
            .chain(self.anti_surfer.iter_mut())
            .chain(std::iter::once(&mut self.melee));
        for view in views {
            let config = view.config();
            let accepts = (if is_visit { config.log_visits } else { config.log_bullet_hits })
                && (config.log_virtual || wave.firing)
                && (config.log_melee || wave.features.enemies_alive <= 1);
            if accepts {
                view.log_wave(wave, sample, stamp);
            }
        }
        if is_visit {
            self.wave_breaks += 1;
        }
    }

    pub fn clear_cache(&mut self) {
        self.aim_cache.clear();
    }

    /// Firing angle `kind` picks for `wave`, computed once per wave.
    pub fn aim(&mut self, kind: StrategyKind, wave: &Wave, arena: &Arena, one_v_one: bool) -> AimResult {
        if let Some(cached) = self.aim_cache.get(&(kind, wave.id)) {
            return cached.clone();
        }
        let result = match kind {
            StrategyKind::MainKnn => self.aim_main(wave),
            StrategyKind::AntiSurfer => self.aim_anti_surfer(wave, arena, one_v_one),
            StrategyKind::Melee => {
                let target = MeleeTarget { wave, views: &*self };
                aim_at_everyone(&[target], wave.source, wave.fire_tick - 1, wave.bullet_power(), 1, arena)
            }
        };
        debug!(
            "{} aims {:.4} at {} for wave fired on {}",
            kind.label(),
            result.angle,
            wave.owner,
            wave.fire_tick
        );
        self.aim_cache.insert((kind, wave.id), result.clone());
        result
    }

    fn aim_main(&mut self, wave: &Wave) -> AimResult {
        if self.main.is_empty() {
            return fallback(wave);
        }
        self.main.set_weights(&trip_hammer_weights(self.main.len()));
        let neighbors = self.main.nearest_for_wave(wave, true);
        let candidates: Vec<(f64, f64)> = neighbors
            .iter()
            .map(|n| (guess_factor_offset(wave, n.value.guess_factor), inverse_distance(n)))
            .collect();
        self.best_angle(wave, &candidates, Kernel::Tricube)
    }

    fn aim_anti_surfer(&self, wave: &Wave, arena: &Arena, one_v_one: bool) -> AimResult {
        let mut candidates = Vec::new();
        for view in &self.anti_surfer {
            if view.len() < view.config().k_divisor {
                continue;
            }
            for neighbor in view.nearest_for_wave(wave, true) {
                let offset = if one_v_one {
                    Some(guess_factor_offset(wave, neighbor.value.guess_factor))
                } else {
                    let projected = wave.project_displacement(neighbor.value.displacement);
                    arena
                        .contains(projected)
                        .then(|| normal_relative_angle(wave.firing_angle_to(projected) - wave.abs_bearing))
                };
                if let Some(offset) = offset {
                    candidates.push((offset, view.weight()));
                }
            }
        }
        self.best_angle(wave, &candidates, Kernel::Gaussian)
    }

    /// Candidate offset with the highest kernel density over `candidates`
    /// (offset, weight). The first maximum wins.
    fn best_angle(&self, wave: &Wave, candidates: &[(f64, f64)], kernel: Kernel) -> AimResult {
        if candidates.is_empty() {
            return fallback(wave);
        }
        let bandwidth = 2.0 * bot_width_aim_angle(wave.source.distance(wave.target));
        let mut best: Option<(f64, f64)> = None;
        let mut curve = Vec::with_capacity(self.firing_angles);
        for offset in firing_angle_offsets(self.firing_angles, wave.max_escape_angle()) {
            let density: f64 = candidates
                .iter()
                .map(|&(angle, weight)| kernel.density((offset - angle) / bandwidth) * weight)
                .sum();
            if best.map_or(true, |(_, d)| density > d) {
                best = Some((offset, density));
            }
            curve.push([offset, density]);
        }
        let offset = best.map_or(0.0, |(offset, _)| offset);
        AimResult {
            angle: normal_absolute_angle(wave.abs_bearing + offset),
            curve,
        }
    }
}

/// One opponent taking part in the melee aim: the wave we would fire at it
/// next and its gun views.
#[derive(Debug, Clone, Copy)]
pub struct MeleeTarget<'a> {
    pub wave: &'a Wave,
    pub views: &'a GunViews,
}

/// Where one logged displacement puts an opponent, seen from our gun.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MeleeCandidate {
    angle: f64,
    distance: f64,
    bandwidth: f64,
    weight: f64,
}

impl GunViews {
    fn melee_ready(&self) -> bool {
        self.melee.len() >= MELEE_POINTS_PER_NEIGHBOR
    }

    /// Projected locations of this opponent's `k` nearest melee neighbors
    /// that stay in the field, weighted so they sum to one.
    fn melee_candidates(&self, wave: &Wave, k: usize, next_location: Point, now: Tick, arena: &Arena) -> Vec<MeleeCandidate> {
        let point = self.melee.config().formula.data_point(wave, true);
        let neighbors = self.melee.nearest(&point, k);
        let total: f64 = neighbors.iter().map(inverse_distance).sum();
        neighbors
            .iter()
            .filter_map(|neighbor| {
                let projected = wave.project_blind(next_location, neighbor.value.displacement, now);
                if !arena.contains(projected) {
                    return None;
                }
                let distance = next_location.distance(projected).max(MIN_NEIGHBOR_DISTANCE);
                Some(MeleeCandidate {
                    angle: absolute_bearing(next_location, projected),
                    distance,
                    bandwidth: bot_width_aim_angle(distance),
                    weight: inverse_distance(neighbor) / total,
                })
            })
            .collect()
    }
}

/// Firing angle from `next_location` through the densest spread of every
/// melee target's projected locations, nearer ones counting more. Targets
/// without enough melee data sit out; with no candidates at all the first
/// target is aimed at head-on.
///
/// `now` is the current tick: each target's logged displacements are
/// projected from a shot fired next tick along its wave.
pub fn aim_at_everyone(
    targets: &[MeleeTarget],
    next_location: Point,
    now: Tick,
    power: f64,
    enemies_alive: u32,
    arena: &Arena,
) -> AimResult {
    let ready: Vec<&MeleeTarget> = targets.iter().filter(|t| t.views.melee_ready()).collect();
    let k = ready
        .iter()
        .map(|t| t.views.melee.len() / MELEE_POINTS_PER_NEIGHBOR)
        .fold(MELEE_NEIGHBORS / enemies_alive.max(1) as usize, usize::min)
        .max(1);

    let mut candidates = Vec::new();
    for target in ready {
        let mut wave = target.wave.clone();
        wave.set_bullet_power(power);
        candidates.extend(target.views.melee_candidates(&wave, k, next_location, now, arena));
    }
    let head_on = targets.first().map_or(0.0, |t| t.wave.abs_bearing);
    if candidates.is_empty() {
        return AimResult {
            angle: normal_absolute_angle(head_on),
            curve: Vec::new(),
        };
    }

    let density = |angle: f64| -> f64 {
        candidates
            .iter()
            .map(|c| {
                let u = normal_relative_angle(angle - c.angle) / c.bandwidth;
                c.weight * Kernel::Gaussian.density(u) / c.distance
            })
            .sum()
    };
    let mut best: Option<(f64, f64)> = None;
    let mut curve = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let d = density(candidate.angle);
        if best.map_or(true, |(_, best_density)| d > best_density) {
            best = Some((candidate.angle, d));
        }
        curve.push([normal_relative_angle(candidate.angle - head_on), d]);
    }
    AimResult {
        angle: normal_absolute_angle(best.map_or(head_on, |(angle, _)| angle)),
        curve,
    }
}

fn fallback(wave: &Wave) -> AimResult {
    AimResult {
        angle: normal_absolute_angle(wave.abs_bearing),
        curve: Vec::new(),
    }
}

/// Offset from head-on for `guess_factor` under this wave's geometry.
fn guess_factor_offset(wave: &Wave, guess_factor: f64) -> f64 {
    let side = EscapeSide::from_positive(guess_factor >= 0.0);
    normal_relative_angle(guess_factor * wave.orbit_direction as f64 * wave.precise_escape_angle(side))
}

fn inverse_distance<T>(neighbor: &Neighbor<T>) -> f64 {
    1.0 / neighbor.distance.max(MIN_NEIGHBOR_DISTANCE).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use wavesurf_core::rules::KinematicRules;
    use wavesurf_waves::{MotionPredictor, TargetFeatures, WaveInit};

    fn wave(id: u64) -> Wave {
        wave_at(id, Point::new(400.0, 400.0))
    }

    fn wave_at(id: u64, target: Point) -> Wave {
        let mut w = Wave::new(
            WaveId(id),
            WaveInit {
                owner: "sparrow".into(),
                source: Point::new(400.0, 100.0),
                target,
                fire_round: 0,
                fire_tick: 10,
                bullet_power: 1.95,
                target_heading: std::f64::consts::FRAC_PI_2,
                target_speed: 8.0,
                target_speed_sign: 1,
            },
            TargetFeatures {
                distance: 300.0,
                enemies_alive: 1,
                ..Default::default()
            },
            MotionPredictor::new(Arena::default(), KinematicRules::default()),
        );
        w.firing = true;
        w
    }

    #[test]
    fn test_kernels() {
        assert_eq!(Kernel::Tricube.density(0.0), 1.0);
        assert_eq!(Kernel::Tricube.density(1.0), 0.0);
        assert_abs_diff_eq!(Kernel::Tricube.density(0.5), 0.875, epsilon = 1e-12);
        assert_abs_diff_eq!(Kernel::Gaussian.density(2.0), (-2.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_main_gun_follows_logged_guess_factor() {
        let mut views = GunViews::new(&GunConfig::default()).unwrap();
        let arena = Arena::default();
        let w = wave(1);
        for tick in 0..20 {
            let sample = GunSample {
                guess_factor: 0.8,
                displacement: Point::ZERO,
            };
            views.log_wave(&w, sample, tick, true);
        }
        assert_eq!(views.wave_breaks(), 20);

        let result = views.aim(StrategyKind::MainKnn, &wave(2), &arena, true);
        let expected = guess_factor_offset(&w, 0.8);
        let offset = normal_relative_angle(result.angle - w.abs_bearing);
        // Nearest candidate angle to the logged one.
        let step = 2.0 * w.max_escape_angle() / (FIRING_ANGLES - 1) as f64;
        assert!((offset - expected).abs() <= step / 2.0 + 1e-9);
        assert_eq!(result.curve.len(), FIRING_ANGLES);
    }

    #[test]
    fn test_aim_is_cached_per_wave() {
        let mut views = GunViews::new(&GunConfig::default()).unwrap();
        let arena = Arena::default();
        let w = wave(1);
        let first = views.aim(StrategyKind::MainKnn, &w, &arena, true);
        views.log_wave(
            &w,
            GunSample {
                guess_factor: -1.0,
                displacement: Point::ZERO,
            },
            5,
            true,
        );
        assert_eq!(views.aim(StrategyKind::MainKnn, &w, &arena, true), first);
        views.clear_cache();
        assert_ne!(views.aim(StrategyKind::MainKnn, &w, &arena, true), first);
    }

    #[test]
    fn test_anti_surfer_waits_for_data() {
        let mut views = GunViews::new(&GunConfig::default()).unwrap();
        let arena = Arena::default();
        let w = wave(1);
        for tick in 0..9 {
            views.log_wave(&w, GunSample::default(), tick, true);
        }
        let result = views.aim(StrategyKind::AntiSurfer, &w, &arena, true);
        assert!(result.curve.is_empty());
        assert_abs_diff_eq!(result.angle, w.abs_bearing, epsilon = 1e-12);
    }

    #[test]
    fn test_bullet_hits_skip_visit_views() {
        let mut views = GunViews::new(&GunConfig::default()).unwrap();
        let w = wave(1);
        views.log_wave(&w, GunSample::default(), 3, false);
        assert!(views.main_view().is_empty());
        assert_eq!(views.wave_breaks(), 0);
    }

    #[test]
    fn test_anti_surfer_skips_off_field_projections_in_melee() {
        let mut views = GunViews::new(&GunConfig::default()).unwrap();
        let arena = Arena::default();
        let w = wave(1);
        // Far enough per tick to leave the field before the bullet arrives.
        let sample = GunSample {
            guess_factor: 0.5,
            displacement: Point::new(0.0, 100.0),
        };
        for tick in 0..20 {
            views.log_wave(&w, sample, tick, true);
        }
        assert!(!arena.contains(w.project_displacement(sample.displacement)));

        let melee = views.aim(StrategyKind::AntiSurfer, &wave(2), &arena, false);
        assert!(melee.curve.is_empty());
        assert_abs_diff_eq!(melee.angle, w.abs_bearing, epsilon = 1e-12);

        // A duel reads the guess factors instead.
        let duel = views.aim(StrategyKind::AntiSurfer, &wave(3), &arena, true);
        assert_eq!(duel.curve.len(), FIRING_ANGLES);
    }

    fn melee_views(displacement: Point, samples: Tick) -> GunViews {
        let mut views = GunViews::new(&GunConfig::default()).unwrap();
        let mut w = wave(1);
        w.features.enemies_alive = 3;
        for tick in 0..samples {
            let sample = GunSample {
                guess_factor: 0.0,
                displacement,
            };
            views.log_wave(&w, sample, tick, true);
        }
        views
    }

    #[test]
    fn test_melee_view_only_learns_melee_waves() {
        let views = melee_views(Point::ZERO, 12);
        assert_eq!(views.melee_view().len(), 12);
        assert!(views.main_view().is_empty());
        assert!(views.anti_surfer_views().iter().all(|v| v.is_empty()));
    }

    #[test]
    fn test_melee_aim_follows_projected_displacement() {
        let displacement = Point::new(0.0, 8.0);
        let views = melee_views(displacement, 20);
        let w = wave(2);
        let next = w.source;
        let now = w.fire_tick - 1;
        let target = MeleeTarget { wave: &w, views: &views };
        let result = aim_at_everyone(&[target], next, now, w.bullet_power(), 3, &Arena::default());

        let projected = w.project_blind(next, displacement, now);
        assert!(Arena::default().contains(projected));
        assert_abs_diff_eq!(result.angle, normal_absolute_angle(absolute_bearing(next, projected)), epsilon = 1e-9);
        // min(100 / 3, 20 / 10) neighbors.
        assert_eq!(result.curve.len(), 2);
    }

    #[test]
    fn test_melee_aim_prefers_nearer_opponent() {
        let arena = Arena::default();
        let near = wave(2);
        let far = wave_at(3, Point::new(750.0, 100.0));
        let next = near.source;
        let now = near.fire_tick - 1;
        let ready = melee_views(Point::ZERO, 20);

        let targets = [
            MeleeTarget { wave: &near, views: &ready },
            MeleeTarget { wave: &far, views: &ready },
        ];
        let result = aim_at_everyone(&targets, next, now, 1.95, 2, &arena);
        assert_abs_diff_eq!(result.angle, 0.0, epsilon = 1e-9);

        // Too little melee data sits the near opponent out.
        let sparse = melee_views(Point::ZERO, 5);
        let targets = [
            MeleeTarget { wave: &near, views: &sparse },
            MeleeTarget { wave: &far, views: &ready },
        ];
        let result = aim_at_everyone(&targets, next, now, 1.95, 2, &arena);
        assert_abs_diff_eq!(result.angle, std::f64::consts::FRAC_PI_2, epsilon = 1e-9);

        // Nobody ready: head-on at the first target.
        let targets = [
            MeleeTarget { wave: &far, views: &sparse },
            MeleeTarget { wave: &near, views: &sparse },
        ];
        let result = aim_at_everyone(&targets, next, now, 1.95, 2, &arena);
        assert!(result.curve.is_empty());
        assert_abs_diff_eq!(result.angle, far.abs_bearing, epsilon = 1e-12);
    }

    #[test]
    fn test_melee_strategy_aims_single_wave() {
        let mut views = melee_views(Point::ZERO, 20);
        let arena = Arena::default();
        let w = wave(2);
        let result = views.aim(StrategyKind::Melee, &w, &arena, false);
        assert_abs_diff_eq!(result.angle, w.abs_bearing, epsilon = 1e-9);
        assert!(!result.curve.is_empty());
    }
}
