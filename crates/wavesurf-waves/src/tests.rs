//! Tests for the wave manager lifecycle and lookups.

use approx::assert_abs_diff_eq;

use wavesurf_core::arena::Arena;
use wavesurf_core::enums::WavePosition;
use wavesurf_core::rules::KinematicRules;
use wavesurf_core::state_log::KinematicLog;
use wavesurf_core::types::{KinematicState, Point, Tick};

use crate::manager::{WaveFilter, WaveManager};
use crate::predictor::MotionPredictor;
use crate::wave::{TargetFeatures, Wave, WaveInit};

const SOURCE: Point = Point::new(400.0, 100.0);
const TARGET: Point = Point::new(400.0, 400.0);

fn wave(manager: &mut WaveManager, fire_tick: Tick, power: f64) -> Wave {
    let id = manager.next_id();
    Wave::new(
        id,
        WaveInit {
            owner: "sparrow".into(),
            source: SOURCE,
            target: TARGET,
            fire_round: 0,
            fire_tick,
            bullet_power: power,
            target_heading: std::f64::consts::FRAC_PI_2,
            target_speed: 8.0,
            target_speed_sign: 1,
        },
        TargetFeatures::default(),
        MotionPredictor::new(Arena::default(), KinematicRules::default()),
    )
}

fn add(manager: &mut WaveManager, fire_tick: Tick, power: f64, firing: bool) {
    let mut w = wave(manager, fire_tick, power);
    w.firing = firing;
    manager.add_wave(w);
}

// ---- Lifecycle ----

#[test]
fn test_wave_breaks_once_when_gone() {
    let mut manager = WaveManager::new();
    add(&mut manager, 0, 1.95, true);
    let reference = manager.waves().next().unwrap().clone();

    let mut broke_at = None;
    for tick in 1..40 {
        let state = KinematicState::at(TARGET, tick);
        let breaks = manager.check_active_waves(tick, &state);
        if breaks.is_empty() {
            continue;
        }
        assert!(broke_at.is_none(), "wave broke twice");
        broke_at = Some(tick);
        assert_eq!(breaks.len(), 1);
        let states = &breaks[0].break_states;
        assert!(!states.is_empty());
        for s in states {
            assert!(reference.check_wave_position(s).is_breaking());
            assert!(s.tick < tick);
        }
    }

    let expected = (1..40)
        .find(|&t| reference.check_wave_position(&KinematicState::at(TARGET, t)) == WavePosition::Gone)
        .unwrap();
    assert_eq!(broke_at, Some(expected));
    assert!(manager.is_empty());
}

#[test]
fn test_stale_state_is_ignored() {
    let mut manager = WaveManager::new();
    add(&mut manager, 0, 1.95, true);
    let stale = KinematicState::at(TARGET, 60);
    assert!(manager.check_active_waves(61, &stale).is_empty());
    assert_eq!(manager.len(), 1);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "BREAKING_CENTER")]
fn test_position_regression_panics_in_debug() {
    let mut manager = WaveManager::new();
    add(&mut manager, 0, 1.95, true);
    let reference = manager.waves().next().unwrap().clone();
    let center = (1..40)
        .find(|&t| {
            reference.check_wave_position(&KinematicState::at(TARGET, t)) == WavePosition::BreakingCenter
        })
        .unwrap();
    for tick in 1..=center {
        manager.check_active_waves(tick, &KinematicState::at(TARGET, tick));
    }
    // Pushing the fire time back without re-aiming makes the body midair again.
    manager.for_each_wave_mut(|w| w.fire_tick += 10);
    manager.check_active_waves(center + 1, &KinematicState::at(TARGET, center + 1));
}

#[cfg(not(debug_assertions))]
#[test]
fn test_position_regression_skips_wave_in_release() {
    let mut manager = WaveManager::new();
    add(&mut manager, 0, 1.95, true);
    let reference = manager.waves().next().unwrap().clone();
    let center = (1..40)
        .find(|&t| {
            reference.check_wave_position(&KinematicState::at(TARGET, t)) == WavePosition::BreakingCenter
        })
        .unwrap();
    for tick in 1..=center {
        manager.check_active_waves(tick, &KinematicState::at(TARGET, tick));
    }
    manager.for_each_wave_mut(|w| w.fire_tick += 10);
    let breaks = manager.check_active_waves(center + 1, &KinematicState::at(TARGET, center + 1));
    assert!(breaks.is_empty());
    // The regressed wave is kept, not dropped or broken.
    assert_eq!(manager.len(), 1);
}

// ---- Lookups ----

#[test]
fn test_find_closest_wave_respects_filters() {
    let mut manager = WaveManager::new();
    add(&mut manager, 0, 1.95, true);
    add(&mut manager, 10, 1.95, false);

    // Wave fired on tick 10 has traveled ~141 by tick 20, the older one ~283.
    let location = Point::new(400.0, 250.0);
    let any = WaveFilter::default();
    let found = manager.find_closest_wave(location, 20, &any).unwrap();
    assert_eq!(found.fire_tick, 10);

    let firing = WaveFilter {
        only_firing: true,
        ..Default::default()
    };
    assert!(manager.find_closest_wave(location, 20, &firing).is_none());

    let wrong_power = WaveFilter {
        power: Some(3.0),
        ..Default::default()
    };
    assert!(manager.find_closest_wave(location, 20, &wrong_power).is_none());

    let other_owner = WaveFilter {
        owner: Some("finch"),
        ..Default::default()
    };
    assert!(manager.find_closest_wave(location, 20, &other_owner).is_none());
    let blank_owner = WaveFilter {
        owner: Some(""),
        power: Some(1.95),
        ..Default::default()
    };
    assert!(manager.find_closest_wave(location, 20, &blank_owner).is_some());

    let far = Point::new(400.0, 590.0);
    assert!(manager.find_closest_wave(far, 20, &any).is_none());
}

#[test]
fn test_surfable_waves_and_fire_tick_lookup() {
    let mut manager = WaveManager::new();
    add(&mut manager, 0, 1.95, true);
    add(&mut manager, 5, 1.95, false);
    add(&mut manager, 9, 1.95, true);

    let me = KinematicState::at(TARGET, 10);
    let first = manager.find_surfable_wave(0, &me, WavePosition::BreakingCenter).unwrap();
    assert_eq!(first.fire_tick, 0);
    let second = manager.find_surfable_wave(1, &me, WavePosition::BreakingCenter).unwrap();
    assert_eq!(second.fire_tick, 9);
    assert!(manager.find_surfable_wave(2, &me, WavePosition::BreakingCenter).is_none());

    manager.wave_by_fire_tick_mut(0).unwrap().hit_by_bullet = true;
    let first = manager.find_surfable_wave(0, &me, WavePosition::BreakingCenter).unwrap();
    assert_eq!(first.fire_tick, 9);

    assert!(manager.wave_by_fire_tick(5).is_some());
    assert!(manager.wave_by_fire_tick(6).is_none());
}

#[test]
fn test_last_fire_tick_ignores_alt_waves() {
    let mut manager = WaveManager::new();
    assert_eq!(manager.last_fire_tick(), None);
    add(&mut manager, 4, 1.0, false);
    let mut alt = wave(&mut manager, 8, 1.0);
    alt.alt = true;
    manager.add_wave(alt);
    assert_eq!(manager.last_fire_tick(), Some(4));

    manager.reset_round();
    assert!(manager.is_empty());
    assert_eq!(manager.last_fire_tick(), None);
}

// ---- Interpolation ----

#[test]
fn test_interpolate_between_neighbors() {
    let mut manager = WaveManager::new();
    let mut first = wave(&mut manager, 10, 1.0);
    first.features.gun_heat = 0.25;
    first.features.last_bullet_fired_tick = 2;
    first.features.target_energy = 80.0;
    let mut second = wave(&mut manager, 20, 2.0);
    second.reposition(Point::new(500.0, 100.0), TARGET);
    second.features.gun_heat = 1.0;
    second.features.target_energy = 60.0;
    second.features.enemies_alive = 3;
    manager.add_wave(first);
    manager.add_wave(second);

    let mut log = KinematicLog::new();
    let w = manager
        .interpolate_wave_by_fire_tick(15, 0.0, 0.0, &mut log)
        .unwrap();
    assert_eq!(w.fire_tick, 15);
    assert_abs_diff_eq!(w.source.x, 450.0, epsilon = 1e-9);
    assert_abs_diff_eq!(w.bullet_power(), 1.5, epsilon = 1e-9);
    assert_abs_diff_eq!(w.features.target_energy, 70.0, epsilon = 1e-9);
    assert_abs_diff_eq!(w.features.distance, w.source.distance(w.target), epsilon = 1e-9);
    // Gun cooled to zero between the two waves, so a shot happened on tick 13.
    assert_eq!(w.features.last_bullet_fired_tick, 13);
    assert_abs_diff_eq!(w.features.gun_heat, 1.5, epsilon = 1e-9);
    assert_eq!(w.features.enemies_alive, 3);
    assert!(!w.firing);

    // The result is not registered and gets a fresh identity.
    assert_eq!(manager.len(), 2);
    assert!(manager.waves().all(|existing| existing.id != w.id));
}

#[test]
fn test_extrapolate_from_single_wave() {
    let mut manager = WaveManager::new();
    let mut base = wave(&mut manager, 10, 2.0);
    base.firing = true;
    base.hit_by_bullet = true;
    base.cast_shadow(Point::new(390.0, 300.0), Point::new(410.0, 300.0));
    manager.add_wave(base);

    let mut log = KinematicLog::new();
    let w = manager
        .interpolate_wave_by_fire_tick(12, std::f64::consts::FRAC_PI_2, 8.0, &mut log)
        .unwrap();
    assert_eq!(w.fire_tick, 12);
    assert_abs_diff_eq!(w.source.x, 416.0, epsilon = 1e-9);
    assert_abs_diff_eq!(w.source.y, 100.0, epsilon = 1e-9);
    // Target keeps going east at 8 per tick.
    assert_abs_diff_eq!(w.target.x, 416.0, epsilon = 1e-9);
    assert_abs_diff_eq!(w.features.distance, 300.0, epsilon = 1e-9);
    assert!(!w.firing);
    assert!(!w.hit_by_bullet);
    assert!(w.shadows.is_empty());

    let mut empty = WaveManager::new();
    assert!(empty.interpolate_wave_by_fire_tick(12, 0.0, 0.0, &mut log).is_none());
}

#[test]
fn test_current_waves_visited() {
    let mut manager = WaveManager::new();
    add(&mut manager, 3, 1.0, false);
    add(&mut manager, 4, 1.0, false);
    let mut visited = Vec::new();
    manager.check_current_waves(4, |w| {
        w.firing = true;
        visited.push(w.fire_tick);
    });
    assert_eq!(visited, vec![4]);
    assert!(manager.wave_by_fire_tick(4).unwrap().firing);
    assert!(!manager.wave_by_fire_tick(3).unwrap().firing);
}
