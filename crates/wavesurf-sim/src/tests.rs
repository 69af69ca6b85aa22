//! Tests for the surf engine: determinism, observation handling, fire
//! detection and the scripted duel.

use approx::assert_abs_diff_eq;

use wavesurf_core::enums::{MoveMode, StrategyKind};
use wavesurf_core::events::{ExplainEvent, Observation, TickReport};
use wavesurf_core::types::{KinematicState, Point, Tick};

use crate::components::{find_opponent, Opponent};
use crate::config::EngineConfig;
use crate::engine::SurfEngine;
use crate::gun::GunTracker;
use crate::mover::MoveTracker;
use crate::scenario::{DuelScenario, OPPONENT_NAME};

fn engine_with(config: EngineConfig) -> (SurfEngine, DuelScenario) {
    let scenario = DuelScenario::new(&config);
    (SurfEngine::new(config).unwrap(), scenario)
}

fn own_state(tick: Tick) -> Observation {
    Observation::OwnState {
        state: KinematicState::new(Point::new(200.0, 300.0), 0.0, 0.0, tick),
        energy: 100.0,
        gun_heat: 1.0,
        opponents_alive: 1,
    }
}

fn scan(tick: Tick, energy: f64) -> Observation {
    Observation::Scan {
        name: "finch".to_string(),
        state: KinematicState::new(Point::new(600.0, 300.0), 0.0, 0.0, tick),
        energy,
    }
}

// ---- Determinism ----

#[test]
fn test_determinism_same_seed() {
    let config = EngineConfig {
        seed: 12345,
        explain: true,
        ..Default::default()
    };
    let (mut engine_a, mut duel_a) = engine_with(config.clone());
    let (mut engine_b, mut duel_b) = engine_with(config);

    for _ in 0..300 {
        let report_a = duel_a.step(&mut engine_a);
        let report_b = duel_b.step(&mut engine_b);
        let json_a = serde_json::to_string(&report_a).unwrap();
        let json_b = serde_json::to_string(&report_b).unwrap();
        assert_eq!(json_a, json_b, "Reports diverged with same seed");
    }
}

#[test]
fn test_determinism_different_seeds() {
    let (mut engine_a, mut duel_a) = engine_with(EngineConfig {
        seed: 111,
        ..Default::default()
    });
    let (mut engine_b, mut duel_b) = engine_with(EngineConfig {
        seed: 222,
        ..Default::default()
    });

    let mut diverged = false;
    for _ in 0..200 {
        let json_a = serde_json::to_string(&duel_a.step(&mut engine_a)).unwrap();
        let json_b = serde_json::to_string(&duel_b.step(&mut engine_b)).unwrap();
        if json_a != json_b {
            diverged = true;
            break;
        }
    }
    assert!(diverged, "Different seeds should produce divergent output");
}

// ---- Configuration ----

#[test]
fn test_invalid_config_rejected() {
    let mut config = EngineConfig::default();
    config.surf.waves_to_surf = 0;
    assert!(SurfEngine::new(config).is_err());
}

// ---- Observations ----

#[test]
fn test_no_decisions_before_own_state() {
    let mut engine = SurfEngine::new(EngineConfig::default()).unwrap();
    engine.queue_observation(scan(0, 100.0));
    let report = engine.tick();
    assert!(report.aim.is_none());
    assert!(report.movement.is_none());
    // The opponent is still tracked.
    assert!(find_opponent(engine.world(), "finch").is_some());
}

#[test]
fn test_scan_spawns_one_entity_per_opponent() {
    let mut engine = SurfEngine::new(EngineConfig::default()).unwrap();
    engine.queue_observations([Observation::RoundStart { round: 0 }, own_state(0), scan(0, 100.0)]);
    engine.tick();
    engine.queue_observations([own_state(1), scan(1, 100.0)]);
    let report = engine.tick();

    let mut q = engine.world().query::<(&Opponent, &GunTracker, &MoveTracker)>();
    assert_eq!(q.iter().count(), 1);
    assert_eq!(report.tick, 1);
    assert_eq!(report.movement.map(|m| m.mode), Some(MoveMode::Orbit));
    assert_eq!(report.aim.map(|a| a.target), Some("finch".to_string()));
}

#[test]
fn test_energy_drop_marks_firing_wave() {
    let mut engine = SurfEngine::new(EngineConfig::default()).unwrap();
    engine.queue_observation(Observation::RoundStart { round: 0 });
    for tick in 0..=31 {
        engine.queue_observations([own_state(tick), scan(tick, 100.0)]);
        engine.tick();
    }
    engine.queue_observations([own_state(32), scan(32, 98.0)]);
    let report = engine.tick();

    let entity = find_opponent(engine.world(), "finch").unwrap();
    let mut q = engine.world().query_one::<&MoveTracker>(entity).unwrap();
    let mover = q.get().unwrap();
    let wave = mover.waves.manager.wave_by_fire_tick(31).unwrap();
    assert!(wave.firing);
    assert_abs_diff_eq!(wave.bullet_power(), 2.0, epsilon = 1e-9);
    assert_eq!(mover.last_fire_tick, 31);
    // The unfired waves before it never became firing waves.
    assert!(!mover.waves.manager.wave_by_fire_tick(30).unwrap().firing);
    assert_eq!(report.movement.map(|m| m.mode), Some(MoveMode::Surf));
}

#[test]
fn test_energy_drop_ignored_while_gun_hot() {
    let mut engine = SurfEngine::new(EngineConfig::default()).unwrap();
    engine.queue_observation(Observation::RoundStart { round: 0 });
    for tick in 0..=10 {
        engine.queue_observations([own_state(tick), scan(tick, 100.0)]);
        engine.tick();
    }
    engine.queue_observations([own_state(11), scan(11, 98.0)]);
    engine.tick();

    let entity = find_opponent(engine.world(), "finch").unwrap();
    let mut q = engine.world().query_one::<&MoveTracker>(entity).unwrap();
    let mover = q.get().unwrap();
    assert!(mover.waves.manager.waves().all(|w| !w.firing));
}

#[test]
fn test_unknown_opponent_hit_is_not_fatal() {
    let mut engine = SurfEngine::new(EngineConfig::default()).unwrap();
    engine.queue_observations([Observation::RoundStart { round: 0 }, own_state(0), scan(0, 100.0)]);
    engine.tick();
    engine.queue_observations([
        own_state(1),
        Observation::HitByBullet {
            name: "ghost".to_string(),
            power: 2.0,
            location: Point::new(200.0, 300.0),
            tick: 1,
        },
        Observation::BulletHit {
            name: "ghost".to_string(),
            power: 2.0,
            location: Point::new(200.0, 300.0),
            tick: 1,
        },
        Observation::Eliminated {
            name: "ghost".to_string(),
        },
    ]);
    let report = engine.tick();
    assert_eq!(report.tick, 1);
    assert!(find_opponent(engine.world(), "ghost").is_none());
}

#[test]
fn test_hit_by_unmatched_bullet_still_counts_damage() {
    let mut engine = SurfEngine::new(EngineConfig::default()).unwrap();
    engine.queue_observations([Observation::RoundStart { round: 0 }, own_state(0), scan(0, 100.0)]);
    engine.tick();
    engine.queue_observations([
        own_state(1),
        Observation::HitByBullet {
            name: "finch".to_string(),
            power: 3.0,
            location: Point::new(200.0, 300.0),
            tick: 1,
        },
        scan(1, 109.0),
    ]);
    engine.tick();

    let entity = find_opponent(engine.world(), "finch").unwrap();
    let mut q = engine.world().query_one::<(&Opponent, &MoveTracker)>(entity).unwrap();
    let (opponent, mover) = q.get().unwrap();
    assert_eq!(mover.times_hit, 1);
    assert_abs_diff_eq!(mover.damage_taken, 16.0, epsilon = 1e-9);
    assert_eq!(opponent.energy, 109.0);
    // The hit bonus explains the energy gain; nothing was fired.
    assert!(mover.waves.manager.waves().all(|w| !w.firing));
}

#[test]
fn test_eliminated_opponent_is_not_targeted() {
    let mut engine = SurfEngine::new(EngineConfig::default()).unwrap();
    engine.queue_observations([Observation::RoundStart { round: 0 }, own_state(0), scan(0, 100.0)]);
    engine.tick();
    engine.queue_observations([
        own_state(1),
        Observation::Eliminated {
            name: "finch".to_string(),
        },
    ]);
    let report = engine.tick();
    assert!(report.aim.is_none());
    assert!(report.movement.is_none());
}

// ---- Melee ----

fn melee_observations(tick: Tick, gun_heat: f64) -> Vec<Observation> {
    let mut observations = vec![Observation::OwnState {
        state: KinematicState::new(Point::new(400.0, 300.0), 0.0, 0.0, tick),
        energy: 100.0,
        gun_heat,
        opponents_alive: 4,
    }];
    for (name, location) in [
        ("finch", Point::new(150.0, 150.0)),
        ("wren", Point::new(180.0, 120.0)),
        ("sparrow", Point::new(130.0, 190.0)),
        ("crow", Point::new(700.0, 500.0)),
    ] {
        observations.push(Observation::Scan {
            name: name.to_string(),
            state: KinematicState::at(location, tick),
            energy: 100.0,
        });
    }
    observations
}

#[test]
fn test_melee_moves_away_from_cluster() {
    let mut engine = SurfEngine::new(EngineConfig {
        explain: true,
        ..Default::default()
    })
    .unwrap();
    engine.queue_observation(Observation::RoundStart { round: 0 });
    engine.queue_observations(melee_observations(0, 1.0));
    let report = engine.tick();

    let movement = report.movement.unwrap();
    assert_eq!(movement.mode, MoveMode::Melee);
    assert_eq!(movement.option, None);
    let centroid = (Point::new(150.0, 150.0) + Point::new(180.0, 120.0) + Point::new(130.0, 190.0)) / 3.0;
    let me = Point::new(400.0, 300.0);
    assert!(movement.destination.unwrap().distance(centroid) > me.distance(centroid));
    assert!(report
        .explain
        .iter()
        .any(|e| matches!(e, ExplainEvent::MeleeDestination { .. })));

    // Aim names the closest opponent but holds fire while the gun is hot.
    let aim = report.aim.unwrap();
    assert_eq!(aim.target, "wren");
    assert_eq!(aim.strategy, StrategyKind::Melee);
    assert!(!aim.fire);
}

#[test]
fn test_melee_aims_across_opponents_when_cool() {
    let mut engine = SurfEngine::new(EngineConfig {
        explain: true,
        ..Default::default()
    })
    .unwrap();
    engine.queue_observation(Observation::RoundStart { round: 0 });
    let mut report = TickReport::default();
    for tick in 0..3 {
        engine.queue_observations(melee_observations(tick, 0.0));
        report = engine.tick();
    }
    let aim = report.aim.unwrap();
    assert_eq!(aim.strategy, StrategyKind::Melee);
    assert!(aim.fire);
    assert!(aim.angle.is_finite());
    assert!(report.explain.iter().any(|e| matches!(
        e,
        ExplainEvent::AimDensity {
            strategy: StrategyKind::Melee,
            ..
        }
    )));

    let wren = find_opponent(engine.world(), "wren").unwrap();
    {
        let mut q = engine.world().query_one::<(&Opponent, &GunTracker)>(wren).unwrap();
        let (opponent, gun) = q.get().unwrap();
        assert_abs_diff_eq!(opponent.bot_distances_sq["finch"], 1800.0, epsilon = 1e-9);
        assert_eq!(opponent.bot_distances_sq.len(), 3);
        assert!(gun.waves.waves().any(|w| w.alt));
    }

    engine.queue_observation(Observation::Eliminated {
        name: "finch".to_string(),
    });
    engine.tick();
    let mut q = engine.world().query_one::<&Opponent>(wren).unwrap();
    assert!(!q.get().unwrap().bot_distances_sq.contains_key("finch"));
}

// ---- Rounds ----

#[test]
fn test_round_start_resets_waves_but_keeps_views() {
    let (mut engine, mut duel) = engine_with(EngineConfig::default());
    duel.run(&mut engine, 250);

    let view_sizes = |engine: &SurfEngine| -> Vec<usize> {
        let mut q = engine.world().query::<&MoveTracker>();
        q.iter().flat_map(|(_, m)| m.views.iter().map(|v| v.len())).collect()
    };
    let before = view_sizes(&engine);

    engine.queue_observations([
        Observation::RoundStart { round: 1 },
        Observation::OwnState {
            state: KinematicState::at(Point::new(100.0, 100.0), 0),
            energy: 100.0,
            gun_heat: 3.0,
            opponents_alive: 1,
        },
    ]);
    let report = engine.tick();
    assert_eq!(report.round, 1);
    assert_eq!(engine.round(), 1);
    assert_eq!(view_sizes(&engine), before);

    let mut q = engine.world().query::<(&Opponent, &GunTracker, &MoveTracker)>();
    for (_, (opponent, gun, mover)) in q.iter() {
        assert_eq!(opponent.energy, 100.0);
        assert!(gun.waves.is_empty());
        assert!(mover.waves.manager.is_empty());
        assert!(mover.waves.imaginary().is_none());
        assert_eq!(mover.stats.round.shots_fired, 0);
    }
}

// ---- Explain trace ----

#[test]
fn test_explain_trace_only_when_enabled() {
    let (mut engine, mut duel) = engine_with(EngineConfig::default());
    let quiet = duel.run(&mut engine, 150);
    assert!(quiet.iter().all(|r| r.explain.is_empty()));

    let (mut engine, mut duel) = engine_with(EngineConfig {
        explain: true,
        ..Default::default()
    });
    let traced = duel.run(&mut engine, 150);
    assert!(traced.iter().any(|r| !r.explain.is_empty()));
}

// ---- Scripted duel ----

#[test]
fn test_duel_surfs_and_fires() {
    let (mut engine, mut duel) = engine_with(EngineConfig::default());
    let reports = duel.run(&mut engine, 600);

    assert!(duel.shots_at_us > 0);
    assert!(duel.shots_fired > 0);
    assert!(reports.iter().any(|r| r.movement.as_ref().is_some_and(|m| m.mode == MoveMode::Surf)));
    assert!(reports.iter().any(|r| r.aim.as_ref().is_some_and(|a| a.fire)));
    assert!(reports.iter().all(|r| r.aim.as_ref().map_or(true, |a| a.angle.is_finite())));
    assert_eq!(reports.last().map(|r| r.tick), Some(duel.tick()));
}

#[test]
fn test_duel_learns_from_waves() {
    let (mut engine, mut duel) = engine_with(EngineConfig::default());
    duel.run(&mut engine, 600);

    let entity = find_opponent(engine.world(), OPPONENT_NAME).unwrap();
    let mut q = engine.world().query_one::<(&GunTracker, &MoveTracker)>(entity).unwrap();
    let (gun, mover) = q.get().unwrap();
    assert!(gun.views.wave_breaks() > 0);
    assert!(mover.stats.total.shots_fired > 0);
    assert!(engine.arbiter().shots_fired(StrategyKind::MainKnn, OPPONENT_NAME) > 0);
    assert_eq!(
        engine.arbiter().shots_fired(StrategyKind::MainKnn, OPPONENT_NAME),
        engine.arbiter().shots_fired(StrategyKind::AntiSurfer, OPPONENT_NAME)
    );
}
