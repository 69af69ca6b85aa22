//! Bullet power selection and the aim decision: the rated strategy against
//! a duel opponent, or one angle covering every opponent in melee.

use hecs::{Entity, World};
use log::{debug, info};

use wavesurf_ai::{aim_at_everyone, GunConfig, MeleeTarget, StrategyArbiter};
use wavesurf_core::enums::StrategyKind;
use wavesurf_core::events::{AimDecision, ExplainEvent};
use wavesurf_core::geometry::{absolute_bearing, limit};
use wavesurf_core::rules::KinematicRules;
use wavesurf_waves::MotionPredictor;

use crate::components::{average_energy, closest_living, Opponent};
use crate::gun::GunTracker;
use crate::own_state::OwnState;

/// Aim with a strategy only this close to the gun cooling; before that the
/// gun just tracks head-on.
const AIM_LEAD_TICKS: f64 = 3.0;

/// Energy below which long range duel shots get weaker.
const POWER_DOWN_MIN_ENERGY: f64 = 35.0;
const POWER_DOWN_MAX_ENERGY: f64 = 63.0;
const POWER_DOWN_ENERGY_SCALE: f64 = 4.0;

/// Power for the next shot against the closest living opponent.
pub fn bullet_power(world: &World, own: &OwnState, config: &GunConfig, rules: &KinematicRules) -> f64 {
    let Some(target) = closest_living(world, own.location()) else {
        return rules.max_bullet_power;
    };
    let mut q = world.query::<(&Opponent, &GunTracker)>();
    let Some((_, (opponent, gun))) = q.iter().find(|(entity, _)| *entity == target) else {
        return rules.max_bullet_power;
    };
    let distance = opponent.last_scan.location.distance(own.location());
    if own.is_duel() {
        duel_power(config, rules, distance, opponent.energy, gun.is_rammer(), own.energy)
    } else {
        let average = average_energy(world);
        melee_power(rules, distance, own.energy, own.opponents_alive, average)
    }
}

pub fn duel_power(
    config: &GunConfig,
    rules: &KinematicRules,
    distance: f64,
    target_energy: f64,
    rammer: bool,
    my_energy: f64,
) -> f64 {
    let mut power = if distance < config.close_distance || rammer {
        config.close_power
    } else {
        config.base_power
    };
    if distance > config.power_down_distance {
        let power_down_energy = limit(
            POWER_DOWN_MIN_ENERGY,
            POWER_DOWN_MAX_ENERGY + (target_energy - my_energy) * POWER_DOWN_ENERGY_SCALE,
            POWER_DOWN_MAX_ENERGY,
        );
        if my_energy < power_down_energy {
            power = power.min((my_energy / power_down_energy).powi(3) * config.base_power);
        }
    }
    power
        .min(target_energy / 4.0)
        .max(rules.min_bullet_power)
        .min(my_energy)
}

pub fn melee_power(rules: &KinematicRules, distance: f64, my_energy: f64, enemies_alive: u32, average_energy: f64) -> f64 {
    let mut power: f64 = if enemies_alive <= 3 { 1.999 } else { 2.999 };
    if enemies_alive <= 5 && distance > 500.0 {
        power = 1.499;
    }
    if (my_energy < average_energy && enemies_alive <= 5 && distance > 300.0) || distance > 700.0 {
        power = 0.999;
    }
    if my_energy < 20.0 && my_energy < average_energy {
        power = power.min(2.0 - (20.0 - my_energy) / 11.0);
    }
    power.max(rules.min_bullet_power).min(my_energy)
}

/// Whole ticks until the gun is cool again.
pub fn ticks_until_cool(gun_heat: f64, rules: &KinematicRules) -> f64 {
    (gun_heat / rules.gun_cooling_rate - 1e-9).ceil().max(0.0)
}

/// Aim the next shot along the wave we would fire at the closest living
/// opponent on next tick.
pub fn run(
    world: &mut World,
    own: &OwnState,
    arbiter: &StrategyArbiter,
    config: &GunConfig,
    predictor: &MotionPredictor,
    events: &mut Vec<ExplainEvent>,
) -> Option<AimDecision> {
    let target = closest_living(world, own.location())?;
    if !own.is_duel() {
        return aim_melee(world, own, target, predictor, events);
    }
    let (opponent, gun) = world.query_one_mut::<(&Opponent, &mut GunTracker)>(target).ok()?;
    let GunTracker {
        views,
        last_wave_fired,
        strategy,
        ..
    } = gun;
    let wave = last_wave_fired.as_ref()?;
    let until_cool = ticks_until_cool(own.gun_heat, &predictor.rules);

    let (angle, fire) = if opponent.energy <= 0.0 || until_cool > AIM_LEAD_TICKS {
        let next = if views.wave_breaks() < config.knn_data_threshold {
            StrategyKind::MainKnn
        } else {
            arbiter.best(&opponent.name)
        };
        if next != *strategy {
            info!(
                "switching to {} against {} ({:.2})",
                next.label(),
                opponent.name,
                arbiter.rating(next, &opponent.name) * 100.0
            );
            events.push(ExplainEvent::StrategySwitched {
                opponent: opponent.name.clone(),
                from: *strategy,
                to: next,
            });
            *strategy = next;
        }
        let from = predictor.arena.translate_to_field(MotionPredictor::next_location(&own.state));
        (absolute_bearing(from, wave.target), false)
    } else {
        let aim = views.aim(*strategy, wave, &predictor.arena, true);
        debug!("{} aim at {} on tick {}: {:.4}", strategy.label(), opponent.name, own.tick(), aim.angle);
        events.push(ExplainEvent::AimDensity {
            strategy: *strategy,
            curve: aim.curve,
        });
        (aim.angle, until_cool <= 1.0 && own.energy > wave.bullet_power())
    };

    Some(AimDecision {
        target: opponent.name.clone(),
        angle,
        power: wave.bullet_power(),
        strategy: *strategy,
        fire,
    })
}

/// Melee aim: the closest opponent is the named target, but the angle is
/// the densest one across every living opponent's projected locations.
fn aim_melee(
    world: &World,
    own: &OwnState,
    closest: Entity,
    predictor: &MotionPredictor,
    events: &mut Vec<ExplainEvent>,
) -> Option<AimDecision> {
    let mut q = world.query::<(&Opponent, &GunTracker)>();
    let living: Vec<(Entity, &Opponent, &GunTracker)> = q
        .iter()
        .filter(|(_, (opponent, _))| opponent.alive)
        .map(|(entity, (opponent, gun))| (entity, opponent, gun))
        .collect();
    let (_, opponent, gun) = living.iter().find(|(entity, ..)| *entity == closest)?;
    let wave = gun.last_wave_fired.as_ref()?;
    let power = wave.bullet_power();
    let until_cool = ticks_until_cool(own.gun_heat, &predictor.rules);
    let from = predictor.arena.translate_to_field(MotionPredictor::next_location(&own.state));

    let (angle, fire) = if opponent.energy <= 0.0 || until_cool > AIM_LEAD_TICKS {
        (absolute_bearing(from, wave.target), false)
    } else {
        // Closest first, so it is the head-on fallback.
        let targets: Vec<MeleeTarget> = std::iter::once((wave, &gun.views))
            .chain(living.iter().filter(|(entity, ..)| *entity != closest).filter_map(|(_, _, other)| {
                other.last_wave_fired.as_ref().map(|w| (w, &other.views))
            }))
            .map(|(wave, views)| MeleeTarget { wave, views })
            .collect();
        let aim = aim_at_everyone(&targets, from, own.tick(), power, own.opponents_alive, &predictor.arena);
        debug!(
            "melee aim across {} opponents on tick {}: {:.4}",
            targets.len(),
            own.tick(),
            aim.angle
        );
        events.push(ExplainEvent::AimDensity {
            strategy: StrategyKind::Melee,
            curve: aim.curve,
        });
        (aim.angle, until_cool <= 1.0 && own.energy > power)
    };

    Some(AimDecision {
        target: opponent.name.clone(),
        angle,
        power,
        strategy: StrategyKind::Melee,
        fire,
    })
}
