//! Our waves against each opponent: one per scan for the shot we could
//! fire next tick, re-aimed as they leave and learned from as they pass.

use hecs::{Entity, World};

use wavesurf_ai::StrategyArbiter;
use wavesurf_core::events::ExplainEvent;
use wavesurf_core::types::{KinematicState, Point};
use wavesurf_waves::MotionPredictor;

use crate::components::Opponent;
use crate::gun::{GunTracker, Shooter};
use crate::own_state::OwnState;

/// Scan-time gun bookkeeping for `entity`, whose `Opponent` already holds
/// the new scan. In melee every other living opponent also gets an alt
/// wave against it.
#[allow(clippy::too_many_arguments)]
pub fn on_scan(
    world: &mut World,
    entity: Entity,
    previous: Option<KinematicState>,
    own: &OwnState,
    power: f64,
    round: u32,
    predictor: &MotionPredictor,
    events: &mut Vec<ExplainEvent>,
) {
    let others: Vec<(Point, f64)> = if own.is_duel() {
        Vec::new()
    } else {
        let mut q = world.query::<&Opponent>();
        q.iter()
            .filter(|(other, o)| *other != entity && o.alive)
            .map(|(_, o)| (o.last_scan.location, o.energy))
            .collect()
    };

    let Ok((opponent, gun)) = world.query_one_mut::<(&mut Opponent, &mut GunTracker)>(entity) else {
        return;
    };
    gun.on_scan(previous.as_ref(), &opponent.last_scan, opponent.abs_bearing);

    let tick = own.tick();
    let shooter = Shooter {
        location: predictor.arena.translate_to_field(MotionPredictor::next_location(&own.state)),
        energy: own.energy,
        gun_heat: own.gun_heat,
        last_bullet_fired_tick: own.last_bullet_fired_tick,
        enemies_alive: own.opponents_alive,
        round,
    };
    gun.fire_next_tick_wave(opponent, &shooter, power, tick, &own.state, predictor, events);
    for (source, source_energy) in others {
        gun.fire_alt_wave(opponent, source, source_energy, &shooter, power, tick, predictor);
    }
}

/// Re-aim waves leaving this tick and process the ones that passed their
/// opponent.
pub fn run(world: &mut World, own: &OwnState, arbiter: &mut StrategyArbiter, events: &mut Vec<ExplainEvent>) {
    let tick = own.tick();
    let one_v_one = own.is_duel();
    for (_entity, (opponent, gun)) in world.query_mut::<(&Opponent, &mut GunTracker)>() {
        if !opponent.alive {
            continue;
        }
        gun.update_current_waves(
            tick,
            own.location(),
            own.gun_heat,
            own.last_bullet_fired_tick,
            &opponent.last_scan,
        );
        gun.check_active_waves(tick, &opponent.last_scan, one_v_one, arbiter, events);
    }
}
