//! Opponent waves against us: created and relocated on every duel scan,
//! advanced and learned from every tick.

use hecs::{Entity, World};

use wavesurf_core::events::ExplainEvent;
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_waves::MotionPredictor;

use crate::components::Opponent;
use crate::mover::MoveTracker;
use crate::own_state::OwnState;

/// Scan-time movement bookkeeping for `entity`, whose `Opponent` already
/// holds the new scan. Only runs in a duel.
#[allow(clippy::too_many_arguments)]
pub fn on_scan(
    world: &mut World,
    entity: Entity,
    previous: Option<KinematicState>,
    previous_energy: f64,
    own: &mut OwnState,
    round: u32,
    waves_to_surf: usize,
    predictor: &MotionPredictor,
    events: &mut Vec<ExplainEvent>,
) {
    if !own.is_duel() {
        return;
    }
    let tick = own.tick();
    let Ok((opponent, mover)) = world.query_one_mut::<(&mut Opponent, &mut MoveTracker)>(entity) else {
        return;
    };
    if let Some(previous) = previous {
        let energy_change = opponent.energy - previous_energy;
        mover.estimate_wall_hit(&previous, &opponent.last_scan, energy_change, &predictor.arena, &predictor.rules);
    }
    mover.update_enemy_waves(
        opponent,
        previous_energy,
        own,
        round,
        tick,
        waves_to_surf,
        predictor,
        events,
    );
}

/// Advance every opponent's waves against our location and count the
/// tick toward each living opponent's damage factor.
pub fn run(world: &mut World, tick: Tick, my_location: Point, round: u32, events: &mut Vec<ExplainEvent>) {
    for (_entity, (opponent, mover)) in world.query_mut::<(&Opponent, &mut MoveTracker)>() {
        if opponent.alive {
            mover.track_distance(opponent.last_scan.location.distance(my_location));
        }
        mover.check_active_waves(tick, my_location, round, events);
    }
}
