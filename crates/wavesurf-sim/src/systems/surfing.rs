//! Movement decision: surf the duel opponent's waves, or weigh every
//! living opponent's risk in melee.

use hecs::World;

use wavesurf_ai::{MeleeMover, SurfContext, SurfMover, Threat};
use wavesurf_core::enums::MoveMode;
use wavesurf_core::events::{ExplainEvent, MoveDecision};
use wavesurf_core::geometry::absolute_bearing;

use crate::components::{closest_living, Opponent};
use crate::mover::MoveTracker;
use crate::own_state::OwnState;

pub fn run(
    world: &mut World,
    own: &OwnState,
    surf: &mut SurfMover,
    melee: &mut MeleeMover,
    events: &mut Vec<ExplainEvent>,
) -> Option<MoveDecision> {
    let target = closest_living(world, own.location())?;
    if !own.is_duel() {
        let decision = melee.move_decision(&own.state, own.energy, &threats(world, own));
        if let Some(destination) = decision.destination {
            events.push(ExplainEvent::MeleeDestination {
                destination,
                risk: melee.last_risk(),
            });
        }
        return Some(decision);
    }

    let (opponent, mover) = world.query_one_mut::<(&Opponent, &mut MoveTracker)>(target).ok()?;
    let MoveTracker { waves, views, stats, .. } = mover;
    let mut ctx = SurfContext {
        waves: &*waves,
        views: views.as_mut_slice(),
        stats: &*stats,
        opponent: opponent.last_scan.location,
        now: own.tick(),
    };
    let decision = surf.move_decision(&own.state, &mut ctx);
    if decision.mode == MoveMode::Surf {
        for (option, danger) in surf.option_dangers() {
            events.push(ExplainEvent::SurfDanger { option, danger });
        }
    }
    Some(decision)
}

/// Every living opponent as a melee threat.
pub fn threats(world: &World, own: &OwnState) -> Vec<Threat> {
    let mut q = world.query::<(&Opponent, &MoveTracker)>();
    q.iter()
        .filter(|(_, (opponent, _))| opponent.alive)
        .map(|(_, (opponent, mover))| Threat {
            location: opponent.last_scan.location,
            energy: opponent.energy,
            abs_bearing: absolute_bearing(own.location(), opponent.last_scan.location),
            damage_factor: mover.damage_factor(),
            bot_distances_sq: opponent.bot_distances_sq.values().copied().collect(),
        })
        .collect()
}
