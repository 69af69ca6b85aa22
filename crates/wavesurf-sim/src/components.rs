//! Components attached to opponent entities.
//!
//! Every tracked opponent is one entity carrying an `Opponent`, a
//! `GunTracker` (our waves against it) and a `MoveTracker` (its waves
//! against us).

use std::collections::HashMap;

use hecs::{Entity, World};

use wavesurf_core::state_log::KinematicLog;
use wavesurf_core::types::{KinematicState, Point, Tick};

/// Energy every body starts a round with.
pub const START_ENERGY: f64 = 100.0;

/// Distance assumed before the first scan of a round.
const UNKNOWN_DISTANCE: f64 = 1000.0;

/// What we know about an opponent's body.
#[derive(Debug, Clone)]
pub struct Opponent {
    pub name: String,
    pub energy: f64,
    pub alive: bool,
    pub distance: f64,
    /// Bearing from us to the opponent at the last scan.
    pub abs_bearing: f64,
    pub last_scan: KinematicState,
    pub log: KinematicLog,
    pub damage_given: f64,
    /// Squared distance to every other living opponent, by name.
    pub bot_distances_sq: HashMap<String, f64>,
}

impl Opponent {
    pub fn new(name: impl Into<String>, state: KinematicState, energy: f64) -> Self {
        let mut log = KinematicLog::new();
        log.add(state);
        Self {
            name: name.into(),
            energy,
            alive: true,
            distance: UNKNOWN_DISTANCE,
            abs_bearing: 0.0,
            last_scan: state,
            log,
            damage_given: 0.0,
            bot_distances_sq: HashMap::new(),
        }
    }

    /// Record a scan. Returns the previous scan of this round, if any.
    pub fn observe(
        &mut self,
        state: KinematicState,
        energy: f64,
        distance: f64,
        abs_bearing: f64,
    ) -> Option<KinematicState> {
        let previous = (!self.log.is_empty()).then_some(self.last_scan);
        self.last_scan = state;
        self.log.add(state);
        self.energy = energy;
        self.distance = distance;
        self.abs_bearing = abs_bearing;
        self.alive = true;
        previous
    }

    /// State at `tick`, interpolated when unobserved, else the last scan.
    pub fn state_at(&mut self, tick: Tick) -> KinematicState {
        self.log.get(tick).unwrap_or(self.last_scan)
    }

    pub fn init_round(&mut self) {
        self.energy = START_ENERGY;
        self.alive = true;
        self.distance = UNKNOWN_DISTANCE;
        self.log.clear();
        self.bot_distances_sq.clear();
    }

    /// Distance to the nearest other bot, `us_sq` being our own squared
    /// distance to it.
    pub fn nearest_bot_distance(&self, us_sq: f64) -> f64 {
        self.bot_distances_sq.values().copied().fold(us_sq, f64::min).sqrt()
    }
}

/// Entity tracking `name`, if any.
pub fn find_opponent(world: &World, name: &str) -> Option<Entity> {
    let mut q = world.query::<&Opponent>();
    q.iter().find(|(_, o)| o.name == name).map(|(entity, _)| entity)
}

/// Living opponent last seen nearest `location`.
pub fn closest_living(world: &World, location: Point) -> Option<Entity> {
    let mut q = world.query::<&Opponent>();
    q.iter()
        .filter(|(_, o)| o.alive)
        .map(|(entity, o)| (entity, o.last_scan.location.distance(location)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(entity, _)| entity)
}

/// Refresh the squared distances between `entity`, just scanned, and every
/// other living opponent, on both sides.
pub fn update_bot_distances(world: &mut World, entity: Entity) {
    let Ok(scanned) = world.query_one_mut::<&Opponent>(entity) else {
        return;
    };
    let (name, location) = (scanned.name.clone(), scanned.last_scan.location);
    let mut distances = Vec::new();
    for (other, opponent) in world.query_mut::<&mut Opponent>() {
        if other == entity || !opponent.alive {
            continue;
        }
        let distance_sq = location.distance_squared(opponent.last_scan.location);
        opponent.bot_distances_sq.insert(name.clone(), distance_sq);
        distances.push((opponent.name.clone(), distance_sq));
    }
    if let Ok(scanned) = world.query_one_mut::<&mut Opponent>(entity) {
        scanned.bot_distances_sq.extend(distances);
    }
}

/// Mark `entity` dead and drop it from everyone's bot distances.
pub fn eliminate(world: &mut World, entity: Entity) {
    let Ok(dead) = world.query_one_mut::<&mut Opponent>(entity) else {
        return;
    };
    dead.alive = false;
    dead.bot_distances_sq.clear();
    let name = dead.name.clone();
    for (_entity, opponent) in world.query_mut::<&mut Opponent>() {
        opponent.bot_distances_sq.remove(&name);
    }
}

/// Mean energy of the living opponents, 0 when there are none.
pub fn average_energy(world: &World) -> f64 {
    let mut q = world.query::<&Opponent>();
    let (total, count) = q
        .iter()
        .filter(|(_, o)| o.alive)
        .fold((0.0, 0), |(total, count), (_, o)| (total + o.energy, count + 1));
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
