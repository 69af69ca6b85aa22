//! Surf engine, the per-tick entry point.
//!
//! `SurfEngine` owns the hecs world of tracked opponents, applies queued
//! observations, runs all systems and produces a `TickReport`. It never
//! touches the host directly, so a scripted duel can drive it in tests.

use std::collections::VecDeque;

use hecs::World;
use log::{debug, info, warn};

use wavesurf_ai::{MeleeMover, StrategyArbiter, SurfMover};
use wavesurf_core::events::{ExplainEvent, Observation, TickReport};
use wavesurf_core::geometry::absolute_bearing;
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_core::WavesurfError;
use wavesurf_waves::{FiredBullet, MotionPredictor};

use crate::components::{eliminate, find_opponent, update_bot_distances, Opponent};
use crate::config::EngineConfig;
use crate::gun::GunTracker;
use crate::mover::MoveTracker;
use crate::own_state::OwnState;
use crate::systems;

/// The engine. Owns the ECS world and all tracking state.
pub struct SurfEngine {
    config: EngineConfig,
    world: World,
    own: OwnState,
    arbiter: StrategyArbiter,
    surf: SurfMover,
    melee: MeleeMover,
    predictor: MotionPredictor,
    round: u32,
    observation_queue: VecDeque<Observation>,
    explain_events: Vec<ExplainEvent>,
    // Fresh trackers cloned for every new opponent.
    gun_template: GunTracker,
    move_template: MoveTracker,
}

impl SurfEngine {
    /// Create an engine. Fails if the configuration does not validate.
    pub fn new(config: EngineConfig) -> Result<Self, WavesurfError> {
        config.validate()?;
        let predictor = MotionPredictor::new(config.arena, config.rules);
        Ok(Self {
            world: World::new(),
            own: OwnState::new(),
            arbiter: StrategyArbiter::new(),
            surf: SurfMover::new(config.surf.clone(), predictor)?,
            melee: MeleeMover::new(config.melee.clone(), predictor, config.seed)?,
            predictor,
            round: 0,
            observation_queue: VecDeque::new(),
            explain_events: Vec::new(),
            gun_template: GunTracker::new(&config.gun)?,
            move_template: MoveTracker::new(&config.surf)?,
            config,
        })
    }

    /// Queue an observation for processing at the next tick boundary.
    pub fn queue_observation(&mut self, observation: Observation) {
        self.observation_queue.push_back(observation);
    }

    /// Queue multiple observations.
    pub fn queue_observations(&mut self, observations: impl IntoIterator<Item = Observation>) {
        self.observation_queue.extend(observations);
    }

    /// Apply the queued observations and decide aim and movement.
    pub fn tick(&mut self) -> TickReport {
        self.process_observations();

        let mut report = TickReport {
            tick: self.own.tick(),
            round: self.round,
            ..Default::default()
        };
        if self.own.observed() {
            self.run_systems(&mut report);
        }
        let events = std::mem::take(&mut self.explain_events);
        if self.config.explain {
            report.explain = events;
        }
        report
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Get a read-only reference to the ECS world.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn own(&self) -> &OwnState {
        &self.own
    }

    pub fn arbiter(&self) -> &StrategyArbiter {
        &self.arbiter
    }

    /// Process all queued observations, round starts first and our own
    /// shots last.
    fn process_observations(&mut self) {
        let mut observations: Vec<Observation> = self.observation_queue.drain(..).collect();
        observations.sort_by_key(priority);
        for observation in observations {
            self.handle_observation(observation);
        }
    }

    fn handle_observation(&mut self, observation: Observation) {
        match observation {
            Observation::RoundStart { round } => self.start_round(round),
            Observation::OwnState {
                state,
                energy,
                gun_heat,
                opponents_alive,
            } => {
                self.own.observe(state, energy, gun_heat, opponents_alive);
                self.own.remove_old_fired_bullets(state.tick, &self.config.arena);
            }
            Observation::Scan { name, state, energy } => self.handle_scan(name, state, energy),
            Observation::ShotFired {
                power,
                source,
                angle,
                tick,
            } => self.handle_shot_fired(power, source, angle, tick),
            Observation::HitByBullet {
                name,
                power,
                location,
                tick,
            } => self.handle_hit_by_bullet(&name, power, location, tick),
            Observation::BulletHit {
                name,
                power,
                location,
                tick,
            } => self.handle_bullet_hit(&name, power, location, tick),
            Observation::BulletHitBullet {
                name,
                power,
                location,
                own_power,
                own_location,
                tick,
            } => self.handle_bullet_hit_bullet(&name, power, location, own_power, own_location, tick),
            Observation::HitWall { speed, tick } => {
                debug!("hit a wall at speed {speed:.1} on tick {tick}");
            }
            Observation::Eliminated { name } => {
                let Some(entity) = find_opponent(&self.world, &name) else {
                    warn!("{}", WavesurfError::UnknownOpponent(name));
                    return;
                };
                eliminate(&mut self.world, entity);
                info!("{name} eliminated");
            }
        }
    }

    fn start_round(&mut self, round: u32) {
        if self.own.observed() {
            self.log_round_summary();
        }
        self.round = round;
        self.own.init_round();
        self.arbiter.init_round();
        self.surf.init_round();
        self.melee.init_round();
        for (_entity, (opponent, gun, mover)) in
            self.world
                .query_mut::<(&mut Opponent, &mut GunTracker, &mut MoveTracker)>()
        {
            opponent.init_round();
            gun.init_round();
            mover.init_round();
        }
    }

    fn log_round_summary(&self) {
        let mut q = self.world.query::<(&Opponent, &MoveTracker)>();
        for (_entity, (opponent, mover)) in q.iter() {
            self.surf.round_over(&opponent.name, &mover.stats);
            if self.own.opponents_total <= 1 {
                self.arbiter.log_ratings(&opponent.name);
            }
        }
    }

    fn handle_scan(&mut self, name: String, state: KinematicState, energy: f64) {
        let distance = self.own.location().distance(state.location);
        let abs_bearing = absolute_bearing(self.own.location(), state.location);

        let (entity, previous, previous_energy) = match find_opponent(&self.world, &name) {
            Some(entity) => {
                let Ok(opponent) = self.world.query_one_mut::<&mut Opponent>(entity) else {
                    return;
                };
                let previous_energy = opponent.energy;
                let previous = opponent.observe(state, energy, distance, abs_bearing);
                (entity, previous, previous_energy)
            }
            None => {
                debug!("tracking new opponent {name}");
                let mut opponent = Opponent::new(name, state, energy);
                opponent.distance = distance;
                opponent.abs_bearing = abs_bearing;
                let entity = self
                    .world
                    .spawn((opponent, self.gun_template.clone(), self.move_template.clone()));
                (entity, None, energy)
            }
        };
        update_bot_distances(&mut self.world, entity);
        if !self.own.observed() {
            return;
        }

        systems::move_waves::on_scan(
            &mut self.world,
            entity,
            previous,
            previous_energy,
            &mut self.own,
            self.round,
            self.config.surf.waves_to_surf,
            &self.predictor,
            &mut self.explain_events,
        );
        let power = systems::targeting::bullet_power(&self.world, &self.own, &self.config.gun, &self.config.rules);
        systems::gun_waves::on_scan(
            &mut self.world,
            entity,
            previous,
            &self.own,
            power,
            self.round,
            &self.predictor,
            &mut self.explain_events,
        );
    }

    fn handle_shot_fired(&mut self, power: f64, source: Point, angle: f64, tick: Tick) {
        let bullet = FiredBullet::new(tick, source, angle, self.config.rules.bullet_speed(power));
        self.own.add_fired_bullet(bullet);
        self.own.last_bullet_fired_tick = tick;

        let one_v_one = self.own.is_duel();
        for (_entity, (opponent, gun, mover)) in
            self.world
                .query_mut::<(&Opponent, &mut GunTracker, &mut MoveTracker)>()
        {
            mover.cast_shadows(&bullet, &self.config.arena);
            if opponent.alive {
                gun.mark_firing_waves(tick, one_v_one, &mut self.arbiter, &self.config.arena);
            }
        }
    }

    fn handle_hit_by_bullet(&mut self, name: &str, power: f64, location: Point, tick: Tick) {
        let Some(entity) = find_opponent(&self.world, name) else {
            warn!("{}", WavesurfError::UnknownOpponent(name.to_string()));
            return;
        };
        let rules = self.config.rules;
        let Ok((opponent, mover)) = self.world.query_one_mut::<(&mut Opponent, &mut MoveTracker)>(entity) else {
            return;
        };
        // The bonus shows up in the next scan's energy and must not hide a shot.
        opponent.energy += rules.bullet_hit_bonus(power);
        mover.damage_taken += rules.bullet_damage(power);
        mover.total_power += power;
        mover.times_hit += 1;

        match mover.process_bullet(location, power, name, tick, self.round) {
            Some(wave) => wave.hit_by_bullet = true,
            None => warn!("bullet from {name} that hit us on tick {tick} matched no wave"),
        }
        if self.own.is_duel() {
            mover.clear_neighbor_cache();
        }
    }

    fn handle_bullet_hit(&mut self, name: &str, power: f64, location: Point, tick: Tick) {
        let Some(entity) = find_opponent(&self.world, name) else {
            warn!("{}", WavesurfError::UnknownOpponent(name.to_string()));
            return;
        };
        let rules = self.config.rules;
        let one_v_one = self.own.is_duel();
        let Ok((opponent, gun)) = self.world.query_one_mut::<(&mut Opponent, &mut GunTracker)>(entity) else {
            return;
        };
        let damage = rules.bullet_damage(power);
        opponent.energy = (opponent.energy - damage).max(0.0);
        opponent.damage_given += damage;

        let opponent_location = opponent.last_scan.location;
        if gun
            .process_bullet_hit(location, power, tick, one_v_one, true, opponent_location)
            .is_none()
        {
            warn!("our bullet that hit {name} on tick {tick} matched no wave");
        }
    }

    fn handle_bullet_hit_bullet(
        &mut self,
        name: &str,
        power: f64,
        location: Point,
        own_power: f64,
        own_location: Point,
        tick: Tick,
    ) {
        self.own.kill_fired_bullet(own_location, tick);
        debug!("our {own_power:.2} bullet collided with one from {name} on tick {tick}");

        if let Some(entity) = find_opponent(&self.world, name) {
            if let Ok(mover) = self.world.query_one_mut::<&mut MoveTracker>(entity) {
                match mover.process_bullet(location, power, name, tick, self.round) {
                    Some(wave) => wave.bullet_hit_bullet = true,
                    None => warn!("bullet from {name} destroyed on tick {tick} matched no wave"),
                }
            }
        } else {
            warn!("{}", WavesurfError::UnknownOpponent(name.to_string()));
        }

        for (_entity, mover) in self.world.query_mut::<&mut MoveTracker>() {
            mover.reset_bullet_shadows(&self.own.fired_bullets, &self.config.arena);
            mover.clear_neighbor_cache();
        }
    }

    /// Run all systems in order.
    fn run_systems(&mut self, report: &mut TickReport) {
        let tick = self.own.tick();
        // 1. Enemy waves passing us
        systems::move_waves::run(
            &mut self.world,
            tick,
            self.own.location(),
            self.round,
            &mut self.explain_events,
        );
        // 2. Our waves: re-aim the ones leaving now, learn from the ones that passed
        systems::gun_waves::run(&mut self.world, &self.own, &mut self.arbiter, &mut self.explain_events);
        // 3. Aim
        report.aim = systems::targeting::run(
            &mut self.world,
            &self.own,
            &self.arbiter,
            &self.config.gun,
            &self.predictor,
            &mut self.explain_events,
        );
        // 4. Movement
        report.movement = systems::surfing::run(
            &mut self.world,
            &self.own,
            &mut self.surf,
            &mut self.melee,
            &mut self.explain_events,
        );

        if let Some(aim) = &report.aim {
            report.ratings = self.arbiter.ratings(&aim.target);
        }
    }
}

/// Processing order within one tick. Impacts adjust opponent energy before
/// the scan that reports it.
fn priority(observation: &Observation) -> u8 {
    match observation {
        Observation::RoundStart { .. } => 0,
        Observation::OwnState { .. } => 1,
        Observation::HitWall { .. } => 2,
        Observation::HitByBullet { .. } => 3,
        Observation::BulletHit { .. } => 4,
        Observation::BulletHitBullet { .. } => 5,
        Observation::Scan { .. } => 6,
        Observation::ShotFired { .. } => 7,
        Observation::Eliminated { .. } => 8,
    }
}
