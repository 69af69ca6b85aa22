//! Scripted one-on-one duel that feeds an engine its observations.
//!
//! The opponent orbits us at full speed, reversing at random, and fires a
//! random power at a jittered head-on angle whenever its gun is cool. Our
//! body follows the engine's movement decisions and fires on its aim
//! decisions. Everything random comes from one `ChaCha8Rng`, so a seed
//! fixes the whole duel.

use std::f64::consts::FRAC_PI_2;

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use wavesurf_core::events::{AimDecision, MoveDecision, Observation, TickReport};
use wavesurf_core::geometry::absolute_bearing;
use wavesurf_core::types::{KinematicState, Point, Tick};
use wavesurf_waves::MotionPredictor;

use crate::components::START_ENERGY;
use crate::config::EngineConfig;
use crate::engine::SurfEngine;

pub const OPPONENT_NAME: &str = "sparrow";

/// Chance per tick that the opponent reverses its orbit.
const REVERSE_CHANCE: f64 = 0.04;
/// Opponent reverses when this close to a wall.
const WALL_REVERSE_DISTANCE: f64 = 40.0;
const MAX_AIM_JITTER: f64 = 0.3;
/// Half the side of a body's square hitbox.
const HALF_BOT_WIDTH: f64 = 18.0;

#[derive(Debug, Clone, Copy)]
struct Body {
    state: KinematicState,
    energy: f64,
    gun_heat: f64,
}

#[derive(Debug, Clone, Copy)]
struct ScenarioBullet {
    from_opponent: bool,
    source: Point,
    velocity: DVec2,
    power: f64,
    fire_tick: Tick,
}

impl ScenarioBullet {
    fn position(&self, tick: Tick) -> Point {
        self.source + self.velocity * (tick - self.fire_tick) as f64
    }
}

pub struct DuelScenario {
    rng: ChaCha8Rng,
    predictor: MotionPredictor,
    tick: Tick,
    started: bool,
    me: Body,
    opponent: Body,
    orbit_direction: f64,
    bullets: Vec<ScenarioBullet>,
    last_aim: Option<AimDecision>,
    last_move: Option<MoveDecision>,
    pub shots_at_us: u32,
    pub hits_taken: u32,
    pub shots_fired: u32,
    pub hits_landed: u32,
}

impl DuelScenario {
    pub fn new(config: &EngineConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let arena = config.arena;
        let me = Body {
            state: KinematicState::at(Point::new(arena.width * 0.2, arena.height * 0.5), 0),
            energy: START_ENERGY,
            gun_heat: config.rules.initial_gun_heat,
        };
        let opponent_y = rng.gen_range(arena.height * 0.25..arena.height * 0.75);
        let opponent = Body {
            state: KinematicState::at(Point::new(arena.width * 0.8, opponent_y), 0),
            energy: START_ENERGY,
            gun_heat: config.rules.initial_gun_heat,
        };
        let orbit_direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        Self {
            rng,
            predictor: MotionPredictor::new(arena, config.rules),
            tick: 0,
            started: false,
            me,
            opponent,
            orbit_direction,
            bullets: Vec::new(),
            last_aim: None,
            last_move: None,
            shots_at_us: 0,
            hits_taken: 0,
            shots_fired: 0,
            hits_landed: 0,
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn my_energy(&self) -> f64 {
        self.me.energy
    }

    pub fn opponent_energy(&self) -> f64 {
        self.opponent.energy
    }

    /// Run `ticks` steps and collect every report.
    pub fn run(&mut self, engine: &mut SurfEngine, ticks: usize) -> Vec<TickReport> {
        (0..ticks).map(|_| self.step(engine)).collect()
    }

    /// Advance the duel one tick and let the engine decide the next.
    pub fn step(&mut self, engine: &mut SurfEngine) -> TickReport {
        if !self.started {
            engine.queue_observation(Observation::RoundStart { round: 0 });
            self.started = true;
        } else {
            self.tick += 1;
            self.move_me();
            self.move_opponent();
            if let Some(observation) = self.fire_mine() {
                engine.queue_observation(observation);
            }
            engine.queue_observations(self.resolve_bullets());
        }

        engine.queue_observation(Observation::OwnState {
            state: self.me.state,
            energy: self.me.energy,
            gun_heat: self.me.gun_heat,
            opponents_alive: 1,
        });
        engine.queue_observation(Observation::Scan {
            name: OPPONENT_NAME.to_string(),
            state: self.opponent.state,
            energy: self.opponent.energy,
        });
        // Fired after the scan, so the energy drop shows up next tick.
        self.fire_opponent();
        self.cool_guns();

        let report = engine.tick();
        self.last_aim = report.aim.clone();
        self.last_move = report.movement.clone();
        report
    }

    fn move_me(&mut self) {
        let next = match &self.last_move {
            Some(decision) => self.predictor.predict(
                &self.me.state,
                decision.distance,
                decision.turn,
                decision.max_speed,
                1,
                false,
            ),
            None => KinematicState::new(self.me.state.location, self.me.state.heading, 0.0, self.tick),
        };
        self.me.state = self.clamped(next);
    }

    fn move_opponent(&mut self) {
        if self.rng.gen_bool(REVERSE_CHANCE)
            || self.predictor.arena.distance_to_wall(self.opponent.state.location) < WALL_REVERSE_DISTANCE
        {
            self.orbit_direction = -self.orbit_direction;
        }
        let bearing_from_me = absolute_bearing(self.me.state.location, self.opponent.state.location);
        let go_angle = bearing_from_me + self.orbit_direction * FRAC_PI_2;
        let next = self.predictor.step_toward(&self.opponent.state, self.predictor.rules.max_speed, go_angle, false);
        self.opponent.state = self.clamped(next);
    }

    fn clamped(&self, state: KinematicState) -> KinematicState {
        KinematicState::new(
            self.predictor.arena.translate_to_field(state.location),
            state.heading,
            state.speed,
            self.tick,
        )
    }

    fn fire_mine(&mut self) -> Option<Observation> {
        let aim = self.last_aim.take().filter(|aim| aim.fire)?;
        if self.me.gun_heat > 0.0 || self.me.energy <= aim.power {
            return None;
        }
        let source = self.me.state.location;
        self.spawn_bullet(false, source, aim.angle, aim.power);
        self.me.energy -= aim.power;
        self.me.gun_heat = self.predictor.rules.gun_heat(aim.power);
        self.shots_fired += 1;
        Some(Observation::ShotFired {
            power: aim.power,
            source,
            angle: aim.angle,
            tick: self.tick,
        })
    }

    fn fire_opponent(&mut self) {
        if self.opponent.gun_heat > 0.0 || self.opponent.energy <= 0.0 {
            return;
        }
        let power = self
            .rng
            .gen_range(1.0..3.0_f64)
            .min(self.opponent.energy);
        let jitter = self.rng.gen_range(-MAX_AIM_JITTER..MAX_AIM_JITTER);
        let source = self.opponent.state.location;
        let angle = absolute_bearing(source, self.me.state.location) + jitter;
        self.spawn_bullet(true, source, angle, power);
        self.opponent.energy -= power;
        // Heat lands after this tick's cooling.
        self.opponent.gun_heat = self.predictor.rules.gun_heat(power) + self.predictor.rules.gun_cooling_rate;
        self.shots_at_us += 1;
    }

    fn spawn_bullet(&mut self, from_opponent: bool, source: Point, angle: f64, power: f64) {
        let speed = self.predictor.rules.bullet_speed(power);
        self.bullets.push(ScenarioBullet {
            from_opponent,
            source,
            velocity: DVec2::new(angle.sin(), angle.cos()) * speed,
            power,
            fire_tick: self.tick,
        });
    }

    fn cool_guns(&mut self) {
        let cooling = self.predictor.rules.gun_cooling_rate;
        for body in [&mut self.me, &mut self.opponent] {
            body.gun_heat = round_heat(body.gun_heat - cooling);
        }
    }

    /// Move bullets to this tick and report the ones that hit a body.
    fn resolve_bullets(&mut self) -> Vec<Observation> {
        let rules = self.predictor.rules;
        let arena = self.predictor.arena;
        let tick = self.tick;
        let mut observations = Vec::new();
        let mut remaining = Vec::with_capacity(self.bullets.len());
        for bullet in std::mem::take(&mut self.bullets) {
            let position = bullet.position(tick);
            let (target, shooter) = if bullet.from_opponent {
                (&mut self.me, &mut self.opponent)
            } else {
                (&mut self.opponent, &mut self.me)
            };
            if tick > bullet.fire_tick && inside_hitbox(position, target.state.location) {
                target.energy = (target.energy - rules.bullet_damage(bullet.power)).max(0.0);
                shooter.energy += rules.bullet_hit_bonus(bullet.power);
                observations.push(if bullet.from_opponent {
                    self.hits_taken += 1;
                    Observation::HitByBullet {
                        name: OPPONENT_NAME.to_string(),
                        power: bullet.power,
                        location: position,
                        tick,
                    }
                } else {
                    self.hits_landed += 1;
                    Observation::BulletHit {
                        name: OPPONENT_NAME.to_string(),
                        power: bullet.power,
                        location: position,
                        tick,
                    }
                });
            } else if position.x >= 0.0 && position.x <= arena.width && position.y >= 0.0 && position.y <= arena.height {
                remaining.push(bullet);
            }
        }
        self.bullets = remaining;
        observations
    }
}

fn inside_hitbox(point: Point, center: Point) -> bool {
    (point.x - center.x).abs() <= HALF_BOT_WIDTH && (point.y - center.y).abs() <= HALF_BOT_WIDTH
}

fn round_heat(heat: f64) -> f64 {
    ((heat * 1e6).round() / 1e6).max(0.0)
}
