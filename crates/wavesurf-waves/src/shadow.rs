//! Shadows cast on enemy waves by our own bullets in flight.
//!
//! Wherever one of our bullets crosses an enemy wave's band, an enemy bullet
//! on that wave would have collided with ours, so those firing angles are
//! safe.

use serde::{Deserialize, Serialize};

use wavesurf_core::arena::Arena;
use wavesurf_core::constants::MAX_PREDICTION_TICKS;
use wavesurf_core::geometry::{Circle, Segment};
use wavesurf_core::types::{Point, Tick};

use crate::wave::Wave;

/// One of our real bullets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiredBullet {
    pub fire_tick: Tick,
    pub source: Point,
    pub angle: f64,
    pub speed: f64,
    /// Tick the bullet stopped existing, if it has.
    pub death_tick: Option<Tick>,
}

impl FiredBullet {
    pub fn new(fire_tick: Tick, source: Point, angle: f64, speed: f64) -> Self {
        Self {
            fire_tick,
            source,
            angle,
            speed,
            death_tick: None,
        }
    }

    pub fn position(&self, tick: Tick) -> Point {
        let elapsed = (tick - self.fire_tick) as f64;
        self.source + Point::new(self.angle.sin(), self.angle.cos()) * self.speed * elapsed
    }

    fn alive_at(&self, tick: Tick) -> bool {
        self.death_tick.map_or(true, |death| tick < death)
    }
}

/// Shadow `wave` with `bullet` at the first tick the bullet is inside it.
///
/// Only bullets that start outside the wave cast shadows. Waves already
/// resolved by a bullet impact are left alone.
pub fn cast_bullet_shadows(wave: &mut Wave, bullet: &FiredBullet, arena: &Arena) {
    let start = wave.fire_tick.max(bullet.fire_tick);
    if wave.processed_bullet_hit() {
        return;
    }
    let radius = wave.distance_traveled(start);
    if wave.source.distance_squared(bullet.position(start)) <= radius * radius {
        return;
    }

    let mut tick = start;
    for _ in 0..MAX_PREDICTION_TICKS {
        tick += 1;
        let position = bullet.position(tick);
        let radius = wave.distance_traveled(tick);
        if wave.source.distance_squared(position) < radius * radius && bullet.alive_at(tick) {
            shadow_segment(wave, bullet, tick);
            return;
        }
        if !arena.contains(position) {
            return;
        }
    }
}

/// Cast the part of the bullet's last step that lies between the wave's
/// previous and current circles.
fn shadow_segment(wave: &mut Wave, bullet: &FiredBullet, tick: Tick) {
    let inner = Circle::new(wave.source, wave.distance_traveled(tick - 1));
    let outer = Circle::new(wave.source, wave.distance_traveled(tick));
    let p1 = bullet.position(tick - 1);
    let p2 = bullet.position(tick);
    let segment = Segment::new(p1, p2);
    let inner_hits = inner.intersect_segment(&segment);
    let outer_hits = outer.intersect_segment(&segment);

    match (inner_hits.as_slice(), outer_hits.as_slice()) {
        // Whole step lies between the circles.
        ([], []) => wave.cast_shadow(p1, p2),
        // Crosses both circles.
        ([i, ..], [o, ..]) => wave.cast_shadow(*o, *i),
        // Dips inside the inner circle and back out.
        ([a, b], []) => {
            let (near, far) = if p1.distance_squared(*a) < p1.distance_squared(*b) {
                (*a, *b)
            } else {
                (*b, *a)
            };
            wave.cast_shadow(p1, near);
            wave.cast_shadow(far, p2);
        }
        ([i, ..], []) => wave.cast_shadow(p1, *i),
        ([], [o, ..]) => wave.cast_shadow(*o, p2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::MotionPredictor;
    use crate::wave::{TargetFeatures, WaveId, WaveInit};
    use wavesurf_core::geometry::absolute_bearing;
    use wavesurf_core::rules::KinematicRules;

    fn enemy_wave() -> Wave {
        let mut w = Wave::new(
            WaveId(3),
            WaveInit {
                owner: "sparrow".into(),
                source: Point::new(400.0, 500.0),
                target: Point::new(400.0, 100.0),
                fire_round: 0,
                fire_tick: 10,
                bullet_power: 2.0,
                target_heading: 0.0,
                target_speed: 0.0,
                target_speed_sign: 1,
            },
            TargetFeatures::default(),
            MotionPredictor::new(Arena::default(), KinematicRules::default()),
        );
        w.firing = true;
        w
    }

    #[test]
    fn test_head_on_bullet_shadows_head_on_angle() {
        let mut wave = enemy_wave();
        // Our bullet fired from the target straight back at the source.
        let bullet = FiredBullet::new(8, Point::new(400.0, 100.0), 0.0, 17.0);
        cast_bullet_shadows(&mut wave, &bullet, &Arena::default());
        assert_eq!(wave.shadows.len(), 1);
        assert!(wave.shadowed(wave.abs_bearing));
    }

    #[test]
    fn test_bullet_inside_wave_casts_nothing() {
        let mut wave = enemy_wave();
        let bullet = FiredBullet::new(40, Point::new(400.0, 420.0), 0.0, 17.0);
        cast_bullet_shadows(&mut wave, &bullet, &Arena::default());
        assert!(wave.shadows.is_empty());
    }

    #[test]
    fn test_dead_bullet_casts_nothing() {
        let mut wave = enemy_wave();
        let mut bullet = FiredBullet::new(8, Point::new(400.0, 100.0), 0.0, 17.0);
        bullet.death_tick = Some(12);
        cast_bullet_shadows(&mut wave, &bullet, &Arena::default());
        assert!(wave.shadows.is_empty());
    }

    #[test]
    fn test_crossing_bullet_shadow_spans_its_path() {
        let mut wave = enemy_wave();
        // Bullet crossing the wave sideways.
        let bullet = FiredBullet::new(10, Point::new(100.0, 300.0), std::f64::consts::FRAC_PI_2, 11.0);
        cast_bullet_shadows(&mut wave, &bullet, &Arena::default());
        assert_eq!(wave.shadows.len(), 1);
        let shadow = wave.shadows[0];
        assert!(shadow.max > shadow.min);
        assert!(shadow.max - shadow.min < 0.1);
        // The step from tick 26 to 27 lies wholly inside the wave band.
        let midpoint = (bullet.position(26) + bullet.position(27)) / 2.0;
        assert!(wave.shadowed(absolute_bearing(wave.source, midpoint)));
        assert!(!wave.shadowed(wave.abs_bearing));
    }
}
