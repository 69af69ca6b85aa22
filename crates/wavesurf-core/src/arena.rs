//! The rectangular arena and wall handling.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::constants::{
    NO_WALL_DISTANCE, ORBITAL_WALL_SAMPLES, WALL_MARGIN, WALL_SMOOTHING_FUDGE,
    WALL_SMOOTHING_MAX_ITERATIONS,
};
use crate::error::WavesurfError;
use crate::geometry::{absolute_bearing, bullet_ticks, limit};
use crate::types::Point;

/// Arena of `width` x `height`. Body centers must stay `WALL_MARGIN` from
/// every edge; that inner rectangle is the "field".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub width: f64,
    pub height: f64,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Arena {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> Result<(), WavesurfError> {
        let min = 2.0 * WALL_MARGIN;
        if !(self.width.is_finite() && self.width > min) {
            return Err(WavesurfError::config(
                "arena.width",
                format!("must exceed {min}, got {}", self.width),
            ));
        }
        if !(self.height.is_finite() && self.height > min) {
            return Err(WavesurfError::config(
                "arena.height",
                format!("must exceed {min}, got {}", self.height),
            ));
        }
        Ok(())
    }

    /// Whether `point` lies in the field. Lower edges are inclusive, upper
    /// edges exclusive.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= WALL_MARGIN
            && point.x < self.width - WALL_MARGIN
            && point.y >= WALL_MARGIN
            && point.y < self.height - WALL_MARGIN
    }

    /// Clamp `point` into the field.
    pub fn translate_to_field(&self, point: Point) -> Point {
        Point::new(
            limit(WALL_MARGIN, point.x, self.width - WALL_MARGIN),
            limit(WALL_MARGIN, point.y, self.height - WALL_MARGIN),
        )
    }

    /// Distance from `point` to the nearest field edge, negative outside.
    pub fn distance_to_wall(&self, point: Point) -> f64 {
        self.x_wall_distance(point.x).min(self.y_wall_distance(point.y))
    }

    fn x_wall_distance(&self, x: f64) -> f64 {
        (x - WALL_MARGIN).min(self.width - x - WALL_MARGIN)
    }

    fn y_wall_distance(&self, y: f64) -> f64 {
        (y - WALL_MARGIN).min(self.height - y - WALL_MARGIN)
    }

    /// Rotate `start_angle` until a point `wall_stick` ahead stays in the
    /// field, turning in `orientation` (1 clockwise, -1 counter-clockwise).
    pub fn wall_smoothing(
        &self,
        start: Point,
        start_angle: f64,
        orientation: i32,
        wall_stick: f64,
    ) -> f64 {
        let wall_x = self.x_wall_distance(start.x);
        let wall_y = self.y_wall_distance(start.y);
        if wall_x > wall_stick && wall_y > wall_stick {
            return start_angle;
        }

        let orientation = orientation as f64;
        let mut stick = wall_stick;
        let mut angle = start_angle;
        let mut test = start + Point::new(angle.sin(), angle.cos()) * stick;
        let mut test_x = self.x_wall_distance(test.x);
        let mut test_y = self.y_wall_distance(test.y);
        let mut adjacent = 0.0;
        let mut iterations = 0;

        while (test_x < 0.0 || test_y < 0.0) && iterations < WALL_SMOOTHING_MAX_ITERATIONS {
            iterations += 1;
            if test_y < 0.0 && test_y < test_x {
                // North or South wall
                angle = if test.y < WALL_MARGIN { PI } else { 0.0 };
                adjacent = wall_y;
            } else if test_x < 0.0 && test_x <= test_y {
                // East or West wall
                angle = if test.x < WALL_MARGIN {
                    3.0 * FRAC_PI_2
                } else {
                    FRAC_PI_2
                };
                adjacent = wall_x;
            }

            if adjacent < 0.0 {
                if -adjacent > stick {
                    stick += -adjacent;
                }
                angle += PI - orientation * ((-adjacent / stick).acos().abs() - WALL_SMOOTHING_FUDGE);
            } else {
                angle += orientation * ((adjacent / stick).acos().abs() + WALL_SMOOTHING_FUDGE);
            }
            test = start + Point::new(angle.sin(), angle.cos()) * stick;
            test_x = self.x_wall_distance(test.x);
            test_y = self.y_wall_distance(test.y);
        }

        angle
    }

    /// Fraction of the escape angle `max_escape_angle` a target can orbit
    /// in `direction` before leaving the field. `NO_WALL_DISTANCE` if it
    /// never does within twice the escape angle.
    pub fn orbital_wall_distance(
        &self,
        source: Point,
        target: Point,
        max_escape_angle: f64,
        direction: i32,
    ) -> f64 {
        let bearing = absolute_bearing(source, target);
        let distance = source.distance(target);
        let direction = direction as f64;
        for x in 0..ORBITAL_WALL_SAMPLES {
            let fraction = x as f64 / 100.0;
            let angle = bearing + direction * fraction * max_escape_angle;
            let on_orbit = source + Point::new(angle.sin(), angle.cos()) * distance;
            if !self.contains(on_orbit) {
                return fraction;
            }
        }
        NO_WALL_DISTANCE
    }

    /// Ticks of full-speed travel along `heading` before leaving the field,
    /// as a fraction of the bullet flight time over `distance`.
    pub fn direct_to_wall_distance(
        &self,
        target: Point,
        distance: f64,
        heading: f64,
        bullet_speed: f64,
        max_speed: f64,
    ) -> f64 {
        let ticks = bullet_ticks(distance, bullet_speed);
        if ticks <= 0 {
            return NO_WALL_DISTANCE;
        }
        let step = Point::new(heading.sin(), heading.cos()) * max_speed;
        for x in 0..(2 * ticks) {
            if !self.contains(target + step * x as f64) {
                return x as f64 / ticks as f64;
            }
        }
        NO_WALL_DISTANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_contains_edges() {
        let arena = Arena::default();
        assert!(arena.contains(Point::new(18.0, 18.0)));
        assert!(!arena.contains(Point::new(782.0, 300.0)));
        assert!(!arena.contains(Point::new(17.9, 300.0)));
    }

    #[test]
    fn test_translate_to_field() {
        let arena = Arena::default();
        let p = arena.translate_to_field(Point::new(-50.0, 900.0));
        assert_eq!(p, Point::new(18.0, 582.0));
    }

    #[test]
    fn test_wall_smoothing_open_field_unchanged() {
        let arena = Arena::default();
        let angle = arena.wall_smoothing(Point::new(400.0, 300.0), 1.0, 1, 160.0);
        assert_abs_diff_eq!(angle, 1.0);
    }

    #[test]
    fn test_wall_smoothing_keeps_stick_in_field() {
        let arena = Arena::default();
        let start = Point::new(400.0, 60.0);
        // Heading straight into the south wall.
        let angle = arena.wall_smoothing(start, PI, 1, 100.0);
        let stick_end = start + Point::new(angle.sin(), angle.cos()) * 100.0;
        assert!(arena.distance_to_wall(stick_end) >= -1e-6);
    }

    #[test]
    fn test_orbital_wall_distance_open_field() {
        let arena = Arena::new(5000.0, 5000.0);
        let d = arena.orbital_wall_distance(
            Point::new(2500.0, 2000.0),
            Point::new(2500.0, 2400.0),
            0.5,
            1,
        );
        assert_abs_diff_eq!(d, NO_WALL_DISTANCE);
    }

    #[test]
    fn test_direct_to_wall_distance() {
        let arena = Arena::default();
        // 40 units from the east edge of the field, heading east at 8/tick.
        let d = arena.direct_to_wall_distance(Point::new(742.0, 300.0), 140.0, FRAC_PI_2, 14.0, 8.0);
        // Leaves on step 5 of 10 bullet ticks.
        assert_abs_diff_eq!(d, 0.5);
    }
}
