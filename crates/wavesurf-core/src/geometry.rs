//! Planar geometry helpers.
//!
//! Angles are compass-style: 0 points along +y and angles grow clockwise,
//! so `project(p, a, d)` moves by `(sin a, cos a) * d`.

use std::f64::consts::{PI, TAU};

use glam::DVec2;

use crate::constants::{BOT_HALF_WIDTH, CONFIDENCE_Z};
use crate::types::KinematicState;

/// Bearing from `from` to `to`.
pub fn absolute_bearing(from: DVec2, to: DVec2) -> f64 {
    (to.x - from.x).atan2(to.y - from.y)
}

/// Point reached by travelling `length` from `from` along `angle`.
pub fn project(from: DVec2, angle: f64, length: f64) -> DVec2 {
    from + DVec2::new(angle.sin(), angle.cos()) * length
}

/// Normalize to [-pi, pi).
pub fn normal_relative_angle(angle: f64) -> f64 {
    let a = angle % TAU;
    if a >= 0.0 {
        if a < PI {
            a
        } else {
            a - TAU
        }
    } else if a >= -PI {
        a
    } else {
        a + TAU
    }
}

/// Normalize to [0, 2pi).
pub fn normal_absolute_angle(angle: f64) -> f64 {
    angle.rem_euclid(TAU)
}

/// Shift `angle` by whole turns so it lies within pi of `reference`.
pub fn normalize_angle(angle: f64, reference: f64) -> f64 {
    if !angle.is_finite() || !reference.is_finite() {
        return angle;
    }
    let turns = ((reference - angle) / TAU).round();
    angle + turns * TAU
}

/// Clamp `value` into `[min, max]`, favouring `min` if the bounds cross.
pub fn limit(min: f64, value: f64, max: f64) -> f64 {
    min.max(value.min(max))
}

/// -1 for negative values, 1 otherwise.
pub fn non_zero_sign(value: f64) -> i32 {
    if value < 0.0 {
        -1
    } else {
        1
    }
}

/// Angle subtended by half a hitbox at `distance`.
pub fn bot_width_aim_angle(distance: f64) -> f64 {
    (BOT_HALF_WIDTH / distance).abs()
}

/// Ticks for a bullet moving at `speed` to cover `distance`.
pub fn bullet_ticks(distance: f64, speed: f64) -> i64 {
    (distance / speed).ceil() as i64
}

/// Signed acceleration relative to the previous direction of travel.
pub fn acceleration(speed: f64, previous_speed: f64) -> f64 {
    let accel = speed - previous_speed;
    if previous_speed == 0.0 {
        accel.abs()
    } else {
        accel * previous_speed.signum()
    }
}

/// 95% margin of error of a proportion estimated from `samples` trials.
///
/// Infinite when there are no samples.
pub fn margin_of_error(probability: f64, samples: u32) -> f64 {
    if samples == 0 {
        return f64::INFINITY;
    }
    CONFIDENCE_Z * (probability * (1.0 - probability) / samples as f64).sqrt()
}

/// `count` evenly spaced offsets spanning `[-max_escape_angle, max_escape_angle]`.
pub fn firing_angle_offsets(count: usize, max_escape_angle: f64) -> Vec<f64> {
    let zero = (count.saturating_sub(1) / 2).max(1) as f64;
    (0..count)
        .map(|i| ((i as f64 - zero) / zero) * max_escape_angle)
        .collect()
}

/// Shortest distance from `source` to the hitbox of `state`, 0 when inside.
pub fn distance_point_to_bot(source: DVec2, state: &KinematicState) -> f64 {
    let loc = state.location;
    if source.x > loc.x - BOT_HALF_WIDTH
        && source.x < loc.x + BOT_HALF_WIDTH
        && source.y > loc.y - BOT_HALF_WIDTH
        && source.y < loc.y + BOT_HALF_WIDTH
    {
        return 0.0;
    }
    state
        .sides()
        .iter()
        .map(|side| side.distance_to_point(source))
        .fold(f64::INFINITY, f64::min)
}

/// Straight segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: DVec2,
    pub end: DVec2,
}

impl Segment {
    pub fn new(start: DVec2, end: DVec2) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Distance from `point` to the closest point of the segment.
    pub fn distance_to_point(&self, point: DVec2) -> f64 {
        let d = self.end - self.start;
        let len_sq = d.length_squared();
        if len_sq == 0.0 {
            return self.start.distance(point);
        }
        let t = ((point - self.start).dot(d) / len_sq).clamp(0.0, 1.0);
        (self.start + d * t).distance(point)
    }
}

/// Circle used for wave envelopes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: DVec2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: DVec2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Strictly inside.
    pub fn contains(&self, point: DVec2) -> bool {
        self.center.distance_squared(point) < self.radius * self.radius
    }

    /// Points where the circle crosses the interior of `segment`.
    ///
    /// Endpoints never count as crossings. A zero-length segment has none.
    pub fn intersect_segment(&self, segment: &Segment) -> Vec<DVec2> {
        let d = segment.end - segment.start;
        let f = segment.start - self.center;
        let a = d.length_squared();
        if a == 0.0 || !a.is_finite() {
            return Vec::new();
        }
        let b = 2.0 * f.dot(d);
        let c = f.length_squared() - self.radius * self.radius;
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return Vec::new();
        }

        let root = discriminant.sqrt();
        let mut hits = Vec::with_capacity(2);
        let t1 = (-b + root) / (2.0 * a);
        if t1 > 0.0 && t1 < 1.0 {
            hits.push(segment.start + d * t1);
        }
        if root > 0.0 {
            let t2 = (-b - root) / (2.0 * a);
            if t2 > 0.0 && t2 < 1.0 {
                hits.push(segment.start + d * t2);
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bearing_is_compass_style() {
        let origin = DVec2::ZERO;
        assert_abs_diff_eq!(absolute_bearing(origin, DVec2::new(0.0, 10.0)), 0.0);
        assert_abs_diff_eq!(
            absolute_bearing(origin, DVec2::new(10.0, 0.0)),
            PI / 2.0,
            epsilon = 1e-12
        );
        let p = project(origin, PI / 2.0, 5.0);
        assert_abs_diff_eq!(p.x, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_angle_range() {
        for raw in [-7.0, -PI, -1.0, 0.0, 1.0, PI, 4.0, 13.0] {
            let a = normal_relative_angle(raw);
            assert!((-PI..PI).contains(&a), "{raw} normalized to {a}");
            assert_abs_diff_eq!(a.sin(), raw.sin(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_normalize_angle_near_reference() {
        let a = normalize_angle(0.1, 2.0 * TAU);
        assert_abs_diff_eq!(a, 0.1 + 2.0 * TAU, epsilon = 1e-12);
        let b = normalize_angle(-3.0, 3.0);
        assert!((b - 3.0).abs() <= PI);
    }

    #[test]
    fn test_firing_angle_offsets_symmetric() {
        let offsets = firing_angle_offsets(59, 0.5);
        assert_eq!(offsets.len(), 59);
        assert_abs_diff_eq!(offsets[0], -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(offsets[29], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(offsets[58], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_circle_segment_crossings() {
        let circle = Circle::new(DVec2::ZERO, 10.0);
        let through = Segment::new(DVec2::new(-20.0, 0.0), DVec2::new(20.0, 0.0));
        assert_eq!(circle.intersect_segment(&through).len(), 2);

        let vertical = Segment::new(DVec2::new(0.0, 0.0), DVec2::new(0.0, 30.0));
        let hits = circle.intersect_segment(&vertical);
        assert_eq!(hits.len(), 1);
        assert_abs_diff_eq!(hits[0].y, 10.0, epsilon = 1e-9);

        let outside = Segment::new(DVec2::new(15.0, -5.0), DVec2::new(15.0, 5.0));
        assert!(circle.intersect_segment(&outside).is_empty());

        let degenerate = Segment::new(DVec2::new(10.0, 0.0), DVec2::new(10.0, 0.0));
        assert!(circle.intersect_segment(&degenerate).is_empty());
    }

    #[test]
    fn test_distance_point_to_bot() {
        let state = KinematicState::at(DVec2::new(100.0, 100.0), 0);
        assert_eq!(distance_point_to_bot(DVec2::new(100.0, 110.0), &state), 0.0);
        assert_abs_diff_eq!(
            distance_point_to_bot(DVec2::new(100.0, 200.0), &state),
            82.0,
            epsilon = 1e-9
        );
        // Diagonal: nearest feature is the corner.
        let d = distance_point_to_bot(DVec2::new(128.0, 128.0), &state);
        assert_abs_diff_eq!(d, (200.0_f64).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_margin_of_error_without_samples() {
        assert!(margin_of_error(0.0, 0).is_infinite());
        assert_abs_diff_eq!(margin_of_error(0.5, 100), 0.098, epsilon = 1e-9);
    }
}
