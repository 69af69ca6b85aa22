//! Fundamental kinematic types.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::constants::BOT_HALF_WIDTH;
use crate::geometry::{absolute_bearing, Segment};

/// Location or displacement in arena units. x grows East, y grows North.
pub type Point = DVec2;

/// Discrete simulation tick within a round.
pub type Tick = i64;

/// One tick's pose of a body.
///
/// Heading is in radians (0 = North, clockwise). Speed is signed: negative
/// means the body is driving backwards along its heading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub location: Point,
    pub heading: f64,
    pub speed: f64,
    pub tick: Tick,
    /// Derived from two bracketing observed states rather than observed.
    #[serde(default)]
    pub interpolated: bool,
}

impl KinematicState {
    pub fn new(location: Point, heading: f64, speed: f64, tick: Tick) -> Self {
        Self {
            location,
            heading,
            speed,
            tick,
            interpolated: false,
        }
    }

    /// Stationary state facing North.
    pub fn at(location: Point, tick: Tick) -> Self {
        Self::new(location, 0.0, 0.0, tick)
    }

    /// Heading of actual travel, flipped when driving backwards.
    pub fn effective_heading(&self) -> f64 {
        if self.speed < 0.0 {
            self.heading + std::f64::consts::PI
        } else {
            self.heading
        }
    }

    /// Hitbox corners: (-,-), (-,+), (+,-), (+,+).
    pub fn corners(&self) -> [Point; 4] {
        let Point { x, y } = self.location;
        let h = BOT_HALF_WIDTH;
        [
            Point::new(x - h, y - h),
            Point::new(x - h, y + h),
            Point::new(x + h, y - h),
            Point::new(x + h, y + h),
        ]
    }

    /// Hitbox edges: bottom, right, top, left.
    pub fn sides(&self) -> [Segment; 4] {
        let [bl, tl, br, tr] = self.corners();
        [
            Segment::new(bl, br),
            Segment::new(br, tr),
            Segment::new(tr, tl),
            Segment::new(tl, bl),
        ]
    }

    pub fn bearing_to(&self, other: Point) -> f64 {
        absolute_bearing(self.location, other)
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        self.location.distance(other)
    }
}
