//! Time-indexed kinematic history with interpolation for missing ticks.

use std::collections::BTreeMap;

use crate::error::WavesurfError;
use crate::geometry::normalize_angle;
use crate::types::{KinematicState, Point, Tick};

/// Linear blend between two observations bracketing `tick`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolator {
    tick: Tick,
    before: Tick,
    after: Tick,
    weight_before: f64,
    weight_after: f64,
}

impl Interpolator {
    /// Requires `before < tick < after`.
    pub fn new(tick: Tick, before: Tick, after: Tick) -> Result<Self, WavesurfError> {
        if tick <= before || tick >= after {
            return Err(WavesurfError::InvalidInterpolation { before, tick, after });
        }
        let span = (after - before) as f64;
        Ok(Self {
            tick,
            before,
            after,
            weight_before: (after - tick) as f64 / span,
            weight_after: (tick - before) as f64 / span,
        })
    }

    pub fn avg(&self, before: f64, after: f64) -> f64 {
        before * self.weight_before + after * self.weight_after
    }

    pub fn location(&self, before: Point, after: Point) -> Point {
        Point::new(self.avg(before.x, after.x), self.avg(before.y, after.y))
    }

    /// Blends along the shorter arc between the two headings.
    pub fn heading(&self, before: f64, after: f64) -> f64 {
        self.avg(before, normalize_angle(after, before))
    }

    /// Reconstruct a "ticks since event" counter at the interpolated tick.
    ///
    /// Counts back from the later value if the event predates `tick`,
    /// otherwise counts forward from the earlier value.
    pub fn timer(&self, before: Tick, after: Tick) -> Tick {
        let back = after - (self.after - self.tick);
        if back < 0 {
            before + (self.tick - self.before)
        } else {
            back
        }
    }
}

/// Observed states keyed by tick. Lookups of missing ticks interpolate
/// between the nearest observed neighbours and cache the result.
#[derive(Debug, Clone, Default)]
pub struct KinematicLog {
    states: BTreeMap<Tick, KinematicState>,
}

impl KinematicLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, state: KinematicState) {
        self.states.insert(state.tick, state);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// State stored for exactly `tick`, interpolated or not.
    pub fn get_exact(&self, tick: Tick) -> Option<&KinematicState> {
        self.states.get(&tick)
    }

    /// State at `tick`, interpolating when it was never observed.
    pub fn get(&mut self, tick: Tick) -> Option<KinematicState> {
        if let Some(state) = self.states.get(&tick) {
            return Some(*state);
        }
        let state = self.interpolate(tick)?;
        self.states.insert(tick, state);
        Some(state)
    }

    /// Like `get` but never interpolates; interpolated entries are hidden.
    pub fn get_observed(&self, tick: Tick) -> Option<KinematicState> {
        self.states
            .get(&tick)
            .filter(|state| !state.interpolated)
            .copied()
    }

    fn interpolate(&self, tick: Tick) -> Option<KinematicState> {
        let before = self
            .states
            .range(..tick)
            .rev()
            .map(|(_, s)| s)
            .find(|s| !s.interpolated)?;
        let after = self
            .states
            .range(tick + 1..)
            .map(|(_, s)| s)
            .find(|s| !s.interpolated)?;
        let interpolator = Interpolator::new(tick, before.tick, after.tick).ok()?;
        Some(KinematicState {
            location: interpolator.location(before.location, after.location),
            heading: interpolator.heading(before.heading, after.heading),
            speed: interpolator.avg(before.speed, after.speed),
            tick,
            interpolated: true,
        })
    }

    pub fn oldest(&self) -> Option<&KinematicState> {
        self.states.values().next()
    }

    pub fn latest(&self) -> Option<&KinematicState> {
        self.states.values().next_back()
    }

    /// Distance from `location` to where the body was `ticks_ago` before
    /// `tick`, or to the oldest known position if that is out of range.
    pub fn displacement_distance(&mut self, location: Point, tick: Tick, ticks_ago: Tick) -> f64 {
        let past = self
            .get(tick - ticks_ago)
            .or_else(|| self.oldest().copied());
        past.map_or(0.0, |state| location.distance(state.location))
    }

    /// States in tick order.
    pub fn iter(&self) -> impl Iterator<Item = &KinematicState> {
        self.states.values()
    }
}
