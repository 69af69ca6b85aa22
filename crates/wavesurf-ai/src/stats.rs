//! How often an opponent's real bullets hit us.

use serde::{Deserialize, Serialize};

use wavesurf_core::constants::{TYPICAL_ANGULAR_BOT_WIDTH, TYPICAL_SURF_ESCAPE_RANGE};
use wavesurf_core::geometry::margin_of_error;
use wavesurf_waves::{Intersection, Wave};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitCounts {
    pub shots_fired: u32,
    pub shots_hit: u32,
    /// Hits scaled by how hard each one was to land.
    pub weighted_hits: f64,
}

impl HitCounts {
    fn record(&mut self, weighted_hit: Option<f64>) {
        self.shots_fired += 1;
        if let Some(weight) = weighted_hit {
            self.shots_hit += 1;
            self.weighted_hits += weight;
        }
    }
}

/// Hit counters for the whole match and for the current round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitStats {
    pub total: HitCounts,
    pub round: HitCounts,
}

impl HitStats {
    /// Score a firing wave that finished passing us. Waves whose bullet was
    /// destroyed mid-air are not counted.
    pub fn record_break(&mut self, wave: &Wave, intersection: &Intersection) {
        if wave.bullet_hit_bullet {
            return;
        }
        let weighted_hit = wave.hit_by_bullet.then(|| {
            let angular_width = intersection.bandwidth * 2.0;
            if angular_width > 0.0 {
                (TYPICAL_ANGULAR_BOT_WIDTH / angular_width)
                    * (wave.escape_angle_range() / TYPICAL_SURF_ESCAPE_RANGE)
            } else {
                1.0
            }
        });
        self.total.record(weighted_hit);
        self.round.record(weighted_hit);
    }

    pub fn reset_round(&mut self) {
        self.round = HitCounts::default();
    }

    /// Weighted hits per shot, 0 before any shot.
    pub fn normalized_hit_rate(&self) -> f64 {
        match self.total.shots_fired {
            0 => 0.0,
            fired => self.total.weighted_hits / fired as f64,
        }
    }

    pub fn normalized_hit_percentage(&self) -> f64 {
        100.0 * self.normalized_hit_rate()
    }

    pub fn raw_hit_percentage(&self) -> f64 {
        match self.total.shots_fired {
            0 => 0.0,
            fired => 100.0 * self.total.shots_hit as f64 / fired as f64,
        }
    }

    /// Margin of error of the normalized hit percentage. Infinite before
    /// any shot.
    pub fn margin_of_error_percentage(&self) -> f64 {
        100.0 * margin_of_error(self.normalized_hit_rate(), self.total.shots_fired)
    }
}
