//! Virtual guns: every strategy fires an imaginary bullet alongside each
//! real one, and the best scorer gets the real gun.

use std::collections::{BTreeMap, HashMap};

use log::{info, warn};

use wavesurf_core::constants::{TYPICAL_ANGULAR_BOT_WIDTH, TYPICAL_GUN_ESCAPE_RANGE, VIRTUAL_HIT_DECAY_BASE};
use wavesurf_core::enums::StrategyKind;
use wavesurf_core::events::StrategyRating;
use wavesurf_core::geometry::normal_relative_angle;
use wavesurf_waves::{Wave, WaveId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GunStats {
    pub shots_fired: u32,
    /// Sum of weighted, miss-decayed virtual hits.
    pub shots_hit: f64,
    virtual_bullets: HashMap<WaveId, f64>,
}

impl GunStats {
    pub fn rating(&self) -> f64 {
        if self.shots_fired == 0 {
            0.0
        } else {
            self.shots_hit / self.shots_fired as f64
        }
    }

    pub fn in_flight(&self) -> usize {
        self.virtual_bullets.len()
    }
}

/// Ratings of each strategy against each opponent.
#[derive(Debug, Clone, Default)]
pub struct StrategyArbiter {
    stats: BTreeMap<StrategyKind, HashMap<String, GunStats>>,
}

impl StrategyArbiter {
    pub fn new() -> Self {
        Self {
            stats: StrategyKind::ALL.iter().map(|&kind| (kind, HashMap::new())).collect(),
        }
    }

    /// Record the angle `strategy` would have fired on `wave`.
    pub fn fire_virtual_bullet(&mut self, strategy: StrategyKind, wave: &Wave, angle: f64) {
        self.stats_mut(strategy, &wave.owner).virtual_bullets.insert(wave.id, angle);
    }

    /// Score every virtual bullet riding `wave` now that the opponent's
    /// true angle and its angular tolerance are known.
    pub fn register_wave_break(&mut self, wave: &Wave, hit_angle: f64, tolerance: f64) {
        if tolerance.is_nan() || tolerance <= 0.0 {
            warn!("ignoring wave break with tolerance {tolerance} against {}", wave.owner);
            return;
        }
        let hit_weight = (TYPICAL_ANGULAR_BOT_WIDTH / (tolerance * 2.0))
            * (wave.escape_angle_range() / TYPICAL_GUN_ESCAPE_RANGE);
        for kind in StrategyKind::ALL {
            let Some(angle) = self.stats_mut(kind, &wave.owner).virtual_bullets.remove(&wave.id) else {
                continue;
            };
            let miss = normal_relative_angle(angle - hit_angle).abs() / tolerance;
            self.record_shot(&wave.owner, kind, hit_weight * VIRTUAL_HIT_DECAY_BASE.powf(-miss));
        }
    }

    /// Add a scored shot directly.
    pub fn record_shot(&mut self, opponent: &str, strategy: StrategyKind, hit_weight: f64) {
        let stats = self.stats_mut(strategy, opponent);
        stats.shots_hit += hit_weight;
        stats.shots_fired += 1;
    }

    /// Drop bullets still in flight; ratings carry over.
    pub fn init_round(&mut self) {
        for by_opponent in self.stats.values_mut() {
            for stats in by_opponent.values_mut() {
                stats.virtual_bullets.clear();
            }
        }
    }

    pub fn stats(&self, strategy: StrategyKind, opponent: &str) -> Option<&GunStats> {
        self.stats.get(&strategy)?.get(opponent)
    }

    pub fn rating(&self, strategy: StrategyKind, opponent: &str) -> f64 {
        self.stats(strategy, opponent).map_or(0.0, GunStats::rating)
    }

    pub fn shots_fired(&self, strategy: StrategyKind, opponent: &str) -> u32 {
        self.stats(strategy, opponent).map_or(0, |s| s.shots_fired)
    }

    /// Highest rated strategy; ties go to the earlier declared one.
    pub fn best(&self, opponent: &str) -> StrategyKind {
        let mut best = StrategyKind::ALL[0];
        let mut best_rating = self.rating(best, opponent);
        for kind in StrategyKind::ALL.into_iter().skip(1) {
            let rating = self.rating(kind, opponent);
            if rating > best_rating {
                best = kind;
                best_rating = rating;
            }
        }
        best
    }

    pub fn ratings(&self, opponent: &str) -> Vec<StrategyRating> {
        StrategyKind::ALL
            .iter()
            .map(|&strategy| StrategyRating {
                opponent: opponent.to_string(),
                strategy,
                rating: self.rating(strategy, opponent),
                shots: self.shots_fired(strategy, opponent),
            })
            .collect()
    }

    pub fn log_ratings(&self, opponent: &str) {
        info!("Virtual gun ratings for {opponent}:");
        for rating in self.ratings(opponent) {
            info!("  {}: {:.2}", rating.strategy.label(), rating.rating * 100.0);
        }
    }

    fn stats_mut(&mut self, strategy: StrategyKind, opponent: &str) -> &mut GunStats {
        self.stats
            .entry(strategy)
            .or_default()
            .entry(opponent.to_string())
            .or_default()
    }
}
