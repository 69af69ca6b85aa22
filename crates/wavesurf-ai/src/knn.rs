//! Capacity-bounded nearest-neighbor store behind every statistical view.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use wavesurf_core::types::Tick;
use wavesurf_core::WavesurfError;
use wavesurf_waves::Wave;

use crate::profiles::ViewConfig;

/// When a data point was logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub round: u32,
    pub tick: Tick,
}

impl Stamp {
    pub fn new(round: u32, tick: Tick) -> Self {
        Self { round, tick }
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    point: Vec<f64>,
    value: T,
    stamp: Stamp,
    seq: u64,
}

/// One query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<T> {
    pub value: T,
    pub stamp: Stamp,
    /// Weighted squared Euclidean distance to the query point.
    pub distance: f64,
    seq: u64,
}

impl<T> Neighbor<T> {
    fn recency(&self, other: &Self) -> Ordering {
        self.stamp.cmp(&other.stamp).then(self.seq.cmp(&other.seq))
    }
}

/// A configured lens over (feature vector, outcome) pairs.
#[derive(Debug, Clone)]
pub struct StatisticalView<T> {
    config: ViewConfig,
    weights: Vec<f64>,
    entries: VecDeque<Entry<T>>,
    next_seq: u64,
    /// Neighbors per lookahead index, dropped by any write.
    cache: HashMap<usize, Vec<Neighbor<T>>>,
}

impl<T: Clone> StatisticalView<T> {
    pub fn new(config: ViewConfig) -> Result<Self, WavesurfError> {
        let weights = config.formula.default_weights();
        Self::with_weights(config, weights)
    }

    /// View over points that do not come from the configured formula.
    pub fn with_weights(config: ViewConfig, weights: Vec<f64>) -> Result<Self, WavesurfError> {
        config.validate()?;
        if weights.is_empty() {
            return Err(WavesurfError::config("view.weights", format!("`{}` has no dimensions", config.name)));
        }
        Ok(Self {
            config,
            weights,
            entries: VecDeque::new(),
            next_seq: 0,
            cache: HashMap::new(),
        })
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn weight(&self) -> f64 {
        self.config.weight
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Replace the distance weights. Extra or missing entries are ignored.
    pub fn set_weights(&mut self, weights: &[f64]) {
        for (current, &new) in self.weights.iter_mut().zip(weights) {
            *current = new;
        }
        self.cache.clear();
    }

    pub fn log(&mut self, point: Vec<f64>, value: T, stamp: Stamp) {
        self.entries.push_back(Entry {
            point,
            value,
            stamp,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        if let Some(capacity) = self.config.capacity {
            while self.entries.len() > capacity {
                self.entries.pop_front();
            }
        }
        self.cache.clear();
    }

    /// Log `wave` as seen after it broke.
    pub fn log_wave(&mut self, wave: &Wave, value: T, stamp: Stamp) {
        let point = self.config.formula.data_point(wave, false);
        self.log(point, value, stamp);
    }

    /// Neighbors to return for the current size.
    pub fn dynamic_k(&self) -> usize {
        (self.len() / self.config.k_divisor).clamp(1, self.config.k)
    }

    /// Up to `k` nearest entries, closest first. Ties go to the older entry.
    pub fn nearest(&self, point: &[f64], k: usize) -> Vec<Neighbor<T>> {
        let mut found: Vec<Neighbor<T>> = self
            .entries
            .iter()
            .map(|entry| Neighbor {
                value: entry.value.clone(),
                stamp: entry.stamp,
                distance: self.distance(&entry.point, point),
                seq: entry.seq,
            })
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.seq.cmp(&b.seq)));
        found.truncate(k);
        found
    }

    pub fn nearest_for_wave(&self, wave: &Wave, aiming: bool) -> Vec<Neighbor<T>> {
        let point = self.config.formula.data_point(wave, aiming);
        self.nearest(&point, self.dynamic_k())
    }

    /// Neighbors of `wave` for lookahead slot `key`, computed once per
    /// slot until the next write.
    pub fn nearest_cached(&mut self, key: usize, wave: &Wave) -> &[Neighbor<T>] {
        if !self.cache.contains_key(&key) {
            let found = self.nearest_for_wave(wave, false);
            self.cache.insert(key, found);
        }
        self.cache.get(&key).map_or(&[], Vec::as_slice)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Whether the view should contribute given the opponent's hit
    /// percentage and its margin of error.
    pub fn enabled(&self, hit_percentage: f64, margin_of_error: f64) -> bool {
        !self.is_empty()
            && margin_of_error.is_finite()
            && hit_percentage >= self.config.hit_threshold
            && (hit_percentage - margin_of_error).max(0.0) >= self.config.padded_hit_threshold
    }

    /// Recency weight of each neighbor, in input order. The newest gets 1,
    /// each older one is divided by the decay rate once more.
    pub fn decay_weights(&self, neighbors: &[Neighbor<T>]) -> Vec<f64> {
        let Some(rate) = self.config.decay_rate else {
            return vec![1.0; neighbors.len()];
        };
        let mut order: Vec<usize> = (0..neighbors.len()).collect();
        order.sort_by(|&a, &b| neighbors[a].recency(&neighbors[b]));

        let n = neighbors.len();
        let mut weights = vec![1.0; n];
        for (rank, &index) in order.iter().enumerate() {
            weights[index] = 1.0 / rate.powi((n - rank - 1) as i32);
        }
        weights
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(a.iter().zip(b))
            .map(|(w, (x, y))| {
                let d = (x - y) * w;
                d * d
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureFormula;
    use approx::assert_abs_diff_eq;

    fn view(k: usize, k_divisor: usize, capacity: Option<usize>, decay_rate: Option<f64>) -> StatisticalView<f64> {
        let config = ViewConfig {
            name: "test".into(),
            formula: FeatureFormula::Simple,
            k,
            k_divisor,
            capacity,
            decay_rate,
            ..Default::default()
        };
        StatisticalView::new(config).unwrap()
    }

    #[test]
    fn test_dynamic_k_clamps() {
        let mut v = view(5, 2, None, None);
        assert_eq!(v.dynamic_k(), 1);
        for i in 0..7 {
            v.log(vec![i as f64, 0.0, 0.0], i as f64, Stamp::new(0, i));
        }
        assert_eq!(v.dynamic_k(), 3);
        for i in 7..40 {
            v.log(vec![i as f64, 0.0, 0.0], i as f64, Stamp::new(0, i));
        }
        assert_eq!(v.dynamic_k(), 5);
    }

    #[test]
    fn test_nearest_uses_weights() {
        let mut v = view(2, 1, None, None);
        v.set_weights(&[1.0, 10.0, 1.0]);
        v.log(vec![0.5, 0.0, 0.0], 1.0, Stamp::default());
        v.log(vec![0.0, 0.1, 0.0], 2.0, Stamp::default());
        let found = v.nearest(&[0.0, 0.0, 0.0], 1);
        // 0.25 beats (0.1 * 10)^2 = 1.0
        assert_eq!(found[0].value, 1.0);
        assert_abs_diff_eq!(found[0].distance, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_enabled_thresholds() {
        let mut v = view(1, 1, None, None);
        assert!(!v.enabled(50.0, 1.0));
        v.log(vec![0.0; 3], 0.0, Stamp::default());
        assert!(v.enabled(0.0, 5.0));
        assert!(!v.enabled(0.0, f64::INFINITY));

        v.config.hit_threshold = 2.5;
        assert!(!v.enabled(2.0, 0.0));
        assert!(v.enabled(3.0, 0.0));

        v.config.padded_hit_threshold = 5.9;
        assert!(!v.enabled(8.0, 3.0));
        assert!(v.enabled(10.0, 3.0));
    }

    #[test]
    fn test_decay_weights_favor_recent() {
        let mut v = view(3, 1, None, Some(2.0));
        v.log(vec![0.0; 3], 0.0, Stamp::new(1, 50));
        v.log(vec![0.0; 3], 1.0, Stamp::new(0, 90));
        v.log(vec![0.0; 3], 2.0, Stamp::new(1, 10));
        let found = v.nearest(&[0.0; 3], 3);
        let weights = v.decay_weights(&found);
        for (neighbor, weight) in found.iter().zip(&weights) {
            let expected = match neighbor.value as u32 {
                0 => 1.0,
                2 => 0.5,
                _ => 0.25,
            };
            assert_abs_diff_eq!(*weight, expected, epsilon = 1e-12);
        }

        let flat = view(3, 1, None, None);
        assert_eq!(flat.decay_weights(&found), vec![1.0; 3]);
    }

    #[test]
    fn test_write_clears_cache() {
        let mut v = view(1, 1, None, None);
        v.log(vec![0.0; 3], 0.0, Stamp::default());
        v.cache.insert(0, Vec::new());
        v.log(vec![1.0; 3], 1.0, Stamp::default());
        assert!(v.cache.is_empty());
        v.cache.insert(0, Vec::new());
        v.set_weights(&[2.0, 2.0, 2.0]);
        assert!(v.cache.is_empty());
    }
}
