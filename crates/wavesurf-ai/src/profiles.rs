//! View configurations and the preset view sets.
//!
//! Consolidates the tuned parameters of every statistical view the gun and
//! the surf movement keep per opponent.

use serde::{Deserialize, Serialize};

use wavesurf_core::WavesurfError;

use crate::features::FeatureFormula;

/// Hit percentage the recent-scan surf views wait for.
const RECENT_SCANS_HIT_THRESHOLD: f64 = 2.5;
/// Padded hit percentage that enables the light flattener.
const LIGHT_FLATTENER_HIT_THRESHOLD: f64 = 3.0;
/// Padded hit percentage that enables the flatteners.
const FLATTENER_HIT_THRESHOLD: f64 = 5.9;

/// One configured lens over an opponent's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub name: String,
    pub formula: FeatureFormula,
    /// Relative weight of this view when views are combined.
    pub weight: f64,
    /// Largest number of neighbors returned.
    pub k: usize,
    /// Neighbors returned grow as size / k_divisor up to `k`.
    pub k_divisor: usize,
    /// Oldest points are evicted beyond this many.
    pub capacity: Option<usize>,
    pub log_bullet_hits: bool,
    pub log_visits: bool,
    /// Log waves that did not carry a real bullet.
    pub log_virtual: bool,
    /// Log waves fired while more than one opponent was alive.
    pub log_melee: bool,
    /// Minimum observed hit percentage.
    pub hit_threshold: f64,
    /// Minimum hit percentage after subtracting its margin of error.
    pub padded_hit_threshold: f64,
    /// Base of the recency decay across returned neighbors.
    pub decay_rate: Option<f64>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            formula: FeatureFormula::Normal,
            weight: 1.0,
            k: 1,
            k_divisor: 1,
            capacity: None,
            log_bullet_hits: false,
            log_visits: false,
            log_virtual: false,
            log_melee: false,
            hit_threshold: 0.0,
            padded_hit_threshold: 0.0,
            decay_rate: None,
        }
    }
}

impl ViewConfig {
    fn new(name: &str, formula: FeatureFormula) -> Self {
        Self {
            name: name.to_string(),
            formula,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), WavesurfError> {
        if self.k == 0 {
            return Err(WavesurfError::config("view.k", format!("`{}` must return at least one neighbor", self.name)));
        }
        if self.k_divisor == 0 {
            return Err(WavesurfError::config("view.k_divisor", format!("`{}` has a zero divisor", self.name)));
        }
        if self.capacity == Some(0) {
            return Err(WavesurfError::config("view.capacity", format!("`{}` cannot hold any points", self.name)));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(WavesurfError::config("view.weight", format!("`{}` has weight {}", self.name, self.weight)));
        }
        if let Some(rate) = self.decay_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(WavesurfError::config("view.decay_rate", format!("`{}` has decay rate {rate}", self.name)));
            }
        }
        Ok(())
    }
}

/// Surf views kept against every opponent's gun.
pub fn surf_views(decay_rate: f64) -> Vec<ViewConfig> {
    let recent = |name: &str, k: usize, k_divisor: usize, capacity: Option<usize>, decay: bool| ViewConfig {
        weight: 100.0,
        k,
        k_divisor,
        capacity,
        hit_threshold: RECENT_SCANS_HIT_THRESHOLD,
        decay_rate: decay.then_some(decay_rate),
        log_bullet_hits: true,
        ..ViewConfig::new(name, FeatureFormula::Normal)
    };

    vec![
        ViewConfig {
            weight: 3.0,
            k: 25,
            k_divisor: 5,
            log_bullet_hits: true,
            ..ViewConfig::new("simple", FeatureFormula::Simple)
        },
        ViewConfig {
            weight: 40.0,
            k: 20,
            k_divisor: 5,
            hit_threshold: 3.0,
            log_bullet_hits: true,
            ..ViewConfig::new("normal", FeatureFormula::Normal)
        },
        recent("recent1", 1, 1, Some(1), false),
        recent("recent2", 1, 1, Some(5), false),
        recent("recent3", 1, 1, None, true),
        recent("recent4", 7, 4, None, true),
        recent("recent5", 35, 3, None, true),
        recent("recent6", 100, 2, None, true),
        ViewConfig {
            weight: 10.0,
            k: 50,
            k_divisor: 5,
            capacity: Some(1000),
            padded_hit_threshold: LIGHT_FLATTENER_HIT_THRESHOLD,
            log_visits: true,
            ..ViewConfig::new("light_flattener", FeatureFormula::Normal)
        },
        ViewConfig {
            weight: 50.0,
            k: 25,
            k_divisor: 12,
            capacity: Some(300),
            padded_hit_threshold: FLATTENER_HIT_THRESHOLD,
            log_visits: true,
            ..ViewConfig::new("flattener", FeatureFormula::Flattener)
        },
        ViewConfig {
            weight: 500.0,
            k: 50,
            k_divisor: 14,
            capacity: Some(2000),
            padded_hit_threshold: FLATTENER_HIT_THRESHOLD,
            decay_rate: Some(decay_rate),
            log_visits: true,
            ..ViewConfig::new("flattener2", FeatureFormula::Flattener)
        },
    ]
}

/// Single view behind the main guess-factor gun.
pub fn main_gun_view() -> ViewConfig {
    ViewConfig {
        k: 225,
        k_divisor: 9,
        log_visits: true,
        log_virtual: true,
        ..ViewConfig::new("trip_hammer", FeatureFormula::TripHammer)
    }
}

/// View behind the melee gun. It learns from every wave, alt waves from
/// other opponents included, and is queried with a k set at aim time.
pub fn melee_gun_view() -> ViewConfig {
    ViewConfig {
        k: 100,
        k_divisor: 10,
        log_visits: true,
        log_virtual: true,
        log_melee: true,
        ..ViewConfig::new("melee", FeatureFormula::Melee)
    }
}

/// Small recent-history views behind the anti-surfer gun.
pub fn anti_surfer_views() -> Vec<ViewConfig> {
    [125, 400, 1500, 4000]
        .iter()
        .enumerate()
        .map(|(i, &capacity)| ViewConfig {
            k: 3,
            k_divisor: 10,
            capacity: Some(capacity),
            log_visits: true,
            log_virtual: true,
            ..ViewConfig::new(&format!("anti_surfer{}", i + 1), FeatureFormula::AntiSurfer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for view in surf_views(1.8)
            .iter()
            .chain([main_gun_view(), melee_gun_view()].iter())
            .chain(anti_surfer_views().iter())
        {
            view.validate().unwrap();
        }
    }

    #[test]
    fn test_surf_preset_shape() {
        let views = surf_views(1.8);
        assert_eq!(views.len(), 11);
        let flatteners = views.iter().filter(|v| v.log_visits).count();
        assert_eq!(flatteners, 3);
        assert!(views.iter().all(|v| v.log_bullet_hits != v.log_visits));
        let recent4 = views.iter().find(|v| v.name == "recent4").unwrap();
        assert_eq!((recent4.k, recent4.k_divisor), (7, 4));
        assert_eq!(recent4.decay_rate, Some(1.8));
    }

    #[test]
    fn test_invalid_view_rejected() {
        let view = ViewConfig {
            k_divisor: 0,
            ..ViewConfig::new("broken", FeatureFormula::Simple)
        };
        let err = view.validate().unwrap_err();
        assert!(err.to_string().contains("view.k_divisor"));
    }
}
