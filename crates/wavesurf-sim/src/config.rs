//! Engine configuration.

use serde::{Deserialize, Serialize};

use wavesurf_ai::{GunConfig, MeleeConfig, SurfConfig};
use wavesurf_core::arena::Arena;
use wavesurf_core::rules::KinematicRules;
use wavesurf_core::WavesurfError;

/// Everything needed to start an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub arena: Arena,
    pub rules: KinematicRules,
    pub surf: SurfConfig,
    pub melee: MeleeConfig,
    pub gun: GunConfig,
    /// Attach the explain trace to every report.
    pub explain: bool,
    /// RNG seed for melee movement and the scripted duel. Same seed = same
    /// decisions.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arena: Arena::default(),
            rules: KinematicRules::default(),
            surf: SurfConfig::default(),
            melee: MeleeConfig::default(),
            gun: GunConfig::default(),
            explain: false,
            seed: 42,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), WavesurfError> {
        self.arena.validate()?;
        self.rules.validate()?;
        self.surf.validate()?;
        self.melee.validate()?;
        self.gun.validate()
    }
}
