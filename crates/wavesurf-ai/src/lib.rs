//! Learning and decision making for wavesurf.
//!
//! Statistical views remember where opponents were when waves broke and
//! where their bullets were aimed. Two gun strategies read the views to
//! pick a firing angle, a virtual gun arbiter rates them, and the surf
//! mover scores movement options against the opponent's own aim. With
//! several opponents alive the melee mover and the melee aim weigh all of
//! them at once.

pub mod aim;
pub mod arbitration;
pub mod features;
pub mod knn;
pub mod melee;
pub mod profiles;
pub mod stats;
pub mod surf;

pub use aim::{aim_at_everyone, AimResult, GunConfig, GunSample, GunViews, MeleeTarget};
pub use arbitration::{GunStats, StrategyArbiter};
pub use features::FeatureFormula;
pub use knn::{Neighbor, Stamp, StatisticalView};
pub use melee::{MeleeConfig, MeleeMover, Threat};
pub use profiles::ViewConfig;
pub use stats::HitStats;
pub use surf::{SurfConfig, SurfContext, SurfMover, SurfableWaves};
