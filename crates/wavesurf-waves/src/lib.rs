//! Waves for wavesurf.
//!
//! A wave is the expanding circle of every place a bullet fired on some
//! tick could be. This crate models single waves, the motion prediction
//! used to bound them, shadows from our own bullets, and the per-body
//! registry that tracks waves until they pass their target.

pub mod manager;
pub mod predictor;
pub mod shadow;
pub mod wave;

pub use manager::{WaveBreak, WaveFilter, WaveManager};
pub use predictor::MotionPredictor;
pub use shadow::{cast_bullet_shadows, FiredBullet};
pub use wave::{BulletShadow, Intersection, TargetFeatures, Wave, WaveId, WaveInit};

#[cfg(test)]
mod tests;
