//! Reentry - Atmospheric Trajectory Prediction
//!
//! A library crate predicting where a vessel will go once it meets an
//! atmosphere: analytic conics in vacuum, numerically integrated flight
//! through the air, and the impact point on the ground.

pub mod aero;
pub mod math;
pub mod orbit;
pub mod physics;
pub mod plugin;
pub mod prediction;
pub mod profile;
pub mod terrain;
pub mod types;

#[cfg(test)]
pub mod test_utils;
