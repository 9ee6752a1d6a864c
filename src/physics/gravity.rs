//! Point-mass gravity and air-relative velocity.

use bevy::math::DVec3;

use crate::types::BodyParams;

/// Gravitational acceleration toward the body's center.
///
/// # Arguments
/// * `position` - Position relative to the body's center (meters)
/// * `mu` - Gravitational parameter GM (m³/s²)
///
/// # Returns
/// Acceleration vector in m/s²
#[inline]
pub fn point_mass_gravity(position: DVec3, mu: f64) -> DVec3 {
    let r_squared = position.length_squared();

    // Avoid the singularity at the center. Anything that close has already hit the ground.
    if r_squared <= 1.0 {
        return DVec3::ZERO;
    }
    let r = r_squared.sqrt();
    -position * (mu / (r_squared * r))
}

/// Velocity relative to the co-rotating atmosphere.
#[inline]
pub fn air_velocity(body: &BodyParams, position: DVec3, velocity: DVec3) -> DVec3 {
    velocity - body.surface_velocity(position)
}
