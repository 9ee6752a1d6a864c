//! Small vector helpers shared across the crate.

use bevy::math::{DQuat, DVec3};

use crate::types::BodyParams;

/// Swap the Y and Z axes.
///
/// The host's world frame is Y-up while the orbit math works Z-up. The swap is
/// its own inverse, so the same function converts in both directions.
#[inline]
pub fn swap_yz(v: DVec3) -> DVec3 {
    DVec3::new(v.x, v.z, v.y)
}

/// Clamp that tolerates NaN input (mapped to `min`) and inverted bounds.
#[inline]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Wrap an angle to `[-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

/// Some unit vector orthogonal to `v` (which must be non-zero).
pub fn perpendicular(v: DVec3) -> DVec3 {
    let helper = if v.x.abs() < 0.9 * v.length() {
        DVec3::X
    } else {
        DVec3::Z
    };
    v.cross(helper).normalize_or_zero()
}

/// Orthonormal frame attached to an air velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocityFrame {
    /// Along the air velocity.
    pub forward: DVec3,
    /// Horizontal, to the right of the flight direction.
    pub right: DVec3,
    /// Completes the frame, pointing away from the body (lift direction).
    pub up: DVec3,
}

/// Build the frame of `air_velocity` with `vertical_up` as the reference "up".
///
/// Falls back to an arbitrary horizontal axis when the velocity is vertical.
pub fn velocity_frame(vertical_up: DVec3, air_velocity: DVec3) -> VelocityFrame {
    let forward = air_velocity.normalize_or_zero();
    let mut right = vertical_up.cross(forward).normalize_or_zero();
    if right == DVec3::ZERO && forward != DVec3::ZERO {
        right = perpendicular(forward);
    }
    let up = forward.cross(right).normalize_or_zero();
    VelocityFrame { forward, right, up }
}

/// Rotate a body-relative `position` observed at `time` into the body-fixed
/// frame as it is oriented at `reference_time`.
///
/// Used to report impact sites and query terrain: the surface under a point
/// predicted `time - reference_time` seconds ahead has rotated with the body.
pub fn rotate_to_body_fixed(
    body: &BodyParams,
    position: DVec3,
    time: f64,
    reference_time: f64,
) -> DVec3 {
    let omega = body.angular_velocity();
    let rate = omega.length();
    if rate == 0.0 {
        return position;
    }
    let angle = -(time - reference_time) * rate;
    DQuat::from_axis_angle(omega / rate, angle) * position
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_swap_yz_is_involution() {
        let v = DVec3::new(1.0, 2.0, 3.0);
        assert_eq!(swap_yz(v), DVec3::new(1.0, 3.0, 2.0));
        assert_eq!(swap_yz(swap_yz(v)), v);
    }

    #[test]
    fn test_clamp_handles_nan() {
        assert_eq!(clamp(f64::NAN, -1.0, 1.0), -1.0);
        assert_eq!(clamp(5.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(0.25, -1.0, 1.0), 0.25);
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(0.5), 0.5);
        assert_relative_eq!(wrap_angle(PI), PI);
    }

    #[test]
    fn test_velocity_frame_canonical() {
        let frame = velocity_frame(DVec3::Y, DVec3::new(250.0, 0.0, 0.0));
        assert_eq!(frame.forward, DVec3::X);
        assert_eq!(frame.right, -DVec3::Z);
        assert_eq!(frame.up, DVec3::Y);
    }

    #[test]
    fn test_velocity_frame_vertical_fallback() {
        let frame = velocity_frame(DVec3::Y, DVec3::new(0.0, -100.0, 0.0));
        assert_relative_eq!(frame.right.length(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(frame.up.length(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(frame.right.dot(frame.forward), 0.0, epsilon = 1e-12);
        assert_relative_eq!(frame.up.dot(frame.forward), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_to_body_fixed_quarter_turn() {
        let body = crate::test_utils::fixtures::kerbin();
        let pos = DVec3::new(body.radius, 0.0, 0.0);
        let quarter = body.rotation_period / 4.0;
        let rotated = rotate_to_body_fixed(&body, pos, quarter, 0.0);
        // Rotation about +Y: points move from +X toward -Z; undoing a quarter
        // turn brings an +X point to +Z.
        assert_relative_eq!(rotated.length(), body.radius, epsilon = 1e-6);
        assert_relative_eq!(rotated.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-3);
        // Identity at the reference time
        assert_eq!(rotate_to_body_fixed(&body, pos, 0.0, 0.0), pos);
    }
}
