//! Commanded angle of attack during descent.
//!
//! The predictor does not simulate attitude dynamics. Instead a descent
//! profile tells it, for each integration step, which angle of attack the
//! pilot (or autopilot) will hold.

use bevy::math::DVec3;

use crate::math::{lerp, wrap_angle};
use crate::types::BodyParams;

/// Source of the angle of attack at a predicted point.
pub trait DescentProfile: Send + Sync {
    /// Angle of attack in radians, positive nose-up. `None` means "no opinion"
    /// and is treated as zero.
    fn angle_of_attack(&self, body: &BodyParams, position: DVec3, air_velocity: DVec3)
    -> Option<f64>;
}

/// The same angle of attack everywhere.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FixedAngle(pub f64);

impl DescentProfile for FixedAngle {
    fn angle_of_attack(&self, _: &BodyParams, _: DVec3, _: DVec3) -> Option<f64> {
        Some(self.0)
    }
}

/// One control point of a [`LayeredProfile`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProfileNode {
    /// Angle in radians.
    pub angle: f64,
    /// When set, `angle` is a pitch above the local horizon rather than an
    /// angle of attack.
    pub horizon_relative: bool,
}

impl ProfileNode {
    pub fn aoa(angle: f64) -> Self {
        Self {
            angle,
            horizon_relative: false,
        }
    }

    pub fn pitch(angle: f64) -> Self {
        Self {
            angle,
            horizon_relative: true,
        }
    }

    fn resolve(&self, flight_path_angle: f64) -> f64 {
        if self.horizon_relative {
            wrap_angle(self.angle - flight_path_angle)
        } else {
            self.angle
        }
    }
}

/// Altitude ratios (of the atmosphere depth) of the profile nodes.
pub const LAYER_RATIOS: [f64; 4] = [1.0, 0.5, 0.25, 0.0];

/// Four nodes (entry, high, low, final) at fixed fractions of the
/// atmosphere depth, linearly blended in between.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayeredProfile {
    pub entry: ProfileNode,
    pub high: ProfileNode,
    pub low: ProfileNode,
    pub final_approach: ProfileNode,
}

impl LayeredProfile {
    fn nodes(&self) -> [&ProfileNode; 4] {
        [&self.entry, &self.high, &self.low, &self.final_approach]
    }
}

impl DescentProfile for LayeredProfile {
    fn angle_of_attack(
        &self,
        body: &BodyParams,
        position: DVec3,
        air_velocity: DVec3,
    ) -> Option<f64> {
        let depth = body.atmosphere_depth();
        if depth <= 0.0 {
            return None;
        }
        let ratio = ((position.length() - body.radius) / depth).clamp(0.0, 1.0);

        let vertical = position.normalize_or_zero();
        let speed = air_velocity.length();
        let flight_path_angle = if speed > 0.0 {
            (air_velocity.dot(vertical) / speed).clamp(-1.0, 1.0).asin()
        } else {
            0.0
        };

        let nodes = self.nodes();
        for i in 0..3 {
            let (upper, lower) = (LAYER_RATIOS[i], LAYER_RATIOS[i + 1]);
            if ratio >= lower {
                let t = (upper - ratio) / (upper - lower);
                return Some(lerp(
                    nodes[i].resolve(flight_path_angle),
                    nodes[i + 1].resolve(flight_path_angle),
                    t,
                ));
            }
        }
        Some(nodes[3].resolve(flight_path_angle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use crate::types::DEG_TO_RAD;
    use approx::assert_relative_eq;

    fn profile() -> LayeredProfile {
        LayeredProfile {
            entry: ProfileNode::aoa(40.0 * DEG_TO_RAD),
            high: ProfileNode::aoa(20.0 * DEG_TO_RAD),
            low: ProfileNode::aoa(10.0 * DEG_TO_RAD),
            final_approach: ProfileNode::aoa(0.0),
        }
    }

    #[test]
    fn test_fixed_angle() {
        let body = fixtures::kerbin();
        let aoa = FixedAngle(0.1).angle_of_attack(&body, DVec3::X, DVec3::Y);
        assert_eq!(aoa, Some(0.1));
    }

    #[test]
    fn test_layer_nodes_and_blend() {
        let body = fixtures::kerbin();
        let air = DVec3::new(0.0, 0.0, 1000.0);
        let at = |alt: f64| {
            profile()
                .angle_of_attack(&body, DVec3::X * (body.radius + alt), air)
                .unwrap()
        };
        assert_relative_eq!(at(70_000.0), 40.0 * DEG_TO_RAD, epsilon = 1e-12);
        assert_relative_eq!(at(35_000.0), 20.0 * DEG_TO_RAD, epsilon = 1e-12);
        assert_relative_eq!(at(0.0), 0.0, epsilon = 1e-12);
        // Halfway between the low (17.5 km) and final nodes
        assert_relative_eq!(at(8_750.0), 5.0 * DEG_TO_RAD, epsilon = 1e-12);
        // Above the atmosphere the entry node holds
        assert_relative_eq!(at(90_000.0), 40.0 * DEG_TO_RAD, epsilon = 1e-12);
    }

    #[test]
    fn test_horizon_relative_node() {
        let body = fixtures::kerbin();
        let mut p = profile();
        p.final_approach = ProfileNode::pitch(0.0);
        // Descending at 30° below the horizon, nose on the horizon: aoa = +30°
        let pos = DVec3::X * body.radius;
        let air = DVec3::new(-(30.0 * DEG_TO_RAD).sin(), 0.0, (30.0 * DEG_TO_RAD).cos()) * 100.0;
        let aoa = p.angle_of_attack(&body, pos, air).unwrap();
        assert_relative_eq!(aoa, 30.0 * DEG_TO_RAD, epsilon = 1e-9);
    }

    #[test]
    fn test_airless_body_has_no_opinion() {
        let mut body = fixtures::kerbin();
        body.atmosphere = None;
        assert_eq!(profile().angle_of_attack(&body, DVec3::X * 7e5, DVec3::Y), None);
    }
}
