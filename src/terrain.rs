//! Ground height queries used for impact detection.

use bevy::math::DVec3;

use crate::types::BodyParams;

/// Height of the terrain above sea level.
pub trait GroundHeight: Send + Sync {
    /// `body_fixed_position` is relative to the body's center, in the body's
    /// rotating frame (see [`crate::math::rotate_to_body_fixed`]).
    fn height_above_sea(&self, body: &BodyParams, body_fixed_position: DVec3) -> f64;
}

/// Terrain at a constant height everywhere, sea level by default.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlatGround {
    pub height: f64,
}

impl GroundHeight for FlatGround {
    fn height_above_sea(&self, _body: &BodyParams, _body_fixed_position: DVec3) -> f64 {
        self.height
    }
}

/// Ground altitude of a point: its altitude above sea level minus the terrain height.
pub fn ground_altitude(
    ground: &dyn GroundHeight,
    body: &BodyParams,
    position: DVec3,
    body_fixed_position: DVec3,
) -> f64 {
    position.length() - body.radius - ground.height_above_sea(body, body_fixed_position)
}
