//! Equations of motion for atmospheric flight.
//!
//! The acceleration combines point-mass gravity with the aerodynamic force
//! divided by the vessel mass, the angle of attack being supplied per
//! evaluation by the descent profile.

mod gravity;
mod integrator;

#[cfg(test)]
mod proptest_physics;

use bevy::math::DVec3;

pub use gravity::{air_velocity, point_mass_gravity};
pub use integrator::{SimulationState, apply_host_correction, rk4_step};

use crate::aero::AerodynamicModel;
use crate::profile::DescentProfile;
use crate::types::BodyParams;

/// Acceleration of the vessel around one body.
pub struct AccelerationModel<'a> {
    pub body: &'a BodyParams,
    pub aero: &'a mut AerodynamicModel,
    pub profile: &'a dyn DescentProfile,
    /// Vessel mass in kilograms.
    pub mass: f64,
}

impl AccelerationModel<'_> {
    /// Aerodynamic acceleration alone.
    pub fn aero_acceleration(&mut self, position: DVec3, velocity: DVec3) -> DVec3 {
        let air = air_velocity(self.body, position, velocity);
        let aoa = self
            .profile
            .angle_of_attack(self.body, position, air)
            .unwrap_or(0.0);
        self.aero.get_forces(position, air, aoa) / self.mass
    }

    /// Total acceleration (gravity plus aerodynamics).
    pub fn acceleration(&mut self, position: DVec3, velocity: DVec3) -> DVec3 {
        point_mass_gravity(position, self.body.gravitational_parameter)
            + self.aero_acceleration(position, velocity)
    }
}
