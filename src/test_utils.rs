//! Test utilities for trajectory prediction tests.
//!
//! Provides a Kerbin-like body, vessel snapshots around it and assertions
//! for physical invariants like energy conservation.

use bevy::math::DVec3;

use crate::math::swap_yz;
use crate::orbit::ConicOrbit;
use crate::physics::SimulationState;
use crate::types::{
    Atmosphere, Attitude, BodyId, BodyParams, FlightPlan, OrbitSegment, Part, Situation,
    VesselId, VesselSnapshot,
};

/// Fixtures for bodies and vessel states.
pub mod fixtures {
    use super::*;

    /// Kerbin: 600 km radius, 70 km exponential atmosphere.
    pub fn kerbin() -> BodyParams {
        BodyParams {
            id: BodyId(1),
            name: "Kerbin".to_string(),
            radius: 600_000.0,
            gravitational_parameter: 3.5316e12,
            atmosphere: Some(Atmosphere {
                depth: 70_000.0,
                sea_level_density: 1.225,
                scale_height: 5_600.0,
            }),
            max_terrain_height: 6_800.0,
            rotation_period: 21_549.425,
            sphere_of_influence: 84_159_286.0,
        }
    }

    /// Equatorial circular orbit at `altitude`, starting on the +X axis.
    pub fn circular_state(body: &BodyParams, altitude: f64) -> SimulationState {
        let r = body.radius + altitude;
        let v = (body.gravitational_parameter / r).sqrt();
        SimulationState::new(DVec3::new(r, 0.0, 0.0), DVec3::new(0.0, 0.0, v))
    }

    /// A two-part vessel in a circular orbit around Kerbin, with a flight
    /// plan holding the current orbit as its only segment.
    pub fn orbiting_snapshot(altitude: f64) -> VesselSnapshot {
        let body = kerbin();
        let state = circular_state(&body, altitude);
        let time = 1_000.0;
        let orbit = ConicOrbit::from_state(
            body.gravitational_parameter,
            swap_yz(state.position),
            swap_yz(state.velocity),
            time,
        );
        VesselSnapshot {
            vessel: VesselId(7),
            mass: 5_000.0,
            parts: vec![
                Part {
                    drag_area: 2.0,
                    lift_area: 0.5,
                    shielded: false,
                },
                Part {
                    drag_area: 1.0,
                    lift_area: 0.0,
                    shielded: false,
                },
            ],
            attitude: Attitude::default(),
            situation: Situation::Orbiting,
            main_body: body.id,
            time,
            position: state.position,
            velocity: state.velocity,
            physics_dt: 0.02,
            flight_plan: Some(FlightPlan {
                segments: vec![OrbitSegment {
                    body: body.id,
                    start_time: time,
                    orbit,
                }],
                maneuver_nodes: Vec::new(),
            }),
            bodies: vec![body],
        }
    }
}

/// Assertions for verifying physical invariants.
pub mod assertions {
    use super::*;

    /// Specific orbital energy: E = v²/2 - μ/r.
    pub fn orbital_energy(pos: DVec3, vel: DVec3, mu: f64) -> f64 {
        0.5 * vel.length_squared() - mu / pos.length()
    }

    /// Assert that energy is conserved within tolerance.
    ///
    /// # Panics
    /// Panics if relative energy drift exceeds tolerance.
    pub fn assert_energy_conserved(initial_energy: f64, final_energy: f64, tolerance: f64) {
        let drift = if initial_energy.abs() > 1e-10 {
            ((final_energy - initial_energy) / initial_energy).abs()
        } else {
            (final_energy - initial_energy).abs()
        };
        assert!(
            drift <= tolerance,
            "Energy not conserved: initial={initial_energy:.6e}, final={final_energy:.6e}, drift={drift:.6e}, tolerance={tolerance:.6e}"
        );
    }
}

/// Utilities for creating headless Bevy apps for testing.
pub mod bevy_test {
    use bevy::prelude::*;

    /// Create a minimal Bevy app for testing without rendering.
    pub fn headless_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circular_state_is_circular() {
        let body = fixtures::kerbin();
        let state = fixtures::circular_state(&body, 100_000.0);
        let mu = body.gravitational_parameter;
        // Circular: E = -μ/2r
        assert_relative_eq!(
            assertions::orbital_energy(state.position, state.velocity, mu),
            -mu / (2.0 * 700_000.0),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_orbiting_snapshot_is_consistent() {
        let snapshot = fixtures::orbiting_snapshot(90_000.0);
        assert!(snapshot.main_body_params().is_some());
        assert!(!snapshot.is_grounded());
        let plan = snapshot.flight_plan.as_ref().unwrap();
        let (pos, _) = plan.segments[0].orbit.state_at(snapshot.time);
        assert_relative_eq!(swap_yz(pos).x, snapshot.position.x, max_relative = 1e-9);
    }
}
