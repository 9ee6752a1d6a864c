//! Property-based tests for the integrator using proptest.
//!
//! These tests verify physical invariants across a range of orbits around a
//! Kerbin-like body.

use bevy::math::DVec3;
use proptest::prelude::*;

use super::{SimulationState, apply_host_correction, point_mass_gravity, rk4_step};
use crate::test_utils::{assertions, fixtures};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Specific orbital energy is conserved by RK4 in pure gravity.
    #[test]
    fn prop_energy_conservation_vacuum(
        altitude in 80_000.0f64..2_000_000.0,
        speed_factor in 0.8f64..1.2,
    ) {
        let body = fixtures::kerbin();
        let mu = body.gravitational_parameter;
        let circular = fixtures::circular_state(&body, altitude);
        let start = SimulationState::new(circular.position, circular.velocity * speed_factor);
        let e0 = assertions::orbital_energy(start.position, start.velocity, mu);

        let mut state = start;
        for _ in 0..600 {
            state = rk4_step(state, |p, _| point_mass_gravity(p, mu), 0.5).0;
        }
        let e1 = assertions::orbital_energy(state.position, state.velocity, mu);

        let drift = ((e1 - e0) / e0).abs();
        prop_assert!(drift < 1e-6, "energy drift {:.3e}", drift);
    }

    /// Angular momentum is conserved for a central force.
    #[test]
    fn prop_angular_momentum_conservation(
        altitude in 80_000.0f64..2_000_000.0,
        radial in -300.0f64..300.0,
    ) {
        let body = fixtures::kerbin();
        let mu = body.gravitational_parameter;
        let circular = fixtures::circular_state(&body, altitude);
        let start = SimulationState::new(
            circular.position,
            circular.velocity + circular.position.normalize() * radial,
        );
        let l0 = start.position.cross(start.velocity);

        let mut state = start;
        for _ in 0..600 {
            state = rk4_step(state, |p, _| point_mass_gravity(p, mu), 0.5).0;
        }
        let l1 = state.position.cross(state.velocity);

        prop_assert!((l1 - l0).length() / l0.length() < 1e-6);
    }

    /// Linear drag never adds energy.
    #[test]
    fn prop_drag_is_dissipative(
        altitude in 10_000.0f64..60_000.0,
        speed in 200.0f64..3000.0,
        k in 1e-4f64..1e-2,
    ) {
        let body = fixtures::kerbin();
        let mu = body.gravitational_parameter;
        let start = SimulationState::new(
            DVec3::new(body.radius + altitude, 0.0, 0.0),
            DVec3::new(0.0, 0.0, speed),
        );
        let e0 = assertions::orbital_energy(start.position, start.velocity, mu);

        let mut state = start;
        for _ in 0..100 {
            state = rk4_step(state, |p, v| point_mass_gravity(p, mu) - v * k, 0.1).0;
        }
        let e1 = assertions::orbital_energy(state.position, state.velocity, mu);
        prop_assert!(e1 < e0);
    }

    /// Without a host step the correction does nothing.
    #[test]
    fn prop_zero_host_step_is_identity(
        ax in -50.0f64..50.0,
        ay in -50.0f64..50.0,
        px in -1e6f64..1e6,
        vz in -3e3f64..3e3,
    ) {
        let mut state = SimulationState::new(DVec3::new(px, 0.0, 0.0), DVec3::new(0.0, 0.0, vz));
        let before = state;
        apply_host_correction(&mut state, DVec3::new(ax, ay, 0.0), DVec3::ZERO, 0.1, 0.0);
        prop_assert_eq!(state, before);
    }
}
