//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use bevy::math::DVec3;
use reentry::math::swap_yz;
use reentry::orbit::ConicOrbit;
use reentry::prediction::{Patch, Predictor, Progress};
use reentry::types::{
    Atmosphere, Attitude, BodyId, BodyParams, FlightPlan, OrbitSegment, Part, Situation,
    VesselId, VesselSnapshot,
};

pub const KERBIN: BodyId = BodyId(1);
pub const MUN: BodyId = BodyId(2);

pub fn kerbin() -> BodyParams {
    BodyParams {
        id: KERBIN,
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

/// Airless moon.
pub fn mun() -> BodyParams {
    BodyParams {
        id: MUN,
        name: "Mun".to_string(),
        radius: 200_000.0,
        gravitational_parameter: 6.5138398e10,
        atmosphere: None,
        max_terrain_height: 7_061.0,
        rotation_period: 138_984.38,
        sphere_of_influence: 2_429_559.1,
    }
}

/// Snapshot of a two-part capsule around `main` with the current orbit as
/// the only flight plan segment.
pub fn snapshot(
    bodies: Vec<BodyParams>,
    main: BodyId,
    position: DVec3,
    velocity: DVec3,
) -> VesselSnapshot {
    let mu = bodies
        .iter()
        .find(|b| b.id == main)
        .map(|b| b.gravitational_parameter)
        .unwrap();
    let time = 500.0;
    let orbit = ConicOrbit::from_state(mu, swap_yz(position), swap_yz(velocity), time);
    VesselSnapshot {
        vessel: VesselId(1),
        mass: 2_500.0,
        parts: vec![
            Part {
                drag_area: 1.2,
                lift_area: 0.3,
                shielded: false,
            },
            Part {
                drag_area: 0.4,
                lift_area: 0.0,
                shielded: false,
            },
        ],
        attitude: Attitude::default(),
        situation: Situation::Orbiting,
        main_body: main,
        bodies,
        time,
        position,
        velocity,
        physics_dt: 0.02,
        flight_plan: Some(FlightPlan {
            segments: vec![OrbitSegment {
                body: main,
                start_time: time,
                orbit,
            }],
            maneuver_nodes: Vec::new(),
        }),
    }
}

/// Equatorial orbit around `body`, starting at apoapsis on the +X axis.
pub fn orbit_at_apoapsis(body: &BodyParams, apoapsis_alt: f64, periapsis_alt: f64) -> (DVec3, DVec3) {
    let mu = body.gravitational_parameter;
    let r_a = body.radius + apoapsis_alt;
    let r_p = body.radius + periapsis_alt;
    let speed = (mu * 2.0 * r_p / (r_a * (r_a + r_p))).sqrt();
    (DVec3::new(r_a, 0.0, 0.0), DVec3::new(0.0, 0.0, speed))
}

/// Resume until the prediction completes, returning the number of frames.
pub fn run_to_completion(predictor: &mut Predictor, budget: Duration) -> usize {
    for frame in 1..=1_000_000 {
        match predictor.resume(budget).unwrap() {
            Progress::Yielded => continue,
            Progress::Completed | Progress::Idle => return frame,
        }
    }
    panic!("prediction did not complete");
}

/// Patches are contiguous and in strictly increasing time order.
pub fn assert_patches_ordered(patches: &[Patch]) {
    for patch in patches {
        assert!(patch.end_time >= patch.start_time());
    }
    for pair in patches.windows(2) {
        assert!(
            pair[1].start_time() > pair[0].start_time(),
            "patch starts not increasing: {} then {}",
            pair[0].start_time(),
            pair[1].start_time()
        );
        assert_eq!(pair[0].end_time, pair[1].start_time());
    }
}
