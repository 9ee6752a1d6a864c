//! Reentry - headless demo
//!
//! Predicts the descent of a small capsule from a 100 x 30 km orbit around
//! Kerbin and logs where it lands.

use bevy::log::LogPlugin;
use bevy::math::DVec3;
use bevy::prelude::*;

use reentry::math::swap_yz;
use reentry::orbit::ConicOrbit;
use reentry::plugin::{PredictionSchedule, TrajectoryPlugin, VesselFeed};
use reentry::prediction::Predictor;
use reentry::profile::{LayeredProfile, ProfileNode};
use reentry::terrain::FlatGround;
use reentry::types::{
    Atmosphere, Attitude, BodyId, BodyParams, DEG_TO_RAD, FlightPlan, OrbitSegment, Part,
    Situation, VesselId, VesselSnapshot,
};

const MAX_FRAMES: usize = 10_000;

fn kerbin() -> BodyParams {
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

fn capsule_at_apoapsis() -> VesselSnapshot {
    let body = kerbin();
    let mu = body.gravitational_parameter;
    let r_a = body.radius + 100_000.0;
    let r_p = body.radius + 30_000.0;
    // Vis-viva at apoapsis
    let speed = (mu * 2.0 * r_p / (r_a * (r_a + r_p))).sqrt();
    let position = DVec3::new(r_a, 0.0, 0.0);
    let velocity = DVec3::new(0.0, 0.0, speed);
    let time = 0.0;
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
        main_body: body.id,
        time,
        position,
        velocity,
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

fn main() {
    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default()))
        .insert_resource(VesselFeed {
            snapshot: Some(capsule_at_apoapsis()),
        })
        .insert_resource(Predictor::new(
            Box::new(LayeredProfile {
                entry: ProfileNode::aoa(10.0 * DEG_TO_RAD),
                high: ProfileNode::aoa(10.0 * DEG_TO_RAD),
                low: ProfileNode::aoa(5.0 * DEG_TO_RAD),
                final_approach: ProfileNode::aoa(0.0),
            }),
            Box::new(FlatGround::default()),
        ))
        .add_plugins(TrajectoryPlugin);

    let mut frames = 0;
    while app.world().resource::<PredictionSchedule>().completed == 0 && frames < MAX_FRAMES {
        app.update();
        frames += 1;
    }

    let predictor = app.world().resource::<Predictor>();
    info!(
        "Prediction finished after {frames} frames ({:.2} ms of computation)",
        predictor.stats().total_time.as_secs_f64() * 1000.0
    );
    for (i, patch) in predictor.patches().iter().enumerate() {
        info!(
            "Patch {i}: {} from t={:.1} to t={:.1} ({} samples)",
            if patch.is_atmospheric() { "atmospheric" } else { "vacuum" },
            patch.start_time(),
            patch.end_time,
            patch.points().len()
        );
    }
    match predictor.patches().last().and_then(|p| p.impact) {
        Some(impact) => info!(
            "Impact at t={:.1}, {:.0} m/s, body-fixed site {:?}; peak deceleration {:.1} m/s²",
            impact.time,
            impact.velocity.length(),
            impact.rotated_position,
            predictor.max_acceleration()
        ),
        None => info!("No impact predicted"),
    }
}
