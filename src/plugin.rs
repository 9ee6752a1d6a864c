//! Bevy integration: feeds host snapshots to the predictor and runs it a
//! little every frame.

use bevy::prelude::*;

use crate::aero::AeroRegistry;
use crate::prediction::{PredictionError, PredictionSettings, Predictor, Progress};
use crate::types::{VesselId, VesselSnapshot};

/// Plugin providing trajectory prediction.
pub struct TrajectoryPlugin;

impl Plugin for TrajectoryPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PredictionSettings>()
            .init_resource::<AeroRegistry>()
            .init_resource::<Predictor>()
            .init_resource::<VesselFeed>()
            .init_resource::<PredictionSchedule>()
            .add_systems(Update, drive_prediction);
    }
}

/// Latest snapshot of the active vessel, written by the host every frame.
#[derive(Resource, Default, Debug)]
pub struct VesselFeed {
    pub snapshot: Option<VesselSnapshot>,
}

/// Bookkeeping for periodic restarts.
#[derive(Resource, Default, Debug)]
pub struct PredictionSchedule {
    /// Frames since the last successful start.
    pub frames_since_start: u32,
    /// Vessel the last prediction was started for.
    pub last_vessel: Option<VesselId>,
    /// Predictions completed since startup.
    pub completed: u32,
    /// Set while input is missing, so the warning is logged once.
    missing_input: bool,
    /// Last reason `start` failed, so a persistent failure is logged once.
    start_error: Option<PredictionError>,
}

/// Start a new prediction when one is due and advance the in-flight one
/// within the frame budget.
pub fn drive_prediction(
    feed: Res<VesselFeed>,
    settings: Res<PredictionSettings>,
    registry: Res<AeroRegistry>,
    mut predictor: ResMut<Predictor>,
    mut schedule: ResMut<PredictionSchedule>,
) {
    schedule.frames_since_start = schedule.frames_since_start.saturating_add(1);

    if let Some(snapshot) = feed.snapshot.as_ref() {
        let vessel_changed = schedule.last_vessel != Some(snapshot.vessel);
        let due = vessel_changed || schedule.frames_since_start >= settings.update_interval.max(1);

        if due && vessel_changed && predictor.is_busy() {
            debug!("Active vessel changed, discarding in-flight prediction");
            predictor.discard();
        }
        if due && !predictor.is_busy() {
            match predictor.start(snapshot, &registry, &settings) {
                Ok(()) => {
                    schedule.frames_since_start = 0;
                    schedule.last_vessel = Some(snapshot.vessel);
                    schedule.missing_input = false;
                    schedule.start_error = None;
                }
                Err(PredictionError::MissingFlightPlan) => {
                    if !schedule.missing_input {
                        warn!("Flight plan not available yet, retrying next frame");
                        schedule.missing_input = true;
                    }
                }
                Err(err) => {
                    if schedule.start_error.as_ref() != Some(&err) {
                        error!("Could not start trajectory prediction: {err}");
                        schedule.start_error = Some(err);
                    }
                }
            }
        }
    } else if !schedule.missing_input {
        warn!("No vessel snapshot available, skipping trajectory prediction");
        schedule.missing_input = true;
    }

    match predictor.resume(settings.frame_budget) {
        Ok(Progress::Completed) => schedule.completed += 1,
        Ok(Progress::Idle | Progress::Yielded) => {}
        Err(err) => error!("Trajectory prediction aborted: {err}"),
    }
}
