//! Incremental trajectory prediction.
//!
//! The [`Predictor`] turns a vessel snapshot into a sequence of [`Patch`]es,
//! alternating analytic conics in vacuum with numerically integrated
//! atmospheric flight. The computation is a resumable state machine: each
//! call to [`Predictor::resume`] runs until the frame budget is spent, and
//! results are published only once the whole prediction is complete.

mod flight;
pub mod patch;

use std::time::{Duration, Instant};

use bevy::log::{debug, info, warn};
use bevy::math::DVec3;
use bevy::prelude::Resource;

pub use flight::{AtmosphericFlight, FlightContext, FlightEnd, FlightStep};
pub use patch::{Impact, Patch, PatchKind, Point, PointBuffer};

use crate::aero::{AeroError, AeroRegistry, AerodynamicModel, CacheSettings, ProviderKind};
use crate::math::{clamp, rotate_to_body_fixed, swap_yz};
use crate::orbit::ConicOrbit;
use crate::physics::air_velocity;
use crate::profile::{DescentProfile, FixedAngle};
use crate::terrain::{FlatGround, GroundHeight, ground_altitude};
use crate::types::{BodyId, BodyParams, ManeuverNode, VesselSnapshot, VesselState};

/// Bisection stops once the bracket is narrower than this (seconds).
pub const ENTRY_TOLERANCE: f64 = 0.1;

/// Bisection iteration cap.
pub const MAX_BISECTION_ITERATIONS: usize = 1000;

/// Length of a vacuum patch that has no natural end (seconds).
pub const UNBOUNDED_PATCH_DURATION: f64 = 86_400.0;

/// Step used when walking back to the first ground contact on airless bodies (seconds).
const SURFACE_WALK_STEP: f64 = 1.0;

const MAX_SURFACE_WALK: usize = 100_000;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("a prediction is already in progress")]
    Busy,

    #[error("the host flight plan is not available")]
    MissingFlightPlan,

    #[error("body {0:?} is not in the snapshot's body table")]
    UnknownBody(BodyId),

    #[error("invalid vessel state at t={time}")]
    InvalidState { time: f64 },

    #[error("vessel state became non-finite at t={time}")]
    NonFiniteState { time: f64 },

    #[error("no aerodynamic provider is available")]
    NoAeroProvider,

    #[error("invalid prediction settings: {0}")]
    InvalidSettings(&'static str),

    #[error(transparent)]
    Aero(AeroError),
}

impl From<AeroError> for PredictionError {
    fn from(err: AeroError) -> Self {
        match err {
            AeroError::UnknownBody(id) => PredictionError::UnknownBody(id),
            AeroError::NoProvider => PredictionError::NoAeroProvider,
            other => PredictionError::Aero(other),
        }
    }
}

/// Configuration for trajectory prediction.
#[derive(Resource, Clone, Debug)]
pub struct PredictionSettings {
    /// Atmospheric integration step in seconds. Default: 0.1.
    pub integration_step: f64,
    /// Maximum number of patches per prediction. Default: 15.
    pub max_patch_count: usize,
    /// Frames an atmospheric patch may be spread over; sets how often the
    /// integration loop checks the budget. Default: 20.
    pub max_frames_per_patch: usize,
    /// Wall-clock computation budget per frame. Default: 2 ms.
    pub frame_budget: Duration,
    /// Start a new prediction every this many frames. Default: 10.
    pub update_interval: u32,
    /// Interpolate aerodynamic forces from the lookup table. Default: true.
    pub use_cache: bool,
    /// Rebuild the aerodynamic model when the reference drag drifts. Default: true.
    pub auto_update_model: bool,
    pub cache: CacheSettings,
    /// Minimum universal time between two drag probes (seconds). Default: 3.
    pub probe_interval: f64,
    /// Preferred aerodynamic provider, `None` for the first available.
    pub aero_provider: Option<ProviderKind>,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            integration_step: 0.1,
            max_patch_count: 15,
            max_frames_per_patch: 20,
            frame_budget: Duration::from_millis(2),
            update_interval: 10,
            use_cache: true,
            auto_update_model: true,
            cache: CacheSettings::default(),
            probe_interval: 3.0,
            aero_provider: None,
        }
    }
}

impl PredictionSettings {
    fn validate(&self) -> Result<(), PredictionError> {
        if !(self.integration_step.is_finite() && self.integration_step > 0.0) {
            return Err(PredictionError::InvalidSettings(
                "integration step must be positive",
            ));
        }
        if self.max_patch_count == 0 {
            return Err(PredictionError::InvalidSettings(
                "max patch count must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Where the computation currently is.
#[derive(Debug, Default)]
pub enum Stage {
    /// Nothing started yet.
    #[default]
    Idle,
    /// About to compute a vacuum patch from this state, `None` to finish.
    NextPatch(Option<VesselState>),
    /// Inside an atmospheric patch.
    Atmospheric(Box<AtmosphericFlight>),
    /// Last prediction completed and published.
    Done,
}

/// Outcome of one [`Predictor::resume`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// No prediction in flight.
    Idle,
    /// Budget spent, call again next frame.
    Yielded,
    /// Prediction finished and published.
    Completed,
}

/// Timing and error diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredictionStats {
    /// Time spent in the last `resume` call.
    pub last_frame_time: Duration,
    /// Computation time of the last completed prediction.
    pub total_time: Duration,
    /// Frames the last completed prediction was spread over.
    pub frames: u32,
    /// Errors and capped searches since startup.
    pub error_count: u32,
}

/// What ended a vacuum patch.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Boundary {
    PeriodEnd,
    SoiExit,
    Segment(usize),
    Node(ManeuverNode),
    Unbounded,
}

/// In-flight computation: the snapshot it started from and the back buffer.
struct Job {
    snapshot: VesselSnapshot,
    settings: PredictionSettings,
    patches: Vec<Patch>,
    max_aero_accel: f64,
    frames: u32,
    elapsed: Duration,
    soft_errors: u32,
}

/// Resumable trajectory predictor.
///
/// Holds the aerodynamic model between runs, the computation in flight and
/// the last completed trajectory. Readers only ever see completed results.
#[derive(Resource)]
pub struct Predictor {
    profile: Box<dyn DescentProfile>,
    ground: Box<dyn GroundHeight>,
    model: Option<AerodynamicModel>,
    stage: Stage,
    job: Option<Job>,
    published: Vec<Patch>,
    max_acceleration: f64,
    stats: PredictionStats,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(Box::new(FixedAngle(0.0)), Box::new(FlatGround::default()))
    }
}

impl Predictor {
    pub fn new(profile: Box<dyn DescentProfile>, ground: Box<dyn GroundHeight>) -> Self {
        Self {
            profile,
            ground,
            model: None,
            stage: Stage::Idle,
            job: None,
            published: Vec::new(),
            max_acceleration: 0.0,
            stats: PredictionStats::default(),
        }
    }

    pub fn set_profile(&mut self, profile: Box<dyn DescentProfile>) {
        self.profile = profile;
    }

    pub fn set_ground(&mut self, ground: Box<dyn GroundHeight>) {
        self.ground = ground;
    }

    /// Published patches of the last completed prediction.
    pub fn patches(&self) -> &[Patch] {
        &self.published
    }

    /// Largest aerodynamic acceleration of the last completed prediction (m/s²).
    pub fn max_acceleration(&self) -> f64 {
        self.max_acceleration
    }

    pub fn stats(&self) -> &PredictionStats {
        &self.stats
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn model(&self) -> Option<&AerodynamicModel> {
        self.model.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    /// Drop the in-flight computation, keeping the published patches.
    pub fn discard(&mut self) {
        self.job = None;
        self.stage = Stage::Idle;
    }

    /// Begin a new prediction from `snapshot`.
    pub fn start(
        &mut self,
        snapshot: &VesselSnapshot,
        registry: &AeroRegistry,
        settings: &PredictionSettings,
    ) -> Result<(), PredictionError> {
        if self.is_busy() {
            return Err(PredictionError::Busy);
        }
        settings.validate()?;

        if snapshot.is_grounded() {
            self.published.clear();
            self.max_acceleration = 0.0;
            self.stage = Stage::Done;
            return Ok(());
        }
        if snapshot.flight_plan.is_none() {
            return Err(PredictionError::MissingFlightPlan);
        }
        let body = snapshot
            .main_body_params()
            .ok_or(PredictionError::UnknownBody(snapshot.main_body))?;

        let state = VesselState::from_snapshot(snapshot);
        if !state.is_finite() {
            return Err(PredictionError::NonFiniteState { time: state.time });
        }
        if state.position == DVec3::ZERO || !(snapshot.mass > 0.0) {
            return Err(PredictionError::InvalidState { time: state.time });
        }

        let provider = registry.select(snapshot, settings.aero_provider.as_ref())?;
        let want_cache = settings.use_cache && body.has_atmosphere();
        let stale = match self.model.as_mut() {
            Some(model) => {
                !model.is_valid_for(
                    snapshot,
                    provider,
                    settings.auto_update_model,
                    settings.probe_interval,
                ) || model.cache_settings() != want_cache.then_some(&settings.cache)
            }
            None => true,
        };
        if stale {
            let cache = settings.use_cache.then_some(&settings.cache);
            self.model = Some(AerodynamicModel::build(snapshot, provider, cache)?);
        }

        self.job = Some(Job {
            snapshot: snapshot.clone(),
            settings: settings.clone(),
            patches: Vec::new(),
            max_aero_accel: 0.0,
            frames: 0,
            elapsed: Duration::ZERO,
            soft_errors: 0,
        });
        self.stage = Stage::NextPatch(Some(state));
        Ok(())
    }

    /// Continue the in-flight prediction for at most about `budget`.
    ///
    /// On error the computation is discarded and the published patches are
    /// left untouched.
    pub fn resume(&mut self, budget: Duration) -> Result<Progress, PredictionError> {
        if self.job.is_none() {
            return Ok(Progress::Idle);
        }
        let frame_start = Instant::now();
        let deadline = frame_start.checked_add(budget);

        let result = self.step(deadline);
        let elapsed = frame_start.elapsed();
        self.stats.last_frame_time = elapsed;

        if let Some(job) = self.job.as_mut() {
            job.frames += 1;
            job.elapsed += elapsed;
            self.stats.error_count += std::mem::take(&mut job.soft_errors);
        }

        match result {
            Ok(Progress::Completed) => {
                self.publish();
                Ok(Progress::Completed)
            }
            Ok(progress) => Ok(progress),
            Err(err) => {
                self.stats.error_count += 1;
                warn!("Trajectory prediction failed: {err}");
                self.discard();
                Err(err)
            }
        }
    }

    fn publish(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        self.published = job.patches;
        self.max_acceleration = job.max_aero_accel;
        self.stats.total_time = job.elapsed;
        self.stats.frames = job.frames;
        self.stage = Stage::Done;
        debug!(
            "Prediction complete: {} patches over {} frames ({:.2} ms)",
            self.published.len(),
            job.frames,
            job.elapsed.as_secs_f64() * 1000.0
        );
    }

    fn step(&mut self, deadline: Option<Instant>) -> Result<Progress, PredictionError> {
        let Self {
            profile,
            ground,
            model,
            stage,
            job,
            ..
        } = self;
        let Some(job) = job.as_mut() else {
            return Ok(Progress::Idle);
        };
        let Some(model) = model.as_mut() else {
            return Err(PredictionError::NoAeroProvider);
        };
        let exhausted = || deadline.is_some_and(|d| Instant::now() >= d);

        loop {
            match std::mem::take(stage) {
                Stage::NextPatch(Some(state)) => {
                    if job.patches.len() >= job.settings.max_patch_count {
                        return Ok(Progress::Completed);
                    }
                    *stage = job.vacuum_patch(state, &**ground)?;
                }
                Stage::NextPatch(None) | Stage::Idle | Stage::Done => {
                    return Ok(Progress::Completed);
                }
                Stage::Atmospheric(mut atmospheric) => {
                    let max_iterations = atmospheric.max_iterations();
                    let mut ctx = FlightContext {
                        aero: &mut *model,
                        profile: &**profile,
                        ground: &**ground,
                        mass: job.snapshot.mass,
                        host_dt: job.snapshot.physics_dt,
                        yield_every: max_iterations / job.settings.max_frames_per_patch.max(1),
                        deadline: deadline.unwrap_or_else(far_future),
                    };
                    let step = atmospheric.advance(&mut ctx)?;
                    job.max_aero_accel = job.max_aero_accel.max(atmospheric.max_aero_acceleration());
                    match step {
                        FlightStep::Suspended => {
                            *stage = Stage::Atmospheric(atmospheric);
                            return Ok(Progress::Yielded);
                        }
                        FlightStep::Finished { end, patch, next } => {
                            debug!(
                                "Atmospheric patch ended ({end:?}) at t={:.1} after {} samples",
                                patch.end_time,
                                patch.points().len()
                            );
                            job.patches.push(patch);
                            *stage = Stage::NextPatch(next);
                        }
                    }
                }
            }

            if matches!(stage, Stage::NextPatch(None)) {
                return Ok(Progress::Completed);
            }
            if exhausted() {
                return Ok(Progress::Yielded);
            }
        }
    }
}

/// A deadline that is never reached in practice.
fn far_future() -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(86_400 * 365))
        .unwrap_or(now)
}

/// World-frame delta-v of `node` for a vessel in `state`.
pub(crate) fn burn_vector(body: &BodyParams, state: &VesselState, node: &ManeuverNode) -> DVec3 {
    let orbit = ConicOrbit::from_state(
        body.gravitational_parameter,
        swap_yz(state.position),
        swap_yz(state.velocity),
        state.time,
    );
    let (prograde, normal, radial) = orbit.burn_frame_at(state.time);
    swap_yz(prograde * node.delta_v.x + normal * node.delta_v.y + radial * node.delta_v.z)
}

impl Job {
    fn next_node(&self, after: f64) -> Option<ManeuverNode> {
        let plan = self.snapshot.flight_plan.as_ref()?;
        plan.maneuver_nodes
            .iter()
            .filter(|n| n.time > after)
            .min_by(|a, b| a.time.total_cmp(&b.time))
            .copied()
    }

    /// First time in `[lo, hi]` at which the orbit radius drops to `radius`.
    ///
    /// Expects `|r(lo)| > radius >= |r(hi)|` and a single crossing in between.
    fn find_crossing(&mut self, orbit: &ConicOrbit, mut lo: f64, mut hi: f64, radius: f64) -> f64 {
        let mut iterations = 0;
        while hi - lo > ENTRY_TOLERANCE {
            if iterations >= MAX_BISECTION_ITERATIONS {
                warn!(
                    "Radius search did not converge after {iterations} iterations (bracket {lo:.3}..{hi:.3})"
                );
                self.soft_errors += 1;
                break;
            }
            let mid = 0.5 * (lo + hi);
            if orbit.position_at(mid).length() > radius {
                lo = mid;
            } else {
                hi = mid;
            }
            iterations += 1;
        }
        hi
    }

    /// Compute the vacuum patch starting at `state` and decide what comes next.
    fn vacuum_patch(
        &mut self,
        state: VesselState,
        ground: &dyn GroundHeight,
    ) -> Result<Stage, PredictionError> {
        if !state.is_finite() {
            return Err(PredictionError::NonFiniteState { time: state.time });
        }
        let body = self
            .snapshot
            .body(state.body)
            .ok_or(PredictionError::UnknownBody(state.body))?
            .clone();
        if state.position == DVec3::ZERO {
            return Err(PredictionError::InvalidState { time: state.time });
        }

        let start = state.time;
        let orbit = ConicOrbit::from_state(
            body.gravitational_parameter,
            swap_yz(state.position),
            swap_yz(state.velocity),
            start,
        );

        // Natural end of the patch
        let next_segment = state.stock_patch.and_then(|i| {
            let plan = self.snapshot.flight_plan.as_ref()?;
            plan.segments
                .get(i + 1)
                .filter(|s| s.start_time > start)
                .map(|s| (i + 1, s.start_time))
        });
        let mut end = start + orbit.period();
        let mut boundary = Boundary::PeriodEnd;
        if next_segment.is_none()
            && let Some(t) = orbit.next_time_at_radius(start, body.sphere_of_influence)
            && t < end
        {
            end = t;
            boundary = Boundary::SoiExit;
        }
        if let Some((index, t)) = next_segment
            && t <= end
        {
            end = t;
            boundary = Boundary::Segment(index);
        }
        if let Some(node) = self.next_node(start)
            && node.time <= end
        {
            end = node.time;
            boundary = Boundary::Node(node);
        }
        if !end.is_finite() {
            end = start + UNBOUNDED_PATCH_DURATION;
            boundary = Boundary::Unbounded;
        }

        // Lowest point of the patch
        let r0 = state.position.length();
        let ttp = orbit.time_to_periapsis();
        let (window_end, min_radius) = if ttp >= 0.0 && start + ttp <= end {
            (start + ttp, orbit.periapsis())
        } else {
            (end, r0.min(orbit.position_at(end).length()))
        };

        let ceiling = if body.has_atmosphere() {
            body.atmosphere_depth()
        } else {
            body.max_terrain_height.max(1.0)
        };
        let entry_radius = body.radius + ceiling;

        let entry = if r0 <= entry_radius {
            Some(start)
        } else if min_radius <= entry_radius {
            Some(self.find_crossing(&orbit, start, window_end, entry_radius))
        } else {
            None
        };

        match entry {
            None => {
                self.patches.push(Patch::vacuum(state.clone(), end, orbit.clone()));
                Ok(Stage::NextPatch(self.boundary_state(&state, &body, &orbit, boundary)))
            }
            Some(t) if t > start + ENTRY_TOLERANCE => {
                self.patches.push(Patch::vacuum(state.clone(), t, orbit.clone()));
                let (pos, vel) = orbit.state_at(t);
                Ok(Stage::NextPatch(Some(VesselState {
                    body: state.body,
                    time: t,
                    position: swap_yz(pos),
                    velocity: swap_yz(vel),
                    stock_patch: None,
                })))
            }
            Some(_) if state.body != self.snapshot.main_body => {
                info!(
                    "Trajectory reaches {} which is not the current main body, stopping",
                    body.name
                );
                Ok(Stage::NextPatch(None))
            }
            Some(_) if body.has_atmosphere() => Ok(Stage::Atmospheric(Box::new(
                AtmosphericFlight::new(
                    state,
                    body,
                    self.next_node(start),
                    self.settings.integration_step,
                    self.snapshot.time,
                ),
            ))),
            Some(_) => {
                Ok(self.surface_impact(state, body, orbit, window_end, min_radius, end, boundary, ground))
            }
        }
    }

    /// Airless body: locate the first ground contact between the start and
    /// the lowest point of the orbit.
    fn surface_impact(
        &mut self,
        state: VesselState,
        body: BodyParams,
        orbit: ConicOrbit,
        window_end: f64,
        min_radius: f64,
        end: f64,
        boundary: Boundary,
        ground: &dyn GroundHeight,
    ) -> Stage {
        let start = state.time;
        let reference_time = self.snapshot.time;
        let ground_at = |t: f64| {
            let p = swap_yz(orbit.position_at(t));
            let fixed = rotate_to_body_fixed(&body, p, t, reference_time);
            ground_altitude(ground, &body, p, fixed)
        };

        let mut t = if min_radius < body.radius && state.position.length() > body.radius {
            self.find_crossing(&orbit, start, window_end, body.radius)
        } else if min_radius < body.radius {
            start
        } else {
            window_end
        };

        if ground_at(t) >= 0.0 {
            // Grazing pass over the terrain
            self.patches.push(Patch::vacuum(state.clone(), end, orbit.clone()));
            return Stage::NextPatch(self.boundary_state(&state, &body, &orbit, boundary));
        }

        let mut walked = 0;
        while t - SURFACE_WALK_STEP >= start
            && ground_at(t - SURFACE_WALK_STEP) < 0.0
            && walked < MAX_SURFACE_WALK
        {
            t -= SURFACE_WALK_STEP;
            walked += 1;
        }

        let before = (t - SURFACE_WALK_STEP).max(start);
        let (above, below) = (ground_at(before), ground_at(t));
        let coefficient = if above > below {
            clamp(above / (above - below), 0.01, 1.0)
        } else {
            1.0
        };
        let hit_time = before + coefficient * (t - before);
        let (pos, vel) = orbit.state_at(hit_time);
        let (position, velocity) = (swap_yz(pos), swap_yz(vel));

        let mut patch = Patch::vacuum(state, hit_time, orbit);
        patch.impact = Some(Impact {
            time: hit_time,
            position,
            rotated_position: rotate_to_body_fixed(&body, position, hit_time, reference_time),
            velocity: air_velocity(&body, position, velocity),
        });
        self.patches.push(patch);
        Stage::NextPatch(None)
    }

    /// Starting state of the patch after a vacuum patch ending at `boundary`.
    fn boundary_state(
        &self,
        state: &VesselState,
        body: &BodyParams,
        orbit: &ConicOrbit,
        boundary: Boundary,
    ) -> Option<VesselState> {
        match boundary {
            Boundary::Node(node) => {
                let (pos, vel) = orbit.state_at(node.time);
                let mut next = VesselState {
                    body: state.body,
                    time: node.time,
                    position: swap_yz(pos),
                    velocity: swap_yz(vel),
                    stock_patch: None,
                };
                let delta_v = burn_vector(body, &next, &node);
                next.velocity += delta_v;
                Some(next)
            }
            Boundary::Segment(index) => {
                let segment = self.snapshot.flight_plan.as_ref()?.segments.get(index)?;
                let (pos, vel) = segment.orbit.state_at(segment.start_time);
                Some(VesselState {
                    body: segment.body,
                    time: segment.start_time,
                    position: swap_yz(pos),
                    velocity: swap_yz(vel),
                    stock_patch: Some(index),
                })
            }
            Boundary::SoiExit | Boundary::PeriodEnd | Boundary::Unbounded => None,
        }
    }
}
