//! Atmospheric phase of a prediction.
//!
//! [`AtmosphericFlight`] holds everything the integration loop needs between
//! two frames, so the loop can stop when the frame budget is spent and pick
//! up exactly where it left off.

use std::time::Instant;

use bevy::log::warn;
use bevy::math::DVec3;

use super::PredictionError;
use super::patch::{Impact, Patch, PatchKind, Point, PointBuffer};
use crate::aero::AerodynamicModel;
use crate::math::{clamp, rotate_to_body_fixed};
use crate::physics::{AccelerationModel, SimulationState, air_velocity, apply_host_correction, rk4_step};
use crate::profile::DescentProfile;
use crate::terrain::{self, GroundHeight};
use crate::types::{BodyParams, ManeuverNode, VesselState};

/// Simulated duration covered by the iteration cap (seconds).
pub const MAX_FLIGHT_DURATION: f64 = 3600.0;

/// Time between stored samples (seconds).
pub const SAMPLE_INTERVAL: f64 = 10.0;

/// Below this altitude samples are stored ten times as often.
pub const LOW_ALTITUDE: f64 = 10_000.0;

fn sample_interval(altitude: f64) -> f64 {
    if altitude < LOW_ALTITUDE {
        SAMPLE_INTERVAL * 0.1
    } else {
        SAMPLE_INTERVAL
    }
}

/// Why an atmospheric patch ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlightEnd {
    /// Hit the ground.
    Impact,
    /// Climbed back above the atmosphere.
    Exit,
    /// Ran out of iterations.
    IterationCap,
    /// Reached the patch's time limit (a maneuver node).
    PatchEnd,
}

/// Result of one call to [`AtmosphericFlight::advance`].
#[derive(Debug)]
pub enum FlightStep {
    /// Frame budget spent; call again next frame.
    Suspended,
    Finished {
        end: FlightEnd,
        patch: Patch,
        /// Where the next patch starts, if there is one.
        next: Option<VesselState>,
    },
}

/// Collaborators borrowed for the duration of one `advance` call.
pub struct FlightContext<'a> {
    pub aero: &'a mut AerodynamicModel,
    pub profile: &'a dyn DescentProfile,
    pub ground: &'a dyn GroundHeight,
    pub mass: f64,
    /// Host physics step used by the correction term.
    pub host_dt: f64,
    /// Check the deadline every this many iterations.
    pub yield_every: usize,
    pub deadline: Instant,
}

/// Saved locals of the integration loop.
#[derive(Debug)]
pub struct AtmosphericFlight {
    entry: VesselState,
    body: BodyParams,
    /// Time limit of the patch (infinite when none).
    end_time: f64,
    /// Maneuver node at `end_time`, applied to the next state.
    node: Option<ManeuverNode>,
    /// Universal time the impact site rotation is referenced to.
    reference_time: f64,
    dt: f64,
    max_iterations: usize,

    state: SimulationState,
    time: f64,
    previous_accel: DVec3,
    iteration: usize,
    next_sample_time: f64,
    points: PointBuffer,
    max_aero_accel: f64,
}

impl AtmosphericFlight {
    pub fn new(
        entry: VesselState,
        body: BodyParams,
        node: Option<ManeuverNode>,
        dt: f64,
        reference_time: f64,
    ) -> Self {
        let max_iterations = (MAX_FLIGHT_DURATION / dt).ceil().max(1.0) as usize;
        Self {
            state: SimulationState::new(entry.position, entry.velocity),
            time: entry.time,
            end_time: node.map_or(f64::INFINITY, |n| n.time),
            node,
            reference_time,
            dt,
            max_iterations,
            previous_accel: DVec3::ZERO,
            iteration: 0,
            next_sample_time: entry.time,
            points: PointBuffer::new(),
            max_aero_accel: 0.0,
            entry,
            body,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Largest aerodynamic acceleration seen so far (m/s²).
    pub fn max_aero_acceleration(&self) -> f64 {
        self.max_aero_accel
    }

    fn ceiling(&self) -> f64 {
        self.body.atmosphere_depth()
    }

    fn ground_altitude(&self, ground: &dyn GroundHeight, position: DVec3, time: f64) -> f64 {
        let fixed = rotate_to_body_fixed(&self.body, position, time, self.reference_time);
        terrain::ground_altitude(ground, &self.body, position, fixed)
    }

    fn make_point(&self, ctx: &mut FlightContext, state: SimulationState, time: f64) -> Point {
        let aero_accel = AccelerationModel {
            body: &self.body,
            aero: &mut *ctx.aero,
            profile: ctx.profile,
            mass: ctx.mass,
        }
        .aero_acceleration(state.position, state.velocity);
        Point {
            position: state.position,
            orbital_velocity: state.velocity,
            aero_force: aero_accel * ctx.mass,
            ground_altitude: self.ground_altitude(ctx.ground, state.position, time),
            time,
        }
    }

    /// Run the integration loop until the patch ends or the budget is spent.
    pub fn advance(&mut self, ctx: &mut FlightContext) -> Result<FlightStep, PredictionError> {
        if self.iteration == 0 && self.points.is_empty() {
            let first = self.make_point(ctx, self.state, self.time);
            self.push_sample(first);
            self.next_sample_time = self.time + sample_interval(first.position.length() - self.body.radius);
        }

        let terrain_ceiling = self.body.max_terrain_height.max(0.0);
        let yield_every = ctx.yield_every.max(1);

        loop {
            if self.iteration >= self.max_iterations {
                warn!(
                    "Atmospheric prediction stopped after {} iterations ({:.0} s simulated)",
                    self.iteration,
                    self.time - self.entry.time
                );
                return Ok(self.finish(FlightEnd::IterationCap, None, None));
            }

            let previous = self.state;
            let dt = self.dt;
            let (mut next, accel) = {
                let mut model = AccelerationModel {
                    body: &self.body,
                    aero: &mut *ctx.aero,
                    profile: ctx.profile,
                    mass: ctx.mass,
                };
                rk4_step(previous, |p, v| model.acceleration(p, v), dt)
            };
            apply_host_correction(&mut next, accel, self.previous_accel, dt, ctx.host_dt);
            self.previous_accel = accel;
            self.state = next;
            self.time += dt;
            self.iteration += 1;

            if !next.is_finite() {
                return Err(PredictionError::NonFiniteState { time: self.time });
            }

            let aero_accel = AccelerationModel {
                body: &self.body,
                aero: &mut *ctx.aero,
                profile: ctx.profile,
                mass: ctx.mass,
            }
            .aero_acceleration(next.position, next.velocity)
            .length();
            self.max_aero_accel = self.max_aero_accel.max(aero_accel);

            let altitude = next.position.length() - self.body.radius;

            if altitude < terrain_ceiling {
                let ground_now = self.ground_altitude(ctx.ground, next.position, self.time);
                if ground_now < 0.0 {
                    let ground_before =
                        self.ground_altitude(ctx.ground, previous.position, self.time - dt);
                    return Ok(self.impact(ctx, previous, next, ground_before, ground_now));
                }
            }

            let ratio = altitude / self.ceiling();
            if ratio <= 0.0 {
                // Below sea level without touching the terrain model
                return Ok(self.impact(ctx, previous, next, 1.0, 0.0));
            }
            if ratio >= 1.0 {
                let exit = VesselState {
                    body: self.entry.body,
                    time: self.time,
                    position: next.position,
                    velocity: next.velocity,
                    stock_patch: None,
                };
                let last = self.make_point(ctx, next, self.time);
                self.push_sample(last);
                return Ok(self.finish(FlightEnd::Exit, None, Some(exit)));
            }

            if self.time >= self.next_sample_time {
                let sample = self.make_point(ctx, next, self.time);
                self.push_sample(sample);
                self.next_sample_time = self.time + sample_interval(altitude);
            }

            if self.time >= self.end_time {
                let last = self.make_point(ctx, next, self.time);
                self.push_sample(last);
                let mut state = VesselState {
                    body: self.entry.body,
                    time: self.time,
                    position: next.position,
                    velocity: next.velocity,
                    stock_patch: None,
                };
                if let Some(node) = self.node {
                    let delta_v = super::burn_vector(&self.body, &state, &node);
                    state.velocity += delta_v;
                }
                return Ok(self.finish(FlightEnd::PatchEnd, None, Some(state)));
            }

            if self.iteration % yield_every == 0 && Instant::now() >= ctx.deadline {
                return Ok(FlightStep::Suspended);
            }
        }
    }

    fn push_sample(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Refine the contact point between `before` (above ground) and `after`
    /// (below) and close the patch with an impact.
    fn impact(
        &mut self,
        ctx: &mut FlightContext,
        before: SimulationState,
        after: SimulationState,
        ground_before: f64,
        ground_after: f64,
    ) -> FlightStep {
        let denominator = ground_before - ground_after;
        let coefficient = if denominator > 0.0 {
            clamp(ground_before / denominator, 0.01, 1.0)
        } else {
            1.0
        };
        let hit = SimulationState::new(
            before.position.lerp(after.position, coefficient),
            before.velocity.lerp(after.velocity, coefficient),
        );
        let hit_time = self.time - self.dt + coefficient * self.dt;

        let last = self.make_point(ctx, hit, hit_time);
        self.push_sample(last);

        let impact = Impact {
            time: hit_time,
            position: hit.position,
            rotated_position: rotate_to_body_fixed(
                &self.body,
                hit.position,
                hit_time,
                self.reference_time,
            ),
            velocity: air_velocity(&self.body, hit.position, hit.velocity),
        };
        self.time = hit_time;
        self.finish(FlightEnd::Impact, Some(impact), None)
    }

    fn finish(
        &mut self,
        end: FlightEnd,
        impact: Option<Impact>,
        next: Option<VesselState>,
    ) -> FlightStep {
        let points = std::mem::take(&mut self.points).seal();
        let patch = Patch {
            starting_state: self.entry.clone(),
            end_time: self.time.max(self.entry.time),
            kind: PatchKind::Atmospheric(points),
            impact,
        };
        FlightStep::Finished { end, patch, next }
    }
}
