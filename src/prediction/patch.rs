//! Patches: the pieces a predicted trajectory is made of.
//!
//! A vacuum patch is an analytic conic; an atmospheric patch is a list of
//! integrated samples. Patches are produced in strictly increasing time order.

use bevy::math::DVec3;

use crate::math::swap_yz;
use crate::orbit::ConicOrbit;
use crate::types::VesselState;

/// Number of points per allocation block of a [`PointBuffer`].
pub const POINT_CHUNK: usize = 128;

/// One sample of an atmospheric patch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// Body-relative position (world frame).
    pub position: DVec3,
    /// Velocity relative to the body's center, not to the air.
    pub orbital_velocity: DVec3,
    /// Aerodynamic force at this point (world frame, newtons).
    pub aero_force: DVec3,
    /// Altitude above the local terrain.
    pub ground_altitude: f64,
    pub time: f64,
}

/// Where and when the trajectory meets the ground.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Impact {
    pub time: f64,
    /// Body-relative position at impact (world frame).
    pub position: DVec3,
    /// Impact site in the body-fixed frame as oriented at the prediction start.
    pub rotated_position: DVec3,
    /// Air-relative velocity at impact.
    pub velocity: DVec3,
}

/// How a patch represents the trajectory between its endpoints.
#[derive(Clone, Debug)]
pub enum PatchKind {
    /// Conic in the Z-up orbit frame.
    Vacuum(ConicOrbit),
    /// Integrated samples, in time order.
    Atmospheric(Box<[Point]>),
}

/// One contiguous piece of a predicted trajectory around a single body.
#[derive(Clone, Debug)]
pub struct Patch {
    pub starting_state: VesselState,
    /// Universal time the patch ends at; the next patch starts here.
    pub end_time: f64,
    pub kind: PatchKind,
    pub impact: Option<Impact>,
}

impl Patch {
    pub fn vacuum(starting_state: VesselState, end_time: f64, orbit: ConicOrbit) -> Self {
        Self {
            end_time: end_time.max(starting_state.time),
            starting_state,
            kind: PatchKind::Vacuum(orbit),
            impact: None,
        }
    }

    pub fn is_atmospheric(&self) -> bool {
        matches!(self.kind, PatchKind::Atmospheric(_))
    }

    pub fn start_time(&self) -> f64 {
        self.starting_state.time
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time()
    }

    pub fn orbit(&self) -> Option<&ConicOrbit> {
        match &self.kind {
            PatchKind::Vacuum(orbit) => Some(orbit),
            PatchKind::Atmospheric(_) => None,
        }
    }

    pub fn points(&self) -> &[Point] {
        match &self.kind {
            PatchKind::Vacuum(_) => &[],
            PatchKind::Atmospheric(points) => points,
        }
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.points().last()
    }

    /// Body-relative position and orbital velocity (world frame) at `time`,
    /// clamped to the patch's time span.
    pub fn state_at(&self, time: f64) -> (DVec3, DVec3) {
        let t = time.clamp(self.start_time(), self.end_time);
        match &self.kind {
            PatchKind::Vacuum(orbit) => {
                let (pos, vel) = orbit.state_at(t);
                (swap_yz(pos), swap_yz(vel))
            }
            PatchKind::Atmospheric(points) => interpolate_points(points, t)
                .unwrap_or((self.starting_state.position, self.starting_state.velocity)),
        }
    }
}

fn interpolate_points(points: &[Point], t: f64) -> Option<(DVec3, DVec3)> {
    let first = points.first()?;
    let after = points.partition_point(|p| p.time <= t);
    if after == 0 {
        return Some((first.position, first.orbital_velocity));
    }
    let a = &points[after - 1];
    let Some(b) = points.get(after) else {
        return Some((a.position, a.orbital_velocity));
    };
    let span = b.time - a.time;
    let f = if span > 0.0 { (t - a.time) / span } else { 0.0 };
    Some((
        a.position.lerp(b.position, f),
        a.orbital_velocity.lerp(b.orbital_velocity, f),
    ))
}

/// Append-only sample storage, grown in fixed-size blocks.
///
/// Samples are only readable after [`PointBuffer::seal`].
#[derive(Debug, Default)]
pub struct PointBuffer {
    chunks: Vec<Vec<Point>>,
    len: usize,
}

impl PointBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: Point) {
        match self.chunks.last_mut() {
            Some(chunk) if chunk.len() < POINT_CHUNK => chunk.push(point),
            _ => {
                let mut chunk = Vec::with_capacity(POINT_CHUNK);
                chunk.push(point);
                self.chunks.push(chunk);
            }
        }
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated blocks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Flatten into a contiguous slice.
    pub fn seal(self) -> Box<[Point]> {
        let mut flat = Vec::with_capacity(self.len);
        for chunk in self.chunks {
            flat.extend(chunk);
        }
        flat.into_boxed_slice()
    }
}
