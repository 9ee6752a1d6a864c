//! Core types and constants shared by the predictor, the aerodynamic model
//! and the host integration.
//!
//! World frame convention: positions and velocities are relative to the
//! reference body's center, axes follow the host engine (Y is the body's
//! rotation axis). Orbit math works in a Z-up frame, see [`crate::math::swap_yz`].

use bevy::math::DVec3;

/// Degrees to radians conversion factor
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Air densities below this are treated as vacuum (kg/m³).
pub const MIN_DENSITY: f64 = 1e-10;

/// Identifier of a celestial body in the host's body table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyId(pub u32);

/// Identifier of a vessel in the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VesselId(pub u64);

/// Exponential atmosphere with a hard ceiling.
#[derive(Clone, Debug, PartialEq)]
pub struct Atmosphere {
    /// Height of the atmosphere ceiling above sea level (meters).
    pub depth: f64,
    /// Density at sea level (kg/m³).
    pub sea_level_density: f64,
    /// Scale height (meters).
    pub scale_height: f64,
}

impl Atmosphere {
    /// Air density at `altitude` above sea level. Zero above the ceiling.
    pub fn density(&self, altitude: f64) -> f64 {
        if altitude >= self.depth {
            return 0.0;
        }
        self.sea_level_density * (-altitude.max(0.0) / self.scale_height).exp()
    }
}

/// Physical parameters of a reference body.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyParams {
    pub id: BodyId,
    pub name: String,
    /// Mean radius (sea level) in meters.
    pub radius: f64,
    /// Standard gravitational parameter GM (m³/s²).
    pub gravitational_parameter: f64,
    /// `None` for airless bodies.
    pub atmosphere: Option<Atmosphere>,
    /// Highest terrain point above sea level (meters).
    pub max_terrain_height: f64,
    /// Sidereal rotation period in seconds (non-positive or infinite = no rotation).
    pub rotation_period: f64,
    /// Sphere of influence radius (meters).
    pub sphere_of_influence: f64,
}

impl BodyParams {
    pub fn has_atmosphere(&self) -> bool {
        self.atmosphere.is_some()
    }

    /// Altitude of the atmosphere ceiling, or 0 for airless bodies.
    pub fn atmosphere_depth(&self) -> f64 {
        self.atmosphere.as_ref().map_or(0.0, |a| a.depth)
    }

    /// Air density at `altitude`, zero for airless bodies.
    pub fn density(&self, altitude: f64) -> f64 {
        self.atmosphere.as_ref().map_or(0.0, |a| a.density(altitude))
    }

    /// Angular velocity vector of the body in the world frame.
    pub fn angular_velocity(&self) -> DVec3 {
        if self.rotation_period.is_finite() && self.rotation_period > 0.0 {
            DVec3::Y * (std::f64::consts::TAU / self.rotation_period)
        } else {
            DVec3::ZERO
        }
    }

    /// Velocity of the atmosphere (co-rotating with the surface) at `position`.
    pub fn surface_velocity(&self, position: DVec3) -> DVec3 {
        self.angular_velocity().cross(position)
    }
}

/// One part of a vessel as far as aerodynamics are concerned.
#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    /// Reference drag area (m²), drag coefficient already folded in.
    pub drag_area: f64,
    /// Reference lift area (m²), lift coefficient already folded in.
    pub lift_area: f64,
    /// Shielded parts (inside fairings, cargo bays) produce no force.
    pub shielded: bool,
}

/// Current orientation of a vessel in the world frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attitude {
    /// Nose direction.
    pub forward: DVec3,
    /// "Top" of the vessel, orthogonal to `forward`.
    pub up: DVec3,
}

impl Default for Attitude {
    fn default() -> Self {
        Self {
            forward: DVec3::Y,
            up: DVec3::Z,
        }
    }
}

/// Host-reported flight situation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Situation {
    Flying,
    SubOrbital,
    Orbiting,
    Escaping,
    Landed,
    Splashed,
    /// Kerbal on extra-vehicular activity.
    Eva,
}

/// A planned burn. Delta-v components are expressed in the orbit frame at
/// the node: x = prograde, y = normal, z = radial out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ManeuverNode {
    pub time: f64,
    pub delta_v: DVec3,
}

/// One conic segment of the host's patched-conic flight plan.
#[derive(Clone, Debug)]
pub struct OrbitSegment {
    pub body: BodyId,
    /// Universal time at which the segment begins.
    pub start_time: f64,
    /// Analytic orbit of this segment, in the orbit frame.
    pub orbit: crate::orbit::ConicOrbit,
}

/// Output of the host's patched-conic solver.
#[derive(Clone, Debug, Default)]
pub struct FlightPlan {
    /// Segments in chronological order. The first one is the current orbit.
    pub segments: Vec<OrbitSegment>,
    /// Maneuver nodes not already folded into `segments`.
    pub maneuver_nodes: Vec<ManeuverNode>,
}

/// Read-only snapshot of the vessel and its environment, captured by the
/// host once per frame.
#[derive(Clone, Debug)]
pub struct VesselSnapshot {
    pub vessel: VesselId,
    /// Total mass in kilograms.
    pub mass: f64,
    pub parts: Vec<Part>,
    pub attitude: Attitude,
    pub situation: Situation,
    pub main_body: BodyId,
    pub bodies: Vec<BodyParams>,
    /// Universal time of the snapshot (seconds).
    pub time: f64,
    /// Position relative to the main body (world frame, meters).
    pub position: DVec3,
    /// Velocity relative to the main body (world frame, m/s).
    pub velocity: DVec3,
    /// Fixed physics step of the host (seconds).
    pub physics_dt: f64,
    /// `None` when the host's conic solver is not available this frame.
    pub flight_plan: Option<FlightPlan>,
}

impl VesselSnapshot {
    pub fn body(&self, id: BodyId) -> Option<&BodyParams> {
        self.bodies.iter().find(|b| b.id == id)
    }

    pub fn main_body_params(&self) -> Option<&BodyParams> {
        self.body(self.main_body)
    }

    /// Number of parts exposed to the airflow.
    pub fn exposed_part_count(&self) -> usize {
        self.parts.iter().filter(|p| !p.shielded).count()
    }

    /// Whether there is nothing to predict (no parts, on the ground, EVA).
    pub fn is_grounded(&self) -> bool {
        self.parts.is_empty()
            || matches!(
                self.situation,
                Situation::Landed | Situation::Splashed | Situation::Eva
            )
    }
}

/// State of the vessel at one instant, as used at patch boundaries.
#[derive(Clone, Debug, PartialEq)]
pub struct VesselState {
    pub body: BodyId,
    pub time: f64,
    /// Position relative to the body (world frame).
    pub position: DVec3,
    /// Velocity relative to the body (world frame, not air-relative).
    pub velocity: DVec3,
    /// Index of the flight plan segment this state lies on, if any.
    pub stock_patch: Option<usize>,
}

impl VesselState {
    pub fn from_snapshot(snapshot: &VesselSnapshot) -> Self {
        let on_first_segment = snapshot
            .flight_plan
            .as_ref()
            .is_some_and(|plan| !plan.segments.is_empty());
        Self {
            body: snapshot.main_body,
            time: snapshot.time,
            position: snapshot.position,
            velocity: snapshot.velocity,
            stock_patch: on_first_segment.then_some(0),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.position.is_finite() && self.velocity.is_finite()
    }
}
