//! Aerodynamic force model used by the predictor.
//!
//! A raw force formula (stock or external, see [`registry`]) only knows how to
//! compute forces for the vessel's *current* orientation. The
//! [`AerodynamicModel`] re-targets those forces onto a predicted orientation
//! given by the predicted air velocity and a commanded angle of attack, and
//! optionally memoizes them in an [`AeroForceCache`].

pub mod cache;
pub mod registry;

#[cfg(test)]
mod proptest_cache;

use bevy::log::{debug, warn};
use bevy::math::{DVec2, DVec3};

pub use cache::{AeroForceCache, CacheSettings, CacheSource};
pub use registry::{AeroProvider, AeroRegistry, ProviderKind, StockDrag, StockProvider};

use crate::math::velocity_frame;
use crate::types::{BodyId, BodyParams, MIN_DENSITY, VesselId, VesselSnapshot};

/// Air speed of the reference drag probe (m/s).
pub const PROBE_VELOCITY: f64 = 100.0;

/// Ratio between probe and baseline drag above which the model is stale.
pub const PROBE_TOLERANCE: f64 = 1.2;

/// Relative mass change above which the model is stale.
pub const MASS_TOLERANCE: f64 = 0.01;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AeroError {
    #[error("body {0:?} is not in the snapshot's body table")]
    UnknownBody(BodyId),

    #[error("no aerodynamic provider is available for this vessel")]
    NoProvider,

    #[error("invalid cache resolution {nv}x{na}x{nm} (each axis needs at least 2 nodes)")]
    InvalidResolution { nv: usize, na: usize, nm: usize },

    #[error(
        "invalid cache bounds (velocity {max_velocity}, aoa {max_aoa}, altitude {max_altitude})"
    )]
    InvalidBounds {
        max_velocity: f64,
        max_aoa: f64,
        max_altitude: f64,
    },
}

/// A body- and vessel-specific aerodynamic formula.
///
/// Forces are returned in the world frame, for the vessel in the attitude it
/// had when the model was built.
pub trait RawForceModel: Send + Sync {
    fn compute_forces(&self, air_velocity: DVec3, altitude: f64) -> DVec3;
}

/// Raw model plus the geometry needed to re-target its forces.
struct ForceSampler {
    raw: Box<dyn RawForceModel>,
    body: BodyParams,
    /// Vessel nose at build time.
    forward: DVec3,
    /// Vessel "top" at build time, orthogonalized against `forward`.
    up: DVec3,
}

impl ForceSampler {
    fn new(raw: Box<dyn RawForceModel>, body: BodyParams, forward: DVec3, up: DVec3) -> Self {
        let forward = forward.try_normalize().unwrap_or(DVec3::Y);
        let mut up = (up - forward * up.dot(forward)).normalize_or_zero();
        if up == DVec3::ZERO {
            up = crate::math::perpendicular(forward);
        }
        Self {
            raw,
            body,
            forward,
            up,
        }
    }

    fn compute_forces(
        &self,
        altitude: f64,
        air_velocity: DVec3,
        vertical_up: DVec3,
        aoa: f64,
    ) -> DVec3 {
        if altitude >= self.body.atmosphere_depth() || !self.body.has_atmosphere() {
            return DVec3::ZERO;
        }

        // Air velocity as seen by the vessel in its current attitude, pitched by aoa
        let speed = air_velocity.length();
        let (sin_a, cos_a) = aoa.sin_cos();
        let synthetic_dir = self.forward * cos_a - self.up * sin_a;
        let synthetic_lift = self.forward * sin_a + self.up * cos_a;
        let synthetic_right = synthetic_dir.cross(synthetic_lift);
        let synthetic = synthetic_dir * speed;
        if !synthetic.is_finite() {
            warn!("Non-finite synthetic air velocity (aoa {aoa}), using zero force");
            return DVec3::ZERO;
        }

        let raw = self.raw.compute_forces(synthetic, altitude);
        if !raw.is_finite() {
            warn!("Aerodynamic model returned {raw} at altitude {altitude:.0} m, using zero force");
            return DVec3::ZERO;
        }

        let drag = raw.dot(synthetic_dir);
        let lift = raw.dot(synthetic_lift);
        let side = raw.dot(synthetic_right);

        let frame = velocity_frame(vertical_up, air_velocity);
        let force = frame.forward * drag + frame.up * lift + frame.forward.cross(frame.up) * side;
        if !force.is_finite() {
            warn!("Non-finite re-projected aerodynamic force, using zero force");
            return DVec3::ZERO;
        }
        force
    }

    fn reference_drag(&self) -> f64 {
        self.raw
            .compute_forces(self.forward * PROBE_VELOCITY, 0.0)
            .length()
    }
}

impl CacheSource for ForceSampler {
    fn exact_force(&self, velocity: f64, aoa: f64, altitude: f64) -> DVec2 {
        let f = self.compute_forces(altitude, DVec3::new(velocity, 0.0, 0.0), DVec3::Y, aoa);
        DVec2::new(f.x, f.y)
    }

    fn pack(&self, force: DVec2, velocity: f64, altitude: f64) -> DVec2 {
        let rho = self.body.density(altitude);
        if rho < MIN_DENSITY {
            return DVec2::ZERO;
        }
        force / (rho * (velocity * velocity).max(1.0))
    }

    fn unpack(&self, packed: DVec2, velocity: f64, altitude: f64) -> DVec2 {
        let rho = self.body.density(altitude);
        if rho < MIN_DENSITY {
            return DVec2::ZERO;
        }
        packed * (rho * (velocity * velocity).max(1.0))
    }
}

/// Aerodynamic forces for one vessel around one body.
pub struct AerodynamicModel {
    sampler: ForceSampler,
    cache: Option<AeroForceCache>,
    provider: ProviderKind,
    vessel: VesselId,
    mass: f64,
    part_count: usize,
    reference_drag: f64,
    last_probe_time: f64,
}

impl AerodynamicModel {
    /// Build a model for the snapshot's vessel around its main body.
    ///
    /// `cache` enables the lookup table with the given settings.
    pub fn build(
        snapshot: &VesselSnapshot,
        provider: &dyn AeroProvider,
        cache: Option<&CacheSettings>,
    ) -> Result<Self, AeroError> {
        let body = snapshot
            .main_body_params()
            .ok_or(AeroError::UnknownBody(snapshot.main_body))?
            .clone();
        let raw = provider.build(snapshot, &body);
        let sampler = ForceSampler::new(raw, body, snapshot.attitude.forward, snapshot.attitude.up);

        let cache = match cache {
            Some(settings) if sampler.body.has_atmosphere() => Some(AeroForceCache::new(
                settings,
                sampler.body.atmosphere_depth(),
            )?),
            _ => None,
        };

        let reference_drag = sampler.reference_drag();
        debug!(
            "Built {} aerodynamic model for {:?} around {} (reference drag {:.1} N)",
            provider.name(),
            snapshot.vessel,
            sampler.body.name,
            reference_drag
        );

        Ok(Self {
            sampler,
            cache,
            provider: provider.kind(),
            vessel: snapshot.vessel,
            mass: snapshot.mass,
            part_count: snapshot.parts.len(),
            reference_drag,
            last_probe_time: snapshot.time,
        })
    }

    pub fn body(&self) -> &BodyParams {
        &self.sampler.body
    }

    pub fn provider(&self) -> &ProviderKind {
        &self.provider
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn reference_drag(&self) -> f64 {
        self.reference_drag
    }

    pub fn cache(&self) -> Option<&AeroForceCache> {
        self.cache.as_ref()
    }

    /// Settings of the lookup table, `None` when forces are computed exactly.
    pub fn cache_settings(&self) -> Option<&CacheSettings> {
        self.cache.as_ref().map(AeroForceCache::settings)
    }

    /// Exact world-frame force, bypassing the cache.
    pub fn compute_forces(
        &self,
        altitude: f64,
        air_velocity: DVec3,
        vertical_up: DVec3,
        aoa: f64,
    ) -> DVec3 {
        self.sampler
            .compute_forces(altitude, air_velocity, vertical_up, aoa)
    }

    /// World-frame force at a body-relative position, through the cache when enabled.
    pub fn get_forces(&mut self, body_position: DVec3, air_velocity: DVec3, aoa: f64) -> DVec3 {
        let altitude = body_position.length() - self.sampler.body.radius;
        let vertical_up = body_position.normalize_or_zero();

        let Some(cache) = self.cache.as_mut() else {
            return self
                .sampler
                .compute_forces(altitude, air_velocity, vertical_up, aoa);
        };
        if altitude >= self.sampler.body.atmosphere_depth() {
            return DVec3::ZERO;
        }

        let local = cache.get_force(air_velocity.length(), aoa, altitude, &self.sampler);
        let frame = velocity_frame(vertical_up, air_velocity);
        let force = frame.forward * local.x + frame.up * local.y;
        if !force.is_finite() {
            warn!("Non-finite cached aerodynamic force at altitude {altitude:.0} m, using zero force");
            return DVec3::ZERO;
        }
        force
    }

    /// Whether this model still describes the vessel in `snapshot`.
    ///
    /// With `auto_update`, a reference drag probe is compared against the
    /// baseline at most once every `probe_interval` seconds of universal time.
    pub fn is_valid_for(
        &mut self,
        snapshot: &VesselSnapshot,
        provider: &dyn AeroProvider,
        auto_update: bool,
        probe_interval: f64,
    ) -> bool {
        if snapshot.vessel != self.vessel
            || snapshot.main_body != self.sampler.body.id
            || snapshot.parts.len() != self.part_count
            || provider.kind() != self.provider
        {
            return false;
        }
        if (snapshot.mass - self.mass).abs() > MASS_TOLERANCE * self.mass.abs() {
            return false;
        }

        if auto_update && (snapshot.time - self.last_probe_time).abs() >= probe_interval {
            self.last_probe_time = snapshot.time;
            let Some(body) = snapshot.main_body_params() else {
                return false;
            };
            let probe = ForceSampler::new(
                provider.build(snapshot, body),
                body.clone(),
                snapshot.attitude.forward,
                snapshot.attitude.up,
            )
            .reference_drag();
            let ratio = probe.max(self.reference_drag) / probe.min(self.reference_drag).max(1.0);
            if ratio > PROBE_TOLERANCE {
                debug!(
                    "Reference drag changed from {:.1} N to {:.1} N, rebuilding model",
                    self.reference_drag, probe
                );
                return false;
            }
        }
        true
    }
}
