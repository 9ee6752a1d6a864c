//! Lazily filled 3D lookup table of aerodynamic forces.
//!
//! The table is indexed by (air speed, angle of attack, altitude) and stores
//! packed 2D forces in the velocity frame: x along the air velocity, y along
//! the lift direction. Cells are computed on first read and never change
//! afterwards; the owning model is rebuilt wholesale when the vessel changes.

use bevy::math::DVec2;
use wide::f64x4;

use super::AeroError;
use crate::math::clamp;

/// Resolution and bounds of the force table.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheSettings {
    /// Number of air speed samples. Default: 32.
    pub velocity_resolution: usize,
    /// Number of angle of attack samples. Default: 33 (odd so that 0 is a node).
    pub aoa_resolution: usize,
    /// Number of altitude samples. Default: 32.
    pub altitude_resolution: usize,
    /// Upper air speed bound (m/s). Default: 3000.
    pub max_velocity: f64,
    /// Angle of attack bound in radians, the table covers ±max. Default: π.
    pub max_aoa: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            velocity_resolution: 32,
            aoa_resolution: 33,
            altitude_resolution: 32,
            max_velocity: 3000.0,
            max_aoa: std::f64::consts::PI,
        }
    }
}

/// Producer of exact forces for the cache, and the packing that makes
/// them smooth enough to interpolate.
pub trait CacheSource {
    /// Exact force in the canonical velocity frame at a grid node.
    fn exact_force(&self, velocity: f64, aoa: f64, altitude: f64) -> DVec2;
    /// Normalize a force before storing it.
    fn pack(&self, force: DVec2, velocity: f64, altitude: f64) -> DVec2;
    /// Inverse of [`CacheSource::pack`].
    fn unpack(&self, packed: DVec2, velocity: f64, altitude: f64) -> DVec2;
}

/// Force table over a (velocity, aoa, altitude) grid, read with trilinear
/// interpolation.
#[derive(Clone, Debug)]
pub struct AeroForceCache {
    settings: CacheSettings,
    nv: usize,
    na: usize,
    nm: usize,
    max_velocity: f64,
    max_aoa: f64,
    max_altitude: f64,
    cells: Vec<Option<DVec2>>,
    filled: usize,
}

impl AeroForceCache {
    /// Create an empty table covering altitudes `[0, max_altitude]`.
    pub fn new(settings: &CacheSettings, max_altitude: f64) -> Result<Self, AeroError> {
        let (nv, na, nm) = (
            settings.velocity_resolution,
            settings.aoa_resolution,
            settings.altitude_resolution,
        );
        if nv < 2 || na < 2 || nm < 2 {
            return Err(AeroError::InvalidResolution { nv, na, nm });
        }
        let bounds = [settings.max_velocity, settings.max_aoa, max_altitude];
        if bounds.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(AeroError::InvalidBounds {
                max_velocity: settings.max_velocity,
                max_aoa: settings.max_aoa,
                max_altitude,
            });
        }

        Ok(Self {
            settings: settings.clone(),
            nv,
            na,
            nm,
            max_velocity: settings.max_velocity,
            max_aoa: settings.max_aoa,
            max_altitude,
            cells: vec![None; nv * na * nm],
            filled: 0,
        })
    }

    /// Settings the table was created with.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Grid dimensions (velocity, aoa, altitude).
    pub fn resolution(&self) -> (usize, usize, usize) {
        (self.nv, self.na, self.nm)
    }

    /// Number of cells computed so far.
    pub fn filled_cells(&self) -> usize {
        self.filled
    }

    /// Number of grid nodes, filled or not.
    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    /// Interpolated force for the given air speed, angle of attack and altitude.
    ///
    /// Inputs outside the table bounds are clamped, and the clamped values are
    /// also used for unpacking.
    pub fn get_force<S: CacheSource + ?Sized>(
        &mut self,
        velocity: f64,
        aoa: f64,
        altitude: f64,
        source: &S,
    ) -> DVec2 {
        let v = clamp(velocity, 0.0, self.max_velocity);
        let a = clamp(aoa, -self.max_aoa, self.max_aoa);
        let m = clamp(altitude, 0.0, self.max_altitude);

        let (i, fv) = grid_coord(v / self.max_velocity, self.nv);
        let (j, fa) = grid_coord(a / self.max_aoa * 0.5 + 0.5, self.na);
        let (k, fm) = grid_coord(m / self.max_altitude, self.nm);

        let c000 = self.cell(i, j, k, source);
        let c100 = self.cell(i + 1, j, k, source);
        let c010 = self.cell(i, j + 1, k, source);
        let c110 = self.cell(i + 1, j + 1, k, source);
        let c001 = self.cell(i, j, k + 1, source);
        let c101 = self.cell(i + 1, j, k + 1, source);
        let c011 = self.cell(i, j + 1, k + 1, source);
        let c111 = self.cell(i + 1, j + 1, k + 1, source);

        // Along velocity, two (aoa) rows at a time: [e_j0.x, e_j0.y, e_j1.x, e_j1.y]
        let near = lerp4(
            f64x4::new([c000.x, c000.y, c010.x, c010.y]),
            f64x4::new([c100.x, c100.y, c110.x, c110.y]),
            fv,
        )
        .to_array();
        let far = lerp4(
            f64x4::new([c001.x, c001.y, c011.x, c011.y]),
            f64x4::new([c101.x, c101.y, c111.x, c111.y]),
            fv,
        )
        .to_array();

        // Along aoa, both altitude layers at once
        let layers = lerp4(
            f64x4::new([near[0], near[1], far[0], far[1]]),
            f64x4::new([near[2], near[3], far[2], far[3]]),
            fa,
        )
        .to_array();

        let low = DVec2::new(layers[0], layers[1]);
        let high = DVec2::new(layers[2], layers[3]);
        let packed = low.lerp(high, fm);

        source.unpack(packed, v, m)
    }

    fn cell<S: CacheSource + ?Sized>(&mut self, i: usize, j: usize, k: usize, source: &S) -> DVec2 {
        let index = (i * self.na + j) * self.nm + k;
        if let Some(value) = self.cells[index] {
            return value;
        }

        let v = i as f64 / (self.nv - 1) as f64 * self.max_velocity;
        let a = (j as f64 / (self.na - 1) as f64 - 0.5) * 2.0 * self.max_aoa;
        let m = k as f64 / (self.nm - 1) as f64 * self.max_altitude;
        let packed = source.pack(source.exact_force(v, a, m), v, m);

        self.cells[index] = Some(packed);
        self.filled += 1;
        packed
    }
}

/// Map a normalized coordinate in [0, 1] onto `n` nodes: (lower index, fraction).
#[inline]
fn grid_coord(normalized: f64, n: usize) -> (usize, f64) {
    let scaled = normalized * (n - 1) as f64;
    let index = clamp(scaled.floor(), 0.0, (n - 2) as f64) as usize;
    let fraction = clamp(scaled - index as f64, 0.0, 1.0);
    (index, fraction)
}

#[inline]
fn lerp4(a: f64x4, b: f64x4, t: f64) -> f64x4 {
    a + (b - a) * f64x4::splat(t)
}
