//! Analytic two-body (conic) propagation.
//!
//! Orbits are built from a state vector and propagated with the universal
//! variable formulation, which covers elliptic, parabolic, hyperbolic and
//! radial trajectories alike. Vectors are in the Z-up orbit frame; the
//! predictor converts with [`crate::math::swap_yz`] at the boundaries.

use bevy::math::DVec3;
use std::f64::consts::TAU;

/// Eccentricities below this are treated as circular.
const CIRCULAR_EPSILON: f64 = 1e-10;

/// |1/a| below this is treated as parabolic (1/m).
const PARABOLIC_EPSILON: f64 = 1e-15;

/// A Keplerian orbit around a point mass, anchored at an epoch state.
#[derive(Clone, Debug, PartialEq)]
pub struct ConicOrbit {
    /// Gravitational parameter of the central body (m³/s²).
    mu: f64,
    /// Universal time of the anchor state.
    epoch: f64,
    /// Position at epoch (meters).
    r0: DVec3,
    /// Velocity at epoch (m/s).
    v0: DVec3,
    /// Reciprocal of the semi-major axis (negative for hyperbolic orbits).
    alpha: f64,
    /// Specific angular momentum vector.
    h: DVec3,
    /// Eccentricity.
    e: f64,
    /// Mean anomaly at epoch (elliptic and hyperbolic cases).
    mean_anomaly_at_epoch: f64,
}

impl ConicOrbit {
    /// Build an orbit from a state vector at `epoch`.
    pub fn from_state(mu: f64, position: DVec3, velocity: DVec3, epoch: f64) -> Self {
        let r = position.length();
        let h = position.cross(velocity);
        let e_vec = velocity.cross(h) / mu - position / r;
        let e = e_vec.length();
        let alpha = 2.0 / r - velocity.length_squared() / mu;

        let mut orbit = Self {
            mu,
            epoch,
            r0: position,
            v0: velocity,
            alpha,
            h,
            e,
            mean_anomaly_at_epoch: 0.0,
        };
        orbit.mean_anomaly_at_epoch = orbit.compute_mean_anomaly_at_epoch();
        orbit
    }

    fn compute_mean_anomaly_at_epoch(&self) -> f64 {
        let r = self.r0.length();
        let rv = self.r0.dot(self.v0);
        if self.e < CIRCULAR_EPSILON || self.alpha.abs() < PARABOLIC_EPSILON {
            return 0.0;
        }
        if self.alpha > 0.0 {
            let a = 1.0 / self.alpha;
            let cos_e = (1.0 - r * self.alpha) / self.e;
            let sin_e = rv / (self.e * (self.mu * a).sqrt());
            let ecc_anomaly = sin_e.atan2(cos_e);
            ecc_anomaly - self.e * ecc_anomaly.sin()
        } else {
            let a = 1.0 / self.alpha;
            let sinh_h = rv / (self.e * (-self.mu * a).sqrt());
            let hyp_anomaly = sinh_h.asinh();
            self.e * sinh_h - hyp_anomaly
        }
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    pub fn eccentricity(&self) -> f64 {
        self.e
    }

    /// Semi-major axis in meters (negative for hyperbolic, infinite for parabolic).
    pub fn semi_major_axis(&self) -> f64 {
        1.0 / self.alpha
    }

    pub fn is_bound(&self) -> bool {
        self.alpha > PARABOLIC_EPSILON
    }

    /// Mean motion in radians per second (zero for parabolic orbits).
    pub fn mean_motion(&self) -> f64 {
        let abs_alpha = self.alpha.abs();
        if abs_alpha < PARABOLIC_EPSILON {
            return 0.0;
        }
        (self.mu * abs_alpha * abs_alpha * abs_alpha).sqrt()
    }

    /// Orbital period in seconds, infinite for unbound orbits.
    pub fn period(&self) -> f64 {
        if self.is_bound() {
            TAU / self.mean_motion()
        } else {
            f64::INFINITY
        }
    }

    /// Periapsis radius (distance from the body's center).
    pub fn periapsis(&self) -> f64 {
        self.h.length_squared() / (self.mu * (1.0 + self.e))
    }

    /// Apoapsis radius, infinite for unbound orbits.
    pub fn apoapsis(&self) -> f64 {
        if self.is_bound() {
            (1.0 + self.e) / self.alpha
        } else {
            f64::INFINITY
        }
    }

    /// Time from the epoch to the next periapsis passage.
    ///
    /// In `[0, period)` for bound orbits. Negative for unbound orbits that
    /// already passed periapsis. Zero for circular orbits.
    pub fn time_to_periapsis(&self) -> f64 {
        if self.e < CIRCULAR_EPSILON {
            return 0.0;
        }
        let r = self.r0.length();
        let rv = self.r0.dot(self.v0);
        if self.alpha.abs() < PARABOLIC_EPSILON {
            return self.parabolic_time_to_periapsis(r, rv);
        }
        let n = self.mean_motion();
        if self.alpha > 0.0 {
            (-self.mean_anomaly_at_epoch).rem_euclid(TAU) / n
        } else {
            -self.mean_anomaly_at_epoch / n
        }
    }

    fn parabolic_time_to_periapsis(&self, r: f64, rv: f64) -> f64 {
        let p = self.h.length_squared() / self.mu;
        if p <= 0.0 {
            // Radial parabola: r(t) = (4.5·mu·(t - tp)²)^(1/3)
            let dt = (2.0 * r * r * r / (9.0 * self.mu)).sqrt();
            return if rv < 0.0 { dt } else { -dt };
        }
        // Barker's equation with D = tan(ν/2)
        let cos_nu = (p / r - 1.0).clamp(-1.0, 1.0);
        let mut d = ((1.0 - cos_nu) / (1.0 + cos_nu)).max(0.0).sqrt();
        if rv < 0.0 {
            d = -d;
        }
        let since_periapsis = 0.5 * (p * p * p / self.mu).sqrt() * (d + d * d * d / 3.0);
        -since_periapsis
    }

    /// Position relative to the central body at universal time `t`.
    pub fn position_at(&self, t: f64) -> DVec3 {
        self.state_at(t).0
    }

    /// Velocity relative to the central body at universal time `t`.
    pub fn velocity_at(&self, t: f64) -> DVec3 {
        self.state_at(t).1
    }

    /// Position and velocity at universal time `t`.
    pub fn state_at(&self, t: f64) -> (DVec3, DVec3) {
        let mut dt = t - self.epoch;
        if self.is_bound() {
            dt = dt.rem_euclid(self.period());
        }
        if dt == 0.0 {
            return (self.r0, self.v0);
        }

        let sqrt_mu = self.mu.sqrt();
        let r0 = self.r0.length();
        let chi = self.solve_universal_anomaly(dt);
        let z = self.alpha * chi * chi;
        let (c, s) = stumpff(z);

        let f = 1.0 - chi * chi / r0 * c;
        let g = dt - chi * chi * chi * s / sqrt_mu;
        let pos = self.r0 * f + self.v0 * g;
        let r = pos.length();

        let f_dot = sqrt_mu / (r * r0) * chi * (z * s - 1.0);
        let g_dot = 1.0 - chi * chi / r * c;
        let vel = self.r0 * f_dot + self.v0 * g_dot;

        (pos, vel)
    }

    /// Universal Kepler equation residual and its derivative (the radius).
    fn kepler_residual(&self, chi: f64, dt: f64) -> (f64, f64) {
        let sqrt_mu = self.mu.sqrt();
        let r0 = self.r0.length();
        let vr0 = self.r0.dot(self.v0) / sqrt_mu;
        let z = self.alpha * chi * chi;
        let (c, s) = stumpff(z);
        let chi2 = chi * chi;

        let value = vr0 * chi2 * c + (1.0 - self.alpha * r0) * chi2 * chi * s + r0 * chi
            - sqrt_mu * dt;
        let derivative = vr0 * chi * (1.0 - z * s) + (1.0 - self.alpha * r0) * chi2 * c + r0;
        (value, derivative)
    }

    /// Solve the universal Kepler equation for χ.
    ///
    /// The residual is monotonic in χ (its derivative is the radius), so a
    /// bracket is grown first and Newton steps are confined to it.
    fn solve_universal_anomaly(&self, dt: f64) -> f64 {
        let sign = dt.signum();
        let r0 = self.r0.length();
        let guess = if self.alpha > PARABOLIC_EPSILON {
            self.mu.sqrt() * self.alpha * dt.abs()
        } else {
            self.mu.sqrt() * dt.abs() / r0
        }
        .max(1e-9);

        // Bracket [lo, hi] in the direction of dt, working on |χ|
        let residual = |x: f64| self.kepler_residual(sign * x, dt);
        let mut lo = 0.0;
        let mut hi = guess;
        for _ in 0..200 {
            let (value, _) = residual(hi);
            if !value.is_finite() || value * sign >= 0.0 {
                break;
            }
            lo = hi;
            hi *= 2.0;
        }

        let mut x = guess.clamp(lo, hi);
        for _ in 0..100 {
            let (value, derivative) = residual(x);
            if !value.is_finite() {
                hi = x;
                x = 0.5 * (lo + hi);
                continue;
            }
            if value * sign > 0.0 {
                hi = x;
            } else {
                lo = x;
            }
            // d/d|χ| = sign · d/dχ
            let mut next = x - value / (derivative * sign);
            if !next.is_finite() || next <= lo || next >= hi {
                next = 0.5 * (lo + hi);
            }
            if (next - x).abs() <= 1e-12 * x.abs().max(1.0) {
                x = next;
                break;
            }
            x = next;
        }
        sign * x
    }

    /// First time after `after` at which the orbit crosses `radius` outbound.
    ///
    /// Returns `None` when the orbit never reaches that radius, or for
    /// circular and parabolic orbits.
    pub fn next_time_at_radius(&self, after: f64, radius: f64) -> Option<f64> {
        if self.e < CIRCULAR_EPSILON || self.alpha.abs() < PARABOLIC_EPSILON {
            return None;
        }
        if radius < self.periapsis() || radius > self.apoapsis() {
            return None;
        }
        let n = self.mean_motion();
        let cos_anomaly = (1.0 - radius * self.alpha) / self.e;
        if self.alpha > 0.0 {
            let ecc_anomaly = cos_anomaly.clamp(-1.0, 1.0).acos();
            let mean_anomaly = ecc_anomaly - self.e * ecc_anomaly.sin();
            let period = self.period();
            let first = self.epoch + (mean_anomaly - self.mean_anomaly_at_epoch) / n;
            let cycles = ((after - first) / period).floor() + 1.0;
            let t = first + cycles.max(0.0) * period;
            // `first` itself may already be after `after`
            Some(if first > after { first } else { t })
        } else {
            let hyp_anomaly = cos_anomaly.max(1.0).acosh();
            let mean_anomaly = self.e * hyp_anomaly.sinh() - hyp_anomaly;
            let t = self.epoch + (mean_anomaly - self.mean_anomaly_at_epoch) / n;
            (t > after).then_some(t)
        }
    }

    /// Unit (prograde, normal, radial-out) axes at time `t`.
    pub fn burn_frame_at(&self, t: f64) -> (DVec3, DVec3, DVec3) {
        let (pos, vel) = self.state_at(t);
        let prograde = vel.normalize_or_zero();
        let normal = pos.cross(vel).normalize_or_zero();
        let radial = prograde.cross(normal);
        (prograde, normal, radial)
    }
}

/// Stumpff functions C(z) and S(z).
fn stumpff(z: f64) -> (f64, f64) {
    if z > 1e-6 {
        let sz = z.sqrt();
        ((1.0 - sz.cos()) / z, (sz - sz.sin()) / (sz * z))
    } else if z < -1e-6 {
        let sz = (-z).sqrt();
        ((sz.cosh() - 1.0) / -z, (sz.sinh() - sz) / (sz * -z))
    } else {
        (
            0.5 - z / 24.0 + z * z / 720.0,
            1.0 / 6.0 - z / 120.0 + z * z / 5040.0,
        )
    }
}
