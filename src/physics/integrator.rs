//! Fixed-step RK4 integration of the vessel's translational motion.
//!
//! The prediction is compared against the host engine, whose own integrator
//! is first order. After each RK4 step a correction term reproduces the
//! drift that integrator introduces with its physics step `host_dt`:
//!
//! ```text
//! position += 0.5 * host_dt * accel * dt
//! velocity += 0.5 * host_dt * (accel - previous_accel)
//! ```

use bevy::math::DVec3;

/// Position and velocity relative to the body's center.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimulationState {
    pub position: DVec3,
    pub velocity: DVec3,
}

impl SimulationState {
    pub fn new(position: DVec3, velocity: DVec3) -> Self {
        Self { position, velocity }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

/// Advance `state` by `dt` with the classic 4-stage Runge-Kutta scheme.
///
/// The acceleration function takes (position, velocity). Returns the new
/// state and the acceleration evaluated at the start of the step.
pub fn rk4_step<F>(state: SimulationState, mut acceleration_fn: F, dt: f64) -> (SimulationState, DVec3)
where
    F: FnMut(DVec3, DVec3) -> DVec3,
{
    let SimulationState {
        position: p0,
        velocity: v0,
    } = state;
    let half = 0.5 * dt;

    let a1 = acceleration_fn(p0, v0);
    let p1 = v0;

    let v2 = v0 + a1 * half;
    let a2 = acceleration_fn(p0 + p1 * half, v2);

    let v3 = v0 + a2 * half;
    let a3 = acceleration_fn(p0 + v2 * half, v3);

    let v4 = v0 + a3 * dt;
    let a4 = acceleration_fn(p0 + v3 * dt, v4);

    let position = p0 + (p1 + v2 * 2.0 + v3 * 2.0 + v4) * (dt / 6.0);
    let velocity = v0 + (a1 + a2 * 2.0 + a3 * 2.0 + a4) * (dt / 6.0);

    (SimulationState { position, velocity }, a1)
}

/// Apply the host-integrator correction after an RK4 step.
pub fn apply_host_correction(
    state: &mut SimulationState,
    acceleration: DVec3,
    previous_acceleration: DVec3,
    dt: f64,
    host_dt: f64,
) {
    state.position += acceleration * (0.5 * host_dt * dt);
    state.velocity += (acceleration - previous_acceleration) * (0.5 * host_dt);
}
