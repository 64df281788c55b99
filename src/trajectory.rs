//! The knot-indexed trajectory container.
//!
//! A [`Trajectory`] owns every per-knot array the solver mutates in place:
//! states, (augmented) controls, interval durations, and the foh midpoints.
//! Buffers are sized once from [`Dims`] at construction and never resized;
//! the line search writes into a second, identically-shaped [`Trajectory`]
//! (the "shadow" trajectory) and the façade swaps between the two.

use nalgebra::DVector;

use crate::dims::Dims;

/// A full state/control/time trajectory plus the foh auxiliary arrays.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub dims: Dims,
    /// States `x_1..x_N`.
    pub x: Vec<DVector<f64>>,
    /// Controls `u_1..u_N` (the augmented `mm`-dimensional vector); `u[N-1]`
    /// is only meaningful under foh.
    pub u: Vec<DVector<f64>>,
    /// Interval durations `dt_1..dt_{N-1}` (unused entry at the last index).
    pub dt: Vec<f64>,
    /// foh state midpoints, one per interval.
    pub xm: Vec<DVector<f64>>,
    /// foh control midpoints, one per interval.
    pub um: Vec<DVector<f64>>,
    /// `dx_k = fc(x_k, u_k)`, one per interval.
    pub dx: Vec<DVector<f64>>,
}

impl Trajectory {
    /// Allocates a zeroed trajectory sized from `dims`, with a uniform
    /// interval duration `dt0` (overwritten per-knot under minimum-time).
    pub fn zeros(dims: Dims, dt0: f64) -> Self {
        let mm = dims.mm();
        Self {
            dims,
            x: vec![DVector::zeros(dims.n); dims.n_knots],
            u: vec![DVector::zeros(mm); dims.n_knots],
            dt: vec![dt0; dims.n_knots],
            xm: vec![DVector::zeros(dims.n); dims.n_intervals()],
            um: vec![DVector::zeros(mm); dims.n_intervals()],
            dx: vec![DVector::zeros(dims.n); dims.n_intervals()],
        }
    }

    /// The plant-sized control slice at knot `k` (strips embedding columns).
    pub fn plant_u(&self, k: usize) -> DVector<f64> {
        self.u[k].rows(0, self.dims.m).clone_owned()
    }

    /// The interval duration of interval `k`, accounting for the
    /// minimum-time embedding (`dt_k = u_k[m̄]²`).
    pub fn dt_of(&self, k: usize) -> f64 {
        match self.dims.min_time_index() {
            Some(j) => {
                let s = self.u[k][j];
                s * s
            }
            None => self.dt[k],
        }
    }

    /// The infeasible-start "slack" controls at knot `k`, if the embedding
    /// is active.
    pub fn infeasible_u(&self, k: usize) -> Option<DVector<f64>> {
        self.dims
            .infeasible_range()
            .map(|(start, len)| self.u[k].rows(start, len).clone_owned())
    }

    /// Copies every buffer from `other` into `self` in place (used when the
    /// line search accepts a shadow trajectory).
    pub fn copy_from(&mut self, other: &Trajectory) {
        self.x.clone_from(&other.x);
        self.u.clone_from(&other.u);
        self.dt.clone_from(&other.dt);
        self.xm.clone_from(&other.xm);
        self.um.clone_from(&other.um);
        self.dx.clone_from(&other.dx);
    }

    /// `max_k ||x_k||_inf`, used by the divergence check.
    pub fn max_state_norm(&self) -> f64 {
        self.x.iter().map(|x| x.amax()).fold(0.0, f64::max)
    }

    /// `max_k ||u_k||_inf` over the plant controls only.
    pub fn max_control_norm(&self) -> f64 {
        (0..self.dims.n_knots)
            .map(|k| self.plant_u(k).amax())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dims {
        Dims { n: 2, m: 1, n_knots: 5, minimum_time: false, infeasible: false }
    }

    #[test]
    fn zeros_has_expected_shapes() {
        let traj = Trajectory::zeros(dims(), 0.1);
        assert_eq!(traj.x.len(), 5);
        assert_eq!(traj.u.len(), 5);
        assert_eq!(traj.u[0].len(), 1);
        assert_eq!(traj.xm.len(), 4);
    }

    #[test]
    fn dt_of_plain_uses_stored_dt() {
        let traj = Trajectory::zeros(dims(), 0.25);
        assert_eq!(traj.dt_of(2), 0.25);
    }

    #[test]
    fn dt_of_minimum_time_squares_the_extra_control() {
        let dims = Dims { n: 2, m: 1, n_knots: 5, minimum_time: true, infeasible: false };
        let mut traj = Trajectory::zeros(dims, 0.0);
        traj.u[0][1] = 0.2_f64.sqrt();
        assert!((traj.dt_of(0) - 0.2).abs() < 1e-12);
    }
}
