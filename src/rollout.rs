//! Forward rollout.
//!
//! `forward_rollout` walks the trajectory forward from `x_1 = x0`, either
//! replaying the nominal controls (first outer iteration, no gains yet) or
//! applying the line search's feedback law. It writes into `out` (the
//! shadow trajectory) and returns `false` the moment a divergence is
//! detected, so the caller can abort the step immediately rather than
//! finish a rollout it already knows to reject.
//!
//! foh rollout has a genuine circularity: `x_{k+1}` depends on `u_{k+1}`,
//! but `u_{k+1}`'s feedback law depends on `δx_{k+1} = x_{k+1} - x_{k+1}^nom`.
//! This implementation resolves it with one predictor/corrector sweep per
//! knot (predict `x_{k+1}` using the nominal `u_{k+1}`, compute the real
//! `u_{k+1}` from that prediction, then re-integrate with the real pair).
//! This is a documented simplification of the fully implicit coupled
//! recursion; see `DESIGN.md`.

use nalgebra::{DMatrix, DVector};

use crate::dims::Dims;
use crate::dynamics::{rk3_foh_step, DiscreteDynamics};
use crate::options::ControlIntegration;
use crate::trajectory::Trajectory;

/// Feedback gains produced by the backward pass, one entry per interval.
pub struct Gains {
    /// `K_k`: feedback on `δx_k`, shape `mm x n`.
    pub k: Vec<DMatrix<f64>>,
    /// `d_k`: feedforward, shape `mm`.
    pub d: Vec<DVector<f64>>,
    /// `b_k`: foh coupling on `δu_{k-1}`, shape `mm x mm`. Zero/unused under
    /// zoh.
    pub b: Vec<DMatrix<f64>>,
}

impl Gains {
    pub fn zeros(dims: &Dims) -> Self {
        let n_int = dims.n_intervals();
        let mm = dims.mm();
        Self {
            k: vec![DMatrix::zeros(mm, dims.n); n_int],
            d: vec![DVector::zeros(mm); n_int],
            b: vec![DMatrix::zeros(mm, mm); n_int],
        }
    }
}

fn feedback_control(
    nominal: &Trajectory,
    gains: &Gains,
    alpha: f64,
    k: usize,
    x_k: &DVector<f64>,
    prev_du: &DVector<f64>,
    foh: bool,
) -> DVector<f64> {
    let dx = x_k - &nominal.x[k];
    let mut du = &gains.d[k] * alpha + &gains.k[k] * dx;
    if foh && k > 0 {
        du += &gains.b[k] * prev_du;
    }
    &nominal.u[k] + du
}

/// Runs the forward rollout, writing states/controls/dt into `out`.
/// Returns `false` if the state or control norm exceeds the configured
/// bound at any knot.
#[allow(clippy::too_many_arguments)]
pub fn forward_rollout(
    dynamics: &dyn DiscreteDynamics,
    dims: &Dims,
    control_integration: ControlIntegration,
    nominal: &Trajectory,
    gains: Option<(&Gains, f64)>,
    max_state_value: f64,
    max_control_value: f64,
    out: &mut Trajectory,
) -> bool {
    out.x[0] = nominal.x[0].clone();
    let n_int = dims.n_intervals();
    let foh = matches!(control_integration, ControlIntegration::Foh);

    let mut prev_du = DVector::zeros(dims.mm());
    out.u[0] = match gains {
        Some((g, alpha)) => feedback_control(nominal, g, alpha, 0, &out.x[0].clone(), &prev_du, foh),
        None => nominal.u[0].clone(),
    };
    if let Some(_) = gains {
        prev_du = &out.u[0] - &nominal.u[0];
    }

    for k in 0..n_int {
        let dt = out.dt_of(k);
        out.dt[k] = dt;
        let u_plant_k = out.plant_u(k);

        if u_plant_k.amax() >= max_control_value {
            return false;
        }

        let x_next = if !foh {
            let mut xn = dynamics.fd(&out.x[k], &u_plant_k, dt);
            if let Some((start, len)) = dims.infeasible_range() {
                xn += out.u[k].rows(start, len);
            }
            xn
        } else {
            let u_next_guess = nominal.u[k + 1].clone();
            let u_next_plant_guess = u_next_guess.rows(0, dims.m).clone_owned();
            let (_, x_pred) = rk3_foh_step(dynamics, &out.x[k], &u_plant_k, &u_next_plant_guess, dt);

            out.x[k + 1] = x_pred;
            out.u[k + 1] = match gains {
                Some((g, alpha)) => feedback_control(nominal, g, alpha, k + 1, &out.x[k + 1].clone(), &prev_du, foh),
                None => nominal.u[k + 1].clone(),
            };
            prev_du = &out.u[k + 1] - &nominal.u[k + 1];

            let u_next_plant = out.plant_u(k + 1);
            let (xm, x_final) = rk3_foh_step(dynamics, &out.x[k], &u_plant_k, &u_next_plant, dt);
            out.xm[k] = xm;
            let mut xf = x_final;
            if let Some((start, len)) = dims.infeasible_range() {
                xf += out.u[k].rows(start, len);
            }
            xf
        };
        out.x[k + 1] = x_next;

        if out.x[k + 1].amax() >= max_state_value {
            return false;
        }

        if !foh && k + 1 < n_int {
            out.u[k + 1] = match gains {
                Some((g, alpha)) => feedback_control(nominal, g, alpha, k + 1, &out.x[k + 1].clone(), &prev_du, foh),
                None => nominal.u[k + 1].clone(),
            };
            if gains.is_some() {
                prev_du = &out.u[k + 1] - &nominal.u[k + 1];
            }
        }
    }
    true
}
