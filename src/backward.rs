//! Riccati backward pass over the augmented `mm`-dimensional control space,
//! with constraint penalty terms, regularized Cholesky solves, and foh.
//!
//! The recursion itself (`Quu = R + B^T S B`, `Ks = -Quu^-1 Qux`,
//! `ds = -Quu^-1 Qu`, and the `S`/`s` update folding `Ks`/`ds` back in) is
//! plain Riccati. What's added on top is the embedding-aware `(A, B)`
//! assembly, the constraint penalty contributions from
//! [`crate::constraints::ConstraintSet`], Tikhonov regularization with
//! Cholesky (so a singular `Quu` triggers a retry instead of a panic), and
//! the foh coupling term.
//!
//! foh couples knot `k`'s cost-to-go to knot `k+1`'s already-solved gains
//! through the dynamics' dependence on `u_{k+1}`. This implementation
//! eliminates that coupling algebraically (`x' = Ā dx + B̄ du + e` with
//! `Ā, B̄` folding in `K_{k+1}` and `e` folding in `d_{k+1}`) rather than by
//! carrying an explicit `b_k` forward-pass gain; [`crate::rollout::Gains::b`]
//! is consequently left at zero by this backward pass. See `DESIGN.md`.

use nalgebra::{DMatrix, DVector};

use crate::constraints::ConstraintSet;
use crate::dims::Dims;
use crate::dynamics::DiscreteDynamics;
use crate::objective::Objective;
use crate::options::{ControlIntegration, SolverOptions};
use crate::regularization::Regularization;
use crate::rollout::Gains;
use crate::trajectory::Trajectory;

/// Expected cost decrease coefficients for the line search's Armijo test:
/// `ΔJ(α) ≈ α·dv1 + α²·dv2`.
pub struct BackwardPassResult {
    pub gains: Gains,
    pub dv1: f64,
    pub dv2: f64,
}

fn embed_b(b_plant: &DMatrix<f64>, dims: &Dims, traj: &Trajectory, k: usize, dynamics: &dyn DiscreteDynamics, x: &DVector<f64>, u_plant: &DVector<f64>, dt: f64) -> DMatrix<f64> {
    let mm = dims.mm();
    let mut b = DMatrix::zeros(dims.n, mm);
    b.view_mut((0, 0), (dims.n, dims.m)).copy_from(b_plant);
    if let Some(j) = dims.min_time_index() {
        let s = traj.u[k][j];
        let d_dt = dynamics.fd_dt_jacobian(x, u_plant, dt);
        b.set_column(j, &(d_dt * 2.0 * s));
    }
    if let Some((start, len)) = dims.infeasible_range() {
        for i in 0..len {
            b[(i, start + i)] = 1.0;
        }
    }
    b
}

/// Runs the backward pass once. Returns `None` if `Quu` stays indefinite
/// after `opts.max_cholesky_retries` regularization bumps, signalling the
/// caller to keep the increased `reg` and retry the whole pass.
pub fn backward_pass(
    dynamics: &dyn DiscreteDynamics,
    dims: &Dims,
    objective: &Objective,
    constraints: &ConstraintSet,
    traj: &Trajectory,
    control_integration: ControlIntegration,
    reg: &mut Regularization,
    opts: &SolverOptions,
) -> Option<BackwardPassResult> {
    let n_int = dims.n_intervals();
    let mm = dims.mm();
    let foh = matches!(control_integration, ControlIntegration::Foh);
    let mut retries: usize = 0;

    'retry: loop {
        let mut gains = Gains::zeros(dims);
        let mut dv1 = 0.0;
        let mut dv2 = 0.0;

        let (qxx_f, qx_f) = objective.terminal_expansion(&traj.x[n_int]);
        let (jxx_term, jx_term) = constraints.terminal_penalty_terms(dims);
        let mut vxx = qxx_f + jxx_term;
        let mut vx = qx_f + jx_term;

        let mut next_k: Option<DMatrix<f64>> = None;
        let mut next_d: Option<DVector<f64>> = None;
        let mut failed = false;

        for k in (0..n_int).rev() {
            let x = traj.x[k].clone();
            let u_full = traj.u[k].clone();
            let dt = traj.dt_of(k);
            let u_plant = traj.plant_u(k);

            let exp = objective.stage_expansion(&x, &u_full);
            let (jxx, juu, jux, jx, ju) = constraints.stage_penalty_terms(k, dims);

            let qxx_s = exp.qxx + jxx;
            let quu_s = exp.quu + juu;
            let qux_s = exp.qux + jux;
            let qx_s = exp.qx + jx;
            let qu_s = exp.qu + ju;

            let (a, b_plant) = dynamics.fd_jacobian(&x, &u_plant, dt);
            let b_full = embed_b(&b_plant, dims, traj, k, dynamics, &x, &u_plant, dt);

            let (a_eff, b_eff, e) = if !foh {
                (a, b_full, DVector::zeros(dims.n))
            } else {
                let u_next_plant = traj.plant_u(k + 1);
                let (_, _, c_plant) = dynamics.fd_foh_jacobian(&x, &u_plant, &u_next_plant, dt);
                let mut c_full = DMatrix::zeros(dims.n, mm);
                c_full.view_mut((0, 0), (dims.n, dims.m)).copy_from(&c_plant);

                match (&next_k, &next_d) {
                    (Some(k_next), Some(d_next)) => {
                        let m = DMatrix::identity(dims.n, dims.n) - &c_full * k_next;
                        match m.clone().try_inverse() {
                            Some(m_inv) => {
                                let a_eff = &m_inv * &a;
                                let b_eff = &m_inv * &b_full;
                                let e = &m_inv * (&c_full * d_next);
                                (a_eff, b_eff, e)
                            }
                            None => {
                                failed = true;
                                (a, b_full, DVector::zeros(dims.n))
                            }
                        }
                    }
                    _ => (a, b_full, DVector::zeros(dims.n)),
                }
            };
            if failed {
                break;
            }

            let vx_shift = &vx + &vxx * &e;
            let qx_q = qx_s + a_eff.transpose() * &vx_shift;
            let qu_q = qu_s + b_eff.transpose() * &vx_shift;
            let qxx_q = qxx_s + a_eff.transpose() * &vxx * &a_eff;
            let mut quu_q = quu_s + b_eff.transpose() * &vxx * &b_eff;
            let qux_q = qux_s + b_eff.transpose() * &vxx * &a_eff;

            quu_q += DMatrix::identity(mm, mm) * reg.rho;

            let chol = match nalgebra::linalg::Cholesky::new(quu_q.clone()) {
                Some(c) => c,
                None => {
                    failed = true;
                    break;
                }
            };
            let neg_qux = -qux_q.clone();
            let neg_qu = -qu_q.clone();
            let k_gain = chol.solve(&neg_qux);
            let d_gain = chol.solve(&neg_qu);

            dv1 += d_gain.dot(&qu_q);
            dv2 += 0.5 * d_gain.dot(&(&quu_q * &d_gain));

            vx = qx_q + k_gain.transpose() * &quu_q * &d_gain + k_gain.transpose() * &qu_q + qux_q.transpose() * &d_gain;
            vxx = qxx_q + k_gain.transpose() * &quu_q * &k_gain + k_gain.transpose() * &qux_q + qux_q.transpose() * &k_gain;
            vxx = 0.5 * (&vxx + vxx.transpose());

            gains.k[k] = k_gain.clone();
            gains.d[k] = d_gain.clone();

            next_k = Some(k_gain);
            next_d = Some(d_gain);
        }

        if failed {
            reg.increase(opts);
            retries += 1;
            if retries > opts.max_cholesky_retries || reg.rho > opts.rho_max {
                return None;
            }
            continue 'retry;
        }

        return Some(BackwardPassResult { gains, dv1, dv2 });
    }
}
