//! Minimum-time and infeasible-start embeddings.
//!
//! These are decorators, not forks: pure helpers that build an initial
//! [`Trajectory`] and the matching [`crate::constraints::Constraint`]s; the
//! iLQR core (`rollout`, `backward`, `ilqr`) never branches on which
//! embedding is active, it just sees a wider `mm` and more constraints.

use nalgebra::DVector;

use crate::constraints::{Constraint, ConstraintKind, ConstraintParams, Location, Sense};
use crate::dims::Dims;
use crate::dynamics::DiscreteDynamics;
use crate::trajectory::Trajectory;

/// Linear interpolation between `x0` and `xf` over `n_knots` points.
pub fn linear_interpolate_states(x0: &DVector<f64>, xf: &DVector<f64>, n_knots: usize) -> Vec<DVector<f64>> {
    (0..n_knots)
        .map(|k| {
            let t = k as f64 / (n_knots - 1) as f64;
            x0 * (1.0 - t) + xf * t
        })
        .collect()
}

/// Builds an infeasible-start trajectory: `X0` is either the caller's
/// guess or a linear interpolation, and `ui_k` is computed so the augmented
/// rollout reproduces `X0` exactly, i.e. `ui_k = X0[k+1] - fd(X0[k], u0[k],
/// dt_k)`. `dims.infeasible` must already be `true`.
pub fn infeasible_init(
    dynamics: &dyn DiscreteDynamics,
    dims: Dims,
    x0: &DVector<f64>,
    xf: &DVector<f64>,
    x_guess: Option<Vec<DVector<f64>>>,
    u0: &DVector<f64>,
    dt0: f64,
) -> Trajectory {
    assert!(dims.infeasible, "infeasible_init requires dims.infeasible");
    let states = x_guess.unwrap_or_else(|| linear_interpolate_states(x0, xf, dims.n_knots));
    let mut traj = Trajectory::zeros(dims, dt0);
    let (start, len) = dims.infeasible_range().expect("infeasible_range");

    for (k, x) in states.iter().enumerate() {
        traj.x[k] = x.clone();
    }
    for k in 0..dims.n_intervals() {
        traj.u[k].rows_mut(0, dims.m_bar()).copy_from(&u0.rows(0, dims.m_bar()));
        let dt = traj.dt_of(k);
        let predicted = dynamics.fd(&traj.x[k], &traj.plant_u(k), dt);
        let ui = &traj.x[k + 1] - &predicted;
        traj.u[k].rows_mut(start, len).copy_from(&ui);
    }
    traj
}

/// The "go feasible" transition: drops the augmented slack columns
/// once the infeasible-start equality constraints have converged, returning
/// a plain trajectory sized for one more outer iteration without them.
pub fn go_feasible(traj: &Trajectory, dims: &Dims) -> (Trajectory, Dims) {
    let plain_dims = Dims { infeasible: false, ..*dims };
    let mut plain = Trajectory::zeros(plain_dims, traj.dt[0]);
    for k in 0..dims.n_knots {
        plain.x[k] = traj.x[k].clone();
        plain.u[k].rows_mut(0, plain_dims.mm()).copy_from(&traj.u[k].rows(0, plain_dims.mm()));
        plain.dt[k] = traj.dt[k];
    }
    (plain, plain_dims)
}

/// The `n`-row equality constraint driving the infeasible-start slack to
/// zero: one [`crate::constraints::ConstraintKind::InfeasibleEq`]
/// at every interval.
pub fn infeasible_equality_constraint(dims: &Dims, params: ConstraintParams) -> Constraint {
    Constraint::new(ConstraintKind::InfeasibleEq, Location::Stage, Sense::Equality, params, dims)
}

/// The minimum-time embedding's box bound on `u[m̄] = sqrt(dt)` plus the
/// `u_k[m̄] = u_{k+1}[m̄]` smoothness link. Returns `(lower_bound,
/// upper_bound, link)`.
pub fn minimum_time_constraints(dims: &Dims, min_dt: f64, max_dt: f64, params: ConstraintParams) -> (Constraint, Constraint, Constraint) {
    let lower = Constraint::new(
        ConstraintKind::MinTimeBound { bound: min_dt.sqrt(), sign: -1.0 },
        Location::Stage,
        Sense::Inequality,
        params,
        dims,
    );
    let upper = Constraint::new(
        ConstraintKind::MinTimeBound { bound: max_dt.sqrt(), sign: 1.0 },
        Location::Stage,
        Sense::Inequality,
        params,
        dims,
    );
    let link = Constraint::new(ConstraintKind::MinTimeLink, Location::Stage, Sense::Equality, params, dims);
    (lower, upper, link)
}

/// Initializes `u_k[m̄] = sqrt(dt0)` for every interval under the
/// minimum-time embedding, matching the trajectory's stored `dt0` so the
/// first rollout reproduces it exactly.
pub fn minimum_time_init(traj: &mut Trajectory, dt0: f64) {
    let dims = traj.dims;
    if let Some(idx) = dims.min_time_index() {
        let s0 = dt0.sqrt();
        for k in 0..dims.n_intervals() {
            traj.u[k][idx] = s0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DoubleIntegrator;
    impl DiscreteDynamics for DoubleIntegrator {
        fn state_dim(&self) -> usize {
            2
        }
        fn control_dim(&self) -> usize {
            1
        }
        fn fd(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64> {
            DVector::from_vec(vec![x[0] + dt * x[1] + 0.5 * dt * dt * u[0], x[1] + dt * u[0]])
        }
    }

    #[test]
    fn infeasible_init_reproduces_linear_interpolation_exactly() {
        let dims = Dims { n: 2, m: 1, n_knots: 10, minimum_time: false, infeasible: true };
        let dynamics = DoubleIntegrator;
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let xf = DVector::from_vec(vec![1.0, 0.0]);
        let u0 = DVector::zeros(dims.m_bar());
        let traj = infeasible_init(&dynamics, dims, &x0, &xf, None, &u0, 0.1);
        for k in 0..dims.n_intervals() {
            let dt = traj.dt_of(k);
            let predicted = dynamics.fd(&traj.x[k], &traj.plant_u(k), dt);
            let ui = traj.infeasible_u(k).unwrap();
            let reconstructed = predicted + ui;
            assert!((reconstructed - &traj.x[k + 1]).amax() < 1e-10);
        }
    }

    #[test]
    fn go_feasible_drops_slack_columns() {
        let dims = Dims { n: 2, m: 1, n_knots: 5, minimum_time: false, infeasible: true };
        let dynamics = DoubleIntegrator;
        let x0 = DVector::zeros(2);
        let xf = DVector::from_vec(vec![1.0, 0.0]);
        let u0 = DVector::zeros(dims.m_bar());
        let traj = infeasible_init(&dynamics, dims, &x0, &xf, None, &u0, 0.1);
        let (plain, plain_dims) = go_feasible(&traj, &dims);
        assert!(!plain_dims.infeasible);
        assert_eq!(plain.u[0].len(), plain_dims.mm());
    }

    // Scenario 4 (infeasible start): a linear-interpolation init on the same
    // double-integrator boundary conditions as scenario 1, driven through a
    // full solve so the slack controls are verified to converge to zero and
    // the "go feasible" transition actually runs.
    #[test]
    fn infeasible_start_converges_and_goes_feasible() {
        use crate::cost::QuadraticCost;
        use crate::options::SolverOptions;
        use crate::solver::{solve, Problem};
        use nalgebra::DMatrix;

        let dims = Dims { n: 2, m: 1, n_knots: 31, minimum_time: false, infeasible: true };
        let dynamics = DoubleIntegrator;
        let cost = QuadraticCost::new(
            DMatrix::zeros(2, 2),
            DMatrix::identity(1, 1) * 0.1,
            DMatrix::identity(2, 2) * 100.0,
            DVector::zeros(2),
        );
        let problem = Problem {
            dims,
            x0: DVector::from_vec(vec![1.0, 0.0]),
            xf: DVector::zeros(2),
            cost,
            dynamics: &dynamics,
            user_constraints: Vec::new(),
            x_guess: None,
            u0: DVector::zeros(dims.m_bar()),
            dt0: 0.1,
        };
        let mut opts = SolverOptions::default();
        opts.infeasible = true;
        let (traj, stats) = solve(problem, &opts).expect("infeasible-start scenario should not hit a dimension error");

        assert!(stats.went_feasible, "an infeasible-start solve that converges should run the go-feasible transition");
        assert!(!traj.dims.infeasible, "the returned trajectory should be the plain, post-transition one");
        let x_n = &traj.x[dims.n_intervals()];
        assert!(x_n.amax() < 1e-1, "final state should approach the origin after going feasible, got {x_n:?}");
    }
}
