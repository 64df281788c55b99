//! The iLQR inner loop: repeated backward pass + line search against a
//! fixed set of constraint duals/penalties, until the cost or gradient
//! stops improving. Regularization and a real line search replace the
//! unconditional full step of a bare rollout/backward/apply cycle.

use tracing::{debug, trace, warn};

use crate::backward::backward_pass;
use crate::constraints::ConstraintSet;
use crate::dims::Dims;
use crate::dynamics::DiscreteDynamics;
use crate::linesearch::{line_search, trajectory_cost};
use crate::objective::Objective;
use crate::options::SolverOptions;
use crate::regularization::Regularization;
use crate::trajectory::Trajectory;

/// Outcome of one call to [`solve_inner`].
#[derive(Debug, Clone, Copy)]
pub struct InnerSolveOutcome {
    pub iterations: usize,
    /// Converged on the cost or gradient tolerance (as opposed to hitting
    /// the iteration cap or a regularization blowup).
    pub converged: bool,
    pub final_cost: f64,
    pub final_gradient_norm: f64,
    /// Set when the loop stopped because regularization was exhausted
    /// (`ρ` grew past `opts.rho_max`) rather than on a normal tolerance or
    /// iteration-cap exit.
    pub regularization_exceeded: bool,
}

/// ALTRO-style normalized gradient norm: `max_k ||d_k|| / (||u_k|| + 1)`.
fn gradient_norm(traj: &Trajectory, d: &[nalgebra::DVector<f64>]) -> f64 {
    d.iter()
        .zip(traj.u.iter())
        .map(|(dk, uk)| dk.amax() / (uk.amax() + 1.0))
        .fold(0.0, f64::max)
}

/// Runs the inner loop. `traj` holds the nominal trajectory on entry and is
/// overwritten in place with the converged (or best-effort) trajectory.
/// `scratch` is reused as the line search's shadow buffer across calls to
/// avoid reallocating every outer iteration.
#[allow(clippy::too_many_arguments)]
pub fn solve_inner(
    dynamics: &dyn DiscreteDynamics,
    dims: &Dims,
    objective: &Objective,
    constraints: &mut ConstraintSet,
    opts: &SolverOptions,
    reg: &mut Regularization,
    cost_tolerance: f64,
    gradient_tolerance: f64,
    traj: &mut Trajectory,
    scratch: &mut Trajectory,
) -> InnerSolveOutcome {
    constraints.evaluate_all(traj, dims);
    constraints.jacobian_all(traj, dims);
    constraints.update_active_set(opts.active_constraint_tolerance);
    let mut cost = trajectory_cost(objective, dims, traj) + constraints.cost_contribution();

    let mut last_grad_norm = f64::INFINITY;

    for iteration in 0..opts.iterations_inner {
        let backward = match backward_pass(dynamics, dims, objective, constraints, traj, opts.control_integration, reg, opts) {
            Some(b) => b,
            None => {
                warn!(iteration, rho = reg.rho, "backward pass failed to stabilize, stopping inner loop");
                return InnerSolveOutcome {
                    iterations: iteration,
                    converged: false,
                    final_cost: cost,
                    final_gradient_norm: last_grad_norm,
                    regularization_exceeded: true,
                };
            }
        };

        last_grad_norm = gradient_norm(traj, &backward.gains.d);
        trace!(iteration, grad_norm = last_grad_norm, cost, rho = reg.rho, "backward pass complete");
        if last_grad_norm < gradient_tolerance {
            debug!(iteration, grad_norm = last_grad_norm, "inner loop converged on gradient norm");
            return InnerSolveOutcome {
                iterations: iteration,
                converged: true,
                final_cost: cost,
                final_gradient_norm: last_grad_norm,
                regularization_exceeded: false,
            };
        }

        let outcome = line_search(dynamics, dims, objective, constraints, opts, traj, cost, &backward, scratch);
        if !outcome.accepted {
            reg.increase(opts);
            constraints.evaluate_all(traj, dims);
            if reg.rho > opts.rho_max {
                warn!(iteration, "line search exhausted and rho_max exceeded, stopping inner loop");
                return InnerSolveOutcome {
                    iterations: iteration,
                    converged: false,
                    final_cost: cost,
                    final_gradient_norm: last_grad_norm,
                    regularization_exceeded: true,
                };
            }
            continue;
        }

        let decrease = cost - outcome.cost;
        traj.copy_from(scratch);
        reg.decrease(opts);
        constraints.jacobian_all(traj, dims);
        constraints.update_active_set(opts.active_constraint_tolerance);

        debug!(iteration, alpha = outcome.alpha, cost = outcome.cost, decrease, "inner step accepted");
        cost = outcome.cost;

        if decrease.abs() < cost_tolerance {
            debug!(iteration, "inner loop converged on cost tolerance");
            return InnerSolveOutcome {
                iterations: iteration + 1,
                converged: true,
                final_cost: cost,
                final_gradient_norm: last_grad_norm,
                regularization_exceeded: false,
            };
        }
    }

    InnerSolveOutcome {
        iterations: opts.iterations_inner,
        converged: false,
        final_cost: cost,
        final_gradient_norm: last_grad_norm,
        regularization_exceeded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::QuadraticCost;
    use nalgebra::{DMatrix, DVector};

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
    fn inner_loop_reduces_cost_to_near_zero() {
        let dims = Dims { n: 2, m: 1, n_knots: 15, minimum_time: false, infeasible: false };
        let dynamics = DoubleIntegrator;
        let cost = QuadraticCost::new(
            DMatrix::identity(2, 2) * 0.01,
            DMatrix::identity(1, 1) * 0.1,
            DMatrix::identity(2, 2) * 100.0,
            DVector::zeros(2),
        );
        let objective = Objective::new(cost, dims, 1.0, 1.0);
        let mut constraints = ConstraintSet::new();
        let mut traj = Trajectory::zeros(dims, 0.1);
        traj.x[0] = DVector::from_vec(vec![1.0, 0.0]);
        for k in 0..dims.n_intervals() {
            traj.x[k + 1] = dynamics.fd(&traj.x[k], &traj.plant_u(k), 0.1);
        }
        let mut scratch = Trajectory::zeros(dims, 0.1);
        let mut reg = Regularization::new(1e-8);
        let opts = SolverOptions::default();

        let outcome = solve_inner(&dynamics, &dims, &objective, &mut constraints, &opts, &mut reg, 1e-8, 1e-6, &mut traj, &mut scratch);
        assert!(outcome.final_cost < 1.0);
        assert!(traj.x[dims.n_intervals()].amax() < 0.5);
    }
}
