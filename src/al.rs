//! Augmented Lagrangian outer loop: a small explicit state machine wrapping
//! repeated calls into [`crate::ilqr::solve_inner`], kept deliberately
//! separate from the inner convergence checks so outer penalty updates
//! never get entangled with them.

use tracing::debug;

use crate::constraints::ConstraintSet;
use crate::dims::Dims;
use crate::dynamics::DiscreteDynamics;
use crate::ilqr::solve_inner;
use crate::objective::Objective;
use crate::options::SolverOptions;
use crate::regularization::Regularization;
use crate::stats::{OuterIterationRecord, SolveStats, TerminationReason};
use crate::trajectory::Trajectory;

/// `Initialized → InnerConverged → DualUpdated → … → Converged |
/// IterationCap | MaxPenalty | RegularizationExceeded`. The loop below folds
/// this into a single function; the enum exists so the decision points are
/// named rather than inferred from control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OuterState {
    Initialized,
    InnerConverged,
    Converged,
    IterationCap,
    MaxPenalty,
    RegularizationExceeded,
}

/// Runs the outer loop to completion, mutating `traj` in place. Returns the
/// accumulated [`SolveStats`].
#[allow(clippy::too_many_arguments)]
pub fn solve_outer(
    dynamics: &dyn DiscreteDynamics,
    dims: &Dims,
    objective: &Objective,
    constraints: &mut ConstraintSet,
    opts: &SolverOptions,
    traj: &mut Trajectory,
    scratch: &mut Trajectory,
) -> SolveStats {
    let mut stats = SolveStats::new();
    let mut reg = Regularization::new(opts.rho_min);
    let mut state = OuterState::Initialized;

    while !matches!(
        state,
        OuterState::Converged | OuterState::IterationCap | OuterState::MaxPenalty | OuterState::RegularizationExceeded
    ) {
        let (cost_tol, grad_tol) = if stats.outer_iterations + 1 >= opts.iterations {
            (opts.cost_tolerance, opts.gradient_norm_tolerance)
        } else {
            (opts.cost_tolerance_intermediate, opts.gradient_norm_tolerance_intermediate)
        };

        let inner_before = reg.increases;
        let inner_outcome = solve_inner(dynamics, dims, objective, constraints, opts, &mut reg, cost_tol, grad_tol, traj, scratch);
        stats.rho_increases += reg.increases - inner_before;
        state = OuterState::InnerConverged;

        constraints.evaluate_all(traj, dims);
        constraints.update_active_set(opts.active_constraint_tolerance);
        let c_max = constraints.c_max();
        let max_penalty = constraints.max_penalty();
        let cost = inner_outcome.final_cost;

        stats.outer_iterations += 1;
        stats.total_inner_iterations += inner_outcome.iterations;
        stats.per_outer.push(OuterIterationRecord { cost, c_max, max_penalty, inner_iterations: inner_outcome.iterations });

        debug!(outer = stats.outer_iterations, cost, c_max, max_penalty, "outer iteration complete");

        let kickout = opts.kickout_max_penalty && constraints.constraints.iter().any(|c| c.max_penalty() >= opts.penalty_max);
        if inner_outcome.regularization_exceeded {
            state = OuterState::RegularizationExceeded;
            stats.termination = TerminationReason::RegularizationExceeded;
        } else if c_max < opts.constraint_tolerance {
            state = OuterState::Converged;
            stats.termination = TerminationReason::ConstraintToleranceMet;
            stats.converged = true;
        } else if kickout {
            state = OuterState::MaxPenalty;
            stats.termination = TerminationReason::MaxPenaltyKickout;
        } else if stats.outer_iterations >= opts.iterations {
            state = OuterState::IterationCap;
            stats.termination = TerminationReason::IterationCap;
        } else {
            for c in constraints.constraints.iter_mut() {
                c.update_duals_and_penalty(opts);
            }
            state = OuterState::Initialized;
        }

        stats.final_cost = cost;
        stats.final_c_max = c_max;
    }

    stats
}
