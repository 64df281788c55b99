//! Backtracking line search over the gain-scaled step size `α`.
//!
//! Armijo-style acceptance against the backward pass's expected decrease
//! `ΔJ(α) ≈ α·dv1 + α²·dv2`: a candidate rollout is accepted once the actual
//! cost decrease falls inside `[c1, c2]` of the expected decrease, or once
//! `α` has been backed off `line_search_max_iterations` times (at which
//! point the caller should treat the step as a failure and increase
//! regularization).

use crate::backward::BackwardPassResult;
use crate::constraints::ConstraintSet;
use crate::dims::Dims;
use crate::dynamics::DiscreteDynamics;
use crate::objective::Objective;
use crate::options::SolverOptions;
use crate::rollout::forward_rollout;
use crate::trajectory::Trajectory;

pub struct LineSearchOutcome {
    pub accepted: bool,
    pub alpha: f64,
    pub cost: f64,
    pub iterations: usize,
}

pub fn trajectory_cost(objective: &Objective, dims: &Dims, traj: &Trajectory) -> f64 {
    let mut j = 0.0;
    for k in 0..dims.n_intervals() {
        j += objective.stage_cost(&traj.x[k], &traj.u[k]);
    }
    j += objective.terminal_cost(&traj.x[dims.n_intervals()]);
    j
}

/// The smooth cost plus the current augmented-Lagrangian penalty terms,
/// re-evaluating `constraints` against `traj` in the process. This is the
/// quantity the line search actually minimizes.
fn augmented_cost(objective: &Objective, constraints: &mut ConstraintSet, dims: &Dims, traj: &Trajectory) -> f64 {
    constraints.evaluate_all(traj, dims);
    trajectory_cost(objective, dims, traj) + constraints.cost_contribution()
}

/// Runs the backtracking search, writing the accepted trajectory into
/// `out` (the caller then copies `out` into the nominal trajectory). `out`
/// is reused as scratch space across backoff iterations. `nominal_cost`
/// must be the augmented cost of `nominal` (smooth cost plus the current
/// penalty terms, evaluated by the caller before the backward pass ran).
/// `constraints` is left evaluated against whichever trajectory was tried
/// last; the caller re-evaluates it against the accepted trajectory before
/// the next outer-loop dual/penalty update.
#[allow(clippy::too_many_arguments)]
pub fn line_search(
    dynamics: &dyn DiscreteDynamics,
    dims: &Dims,
    objective: &Objective,
    constraints: &mut ConstraintSet,
    opts: &SolverOptions,
    nominal: &Trajectory,
    nominal_cost: f64,
    backward: &BackwardPassResult,
    out: &mut Trajectory,
) -> LineSearchOutcome {
    let mut alpha = 1.0;
    for iteration in 0..opts.line_search_max_iterations {
        let ok = forward_rollout(
            dynamics,
            dims,
            opts.control_integration,
            nominal,
            Some((&backward.gains, alpha)),
            opts.max_state_value,
            opts.max_control_value,
            out,
        );
        if ok {
            let candidate_cost = augmented_cost(objective, constraints, dims, out);
            let actual_decrease = nominal_cost - candidate_cost;
            let expected_decrease = -(alpha * backward.dv1 + alpha * alpha * backward.dv2);
            let accept = if expected_decrease.abs() < 1e-12 {
                actual_decrease >= 0.0
            } else {
                let ratio = actual_decrease / expected_decrease;
                ratio > opts.line_search_c1 && ratio < opts.line_search_c2
            };
            if accept {
                return LineSearchOutcome { accepted: true, alpha, cost: candidate_cost, iterations: iteration + 1 };
            }
        }
        alpha *= opts.line_search_decay;
    }
    LineSearchOutcome { accepted: false, alpha, cost: nominal_cost, iterations: opts.line_search_max_iterations }
}
