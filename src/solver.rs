//! The public façade: `Problem` + `solve()`.
//!
//! This is where the embedding and constraint machinery gets assembled
//! around the iLQR/AL core. The core modules (`rollout`, `backward`,
//! `ilqr`, `al`) stay oblivious to which embeddings are active; this file
//! is the one place that branches on `dims.minimum_time` / `dims.infeasible`
//! to build the right initial trajectory and constraint set, keeping
//! embeddings as decorators rather than forks.

use nalgebra::DVector;
use tracing::{debug, info};

use crate::constraints::{ConstraintParams, ConstraintSet};
use crate::cost::QuadraticCost;
use crate::dims::Dims;
use crate::dynamics::DiscreteDynamics;
use crate::embeddings::{go_feasible, infeasible_equality_constraint, infeasible_init, linear_interpolate_states, minimum_time_constraints, minimum_time_init};
use crate::error::{SolverError, SolverResult};
use crate::al::solve_outer;
use crate::objective::Objective;
use crate::options::SolverOptions;
use crate::stats::SolveStats;
use crate::trajectory::Trajectory;

/// A full problem instance: sizes, boundary conditions, cost, the dynamics
/// model, and any user-supplied constraints beyond the embedding-generated
/// ones. Not `(De)serialize`: `dynamics` is a trait object and user
/// constraint closures aren't serializable.
pub struct Problem<'a> {
    pub dims: Dims,
    pub x0: DVector<f64>,
    pub xf: DVector<f64>,
    pub cost: QuadraticCost,
    pub dynamics: &'a dyn DiscreteDynamics,
    /// User-supplied constraints (obstacle avoidance, custom box bounds,
    /// etc). Embedding constraints (minimum-time bounds/link, infeasible
    /// slack equality) are appended automatically from `options`.
    pub user_constraints: Vec<crate::constraints::Constraint>,
    /// Initial state guess; `None` triggers linear interpolation.
    pub x_guess: Option<Vec<DVector<f64>>>,
    /// Initial plant (+ minimum-time column, if active) control guess,
    /// broadcast to every knot.
    pub u0: DVector<f64>,
    pub dt0: f64,
}

fn check_dims(problem: &Problem, opts: &SolverOptions) -> SolverResult<()> {
    if problem.x0.len() != problem.dims.n || problem.xf.len() != problem.dims.n {
        return Err(SolverError::DimensionMismatch(format!(
            "x0/xf length {} does not match state dimension {}",
            problem.x0.len(),
            problem.dims.n
        )));
    }
    if problem.dynamics.state_dim() != problem.dims.n || problem.dynamics.control_dim() != problem.dims.m {
        return Err(SolverError::DimensionMismatch("dynamics model dimension does not match Problem::dims".into()));
    }
    if problem.dims.minimum_time != opts.minimum_time || problem.dims.infeasible != opts.infeasible {
        return Err(SolverError::DimensionMismatch("Problem::dims embedding flags do not match SolverOptions".into()));
    }
    if problem.u0.len() != problem.dims.m_bar() {
        return Err(SolverError::DimensionMismatch(format!(
            "u0 length {} does not match m_bar {}",
            problem.u0.len(),
            problem.dims.m_bar()
        )));
    }
    if matches!(opts.control_integration, crate::options::ControlIntegration::Foh) && !problem.dynamics.supports_foh() {
        return Err(SolverError::DimensionMismatch("control_integration = foh requires a dynamics model implementing fc()".into()));
    }
    Ok(())
}

fn build_constraint_set(dims: &Dims, opts: &SolverOptions, user_constraints: Vec<crate::constraints::Constraint>) -> ConstraintSet {
    let mut set = ConstraintSet::new();
    for c in user_constraints {
        set.push(c);
    }
    let params = ConstraintParams { lambda_max: opts.dual_max, mu_max: opts.penalty_max, mu0: opts.penalty_initial, phi: opts.penalty_scaling };
    if dims.minimum_time {
        let (lower, upper, link) = minimum_time_constraints(dims, opts.min_dt, opts.max_dt, params);
        set.push(lower);
        set.push(upper);
        set.push(link);
    }
    if dims.infeasible {
        set.push(infeasible_equality_constraint(dims, params));
    }
    set
}

/// Builds the initial trajectory for a fresh (not yet "go feasible")
/// solve.
fn initial_trajectory(problem: &Problem, opts: &SolverOptions) -> Trajectory {
    if problem.dims.infeasible {
        infeasible_init(problem.dynamics, problem.dims, &problem.x0, &problem.xf, problem.x_guess.clone(), &problem.u0, problem.dt0)
    } else {
        let mut traj = Trajectory::zeros(problem.dims, problem.dt0);
        let states = problem.x_guess.clone().unwrap_or_else(|| linear_interpolate_states(&problem.x0, &problem.xf, problem.dims.n_knots));
        for (k, x) in states.into_iter().enumerate() {
            traj.x[k] = x;
        }
        for k in 0..problem.dims.n_knots {
            traj.u[k].rows_mut(0, problem.dims.m_bar()).copy_from(&problem.u0);
        }
        if problem.dims.minimum_time {
            minimum_time_init(&mut traj, problem.dt0);
        }
        traj
    }
}

/// Solves `problem` with `opts`, returning the converged (or best-effort)
/// trajectory and its stats. Only structural failures (dimension
/// mismatch, a user callback panic propagated as a dynamics-model bug) are
/// returned as `Err`; numerical non-convergence is reported through
/// `stats`, never as an error.
pub fn solve(problem: Problem, opts: &SolverOptions) -> SolverResult<(Trajectory, SolveStats)> {
    check_dims(&problem, opts)?;

    let objective = Objective::new(problem.cost.clone(), problem.dims, opts.r_minimum_time, opts.r_infeasible);
    let mut constraints = build_constraint_set(&problem.dims, opts, problem.user_constraints);
    let mut traj = initial_trajectory(&problem, opts);
    let mut scratch = Trajectory::zeros(problem.dims, problem.dt0);

    info!(n = problem.dims.n, m = problem.dims.m, n_knots = problem.dims.n_knots, infeasible = problem.dims.infeasible, minimum_time = problem.dims.minimum_time, "starting solve");

    let mut stats = solve_outer(problem.dynamics, &problem.dims, &objective, &mut constraints, opts, &mut traj, &mut scratch);

    if problem.dims.infeasible && stats.converged {
        debug!("infeasible start converged, running the go-feasible transition");
        let (mut plain_traj, plain_dims) = go_feasible(&traj, &problem.dims);
        let plain_objective = Objective::new(problem.cost, plain_dims, opts.r_minimum_time, opts.r_infeasible);
        let mut plain_constraints = ConstraintSet::new();
        let params = ConstraintParams { lambda_max: opts.dual_max, mu_max: opts.penalty_max, mu0: opts.penalty_initial, phi: opts.penalty_scaling };
        if plain_dims.minimum_time {
            let (lower, upper, link) = minimum_time_constraints(&plain_dims, opts.min_dt, opts.max_dt, params);
            plain_constraints.push(lower);
            plain_constraints.push(upper);
            plain_constraints.push(link);
        }
        let mut plain_scratch = Trajectory::zeros(plain_dims, problem.dt0);

        let follow_up = solve_outer(problem.dynamics, &plain_dims, &plain_objective, &mut plain_constraints, opts, &mut plain_traj, &mut plain_scratch);
        traj = plain_traj;
        stats.outer_iterations += follow_up.outer_iterations;
        stats.total_inner_iterations += follow_up.total_inner_iterations;
        stats.per_outer.extend(follow_up.per_outer);
        stats.rho_increases += follow_up.rho_increases;
        stats.converged = follow_up.converged;
        stats.termination = follow_up.termination;
        stats.final_cost = follow_up.final_cost;
        stats.final_c_max = follow_up.final_c_max;
        stats.went_feasible = true;
    }

    info!(converged = stats.converged, outer_iterations = stats.outer_iterations, final_cost = stats.final_cost, "solve complete");
    Ok((traj, stats))
}
