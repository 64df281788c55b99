//! End-to-end scenarios: unconstrained linear, control-bounded swing-up,
//! minimum-time, and regularization recovery. The stage-inequality
//! (obstacle) and infeasible-start scenarios are covered by unit tests
//! closer to `constraints` and `embeddings` respectively.

use ilqr_core::constraints::{Constraint, ConstraintKind, ConstraintParams, Location, Sense};
use ilqr_core::cost::QuadraticCost;
use ilqr_core::dims::Dims;
use ilqr_core::dynamics::DiscreteDynamics;
use ilqr_core::options::ControlIntegration;
use ilqr_core::solver::{solve, Problem};
use ilqr_core::SolverOptions;
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

struct Pendulum {
    gravity_over_length: f64,
}
impl DiscreteDynamics for Pendulum {
    fn state_dim(&self) -> usize {
        2
    }
    fn control_dim(&self) -> usize {
        1
    }
    fn fd(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64> {
        let theta = x[0];
        let omega = x[1];
        let omega_dot = -self.gravity_over_length * theta.sin() + u[0];
        DVector::from_vec(vec![theta + dt * omega, omega + dt * omega_dot])
    }
}

#[test]
fn scenario_1_linear_double_integrator_unconstrained() {
    let dims = Dims { n: 2, m: 1, n_knots: 51, minimum_time: false, infeasible: false };
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
        u0: DVector::zeros(1),
        dt0: 0.1,
    };
    let opts = SolverOptions::default();
    let (traj, stats) = solve(problem, &opts).expect("scenario 1 should not hit a dimension error");
    assert!(stats.converged, "scenario 1 should converge, termination = {:?}", stats.termination);
    let x_n = &traj.x[dims.n_intervals()];
    assert!(x_n.amax() < 1e-2, "final state should approach the origin, got {x_n:?}");
}

#[test]
fn scenario_2_pendulum_swing_up_control_bounded() {
    let dims = Dims { n: 2, m: 1, n_knots: 101, minimum_time: false, infeasible: false };
    let dynamics = Pendulum { gravity_over_length: 9.81 };
    let cost = QuadraticCost::new(
        DMatrix::identity(2, 2) * 0.01,
        DMatrix::identity(1, 1) * 0.05,
        DMatrix::identity(2, 2) * 200.0,
        DVector::from_vec(vec![std::f64::consts::PI, 0.0]),
    );
    let u_max = 3.0;
    let upper = Constraint::new(
        ConstraintKind::BoxControl { bound: DVector::from_element(1, u_max), sign: 1.0 },
        Location::Stage,
        Sense::Inequality,
        ConstraintParams::default(),
        &dims,
    );
    let lower = Constraint::new(
        ConstraintKind::BoxControl { bound: DVector::from_element(1, -u_max), sign: -1.0 },
        Location::Stage,
        Sense::Inequality,
        ConstraintParams::default(),
        &dims,
    );
    let problem = Problem {
        dims,
        x0: DVector::zeros(2),
        xf: DVector::from_vec(vec![std::f64::consts::PI, 0.0]),
        cost,
        dynamics: &dynamics,
        user_constraints: vec![upper, lower],
        x_guess: None,
        u0: DVector::zeros(1),
        dt0: 0.05,
    };
    let mut opts = SolverOptions::default();
    opts.iterations = 60;
    let (traj, stats) = solve(problem, &opts).expect("scenario 2 should not hit a dimension error");

    let max_u = (0..dims.n_intervals()).map(|k| traj.plant_u(k).amax()).fold(0.0, f64::max);
    assert!(max_u <= u_max + 1e-3, "control bound should hold at convergence, max |u| = {max_u}");
    assert!(stats.final_c_max < 1e-2, "constraint violation should be small at termination");
}

#[test]
fn scenario_5_minimum_time_double_integrator_to_rest() {
    let dims = Dims { n: 2, m: 1, n_knots: 51, minimum_time: true, infeasible: false };
    let dynamics = DoubleIntegrator;
    let cost = QuadraticCost::new(DMatrix::zeros(2, 2), DMatrix::zeros(1, 1), DMatrix::identity(2, 2) * 50.0, DVector::zeros(2));
    let u_max = 1.0;
    let upper = Constraint::new(
        ConstraintKind::BoxControl { bound: DVector::from_element(1, u_max), sign: 1.0 },
        Location::Stage,
        Sense::Inequality,
        ConstraintParams::default(),
        &dims,
    );
    let lower = Constraint::new(
        ConstraintKind::BoxControl { bound: DVector::from_element(1, -u_max), sign: -1.0 },
        Location::Stage,
        Sense::Inequality,
        ConstraintParams::default(),
        &dims,
    );
    let mut opts = SolverOptions::default();
    opts.minimum_time = true;
    opts.min_dt = 0.01;
    opts.max_dt = 0.2;
    opts.r_minimum_time = 0.5;
    opts.iterations = 60;

    let dt0 = 0.08;
    let problem = Problem {
        dims,
        x0: DVector::from_vec(vec![1.0, 0.0]),
        xf: DVector::zeros(2),
        cost,
        dynamics: &dynamics,
        user_constraints: vec![upper, lower],
        x_guess: None,
        u0: DVector::from_vec(vec![0.0, dt0.sqrt()]),
        dt0,
    };
    let (traj, stats) = solve(problem, &opts).expect("scenario 5 should not hit a dimension error");

    let total_time: f64 = (0..dims.n_intervals()).map(|k| traj.dt_of(k)).sum();
    // The analytical bang-bang time for this problem is 2.0; finite
    // difference Jacobians and an approximate line search warrant a band
    // wider than 1% around that value.
    assert!(total_time > 1.0 && total_time < 4.0, "total time {total_time} should be in the right ballpark of the bang-bang optimum");
    assert!(stats.final_c_max < 1e-2, "box/link constraints should be close to satisfied");
}

#[test]
fn scenario_6_regularization_recovery() {
    let dims = Dims { n: 2, m: 1, n_knots: 10, minimum_time: false, infeasible: false };
    let dynamics = DoubleIntegrator;
    // An all-zero cost makes Quu singular at the first backward pass
    // (Quu = R + B^T Vxx B = 0), forcing at least one regularization bump
    // before the Cholesky factorization succeeds.
    let cost = QuadraticCost::new(DMatrix::zeros(2, 2), DMatrix::zeros(1, 1), DMatrix::zeros(2, 2), DVector::zeros(2));
    let problem = Problem {
        dims,
        x0: DVector::from_vec(vec![1.0, 0.0]),
        xf: DVector::zeros(2),
        cost,
        dynamics: &dynamics,
        user_constraints: Vec::new(),
        x_guess: None,
        u0: DVector::zeros(1),
        dt0: 0.1,
    };
    let opts = SolverOptions::default();
    let (_traj, stats) = solve(problem, &opts).expect("scenario 6 should not hit a dimension error");
    assert!(stats.rho_increases >= 1, "a singular Quu should force at least one regularization increase");
}
