//! Constraint set: typed collection of stage/terminal, state/control,
//! equality/inequality constraints with their dual/penalty bookkeeping.
//!
//! Constraints are a sum type (`ConstraintKind`), not `Box<dyn Trait>`
//! callables dispatched per-row: the enum's variants cover the built-in box
//! bounds and the embedding-specific rows (`MinTimeLink`, `InfeasibleEq`,
//! `MinTimeBound`) directly, and a `General` variant carries a boxed oracle
//! only for genuinely user-defined constraints. Each [`Constraint`] is its
//! own small arena: `value`/`jac_x`/`jac_u`/`lambda`/`mu`/`active` are flat
//! `Vec`s indexed by knot slot, allocated once and reused across iterations.
//!
//! Open question resolved (documented in `DESIGN.md`): box bounds are
//! materialized as one vector constraint per bound side (`sign = ±1`)
//! rather than as `2n` individual scalar rows.

use nalgebra::{DMatrix, DVector};

use crate::dims::Dims;
use crate::options::SolverOptions;
use crate::trajectory::Trajectory;

/// Equality vs. inequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Equality,
    Inequality,
}

/// Stage (applies at every interior knot `1..N-1`) vs. terminal (applies
/// only at knot `N`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Stage,
    Terminal,
}

/// Per-constraint dual-ascent / penalty-scheduling parameters.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintParams {
    pub lambda_max: f64,
    pub mu_max: f64,
    pub mu0: f64,
    pub phi: f64,
}

impl Default for ConstraintParams {
    fn default() -> Self {
        Self { lambda_max: 1e8, mu_max: 1e8, mu0: 1.0, phi: 10.0 }
    }
}

type GeneralFn = Box<dyn Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64> + Send + Sync>;
type GeneralJacFn = Box<dyn Fn(&DVector<f64>, &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>) + Send + Sync>;

/// The constraint's functional form.
pub enum ConstraintKind {
    /// `c = sign * (x - bound)`, a box bound on the state.
    BoxState { bound: DVector<f64>, sign: f64 },
    /// `c = sign * (u[0..m] - bound)`, a box bound on the plant control.
    BoxControl { bound: DVector<f64>, sign: f64 },
    /// `c = sign * (u[m̄] - bound)`, the minimum-time step-size bound.
    MinTimeBound { bound: f64, sign: f64 },
    /// User-supplied constraint with an evaluate/jacobian oracle.
    General { dim: usize, eval: GeneralFn, jac: GeneralJacFn },
    /// `c = u_k[m̄] - u_{k+1}[m̄]`, the minimum-time smoothness link.
    MinTimeLink,
    /// `c = u_k[m̄+1 .. m̄+n]`, the infeasible-start slack equality.
    InfeasibleEq,
}

/// One typed constraint, plus its per-knot arena.
pub struct Constraint {
    pub kind: ConstraintKind,
    pub location: Location,
    pub sense: Sense,
    pub params: ConstraintParams,
    pub value: Vec<DVector<f64>>,
    pub jac_x: Vec<DMatrix<f64>>,
    pub jac_u: Vec<DMatrix<f64>>,
    pub lambda: Vec<DVector<f64>>,
    pub mu: Vec<DVector<f64>>,
    pub active: Vec<Vec<bool>>,
    last_c_max: f64,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, location: Location, sense: Sense, params: ConstraintParams, dims: &Dims) -> Self {
        let row_dim = Self::kind_row_dim(&kind, dims);
        let n_rows = match location {
            Location::Stage => Self::stage_slot_count(&kind, dims),
            Location::Terminal => 1,
        };
        Self {
            kind,
            location,
            sense,
            params,
            value: vec![DVector::zeros(row_dim); n_rows],
            jac_x: vec![DMatrix::zeros(row_dim, dims.n); n_rows],
            jac_u: vec![DMatrix::zeros(row_dim, dims.mm()); n_rows],
            lambda: vec![DVector::zeros(row_dim); n_rows],
            mu: vec![DVector::from_element(row_dim, params.mu0); n_rows],
            active: vec![vec![false; row_dim]; n_rows],
            last_c_max: f64::INFINITY,
        }
    }

    fn kind_row_dim(kind: &ConstraintKind, dims: &Dims) -> usize {
        match kind {
            ConstraintKind::BoxState { bound, .. } => bound.len(),
            ConstraintKind::BoxControl { bound, .. } => bound.len(),
            ConstraintKind::MinTimeBound { .. } => 1,
            ConstraintKind::General { dim, .. } => *dim,
            ConstraintKind::MinTimeLink => 1,
            ConstraintKind::InfeasibleEq => dims.n,
        }
    }

    fn knots(&self, dims: &Dims) -> Vec<usize> {
        match self.location {
            Location::Stage => (0..Self::stage_slot_count(&self.kind, dims)).collect(),
            Location::Terminal => vec![dims.n_knots - 1],
        }
    }

    /// Number of stage slots this constraint occupies. `MinTimeLink` links
    /// `u_k[m̄]` to `u_{k+1}[m̄]`, so it has no row at the last interval
    /// (there is no `k+1` knot past it); every other stage constraint has
    /// one row per interval.
    fn stage_slot_count(kind: &ConstraintKind, dims: &Dims) -> usize {
        match kind {
            ConstraintKind::MinTimeLink => dims.n_intervals().saturating_sub(1),
            _ => dims.n_intervals(),
        }
    }

    /// Fills `value` from the current trajectory.
    pub fn evaluate(&mut self, traj: &Trajectory, dims: &Dims) {
        let knots = self.knots(dims);
        for (slot, &k) in knots.iter().enumerate() {
            let x = &traj.x[k];
            let u = &traj.u[k];
            self.value[slot] = match &self.kind {
                ConstraintKind::BoxState { bound, sign } => (x - bound) * *sign,
                ConstraintKind::BoxControl { bound, sign } => {
                    let up = u.rows(0, bound.len()).clone_owned();
                    (up - bound) * *sign
                }
                ConstraintKind::MinTimeBound { bound, sign } => {
                    let j = dims.min_time_index().expect("MinTimeBound requires minimum_time");
                    DVector::from_element(1, *sign * (u[j] - bound))
                }
                ConstraintKind::General { eval, .. } => eval(x, u),
                ConstraintKind::MinTimeLink => {
                    let j = dims.min_time_index().expect("MinTimeLink requires minimum_time");
                    DVector::from_element(1, u[j] - traj.u[k + 1][j])
                }
                ConstraintKind::InfeasibleEq => {
                    let (start, len) = dims.infeasible_range().expect("InfeasibleEq requires infeasible");
                    u.rows(start, len).clone_owned()
                }
            };
        }
    }

    /// Fills `jac_x`/`jac_u` from the current trajectory.
    pub fn jacobian(&mut self, traj: &Trajectory, dims: &Dims) {
        let knots = self.knots(dims);
        for (slot, &k) in knots.iter().enumerate() {
            let x = &traj.x[k];
            let u = &traj.u[k];
            let row_dim = Self::kind_row_dim(&self.kind, dims);
            let mut jx = DMatrix::zeros(row_dim, dims.n);
            let mut ju = DMatrix::zeros(row_dim, dims.mm());
            match &self.kind {
                ConstraintKind::BoxState { sign, .. } => {
                    for i in 0..row_dim {
                        jx[(i, i)] = *sign;
                    }
                }
                ConstraintKind::BoxControl { sign, .. } => {
                    for i in 0..row_dim {
                        ju[(i, i)] = *sign;
                    }
                }
                ConstraintKind::MinTimeBound { sign, .. } => {
                    let j = dims.min_time_index().unwrap();
                    ju[(0, j)] = *sign;
                }
                ConstraintKind::General { jac, .. } => {
                    let (gx, gu) = jac(x, u);
                    jx.copy_from(&gx);
                    ju.view_mut((0, 0), (row_dim, gu.ncols())).copy_from(&gu);
                }
                ConstraintKind::MinTimeLink => {
                    let j = dims.min_time_index().unwrap();
                    ju[(0, j)] = 1.0;
                    // The dependence on u_{k+1}[j] is handled specially by
                    // the backward pass (it spans two knots); jac_u here
                    // only carries this knot's own column.
                }
                ConstraintKind::InfeasibleEq => {
                    let (start, len) = dims.infeasible_range().unwrap();
                    for i in 0..len {
                        ju[(i, start + i)] = 1.0;
                    }
                }
            }
            self.jac_x[slot] = jx;
            self.jac_u[slot] = ju;
        }
    }

    /// `a[j] = (c[j] > -tol) || (lambda[j] > 0)` for inequalities; equality
    /// rows have no active set.
    pub fn update_active_set(&mut self, tol: f64) {
        if self.sense != Sense::Inequality {
            return;
        }
        for slot in 0..self.value.len() {
            let val = &self.value[slot];
            let lam = &self.lambda[slot];
            let act = &mut self.active[slot];
            for j in 0..val.len() {
                act[j] = val[j] > -tol || lam[j] > 0.0;
            }
        }
    }

    /// `Iμ = diag(a ⊙ μ)` for inequalities, `diag(μ)` for equalities.
    pub fn penalty_diag(&self, slot: usize) -> DMatrix<f64> {
        let mu = &self.mu[slot];
        let dim = mu.len();
        let mut d = DMatrix::zeros(dim, dim);
        for j in 0..dim {
            let coeff = match self.sense {
                Sense::Equality => mu[j],
                Sense::Inequality => {
                    if self.active[slot][j] {
                        mu[j]
                    } else {
                        0.0
                    }
                }
            };
            d[(j, j)] = coeff;
        }
        d
    }

    /// `Σ ½ cᵀ Iμ c + λᵀc` over this constraint's knots.
    pub fn cost_contribution(&self) -> f64 {
        let mut total = 0.0;
        for slot in 0..self.value.len() {
            let c = &self.value[slot];
            let lam = &self.lambda[slot];
            let im = self.penalty_diag(slot);
            total += 0.5 * (c.transpose() * &im * c)[(0, 0)] + lam.dot(c);
        }
        total
    }

    /// `max ||a ⊙ c||_inf` for inequalities, `max ||c||_inf` for equalities.
    pub fn c_max(&self) -> f64 {
        match self.sense {
            Sense::Inequality => self
                .value
                .iter()
                .zip(self.active.iter())
                .flat_map(|(v, a)| v.iter().zip(a.iter()).filter(|(_, &act)| act).map(|(x, _)| x.abs()))
                .fold(0.0, f64::max),
            Sense::Equality => self.value.iter().flat_map(|v| v.iter().map(|x| x.abs())).fold(0.0, f64::max),
        }
    }

    /// Dual ascent + penalty update for this constraint.
    pub fn update_duals_and_penalty(&mut self, opts: &SolverOptions) {
        for slot in 0..self.value.len() {
            let c = self.value[slot].clone();
            match self.sense {
                Sense::Inequality => {
                    for j in 0..c.len() {
                        let updated = (self.lambda[slot][j] + self.mu[slot][j] * c[j]).max(0.0);
                        self.lambda[slot][j] = updated.min(self.params.lambda_max);
                    }
                }
                Sense::Equality => {
                    for j in 0..c.len() {
                        let updated = self.lambda[slot][j] + self.mu[slot][j] * c[j];
                        self.lambda[slot][j] = updated.clamp(-self.params.lambda_max, self.params.lambda_max);
                    }
                }
            }
        }

        let c_max = self.c_max();
        let sufficient_decrease = c_max <= opts.constraint_decrease_ratio * self.last_c_max;
        for slot in 0..self.mu.len() {
            for j in 0..self.mu[slot].len() {
                self.mu[slot][j] = if sufficient_decrease {
                    opts.penalty_scaling_no * self.mu[slot][j]
                } else {
                    (self.params.phi * self.mu[slot][j]).min(self.params.mu_max)
                };
            }
        }
        self.last_c_max = c_max;
    }

    /// The largest penalty value currently stored, used by the kickout
    /// policy.
    pub fn max_penalty(&self) -> f64 {
        self.mu.iter().flat_map(|m| m.iter().copied()).fold(0.0, f64::max)
    }
}

/// The full collection of constraints for a problem.
#[derive(Default)]
pub struct ConstraintSet {
    pub constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self { constraints: Vec::new() }
    }

    pub fn push(&mut self, c: Constraint) {
        self.constraints.push(c);
    }

    pub fn evaluate_all(&mut self, traj: &Trajectory, dims: &Dims) {
        for c in &mut self.constraints {
            c.evaluate(traj, dims);
        }
    }

    pub fn jacobian_all(&mut self, traj: &Trajectory, dims: &Dims) {
        for c in &mut self.constraints {
            c.jacobian(traj, dims);
        }
    }

    pub fn update_active_set(&mut self, tol: f64) {
        for c in &mut self.constraints {
            c.update_active_set(tol);
        }
    }

    pub fn cost_contribution(&self) -> f64 {
        self.constraints.iter().map(Constraint::cost_contribution).sum()
    }

    pub fn c_max(&self) -> f64 {
        self.constraints.iter().map(Constraint::c_max).fold(0.0, f64::max)
    }

    pub fn max_penalty(&self) -> f64 {
        self.constraints.iter().map(Constraint::max_penalty).fold(0.0, f64::max)
    }

    pub fn update_duals_and_penalties(&mut self, opts: &SolverOptions) {
        for c in &mut self.constraints {
            c.update_duals_and_penalty(opts);
        }
    }

    /// Stage-knot penalty contributions to the Q-function: `(Cxx, Cuu, Cux,
    /// Cx, Cu)` summed over every stage constraint active at knot `k`.
    pub fn stage_penalty_terms(&self, k: usize, dims: &Dims) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>, DVector<f64>, DVector<f64>) {
        let mut cxx = DMatrix::zeros(dims.n, dims.n);
        let mut cuu = DMatrix::zeros(dims.mm(), dims.mm());
        let mut cux = DMatrix::zeros(dims.mm(), dims.n);
        let mut cx = DVector::zeros(dims.n);
        let mut cu = DVector::zeros(dims.mm());
        for c in &self.constraints {
            // `MinTimeLink` has one fewer row than the interval count, so it
            // contributes nothing at the last interval.
            if c.location != Location::Stage || k >= c.value.len() {
                continue;
            }
            let jx = &c.jac_x[k];
            let ju = &c.jac_u[k];
            let cval = &c.value[k];
            let lam = &c.lambda[k];
            let im = c.penalty_diag(k);
            let t = &im * cval + lam;
            cxx += jx.transpose() * &im * jx;
            cuu += ju.transpose() * &im * ju;
            cux += ju.transpose() * &im * jx;
            cx += jx.transpose() * &t;
            cu += ju.transpose() * &t;
        }
        (cxx, cuu, cux, cx, cu)
    }

    /// Terminal penalty contribution to the value function: `(Cxx, Cx)`.
    pub fn terminal_penalty_terms(&self, dims: &Dims) -> (DMatrix<f64>, DVector<f64>) {
        let mut cxx = DMatrix::zeros(dims.n, dims.n);
        let mut cx = DVector::zeros(dims.n);
        for c in &self.constraints {
            if c.location != Location::Terminal {
                continue;
            }
            let jx = &c.jac_x[0];
            let cval = &c.value[0];
            let lam = &c.lambda[0];
            let im = c.penalty_diag(0);
            let t = &im * cval + lam;
            cxx += jx.transpose() * &im * jx;
            cx += jx.transpose() * &t;
        }
        (cxx, cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dims {
        Dims { n: 2, m: 1, n_knots: 5, minimum_time: false, infeasible: false }
    }

    #[test]
    fn box_state_active_set_tracks_violation() {
        let dims = dims();
        let mut c = Constraint::new(
            ConstraintKind::BoxState { bound: DVector::from_element(2, 1.0), sign: 1.0 },
            Location::Stage,
            Sense::Inequality,
            ConstraintParams::default(),
            &dims,
        );
        let mut traj = Trajectory::zeros(dims, 0.1);
        traj.x[0] = DVector::from_vec(vec![2.0, 0.0]);
        c.evaluate(&traj, &dims);
        c.update_active_set(1e-3);
        assert!(c.active[0][0]);
        assert!(!c.active[0][1]);
    }

    #[test]
    fn equality_dual_update_has_no_active_set() {
        let dims = Dims { n: 2, m: 1, n_knots: 5, minimum_time: false, infeasible: true };
        let mut c = Constraint::new(ConstraintKind::InfeasibleEq, Location::Stage, Sense::Equality, ConstraintParams::default(), &dims);
        let mut traj = Trajectory::zeros(dims, 0.1);
        traj.u[0] = DVector::from_vec(vec![0.0, 0.0, 0.0]);
        c.evaluate(&traj, &dims);
        assert_eq!(c.value[0].len(), dims.n);
        c.update_active_set(1e-3);
        assert!(c.active[0].iter().all(|&a| !a));
    }

    // Scenario 3 (car parking with a circular obstacle): a stage inequality
    // built from `ConstraintKind::General`, driven through a full solve.
    struct PlanarPointMass;
    impl crate::dynamics::DiscreteDynamics for PlanarPointMass {
        fn state_dim(&self) -> usize {
            4
        }
        fn control_dim(&self) -> usize {
            2
        }
        fn fd(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64> {
            DVector::from_vec(vec![
                x[0] + dt * x[2] + 0.5 * dt * dt * u[0],
                x[1] + dt * x[3] + 0.5 * dt * dt * u[1],
                x[2] + dt * u[0],
                x[3] + dt * u[1],
            ])
        }
    }

    #[test]
    fn obstacle_avoidance_converges_without_violation() {
        use crate::cost::QuadraticCost;
        use crate::solver::{solve, Problem};
        use crate::options::SolverOptions;
        use nalgebra::DMatrix;

        let dims = Dims { n: 4, m: 2, n_knots: 41, minimum_time: false, infeasible: false };
        let dynamics = PlanarPointMass;
        let cost = QuadraticCost::new(
            DMatrix::zeros(4, 4),
            DMatrix::identity(2, 2) * 0.1,
            DMatrix::identity(4, 4) * 100.0,
            DVector::from_vec(vec![4.0, 0.0, 0.0, 0.0]),
        );

        // Circular obstacle of radius 0.5 centered between start and goal.
        let (xc, yc, r) = (2.0, 0.0, 0.5);
        let obstacle = Constraint::new(
            ConstraintKind::General {
                dim: 1,
                eval: Box::new(move |x, _u| {
                    let dx = x[0] - xc;
                    let dy = x[1] - yc;
                    DVector::from_element(1, r * r - (dx * dx + dy * dy))
                }),
                jac: Box::new(move |x, _u| {
                    let dx = x[0] - xc;
                    let dy = x[1] - yc;
                    let mut gx = DMatrix::zeros(1, 4);
                    gx[(0, 0)] = -2.0 * dx;
                    gx[(0, 1)] = -2.0 * dy;
                    (gx, DMatrix::zeros(1, 2))
                }),
            },
            Location::Stage,
            Sense::Inequality,
            ConstraintParams::default(),
            &dims,
        );

        let problem = Problem {
            dims,
            x0: DVector::zeros(4),
            xf: DVector::from_vec(vec![4.0, 0.0, 0.0, 0.0]),
            cost,
            dynamics: &dynamics,
            user_constraints: vec![obstacle],
            x_guess: None,
            u0: DVector::zeros(2),
            dt0: 0.05,
        };
        let mut opts = SolverOptions::default();
        opts.iterations = 80;
        let (traj, stats) = solve(problem, &opts).expect("obstacle scenario should not hit a dimension error");

        let min_clearance = (0..dims.n_knots)
            .map(|k| {
                let dx = traj.x[k][0] - xc;
                let dy = traj.x[k][1] - yc;
                (dx * dx + dy * dy).sqrt() - r
            })
            .fold(f64::MAX, f64::min);
        assert!(min_clearance > -1e-3, "trajectory should stay outside the obstacle, min clearance {min_clearance}");
        assert!(stats.final_c_max < 1e-2, "obstacle constraint should be satisfied at termination");
    }
}
