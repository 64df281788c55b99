//! Solve statistics returned alongside the trajectory.
//!
//! Numerical failures are recovered locally and folded into the stats
//! rather than surfaced as errors; this struct is where they land.

/// Snapshot taken at the end of one outer iteration.
#[derive(Debug, Clone, Copy)]
pub struct OuterIterationRecord {
    pub cost: f64,
    pub c_max: f64,
    pub max_penalty: f64,
    pub inner_iterations: usize,
}

/// Why the outer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    ConstraintToleranceMet,
    IterationCap,
    MaxPenaltyKickout,
    RegularizationExceeded,
}

#[derive(Debug, Clone)]
pub struct SolveStats {
    pub outer_iterations: usize,
    pub total_inner_iterations: usize,
    pub per_outer: Vec<OuterIterationRecord>,
    pub converged: bool,
    pub termination: TerminationReason,
    pub final_cost: f64,
    pub final_c_max: f64,
    /// Number of times the backward pass increased ρ in response to a
    /// Cholesky failure or a rejected line search, across the whole solve.
    pub rho_increases: usize,
    pub went_feasible: bool,
}

impl SolveStats {
    pub fn new() -> Self {
        Self {
            outer_iterations: 0,
            total_inner_iterations: 0,
            per_outer: Vec::new(),
            converged: false,
            termination: TerminationReason::IterationCap,
            final_cost: 0.0,
            final_c_max: f64::INFINITY,
            rho_increases: 0,
            went_feasible: false,
        }
    }
}

impl Default for SolveStats {
    fn default() -> Self {
        Self::new()
    }
}
