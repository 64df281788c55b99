//! Solver tuning surface.
//!
//! Plain data, round-trippable through `serde` so a caller can externalize a
//! named preset as TOML or JSON. `Default` is hand-written (not derived)
//! since these defaults are algorithm-specific, not zero-valued.

use serde::{Deserialize, Serialize};

/// How the control is held between knots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlIntegration {
    /// Zero-order hold: `u` is constant over an interval.
    Zoh,
    /// First-order hold: `u` is linearly interpolated between knots.
    Foh,
}

/// How the outer loop's dual/penalty update is performed. `Feedback` is
/// accepted for API completeness but currently behaves like `Default`; see
/// `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OuterLoopUpdateType {
    Default,
    Feedback,
}

/// Every tunable the outer/inner loops consult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    pub cost_tolerance: f64,
    pub cost_tolerance_intermediate: f64,
    pub gradient_norm_tolerance: f64,
    pub gradient_norm_tolerance_intermediate: f64,
    pub constraint_tolerance: f64,
    pub constraint_tolerance_intermediate: f64,

    pub iterations: usize,
    pub iterations_inner: usize,

    pub dual_max: f64,
    pub penalty_max: f64,
    pub penalty_initial: f64,
    pub penalty_scaling: f64,
    pub penalty_scaling_no: f64,
    pub constraint_decrease_ratio: f64,

    pub rho_min: f64,
    pub rho_max: f64,
    pub rho_factor: f64,

    pub max_state_value: f64,
    pub max_control_value: f64,

    pub active_constraint_tolerance: f64,

    pub outer_loop_update_type: OuterLoopUpdateType,

    pub minimum_time: bool,
    pub infeasible: bool,
    pub r_minimum_time: f64,
    pub r_infeasible: f64,
    pub min_dt: f64,
    pub max_dt: f64,

    pub control_integration: ControlIntegration,

    pub kickout_max_penalty: bool,

    pub verbose: bool,

    /// Line-search step-size decay `ϕ ∈ (0,1)` and Armijo acceptance band
    /// `[c1, c2]`.
    pub line_search_decay: f64,
    pub line_search_max_iterations: usize,
    pub line_search_c1: f64,
    pub line_search_c2: f64,

    /// Internal cap on Cholesky-failure retries within a single backward
    /// pass before giving up on that outer iteration.
    pub max_cholesky_retries: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            cost_tolerance: 1e-4,
            cost_tolerance_intermediate: 1e-3,
            gradient_norm_tolerance: 1e-5,
            gradient_norm_tolerance_intermediate: 1e-3,
            constraint_tolerance: 1e-4,
            constraint_tolerance_intermediate: 1e-3,

            iterations: 30,
            iterations_inner: 300,

            dual_max: 1e8,
            penalty_max: 1e8,
            penalty_initial: 1.0,
            penalty_scaling: 10.0,
            penalty_scaling_no: 1.0,
            constraint_decrease_ratio: 0.25,

            rho_min: 1e-8,
            rho_max: 1e8,
            rho_factor: 1.6,

            max_state_value: 1e8,
            max_control_value: 1e8,

            active_constraint_tolerance: 1e-3,

            outer_loop_update_type: OuterLoopUpdateType::Default,

            minimum_time: false,
            infeasible: false,
            r_minimum_time: 1.0,
            r_infeasible: 1.0,
            min_dt: 1e-3,
            max_dt: 1.0,

            control_integration: ControlIntegration::Zoh,

            kickout_max_penalty: false,

            verbose: false,

            line_search_decay: 0.5,
            line_search_max_iterations: 20,
            line_search_c1: 1e-4,
            line_search_c2: 10.0,

            max_cholesky_retries: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let o = SolverOptions::default();
        assert!(o.rho_min > 0.0);
        assert!(o.rho_min < o.rho_max);
        assert!(matches!(o.control_integration, ControlIntegration::Zoh));
    }
}
