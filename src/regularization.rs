//! Two-level regularization schedule for the backward pass.

use tracing::warn;

use crate::options::SolverOptions;

/// `ρ` (base regularization) and `dρ` (its multiplier), mutated in place by
/// the backward pass / line search as they signal "increase" or "decrease".
#[derive(Debug, Clone, Copy)]
pub struct Regularization {
    pub rho: f64,
    pub d_rho: f64,
    /// Number of times [`Self::increase`] has fired, across the whole
    /// solve. Surfaced in `SolveStats::rho_increases`.
    pub increases: usize,
}

impl Regularization {
    pub fn new(rho_min: f64) -> Self {
        Self { rho: rho_min, d_rho: 1.0, increases: 0 }
    }

    /// `dρ ← max(dρ·ρ_factor, ρ_factor)`, `ρ ← max(ρ·dρ, ρ_min)`.
    pub fn increase(&mut self, opts: &SolverOptions) {
        self.d_rho = (self.d_rho * opts.rho_factor).max(opts.rho_factor);
        self.rho = (self.rho * self.d_rho).max(opts.rho_min);
        self.increases += 1;
        if self.rho > opts.rho_max {
            warn!(rho = self.rho, rho_max = opts.rho_max, "regularization exceeded rho_max");
        }
    }

    /// `dρ ← min(dρ/ρ_factor, 1/ρ_factor)`, `ρ ← max(ρ·dρ, ρ_min)`.
    pub fn decrease(&mut self, opts: &SolverOptions) {
        self.d_rho = (self.d_rho / opts.rho_factor).min(1.0 / opts.rho_factor);
        self.rho = (self.rho * self.d_rho).max(opts.rho_min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increase_then_decrease_is_not_a_no_op_but_stays_bounded() {
        let opts = SolverOptions::default();
        let mut reg = Regularization::new(opts.rho_min);
        for _ in 0..5 {
            reg.increase(&opts);
        }
        assert!(reg.rho >= opts.rho_min);
        let peak = reg.rho;
        reg.decrease(&opts);
        assert!(reg.rho <= peak);
    }

    #[test]
    fn never_drops_below_rho_min_floor() {
        let opts = SolverOptions::default();
        let mut reg = Regularization::new(opts.rho_min);
        for _ in 0..20 {
            reg.decrease(&opts);
        }
        assert!(reg.rho >= opts.rho_min);
    }
}
