//! Error taxonomy for the solver.
//!
//! Only structural failures escape [`crate::solver::solve`] as `Err`. Numerical
//! failures (diverged rollouts, failed Cholesky factorizations, exhausted
//! regularization) are recovered locally by the inner loop and folded into
//! [`crate::stats::SolveStats`] instead, per the design rule that the solver
//! never silently returns garbage but also never aborts on a recoverable
//! numerical hiccup.

use thiserror::Error;

/// Errors that can escape the solver façade.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Problem dimensions are inconsistent (e.g. `Q` is not `n x n`, or the
    /// initial guess has the wrong number of knots).
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Convenience alias used throughout the crate.
pub type SolverResult<T> = Result<T, SolverError>;
