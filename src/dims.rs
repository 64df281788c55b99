//! Problem sizing: state/control dimensions and the embedding bookkeeping
//! that turns the plant control dimension `m` into the augmented `mm` that
//! the iLQR core actually solves over.

/// Sizes that stay fixed for the lifetime of a solver instance.
///
/// `m_bar()` and `mm()` are derived rather than stored so there is exactly
/// one place that encodes "minimum-time adds one control, infeasible-start
/// adds `n` more".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    /// State dimension.
    pub n: usize,
    /// Plant control dimension (the dimension the user's dynamics model
    /// actually consumes).
    pub m: usize,
    /// Number of knot points `N`.
    pub n_knots: usize,
    /// Whether the minimum-time embedding is active.
    pub minimum_time: bool,
    /// Whether the infeasible-start embedding is active.
    pub infeasible: bool,
}

impl Dims {
    /// Effective control dimension `m̄ = m + [minimum_time]`.
    pub fn m_bar(&self) -> usize {
        self.m + usize::from(self.minimum_time)
    }

    /// Augmented control dimension `mm = m̄ + [n if infeasible]`.
    pub fn mm(&self) -> usize {
        self.m_bar() + if self.infeasible { self.n } else { 0 }
    }

    /// Index of the minimum-time control column, if present.
    pub fn min_time_index(&self) -> Option<usize> {
        self.minimum_time.then_some(self.m)
    }

    /// Index range of the infeasible-start controls, if present.
    pub fn infeasible_range(&self) -> Option<(usize, usize)> {
        self.infeasible.then(|| (self.m_bar(), self.n))
    }

    /// Number of intervals (`N - 1`).
    pub fn n_intervals(&self) -> usize {
        self.n_knots.saturating_sub(1)
    }
}
