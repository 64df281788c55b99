//! The embedding-aware objective: base quadratic cost plus the minimum-time
//! and infeasible-start cost terms.
//!
//! Embeddings are decorators, not forks: this struct is the one place that
//! pads the plant-sized `(Q,R)` expansion up to the augmented
//! `mm`-dimensional control space; the iLQR core never has to know which
//! embeddings are active.

use nalgebra::{DMatrix, DVector};

use crate::cost::{CostExpansion, QuadraticCost};
use crate::dims::Dims;

/// Base cost plus embedding weights.
#[derive(Debug, Clone)]
pub struct Objective {
    pub cost: QuadraticCost,
    pub dims: Dims,
    /// Minimum-time per-interval time penalty weight `R_mt`.
    pub r_minimum_time: f64,
    /// Infeasible-start slack penalty weight `R_inf`.
    pub r_infeasible: f64,
}

impl Objective {
    pub fn new(cost: QuadraticCost, dims: Dims, r_minimum_time: f64, r_infeasible: f64) -> Self {
        Self { cost, dims, r_minimum_time, r_infeasible }
    }

    pub fn stage_cost(&self, x: &DVector<f64>, u_full: &DVector<f64>) -> f64 {
        let u_plant = u_full.rows(0, self.dims.m).clone_owned();
        let mut j = self.cost.stage_cost(x, &u_plant);
        if let Some(idx) = self.dims.min_time_index() {
            let s = u_full[idx];
            j += self.r_minimum_time * s * s;
        }
        if let Some((start, len)) = self.dims.infeasible_range() {
            let ui = u_full.rows(start, len);
            j += 0.5 * self.r_infeasible * ui.norm_squared();
        }
        j
    }

    pub fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
        self.cost.terminal_cost(x)
    }

    pub fn stage_expansion(&self, x: &DVector<f64>, u_full: &DVector<f64>) -> CostExpansion {
        let mm = self.dims.mm();
        let mut quu = DMatrix::zeros(mm, mm);
        let mut qux = DMatrix::zeros(mm, self.dims.n);
        let mut qu = DVector::zeros(mm);

        let u_plant = u_full.rows(0, self.dims.m).clone_owned();
        let base = self.cost.stage_expansion(x, &u_plant);
        quu.view_mut((0, 0), (self.dims.m, self.dims.m)).copy_from(&base.quu);
        qux.view_mut((0, 0), (self.dims.m, self.dims.n)).copy_from(&base.qux);
        qu.rows_mut(0, self.dims.m).copy_from(&base.qu);

        if let Some(j) = self.dims.min_time_index() {
            let s = u_full[j];
            quu[(j, j)] += 2.0 * self.r_minimum_time;
            qu[j] += 2.0 * self.r_minimum_time * s;
        }
        if let Some((start, len)) = self.dims.infeasible_range() {
            for i in 0..len {
                quu[(start + i, start + i)] += self.r_infeasible;
                qu[start + i] += self.r_infeasible * u_full[start + i];
            }
        }

        CostExpansion { qxx: base.qxx, quu, qux, qx: base.qx, qu }
    }

    pub fn terminal_expansion(&self, x: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>) {
        self.cost.terminal_expansion(x)
    }
}
