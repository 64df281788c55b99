//! Quadratic running/terminal cost and its expansion.
//!
//! This module only knows about the *plant*-sized state/control (`n`/`m`);
//! the minimum-time and infeasible-start cost terms are folded in one layer
//! up, by [`crate::objective::Objective`], so the embeddings stay decorators
//! rather than forks.

use nalgebra::{DMatrix, DVector};

/// Quadratic stage/terminal cost: `ℓ(x,u) = ½(x-xf)ᵀQ(x-xf) + ½uᵀRu + c`,
/// terminal `½(x_N-xf)ᵀQf(x_N-xf)`.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub qf: DMatrix<f64>,
    pub xf: DVector<f64>,
    pub c: f64,
}

/// Quadratic expansion of a stage cost, using the Q-function block names
/// the backward pass expects (`qxx`, `quu`, `qux`, `qx`, `qu`) rather than
/// the cost's own `(Q, R, H, q, r)` letters.
#[derive(Debug, Clone)]
pub struct CostExpansion {
    pub qxx: DMatrix<f64>,
    pub quu: DMatrix<f64>,
    pub qux: DMatrix<f64>,
    pub qx: DVector<f64>,
    pub qu: DVector<f64>,
}

impl QuadraticCost {
    pub fn new(q: DMatrix<f64>, r: DMatrix<f64>, qf: DMatrix<f64>, xf: DVector<f64>) -> Self {
        Self { q, r, qf, xf, c: 0.0 }
    }

    pub fn stage_cost(&self, x: &DVector<f64>, u: &DVector<f64>) -> f64 {
        let dx = x - &self.xf;
        0.5 * (dx.transpose() * &self.q * &dx)[(0, 0)] + 0.5 * (u.transpose() * &self.r * u)[(0, 0)] + self.c
    }

    pub fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
        let dx = x - &self.xf;
        0.5 * (dx.transpose() * &self.qf * &dx)[(0, 0)]
    }

    /// Stage expansion is exact (the cost is already quadratic): `qxx=Q`,
    /// `quu=R`, `qux=0`, `qx=Q(x-xf)`, `qu=Ru`.
    pub fn stage_expansion(&self, x: &DVector<f64>, u: &DVector<f64>) -> CostExpansion {
        let dx = x - &self.xf;
        CostExpansion {
            qxx: self.q.clone(),
            quu: self.r.clone(),
            qux: DMatrix::zeros(u.len(), x.len()),
            qx: &self.q * dx,
            qu: &self.r * u,
        }
    }

    pub fn terminal_expansion(&self, x: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>) {
        let dx = x - &self.xf;
        (self.qf.clone(), &self.qf * dx)
    }
}
