//! Constrained trajectory optimization: an iterative LQR inner solver
//! wrapped in an augmented Lagrangian outer loop.
//!
//! Start at [`solver::solve`]; it takes a [`solver::Problem`] (your
//! [`dynamics::DiscreteDynamics`] model plus boundary conditions and cost)
//! and a [`options::SolverOptions`], and returns a converged
//! [`trajectory::Trajectory`] and [`stats::SolveStats`].

pub mod al;
pub mod backward;
pub mod constraints;
pub mod cost;
pub mod dims;
pub mod dynamics;
pub mod embeddings;
pub mod error;
pub mod ilqr;
pub mod linesearch;
pub mod objective;
pub mod options;
pub mod regularization;
pub mod rollout;
pub mod solver;
pub mod stats;
pub mod trajectory;

pub use dims::Dims;
pub use dynamics::DiscreteDynamics;
pub use error::{SolverError, SolverResult};
pub use options::{ControlIntegration, SolverOptions};
pub use solver::{solve, Problem};
pub use stats::SolveStats;
pub use trajectory::Trajectory;
