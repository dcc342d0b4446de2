//! Solver adapters.
//!
//! A backend turns a [`ProblemIR`] plus named initial values into a native
//! solver problem, honours fixed indices and bounds, and hands back the refined
//! values under the same block names.

mod tiny_solver_backend;

use anyhow::Result;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ir::ProblemIR;

pub use tiny_solver_backend::TinySolverBackend;

/// Parameter values keyed by IR block name.
pub type ParamValues = HashMap<String, DVector<f64>>;

/// Levenberg–Marquardt settings shared by all stages of a run.
///
/// `None` thresholds leave the backend's own default in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSolveOptions {
    pub max_iters: usize,
    /// Passed through to the backend; 0 is silent.
    pub verbosity: usize,
    pub linear_solver: Option<LinearSolverKind>,
    /// Stop once the cost drops by less than this between iterations.
    pub min_abs_decrease: Option<f64>,
    /// Same, relative to the current cost.
    pub min_rel_decrease: Option<f64>,
    /// Stop once the cost is below this.
    pub min_error: Option<f64>,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            verbosity: 0,
            linear_solver: Some(LinearSolverKind::SparseCholesky),
            min_abs_decrease: Some(1e-5),
            min_rel_decrease: Some(1e-5),
            min_error: Some(1e-10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverKind {
    SparseCholesky,
    SparseQR,
}

/// Refined values and costs of one solve.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    pub params: ParamValues,
    /// Robustified cost `½·Σ ρ(r²)` at the initial values.
    pub initial_cost: f64,
    /// Robustified cost at the refined values.
    pub final_cost: f64,
}

pub trait OptimBackend {
    /// Refine `initial` against every residual of `ir`.
    ///
    /// Fails when the IR is invalid, an initial block is missing or has the
    /// wrong length, or the solver gives up.
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &ParamValues,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution>;
}
