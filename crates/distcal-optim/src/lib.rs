//! Non-linear distortion estimation built on tiny-solver.
//!
//! Problems are assembled as a backend-independent [`ir::ProblemIR`] and then
//! compiled by a [`backend::OptimBackend`]. The line-fit estimator in
//! [`problems::line_distortion`] implements [`DistortionEstimator`].

pub mod backend;
pub mod estimator;
pub mod factors;
pub mod ir;
pub mod problems;

pub use backend::{
    BackendSolution, BackendSolveOptions, LinearSolverKind, OptimBackend, ParamValues,
    TinySolverBackend,
};
pub use estimator::{DistortionEstimator, EstimationRequest};
pub use ir::RobustLoss;
pub use problems::line_distortion::{
    build_line_distortion_problem, residual_statistics, LineDistortionEstimator,
    LineDistortionProblem, LineFitOptions,
};
