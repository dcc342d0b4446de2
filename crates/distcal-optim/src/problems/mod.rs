//! Problem builders and solvers.

pub mod line_distortion;
