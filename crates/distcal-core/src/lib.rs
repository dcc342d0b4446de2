//! Core types for checkerboard line-based lens distortion calibration.
//!
//! This crate contains:
//! - scalar and vector aliases (`Real`, `Vec2`, `Pt2`),
//! - checkerboard detections (corner list plus board grids),
//! - lines, spacing constraints and fit statistics,
//! - undistortion models with named parameters and lock masks,
//! - camera intrinsic variants and the view/intrinsic data set.

pub mod board;
pub mod dataset;
pub mod lines;
/// Scalar and vector aliases.
pub mod math;
/// Camera and undistortion models.
pub mod models;
pub mod test_utils;

pub use board::*;
pub use dataset::*;
pub use lines::*;
pub use math::*;
pub use models::*;
