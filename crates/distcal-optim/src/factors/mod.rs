//! Residual factor implementations with automatic differentiation support.
//!
//! All factor functions are generic over [`nalgebra::RealField`] so the same
//! code evaluates on `f64` (statistics) and on dual numbers (Jacobians).
//!
//! ## Key Guidelines
//!
//! - Use `.clone()` liberally on `T: RealField` values
//! - Convert constants with `T::from_f64().unwrap()`
//! - Keep measurements as plain `f64` data on the factor
//!
//! # Available Factors
//!
//! - [`line`] - point-to-line distance after undistortion and line spacing consistency

pub mod line;
