//! Lines, spacing constraints and fit statistics.

use serde::{Deserialize, Serialize};

use crate::{median, Pt2, Real};

/// Minimum number of points a line must carry to take part in a fit.
pub const MIN_POINTS_PER_LINE: usize = 10;

/// Points hypothesized to be colinear once distortion is removed.
///
/// The line is parameterized in normal form `cos(θ)·x + sin(θ)·y = dist`
/// with `θ = angle + angle_offset`. Lines sharing a `group_id` and carrying an
/// `angle_offset` share one angle parameter during estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineWithPoints {
    pub angle: Real,
    pub dist: Real,
    /// Grid index the line was extracted from.
    pub step: Real,
    pub angle_offset: Option<Real>,
    pub group_id: usize,
    pub points: Vec<Pt2>,
}

impl LineWithPoints {
    /// Line seeded from its primary grid index.
    ///
    /// Absolute geometry is unknown at extraction time, so angle starts at π/4
    /// and both `dist` and `step` are the grid index.
    pub fn seeded(points: Vec<Pt2>, grid_index: usize) -> Self {
        Self {
            angle: std::f64::consts::FRAC_PI_4,
            dist: grid_index as Real,
            step: grid_index as Real,
            angle_offset: None,
            group_id: 0,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Effective normal angle `angle + angle_offset`.
    pub fn normal_angle(&self) -> Real {
        self.angle + self.angle_offset.unwrap_or(0.0)
    }
}

/// Indices of two lines in the combined line array.
pub type LinePair = (usize, usize);

/// Soft equality between the spacing of a row-line pair and a column-line pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeConstraint {
    pub first_pair: LinePair,
    pub second_pair: LinePair,
}

impl SizeConstraint {
    pub fn new(first_pair: LinePair, second_pair: LinePair) -> Self {
        Self {
            first_pair,
            second_pair,
        }
    }

    /// The four referenced line indices in `[a1, b1, a2, b2]` order.
    pub fn indices(&self) -> [usize; 4] {
        [
            self.first_pair.0,
            self.first_pair.1,
            self.second_pair.0,
            self.second_pair.1,
        ]
    }

    /// True when every referenced index addresses one of `line_count` lines.
    pub fn is_valid_for(&self, line_count: usize) -> bool {
        self.indices().iter().all(|&i| i < line_count)
    }
}

/// Residual statistics of the most recent successful fit, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub mean: Real,
    pub median: Real,
    pub stddev: Real,
    pub count: usize,
    /// Final robustified least-squares cost reported by the solver.
    pub final_cost: Real,
}

impl Statistics {
    /// Summarize absolute residual magnitudes.
    pub fn from_residuals(residuals: &[Real]) -> Self {
        if residuals.is_empty() {
            return Self::default();
        }
        let abs: Vec<Real> = residuals.iter().map(|r| r.abs()).collect();
        let n = abs.len() as Real;
        let mean = abs.iter().sum::<Real>() / n;
        let var = abs.iter().map(|r| (r - mean) * (r - mean)).sum::<Real>() / n;
        Self {
            mean,
            median: median(&abs),
            stddev: var.sqrt(),
            count: abs.len(),
            final_cost: 0.0,
        }
    }

    pub fn with_final_cost(mut self, final_cost: Real) -> Self {
        self.final_cost = final_cost;
        self
    }
}
