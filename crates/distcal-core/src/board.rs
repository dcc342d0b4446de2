//! Checkerboard detections consumed by line extraction.
//!
//! A detection holds a flat list of corner centers and one or more boards.
//! Each board is a rectangular grid whose cells reference a corner by index,
//! or are `None` when the detector could not recover that corner.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Pt2, ViewId};

/// A detected checkerboard corner in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckerBoardCorner {
    pub center: Pt2,
}

impl CheckerBoardCorner {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            center: Pt2::new(x, y),
        }
    }
}

/// Grid of corner indices for one checkerboard instance.
///
/// `cells[row][col]` is the index into [`CheckerDetection::corners`]. Rows are
/// expected to share a common length; a short row simply reads as undefined
/// cells past its end.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckerBoard {
    pub cells: Vec<Vec<Option<usize>>>,
}

impl CheckerBoard {
    pub fn new(cells: Vec<Vec<Option<usize>>>) -> Self {
        Self { cells }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Corner index stored at `(row, col)`, or `None` if the cell is out of
    /// range or undefined.
    pub fn cell(&self, row: usize, col: usize) -> Option<usize> {
        self.cells.get(row)?.get(col).copied().flatten()
    }

    /// Number of defined cells.
    pub fn defined_cells(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }
}

/// All checkerboard detections of one image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckerDetection {
    pub corners: Vec<CheckerBoardCorner>,
    pub boards: Vec<CheckerBoard>,
}

/// Detections keyed by the view they were extracted from.
pub type ViewDetections = BTreeMap<ViewId, CheckerDetection>;
