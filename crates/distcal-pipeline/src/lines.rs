//! Line extraction from checkerboard grids.
//!
//! A traversal walks the board along a primary dimension and emits one line
//! per primary index, collecting the defined corners met along the secondary
//! dimension. Row and column lines are the default families; diagonal
//! families are available behind [`GridLineFamilies::diagonals`].

use distcal_core::{CheckerBoard, CheckerBoardCorner, LineWithPoints, MIN_POINTS_PER_LINE};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::config::LineExtractionConfig;

/// Primary dimension of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOrder {
    /// One line per grid row, walking across columns.
    ByRow,
    /// One line per grid column, walking across rows.
    ByColumn,
}

/// Replacement of one cell coordinate by the sum of both loop indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagonalRemap {
    #[default]
    None,
    /// Row coordinate becomes `i + j`.
    RowFromSum,
    /// Column coordinate becomes `i + j`.
    ColumnFromSum,
}

/// How a board grid is walked to produce lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridTraversal {
    pub order: TraversalOrder,
    pub remap: DiagonalRemap,
    pub flip_rows: bool,
    pub flip_cols: bool,
}

impl GridTraversal {
    pub const ROWS: Self = Self {
        order: TraversalOrder::ByRow,
        remap: DiagonalRemap::None,
        flip_rows: false,
        flip_cols: false,
    };

    pub const COLUMNS: Self = Self {
        order: TraversalOrder::ByColumn,
        remap: DiagonalRemap::None,
        flip_rows: false,
        flip_cols: false,
    };

    /// The four diagonal families: both sum remaps, each with and without a
    /// row flip.
    pub fn diagonals() -> [Self; 4] {
        let by_row = Self {
            order: TraversalOrder::ByRow,
            remap: DiagonalRemap::RowFromSum,
            flip_rows: false,
            flip_cols: false,
        };
        let by_col = Self {
            order: TraversalOrder::ByColumn,
            remap: DiagonalRemap::ColumnFromSum,
            flip_rows: false,
            flip_cols: false,
        };
        [
            by_row,
            Self {
                flip_rows: true,
                ..by_row
            },
            by_col,
            Self {
                flip_rows: true,
                ..by_col
            },
        ]
    }

    /// Grid cell visited at primary index `i` and secondary index `j`, or
    /// `None` when it falls outside a `rows × cols` grid.
    fn cell(&self, i: usize, j: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let by_row = self.order == TraversalOrder::ByRow;
        let (i, j) = (i as isize, j as isize);

        let mut row = match self.remap {
            DiagonalRemap::RowFromSum => i + j,
            _ if by_row => i,
            _ => j,
        };
        if self.flip_rows {
            row = rows as isize - 1 - row;
        }

        let mut col = match self.remap {
            DiagonalRemap::ColumnFromSum => i + j,
            _ if by_row => j,
            _ => i,
        };
        if self.flip_cols {
            col = cols as isize - 1 - col;
        }

        let inside = (0..rows as isize).contains(&row) && (0..cols as isize).contains(&col);
        inside.then_some((row as usize, col as usize))
    }
}

/// Extract the lines of one traversal.
///
/// Out-of-grid cells, undefined cells and corner indices past the end of
/// `corners` are skipped. Lines with fewer than `min_points` points are
/// dropped. Each kept line is seeded from its primary index via
/// [`LineWithPoints::seeded`].
pub fn create_lines(
    board: &CheckerBoard,
    corners: &[CheckerBoardCorner],
    traversal: &GridTraversal,
    min_points: usize,
) -> Vec<LineWithPoints> {
    let rows = board.rows();
    let cols = board.cols();
    let (dim1, dim2) = match traversal.order {
        TraversalOrder::ByRow => (rows, cols),
        TraversalOrder::ByColumn => (cols, rows),
    };

    let mut lines = Vec::new();
    for i in 0..dim1 {
        let points: Vec<_> = (0..dim2)
            .filter_map(|j| traversal.cell(i, j, rows, cols))
            .filter_map(|(r, c)| board.cell(r, c))
            .filter_map(|idx| corners.get(idx).map(|corner| corner.center))
            .collect();
        if points.len() < min_points {
            continue;
        }
        lines.push(LineWithPoints::seeded(points, i));
    }
    lines
}

/// Role of a line family within one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyRole {
    /// Grid rows: normal at `angle + π/2`, constrained against columns.
    Horizontal,
    /// Grid columns: normal at `angle`, constrained against rows.
    Vertical,
    /// Diagonals: free per-line angle, no constraints.
    Diagonal,
}

impl FamilyRole {
    /// Set the angle seed and offset that tie the line to its board.
    pub fn label(self, line: &mut LineWithPoints) {
        match self {
            FamilyRole::Horizontal => {
                line.angle = 0.0;
                line.angle_offset = Some(FRAC_PI_2);
            }
            FamilyRole::Vertical => {
                line.angle = 0.0;
                line.angle_offset = Some(0.0);
            }
            FamilyRole::Diagonal => {
                line.angle = FRAC_PI_4;
                line.angle_offset = None;
            }
        }
    }
}

/// Lines of one family, ordered by primary grid index.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFamily {
    pub role: FamilyRole,
    pub lines: Vec<LineWithPoints>,
}

/// Source of line families for one board.
pub trait LineFamilyGenerator {
    fn families(&self, board: &CheckerBoard, corners: &[CheckerBoardCorner]) -> Vec<LineFamily>;
}

/// Row/column families, plus optional diagonal families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLineFamilies {
    pub min_points: usize,
    pub diagonals: bool,
}

impl Default for GridLineFamilies {
    fn default() -> Self {
        Self {
            min_points: MIN_POINTS_PER_LINE,
            diagonals: false,
        }
    }
}

impl From<&LineExtractionConfig> for GridLineFamilies {
    fn from(cfg: &LineExtractionConfig) -> Self {
        Self {
            min_points: cfg.min_points_per_line,
            diagonals: cfg.diagonals,
        }
    }
}

impl GridLineFamilies {
    fn family(
        &self,
        board: &CheckerBoard,
        corners: &[CheckerBoardCorner],
        traversal: &GridTraversal,
        role: FamilyRole,
    ) -> LineFamily {
        let mut lines = create_lines(board, corners, traversal, self.min_points);
        for line in &mut lines {
            role.label(line);
        }
        LineFamily { role, lines }
    }
}

impl LineFamilyGenerator for GridLineFamilies {
    fn families(&self, board: &CheckerBoard, corners: &[CheckerBoardCorner]) -> Vec<LineFamily> {
        let mut families = vec![
            self.family(board, corners, &GridTraversal::ROWS, FamilyRole::Horizontal),
            self.family(board, corners, &GridTraversal::COLUMNS, FamilyRole::Vertical),
        ];
        if self.diagonals {
            for traversal in GridTraversal::diagonals() {
                families.push(self.family(board, corners, &traversal, FamilyRole::Diagonal));
            }
        }
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distcal_core::test_utils::{clear_cells, grid_detection};
    use distcal_core::Pt2;

    fn lines_of(rows: usize, cols: usize, traversal: GridTraversal) -> Vec<LineWithPoints> {
        let det = grid_detection(rows, cols, Pt2::new(10.0, 20.0), 5.0);
        create_lines(&det.boards[0], &det.corners, &traversal, MIN_POINTS_PER_LINE)
    }

    #[test]
    fn row_lines_need_ten_columns() {
        for (rows, cols) in [(7, 12), (12, 10), (10, 9), (3, 3)] {
            let lines = lines_of(rows, cols, GridTraversal::ROWS);
            let expected = if cols >= 10 { rows } else { 0 };
            assert_eq!(lines.len(), expected, "{rows}x{cols}");
            assert!(lines.iter().all(|l| l.len() == cols));
        }
    }

    #[test]
    fn column_lines_walk_rows_in_order() {
        let lines = lines_of(11, 4, GridTraversal::COLUMNS);
        assert_eq!(lines.len(), 4);
        let first = &lines[0];
        assert_eq!(first.len(), 11);
        assert!(first.points.windows(2).all(|w| w[1].y > w[0].y && w[1].x == w[0].x));
        assert_eq!(lines[3].step, 3.0);
    }

    #[test]
    fn flips_reverse_traversal() {
        let mut flipped = GridTraversal::ROWS;
        flipped.flip_rows = true;
        flipped.flip_cols = true;
        let plain = lines_of(10, 10, GridTraversal::ROWS);
        let lines = lines_of(10, 10, flipped);
        assert_eq!(lines[0].points[0], plain[9].points[9]);
        assert_eq!(lines[9].points[9], plain[0].points[0]);
    }

    #[test]
    fn undefined_cells_are_skipped_and_short_lines_dropped() {
        let mut det = grid_detection(3, 12, Pt2::new(0.0, 0.0), 1.0);
        clear_cells(&mut det, 0, &[(0, 0), (1, 0), (1, 1), (1, 2)]);
        let lines = create_lines(
            &det.boards[0],
            &det.corners,
            &GridTraversal::ROWS,
            MIN_POINTS_PER_LINE,
        );
        let lens: Vec<usize> = lines.iter().map(LineWithPoints::len).collect();
        assert_eq!(lens, vec![11, 12]);
        assert_eq!(lines[1].dist, 2.0);
    }

    #[test]
    fn out_of_range_corner_index_is_skipped() {
        let mut det = grid_detection(1, 11, Pt2::new(0.0, 0.0), 1.0);
        det.boards[0].cells[0][4] = Some(500);
        let lines = create_lines(
            &det.boards[0],
            &det.corners,
            &GridTraversal::ROWS,
            MIN_POINTS_PER_LINE,
        );
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 10);
    }

    #[test]
    fn diagonals_follow_index_sums() {
        let det = grid_detection(12, 12, Pt2::new(0.0, 0.0), 1.0);
        let [down, up, ..] = GridTraversal::diagonals();
        let lines = create_lines(&det.boards[0], &det.corners, &down, MIN_POINTS_PER_LINE);
        // rows i + j stay inside the grid for at least ten steps only when i <= 2
        assert_eq!(lines.len(), 3);
        assert!(lines[0]
            .points
            .iter()
            .all(|p| (p.y - p.x).abs() < 1e-12));

        let lines = create_lines(&det.boards[0], &det.corners, &up, MIN_POINTS_PER_LINE);
        assert_eq!(lines.len(), 3);
        assert!(lines[0]
            .points
            .iter()
            .all(|p| (p.x + p.y - 11.0).abs() < 1e-12));
    }

    #[test]
    fn families_are_labelled() {
        let det = grid_detection(10, 10, Pt2::new(0.0, 0.0), 1.0);
        let families = GridLineFamilies::default().families(&det.boards[0], &det.corners);
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].role, FamilyRole::Horizontal);
        assert!(families[0]
            .lines
            .iter()
            .all(|l| l.angle_offset == Some(FRAC_PI_2) && l.angle == 0.0));
        assert!(families[1].lines.iter().all(|l| l.angle_offset == Some(0.0)));

        let with_diagonals = GridLineFamilies {
            diagonals: true,
            ..GridLineFamilies::default()
        };
        let families = with_diagonals.families(&det.boards[0], &det.corners);
        assert_eq!(families.len(), 6);
        assert!(families[2..]
            .iter()
            .all(|f| f.role == FamilyRole::Diagonal
                && f.lines.iter().all(|l| l.angle_offset.is_none())));
    }
}
