//! Synthetic checkerboard scenes for tests.
//!
//! Public so workspace test suites can share it; not meant for production use.

use crate::{
    CameraIntrinsic, CheckerBoard, CheckerBoardCorner, CheckerDetection, IntrinsicId,
    PinholeIntrinsic, Pt2, Real, SfmData, View, ViewId,
};

/// A fully populated `rows × cols` grid of corners.
///
/// Corner `(r, c)` sits at `origin + (c·spacing, r·spacing)` and has index
/// `r·cols + c`.
pub fn grid_detection(rows: usize, cols: usize, origin: Pt2, spacing: Real) -> CheckerDetection {
    warped_grid_detection(rows, cols, origin, spacing, |p| p)
}

/// Like [`grid_detection`], with every corner passed through `warp`.
pub fn warped_grid_detection(
    rows: usize,
    cols: usize,
    origin: Pt2,
    spacing: Real,
    warp: impl Fn(Pt2) -> Pt2,
) -> CheckerDetection {
    let mut corners = Vec::with_capacity(rows * cols);
    let mut cells = Vec::with_capacity(rows);
    for r in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for c in 0..cols {
            let p = Pt2::new(
                origin.x + c as Real * spacing,
                origin.y + r as Real * spacing,
            );
            row.push(Some(corners.len()));
            corners.push(CheckerBoardCorner { center: warp(p) });
        }
        cells.push(row);
    }
    CheckerDetection {
        corners,
        boards: vec![CheckerBoard::new(cells)],
    }
}

/// Mark the given `(row, col)` cells of board `board` as undefined.
pub fn clear_cells(detection: &mut CheckerDetection, board: usize, cells: &[(usize, usize)]) {
    if let Some(b) = detection.boards.get_mut(board) {
        for &(r, c) in cells {
            if let Some(cell) = b.cells.get_mut(r).and_then(|row| row.get_mut(c)) {
                *cell = None;
            }
        }
    }
}

/// Pinhole intrinsic with a centered principal point.
pub fn pinhole(width: u32, height: u32) -> CameraIntrinsic {
    CameraIntrinsic::Pinhole(PinholeIntrinsic::new(width, height, width as Real))
}

/// Data set with one intrinsic and one view per pixel aspect ratio.
///
/// View ids start at 1.
pub fn single_intrinsic_scene(
    intrinsic_id: IntrinsicId,
    intrinsic: CameraIntrinsic,
    pixel_aspect_ratios: &[Real],
) -> SfmData {
    let mut sfm = SfmData::default();
    sfm.intrinsics.insert(intrinsic_id, intrinsic);
    for (i, par) in pixel_aspect_ratios.iter().enumerate() {
        let view_id = (i + 1) as ViewId;
        sfm.add_view(View::new(view_id, intrinsic_id).with_pixel_aspect_ratio(*par));
    }
    sfm
}
