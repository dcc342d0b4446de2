use distcal_core::{undistort_normalized, NormalizedFrame, UndistortionKind};
use nalgebra::RealField;

/// Measurement data of one line point.
#[derive(Debug, Clone, Copy)]
pub struct LinePointData {
    pub pixel: [f64; 2],
    pub frame: NormalizedFrame,
    pub model: UndistortionKind,
    pub angle_offset: f64,
    pub w: f64,
}

/// Weighted signed distance of an undistorted point to the line
/// `cos θ·x + sin θ·y = dist`, in normalized units.
pub fn line_point_residual_generic<T: RealField>(
    undistortion: &[T],
    angle: T,
    dist: T,
    data: &LinePointData,
) -> T {
    let n = data
        .frame
        .to_normalized(&distcal_core::Pt2::new(data.pixel[0], data.pixel[1]));
    let x = T::from_f64(n.x).unwrap();
    let y = T::from_f64(n.y).unwrap();
    let (ux, uy) = undistort_normalized(data.model, undistortion, x, y);

    let theta = angle + T::from_f64(data.angle_offset).unwrap();
    let d = theta.clone().cos() * ux + theta.sin() * uy - dist;
    d * T::from_f64(data.w).unwrap()
}

/// Weighted difference between the spacing of `(a1, b1)` and of `(a2, b2)`.
pub fn spacing_residual_generic<T: RealField>(a1: T, b1: T, a2: T, b2: T, w: f64) -> T {
    ((b1 - a1) - (b2 - a2)) * T::from_f64(w).unwrap()
}
