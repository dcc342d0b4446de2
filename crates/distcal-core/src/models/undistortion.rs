//! Parametric pixel undistortion.
//!
//! Pixels are mapped into a normalized frame centered on the (offset) image
//! center and scaled by the half diagonal, with `x` stretched by the pixel
//! aspect ratio. The undistortion polynomial operates in that frame.
//!
//! The mapping is written generically over [`RealField`] so the optimizer can
//! evaluate it on dual numbers.

use nalgebra::RealField;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ModelError;
use crate::{Pt2, Real, Vec2};

/// Supported undistortion parameterizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndistortionKind {
    /// No undistortion capability.
    None,
    /// 3DE anamorphic degree-4 model with rotation and squeeze (13 parameters).
    Anamorphic4,
}

impl UndistortionKind {
    /// Parse a model-selection string such as `"3deanamorphic4"`.
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "3deanamorphic4" => Ok(Self::Anamorphic4),
            "none" => Ok(Self::None),
            _ => Err(ModelError::UnknownUndistortionModel(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Anamorphic4 => "3deanamorphic4",
        }
    }

    /// Parameters of the model in storage order.
    pub fn roles(self) -> &'static [ParamRole] {
        match self {
            Self::None => &[],
            Self::Anamorphic4 => &ParamRole::ANAMORPHIC4,
        }
    }

    pub fn param_count(self) -> usize {
        self.roles().len()
    }

    /// Storage index of `role`, if the model has it.
    pub fn index_of(self, role: ParamRole) -> Option<usize> {
        self.roles().iter().position(|r| *r == role)
    }

    /// Parameter vector for which the model is the identity.
    pub fn identity_params(self) -> Vec<Real> {
        self.roles()
            .iter()
            .map(|role| match role {
                ParamRole::Sqx | ParamRole::Sqy => 1.0,
                _ => 0.0,
            })
            .collect()
    }

    pub fn has_undistortion(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for UndistortionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UndistortionKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Named parameter of an undistortion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    Cx02,
    Cy02,
    Cx22,
    Cy22,
    Cx04,
    Cy04,
    Cx24,
    Cy24,
    Cx44,
    Cy44,
    /// Anamorphic axis rotation, radians.
    Phi,
    /// Horizontal squeeze.
    Sqx,
    /// Vertical squeeze.
    Sqy,
}

impl ParamRole {
    pub const ANAMORPHIC4: [ParamRole; 13] = [
        ParamRole::Cx02,
        ParamRole::Cy02,
        ParamRole::Cx22,
        ParamRole::Cy22,
        ParamRole::Cx04,
        ParamRole::Cy04,
        ParamRole::Cx24,
        ParamRole::Cy24,
        ParamRole::Cx44,
        ParamRole::Cy44,
        ParamRole::Phi,
        ParamRole::Sqx,
        ParamRole::Sqy,
    ];
}

/// Named subsets of parameters unlocked together by calibration schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGroup {
    /// `cx02, cy02, cx22, cy22`.
    Degree2,
    /// `cx04, cy04, cx24, cy24, cx44, cy44`.
    Degree4,
    /// `phi`.
    Rotation,
}

impl ParamGroup {
    pub fn members(self) -> &'static [ParamRole] {
        use ParamRole::*;
        match self {
            Self::Degree2 => &[Cx02, Cy02, Cx22, Cy22],
            Self::Degree4 => &[Cx04, Cy04, Cx24, Cy24, Cx44, Cy44],
            Self::Rotation => &[Phi],
        }
    }
}

/// Per-parameter lock flags of one undistortion model.
///
/// The mask length always equals the parameter count of its model. Masks are
/// built from named roles and groups rather than positional lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LockMaskFields")]
pub struct LockMask {
    kind: UndistortionKind,
    locked: Vec<bool>,
}

/// Unchecked serialized form of [`LockMask`].
#[derive(Deserialize)]
struct LockMaskFields {
    kind: UndistortionKind,
    locked: Vec<bool>,
}

impl TryFrom<LockMaskFields> for LockMask {
    type Error = ModelError;

    fn try_from(fields: LockMaskFields) -> Result<Self, Self::Error> {
        let expected = fields.kind.param_count();
        if fields.locked.len() != expected {
            return Err(ModelError::ParameterCount {
                kind: fields.kind,
                expected,
                got: fields.locked.len(),
            });
        }
        Ok(Self {
            kind: fields.kind,
            locked: fields.locked,
        })
    }
}

impl LockMask {
    pub fn all_locked(kind: UndistortionKind) -> Self {
        Self {
            kind,
            locked: vec![true; kind.param_count()],
        }
    }

    pub fn all_free(kind: UndistortionKind) -> Self {
        Self {
            kind,
            locked: vec![false; kind.param_count()],
        }
    }

    fn set(mut self, role: ParamRole, locked: bool) -> Result<Self, ModelError> {
        let idx = self.kind.index_of(role).ok_or(ModelError::RoleNotInModel {
            role,
            kind: self.kind,
        })?;
        self.locked[idx] = locked;
        Ok(self)
    }

    pub fn lock(self, role: ParamRole) -> Result<Self, ModelError> {
        self.set(role, true)
    }

    pub fn unlock(self, role: ParamRole) -> Result<Self, ModelError> {
        self.set(role, false)
    }

    pub fn unlock_group(self, group: ParamGroup) -> Result<Self, ModelError> {
        group
            .members()
            .iter()
            .try_fold(self, |mask, role| mask.unlock(*role))
    }

    pub fn kind(&self) -> UndistortionKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.locked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked.is_empty()
    }

    pub fn is_locked(&self, idx: usize) -> bool {
        self.locked.get(idx).copied().unwrap_or(false)
    }

    pub fn is_role_locked(&self, role: ParamRole) -> bool {
        self.kind
            .index_of(role)
            .is_some_and(|idx| self.is_locked(idx))
    }

    pub fn locked_indices(&self) -> Vec<usize> {
        self.locked
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.then_some(i))
            .collect()
    }
}

/// Pixel to normalized-coordinate frame of an undistortion model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFrame {
    pub center: [Real; 2],
    /// Half of the image diagonal, in pixels.
    pub scale: Real,
    pub pixel_aspect_ratio: Real,
}

impl NormalizedFrame {
    pub fn to_normalized(&self, pixel: &Pt2) -> Vec2 {
        Vec2::new(
            (pixel.x - self.center[0]) * self.pixel_aspect_ratio / self.scale,
            (pixel.y - self.center[1]) / self.scale,
        )
    }

    pub fn to_pixel(&self, n: &Vec2) -> Pt2 {
        Pt2::new(
            n.x * self.scale / self.pixel_aspect_ratio + self.center[0],
            n.y * self.scale + self.center[1],
        )
    }
}

/// Anamorphic degree-4 undistortion in normalized coordinates.
///
/// `params` follows [`ParamRole::ANAMORPHIC4`] order. The point is rotated into
/// the lens frame by `phi`, scaled per axis by
/// `1 + c02·r² + c22·(x²−y²) + c04·r⁴ + c24·r²(x²−y²) + c44·(x⁴−6x²y²+y⁴)`,
/// squeezed by `(sqx, sqy)` and rotated back.
pub fn anamorphic4_undistort<T: RealField>(params: &[T], x: T, y: T) -> (T, T) {
    debug_assert!(params.len() >= 13, "anamorphic4 expects 13 parameters");
    let c = params[10].clone().cos();
    let s = params[10].clone().sin();

    let xr = c.clone() * x.clone() + s.clone() * y.clone();
    let yr = c.clone() * y - s.clone() * x;

    let x2 = xr.clone() * xr.clone();
    let y2 = yr.clone() * yr.clone();
    let r2 = x2.clone() + y2.clone();
    let r4 = r2.clone() * r2.clone();
    let c2 = x2.clone() - y2.clone();
    let six = T::from_f64(6.0).unwrap();
    let c4 = x2.clone() * x2.clone() - six * x2 * y2.clone() + y2.clone() * y2;

    let fx = T::one()
        + params[0].clone() * r2.clone()
        + params[2].clone() * c2.clone()
        + params[4].clone() * r4.clone()
        + params[6].clone() * r2.clone() * c2.clone()
        + params[8].clone() * c4.clone();
    let fy = T::one()
        + params[1].clone() * r2.clone()
        + params[3].clone() * c2.clone()
        + params[5].clone() * r4
        + params[7].clone() * r2 * c2
        + params[9].clone() * c4;

    let ux = xr * fx * params[11].clone();
    let uy = yr * fy * params[12].clone();

    (
        c.clone() * ux.clone() - s.clone() * uy.clone(),
        s * ux + c * uy,
    )
}

/// Undistort a normalized point with the model `kind`.
pub fn undistort_normalized<T: RealField>(
    kind: UndistortionKind,
    params: &[T],
    x: T,
    y: T,
) -> (T, T) {
    match kind {
        UndistortionKind::None => (x, y),
        UndistortionKind::Anamorphic4 => anamorphic4_undistort(params, x, y),
    }
}

/// Undistortion attached to a camera model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Undistortion {
    kind: UndistortionKind,
    pub width: u32,
    pub height: u32,
    pub pixel_aspect_ratio: Real,
    /// Center offset from the geometric image center, in pixels.
    pub offset: Vec2,
    params: Vec<Real>,
}

impl Undistortion {
    /// Identity undistortion of `kind` for a `width × height` image.
    pub fn new(kind: UndistortionKind, width: u32, height: u32) -> Self {
        Self {
            kind,
            width,
            height,
            pixel_aspect_ratio: 1.0,
            offset: Vec2::zeros(),
            params: kind.identity_params(),
        }
    }

    pub fn kind(&self) -> UndistortionKind {
        self.kind
    }

    pub fn params(&self) -> &[Real] {
        &self.params
    }

    pub fn set_params(&mut self, params: &[Real]) -> Result<(), ModelError> {
        let expected = self.kind.param_count();
        if params.len() != expected {
            return Err(ModelError::ParameterCount {
                kind: self.kind,
                expected,
                got: params.len(),
            });
        }
        self.params.clear();
        self.params.extend_from_slice(params);
        Ok(())
    }

    pub fn param(&self, role: ParamRole) -> Option<Real> {
        self.kind.index_of(role).map(|i| self.params[i])
    }

    pub fn frame(&self) -> NormalizedFrame {
        let w = self.width as Real;
        let h = self.height as Real;
        NormalizedFrame {
            center: [0.5 * w + self.offset.x, 0.5 * h + self.offset.y],
            scale: (0.5 * (w * w + h * h).sqrt()).max(1.0),
            pixel_aspect_ratio: self.pixel_aspect_ratio,
        }
    }

    /// Map a distorted pixel to its undistorted position.
    pub fn undistort_pixel(&self, pixel: &Pt2) -> Pt2 {
        let frame = self.frame();
        let n = frame.to_normalized(pixel);
        let (x, y) = undistort_normalized(self.kind, &self.params, n.x, n.y);
        frame.to_pixel(&Vec2::new(x, y))
    }
}
