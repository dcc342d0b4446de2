use serde::{Deserialize, Serialize};

use super::Undistortion;
use crate::{Real, Vec2};

/// How the distortion of an intrinsic was initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    #[default]
    Unknown,
    Estimated,
    Calibrated,
}

/// Pinhole camera intrinsic with an optional undistortion stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsic {
    pub width: u32,
    pub height: u32,
    /// Sensor width in millimeters.
    #[serde(default)]
    pub sensor_width: Real,
    /// Sensor height in millimeters.
    #[serde(default)]
    pub sensor_height: Real,
    #[serde(default)]
    pub serial_number: String,
    /// Focal lengths `(fx, fy)` in pixels.
    pub scale: Vec2,
    /// Principal point offset from the image center, in pixels.
    #[serde(default = "Vec2::zeros")]
    pub offset: Vec2,
    #[serde(default)]
    pub distortion_init_mode: InitMode,
    #[serde(default)]
    pub undistortion: Option<Undistortion>,
}

impl PinholeIntrinsic {
    pub fn new(width: u32, height: u32, focal: Real) -> Self {
        Self {
            width,
            height,
            sensor_width: 0.0,
            sensor_height: 0.0,
            serial_number: String::new(),
            scale: Vec2::new(focal, focal),
            offset: Vec2::zeros(),
            distortion_init_mode: InitMode::Unknown,
            undistortion: None,
        }
    }
}

/// Equidistant fisheye intrinsic. It carries no undistortion stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquidistantIntrinsic {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub sensor_width: Real,
    #[serde(default)]
    pub sensor_height: Real,
    #[serde(default)]
    pub serial_number: String,
    pub scale: Real,
    #[serde(default = "Vec2::zeros")]
    pub offset: Vec2,
    /// Radius of the fisheye circle, in pixels.
    #[serde(default)]
    pub circle_radius: Real,
}

/// Camera intrinsic stored in a data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraIntrinsic {
    Pinhole(PinholeIntrinsic),
    Equidistant(EquidistantIntrinsic),
}

impl CameraIntrinsic {
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::Pinhole(_) => "pinhole",
            Self::Equidistant(_) => "equidistant",
        }
    }

    pub fn as_pinhole(&self) -> Option<&PinholeIntrinsic> {
        match self {
            Self::Pinhole(p) => Some(p),
            _ => None,
        }
    }

    pub fn undistortion(&self) -> Option<&Undistortion> {
        self.as_pinhole().and_then(|p| p.undistortion.as_ref())
    }

    pub fn supports_undistortion(&self) -> bool {
        self.undistortion().is_some()
    }

    pub fn size(&self) -> (u32, u32) {
        match self {
            Self::Pinhole(p) => (p.width, p.height),
            Self::Equidistant(e) => (e.width, e.height),
        }
    }
}
