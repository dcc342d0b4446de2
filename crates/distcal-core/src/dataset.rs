//! Caller-owned scene description: views and the intrinsics they reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{CameraIntrinsic, Real};

pub type ViewId = u32;
pub type IntrinsicId = u32;

/// Metadata key holding the pixel aspect ratio of a view.
pub const PIXEL_ASPECT_RATIO_KEY: &str = "PixelAspectRatio";

/// One captured image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub view_id: ViewId,
    pub intrinsic_id: IntrinsicId,
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl View {
    pub fn new(view_id: ViewId, intrinsic_id: IntrinsicId) -> Self {
        Self {
            view_id,
            intrinsic_id,
            image_path: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Pixel aspect ratio from metadata, `1.0` when absent or unparsable.
    pub fn pixel_aspect_ratio(&self) -> Real {
        self.metadata
            .get(PIXEL_ASPECT_RATIO_KEY)
            .and_then(|v| v.trim().parse::<Real>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(1.0)
    }

    pub fn with_pixel_aspect_ratio(mut self, par: Real) -> Self {
        self.metadata
            .insert(PIXEL_ASPECT_RATIO_KEY.to_string(), par.to_string());
        self
    }
}

/// Views and intrinsics of a reconstruction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SfmData {
    #[serde(default)]
    pub views: BTreeMap<ViewId, View>,
    #[serde(default)]
    pub intrinsics: BTreeMap<IntrinsicId, CameraIntrinsic>,
}

impl SfmData {
    pub fn add_view(&mut self, view: View) {
        self.views.insert(view.view_id, view);
    }

    /// Views that reference `intrinsic_id`, in view-id order.
    pub fn views_of(&self, intrinsic_id: IntrinsicId) -> impl Iterator<Item = &View> + '_ {
        self.views
            .values()
            .filter(move |v| v.intrinsic_id == intrinsic_id)
    }

    pub fn intrinsic_ids(&self) -> Vec<IntrinsicId> {
        self.intrinsics.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PinholeIntrinsic;

    #[test]
    fn pixel_aspect_ratio_defaults_to_one() {
        let view = View::new(1, 0);
        assert_eq!(view.pixel_aspect_ratio(), 1.0);
        assert_eq!(view.clone().with_pixel_aspect_ratio(2.0).pixel_aspect_ratio(), 2.0);

        let mut bad = view;
        bad.metadata
            .insert(PIXEL_ASPECT_RATIO_KEY.to_string(), "wide".to_string());
        assert_eq!(bad.pixel_aspect_ratio(), 1.0);
    }

    #[test]
    fn views_are_filtered_by_intrinsic() {
        let mut sfm = SfmData::default();
        sfm.intrinsics.insert(
            7,
            CameraIntrinsic::Pinhole(PinholeIntrinsic::new(10, 10, 10.0)),
        );
        sfm.add_view(View::new(1, 7));
        sfm.add_view(View::new(2, 8));
        sfm.add_view(View::new(3, 7));
        let ids: Vec<ViewId> = sfm.views_of(7).map(|v| v.view_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(sfm.intrinsic_ids(), vec![7]);

        let json = serde_json::to_string(&sfm).unwrap();
        let back: SfmData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sfm);
    }
}
