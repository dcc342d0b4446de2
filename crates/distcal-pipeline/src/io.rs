//! JSON files: the data set and per-view checkerboard detections.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use distcal_core::{CheckerDetection, SfmData, ViewDetections, ViewId};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};

pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn load_sfm_data(path: &Path) -> Result<SfmData> {
    load_json_file(path)
}

pub fn save_sfm_data(path: &Path, sfm: &SfmData) -> Result<()> {
    save_json_file(path, sfm)
}

/// File holding the detections of `view_id`.
pub fn detection_file_name(view_id: ViewId) -> String {
    format!("checkers_{view_id}.json")
}

/// Read the detection file of every view in `sfm` from `dir`.
///
/// Views without a file are left out of the result.
pub fn load_detections(dir: &Path, sfm: &SfmData) -> Result<ViewDetections> {
    let mut detections = ViewDetections::new();
    for &view_id in sfm.views.keys() {
        let path = dir.join(detection_file_name(view_id));
        if !path.is_file() {
            debug!("view {}: no detection file {}", view_id, path.display());
            continue;
        }
        let detection: CheckerDetection = load_json_file(&path)?;
        detections.insert(view_id, detection);
    }
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use distcal_core::test_utils::{grid_detection, pinhole, single_intrinsic_scene};
    use distcal_core::Pt2;
    use tempfile::tempdir;

    #[test]
    fn data_set_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sfm.json");
        let sfm = single_intrinsic_scene(4, pinhole(1920, 1080), &[1.0, 1.0]);
        save_sfm_data(&path, &sfm).unwrap();
        assert_eq!(load_sfm_data(&path).unwrap(), sfm);
    }

    #[test]
    fn missing_detection_files_are_skipped() {
        let dir = tempdir().unwrap();
        let sfm = single_intrinsic_scene(0, pinhole(640, 480), &[1.0, 1.0, 1.0]);
        let det = grid_detection(3, 4, Pt2::new(5.0, 5.0), 10.0);
        save_json_file(&dir.path().join(detection_file_name(2)), &det).unwrap();

        let loaded = load_detections(dir.path(), &sfm).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&2], det);
    }

    #[test]
    fn malformed_detection_file_is_an_error() {
        let dir = tempdir().unwrap();
        let sfm = single_intrinsic_scene(0, pinhole(640, 480), &[1.0]);
        fs::write(dir.path().join(detection_file_name(1)), "{ not json").unwrap();
        let err = load_detections(dir.path(), &sfm).unwrap_err();
        assert!(err.to_string().contains("checkers_1.json"));
    }

    #[test]
    fn undefined_cells_are_null() {
        let json = r#"{
            "corners": [{ "center": [0.0, 0.0] }, { "center": [1.0, 0.0] }],
            "boards": [{ "cells": [[0, null, 1]] }]
        }"#;
        let det: CheckerDetection = serde_json::from_str(json).unwrap();
        assert_eq!(det.boards[0].cell(0, 1), None);
        assert_eq!(det.boards[0].cell(0, 2), Some(1));
    }
}
