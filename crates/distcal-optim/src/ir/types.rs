use anyhow::{ensure, Result};
use distcal_core::{NormalizedFrame, UndistortionKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Index of a parameter block within its [`ProblemIR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Box constraint on one entry of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub idx: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Entries of a block held at their initial value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedMask(BTreeSet<usize>);

impl FixedMask {
    pub fn all_free() -> Self {
        Self::default()
    }

    pub fn all_fixed(dim: usize) -> Self {
        Self((0..dim).collect())
    }

    pub fn fix_indices(indices: &[usize]) -> Self {
        Self(indices.iter().copied().collect())
    }

    pub fn is_fixed(&self, idx: usize) -> bool {
        self.0.contains(&idx)
    }

    /// Fixed entries, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

/// Loss applied to one residual block. Every line point is its own block, so
/// the loss acts per point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
    Arctan {
        scale: f64,
    },
}

/// Residual kinds understood by the backends.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Signed distance of an undistorted point to its line.
    ///
    /// Parameters: [undistortion, angle (1), dist (1)].
    /// Residual: `w·(cos θ·x + sin θ·y − dist)` with `θ = angle + angle_offset`
    /// and `(x, y)` the undistorted normalized point.
    LinePoint {
        pixel: [f64; 2],
        frame: NormalizedFrame,
        model: UndistortionKind,
        angle_offset: f64,
        w: f64,
    },
    /// Equal spacing of two line pairs.
    ///
    /// Parameters: [dist_a1, dist_b1, dist_a2, dist_b2], each 1D.
    /// Residual: `w·((b1 − a1) − (b2 − a2))`.
    SpacingConsistency { w: f64 },
}

impl FactorKind {
    pub fn residual_dim(&self) -> usize {
        1
    }

    /// Number of parameter blocks the factor reads.
    pub fn block_count(&self) -> usize {
        match self {
            FactorKind::LinePoint { .. } => 3,
            FactorKind::SpacingConsistency { .. } => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub fixed: FixedMask,
    pub bounds: Option<Vec<Bound>>,
}

/// One residual over `params`, listed in the order the factor reads them.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub residual_dim: usize,
}

/// Named parameter blocks and the residuals over them.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_param_block(
        &mut self,
        name: impl Into<String>,
        dim: usize,
        fixed: FixedMask,
        bounds: Option<Vec<Bound>>,
    ) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            fixed,
            bounds,
        });
        id
    }

    pub fn add_residual(&mut self, params: Vec<ParamId>, factor: FactorKind, loss: RobustLoss) {
        self.residuals.push(ResidualBlock {
            residual_dim: factor.residual_dim(),
            params,
            loss,
            factor,
        });
    }

    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().position(|p| p.name == name).map(ParamId)
    }

    pub fn param(&self, id: ParamId) -> &ParamBlock {
        &self.params[id.0]
    }

    /// Check block ids, names, masks and bounds, then every residual's
    /// parameter layout.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for (idx, block) in self.params.iter().enumerate() {
            ensure!(block.id == ParamId(idx), "block {} has id {:?}", idx, block.id);
            ensure!(
                names.insert(block.name.as_str()),
                "block name {} is used twice",
                block.name
            );
            validate_block(block)?;
        }
        for (idx, residual) in self.residuals.iter().enumerate() {
            self.validate_residual(idx, residual)?;
        }
        Ok(())
    }

    fn validate_residual(&self, idx: usize, residual: &ResidualBlock) -> Result<()> {
        let factor = &residual.factor;
        ensure!(
            residual.residual_dim == factor.residual_dim(),
            "residual {} has dimension {}, its factor produces {}",
            idx,
            residual.residual_dim,
            factor.residual_dim()
        );
        ensure!(
            residual.params.len() == factor.block_count(),
            "residual {} reads {} blocks, its factor needs {}",
            idx,
            residual.params.len(),
            factor.block_count()
        );
        ensure!(
            residual.params.iter().all(|id| id.0 < self.params.len()),
            "residual {} references an unknown block",
            idx
        );
        let dims: Vec<usize> = residual.params.iter().map(|&id| self.param(id).dim).collect();

        match factor {
            FactorKind::LinePoint { model, frame, .. } => {
                ensure!(
                    dims[0] == model.param_count(),
                    "residual {}: {} needs {} undistortion values, block has {}",
                    idx,
                    model,
                    model.param_count(),
                    dims[0]
                );
                ensure!(
                    dims[1] == 1 && dims[2] == 1,
                    "residual {}: line angle and dist must be scalars",
                    idx
                );
                ensure!(
                    frame.scale > 0.0 && frame.pixel_aspect_ratio > 0.0,
                    "residual {}: frame scale and pixel aspect ratio must be positive",
                    idx
                );
            }
            FactorKind::SpacingConsistency { .. } => {
                let distinct: HashSet<ParamId> = residual.params.iter().copied().collect();
                ensure!(
                    distinct.len() == 4,
                    "residual {}: spacing constraint repeats a line",
                    idx
                );
                ensure!(
                    dims.iter().all(|&d| d == 1),
                    "residual {}: line dists must be scalars",
                    idx
                );
            }
        }
        Ok(())
    }
}

fn validate_block(block: &ParamBlock) -> Result<()> {
    ensure!(block.dim > 0, "block {} is empty", block.name);
    if let Some(idx) = block.fixed.iter().find(|&i| i >= block.dim) {
        anyhow::bail!("block {}: fixed index {} out of range", block.name, idx);
    }
    for bound in block.bounds.iter().flatten() {
        ensure!(
            bound.idx < block.dim,
            "block {}: bound index {} out of range",
            block.name,
            bound.idx
        );
        ensure!(
            bound.lower <= bound.upper,
            "block {}: bound [{}, {}] is empty",
            block.name,
            bound.lower,
            bound.upper
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> NormalizedFrame {
        NormalizedFrame {
            center: [320.0, 240.0],
            scale: 400.0,
            pixel_aspect_ratio: 1.0,
        }
    }

    #[test]
    fn validate_accepts_line_problem() {
        let mut ir = ProblemIR::new();
        let u = ir.add_param_block("undistortion", 13, FixedMask::all_fixed(13), None);
        let a = ir.add_param_block("line_angle/0", 1, FixedMask::all_free(), None);
        let d0 = ir.add_param_block("line_dist/0", 1, FixedMask::all_free(), None);
        let d1 = ir.add_param_block("line_dist/1", 1, FixedMask::all_free(), None);
        let d2 = ir.add_param_block("line_dist/2", 1, FixedMask::all_free(), None);
        let d3 = ir.add_param_block("line_dist/3", 1, FixedMask::all_free(), None);
        ir.add_residual(
            vec![u, a, d0],
            FactorKind::LinePoint {
                pixel: [1.0, 2.0],
                frame: frame(),
                model: UndistortionKind::Anamorphic4,
                angle_offset: 0.0,
                w: 1.0,
            },
            RobustLoss::None,
        );
        ir.add_residual(
            vec![d0, d1, d2, d3],
            FactorKind::SpacingConsistency { w: 1.0 },
            RobustLoss::None,
        );
        ir.validate().unwrap();
        assert_eq!(ir.param_by_name("line_dist/2"), Some(d2));
    }

    #[test]
    fn validate_rejects_repeated_spacing_params() {
        let mut ir = ProblemIR::new();
        let d0 = ir.add_param_block("d0", 1, FixedMask::all_free(), None);
        let d1 = ir.add_param_block("d1", 1, FixedMask::all_free(), None);
        let d2 = ir.add_param_block("d2", 1, FixedMask::all_free(), None);
        ir.add_residual(
            vec![d0, d1, d1, d2],
            FactorKind::SpacingConsistency { w: 1.0 },
            RobustLoss::None,
        );
        assert!(ir.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_fixed_index() {
        let mut ir = ProblemIR::new();
        ir.add_param_block("u", 2, FixedMask::fix_indices(&[2]), None);
        assert!(ir.validate().is_err());
    }
}
