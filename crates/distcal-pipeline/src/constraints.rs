//! Spacing constraints and per-intrinsic line aggregation.

use distcal_core::{CheckerDetection, LinePair, LineWithPoints, SizeConstraint};
use serde::{Deserialize, Serialize};

use crate::lines::{FamilyRole, LineFamilyGenerator};

/// Filter applied to candidate spacing constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingCheck {
    /// Emit every row-pair × column-pair combination.
    #[default]
    KeepAll,
    /// Drop combinations whose grid-step differences disagree, which happens
    /// when a short line was dropped between two kept ones.
    RequireMatchingSteps,
}

/// Which lines share one angle group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupScope {
    /// Every row and column line of the intrinsic shares group 0, so all
    /// boards are held to one orientation.
    #[default]
    Intrinsic,
    /// Every board of every view gets its own group.
    Board,
}

/// Pairs of consecutive entries: `[a, b, c]` gives `[(a, b), (b, c)]`.
pub fn consecutive_pairs(indices: &[usize]) -> Vec<LinePair> {
    indices.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Constraints between every consecutive row-line pair and every consecutive
/// column-line pair. `rows` and `cols` index into `lines`.
///
/// With [`SpacingCheck::KeepAll`] this yields `(|rows|−1)·(|cols|−1)`
/// constraints.
pub fn size_constraints(
    rows: &[usize],
    cols: &[usize],
    lines: &[LineWithPoints],
    check: SpacingCheck,
) -> Vec<SizeConstraint> {
    let row_pairs = consecutive_pairs(rows);
    let col_pairs = consecutive_pairs(cols);
    let step_gap = |(a, b): LinePair| lines[b].step - lines[a].step;

    let mut constraints = Vec::with_capacity(row_pairs.len() * col_pairs.len());
    for &first in &row_pairs {
        for &second in &col_pairs {
            if check == SpacingCheck::RequireMatchingSteps
                && (step_gap(first) - step_gap(second)).abs() > 1e-9
            {
                continue;
            }
            constraints.push(SizeConstraint::new(first, second));
        }
    }
    constraints
}

/// Lines and constraints of one intrinsic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSet {
    pub lines: Vec<LineWithPoints>,
    pub constraints: Vec<SizeConstraint>,
}

/// What a detection contributed to a [`LineSetBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewContribution {
    Added { lines: usize, constraints: usize },
    /// Fewer than two lines; nothing was kept.
    Skipped { lines: usize },
}

/// Accumulates lines and constraints across the views of one intrinsic.
///
/// Lines are appended to one combined array and constraints are built from
/// the indices returned at insertion, so constraints from every view address
/// the combined array directly. Group ids follow the [`GroupScope`].
#[derive(Debug, Clone, Default)]
pub struct LineSetBuilder {
    set: LineSet,
    next_group: usize,
    spacing_check: SpacingCheck,
    group_scope: GroupScope,
}

impl LineSetBuilder {
    pub fn new(spacing_check: SpacingCheck) -> Self {
        Self {
            spacing_check,
            ..Self::default()
        }
    }

    pub fn with_group_scope(mut self, group_scope: GroupScope) -> Self {
        self.group_scope = group_scope;
        self
    }

    fn push_line(&mut self, line: LineWithPoints) -> usize {
        self.set.lines.push(line);
        self.set.lines.len() - 1
    }

    /// Add all boards of one view's detection.
    pub fn add_detection<G: LineFamilyGenerator + ?Sized>(
        &mut self,
        detection: &CheckerDetection,
        generator: &G,
    ) -> ViewContribution {
        let line_mark = self.set.lines.len();
        let constraint_mark = self.set.constraints.len();
        let group_mark = self.next_group;

        for board in &detection.boards {
            let group = match self.group_scope {
                GroupScope::Intrinsic => 0,
                GroupScope::Board => {
                    self.next_group += 1;
                    self.next_group - 1
                }
            };

            let mut rows = Vec::new();
            let mut cols = Vec::new();
            for family in generator.families(board, &detection.corners) {
                for mut line in family.lines {
                    line.group_id = group;
                    let idx = self.push_line(line);
                    match family.role {
                        FamilyRole::Horizontal => rows.push(idx),
                        FamilyRole::Vertical => cols.push(idx),
                        FamilyRole::Diagonal => {}
                    }
                }
            }
            let constraints = size_constraints(&rows, &cols, &self.set.lines, self.spacing_check);
            self.set.constraints.extend(constraints);
        }

        let added = self.set.lines.len() - line_mark;
        if added < 2 {
            self.set.lines.truncate(line_mark);
            self.set.constraints.truncate(constraint_mark);
            self.next_group = group_mark;
            return ViewContribution::Skipped { lines: added };
        }
        ViewContribution::Added {
            lines: added,
            constraints: self.set.constraints.len() - constraint_mark,
        }
    }

    pub fn line_count(&self) -> usize {
        self.set.lines.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.set.constraints.len()
    }

    pub fn finish(self) -> LineSet {
        self.set
    }
}
