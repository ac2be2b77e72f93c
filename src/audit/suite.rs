use std::collections::BTreeMap;

use super::{
    BuySellPointChecker, CenterChecker, Checker, DivergenceChecker, MoveChecker, SegmentChecker,
    StrokeChecker, Violation,
};
use crate::engine::layer::Snapshot;
use crate::model::{BuySellPoint, Divergence, Segment, Stroke};
use crate::recursion::LevelSnapshot;

/// One checker per layer, with center and move checkers per level.
#[derive(Debug, Clone, Default)]
pub struct AuditSuite {
    strokes: StrokeChecker,
    segments: SegmentChecker,
    divergences: DivergenceChecker,
    points: BuySellPointChecker,
    levels: BTreeMap<u32, (CenterChecker, MoveChecker)>,
}

impl AuditSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_strokes(&mut self, snap: &Snapshot<Stroke>) -> Vec<Violation> {
        self.strokes.check(&snap.events, snap.bar_index, snap.bar_ts)
    }

    pub fn check_segments(&mut self, snap: &Snapshot<Segment>) -> Vec<Violation> {
        self.segments.check(&snap.events, snap.bar_index, snap.bar_ts)
    }

    pub fn check_level(&mut self, level: &LevelSnapshot) -> Vec<Violation> {
        let level_id = level.level_id;
        let (centers, moves) = self
            .levels
            .entry(level_id)
            .or_insert_with(|| (CenterChecker::new(level_id), MoveChecker::new(level_id)));
        // Component indices point into the lower layer's list.
        let component_count = level.components.last().map(|c| c.index + 1).unwrap_or(0);
        centers.set_component_count(component_count);
        moves.set_context(component_count, level.centers.entities.len());

        let mut out = centers.check(&level.centers.events, level.bar_index, level.bar_ts);
        out.extend(moves.check(&level.moves.events, level.bar_index, level.bar_ts));
        out
    }

    pub fn check_divergences(&mut self, snap: &Snapshot<Divergence>) -> Vec<Violation> {
        self.divergences.check(&snap.events, snap.bar_index, snap.bar_ts)
    }

    pub fn check_points(&mut self, snap: &Snapshot<BuySellPoint>) -> Vec<Violation> {
        self.points.check(&snap.events, snap.bar_index, snap.bar_ts)
    }

    pub fn reset(&mut self) {
        self.strokes.reset();
        self.segments.reset();
        self.divergences.reset();
        self.points.reset();
        self.levels.clear();
    }
}
