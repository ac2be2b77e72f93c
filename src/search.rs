//! Divergence detection and the top-down nested search.
//!
//! The search starts at the deepest populated level, takes the most recent
//! divergence there, maps its C span to a bar window and repeats one level
//! down restricted to that window. Windows never widen and levels strictly
//! decrease along the chain.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::logging::log_search;
use crate::model::{
    BarRange, Center, Direction, Divergence, DivergenceKind, Entity, Move, MoveKind, Segment,
};
use crate::recursion::{Component, LevelFrame};

/// Finds divergences on one level.
pub trait DivergenceDetector {
    fn detect(&self, frame: &LevelFrame) -> Vec<Divergence>;
}

impl<F> DivergenceDetector for F
where
    F: Fn(&LevelFrame) -> Vec<Divergence>,
{
    fn detect(&self, frame: &LevelFrame) -> Vec<Divergence> {
        self(frame)
    }
}

/// Amplitude force: price excursion of a span times its component count.
///
/// Only settled moves are judged. An open move's C span still grows with
/// every component, so a verdict on it could flip and later flip back under
/// the same identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmplitudeDivergence;

fn span(components: &[Component], start: usize, end: usize) -> impl Iterator<Item = &Component> {
    components.iter().filter(move |c| c.index >= start && c.index <= end)
}

fn force(components: &[Component], start: usize, end: usize) -> Option<f64> {
    let (mut high, mut low, mut count) = (f64::NEG_INFINITY, f64::INFINITY, 0usize);
    for c in span(components, start, end) {
        high = high.max(c.high);
        low = low.min(c.low);
        count += 1;
    }
    (count > 0).then(|| (high - low) * count as f64)
}

impl AmplitudeDivergence {
    fn trend(&self, frame: &LevelFrame, idx: usize, m: &Move) -> Option<Divergence> {
        if m.kind != MoveKind::Trend || m.center_count < 2 || m.center_end == 0 {
            return None;
        }
        // A settled move always has a successor; its start bounds C.
        let next = frame.moves.get(idx + 1)?;
        let prev: &Center = frame.centers.get(m.center_end - 1)?;
        let last: &Center = frame.centers.get(m.center_end)?;

        let a_start = prev.end + 1;
        let a_end = last.start.saturating_sub(1).max(a_start);
        let c_start = last.end + 1;
        let c_end = next.start.saturating_sub(1).max(c_start);
        let force_a = force(&frame.components, a_start, a_end)?;
        let force_c = force(&frame.components, c_start, c_end)?;
        let extends = match m.direction {
            Direction::Up => span(&frame.components, c_start, c_end).any(|c| c.high > last.high),
            Direction::Down => span(&frame.components, c_start, c_end).any(|c| c.low < last.low),
        };
        (extends && force_c < force_a).then(|| Divergence {
            level_id: frame.level_id,
            kind: DivergenceKind::Trend,
            direction: m.direction,
            center_idx: m.center_end,
            a_start,
            a_end,
            c_start,
            c_end,
            force_a,
            force_c,
            confirmed: true,
        })
    }

    fn consolidation(&self, frame: &LevelFrame, m: &Move) -> Option<Divergence> {
        if m.kind != MoveKind::Consolidation {
            return None;
        }
        let center = frame.centers.get(m.center_start)?;
        let dir = center.break_direction?;
        let exits: Vec<&Component> = span(&frame.components, center.start + 1, center.end + 1)
            .filter(|c| c.direction == dir)
            .collect();
        let [.., first, second] = exits.as_slice() else {
            return None;
        };
        let extends = match dir {
            Direction::Up => second.high > first.high,
            Direction::Down => second.low < first.low,
        };
        let force_a = first.high - first.low;
        let force_c = second.high - second.low;
        (extends && force_c < force_a).then(|| Divergence {
            level_id: frame.level_id,
            kind: DivergenceKind::Consolidation,
            direction: dir,
            center_idx: m.center_start,
            a_start: first.index,
            a_end: first.index,
            c_start: second.index,
            c_end: second.index,
            force_a,
            force_c,
            confirmed: true,
        })
    }
}

impl DivergenceDetector for AmplitudeDivergence {
    fn detect(&self, frame: &LevelFrame) -> Vec<Divergence> {
        let mut out: Vec<Divergence> = Vec::new();
        for (idx, m) in frame.moves.iter().enumerate().filter(|(_, m)| m.settled) {
            let found = self
                .trend(frame, idx, m)
                .or_else(|| self.consolidation(frame, m));
            if let Some(d) = found {
                if !out.iter().any(|o| o.identity() == d.identity()) {
                    out.push(d);
                }
            }
        }
        out
    }
}

// =============================================================================
// Nested search
// =============================================================================

/// Everything the search needs: level-1 segments and every level's frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StackView {
    pub segments: Vec<Segment>,
    pub levels: BTreeMap<u32, LevelFrame>,
}

impl StackView {
    pub fn new(segments: Vec<Segment>, frames: impl IntoIterator<Item = LevelFrame>) -> Self {
        Self {
            segments,
            levels: frames.into_iter().map(|f| (f.level_id, f)).collect(),
        }
    }

    /// Highest level with at least one move.
    pub fn deepest_level(&self) -> Option<u32> {
        self.levels
            .iter()
            .rev()
            .find(|(_, f)| !f.moves.is_empty())
            .map(|(id, _)| *id)
    }

    /// Bar window covered by components `start..=end` of `level_id`.
    pub fn bar_range(&self, level_id: u32, start: usize, end: usize) -> Option<BarRange> {
        if level_id <= 1 {
            let first = self.segments.get(start)?;
            let last = self.segments.get(end)?;
            return Some(BarRange::new(first.bar_range.start, last.bar_range.end));
        }
        let lower = &self.levels.get(&(level_id - 1))?.moves;
        let first = lower.get(start)?;
        let last = lower.get(end)?;
        self.bar_range(level_id - 1, first.start, last.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainLink {
    pub level_id: u32,
    pub divergence: Option<Divergence>,
    pub bar_range: Option<BarRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedChain {
    pub links: Vec<ChainLink>,
}

impl NestedChain {
    pub fn levels(&self) -> Vec<u32> {
        self.links.iter().map(|l| l.level_id).collect()
    }

    /// Window of the last link that found a divergence.
    pub fn narrowest(&self) -> Option<BarRange> {
        self.links
            .iter()
            .rev()
            .find(|l| l.divergence.is_some())
            .and_then(|l| l.bar_range)
    }

    /// Whether every level down to 1 contributed a divergence.
    pub fn reaches_level_one(&self) -> bool {
        self.links
            .last()
            .map(|l| l.level_id == 1 && l.divergence.is_some())
            .unwrap_or(false)
    }
}

/// Walk from the deepest populated level down to level 1.
///
/// Returns `None` when no level holds a move. A level without a divergence
/// inside the current window contributes a `None` link and ends the chain.
pub fn nested_search<D: DivergenceDetector + ?Sized>(view: &StackView, detector: &D) -> Option<NestedChain> {
    let top = view.deepest_level()?;
    let mut links = Vec::new();
    let mut window: Option<BarRange> = None;

    for level_id in (1..=top).rev() {
        let found = view.levels.get(&level_id).and_then(|frame| {
            detector
                .detect(frame)
                .into_iter()
                .filter_map(|d| {
                    let range = view.bar_range(level_id, d.c_start, d.c_end)?;
                    window.map_or(true, |w| w.contains(&range)).then_some((d, range))
                })
                .last()
        });
        match found {
            Some((divergence, range)) => {
                window = Some(range);
                links.push(ChainLink {
                    level_id,
                    divergence: Some(divergence),
                    bar_range: Some(range),
                });
            }
            None => {
                links.push(ChainLink {
                    level_id,
                    divergence: None,
                    bar_range: window,
                });
                break;
            }
        }
    }

    let chain = NestedChain { links };
    log_search(top, chain.links.len(), chain.narrowest().map(|r| (r.start, r.end)));
    Some(chain)
}
