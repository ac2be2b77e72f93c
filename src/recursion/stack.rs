use std::collections::BTreeMap;

use anyhow::Result;

use super::level::{LevelFrame, LevelSnapshot, RecursiveLevelEngine};
use crate::config::{DEFAULT_MAX_LEVELS, MIN_MAX_LEVELS};
use crate::logging::log_level_change;
use crate::model::{Move, Timestamp};

/// Settled moves a level needs before the level above it is attempted.
pub const MIN_COMPONENTS: usize = 3;

/// Drives levels 2..=max_levels from level-1 moves.
#[derive(Debug, Clone)]
pub struct RecursiveStack {
    max_levels: u32,
    engines: BTreeMap<u32, RecursiveLevelEngine>,
}

impl Default for RecursiveStack {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVELS)
    }
}

impl RecursiveStack {
    pub fn new(max_levels: u32) -> Self {
        Self {
            max_levels: max_levels.max(MIN_MAX_LEVELS),
            engines: BTreeMap::new(),
        }
    }

    pub fn max_levels(&self) -> u32 {
        self.max_levels
    }

    /// Run every live level for one bar.
    ///
    /// Level 2 always runs. Level k+1 runs only while level k has at least
    /// [`MIN_COMPONENTS`] settled moves. Engines above that point that still
    /// hold entities are fed an empty input so their entities retract; their
    /// snapshots are returned only when they emitted events.
    pub fn process(
        &mut self,
        level1_moves: &[Move],
        bar_index: u64,
        bar_ts: Timestamp,
    ) -> Result<Vec<LevelSnapshot>> {
        let mut out = Vec::new();
        let mut lower: Vec<Move> = level1_moves.to_vec();
        let mut live = true;

        for level_id in 2..=self.max_levels {
            if live {
                let engine = self.engines.entry(level_id).or_insert_with(|| {
                    log_level_change("level_opened", level_id, bar_index, 0);
                    RecursiveLevelEngine::new(level_id)
                });
                let snap = engine.process(&lower, bar_index, bar_ts)?;
                let settled = snap.settled_moves();
                live = settled >= MIN_COMPONENTS;
                lower = snap.moves.entities.clone();
                out.push(snap);
            } else if let Some(engine) = self.engines.get_mut(&level_id) {
                if engine.has_entities() {
                    let snap = engine.process(&[], bar_index, bar_ts)?;
                    log_level_change("level_drained", level_id, bar_index, 0);
                    if snap.has_events() {
                        out.push(snap);
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn level(&self, level_id: u32) -> Option<&RecursiveLevelEngine> {
        self.engines.get(&level_id)
    }

    /// Highest level currently holding at least one move.
    pub fn depth(&self) -> u32 {
        self.engines
            .iter()
            .rev()
            .find(|(_, e)| !e.moves().is_empty())
            .map(|(id, _)| *id)
            .unwrap_or(1)
    }

    pub fn frames(&self) -> Vec<LevelFrame> {
        self.engines.values().map(RecursiveLevelEngine::frame).collect()
    }

    pub fn reset_level(&mut self, level_id: u32) {
        if let Some(engine) = self.engines.get_mut(&level_id) {
            engine.reset();
        }
    }

    pub fn reset(&mut self) {
        self.engines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, MoveKind};

    fn mv(start: usize, low: f64, high: f64, settled: bool) -> Move {
        Move {
            level_id: 1,
            kind: MoveKind::Consolidation,
            direction: if start % 2 == 0 { Direction::Up } else { Direction::Down },
            start,
            end: start,
            center_start: start,
            center_end: start,
            center_count: 1,
            high,
            low,
            settled,
        }
    }

    #[test]
    fn test_too_few_components_stop_at_level_two() {
        let mut stack = RecursiveStack::new(6);
        let moves = vec![mv(0, 5.0, 12.0, true), mv(1, 7.0, 11.0, true), mv(2, 6.0, 10.0, false)];
        let out = stack.process(&moves, 0, 0).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].level_id, 2);
        assert!(out[0].is_empty());
        assert!(stack.level(3).is_none());
    }

    #[test]
    fn test_max_levels_floor_is_two() {
        let stack = RecursiveStack::new(1);
        assert_eq!(stack.max_levels(), 2);
    }

    #[test]
    fn test_reset_level_is_independent() {
        let mut stack = RecursiveStack::new(4);
        let moves = vec![
            mv(0, 5.0, 12.0, true),
            mv(1, 7.0, 11.0, true),
            mv(2, 6.0, 10.0, true),
            mv(3, 14.0, 18.0, false),
        ];
        stack.process(&moves, 0, 0).unwrap();
        assert!(stack.level(2).map(|e| e.has_entities()).unwrap_or(false));
        stack.reset_level(2);
        assert!(!stack.level(2).map(|e| e.has_entities()).unwrap_or(true));
        stack.reset();
        assert!(stack.level(2).is_none());
    }
}
