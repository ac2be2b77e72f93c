use anyhow::Result;
use serde::Serialize;

use super::compose::{components_from_moves, CenterRule, Component, MoveRule};
use crate::engine::layer::{LayerEngine, Snapshot};
use crate::model::{Center, DomainEvent, Move, Timestamp};

/// Read-only state of one level, as seen by detectors and the nested search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelFrame {
    pub level_id: u32,
    pub components: Vec<Component>,
    pub centers: Vec<Center>,
    pub moves: Vec<Move>,
}

impl LevelFrame {
    pub fn settled_moves(&self) -> usize {
        self.moves.iter().filter(|m| m.settled).count()
    }
}

/// Output of one level for one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSnapshot {
    pub level_id: u32,
    pub bar_index: u64,
    pub bar_ts: Timestamp,
    pub components: Vec<Component>,
    pub centers: Snapshot<Center>,
    pub moves: Snapshot<Move>,
}

impl LevelSnapshot {
    pub fn settled_moves(&self) -> usize {
        self.moves.entities.iter().filter(|m| m.settled).count()
    }

    /// Center events followed by move events.
    pub fn events(&self) -> impl Iterator<Item = &DomainEvent> {
        self.centers.events.iter().chain(self.moves.events.iter())
    }

    pub fn has_events(&self) -> bool {
        !self.centers.events.is_empty() || !self.moves.events.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.entities.is_empty() && self.moves.entities.is_empty()
    }

    pub fn frame(&self) -> LevelFrame {
        LevelFrame {
            level_id: self.level_id,
            components: self.components.clone(),
            centers: self.centers.entities.clone(),
            moves: self.moves.entities.clone(),
        }
    }
}

/// Center and Move engines for one level.
#[derive(Debug, Clone)]
pub struct RecursiveLevelEngine {
    level_id: u32,
    components: Vec<Component>,
    centers: LayerEngine<Center>,
    moves: LayerEngine<Move>,
}

impl RecursiveLevelEngine {
    pub fn new(level_id: u32) -> Self {
        Self {
            level_id,
            components: Vec::new(),
            centers: LayerEngine::new(level_id),
            moves: LayerEngine::new(level_id),
        }
    }

    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    /// Build this level from the moves of the level below.
    pub fn process(&mut self, lower_moves: &[Move], bar_index: u64, bar_ts: Timestamp) -> Result<LevelSnapshot> {
        self.process_components(components_from_moves(lower_moves), bar_index, bar_ts)
    }

    pub fn process_components(
        &mut self,
        components: Vec<Component>,
        bar_index: u64,
        bar_ts: Timestamp,
    ) -> Result<LevelSnapshot> {
        let level_id = self.level_id;
        let centers = self
            .centers
            .process(&CenterRule { level_id }, components.as_slice(), bar_index, bar_ts)?;
        let moves = self.moves.process_snapshot(&MoveRule { level_id }, &centers)?;
        self.components = components;
        Ok(LevelSnapshot {
            level_id,
            bar_index,
            bar_ts,
            components: self.components.clone(),
            centers,
            moves,
        })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn centers(&self) -> &[Center] {
        self.centers.current()
    }

    pub fn moves(&self) -> &[Move] {
        self.moves.current()
    }

    pub fn has_entities(&self) -> bool {
        !self.centers.current().is_empty() || !self.moves.current().is_empty()
    }

    pub fn frame(&self) -> LevelFrame {
        LevelFrame {
            level_id: self.level_id,
            components: self.components.clone(),
            centers: self.centers().to_vec(),
            moves: self.moves().to_vec(),
        }
    }

    pub fn reset(&mut self) {
        self.components.clear();
        self.centers.reset();
        self.moves.reset();
    }
}
