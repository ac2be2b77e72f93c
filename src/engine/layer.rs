//! Stateful wrapper around one layer's recompute function.

use anyhow::Result;
use serde::Serialize;

use crate::diff::diff;
use crate::fingerprint::event_fingerprint;
use crate::model::{DomainEvent, Entity, Timestamp};

/// Pure function from a lower layer's entities to this layer's entities.
///
/// Implemented for every `Fn(&In) -> Vec<E>`, so plain closures plug in.
pub trait Recompute<In: ?Sized, E> {
    fn recompute(&self, input: &In) -> Vec<E>;
}

impl<In: ?Sized, E, F> Recompute<In, E> for F
where
    F: Fn(&In) -> Vec<E>,
{
    fn recompute(&self, input: &In) -> Vec<E> {
        self(input)
    }
}

/// Result of one engine step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<E> {
    pub bar_index: u64,
    pub bar_ts: Timestamp,
    pub level_id: u32,
    pub entities: Vec<E>,
    pub events: Vec<DomainEvent>,
}

impl<E: Entity> Snapshot<E> {
    pub fn empty(level_id: u32) -> Self {
        Self {
            bar_index: 0,
            bar_ts: 0,
            level_id,
            entities: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn settled(&self) -> impl Iterator<Item = &E> {
        self.entities
            .iter()
            .filter(|e| e.lifecycle() == crate::model::Lifecycle::Settled)
    }
}

/// Owns a layer's current entities and its event sequence counter.
#[derive(Debug, Clone)]
pub struct LayerEngine<E> {
    level_id: u32,
    current: Vec<E>,
    sequence: u64,
}

impl<E: Entity> LayerEngine<E> {
    pub fn new(level_id: u32) -> Self {
        Self {
            level_id,
            current: Vec::new(),
            sequence: 0,
        }
    }

    /// Recompute from `input`, diff against the current list and replace it.
    pub fn process<In, R>(
        &mut self,
        recompute: &R,
        input: &In,
        bar_index: u64,
        bar_ts: Timestamp,
    ) -> Result<Snapshot<E>>
    where
        In: ?Sized,
        R: Recompute<In, E> + ?Sized,
    {
        let next = recompute.recompute(input);
        self.commit(next, bar_index, bar_ts)
    }

    /// Same as [`process`](Self::process), taking bar position from the lower snapshot.
    pub fn process_snapshot<L, R>(&mut self, recompute: &R, lower: &Snapshot<L>) -> Result<Snapshot<E>>
    where
        R: Recompute<[L], E> + ?Sized,
    {
        let next = recompute.recompute(&lower.entities);
        self.commit(next, lower.bar_index, lower.bar_ts)
    }

    /// Replace the current list with an already recomputed one.
    ///
    /// On error the engine keeps its previous list and sequence.
    pub fn commit(&mut self, next: Vec<E>, bar_index: u64, bar_ts: Timestamp) -> Result<Snapshot<E>> {
        let changes = diff(&self.current, &next);
        let mut events = Vec::with_capacity(changes.len());
        for change in changes {
            let event = E::into_event(change);
            let seq = self.sequence + events.len() as u64;
            let kind = event.event_kind();
            let fingerprint = event_fingerprint(bar_index, bar_ts, &kind, seq, &event)?;
            events.push(DomainEvent {
                bar_index,
                bar_ts,
                seq,
                fingerprint,
                level_id: self.level_id,
                event,
            });
        }
        self.sequence += events.len() as u64;
        self.current = next;
        Ok(Snapshot {
            bar_index,
            bar_ts,
            level_id: self.level_id,
            entities: self.current.clone(),
            events,
        })
    }

    pub fn current(&self) -> &[E] {
        &self.current
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    pub fn reset(&mut self) {
        self.current.clear();
        self.sequence = 0;
    }
}
