//! Lifecycle events.

use serde::{Deserialize, Serialize};

use super::entity::{
    BuySellPoint, Center, Divergence, Entity, Layer, Move, Segment, Stroke, Timestamp,
};

/// One lifecycle transition of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum Change<E> {
    /// New identity.
    Candidate(E),
    /// Known identity whose fields changed without advancing its stage.
    Revise(E),
    Confirm(E),
    Settle(E),
    /// Identity disappeared. Terminal.
    Invalidate(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Candidate,
    Revise,
    Confirm,
    Settle,
    Invalidate,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Candidate => "candidate",
            ChangeKind::Revise => "revise",
            ChangeKind::Confirm => "confirm",
            ChangeKind::Settle => "settle",
            ChangeKind::Invalidate => "invalidate",
        }
    }
}

impl<E> Change<E> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Candidate(_) => ChangeKind::Candidate,
            Change::Revise(_) => ChangeKind::Revise,
            Change::Confirm(_) => ChangeKind::Confirm,
            Change::Settle(_) => ChangeKind::Settle,
            Change::Invalidate(_) => ChangeKind::Invalidate,
        }
    }

    pub fn entity(&self) -> &E {
        match self {
            Change::Candidate(e)
            | Change::Revise(e)
            | Change::Confirm(e)
            | Change::Settle(e)
            | Change::Invalidate(e) => e,
        }
    }

    pub fn into_entity(self) -> E {
        match self {
            Change::Candidate(e)
            | Change::Revise(e)
            | Change::Confirm(e)
            | Change::Settle(e)
            | Change::Invalidate(e) => e,
        }
    }

    pub fn is_invalidate(&self) -> bool {
        matches!(self, Change::Invalidate(_))
    }
}

/// Closed set of per-layer changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", content = "change", rename_all = "snake_case")]
pub enum LayerEvent {
    Stroke(Change<Stroke>),
    Segment(Change<Segment>),
    Center(Change<Center>),
    Move(Change<Move>),
    Divergence(Change<Divergence>),
    BuySellPoint(Change<BuySellPoint>),
}

impl LayerEvent {
    pub fn layer(&self) -> Layer {
        match self {
            LayerEvent::Stroke(_) => Layer::Stroke,
            LayerEvent::Segment(_) => Layer::Segment,
            LayerEvent::Center(_) => Layer::Center,
            LayerEvent::Move(_) => Layer::Move,
            LayerEvent::Divergence(_) => Layer::Divergence,
            LayerEvent::BuySellPoint(_) => Layer::BuySellPoint,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            LayerEvent::Stroke(c) => c.kind(),
            LayerEvent::Segment(c) => c.kind(),
            LayerEvent::Center(c) => c.kind(),
            LayerEvent::Move(c) => c.kind(),
            LayerEvent::Divergence(c) => c.kind(),
            LayerEvent::BuySellPoint(c) => c.kind(),
        }
    }

    /// Qualified kind such as `center.settle`.
    pub fn event_kind(&self) -> String {
        format!("{}.{}", self.layer().as_str(), self.kind().as_str())
    }

    pub fn level_id(&self) -> u32 {
        match self {
            LayerEvent::Stroke(c) => c.entity().level_id(),
            LayerEvent::Segment(c) => c.entity().level_id(),
            LayerEvent::Center(c) => c.entity().level_id(),
            LayerEvent::Move(c) => c.entity().level_id(),
            LayerEvent::Divergence(c) => c.entity().level_id(),
            LayerEvent::BuySellPoint(c) => c.entity().level_id(),
        }
    }
}

/// Envelope carried on the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub bar_index: u64,
    pub bar_ts: Timestamp,
    pub seq: u64,
    pub fingerprint: String,
    pub level_id: u32,
    pub event: LayerEvent,
}

impl DomainEvent {
    pub fn kind(&self) -> ChangeKind {
        self.event.kind()
    }

    pub fn layer(&self) -> Layer {
        self.event.layer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;

    fn stroke() -> Stroke {
        Stroke {
            start: 3,
            end: 8,
            direction: Direction::Up,
            high: 12.0,
            low: 9.0,
            settled: true,
        }
    }

    #[test]
    fn test_event_kind_is_layer_qualified() {
        let ev = LayerEvent::Stroke(Change::Settle(stroke()));
        assert_eq!(ev.event_kind(), "stroke.settle");
        assert_eq!(ev.level_id(), 1);
    }

    #[test]
    fn test_serialized_shape() {
        let ev = LayerEvent::Stroke(Change::Candidate(stroke()));
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["layer"], "stroke");
        assert_eq!(v["change"]["kind"], "candidate");
        assert_eq!(v["change"]["entity"]["start"], 3);
        assert_eq!(v["change"]["entity"]["direction"], "up");

        let back: LayerEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back, ev);
    }
}
