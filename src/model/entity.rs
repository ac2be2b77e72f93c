//! Immutable entity records for every layer.
//!
//! Each entity names itself through an identity key: the minimal field subset
//! that stays fixed while the entity is revised. Full equality (`PartialEq`)
//! covers every field and is only used to detect "nothing changed".

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

use super::event::{Change, LayerEvent};

/// Timestamp in milliseconds
pub type Timestamp = u64;

// =============================================================================
// Shared vocabulary
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Lifecycle stage carried by an entity. Retraction is not a stage: it is the
/// terminal `Invalidate` event emitted when the identity disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Candidate,
    Confirmed,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Stroke,
    Segment,
    Center,
    Move,
    Divergence,
    BuySellPoint,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Stroke => "stroke",
            Layer::Segment => "segment",
            Layer::Center => "center",
            Layer::Move => "move",
            Layer::Divergence => "divergence",
            Layer::BuySellPoint => "bsp",
        }
    }
}

/// Inclusive bar-index window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarRange {
    pub start: usize,
    pub end: usize,
}

impl BarRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, other: &BarRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Price usable inside a hashed identity key.
///
/// Stores the IEEE bit pattern with `-0.0` folded onto `0.0`, so two prices
/// compare equal exactly when the recompute produced the same float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceKey(u64);

impl PriceKey {
    pub fn new(price: f64) -> Self {
        if price == 0.0 {
            PriceKey(0.0f64.to_bits())
        } else {
            PriceKey(price.to_bits())
        }
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Behaviour shared by every layer's entity type.
pub trait Entity: Clone + PartialEq + Debug + Serialize {
    type Key: Clone + Eq + Hash + Debug;

    const LAYER: Layer;
    /// Whether the layer passes through `Confirmed` between candidate and settled.
    const CONFIRM_STAGE: bool = false;

    fn identity(&self) -> Self::Key;
    fn lifecycle(&self) -> Lifecycle;
    fn level_id(&self) -> u32;
    fn into_event(change: Change<Self>) -> LayerEvent;
}

// =============================================================================
// Bars
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(ts: Timestamp, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { ts, open, high, low, close }
    }
}

// =============================================================================
// Level-1 layers
// =============================================================================

/// Swing between two opposite pivots, in bar indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub start: usize,
    pub end: usize,
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
    pub settled: bool,
}

impl Entity for Stroke {
    type Key = (usize, Direction);
    const LAYER: Layer = Layer::Stroke;

    fn identity(&self) -> Self::Key {
        (self.start, self.direction)
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.settled {
            Lifecycle::Settled
        } else {
            Lifecycle::Candidate
        }
    }

    fn level_id(&self) -> u32 {
        1
    }

    fn into_event(change: Change<Self>) -> LayerEvent {
        LayerEvent::Stroke(change)
    }
}

/// Run of strokes, in stroke indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
    pub bar_range: BarRange,
    /// Stroke index that broke the segment, once settled.
    pub break_at: Option<usize>,
    /// Break happened across a price gap.
    pub gap: bool,
    /// A gap break was confirmed by a fractal in the following sequence.
    pub second_fractal: bool,
    pub settled: bool,
}

impl Entity for Segment {
    type Key = (usize, Direction);
    const LAYER: Layer = Layer::Segment;

    fn identity(&self) -> Self::Key {
        (self.start, self.direction)
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.settled {
            Lifecycle::Settled
        } else {
            Lifecycle::Candidate
        }
    }

    fn level_id(&self) -> u32 {
        1
    }

    fn into_event(change: Change<Self>) -> LayerEvent {
        LayerEvent::Segment(change)
    }
}

// =============================================================================
// Composed layers (every level)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CenterKey {
    pub floor: PriceKey,
    pub ceiling: PriceKey,
    pub start: usize,
    pub level_id: u32,
}

/// Overlap zone of at least three consecutive components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub level_id: u32,
    /// Highest component low of the opening triple.
    pub floor: f64,
    /// Lowest component high of the opening triple.
    pub ceiling: f64,
    pub start: usize,
    pub end: usize,
    pub count: usize,
    /// Full excursion of all member components.
    pub high: f64,
    pub low: f64,
    pub settled: bool,
    pub break_index: Option<usize>,
    pub break_direction: Option<Direction>,
}

impl Entity for Center {
    type Key = CenterKey;
    const LAYER: Layer = Layer::Center;

    fn identity(&self) -> Self::Key {
        CenterKey {
            floor: PriceKey::new(self.floor),
            ceiling: PriceKey::new(self.ceiling),
            start: self.start,
            level_id: self.level_id,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.settled {
            Lifecycle::Settled
        } else {
            Lifecycle::Candidate
        }
    }

    fn level_id(&self) -> u32 {
        self.level_id
    }

    fn into_event(change: Change<Self>) -> LayerEvent {
        LayerEvent::Center(change)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Trend,
    Consolidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveKey {
    pub start: usize,
    pub level_id: u32,
}

/// Group of settled centers; `start`/`end` are component indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub level_id: u32,
    pub kind: MoveKind,
    pub direction: Direction,
    pub start: usize,
    pub end: usize,
    pub center_start: usize,
    pub center_end: usize,
    pub center_count: usize,
    pub high: f64,
    pub low: f64,
    pub settled: bool,
}

impl Entity for Move {
    type Key = MoveKey;
    const LAYER: Layer = Layer::Move;

    fn identity(&self) -> Self::Key {
        MoveKey {
            start: self.start,
            level_id: self.level_id,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.settled {
            Lifecycle::Settled
        } else {
            Lifecycle::Candidate
        }
    }

    fn level_id(&self) -> u32 {
        self.level_id
    }

    fn into_event(change: Change<Self>) -> LayerEvent {
        LayerEvent::Move(change)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    Trend,
    Consolidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DivergenceKey {
    pub kind: DivergenceKind,
    pub direction: Direction,
    pub center_idx: usize,
    pub a_start: usize,
    pub level_id: u32,
}

/// Force comparison between an earlier span A and a later span C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub level_id: u32,
    pub kind: DivergenceKind,
    pub direction: Direction,
    pub center_idx: usize,
    pub a_start: usize,
    pub a_end: usize,
    pub c_start: usize,
    pub c_end: usize,
    pub force_a: f64,
    pub force_c: f64,
    pub confirmed: bool,
}

impl Entity for Divergence {
    type Key = DivergenceKey;
    const LAYER: Layer = Layer::Divergence;
    const CONFIRM_STAGE: bool = true;

    fn identity(&self) -> Self::Key {
        DivergenceKey {
            kind: self.kind,
            direction: self.direction,
            center_idx: self.center_idx,
            a_start: self.a_start,
            level_id: self.level_id,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.confirmed {
            Lifecycle::Confirmed
        } else {
            Lifecycle::Candidate
        }
    }

    fn level_id(&self) -> u32 {
        self.level_id
    }

    fn into_event(change: Change<Self>) -> LayerEvent {
        LayerEvent::Divergence(change)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BspKind {
    Type1,
    Type2,
    Type3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BspKey {
    pub anchor: usize,
    pub kind: BspKind,
    pub side: Side,
    pub level_id: u32,
}

/// Buy/sell point anchored at a component index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuySellPoint {
    pub level_id: u32,
    pub kind: BspKind,
    pub side: Side,
    pub anchor: usize,
    pub price: f64,
    pub divergence_key: Option<DivergenceKey>,
    pub confirmed: bool,
    pub settled: bool,
}

impl Entity for BuySellPoint {
    type Key = BspKey;
    const LAYER: Layer = Layer::BuySellPoint;
    const CONFIRM_STAGE: bool = true;

    fn identity(&self) -> Self::Key {
        BspKey {
            anchor: self.anchor,
            kind: self.kind,
            side: self.side,
            level_id: self.level_id,
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        if self.settled {
            Lifecycle::Settled
        } else if self.confirmed {
            Lifecycle::Confirmed
        } else {
            Lifecycle::Candidate
        }
    }

    fn level_id(&self) -> u32 {
        self.level_id
    }

    fn into_event(change: Change<Self>) -> LayerEvent {
        LayerEvent::BuySellPoint(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_key_folds_negative_zero() {
        assert_eq!(PriceKey::new(0.0), PriceKey::new(-0.0));
        assert_ne!(PriceKey::new(7.0), PriceKey::new(7.000001));
        assert_eq!(PriceKey::new(10.5).value(), 10.5);
    }

    #[test]
    fn test_center_identity_ignores_extension() {
        let c = Center {
            level_id: 1,
            floor: 7.0,
            ceiling: 10.0,
            start: 0,
            end: 2,
            count: 3,
            high: 12.0,
            low: 5.0,
            settled: false,
            break_index: None,
            break_direction: None,
        };
        let extended = Center {
            end: 4,
            count: 5,
            settled: true,
            break_index: Some(5),
            break_direction: Some(Direction::Up),
            ..c.clone()
        };
        assert_eq!(c.identity(), extended.identity());
        assert_ne!(c, extended);
        assert!(c.lifecycle() < extended.lifecycle());
    }

    #[test]
    fn test_bar_range_containment() {
        let outer = BarRange::new(10, 50);
        assert!(outer.contains(&BarRange::new(10, 50)));
        assert!(outer.contains(&BarRange::new(20, 30)));
        assert!(!outer.contains(&BarRange::new(5, 30)));
        assert!(!outer.contains(&BarRange::new(20, 51)));
        assert_eq!(BarRange::new(3, 5).len(), 3);
    }

    #[test]
    fn test_bsp_lifecycle_order() {
        let mut p = BuySellPoint {
            level_id: 1,
            kind: BspKind::Type1,
            side: Side::Buy,
            anchor: 4,
            price: 9.0,
            divergence_key: None,
            confirmed: false,
            settled: false,
        };
        assert_eq!(p.lifecycle(), Lifecycle::Candidate);
        p.confirmed = true;
        assert_eq!(p.lifecycle(), Lifecycle::Confirmed);
        p.settled = true;
        assert_eq!(p.lifecycle(), Lifecycle::Settled);
    }
}
