//! Entity and event model shared by every layer.

pub mod entity;
pub mod event;

pub use entity::{
    Bar, BarRange, BspKey, BspKind, BuySellPoint, Center, CenterKey, Direction, Divergence,
    DivergenceKey, DivergenceKind, Entity, Layer, Lifecycle, Move, MoveKey, MoveKind, PriceKey,
    Segment, Side, Stroke, Timestamp,
};
pub use event::{Change, ChangeKind, DomainEvent, LayerEvent};
