//! Event-sourced, multi-level pattern ledger.
//!
//! Bars flow through a chain of layer engines. Every layer is recomputed in
//! full from the layer below and then diffed by identity against the previous
//! recomputation, so consumers only ever see lifecycle events:
//!
//! ```text
//! bars ─► strokes ─► segments ─► centers ─► moves ─┬─► divergences
//!                                   ▲              └─► buy/sell points
//!                                   │
//!                      settled moves of level k-1 (levels 2..=max_levels)
//! ```
//!
//! The event stream is audited by per-layer checkers and carries a
//! deterministic fingerprint per event so that replays can be verified.

pub mod audit;
pub mod config;
pub mod diff;
pub mod engine;
pub mod fingerprint;
pub mod logging;
pub mod model;
pub mod recursion;
pub mod rules;
pub mod search;

pub use config::{InvariantMode, StackConfig};
pub use diff::{diff, diff_by_identity};
pub use engine::layer::{LayerEngine, Recompute, Snapshot};
pub use engine::pipeline::{LayerRules, Pipeline, PipelineSnapshot};
pub use engine::replay::{ReplayMode, ReplaySession, ReplayStatus};
pub use model::{
    Bar, BarRange, BuySellPoint, Center, Change, ChangeKind, Direction, Divergence, DomainEvent,
    Entity, Layer, LayerEvent, Lifecycle, Move, Segment, Stroke, Timestamp,
};
