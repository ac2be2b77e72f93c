//! Self-similar Center+Move composition over arbitrary depth.
//!
//! Level 1 composes segments; level k composes the settled moves of level
//! k-1. The same [`RecursiveLevelEngine`] runs at every level, and
//! [`RecursiveStack`] decides how many levels are alive.

pub mod compose;
pub mod level;
pub mod stack;

pub use compose::{Component, CenterRule, MoveRule};
pub use level::{LevelFrame, LevelSnapshot, RecursiveLevelEngine};
pub use stack::{RecursiveStack, MIN_COMPONENTS};
