//! Layer engines and the per-bar pipeline.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ lower layer  │────►│  recompute   │────►│     diff     │
//! │  snapshot    │     │  (pure fn)   │     │ (by identity)│
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                                                  ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │   Snapshot   │◄────│ fingerprint  │
//!                      │ (entities +  │     │  + sequence  │
//!                      │   events)    │     │              │
//!                      └──────────────┘     └──────────────┘
//! ```

pub mod layer;
pub mod pipeline;
pub mod replay;
