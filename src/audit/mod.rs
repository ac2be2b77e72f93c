//! Invariant checkers over the emitted event stream.
//!
//! Checkers are observational: they consume one batch of events per bar and
//! return [`Violation`] records. They never fail and never stop the pipeline;
//! escalation is a pipeline decision (see [`crate::config::InvariantMode`]).
//!
//! Rule families:
//! - ordering: a transition needs its prerequisite stage, seen earlier
//! - terminal: nothing may reference an invalidated identity
//! - structural: layer-specific shape constraints
//! - determinism: replay reproduces fingerprints, verified by tests only

pub mod center;
pub mod divergence;
pub mod lifecycle;
pub mod moves;
pub mod point;
pub mod segment;
pub mod stroke;
pub mod suite;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::fingerprint::value_fingerprint;
use crate::model::{DomainEvent, Layer, Timestamp};

pub use center::CenterChecker;
pub use divergence::DivergenceChecker;
pub use lifecycle::{Finding, LifecycleAudit};
pub use moves::MoveChecker;
pub use point::BuySellPointChecker;
pub use segment::SegmentChecker;
pub use stroke::StrokeChecker;
pub use suite::AuditSuite;

/// Named invariant rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleCode {
    I1,
    I2,
    I3,
    I4,
    I5,
    I6,
    I7,
    I8,
    I9,
    I10,
    I11,
    I12,
    I13,
    I14,
    I15,
    I16,
    I17,
    I18,
    I19,
    I20,
    I21,
    I22,
    I23,
    I24,
    I25,
    I26,
    I27,
    I28,
    I29,
}

impl RuleCode {
    pub const ALL: [RuleCode; 29] = [
        RuleCode::I1,
        RuleCode::I2,
        RuleCode::I3,
        RuleCode::I4,
        RuleCode::I5,
        RuleCode::I6,
        RuleCode::I7,
        RuleCode::I8,
        RuleCode::I9,
        RuleCode::I10,
        RuleCode::I11,
        RuleCode::I12,
        RuleCode::I13,
        RuleCode::I14,
        RuleCode::I15,
        RuleCode::I16,
        RuleCode::I17,
        RuleCode::I18,
        RuleCode::I19,
        RuleCode::I20,
        RuleCode::I21,
        RuleCode::I22,
        RuleCode::I23,
        RuleCode::I24,
        RuleCode::I25,
        RuleCode::I26,
        RuleCode::I27,
        RuleCode::I28,
        RuleCode::I29,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCode::I1 => "I1",
            RuleCode::I2 => "I2",
            RuleCode::I3 => "I3",
            RuleCode::I4 => "I4",
            RuleCode::I5 => "I5",
            RuleCode::I6 => "I6",
            RuleCode::I7 => "I7",
            RuleCode::I8 => "I8",
            RuleCode::I9 => "I9",
            RuleCode::I10 => "I10",
            RuleCode::I11 => "I11",
            RuleCode::I12 => "I12",
            RuleCode::I13 => "I13",
            RuleCode::I14 => "I14",
            RuleCode::I15 => "I15",
            RuleCode::I16 => "I16",
            RuleCode::I17 => "I17",
            RuleCode::I18 => "I18",
            RuleCode::I19 => "I19",
            RuleCode::I20 => "I20",
            RuleCode::I21 => "I21",
            RuleCode::I22 => "I22",
            RuleCode::I23 => "I23",
            RuleCode::I24 => "I24",
            RuleCode::I25 => "I25",
            RuleCode::I26 => "I26",
            RuleCode::I27 => "I27",
            RuleCode::I28 => "I28",
            RuleCode::I29 => "I29",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RuleCode::I1 => "settled stroke revised or re-created",
            RuleCode::I2 => "bar time or event sequence went backwards",
            RuleCode::I3 => "stroke settled twice",
            RuleCode::I4 => "event kind disagrees with payload lifecycle",
            RuleCode::I5 => "stroke replay determinism",
            RuleCode::I6 => "segment settled without candidate",
            RuleCode::I7 => "segment break stroke is not end + 1",
            RuleCode::I8 => "gap break settled without second-sequence fractal",
            RuleCode::I9 => "segment invalidated while not active",
            RuleCode::I10 => "segment replay determinism",
            RuleCode::I11 => "center ceiling not above floor",
            RuleCode::I12 => "center settled without candidate",
            RuleCode::I13 => "center component span not traceable",
            RuleCode::I14 => "center invalidated while not active",
            RuleCode::I15 => "center replay determinism",
            RuleCode::I16 => "identity invalidated and re-created in one batch",
            RuleCode::I17 => "event references an invalidated identity",
            RuleCode::I18 => "move spans too few centers",
            RuleCode::I19 => "move settled without candidate",
            RuleCode::I20 => "move span not traceable",
            RuleCode::I21 => "event references an invalidated move",
            RuleCode::I22 => "move replay determinism",
            RuleCode::I23 => "buy/sell point divergence key does not match its type",
            RuleCode::I24 => "buy/sell point confirmed without candidate",
            RuleCode::I25 => "buy/sell point settled without confirm",
            RuleCode::I26 => "exclusive buy/sell point types active at one anchor",
            RuleCode::I27 => "event references an invalidated buy/sell point",
            RuleCode::I28 => "buy/sell point replay determinism",
            RuleCode::I29 => "settled buy/sell point changed",
        }
    }

    /// Layer the rule belongs to; `None` for cross-layer rules.
    pub fn layer(&self) -> Option<Layer> {
        use RuleCode::*;
        match self {
            I1 | I2 | I3 | I4 | I5 => Some(Layer::Stroke),
            I6 | I7 | I8 | I9 | I10 => Some(Layer::Segment),
            I11 | I12 | I13 | I14 | I15 => Some(Layer::Center),
            I16 | I17 => None,
            I18 | I19 | I20 | I21 | I22 => Some(Layer::Move),
            I23 | I24 | I25 | I26 | I27 | I28 | I29 => Some(Layer::BuySellPoint),
        }
    }

    /// Determinism rules are verified by replaying in tests, not by a checker.
    pub fn is_live(&self) -> bool {
        !matches!(
            self,
            RuleCode::I5 | RuleCode::I10 | RuleCode::I15 | RuleCode::I22 | RuleCode::I28
        )
    }
}

impl std::fmt::Display for RuleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broken rule, tied to the bar where it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub bar_index: u64,
    pub bar_ts: Timestamp,
    pub seq: u64,
    pub fingerprint: String,
    pub rule: RuleCode,
    pub reason: String,
    pub level_id: u32,
}

/// Sequence and fingerprints for one checker's violations.
#[derive(Debug, Clone, Default)]
pub struct ViolationLog {
    seq: u64,
}

impl ViolationLog {
    pub fn record(
        &mut self,
        rule: RuleCode,
        reason: String,
        level_id: u32,
        bar_index: u64,
        bar_ts: Timestamp,
    ) -> Violation {
        let seq = self.seq;
        self.seq += 1;
        let payload = json!({
            "rule": rule.as_str(),
            "reason": reason,
            "level_id": level_id,
        });
        Violation {
            bar_index,
            bar_ts,
            seq,
            fingerprint: value_fingerprint(bar_index, bar_ts, "invariant_violation", seq, payload),
            rule,
            reason,
            level_id,
        }
    }

    pub fn reset(&mut self) {
        self.seq = 0;
    }
}

/// Per-layer stream auditor.
pub trait Checker {
    fn check(&mut self, events: &[DomainEvent], bar_index: u64, bar_ts: Timestamp) -> Vec<Violation>;
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_nine_rules_five_replay_only() {
        assert_eq!(RuleCode::ALL.len(), 29);
        let replay_only: Vec<RuleCode> = RuleCode::ALL.iter().copied().filter(|r| !r.is_live()).collect();
        assert_eq!(
            replay_only,
            vec![RuleCode::I5, RuleCode::I10, RuleCode::I15, RuleCode::I22, RuleCode::I28]
        );
    }

    #[test]
    fn test_violation_log_sequences_and_fingerprints() {
        let mut log = ViolationLog::default();
        let a = log.record(RuleCode::I11, "ceiling 7 <= floor 10".into(), 1, 4, 400);
        let b = log.record(RuleCode::I11, "ceiling 7 <= floor 10".into(), 1, 4, 400);
        assert_eq!((a.seq, b.seq), (0, 1));
        assert_ne!(a.fingerprint, b.fingerprint);
        log.reset();
        let c = log.record(RuleCode::I11, "ceiling 7 <= floor 10".into(), 1, 4, 400);
        assert_eq!(a.fingerprint, c.fingerprint);
        assert_eq!(serde_json::to_value(&c).unwrap()["rule"], "I11");
    }
}
