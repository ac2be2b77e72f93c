use super::lifecycle::{Finding, LifecycleAudit};
use super::{Checker, RuleCode, Violation, ViolationLog};
use crate::model::{Change, ChangeKind, Direction, DomainEvent, Entity, LayerEvent, Lifecycle, Stroke, Timestamp};

/// Stroke stream auditor: overwrite, clock, double settle and payload rules.
#[derive(Debug, Clone)]
pub struct StrokeChecker {
    audit: LifecycleAudit<(usize, Direction)>,
    log: ViolationLog,
    last_bar_ts: Option<Timestamp>,
    last_seq: Option<u64>,
}

impl Default for StrokeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl StrokeChecker {
    pub fn new() -> Self {
        Self {
            audit: LifecycleAudit::new(Stroke::CONFIRM_STAGE),
            log: ViolationLog::default(),
            last_bar_ts: None,
            last_seq: None,
        }
    }
}

/// Settle and confirm must carry an entity already at that stage.
pub(crate) fn payload_mismatch(kind: ChangeKind, stage: Lifecycle) -> bool {
    match kind {
        ChangeKind::Settle => stage != Lifecycle::Settled,
        ChangeKind::Confirm => stage < Lifecycle::Confirmed,
        _ => false,
    }
}

impl Checker for StrokeChecker {
    fn check(&mut self, events: &[DomainEvent], bar_index: u64, bar_ts: Timestamp) -> Vec<Violation> {
        let mut out = Vec::new();
        self.audit.begin_batch();

        if let Some(prev) = self.last_bar_ts {
            if bar_ts < prev {
                out.push(self.log.record(
                    RuleCode::I2,
                    format!("bar timestamp {} precedes {}", bar_ts, prev),
                    1,
                    bar_index,
                    bar_ts,
                ));
            }
        }
        self.last_bar_ts = Some(bar_ts);

        for ev in events {
            let change: &Change<Stroke> = match &ev.event {
                LayerEvent::Stroke(c) => c,
                _ => continue,
            };
            if let Some(prev) = self.last_seq {
                if ev.seq <= prev {
                    out.push(self.log.record(
                        RuleCode::I2,
                        format!("sequence {} does not follow {}", ev.seq, prev),
                        ev.level_id,
                        bar_index,
                        bar_ts,
                    ));
                }
            }
            self.last_seq = Some(ev.seq);

            let stroke = change.entity();
            if payload_mismatch(change.kind(), stroke.lifecycle()) {
                out.push(self.log.record(
                    RuleCode::I4,
                    format!(
                        "{} carries a {:?} stroke at {}",
                        change.kind().as_str(),
                        stroke.lifecycle(),
                        stroke.start
                    ),
                    ev.level_id,
                    bar_index,
                    bar_ts,
                ));
            }

            let key = stroke.identity();
            let rule = match self.audit.observe_change(change) {
                Some(Finding::SettledOverwrite) => Some(RuleCode::I1),
                Some(Finding::DuplicateSettle) => Some(RuleCode::I3),
                Some(Finding::Recreated) => Some(RuleCode::I16),
                Some(Finding::Terminal) => Some(RuleCode::I17),
                _ => None,
            };
            if let Some(rule) = rule {
                out.push(self.log.record(
                    rule,
                    format!("stroke {:?} {}: {}", key, change.kind().as_str(), rule.description()),
                    ev.level_id,
                    bar_index,
                    bar_ts,
                ));
            }
        }
        out
    }

    fn reset(&mut self) {
        self.audit.reset();
        self.log.reset();
        self.last_bar_ts = None;
        self.last_seq = None;
    }
}
