use super::lifecycle::{Finding, LifecycleAudit};
use super::{Checker, RuleCode, Violation, ViolationLog};
use crate::model::{ChangeKind, Direction, DomainEvent, Entity, LayerEvent, Segment, Timestamp};

#[derive(Debug, Clone)]
pub struct SegmentChecker {
    audit: LifecycleAudit<(usize, Direction)>,
    log: ViolationLog,
}

impl Default for SegmentChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentChecker {
    pub fn new() -> Self {
        Self {
            audit: LifecycleAudit::new(Segment::CONFIRM_STAGE),
            log: ViolationLog::default(),
        }
    }
}

impl Checker for SegmentChecker {
    fn check(&mut self, events: &[DomainEvent], bar_index: u64, bar_ts: Timestamp) -> Vec<Violation> {
        let mut out = Vec::new();
        self.audit.begin_batch();

        for ev in events {
            let change = match &ev.event {
                LayerEvent::Segment(c) => c,
                _ => continue,
            };
            let seg = change.entity();
            let key = seg.identity();

            if change.kind() == ChangeKind::Settle {
                if seg.break_at != Some(seg.end + 1) {
                    out.push(self.log.record(
                        RuleCode::I7,
                        format!(
                            "segment {:?} settled with break at {:?}, expected stroke {}",
                            key,
                            seg.break_at,
                            seg.end + 1
                        ),
                        ev.level_id,
                        bar_index,
                        bar_ts,
                    ));
                }
                if seg.gap && !seg.second_fractal {
                    out.push(self.log.record(
                        RuleCode::I8,
                        format!("segment {:?} settled on a gap without second fractal", key),
                        ev.level_id,
                        bar_index,
                        bar_ts,
                    ));
                }
            }

            let rule = match self.audit.observe_change(change) {
                Some(Finding::MissingCandidate) => Some(RuleCode::I6),
                Some(Finding::InactiveInvalidate) => Some(RuleCode::I9),
                Some(Finding::Recreated) => Some(RuleCode::I16),
                Some(Finding::Terminal) => Some(RuleCode::I17),
                _ => None,
            };
            if let Some(rule) = rule {
                out.push(self.log.record(
                    rule,
                    format!("segment {:?} {}: {}", key, change.kind().as_str(), rule.description()),
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
    }
}
