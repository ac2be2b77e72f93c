use super::lifecycle::{Finding, LifecycleAudit};
use super::{Checker, RuleCode, Violation, ViolationLog};
use crate::model::{Center, CenterKey, ChangeKind, DomainEvent, LayerEvent, Timestamp};
use crate::model::entity::Entity;
use crate::recursion::compose::CENTER_MIN_COMPONENTS;

/// Center stream auditor for one level.
#[derive(Debug, Clone)]
pub struct CenterChecker {
    level_id: u32,
    audit: LifecycleAudit<CenterKey>,
    log: ViolationLog,
    component_count: Option<usize>,
}

impl CenterChecker {
    pub fn new(level_id: u32) -> Self {
        Self {
            level_id,
            audit: LifecycleAudit::new(Center::CONFIRM_STAGE),
            log: ViolationLog::default(),
            component_count: None,
        }
    }

    /// Number of components known at the lower layer, for span checks.
    pub fn set_component_count(&mut self, count: usize) {
        self.component_count = Some(count);
    }

    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    fn span_problem(&self, c: &Center) -> Option<String> {
        if c.end < c.start {
            return Some(format!("end {} before start {}", c.end, c.start));
        }
        if c.count < CENTER_MIN_COMPONENTS {
            return Some(format!("{} components, need {}", c.count, CENTER_MIN_COMPONENTS));
        }
        if c.count != c.end - c.start + 1 {
            return Some(format!("count {} does not match span {}..={}", c.count, c.start, c.end));
        }
        match self.component_count {
            Some(n) if c.end >= n => Some(format!("end {} beyond {} components", c.end, n)),
            _ => None,
        }
    }
}

impl Checker for CenterChecker {
    fn check(&mut self, events: &[DomainEvent], bar_index: u64, bar_ts: Timestamp) -> Vec<Violation> {
        let mut out = Vec::new();
        self.audit.begin_batch();

        for ev in events {
            let change = match &ev.event {
                LayerEvent::Center(c) => c,
                _ => continue,
            };
            let center = change.entity();

            if change.kind() != ChangeKind::Invalidate {
                // NaN bounds fail this too.
                if !(center.ceiling > center.floor) {
                    out.push(self.log.record(
                        RuleCode::I11,
                        format!("ceiling {} not above floor {}", center.ceiling, center.floor),
                        ev.level_id,
                        bar_index,
                        bar_ts,
                    ));
                }
                if let Some(problem) = self.span_problem(center) {
                    out.push(self.log.record(
                        RuleCode::I13,
                        format!("center at {}: {}", center.start, problem),
                        ev.level_id,
                        bar_index,
                        bar_ts,
                    ));
                }
            }

            let rule = match self.audit.observe_change(change) {
                Some(Finding::MissingCandidate) => Some(RuleCode::I12),
                Some(Finding::InactiveInvalidate) => Some(RuleCode::I14),
                Some(Finding::Recreated) => Some(RuleCode::I16),
                Some(Finding::Terminal) => Some(RuleCode::I17),
                _ => None,
            };
            if let Some(rule) = rule {
                out.push(self.log.record(
                    rule,
                    format!(
                        "center [{}, {}] at {} {}: {}",
                        center.floor,
                        center.ceiling,
                        center.start,
                        change.kind().as_str(),
                        rule.description()
                    ),
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
        self.component_count = None;
    }
}
