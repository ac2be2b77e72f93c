use super::lifecycle::{Finding, LifecycleAudit};
use super::{Checker, RuleCode, Violation, ViolationLog};
use crate::model::{ChangeKind, DomainEvent, Entity, LayerEvent, Move, MoveKey, MoveKind, Timestamp};

/// Move stream auditor for one level.
#[derive(Debug, Clone)]
pub struct MoveChecker {
    level_id: u32,
    audit: LifecycleAudit<MoveKey>,
    log: ViolationLog,
    component_count: Option<usize>,
    center_count: Option<usize>,
}

impl MoveChecker {
    pub fn new(level_id: u32) -> Self {
        Self {
            level_id,
            audit: LifecycleAudit::new(Move::CONFIRM_STAGE),
            log: ViolationLog::default(),
            component_count: None,
            center_count: None,
        }
    }

    pub fn set_context(&mut self, component_count: usize, center_count: usize) {
        self.component_count = Some(component_count);
        self.center_count = Some(center_count);
    }

    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    fn too_few_centers(m: &Move) -> Option<String> {
        let needed = match m.kind {
            MoveKind::Trend => 2,
            MoveKind::Consolidation => 1,
        };
        (m.center_count < needed)
            .then(|| format!("{:?} move at {} spans {} centers", m.kind, m.start, m.center_count))
    }

    fn span_problem(&self, m: &Move) -> Option<String> {
        if m.center_end < m.center_start {
            return Some(format!("center_end {} before center_start {}", m.center_end, m.center_start));
        }
        if m.center_count != m.center_end - m.center_start + 1 {
            return Some(format!(
                "center_count {} does not match {}..={}",
                m.center_count, m.center_start, m.center_end
            ));
        }
        if m.end < m.start {
            return Some(format!("end {} before start {}", m.end, m.start));
        }
        if let Some(n) = self.center_count {
            if m.center_end >= n {
                return Some(format!("center {} beyond {} centers", m.center_end, n));
            }
        }
        match self.component_count {
            Some(n) if m.end >= n => Some(format!("component {} beyond {} components", m.end, n)),
            _ => None,
        }
    }
}

impl Checker for MoveChecker {
    fn check(&mut self, events: &[DomainEvent], bar_index: u64, bar_ts: Timestamp) -> Vec<Violation> {
        let mut out = Vec::new();
        self.audit.begin_batch();

        for ev in events {
            let change = match &ev.event {
                LayerEvent::Move(c) => c,
                _ => continue,
            };
            let mv = change.entity();

            if change.kind() != ChangeKind::Invalidate {
                if let Some(problem) = Self::too_few_centers(mv) {
                    out.push(self.log.record(RuleCode::I18, problem, ev.level_id, bar_index, bar_ts));
                }
                if let Some(problem) = self.span_problem(mv) {
                    out.push(self.log.record(
                        RuleCode::I20,
                        format!("move at {}: {}", mv.start, problem),
                        ev.level_id,
                        bar_index,
                        bar_ts,
                    ));
                }
            }

            let rule = match self.audit.observe_change(change) {
                Some(Finding::MissingCandidate) => Some(RuleCode::I19),
                Some(Finding::Recreated) => Some(RuleCode::I16),
                Some(Finding::Terminal) => Some(RuleCode::I21),
                _ => None,
            };
            if let Some(rule) = rule {
                out.push(self.log.record(
                    rule,
                    format!("move {:?} {}: {}", mv.identity(), change.kind().as_str(), rule.description()),
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
        self.center_count = None;
    }
}
