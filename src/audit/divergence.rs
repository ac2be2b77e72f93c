use super::lifecycle::{Finding, LifecycleAudit};
use super::{Checker, RuleCode, Violation, ViolationLog};
use crate::model::{Divergence, DivergenceKey, DomainEvent, Entity, LayerEvent, Timestamp};

/// Divergences only carry the cross-layer terminal rules.
#[derive(Debug, Clone)]
pub struct DivergenceChecker {
    audit: LifecycleAudit<DivergenceKey>,
    log: ViolationLog,
}

impl Default for DivergenceChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl DivergenceChecker {
    pub fn new() -> Self {
        Self {
            audit: LifecycleAudit::new(Divergence::CONFIRM_STAGE),
            log: ViolationLog::default(),
        }
    }
}

impl Checker for DivergenceChecker {
    fn check(&mut self, events: &[DomainEvent], bar_index: u64, bar_ts: Timestamp) -> Vec<Violation> {
        let mut out = Vec::new();
        self.audit.begin_batch();
        for ev in events {
            let change = match &ev.event {
                LayerEvent::Divergence(c) => c,
                _ => continue,
            };
            let rule = match self.audit.observe_change(change) {
                Some(Finding::Recreated) => RuleCode::I16,
                Some(Finding::Terminal) => RuleCode::I17,
                _ => continue,
            };
            out.push(self.log.record(
                rule,
                format!(
                    "divergence {:?} {}: {}",
                    change.entity().identity(),
                    change.kind().as_str(),
                    rule.description()
                ),
                ev.level_id,
                bar_index,
                bar_ts,
            ));
        }
        out
    }

    fn reset(&mut self) {
        self.audit.reset();
        self.log.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::layer::LayerEngine;
    use crate::model::{Direction, DivergenceKind};

    fn divergence(c_end: usize) -> Divergence {
        Divergence {
            level_id: 1,
            kind: DivergenceKind::Trend,
            direction: Direction::Down,
            center_idx: 1,
            a_start: 3,
            a_end: 4,
            c_start: 7,
            c_end,
            force_a: 12.0,
            force_c: 6.0,
            confirmed: false,
        }
    }

    #[test]
    fn test_invalidate_then_recreate_in_one_batch() {
        let mut engine: LayerEngine<Divergence> = LayerEngine::new(1);
        let mut checker = DivergenceChecker::new();
        let s0 = engine.commit(vec![divergence(8)], 0, 0).unwrap();
        assert!(checker.check(&s0.events, 0, 0).is_empty());
        let s1 = engine.commit(vec![], 1, 1).unwrap();
        let mut events = s1.events.clone();
        // Splice in a resurrection the diff itself never produces.
        let mut again = s0.events[0].clone();
        again.seq = 99;
        events.push(again);
        let v = checker.check(&events, 1, 1);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].rule, RuleCode::I16);
    }
}
