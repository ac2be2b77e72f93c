use std::collections::{BTreeMap, BTreeSet};

use super::lifecycle::{Finding, LifecycleAudit};
use super::{Checker, RuleCode, Violation, ViolationLog};
use crate::model::{BspKey, BspKind, BuySellPoint, ChangeKind, DomainEvent, Entity, LayerEvent, Timestamp};

/// Buy/sell point stream auditor.
///
/// Type 1 excludes types 2 and 3 at the same anchor and level; types 2 and 3
/// may coexist.
#[derive(Debug, Clone)]
pub struct BuySellPointChecker {
    audit: LifecycleAudit<BspKey>,
    log: ViolationLog,
}

impl Default for BuySellPointChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn type_problem(p: &BuySellPoint) -> Option<&'static str> {
    match (p.kind, p.divergence_key.is_some()) {
        (BspKind::Type1 | BspKind::Type2, false) => Some("missing divergence key"),
        (BspKind::Type3, true) => Some("type3 must not carry a divergence key"),
        _ => None,
    }
}

impl BuySellPointChecker {
    pub fn new() -> Self {
        Self {
            audit: LifecycleAudit::new(BuySellPoint::CONFIRM_STAGE),
            log: ViolationLog::default(),
        }
    }

    fn exclusive_conflicts(&self, touched: &BTreeSet<(u32, usize)>) -> Vec<(u32, usize, Vec<BspKind>)> {
        let mut kinds: BTreeMap<(u32, usize), BTreeSet<BspKind>> = BTreeMap::new();
        for key in self.audit.active_keys() {
            let anchor = (key.level_id, key.anchor);
            if touched.contains(&anchor) {
                kinds.entry(anchor).or_default().insert(key.kind);
            }
        }
        kinds
            .into_iter()
            .filter(|(_, k)| {
                k.contains(&BspKind::Type1) && (k.contains(&BspKind::Type2) || k.contains(&BspKind::Type3))
            })
            .map(|((level, anchor), k)| (level, anchor, k.into_iter().collect()))
            .collect()
    }
}

impl Checker for BuySellPointChecker {
    fn check(&mut self, events: &[DomainEvent], bar_index: u64, bar_ts: Timestamp) -> Vec<Violation> {
        let mut out = Vec::new();
        let mut touched = BTreeSet::new();
        self.audit.begin_batch();

        for ev in events {
            let change = match &ev.event {
                LayerEvent::BuySellPoint(c) => c,
                _ => continue,
            };
            let point = change.entity();
            let key = point.identity();

            if change.kind() != ChangeKind::Invalidate {
                touched.insert((key.level_id, key.anchor));
                if let Some(problem) = type_problem(point) {
                    out.push(self.log.record(
                        RuleCode::I23,
                        format!("{:?} at {}: {}", point.kind, point.anchor, problem),
                        ev.level_id,
                        bar_index,
                        bar_ts,
                    ));
                }
            }

            let rule = match (self.audit.observe_change(change), change.kind()) {
                (Some(Finding::MissingCandidate), ChangeKind::Settle) => Some(RuleCode::I25),
                (Some(Finding::MissingCandidate), _) => Some(RuleCode::I24),
                (Some(Finding::MissingConfirm), _) => Some(RuleCode::I25),
                (Some(Finding::SettledOverwrite | Finding::DuplicateSettle), _) => Some(RuleCode::I29),
                (Some(Finding::Recreated), _) => Some(RuleCode::I16),
                (Some(Finding::Terminal), _) => Some(RuleCode::I27),
                _ => None,
            };
            if let Some(rule) = rule {
                out.push(self.log.record(
                    rule,
                    format!("bsp {:?} {}: {}", key, change.kind().as_str(), rule.description()),
                    ev.level_id,
                    bar_index,
                    bar_ts,
                ));
            }
        }

        for (level_id, anchor, kinds) in self.exclusive_conflicts(&touched) {
            out.push(self.log.record(
                RuleCode::I26,
                format!("anchor {} has {:?} active together", anchor, kinds),
                level_id,
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
