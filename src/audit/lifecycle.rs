//! Lifecycle bookkeeping shared by every checker.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::model::{Change, ChangeKind, Entity, Lifecycle};

/// Generic lifecycle breach. Each checker maps these onto its own rule codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finding {
    /// Event on an identity that was invalidated earlier.
    Terminal,
    /// Invalidated and then created again within the same batch.
    Recreated,
    /// Revise, confirm or settle on an identity never seen as candidate.
    MissingCandidate,
    /// Settle on a layer with a confirm stage, before any confirm.
    MissingConfirm,
    DuplicateSettle,
    /// Candidate, revise or confirm on a settled identity.
    SettledOverwrite,
    /// Invalidate on an identity that is not active.
    InactiveInvalidate,
}

/// Audit sets for one layer: active identities with their stage, and the
/// identities already invalidated.
///
/// The invalidated set is what makes invalidation terminal, so it is only
/// cleared by [`reset`](Self::reset) and grows with every retracted identity.
/// [`retired`](Self::retired) reports its size.
#[derive(Debug, Clone)]
pub struct LifecycleAudit<K> {
    confirm_stage: bool,
    active: HashMap<K, Lifecycle>,
    invalidated: HashSet<K>,
    batch_invalidated: HashSet<K>,
}

impl<K: Clone + Eq + Hash> LifecycleAudit<K> {
    pub fn new(confirm_stage: bool) -> Self {
        Self {
            confirm_stage,
            active: HashMap::new(),
            invalidated: HashSet::new(),
            batch_invalidated: HashSet::new(),
        }
    }

    pub fn begin_batch(&mut self) {
        self.batch_invalidated.clear();
    }

    /// Apply one event, returning the breach it represents if any.
    pub fn observe(&mut self, key: &K, kind: ChangeKind) -> Option<Finding> {
        if self.invalidated.contains(key) {
            if kind == ChangeKind::Candidate && self.batch_invalidated.contains(key) {
                return Some(Finding::Recreated);
            }
            return Some(Finding::Terminal);
        }

        let stage = self.active.get(key).copied();
        match (kind, stage) {
            (ChangeKind::Candidate, None) => {
                self.active.insert(key.clone(), Lifecycle::Candidate);
                None
            }
            (ChangeKind::Candidate, Some(Lifecycle::Settled)) => Some(Finding::SettledOverwrite),
            (ChangeKind::Candidate, Some(_)) => None,

            (ChangeKind::Revise, None) => Some(Finding::MissingCandidate),
            (ChangeKind::Revise, Some(Lifecycle::Settled)) => Some(Finding::SettledOverwrite),
            (ChangeKind::Revise, Some(_)) => None,

            (ChangeKind::Confirm, None) => Some(Finding::MissingCandidate),
            (ChangeKind::Confirm, Some(Lifecycle::Settled)) => Some(Finding::SettledOverwrite),
            (ChangeKind::Confirm, Some(_)) => {
                self.active.insert(key.clone(), Lifecycle::Confirmed);
                None
            }

            (ChangeKind::Settle, None) => Some(Finding::MissingCandidate),
            (ChangeKind::Settle, Some(Lifecycle::Settled)) => Some(Finding::DuplicateSettle),
            (ChangeKind::Settle, Some(prev)) => {
                self.active.insert(key.clone(), Lifecycle::Settled);
                if self.confirm_stage && prev == Lifecycle::Candidate {
                    Some(Finding::MissingConfirm)
                } else {
                    None
                }
            }

            // Terminal from here on, whether or not the identity was active.
            (ChangeKind::Invalidate, prev) => {
                self.active.remove(key);
                self.invalidated.insert(key.clone());
                self.batch_invalidated.insert(key.clone());
                prev.is_none().then_some(Finding::InactiveInvalidate)
            }
        }
    }

    /// Convenience for a typed change.
    pub fn observe_change<E>(&mut self, change: &Change<E>) -> Option<Finding>
    where
        E: Entity<Key = K>,
    {
        self.observe(&change.entity().identity(), change.kind())
    }

    pub fn stage(&self, key: &K) -> Option<Lifecycle> {
        self.active.get(key).copied()
    }

    pub fn is_invalidated(&self, key: &K) -> bool {
        self.invalidated.contains(key)
    }

    /// Number of identities invalidated since the last reset.
    pub fn retired(&self) -> usize {
        self.invalidated.len()
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &K> {
        self.active.keys()
    }

    pub fn reset(&mut self) {
        self.active.clear();
        self.invalidated.clear();
        self.batch_invalidated.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_findings() {
        let mut audit: LifecycleAudit<u32> = LifecycleAudit::new(true);
        assert_eq!(audit.observe(&1, ChangeKind::Confirm), Some(Finding::MissingCandidate));
        assert_eq!(audit.observe(&1, ChangeKind::Candidate), None);
        assert_eq!(audit.observe(&1, ChangeKind::Settle), Some(Finding::MissingConfirm));
        assert_eq!(audit.observe(&1, ChangeKind::Settle), Some(Finding::DuplicateSettle));
        assert_eq!(audit.observe(&1, ChangeKind::Revise), Some(Finding::SettledOverwrite));
    }

    #[test]
    fn test_terminal_and_recreated() {
        let mut audit: LifecycleAudit<u32> = LifecycleAudit::new(false);
        audit.begin_batch();
        audit.observe(&7, ChangeKind::Candidate);
        assert_eq!(audit.observe(&7, ChangeKind::Invalidate), None);
        assert_eq!(audit.observe(&7, ChangeKind::Candidate), Some(Finding::Recreated));

        audit.begin_batch();
        assert_eq!(audit.observe(&7, ChangeKind::Candidate), Some(Finding::Terminal));
        assert_eq!(audit.observe(&7, ChangeKind::Invalidate), Some(Finding::Terminal));
        assert!(audit.is_invalidated(&7));
        assert_eq!(audit.retired(), 1);
        audit.reset();
        assert_eq!(audit.retired(), 0);
    }

    #[test]
    fn test_clean_lifecycle_without_confirm_stage() {
        let mut audit: LifecycleAudit<u32> = LifecycleAudit::new(false);
        assert_eq!(audit.observe(&3, ChangeKind::Candidate), None);
        assert_eq!(audit.observe(&3, ChangeKind::Revise), None);
        assert_eq!(audit.observe(&3, ChangeKind::Settle), None);
        assert_eq!(audit.stage(&3), Some(Lifecycle::Settled));
        assert_eq!(audit.observe(&4, ChangeKind::Invalidate), Some(Finding::InactiveInvalidate));
        audit.reset();
        assert_eq!(audit.stage(&3), None);
    }
}
