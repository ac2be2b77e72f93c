//! Identity-preserving diff between two full recomputations of a layer.
//!
//! Entities are matched by identity key across the whole list, never by
//! position, so inserting or deleting in the middle of a list only touches
//! the inserted or deleted identity.
//!
//! Output order within one batch:
//! 1. `Invalidate` for every identity that disappeared, in prior order
//! 2. creations and transitions, in current order

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::model::{Change, Entity, Lifecycle};

/// Diff using the entity's own identity key and full equality.
pub fn diff<E: Entity>(prior: &[E], curr: &[E]) -> Vec<Change<E>> {
    diff_by_identity(prior, curr, E::identity, |a, b| a == b)
}

/// Diff with explicit identity and equality functions.
///
/// Neither list may contain the same identity twice; the recompute that
/// produced them is responsible for that.
pub fn diff_by_identity<E, K, I, Q>(prior: &[E], curr: &[E], identity: I, equal: Q) -> Vec<Change<E>>
where
    E: Entity,
    K: Eq + Hash,
    I: Fn(&E) -> K,
    Q: Fn(&E, &E) -> bool,
{
    let prior_by_key: HashMap<K, &E> = prior.iter().map(|e| (identity(e), e)).collect();
    debug_assert_eq!(prior_by_key.len(), prior.len(), "duplicate identity in prior list");
    let curr_keys: HashSet<K> = curr.iter().map(&identity).collect();
    debug_assert_eq!(curr_keys.len(), curr.len(), "duplicate identity in recomputed list");

    let mut out = Vec::new();
    for old in prior {
        if !curr_keys.contains(&identity(old)) {
            out.push(Change::Invalidate(old.clone()));
        }
    }
    for new in curr {
        match prior_by_key.get(&identity(new)) {
            None => push_creation(new, &mut out),
            Some(&old) if equal(old, new) => {}
            Some(&old) => push_transition(old, new, &mut out),
        }
    }
    out
}

fn push_creation<E: Entity>(new: &E, out: &mut Vec<Change<E>>) {
    let stage = new.lifecycle();
    out.push(Change::Candidate(new.clone()));
    if E::CONFIRM_STAGE && stage >= Lifecycle::Confirmed {
        out.push(Change::Confirm(new.clone()));
    }
    if stage == Lifecycle::Settled {
        out.push(Change::Settle(new.clone()));
    }
}

fn push_transition<E: Entity>(old: &E, new: &E, out: &mut Vec<Change<E>>) {
    let (from, to) = (old.lifecycle(), new.lifecycle());
    let before = out.len();
    if to > from {
        if E::CONFIRM_STAGE && from < Lifecycle::Confirmed && to >= Lifecycle::Confirmed {
            out.push(Change::Confirm(new.clone()));
        }
        if to == Lifecycle::Settled {
            out.push(Change::Settle(new.clone()));
        }
    }
    // Same stage, a regression, or a stage this layer does not announce.
    if out.len() == before {
        out.push(Change::Revise(new.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BspKind, BuySellPoint, ChangeKind, Side};

    fn bsp(anchor: usize, kind: BspKind, price: f64) -> BuySellPoint {
        BuySellPoint {
            level_id: 1,
            kind,
            side: Side::Buy,
            anchor,
            price,
            divergence_key: None,
            confirmed: false,
            settled: false,
        }
    }

    fn kinds<E>(changes: &[Change<E>]) -> Vec<ChangeKind> {
        changes.iter().map(Change::kind).collect()
    }

    #[test]
    fn test_unchanged_lists_emit_nothing() {
        let list = vec![bsp(1, BspKind::Type1, 9.0), bsp(5, BspKind::Type2, 9.5)];
        assert!(diff(&list, &list.clone()).is_empty());
    }

    #[test]
    fn test_mid_list_delete_invalidates_only_the_deleted() {
        let a = bsp(1, BspKind::Type1, 9.0);
        let b = bsp(3, BspKind::Type2, 9.2);
        let c = bsp(5, BspKind::Type3, 9.4);
        let out = diff(&[a.clone(), b.clone(), c.clone()], &[a, c]);
        assert_eq!(out, vec![Change::Invalidate(b)]);
    }

    #[test]
    fn test_mid_list_insert_creates_only_the_inserted() {
        let a = bsp(1, BspKind::Type1, 9.0);
        let b = bsp(3, BspKind::Type2, 9.2);
        let c = bsp(5, BspKind::Type3, 9.4);
        let out = diff(&[a.clone(), c.clone()], &[a, b.clone(), c]);
        assert_eq!(out, vec![Change::Candidate(b)]);
    }

    #[test]
    fn test_new_settled_entity_walks_every_stage() {
        let mut p = bsp(2, BspKind::Type1, 8.0);
        p.confirmed = true;
        p.settled = true;
        let out = diff(&[], &[p]);
        assert_eq!(
            kinds(&out),
            vec![ChangeKind::Candidate, ChangeKind::Confirm, ChangeKind::Settle]
        );
    }

    #[test]
    fn test_stage_advance_emits_transition_not_recreate() {
        let old = bsp(2, BspKind::Type1, 8.0);
        let mut new = old.clone();
        new.confirmed = true;
        assert_eq!(kinds(&diff(&[old], &[new.clone()])), vec![ChangeKind::Confirm]);

        let mut settled = new.clone();
        settled.settled = true;
        assert_eq!(kinds(&diff(&[new], &[settled])), vec![ChangeKind::Settle]);
    }

    #[test]
    fn test_field_change_without_stage_change_is_revise() {
        let old = bsp(2, BspKind::Type1, 8.0);
        let new = bsp(2, BspKind::Type1, 7.5);
        assert_eq!(diff(&[old], &[new.clone()]), vec![Change::Revise(new)]);
    }

    #[test]
    fn test_invalidates_precede_creations() {
        let gone = bsp(1, BspKind::Type1, 9.0);
        let kept = bsp(3, BspKind::Type2, 9.2);
        let fresh = bsp(0, BspKind::Type3, 9.9);
        let out = diff(&[gone.clone(), kept.clone()], &[fresh.clone(), kept]);
        assert_eq!(out, vec![Change::Invalidate(gone), Change::Candidate(fresh)]);
    }

    #[test]
    fn test_custom_identity_function() {
        // Keying by anchor alone turns a kind swap into a revise.
        let old = bsp(4, BspKind::Type2, 9.0);
        let new = bsp(4, BspKind::Type3, 9.0);
        let out = diff_by_identity(&[old], &[new.clone()], |p: &BuySellPoint| p.anchor, |a, b| a == b);
        assert_eq!(out, vec![Change::Revise(new)]);
    }
}
