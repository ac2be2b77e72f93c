//! Identity diff properties over mid-list edits and random list pairs.
//!
//! Lists are keyed by identity, never by position, so inserting or removing
//! one entity in the middle must only ever touch that entity.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stratum::{diff, Change, ChangeKind, Direction, Entity, Stroke};

fn stroke(start: usize, direction: Direction, high: f64, settled: bool) -> Stroke {
    Stroke {
        start,
        end: start + 3,
        direction,
        high,
        low: high - 2.0,
        settled,
    }
}

fn kinds(changes: &[Change<Stroke>]) -> Vec<(ChangeKind, usize)> {
    changes.iter().map(|c| (c.kind(), c.entity().start)).collect()
}

#[test]
fn test_mid_list_delete_emits_single_invalidate() {
    let a = stroke(0, Direction::Up, 10.0, true);
    let b = stroke(3, Direction::Down, 11.0, true);
    let c = stroke(6, Direction::Up, 12.0, false);

    let changes = diff(&[a.clone(), b, c.clone()], &[a, c]);
    assert_eq!(kinds(&changes), vec![(ChangeKind::Invalidate, 3)]);
}

#[test]
fn test_mid_list_insert_emits_single_candidate() {
    let a = stroke(0, Direction::Up, 10.0, true);
    let b = stroke(3, Direction::Down, 11.0, false);
    let c = stroke(6, Direction::Up, 12.0, false);

    let changes = diff(&[a.clone(), c.clone()], &[a, b, c]);
    assert_eq!(kinds(&changes), vec![(ChangeKind::Candidate, 3)]);
}

#[test]
fn test_reordering_alone_is_silent() {
    let a = stroke(0, Direction::Up, 10.0, true);
    let b = stroke(3, Direction::Down, 11.0, true);
    assert!(diff(&[a.clone(), b.clone()], &[b, a]).is_empty());
}

fn random_list(rng: &mut StdRng) -> Vec<Stroke> {
    let mut starts = BTreeSet::new();
    let n = rng.gen_range(0..12);
    for _ in 0..n {
        starts.insert(rng.gen_range(0..20usize));
    }
    starts
        .into_iter()
        .map(|start| {
            let direction = if start % 2 == 0 { Direction::Up } else { Direction::Down };
            let high = 10.0 + rng.gen_range(0..3) as f64;
            stroke(start, direction, high, rng.gen_bool(0.5))
        })
        .collect()
}

type Key = <Stroke as Entity>::Key;

#[test]
fn test_random_pairs_preserve_identity() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..500 {
        let prior = random_list(&mut rng);
        let curr = random_list(&mut rng);
        let changes = diff(&prior, &curr);

        let prior_keys: BTreeSet<Key> = prior.iter().map(Stroke::identity).collect();
        let curr_keys: BTreeSet<Key> = curr.iter().map(Stroke::identity).collect();

        // Invalidates lead, and cover exactly the removed identities once each.
        let lead = changes.iter().take_while(|c| c.is_invalidate()).count();
        assert!(changes[lead..].iter().all(|c| !c.is_invalidate()));
        let removed: Vec<Key> = changes[..lead].iter().map(|c| c.entity().identity()).collect();
        let expected: Vec<Key> = prior
            .iter()
            .map(Stroke::identity)
            .filter(|k| !curr_keys.contains(k))
            .collect();
        assert_eq!(removed, expected);

        // No identity is both retracted and created.
        let mut per_key: HashMap<Key, Vec<ChangeKind>> = HashMap::new();
        for c in &changes {
            per_key.entry(c.entity().identity()).or_default().push(c.kind());
        }
        for (key, ks) in &per_key {
            let invalidated = ks.contains(&ChangeKind::Invalidate);
            let created = ks.contains(&ChangeKind::Candidate);
            assert!(!(invalidated && created), "{:?} resurrected: {:?}", key, ks);
            if created {
                assert!(!prior_keys.contains(key));
                assert_eq!(ks[0], ChangeKind::Candidate);
            }
        }

        // Every new identity is announced.
        for key in curr_keys.difference(&prior_keys) {
            assert!(per_key.contains_key(key), "{:?} never announced", key);
        }

        assert!(diff(&curr, &curr).is_empty());
        assert_eq!(diff(&prior, &curr), changes);
    }
}
