//! Nested search: top-down narrowing across levels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stratum::model::{DivergenceKind, MoveKind};
use stratum::recursion::LevelFrame;
use stratum::search::{nested_search, AmplitudeDivergence, StackView};
use stratum::{Bar, BarRange, Direction, Divergence, Move, Pipeline, Segment, StackConfig};

fn segment(i: usize) -> Segment {
    Segment {
        start: i * 3,
        end: i * 3 + 2,
        direction: if i % 2 == 0 { Direction::Up } else { Direction::Down },
        high: 10.0,
        low: 5.0,
        bar_range: BarRange::new(i * 10, i * 10 + 9),
        break_at: Some(i * 3 + 3),
        gap: false,
        second_fractal: false,
        settled: true,
    }
}

fn mv(level_id: u32, start: usize, end: usize) -> Move {
    Move {
        level_id,
        kind: MoveKind::Consolidation,
        direction: Direction::Up,
        start,
        end,
        center_start: 0,
        center_end: 0,
        center_count: 1,
        high: 10.0,
        low: 5.0,
        settled: true,
    }
}

fn divergence(level_id: u32, c_start: usize, c_end: usize) -> Divergence {
    Divergence {
        level_id,
        kind: DivergenceKind::Trend,
        direction: Direction::Down,
        center_idx: 0,
        a_start: c_start.saturating_sub(1),
        a_end: c_start.saturating_sub(1),
        c_start,
        c_end,
        force_a: 2.0,
        force_c: 1.0,
        confirmed: true,
    }
}

/// Six segments of ten bars, two level-1 moves of three segments each and
/// one level-2 move spanning both.
fn view() -> StackView {
    let frame = |level_id, moves| LevelFrame {
        level_id,
        moves,
        ..LevelFrame::default()
    };
    StackView::new(
        (0..6).map(segment).collect(),
        vec![frame(1, vec![mv(1, 0, 2), mv(1, 3, 5)]), frame(2, vec![mv(2, 0, 1)])],
    )
}

#[test]
fn test_bar_range_walks_down_to_segments() {
    let v = view();
    assert_eq!(v.deepest_level(), Some(2));
    assert_eq!(v.bar_range(1, 1, 2), Some(BarRange::new(10, 29)));
    assert_eq!(v.bar_range(2, 0, 0), Some(BarRange::new(0, 29)));
    assert_eq!(v.bar_range(2, 0, 1), Some(BarRange::new(0, 59)));
    assert_eq!(v.bar_range(2, 0, 2), None);
}

#[test]
fn test_chain_narrows_and_descends() {
    let detector = |f: &LevelFrame| match f.level_id {
        2 => vec![divergence(2, 0, 0)],
        // The later one falls outside the level-2 window.
        1 => vec![divergence(1, 1, 2), divergence(1, 4, 5)],
        _ => Vec::new(),
    };
    let chain = nested_search(&view(), &detector).unwrap();
    assert_eq!(chain.levels(), vec![2, 1]);
    assert_eq!(chain.links[0].bar_range, Some(BarRange::new(0, 29)));
    assert_eq!(chain.links[1].bar_range, Some(BarRange::new(10, 29)));
    assert_eq!(chain.links[1].divergence.as_ref().map(|d| d.c_start), Some(1));
    assert!(chain.reaches_level_one());
    assert_eq!(chain.narrowest(), Some(BarRange::new(10, 29)));
}

#[test]
fn test_missing_divergence_ends_chain() {
    let detector = |f: &LevelFrame| {
        if f.level_id == 2 {
            vec![divergence(2, 0, 1)]
        } else {
            Vec::new()
        }
    };
    let chain = nested_search(&view(), &detector).unwrap();
    assert_eq!(chain.levels(), vec![2, 1]);
    assert!(chain.links[1].divergence.is_none());
    assert_eq!(chain.links[1].bar_range, Some(BarRange::new(0, 59)));
    assert!(!chain.reaches_level_one());
}

#[test]
fn test_no_moves_means_no_chain() {
    let empty = StackView::new(Vec::new(), vec![LevelFrame::default()]);
    assert!(nested_search(&empty, &AmplitudeDivergence).is_none());
}

fn swing_bars(seed: u64, n: usize) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0;
    let mut up = true;
    while bars.len() < n {
        let len = rng.gen_range(3..9);
        let step: f64 = rng.gen_range(0.3..1.5);
        for _ in 0..len {
            let open = price;
            price += if up { step } else { -step };
            let (hi, lo) = (open.max(price), open.min(price));
            bars.push(Bar::new(bars.len() as u64 * 60_000, open, hi + 0.1, lo - 0.1, price));
        }
        up = !up;
    }
    bars.truncate(n);
    bars
}

#[test]
fn test_pipeline_chains_are_monotone() {
    for seed in 0..5 {
        let mut p = Pipeline::with_reference_rules(StackConfig::default());
        for (i, bar) in swing_bars(seed, 500).into_iter().enumerate() {
            p.process_bar(bar).unwrap();
            if i % 25 != 0 {
                continue;
            }
            let Some(chain) = nested_search(&p.stack_view(), &AmplitudeDivergence) else {
                continue;
            };
            assert!(chain.levels().windows(2).all(|w| w[0] > w[1]));
            let found: Vec<BarRange> = chain
                .links
                .iter()
                .filter(|l| l.divergence.is_some())
                .filter_map(|l| l.bar_range)
                .collect();
            assert!(found.windows(2).all(|w| w[0].contains(&w[1])));
        }
    }
}
