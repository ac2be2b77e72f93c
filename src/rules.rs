//! Reference level-1 rules.
//!
//! Simple, deterministic stroke/segment/point rules so the pipeline runs out
//! of the box. Callers with their own geometry implement [`LayerRules`]
//! instead. Every rule here only finalises an entity once later input can no
//! longer change it, so settled output is stable as bars are appended.

use std::collections::BTreeSet;

use crate::engine::pipeline::LayerRules;
use crate::model::{
    Bar, BarRange, BspKind, BuySellPoint, Direction, Divergence, Entity, Segment, Side, Stroke,
};
use crate::recursion::{Component, LevelFrame};

/// Minimum bar distance between two opposite pivots.
pub const MIN_STROKE_BARS: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceRules;

impl LayerRules for ReferenceRules {
    fn strokes(&self, bars: &[Bar]) -> Vec<Stroke> {
        strokes_from_bars(bars)
    }

    fn segments(&self, strokes: &[Stroke]) -> Vec<Segment> {
        segments_from_strokes(strokes)
    }

    fn buy_sell_points(&self, frame: &LevelFrame, divergences: &[Divergence]) -> Vec<BuySellPoint> {
        points_from_frame(frame, divergences)
    }
}

// =============================================================================
// Strokes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pivot {
    Top { index: usize, price: f64 },
    Bottom { index: usize, price: f64 },
}

impl Pivot {
    fn index(&self) -> usize {
        match *self {
            Pivot::Top { index, .. } | Pivot::Bottom { index, .. } => index,
        }
    }

    fn price(&self) -> f64 {
        match *self {
            Pivot::Top { price, .. } | Pivot::Bottom { price, .. } => price,
        }
    }

    fn same_kind(&self, other: &Pivot) -> bool {
        matches!(
            (self, other),
            (Pivot::Top { .. }, Pivot::Top { .. }) | (Pivot::Bottom { .. }, Pivot::Bottom { .. })
        )
    }

    /// Whether `self` is a more extreme pivot of the same kind.
    fn beats(&self, other: &Pivot) -> bool {
        match (self, other) {
            (Pivot::Top { price: a, .. }, Pivot::Top { price: b, .. }) => a > b,
            (Pivot::Bottom { price: a, .. }, Pivot::Bottom { price: b, .. }) => a < b,
            _ => false,
        }
    }
}

fn fractal(bars: &[Bar], i: usize) -> Option<Pivot> {
    let (prev, cur, next) = (bars.get(i.checked_sub(1)?)?, bars.get(i)?, bars.get(i + 1)?);
    if cur.high > prev.high && cur.high > next.high {
        Some(Pivot::Top { index: i, price: cur.high })
    } else if cur.low < prev.low && cur.low < next.low {
        Some(Pivot::Bottom { index: i, price: cur.low })
    } else {
        None
    }
}

fn pivots(bars: &[Bar]) -> Vec<Pivot> {
    let mut out: Vec<Pivot> = Vec::new();
    for i in 1..bars.len().saturating_sub(1) {
        let Some(p) = fractal(bars, i) else {
            continue;
        };
        match out.last().copied() {
            None => out.push(p),
            Some(last) if last.same_kind(&p) => {
                if p.beats(&last) {
                    if let Some(slot) = out.last_mut() {
                        *slot = p;
                    }
                }
            }
            Some(last) => {
                let far_enough = p.index() - last.index() >= MIN_STROKE_BARS;
                let valid = match p {
                    Pivot::Top { price, .. } => price > last.price(),
                    Pivot::Bottom { price, .. } => price < last.price(),
                };
                if far_enough && valid {
                    out.push(p);
                }
            }
        }
    }
    out
}

/// Strokes between alternating fractal pivots. The last stroke stays open.
pub fn strokes_from_bars(bars: &[Bar]) -> Vec<Stroke> {
    let pivots = pivots(bars);
    let mut strokes: Vec<Stroke> = pivots
        .windows(2)
        .map(|w| {
            let (from, to) = (w[0], w[1]);
            let direction = match from {
                Pivot::Bottom { .. } => Direction::Up,
                Pivot::Top { .. } => Direction::Down,
            };
            Stroke {
                start: from.index(),
                end: to.index(),
                direction,
                high: from.price().max(to.price()),
                low: from.price().min(to.price()),
                settled: true,
            }
        })
        .collect();
    if let Some(last) = strokes.last_mut() {
        last.settled = false;
    }
    strokes
}

// =============================================================================
// Segments
// =============================================================================

fn extends(dir: Direction, stroke: &Stroke, extreme: f64) -> bool {
    match dir {
        Direction::Up => stroke.high > extreme,
        Direction::Down => stroke.low < extreme,
    }
}

/// Segments over settled strokes.
///
/// A segment starting at stroke `s` keeps absorbing every second stroke while
/// it pushes to a new extreme. The first same-direction stroke that fails to
/// settles it, and the next segment starts right after its last stroke.
pub fn segments_from_strokes(strokes: &[Stroke]) -> Vec<Segment> {
    let settled: Vec<&Stroke> = strokes.iter().take_while(|s| s.settled).collect();
    let mut out = Vec::new();
    let mut s0 = 0;

    while s0 < settled.len() {
        let dir = settled[s0].direction;
        let mut extreme = match dir {
            Direction::Up => settled[s0].high,
            Direction::Down => settled[s0].low,
        };
        let mut s1 = s0;
        let mut k = s0 + 2;
        let mut broken = false;
        while let Some(stroke) = settled.get(k) {
            if !extends(dir, stroke, extreme) {
                broken = true;
                break;
            }
            extreme = match dir {
                Direction::Up => stroke.high,
                Direction::Down => stroke.low,
            };
            s1 = k;
            k += 2;
        }

        if s1 == s0 {
            if broken {
                s0 += 1;
                continue;
            }
            break;
        }

        let span = &settled[s0..=s1];
        out.push(Segment {
            start: s0,
            end: s1,
            direction: dir,
            high: span.iter().map(|s| s.high).fold(f64::NEG_INFINITY, f64::max),
            low: span.iter().map(|s| s.low).fold(f64::INFINITY, f64::min),
            bar_range: BarRange::new(settled[s0].start, settled[s1].end),
            break_at: broken.then_some(s1 + 1),
            gap: false,
            second_fractal: false,
            settled: broken,
        });
        if !broken {
            break;
        }
        s0 = s1 + 1;
    }
    out
}

// =============================================================================
// Buy/sell points
// =============================================================================

fn component(frame: &LevelFrame, index: usize) -> Option<&Component> {
    frame.components.iter().find(|c| c.index == index)
}

fn extreme_price(c: &Component, side: Side) -> f64 {
    match side {
        Side::Buy => c.low,
        Side::Sell => c.high,
    }
}

/// Type 1 at the end of each divergence, type 2 on the next same-direction
/// retest that holds, type 3 on the first pullback after a center break that
/// stays outside the center. Types 2 and 3 yield to a type 1 at their anchor.
pub fn points_from_frame(frame: &LevelFrame, divergences: &[Divergence]) -> Vec<BuySellPoint> {
    let last_index = frame.components.last().map(|c| c.index);
    let after = |anchor: usize, n: usize| last_index.map_or(false, |last| last >= anchor + n);

    let mut points: Vec<BuySellPoint> = Vec::new();
    for d in divergences {
        let side = match d.direction {
            Direction::Down => Side::Buy,
            Direction::Up => Side::Sell,
        };
        let Some(c1) = component(frame, d.c_end) else {
            continue;
        };
        let price1 = extreme_price(c1, side);
        let confirmed1 = d.confirmed && after(d.c_end, 1);
        points.push(BuySellPoint {
            level_id: frame.level_id,
            kind: BspKind::Type1,
            side,
            anchor: d.c_end,
            price: price1,
            divergence_key: Some(d.identity()),
            confirmed: confirmed1,
            settled: confirmed1 && after(d.c_end, 2),
        });

        if let Some(c2) = component(frame, d.c_end + 2) {
            let price2 = extreme_price(c2, side);
            let holds = match side {
                Side::Buy => price2 > price1,
                Side::Sell => price2 < price1,
            };
            if holds {
                let confirmed2 = confirmed1 && after(c2.index, 1);
                points.push(BuySellPoint {
                    level_id: frame.level_id,
                    kind: BspKind::Type2,
                    side,
                    anchor: c2.index,
                    price: price2,
                    divergence_key: Some(d.identity()),
                    confirmed: confirmed2,
                    settled: confirmed2 && after(c2.index, 2),
                });
            }
        }
    }

    for center in frame.centers.iter().filter(|c| c.settled) {
        let (Some(breaker), Some(dir)) = (center.break_index, center.break_direction) else {
            continue;
        };
        let pullback = frame
            .components
            .iter()
            .find(|c| c.index > breaker && c.direction == dir.opposite());
        let Some(p) = pullback else {
            continue;
        };
        let (side, outside) = match dir {
            Direction::Up => (Side::Buy, p.low > center.ceiling),
            Direction::Down => (Side::Sell, p.high < center.floor),
        };
        if outside {
            let confirmed = after(p.index, 1);
            points.push(BuySellPoint {
                level_id: frame.level_id,
                kind: BspKind::Type3,
                side,
                anchor: p.index,
                price: extreme_price(p, side),
                divergence_key: None,
                confirmed,
                settled: confirmed && after(p.index, 2),
            });
        }
    }

    let type1_anchors: BTreeSet<usize> = points
        .iter()
        .filter(|p| p.kind == BspKind::Type1)
        .map(|p| p.anchor)
        .collect();
    let mut seen = BTreeSet::new();
    points.retain(|p| {
        let exclusive = p.kind != BspKind::Type1 && type1_anchors.contains(&p.anchor);
        !exclusive && seen.insert((p.anchor, p.kind, p.side == Side::Buy))
    });
    points.sort_by_key(|p| (p.anchor, p.kind));
    points
}
