//! Center and Move composition shared by every level.
//!
//! A level only needs an ordered list of components (segments at level 1,
//! settled moves of the level below otherwise). Centers are overlap zones of
//! at least three consecutive components; moves group settled centers that
//! step in one direction.

use serde::{Deserialize, Serialize};

use crate::engine::layer::Recompute;
use crate::model::{Center, Direction, Move, MoveKind, Segment};

/// Minimum number of components a center spans.
pub const CENTER_MIN_COMPONENTS: usize = 3;

/// Level-agnostic view of one building block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Position of the source entity in the lower layer's list.
    pub index: usize,
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
}

/// Settled segments as level-1 components.
pub fn components_from_segments(segments: &[Segment]) -> Vec<Component> {
    segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.settled)
        .map(|(index, s)| Component {
            index,
            direction: s.direction,
            high: s.high,
            low: s.low,
        })
        .collect()
}

/// Settled moves of level k-1 as level-k components.
pub fn components_from_moves(moves: &[Move]) -> Vec<Component> {
    moves
        .iter()
        .enumerate()
        .filter(|(_, m)| m.settled)
        .map(|(index, m)| Component {
            index,
            direction: m.direction,
            high: m.high,
            low: m.low,
        })
        .collect()
}

/// Scan components left to right for overlap zones.
///
/// Only the last center can be unsettled: scanning stops at the first center
/// with no breaker yet. After a settled center the scan resumes at its
/// breaker.
pub fn centers_from_components(level_id: u32, components: &[Component]) -> Vec<Center> {
    let n = components.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i + CENTER_MIN_COMPONENTS <= n {
        let opening = &components[i..i + CENTER_MIN_COMPONENTS];
        let floor = opening.iter().map(|c| c.low).fold(f64::NEG_INFINITY, f64::max);
        let ceiling = opening.iter().map(|c| c.high).fold(f64::INFINITY, f64::min);
        if ceiling <= floor {
            i += 1;
            continue;
        }

        let mut end = i + CENTER_MIN_COMPONENTS - 1;
        let mut high = opening.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let mut low = opening.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        while let Some(next) = components.get(end + 1) {
            if next.high < floor || next.low > ceiling {
                break;
            }
            end += 1;
            high = high.max(next.high);
            low = low.min(next.low);
        }

        let breaker = components.get(end + 1);
        let break_direction = breaker.map(|b| {
            if b.low > ceiling {
                Direction::Up
            } else {
                Direction::Down
            }
        });
        out.push(Center {
            level_id,
            floor,
            ceiling,
            start: components[i].index,
            end: components[end].index,
            count: end - i + 1,
            high,
            low,
            settled: breaker.is_some(),
            break_index: breaker.map(|b| b.index),
            break_direction,
        });
        if breaker.is_none() {
            break;
        }
        i = end + 1;
    }
    out
}

fn step(prev: &Center, next: &Center) -> Option<Direction> {
    if next.low > prev.high {
        Some(Direction::Up)
    } else if next.high < prev.low {
        Some(Direction::Down)
    } else {
        None
    }
}

/// Greedily group settled centers into moves.
///
/// Consecutive centers stepping the same way form a trend; a lone center is a
/// consolidation oriented by its break. The last move is left open.
pub fn moves_from_centers(level_id: u32, centers: &[Center]) -> Vec<Move> {
    let settled: Vec<(usize, &Center)> =
        centers.iter().enumerate().filter(|(_, c)| c.settled).collect();
    if settled.is_empty() {
        return Vec::new();
    }

    let mut groups: Vec<(usize, usize, Option<Direction>)> = Vec::new();
    let (mut first, mut dir) = (0usize, None);
    for k in 1..settled.len() {
        match (dir, step(settled[k - 1].1, settled[k].1)) {
            (None, Some(d)) => dir = Some(d),
            (Some(d), Some(s)) if d == s => {}
            _ => {
                groups.push((first, k - 1, dir));
                first = k;
                dir = None;
            }
        }
    }
    groups.push((first, settled.len() - 1, dir));

    let mut moves: Vec<Move> = groups
        .into_iter()
        .map(|(a, b, dir)| {
            let members = &settled[a..=b];
            let (head, tail) = (members[0].1, members[members.len() - 1].1);
            let count = members.len();
            let kind = if count >= 2 {
                MoveKind::Trend
            } else {
                MoveKind::Consolidation
            };
            Move {
                level_id,
                kind,
                direction: dir.or(head.break_direction).unwrap_or(Direction::Up),
                start: head.start,
                end: tail.end,
                center_start: members[0].0,
                center_end: members[members.len() - 1].0,
                center_count: count,
                high: members.iter().map(|(_, c)| c.high).fold(f64::NEG_INFINITY, f64::max),
                low: members.iter().map(|(_, c)| c.low).fold(f64::INFINITY, f64::min),
                settled: true,
            }
        })
        .collect();
    if let Some(last) = moves.last_mut() {
        last.settled = false;
    }
    moves
}

/// Center recompute bound to one level.
#[derive(Debug, Clone, Copy)]
pub struct CenterRule {
    pub level_id: u32,
}

impl Recompute<[Component], Center> for CenterRule {
    fn recompute(&self, components: &[Component]) -> Vec<Center> {
        centers_from_components(self.level_id, components)
    }
}

/// Move recompute bound to one level.
#[derive(Debug, Clone, Copy)]
pub struct MoveRule {
    pub level_id: u32,
}

impl Recompute<[Center], Move> for MoveRule {
    fn recompute(&self, centers: &[Center]) -> Vec<Move> {
        moves_from_centers(self.level_id, centers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp(index: usize, low: f64, high: f64) -> Component {
        let direction = if index % 2 == 0 { Direction::Up } else { Direction::Down };
        Component {
            index,
            direction,
            high,
            low,
        }
    }

    fn zigzag(ranges: &[(f64, f64)]) -> Vec<Component> {
        ranges
            .iter()
            .enumerate()
            .map(|(i, (lo, hi))| comp(i, *lo, *hi))
            .collect()
    }

    #[test]
    fn test_fewer_than_three_components_yield_nothing() {
        assert!(centers_from_components(1, &zigzag(&[(1.0, 5.0), (2.0, 6.0)])).is_empty());
    }

    #[test]
    fn test_open_center_then_settle() {
        let mut comps = zigzag(&[(5.0, 12.0), (7.0, 11.0), (6.0, 10.0)]);
        let centers = centers_from_components(1, &comps);
        assert_eq!(centers.len(), 1);
        let c = &centers[0];
        assert_eq!((c.floor, c.ceiling), (7.0, 10.0));
        assert_eq!((c.start, c.end, c.count), (0, 2, 3));
        assert!(!c.settled);

        // Overlapping fourth component extends, fifth above the ceiling breaks.
        comps.push(comp(3, 8.0, 13.0));
        comps.push(comp(4, 14.0, 18.0));
        let centers = centers_from_components(1, &comps);
        let c = &centers[0];
        assert_eq!((c.end, c.count), (3, 4));
        assert!(c.settled);
        assert_eq!(c.break_index, Some(4));
        assert_eq!(c.break_direction, Some(Direction::Up));
        assert_eq!(c.high, 13.0);
    }

    #[test]
    fn test_non_overlapping_triple_is_skipped() {
        let comps = zigzag(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (5.5, 6.5), (5.2, 6.2)]);
        let centers = centers_from_components(2, &comps);
        assert_eq!(centers.len(), 1);
        assert_eq!(centers[0].start, 2);
        assert_eq!(centers[0].level_id, 2);
        assert!(centers[0].ceiling > centers[0].floor);
    }

    fn settled_center(start: usize, low: f64, high: f64, brk: Direction) -> Center {
        Center {
            level_id: 1,
            floor: low + 1.0,
            ceiling: high - 1.0,
            start,
            end: start + 2,
            count: 3,
            high,
            low,
            settled: true,
            break_index: Some(start + 3),
            break_direction: Some(brk),
        }
    }

    #[test]
    fn test_ascending_centers_form_trend_and_last_move_stays_open() {
        let centers = vec![
            settled_center(0, 10.0, 14.0, Direction::Up),
            settled_center(3, 15.0, 19.0, Direction::Up),
            settled_center(6, 12.0, 16.0, Direction::Down),
        ];
        let moves = moves_from_centers(1, &centers);
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].kind, MoveKind::Trend);
        assert_eq!(moves[0].direction, Direction::Up);
        assert_eq!((moves[0].center_start, moves[0].center_end), (0, 1));
        assert_eq!(moves[0].center_count, 2);
        assert!(moves[0].settled);
        assert_eq!(moves[1].kind, MoveKind::Consolidation);
        assert_eq!(moves[1].direction, Direction::Down);
        assert!(!moves[1].settled);
    }

    #[test]
    fn test_unsettled_center_is_not_grouped() {
        let mut open = settled_center(3, 15.0, 19.0, Direction::Up);
        open.settled = false;
        let moves = moves_from_centers(1, &[settled_center(0, 10.0, 14.0, Direction::Up), open]);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].center_count, 1);
        assert!(!moves[0].settled);
    }

    #[test]
    fn test_only_settled_moves_become_components() {
        let centers = vec![
            settled_center(0, 10.0, 14.0, Direction::Up),
            settled_center(3, 8.0, 12.0, Direction::Down),
        ];
        let moves = moves_from_centers(1, &centers);
        let comps = components_from_moves(&moves);
        assert_eq!(comps.len(), moves.len() - 1);
        assert_eq!(comps[0].index, 0);
    }
}
