//
// reconcile/skeleton.rs
// Sarco-Tools-rs
//
// Zhang–Suen thinning and longest-path search over the resulting skeleton.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::VecDeque;

use crate::mask::Mask;

type Pixel = (usize, usize);

/// Clockwise from north: P2..P9.
const RING: [(isize, isize); 8] = [
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
];

fn neighbour(mask: &Mask, (y, x): Pixel, (dy, dx): (isize, isize)) -> Option<Pixel> {
    let ny = y.checked_add_signed(dy)?;
    let nx = x.checked_add_signed(dx)?;
    (ny < mask.height() && nx < mask.width()).then_some((ny, nx))
}

fn ring_values(mask: &Mask, p: Pixel) -> [bool; 8] {
    RING.map(|d| neighbour(mask, p, d).is_some_and(|(y, x)| mask.get(y, x)))
}

/// Thins a binary mask to a one-pixel-wide skeleton.
pub fn thin(mask: &Mask) -> Mask {
    let mut skeleton = mask.clone();
    loop {
        let mut changed = false;
        for first_pass in [true, false] {
            let doomed: Vec<Pixel> = skeleton
                .foreground()
                .filter(|&p| deletable(&skeleton, p, first_pass))
                .collect();
            changed |= !doomed.is_empty();
            for (y, x) in doomed {
                skeleton.set(y, x, false);
            }
        }
        if !changed {
            return skeleton;
        }
    }
}

fn deletable(mask: &Mask, p: Pixel, first_pass: bool) -> bool {
    let n = ring_values(mask, p);
    let [p2, _, p4, _, p6, _, p8, _] = n;

    let neighbours = n.iter().filter(|v| **v).count();
    if !(2..=6).contains(&neighbours) {
        return false;
    }
    let transitions = (0..8).filter(|&i| !n[i] && n[(i + 1) % 8]).count();
    if transitions != 1 {
        return false;
    }
    if first_pass {
        !(p2 && p4 && p6) && !(p4 && p6 && p8)
    } else {
        !(p2 && p4 && p8) && !(p2 && p6 && p8)
    }
}

/// Breadth-first search over 8-connected foreground; returns the first pixel reached at
/// the greatest hop count, and that count.
pub fn farthest(mask: &Mask, start: Pixel) -> (Pixel, usize) {
    let (h, w) = mask.shape();
    let mut dist = vec![usize::MAX; h * w];
    let mut queue = VecDeque::from([start]);
    dist[start.0 * w + start.1] = 0;
    let mut best = (start, 0);

    while let Some(p) = queue.pop_front() {
        let d = dist[p.0 * w + p.1];
        if d > best.1 {
            best = (p, d);
        }
        for step in RING {
            if let Some(n) = neighbour(mask, p, step) {
                let idx = n.0 * w + n.1;
                if mask.get(n.0, n.1) && dist[idx] == usize::MAX {
                    dist[idx] = d + 1;
                    queue.push_back(n);
                }
            }
        }
    }
    best
}

/// End points of the longest shortest path through the skeleton component containing its
/// first pixel (double breadth-first search).
pub fn longest_path(skeleton: &Mask) -> Option<(Pixel, Pixel)> {
    let start = skeleton.foreground().next()?;
    let (a, _) = farthest(skeleton, start);
    let (b, _) = farthest(skeleton, a);
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thick_bar_thins_to_a_line() {
        let bar = Mask::from_fn(9, 30, |(y, x)| (2..7).contains(&y) && (3..27).contains(&x));
        let skeleton = thin(&bar);
        assert!(!skeleton.is_empty());
        assert!(skeleton.is_subset_of(&bar));
        // One pixel thick in every interior column.
        for x in 8..22 {
            let column = (0..9).filter(|&y| skeleton.get(y, x)).count();
            assert_eq!(column, 1, "column {x}");
        }
    }

    #[test]
    fn thinning_a_skeleton_changes_nothing() {
        let line = Mask::from_fn(5, 12, |(y, x)| y == 2 && (1..11).contains(&x));
        assert_eq!(thin(&line), line);
    }

    #[test]
    fn double_search_finds_line_ends() {
        let line = Mask::from_fn(5, 12, |(y, x)| y == 2 && (1..11).contains(&x));
        let (a, b) = longest_path(&line).expect("path");
        let mut ends = [a, b];
        ends.sort();
        assert_eq!(ends, [(2, 1), (2, 10)]);
        assert_eq!(farthest(&line, (2, 1)).1, 9);
    }

    #[test]
    fn empty_skeleton_has_no_path() {
        assert_eq!(longest_path(&Mask::empty(4, 4)), None);
    }
}
