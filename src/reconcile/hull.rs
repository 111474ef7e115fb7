//
// reconcile/hull.rs
// Sarco-Tools-rs
//
// Body-outline ("hull") drawing.
//
// Separate blobs are bridged once at their closest boundary points, the longest
// skeleton chord is drawn across the result so horseshoe-shaped muscle closes, and
// the external contour of that drawing is the hull. The hull is a line image; use
// `fill` to get the enclosed region.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_line_segment_mut;
use imageproc::morphology;

use crate::config::HullConfig;
use crate::mask::{Mask, FOREGROUND};
use crate::reconcile::{islands, skeleton};

type Pixel = (usize, usize);

const WHITE: Luma<u8> = Luma([FOREGROUND]);

/// Draws `segments` onto a copy of `mask`, `thickness` pixels wide.
pub fn draw_segments(mask: &Mask, segments: &[(Pixel, Pixel)], thickness: u32) -> Mask {
    let (h, w) = mask.shape();
    let mut lines = GrayImage::new(w as u32, h as u32);
    for &((ay, ax), (by, bx)) in segments {
        draw_line_segment_mut(&mut lines, (ax as f32, ay as f32), (bx as f32, by as f32), WHITE);
    }
    let mut out = mask.clone();
    out.union_with(&thicken(&lines, thickness));
    out
}

fn thicken(lines: &GrayImage, thickness: u32) -> Mask {
    let radius = (thickness / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        Mask::from_gray(lines)
    } else {
        Mask::from_gray(&morphology::dilate(lines, Norm::LInf, radius))
    }
}

/// Foreground pixels with a 4-neighbour outside the mask or on the image edge.
fn boundary(mask: &Mask) -> Vec<Pixel> {
    let (h, w) = mask.shape();
    mask.foreground()
        .filter(|&(y, x)| {
            y == 0
                || x == 0
                || y + 1 == h
                || x + 1 == w
                || !mask.get(y - 1, x)
                || !mask.get(y + 1, x)
                || !mask.get(y, x - 1)
                || !mask.get(y, x + 1)
        })
        .collect()
}

/// Closest pair between two point sets; the first pair found wins ties.
fn closest_pair(a: &[Pixel], b: &[Pixel]) -> Option<(Pixel, Pixel)> {
    let mut best: Option<(usize, Pixel, Pixel)> = None;
    for &p in a {
        for &q in b {
            let dy = p.0.abs_diff(q.0);
            let dx = p.1.abs_diff(q.1);
            let d = dy * dy + dx * dx;
            if best.map_or(true, |(bd, _, _)| d < bd) {
                best = Some((d, p, q));
            }
        }
    }
    best.map(|(_, p, q)| (p, q))
}

/// One bridging pass: every pair of components gets a line between its closest
/// boundary points. Not repeated until convergence.
pub fn connect_once(mask: &Mask, thickness: u32) -> Mask {
    let parts = islands::components(mask);
    if parts.len() < 2 {
        return mask.clone();
    }
    let edges: Vec<Vec<Pixel>> = parts.iter().map(|c| boundary(&c.mask)).collect();
    let mut segments = Vec::new();
    for i in 0..edges.len() {
        for j in i + 1..edges.len() {
            if let Some(pair) = closest_pair(&edges[i], &edges[j]) {
                segments.push(pair);
            }
        }
    }
    draw_segments(mask, &segments, thickness)
}

/// Adds a one-pixel chord between the ends of the skeleton's longest path.
pub fn draw_centerline(mask: &Mask) -> Mask {
    let thinned = skeleton::thin(mask);
    match skeleton::longest_path(&thinned) {
        Some((a, b)) => draw_segments(mask, &[(a, b)], 1),
        None => mask.clone(),
    }
}

/// Outline of every outermost blob, `thickness` pixels wide.
pub fn external_contour(mask: &Mask, thickness: u32) -> Mask {
    let (h, w) = mask.shape();
    let mut lines = GrayImage::new(w as u32, h as u32);
    for contour in find_contours::<i32>(&mask.to_gray()) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let points = &contour.points;
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            draw_line_segment_mut(&mut lines, (p.x as f32, p.y as f32), (q.x as f32, q.y as f32), WHITE);
        }
    }
    thicken(&lines, thickness)
}

/// Full hull drawing for a mask. An empty mask gives an empty outline.
pub fn outline(mask: &Mask, config: &HullConfig) -> Mask {
    if mask.is_empty() {
        return mask.clone();
    }
    let bridged = connect_once(mask, config.connect_thickness);
    let closed = draw_centerline(&bridged);
    external_contour(&closed, config.outline_thickness)
}

/// Region enclosed by an outline, outline pixels included. Background is flooded
/// 4-connectedly from the image border; whatever it cannot reach is inside.
pub fn fill(outline: &Mask) -> Mask {
    let (h, w) = outline.shape();
    let mut outside = Mask::empty(h, w);
    let mut queue = VecDeque::new();

    let mut seed = |y: usize, x: usize, outside: &mut Mask, queue: &mut VecDeque<Pixel>| {
        if !outline.get(y, x) && !outside.get(y, x) {
            outside.set(y, x, true);
            queue.push_back((y, x));
        }
    };
    for x in 0..w {
        seed(0, x, &mut outside, &mut queue);
        seed(h.saturating_sub(1), x, &mut outside, &mut queue);
    }
    for y in 0..h {
        seed(y, 0, &mut outside, &mut queue);
        seed(y, w.saturating_sub(1), &mut outside, &mut queue);
    }

    while let Some((y, x)) = queue.pop_front() {
        let mut visit = |ny: usize, nx: usize| {
            if ny < h && nx < w && !outline.get(ny, nx) && !outside.get(ny, nx) {
                outside.set(ny, nx, true);
                queue.push_back((ny, nx));
            }
        };
        if y > 0 {
            visit(y - 1, x);
        }
        if x > 0 {
            visit(y, x - 1);
        }
        visit(y + 1, x);
        visit(y, x + 1);
    }

    Mask::from_fn(h, w, |(y, x)| !outside.get(y, x))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(h: usize, w: usize, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Mask {
        Mask::from_fn(h, w, |(y, x)| rows.contains(&y) && cols.contains(&x))
    }

    #[test]
    fn contour_of_a_square_is_its_border() {
        let mask = square(12, 12, 3..9, 3..9);
        let contour = external_contour(&mask, 1);
        assert_eq!(contour.count(), 20);
        assert!(contour.get(3, 3));
        assert!(!contour.get(5, 5));
        assert_eq!(fill(&contour), mask);
    }

    #[test]
    fn thick_contour_spreads_both_ways() {
        let mask = square(12, 12, 3..9, 3..9);
        let contour = external_contour(&mask, 2);
        assert!(contour.get(2, 5));
        assert!(contour.get(4, 5));
        assert!(!contour.get(5, 5));
    }

    #[test]
    fn bridges_two_blobs_at_closest_points() {
        let mut mask = square(10, 20, 2..6, 1..5);
        mask.union_with(&square(10, 20, 2..6, 12..16));
        let bridged = connect_once(&mask, 1);
        assert_eq!(islands::components(&bridged).len(), 1);
        assert_eq!(bridged.count(), mask.count() + 7);
    }

    #[test]
    fn centerline_closes_a_horseshoe() {
        let mut mask = square(40, 40, 5..30, 5..10);
        mask.union_with(&square(40, 40, 5..30, 28..33));
        mask.union_with(&square(40, 40, 30..35, 5..33));
        // The opening at the top would otherwise leave the inside connected to the border.
        let inside = fill(&outline(&mask, &HullConfig::default()));
        assert!(inside.get(20, 18));
        assert!(!inside.get(2, 18));
    }

    #[test]
    fn empty_mask_has_empty_hull() {
        let empty = Mask::empty(5, 5);
        assert!(outline(&empty, &HullConfig::default()).is_empty());
        assert!(fill(&empty).is_empty());
    }
}
