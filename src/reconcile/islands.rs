//
// reconcile/islands.rs
// Sarco-Tools-rs
//
// Connected components and small-island removal with hull rescue.
//
// Components smaller than the configured share of the largest one are taken out
// provisionally. A body outline is drawn from what remains; any removed component
// touching that outline is merged back, and the outline is redrawn once from the
// rescued mask.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;

use image::Luma;
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

use crate::config::{HullConfig, IslandConfig, IslandThreshold};
use crate::mask::Mask;
use crate::reconcile::hull;

/// One 8-connected blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub area: usize,
    pub mask: Mask,
}

/// 8-connected components, ordered by the raster position of their first pixel.
pub fn components(mask: &Mask) -> Vec<Component> {
    let (h, w) = mask.shape();
    let labels = connected_components(&mask.to_gray(), Connectivity::Eight, Luma([0u8]));

    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut parts: Vec<Component> = Vec::new();
    // Row-major walk, so slot order follows first appearance.
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let slot = *slots.entry(label).or_insert_with(|| {
            parts.push(Component {
                area: 0,
                mask: Mask::empty(h, w),
            });
            parts.len() - 1
        });
        let part = &mut parts[slot];
        part.mask.set(y as usize, x as usize, true);
        part.area += 1;
    }
    parts
}

/// The largest component; the first one wins a tie. An empty mask is returned unchanged.
pub fn largest_component(mask: &Mask) -> Mask {
    let parts = components(mask);
    let Some(max_area) = parts.iter().map(|c| c.area).max() else {
        return mask.clone();
    };
    parts
        .into_iter()
        .find(|c| c.area == max_area)
        .map_or_else(|| mask.clone(), |c| c.mask)
}

/// Result of the provisional area filter.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandSplit {
    pub kept: Mask,
    /// Each removed component as its own mask.
    pub removed: Vec<Mask>,
}

pub fn split_small(mask: &Mask, threshold: &IslandThreshold) -> IslandSplit {
    let (h, w) = mask.shape();
    let parts = components(mask);
    let max_area = parts.iter().map(|c| c.area).max().unwrap_or(0);

    let mut kept = Mask::empty(h, w);
    let mut removed = Vec::new();
    for part in parts {
        if threshold.keeps(part.area, max_area) {
            kept.union_with(&part.mask);
        } else {
            removed.push(part.mask);
        }
    }
    IslandSplit { kept, removed }
}

/// Morphological opening then closing with a diamond of `radius`.
pub fn smooth(mask: &Mask, radius: u8) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    let opened = morphology::open(&mask.to_gray(), Norm::L1, radius);
    let closed = morphology::close(&opened, Norm::L1, radius);
    Mask::from_gray(&closed)
}

/// Output of [`clean_with_rescue`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedMask {
    pub mask: Mask,
    /// Final outline drawn from `mask`.
    pub hull: Mask,
    /// Components removed provisionally, including those later rescued.
    pub removed: Vec<Mask>,
    /// Indices into `removed` that were merged back.
    pub rescued: Vec<usize>,
}

impl CleanedMask {
    pub fn dropped(&self) -> impl Iterator<Item = &Mask> {
        self.removed
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.rescued.contains(i))
            .map(|(_, m)| m)
    }
}

pub fn clean_with_rescue(mask: &Mask, islands: &IslandConfig, hull_config: &HullConfig) -> CleanedMask {
    let split = split_small(mask, &islands.threshold);
    let mut cleaned = smooth(&split.kept, islands.smoothing_radius);

    let mut rescued = Vec::new();
    if islands.rescue && !split.removed.is_empty() {
        let provisional = hull::outline(&cleaned, hull_config);
        for (i, part) in split.removed.iter().enumerate() {
            if part.intersects(&provisional) {
                cleaned.union_with(part);
                rescued.push(i);
            }
        }
    }

    let final_hull = hull::outline(&cleaned, hull_config);
    debug!(
        kept = cleaned.count(),
        removed = split.removed.len(),
        rescued = rescued.len(),
        "island cleaning done"
    );
    CleanedMask {
        mask: cleaned,
        hull: final_hull,
        removed: split.removed,
        rescued,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(mask: &mut Mask, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) {
        for y in rows {
            for x in cols.clone() {
                mask.set(y, x, true);
            }
        }
    }

    /// 500 px U opening upwards: arms at columns 10..15 and 35..40, base at rows 45..50.
    fn horseshoe() -> Mask {
        let mut mask = Mask::empty(60, 60);
        rect(&mut mask, 10..45, 10..15);
        rect(&mut mask, 10..45, 35..40);
        rect(&mut mask, 45..50, 10..40);
        mask
    }

    #[test]
    fn labels_eight_connected_blobs() {
        let mut mask = Mask::empty(8, 8);
        rect(&mut mask, 0..2, 0..2);
        mask.set(2, 2, true); // diagonal neighbour joins the first blob
        rect(&mut mask, 5..8, 5..8);
        let parts = components(&mask);
        let areas: Vec<usize> = parts.iter().map(|c| c.area).collect();
        assert_eq!(areas, vec![5, 9]);
        assert_eq!(largest_component(&mask).count(), 9);
    }

    #[test]
    fn ratio_threshold_splits_components() {
        let mut mask = horseshoe();
        rect(&mut mask, 52..57, 50..54);
        let split = split_small(&mask, &IslandThreshold::default());
        assert_eq!(split.kept.count(), 500);
        assert_eq!(split.removed.len(), 1);
        assert_eq!(split.removed[0].count(), 20);
    }

    #[test]
    fn far_island_is_dropped() {
        let mut mask = horseshoe();
        rect(&mut mask, 52..57, 50..54);
        assert_eq!(mask.count(), 520);

        let cleaned = clean_with_rescue(&mask, &IslandConfig::default(), &HullConfig::default());
        assert_eq!(cleaned.mask.count(), 500);
        assert!(cleaned.rescued.is_empty());
        assert_eq!(cleaned.dropped().count(), 1);
    }

    #[test]
    fn island_on_the_outline_is_rescued() {
        // Sits in the mouth of the U, where the outline closes the opening.
        let mut mask = horseshoe();
        rect(&mut mask, 10..15, 23..27);
        assert_eq!(mask.count(), 520);

        let cleaned = clean_with_rescue(&mask, &IslandConfig::default(), &HullConfig::default());
        assert_eq!(cleaned.mask.count(), 520);
        assert_eq!(cleaned.rescued, vec![0]);
        assert_eq!(cleaned.dropped().count(), 0);
    }

    #[test]
    fn rescue_can_be_disabled() {
        let mut mask = horseshoe();
        rect(&mut mask, 10..15, 23..27);
        let config = IslandConfig {
            rescue: false,
            ..IslandConfig::default()
        };
        let cleaned = clean_with_rescue(&mask, &config, &HullConfig::default());
        assert_eq!(cleaned.mask.count(), 500);
    }

    #[test]
    fn cleaning_a_clean_mask_is_stable() {
        for extra in [(52..57, 50..54), (10..15, 23..27)] {
            let mut mask = horseshoe();
            rect(&mut mask, extra.0, extra.1);
            let once = clean_with_rescue(&mask, &IslandConfig::default(), &HullConfig::default());
            let twice =
                clean_with_rescue(&once.mask, &IslandConfig::default(), &HullConfig::default());
            assert_eq!(twice.mask, once.mask);
            assert_eq!(twice.hull, once.hull);
        }
    }

    #[test]
    fn smoothing_removes_single_pixel_spurs() {
        let mut mask = Mask::empty(20, 20);
        rect(&mut mask, 5..15, 5..15);
        mask.set(2, 10, true);
        let smoothed = smooth(&mask, 1);
        assert!(!smoothed.get(2, 10));
        assert!(smoothed.get(10, 10));
        assert_eq!(smooth(&mask, 0), mask);
    }
}
