//
// reconcile/psoas.rs
// Sarco-Tools-rs
//
// Psoas left/right disambiguation anchored on the vertebral body.
//
// Thales Matheus Mendonça Santos - November 2025

use imageproc::distance_transform::euclidean_squared_distance_transform;
use tracing::debug;

use crate::config::PsoasConfig;
use crate::error::PsoasRejection;
use crate::mask::Mask;

#[derive(Debug, Clone, PartialEq)]
pub struct PsoasSelection {
    pub left: Mask,
    pub right: Mask,
    /// Candidates kept for being close to bone without being ranked first or second.
    pub extras: Vec<Mask>,
}

impl PsoasSelection {
    /// Left, right and extras merged.
    pub fn combined(&self) -> Mask {
        let mut out = self.left.union(&self.right);
        for extra in &self.extras {
            out.union_with(extra);
        }
        out
    }
}

struct Candidate<'a> {
    mask: &'a Mask,
    mean_distance: f64,
    min_distance: f64,
}

/// Horizontal midpoint of the bone extent.
fn bone_center_x(bone: &Mask) -> Option<f64> {
    bone.extent()
        .map(|(_, x_min, x_max)| (x_min + x_max) as f64 / 2.0)
}

/// Keeps candidates that sit below the top of the bone and whose centroid is not on bone.
fn plausible<'a>(candidates: &'a [Mask], bone: &Mask, bone_top: usize, config: &PsoasConfig) -> Vec<&'a Mask> {
    candidates
        .iter()
        .filter(|m| {
            let area = m.count();
            if area == 0 {
                return false;
            }
            let above = m.foreground().filter(|&(y, _)| y < bone_top).count();
            if above as f64 / area as f64 > config.max_above_bone_fraction {
                return false;
            }
            match m.centroid() {
                Some((cy, cx)) => !bone.get(cy.round() as usize, cx.round() as usize),
                None => false,
            }
        })
        .collect()
}

/// Distance from every pixel to the nearest bone pixel, indexed `(row, column)`.
fn bone_distance(bone: &Mask) -> impl Fn(usize, usize) -> f64 {
    let squared = euclidean_squared_distance_transform(&bone.to_gray());
    move |y, x| squared.get_pixel(x as u32, y as u32).0[0].sqrt()
}

/// Picks the left and right psoas among `candidates`, or explains why the slice is unusable.
pub fn select(candidates: &[Mask], bone: &Mask, config: &PsoasConfig) -> Result<PsoasSelection, PsoasRejection> {
    let (bone_top, _, _) = bone.extent().ok_or(PsoasRejection::NoCandidates)?;
    let center = bone_center_x(bone).ok_or(PsoasRejection::NoCandidates)?;

    let valid = plausible(candidates, bone, bone_top, config);
    match valid.len() {
        0 => return Err(PsoasRejection::NoCandidates),
        1 => return Err(PsoasRejection::SingleCandidate),
        _ => {}
    }

    let distance = bone_distance(bone);
    let mut ranked: Vec<Candidate> = valid
        .into_iter()
        .map(|mask| {
            let values: Vec<f64> = mask.foreground().map(|(y, x)| distance(y, x)).collect();
            Candidate {
                mask,
                mean_distance: values.iter().sum::<f64>() / values.len() as f64,
                min_distance: values.iter().copied().fold(f64::INFINITY, f64::min),
            }
        })
        .collect();
    ranked.sort_by(|a, b| a.mean_distance.total_cmp(&b.mean_distance));

    let extras: Vec<Mask> = ranked[2..]
        .iter()
        .filter(|c| c.min_distance < config.proximity_threshold)
        .map(|c| c.mask.clone())
        .collect();

    let pool = ranked[..2].iter().map(|c| c.mask).chain(extras.iter());
    let (mut left, mut right): (Option<&Mask>, Option<&Mask>) = (None, None);
    let (mut left_area, mut right_area) = (0usize, 0usize);
    for mask in pool {
        let Some((_, cx)) = mask.centroid() else {
            continue;
        };
        let area = mask.count();
        let (slot, best) = if cx < center {
            (&mut left, &mut left_area)
        } else {
            (&mut right, &mut right_area)
        };
        // Strictly larger, so the earlier candidate wins a tie.
        if slot.is_none() || area > *best {
            *slot = Some(mask);
            *best = area;
        }
    }

    let (Some(left), Some(right)) = (left, right) else {
        return Err(PsoasRejection::SingleSide);
    };
    validate(left, right, center, config)?;

    debug!(
        left = left.count(),
        right = right.count(),
        extras = extras.len(),
        "psoas pair accepted"
    );
    Ok(PsoasSelection {
        left: left.clone(),
        right: right.clone(),
        extras,
    })
}

fn validate(left: &Mask, right: &Mask, center: f64, config: &PsoasConfig) -> Result<(), PsoasRejection> {
    let (area_l, area_r) = (left.count(), right.count());
    if area_l == 0 || area_r == 0 {
        return Err(PsoasRejection::EmptySide);
    }
    let ratio = area_l as f64 / area_r as f64;
    if ratio < config.min_area_ratio || ratio > config.max_area_ratio {
        return Err(PsoasRejection::AreaRatio { ratio });
    }
    let lx = left.centroid().map_or(f64::NAN, |(_, x)| x);
    let rx = right.centroid().map_or(f64::NAN, |(_, x)| x);
    if !(lx < center && rx > center) {
        return Err(PsoasRejection::NotSymmetric);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 64;

    fn rect(rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Mask {
        Mask::from_fn(SIZE, SIZE, |(y, x)| rows.contains(&y) && cols.contains(&x))
    }

    /// Vertebral body centred on column 31.5, rows 20..36.
    fn bone() -> Mask {
        rect(20..36, 24..40)
    }

    #[test]
    fn picks_the_pair_beside_the_vertebra() {
        let left = rect(30..42, 14..22);
        let right = rect(30..42, 42..50);
        let far = rect(50..54, 2..6);
        let selection = select(&[left.clone(), far, right.clone()], &bone(), &PsoasConfig::default())
            .expect("accepted");
        assert_eq!(selection.left, left);
        assert_eq!(selection.right, right);
        assert!(selection.extras.is_empty());
        assert_eq!(selection.combined().count(), 96 * 2);
    }

    #[test]
    fn close_third_fragment_is_kept() {
        let left = rect(30..42, 14..22);
        let right = rect(30..42, 42..50);
        // Farther on average than the pair, but within reach of the bone.
        let fragment = rect(38..50, 40..42);
        let selection = select(&[left, right, fragment.clone()], &bone(), &PsoasConfig::default())
            .expect("accepted");
        assert_eq!(selection.extras, vec![fragment]);
    }

    #[test]
    fn drops_candidates_above_the_bone_or_on_it() {
        let high = rect(2..20, 14..22);
        let on_bone = rect(26..30, 30..34);
        let right = rect(30..42, 42..50);
        let err = select(&[high, on_bone, right], &bone(), &PsoasConfig::default()).unwrap_err();
        assert_eq!(err, PsoasRejection::SingleCandidate);
    }

    #[test]
    fn both_on_one_side_is_rejected() {
        let a = rect(30..42, 42..50);
        let b = rect(44..50, 42..50);
        let err = select(&[a, b], &bone(), &PsoasConfig::default()).unwrap_err();
        assert_eq!(err, PsoasRejection::SingleSide);
    }

    #[test]
    fn lopsided_pair_fails_area_ratio() {
        let left = rect(30..32, 20..22);
        let right = rect(30..46, 42..52);
        let err = select(&[left, right], &bone(), &PsoasConfig::default()).unwrap_err();
        assert!(matches!(err, PsoasRejection::AreaRatio { ratio } if ratio < 0.25));
    }

    #[test]
    fn right_side_centred_on_the_midline_is_not_symmetric() {
        let left = rect(30..42, 14..22);
        // Columns 28..36 put the centroid at 31.5, exactly on the bone midline.
        let under = rect(40..52, 28..36);
        let err = select(&[left, under], &bone(), &PsoasConfig::default()).unwrap_err();
        assert_eq!(err, PsoasRejection::NotSymmetric);
    }

    #[test]
    fn nothing_left_after_filtering() {
        let err = select(&[], &bone(), &PsoasConfig::default()).unwrap_err();
        assert_eq!(err, PsoasRejection::NoCandidates);
    }
}
