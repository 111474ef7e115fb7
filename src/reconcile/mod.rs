//
// reconcile/mod.rs
// Sarco-Tools-rs
//
// Turns the raw per-slice segmenter masks into consistent psoas, muscle, combo, SAT and VAT compartments.
//
// Thales Matheus Mendonça Santos - November 2025

pub mod fat;
pub mod hull;
pub mod islands;
pub mod psoas;
pub mod roi;
pub mod skeleton;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::SkipReason;
use crate::mask::{Mask, MaskSet};
use crate::models::{Compartment, RoiBox};

/// Reconciled masks of one slice plus what island cleaning took out.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSlice {
    pub masks: MaskSet,
    /// Muscle components removed by the area filter, rescued ones included.
    pub removed: Vec<Mask>,
    /// Indices into `removed` merged back through the hull.
    pub rescued: Vec<usize>,
}

/// Reconciles raw masks on a `shape` pixel grid.
///
/// Requires psoas, muscle and fat. A bone mask, when present, drives psoas
/// disambiguation; without one the psoas mask is taken as is. A missing ROI box
/// means the whole image.
pub fn reconcile_slice(
    raw: &MaskSet,
    shape: (usize, usize),
    config: &PipelineConfig,
) -> Result<ReconciledSlice, SkipReason> {
    if let Some((_, mask)) = raw.shapes().into_iter().find(|(_, s)| *s != shape) {
        return Err(SkipReason::ShapeMismatch { mask, slice: shape });
    }
    let psoas = raw
        .psoas
        .as_ref()
        .ok_or(SkipReason::MissingMask(Compartment::Psoas))?;
    let muscle = raw
        .muscle
        .as_ref()
        .ok_or(SkipReason::MissingMask(Compartment::Muscle))?;
    let fat = raw
        .fat
        .as_ref()
        .ok_or(SkipReason::MissingMask(Compartment::Fat))?;

    let (h, w) = shape;
    let roi_box = raw.roi.unwrap_or_else(|| RoiBox::whole_image(w, h));
    let psoas = roi::filter(psoas, &roi_box);
    let muscle = roi::filter(muscle, &roi_box);
    let fat = roi::filter(fat, &roi_box);

    let psoas = match &raw.bone {
        Some(bone) if bone.is_empty() => return Err(SkipReason::NoBoneLandmark),
        Some(bone) => {
            let candidates: Vec<Mask> = islands::components(&psoas)
                .into_iter()
                .map(|c| c.mask)
                .collect();
            psoas::select(&candidates, bone, &config.psoas)
                .map_err(SkipReason::PsoasRejected)?
                .combined()
        }
        None => psoas,
    };

    let cleaned = islands::clean_with_rescue(&muscle, &config.islands, &config.hull);
    let combo = psoas.union(&cleaned.mask);
    let split = fat::split(&fat, &cleaned.hull);
    debug!(
        psoas = psoas.count(),
        muscle = cleaned.mask.count(),
        sat = split.sat.count(),
        vat = split.vat.count(),
        "slice reconciled"
    );

    let masks = MaskSet {
        psoas: Some(psoas),
        muscle: Some(cleaned.mask),
        combo: Some(combo),
        fat: Some(fat),
        sat: Some(split.sat),
        vat: Some(split.vat),
        bone: raw.bone.clone(),
        hull: Some(cleaned.hull),
        roi: Some(roi_box),
    };
    Ok(ReconciledSlice {
        masks,
        removed: cleaned.removed,
        rescued: cleaned.rescued,
    })
}
