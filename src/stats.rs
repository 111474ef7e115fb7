//
// stats.rs
// Sarco-Tools-rs
//
// Computes HU statistics of a slice under a binary mask, from arrays or straight from files.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use dicom::object::open_file;
use dicom_dictionary_std::tags;
use ndarray::ArrayView2;

use crate::dicom_access::ElementAccess;
use crate::error::{PipelineError, Result};
use crate::mask::Mask;
use crate::models::{HuStatistics, Spacing};
use crate::series::read_hu;

/// Pixel count, HU mean/min/max/sum and area of `hu` under `mask`.
/// An empty mask yields zero pixels, NaN HU fields and zero area.
///
/// Shapes must match; callers check that before reaching here.
pub fn compute_mask_hu_statistics(hu: ArrayView2<'_, i16>, mask: &Mask, spacing: &Spacing) -> HuStatistics {
    let mut pixels = 0usize;
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for (&value, &inside) in hu.iter().zip(mask.view().iter()) {
        if !inside {
            continue;
        }
        let v = value as f64;
        pixels += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }

    if pixels == 0 {
        return HuStatistics::empty();
    }
    HuStatistics {
        pixels,
        hu_mean: sum / pixels as f64,
        hu_min: min,
        hu_max: max,
        hu_sum: sum,
        area_mm2: pixels as f64 * spacing.pixel_area_mm2(),
    }
}

/// Statistics for one DICOM file and one mask PNG (any non-zero pixel is foreground).
/// In-plane spacing comes from the file's `PixelSpacing`, defaulting to 1 mm.
pub fn hu_statistics_for_file(dicom_path: &Path, mask_path: &Path) -> Result<HuStatistics> {
    let obj = open_file(dicom_path).map_err(|e| PipelineError::dicom(dicom_path, e))?;
    let hu = read_hu(&obj, dicom_path)?;
    let mask = Mask::load(mask_path)?;
    if mask.shape() != hu.dim() {
        return Err(PipelineError::MaskShape {
            mask: mask.shape(),
            slice: hu.dim(),
        });
    }

    let spacing = obj.element_f64s(tags::PIXEL_SPACING);
    let (row, col) = match spacing.as_slice() {
        [row, col, ..] => (*row, *col),
        [single] => (*single, *single),
        [] => (1.0, 1.0),
    };
    Ok(compute_mask_hu_statistics(
        hu.view(),
        &mask,
        &Spacing::new(col, row, 1.0),
    ))
}
