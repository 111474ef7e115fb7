//
// volume.rs
// Sarco-Tools-rs
//
// Physical volume of stacked slice masks and the HU-density mass approximation derived from it.
//
// Thales Matheus Mendonça Santos - November 2025

use ndarray::{Array3, Axis};

use crate::error::{PipelineError, Result};
use crate::mask::Mask;
use crate::models::{Compartment, CompartmentVolume, Spacing};

/// Turns a stack of binary slice masks into a physical volume in mm³.
pub trait VolumeReconstructor {
    fn volume_mm3(&self, stack: &Array3<bool>, spacing: &Spacing) -> Result<f64>;
}

/// Foreground voxel count times voxel volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoxelCountReconstructor;

impl VolumeReconstructor for VoxelCountReconstructor {
    fn volume_mm3(&self, stack: &Array3<bool>, spacing: &Spacing) -> Result<f64> {
        let voxels = stack.iter().filter(|v| **v).count();
        Ok(voxels as f64 * spacing.voxel_volume_mm3())
    }
}

/// Stacks same-shaped masks along a new leading Z axis.
pub fn stack(masks: &[&Mask]) -> Result<Array3<bool>> {
    let Some(first) = masks.first() else {
        return Ok(Array3::from_elem((0, 0, 0), false));
    };
    let (h, w) = first.shape();
    let mut out = Array3::from_elem((masks.len(), h, w), false);
    for (z, mask) in masks.iter().enumerate() {
        if mask.shape() != (h, w) {
            return Err(PipelineError::MaskShape {
                mask: mask.shape(),
                slice: (h, w),
            });
        }
        out.index_axis_mut(Axis(0), z).assign(&mask.view());
    }
    Ok(out)
}

/// `1 + 0.001 * HU` g/mL. A linear approximation of soft-tissue density, not a
/// phantom-calibrated conversion.
pub fn density_from_hu(mean_hu: f64) -> f64 {
    1.0 + 0.001 * mean_hu
}

pub fn mass_grams(volume_mm3: f64, mean_hu: f64) -> f64 {
    volume_mm3 / 1000.0 * density_from_hu(mean_hu)
}

/// Unweighted mean of the finite per-slice means; NaN when there are none.
/// Slices with different areas count equally.
pub fn mean_of_slice_means(means: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = means
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Volume and mass summary of one compartment.
pub fn summarize(
    compartment: Compartment,
    masks: &[&Mask],
    slice_means: impl IntoIterator<Item = f64>,
    spacing: &Spacing,
    reconstructor: &dyn VolumeReconstructor,
) -> Result<CompartmentVolume> {
    let volume_mm3 = reconstructor.volume_mm3(&stack(masks)?, spacing)?;
    let mean_hu = mean_of_slice_means(slice_means);
    Ok(CompartmentVolume {
        compartment,
        volume_mm3,
        volume_ml: volume_mm3 / 1000.0,
        mean_hu,
        density_g_per_ml: density_from_hu(mean_hu),
        mass_g: mass_grams(volume_mm3, mean_hu),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_and_mass_match_the_linear_rule() {
        assert!((density_from_hu(40.0) - 1.04).abs() < 1e-12);
        assert!((mass_grams(1000.0, 40.0) - 1.04).abs() < 1e-12);
        assert!((mass_grams(2500.0, -100.0) - 2.25).abs() < 1e-12);
    }

    #[test]
    fn voxel_count_volume() {
        let full = Mask::from_fn(10, 10, |_| true);
        let stacked = stack(&[&full, &full, &full]).expect("stack");
        let volume = VoxelCountReconstructor
            .volume_mm3(&stacked, &Spacing::new(0.5, 0.5, 2.0))
            .expect("volume");
        assert!((volume - 150.0).abs() < 1e-9);
    }

    #[test]
    fn slice_means_skip_nan_and_ignore_area() {
        assert_eq!(mean_of_slice_means([40.0, f64::NAN, 20.0]), 30.0);
        assert!(mean_of_slice_means([f64::NAN]).is_nan());
        assert!(mean_of_slice_means(std::iter::empty()).is_nan());
    }

    #[test]
    fn mismatched_slices_do_not_stack() {
        let a = Mask::empty(4, 4);
        let b = Mask::empty(5, 4);
        assert!(matches!(stack(&[&a, &b]), Err(PipelineError::MaskShape { .. })));
    }

    #[test]
    fn summary_of_three_constant_slices() {
        // 3 slices of 100 px at 1 mm, each with mean 40 HU; 1000 mm³ in total when sz = 10/3.
        let full = Mask::from_fn(10, 10, |_| true);
        let spacing = Spacing::new(1.0, 1.0, 10.0 / 3.0);
        let summary = summarize(
            Compartment::Combo,
            &[&full, &full, &full],
            [40.0, 40.0, 40.0],
            &spacing,
            &VoxelCountReconstructor,
        )
        .expect("summary");
        assert!((summary.volume_mm3 - 1000.0).abs() < 1e-9);
        assert!((summary.density_g_per_ml - 1.04).abs() < 1e-12);
        assert!((summary.mass_g - 1.04).abs() < 1e-9);
    }
}
