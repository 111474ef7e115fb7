//
// axial.rs
// Sarco-Tools-rs
//
// Maps a volume-space sagittal L3 mask onto the axial slices it intersects.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::Serialize;
use tracing::info;

use crate::config::ExportMode;
use crate::error::{PipelineError, Result};
use crate::mask::Mask;
use crate::series::Series;

/// Slices crossed by the L3 mask. `z_indices` are ranks in the physically sorted volume;
/// `instance_numbers` are the DICOM numbers to export. The two are never interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxialSelection {
    pub z_indices: Vec<usize>,
    pub instance_numbers: Vec<i64>,
    pub mode: ExportMode,
}

impl AxialSelection {
    pub fn is_empty(&self) -> bool {
        self.z_indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.z_indices.len()
    }
}

/// For each row `z` of a `[Z, Y]` mask, records `z` if any column is foreground.
/// Rows are visited in ascending order and the scan of a row stops at its first hit.
pub fn select_axial_indices(mask: &Mask) -> Vec<usize> {
    let (depth, width) = mask.shape();
    (0..depth)
        .filter(|&z| (0..width).any(|y| mask.get(z, y)))
        .collect()
}

/// `total - 1 - z` for every index: the InstanceNumbers of the selected slices when
/// numbering runs opposite to physical Z.
pub fn reversed_numbers(total: usize, indices: &[i64]) -> Vec<i64> {
    indices.iter().map(|z| total as i64 - 1 - z).collect()
}

/// Runs the selector on a restored mask and resolves the numbers to export.
pub fn select(series: &Series, mask: &Mask, mode: ExportMode) -> Result<AxialSelection> {
    let z_indices = select_axial_indices(mask);
    if z_indices.is_empty() {
        return Err(PipelineError::EmptySagittalMask);
    }

    let instance_numbers = match mode {
        // The file at each rank keeps its own number.
        ExportMode::ByZIndex => z_indices
            .iter()
            .map(|&z| {
                series
                    .slices
                    .get(z)
                    .map_or(z as i64, |meta| meta.number_or(z))
            })
            .collect(),
        ExportMode::ByInstanceNumber => {
            let ranks: Vec<i64> = z_indices.iter().map(|&z| z as i64).collect();
            reversed_numbers(series.depth(), &ranks)
        }
    };

    info!(
        count = z_indices.len(),
        first = z_indices.first().copied(),
        last = z_indices.last().copied(),
        ?mode,
        "axial range selected"
    );
    Ok(AxialSelection {
        z_indices,
        instance_numbers,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Spacing;
    use crate::series::SliceMeta;
    use ndarray::Array3;
    use std::path::PathBuf;

    fn series_with_numbers(numbers: &[i64]) -> Series {
        let depth = numbers.len();
        let slices = numbers
            .iter()
            .enumerate()
            .map(|(z, n)| SliceMeta {
                path: PathBuf::from(format!("{z}.dcm")),
                instance_number: Some(*n),
                z_position: Some(z as f64),
            })
            .collect();
        Series::new(
            Array3::zeros((depth, 4, 4)),
            Spacing::new(1.0, 1.0, 1.0),
            slices,
        )
        .expect("series")
    }

    #[test]
    fn selects_rows_with_foreground_at_any_column() {
        // (5, 100, 80) volume, mask foreground only on Z 1..=3 at scattered Y.
        let mask = Mask::from_fn(5, 100, |(z, y)| match z {
            1 => y == 97,
            2 => (40..60).contains(&y),
            3 => y == 0 || y == 50,
            _ => false,
        });
        let selected = select_axial_indices(&mask);
        assert_eq!(selected, vec![1, 2, 3]);
        assert_eq!(reversed_numbers(5, &[1, 2, 3]), vec![3, 2, 1]);
    }

    #[test]
    fn keeps_gaps_of_the_mask_itself() {
        let mask = Mask::from_fn(8, 3, |(z, _)| matches!(z, 2 | 3 | 5 | 6));
        assert_eq!(select_axial_indices(&mask), vec![2, 3, 5, 6]);
    }

    #[test]
    fn contiguous_band_is_returned_exactly() {
        for (z0, z1) in [(0usize, 0usize), (3, 9), (10, 19)] {
            let mask = Mask::from_fn(20, 7, |(z, y)| (z0..=z1).contains(&z) && y == (z * 3) % 7);
            let expected: Vec<usize> = (z0..=z1).collect();
            assert_eq!(select_axial_indices(&mask), expected);
        }
    }

    #[test]
    fn reversal_is_an_involution() {
        for total in [1usize, 5, 64] {
            let indices: Vec<i64> = (0..total as i64).step_by(3).collect();
            let twice = reversed_numbers(total, &reversed_numbers(total, &indices));
            assert_eq!(twice, indices);
        }
    }

    #[test]
    fn empty_mask_is_a_case_error() {
        let series = series_with_numbers(&[1, 2, 3]);
        let err = select(&series, &Mask::empty(3, 4), ExportMode::ByZIndex).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySagittalMask));
    }

    #[test]
    fn modes_keep_ranks_and_numbers_apart() {
        // Instance numbers run opposite to physical Z.
        let series = series_with_numbers(&[5, 4, 3, 2, 1]);
        let mask = Mask::from_fn(5, 2, |(z, _)| z == 0 || z == 1);

        let by_z = select(&series, &mask, ExportMode::ByZIndex).expect("by z");
        assert_eq!(by_z.z_indices, vec![0, 1]);
        assert_eq!(by_z.instance_numbers, vec![5, 4]);

        let by_number = select(&series, &mask, ExportMode::ByInstanceNumber).expect("by number");
        assert_eq!(by_number.z_indices, vec![0, 1]);
        assert_eq!(by_number.instance_numbers, vec![4, 3]);
    }
}
