//
// image.rs
// Sarco-Tools-rs
//
// Renders HU slices as windowed 8-bit PNGs for the segmenters and blends compartment masks over them.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::ArrayView2;
use tracing::{debug, info};

use crate::axial::AxialSelection;
use crate::config::{ExportMode, HuWindow};
use crate::error::Result;
use crate::mask::Mask;
use crate::models::{slice_base_name, SliceRecord};
use crate::series::Series;

/// Suffix marking the copy handed to the segmentation networks.
pub const INPUT_SUFFIX: &str = "_0000";

pub const PSOAS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const COMBO_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const SAT_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const VAT_COLOR: Rgb<u8> = Rgb([0, 255, 255]);

/// Clips HU to the window and maps it linearly onto 0..=255.
pub fn window_to_gray(hu: ArrayView2<'_, i16>, window: &HuWindow) -> GrayImage {
    let (h, w) = hu.dim();
    let span = window.max - window.min;
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = (hu[[y as usize, x as usize]] as f64).clamp(window.min, window.max);
        let level = ((v - window.min) / span * 255.0).clamp(0.0, 255.0);
        Luma([level as u8])
    })
}

/// Writes `slice_<number>_0000.png` for every selected slice.
///
/// In [`ExportMode::ByZIndex`] the selection's Z ranks pick the files; in
/// [`ExportMode::ByInstanceNumber`] the files whose `InstanceNumber` is listed do.
pub fn export_slices(
    series: &Series,
    selection: &AxialSelection,
    dir: &Path,
    window: &HuWindow,
) -> Result<Vec<SliceRecord>> {
    fs::create_dir_all(dir)?;
    let ranks: HashSet<usize> = selection.z_indices.iter().copied().collect();
    let numbers: HashSet<i64> = selection.instance_numbers.iter().copied().collect();

    let mut records = Vec::new();
    for (z, meta) in series.slices.iter().enumerate() {
        let number = meta.number_or(z);
        let wanted = match selection.mode {
            ExportMode::ByZIndex => ranks.contains(&z),
            ExportMode::ByInstanceNumber => meta.instance_number.is_some_and(|n| numbers.contains(&n)),
        };
        if !wanted {
            continue;
        }
        let Some(plane) = series.axial(z) else {
            continue;
        };

        let record = SliceRecord {
            z_index: z,
            instance_number: number,
            dicom_path: meta.path.clone(),
            input_png: dir.join(format!("{}{}.png", slice_base_name(number), INPUT_SUFFIX)),
            display_png: None,
            representative: false,
        };
        window_to_gray(plane, window).save(&record.input_png)?;
        debug!(z, number, path = ?record.input_png, "slice exported");
        records.push(record);
    }
    info!(count = records.len(), ?dir, "axial slices exported");
    Ok(records)
}

/// Copies each ML-input PNG to its display name (`slice_XXX.png`) and records it.
pub fn promote_display(records: &mut [SliceRecord]) -> Result<()> {
    for record in records.iter_mut() {
        let display = record.input_png.with_file_name(record.png_name());
        fs::copy(&record.input_png, &display)?;
        record.display_png = Some(display);
    }
    Ok(())
}

/// `(1 - alpha) * pixel + alpha * layer` over the whole image, where the layer holds each
/// mask's colour on its pixels and black elsewhere. Pixels off every mask are therefore
/// darkened by `1 - alpha` too. Later layers win where masks overlap; halves round to even.
pub fn overlay(base: &GrayImage, layers: &[(&Mask, Rgb<u8>)], alpha: f32) -> RgbImage {
    let mut colored = RgbImage::new(base.width(), base.height());
    for (mask, color) in layers {
        for (y, x) in mask.foreground() {
            if let Some(pixel) = colored.get_pixel_mut_checked(x as u32, y as u32) {
                *pixel = *color;
            }
        }
    }
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let g = base.get_pixel(x, y).0[0] as f32;
        let layer = colored.get_pixel(x, y).0;
        Rgb(layer.map(|c| {
            let blended = (1.0 - alpha) * g + alpha * c as f32;
            blended.round_ties_even().clamp(0.0, 255.0) as u8
        }))
    })
}
