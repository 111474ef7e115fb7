//
// sagittal.rs
// Sarco-Tools-rs
//
// Builds the isotropic mid-sagittal reference image and maps an L3 mask drawn on it back to volume space.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array2, Axis};
use tracing::{debug, info};

use crate::error::Result;
use crate::mask::{Mask, FOREGROUND};
use crate::models::Spacing;
use crate::reconcile::islands;
use crate::series::Series;

pub const INPUT_PNG: &str = "sagittal_midResize_0000.png";
pub const DISPLAY_PNG: &str = "sagittal_midResize.png";
const L3_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Mid-X sagittal plane of a series, before and after isotropic resizing.
#[derive(Debug, Clone)]
pub struct SagittalImage {
    pub x_index: usize,
    /// HU plane `[Z, Y]` as stored in the volume.
    pub plane: Array2<i16>,
    /// Plane with its height scaled by `sz / sy`.
    pub resized: Array2<f32>,
}

impl SagittalImage {
    /// `(height, width)` of the volume-space plane, i.e. `(Z, Y)`.
    pub fn original_shape(&self) -> (usize, usize) {
        self.plane.dim()
    }

    pub fn resized_shape(&self) -> (usize, usize) {
        self.resized.dim()
    }
}

/// An L3 mask in both resolutions: as drawn on the reference image, and mapped to `(Z, Y)`.
#[derive(Debug, Clone)]
pub struct L3Mask {
    pub cleaned: Mask,
    pub restored: Mask,
}

/// Paths of the two renderings of the sagittal image.
#[derive(Debug, Clone, PartialEq)]
pub struct SagittalPngs {
    pub input: PathBuf,
    pub display: PathBuf,
}

pub fn extract(series: &Series) -> SagittalImage {
    let (_, _, width) = series.shape();
    let x_index = width / 2;
    let plane = series.volume.index_axis(Axis(2), x_index).to_owned();
    let resized = resize_isotropic(&plane, &series.spacing);
    debug!(
        x_index,
        original = ?plane.dim(),
        resized = ?resized.dim(),
        "mid-sagittal plane extracted"
    );
    SagittalImage {
        x_index,
        plane,
        resized,
    }
}

/// Linear resize of the `[Z, Y]` plane along Z so one pixel spans the same distance on both axes.
/// Only the height changes, so interpolation runs between neighbouring rows.
pub fn resize_isotropic(plane: &Array2<i16>, spacing: &Spacing) -> Array2<f32> {
    let (height, width) = plane.dim();
    let new_height = (((height as f64) * spacing.sz / spacing.sy) as usize).max(1);
    let scale = height as f64 / new_height as f64;
    let last = height.saturating_sub(1) as f64;

    let mut out = Array2::<f32>::zeros((new_height, width));
    for (y, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
        // Pixel centres aligned, edges clamped.
        let src = ((y as f64 + 0.5) * scale - 0.5).clamp(0.0, last);
        let y0 = src.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let t = src - y0 as f64;
        for (x, v) in row.iter_mut().enumerate() {
            let a = plane[[y0, x]] as f64;
            let b = plane[[y1, x]] as f64;
            // Truncated to whole HU like the stored plane.
            *v = (a + (b - a) * t).trunc() as f32;
        }
    }
    out
}

/// Mean-centred window spanning the full value range; zero pixels become white.
pub fn balanced_render(values: &Array2<f32>) -> GrayImage {
    let (height, width) = values.dim();
    let count = values.len().max(1) as f32;
    let mean = values.sum() / count;
    let min = values.fold(f32::INFINITY, |a, &b| a.min(b));
    let max = values.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let span = max - min;
    let lo = mean - span / 2.0;
    let hi = mean + span / 2.0;

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = values[[y as usize, x as usize]];
        let level = if span > 0.0 {
            ((v.clamp(lo, hi) - lo) / (hi - lo) * 255.0) as u8
        } else {
            0
        };
        Luma([if level == 0 { FOREGROUND } else { level }])
    })
}

/// Writes the ML-input and display renderings into `dir`.
pub fn write_pngs(image: &SagittalImage, dir: &Path) -> Result<SagittalPngs> {
    fs::create_dir_all(dir)?;
    let rendered = balanced_render(&image.resized);
    let input = dir.join(INPUT_PNG);
    let display = dir.join(DISPLAY_PNG);
    rendered.save(&input)?;
    fs::copy(&input, &display)?;
    info!(?input, "sagittal reference written");
    Ok(SagittalPngs { input, display })
}

/// Loads a vertebra mask; only pixels equal to 255 are foreground.
pub fn load_mask(path: &Path) -> Result<Mask> {
    let gray = image::open(path)?.to_luma8();
    let mask = Mask::from_gray_exact(&gray, FOREGROUND);
    if mask.is_empty() {
        debug!(?path, "no 255-valued pixel in sagittal mask");
    }
    Ok(mask)
}

/// Nearest-neighbour resize of a mask drawn on the resized image back to `(Z, Y)`.
pub fn restore_mask(mask: &Mask, original_shape: (usize, usize)) -> Mask {
    let (height, width) = original_shape;
    if mask.shape() == original_shape {
        return mask.clone();
    }
    let restored = imageops::resize(
        &mask.to_gray(),
        width as u32,
        height as u32,
        FilterType::Nearest,
    );
    Mask::from_gray(&restored)
}

/// Load, optionally reduce to the largest blob, and restore to volume space.
pub fn prepare_l3_mask(path: &Path, image: &SagittalImage, keep_largest: bool) -> Result<L3Mask> {
    let mut cleaned = load_mask(path)?;
    if keep_largest {
        cleaned = islands::largest_component(&cleaned);
    }
    let restored = restore_mask(&cleaned, image.original_shape());
    Ok(L3Mask { cleaned, restored })
}

/// Paints mask pixels solid green over the reference rendering. A mask of another size is
/// stretched onto the reference first.
pub fn l3_overlay(reference: &GrayImage, mask: &Mask) -> RgbImage {
    let (width, height) = reference.dimensions();
    let mask = if mask.shape() == (height as usize, width as usize) {
        mask.clone()
    } else {
        Mask::from_gray(&imageops::resize(&mask.to_gray(), width, height, FilterType::Nearest))
    };
    RgbImage::from_fn(width, height, |x, y| {
        if mask.get(y as usize, x as usize) {
            L3_COLOR
        } else {
            let g = reference.get_pixel(x, y).0[0];
            Rgb([g, g, g])
        }
    })
}

/// Writes the cleaned mask into `clean_dir` and its overlay on `reference` into `overlay_dir`,
/// both under the display name.
pub fn write_l3_outputs(
    mask: &Mask,
    reference: &Path,
    clean_dir: &Path,
    overlay_dir: &Path,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(clean_dir)?;
    fs::create_dir_all(overlay_dir)?;
    let clean = clean_dir.join(DISPLAY_PNG);
    mask.save(&clean)?;
    let gray = image::open(reference)?.to_luma8();
    let overlay = overlay_dir.join(DISPLAY_PNG);
    l3_overlay(&gray, mask).save(&overlay)?;
    debug!(?clean, ?overlay, "L3 mask and overlay written");
    Ok((clean, overlay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SliceMeta;
    use ndarray::Array3;

    fn series(depth: usize, rows: usize, cols: usize, spacing: Spacing) -> Series {
        let volume = Array3::from_shape_fn((depth, rows, cols), |(z, y, x)| {
            (z * 100 + y * 10 + x) as i16
        });
        let slices = (0..depth)
            .map(|z| SliceMeta {
                path: PathBuf::from(format!("{z}.dcm")),
                instance_number: Some(z as i64 + 1),
                z_position: Some(z as f64),
            })
            .collect();
        Series::new(volume, spacing, slices).expect("series")
    }

    #[test]
    fn picks_mid_x_and_scales_height() {
        let s = series(4, 6, 5, Spacing::new(1.0, 1.0, 2.5));
        let image = extract(&s);
        assert_eq!(image.x_index, 2);
        assert_eq!(image.original_shape(), (4, 6));
        assert_eq!(image.resized_shape(), (10, 6));
        assert_eq!(image.plane[[3, 1]], 312);
    }

    #[test]
    fn balanced_render_maps_extremes_and_whitens_zero() {
        let values = Array2::from_shape_vec((1, 3), vec![0.0, 50.0, 100.0]).expect("shape");
        let gray = balanced_render(&values);
        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(gray.get_pixel(1, 0).0[0], 127);
        assert_eq!(gray.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn flat_image_renders_white() {
        let values = Array2::from_elem((2, 2), 7.0f32);
        let gray = balanced_render(&values);
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn l3_overlay_paints_mask_green() {
        let reference = GrayImage::from_pixel(4, 6, Luma([90]));
        let mask = Mask::from_fn(6, 4, |(y, x)| y == 2 && x < 2);
        let out = l3_overlay(&reference, &mask);
        assert_eq!(out.get_pixel(0, 2), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(3, 2), &Rgb([90, 90, 90]));

        // Drawn at half size: each mask pixel covers a 2x2 block of the reference.
        let small = Mask::from_fn(3, 2, |(y, x)| y == 1 && x == 0);
        let out = l3_overlay(&reference, &small);
        assert_eq!(out.get_pixel(1, 3), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(2, 3), &Rgb([90, 90, 90]));
    }

    #[test]
    fn l3_outputs_use_the_display_name() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let reference = dir.path().join(INPUT_PNG);
        GrayImage::from_pixel(4, 4, Luma([10])).save(&reference).expect("reference");
        let mask = Mask::from_fn(4, 4, |(y, _)| y == 1);

        let (clean, overlay) = write_l3_outputs(
            &mask,
            &reference,
            &dir.path().join("L3_clean_mask"),
            &dir.path().join("L3_overlay"),
        )
        .expect("write");
        assert!(clean.ends_with("L3_clean_mask/sagittal_midResize.png"));
        assert_eq!(load_mask(&clean).expect("reload"), mask);
        let painted = image::open(&overlay).expect("overlay").to_rgb8();
        assert_eq!(painted.get_pixel(2, 1), &Rgb([0, 255, 0]));
        assert_eq!(painted.get_pixel(2, 2), &Rgb([10, 10, 10]));
    }

    #[test]
    fn restore_brings_rows_back_to_slices() {
        // Drawn on a 2x-stretched image: rows 4..8 of 10 cover slices 2..4 of 5.
        let drawn = Mask::from_fn(10, 3, |(y, _)| (4..8).contains(&y));
        let restored = restore_mask(&drawn, (5, 3));
        assert_eq!(restored.shape(), (5, 3));
        let rows: Vec<usize> = (0..5).filter(|&z| restored.get(z, 1)).collect();
        assert_eq!(rows, vec![2, 3]);
    }
}
