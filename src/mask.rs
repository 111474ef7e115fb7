//
// mask.rs
// Sarco-Tools-rs
//
// Binary slice masks with set algebra and PNG conversions, plus the typed per-slice mask bundle.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use image::{GrayImage, Luma};
use ndarray::{Array2, ArrayView2, Zip};

use crate::error::Result;
use crate::models::{Compartment, RoiBox};

/// Foreground value written to mask PNGs.
pub const FOREGROUND: u8 = 255;

/// A binary mask on a slice's pixel grid, indexed `(row, column)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    pub fn new(data: Array2<bool>) -> Self {
        Self { data }
    }

    pub fn empty(height: usize, width: usize) -> Self {
        Self::new(Array2::from_elem((height, width), false))
    }

    pub fn from_fn(height: usize, width: usize, f: impl FnMut((usize, usize)) -> bool) -> Self {
        Self::new(Array2::from_shape_fn((height, width), f))
    }

    /// Any non-zero pixel is foreground.
    pub fn from_gray(image: &GrayImage) -> Self {
        Self::from_gray_where(image, |v| v > 0)
    }

    /// Only pixels equal to `value` are foreground.
    pub fn from_gray_exact(image: &GrayImage, value: u8) -> Self {
        Self::from_gray_where(image, |v| v == value)
    }

    fn from_gray_where(image: &GrayImage, pred: impl Fn(u8) -> bool) -> Self {
        let (w, h) = image.dimensions();
        Self::from_fn(h as usize, w as usize, |(y, x)| {
            pred(image.get_pixel(x as u32, y as u32).0[0])
        })
    }

    pub fn to_gray(&self) -> GrayImage {
        let (h, w) = self.shape();
        GrayImage::from_fn(w as u32, h as u32, |x, y| {
            Luma([if self.data[[y as usize, x as usize]] {
                FOREGROUND
            } else {
                0
            }])
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path)?.to_luma8();
        Ok(Self::from_gray(&image))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_gray().save(path)?;
        Ok(())
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.data.view()
    }

    pub fn get(&self, y: usize, x: usize) -> bool {
        self.data.get((y, x)).copied().unwrap_or(false)
    }

    pub fn set(&mut self, y: usize, x: usize, value: bool) {
        if let Some(p) = self.data.get_mut((y, x)) {
            *p = value;
        }
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// True when the mask has no foreground pixel.
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|v| *v)
    }

    /// Foreground positions as `(row, column)` in raster order.
    pub fn foreground(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.data
            .indexed_iter()
            .filter(|(_, v)| **v)
            .map(|(pos, _)| pos)
    }

    /// Mean `(row, column)` of the foreground.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        let (mut sy, mut sx, mut n) = (0.0, 0.0, 0usize);
        for (y, x) in self.foreground() {
            sy += y as f64;
            sx += x as f64;
            n += 1;
        }
        (n > 0).then(|| (sy / n as f64, sx / n as f64))
    }

    /// Smallest foreground row and the foreground column range `(top, x_min, x_max)`.
    pub fn extent(&self) -> Option<(usize, usize, usize)> {
        let mut it = self.foreground();
        let (y0, x0) = it.next()?;
        Some(it.fold((y0, x0, x0), |(top, lo, hi), (y, x)| {
            (top.min(y), lo.min(x), hi.max(x))
        }))
    }

    pub fn union(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a || b)
    }

    pub fn intersection(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && b)
    }

    pub fn difference(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && !b)
    }

    pub fn union_with(&mut self, other: &Mask) {
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|a, &b| *a = *a || b);
    }

    pub fn intersects(&self, other: &Mask) -> bool {
        self.data
            .iter()
            .zip(other.data.iter())
            .any(|(a, b)| *a && *b)
    }

    pub fn is_subset_of(&self, other: &Mask) -> bool {
        self.data
            .iter()
            .zip(other.data.iter())
            .all(|(a, b)| !*a || *b)
    }

    fn zip_with(&self, other: &Mask, f: impl Fn(bool, bool) -> bool) -> Mask {
        Mask::new(Zip::from(&self.data).and(&other.data).map_collect(|&a, &b| f(a, b)))
    }
}

/// The masks known for one slice. A `None` field means the compartment was not
/// produced for this slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskSet {
    pub psoas: Option<Mask>,
    pub muscle: Option<Mask>,
    pub combo: Option<Mask>,
    pub fat: Option<Mask>,
    pub sat: Option<Mask>,
    pub vat: Option<Mask>,
    pub bone: Option<Mask>,
    /// Final body-outline drawing used for the SAT/VAT split.
    pub hull: Option<Mask>,
    pub roi: Option<RoiBox>,
}

impl MaskSet {
    pub fn get(&self, compartment: Compartment) -> Option<&Mask> {
        match compartment {
            Compartment::Psoas => self.psoas.as_ref(),
            Compartment::Muscle => self.muscle.as_ref(),
            Compartment::Combo => self.combo.as_ref(),
            Compartment::Fat => self.fat.as_ref(),
            Compartment::Sat => self.sat.as_ref(),
            Compartment::Vat => self.vat.as_ref(),
            Compartment::Bone => self.bone.as_ref(),
        }
    }

    pub fn set(&mut self, compartment: Compartment, mask: Mask) {
        let slot = match compartment {
            Compartment::Psoas => &mut self.psoas,
            Compartment::Muscle => &mut self.muscle,
            Compartment::Combo => &mut self.combo,
            Compartment::Fat => &mut self.fat,
            Compartment::Sat => &mut self.sat,
            Compartment::Vat => &mut self.vat,
            Compartment::Bone => &mut self.bone,
        };
        *slot = Some(mask);
    }

    /// Shapes of every present mask, paired with their compartment.
    pub fn shapes(&self) -> Vec<(Compartment, (usize, usize))> {
        [
            Compartment::Psoas,
            Compartment::Muscle,
            Compartment::Combo,
            Compartment::Fat,
            Compartment::Sat,
            Compartment::Vat,
            Compartment::Bone,
        ]
        .into_iter()
        .filter_map(|c| self.get(c).map(|m| (c, m.shape())))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(h: usize, w: usize, y0: usize, x0: usize, size: usize) -> Mask {
        Mask::from_fn(h, w, |(y, x)| {
            (y0..y0 + size).contains(&y) && (x0..x0 + size).contains(&x)
        })
    }

    #[test]
    fn gray_roundtrip_keeps_geometry() {
        let mask = square(6, 9, 1, 2, 3);
        let gray = mask.to_gray();
        assert_eq!(gray.dimensions(), (9, 6));
        assert_eq!(gray.get_pixel(2, 1).0[0], FOREGROUND);
        assert_eq!(gray.get_pixel(1, 2).0[0], 0);
        assert_eq!(Mask::from_gray(&gray), mask);
    }

    #[test]
    fn exact_value_loading_ignores_other_labels() {
        let mut gray = GrayImage::new(3, 1);
        gray.put_pixel(0, 0, Luma([255]));
        gray.put_pixel(1, 0, Luma([128]));
        let mask = Mask::from_gray_exact(&gray, 255);
        assert_eq!(mask.count(), 1);
        assert!(mask.get(0, 0));
    }

    #[test]
    fn set_algebra() {
        let a = square(10, 10, 0, 0, 4);
        let b = square(10, 10, 2, 2, 4);
        assert_eq!(a.intersection(&b).count(), 4);
        assert_eq!(a.union(&b).count(), 28);
        assert_eq!(a.difference(&b).count(), 12);
        assert!(a.intersects(&b));
        assert!(a.intersection(&b).is_subset_of(&a));
        assert!(!a.is_subset_of(&b));
    }

    #[test]
    fn centroid_and_extent() {
        let mask = square(10, 10, 2, 4, 3);
        assert_eq!(mask.centroid(), Some((3.0, 5.0)));
        assert_eq!(mask.extent(), Some((2, 4, 6)));
        assert_eq!(Mask::empty(3, 3).centroid(), None);
        assert!(Mask::empty(3, 3).is_empty());
    }
}
