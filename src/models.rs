//
// models.rs
// Sarco-Tools-rs
//
// Defines serializable data structures for spacing, slices, HU statistics, volumes, and case reports.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SkipReason;

/// Physical millimetres per voxel along X, Y and Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    pub sx: f64,
    pub sy: f64,
    pub sz: f64,
}

impl Spacing {
    pub fn new(sx: f64, sy: f64, sz: f64) -> Self {
        Self { sx, sy, sz }
    }

    pub fn is_valid(&self) -> bool {
        [self.sx, self.sy, self.sz]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }

    /// In-plane pixel area in mm², `sx * sy`. Equal to the squared first `PixelSpacing`
    /// value for square pixels; non-square pixels use both values on purpose.
    pub fn pixel_area_mm2(&self) -> f64 {
        self.sx * self.sy
    }

    pub fn voxel_volume_mm3(&self) -> f64 {
        self.sx * self.sy * self.sz
    }
}

/// Axis-aligned box `(x1, y1)`–`(x2, y2)` in slice pixels, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl RoiBox {
    pub fn whole_image(width: usize, height: usize) -> Self {
        Self {
            x1: 0,
            y1: 0,
            x2: width as i64,
            y2: height as i64,
        }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        let (x, y) = (x as i64, y as i64);
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }
}

/// Anatomical compartments produced or derived per slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compartment {
    Psoas,
    Muscle,
    Combo,
    Fat,
    Sat,
    Vat,
    Bone,
}

impl Compartment {
    /// Compartments that get HU statistics and a volume, in CSV column order.
    pub const MEASURED: [Compartment; 4] = [
        Compartment::Psoas,
        Compartment::Combo,
        Compartment::Sat,
        Compartment::Vat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Compartment::Psoas => "psoas",
            Compartment::Muscle => "muscle",
            Compartment::Combo => "combo",
            Compartment::Fat => "fat",
            Compartment::Sat => "sat",
            Compartment::Vat => "vat",
            Compartment::Bone => "bone",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exported axial slice. The ML-input and display variants are explicit fields
/// rather than filename suffixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRecord {
    /// Position of the slice in the physically sorted volume.
    pub z_index: usize,
    pub instance_number: i64,
    pub dicom_path: PathBuf,
    /// Copy handed to the segmentation networks.
    pub input_png: PathBuf,
    /// Copy shown to users; present once promoted after segmentation.
    pub display_png: Option<PathBuf>,
    pub representative: bool,
}

impl SliceRecord {
    /// Logical name shared by every per-slice artifact, e.g. `slice_048`.
    pub fn base_name(&self) -> String {
        slice_base_name(self.instance_number)
    }

    pub fn png_name(&self) -> String {
        format!("{}.png", self.base_name())
    }
}

pub fn slice_base_name(instance_number: i64) -> String {
    format!("slice_{:03}", instance_number)
}

/// HU statistics for one compartment on one slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HuStatistics {
    pub pixels: usize,
    pub hu_mean: f64,
    pub hu_min: f64,
    pub hu_max: f64,
    pub hu_sum: f64,
    pub area_mm2: f64,
}

impl HuStatistics {
    pub fn empty() -> Self {
        Self {
            pixels: 0,
            hu_mean: f64::NAN,
            hu_min: f64::NAN,
            hu_max: f64::NAN,
            hu_sum: f64::NAN,
            area_mm2: 0.0,
        }
    }
}

/// All measured compartments of one slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceMetrics {
    pub filename: String,
    pub psoas: HuStatistics,
    pub combo: HuStatistics,
    pub sat: HuStatistics,
    pub vat: HuStatistics,
    pub is_middle: bool,
}

impl SliceMetrics {
    pub fn get(&self, compartment: Compartment) -> Option<&HuStatistics> {
        match compartment {
            Compartment::Psoas => Some(&self.psoas),
            Compartment::Combo => Some(&self.combo),
            Compartment::Sat => Some(&self.sat),
            Compartment::Vat => Some(&self.vat),
            _ => None,
        }
    }
}

/// Whole-case volume and the density-derived mass estimate for one compartment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompartmentVolume {
    pub compartment: Compartment,
    pub volume_mm3: f64,
    pub volume_ml: f64,
    pub mean_hu: f64,
    pub density_g_per_ml: f64,
    pub mass_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSlice {
    pub filename: String,
    pub reason: SkipReason,
}

/// Everything a case run produces in memory; also written as `case_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case_id: String,
    pub spacing: Spacing,
    pub axial_indices: Vec<usize>,
    pub instance_numbers: Vec<i64>,
    pub slices: Vec<SliceMetrics>,
    pub skipped: Vec<SkippedSlice>,
    pub middle_slice: String,
    pub volumes: Vec<CompartmentVolume>,
}
