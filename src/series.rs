//
// series.rs
// Sarco-Tools-rs
//
// Loads a CT DICOM series into a HU volume sorted by physical slice position, keeping the per-slice file map.
//
// Thales Matheus Mendonça Santos - November 2025

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use dicom::object::{open_file, DefaultDicomObject};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::tags;
use dicom_pixeldata::{ConvertOptions, ModalityLutOption};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::dicom_access::ElementAccess;
use crate::error::{PipelineError, Result};
use crate::models::Spacing;

/// Header fields of one file of the series, in volume order.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceMeta {
    pub path: PathBuf,
    pub instance_number: Option<i64>,
    pub z_position: Option<f64>,
}

impl SliceMeta {
    /// Sort key shared by the loader and the exporters.
    pub fn sort_key(&self) -> f64 {
        self.z_position
            .or(self.instance_number.map(|n| n as f64))
            .unwrap_or(0.0)
    }

    /// `InstanceNumber`, or the Z rank when the header lacks one.
    pub fn number_or(&self, z_index: usize) -> i64 {
        self.instance_number.unwrap_or(z_index as i64)
    }
}

/// A loaded series: HU voxels `[Z, Y, X]` plus spacing and the file behind each Z.
#[derive(Debug, Clone)]
pub struct Series {
    pub volume: Array3<i16>,
    pub spacing: Spacing,
    pub slices: Vec<SliceMeta>,
}

impl Series {
    pub fn new(volume: Array3<i16>, spacing: Spacing, slices: Vec<SliceMeta>) -> Result<Self> {
        if !spacing.is_valid() {
            return Err(PipelineError::InvalidSpacing {
                sx: spacing.sx,
                sy: spacing.sy,
                sz: spacing.sz,
            });
        }
        if volume.len_of(Axis(0)) != slices.len() {
            return Err(PipelineError::InconsistentSeries(format!(
                "{} planes but {} slice headers",
                volume.len_of(Axis(0)),
                slices.len()
            )));
        }
        Ok(Self {
            volume,
            spacing,
            slices,
        })
    }

    /// `(Z, Y, X)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.volume.dim()
    }

    pub fn depth(&self) -> usize {
        self.volume.len_of(Axis(0))
    }

    pub fn axial(&self, z: usize) -> Option<ArrayView2<'_, i16>> {
        (z < self.depth()).then(|| self.volume.index_axis(Axis(0), z))
    }

    /// Z rank of the file carrying `instance_number`, if any.
    pub fn z_for_instance(&self, instance_number: i64) -> Option<usize> {
        self.slices
            .iter()
            .position(|s| s.instance_number == Some(instance_number))
    }
}

/// Lists `.dcm` / `.dcm.pk` files directly inside `dir`, skipping AppleDouble `._*` entries.
pub fn list_dicom_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_lowercase();
            !name.starts_with("._") && (name.ends_with(".dcm") || name.ends_with(".dcm.pk"))
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Reads every DICOM file in `dir` into a volume sorted by `ImagePositionPatient[2]`
/// (falling back to `InstanceNumber`). Unreadable files are skipped with a warning.
pub fn load_series(dir: &Path) -> Result<Series> {
    let files = list_dicom_files(dir);
    if files.is_empty() {
        return Err(PipelineError::NoDicom(dir.to_path_buf()));
    }

    let mut planes = Vec::with_capacity(files.len());
    for path in files {
        match read_plane(&path) {
            Ok(plane) => planes.push(plane),
            Err(e) => warn!(?path, error = %e, "skipping unreadable DICOM file"),
        }
    }
    if planes.is_empty() {
        return Err(PipelineError::NoDicom(dir.to_path_buf()));
    }

    planes.sort_by(|a, b| {
        a.meta
            .sort_key()
            .partial_cmp(&b.meta.sort_key())
            .unwrap_or(Ordering::Equal)
    });

    let (rows, cols) = planes[0].hu.dim();
    if let Some(bad) = planes.iter().find(|p| p.hu.dim() != (rows, cols)) {
        return Err(PipelineError::InconsistentSeries(format!(
            "{:?} is {:?}, expected {:?}",
            bad.meta.path,
            bad.hu.dim(),
            (rows, cols)
        )));
    }

    let (sx, sy) = planes[0].pixel_spacing.unwrap_or((1.0, 1.0));
    let sz = slice_spacing(&planes);
    let spacing = Spacing::new(sx, sy, sz);

    let mut volume = Array3::<i16>::zeros((planes.len(), rows, cols));
    for (z, plane) in planes.iter().enumerate() {
        volume.index_axis_mut(Axis(0), z).assign(&plane.hu);
    }
    let slices: Vec<SliceMeta> = planes.into_iter().map(|p| p.meta).collect();
    debug!(shape = ?volume.dim(), ?spacing, "series loaded");

    Series::new(volume, spacing, slices)
}

struct Plane {
    meta: SliceMeta,
    hu: Array2<i16>,
    /// `(sx, sy)` from `PixelSpacing` (row spacing first in the header).
    pixel_spacing: Option<(f64, f64)>,
    slice_thickness: Option<f64>,
}

fn read_plane(path: &Path) -> Result<Plane> {
    let obj = open_file(path).map_err(|e| PipelineError::dicom(path, e))?;
    let hu = read_hu(&obj, path)?;

    let position = obj.element_f64s(tags::IMAGE_POSITION_PATIENT);
    let spacing = obj.element_f64s(tags::PIXEL_SPACING);
    let pixel_spacing = match spacing.as_slice() {
        [row, col, ..] => Some((*col, *row)),
        [single] => Some((*single, *single)),
        [] => None,
    };

    Ok(Plane {
        meta: SliceMeta {
            path: path.to_path_buf(),
            instance_number: obj.element_i64(tags::INSTANCE_NUMBER),
            z_position: position.get(2).copied(),
        },
        hu,
        pixel_spacing,
        slice_thickness: obj.element_f64(tags::SLICE_THICKNESS),
    })
}

/// Decodes the first frame and applies `RescaleSlope` / `RescaleIntercept`.
pub fn read_hu(obj: &DefaultDicomObject, path: &Path) -> Result<Array2<i16>> {
    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| PipelineError::dicom(path, e))?;
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let raw = decoded
        .to_ndarray_with_options::<f32>(&options)
        .map_err(|e| PipelineError::dicom(path, e))?;

    let slope = obj.element_f64(tags::RESCALE_SLOPE).unwrap_or(1.0);
    let intercept = obj.element_f64(tags::RESCALE_INTERCEPT).unwrap_or(0.0);

    // [frame, row, column, sample]
    let (_, rows, cols, _) = raw.dim();
    let hu = Array2::from_shape_fn((rows, cols), |(r, c)| {
        let value = raw[[0, r, c, 0]] as f64 * slope + intercept;
        value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    });
    Ok(hu)
}

fn slice_spacing(planes: &[Plane]) -> f64 {
    let positions: Vec<f64> = planes.iter().filter_map(|p| p.meta.z_position).collect();
    if positions.len() >= 2 && positions.len() == planes.len() {
        let gap = (positions[1] - positions[0]).abs();
        if gap > 0.0 {
            return gap;
        }
    }
    planes
        .iter()
        .find_map(|p| p.slice_thickness)
        .filter(|t| *t > 0.0)
        .unwrap_or(1.0)
}
