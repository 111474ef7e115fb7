//
// error.rs
// Sarco-Tools-rs
//
// Case-level and slice-level failure types. Case errors stop a run; slice skips are collected and reported.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::models::Compartment;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures that prevent a whole case from making progress.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no DICOM files found in {0:?}")]
    NoDicom(PathBuf),
    #[error("invalid voxel spacing ({sx}, {sy}, {sz}); every axis must be positive")]
    InvalidSpacing { sx: f64, sy: f64, sz: f64 },
    #[error("inconsistent series: {0}")]
    InconsistentSeries(String),
    #[error("sagittal mask has no foreground: no L3 region found")]
    EmptySagittalMask,
    #[error("insufficient data: no slice survived reconciliation ({skipped} skipped)")]
    InsufficientData { skipped: usize },
    #[error("DICOM error in {path:?}: {message}")]
    Dicom { path: PathBuf, message: String },
    #[error("mask shape {mask:?} does not match slice shape {slice:?}")]
    MaskShape {
        mask: (usize, usize),
        slice: (usize, usize),
    },
    #[error("external collaborator failed: {0}")]
    Collaborator(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn dicom(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Dicom {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Why a single slice was left out of aggregation.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("missing {0} mask")]
    MissingMask(Compartment),
    #[error("missing ROI box")]
    MissingRoi,
    #[error("unreadable image: {0}")]
    UnreadableImage(String),
    #[error("mask shape {mask:?} does not match slice shape {slice:?}")]
    ShapeMismatch {
        mask: (usize, usize),
        slice: (usize, usize),
    },
    #[error("no bone landmark on slice")]
    NoBoneLandmark,
    #[error("psoas rejected: {0}")]
    PsoasRejected(PsoasRejection),
    #[error("slice not present in the loaded series")]
    MissingSlice,
}

/// Outcome of the psoas left/right sanity checks.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PsoasRejection {
    #[error("no candidate survived filtering")]
    NoCandidates,
    #[error("fewer than two usable candidates")]
    SingleCandidate,
    #[error("could not find both a left and a right component")]
    SingleSide,
    #[error("one side has zero area")]
    EmptySide,
    #[error("left/right area ratio {ratio:.2} out of range")]
    AreaRatio { ratio: f64 },
    #[error("components are not on opposite sides of the bone midline")]
    NotSymmetric,
}
