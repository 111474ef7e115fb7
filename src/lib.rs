//
// lib.rs
// Sarco-Tools-rs
//
// Exposes the crate's modules and re-exports the CLI entry point and the case runner for library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Public surface of the library: pipeline stages in dependency order, then shared utilities.
pub mod series;
pub mod sagittal;
pub mod axial;
pub mod image;
pub mod collaborators;
pub mod reconcile;
pub mod stats;
pub mod volume;
pub mod metrics;
pub mod pipeline;
pub mod batch;

pub mod cli;
pub mod config;
pub mod dicom_access;
pub mod error;
pub mod mask;
pub mod models;
pub mod storage;

pub use cli::{run as run_cli, Cli, Commands};
pub use config::PipelineConfig;
pub use error::{PipelineError, SkipReason};
pub use pipeline::{run_case, CaseContext, Collaborators};
