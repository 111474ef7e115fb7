use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::collaborators::{MaskDirectory, MaskFileLocator};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::CaseReport;
use crate::pipeline::{run_case, Collaborators};
use crate::sagittal;
use crate::storage::{CaseLayout, OUTPUT_DIR};
use crate::volume::VoxelCountReconstructor;

pub const DICOM_DIR: &str = "dicom";
pub const L3_MASK: &str = "l3_mask.png";
pub const MASKS_DIR: &str = "masks";
pub const COLLECTION_DIR: &str = "collection_results";
pub const COLLECTION_CSV: &str = "summary.csv";

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<(PathBuf, CaseReport)>,
    pub failed: Vec<(PathBuf, String)>,
    /// Cross-case table, written when at least one case succeeded.
    pub collection: Option<PathBuf>,
}

/// Sub-directories of `root` that carry a `dicom/` folder.
pub fn discover_cases(root: &Path) -> Vec<PathBuf> {
    let mut cases: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.path().join(DICOM_DIR).is_dir())
        .map(|e| e.into_path())
        .collect();
    cases.sort();
    cases
}

/// Runs one case laid out as `dicom/`, `l3_mask.png` and `masks/`, writing into `output/`.
pub fn process_case(case: &Path, config: &PipelineConfig) -> Result<CaseReport> {
    let locator = MaskFileLocator::new(case.join(L3_MASK));
    let masks = MaskDirectory::new(case.join(MASKS_DIR));
    let collaborators = Collaborators {
        locator: &locator,
        segmenter: &masks,
        roi: &masks,
        reconstructor: &VoxelCountReconstructor,
    };
    run_case(
        &case.join(DICOM_DIR),
        &case.join(OUTPUT_DIR),
        config.clone(),
        &collaborators,
    )
}

/// Gathers the middle row of every case into `<out>/summary.csv`, prefixed by `case_id`,
/// and copies each case's middle full overlays and L3 overlay into `<out>/<case_id>/`.
/// Missing images are reported and skipped.
pub fn collect_results(cases: &[(PathBuf, CaseReport)], out: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out)?;
    let table = out.join(COLLECTION_CSV);
    let mut writer = csv::Writer::from_path(&table)?;
    let mut header = vec!["case_id".to_string()];
    header.extend(metrics::csv_header());
    writer.write_record(&header)?;

    for (case, report) in cases {
        for row in report.slices.iter().filter(|r| r.is_middle) {
            let mut record = vec![report.case_id.clone()];
            record.extend(metrics::csv_row(row));
            writer.write_record(&record)?;
        }

        let layout = CaseLayout::new(case.join(OUTPUT_DIR))?;
        let target = out.join(&report.case_id);
        fs::create_dir_all(&target)?;
        let overlays = layout.full_overlay_dir();
        let mut images: Vec<PathBuf> = match fs::read_dir(&overlays) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(&format!("{}.png", metrics::MIDDLE_SUFFIX)))
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        if images.is_empty() {
            warn!(case = ?case, "no middle overlay to collect");
        }
        images.sort();
        images.push(layout.l3_overlay_dir().join(sagittal::DISPLAY_PNG));
        for source in images {
            let Some(name) = source.file_name() else { continue };
            if source.is_file() {
                fs::copy(&source, target.join(name))?;
            } else {
                warn!(?source, "missing image skipped");
            }
        }
    }
    writer.flush()?;
    info!(cases = cases.len(), ?table, "batch results collected");
    Ok(table)
}

/// Processes every case under `root` in parallel; a failing case does not stop the others.
/// Results of the succeeded cases are then gathered under `<root>/collection_results`.
pub fn process_directory(root: &Path, config: &PipelineConfig) -> BatchSummary {
    let cases = discover_cases(root);
    info!(root = ?root, count = cases.len(), "batch started");

    let outcomes: Vec<(PathBuf, Result<CaseReport>)> = cases
        .par_iter()
        .map(|case| (case.clone(), process_case(case, config)))
        .collect();

    let mut summary = BatchSummary::default();
    for (case, outcome) in outcomes {
        match outcome {
            Ok(report) => {
                info!(case = ?case, slices = report.slices.len(), "case done");
                summary.succeeded.push((case, report));
            }
            Err(e) => {
                error!(case = ?case, error = %e, "case failed");
                summary.failed.push((case, e.to_string()));
            }
        }
    }

    if !summary.succeeded.is_empty() {
        match collect_results(&summary.succeeded, &root.join(COLLECTION_DIR)) {
            Ok(table) => summary.collection = Some(table),
            Err(e) => error!(root = ?root, error = %e, "could not collect batch results"),
        }
    }
    summary
}
