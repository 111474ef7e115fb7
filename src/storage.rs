//
// storage.rs
// Sarco-Tools-rs
//
// Case-scoped output tree with sanitized names and idempotent clearing of stale artifacts.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

pub const LOG_FILE: &str = "pipeline.log";
pub const SUMMARY_FILE: &str = "case_summary.json";
/// Conventional name of a case's output folder inside the case directory.
pub const OUTPUT_DIR: &str = "output";

/// Where every artifact of one case lives. Nothing outside `root` is written.
#[derive(Debug, Clone)]
pub struct CaseLayout {
    root: PathBuf,
}

impl CaseLayout {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identifier derived from the case folder name. For `<case>/output` the
    /// enclosing case folder names the case.
    pub fn case_id(&self) -> String {
        let folder = match self.root.file_name().and_then(|s| s.to_str()) {
            Some(OUTPUT_DIR) => self.root.parent().and_then(|p| p.file_name()),
            _ => self.root.file_name(),
        };
        folder
            .and_then(|s| s.to_str())
            .map(sanitize_filename)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "case".to_string())
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    pub fn sagittal_dir(&self) -> PathBuf {
        self.root.join("L3_png")
    }

    /// The L3 mask after cleaning, at the sagittal reference resolution.
    pub fn l3_clean_dir(&self) -> PathBuf {
        self.root.join("L3_clean_mask")
    }

    pub fn l3_overlay_dir(&self) -> PathBuf {
        self.root.join("L3_overlay")
    }

    pub fn axial_dir(&self) -> PathBuf {
        self.root.join("Axisal")
    }

    pub fn clean_dir(&self) -> PathBuf {
        self.root.join("clean")
    }

    pub fn removed_dir(&self) -> PathBuf {
        self.root.join("removed")
    }

    pub fn hulls_dir(&self) -> PathBuf {
        self.root.join("hulls")
    }

    pub fn sat_dir(&self) -> PathBuf {
        self.root.join("sat")
    }

    pub fn vat_dir(&self) -> PathBuf {
        self.root.join("vat")
    }

    pub fn major_overlay_dir(&self) -> PathBuf {
        self.root.join("major_overlay")
    }

    pub fn full_overlay_dir(&self) -> PathBuf {
        self.root.join("full_overlay")
    }

    pub fn fat_overlay_dir(&self) -> PathBuf {
        self.root.join("fat_overlay")
    }

    /// Everything the measurement stage writes.
    pub fn measure_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.clean_dir(),
            self.removed_dir(),
            self.hulls_dir(),
            self.sat_dir(),
            self.vat_dir(),
            self.major_overlay_dir(),
            self.full_overlay_dir(),
            self.fat_overlay_dir(),
        ]
    }

    pub fn overlay_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.major_overlay_dir(),
            self.full_overlay_dir(),
            self.fat_overlay_dir(),
        ]
    }

    /// Creates `dirs` and clears the outputs a previous run left in them.
    pub fn prepare(&self, dirs: &[PathBuf]) -> Result<()> {
        for dir in dirs {
            fs::create_dir_all(dir)?;
            let cleared = clear_outputs(dir)?;
            if cleared > 0 {
                debug!(?dir, cleared, "stale outputs removed");
            }
        }
        Ok(())
    }
}

/// Deletes the PNG and CSV files directly inside `dir`; anything else is left alone.
pub fn clear_outputs(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let stale = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png") || e.eq_ignore_ascii_case("csv"));
        if stale {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

pub fn sanitize_filename(input: &str) -> String {
    // ASCII word characters and a few safe separators only.
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
