//
// config.rs
// Sarco-Tools-rs
//
// Pipeline configuration.
//
// Every heuristic constant used by the reconciler lives here so a run can be
// tuned from a JSON file instead of by editing code. Unknown keys are rejected,
// missing keys fall back to the defaults below.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub window: HuWindow,
    pub export_mode: ExportMode,
    /// Keep only the largest component of the sagittal L3 mask before mapping it.
    pub keep_largest_l3_component: bool,
    pub islands: IslandConfig,
    pub hull: HullConfig,
    pub psoas: PsoasConfig,
    pub overlay_alpha: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: HuWindow::default(),
            export_mode: ExportMode::ByZIndex,
            keep_largest_l3_component: true,
            islands: IslandConfig::default(),
            hull: HullConfig::default(),
            psoas: PsoasConfig::default(),
            overlay_alpha: 0.5,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config; a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.window.min < self.window.max) {
            return Err(PipelineError::Config(format!(
                "window min {} must be below max {}",
                self.window.min, self.window.max
            )));
        }
        let ratio = self.islands.threshold.ratio();
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(PipelineError::Config(format!(
                "island ratio {ratio} must be in (0, 1]"
            )));
        }
        if !(0.0..=1.0).contains(&self.overlay_alpha) {
            return Err(PipelineError::Config(format!(
                "overlay alpha {} must be in [0, 1]",
                self.overlay_alpha
            )));
        }
        if self.psoas.min_area_ratio > self.psoas.max_area_ratio {
            return Err(PipelineError::Config(
                "psoas min_area_ratio exceeds max_area_ratio".to_string(),
            ));
        }
        Ok(())
    }
}

/// HU range mapped linearly onto 0..=255 when exporting axial slices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HuWindow {
    pub min: f64,
    pub max: f64,
}

impl Default for HuWindow {
    fn default() -> Self {
        Self {
            min: -150.0,
            max: 200.0,
        }
    }
}

/// Which numbering the exporter trusts when picking DICOM files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Rank in the physically sorted volume.
    ByZIndex,
    /// `InstanceNumber`, reversed from the Z ranks.
    ByInstanceNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IslandConfig {
    pub threshold: IslandThreshold,
    /// Radius of the open/close pass applied after filtering; 0 disables it.
    pub smoothing_radius: u8,
    /// Re-merge removed components that touch the hull outline.
    pub rescue: bool,
}

impl Default for IslandConfig {
    fn default() -> Self {
        Self {
            threshold: IslandThreshold::default(),
            smoothing_radius: 0,
            rescue: true,
        }
    }
}

/// Keep rule for connected components, relative to the largest one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IslandThreshold {
    /// Keep when `area >= max_area * ratio`.
    Ratio { ratio: f64 },
    /// Keep when `area >= min_area` and `area >= max_area * ratio`.
    AbsoluteAndRatio { min_area: usize, ratio: f64 },
}

impl Default for IslandThreshold {
    fn default() -> Self {
        IslandThreshold::Ratio { ratio: 1.0 / 8.0 }
    }
}

impl IslandThreshold {
    pub fn ratio(&self) -> f64 {
        match self {
            IslandThreshold::Ratio { ratio } => *ratio,
            IslandThreshold::AbsoluteAndRatio { ratio, .. } => *ratio,
        }
    }

    pub fn keeps(&self, area: usize, max_area: usize) -> bool {
        let relative = area as f64 >= max_area as f64 * self.ratio();
        match self {
            IslandThreshold::Ratio { .. } => relative,
            IslandThreshold::AbsoluteAndRatio { min_area, .. } => area >= *min_area && relative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HullConfig {
    /// Width of the bridges drawn between components.
    pub connect_thickness: u32,
    /// Width of the final outline.
    pub outline_thickness: u32,
}

impl Default for HullConfig {
    fn default() -> Self {
        Self {
            connect_thickness: 1,
            outline_thickness: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PsoasConfig {
    /// Extra candidates closer than this to bone (pixels) are kept.
    pub proximity_threshold: f64,
    pub max_above_bone_fraction: f64,
    pub min_area_ratio: f64,
    pub max_area_ratio: f64,
}

impl Default for PsoasConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: 10.0,
            max_above_bone_fraction: 0.20,
            min_area_ratio: 0.25,
            max_area_ratio: 4.0,
        }
    }
}
