//
// pipeline.rs
// Sarco-Tools-rs
//
// Runs one case end to end: sagittal reference, L3 range selection, slice export, reconciliation and measurement.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ::image::GrayImage;
use chrono::Local;
use tracing::{info, warn};

use crate::axial::{self, AxialSelection};
use crate::collaborators::{collect_masks, RoiDetector, SliceSegmenter, VertebraLocator};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, SkipReason};
use crate::image::{self as slice_image, COMBO_COLOR, PSOAS_COLOR, SAT_COLOR, VAT_COLOR};
use crate::mask::{Mask, MaskSet};
use crate::metrics;
use crate::models::{
    slice_base_name, CaseReport, Compartment, CompartmentVolume, SkippedSlice, SliceMetrics, SliceRecord,
};
use crate::reconcile::{self, ReconciledSlice};
use crate::sagittal::{self, SagittalImage, SagittalPngs};
use crate::series::{self, Series};
use crate::storage::CaseLayout;
use crate::volume::{self, VolumeReconstructor};

/// Append-only audit log of one case, mirrored to `tracing`.
#[derive(Debug, Clone)]
pub struct CaseLog {
    path: PathBuf,
}

impl CaseLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `[YYYY-mm-dd HH:MM:SS] message`. Write failures are reported, never raised.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(log = ?self.path, "{message}");
        let stamped = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        if let Err(e) = self.append(&stamped) {
            warn!(log = ?self.path, error = %e, "could not write case log");
        }
    }

    pub fn section(&self, title: &str) {
        self.line(format!("===== {title} ====="));
    }

    fn append(&self, text: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(text.as_bytes())
    }
}

/// Everything a stage needs about the case it works on.
#[derive(Debug, Clone)]
pub struct CaseContext {
    pub layout: CaseLayout,
    pub config: PipelineConfig,
    pub log: CaseLog,
}

impl CaseContext {
    pub fn new(case_dir: &Path, config: PipelineConfig) -> Result<Self> {
        let layout = CaseLayout::new(case_dir)?;
        let log = CaseLog::new(layout.log_path());
        Ok(Self { layout, config, log })
    }

    pub fn case_id(&self) -> String {
        self.layout.case_id()
    }
}

/// External models and the volume backend used by a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub locator: &'a dyn VertebraLocator,
    pub segmenter: &'a dyn SliceSegmenter,
    pub roi: &'a dyn RoiDetector,
    pub reconstructor: &'a dyn VolumeReconstructor,
}

/// Output of the measurement stage.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub slices: Vec<SliceMetrics>,
    pub skipped: Vec<SkippedSlice>,
    pub middle_slice: String,
    pub volumes: Vec<CompartmentVolume>,
}

pub fn load_stage(ctx: &CaseContext, dicom_dir: &Path) -> Result<Series> {
    ctx.log.section("load series");
    let series = series::load_series(dicom_dir)?;
    let (z, y, x) = series.shape();
    let s = series.spacing;
    ctx.log.line(format!(
        "volume {z}x{y}x{x} from {dicom_dir:?}, spacing ({:.3}, {:.3}, {:.3}) mm",
        s.sx, s.sy, s.sz
    ));
    Ok(series)
}

pub fn sagittal_stage(ctx: &CaseContext, series: &Series) -> Result<(SagittalImage, SagittalPngs)> {
    ctx.log.section("sagittal reference");
    let dir = ctx.layout.sagittal_dir();
    ctx.layout.prepare(&[dir.clone()])?;
    let image = sagittal::extract(series);
    let pngs = sagittal::write_pngs(&image, &dir)?;
    let (h, w) = image.resized_shape();
    ctx.log.line(format!("mid sagittal x={} resized to {h}x{w}", image.x_index));
    Ok((image, pngs))
}

pub fn select_stage(
    ctx: &CaseContext,
    series: &Series,
    image: &SagittalImage,
    pngs: &SagittalPngs,
    locator: &dyn VertebraLocator,
) -> Result<AxialSelection> {
    ctx.log.section("L3 range");
    let mask_path = locator.locate_l3(&pngs.input)?;
    let mask = sagittal::prepare_l3_mask(&mask_path, image, ctx.config.keep_largest_l3_component)?;
    let l3_dirs = [ctx.layout.l3_clean_dir(), ctx.layout.l3_overlay_dir()];
    ctx.layout.prepare(&l3_dirs)?;
    let (_, overlay) = sagittal::write_l3_outputs(&mask.cleaned, &pngs.input, &l3_dirs[0], &l3_dirs[1])?;
    ctx.log.line(format!("L3 overlay written to {overlay:?}"));
    let selection = axial::select(series, &mask.restored, ctx.config.export_mode)?;
    ctx.log.line(format!(
        "{} slices, z {:?}, numbers {:?}",
        selection.len(),
        selection.z_indices,
        selection.instance_numbers
    ));
    Ok(selection)
}

pub fn export_stage(ctx: &CaseContext, series: &Series, selection: &AxialSelection) -> Result<Vec<SliceRecord>> {
    ctx.log.section("export slices");
    let dir = ctx.layout.axial_dir();
    ctx.layout.prepare(&[dir.clone()])?;
    let records = slice_image::export_slices(series, selection, &dir, &ctx.config.window)?;
    ctx.log.line(format!("exported {} slices to {:?}", records.len(), dir));
    Ok(records)
}

/// Rebuilds slice records from ML-input PNGs already present in the case tree.
pub fn discover_slices(ctx: &CaseContext, series: &Series) -> Result<(Vec<SliceRecord>, Vec<SkippedSlice>)> {
    let dir = ctx.layout.axial_dir();
    if !dir.is_dir() {
        return Ok((Vec::new(), Vec::new()));
    }
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        let Some(number) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_input_name)
        else {
            continue;
        };
        let z = series.z_for_instance(number).or_else(|| {
            usize::try_from(number)
                .ok()
                .filter(|&z| series.slices.get(z).is_some_and(|s| s.instance_number.is_none()))
        });
        let Some(z) = z else {
            skipped.push(SkippedSlice {
                filename: slice_base_name(number) + ".png",
                reason: SkipReason::MissingSlice,
            });
            continue;
        };
        records.push(SliceRecord {
            z_index: z,
            instance_number: number,
            dicom_path: series.slices[z].path.clone(),
            input_png: path,
            display_png: None,
            representative: false,
        });
    }
    records.sort_by_key(|r| r.z_index);
    Ok((records, skipped))
}

fn parse_input_name(name: &str) -> Option<i64> {
    name.strip_prefix("slice_")?
        .strip_suffix(&format!("{}.png", slice_image::INPUT_SUFFIX))?
        .parse()
        .ok()
}

fn save_slice_artifacts(ctx: &CaseContext, record: &SliceRecord, plane: &ReconciledSlice, base: &GrayImage) -> Result<()> {
    let layout = &ctx.layout;
    let name = record.png_name();
    let masks = &plane.masks;
    let alpha = ctx.config.overlay_alpha;

    if let Some(muscle) = &masks.muscle {
        muscle.save(&layout.clean_dir().join(&name))?;
    }
    for (k, part) in plane.removed.iter().enumerate() {
        let numbered = format!("{}_removed_{}.png", record.base_name(), k + 1);
        part.save(&layout.removed_dir().join(numbered))?;
    }
    if let Some(hull) = &masks.hull {
        hull.save(&layout.hulls_dir().join(&name))?;
    }
    if let Some(sat) = &masks.sat {
        sat.save(&layout.sat_dir().join(&name))?;
    }
    if let Some(vat) = &masks.vat {
        vat.save(&layout.vat_dir().join(&name))?;
    }

    let (h, w) = (base.height() as usize, base.width() as usize);
    let empty = Mask::empty(h, w);
    let layer = |c: Compartment| masks.get(c).unwrap_or(&empty);
    slice_image::overlay(base, &[(layer(Compartment::Psoas), PSOAS_COLOR)], alpha)
        .save(layout.major_overlay_dir().join(&name))?;
    slice_image::overlay(base, &[(layer(Compartment::Combo), COMBO_COLOR)], alpha)
        .save(layout.full_overlay_dir().join(&name))?;
    slice_image::overlay(
        base,
        &[(layer(Compartment::Sat), SAT_COLOR), (layer(Compartment::Vat), VAT_COLOR)],
        alpha,
    )
    .save(layout.fat_overlay_dir().join(&name))?;
    Ok(())
}

/// Reconciles and measures every slice, then aggregates the case.
///
/// Slices that cannot be processed are logged and collected in `skipped`; only a
/// case left with no valid slice fails, with [`PipelineError::InsufficientData`].
pub fn measure_stage(
    ctx: &CaseContext,
    series: &Series,
    records: &mut [SliceRecord],
    collaborators: &Collaborators<'_>,
) -> Result<Measurement> {
    ctx.log.section("reconcile and measure");
    ctx.layout.prepare(&ctx.layout.measure_dirs())?;
    slice_image::promote_display(records)?;

    let mut rows = Vec::new();
    let mut kept: Vec<(usize, MaskSet)> = Vec::new();
    let mut skipped = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let filename = record.png_name();
        let outcome = series
            .axial(record.z_index)
            .ok_or(SkipReason::MissingSlice)
            .and_then(|plane| {
                let raw = collect_masks(record, collaborators.segmenter, collaborators.roi)?;
                let reconciled = reconcile::reconcile_slice(&raw, plane.dim(), &ctx.config)?;
                Ok((plane, reconciled))
            });
        let (plane, reconciled) = match outcome {
            Ok(done) => done,
            Err(reason) => {
                warn!(slice = %filename, %reason, "slice skipped");
                ctx.log.line(format!("skip {filename}: {reason}"));
                skipped.push(SkippedSlice { filename, reason });
                continue;
            }
        };

        let base = slice_image::window_to_gray(plane, &ctx.config.window);
        save_slice_artifacts(ctx, record, &reconciled, &base)?;
        let row = metrics::slice_metrics(&filename, plane, &reconciled.masks, &series.spacing);
        ctx.log.line(format!(
            "{filename}: psoas {} px, combo {} px, SAT {} px, VAT {} px, {} islands removed, {} rescued",
            row.psoas.pixels,
            row.combo.pixels,
            row.sat.pixels,
            row.vat.pixels,
            reconciled.removed.len(),
            reconciled.rescued.len()
        ));
        rows.push(row);
        kept.push((i, reconciled.masks));
    }

    let Some(middle_slice) = metrics::mark_middle(&mut rows) else {
        ctx.log.line(format!("no valid slice, {} skipped", skipped.len()));
        return Err(PipelineError::InsufficientData { skipped: skipped.len() });
    };
    if let Some(pos) = metrics::middle_index(kept.len()) {
        let record = &mut records[kept[pos].0];
        record.representative = true;
        let overlay_dirs = ctx.layout.overlay_dirs();
        let dirs: Vec<&Path> = overlay_dirs.iter().map(PathBuf::as_path).collect();
        metrics::copy_middle_overlays(&dirs, &record.base_name())?;
    }
    metrics::write_csvs(&rows, &ctx.layout.full_overlay_dir())?;
    ctx.log.line(format!("middle slice {middle_slice}"));

    let mut volumes = Vec::new();
    for compartment in Compartment::MEASURED {
        let masks: Vec<&Mask> = kept.iter().filter_map(|(_, set)| set.get(compartment)).collect();
        let means = rows.iter().filter_map(|r| r.get(compartment)).map(|s| s.hu_mean);
        let summary = volume::summarize(compartment, &masks, means, &series.spacing, collaborators.reconstructor)?;
        ctx.log.line(format!(
            "{compartment}: {:.2} mL, mean {:.2} HU, {:.2} g",
            summary.volume_ml, summary.mean_hu, summary.mass_g
        ));
        volumes.push(summary);
    }

    Ok(Measurement {
        slices: rows,
        skipped,
        middle_slice,
        volumes,
    })
}

pub fn write_summary(ctx: &CaseContext, report: &CaseReport) -> Result<PathBuf> {
    let path = ctx.layout.summary_path();
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(path)
}

fn report(ctx: &CaseContext, series: &Series, records: &[SliceRecord], measurement: Measurement) -> CaseReport {
    CaseReport {
        case_id: ctx.case_id(),
        spacing: series.spacing,
        axial_indices: records.iter().map(|r| r.z_index).collect(),
        instance_numbers: records.iter().map(|r| r.instance_number).collect(),
        slices: measurement.slices,
        skipped: measurement.skipped,
        middle_slice: measurement.middle_slice,
        volumes: measurement.volumes,
    }
}

fn logged<T>(ctx: &CaseContext, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        ctx.log.line(format!("case failed: {e}"));
    }
    result
}

/// Writes the sagittal reference PNGs for a series.
pub fn prepare_sagittal(dicom_dir: &Path, case_dir: &Path, config: PipelineConfig) -> Result<SagittalPngs> {
    let ctx = CaseContext::new(case_dir, config)?;
    let result = load_stage(&ctx, dicom_dir)
        .and_then(|series| sagittal_stage(&ctx, &series))
        .map(|(_, pngs)| pngs);
    logged(&ctx, result)
}

/// Selects the L3 range from a located mask and exports the axial slices.
pub fn select_and_export(
    dicom_dir: &Path,
    case_dir: &Path,
    config: PipelineConfig,
    locator: &dyn VertebraLocator,
) -> Result<Vec<SliceRecord>> {
    let ctx = CaseContext::new(case_dir, config)?;
    let result = select_stages(&ctx, dicom_dir, locator).map(|(_, records)| records);
    logged(&ctx, result)
}

fn select_stages(
    ctx: &CaseContext,
    dicom_dir: &Path,
    locator: &dyn VertebraLocator,
) -> Result<(Series, Vec<SliceRecord>)> {
    let series = load_stage(ctx, dicom_dir)?;
    let (image, pngs) = sagittal_stage(ctx, &series)?;
    let selection = select_stage(ctx, &series, &image, &pngs, locator)?;
    let records = export_stage(ctx, &series, &selection)?;
    Ok((series, records))
}

/// Measures the slices already exported into the case tree.
pub fn measure_case(
    dicom_dir: &Path,
    case_dir: &Path,
    config: PipelineConfig,
    collaborators: &Collaborators<'_>,
) -> Result<CaseReport> {
    let ctx = CaseContext::new(case_dir, config)?;
    let result = measure_existing(&ctx, dicom_dir, collaborators);
    logged(&ctx, result)
}

fn measure_existing(ctx: &CaseContext, dicom_dir: &Path, collaborators: &Collaborators<'_>) -> Result<CaseReport> {
    let series = load_stage(ctx, dicom_dir)?;
    let (mut records, missing) = discover_slices(ctx, &series)?;
    let mut measurement = measure_stage(ctx, &series, &mut records, collaborators)?;
    measurement.skipped.extend(missing);
    let report = report(ctx, &series, &records, measurement);
    write_summary(ctx, &report)?;
    Ok(report)
}

/// Full pipeline for one case. Re-running overwrites the previous outputs.
pub fn run_case(
    dicom_dir: &Path,
    case_dir: &Path,
    config: PipelineConfig,
    collaborators: &Collaborators<'_>,
) -> Result<CaseReport> {
    let ctx = CaseContext::new(case_dir, config)?;
    ctx.log.section(&format!("case {}", ctx.case_id()));
    let result = run_stages(&ctx, dicom_dir, collaborators);
    logged(&ctx, result)
}

fn run_stages(ctx: &CaseContext, dicom_dir: &Path, collaborators: &Collaborators<'_>) -> Result<CaseReport> {
    let (series, mut records) = select_stages(ctx, dicom_dir, collaborators.locator)?;
    let measurement = measure_stage(ctx, &series, &mut records, collaborators)?;
    let report = report(ctx, &series, &records, measurement);
    let summary = write_summary(ctx, &report)?;
    ctx.log.line(format!("summary written to {summary:?}"));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn case_log_lines_and_sections() {
        let dir = tempdir().expect("tmpdir");
        let log = CaseLog::new(dir.path().join("nested/pipeline.log"));
        log.section("load");
        log.line("42 files");

        let text = fs::read_to_string(log.path()).expect("log");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] ===== load ====="));
        assert!(lines[1].ends_with("] 42 files"));
        // "[YYYY-mm-dd HH:MM:SS] "
        assert_eq!(lines[1].find(']'), Some(20));
    }

    #[test]
    fn unwritable_log_does_not_panic() {
        let dir = tempdir().expect("tmpdir");
        fs::write(dir.path().join("blocker"), b"file").expect("write");
        CaseLog::new(dir.path().join("blocker/pipeline.log")).line("dropped");
    }

    #[test]
    fn removed_parts_are_numbered_from_one() {
        let dir = tempdir().expect("tmpdir");
        let ctx = CaseContext::new(dir.path(), PipelineConfig::default()).expect("context");
        ctx.layout.prepare(&ctx.layout.measure_dirs()).expect("prepare");
        let record = SliceRecord {
            z_index: 0,
            instance_number: 4,
            dicom_path: PathBuf::from("IM0.dcm"),
            input_png: dir.path().join("slice_004_0000.png"),
            display_png: None,
            representative: false,
        };
        let plane = ReconciledSlice {
            masks: MaskSet::default(),
            removed: vec![
                Mask::from_fn(4, 4, |(y, x)| y == 0 && x == 0),
                Mask::from_fn(4, 4, |(y, x)| y == 3 && x == 3),
            ],
            rescued: Vec::new(),
        };

        save_slice_artifacts(&ctx, &record, &plane, &GrayImage::new(4, 4)).expect("artifacts");

        let removed = ctx.layout.removed_dir();
        assert!(removed.join("slice_004_removed_1.png").is_file());
        assert!(removed.join("slice_004_removed_2.png").is_file());
        assert!(!removed.join("slice_004_removed_0.png").exists());
        assert!(ctx.layout.full_overlay_dir().join("slice_004.png").is_file());
    }

    #[test]
    fn input_names_parse() {
        assert_eq!(parse_input_name("slice_048_0000.png"), Some(48));
        assert_eq!(parse_input_name("slice_1234_0000.png"), Some(1234));
        assert_eq!(parse_input_name("slice_048.png"), None);
        assert_eq!(parse_input_name("notes.txt"), None);
    }
}
