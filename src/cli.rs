//
// cli.rs
// Sarco-Tools-rs
//
// Defines the CLI surface with Clap and dispatches each pipeline stage or the whole case run.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::collaborators::{MaskDirectory, MaskFileLocator};
use crate::config::PipelineConfig;
use crate::pipeline::{self, Collaborators};
use crate::volume::VoxelCountReconstructor;
use crate::{batch, stats};

#[derive(Parser)]
#[command(name = "sarco-tools")]
#[command(about = "L3 body-composition measurements from abdominal CT", long_about = None)]
pub struct Cli {
    /// Log at DEBUG level
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// JSON file overriding the default thresholds
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the mid-sagittal reference PNGs for the vertebra locator
    Sagittal {
        #[arg(long)]
        dicom: PathBuf,
        #[arg(long)]
        case: PathBuf,
    },
    /// Map an L3 sagittal mask onto axial slices and export them
    Select {
        #[arg(long)]
        dicom: PathBuf,
        #[arg(long)]
        case: PathBuf,
        #[arg(long)]
        l3_mask: PathBuf,
    },
    /// Reconcile segmenter masks for exported slices and measure them
    Measure {
        #[arg(long)]
        dicom: PathBuf,
        #[arg(long)]
        case: PathBuf,
        #[arg(long)]
        masks: PathBuf,
    },
    /// Run every stage for one case
    Run {
        #[arg(long)]
        dicom: PathBuf,
        #[arg(long)]
        case: PathBuf,
        #[arg(long)]
        l3_mask: PathBuf,
        #[arg(long)]
        masks: PathBuf,
    },
    /// Run every case folder under a root directory in parallel
    Batch {
        #[arg(long)]
        root: PathBuf,
    },
    /// HU statistics of one DICOM slice under one mask, as JSON
    HuStats {
        #[arg(long)]
        dicom: PathBuf,
        #[arg(long)]
        mask: PathBuf,
    },
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    dispatch(cli)
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    // A subscriber may already be installed when embedded; keep the existing one.
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

fn measure_with(
    dicom: &Path,
    case: &Path,
    masks: &Path,
    l3_mask: Option<&Path>,
    config: PipelineConfig,
) -> anyhow::Result<()> {
    let locator = MaskFileLocator::new(l3_mask.unwrap_or(Path::new("")));
    let directory = MaskDirectory::new(masks);
    let collaborators = Collaborators {
        locator: &locator,
        segmenter: &directory,
        roi: &directory,
        reconstructor: &VoxelCountReconstructor,
    };
    let report = match l3_mask {
        Some(_) => pipeline::run_case(dicom, case, config, &collaborators),
        None => pipeline::measure_case(dicom, case, config, &collaborators),
    }
    .with_context(|| format!("case {:?} failed", case))?;

    println!(
        "{} slices measured, {} skipped, middle slice {}",
        report.slices.len(),
        report.skipped.len(),
        report.middle_slice
    );
    for v in &report.volumes {
        println!(
            "  {:<6} {:>10.2} mL  {:>8.2} HU  {:>10.2} g",
            v.compartment.as_str(),
            v.volume_ml,
            v.mean_hu,
            v.mass_g
        );
    }
    Ok(())
}

pub fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Sagittal { dicom, case } => {
            let pngs = pipeline::prepare_sagittal(&dicom, &case, config)?;
            println!("Sagittal input: {:?}", pngs.input);
            println!("Sagittal display: {:?}", pngs.display);
        }
        Commands::Select {
            dicom,
            case,
            l3_mask,
        } => {
            let locator = MaskFileLocator::new(l3_mask);
            let records = pipeline::select_and_export(&dicom, &case, config, &locator)?;
            println!("Exported {} slices", records.len());
            for r in &records {
                println!("  z {:>4} -> {:?}", r.z_index, r.input_png);
            }
        }
        Commands::Measure { dicom, case, masks } => measure_with(&dicom, &case, &masks, None, config)?,
        Commands::Run {
            dicom,
            case,
            l3_mask,
            masks,
        } => measure_with(&dicom, &case, &masks, Some(&l3_mask), config)?,
        Commands::Batch { root } => {
            if !root.is_dir() {
                bail!("Batch root {:?} is not a directory", root);
            }
            let summary = batch::process_directory(&root, &config);
            println!(
                "Batch finished: {} succeeded, {} failed",
                summary.succeeded.len(),
                summary.failed.len()
            );
            for (case, reason) in &summary.failed {
                eprintln!("  {:?}: {}", case, reason);
            }
            if let Some(table) = &summary.collection {
                println!("Collected results: {:?}", table);
            }
        }
        Commands::HuStats { dicom, mask } => {
            let stats = stats::hu_statistics_for_file(&dicom, &mask)
                .with_context(|| format!("Failed to measure {:?}", dicom))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
