//
// metrics.rs
// Sarco-Tools-rs
//
// Per-slice HU table, representative middle slice, and the CSV and overlay files consumers read back by name.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use tracing::{debug, info};

use crate::error::Result;
use crate::mask::MaskSet;
use crate::models::{Compartment, HuStatistics, SliceMetrics, Spacing};
use crate::stats::compute_mask_hu_statistics;

pub const FULL_CSV: &str = "hu_statistics.csv";
pub const MIDDLE_CSV: &str = "hu_statistics_middle_only.csv";
pub const MIDDLE_SUFFIX: &str = "_middle";

const FIELDS: [&str; 6] = ["pixels", "hu_mean", "hu_min", "hu_max", "hu_sum", "area_mm2"];

/// HU statistics of every measured compartment on one slice. A compartment the
/// mask set does not carry is reported like an empty mask.
pub fn slice_metrics(
    filename: &str,
    hu: ArrayView2<'_, i16>,
    masks: &MaskSet,
    spacing: &Spacing,
) -> SliceMetrics {
    let measure = |c: Compartment| {
        masks
            .get(c)
            .map(|m| compute_mask_hu_statistics(hu, m, spacing))
            .unwrap_or_else(HuStatistics::empty)
    };
    SliceMetrics {
        filename: filename.to_string(),
        psoas: measure(Compartment::Psoas),
        combo: measure(Compartment::Combo),
        sat: measure(Compartment::Sat),
        vat: measure(Compartment::Vat),
        is_middle: false,
    }
}

/// Position of the representative slice: `len / 2`, purely by processing order.
pub fn middle_index(len: usize) -> Option<usize> {
    (len > 0).then_some(len / 2)
}

/// Flags the middle row and returns its filename.
pub fn mark_middle(rows: &mut [SliceMetrics]) -> Option<String> {
    let middle = middle_index(rows.len())?;
    for (i, row) in rows.iter_mut().enumerate() {
        row.is_middle = i == middle;
    }
    Some(rows[middle].filename.clone())
}

pub fn csv_header() -> Vec<String> {
    let mut header = vec!["filename".to_string()];
    for c in Compartment::MEASURED {
        header.extend(FIELDS.iter().map(|f| format!("{}_{}", c, f)));
    }
    header.push("is_middle".to_string());
    header
}

fn float_field(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{:.2}", value)
    }
}

pub fn csv_row(row: &SliceMetrics) -> Vec<String> {
    let mut record = vec![row.filename.clone()];
    for c in Compartment::MEASURED {
        let Some(s) = row.get(c) else { continue };
        record.push(s.pixels.to_string());
        record.extend(
            [s.hu_mean, s.hu_min, s.hu_max, s.hu_sum, s.area_mm2]
                .into_iter()
                .map(float_field),
        );
    }
    record.push(if row.is_middle { "True" } else { "False" }.to_string());
    record
}

fn write_table<'a>(path: &Path, rows: impl IntoIterator<Item = &'a SliceMetrics>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(csv_header())?;
    for row in rows {
        writer.write_record(csv_row(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the full table and the one-row middle table into `dir`.
pub fn write_csvs(rows: &[SliceMetrics], dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let full = dir.join(FULL_CSV);
    let middle = dir.join(MIDDLE_CSV);
    write_table(&full, rows)?;
    write_table(&middle, rows.iter().filter(|r| r.is_middle))?;
    info!(rows = rows.len(), ?full, "HU statistics written");
    Ok((full, middle))
}

/// Copies `<base>.png` to `<base>_middle.png` in each overlay directory that has it.
pub fn copy_middle_overlays(dirs: &[&Path], base_name: &str) -> Result<Vec<PathBuf>> {
    let mut copies = Vec::new();
    for dir in dirs {
        let source = dir.join(format!("{}.png", base_name));
        if !source.is_file() {
            continue;
        }
        let target = dir.join(format!("{}{}.png", base_name, MIDDLE_SUFFIX));
        fs::copy(&source, &target)?;
        debug!(?target, "middle overlay copied");
        copies.push(target);
    }
    Ok(copies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Mask;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn row(name: &str) -> SliceMetrics {
        SliceMetrics {
            filename: name.to_string(),
            psoas: HuStatistics::empty(),
            combo: HuStatistics::empty(),
            sat: HuStatistics::empty(),
            vat: HuStatistics::empty(),
            is_middle: false,
        }
    }

    #[test]
    fn middle_is_positional() {
        assert_eq!(middle_index(0), None);
        assert_eq!(middle_index(1), Some(0));
        assert_eq!(middle_index(4), Some(2));
        assert_eq!(middle_index(5), Some(2));

        let mut rows: Vec<_> = ["slice_010", "slice_011", "slice_012", "slice_013"]
            .into_iter()
            .map(row)
            .collect();
        assert_eq!(mark_middle(&mut rows).as_deref(), Some("slice_012"));
        assert!(rows[2].is_middle);
        assert_eq!(rows.iter().filter(|r| r.is_middle).count(), 1);

        rows.reverse();
        assert_eq!(mark_middle(&mut rows).as_deref(), Some("slice_011"));
        assert_eq!(rows.iter().filter(|r| r.is_middle).count(), 1);
    }

    #[test]
    fn missing_compartment_reads_as_empty() {
        let hu = Array2::from_elem((8, 8), 40i16);
        let masks = MaskSet {
            psoas: Some(Mask::from_fn(8, 8, |(y, _)| y < 2)),
            ..MaskSet::default()
        };
        let metrics = slice_metrics("slice_001", hu.view(), &masks, &Spacing::new(1.0, 1.0, 1.0));
        assert_eq!(metrics.psoas.pixels, 16);
        assert_eq!(metrics.psoas.hu_mean, 40.0);
        assert_eq!(metrics.vat.pixels, 0);
        assert!(metrics.vat.hu_mean.is_nan());
    }

    #[test]
    fn csv_contract() {
        let dir = tempdir().expect("tmpdir");
        let mut rows = vec![row("slice_001"), row("slice_002"), row("slice_003")];
        rows[0].combo = HuStatistics {
            pixels: 3,
            hu_mean: 12.346,
            hu_min: -1.0,
            hu_max: 30.0,
            hu_sum: 37.04,
            area_mm2: 2.0,
        };
        mark_middle(&mut rows);

        let (full, middle) = write_csvs(&rows, dir.path()).expect("csv");

        let mut reader = csv::Reader::from_path(&full).expect("reader");
        let header = reader.headers().expect("header").clone();
        assert_eq!(header.len(), 1 + 4 * 6 + 1);
        assert_eq!(&header[0], "filename");
        assert_eq!(&header[7], "combo_pixels");
        assert_eq!(&header[25], "is_middle");

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.expect("row")).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[0][7], "3");
        assert_eq!(&records[0][8], "12.35");
        assert_eq!(&records[0][9], "-1.00");
        assert_eq!(&records[0][2], "");
        assert_eq!(&records[0][25], "False");
        assert_eq!(&records[1][25], "True");

        let mut reader = csv::Reader::from_path(&middle).expect("reader");
        let only: Vec<csv::StringRecord> = reader.records().map(|r| r.expect("row")).collect();
        assert_eq!(only.len(), 1);
        assert_eq!(&only[0][0], "slice_002");
    }

    #[test]
    fn middle_overlays_are_copied_where_present() {
        let root = tempdir().expect("tmpdir");
        let full = root.path().join("full_overlay");
        let fat = root.path().join("fat_overlay");
        fs::create_dir_all(&full).expect("dir");
        fs::create_dir_all(&fat).expect("dir");
        fs::write(full.join("slice_007.png"), b"png").expect("write");

        let copies = copy_middle_overlays(&[&full, &fat], "slice_007").expect("copy");
        assert_eq!(copies, vec![full.join("slice_007_middle.png")]);
        assert!(full.join("slice_007.png").exists());
        assert!(!fat.join("slice_007_middle.png").exists());
    }
}
