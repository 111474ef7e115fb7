//
// collaborators.rs
// Sarco-Tools-rs
//
// Seams for the external segmentation models, with implementations that read their outputs from disk.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PipelineError, Result, SkipReason};
use crate::mask::{Mask, MaskSet};
use crate::models::{Compartment, RoiBox, SliceRecord};
use crate::reconcile::roi;

/// Produces an L3 mask for the sagittal reference image (255 = foreground, same size as the PNG).
pub trait VertebraLocator {
    fn locate_l3(&self, sagittal_png: &Path) -> Result<PathBuf>;
}

/// Produces the raw psoas, muscle, fat and bone masks of one exported slice.
pub trait SliceSegmenter {
    fn segment(&self, slice: &SliceRecord) -> std::result::Result<MaskSet, SkipReason>;
}

/// Body bounding box of one slice. `Ok(None)` means no box was detected: use the whole image.
pub trait RoiDetector {
    fn detect(&self, slice: &SliceRecord) -> std::result::Result<Option<RoiBox>, SkipReason>;
}

/// An L3 mask that was produced ahead of time.
#[derive(Debug, Clone)]
pub struct MaskFileLocator {
    path: PathBuf,
}

impl MaskFileLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VertebraLocator for MaskFileLocator {
    fn locate_l3(&self, sagittal_png: &Path) -> Result<PathBuf> {
        if !self.path.is_file() {
            return Err(PipelineError::Collaborator(format!(
                "L3 mask {:?} not found for {:?}",
                self.path, sagittal_png
            )));
        }
        Ok(self.path.clone())
    }
}

/// Segmenter outputs laid out as `<root>/{psoas,muscle,fat,bone}/slice_XXX.png`
/// and `<root>/roi_info/slice_XXX_0000.txt`.
#[derive(Debug, Clone)]
pub struct MaskDirectory {
    root: PathBuf,
}

const SEGMENTED: [Compartment; 4] = [
    Compartment::Psoas,
    Compartment::Muscle,
    Compartment::Fat,
    Compartment::Bone,
];

impl MaskDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn mask_path(&self, compartment: Compartment, slice: &SliceRecord) -> PathBuf {
        self.root.join(compartment.as_str()).join(slice.png_name())
    }

    pub fn roi_path(&self, slice: &SliceRecord) -> PathBuf {
        self.root
            .join("roi_info")
            .join(format!("{}_0000.txt", slice.base_name()))
    }
}

impl SliceSegmenter for MaskDirectory {
    /// Absent files leave the compartment unset; reconciliation decides whether that matters.
    fn segment(&self, slice: &SliceRecord) -> std::result::Result<MaskSet, SkipReason> {
        let mut masks = MaskSet::default();
        for compartment in SEGMENTED {
            let path = self.mask_path(compartment, slice);
            if !path.is_file() {
                debug!(?path, %compartment, "mask not found");
                continue;
            }
            let mask = Mask::load(&path)
                .map_err(|e| SkipReason::UnreadableImage(format!("{}: {}", path.display(), e)))?;
            masks.set(compartment, mask);
        }
        Ok(masks)
    }
}

impl RoiDetector for MaskDirectory {
    /// Without a `roi_info/` directory no detector ran and every slice uses the whole
    /// image; with one, a slice lacking its file is skipped.
    fn detect(&self, slice: &SliceRecord) -> std::result::Result<Option<RoiBox>, SkipReason> {
        if !self.root.join("roi_info").is_dir() {
            return Ok(None);
        }
        let path = self.roi_path(slice);
        if !path.is_file() {
            return Err(SkipReason::MissingRoi);
        }
        roi::read(&path).map_err(|e| SkipReason::UnreadableImage(format!("{}: {}", path.display(), e)))
    }
}

/// Raw masks plus ROI box of one slice.
pub fn collect_masks(
    slice: &SliceRecord,
    segmenter: &dyn SliceSegmenter,
    detector: &dyn RoiDetector,
) -> std::result::Result<MaskSet, SkipReason> {
    let mut masks = segmenter.segment(slice)?;
    masks.roi = detector.detect(slice)?;
    Ok(masks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record(number: i64) -> SliceRecord {
        SliceRecord {
            z_index: 0,
            instance_number: number,
            dicom_path: PathBuf::from("x.dcm"),
            input_png: PathBuf::from(format!("slice_{:03}_0000.png", number)),
            display_png: None,
            representative: false,
        }
    }

    fn write_mask(root: &Path, compartment: &str, name: &str) {
        let dir = root.join(compartment);
        fs::create_dir_all(&dir).expect("mkdir");
        Mask::from_fn(4, 4, |(y, _)| y == 1).save(&dir.join(name)).expect("save");
    }

    #[test]
    fn reads_masks_by_slice_name() {
        let root = tempdir().expect("tmpdir");
        write_mask(root.path(), "psoas", "slice_012.png");
        write_mask(root.path(), "fat", "slice_012.png");
        let masks = MaskDirectory::new(root.path())
            .segment(&record(12))
            .expect("segment");
        assert_eq!(masks.psoas.as_ref().map(Mask::count), Some(4));
        assert!(masks.fat.is_some());
        assert!(masks.muscle.is_none());
        assert!(masks.bone.is_none());
    }

    #[test]
    fn corrupt_mask_is_unreadable() {
        let root = tempdir().expect("tmpdir");
        fs::create_dir_all(root.path().join("muscle")).expect("mkdir");
        fs::write(root.path().join("muscle/slice_003.png"), b"not a png").expect("write");
        let err = MaskDirectory::new(root.path()).segment(&record(3)).unwrap_err();
        assert!(matches!(err, SkipReason::UnreadableImage(_)));
    }

    #[test]
    fn roi_lookup() {
        let root = tempdir().expect("tmpdir");
        let dir = MaskDirectory::new(root.path());
        assert_eq!(dir.detect(&record(5)), Ok(None));

        fs::create_dir_all(root.path().join("roi_info")).expect("mkdir");
        assert_eq!(dir.detect(&record(5)), Err(SkipReason::MissingRoi));

        fs::write(root.path().join("roi_info/slice_005_0000.txt"), "3 4 60 70\n").expect("write");
        assert_eq!(
            dir.detect(&record(5)),
            Ok(Some(RoiBox {
                x1: 3,
                y1: 4,
                x2: 60,
                y2: 70
            }))
        );
    }

    #[test]
    fn locator_requires_the_file() {
        let root = tempdir().expect("tmpdir");
        let missing = MaskFileLocator::new(root.path().join("l3.png"));
        assert!(matches!(
            missing.locate_l3(Path::new("sag.png")),
            Err(PipelineError::Collaborator(_))
        ));
    }
}
