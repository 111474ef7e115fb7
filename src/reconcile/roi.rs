//
// reconcile/roi.rs
// Sarco-Tools-rs
//
// Body-outline ROI filtering.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::mask::Mask;
use crate::models::RoiBox;

/// Zeroes every foreground pixel outside `roi`. Boxes reaching past the image are clipped.
pub fn filter(mask: &Mask, roi: &RoiBox) -> Mask {
    let (h, w) = mask.shape();
    Mask::from_fn(h, w, |(y, x)| mask.get(y, x) && roi.contains(x, y))
}

/// Parses `x1 y1 x2 y2` from the first line of a detector output.
pub fn parse(text: &str) -> Option<RoiBox> {
    let values: Vec<i64> = text
        .lines()
        .next()?
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok().map(|v| v as i64))
        .collect::<Option<_>>()?;
    match values.as_slice() {
        [x1, y1, x2, y2] => Some(RoiBox {
            x1: *x1,
            y1: *y1,
            x2: *x2,
            y2: *y2,
        }),
        _ => None,
    }
}

/// Reads a box file; `Ok(None)` when the file is absent or malformed.
pub fn read(path: &Path) -> Result<Option<RoiBox>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(parse(&fs::read_to_string(path)?))
}
