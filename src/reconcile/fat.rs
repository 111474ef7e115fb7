//
// reconcile/fat.rs
// Sarco-Tools-rs
//
// Subcutaneous / visceral fat split.
//
// Thales Matheus Mendonça Santos - November 2025

use crate::mask::Mask;
use crate::reconcile::hull;

#[derive(Debug, Clone, PartialEq)]
pub struct FatSplit {
    pub sat: Mask,
    pub vat: Mask,
}

/// Splits `fat` by a hull outline. Fat strictly inside the outline is visceral;
/// fat outside it, or lying on the outline itself, is subcutaneous.
pub fn split(fat: &Mask, outline: &Mask) -> FatSplit {
    let interior = hull::fill(outline).difference(outline);
    let vat = fat.intersection(&interior);
    let sat = fat.difference(&vat);
    FatSplit { sat, vat }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pixels whose distance from `center` rounds to `radius`.
    fn circle_outline(size: usize, center: (f64, f64), radius: f64) -> Mask {
        Mask::from_fn(size, size, |(y, x)| {
            let d = (y as f64 - center.0).hypot(x as f64 - center.1);
            d >= radius - 0.5 && d < radius + 0.5
        })
    }

    #[test]
    fn circle_inside_full_square() {
        let fat = Mask::from_fn(10, 10, |_| true);
        let outline = circle_outline(10, (5.0, 5.0), 3.0);
        let split = split(&fat, &outline);

        assert_eq!(split.sat.count() + split.vat.count(), 100);
        // 37 pixels enclosed by the drawn circle; its 16 ring pixels count as SAT.
        assert_eq!(hull::fill(&outline).count(), 37);
        assert_eq!(split.vat.count(), 21);
        assert_eq!(split.sat.count(), 79);
        assert!(split.vat.get(5, 5));
        assert!(split.sat.get(2, 5));
    }

    #[test]
    fn compartments_are_disjoint_and_cover_fat() {
        let fat = Mask::from_fn(30, 30, |(y, x)| (x * 7 + y * 3) % 5 < 2);
        let outline = circle_outline(30, (15.0, 14.0), 9.0);
        let split = split(&fat, &outline);

        assert!(!split.sat.intersects(&split.vat));
        assert_eq!(split.sat.union(&split.vat), fat);
        assert!(split.vat.is_subset_of(&hull::fill(&outline)));
    }

    #[test]
    fn no_outline_means_all_subcutaneous() {
        let fat = Mask::from_fn(8, 8, |(y, _)| y > 3);
        let split = split(&fat, &Mask::empty(8, 8));
        assert_eq!(split.sat, fat);
        assert!(split.vat.is_empty());
    }
}
