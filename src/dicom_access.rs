use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, InMemDicomObject};

/// Small helper trait to pull typed values from different DICOM object shapes.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;

    fn has_element(&self, tag: Tag) -> bool;

    /// Multi-valued decimal strings such as `ImagePositionPatient` (`x\y\z`).
    fn element_f64s(&self, tag: Tag) -> Vec<f64> {
        self.element_str(tag)
            .map(|s| {
                s.split('\\')
                    .filter_map(|part| part.trim().parse::<f64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn element_f64(&self, tag: Tag) -> Option<f64> {
        self.element_f64s(tag).first().copied()
    }

    /// Integer strings; tolerates decimal notation such as `12.0`.
    fn element_i64(&self, tag: Tag) -> Option<i64> {
        let text = self.element_str(tag)?;
        let text = text.trim().trim_end_matches('\0');
        text.parse::<i64>()
            .ok()
            .or_else(|| text.parse::<f64>().ok().map(|v| v.round() as i64))
    }
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.into_owned())
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.into_owned())
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }
}
