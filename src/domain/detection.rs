// Raw detector output, before normalization

/// Bounding box as reported by a detector, in that detector's convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawBox {
    /// Fractions of the image size
    Normalized { x: f64, y: f64, width: f64, height: f64 },
    /// Percent of the image size (0-100)
    Percent { x: f64, y: f64, width: f64, height: f64 },
    /// Pixel coordinates together with the analysed image size
    Pixels {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        image_width: f64,
        image_height: f64,
    },
}

/// One detection as a tier reported it. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetection {
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub bbox: Option<RawBox>,
    pub notes: Option<String>,
    pub model_version: Option<String>,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: Some(label.into()),
            confidence: Some(confidence),
            ..Default::default()
        }
    }

    pub fn with_bbox(mut self, bbox: RawBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
