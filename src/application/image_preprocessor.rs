// Image preprocessing before remote vision analysis
use crate::domain::error::AnalysisError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::borrow::Cow;

pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessSettings {
    /// Upper bound for the longer edge, in pixels
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Re-encoded image ready to upload
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    settings: PreprocessSettings,
}

impl ImagePreprocessor {
    pub fn new(settings: PreprocessSettings) -> Self {
        Self { settings }
    }

    pub fn preprocess(&self, input: &[u8]) -> Result<EncodedImage, AnalysisError> {
        let image = decode_image(input)?;
        self.preprocess_image(&image)
    }

    pub fn preprocess_image(&self, image: &DynamicImage) -> Result<EncodedImage, AnalysisError> {
        let bounded = bound_longer_edge(image, self.settings.max_dimension, FilterType::CatmullRom);
        let (width, height) = bounded.dimensions();
        let rgb = bounded.to_rgb8();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.settings.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| AnalysisError::Decode(format!("re-encoding failed: {}", e)))?;

        tracing::debug!(
            "Preprocessed {}x{} image to {}x{} ({} bytes)",
            image.width(),
            image.height(),
            width,
            height,
            bytes.len()
        );

        Ok(EncodedImage {
            bytes,
            mime_type: "image/jpeg",
            width,
            height,
        })
    }
}

/// Decode any supported raster format
pub fn decode_image(input: &[u8]) -> Result<DynamicImage, AnalysisError> {
    if input.is_empty() {
        return Err(AnalysisError::Decode("empty image payload".to_string()));
    }
    image::load_from_memory(input).map_err(|e| AnalysisError::Decode(e.to_string()))
}

/// Shrink so the longer edge is at most `max_dimension`. Never upscales.
pub fn bound_longer_edge(
    image: &DynamicImage,
    max_dimension: u32,
    filter: FilterType,
) -> Cow<'_, DynamicImage> {
    let (width, height) = image.dimensions();
    if width.max(height) <= max_dimension || max_dimension == 0 {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize(max_dimension, max_dimension, filter))
    }
}
