// Edge-density heuristic: a pixel-statistics defect signal with no network dependency
use crate::application::image_preprocessor::{bound_longer_edge, decode_image};
use crate::domain::error::AnalysisError;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;

/// Longer edge of the working resolution the thresholds are tuned against
pub const WORKING_DIMENSION: u32 = 256;
/// Gradient magnitude above which an interior pixel counts as an edge
pub const EDGE_MAGNITUDE_THRESHOLD: f32 = 100.0;
/// Edge density above which the image is a likely defect
pub const EDGE_RATIO_THRESHOLD: f32 = 0.08;
/// Mean gradient magnitude above which the image is a likely defect
pub const AVG_MAGNITUDE_THRESHOLD: f32 = 35.0;

type Kernel3 = [[f32; 3]; 3];

const SOBEL_KERNEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_KERNEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeAnalysis {
    pub is_likely_defect: bool,
    /// Fraction of interior pixels whose magnitude exceeds the edge threshold
    pub edge_ratio: f32,
    /// Mean gradient magnitude over interior pixels
    pub avg_magnitude: f32,
}

/// Decode and analyse raw image bytes
pub fn detect_edge_defect_bytes(input: &[u8]) -> Result<EdgeAnalysis, AnalysisError> {
    let image = decode_image(input)?;
    Ok(detect_edge_defect(&image))
}

/// Classify an image as a likely structural defect from its Sobel gradient field.
///
/// A high edge density (many moderate edges, rough damage) or a high mean
/// magnitude (few very sharp edges, a crack) are both treated as signals.
pub fn detect_edge_defect(image: &DynamicImage) -> EdgeAnalysis {
    let working = bound_longer_edge(image, WORKING_DIMENSION, FilterType::Triangle);
    let rgb = working.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);

    let gray: Vec<f32> = rgb
        .pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .collect();

    let (edge_ratio, avg_magnitude) = gradient_statistics(&gray, w, h);
    let is_likely_defect =
        edge_ratio > EDGE_RATIO_THRESHOLD || avg_magnitude > AVG_MAGNITUDE_THRESHOLD;

    tracing::debug!(
        "Edge heuristic on {}x{}: edge_ratio={:.4}, avg_magnitude={:.2}, defect={}",
        w,
        h,
        edge_ratio,
        avg_magnitude,
        is_likely_defect
    );

    EdgeAnalysis {
        is_likely_defect,
        edge_ratio,
        avg_magnitude,
    }
}

/// Edge density and mean magnitude over the interior (1-pixel border excluded)
fn gradient_statistics(gray: &[f32], w: usize, h: usize) -> (f32, f32) {
    if w < 3 || h < 3 {
        return (0.0, 0.0);
    }

    let mut edge_count = 0usize;
    let mut magnitude_sum = 0.0f64;

    for y in 1..h - 1 {
        let rows = [
            &gray[(y - 1) * w..y * w],
            &gray[y * w..(y + 1) * w],
            &gray[(y + 1) * w..(y + 2) * w],
        ];
        for x in 1..w - 1 {
            let mut gx = 0.0;
            let mut gy = 0.0;
            for (ky, row) in rows.iter().enumerate() {
                let kx_row = &SOBEL_KERNEL_X[ky];
                let ky_row = &SOBEL_KERNEL_Y[ky];
                gx += row[x - 1] * kx_row[0] + row[x] * kx_row[1] + row[x + 1] * kx_row[2];
                gy += row[x - 1] * ky_row[0] + row[x] * ky_row[1] + row[x + 1] * ky_row[2];
            }

            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude > EDGE_MAGNITUDE_THRESHOLD {
                edge_count += 1;
            }
            magnitude_sum += magnitude as f64;
        }
    }

    let interior = ((w - 2) * (h - 2)) as f64;
    (
        (edge_count as f64 / interior) as f32,
        (magnitude_sum / interior) as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{checkerboard_image, encode_png, uniform_image};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_uniform_image_is_clean() {
        let analysis = detect_edge_defect(&DynamicImage::ImageRgb8(uniform_image(64, 64, 120)));
        assert!(!analysis.is_likely_defect);
        assert_eq!(analysis.edge_ratio, 0.0);
        assert_eq!(analysis.avg_magnitude, 0.0);
    }

    #[test]
    fn test_checkerboard_is_likely_defect() {
        let analysis = detect_edge_defect(&DynamicImage::ImageRgb8(checkerboard_image(64, 64, 4)));
        assert!(analysis.is_likely_defect);
        assert!(analysis.edge_ratio > EDGE_RATIO_THRESHOLD);
    }

    #[test]
    fn test_single_sharp_line_trips_edge_ratio() {
        // A dark vertical crack across a bright 32x32 panel
        let img = RgbImage::from_fn(32, 32, |x, _| {
            if x == 16 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let analysis = detect_edge_defect(&DynamicImage::ImageRgb8(img));

        // Columns 15 and 17 see the full step: 2 of 30 interior columns
        assert!((analysis.edge_ratio - 2.0 / 30.0).abs() < 1e-4);
        assert!(analysis.avg_magnitude > AVG_MAGNITUDE_THRESHOLD);
        assert!(analysis.is_likely_defect);
    }

    #[test]
    fn test_tiny_image_has_no_interior() {
        let analysis = detect_edge_defect(&DynamicImage::ImageRgb8(checkerboard_image(2, 2, 1)));
        assert!(!analysis.is_likely_defect);
        assert_eq!(analysis.edge_ratio, 0.0);
    }

    #[test]
    fn test_heuristic_is_deterministic() {
        let png = encode_png(&checkerboard_image(300, 180, 7));
        let first = detect_edge_defect_bytes(&png).unwrap();
        for _ in 0..3 {
            assert_eq!(detect_edge_defect_bytes(&png).unwrap(), first);
        }
    }

    #[test]
    fn test_invalid_bytes_are_rejected() {
        assert!(matches!(
            detect_edge_defect_bytes(b"nope"),
            Err(AnalysisError::Decode(_))
        ));
    }
}
