//! Image preprocessing ahead of recognition.
//!
//! `Standard` only converts to grayscale. `Aggressive` additionally stretches contrast
//! to the full range and binarizes with Otsu's threshold, which recovers faint pencil
//! strokes on washed-out phone photos at the cost of some noise. The escalated
//! self-correction pass always uses `Aggressive`.

use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessMode {
    #[default]
    Standard,
    Aggressive,
}

/// Apply the preprocessing mode to an image.
pub fn preprocess(image: &DynamicImage, mode: PreprocessMode) -> DynamicImage {
    let gray = image.to_luma8();
    match mode {
        PreprocessMode::Standard => DynamicImage::ImageLuma8(gray),
        PreprocessMode::Aggressive => {
            let stretched = stretch_contrast(&gray);
            let threshold = otsu_threshold(&stretched);
            DynamicImage::ImageLuma8(binarize(&stretched, threshold))
        }
    }
}

/// Linearly remap intensities so the darkest pixel becomes 0 and the brightest 255.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), Luma([v])| (lo.min(*v), hi.max(*v)));
    if max <= min {
        return gray.clone();
    }

    let range = (max - min) as f32;
    let mut out = gray.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = (((*v - min) as f32 / range) * 255.0).round() as u8;
    }
    out
}

/// Otsu's threshold: the intensity that maximizes between-class variance.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for Luma([v]) in gray.pixels() {
        histogram[*v as usize] += 1;
    }

    let total = gray.pixels().len() as f64;
    if total == 0.0 {
        return 128;
    }
    let weighted_total: f64 = histogram.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut background_weight = 0.0;
    let mut background_sum = 0.0;
    let mut best_variance = -1.0;
    let mut best_threshold = 0u8;

    for (level, &count) in histogram.iter().enumerate() {
        background_weight += count as f64;
        if background_weight == 0.0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0.0 {
            break;
        }

        background_sum += level as f64 * count as f64;
        let background_mean = background_sum / background_weight;
        let foreground_mean = (weighted_total - background_sum) / foreground_weight;
        let variance = background_weight * foreground_weight * (background_mean - foreground_mean).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best_threshold = level as u8;
        }
    }

    best_threshold
}

/// Pixels at or below `threshold` become ink (0), the rest paper (255).
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = gray.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = if *v <= threshold { 0 } else { 255 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn two_tone(dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([dark]) } else { Luma([light]) })
    }

    #[test]
    fn test_standard_is_grayscale_only() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([200, 100, 50])));
        let out = preprocess(&image, PreprocessMode::Standard);
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        let gray = out.to_luma8();
        assert!(gray.pixels().all(|p| p.0[0] > 0 && p.0[0] < 255));
    }

    #[test]
    fn test_otsu_separates_two_tones() {
        let gray = two_tone(60, 180);
        let threshold = otsu_threshold(&gray);
        assert!((60..180).contains(&threshold));
    }

    #[test]
    fn test_aggressive_produces_binary_image() {
        let image = DynamicImage::ImageLuma8(two_tone(110, 150));
        let out = preprocess(&image, PreprocessMode::Aggressive).to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(19, 0).0[0], 255);
    }

    #[test]
    fn test_stretch_contrast_flat_image_unchanged() {
        let gray = GrayImage::from_pixel(5, 5, Luma([77]));
        assert_eq!(stretch_contrast(&gray), gray);
    }

    #[test]
    fn test_stretch_contrast_full_range() {
        let stretched = stretch_contrast(&two_tone(100, 150));
        assert_eq!(stretched.get_pixel(0, 0).0[0], 0);
        assert_eq!(stretched.get_pixel(19, 0).0[0], 255);
    }
}
