//! Fractional crop templates for tally-form pages.
//!
//! The rightmost strip of every tally form holds the handwritten counts and nothing
//! else; candidate names and party labels sit in the middle of the page. Position to
//! identity mapping is resolved from reference data outside this crate, so backends
//! only ever need the vote column (plus, on page 1, the summary box with the printed
//! totals). Sending those regions instead of the whole page cuts image tokens by
//! roughly a factor of four.

use crate::form_type::FormTypeHint;
use crate::image::encode_png;
use crate::image::preprocess::{PreprocessMode, preprocess};
use crate::{Result, TallyError};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Axis-aligned box in page fractions (`0.0..=1.0`), origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Region {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width_fraction(&self) -> f64 {
        self.right - self.left
    }

    /// Pixel rectangle `(x, y, width, height)` for an image of the given size.
    ///
    /// Returns `None` when the region is empty at this resolution.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        // Fractions like 0.35 are not exact in binary; nudge before rounding.
        const EPSILON: f64 = 1e-6;
        let scale = |v: f64, size: u32| v.clamp(0.0, 1.0) * size as f64;
        let x0 = (scale(self.left, width) + EPSILON).floor() as u32;
        let y0 = (scale(self.top, height) + EPSILON).floor() as u32;
        let x1 = (scale(self.right, width) - EPSILON).ceil() as u32;
        let y1 = (scale(self.bottom, height) - EPSILON).ceil() as u32;

        let w = x1.min(width).saturating_sub(x0);
        let h = y1.min(height).saturating_sub(y0);
        if w == 0 || h == 0 {
            return None;
        }
        Some((x0, y0, w, h))
    }
}

/// The four regions of interest on a tally form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropTemplate {
    /// Box holding the printed form code (`ส.ส. 5/18`).
    pub form_code: Region,
    /// Box with the valid / invalid / no-vote totals.
    pub summary: Region,
    /// Vote column on page 1, below the summary box.
    pub votes_first_page: Region,
    /// Vote column on continuation pages, which start directly with the table.
    pub votes_continuation: Region,
}

pub const CONSTITUENCY_TEMPLATE: CropTemplate = CropTemplate {
    form_code: Region::new(0.70, 0.00, 1.00, 0.08),
    summary: Region::new(0.05, 0.15, 0.95, 0.35),
    votes_first_page: Region::new(0.85, 0.35, 1.00, 0.95),
    votes_continuation: Region::new(0.85, 0.05, 1.00, 0.95),
};

pub const PARTY_LIST_TEMPLATE: CropTemplate = CropTemplate {
    form_code: Region::new(0.70, 0.00, 1.00, 0.06),
    summary: Region::new(0.05, 0.12, 0.95, 0.30),
    votes_first_page: Region::new(0.85, 0.30, 1.00, 0.97),
    votes_continuation: Region::new(0.85, 0.04, 1.00, 0.97),
};

impl CropTemplate {
    /// One of the two canonical templates, chosen by layout.
    pub fn for_hint(hint: FormTypeHint) -> &'static CropTemplate {
        if hint.is_party_list() {
            &PARTY_LIST_TEMPLATE
        } else {
            &CONSTITUENCY_TEMPLATE
        }
    }

    pub fn vote_column(&self, page: u32) -> Region {
        if page <= 1 { self.votes_first_page } else { self.votes_continuation }
    }

    /// Regions a backend needs for the given page, in sending order.
    pub fn regions_for_page(&self, page: u32) -> Vec<Region> {
        if page <= 1 {
            vec![self.summary, self.votes_first_page]
        } else {
            vec![self.votes_continuation]
        }
    }
}

static PAGE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)page[-_ ]?(\d+)").expect("Page number regex pattern is valid and should compile"));

/// Page number from a `page-N` file name, defaulting to 1.
pub fn page_number_from_path(path: &Path) -> u32 {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| {
            PAGE_NUMBER
                .captures(&name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        })
        .filter(|page| *page > 0)
        .unwrap_or(1)
}

/// Crops page images with the template selected by a form-type hint.
#[derive(Debug, Clone, Copy)]
pub struct RegionCropper {
    template: &'static CropTemplate,
}

impl RegionCropper {
    pub fn for_hint(hint: FormTypeHint) -> Self {
        Self {
            template: CropTemplate::for_hint(hint),
        }
    }

    pub fn template(&self) -> &'static CropTemplate {
        self.template
    }

    /// Crop `image` to a fractional region.
    pub fn crop(&self, image: &DynamicImage, region: Region) -> Result<DynamicImage> {
        let (x, y, w, h) = region.to_pixels(image.width(), image.height()).ok_or_else(|| {
            TallyError::image_processing(format!(
                "Region {:?} is empty on a {}x{} image",
                region,
                image.width(),
                image.height()
            ))
        })?;
        Ok(image.crop_imm(x, y, w, h))
    }

    /// Vote column of the page at `path`.
    pub fn vote_column(&self, path: &Path) -> Result<DynamicImage> {
        let page = page_number_from_path(path);
        let image = image::open(path)?;
        self.crop(&image, self.template.vote_column(page))
    }

    /// PNG-encoded crops to send for the page at `path`.
    ///
    /// Page 1 yields the summary box followed by the vote column; continuation pages
    /// yield the vote column only.
    ///
    /// # Errors
    ///
    /// Any decode or crop failure. Callers treat it as "send the full page instead".
    pub fn crop_page(&self, path: &Path, mode: PreprocessMode) -> Result<Vec<Vec<u8>>> {
        let page = page_number_from_path(path);
        let image = image::open(path)?;

        self.template
            .regions_for_page(page)
            .into_iter()
            .map(|region| {
                let cropped = self.crop(&image, region)?;
                encode_png(&preprocess(&cropped, mode))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_page_number_from_path() {
        assert_eq!(page_number_from_path(Path::new("/tmp/doc/page-3.png")), 3);
        assert_eq!(page_number_from_path(Path::new("page_12.jpg")), 12);
        assert_eq!(page_number_from_path(Path::new("Page 2.png")), 2);
        assert_eq!(page_number_from_path(Path::new("scan.png")), 1);
        assert_eq!(page_number_from_path(Path::new("page-0.png")), 1);
    }

    #[test]
    fn test_template_selection() {
        assert_eq!(CropTemplate::for_hint(FormTypeHint::Form5_18), &CONSTITUENCY_TEMPLATE);
        assert_eq!(CropTemplate::for_hint(FormTypeHint::Form5_16PartyList), &PARTY_LIST_TEMPLATE);
    }

    #[test]
    fn test_vote_column_is_rightmost_strip() {
        for template in [&CONSTITUENCY_TEMPLATE, &PARTY_LIST_TEMPLATE] {
            for page in [1, 2] {
                let column = template.vote_column(page);
                assert_eq!(column.right, 1.0);
                assert!((column.width_fraction() - 0.15).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_regions_for_page() {
        assert_eq!(CONSTITUENCY_TEMPLATE.regions_for_page(1).len(), 2);
        assert_eq!(
            CONSTITUENCY_TEMPLATE.regions_for_page(2),
            vec![CONSTITUENCY_TEMPLATE.votes_continuation]
        );
    }

    #[test]
    fn test_region_to_pixels() {
        let region = Region::new(0.85, 0.35, 1.0, 0.95);
        assert_eq!(region.to_pixels(1000, 2000), Some((850, 700, 150, 1200)));
        assert_eq!(Region::new(0.5, 0.5, 0.5, 0.9).to_pixels(100, 100), None);
    }

    #[test]
    fn test_crop_dimensions() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1000, 1400, Rgb([255, 255, 255])));
        let cropper = RegionCropper::for_hint(FormTypeHint::Form5_18);
        let cropped = cropper.crop(&image, CONSTITUENCY_TEMPLATE.votes_first_page).unwrap();
        assert_eq!(cropped.dimensions(), (150, 840));
    }

    #[test]
    fn test_crop_page_from_disk() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("page-1.png");
        let second = dir.path().join("page-2.png");
        let image = RgbImage::from_pixel(400, 600, Rgb([240, 240, 240]));
        image.save(&first).unwrap();
        image.save(&second).unwrap();

        let cropper = RegionCropper::for_hint(FormTypeHint::Form5_17PartyList);
        assert_eq!(cropper.crop_page(&first, PreprocessMode::Standard).unwrap().len(), 2);
        assert_eq!(cropper.crop_page(&second, PreprocessMode::Aggressive).unwrap().len(), 1);
    }

    #[test]
    fn test_crop_page_missing_file_is_error() {
        let cropper = RegionCropper::for_hint(FormTypeHint::Form5_16);
        assert!(cropper.crop_page(Path::new("/nonexistent/page-1.png"), PreprocessMode::Standard).is_err());
    }
}
