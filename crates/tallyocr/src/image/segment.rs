//! Row segmentation of a binarized vote column.
//!
//! Each ballot entry occupies one row of the vote column. A horizontal projection
//! profile (dark pixels per scanline) separates rows: runs of inked scanlines are
//! candidate rows, blank scanlines are gaps.

use image::{GrayImage, Luma};

/// Pixel intensities at or below this count as ink.
const INK_LEVEL: u8 = 128;

/// Vertical pixel span `[top, bottom)` of one handwritten row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub top: u32,
    pub bottom: u32,
}

impl RowSpan {
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Dark pixels per scanline.
pub fn projection_profile(image: &GrayImage) -> Vec<u32> {
    (0..image.height())
        .map(|y| {
            (0..image.width())
                .filter(|&x| {
                    let Luma([v]) = *image.get_pixel(x, y);
                    v <= INK_LEVEL
                })
                .count() as u32
        })
        .collect()
}

/// Split a binarized column into rows.
///
/// A scanline is inked when more than 1% of its pixels (at least one) are dark. Runs
/// shorter than `min_row_height` are dropped as noise (ruling lines, specks).
pub fn segment_rows(image: &GrayImage, min_row_height: u32) -> Vec<RowSpan> {
    let min_ink = (image.width() / 100).max(1);
    let profile = projection_profile(image);

    let mut rows = Vec::new();
    let mut start: Option<u32> = None;

    for (y, &ink) in profile.iter().enumerate() {
        let y = y as u32;
        match (ink >= min_ink, start) {
            (true, None) => start = Some(y),
            (false, Some(top)) => {
                if y - top >= min_row_height {
                    rows.push(RowSpan { top, bottom: y });
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(top) = start {
        let bottom = image.height();
        if bottom - top >= min_row_height {
            rows.push(RowSpan { top, bottom });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_with_rows(rows: &[(u32, u32)]) -> GrayImage {
        GrayImage::from_fn(50, 200, |x, y| {
            let inked = rows.iter().any(|&(top, bottom)| y >= top && y < bottom) && (10..40).contains(&x);
            if inked { Luma([0]) } else { Luma([255]) }
        })
    }

    #[test]
    fn test_segments_separate_rows() {
        let image = column_with_rows(&[(10, 30), (50, 75), (120, 140)]);
        let rows = segment_rows(&image, 5);
        assert_eq!(
            rows,
            vec![
                RowSpan { top: 10, bottom: 30 },
                RowSpan { top: 50, bottom: 75 },
                RowSpan { top: 120, bottom: 140 },
            ]
        );
        assert_eq!(rows[1].height(), 25);
    }

    #[test]
    fn test_thin_lines_are_noise() {
        let image = column_with_rows(&[(10, 30), (60, 62)]);
        assert_eq!(segment_rows(&image, 5), vec![RowSpan { top: 10, bottom: 30 }]);
    }

    #[test]
    fn test_row_touching_bottom_edge() {
        let image = column_with_rows(&[(180, 200)]);
        assert_eq!(segment_rows(&image, 5), vec![RowSpan { top: 180, bottom: 200 }]);
    }

    #[test]
    fn test_blank_column_has_no_rows() {
        let image = GrayImage::from_pixel(50, 100, Luma([255]));
        assert!(segment_rows(&image, 1).is_empty());
        assert!(projection_profile(&image).iter().all(|&c| c == 0));
    }
}
