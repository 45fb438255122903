//! Page image handling: region cropping, preprocessing and row segmentation.
//!
//! All functions here are synchronous and CPU-bound. Async callers run them through
//! `tokio::task::spawn_blocking`.

pub mod crop;
pub mod preprocess;
pub mod segment;

pub use crop::{CropTemplate, Region, RegionCropper, page_number_from_path};
pub use preprocess::{PreprocessMode, binarize, otsu_threshold, preprocess};
pub use segment::{RowSpan, segment_rows};

use crate::Result;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Encode an image as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}
