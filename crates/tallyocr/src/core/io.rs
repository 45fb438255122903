//! File I/O utilities.

use crate::{Result, TallyError};
use std::path::Path;
use tokio::fs;

/// Read a file asynchronously.
///
/// # Errors
///
/// Returns `TallyError::Io` for I/O errors (these always bubble up).
pub async fn read_file_async(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    fs::read(path.as_ref()).await.map_err(TallyError::Io)
}

/// Validate that a path points at an existing regular file.
///
/// # Errors
///
/// Returns `TallyError::Validation` if the path does not exist or is not a file.
pub fn validate_file_exists(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TallyError::validation(format!("File does not exist: {}", path.display())));
    }
    if !path.is_file() {
        return Err(TallyError::validation(format!("Path is not a file: {}", path.display())));
    }
    Ok(())
}

/// Whether the path has a raster image extension the backends accept.
pub fn is_supported_image(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// MIME type sent alongside image bytes to cloud services.
pub fn image_mime_type(path: impl AsRef<Path>) -> &'static str {
    match path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}
