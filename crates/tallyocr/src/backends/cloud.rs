//! Shared plumbing for the cloud vision backends.
//!
//! Both cloud backends follow the same flow and differ only in how a prompt plus images
//! is put on the wire, which is what [`VisionTransport`] abstracts:
//!
//! 1. With a form-type hint and cropping enabled, send the template crops under the
//!    short crop timeout.
//! 2. If cropping failed, the crop request failed or its reply yielded nothing, send
//!    the full page under the long timeout.
//! 3. Parse the reply with [`parse_response`].

use crate::backends::ExtractOptions;
use crate::backends::prompt::build_prompt;
use crate::backends::response::parse_response;
use crate::core::config::TimeoutConfig;
use crate::core::io::{image_mime_type, read_file_async};
use crate::form_type::FormTypeHint;
use crate::image::{PreprocessMode, RegionCropper, encode_png, page_number_from_path, preprocess};
use crate::types::BallotExtractionResult;
use crate::{Result, TallyError, TransportKind};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One base64-encoded image ready to embed in a request body.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub mime_type: &'static str,
    pub data: String,
}

impl ImagePayload {
    pub fn png(bytes: &[u8]) -> Self {
        Self {
            mime_type: "image/png",
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Sends one prompt with images to a vision model and returns the reply text.
#[async_trait]
pub trait VisionTransport: Send + Sync {
    /// `Ok(None)` when the service answered but the reply carries no text.
    async fn complete(&self, prompt: &str, images: &[ImagePayload], timeout: Duration) -> Result<Option<String>>;
}

/// Build the HTTP client shared by every request of one backend.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| TallyError::configuration_with_source("Failed to create HTTP client", e))
}

/// Turn a non-success HTTP status into a transport error, keeping a slice of the body.
pub async fn check_status(backend: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(TallyError::transport(
        TransportKind::HttpStatus(status.as_u16()),
        backend,
        format!("{}: {}", status, snippet),
    ))
}

async fn crop_payloads(path: &Path, hint: FormTypeHint, mode: PreprocessMode) -> Result<Vec<ImagePayload>> {
    let path = path.to_path_buf();
    let crops = tokio::task::spawn_blocking(move || RegionCropper::for_hint(hint).crop_page(&path, mode))
        .await
        .map_err(|e| TallyError::image_processing(format!("Crop task failed: {}", e)))??;
    Ok(crops.iter().map(|bytes| ImagePayload::png(bytes)).collect())
}

async fn full_page_payload(path: &Path, mode: PreprocessMode) -> Result<ImagePayload> {
    match mode {
        PreprocessMode::Standard => {
            let bytes = read_file_async(path).await?;
            Ok(ImagePayload {
                mime_type: image_mime_type(path),
                data: general_purpose::STANDARD.encode(bytes),
            })
        }
        PreprocessMode::Aggressive => {
            let path: PathBuf = path.to_path_buf();
            let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
                let image = image::open(&path)?;
                encode_png(&preprocess(&image, PreprocessMode::Aggressive))
            })
            .await
            .map_err(|e| TallyError::image_processing(format!("Preprocess task failed: {}", e)))??;
            Ok(ImagePayload::png(&bytes))
        }
    }
}

/// Crop-first extraction over any [`VisionTransport`].
pub async fn extract_with_transport(
    transport: &dyn VisionTransport,
    backend: &str,
    image: &Path,
    options: &ExtractOptions,
    cropping: bool,
    timeouts: &TimeoutConfig,
) -> Result<Option<BallotExtractionResult>> {
    let page = page_number_from_path(image);
    let source = image.display().to_string();

    if let (true, Some(hint)) = (cropping, options.form_type) {
        match crop_payloads(image, hint, options.preprocessing).await {
            Ok(payloads) => {
                let prompt = build_prompt(Some(hint), page, true);
                match transport.complete(&prompt, &payloads, timeouts.crop()).await {
                    Ok(Some(reply)) => {
                        if let Some(result) = parse_response(&reply, &source, backend, page, options) {
                            return Ok(Some(result));
                        }
                        tracing::debug!(backend, image = %source, "Crop extraction yielded nothing, sending full page");
                    }
                    Ok(None) => {
                        tracing::debug!(backend, image = %source, "Empty crop reply, sending full page");
                    }
                    // Only the full-page request may fail the backend call.
                    Err(e) => {
                        tracing::warn!(backend, image = %source, error = %e, "Crop request failed, sending full page");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(backend, image = %source, error = %e, "Cropping failed, sending full page");
            }
        }
    }

    let payload = full_page_payload(image, options.preprocessing).await?;
    let prompt = build_prompt(options.form_type, page, false);
    let Some(reply) = transport
        .complete(&prompt, std::slice::from_ref(&payload), timeouts.full_page())
        .await?
    else {
        tracing::warn!(backend, image = %source, "Empty reply from vision model");
        return Ok(None);
    };

    let result = parse_response(&reply, &source, backend, page, options);
    if result.is_none() {
        tracing::warn!(backend, image = %source, "Could not parse vision model reply");
    }
    Ok(result)
}
