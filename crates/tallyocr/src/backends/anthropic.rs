//! Anthropic Messages API vision backend.

use crate::backends::cloud::{ImagePayload, VisionTransport, build_client, check_status, extract_with_transport};
use crate::backends::{ExtractOptions, RecognitionBackend};
use crate::core::config::{Credentials, TallyConfig, TimeoutConfig};
use crate::types::BallotExtractionResult;
use crate::{Result, TallyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Claude vision model via the Messages API.
pub struct AnthropicVisionBackend {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    cropping: bool,
    timeouts: TimeoutConfig,
    client: reqwest::Client,
}

impl AnthropicVisionBackend {
    pub fn new(model: impl Into<String>, config: &TallyConfig, credentials: &Credentials) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(TallyError::configuration("anthropic backend needs a model id"));
        }

        Ok(Self {
            name: format!("anthropic:{}", model),
            base_url: config.endpoints.anthropic.trim_end_matches('/').to_string(),
            model,
            api_key: credentials.anthropic_api_key.clone(),
            cropping: config.cropping.enabled,
            timeouts: config.timeouts.clone(),
            client: build_client()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url)
    }
}

#[async_trait]
impl VisionTransport for AnthropicVisionBackend {
    async fn complete(&self, prompt: &str, images: &[ImagePayload], timeout: Duration) -> Result<Option<String>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        // Images first, then the instruction.
        let mut content: Vec<ContentBlock<'_>> = images
            .iter()
            .map(|image| ContentBlock::Image {
                source: ImageSource {
                    source_type: "base64",
                    media_type: image.mime_type,
                    data: &image.data,
                },
            })
            .collect();
        content.push(ContentBlock::Text { text: prompt });

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![Message { role: "user", content }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| TallyError::from_reqwest(&self.name, e))?;
        let response = check_status(&self.name, response).await?;

        match response.json::<MessagesResponse>().await {
            Ok(body) => {
                let text: String = body
                    .content
                    .into_iter()
                    .filter(|block| block.block_type == "text")
                    .filter_map(|block| block.text)
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(Some(text).filter(|t| !t.trim().is_empty()))
            }
            Err(e) if e.is_decode() => {
                tracing::warn!(backend = %self.name, error = %e, "Unexpected messages body");
                Ok(None)
            }
            Err(e) => Err(TallyError::from_reqwest(&self.name, e)),
        }
    }
}

#[async_trait]
impl RecognitionBackend for AnthropicVisionBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        format!("Set ANTHROPIC_API_KEY to enable {}", self.name)
    }

    #[tracing::instrument(skip(self, options), fields(backend = %self.name))]
    async fn extract(&self, image: &Path, options: &ExtractOptions) -> Result<Option<BallotExtractionResult>> {
        if !self.is_available() {
            tracing::debug!("No API key, declining");
            return Ok(None);
        }
        extract_with_transport(self, &self.name, image, options, self.cropping, &self.timeouts).await
    }
}
