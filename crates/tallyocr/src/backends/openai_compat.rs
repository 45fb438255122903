//! OpenAI-compatible vision backend.
//!
//! One implementation covers every gateway that speaks the `chat/completions` dialect
//! with `image_url` content parts. Two presets ship: OpenRouter and NVIDIA NIM.

use crate::backends::cloud::{ImagePayload, VisionTransport, build_client, check_status, extract_with_transport};
use crate::backends::{ExtractOptions, RecognitionBackend};
use crate::core::config::{Credentials, TallyConfig, TimeoutConfig};
use crate::types::BallotExtractionResult;
use crate::{Result, TallyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Vision model behind an OpenAI-compatible endpoint.
pub struct CloudVisionBackend {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    key_env: &'static str,
    cropping: bool,
    timeouts: TimeoutConfig,
    client: reqwest::Client,
}

impl CloudVisionBackend {
    /// Generic constructor.
    ///
    /// `kind` prefixes the backend name; `key_env` is only used in availability hints.
    pub fn new(
        kind: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        key_env: &'static str,
        config: &TallyConfig,
    ) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(TallyError::configuration(format!("{} backend needs a model id", kind)));
        }

        Ok(Self {
            name: format!("{}:{}", kind, model),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            api_key,
            key_env,
            cropping: config.cropping.enabled,
            timeouts: config.timeouts.clone(),
            client: build_client()?,
        })
    }

    /// OpenRouter gateway, keyed by `OPENROUTER_API_KEY`.
    pub fn openrouter(model: impl Into<String>, config: &TallyConfig, credentials: &Credentials) -> Result<Self> {
        Self::new(
            "openrouter",
            config.endpoints.openrouter.clone(),
            model,
            credentials.openrouter_api_key.clone(),
            "OPENROUTER_API_KEY",
            config,
        )
    }

    /// NVIDIA NIM endpoint, keyed by `NVIDIA_API_KEY`.
    pub fn nim(model: impl Into<String>, config: &TallyConfig, credentials: &Credentials) -> Result<Self> {
        Self::new(
            "nim",
            config.endpoints.nim.clone(),
            model,
            credentials.nvidia_api_key.clone(),
            "NVIDIA_API_KEY",
            config,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl VisionTransport for CloudVisionBackend {
    async fn complete(&self, prompt: &str, images: &[ImagePayload], timeout: Duration) -> Result<Option<String>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        let mut content = vec![ContentPart::Text { text: prompt }];
        content.extend(images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrl { url: image.data_url() },
        }));

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content }],
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| TallyError::from_reqwest(&self.name, e))?;
        let response = check_status(&self.name, response).await?;

        match response.json::<ChatCompletionResponse>().await {
            Ok(body) => Ok(body
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|text| !text.trim().is_empty())),
            Err(e) if e.is_decode() => {
                tracing::warn!(backend = %self.name, error = %e, "Unexpected completion body");
                Ok(None)
            }
            Err(e) => Err(TallyError::from_reqwest(&self.name, e)),
        }
    }
}

#[async_trait]
impl RecognitionBackend for CloudVisionBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn availability_hint(&self) -> String {
        format!("Set {} to enable {}", self.key_env, self.name)
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
