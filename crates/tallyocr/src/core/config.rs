//! Configuration loading and management.
//!
//! [`TallyConfig`] is built once at process start (from a file, from defaults, or
//! programmatically) and handed by reference to the backend factory, the ensemble,
//! the self-correction controller and the batch processor. Nothing below this layer
//! reads the environment mid-call: API keys are captured into [`Credentials`] exactly
//! once by [`Credentials::from_env`].

use crate::{Result, TallyError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration.
///
/// # Example
///
/// ```rust
/// use tallyocr::core::config::TallyConfig;
///
/// let config = TallyConfig::default();
/// assert_eq!(config.batch.workers, 5);
///
/// // let config = TallyConfig::from_toml_file("tallyocr.toml")?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Backend selection string, in priority order.
    ///
    /// Comma-separated specifiers: bare names (`tesseract`, `trocr`) or
    /// `kind:model` (`openrouter:google/gemma-3-27b-it:free`).
    #[serde(default = "default_backends")]
    pub backends: String,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub correction: CorrectionConfig,

    #[serde(default)]
    pub cropping: CroppingConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub tesseract: TesseractConfig,

    #[serde(default)]
    pub handwriting: HandwritingConfig,

    #[serde(default)]
    pub endpoints: EndpointConfig,
}

/// Worker pool and rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum images processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Aggregate extraction calls per second across all workers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_sec: f64,

    /// Run a resource-reclamation pass every N completed items (0 = never).
    #[serde(default = "default_reclaim_every")]
    pub reclaim_every: usize,
}

/// Retry policy for transient transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per image, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Two-pass self-correction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backend names used for the constrained first pass.
    #[serde(default = "default_pass1_backends")]
    pub pass1_backends: Vec<String>,

    /// Backend names for the escalated pass (None = every configured backend).
    #[serde(default)]
    pub pass2_backends: Option<Vec<String>>,

    /// Re-check the form type before the escalated pass.
    #[serde(default = "default_true")]
    pub reverify_form_type: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CroppingConfig {
    /// Send the vote-column crop instead of the full page when the form type is known.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Per-call timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Cloud call carrying a cropped region.
    #[serde(default = "default_crop_timeout")]
    pub crop_secs: u64,

    /// Cloud call carrying a full page.
    #[serde(default = "default_full_page_timeout")]
    pub full_page_secs: u64,

    /// Local engine subprocess.
    #[serde(default = "default_local_timeout")]
    pub local_secs: u64,
}

impl TimeoutConfig {
    pub fn crop(&self) -> Duration {
        Duration::from_secs(self.crop_secs)
    }

    pub fn full_page(&self) -> Duration {
        Duration::from_secs(self.full_page_secs)
    }

    pub fn local(&self) -> Duration {
        Duration::from_secs(self.local_secs)
    }
}

/// Tesseract engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseractConfig {
    /// Executable name or absolute path.
    #[serde(default = "default_tesseract_binary")]
    pub binary: String,

    /// Tesseract language string.
    #[serde(default = "default_tesseract_language")]
    pub language: String,

    /// Page segmentation mode.
    #[serde(default = "default_psm")]
    pub psm: u8,
}

/// Local handwriting recognizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandwritingConfig {
    /// Recognizer executable. Invoked with the model directory and a directory of row
    /// images; prints one recognized line per image, in file-name order.
    #[serde(default = "default_handwriting_command")]
    pub command: String,

    /// Directory containing the seq2seq model weights.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    /// Rows shorter than this many pixels are treated as noise.
    #[serde(default = "default_min_row_height")]
    pub min_row_height: u32,
}

/// Base URLs of the cloud services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_openrouter_url")]
    pub openrouter: String,

    #[serde(default = "default_nim_url")]
    pub nim: String,

    #[serde(default = "default_anthropic_url")]
    pub anthropic: String,
}

/// API keys for the cloud backends.
///
/// Never serialized. Missing keys make the corresponding backend unavailable.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openrouter_api_key: Option<String>,
    pub nvidia_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |key: &Option<String>| if key.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openrouter_api_key", &mask(&self.openrouter_api_key))
            .field("nvidia_api_key", &mask(&self.nvidia_api_key))
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .finish()
    }
}

impl Credentials {
    /// Capture API keys from `OPENROUTER_API_KEY`, `NVIDIA_API_KEY` and
    /// `ANTHROPIC_API_KEY`. Empty values count as unset.
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openrouter_api_key: read("OPENROUTER_API_KEY"),
            nvidia_api_key: read("NVIDIA_API_KEY"),
            anthropic_api_key: read("ANTHROPIC_API_KEY"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_backends() -> String {
    "tesseract,trocr".to_string()
}

fn default_workers() -> usize {
    5
}

fn default_rate_limit() -> f64 {
    2.0
}

fn default_reclaim_every() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    4_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_pass1_backends() -> Vec<String> {
    vec!["tesseract".to_string(), "trocr".to_string()]
}

fn default_crop_timeout() -> u64 {
    60
}

fn default_full_page_timeout() -> u64 {
    120
}

fn default_local_timeout() -> u64 {
    90
}

fn default_tesseract_binary() -> String {
    "tesseract".to_string()
}

fn default_tesseract_language() -> String {
    "tha+eng".to_string()
}

fn default_psm() -> u8 {
    6
}

fn default_handwriting_command() -> String {
    "thai-trocr".to_string()
}

fn default_min_row_height() -> u32 {
    12
}

fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_nim_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            correction: CorrectionConfig::default(),
            cropping: CroppingConfig::default(),
            timeouts: TimeoutConfig::default(),
            tesseract: TesseractConfig::default(),
            handwriting: HandwritingConfig::default(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            rate_limit_per_sec: default_rate_limit(),
            reclaim_every: default_reclaim_every(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pass1_backends: default_pass1_backends(),
            pass2_backends: None,
            reverify_form_type: true,
        }
    }
}

impl Default for CroppingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            crop_secs: default_crop_timeout(),
            full_page_secs: default_full_page_timeout(),
            local_secs: default_local_timeout(),
        }
    }
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: default_tesseract_binary(),
            language: default_tesseract_language(),
            psm: default_psm(),
        }
    }
}

impl Default for HandwritingConfig {
    fn default() -> Self {
        Self {
            command: default_handwriting_command(),
            model_dir: None,
            min_row_height: default_min_row_height(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            openrouter: default_openrouter_url(),
            nim: default_nim_url(),
            anthropic: default_anthropic_url(),
        }
    }
}

impl TallyConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            TallyError::configuration(format!("Invalid TOML in {}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = serde_yaml_ng::from_str(&content).map_err(|e| {
            TallyError::configuration(format!("Invalid YAML in {}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            TallyError::configuration(format!("Invalid JSON in {}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, picking the parser from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()) {
            Some(ext) if ext == "toml" => Self::from_toml_file(path),
            Some(ext) if ext == "yaml" || ext == "yml" => Self::from_yaml_file(path),
            Some(ext) if ext == "json" => Self::from_json_file(path),
            _ => Err(TallyError::configuration(format!(
                "Unsupported config format: {} (expected .toml, .yaml or .json)",
                path.display()
            ))),
        }
    }

    /// Discover configuration file in parent directories.
    ///
    /// Searches for `tallyocr.toml` in the current directory and its parents.
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(TallyError::Io)?;

        loop {
            let candidate = current.join("tallyocr.toml");
            if candidate.exists() {
                return Ok(Some(Self::from_toml_file(candidate)?));
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch.workers == 0 {
            return Err(TallyError::configuration("batch.workers must be > 0"));
        }
        if !(self.batch.rate_limit_per_sec.is_finite() && self.batch.rate_limit_per_sec > 0.0) {
            return Err(TallyError::configuration(format!(
                "batch.rate_limit_per_sec must be a positive number, got {}",
                self.batch.rate_limit_per_sec
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(TallyError::configuration("retry.max_attempts must be >= 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(TallyError::configuration(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.backends.trim().is_empty() {
            return Err(TallyError::configuration("backends must name at least one backend"));
        }
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| TallyError::configuration(format!("Failed to read config file {}: {}", path.display(), e)))
}
