//! Backend registry.
//!
//! The registry is built once from the configuration and owned by whoever builds the
//! ensemble. There is no process-wide registry: tests and embedders construct their own
//! and register mock backends directly.

use crate::backends::RecognitionBackend;
use crate::backends::handwriting::HandwritingBackend;
use crate::backends::spec::{BackendKind, BackendSpec, name_matches, parse_backend_list};
use crate::backends::tesseract::TesseractBackend;
use crate::core::config::{Credentials, TallyConfig};
use crate::{Result, TallyError};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// Availability report for one registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Ordered collection of backends, keyed by name. Iteration follows registration
/// order, which is the priority order of the selection string.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: IndexMap<String, Arc<dyn RecognitionBackend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Validate a backend name before registration.
fn validate_backend_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TallyError::validation("Backend name cannot be empty"));
    }
    if name.contains(char::is_whitespace) {
        return Err(TallyError::validation(format!(
            "Backend name '{}' cannot contain whitespace",
            name
        )));
    }
    Ok(())
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend named in `config.backends`.
    ///
    /// Unknown kinds are skipped with a warning by the selection-string parser. Cloud
    /// kinds are skipped with a warning when the crate is built without the `cloud`
    /// feature.
    ///
    /// # Errors
    ///
    /// Fails only when a backend cannot be constructed at all (for example the HTTP
    /// client refuses to build). A missing API key or binary is not an error: the
    /// backend is registered and reports itself unavailable.
    pub fn from_config(config: &TallyConfig, credentials: &Credentials) -> Result<Self> {
        let mut registry = Self::new();
        for spec in parse_backend_list(&config.backends) {
            if let Some(backend) = build_backend(&spec, config, credentials)? {
                registry.register(backend)?;
            }
        }

        tracing::debug!(
            backends = ?registry.list(),
            available = registry.available().len(),
            "Backend registry built"
        );
        Ok(registry)
    }

    /// Register a backend. A backend with the same name is replaced in place.
    pub fn register(&mut self, backend: Arc<dyn RecognitionBackend>) -> Result<()> {
        let name = backend.name().to_string();
        validate_backend_name(&name)?;
        self.backends.insert(name, backend);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RecognitionBackend>> {
        self.backends.get(name).cloned()
    }

    /// Remove a backend by name, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn RecognitionBackend>> {
        self.backends.shift_remove(name)
    }

    /// Registered names in priority order.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Every registered backend in priority order.
    pub fn backends(&self) -> Vec<Arc<dyn RecognitionBackend>> {
        self.backends.values().cloned().collect()
    }

    /// Backends whose local availability check passes.
    pub fn available(&self) -> Vec<Arc<dyn RecognitionBackend>> {
        self.backends.values().filter(|b| b.is_available()).cloned().collect()
    }

    /// Backends matching any selector, by full name or kind prefix.
    pub fn select(&self, selectors: &[String]) -> Vec<Arc<dyn RecognitionBackend>> {
        self.backends
            .iter()
            .filter(|(name, _)| selectors.iter().any(|s| name_matches(name, s)))
            .map(|(_, backend)| Arc::clone(backend))
            .collect()
    }

    pub fn status(&self) -> Vec<BackendStatus> {
        self.backends
            .values()
            .map(|backend| {
                let available = backend.is_available();
                BackendStatus {
                    name: backend.name().to_string(),
                    available,
                    hint: (!available).then(|| backend.availability_hint()),
                }
            })
            .collect()
    }
}

/// Construct the backend for one parsed specifier.
fn build_backend(
    spec: &BackendSpec,
    config: &TallyConfig,
    credentials: &Credentials,
) -> Result<Option<Arc<dyn RecognitionBackend>>> {
    let backend: Arc<dyn RecognitionBackend> = match spec.kind {
        BackendKind::Tesseract => Arc::new(TesseractBackend::from_config(
            &config.tesseract,
            config.timeouts.local(),
        )),
        BackendKind::Handwriting => Arc::new(HandwritingBackend::from_config(
            &config.handwriting,
            config.timeouts.local(),
        )),
        BackendKind::OpenRouter | BackendKind::Nim | BackendKind::Anthropic => {
            return build_cloud_backend(spec, config, credentials);
        }
    };
    Ok(Some(backend))
}

#[cfg(feature = "cloud")]
fn build_cloud_backend(
    spec: &BackendSpec,
    config: &TallyConfig,
    credentials: &Credentials,
) -> Result<Option<Arc<dyn RecognitionBackend>>> {
    use crate::backends::anthropic::AnthropicVisionBackend;
    use crate::backends::openai_compat::CloudVisionBackend;

    let model = spec
        .model
        .clone()
        .or_else(|| spec.kind.default_model().map(str::to_string))
        .unwrap_or_default();

    let backend: Arc<dyn RecognitionBackend> = match spec.kind {
        BackendKind::OpenRouter => Arc::new(CloudVisionBackend::openrouter(model, config, credentials)?),
        BackendKind::Nim => Arc::new(CloudVisionBackend::nim(model, config, credentials)?),
        BackendKind::Anthropic => Arc::new(AnthropicVisionBackend::new(model, config, credentials)?),
        BackendKind::Tesseract | BackendKind::Handwriting => return Ok(None),
    };
    Ok(Some(backend))
}

#[cfg(not(feature = "cloud"))]
fn build_cloud_backend(
    spec: &BackendSpec,
    _config: &TallyConfig,
    _credentials: &Credentials,
) -> Result<Option<Arc<dyn RecognitionBackend>>> {
    tracing::warn!(
        backend = %spec.name(),
        "Built without the `cloud` feature, skipping cloud backend"
    );
    Ok(None)
}
