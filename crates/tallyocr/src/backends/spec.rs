//! Backend selection strings.
//!
//! A selection string lists backends in priority order, comma-separated. Each item is
//! either a bare kind (`tesseract`, `trocr`) or `kind:model`, where everything after
//! the first colon is the model id and may itself contain colons:
//!
//! ```text
//! tesseract,trocr,openrouter:google/gemma-3-27b-it:free,anthropic:claude-haiku-4-20250514
//! ```
//!
//! Unknown kinds are skipped with a warning so that a typo in one entry never takes the
//! whole pipeline down.

use std::fmt;

/// Backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenRouter,
    Nim,
    Anthropic,
    Tesseract,
    Handwriting,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenRouter => "openrouter",
            BackendKind::Nim => "nim",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Tesseract => "tesseract",
            BackendKind::Handwriting => "trocr",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openrouter" => Some(BackendKind::OpenRouter),
            "nim" | "nvidia" => Some(BackendKind::Nim),
            "anthropic" | "claude" => Some(BackendKind::Anthropic),
            "tesseract" => Some(BackendKind::Tesseract),
            "trocr" | "handwriting" => Some(BackendKind::Handwriting),
            _ => None,
        }
    }

    /// Local backends never make network calls.
    pub fn is_local(&self) -> bool {
        matches!(self, BackendKind::Tesseract | BackendKind::Handwriting)
    }

    /// Model used when a cloud specifier names no model.
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            BackendKind::OpenRouter => Some("google/gemma-3-27b-it:free"),
            BackendKind::Nim => Some("moonshotai/kimi-k2.5"),
            BackendKind::Anthropic => Some("claude-haiku-4-20250514"),
            BackendKind::Tesseract | BackendKind::Handwriting => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed item of a selection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub kind: BackendKind,
    pub model: Option<String>,
}

impl BackendSpec {
    /// Parse one specifier. Returns `None` for an unknown kind or an empty item.
    pub fn parse(item: &str) -> Option<Self> {
        let item = item.trim();
        if item.is_empty() {
            return None;
        }

        let (kind, model) = match item.split_once(':') {
            Some((kind, model)) => (kind, Some(model.trim()).filter(|m| !m.is_empty())),
            None => (item, None),
        };
        let kind = BackendKind::from_str(kind)?;

        // Local engines take no model id.
        let model = if kind.is_local() {
            None
        } else {
            model.map(str::to_string).or_else(|| kind.default_model().map(str::to_string))
        };

        Some(Self { kind, model })
    }

    /// Stable backend name: the kind, plus `:model` for cloud backends.
    pub fn name(&self) -> String {
        match &self.model {
            Some(model) => format!("{}:{}", self.kind, model),
            None => self.kind.to_string(),
        }
    }
}

/// Parse a whole selection string, skipping unknown kinds with a warning.
pub fn parse_backend_list(selection: &str) -> Vec<BackendSpec> {
    let mut specs: Vec<BackendSpec> = Vec::new();
    for item in selection.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        match BackendSpec::parse(item) {
            Some(spec) if specs.contains(&spec) => {
                tracing::debug!(backend = item, "Duplicate backend specifier ignored");
            }
            Some(spec) => specs.push(spec),
            None => {
                tracing::warn!(backend = item, "Unknown backend kind, skipping");
            }
        }
    }
    specs
}

/// Whether a backend name matches a selector: the full name or its kind prefix.
///
/// `openrouter` selects `openrouter:google/gemma-3-27b-it:free`; `tesseract` selects
/// `tesseract`.
pub fn name_matches(name: &str, selector: &str) -> bool {
    let selector = selector.trim();
    name == selector || name.split(':').next() == Some(selector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_names() {
        let specs = parse_backend_list("tesseract, trocr");
        assert_eq!(
            specs,
            vec![
                BackendSpec {
                    kind: BackendKind::Tesseract,
                    model: None
                },
                BackendSpec {
                    kind: BackendKind::Handwriting,
                    model: None
                },
            ]
        );
    }

    #[test]
    fn test_model_keeps_inner_colons() {
        let spec = BackendSpec::parse("openrouter:google/gemma-3-27b-it:free").unwrap();
        assert_eq!(spec.kind, BackendKind::OpenRouter);
        assert_eq!(spec.model.as_deref(), Some("google/gemma-3-27b-it:free"));
        assert_eq!(spec.name(), "openrouter:google/gemma-3-27b-it:free");
    }

    #[test]
    fn test_cloud_kind_without_model_uses_default() {
        let spec = BackendSpec::parse("anthropic").unwrap();
        assert_eq!(spec.model.as_deref(), Some("claude-haiku-4-20250514"));

        let spec = BackendSpec::parse("nim:").unwrap();
        assert_eq!(spec.name(), "nim:moonshotai/kimi-k2.5");
    }

    #[test]
    fn test_unknown_kinds_skipped() {
        let specs = parse_backend_list("tesseract,paddle:v4,,nim:moonshotai/kimi-k2.5");
        let names: Vec<_> = specs.iter().map(BackendSpec::name).collect();
        assert_eq!(names, vec!["tesseract", "nim:moonshotai/kimi-k2.5"]);
    }

    #[test]
    fn test_duplicates_collapsed() {
        assert_eq!(parse_backend_list("tesseract,tesseract").len(), 1);
    }

    #[test]
    fn test_name_matches() {
        assert!(name_matches("openrouter:google/gemma-3-27b-it:free", "openrouter"));
        assert!(name_matches("openrouter:google/gemma-3-27b-it:free", "openrouter:google/gemma-3-27b-it:free"));
        assert!(name_matches("tesseract", "tesseract"));
        assert!(!name_matches("trocr", "tesseract"));
    }
}
