//! Render and compile options

use crate::engine::CompiledTemplate;
use crate::error::{Result, ViewError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Delimiter pair used when none is configured
pub const DEFAULT_DELIMITERS: &str = "{{ }}";

/// Explicit partial overrides, keyed by partial name
pub type PartialOverrides = BTreeMap<String, PartialSource>;

/// Engine compile options
///
/// Every field is optional so that per-call options can be layered over
/// settings-level options with [`EngineOptions::merged`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Delimiter pair as `"<open> <close>"`, e.g. `"<% %>"`
    pub delimiters: Option<String>,
    /// Emit interpolated values verbatim instead of HTML-escaping them
    pub as_string: Option<bool>,
    /// Do not expose engine lambdas to the template
    pub disable_lambda: Option<bool>,
}

impl EngineOptions {
    /// Create empty options (engine defaults)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delimiter pair
    pub fn delimiters(mut self, open: &str, close: &str) -> Self {
        self.delimiters = Some(format!("{} {}", open, close));
        self
    }

    /// Set string-output mode
    pub fn as_string(mut self, enabled: bool) -> Self {
        self.as_string = Some(enabled);
        self
    }

    /// Disable engine lambdas
    pub fn disable_lambda(mut self, disabled: bool) -> Self {
        self.disable_lambda = Some(disabled);
        self
    }

    /// Layer `overlay` over `self`; fields set in the overlay win
    pub fn merged(&self, overlay: &EngineOptions) -> EngineOptions {
        EngineOptions {
            delimiters: overlay
                .delimiters
                .clone()
                .or_else(|| self.delimiters.clone()),
            as_string: overlay.as_string.or(self.as_string),
            disable_lambda: overlay.disable_lambda.or(self.disable_lambda),
        }
    }

    /// Resolve defaults into the value that takes part in cache keys
    pub fn normalized(&self) -> NormalizedOptions {
        NormalizedOptions {
            delimiters: self
                .delimiters
                .clone()
                .unwrap_or_else(|| DEFAULT_DELIMITERS.to_string()),
            as_string: self.as_string.unwrap_or(false),
            disable_lambda: self.disable_lambda.unwrap_or(false),
        }
    }
}

/// Compile options with defaults applied
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedOptions {
    /// Delimiter pair as `"<open> <close>"`
    pub delimiters: String,
    /// String-output mode
    pub as_string: bool,
    /// Lambdas disabled
    pub disable_lambda: bool,
}

impl NormalizedOptions {
    /// Split the delimiter setting into its open and close parts
    pub fn delimiter_pair(&self) -> Result<(&str, &str)> {
        let mut parts = self.delimiters.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(open), Some(close), None) => Ok((open, close)),
            _ => Err(ViewError::compile(
                "options",
                format!("invalid delimiters {:?}, expected \"<open> <close>\"", self.delimiters),
            )),
        }
    }

    /// Whether the delimiters are the engine's native `{{ }}`
    pub fn has_default_delimiters(&self) -> bool {
        self.delimiter_pair()
            .map(|pair| pair == ("{{", "}}"))
            .unwrap_or(false)
    }
}

impl Default for NormalizedOptions {
    fn default() -> Self {
        EngineOptions::default().normalized()
    }
}

/// A partial override: raw source text or an already compiled template
#[derive(Debug, Clone)]
pub enum PartialSource {
    /// Source text, compiled on first use
    Text(String),
    /// A template compiled earlier
    Compiled(Arc<CompiledTemplate>),
}

impl PartialSource {
    /// Whether this override is already compiled
    pub fn is_compiled(&self) -> bool {
        matches!(self, PartialSource::Compiled(_))
    }
}

impl From<&str> for PartialSource {
    fn from(text: &str) -> Self {
        PartialSource::Text(text.to_string())
    }
}

impl From<String> for PartialSource {
    fn from(text: String) -> Self {
        PartialSource::Text(text)
    }
}

impl From<Arc<CompiledTemplate>> for PartialSource {
    fn from(template: Arc<CompiledTemplate>) -> Self {
        PartialSource::Compiled(template)
    }
}

/// Framework-level settings shared by every render
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Engine options applied to every compile
    pub engine: EngineOptions,
    /// Default layout name
    pub layout: Option<String>,
    /// Partial overrides consulted after call-level overrides
    pub partials: PartialOverrides,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set engine options
    pub fn engine(mut self, options: EngineOptions) -> Self {
        self.engine = options;
        self
    }

    /// Set the default layout
    pub fn layout(mut self, name: impl Into<String>) -> Self {
        self.layout = Some(name.into());
        self
    }

    /// Add a partial override
    pub fn partial(mut self, name: impl Into<String>, source: impl Into<PartialSource>) -> Self {
        self.partials.insert(name.into(), source.into());
        self
    }
}

/// Options for a single render call
///
/// `locals` is the data context; the remaining fields steer compilation,
/// partial resolution and layout composition.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Reuse compiled templates across calls
    pub cache: bool,
    /// Framework-level settings
    pub settings: Settings,
    /// Per-call engine options, merged over `settings.engine`
    pub engine: EngineOptions,
    /// Per-call layout, taking precedence over `settings.layout`
    pub layout: Option<String>,
    /// Per-call partial overrides, taking precedence over `settings.partials`
    pub partials: PartialOverrides,
    /// Data context
    pub locals: Map<String, Value>,
}

impl RenderOptions {
    /// Create default options (no caching, no layout)
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the compiled template cache
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Set framework-level settings
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set per-call engine options
    pub fn engine(mut self, options: EngineOptions) -> Self {
        self.engine = options;
        self
    }

    /// Set the layout for this call
    pub fn layout(mut self, name: impl Into<String>) -> Self {
        self.layout = Some(name.into());
        self
    }

    /// Add a per-call partial override
    pub fn partial(mut self, name: impl Into<String>, source: impl Into<PartialSource>) -> Self {
        self.partials.insert(name.into(), source.into());
        self
    }

    /// Replace the data context
    pub fn locals(mut self, locals: Map<String, Value>) -> Self {
        self.locals = locals;
        self
    }

    /// Set one context value
    pub fn local(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.insert(key.into(), value.into());
        self
    }

    /// Settings-level engine options with per-call options layered on top
    pub fn engine_options(&self) -> EngineOptions {
        self.settings.engine.merged(&self.engine)
    }

    /// Effective layout name, if any
    pub fn layout_name(&self) -> Option<&str> {
        self.layout
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.settings.layout.as_deref().filter(|name| !name.is_empty()))
    }

    /// The data context as a JSON object
    pub fn context(&self) -> Value {
        Value::Object(self.locals.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overlay_wins() {
        let settings = EngineOptions::new().delimiters("<%", "%>").as_string(true);
        let call = EngineOptions::new().as_string(false).disable_lambda(true);

        let merged = settings.merged(&call);
        assert_eq!(merged.delimiters.as_deref(), Some("<% %>"));
        assert_eq!(merged.as_string, Some(false));
        assert_eq!(merged.disable_lambda, Some(true));
    }

    #[test]
    fn test_normalized_defaults() {
        let normalized = EngineOptions::new().normalized();
        assert_eq!(normalized.delimiters, "{{ }}");
        assert!(!normalized.as_string);
        assert!(!normalized.disable_lambda);
        assert!(normalized.has_default_delimiters());
    }

    #[test]
    fn test_unset_and_false_normalize_equal() {
        let unset = EngineOptions::new().normalized();
        let explicit = EngineOptions::new()
            .as_string(false)
            .disable_lambda(false)
            .delimiters("{{", "}}")
            .normalized();
        assert_eq!(unset, explicit);
    }

    #[test]
    fn test_invalid_delimiters() {
        let options = EngineOptions {
            delimiters: Some("<%".to_string()),
            ..Default::default()
        };
        assert!(options.normalized().delimiter_pair().is_err());
    }

    #[test]
    fn test_layout_precedence() {
        let options = RenderOptions::new().settings(Settings::new().layout("site"));
        assert_eq!(options.layout_name(), Some("site"));

        let options = options.layout("admin");
        assert_eq!(options.layout_name(), Some("admin"));

        let options = RenderOptions::new()
            .settings(Settings::new().layout("site"))
            .layout("");
        assert_eq!(options.layout_name(), Some("site"));
    }

    #[test]
    fn test_partial_source_predicate() {
        assert!(!PartialSource::from("{{name}}").is_compiled());
    }

    #[test]
    fn test_engine_options_deserialize() {
        let options: EngineOptions =
            serde_json::from_str(r#"{"delimiters": "<% %>", "as_string": true}"#).unwrap();
        assert_eq!(options.delimiters.as_deref(), Some("<% %>"));
        assert_eq!(options.as_string, Some(true));
        assert_eq!(options.disable_lambda, None);
    }
}
