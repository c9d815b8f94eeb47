//! Handlebars engine
//!
//! Compiles with the `handlebars` crate. Selected by name for views written
//! in Handlebars syntax (`{{#each}}`, `{{#if}}`, helpers).

use super::{scan_partials, CompiledTemplate, Engine, Lambda};
use crate::error::{Result, ViewError};
use crate::options::NormalizedOptions;
use crate::partials::PartialMap;
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext, Template};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name the root template is registered under while rendering
const ROOT_TEMPLATE: &str = "<root>";

/// [`Engine`] backed by the `handlebars` crate
///
/// # Options
///
/// - `delimiters`: non-default delimiters are rewritten to `{{ }}` before
///   compiling
/// - `as_string`: interpolations are emitted verbatim, without HTML escaping
/// - `disable_lambda`: lambdas registered with [`with_lambda`](Self::with_lambda)
///   are not registered as helpers
///
/// # Example
///
/// ```rust
/// use mustache_view::{Engine, HandlebarsEngine, NormalizedOptions, PartialMap};
/// use serde_json::json;
///
/// let engine = HandlebarsEngine::new();
/// let template = engine
///     .compile("inline", "{{#each items}}[{{this}}]{{/each}}", &NormalizedOptions::default())
///     .unwrap();
/// let output = engine
///     .render(&template, &json!({"items": [1, 2]}), &PartialMap::new())
///     .unwrap();
/// assert_eq!(output, "[1][2]");
/// ```
#[derive(Clone, Default)]
pub struct HandlebarsEngine {
    lambdas: BTreeMap<String, Lambda>,
}

impl HandlebarsEngine {
    /// Engine name used in cache keys and configuration
    pub const NAME: &'static str = "handlebars";

    /// Create an engine without lambdas
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lambda callable as the helper `{{name arg}}`
    ///
    /// The lambda receives its first argument as text (strings verbatim,
    /// other values as JSON, empty without arguments).
    pub fn with_lambda<F>(mut self, name: impl Into<String>, lambda: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.lambdas.insert(name.into(), Arc::new(lambda));
        self
    }

    fn register_lambdas(&self, registry: &mut Handlebars<'_>) {
        for (name, lambda) in &self.lambdas {
            let lambda = Arc::clone(lambda);
            registry.register_helper(
                name,
                Box::new(
                    move |h: &Helper,
                          _: &Handlebars,
                          _: &Context,
                          _: &mut RenderContext,
                          out: &mut dyn Output|
                          -> HelperResult {
                        let text = match h.param(0).map(|param| param.value()) {
                            Some(Value::String(text)) => text.clone(),
                            Some(Value::Null) | None => String::new(),
                            Some(other) => other.to_string(),
                        };
                        out.write(&lambda(&text))?;
                        Ok(())
                    },
                ),
            );
        }
    }
}

impl fmt::Debug for HandlebarsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlebarsEngine")
            .field("lambdas", &self.lambdas.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Engine for HandlebarsEngine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compile(
        &self,
        label: &str,
        source: &str,
        options: &NormalizedOptions,
    ) -> Result<CompiledTemplate> {
        let (open, close) = options
            .delimiter_pair()
            .map_err(|err| ViewError::compile(label, err.to_string()))?;

        let text = if options.has_default_delimiters() {
            Cow::Borrowed(source)
        } else {
            Cow::Owned(rewrite_delimiters(label, source, open, close)?)
        };

        let program =
            Template::compile(&text).map_err(|err| ViewError::compile(label, err.to_string()))?;
        let partials = scan_partials(&text, "{{", "}}");

        Ok(CompiledTemplate::new(
            Self::NAME,
            source,
            options.clone(),
            Some(partials),
            program,
        ))
    }

    fn render(
        &self,
        template: &CompiledTemplate,
        context: &Value,
        partials: &PartialMap,
    ) -> Result<String> {
        let mut registry = Handlebars::new();

        if template.options().as_string {
            registry.register_escape_fn(handlebars::no_escape);
        }
        if !template.options().disable_lambda {
            self.register_lambdas(&mut registry);
        }

        for (name, partial) in partials {
            let program = match partial {
                Some(partial) => partial.program_for::<Template>(Self::NAME)?.clone(),
                // unresolved partials render as nothing
                None => Template::compile("")
                    .map_err(|err| ViewError::compile(name.as_str(), err.to_string()))?,
            };
            registry.register_template(name, program);
        }
        registry.register_template(
            ROOT_TEMPLATE,
            template.program_for::<Template>(Self::NAME)?.clone(),
        );

        registry
            .render(ROOT_TEMPLATE, context)
            .map_err(|err| ViewError::render(err.to_string()))
    }
}

/// Rewrite custom-delimited tags to `{{ }}`, escaping literal `{{` in text
fn rewrite_delimiters(label: &str, source: &str, open: &str, close: &str) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start].replace("{{", "\\{{"));
        let after = &rest[start + open.len()..];
        let end = after.find(close).ok_or_else(|| {
            ViewError::compile(label, format!("unclosed tag, expected {:?}", close))
        })?;
        out.push_str("{{");
        out.push_str(&after[..end]);
        out.push_str("}}");
        rest = &after[end + close.len()..];
    }
    out.push_str(&rest.replace("{{", "\\{{"));

    Ok(out)
}
