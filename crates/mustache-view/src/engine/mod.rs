//! Template engine abstraction
//!
//! The adapter talks to the templating engine through the [`Engine`] trait:
//! compile source text into a [`CompiledTemplate`], then render a compiled
//! template against a JSON context and a map of compiled partials. The
//! default implementation is [`MustacheEngine`]. [`HandlebarsEngine`], backed
//! by the `handlebars` crate, can be selected by name for Handlebars views.

mod handlebars_engine;
mod mustache;
mod parser;

pub use self::handlebars_engine::HandlebarsEngine;
pub use self::mustache::MustacheEngine;

use crate::error::{Result, ViewError};
use crate::options::NormalizedOptions;
use crate::partials::PartialMap;
use serde_json::Value;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A template engine strategy
///
/// One implementation is selected at startup (see [`engine_by_name`]) and
/// shared by every view.
pub trait Engine: Send + Sync {
    /// Stable engine name, part of every cache key
    fn name(&self) -> &'static str;

    /// Compile `source`; `label` names the source in error messages
    fn compile(
        &self,
        label: &str,
        source: &str,
        options: &NormalizedOptions,
    ) -> Result<CompiledTemplate>;

    /// Render `template` against `context`, resolving partials from `partials`
    fn render(
        &self,
        template: &CompiledTemplate,
        context: &Value,
        partials: &PartialMap,
    ) -> Result<String>;
}

/// A compiled template
///
/// Holds the source text, the options it was compiled with, the partial names
/// it references and the engine-private program.
pub struct CompiledTemplate {
    engine: &'static str,
    source: String,
    options: NormalizedOptions,
    partials: Option<Vec<String>>,
    program: Box<dyn Any + Send + Sync>,
}

impl CompiledTemplate {
    /// Wrap an engine program
    ///
    /// `partials` is the structured list of referenced partial names, or
    /// `None` when the engine does not collect it.
    pub fn new<P>(
        engine: &'static str,
        source: impl Into<String>,
        options: NormalizedOptions,
        partials: Option<Vec<String>>,
        program: P,
    ) -> Self
    where
        P: Any + Send + Sync,
    {
        Self {
            engine,
            source: source.into(),
            options,
            partials,
            program: Box::new(program),
        }
    }

    /// Name of the engine that produced this template
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Original source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Options the template was compiled with
    pub fn options(&self) -> &NormalizedOptions {
        &self.options
    }

    /// Names of the partials this template references, in first-use order
    ///
    /// Uses the engine's compile metadata and falls back to scanning the
    /// source for partial tags when the engine did not provide any.
    pub fn referenced_partials(&self) -> Result<Cow<'_, [String]>> {
        match &self.partials {
            Some(names) => Ok(Cow::Borrowed(names.as_slice())),
            None => {
                let (open, close) = self.options.delimiter_pair()?;
                Ok(Cow::Owned(scan_partials(&self.source, open, close)))
            }
        }
    }

    /// Engine-private program, if it has type `P`
    pub fn program<P: Any>(&self) -> Option<&P> {
        self.program.downcast_ref::<P>()
    }

    /// The program for `engine`, or a render error naming both engines
    pub(crate) fn program_for<P: Any>(&self, engine: &'static str) -> Result<&P> {
        self.program::<P>().ok_or_else(|| {
            ViewError::render(format!(
                "template was compiled by the {:?} engine, not {:?}",
                self.engine, engine
            ))
        })
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("engine", &self.engine)
            .field("options", &self.options)
            .field("partials", &self.partials)
            .field("source_len", &self.source.len())
            .finish()
    }
}

/// Collect the names of partial tags in `source`, deduplicated in order
///
/// Recognizes `{{> name}}` as well as the Handlebars forms `{{~> name}}` and
/// `{{#> name}}`. Tags preceded by a backslash are literal text and skipped,
/// as are dynamic partials such as `{{> (lookup ...)}}`.
pub fn scan_partials(source: &str, open: &str, close: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find(open) {
        let escaped = rest[..start].ends_with('\\');
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(close) else {
            break;
        };

        if !escaped {
            if let Some(name) = partial_name(&after[..end]) {
                if !names.iter().any(|known| known == name) {
                    names.push(name.to_string());
                }
            }
        }

        rest = &after[end + close.len()..];
    }

    names
}

fn partial_name(tag: &str) -> Option<&str> {
    let tag = tag.trim().trim_start_matches('~').trim_start();
    let reference = tag.strip_prefix("#>").or_else(|| tag.strip_prefix('>'))?;
    let name = reference.split_whitespace().next()?.trim_end_matches('~');
    if name.is_empty() || name.starts_with('(') {
        return None;
    }
    Some(name)
}

/// A Rust closure exposed to templates
///
/// With [`MustacheEngine`] a lambda receives the raw text of the section it
/// is called for (empty for `{{name}}` tags) and returns template text that is
/// rendered in its place. With [`HandlebarsEngine`] it is a helper receiving
/// its first argument as text.
pub type Lambda = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Select an engine by its configured name
///
/// `""` and `"mustache"` select the default [`MustacheEngine`];
/// `"handlebars"` selects [`HandlebarsEngine`].
pub fn engine_by_name(name: &str) -> Result<Arc<dyn Engine>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | MustacheEngine::NAME => Ok(default_engine()),
        HandlebarsEngine::NAME => Ok(Arc::new(HandlebarsEngine::new())),
        other => Err(ViewError::UnknownEngine(other.to_string())),
    }
}

/// The engine used when none is configured
pub fn default_engine() -> Arc<dyn Engine> {
    Arc::new(MustacheEngine::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use proptest::prelude::*;

    #[test]
    fn test_scan_partials() {
        let names = scan_partials("{{> header}} {{name}} {{>footer ctx}}{{> header}}", "{{", "}}");
        assert_eq!(names, vec!["header".to_string(), "footer".to_string()]);
    }

    #[test]
    fn test_scan_skips_escaped_tags() {
        let names = scan_partials("\\{{> literal}} {{> real}}", "{{", "}}");
        assert_eq!(names, vec!["real".to_string()]);
    }

    #[test]
    fn test_scan_custom_delimiters() {
        let names = scan_partials("<%> nav%> {{> ignored}}", "<%", "%>");
        assert_eq!(names, vec!["nav".to_string()]);
    }

    #[test]
    fn test_scan_handlebars_partial_forms() {
        let names = scan_partials(
            "{{~> trimmed}} {{#> block}}fallback{{/block}} {{> spaced~}} {{> (dynamic)}}",
            "{{",
            "}}",
        );
        assert_eq!(
            names,
            vec!["trimmed".to_string(), "block".to_string(), "spaced".to_string()]
        );
    }

    #[test]
    fn test_fallback_scan_without_metadata() {
        let template = CompiledTemplate::new(
            "other",
            "<%> nav%>",
            EngineOptions::new().delimiters("<%", "%>").normalized(),
            None,
            (),
        );
        assert_eq!(template.referenced_partials().unwrap().as_ref(), &["nav".to_string()]);
    }

    #[test]
    fn test_foreign_program_is_rejected() {
        let template =
            CompiledTemplate::new("other", "text", NormalizedOptions::default(), None, ());
        let result = template.program_for::<String>(MustacheEngine::NAME);
        assert!(matches!(result, Err(ViewError::Render(_))));
    }

    #[test]
    fn test_engine_by_name() {
        assert_eq!(engine_by_name("").unwrap().name(), "mustache");
        assert_eq!(engine_by_name("Mustache").unwrap().name(), "mustache");
        assert_eq!(engine_by_name("handlebars").unwrap().name(), "handlebars");
        assert!(matches!(
            engine_by_name("jade"),
            Err(ViewError::UnknownEngine(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_scan_finds_every_partial(
            names in proptest::collection::vec("[a-z][a-z0-9_]{0,8}", 1..6),
            filler in "[a-zA-Z .,\n]{0,12}",
        ) {
            let source: String = names
                .iter()
                .map(|name| format!("{}{{{{> {}}}}}", filler, name))
                .collect();

            let mut expected: Vec<String> = Vec::new();
            for name in &names {
                if !expected.contains(name) {
                    expected.push(name.clone());
                }
            }

            prop_assert_eq!(scan_partials(&source, "{{", "}}"), expected);
        }
    }
}
