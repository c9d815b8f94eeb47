//! Mustache engine
//!
//! Renders parsed templates against a `serde_json::Value` context stack.
//! Names resolve from the innermost context outward, and a dotted name walks
//! the stack for its first segment only. Falsy values are `null`, `false`,
//! `0`, `""` and the empty list.

use super::parser::{self, Node};
use super::{CompiledTemplate, Engine, Lambda};
use crate::error::{Result, ViewError};
use crate::options::NormalizedOptions;
use crate::partials::PartialMap;
use crate::tracing_macros::trace_trace;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Deepest partial (or lambda) nesting a render may reach
const MAX_DEPTH: usize = 256;

/// Parsed program stored in a [`CompiledTemplate`]
#[derive(Debug)]
pub(crate) struct Program {
    nodes: Vec<Node>,
}

/// The default [`Engine`]: Mustache templates
///
/// # Options
///
/// - `delimiters`: the tag delimiters the source starts with; `{{=<% %>=}}`
///   tags can change them mid-template
/// - `as_string`: interpolations are emitted verbatim, without HTML escaping
/// - `disable_lambda`: lambdas registered with [`with_lambda`](Self::with_lambda)
///   are ignored, so their names render as missing
///
/// # Lambdas
///
/// A lambda is consulted when a name is not found in the context. For a
/// section it receives the unrendered section body; for `{{name}}` it receives
/// an empty string. Whatever it returns is rendered as a template in the
/// current context.
///
/// # Example
///
/// ```rust
/// use mustache_view::{Engine, MustacheEngine, NormalizedOptions, PartialMap};
/// use serde_json::json;
///
/// let engine = MustacheEngine::new();
/// let template = engine
///     .compile("inline", "{{#items}}<{{.}}>{{/items}}{{^items}}none{{/items}}", &NormalizedOptions::default())
///     .unwrap();
/// let output = engine
///     .render(&template, &json!({"items": ["a", "b"]}), &PartialMap::new())
///     .unwrap();
/// assert_eq!(output, "<a><b>");
/// ```
#[derive(Clone, Default)]
pub struct MustacheEngine {
    lambdas: BTreeMap<String, Lambda>,
}

impl MustacheEngine {
    /// Engine name used in cache keys and configuration
    pub const NAME: &'static str = "mustache";

    /// Create an engine without lambdas
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lambda available as `{{name}}` and `{{#name}}...{{/name}}`
    pub fn with_lambda<F>(mut self, name: impl Into<String>, lambda: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.lambdas.insert(name.into(), Arc::new(lambda));
        self
    }
}

impl fmt::Debug for MustacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MustacheEngine")
            .field("lambdas", &self.lambdas.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Engine for MustacheEngine {
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
        let parsed = parser::parse(label, source, open, close)?;

        Ok(CompiledTemplate::new(
            Self::NAME,
            source,
            options.clone(),
            Some(parsed.partials),
            Program {
                nodes: parsed.nodes,
            },
        ))
    }

    fn render(
        &self,
        template: &CompiledTemplate,
        context: &Value,
        partials: &PartialMap,
    ) -> Result<String> {
        let program = template.program_for::<Program>(Self::NAME)?;
        let options = template.options();
        let renderer = Renderer {
            lambdas: (!options.disable_lambda).then_some(&self.lambdas),
            escape: !options.as_string,
            partials,
        };

        let mut out = Output::default();
        renderer.nodes(&program.nodes, &mut vec![context], "", 0, &mut out)?;
        Ok(out.buf)
    }
}

/// Rendered text plus whether the next write starts a line
struct Output {
    buf: String,
    line_start: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            buf: String::new(),
            line_start: true,
        }
    }
}

impl Output {
    /// Write template text, indenting every line it starts
    fn text(&mut self, text: &str, indent: &str) {
        for line in text.split_inclusive('\n') {
            self.value(line, indent);
            self.line_start = line.ends_with('\n');
        }
    }

    /// Write interpolated text; only its first line is indented
    fn value(&mut self, text: &str, indent: &str) {
        if text.is_empty() {
            return;
        }
        if self.line_start {
            self.buf.push_str(indent);
        }
        self.buf.push_str(text);
        self.line_start = false;
    }
}

struct Renderer<'r> {
    lambdas: Option<&'r BTreeMap<String, Lambda>>,
    escape: bool,
    partials: &'r PartialMap,
}

impl Renderer<'_> {
    fn nodes<'v>(
        &self,
        nodes: &[Node],
        stack: &mut Vec<&'v Value>,
        indent: &str,
        depth: usize,
        out: &mut Output,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.text(text, indent),
                Node::Variable { name, escape } => {
                    let text = match lookup(name, stack) {
                        Some(value) => stringify(value),
                        None => match self.lambda(name) {
                            Some(lambda) => {
                                let source = lambda("");
                                let mut inner = Output::default();
                                self.lambda_output(name, &source, ("{{", "}}"), stack, "", depth, &mut inner)?;
                                inner.buf
                            }
                            None => continue,
                        },
                    };
                    if *escape && self.escape {
                        out.value(&escape_html(&text), indent);
                    } else {
                        out.value(&text, indent);
                    }
                }
                Node::Section {
                    name,
                    inverted: true,
                    children,
                    ..
                } => {
                    let falsy = match lookup(name, stack) {
                        Some(value) => !truthy(value),
                        None => self.lambda(name).is_none(),
                    };
                    if falsy {
                        self.nodes(children, stack, indent, depth, out)?;
                    }
                }
                Node::Section {
                    name,
                    children,
                    raw,
                    delimiters,
                    ..
                } => match lookup(name, stack) {
                    Some(Value::Array(items)) => {
                        for item in items {
                            stack.push(item);
                            let rendered = self.nodes(children, stack, indent, depth, out);
                            stack.pop();
                            rendered?;
                        }
                    }
                    Some(value) if truthy(value) => {
                        stack.push(value);
                        let rendered = self.nodes(children, stack, indent, depth, out);
                        stack.pop();
                        rendered?;
                    }
                    Some(_) => {}
                    None => {
                        if let Some(lambda) = self.lambda(name) {
                            let source = lambda(raw);
                            let (open, close) = delimiters;
                            let delimiters = (open.as_str(), close.as_str());
                            self.lambda_output(name, &source, delimiters, stack, indent, depth, out)?;
                        }
                    }
                },
                Node::Partial { name, indent: own } => {
                    // unresolved partials render as nothing
                    let Some(Some(partial)) = self.partials.get(name) else {
                        continue;
                    };
                    if depth >= MAX_DEPTH {
                        return Err(nested_too_deep(name));
                    }
                    let program = partial.program_for::<Program>(MustacheEngine::NAME)?;
                    let indent = format!("{}{}", indent, own);
                    self.nodes(&program.nodes, stack, &indent, depth + 1, out)?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn lambda_output<'v>(
        &self,
        name: &str,
        source: &str,
        (open, close): (&str, &str),
        stack: &mut Vec<&'v Value>,
        indent: &str,
        depth: usize,
        out: &mut Output,
    ) -> Result<()> {
        trace_trace!(lambda = name, "rendering lambda output");
        if depth >= MAX_DEPTH {
            return Err(nested_too_deep(name));
        }
        let parsed = parser::parse(name, source, open, close)?;
        self.nodes(&parsed.nodes, stack, indent, depth + 1, out)
    }

    fn lambda(&self, name: &str) -> Option<&Lambda> {
        self.lambdas.and_then(|lambdas| lambdas.get(name))
    }
}

fn nested_too_deep(name: &str) -> ViewError {
    ViewError::render(format!(
        "{:?} nested more than {} levels deep",
        name, MAX_DEPTH
    ))
}

/// Resolve `name` against the context stack, innermost first
fn lookup<'v>(name: &str, stack: &[&'v Value]) -> Option<&'v Value> {
    if name == "." {
        return stack.last().copied();
    }

    let mut parts = name.split('.');
    let first = parts.next()?;
    let mut value = stack
        .iter()
        .rev()
        .find_map(|frame| frame.as_object().and_then(|map| map.get(first)))?;
    for part in parts {
        value = match value {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Text of an interpolated value; lists and objects render as JSON
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
