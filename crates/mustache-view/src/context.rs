//! Context builder for templates

use crate::error::{Result, ViewError};
use crate::tracing_macros::trace_debug;
use serde::Serialize;
use serde_json::{Map, Value};

/// Builder for constructing template context
///
/// This provides a fluent API for building template locals without
/// needing to create a struct for simple cases.
///
/// # Example
///
/// ```rust,ignore
/// use mustache_view::ContextBuilder;
///
/// let locals = ContextBuilder::new()
///     .insert("name", "Alice")
///     .insert("age", &30)
///     .insert_if("admin", &true, |_| user.is_admin())
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    locals: Map<String, Value>,
}

impl ContextBuilder {
    /// Create a new context builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value into the context
    ///
    /// A value that fails to serialize (a map with non-string keys, a
    /// `Serialize` impl returning an error) is stored as `null` so the chain
    /// can continue. Use [`try_insert`](Self::try_insert) to surface the error.
    pub fn insert<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        let key = key.into();
        let value = serde_json::to_value(value).unwrap_or_else(|_err| {
            trace_debug!(key = %key, error = %_err, "local failed to serialize, stored as null");
            Value::Null
        });
        self.locals.insert(key, value);
        self
    }

    /// Insert a value into the context, failing if it cannot be serialized
    pub fn try_insert<T: Serialize + ?Sized>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        self.locals.insert(key.into(), value);
        Ok(self)
    }

    /// Insert a value if a condition is met
    pub fn insert_if<T: Serialize + ?Sized, F>(
        self,
        key: impl Into<String>,
        value: &T,
        condition: F,
    ) -> Self
    where
        F: FnOnce(&T) -> bool,
    {
        if condition(value) {
            self.insert(key, value)
        } else {
            self
        }
    }

    /// Insert a value if it's Some
    pub fn insert_some<T: Serialize + ?Sized>(
        self,
        key: impl Into<String>,
        value: Option<&T>,
    ) -> Self {
        if let Some(v) = value {
            self.insert(key, v)
        } else {
            self
        }
    }

    /// Extend with the fields of a serializable struct
    pub fn extend<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.locals.extend(to_locals(value)?);
        Ok(self)
    }

    /// Build the locals map
    pub fn build(self) -> Map<String, Value> {
        self.locals
    }
}

impl From<ContextBuilder> for Map<String, Value> {
    fn from(builder: ContextBuilder) -> Self {
        builder.build()
    }
}

/// Serialize `data` into a locals map
///
/// `()` and other values serializing to `null` give an empty map; anything
/// else that is not a JSON object is rejected.
pub fn to_locals<T: Serialize + ?Sized>(data: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ViewError::render(format!(
            "template context must be a JSON object, got {}",
            kind(&other)
        ))),
    }
}

/// Overlay locals layers into a new map; later layers win
///
/// The layers themselves are left untouched.
pub fn merge_locals<'a, I>(layers: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Map<String, Value>>,
{
    let mut merged = Map::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_context_builder() {
        let context = ContextBuilder::new()
            .insert("name", "Alice")
            .insert("age", &30)
            .build();

        assert_eq!(context["name"], json!("Alice"));
        assert_eq!(context["age"], json!(30));
    }

    #[test]
    fn test_unserializable_values() {
        let mut grid = HashMap::new();
        grid.insert((0, 1), "cell");

        let context = ContextBuilder::new()
            .insert("grid", &grid)
            .insert("name", "kept")
            .build();
        assert_eq!(context["grid"], Value::Null);
        assert_eq!(context["name"], json!("kept"));

        let result = ContextBuilder::new().try_insert("grid", &grid);
        assert!(matches!(result, Err(ViewError::Serialization(_))));

        let context = ContextBuilder::new().try_insert("n", &1).unwrap().build();
        assert_eq!(context["n"], json!(1));
    }

    #[test]
    fn test_insert_if() {
        let show = true;
        let context = ContextBuilder::new()
            .insert_if("visible", "yes", |_| show)
            .insert_if("hidden", "no", |_| !show)
            .build();

        assert!(context.contains_key("visible"));
        assert!(!context.contains_key("hidden"));
    }

    #[test]
    fn test_insert_some() {
        let name: Option<&str> = Some("Alice");
        let missing: Option<&str> = None;

        let context = ContextBuilder::new()
            .insert_some("name", name)
            .insert_some("missing", missing)
            .build();

        assert!(context.contains_key("name"));
        assert!(!context.contains_key("missing"));
    }

    #[test]
    fn test_extend_with_struct() {
        #[derive(Serialize)]
        struct Page {
            title: String,
        }

        let context = ContextBuilder::new()
            .insert("title", "old")
            .extend(&Page {
                title: "Orders".to_string(),
            })
            .unwrap()
            .build();
        assert_eq!(context["title"], json!("Orders"));

        assert!(ContextBuilder::new().extend(&[1, 2]).is_err());
    }

    #[test]
    fn test_to_locals() {
        assert!(to_locals(&()).unwrap().is_empty());
        assert_eq!(to_locals(&json!({"a": 1})).unwrap()["a"], json!(1));
        assert!(matches!(to_locals("text"), Err(ViewError::Render(_))));
    }

    #[test]
    fn test_merge_locals_leaves_layers_untouched() {
        let app = ContextBuilder::new().insert("site", "Acme").insert("title", "App").build();
        let call = ContextBuilder::new().insert("title", "Call").build();

        let merged = merge_locals([&app, &call]);

        assert_eq!(merged["site"], json!("Acme"));
        assert_eq!(merged["title"], json!("Call"));
        assert_eq!(app["title"], json!("App"));
    }
}
