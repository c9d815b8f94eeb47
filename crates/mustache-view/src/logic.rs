//! View logic: presentation-only context augmentation
//!
//! A view can carry logic that reshapes its context right before rendering,
//! keeping formatting helpers next to the template instead of in handlers.
//! Logic is either a transform function or a shared mapping layered under
//! the context. Besides logic registered in code, a JSON object stored next
//! to the template (`home.mustache` → `home.json`) is picked up as a shared
//! mapping.

use crate::error::{Result, ViewError};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Context transform function
pub type Transform = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Logic attached to a view
#[derive(Clone)]
pub enum ViewLogic {
    /// Receives the raw context and returns the context to render
    Transform(Transform),
    /// Fields layered under the raw context; context fields win on collision
    Shared(Map<String, Value>),
}

impl ViewLogic {
    /// Logic from a transform function
    pub fn transform<F>(transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        ViewLogic::Transform(Arc::new(transform))
    }

    /// Logic from a shared mapping
    pub fn shared(fields: Map<String, Value>) -> Self {
        ViewLogic::Shared(fields)
    }

    /// Produce the context to render from the raw context
    pub fn apply(&self, context: Value) -> Result<Value> {
        match self {
            ViewLogic::Transform(transform) => transform(context),
            ViewLogic::Shared(shared) => match context {
                Value::Object(raw) => {
                    let mut merged = shared.clone();
                    merged.extend(raw);
                    Ok(Value::Object(merged))
                }
                other => Ok(other),
            },
        }
    }

    /// Load the `.json` sibling of `template`, if there is one
    pub fn load_sibling(template: &Path) -> Result<Option<Self>> {
        let path = template.with_extension("json");
        if path == template {
            return Ok(None);
        }

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ViewError::from_io(path, err)),
        };

        match serde_json::from_str::<Value>(&text)? {
            Value::Object(fields) => Ok(Some(ViewLogic::Shared(fields))),
            _ => Err(ViewError::Config(format!(
                "view logic {} must contain a JSON object",
                path.display()
            ))),
        }
    }
}

impl fmt::Debug for ViewLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewLogic::Transform(_) => f.write_str("ViewLogic::Transform(..)"),
            ViewLogic::Shared(fields) => f.debug_tuple("ViewLogic::Shared").field(fields).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_shared_is_layered_under_context() {
        let logic = ViewLogic::shared(object(json!({"title": "Default", "site": "Acme"})));
        let context = logic.apply(json!({"title": "Orders"})).unwrap();
        assert_eq!(context, json!({"title": "Orders", "site": "Acme"}));
    }

    #[test]
    fn test_transform_replaces_context() {
        let logic = ViewLogic::transform(|mut context| {
            let count = context["items"].as_array().map(Vec::len).unwrap_or(0);
            context["count"] = json!(count);
            Ok(context)
        });
        let context = logic.apply(json!({"items": [1, 2, 3]})).unwrap();
        assert_eq!(context["count"], json!(3));
    }

    #[test]
    fn test_transform_errors_propagate() {
        let logic = ViewLogic::transform(|_| Err(ViewError::render("no user in context")));
        assert!(matches!(logic.apply(json!({})), Err(ViewError::Render(_))));
    }

    #[test]
    fn test_load_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("home.mustache");
        fs::write(&template, "{{site}}").unwrap();
        assert!(ViewLogic::load_sibling(&template).unwrap().is_none());

        fs::write(dir.path().join("home.json"), r#"{"site": "Acme"}"#).unwrap();
        let logic = ViewLogic::load_sibling(&template).unwrap().unwrap();
        assert!(matches!(logic, ViewLogic::Shared(_)));
    }

    #[test]
    fn test_load_sibling_rejects_non_objects() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("list.mustache");
        fs::write(dir.path().join("list.json"), "[1, 2]").unwrap();
        assert!(matches!(
            ViewLogic::load_sibling(&template),
            Err(ViewError::Config(_))
        ));
    }
}
