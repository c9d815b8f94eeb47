//! View objects and the render pipeline

use crate::cache;
use crate::engine::{default_engine, CompiledTemplate, Engine};
use crate::error::{Result, ViewError};
use crate::layout;
use crate::logic::ViewLogic;
use crate::lookup::{normalize_extension, with_extension, ViewLookup};
use crate::options::RenderOptions;
use crate::partials::{PartialMap, PartialResolver};
use crate::tracing_macros::trace_debug;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State for one logical view, reused across renders of that view
///
/// The compiled template, its partial map and any layouts are initialized on
/// the first render and kept while the render options ask for caching. A
/// render takes `&mut self`, so a shared view must sit behind a lock.
///
/// # Example
///
/// ```rust,ignore
/// use mustache_view::{DirLookup, RenderOptions, View};
/// use std::sync::Arc;
///
/// let mut view = View::new("home", ".mustache", Arc::new(DirLookup::new("views")))?;
/// let html = view.render(
///     &RenderOptions::new()
///         .cache(true)
///         .layout("layout")
///         .local("name", "World"),
/// )?;
/// ```
pub struct View {
    name: String,
    path: PathBuf,
    extension: String,
    engine: Arc<dyn Engine>,
    lookup: Arc<dyn ViewLookup>,
    template: Option<Arc<CompiledTemplate>>,
    partials: PartialMap,
    layouts: HashMap<String, Arc<CompiledTemplate>>,
    logic: Option<ViewLogic>,
    sibling_logic: Option<Option<ViewLogic>>,
}

impl View {
    /// Look up the view `name` through `lookup`
    ///
    /// When `name` carries its own extension, that extension is also used for
    /// the view's partials and layouts; otherwise `default_extension` is.
    pub fn new(
        name: impl Into<String>,
        default_extension: &str,
        lookup: Arc<dyn ViewLookup>,
    ) -> Result<Self> {
        let name = name.into();
        let extension = match Path::new(&name).extension().and_then(|ext| ext.to_str()) {
            Some(ext) => normalize_extension(ext),
            None => normalize_extension(default_extension),
        };

        let file = with_extension(&name, &extension);
        let path = lookup
            .lookup(&file)
            .ok_or_else(|| ViewError::FileNotFound(PathBuf::from(&file)))?;

        Ok(Self::from_parts(name, path, extension, lookup))
    }

    /// Create a view for a path the host already resolved
    pub fn from_path(
        path: impl Into<PathBuf>,
        extension: &str,
        lookup: Arc<dyn ViewLookup>,
    ) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_parts(name, path, normalize_extension(extension), lookup)
    }

    fn from_parts(
        name: String,
        path: PathBuf,
        extension: String,
        lookup: Arc<dyn ViewLookup>,
    ) -> Self {
        Self {
            name,
            path,
            extension,
            engine: default_engine(),
            lookup,
            template: None,
            partials: PartialMap::new(),
            layouts: HashMap::new(),
            logic: None,
            sibling_logic: None,
        }
    }

    /// Use `engine` instead of the default engine
    pub fn with_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = engine;
        self
    }

    /// Attach view logic, replacing any sibling logic file
    pub fn with_logic(mut self, logic: ViewLogic) -> Self {
        self.set_logic(logic);
        self
    }

    /// Attach view logic, replacing any sibling logic file
    pub fn set_logic(&mut self, logic: ViewLogic) {
        self.logic = Some(logic);
    }

    /// Logical name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extension appended to partial and layout names
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The compiled template kept from a cached render
    pub fn template(&self) -> Option<&Arc<CompiledTemplate>> {
        self.template.as_ref()
    }

    /// The partial map kept from cached renders
    pub fn partials(&self) -> &PartialMap {
        &self.partials
    }

    /// Render the view
    pub fn render(&mut self, options: &RenderOptions) -> Result<String> {
        let normalized = options.engine_options().normalized();
        let cache = options.cache;

        let reused = self
            .template
            .as_ref()
            .filter(|template| cache && template.options() == &normalized)
            .map(Arc::clone);
        let fresh = reused.is_none();

        let (template, mut partials) = match reused {
            Some(template) => (template, self.partials.clone()),
            None => (
                cache::compile_or_fetch(self.engine.as_ref(), &self.path, &normalized, cache)?,
                PartialMap::new(),
            ),
        };

        if cache && fresh {
            self.partials.clear();
            self.layouts.clear();
        }

        let resolver = PartialResolver {
            engine: self.engine.as_ref(),
            lookup: self.lookup.as_ref(),
            extension: &self.extension,
            call: &options.partials,
            settings: &options.settings.partials,
            options: &normalized,
            cache,
        };
        resolver.apply_overrides(&mut partials)?;
        resolver.resolve(&template, &mut partials)?;

        let layout = match options.layout_name() {
            Some(name) => Some(layout::resolve_layout(
                &mut self.layouts,
                name,
                &resolver,
                &mut partials,
            )?),
            None => None,
        };

        if cache {
            // call-level overrides apply to this call only
            for (name, partial) in &partials {
                if !options.partials.contains_key(name) {
                    self.partials.insert(name.clone(), partial.clone());
                }
            }
            self.template = Some(Arc::clone(&template));
        }

        let context = self.augment(options.context())?;
        let (root, partials) = match layout {
            Some(layout) => (layout, layout::with_content(partials, template)),
            None => (template, partials),
        };

        trace_debug!(
            view = %self.name,
            layout = ?options.layout_name(),
            partials = partials.len(),
            "rendering view"
        );
        self.engine.render(&root, &context, &partials)
    }

    /// Render the view and report the outcome through `callback`
    ///
    /// `callback` runs exactly once. Panics raised while rendering, such as a
    /// panicking view-logic transform or engine lambda, are reported as
    /// [`ViewError::Render`].
    pub fn render_callback<F>(&mut self, options: &RenderOptions, callback: F)
    where
        F: FnOnce(Result<String>),
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.render(options)))
            .unwrap_or_else(|payload| Err(ViewError::render(panic_message(payload.as_ref()))));
        callback(outcome);
    }

    fn augment(&mut self, context: Value) -> Result<Value> {
        if let Some(logic) = &self.logic {
            return logic.apply(context);
        }

        if self.sibling_logic.is_none() {
            self.sibling_logic = Some(ViewLogic::load_sibling(&self.path)?);
        }

        match self.sibling_logic.as_ref().and_then(Option::as_ref) {
            Some(logic) => logic.apply(context),
            None => Ok(context),
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("extension", &self.extension)
            .field("engine", &self.engine.name())
            .field("compiled", &self.template.is_some())
            .field("partials", &self.partials.keys().collect::<Vec<_>>())
            .field("layouts", &self.layouts.keys().collect::<Vec<_>>())
            .field("logic", &self.logic)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("view panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("view panicked: {}", message)
    } else {
        "view panicked".to_string()
    }
}
