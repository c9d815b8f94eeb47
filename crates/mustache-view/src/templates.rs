//! Shared template handle for web applications

use crate::cache;
use crate::context::{merge_locals, to_locals};
use crate::engine::{engine_by_name, Engine, MustacheEngine};
use crate::error::{Result, ViewError};
use crate::logic::ViewLogic;
use crate::lookup::{normalize_extension, with_extension, DirLookup, ViewLookup};
use crate::options::{EngineOptions, PartialOverrides, PartialSource, RenderOptions, Settings};
use crate::tracing_macros::trace_debug;
use crate::view::View;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Configuration for the template handle
///
/// Every field can also be read from `TEMPLATES_*` environment variables
/// with [`TemplatesConfig::from_env`], e.g. `TEMPLATES_VIEWS=views,shared`
/// or `TEMPLATES_VIEW_CACHE=true`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// View directories, searched in order
    pub views: Vec<PathBuf>,
    /// Extension appended to view, partial and layout names
    pub extension: String,
    /// Keep compiled templates and view objects between renders
    pub view_cache: bool,
    /// Default layout name
    pub layout: Option<String>,
    /// Engine name, see [`engine_by_name`]
    pub engine: String,
    /// Delimiter pair as `"<open> <close>"`
    pub delimiters: Option<String>,
    /// Emit interpolated values without HTML escaping
    pub as_string: Option<bool>,
    /// Do not expose engine lambdas to templates
    pub disable_lambda: Option<bool>,
    /// Settings-level partial overrides
    #[serde(skip)]
    pub partials: PartialOverrides,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            views: vec![PathBuf::from("views")],
            extension: ".mustache".to_string(),
            view_cache: !cfg!(debug_assertions),
            layout: None,
            engine: MustacheEngine::NAME.to_string(),
            delimiters: None,
            as_string: None,
            disable_lambda: None,
            partials: PartialOverrides::new(),
        }
    }
}

impl TemplatesConfig {
    /// Create a new config for a single view directory
    pub fn new(views: impl Into<PathBuf>) -> Self {
        Self {
            views: vec![views.into()],
            ..Default::default()
        }
    }

    /// Load configuration from `TEMPLATES_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(envy::prefixed("TEMPLATES_").from_env::<Self>()?)
    }

    /// Add another view directory, searched after the existing ones
    pub fn add_views(mut self, dir: impl Into<PathBuf>) -> Self {
        self.views.push(dir.into());
        self
    }

    /// Set the template extension
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    /// Set view caching
    pub fn view_cache(mut self, enabled: bool) -> Self {
        self.view_cache = enabled;
        self
    }

    /// Set the default layout
    pub fn layout(mut self, name: impl Into<String>) -> Self {
        self.layout = Some(name.into());
        self
    }

    /// Select the engine by name
    pub fn engine(mut self, name: impl Into<String>) -> Self {
        self.engine = name.into();
        self
    }

    /// Set engine options
    pub fn engine_options(mut self, options: EngineOptions) -> Self {
        self.delimiters = options.delimiters;
        self.as_string = options.as_string;
        self.disable_lambda = options.disable_lambda;
        self
    }

    /// Add a settings-level partial override
    pub fn partial(mut self, name: impl Into<String>, source: impl Into<PartialSource>) -> Self {
        self.partials.insert(name.into(), source.into());
        self
    }

    fn settings(&self) -> Settings {
        Settings {
            engine: EngineOptions {
                delimiters: self.delimiters.clone(),
                as_string: self.as_string,
                disable_lambda: self.disable_lambda,
            },
            layout: self.layout.clone(),
            partials: self.partials.clone(),
        }
    }
}

/// Thread-safe template handle
///
/// Cheap to clone and meant to be shared across handlers. With the view
/// cache on, one [`View`] per name is kept and locked for the duration of a
/// render; with it off every render builds a fresh view.
///
/// # Example
///
/// ```rust,ignore
/// use mustache_view::{ContextBuilder, Templates};
///
/// let templates = Templates::new("views")?;
/// templates.set_local("site", &"Acme")?;
///
/// let html = templates
///     .render("home", ContextBuilder::new().insert("name", "Alice").build())
///     .await?;
/// ```
#[derive(Clone)]
pub struct Templates {
    inner: Arc<Inner>,
}

struct Inner {
    config: TemplatesConfig,
    extension: String,
    engine: Arc<dyn Engine>,
    lookup: Arc<dyn ViewLookup>,
    locals: RwLock<Map<String, Value>>,
    partials: RwLock<PartialOverrides>,
    logic: RwLock<HashMap<String, ViewLogic>>,
    views: Mutex<HashMap<String, Arc<Mutex<View>>>>,
}

impl Templates {
    /// Create a handle over one view directory
    ///
    /// # Errors
    ///
    /// Returns an error if the configured engine is unknown.
    pub fn new(views: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(TemplatesConfig::new(views))
    }

    /// Create a handle from configuration
    pub fn with_config(config: TemplatesConfig) -> Result<Self> {
        let engine = engine_by_name(&config.engine)?;
        Ok(Self::with_engine(config, engine))
    }

    /// Create a handle with a custom engine, ignoring `config.engine`
    pub fn with_engine(config: TemplatesConfig, engine: Arc<dyn Engine>) -> Self {
        let lookup: Arc<dyn ViewLookup> = Arc::new(DirLookup::with_roots(config.views.clone()));
        Self {
            inner: Arc::new(Inner {
                extension: normalize_extension(&config.extension),
                config,
                engine,
                lookup,
                locals: RwLock::new(Map::new()),
                partials: RwLock::new(PartialOverrides::new()),
                logic: RwLock::new(HashMap::new()),
                views: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The configuration
    pub fn config(&self) -> &TemplatesConfig {
        &self.inner.config
    }

    /// Set an application-level local, visible to every render
    pub fn set_local<T: Serialize + ?Sized>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        write(&self.inner.locals).insert(key.into(), value);
        Ok(())
    }

    /// Snapshot of the application-level locals
    pub fn locals(&self) -> Map<String, Value> {
        read(&self.inner.locals).clone()
    }

    /// Register a settings-level partial, consulted before partial files
    pub fn register_partial(&self, name: impl Into<String>, source: impl Into<PartialSource>) {
        write(&self.inner.partials).insert(name.into(), source.into());
        // cached views hold partial maps built without this override
        lock(&self.inner.views).clear();
    }

    /// Attach view logic to the view `name`
    pub fn register_logic(&self, name: impl Into<String>, logic: ViewLogic) {
        let name = name.into();
        lock(&self.inner.views).remove(&name);
        write(&self.inner.logic).insert(name, logic);
    }

    /// Render the view `name` on the current thread
    pub fn render_sync(&self, name: &str, locals: Map<String, Value>) -> Result<String> {
        self.render_view(name, RenderOptions::new().locals(locals))
    }

    /// Render the view `name` with per-call options
    ///
    /// Caching and settings come from the configuration; the call's
    /// engine options, layout and partial overrides apply on top of them.
    /// Application locals sit under the call's locals.
    pub fn render_view(&self, name: &str, mut options: RenderOptions) -> Result<String> {
        let config = &self.inner.config;
        options.cache = config.view_cache;
        options.settings = config.settings();
        options
            .settings
            .partials
            .extend(read(&self.inner.partials).clone());
        options.locals = merge_locals([&*read(&self.inner.locals), &options.locals]);

        let view = self.view(name)?;
        let mut view = lock(&view);
        let mut outcome = None;
        view.render_callback(&options, |result| outcome = Some(result));
        outcome.unwrap_or_else(|| Err(ViewError::render("view reported no result")))
    }

    /// Render the view `name` on the blocking pool
    pub async fn render(&self, name: &str, locals: Map<String, Value>) -> Result<String> {
        let templates = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || templates.render_sync(&name, locals))
            .await
            .map_err(|err| ViewError::render(format!("render task failed: {}", err)))?
    }

    /// Render the view `name` with a serializable context
    pub async fn render_with<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<String> {
        let locals = to_locals(data)?;
        self.render(name, locals).await
    }

    /// Check if a view exists
    pub fn has_template(&self, name: &str) -> bool {
        self.inner
            .lookup
            .lookup(&with_extension(name, &self.inner.extension))
            .is_some()
    }

    /// Drop every view object and the process-wide compile caches
    pub fn clear_cache(&self) {
        lock(&self.inner.views).clear();
        trace_debug!("view objects dropped");
        cache::clear();
    }

    fn view(&self, name: &str) -> Result<Arc<Mutex<View>>> {
        if !self.inner.config.view_cache {
            return self.create_view(name).map(|view| Arc::new(Mutex::new(view)));
        }

        let mut views = lock(&self.inner.views);
        if let Some(view) = views.get(name) {
            return Ok(Arc::clone(view));
        }

        let view = Arc::new(Mutex::new(self.create_view(name)?));
        views.insert(name.to_string(), Arc::clone(&view));
        Ok(view)
    }

    fn create_view(&self, name: &str) -> Result<View> {
        let mut view = View::new(name, &self.inner.extension, Arc::clone(&self.inner.lookup))?
            .with_engine(Arc::clone(&self.inner.engine));
        if let Some(logic) = read(&self.inner.logic).get(name) {
            view.set_logic(logic.clone());
        }
        Ok(view)
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("config", &self.inner.config)
            .field("engine", &self.inner.engine.name())
            .finish()
    }
}

// a panicking render never leaves these maps half-updated
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use std::fs;

    fn fixture(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn locals(value: Value) -> Map<String, Value> {
        to_locals(&value).unwrap()
    }

    #[tokio::test]
    async fn test_render() {
        let dir = fixture(&[("test.mustache", "Hello, {{name}}!")]);
        let templates = Templates::new(dir.path()).unwrap();

        let result = templates
            .render("test", locals(json!({"name": "World"})))
            .await
            .unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[tokio::test]
    async fn test_render_with_struct() {
        #[derive(Serialize)]
        struct Data {
            name: String,
        }

        let dir = fixture(&[("test.mustache", "Hello, {{name}}!")]);
        let templates = Templates::new(dir.path()).unwrap();

        let data = Data {
            name: "Alice".to_string(),
        };
        let result = templates.render_with("test", &data).await.unwrap();
        assert_eq!(result, "Hello, Alice!");
    }

    #[test]
    fn test_app_locals_under_call_locals() {
        let dir = fixture(&[("page.mustache", "{{site}}/{{title}}")]);
        let templates = Templates::new(dir.path()).unwrap();
        templates.set_local("site", "Acme").unwrap();
        templates.set_local("title", "Default").unwrap();

        let html = templates
            .render_sync("page", locals(json!({"title": "Orders"})))
            .unwrap();
        assert_eq!(html, "Acme/Orders");
        assert_eq!(templates.locals()["title"], json!("Default"));
    }

    #[test]
    fn test_config_layout_and_registered_partial() {
        let dir = fixture(&[
            ("page.mustache", "{{> banner}}"),
            ("shell.mustache", "[{{> content}}]"),
        ]);
        let templates =
            Templates::with_config(TemplatesConfig::new(dir.path()).layout("shell")).unwrap();
        templates.register_partial("banner", "sale");

        assert_eq!(templates.render_sync("page", Map::new()).unwrap(), "[sale]");
    }

    #[test]
    fn test_unknown_engine() {
        let config = TemplatesConfig::new("views").engine("jade");
        assert!(matches!(
            Templates::with_config(config),
            Err(ViewError::UnknownEngine(_))
        ));
    }

    #[test]
    fn test_has_template() {
        let dir = fixture(&[("home.mustache", "home")]);
        let templates = Templates::new(dir.path()).unwrap();

        assert!(templates.has_template("home"));
        assert!(!templates.has_template("missing"));
    }

    #[test]
    #[serial]
    fn test_cached_views_are_reused() {
        let dir = fixture(&[("home.mustache", "v1")]);
        let templates =
            Templates::with_config(TemplatesConfig::new(dir.path()).view_cache(true)).unwrap();

        assert_eq!(templates.render_sync("home", Map::new()).unwrap(), "v1");
        fs::write(dir.path().join("home.mustache"), "v2").unwrap();
        assert_eq!(templates.render_sync("home", Map::new()).unwrap(), "v1");

        templates.clear_cache();
        assert_eq!(templates.render_sync("home", Map::new()).unwrap(), "v2");
    }

    #[test]
    fn test_register_logic() {
        let dir = fixture(&[("home.mustache", "{{greeting}}")]);
        let templates = Templates::new(dir.path()).unwrap();
        templates.register_logic(
            "home",
            ViewLogic::transform(|_| Ok(json!({"greeting": "from logic"}))),
        );

        assert_eq!(templates.render_sync("home", Map::new()).unwrap(), "from logic");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("TEMPLATES_VIEWS", "pages,shared");
        std::env::set_var("TEMPLATES_EXTENSION", ".hjs");
        std::env::set_var("TEMPLATES_VIEW_CACHE", "true");
        std::env::set_var("TEMPLATES_AS_STRING", "true");

        let config = TemplatesConfig::from_env().unwrap();

        std::env::remove_var("TEMPLATES_VIEWS");
        std::env::remove_var("TEMPLATES_EXTENSION");
        std::env::remove_var("TEMPLATES_VIEW_CACHE");
        std::env::remove_var("TEMPLATES_AS_STRING");

        assert_eq!(config.views, vec![PathBuf::from("pages"), PathBuf::from("shared")]);
        assert_eq!(config.extension, ".hjs");
        assert!(config.view_cache);
        assert_eq!(config.as_string, Some(true));
        assert_eq!(config.engine, "mustache");
    }
}
