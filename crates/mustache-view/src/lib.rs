//! # mustache-view
//!
//! Mustache view rendering for web applications.
//!
//! This crate sits between a web framework's "render a view" hook and a
//! Mustache template engine. It resolves partials from files,
//! wraps views in layouts, caches compiled templates and lets a view carry
//! its own presentation logic.
//!
//! ## Features
//!
//! - **File-based partials**: `{{> nav}}` loads `nav.mustache` from the view
//!   directories, recursively; missing partials render as nothing
//! - **Layouts**: a layout renders the view through its `{{> content}}` partial
//! - **Overrides**: per-call and settings-level partials beat partial files
//! - **Compiled template cache**: process-wide, keyed by path or source text,
//!   engine and compile options
//! - **View logic**: a transform or a sibling `.json` mapping reshapes the
//!   context before rendering
//! - **Response type**: [`Rendered`] turns a render result into an HTML response
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mustache_view::{ContextBuilder, Rendered, Templates, TemplatesConfig};
//!
//! let templates = Templates::with_config(
//!     TemplatesConfig::new("views").layout("layout"),
//! )?;
//!
//! let locals = ContextBuilder::new()
//!     .insert("title", "Welcome")
//!     .insert_some("user", Some("Alice"))
//!     .build();
//!
//! let response = Rendered::from_result(templates.render("home", locals).await)
//!     .into_response();
//! ```
//!
//! Lower-level control is available through [`View`] and [`RenderOptions`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
mod context;
mod engine;
mod error;
mod layout;
mod logic;
mod lookup;
mod options;
mod partials;
mod response;
mod templates;
mod tracing_macros;
mod view;

pub use context::{merge_locals, to_locals, ContextBuilder};
pub use engine::{
    default_engine, engine_by_name, scan_partials, CompiledTemplate, Engine, HandlebarsEngine,
    Lambda, MustacheEngine,
};
pub use error::{Result, ViewError};
pub use layout::CONTENT_PARTIAL;
pub use logic::{Transform, ViewLogic};
pub use lookup::{with_extension, DirLookup, ViewLookup};
pub use options::{
    EngineOptions, NormalizedOptions, PartialOverrides, PartialSource, RenderOptions, Settings,
    DEFAULT_DELIMITERS,
};
pub use partials::PartialMap;
pub use response::Rendered;
pub use templates::{Templates, TemplatesConfig};
pub use view::View;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ContextBuilder, EngineOptions, Rendered, RenderOptions, Templates, TemplatesConfig, View,
        ViewError, ViewLogic,
    };
}
