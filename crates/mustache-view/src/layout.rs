//! Layout composition
//!
//! A layout is an ordinary template that renders the view through the
//! `content` partial.

use crate::cache;
use crate::engine::CompiledTemplate;
use crate::error::{Result, ViewError};
use crate::lookup::with_extension;
use crate::partials::{PartialMap, PartialResolver};
use crate::tracing_macros::trace_debug;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Partial name the wrapped view is bound to
pub const CONTENT_PARTIAL: &str = "content";

/// Resolve and compile the layout `name`, registering its partials
///
/// With caching on, compiled layouts are kept in `layouts` (the view's own
/// per-name store) and reused as long as the compile options match.
pub(crate) fn resolve_layout(
    layouts: &mut HashMap<String, Arc<CompiledTemplate>>,
    name: &str,
    resolver: &PartialResolver<'_>,
    partials: &mut PartialMap,
) -> Result<Arc<CompiledTemplate>> {
    if resolver.cache {
        if let Some(layout) = layouts.get(name).filter(|layout| layout.options() == resolver.options) {
            trace_debug!(layout = name, "layout reused from view");
            return Ok(Arc::clone(layout));
        }
    }

    let file = with_extension(name, resolver.extension);
    let path = resolver
        .lookup
        .lookup(&file)
        .ok_or_else(|| ViewError::FileNotFound(PathBuf::from(&file)))?;

    let layout = cache::compile_or_fetch(resolver.engine, &path, resolver.options, resolver.cache)?;
    resolver.resolve(&layout, partials)?;

    if resolver.cache {
        layouts.insert(name.to_string(), Arc::clone(&layout));
    }
    Ok(layout)
}

/// Bind `main` as the `content` partial of a working partial map
pub(crate) fn with_content(mut partials: PartialMap, main: Arc<CompiledTemplate>) -> PartialMap {
    partials.insert(CONTENT_PARTIAL.to_string(), Some(main));
    partials
}
