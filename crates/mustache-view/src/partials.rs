//! Partial discovery and resolution
//!
//! Every partial a template references is compiled and registered before the
//! template renders. A name is looked up at most once per map: resolved,
//! unresolved (`None`) and overridden names all short-circuit, which keeps
//! cyclic partial graphs finite.

use crate::cache;
use crate::engine::{CompiledTemplate, Engine};
use crate::error::Result;
use crate::lookup::ViewLookup;
use crate::options::{NormalizedOptions, PartialOverrides, PartialSource};
use crate::tracing_macros::{trace_debug, trace_trace};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Partial name to compiled template; `None` marks a partial with no file
pub type PartialMap = BTreeMap<String, Option<Arc<CompiledTemplate>>>;

/// Resolves partials for one render call
pub(crate) struct PartialResolver<'a> {
    pub(crate) engine: &'a dyn Engine,
    pub(crate) lookup: &'a dyn ViewLookup,
    pub(crate) extension: &'a str,
    pub(crate) call: &'a PartialOverrides,
    pub(crate) settings: &'a PartialOverrides,
    pub(crate) options: &'a NormalizedOptions,
    pub(crate) cache: bool,
}

impl<'a> PartialResolver<'a> {
    /// Register every partial `template` references, recursively
    pub(crate) fn resolve(&self, template: &CompiledTemplate, partials: &mut PartialMap) -> Result<()> {
        for name in template.referenced_partials()?.iter() {
            if partials.contains_key(name) {
                continue;
            }

            let found = self.find(name)?;
            partials.insert(name.clone(), found.clone());

            if let Some(partial) = found {
                self.resolve(&partial, partials)?;
            }
        }
        Ok(())
    }

    /// Install call-level overrides over whatever `partials` already holds
    ///
    /// Nested partials of the overrides are resolved afterwards, so overrides
    /// that reference each other never hit the filesystem.
    pub(crate) fn apply_overrides(&self, partials: &mut PartialMap) -> Result<()> {
        let mut installed = Vec::with_capacity(self.call.len());
        for (name, source) in self.call {
            let template = self.materialize(source)?;
            partials.insert(name.clone(), Some(Arc::clone(&template)));
            installed.push(template);
        }

        for template in installed {
            self.resolve(&template, partials)?;
        }
        Ok(())
    }

    /// Turn an override into a compiled template
    pub(crate) fn materialize(&self, source: &PartialSource) -> Result<Arc<CompiledTemplate>> {
        match source {
            PartialSource::Compiled(template) => Ok(Arc::clone(template)),
            PartialSource::Text(text) => cache::compile_source(self.engine, text, self.options),
        }
    }

    fn find(&self, name: &str) -> Result<Option<Arc<CompiledTemplate>>> {
        if let Some(source) = self.call.get(name) {
            trace_trace!(partial = name, origin = "call", "partial resolved");
            return self.materialize(source).map(Some);
        }

        if let Some(source) = self.settings.get(name) {
            trace_trace!(partial = name, origin = "settings", "partial resolved");
            return self.materialize(source).map(Some);
        }

        let file = format!("{}{}", name, self.extension);
        match self.lookup.lookup(&file) {
            Some(path) => {
                trace_trace!(partial = name, path = %path.display(), "partial resolved");
                cache::compile_or_fetch(self.engine, &path, self.options, self.cache).map(Some)
            }
            None => {
                trace_debug!(partial = name, "partial not found, rendering as empty");
                Ok(None)
            }
        }
    }
}
