//! Name-to-path lookup for views, partials and layouts

use std::path::{Path, PathBuf};

/// Resolves a logical file name (already carrying its extension) to a path
///
/// Returns `None` when no such file exists. Closures with the matching
/// signature implement this trait, so a host can pass its own lookup.
pub trait ViewLookup: Send + Sync {
    /// Find the file for `name`
    fn lookup(&self, name: &str) -> Option<PathBuf>;
}

impl<F> ViewLookup for F
where
    F: Fn(&str) -> Option<PathBuf> + Send + Sync,
{
    fn lookup(&self, name: &str) -> Option<PathBuf> {
        self(name)
    }
}

/// Lookup over an ordered list of root directories; the first hit wins
#[derive(Debug, Clone, Default)]
pub struct DirLookup {
    roots: Vec<PathBuf>,
}

impl DirLookup {
    /// Create a lookup over a single root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    /// Create a lookup over several roots, searched in order
    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a root directory
    pub fn add_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// The configured roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ViewLookup for DirLookup {
    fn lookup(&self, name: &str) -> Option<PathBuf> {
        let clean = sanitize_name(name);
        if clean.is_empty() {
            return None;
        }

        self.roots
            .iter()
            .map(|root| root.join(&clean))
            .find(|path| path.is_file())
    }
}

/// Append `ext` to `name` unless the name already has an extension
pub fn with_extension(name: &str, ext: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{}{}", name, ext)
    }
}

/// Ensure a configured extension starts with a dot
pub(crate) fn normalize_extension(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Strip leading slashes and `.`/`..` segments so lookups stay under the roots
fn sanitize_name(name: &str) -> String {
    name.trim_start_matches('/')
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != ".." && !part.contains('\\'))
        .collect::<Vec<_>>()
        .join("/")
}
