//! Process-wide cache of compiled templates
//!
//! Two maps live for the whole process, empty at startup:
//!
//! - file templates, keyed by path, engine and normalized compile options,
//!   populated only when the caller asks for caching
//! - raw source compiled for partial overrides, keyed by the text itself,
//!   always populated
//!
//! [`clear`] empties both, which tests use for isolation.

use crate::engine::{CompiledTemplate, Engine};
use crate::error::{Result, ViewError};
use crate::options::NormalizedOptions;
use crate::tracing_macros::trace_debug;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

static FILE_CACHE: OnceLock<DashMap<FileKey, Arc<CompiledTemplate>>> = OnceLock::new();
static SOURCE_CACHE: OnceLock<DashMap<SourceKey, Arc<CompiledTemplate>>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FileKey {
    path: PathBuf,
    engine: &'static str,
    options: NormalizedOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SourceKey {
    text: String,
    engine: &'static str,
    options: NormalizedOptions,
}

fn files() -> &'static DashMap<FileKey, Arc<CompiledTemplate>> {
    FILE_CACHE.get_or_init(DashMap::new)
}

fn sources() -> &'static DashMap<SourceKey, Arc<CompiledTemplate>> {
    SOURCE_CACHE.get_or_init(DashMap::new)
}

/// Read and compile the template at `path`, reusing a cached copy when allowed
///
/// With `use_cache` set, an equal (path, engine, options) key returns the very
/// same `Arc` without touching the filesystem. Without it the file is read and
/// compiled on every call and the cache is neither consulted nor populated.
pub fn compile_or_fetch(
    engine: &dyn Engine,
    path: &Path,
    options: &NormalizedOptions,
    use_cache: bool,
) -> Result<Arc<CompiledTemplate>> {
    if !use_cache {
        trace_debug!(path = %path.display(), "template cache bypassed");
        return compile_file(engine, path, options).map(Arc::new);
    }

    let key = FileKey {
        path: path.to_path_buf(),
        engine: engine.name(),
        options: options.clone(),
    };

    if let Some(hit) = files().get(&key) {
        trace_debug!(path = %path.display(), "template cache hit");
        return Ok(Arc::clone(hit.value()));
    }

    trace_debug!(path = %path.display(), "template cache miss");
    let template = Arc::new(compile_file(engine, path, options)?);

    // a concurrent miss may have won the race; keep whichever landed first
    let cached = Arc::clone(files().entry(key).or_insert(template).value());
    Ok(cached)
}

/// Compile raw template text, memoized on the text and options
pub fn compile_source(
    engine: &dyn Engine,
    text: &str,
    options: &NormalizedOptions,
) -> Result<Arc<CompiledTemplate>> {
    let key = SourceKey {
        text: text.to_string(),
        engine: engine.name(),
        options: options.clone(),
    };

    if let Some(hit) = sources().get(&key) {
        return Ok(Arc::clone(hit.value()));
    }

    let template = Arc::new(engine.compile("inline partial", text, options)?);
    let cached = Arc::clone(sources().entry(key).or_insert(template).value());
    Ok(cached)
}

/// Drop every cached template
pub fn clear() {
    files().clear();
    sources().clear();
    trace_debug!("template caches cleared");
}

/// Number of cached file templates
pub fn len() -> usize {
    files().len()
}

fn compile_file(
    engine: &dyn Engine,
    path: &Path,
    options: &NormalizedOptions,
) -> Result<CompiledTemplate> {
    let text = std::fs::read_to_string(path).map_err(|err| ViewError::from_io(path, err))?;
    engine.compile(&path.display().to_string(), &text, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MustacheEngine;
    use crate::options::EngineOptions;
    use serial_test::serial;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_cached_compile_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "home.mustache", "Hello {{name}}");
        let engine = MustacheEngine::new();
        let options = NormalizedOptions::default();

        let first = compile_or_fetch(&engine, &path, &options, true).unwrap();
        // removing the file proves the second call never reads it
        fs::remove_file(&path).unwrap();
        let second = compile_or_fetch(&engine, &path, &options, true).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    #[serial]
    fn test_options_take_part_in_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "page.mustache", "{{title}}");
        let engine = MustacheEngine::new();

        let escaped = compile_or_fetch(&engine, &path, &NormalizedOptions::default(), true).unwrap();
        let raw = compile_or_fetch(
            &engine,
            &path,
            &EngineOptions::new().as_string(true).normalized(),
            true,
        )
        .unwrap();

        assert!(!Arc::ptr_eq(&escaped, &raw));
        assert!(raw.options().as_string);
    }

    #[test]
    #[serial]
    fn test_len_counts_cached_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MustacheEngine::new();
        let options = NormalizedOptions::default();
        clear();

        let uncached = write(dir.path(), "once.mustache", "once");
        compile_or_fetch(&engine, &uncached, &options, false).unwrap();
        assert_eq!(len(), 0);

        let cached = write(dir.path(), "kept.mustache", "kept");
        compile_or_fetch(&engine, &cached, &options, true).unwrap();
        compile_or_fetch(&engine, &cached, &options, true).unwrap();
        assert_eq!(len(), 1);

        clear();
        assert_eq!(len(), 0);
    }

    #[test]
    fn test_uncached_compile_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "note.mustache", "first");
        let engine = MustacheEngine::new();
        let options = NormalizedOptions::default();

        let first = compile_or_fetch(&engine, &path, &options, false).unwrap();
        write(dir.path(), "note.mustache", "second");
        let second = compile_or_fetch(&engine, &path, &options, false).unwrap();

        assert_eq!(first.source(), "first");
        assert_eq!(second.source(), "second");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MustacheEngine::new();
        let result = compile_or_fetch(
            &engine,
            &dir.path().join("absent.mustache"),
            &NormalizedOptions::default(),
            true,
        );
        assert!(matches!(result, Err(ViewError::FileNotFound(_))));
    }

    #[test]
    fn test_non_utf8_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary.mustache");
        fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();
        let engine = MustacheEngine::new();

        let result = compile_or_fetch(&engine, &path, &NormalizedOptions::default(), false);
        assert!(matches!(result, Err(ViewError::Io { .. })));
    }

    #[test]
    #[serial]
    fn test_source_cache_and_clear() {
        let engine = MustacheEngine::new();
        let options = NormalizedOptions::default();

        let first = compile_source(&engine, "<i>{{x}}</i>", &options).unwrap();
        let second = compile_source(&engine, "<i>{{x}}</i>", &options).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        clear();
        let third = compile_source(&engine, "<i>{{x}}</i>", &options).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
