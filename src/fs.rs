//! Virtual filesystem boundary.
//!
//! Sources are keyed by absolute Unix-style paths (`/src/App.tsx`). The trait
//! is async because real backends (browser storage, network mirrors) suspend;
//! the in-memory implementation resolves immediately.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::error::FsError;

/// Minimal stat record: enough to distinguish directories during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_directory: bool,
    pub size: u64,
}

/// Async filesystem contract consumed by the compiler.
///
/// All paths are absolute and Unix-style. Implementations must be callable
/// from shared references; the compiler holds them behind `Arc`.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<String, FsError>;
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), FsError>;
    async fn exists(&self, path: &str) -> bool;
    /// Create a directory, including missing parents.
    async fn mkdir(&self, path: &str) -> Result<(), FsError>;
    /// Immediate child names (not full paths) of a directory.
    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError>;
    async fn stat(&self, path: &str) -> Result<FileStat, FsError>;
    async fn unlink(&self, path: &str) -> Result<(), FsError>;
}

/// In-memory filesystem.
///
/// Files are stored in a `BTreeMap`; directories exist implicitly as prefixes
/// of stored paths, plus any explicitly created via `mkdir`. Suitable for
/// tests and for embedders that hydrate a source tree from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    files: BTreeMap<String, String>,
    dirs: FxHashSet<String>,
    // Paths whose reads fail with an I/O error while still existing. Used to
    // exercise the failing-module path without a special backend.
    poisoned: FxHashSet<String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filesystem pre-populated with `(path, contents)` pairs.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let fs = Self::new();
        {
            let mut inner = fs.inner.write();
            for (path, contents) in files {
                inner.files.insert(normalize(&path.into()), contents.into());
            }
        }
        fs
    }

    /// Make every subsequent read of `path` fail while `exists` stays true.
    pub fn poison(&self, path: &str) {
        self.inner.write().poisoned.insert(normalize(path));
    }

    fn is_implicit_dir(inner: &MemoryInner, path: &str) -> bool {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        inner.files.keys().any(|k| k.starts_with(&prefix))
            || inner.dirs.iter().any(|d| d.starts_with(&prefix))
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let path = normalize(path);
        let inner = self.inner.read();
        if inner.poisoned.contains(&path) {
            return Err(FsError::Io {
                message: format!("read failed: {}", path),
            });
        }
        inner
            .files
            .get(&path)
            .cloned()
            .ok_or(FsError::NotFound { path })
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), FsError> {
        let path = normalize(path);
        self.inner.write().files.insert(path, contents.to_string());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        let inner = self.inner.read();
        path == "/"
            || inner.files.contains_key(&path)
            || inner.dirs.contains(&path)
            || Self::is_implicit_dir(&inner, &path)
    }

    async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let path = normalize(path);
        let mut inner = self.inner.write();
        let mut cursor = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            cursor.push('/');
            cursor.push_str(segment);
            inner.dirs.insert(cursor.clone());
        }
        Ok(())
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let path = normalize(path);
        let inner = self.inner.read();
        if path != "/" && !inner.dirs.contains(&path) && !Self::is_implicit_dir(&inner, &path) {
            return Err(if inner.files.contains_key(&path) {
                FsError::NotADirectory { path }
            } else {
                FsError::NotFound { path }
            });
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let mut names = FxHashSet::default();
        for key in inner.files.keys().chain(inner.dirs.iter()) {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if let Some(first) = rest.split('/').next() {
                    if !first.is_empty() {
                        names.insert(first.to_string());
                    }
                }
            }
        }
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        Ok(names)
    }

    async fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let path = normalize(path);
        let inner = self.inner.read();
        if let Some(contents) = inner.files.get(&path) {
            return Ok(FileStat {
                is_directory: false,
                size: contents.len() as u64,
            });
        }
        if path == "/" || inner.dirs.contains(&path) || Self::is_implicit_dir(&inner, &path) {
            return Ok(FileStat {
                is_directory: true,
                size: 0,
            });
        }
        Err(FsError::NotFound { path })
    }

    async fn unlink(&self, path: &str) -> Result<(), FsError> {
        let path = normalize(path);
        let mut inner = self.inner.write();
        inner
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or(FsError::NotFound { path })
    }
}
