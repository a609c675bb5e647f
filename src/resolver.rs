//! Import specifier resolution.
//!
//! Specifiers that do not start with `.` or `/` are external and opaque.
//! Everything else is canonicalized against the importing module's directory
//! and probed against the filesystem: the exact path first, then known
//! extensions, then directory index files. First hit wins.

use crate::fs::FileSystem;

/// Probe order for extensionless specifiers. Earlier entries shadow later
/// ones when several candidate files exist.
pub const EXTENSION_PROBES: [&str; 5] = [".tsx", ".ts", ".jsx", ".js", ".css"];

/// Probe order for directory imports, tried only after every file-level
/// candidate missed.
pub const INDEX_PROBES: [&str; 4] = ["index.tsx", "index.ts", "index.jsx", "index.js"];

/// Outcome of resolving one import specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A module compiled from the filesystem, by canonical id.
    Internal(String),
    /// A bare name served by the external registry at runtime.
    External(String),
    /// A relative specifier with no filesystem match; the canonicalized path
    /// is kept so the emitted `require` fails with a recognizable id.
    Unresolved(String),
}

impl Resolution {
    /// The string the emitted `require(...)` call receives.
    pub fn require_target(&self) -> &str {
        match self {
            Resolution::Internal(id) => id,
            Resolution::External(name) => name,
            Resolution::Unresolved(path) => path,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Resolution::Internal(_))
    }
}

/// Bare names (no leading `.` or `/`) are external.
pub fn is_external_specifier(specifier: &str) -> bool {
    !specifier.starts_with('.') && !specifier.starts_with('/')
}

/// Directory of a module id, without the trailing slash (`/` for roots).
pub fn dirname(id: &str) -> &str {
    match id.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &id[..idx],
    }
}

/// Collapse `.` and `..` segments of `specifier` against `base_dir`,
/// producing an absolute path. `..` above the root clamps at the root.
pub fn canonicalize(base_dir: &str, specifier: &str) -> String {
    let mut segments: Vec<&str> = if specifier.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut path = String::with_capacity(specifier.len() + base_dir.len() + 1);
    for segment in &segments {
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Resolve `specifier` as written in module `from_id` to a concrete target.
pub async fn resolve(fs: &dyn FileSystem, from_id: &str, specifier: &str) -> Resolution {
    if is_external_specifier(specifier) {
        return Resolution::External(specifier.to_string());
    }
    let canonical = canonicalize(dirname(from_id), specifier);
    if is_file(fs, &canonical).await {
        return Resolution::Internal(canonical);
    }
    for ext in EXTENSION_PROBES {
        let candidate = format!("{}{}", canonical, ext);
        if is_file(fs, &candidate).await {
            return Resolution::Internal(candidate);
        }
    }
    for index in INDEX_PROBES {
        let candidate = format!("{}/{}", canonical, index);
        if is_file(fs, &candidate).await {
            return Resolution::Internal(candidate);
        }
    }
    Resolution::Unresolved(canonical)
}

async fn is_file(fs: &dyn FileSystem, path: &str) -> bool {
    if !fs.exists(path).await {
        return false;
    }
    match fs.stat(path).await {
        Ok(stat) => !stat.is_directory,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn classifies_external_specifiers() {
        assert!(is_external_specifier("react"));
        assert!(is_external_specifier("react-dom/client"));
        assert!(!is_external_specifier("./button"));
        assert!(!is_external_specifier("../lib/util"));
        assert!(!is_external_specifier("/src/app"));
    }

    #[test]
    fn canonicalize_collapses_dots() {
        assert_eq!(canonicalize("/src/ui", "./button"), "/src/ui/button");
        assert_eq!(canonicalize("/src/ui", "../lib/util"), "/src/lib/util");
        assert_eq!(canonicalize("/src", "././a"), "/src/a");
        assert_eq!(canonicalize("/", "./a"), "/a");
        assert_eq!(canonicalize("/src", "../../../a"), "/a");
        assert_eq!(canonicalize("/ignored", "/abs/b"), "/abs/b");
    }

    #[test]
    fn dirname_handles_roots() {
        assert_eq!(dirname("/a.tsx"), "/");
        assert_eq!(dirname("/src/app.tsx"), "/src");
    }

    #[tokio::test]
    async fn probe_prefers_tsx_over_ts() {
        let fs = MemoryFileSystem::with_files([("/b.tsx", ""), ("/b.ts", ""), ("/b.js", "")]);
        assert_eq!(
            resolve(&fs, "/a.tsx", "./b").await,
            Resolution::Internal("/b.tsx".to_string())
        );
    }

    #[tokio::test]
    async fn probe_falls_through_extension_order() {
        let fs = MemoryFileSystem::with_files([("/b.js", ""), ("/b.css", "")]);
        assert_eq!(
            resolve(&fs, "/a.tsx", "./b").await,
            Resolution::Internal("/b.js".to_string())
        );
    }

    #[tokio::test]
    async fn exact_extension_wins_immediately() {
        let fs = MemoryFileSystem::with_files([("/g.css", "body{}"), ("/g.css.ts", "")]);
        assert_eq!(
            resolve(&fs, "/main.tsx", "./g.css").await,
            Resolution::Internal("/g.css".to_string())
        );
    }

    #[tokio::test]
    async fn directory_index_only_without_file_level_match() {
        let fs = MemoryFileSystem::with_files([("/dir.tsx", ""), ("/dir/index.tsx", "")]);
        assert_eq!(
            resolve(&fs, "/a.tsx", "./dir").await,
            Resolution::Internal("/dir.tsx".to_string())
        );

        let fs = MemoryFileSystem::with_files([("/dir/index.ts", ""), ("/dir/index.js", "")]);
        assert_eq!(
            resolve(&fs, "/a.tsx", "./dir").await,
            Resolution::Internal("/dir/index.ts".to_string())
        );
    }

    #[tokio::test]
    async fn unresolved_keeps_canonical_path() {
        let fs = MemoryFileSystem::new();
        assert_eq!(
            resolve(&fs, "/src/a.tsx", "./missing").await,
            Resolution::Unresolved("/src/missing".to_string())
        );
    }
}
