//! Error types for the build pipeline.
//!
//! Build-side failures are `CompileError`; the virtual filesystem has its own
//! `FsError` converted at the compiler seam. Runtime-side failures
//! (`ModuleNotFound`, `CircularDependency`, `FactoryError`, `NoLoadMethod`,
//! `ExternalLoadError`, `RuntimeIncomplete`) are raised by the emitted
//! JavaScript inside the bundle and never cross back into Rust; they appear
//! here only as the `Error.name` values the loader assigns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main pipeline error type.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("filesystem error at {path}: {message}")]
    Filesystem { path: String, message: String },

    #[error("transform failed for {id}: {detail}")]
    Transform { id: String, detail: String },

    #[error("entry point not found: {0}")]
    EntryNotFound(String),

    #[error("script host error: {0}")]
    Host(String),
}

impl CompileError {
    /// Attach a path to a filesystem failure.
    pub fn filesystem(path: impl Into<String>, source: FsError) -> Self {
        CompileError::Filesystem {
            path: path.into(),
            message: source.to_string(),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Error type for the virtual filesystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("{message}")]
    Io { message: String },
}

/// A recoverable diagnostic attached to a module during a build: the module
/// still compiles (possibly as a synthetic error module), the bundle still
/// assembles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildWarning {
    pub module: String,
    pub message: String,
}

impl BuildWarning {
    pub fn new(module: impl Into<String>, message: impl Into<String>) -> Self {
        BuildWarning {
            module: module.into(),
            message: message.into(),
        }
    }
}
