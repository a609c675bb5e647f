//! reef-compiler: a browser-resident build-and-load pipeline.
//!
//! Sources live in a virtual filesystem keyed by absolute path. A build walks
//! the import graph from an entry point, compiles each TypeScript/JSX/CSS
//! module into an AMD-style `define`, and concatenates everything — loader
//! runtime, external library setup, module definitions, bootstrap — into one
//! self-installing bundle string. The bundle is evaluated by a script host
//! (a page, a webview), resolves its own graph lazily, and mounts the entry
//! component.

mod analyze;
mod bundler;
mod compiler;
mod compiler_tests;
mod error;
mod externals;
mod fs;
mod host;
mod module_compiler;
mod resolver;
mod transform;

pub use bundler::{BuildOptions, BuildResult, DEFAULT_STYLE_LAYER_URL};
pub use compiler::{Compiler, CompilerStats};
pub use error::{BuildWarning, CompileError, CompileResult, FsError};
pub use externals::{ExternalLibrary, ExternalRegistry};
pub use fs::{FileStat, FileSystem, MemoryFileSystem};
pub use host::{NullHost, RecordingHost, ScriptHost};
pub use module_compiler::{CompilationResult, ModuleCompiler};
pub use transform::EsTarget;
