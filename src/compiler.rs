//! Public pipeline surface.
//!
//! `Compiler` owns the per-module compiler, the external registry, and the
//! per-build cache, and wires emitted scripts to the script host. Typical
//! embedding:
//!
//! ```no_run
//! # async fn demo() -> reef_compiler::CompileResult<()> {
//! use std::sync::Arc;
//! use reef_compiler::{BuildOptions, Compiler, MemoryFileSystem, NullHost};
//!
//! let fs = Arc::new(MemoryFileSystem::with_files([(
//!     "/App.tsx",
//!     "export default function App() { return <h1>hi</h1>; }",
//! )]));
//! let compiler = Compiler::new(fs, Arc::new(NullHost));
//! compiler.init().await?;
//! let build = compiler.build(BuildOptions::new("/App.tsx")).await?;
//! assert!(build.bundle.contains("define(\"/App.tsx\""));
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::debug;

use crate::bundler::{run_build, BuildOptions, BuildResult};
use crate::error::{CompileError, CompileResult};
use crate::externals::ExternalRegistry;
use crate::fs::FileSystem;
use crate::host::ScriptHost;
use crate::module_compiler::{js_string, ModuleCompiler};
use crate::transform::EsTarget;

/// Snapshot counters for UI surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerStats {
    pub modules: usize,
    pub externals: usize,
    pub dependency_graph: FxHashMap<String, FxHashSet<String>>,
}

pub struct Compiler {
    fs: Arc<dyn FileSystem>,
    host: Arc<dyn ScriptHost>,
    externals: Arc<ExternalRegistry>,
    modules: ModuleCompiler,
    builds: RwLock<FxHashMap<String, Arc<BuildResult>>>,
    last_target: RwLock<EsTarget>,
    initialized: AtomicBool,
}

impl Compiler {
    pub fn new(fs: Arc<dyn FileSystem>, host: Arc<dyn ScriptHost>) -> Self {
        Compiler {
            modules: ModuleCompiler::new(fs.clone()),
            externals: Arc::new(ExternalRegistry::new()),
            fs,
            host,
            builds: RwLock::new(FxHashMap::default()),
            last_target: RwLock::new(EsTarget::default()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Verify the collaborators respond. Idempotent; `build` calls it lazily.
    pub async fn init(&self) -> CompileResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.fs.exists("/").await {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(CompileError::Filesystem {
                path: "/".to_string(),
                message: "filesystem root unavailable".to_string(),
            });
        }
        debug!(externals = self.externals.len(), "pipeline initialized");
        Ok(())
    }

    pub fn externals(&self) -> &ExternalRegistry {
        &self.externals
    }

    /// Build (or fetch from cache) the bundle for `options`. Equal options
    /// return the same `Arc`.
    pub async fn build(&self, options: BuildOptions) -> CompileResult<Arc<BuildResult>> {
        self.init().await?;
        let key = options.cache_key();
        if let Some(hit) = self.builds.read().get(&key) {
            debug!(entry = %options.entry_point, "build cache hit");
            return Ok(hit.clone());
        }
        let result = Arc::new(
            run_build(
                self.fs.as_ref(),
                &self.modules,
                &self.externals,
                &options,
            )
            .await?,
        );
        *self.last_target.write() = options.target;
        self.builds.write().insert(key, result.clone());
        Ok(result)
    }

    /// Deliver the bundle to the script host. `container` is a CSS selector
    /// for the mount element; without it the bundle targets `#root`, then
    /// the document body.
    pub async fn execute_and_render(
        &self,
        build: &BuildResult,
        container: Option<&str>,
    ) -> CompileResult<()> {
        let mut script = String::new();
        if let Some(selector) = container {
            script.push_str(&format!(
                "globalThis.__container = document.querySelector({});\n",
                js_string(selector)
            ));
        }
        script.push_str(&build.bundle);
        self.host.eval(&script).await
    }

    /// Swap one module in the running registry: invalidate it (and its
    /// reverse dependencies), recompile just that module, and evaluate a
    /// drop-and-redefine script in the host. The application re-requires on
    /// its own schedule.
    pub async fn hot_reload(&self, id: &str) -> CompileResult<()> {
        self.modules.invalidate(id);
        self.builds.write().clear();
        let target = *self.last_target.read();
        let compiled = self.modules.compile(id, target).await?;
        let script = format!(
            "globalThis.__modules.drop({});\n{}",
            js_string(id),
            compiled.code
        );
        debug!(module = id, "hot reload script delivered");
        self.host.eval(&script).await
    }

    /// Drop one module (and dependents) from the compilation cache and all
    /// cached builds.
    pub fn invalidate_module(&self, id: &str) {
        self.modules.invalidate(id);
        self.builds.write().clear();
    }

    pub fn clear_cache(&self) {
        self.modules.clear();
        self.builds.write().clear();
        debug!("caches cleared");
    }

    pub fn stats(&self) -> CompilerStats {
        CompilerStats {
            modules: self.modules.cached_modules().len(),
            externals: self.externals.len(),
            dependency_graph: self.modules.graph(),
        }
    }

    #[cfg(test)]
    pub(crate) fn module_compiler(&self) -> &ModuleCompiler {
        &self.modules
    }
}
