//! Dependency walking and bundle assembly.
//!
//! A build walks the import graph breadth-first from the entry point,
//! compiling every reachable internal module exactly once, then concatenates
//! the bundle in a fixed order: loader runtime, external setup, optional
//! style layer, module definitions (BFS order, entry first), bootstrap.
//! Per-module failures become synthetic error modules so one broken file
//! never takes down the whole build; only entry failures propagate.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, instrument};

use crate::error::{BuildWarning, CompileError, CompileResult};
use crate::externals::ExternalRegistry;
use crate::fs::FileSystem;
use crate::module_compiler::{js_string, ModuleCompiler};
use crate::resolver::{self, Resolution};
use crate::transform::EsTarget;

const LOADER_RUNTIME: &str = include_str!("runtime/loader.js");
const EXTERNALS_RUNTIME: &str = include_str!("runtime/externals.js");
const BOOTSTRAP_TEMPLATE: &str = include_str!("runtime/bootstrap.js");

/// Baseline stylesheet injected when the style layer is requested.
pub const DEFAULT_STYLE_LAYER_URL: &str =
    "https://cdn.jsdelivr.net/npm/@picocss/pico@2.0.6/css/pico.min.css";

/// Options for one build. Equal options share one cached result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    pub entry_point: String,
    pub include_style_layer: bool,
    pub target: EsTarget,
    pub externals: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            entry_point: "/index.tsx".to_string(),
            include_style_layer: false,
            target: EsTarget::default(),
            externals: Vec::new(),
        }
    }
}

impl BuildOptions {
    pub fn new(entry_point: impl Into<String>) -> Self {
        BuildOptions {
            entry_point: entry_point.into(),
            ..Default::default()
        }
    }

    /// Cache key: SHA-256 over the canonical JSON form of the options.
    pub fn cache_key(&self) -> String {
        let canonical =
            serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Output of one build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// The self-bootstrapping bundle.
    pub bundle: String,
    /// Every bundled module id, BFS order from the entry.
    pub modules: Vec<String>,
    /// Direct internal dependencies per bundled module.
    pub dependency_graph: FxHashMap<String, FxHashSet<String>>,
    pub warnings: Vec<BuildWarning>,
}

/// Walk the graph and assemble the bundle. Memoization lives in the caller.
#[instrument(level = "debug", skip_all, fields(entry = %options.entry_point))]
pub(crate) async fn run_build(
    fs: &dyn FileSystem,
    compiler: &ModuleCompiler,
    externals: &ExternalRegistry,
    options: &BuildOptions,
) -> CompileResult<BuildResult> {
    for name in &options.externals {
        externals.register_name(name);
    }

    let entry_id = match resolver::resolve(fs, "/", &options.entry_point).await {
        Resolution::Internal(id) => id,
        _ => return Err(CompileError::EntryNotFound(options.entry_point.clone())),
    };

    // Phase 1: breadth-first walk, entry first.
    let mut modules: Vec<String> = Vec::new();
    let mut definitions: Vec<String> = Vec::new();
    let mut dependency_graph: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
    let mut warnings: Vec<BuildWarning> = Vec::new();
    let mut visited: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<String> = VecDeque::from([entry_id.clone()]);

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        match compiler.compile(&id, options.target).await {
            Ok(compiled) => {
                for warning in &compiled.warnings {
                    warnings.push(BuildWarning::new(&id, warning));
                }
                for dep in &compiled.dependencies {
                    if !visited.contains(dep) {
                        queue.push_back(dep.clone());
                    }
                }
                dependency_graph
                    .insert(id.clone(), compiled.dependencies.iter().cloned().collect());
                definitions.push(compiled.code.clone());
                modules.push(id);
            }
            Err(err) if modules.is_empty() => {
                // The entry itself failed; nothing to salvage.
                return Err(err);
            }
            Err(err) => {
                error!(module = %id, %err, "module failed; emitting error module");
                warnings.push(BuildWarning::new(&id, err.to_string()));
                definitions.push(synthetic_error_module(&id, &err.to_string()));
                dependency_graph.insert(id.clone(), FxHashSet::default());
                modules.push(id);
            }
        }
    }

    // Phase 2: deterministic concatenation.
    let bundle = assemble(&entry_id, &definitions, externals, options);
    debug!(
        modules = modules.len(),
        bytes = bundle.len(),
        warnings = warnings.len(),
        "bundle assembled"
    );

    Ok(BuildResult {
        bundle,
        modules,
        dependency_graph,
        warnings,
    })
}

fn assemble(
    entry_id: &str,
    definitions: &[String],
    externals: &ExternalRegistry,
    options: &BuildOptions,
) -> String {
    let mut bundle = String::new();

    bundle.push_str(&format!("// reef bundle (entry: {})\n\n", entry_id));

    bundle.push_str("// 1. Module registry runtime\n");
    bundle.push_str(LOADER_RUNTIME);
    bundle.push_str("globalThis.__modules.resetModules();\n\n");

    bundle.push_str("// 2. External libraries\n");
    bundle.push_str(EXTERNALS_RUNTIME);
    bundle.push_str(&externals.setup_snippet());
    bundle.push('\n');

    if options.include_style_layer {
        bundle.push_str("// 3. Style layer\n");
        bundle.push_str(&style_layer_snippet(DEFAULT_STYLE_LAYER_URL));
        bundle.push('\n');
    }

    bundle.push_str("// 4. Module definitions\n");
    for definition in definitions {
        bundle.push_str(definition);
        bundle.push('\n');
    }

    bundle.push_str("// 5. Bootstrap\n");
    bundle.push_str(&BOOTSTRAP_TEMPLATE.replace("\"__REEF_ENTRY__\"", &js_string(entry_id)));

    bundle
}

fn style_layer_snippet(url: &str) -> String {
    format!(
        "(function () {{\n\
         \x20 if (typeof document === 'undefined') return;\n\
         \x20 if (document.querySelector('link[data-style-layer]')) return;\n\
         \x20 var link = document.createElement('link');\n\
         \x20 link.rel = 'stylesheet';\n\
         \x20 link.href = {url};\n\
         \x20 link.setAttribute('data-style-layer', 'true');\n\
         \x20 document.head.appendChild(link);\n\
         }})();\n",
        url = js_string(url)
    )
}

fn synthetic_error_module(id: &str, message: &str) -> String {
    format!(
        "define({id}, [], function(require, module, exports) {{\n\
         \x20 console.error('[reef] module ' + {id} + ' failed to compile:', {message});\n\
         \x20 module.exports = {{ default: () => null }};\n\
         }});\n",
        id = js_string(id),
        message = js_string(message)
    )
}
