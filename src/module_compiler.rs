//! Per-module compilation.
//!
//! Each source file becomes one AMD-style definition:
//!
//! ```text
//! define('/App.tsx', ['/util.ts'], function(require, module, exports) {
//!   const ___util_ts = require("/util.ts");
//!   const helper = ___util_ts.helper;
//!   ...
//!   module.exports = { default: App };
//! });
//! ```
//!
//! The pipeline for js-like sources: read, analyze the raw text for
//! dependencies, lower TS/JSX, re-analyze the lowered text, strip module
//! syntax by span edits, and stitch the require preamble and exports epilogue
//! around the remaining body. CSS-like sources wrap the raw text in a factory
//! that maintains a `<style data-module>` tag.
//!
//! Results are memoized per id. Invalidation walks the reverse dependency
//! graph so editing a leaf drops everything built on top of it.

use std::collections::VecDeque;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::analyze::{
    analyze, apply_edits, ImportBinding, ModuleAnalysis, ReExportKind, SourceSyntax,
    DEFAULT_EXPORT_BINDING,
};
use crate::error::{CompileError, CompileResult};
use crate::fs::FileSystem;
use crate::resolver::{self, Resolution};
use crate::transform::{transform, EsTarget, TransformRequest};

lazy_static! {
    /// Whole-line import statements, for the text-level fallback only.
    static ref IMPORT_LINE_RE: Regex = Regex::new(r"(?m)^\s*import\b[^\n]*$").unwrap();
    /// `export default` prefixes, fallback only.
    static ref EXPORT_DEFAULT_RE: Regex = Regex::new(r"(?m)^(\s*)export\s+default\s+").unwrap();
    /// Remaining `export` prefixes, fallback only.
    static ref EXPORT_PREFIX_RE: Regex = Regex::new(r"(?m)^(\s*)export\s+").unwrap();
    /// First top-level function/class/const declaration, fallback only.
    static ref FALLBACK_DEFAULT_RE: Regex = Regex::new(
        r"(?m)^(?:function\s+([A-Za-z_$][A-Za-z0-9_$]*)|class\s+([A-Za-z_$][A-Za-z0-9_$]*)|const\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=)"
    )
    .unwrap();
    /// Collapse the gaps that span deletions leave behind.
    static ref BLANK_LINES_RE: Regex = Regex::new(r"\n{3,}").unwrap();
}

/// Cached output for one module.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// The complete `define(...)` string.
    pub code: String,
    /// Internal dependency ids, first-occurrence order.
    pub dependencies: Vec<String>,
    /// Reserved; never populated by this pipeline.
    pub source_map: Option<String>,
    /// Recoverable diagnostics (parse fallback, unresolved specifiers).
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleKind {
    JsLike,
    CssLike,
}

pub struct ModuleCompiler {
    fs: Arc<dyn FileSystem>,
    cache: RwLock<FxHashMap<String, Arc<CompilationResult>>>,
    graph: RwLock<FxHashMap<String, FxHashSet<String>>>,
}

impl ModuleCompiler {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        ModuleCompiler {
            fs,
            cache: RwLock::new(FxHashMap::default()),
            graph: RwLock::new(FxHashMap::default()),
        }
    }

    /// Compile `id`, reusing the cached result when present.
    pub async fn compile(
        &self,
        id: &str,
        target: EsTarget,
    ) -> CompileResult<Arc<CompilationResult>> {
        if let Some(hit) = self.cache.read().get(id) {
            return Ok(hit.clone());
        }

        let source = self
            .fs
            .read_file(id)
            .await
            .map_err(|err| CompileError::filesystem(id, err))?;

        let result = match module_kind(id) {
            ModuleKind::CssLike => compile_css(id, &source),
            ModuleKind::JsLike => self.compile_js(id, &source, target).await?,
        };
        let result = Arc::new(result);

        self.cache.write().insert(id.to_string(), result.clone());
        self.graph.write().insert(
            id.to_string(),
            result.dependencies.iter().cloned().collect(),
        );
        debug!(module = id, deps = result.dependencies.len(), "compiled");
        Ok(result)
    }

    /// Drop `id` and, transitively, every module that depends on it.
    /// Returns the dropped ids.
    pub fn invalidate(&self, id: &str) -> Vec<String> {
        let graph = self.graph.read().clone();
        let mut dropped = Vec::new();
        let mut seen = FxHashSet::default();
        seen.insert(id.to_string());
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            for (module, deps) in &graph {
                if deps.contains(&current) && seen.insert(module.clone()) {
                    queue.push_back(module.clone());
                }
            }
            dropped.push(current);
        }

        let mut cache = self.cache.write();
        let mut edges = self.graph.write();
        for module in &dropped {
            cache.remove(module);
            edges.remove(module);
        }
        debug!(module = id, count = dropped.len(), "invalidated");
        dropped
    }

    pub fn clear(&self) {
        self.cache.write().clear();
        self.graph.write().clear();
    }

    /// Snapshot of the direct internal dependency graph.
    pub fn graph(&self) -> FxHashMap<String, FxHashSet<String>> {
        self.graph.read().clone()
    }

    pub fn cached_modules(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.cache.read().contains_key(id)
    }

    async fn compile_js(
        &self,
        id: &str,
        source: &str,
        target: EsTarget,
    ) -> CompileResult<CompilationResult> {
        let syntax = syntax_for(id);
        let mut warnings = Vec::new();

        // First parse: the raw source, for the dependency list.
        let raw_analysis = match analyze(source, syntax) {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                warn!(module = id, %err, "dependency extraction failed; compiling with empty deps");
                warnings.push(format!("dependency extraction failed: {}", err));
                None
            }
        };

        let Some(raw_analysis) = raw_analysis else {
            // No usable syntax tree; ship a best-effort text-level rewrite.
            let body = fallback_rewrite(source);
            return Ok(CompilationResult {
                code: wrap_define(id, &[], &body),
                dependencies: Vec::new(),
                source_map: None,
                warnings,
            });
        };

        let (targets, dependencies) = self
            .resolve_specifiers(id, &raw_analysis, &mut warnings)
            .await;

        // Lowering, then a second parse of the lowered text for the rewrite.
        let lowered = transform(&TransformRequest {
            id,
            source,
            syntax,
            target,
        })?;

        let body = match analyze(&lowered, SourceSyntax::default()) {
            Ok(analysis) => {
                let stripped = apply_edits(&lowered, &analysis.edits);
                let preamble = build_preamble(&analysis, &targets);
                let epilogue = build_epilogue(&analysis, &targets);
                assemble_body(&preamble, &stripped, &epilogue)
            }
            Err(err) => {
                warn!(module = id, %err, "rewrite analysis failed; using text-level fallback");
                warnings.push(format!("module rewrite fell back to text stripping: {}", err));
                fallback_rewrite(&lowered)
            }
        };

        Ok(CompilationResult {
            code: wrap_define(id, &dependencies, &body),
            dependencies,
            source_map: None,
            warnings,
        })
    }

    /// Resolve every specifier the module mentions. Returns the
    /// specifier → require-target map used by the rewrite, plus the internal
    /// dependency list in first-occurrence order.
    async fn resolve_specifiers(
        &self,
        id: &str,
        analysis: &ModuleAnalysis,
        warnings: &mut Vec<String>,
    ) -> (FxHashMap<String, String>, Vec<String>) {
        let mut targets = FxHashMap::default();
        let mut dependencies = Vec::new();
        for specifier in analysis.required_specifiers() {
            if targets.contains_key(specifier) {
                continue;
            }
            let resolution = resolver::resolve(self.fs.as_ref(), id, specifier).await;
            match &resolution {
                Resolution::Internal(dep) => {
                    if !dependencies.contains(dep) {
                        dependencies.push(dep.clone());
                    }
                }
                Resolution::External(_) => {}
                Resolution::Unresolved(path) => {
                    warn!(module = id, specifier, "unresolved specifier");
                    warnings.push(format!(
                        "unresolved specifier '{}' (no match for {})",
                        specifier, path
                    ));
                }
            }
            targets.insert(
                specifier.to_string(),
                resolution.require_target().to_string(),
            );
        }
        (targets, dependencies)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWRITE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn require_target<'a>(targets: &'a FxHashMap<String, String>, specifier: &'a str) -> &'a str {
    targets.get(specifier).map(String::as_str).unwrap_or(specifier)
}

fn build_preamble(analysis: &ModuleAnalysis, targets: &FxHashMap<String, String>) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for specifier in analysis.required_specifiers() {
        let target = require_target(targets, specifier).to_string();
        if !order.contains(&target) {
            order.push(target);
        }
    }

    let mut lines = Vec::new();
    for target in &order {
        lines.push(format!(
            "const {} = require({});",
            slug_var(target),
            js_string(target)
        ));
    }

    for import in &analysis.imports {
        let var = slug_var(require_target(targets, &import.specifier));
        for binding in &import.bindings {
            lines.push(match binding {
                ImportBinding::Default { local } => {
                    format!("const {} = {}.default ?? {};", local, var, var)
                }
                ImportBinding::Named { imported, local } => {
                    format!("const {} = {};", local, member(&var, imported))
                }
                ImportBinding::Namespace { local } => format!("const {} = {};", local, var),
            });
        }
    }
    lines
}

fn build_epilogue(analysis: &ModuleAnalysis, targets: &FxHashMap<String, String>) -> String {
    let mut entries: Vec<String> = Vec::new();
    let mut star_sources: Vec<String> = Vec::new();

    let default_name = analysis
        .default_export
        .clone()
        .or_else(|| analysis.fallback_default.clone());
    if let Some(name) = &default_name {
        entries.push(format!("default: {}", name));
    }
    for (local, exported) in &analysis.named_exports {
        entries.push(format!("{}: {}", object_key(exported), local));
    }
    for reexport in &analysis.reexports {
        let var = slug_var(require_target(targets, &reexport.specifier));
        match &reexport.kind {
            ReExportKind::Named(items) => {
                for (imported, exported) in items {
                    entries.push(format!("{}: {}", object_key(exported), member(&var, imported)));
                }
            }
            ReExportKind::Namespace(exported) => {
                entries.push(format!("{}: {}", object_key(exported), var));
            }
            ReExportKind::Star => star_sources.push(var),
        }
    }

    let object = format!("{{ {} }}", entries.join(", "));
    if star_sources.is_empty() {
        if entries.is_empty() {
            "module.exports = {};".to_string()
        } else {
            format!("module.exports = {};", object)
        }
    } else {
        // Star re-exports first, so explicit exports shadow them.
        format!(
            "module.exports = Object.assign({{}}, {}, {});",
            star_sources.join(", "),
            object
        )
    }
}

fn assemble_body(preamble: &[String], stripped: &str, epilogue: &str) -> String {
    let body = BLANK_LINES_RE.replace_all(stripped, "\n\n");
    let body = body.trim();
    let mut out = String::new();
    if !preamble.is_empty() {
        out.push_str(&preamble.join("\n"));
        out.push_str("\n\n");
    }
    if !body.is_empty() {
        out.push_str(body);
        out.push_str("\n\n");
    }
    out.push_str(epilogue);
    out
}

/// Text-level rewrite for sources the analyzer refuses: drop import lines,
/// strip export keywords, surface a best-guess default.
fn fallback_rewrite(source: &str) -> String {
    let code = IMPORT_LINE_RE.replace_all(source, "");
    let code = EXPORT_DEFAULT_RE.replace_all(
        &code,
        format!("${{1}}const {} = ", DEFAULT_EXPORT_BINDING).as_str(),
    );
    let code = EXPORT_PREFIX_RE.replace_all(&code, "${1}");

    let default_name = if code.contains(DEFAULT_EXPORT_BINDING) {
        Some(DEFAULT_EXPORT_BINDING.to_string())
    } else {
        FALLBACK_DEFAULT_RE.captures(code.as_ref()).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
    };
    let epilogue = match default_name {
        Some(name) => format!("module.exports = {{ default: {} }};", name),
        None => "module.exports = {};".to_string(),
    };
    assemble_body(&[], code.as_ref(), &epilogue)
}

fn compile_css(id: &str, source: &str) -> CompilationResult {
    let body = format!(
        "const css = {css};\n\
         if (typeof document !== 'undefined') {{\n\
         \x20 let tag = document.querySelector('style[data-module=\"{id}\"]');\n\
         \x20 if (!tag) {{\n\
         \x20   tag = document.createElement('style');\n\
         \x20   tag.setAttribute('data-module', {id_literal});\n\
         \x20   document.head.appendChild(tag);\n\
         \x20 }}\n\
         \x20 tag.textContent = css;\n\
         }}\n\
         module.exports = css;",
        css = js_string(source),
        id = id,
        id_literal = js_string(id)
    );
    CompilationResult {
        code: wrap_define(id, &[], &body),
        dependencies: Vec::new(),
        source_map: None,
        warnings: Vec::new(),
    }
}

fn wrap_define(id: &str, dependencies: &[String], body: &str) -> String {
    let deps = dependencies
        .iter()
        .map(|dep| js_string(dep))
        .collect::<Vec<_>>()
        .join(", ");
    let indented = body
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("  {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "define({id}, [{deps}], function(require, module, exports) {{\n{body}\n}});\n",
        id = js_string(id),
        deps = deps,
        body = indented
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT UTILITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// A double-quoted JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.replace('"', "\\\"")))
}

/// Binding name for a require target: `__` plus the target with every
/// non-alphanumeric replaced by `_`.
fn slug_var(target: &str) -> String {
    let slug: String = target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("__{}", slug)
}

fn is_js_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn member(var: &str, name: &str) -> String {
    if is_js_ident(name) {
        format!("{}.{}", var, name)
    } else {
        format!("{}[{}]", var, js_string(name))
    }
}

fn object_key(name: &str) -> String {
    if is_js_ident(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

fn extension(id: &str) -> &str {
    let file = id.rsplit('/').next().unwrap_or(id);
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[idx + 1..],
        _ => "",
    }
}

fn module_kind(id: &str) -> ModuleKind {
    match extension(id) {
        "css" | "scss" | "sass" => ModuleKind::CssLike,
        _ => ModuleKind::JsLike,
    }
}

fn syntax_for(id: &str) -> SourceSyntax {
    match extension(id) {
        "ts" => SourceSyntax {
            typescript: true,
            jsx: false,
        },
        "tsx" => SourceSyntax {
            typescript: true,
            jsx: true,
        },
        "jsx" => SourceSyntax {
            typescript: false,
            jsx: true,
        },
        _ => SourceSyntax::default(),
    }
}
