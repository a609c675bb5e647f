//! Module syntax analysis.
//!
//! The one place that touches oxc AST types. Parses a source, walks the
//! top-level statements, and returns owned records: import bindings, export
//! names, re-exports, a fallback default candidate, and the byte-span edits
//! that strip ES module syntax from the text. Callers never see an AST node.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, BindingPatternKind, Declaration, ExportDefaultDeclarationKind,
    ImportDeclarationSpecifier, Statement, VariableDeclarationKind,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use thiserror::Error;

/// Synthetic binding name used when a default export has no name of its own.
pub const DEFAULT_EXPORT_BINDING: &str = "__default_export";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSyntax {
    pub typescript: bool,
    pub jsx: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    Default { local: String },
    Named { imported: String, local: String },
    Namespace { local: String },
}

/// One `import` declaration. Empty `bindings` is a side-effect import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReExportKind {
    /// `export { a, b as c } from '...'` — `(imported, exported)` pairs.
    Named(Vec<(String, String)>),
    /// `export * from '...'`.
    Star,
    /// `export * as ns from '...'`.
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReExport {
    pub specifier: String,
    pub kind: ReExportKind,
}

/// A text replacement, in byte offsets of the analyzed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    pub imports: Vec<ImportRecord>,
    /// `(local, exported)` pairs from `export` declarations and lists.
    pub named_exports: Vec<(String, String)>,
    /// Local binding that backs `export default`, when present.
    pub default_export: Option<String>,
    pub reexports: Vec<ReExport>,
    /// Every specifier the module pulls in — import declaration sources and
    /// `export … from` sources — in source order, duplicates preserved.
    pub specifiers: Vec<String>,
    /// First top-level `function X` / `class X` / `const X = …`, used as the
    /// default export when the module declares none.
    pub fallback_default: Option<String>,
    pub edits: Vec<Edit>,
}

impl ModuleAnalysis {
    pub fn has_explicit_exports(&self) -> bool {
        self.default_export.is_some() || !self.named_exports.is_empty() || !self.reexports.is_empty()
    }

    /// Specifiers in source order; callers dedupe on first occurrence.
    pub fn required_specifiers(&self) -> Vec<&str> {
        self.specifiers.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Error)]
#[error("parse failed: {message}")]
pub struct AnalyzeError {
    pub message: String,
}

/// Parse `source` and extract module structure.
///
/// Fails only when the parser gives up or reports errors; the caller decides
/// whether that is fatal (it is not: dependency extraction falls back to an
/// empty list, rewriting falls back to text-level stripping).
pub fn analyze(source: &str, syntax: SourceSyntax) -> Result<ModuleAnalysis, AnalyzeError> {
    let allocator = Allocator::default();
    let mut source_type = SourceType::default().with_module(true);
    if syntax.typescript {
        source_type = source_type.with_typescript(true);
    }
    if syntax.jsx {
        source_type = source_type.with_jsx(true);
    }

    let ret = Parser::new(&allocator, source, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser gave up".to_string());
        return Err(AnalyzeError { message });
    }

    let mut analysis = ModuleAnalysis::default();

    for stmt in &ret.program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                let span = decl.span;
                analysis.edits.push(delete(span.start, span.end));
                if decl.import_kind.is_type() {
                    continue;
                }
                let mut bindings = Vec::new();
                if let Some(specifiers) = &decl.specifiers {
                    for specifier in specifiers {
                        match specifier {
                            ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                if s.import_kind.is_type() {
                                    continue;
                                }
                                bindings.push(ImportBinding::Named {
                                    imported: s.imported.name().to_string(),
                                    local: s.local.name.to_string(),
                                });
                            }
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                bindings.push(ImportBinding::Default {
                                    local: s.local.name.to_string(),
                                });
                            }
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                bindings.push(ImportBinding::Namespace {
                                    local: s.local.name.to_string(),
                                });
                            }
                        }
                    }
                }
                let specifier = decl.source.value.to_string();
                analysis.specifiers.push(specifier.clone());
                analysis.imports.push(ImportRecord { specifier, bindings });
            }

            Statement::ExportNamedDeclaration(decl) => {
                let span = decl.span;
                if decl.export_kind.is_type() {
                    analysis.edits.push(delete(span.start, span.end));
                    continue;
                }
                if let Some(declaration) = &decl.declaration {
                    match declaration {
                        Declaration::VariableDeclaration(var_decl) => {
                            let mut names = Vec::new();
                            for declarator in &var_decl.declarations {
                                collect_binding_names(&declarator.id, &mut names);
                            }
                            for name in names {
                                analysis.named_exports.push((name.clone(), name));
                            }
                            analysis
                                .edits
                                .push(delete(span.start, declaration.span().start));
                        }
                        Declaration::FunctionDeclaration(func) => {
                            if let Some(id) = &func.id {
                                let name = id.name.to_string();
                                analysis.named_exports.push((name.clone(), name));
                            }
                            analysis
                                .edits
                                .push(delete(span.start, declaration.span().start));
                        }
                        Declaration::ClassDeclaration(class) => {
                            if let Some(id) = &class.id {
                                let name = id.name.to_string();
                                analysis.named_exports.push((name.clone(), name));
                            }
                            analysis
                                .edits
                                .push(delete(span.start, declaration.span().start));
                        }
                        // Type-level declarations vanish entirely.
                        _ => analysis.edits.push(delete(span.start, span.end)),
                    }
                } else if let Some(source) = &decl.source {
                    let mut items = Vec::new();
                    for specifier in &decl.specifiers {
                        if specifier.export_kind.is_type() {
                            continue;
                        }
                        items.push((
                            specifier.local.name().to_string(),
                            specifier.exported.name().to_string(),
                        ));
                    }
                    let specifier = source.value.to_string();
                    analysis.specifiers.push(specifier.clone());
                    analysis.reexports.push(ReExport {
                        specifier,
                        kind: ReExportKind::Named(items),
                    });
                    analysis.edits.push(delete(span.start, span.end));
                } else {
                    for specifier in &decl.specifiers {
                        if specifier.export_kind.is_type() {
                            continue;
                        }
                        analysis.named_exports.push((
                            specifier.local.name().to_string(),
                            specifier.exported.name().to_string(),
                        ));
                    }
                    analysis.edits.push(delete(span.start, span.end));
                }
            }

            Statement::ExportDefaultDeclaration(decl) => {
                let span = decl.span;
                match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        let inner_start = func.span.start;
                        if let Some(id) = &func.id {
                            analysis.default_export = Some(id.name.to_string());
                            analysis.edits.push(delete(span.start, inner_start));
                        } else {
                            analysis.default_export = Some(DEFAULT_EXPORT_BINDING.to_string());
                            analysis.edits.push(bind_default(span.start, inner_start));
                        }
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        let inner_start = class.span.start;
                        if let Some(id) = &class.id {
                            analysis.default_export = Some(id.name.to_string());
                            analysis.edits.push(delete(span.start, inner_start));
                        } else {
                            analysis.default_export = Some(DEFAULT_EXPORT_BINDING.to_string());
                            analysis.edits.push(bind_default(span.start, inner_start));
                        }
                    }
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                        analysis.edits.push(delete(span.start, span.end));
                    }
                    expression => {
                        analysis.default_export = Some(DEFAULT_EXPORT_BINDING.to_string());
                        analysis
                            .edits
                            .push(bind_default(span.start, expression.span().start));
                    }
                }
            }

            Statement::ExportAllDeclaration(decl) => {
                let span = decl.span;
                if decl.export_kind.is_type() {
                    analysis.edits.push(delete(span.start, span.end));
                    continue;
                }
                let kind = match &decl.exported {
                    Some(name) => ReExportKind::Namespace(name.name().to_string()),
                    None => ReExportKind::Star,
                };
                let specifier = decl.source.value.to_string();
                analysis.specifiers.push(specifier.clone());
                analysis.reexports.push(ReExport { specifier, kind });
                analysis.edits.push(delete(span.start, span.end));
            }

            _ => {}
        }
    }

    if !analysis.has_explicit_exports() {
        analysis.fallback_default = find_fallback_default(&ret.program.body);
    }

    Ok(analysis)
}

/// Apply edits to `source`. Edits must not overlap; order is normalized here.
pub fn apply_edits(source: &str, edits: &[Edit]) -> String {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|e| e.start);
    let mut out = source.to_string();
    for edit in sorted.into_iter().rev() {
        out.replace_range(edit.start..edit.end, &edit.replacement);
    }
    out
}

fn delete(start: u32, end: u32) -> Edit {
    Edit {
        start: start as usize,
        end: end as usize,
        replacement: String::new(),
    }
}

fn bind_default(start: u32, end: u32) -> Edit {
    Edit {
        start: start as usize,
        end: end as usize,
        replacement: format!("const {} = ", DEFAULT_EXPORT_BINDING),
    }
}

fn collect_binding_names(pattern: &BindingPattern, out: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(ident) => out.push(ident.name.to_string()),
        BindingPatternKind::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, out);
            }
        }
        BindingPatternKind::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                collect_binding_names(element, out);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, out);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => {
            collect_binding_names(&assign.left, out);
        }
    }
}

fn find_fallback_default(body: &[Statement]) -> Option<String> {
    for stmt in body {
        match stmt {
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    return Some(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    return Some(id.name.to_string());
                }
            }
            Statement::VariableDeclaration(var_decl) => {
                if var_decl.kind == VariableDeclarationKind::Const {
                    if let Some(declarator) = var_decl.declarations.first() {
                        if declarator.init.is_some() {
                            if let BindingPatternKind::BindingIdentifier(ident) =
                                &declarator.id.kind
                            {
                                return Some(ident.name.to_string());
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> SourceSyntax {
        SourceSyntax {
            typescript: true,
            jsx: false,
        }
    }

    #[test]
    fn extracts_import_shapes() {
        let analysis = analyze(
            "import React, { useState } from 'react';\n\
             import * as utils from './utils';\n\
             import './side-effect.css';\n",
            ts(),
        )
        .unwrap();

        assert_eq!(analysis.imports.len(), 3);
        assert_eq!(analysis.imports[0].specifier, "react");
        assert_eq!(
            analysis.imports[0].bindings,
            vec![
                ImportBinding::Default {
                    local: "React".to_string()
                },
                ImportBinding::Named {
                    imported: "useState".to_string(),
                    local: "useState".to_string()
                },
            ]
        );
        assert_eq!(
            analysis.imports[1].bindings,
            vec![ImportBinding::Namespace {
                local: "utils".to_string()
            }]
        );
        assert!(analysis.imports[2].bindings.is_empty());
    }

    #[test]
    fn type_only_imports_are_stripped_without_records() {
        let analysis = analyze(
            "import type { Props } from './types';\nimport { type T, real } from './mixed';\n",
            ts(),
        )
        .unwrap();
        assert_eq!(analysis.imports.len(), 1);
        assert_eq!(analysis.imports[0].specifier, "./mixed");
        assert_eq!(
            analysis.imports[0].bindings,
            vec![ImportBinding::Named {
                imported: "real".to_string(),
                local: "real".to_string()
            }]
        );
    }

    #[test]
    fn extracts_export_shapes() {
        let analysis = analyze(
            "export default function App() { return 1; }\n\
             export const version = '1.0';\n\
             const hidden = 2;\n\
             export { hidden as visible };\n\
             export * from './widgets';\n",
            ts(),
        )
        .unwrap();

        assert_eq!(analysis.default_export.as_deref(), Some("App"));
        assert!(analysis
            .named_exports
            .contains(&("version".to_string(), "version".to_string())));
        assert!(analysis
            .named_exports
            .contains(&("hidden".to_string(), "visible".to_string())));
        assert_eq!(analysis.reexports.len(), 1);
        assert_eq!(analysis.reexports[0].kind, ReExportKind::Star);
    }

    #[test]
    fn specifiers_keep_source_order_across_imports_and_reexports() {
        let analysis = analyze(
            "export * from './z';\n\
             import { a } from './a';\n\
             export { b } from './b';\n\
             import './a';\n",
            ts(),
        )
        .unwrap();
        assert_eq!(
            analysis.required_specifiers(),
            vec!["./z", "./a", "./b", "./a"]
        );
    }

    #[test]
    fn anonymous_default_gets_a_synthetic_binding() {
        let analysis = analyze("export default () => 42;\n", ts()).unwrap();
        assert_eq!(
            analysis.default_export.as_deref(),
            Some(DEFAULT_EXPORT_BINDING)
        );
        let rewritten = apply_edits("export default () => 42;\n", &analysis.edits);
        assert!(rewritten.starts_with("const __default_export = () => 42;"));
    }

    #[test]
    fn export_default_declaration_keeps_the_declaration() {
        let source = "export default function App() { return null; }\n";
        let analysis = analyze(source, ts()).unwrap();
        let rewritten = apply_edits(source, &analysis.edits);
        assert!(rewritten.starts_with("function App() { return null; }"));
    }

    #[test]
    fn fallback_default_is_first_top_level_declaration() {
        let analysis = analyze("const helper = 1;\nfunction Widget() {}\n", ts()).unwrap();
        assert_eq!(analysis.fallback_default.as_deref(), Some("helper"));

        let analysis = analyze("let x = 1;\nclass Panel {}\n", ts()).unwrap();
        assert_eq!(analysis.fallback_default.as_deref(), Some("Panel"));
    }

    #[test]
    fn fallback_is_skipped_when_exports_exist() {
        let analysis = analyze("const a = 1;\nexport const b = 2;\n", ts()).unwrap();
        assert!(analysis.fallback_default.is_none());
    }

    #[test]
    fn broken_source_is_an_error() {
        assert!(analyze("import { from 'x';", ts()).is_err());
    }

    #[test]
    fn destructured_exports_collect_every_binding() {
        let analysis = analyze("export const { a, b: renamed } = source();\n", ts()).unwrap();
        assert!(analysis
            .named_exports
            .contains(&("a".to_string(), "a".to_string())));
        assert!(analysis
            .named_exports
            .contains(&("renamed".to_string(), "renamed".to_string())));
    }
}
