//! TS/JSX lowering adapter.
//!
//! Wraps the oxc transformer behind one function: strip TypeScript syntax,
//! lower JSX to classic `React.createElement` calls, downlevel to the
//! requested target. ES module syntax passes through untouched; the module
//! compiler lowers it separately.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxRuntime, TransformOptions, Transformer};
use serde::{Deserialize, Serialize};

use crate::analyze::SourceSyntax;
use crate::error::{CompileError, CompileResult};

/// Emission target. Passed through to the transformer; the pipeline itself
/// never interprets it beyond cache keying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EsTarget {
    Es2022,
    #[default]
    Es2020,
    Es2015,
}

impl EsTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            EsTarget::Es2022 => "es2022",
            EsTarget::Es2020 => "es2020",
            EsTarget::Es2015 => "es2015",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    pub id: &'a str,
    pub source: &'a str,
    pub syntax: SourceSyntax,
    pub target: EsTarget,
}

/// Lower one module's source. Any failure here is fatal for the module.
pub fn transform(request: &TransformRequest<'_>) -> CompileResult<String> {
    let allocator = Allocator::default();
    let mut source_type = SourceType::default().with_module(true);
    if request.syntax.typescript {
        source_type = source_type.with_typescript(true);
    }
    if request.syntax.jsx {
        source_type = source_type.with_jsx(true);
    }

    let ret = Parser::new(&allocator, request.source, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let detail = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser gave up".to_string());
        return Err(CompileError::Transform {
            id: request.id.to_string(),
            detail,
        });
    }
    let mut program = ret.program;

    let mut options =
        TransformOptions::from_target(request.target.as_str()).map_err(|err| {
            CompileError::Transform {
                id: request.id.to_string(),
                detail: format!("{:?}", err),
            }
        })?;
    // The emitted bundle publishes React on the host global, so lowered JSX
    // must call React.createElement rather than import a jsx runtime module.
    options.jsx.runtime = JsxRuntime::Classic;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let transformed = Transformer::new(&allocator, Path::new(request.id), &options)
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(CompileError::Transform {
            id: request.id.to_string(),
            detail: transformed.errors[0].to_string(),
        });
    }

    Ok(Codegen::new().build(&program).code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_are_lowercase() {
        assert_eq!(EsTarget::Es2022.as_str(), "es2022");
        assert_eq!(
            serde_json::to_string(&EsTarget::Es2015).unwrap(),
            "\"es2015\""
        );
        assert_eq!(EsTarget::default(), EsTarget::Es2020);
    }

    #[test]
    fn strips_types_and_lowers_jsx_to_classic_calls() {
        let code = transform(&TransformRequest {
            id: "/App.tsx",
            source: "const n: number = 1;\nexport default function App() { return <div>{n}</div>; }\n",
            syntax: SourceSyntax {
                typescript: true,
                jsx: true,
            },
            target: EsTarget::Es2020,
        })
        .unwrap();

        assert!(code.contains("React.createElement"));
        assert!(!code.contains(": number"));
        assert!(code.contains("export default function App"));
    }

    #[test]
    fn invalid_source_is_a_transform_error() {
        let err = transform(&TransformRequest {
            id: "/bad.ts",
            source: "const = ;",
            syntax: SourceSyntax {
                typescript: true,
                jsx: false,
            },
            target: EsTarget::Es2020,
        })
        .unwrap_err();
        assert!(matches!(err, CompileError::Transform { .. }));
    }
}
