//! Drives every pass over one parsed file in spec.md §2's data-flow
//! order and hands the result to the emitter.
//!
//! This is the one place that knows the full pass ordering: the
//! reserved-identifier filter runs first, against the raw,
//! still-unlowered tree, so every later pass can mint its own
//! `__cc_`-prefixed names without fear of colliding with anything the
//! user wrote. Then UFCS (so later passes never see a method-call
//! node), then the closure pass (so spawn/await-adjacent closure
//! literals are already `make` calls by the time concurrency/
//! auto-blocking run), then auto-blocking inside `@async` bodies, then
//! the async state machine (which consumes the awaits auto-blocking
//! produced), then structured concurrency, then the small syntactic
//! passes. A `.cch` header skips the statement/expression pipeline
//! entirely and runs only the reserved-identifier filter followed by
//! the header sub-pipeline, per spec.md §6.

use crate::ast::File;
use crate::build_config::{BuildConfig, SourceKind};
use crate::emitter;
use crate::error::{dedup_unsorted, CompileError, CompileWarning};
use crate::passes::{async_sm, autoblock, closure, concurrency, header, reserved, small, ufcs};
use crate::source_map::SourceMap;

/// Everything one call to `compile_unit` produced: the generated C (or
/// H) text when lowering succeeded, plus every warning and error
/// raised along the way. `text` is `None` exactly when `errors` is
/// non-empty, mirroring `CompileResult`'s own contract.
pub struct CompileOutput {
    pub text: Option<String>,
    pub warnings: Vec<CompileWarning>,
    pub errors: Vec<CompileError>,
}

impl CompileOutput {
    pub fn is_ok(&self) -> bool {
        self.text.is_some()
    }
}

/// Lowers one already-parsed file according to `config.kind()`,
/// threading a single warnings/errors pair through every pass so a
/// caller sees the whole run's diagnostics together, not just the
/// first pass that failed. The accumulated diagnostics are deduplicated
/// with `error::dedup_unsorted` before being handed back, since more
/// than one pass can legitimately raise the same warning against the
/// same span.
#[tracing::instrument(skip(file, sources, config), fields(file = %file.filename))]
pub fn compile_unit(file: &mut File, sources: &SourceMap, config: &BuildConfig) -> CompileOutput {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    match config.kind() {
        SourceKind::Header => {
            run_header_pipeline(file, &mut warnings, &mut errors);
        }
        SourceKind::Source => {
            run_source_pipeline(file, &mut warnings, &mut errors);
        }
    }

    if !errors.is_empty() {
        return CompileOutput { text: None, warnings: dedup_unsorted(warnings), errors: dedup_unsorted(errors) };
    }

    let mut emitted = emitter::emit_file(file, sources);
    warnings.append(&mut emitted.warnings);
    errors.append(&mut emitted.errors);
    CompileOutput { text: emitted.value, warnings: dedup_unsorted(warnings), errors: dedup_unsorted(errors) }
}

#[tracing::instrument(skip(file, warnings, errors))]
fn run_header_pipeline(file: &mut File, warnings: &mut Vec<CompileWarning>, errors: &mut Vec<CompileError>) {
    warnings.append(&mut reserved::run(file));
    let mut res = header::run(file);
    warnings.append(&mut res.warnings);
    errors.append(&mut res.errors);
    if let Some(guard_block) = res.value {
        if !guard_block.is_empty() {
            file.items.push(crate::ast::Item::Verbatim(guard_block, crate::span::Span::synthetic(file.file_id)));
        }
    }
}

#[tracing::instrument(skip(file, warnings, errors))]
fn run_source_pipeline(file: &mut File, warnings: &mut Vec<CompileWarning>, errors: &mut Vec<CompileError>) {
    warnings.append(&mut reserved::run(file));
    ufcs::run(file);
    if !collect(closure::run(file), warnings, errors) {
        return;
    }
    if !collect(autoblock::run(file), warnings, errors) {
        return;
    }
    if !collect(async_sm::run(file), warnings, errors) {
        return;
    }
    if !collect(concurrency::run(file), warnings, errors) {
        return;
    }
    small::run(file);
}

/// Folds one pass's `CompileResult<()>` into the run's accumulators,
/// returning whether the pipeline should keep going.
fn collect(mut res: crate::error::CompileResult<()>, warnings: &mut Vec<CompileWarning>, errors: &mut Vec<CompileError>) -> bool {
    warnings.append(&mut res.warnings);
    errors.append(&mut res.errors);
    res.value.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ty::TypeExpr;
    use crate::ast::{FnAttrs, FunctionDecl, Item, Stmt};
    use crate::ident::Ident;
    use crate::span::{FileId, Span};
    use std::path::PathBuf;

    fn sp() -> Span {
        Span::new(FileId(0), 0, 1)
    }

    #[test]
    fn source_pipeline_on_a_trivial_function_emits_plain_c() {
        let f = FunctionDecl {
            name: Ident::new("main", sp()),
            params: vec![],
            return_type: TypeExpr::opaque("int"),
            body: Some(vec![Stmt::Return(Some(crate::ast::Expr::IntLiteral { value: 0, span: sp() }), sp())]),
            attrs: FnAttrs::empty(),
            span: sp(),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f)]);
        let mut sm = SourceMap::new();
        sm.add_file("t.ccs", "int main(void) { return 0; }");
        let config = BuildConfig::new(PathBuf::from("t.ccs"), SourceKind::Source);

        let out = compile_unit(&mut file, &sm, &config);
        assert!(out.is_ok(), "{:?}", out.errors);
        assert!(out.text.unwrap().contains("int main(void)"));
    }

    #[test]
    fn header_pipeline_appends_a_guard_block_when_an_instantiation_is_present() {
        let f = FunctionDecl {
            name: Ident::new("lookup", sp()),
            params: vec![],
            return_type: TypeExpr::result("MyData!>(IoError)", TypeExpr::opaque("MyData"), TypeExpr::opaque("IoError")),
            body: None,
            attrs: FnAttrs::empty(),
            span: sp(),
        };
        let mut file = File::new("t.cch", FileId(0), vec![Item::Function(f)]);
        let mut sm = SourceMap::new();
        sm.add_file("t.cch", "MyData!>(IoError) lookup();");
        let config = BuildConfig::new(PathBuf::from("t.cch"), SourceKind::Header);

        let out = compile_unit(&mut file, &sm, &config);
        assert!(out.is_ok(), "{:?}", out.errors);
        assert!(out.text.unwrap().contains("CC_DECL_RESULT_SPEC"));
    }
}
