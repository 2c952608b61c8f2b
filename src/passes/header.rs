//! Header lowering sub-pipeline: rewrites generic result/optional
//! syntax (`T!E`, `T?`) in `.cch` interface files into mangled nominal
//! names, and collects the set of instantiations so the emitter can
//! generate one guarded declaration block per file.
//!
//! This sub-pipeline only runs for header files (`SourceKind::Header`);
//! source files route `T!E`/`T?`/`T[:]` through `passes::small` instead,
//! which reuses the same mangling but never collects instantiations —
//! a source file consumes types that headers already declared.

use std::collections::BTreeSet;
use std::path::Path;

use crate::ast::ty::{TypeExpr, TypeShape};
use crate::ast::{File, FunctionDecl, Item, Param};
use crate::error::{ok, CompileResult, CompileWarning};
use crate::source_map::same_file;

/// A single name→canonical-name substitution the mangler applies
/// before the generic whitespace/punctuation collapse. Declared as
/// data, not a match arm per name, so extending the table doesn't
/// touch the mangling algorithm.
const ALIASES: &[(&str, &str)] = &[
    ("IoError", "CCIoError"),
    ("Error", "CCError"),
    ("Arena", "CCArena"),
    ("File", "CCFile"),
    ("String", "CCString"),
    ("Slice", "CCSlice"),
];

fn alias(name: &str) -> String {
    for (from, to) in ALIASES {
        if name == *from {
            return (*to).to_string();
        }
    }
    name.to_string()
}

/// Collapses a written type's text into a mangled identifier fragment:
/// whitespace to `_`, `*` to `ptr`, brackets/angle-brackets/commas to
/// `_`, runs of `_` collapsed, leading/trailing `_` trimmed. Applied
/// per-component before the alias table, since a type written as
/// `MyData` must resolve through aliasing as a whole name, not by its
/// mangled shape.
fn mangle_component(text: &str) -> String {
    let aliased = alias(text.trim());
    let mut out = String::with_capacity(aliased.len());
    for c in aliased.chars() {
        match c {
            '*' => out.push_str("ptr"),
            c if c.is_whitespace() || "<>[],".contains(c) => out.push('_'),
            c => out.push(c),
        }
    }
    let collapsed = collapse_underscores(&out);
    collapsed.trim_matches('_').to_string()
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !last_was_underscore {
                out.push('_');
            }
            last_was_underscore = true;
        } else {
            out.push(c);
            last_was_underscore = false;
        }
    }
    out
}

/// One generic instantiation the header pipeline discovered, recorded
/// in a stable, de-duplicated order so the generated guard block is
/// reproducible across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Instantiation {
    Result { mangled: String, ok: String, err: String },
    Optional { mangled: String, inner: String },
}

impl Instantiation {
    pub fn mangled_name(&self) -> &str {
        match self {
            Instantiation::Result { mangled, .. } => mangled,
            Instantiation::Optional { mangled, .. } => mangled,
        }
    }

    /// `CC_DECL_RESULT_SPEC(CCResult_MyData_CCIoError, MyData, CCIoError)`
    /// or the optional equivalent, guarded by a `_DEFINED` macro so a
    /// transitively-included header never double-declares the same
    /// instantiation.
    pub fn render_guarded(&self) -> String {
        let guard = format!("{}_DEFINED", self.mangled_name());
        let decl = match self {
            Instantiation::Result { mangled, ok, err } => {
                format!("CC_DECL_RESULT_SPEC({}, {}, {})", mangled, ok, err)
            }
            Instantiation::Optional { mangled, inner } => {
                format!("CC_DECL_OPTIONAL_SPEC({}, {})", mangled, inner)
            }
        };
        format!("#ifndef {guard}\n#define {guard}\n{decl}\n#endif\n", guard = guard, decl = decl)
    }
}

/// Instantiations the runtime's own headers already declare; filtering
/// these out avoids duplicate declarations for the common cases a
/// user interface file will reach for constantly. A from-scratch
/// redesign should ask the runtime's header artifacts for this list at
/// build time (see `DESIGN.md`); lacking that hook here, the set is a
/// fixed table mirroring the runtime contract's own built-ins.
fn is_builtin(inst: &Instantiation) -> bool {
    matches!(
        inst,
        Instantiation::Result { mangled, .. } if mangled == "CCResult_int_CCError"
    ) || matches!(
        inst,
        Instantiation::Optional { mangled, .. } if mangled == "CCOptional_int"
    )
}

/// Mangles one type expression in place, recursing into `Result`'s two
/// arms and `Optional`'s inner type first so nested sum types mangle
/// bottom-up, and records every instantiation found along the way.
fn mangle_type(ty: &mut TypeExpr, out: &mut BTreeSet<Instantiation>) {
    match &mut ty.shape {
        TypeShape::Result(ok, err) => {
            mangle_type(ok, out);
            mangle_type(err, out);
            let ok_name = mangle_component(&ok.text);
            let err_name = mangle_component(&err.text);
            let mangled = format!("CCResult_{}_{}", ok_name, err_name);
            out.insert(Instantiation::Result { mangled: mangled.clone(), ok: ok_name, err: err_name });
            *ty = TypeExpr::opaque(mangled);
        }
        TypeShape::Optional(inner) => {
            mangle_type(inner, out);
            let inner_name = mangle_component(&inner.text);
            let mangled = format!("CCOptional_{}", inner_name);
            out.insert(Instantiation::Optional { mangled: mangled.clone(), inner: inner_name });
            *ty = TypeExpr::opaque(mangled);
        }
        TypeShape::Slice(inner) => {
            mangle_type(inner, out);
            // Slices are a runtime-provided generic (`CCSlice`), not an
            // instantiated nominal type; no instantiation is recorded.
        }
        TypeShape::Opaque => {}
    }
}

fn mangle_params(params: &mut [Param], out: &mut BTreeSet<Instantiation>) {
    for p in params.iter_mut() {
        mangle_type(&mut p.ty, out);
    }
}

fn mangle_function(f: &mut FunctionDecl, out: &mut BTreeSet<Instantiation>) {
    mangle_type(&mut f.return_type, out);
    mangle_params(&mut f.params, out);
}

/// Drops a later `#include` item when an earlier one in the same file
/// already names the same physical header (`same_file`), so a header
/// pulled in twice under slightly different path spellings is only
/// emitted once.
fn dedupe_includes(file: &mut File) {
    let mut seen: Vec<String> = Vec::new();
    file.items.retain(|item| match item {
        Item::Include { path, .. } => {
            let is_dup = seen.iter().any(|seen_path| same_file(Path::new(seen_path), Path::new(path)));
            if !is_dup {
                seen.push(path.clone());
            }
            !is_dup
        }
        _ => true,
    });
}

/// Runs the header sub-pipeline over one interface file: drops
/// redundant `#include`s naming the same physical header, rewrites
/// every `T!E`/`T?` in every function signature, then appends the
/// guarded instantiation block as a definitions-channel entry via the
/// returned text (the caller pushes it onto the edit buffer's
/// definitions stream, matching spec.md §4.1's generated-code
/// channel contract).
pub fn run(file: &mut File) -> CompileResult<String> {
    dedupe_includes(file);

    let mut instantiations = BTreeSet::new();

    for item in &mut file.items {
        if let Item::Function(f) = item {
            mangle_function(f, &mut instantiations);
        }
    }

    let mut block = String::new();
    for inst in instantiations.iter().filter(|i| !is_builtin(i)) {
        block.push_str(&inst.render_guarded());
    }

    ok(block, Vec::<CompileWarning>::new(), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ty::TypeExpr;
    use crate::ast::FunctionDecl;
    use crate::ident::Ident;
    use crate::span::{FileId, Span};

    fn sp() -> Span {
        Span::new(FileId(0), 0, 1)
    }

    #[test]
    fn result_of_user_type_and_alias_mangles_and_is_collected() {
        // MyData!>(IoError) lookup(int id);
        let ty = TypeExpr::result("MyData!>(IoError)", TypeExpr::opaque("MyData"), TypeExpr::opaque("IoError"));
        let f = FunctionDecl {
            name: Ident::new("lookup", sp()),
            params: vec![Param { name: Ident::new("id", sp()), ty: TypeExpr::opaque("int") }],
            return_type: ty,
            body: None,
            attrs: crate::ast::FnAttrs::empty(),
            span: sp(),
        };
        let mut file = File::new("t.cch", FileId(0), vec![Item::Function(f)]);
        let res = run(&mut file);
        assert!(res.is_ok());

        match &file.items[0] {
            Item::Function(f) => assert_eq!(f.return_type.text, "CCResult_MyData_CCIoError"),
            _ => unreachable!(),
        }
        let block = res.value.unwrap();
        assert!(block.contains("CC_DECL_RESULT_SPEC(CCResult_MyData_CCIoError, MyData, CCIoError)"));
        assert!(block.contains("CCResult_MyData_CCIoError_DEFINED"));
    }

    #[test]
    fn builtin_int_result_is_filtered_out() {
        let ty = TypeExpr::result("int!>(Error)", TypeExpr::opaque("int"), TypeExpr::opaque("Error"));
        let f = FunctionDecl {
            name: Ident::new("f", sp()),
            params: vec![],
            return_type: ty,
            body: None,
            attrs: crate::ast::FnAttrs::empty(),
            span: sp(),
        };
        let mut file = File::new("t.cch", FileId(0), vec![Item::Function(f)]);
        let res = run(&mut file);
        assert!(res.value.unwrap().is_empty());
    }

    #[test]
    fn mangle_component_collapses_punctuation_and_whitespace() {
        assert_eq!(mangle_component("struct Foo *"), "struct_Foo_ptr");
        assert_eq!(mangle_component("  int  "), "int");
    }

    #[test]
    fn duplicate_include_naming_the_same_header_is_dropped() {
        let items = vec![
            Item::Include { path: "foo/bar.cch".to_string(), system: false, span: sp() },
            Item::Include { path: "./foo/bar.cch".to_string(), system: false, span: sp() },
            Item::Include { path: "foo/baz.cch".to_string(), system: false, span: sp() },
        ];
        let mut file = File::new("t.cch", FileId(0), items);
        let res = run(&mut file);
        assert!(res.is_ok());
        let paths: Vec<&str> = file
            .items
            .iter()
            .map(|i| match i {
                Item::Include { path, .. } => path.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(paths, vec!["foo/bar.cch", "foo/baz.cch"]);
    }
}
