//! Filters user-written identifiers that collide with the reserved
//! `__cc_`/`__CC` prefixes every later pass and the emitter assume they
//! own, per spec.md §6.
//!
//! Runs first, ahead of every other pass: once closures, the async
//! state machine and structured concurrency start minting their own
//! `__cc_`-prefixed names, a user name that collides would be
//! impossible to tell apart from a generated one. Scanning the raw,
//! still-unlowered tree sidesteps that: every `Ident` in scope at this
//! point is user-written, full stop.
//!
//! Like the UFCS pass, resolution here is lexical-syntactic only — a
//! name is renamed everywhere it's spelled the same way, with no
//! attempt at scope-aware shadowing analysis.

use std::collections::BTreeMap;

use crate::ast::{Expr, File, Item, Stmt};
use crate::error::{CompileWarning, Warning};
use crate::ident::Ident;
use crate::runtime;
use crate::span::Span;

/// Renames every user-declared or user-referenced identifier that
/// collides with a reserved prefix, returning one warning per distinct
/// name renamed. A no-op, and an empty warning list, when nothing in
/// the file collides.
pub fn run(file: &mut File) -> Vec<CompileWarning> {
    let mut seen = std::collections::BTreeSet::new();
    for item in &file.items {
        collect_item(item, &mut seen);
    }

    let renames: BTreeMap<String, String> = seen
        .into_iter()
        .filter(|name| runtime::is_reserved_identifier(name))
        .map(|name| {
            let sanitized = name.trim_start_matches(|c| c == '_').to_string();
            (name, format!("user_{}", sanitized))
        })
        .collect();

    if renames.is_empty() {
        return Vec::new();
    }

    for item in &mut file.items {
        rename_item(item, &renames);
    }

    renames
        .into_iter()
        .map(|(original, renamed)| CompileWarning {
            span: Span::synthetic(file.file_id),
            content: Warning::ReservedIdentifierRenamed { original, renamed },
        })
        .collect()
}

fn collect_item(item: &Item, names: &mut std::collections::BTreeSet<String>) {
    match item {
        Item::Function(f) => {
            names.insert(f.name.as_str().to_string());
            for p in &f.params {
                names.insert(p.name.as_str().to_string());
            }
            if let Some(body) = &f.body {
                for stmt in body {
                    collect_stmt(stmt, names);
                }
            }
        }
        Item::Typedef { name, .. } => {
            names.insert(name.as_str().to_string());
        }
        Item::Struct(r) | Item::Union(r) => {
            if let Some(name) = &r.name {
                names.insert(name.as_str().to_string());
            }
            for field in &r.fields {
                names.insert(field.name.as_str().to_string());
            }
        }
        Item::Enum(e) => {
            if let Some(name) = &e.name {
                names.insert(name.as_str().to_string());
            }
            for variant in &e.variants {
                names.insert(variant.name.as_str().to_string());
            }
        }
        Item::Include { .. } | Item::Verbatim(..) => {}
    }
}

fn collect_stmt(stmt: &Stmt, names: &mut std::collections::BTreeSet<String>) {
    match stmt {
        Stmt::Block(stmts, _) => stmts.iter().for_each(|s| collect_stmt(s, names)),
        Stmt::Expr(e, _) => collect_expr(e, names),
        Stmt::Decl(d) => {
            names.insert(d.name.as_str().to_string());
            if let Some(init) = &d.init {
                collect_expr(init, names);
            }
        }
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                collect_expr(e, names);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            collect_expr(cond, names);
            collect_stmt(then_branch, names);
            if let Some(e) = else_branch {
                collect_stmt(e, names);
            }
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(init) = init {
                collect_stmt(init, names);
            }
            if let Some(cond) = cond {
                collect_expr(cond, names);
            }
            if let Some(post) = post {
                collect_expr(post, names);
            }
            collect_stmt(body, names);
        }
        Stmt::While { cond, body, .. } => {
            collect_expr(cond, names);
            collect_stmt(body, names);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Verbatim(..) => {}
        Stmt::Nursery { body, .. } => collect_stmt(body, names),
        Stmt::Spawn { expr, .. } => collect_expr(expr, names),
        Stmt::Defer { stmt, .. } => collect_stmt(stmt, names),
        Stmt::Match { scrutinee, arms, .. } => {
            collect_expr(scrutinee, names);
            for arm in arms {
                if let Some(binding) = &arm.binding {
                    names.insert(binding.as_str().to_string());
                }
                collect_stmt(&arm.body, names);
            }
        }
        Stmt::WithDeadline { expr, body, .. } => {
            collect_expr(expr, names);
            collect_stmt(body, names);
        }
    }
}

fn collect_expr(expr: &Expr, names: &mut std::collections::BTreeSet<String>) {
    match expr {
        Expr::Ident(i) => {
            names.insert(i.as_str().to_string());
        }
        Expr::IntLiteral { .. } | Expr::StringLiteral { .. } | Expr::SizeofType { .. } => {}
        Expr::Call { callee, args, .. } => {
            collect_expr(callee, names);
            args.iter().for_each(|a| collect_expr(a, names));
        }
        Expr::Field { base, .. } => collect_expr(base, names),
        Expr::Index { base, index, .. } => {
            collect_expr(base, names);
            collect_expr(index, names);
        }
        Expr::Binary { lhs, rhs, .. } => {
            collect_expr(lhs, names);
            collect_expr(rhs, names);
        }
        Expr::Unary { expr, .. } => collect_expr(expr, names),
        Expr::Cast { expr, .. } => collect_expr(expr, names),
        Expr::CompoundLiteral { fields, .. } => {
            for (_, v) in fields {
                collect_expr(v, names);
            }
        }
        Expr::SizeofExpr { expr, .. } => collect_expr(expr, names),
        Expr::Await { expr, .. } => collect_expr(expr, names),
        Expr::Try { expr, .. } => collect_expr(expr, names),
        Expr::Closure(c) => {
            for p in &c.params {
                names.insert(p.as_str().to_string());
            }
            collect_stmt(&c.body, names);
        }
        Expr::MethodCall { receiver, args, .. } => {
            collect_expr(receiver, names);
            args.iter().for_each(|a| collect_expr(a, names));
        }
    }
}

fn rename_item(item: &mut Item, renames: &BTreeMap<String, String>) {
    match item {
        Item::Function(f) => {
            apply(&mut f.name, renames);
            for p in &mut f.params {
                apply(&mut p.name, renames);
            }
            if let Some(body) = &mut f.body {
                for stmt in body.iter_mut() {
                    rename_stmt(stmt, renames);
                }
            }
        }
        Item::Typedef { name, .. } => apply(name, renames),
        Item::Struct(r) | Item::Union(r) => {
            if let Some(name) = &mut r.name {
                apply(name, renames);
            }
            for field in &mut r.fields {
                apply(&mut field.name, renames);
            }
        }
        Item::Enum(e) => {
            if let Some(name) = &mut e.name {
                apply(name, renames);
            }
            for variant in &mut e.variants {
                apply(&mut variant.name, renames);
            }
        }
        Item::Include { .. } | Item::Verbatim(..) => {}
    }
}

fn rename_stmt(stmt: &mut Stmt, renames: &BTreeMap<String, String>) {
    match stmt {
        Stmt::Block(stmts, _) => stmts.iter_mut().for_each(|s| rename_stmt(s, renames)),
        Stmt::Expr(e, _) => rename_expr(e, renames),
        Stmt::Decl(d) => {
            apply(&mut d.name, renames);
            if let Some(init) = &mut d.init {
                rename_expr(init, renames);
            }
        }
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                rename_expr(e, renames);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            rename_expr(cond, renames);
            rename_stmt(then_branch, renames);
            if let Some(e) = else_branch {
                rename_stmt(e, renames);
            }
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(init) = init {
                rename_stmt(init, renames);
            }
            if let Some(cond) = cond {
                rename_expr(cond, renames);
            }
            if let Some(post) = post {
                rename_expr(post, renames);
            }
            rename_stmt(body, renames);
        }
        Stmt::While { cond, body, .. } => {
            rename_expr(cond, renames);
            rename_stmt(body, renames);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Verbatim(..) => {}
        Stmt::Nursery { body, .. } => rename_stmt(body, renames),
        Stmt::Spawn { expr, .. } => rename_expr(expr, renames),
        Stmt::Defer { stmt, .. } => rename_stmt(stmt, renames),
        Stmt::Match { scrutinee, arms, .. } => {
            rename_expr(scrutinee, renames);
            for arm in arms {
                if let Some(binding) = &mut arm.binding {
                    apply(binding, renames);
                }
                rename_stmt(&mut arm.body, renames);
            }
        }
        Stmt::WithDeadline { expr, body, .. } => {
            rename_expr(expr, renames);
            rename_stmt(body, renames);
        }
    }
}

fn rename_expr(expr: &mut Expr, renames: &BTreeMap<String, String>) {
    match expr {
        Expr::Ident(i) => apply(i, renames),
        Expr::IntLiteral { .. } | Expr::StringLiteral { .. } | Expr::SizeofType { .. } => {}
        Expr::Call { callee, args, .. } => {
            rename_expr(callee, renames);
            args.iter_mut().for_each(|a| rename_expr(a, renames));
        }
        Expr::Field { base, .. } => rename_expr(base, renames),
        Expr::Index { base, index, .. } => {
            rename_expr(base, renames);
            rename_expr(index, renames);
        }
        Expr::Binary { lhs, rhs, .. } => {
            rename_expr(lhs, renames);
            rename_expr(rhs, renames);
        }
        Expr::Unary { expr, .. } => rename_expr(expr, renames),
        Expr::Cast { expr, .. } => rename_expr(expr, renames),
        Expr::CompoundLiteral { fields, .. } => {
            for (_, v) in fields.iter_mut() {
                rename_expr(v, renames);
            }
        }
        Expr::SizeofExpr { expr, .. } => rename_expr(expr, renames),
        Expr::Await { expr, .. } => rename_expr(expr, renames),
        Expr::Try { expr, .. } => rename_expr(expr, renames),
        Expr::Closure(c) => {
            for p in &mut c.params {
                apply(p, renames);
            }
            rename_stmt(&mut c.body, renames);
        }
        Expr::MethodCall { receiver, args, .. } => {
            rename_expr(receiver, renames);
            args.iter_mut().for_each(|a| rename_expr(a, renames));
        }
    }
}

fn apply(ident: &mut Ident, renames: &BTreeMap<String, String>) {
    if let Some(renamed) = renames.get(ident.as_str()) {
        ident.name = renamed.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ty::TypeExpr;
    use crate::ast::{FnAttrs, FunctionDecl, Param};
    use crate::span::FileId;

    fn sp() -> Span {
        Span::new(FileId(0), 0, 1)
    }

    #[test]
    fn user_name_with_no_reserved_prefix_is_untouched() {
        let f = FunctionDecl {
            name: Ident::new("compute", sp()),
            params: vec![Param { name: Ident::new("n", sp()), ty: TypeExpr::opaque("int") }],
            return_type: TypeExpr::opaque("int"),
            body: Some(vec![Stmt::Return(Some(Expr::Ident(Ident::new("n", sp()))), sp())]),
            attrs: FnAttrs::empty(),
            span: sp(),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f)]);

        let warnings = run(&mut file);

        assert!(warnings.is_empty());
        match &file.items[0] {
            Item::Function(f) => assert_eq!(f.name.as_str(), "compute"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn colliding_function_name_is_renamed_everywhere_it_appears() {
        let callee = FunctionDecl {
            name: Ident::new("__cc_helper", sp()),
            params: vec![],
            return_type: TypeExpr::opaque("int"),
            body: Some(vec![Stmt::Return(Some(Expr::IntLiteral { value: 1, span: sp() }), sp())]),
            attrs: FnAttrs::empty(),
            span: sp(),
        };
        let caller = FunctionDecl {
            name: Ident::new("main", sp()),
            params: vec![],
            return_type: TypeExpr::opaque("int"),
            body: Some(vec![Stmt::Return(
                Some(Expr::Call { callee: Box::new(Expr::Ident(Ident::new("__cc_helper", sp()))), args: vec![], span: sp() }),
                sp(),
            )]),
            attrs: FnAttrs::empty(),
            span: sp(),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(callee), Item::Function(caller)]);

        let warnings = run(&mut file);

        assert_eq!(warnings.len(), 1);
        match &file.items[0] {
            Item::Function(f) => assert_eq!(f.name.as_str(), "user_cc_helper"),
            _ => unreachable!(),
        }
        match &file.items[1] {
            Item::Function(f) => match f.body.as_ref().unwrap().first().unwrap() {
                Stmt::Return(Some(Expr::Call { callee, .. }), _) => {
                    assert!(matches!(&**callee, Expr::Ident(i) if i.as_str() == "user_cc_helper"));
                }
                other => panic!("unexpected statement: {:?}", other),
            },
            _ => unreachable!(),
        }
    }
}
