//! Lowers every closure literal into an environment, entry function,
//! `make` function and call-site rewrite.
//!
//! Runs after the UFCS pass. Bottom-up: a closure literal nested
//! inside another is lowered first, so by the time the outer literal's
//! captures are computed, any inner closure has already collapsed
//! into a `make`-call whose arguments are themselves outer-scope
//! identifiers — which fall naturally out of the ordinary capture
//! computation instead of needing special-casing.

use crate::ast::ty::CapturedType;
use crate::ast::{Capture, ClosureDef, ClosureLiteral, Expr, File, FnAttrs, Item, Stmt};
use crate::error::{err, ok, CompileError, CompileResult, CompileWarning};
use crate::ident::Ident;
use crate::span::Span;
use crate::strset::{StringMap, StringSet};

/// Tracks, for the body currently being walked, the written type of
/// every binding in scope and the arity of every binding that holds a
/// closure handle (a derived view kept in lockstep with the type map,
/// since `CCClosureN` shows up as ordinary text there too — this just
/// avoids re-parsing it at every call site).
struct Scope {
    types: StringMap<String>,
    closure_vars: StringMap<u8>,
}

impl Scope {
    fn from_params(params: &[crate::ast::Param]) -> Self {
        let mut types = StringMap::new();
        for p in params {
            types.insert(p.name.as_str().to_string(), p.ty.text.clone());
        }
        Scope { types, closure_vars: StringMap::new() }
    }

    fn empty() -> Self {
        Scope { types: StringMap::new(), closure_vars: StringMap::new() }
    }

    fn record_plain(&mut self, name: &str, ty: Option<&str>) {
        if let Some(ty) = ty {
            self.types.insert(name.to_string(), ty.to_string());
        }
    }

    fn record_closure(&mut self, name: &str, arity: u8) {
        self.types.insert(name.to_string(), format!("CCClosure{}", arity));
        self.closure_vars.insert(name.to_string(), arity);
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }
}

pub fn run(file: &mut File) -> CompileResult<()> {
    let globals = file.global_names();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for item in &mut file.items {
        if let Item::Function(f) = item {
            if let Some(body) = &mut f.body {
                let mut scope = Scope::from_params(&f.params);
                for stmt in body.iter_mut() {
                    lower_stmt(stmt, &globals, &mut scope, &mut file.closures, &mut warnings, &mut errors);
                }
                if !scope.closure_vars.is_empty() {
                    for stmt in body.iter_mut() {
                        rewrite_var_closure_calls_stmt(stmt, &scope.closure_vars);
                    }
                }
            }
        }
    }

    rewrite_nested_closure_calls(&mut file.closures);

    if errors.is_empty() {
        ok((), warnings, errors)
    } else {
        err(warnings, errors)
    }
}

fn lower_stmt(
    stmt: &mut Stmt,
    globals: &StringSet,
    scope: &mut Scope,
    closures: &mut crate::ast::ClosureTable,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    match stmt {
        Stmt::Block(stmts, _) => {
            for s in stmts.iter_mut() {
                lower_stmt(s, globals, scope, closures, warnings, errors);
            }
        }
        Stmt::Expr(e, _) => {
            lower_expr(e, globals, scope, closures, warnings, errors);
        }
        Stmt::Decl(d) => {
            let mut closure_id = None;
            if let Some(init) = &mut d.init {
                closure_id = lower_expr(init, globals, scope, closures, warnings, errors);
            }
            match closure_id.and_then(|id| closures.get(id)).map(ClosureDef::arity) {
                Some(arity) => scope.record_closure(d.name.as_str(), arity as u8),
                None => scope.record_plain(d.name.as_str(), d.ty.as_ref().map(|t| t.text.as_str())),
            }
        }
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                lower_expr(e, globals, scope, closures, warnings, errors);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            lower_expr(cond, globals, scope, closures, warnings, errors);
            lower_stmt(then_branch, globals, scope, closures, warnings, errors);
            if let Some(e) = else_branch {
                lower_stmt(e, globals, scope, closures, warnings, errors);
            }
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(init) = init {
                lower_stmt(init, globals, scope, closures, warnings, errors);
            }
            if let Some(cond) = cond {
                lower_expr(cond, globals, scope, closures, warnings, errors);
            }
            if let Some(post) = post {
                lower_expr(post, globals, scope, closures, warnings, errors);
            }
            lower_stmt(body, globals, scope, closures, warnings, errors);
        }
        Stmt::While { cond, body, .. } => {
            lower_expr(cond, globals, scope, closures, warnings, errors);
            lower_stmt(body, globals, scope, closures, warnings, errors);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Verbatim(..) => {}
        Stmt::Nursery { body, .. } => lower_stmt(body, globals, scope, closures, warnings, errors),
        Stmt::Spawn { expr, .. } => {
            lower_expr(expr, globals, scope, closures, warnings, errors);
        }
        Stmt::Defer { stmt, .. } => lower_stmt(stmt, globals, scope, closures, warnings, errors),
        Stmt::Match { scrutinee, arms, .. } => {
            lower_expr(scrutinee, globals, scope, closures, warnings, errors);
            for arm in arms {
                lower_stmt(&mut arm.body, globals, scope, closures, warnings, errors);
            }
        }
        Stmt::WithDeadline { expr, body, .. } => {
            lower_expr(expr, globals, scope, closures, warnings, errors);
            lower_stmt(body, globals, scope, closures, warnings, errors);
        }
    }
}

/// Lowers `expr` (recursing into children first). Returns `Some(id)`
/// when `expr` itself was a closure literal, now replaced in place by
/// its `make` call — the caller uses this to record the declared
/// variable's type as a closure handle.
fn lower_expr(
    expr: &mut Expr,
    globals: &StringSet,
    scope: &mut Scope,
    closures: &mut crate::ast::ClosureTable,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) -> Option<u32> {
    match expr {
        Expr::Closure(_) => {
            let ClosureLiteral { params, is_block, mut body, span } = take_closure(expr);
            lower_stmt(&mut body, globals, scope, closures, warnings, errors);

            if params.len() > 2 {
                errors.push(CompileError::ClosureArityUnsupported { arity: params.len(), span });
                return None;
            }

            let mut refs = StringSet::new();
            let mut decls = StringSet::new();
            for p in &params {
                decls.insert(p.as_str().to_string());
            }
            collect_decls_stmt(&body, &mut decls);
            collect_refs_stmt(&body, &mut refs);

            let capture_names = refs.difference_ordered(&decls);
            let capture_names: Vec<String> = capture_names.into_iter().filter(|n| !globals.contains(n)).collect();

            let mut captures = Vec::with_capacity(capture_names.len());
            for name in &capture_names {
                let ty = match scope.lookup(name) {
                    Some(written) => match CapturedType::classify(written) {
                        Some(ct) => ct,
                        None => {
                            errors.push(CompileError::UnresolvableCaptureType { name: name.clone(), span });
                            continue;
                        }
                    },
                    None => CapturedType::Integer,
                };
                captures.push(Capture { name: Ident::new(name.clone(), span), ty });
            }

            let id = closures.next_id();
            closures.insert(ClosureDef { id, params: params.clone(), captures: captures.clone(), body: *body, is_block, span });

            let make_args = capture_names
                .iter()
                .map(|n| Expr::Ident(Ident::new(n.clone(), span)))
                .collect();
            *expr = Expr::Call {
                callee: Box::new(Expr::Ident(Ident::new(format!("__cc_closure_make_{}", id), span))),
                args: make_args,
                span,
            };
            Some(id)
        }
        Expr::Call { callee, args, .. } => {
            lower_expr(callee, globals, scope, closures, warnings, errors);
            for a in args.iter_mut() {
                lower_expr(a, globals, scope, closures, warnings, errors);
            }
            None
        }
        Expr::Field { base, .. } => {
            lower_expr(base, globals, scope, closures, warnings, errors);
            None
        }
        Expr::Index { base, index, .. } => {
            lower_expr(base, globals, scope, closures, warnings, errors);
            lower_expr(index, globals, scope, closures, warnings, errors);
            None
        }
        Expr::Binary { lhs, rhs, .. } => {
            lower_expr(lhs, globals, scope, closures, warnings, errors);
            lower_expr(rhs, globals, scope, closures, warnings, errors);
            None
        }
        Expr::Unary { expr, .. } => {
            lower_expr(expr, globals, scope, closures, warnings, errors);
            None
        }
        Expr::Cast { expr, .. } => {
            lower_expr(expr, globals, scope, closures, warnings, errors);
            None
        }
        Expr::CompoundLiteral { fields, .. } => {
            for (_, v) in fields.iter_mut() {
                lower_expr(v, globals, scope, closures, warnings, errors);
            }
            None
        }
        Expr::SizeofExpr { expr, .. } => {
            lower_expr(expr, globals, scope, closures, warnings, errors);
            None
        }
        Expr::Await { expr, .. } => {
            lower_expr(expr, globals, scope, closures, warnings, errors);
            None
        }
        Expr::Try { expr, .. } => {
            lower_expr(expr, globals, scope, closures, warnings, errors);
            None
        }
        Expr::MethodCall { receiver, args, .. } => {
            // The UFCS pass should already have removed these; handled
            // here defensively in case pass order is ever changed.
            lower_expr(receiver, globals, scope, closures, warnings, errors);
            for a in args.iter_mut() {
                lower_expr(a, globals, scope, closures, warnings, errors);
            }
            None
        }
        Expr::Ident(_) | Expr::IntLiteral { .. } | Expr::StringLiteral { .. } | Expr::SizeofType { .. } => None,
    }
}

fn take_closure(expr: &mut Expr) -> ClosureLiteral {
    let placeholder = Expr::IntLiteral { value: 0, span: expr.span() };
    match std::mem::replace(expr, placeholder) {
        Expr::Closure(c) => c,
        _ => unreachable!("take_closure called on a non-closure expression"),
    }
}

fn collect_decls_stmt(stmt: &Stmt, out: &mut StringSet) {
    match stmt {
        Stmt::Block(stmts, _) => stmts.iter().for_each(|s| collect_decls_stmt(s, out)),
        Stmt::Decl(d) => {
            out.insert(d.name.as_str().to_string());
        }
        Stmt::If { then_branch, else_branch, .. } => {
            collect_decls_stmt(then_branch, out);
            if let Some(e) = else_branch {
                collect_decls_stmt(e, out);
            }
        }
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                collect_decls_stmt(init, out);
            }
            collect_decls_stmt(body, out);
        }
        Stmt::While { body, .. } => collect_decls_stmt(body, out),
        Stmt::Nursery { body, .. } => collect_decls_stmt(body, out),
        Stmt::Defer { stmt, .. } => collect_decls_stmt(stmt, out),
        Stmt::Match { arms, .. } => {
            for arm in arms {
                if let Some(b) = &arm.binding {
                    out.insert(b.as_str().to_string());
                }
                collect_decls_stmt(&arm.body, out);
            }
        }
        Stmt::WithDeadline { body, .. } => collect_decls_stmt(body, out),
        Stmt::Expr(..) | Stmt::Return(..) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::Spawn { .. } | Stmt::Verbatim(..) => {}
    }
}

fn collect_refs_stmt(stmt: &Stmt, out: &mut StringSet) {
    match stmt {
        Stmt::Block(stmts, _) => stmts.iter().for_each(|s| collect_refs_stmt(s, out)),
        Stmt::Expr(e, _) => collect_refs_expr(e, out),
        Stmt::Decl(d) => {
            if let Some(init) = &d.init {
                collect_refs_expr(init, out);
            }
        }
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                collect_refs_expr(e, out);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            collect_refs_expr(cond, out);
            collect_refs_stmt(then_branch, out);
            if let Some(e) = else_branch {
                collect_refs_stmt(e, out);
            }
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(init) = init {
                collect_refs_stmt(init, out);
            }
            if let Some(cond) = cond {
                collect_refs_expr(cond, out);
            }
            if let Some(post) = post {
                collect_refs_expr(post, out);
            }
            collect_refs_stmt(body, out);
        }
        Stmt::While { cond, body, .. } => {
            collect_refs_expr(cond, out);
            collect_refs_stmt(body, out);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Verbatim(..) => {}
        Stmt::Nursery { body, .. } => collect_refs_stmt(body, out),
        Stmt::Spawn { expr, .. } => collect_refs_expr(expr, out),
        Stmt::Defer { stmt, .. } => collect_refs_stmt(stmt, out),
        Stmt::Match { scrutinee, arms, .. } => {
            collect_refs_expr(scrutinee, out);
            for arm in arms {
                collect_refs_stmt(&arm.body, out);
            }
        }
        Stmt::WithDeadline { expr, body, .. } => {
            collect_refs_expr(expr, out);
            collect_refs_stmt(body, out);
        }
    }
}

fn collect_refs_expr(expr: &Expr, out: &mut StringSet) {
    match expr {
        Expr::Ident(i) => {
            out.insert(i.as_str().to_string());
        }
        Expr::Call { callee, args, .. } => {
            collect_refs_expr(callee, out);
            args.iter().for_each(|a| collect_refs_expr(a, out));
        }
        Expr::Field { base, .. } => collect_refs_expr(base, out),
        Expr::Index { base, index, .. } => {
            collect_refs_expr(base, out);
            collect_refs_expr(index, out);
        }
        Expr::Binary { lhs, rhs, .. } => {
            collect_refs_expr(lhs, out);
            collect_refs_expr(rhs, out);
        }
        Expr::Unary { expr, .. } => collect_refs_expr(expr, out),
        Expr::Cast { expr, .. } => collect_refs_expr(expr, out),
        Expr::CompoundLiteral { fields, .. } => fields.iter().for_each(|(_, v)| collect_refs_expr(v, out)),
        Expr::SizeofExpr { expr, .. } => collect_refs_expr(expr, out),
        Expr::Await { expr, .. } => collect_refs_expr(expr, out),
        Expr::Try { expr, .. } => collect_refs_expr(expr, out),
        Expr::MethodCall { receiver, args, .. } => {
            collect_refs_expr(receiver, out);
            args.iter().for_each(|a| collect_refs_expr(a, out));
        }
        // Already-lowered nested closures show up as `__cc_closure_make_N(captures...)`
        // calls, handled by the `Expr::Call` arm above; no separate
        // `Expr::Closure` arm is reachable here since lowering is bottom-up.
        Expr::Closure(c) => collect_refs_stmt(&c.body, out),
        Expr::IntLiteral { .. } | Expr::StringLiteral { .. } | Expr::SizeofType { .. } => {}
    }
}

/// Rewrites `var(args…)` into `cc_closureN_call(var, (intptr_t)args…)`
/// for every `var` recorded in `closure_vars`, within the scope that
/// map was built for — either a whole function body, or, recursively,
/// a closure definition's own body using its own captures as the
/// local list.
pub fn rewrite_var_closure_calls_stmt(stmt: &mut Stmt, closure_vars: &StringMap<u8>) {
    match stmt {
        Stmt::Block(stmts, _) => stmts.iter_mut().for_each(|s| rewrite_var_closure_calls_stmt(s, closure_vars)),
        Stmt::Expr(e, _) => rewrite_var_closure_calls_expr(e, closure_vars),
        Stmt::Decl(d) => {
            if let Some(init) = &mut d.init {
                rewrite_var_closure_calls_expr(init, closure_vars);
            }
        }
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                rewrite_var_closure_calls_expr(e, closure_vars);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            rewrite_var_closure_calls_expr(cond, closure_vars);
            rewrite_var_closure_calls_stmt(then_branch, closure_vars);
            if let Some(e) = else_branch {
                rewrite_var_closure_calls_stmt(e, closure_vars);
            }
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(init) = init {
                rewrite_var_closure_calls_stmt(init, closure_vars);
            }
            if let Some(cond) = cond {
                rewrite_var_closure_calls_expr(cond, closure_vars);
            }
            if let Some(post) = post {
                rewrite_var_closure_calls_expr(post, closure_vars);
            }
            rewrite_var_closure_calls_stmt(body, closure_vars);
        }
        Stmt::While { cond, body, .. } => {
            rewrite_var_closure_calls_expr(cond, closure_vars);
            rewrite_var_closure_calls_stmt(body, closure_vars);
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Verbatim(..) => {}
        Stmt::Nursery { body, .. } => rewrite_var_closure_calls_stmt(body, closure_vars),
        Stmt::Spawn { expr, .. } => rewrite_var_closure_calls_expr(expr, closure_vars),
        Stmt::Defer { stmt, .. } => rewrite_var_closure_calls_stmt(stmt, closure_vars),
        Stmt::Match { scrutinee, arms, .. } => {
            rewrite_var_closure_calls_expr(scrutinee, closure_vars);
            for arm in arms {
                rewrite_var_closure_calls_stmt(&mut arm.body, closure_vars);
            }
        }
        Stmt::WithDeadline { expr, body, .. } => {
            rewrite_var_closure_calls_expr(expr, closure_vars);
            rewrite_var_closure_calls_stmt(body, closure_vars);
        }
    }
}

fn rewrite_var_closure_calls_expr(expr: &mut Expr, closure_vars: &StringMap<u8>) {
    match expr {
        Expr::Call { callee, args, span } => {
            for a in args.iter_mut() {
                rewrite_var_closure_calls_expr(a, closure_vars);
            }
            if let Expr::Ident(name) = callee.as_ref() {
                if let Some(&arity) = closure_vars.get(name.as_str()) {
                    let var_name = name.clone();
                    let mut new_args = Vec::with_capacity(args.len() + 1);
                    new_args.push(Expr::Ident(var_name));
                    for a in args.drain(..) {
                        new_args.push(Expr::Cast {
                            ty: crate::ast::ty::TypeExpr::opaque("intptr_t"),
                            expr: Box::new(a),
                            span: *span,
                        });
                    }
                    *expr = Expr::Call {
                        callee: Box::new(Expr::Ident(Ident::new(crate::runtime::closure_call(arity as usize), *span))),
                        args: new_args,
                        span: *span,
                    };
                    return;
                }
            }
            rewrite_var_closure_calls_expr(callee, closure_vars);
        }
        Expr::Field { base, .. } => rewrite_var_closure_calls_expr(base, closure_vars),
        Expr::Index { base, index, .. } => {
            rewrite_var_closure_calls_expr(base, closure_vars);
            rewrite_var_closure_calls_expr(index, closure_vars);
        }
        Expr::Binary { lhs, rhs, .. } => {
            rewrite_var_closure_calls_expr(lhs, closure_vars);
            rewrite_var_closure_calls_expr(rhs, closure_vars);
        }
        Expr::Unary { expr, .. } => rewrite_var_closure_calls_expr(expr, closure_vars),
        Expr::Cast { expr, .. } => rewrite_var_closure_calls_expr(expr, closure_vars),
        Expr::CompoundLiteral { fields, .. } => {
            fields.iter_mut().for_each(|(_, v)| rewrite_var_closure_calls_expr(v, closure_vars))
        }
        Expr::SizeofExpr { expr, .. } => rewrite_var_closure_calls_expr(expr, closure_vars),
        Expr::Await { expr, .. } => rewrite_var_closure_calls_expr(expr, closure_vars),
        Expr::Try { expr, .. } => rewrite_var_closure_calls_expr(expr, closure_vars),
        Expr::MethodCall { receiver, args, .. } => {
            rewrite_var_closure_calls_expr(receiver, closure_vars);
            args.iter_mut().for_each(|a| rewrite_var_closure_calls_expr(a, closure_vars));
        }
        Expr::Closure(c) => rewrite_var_closure_calls_stmt(&mut c.body, closure_vars),
        Expr::Ident(_) | Expr::IntLiteral { .. } | Expr::StringLiteral { .. } | Expr::SizeofType { .. } => {}
    }
}

/// Applies the call rewrite across the whole closure table: for every
/// definition whose captures include another closure's handle,
/// rewrite calls to that capture inside the definition's own body.
/// Run once, after the main per-function walk above has populated
/// every `ClosureDef`.
pub fn rewrite_nested_closure_calls(closures: &mut crate::ast::ClosureTable) {
    let ids: Vec<u32> = closures.iter().map(|d| d.id).collect();
    for id in ids {
        let local_vars = {
            let def = closures.get(id).expect("closure id from this table's own iterator");
            let mut map = StringMap::new();
            for cap in &def.captures {
                if let CapturedType::Closure(arity) = cap.ty {
                    map.insert(cap.name.as_str().to_string(), arity);
                }
            }
            map
        };
        if local_vars.is_empty() {
            continue;
        }
        closures.with_body_mut(id, |body| rewrite_var_closure_calls_stmt(body, &local_vars));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClosureLiteral, Decl, Item, Param};
    use crate::ast::ty::TypeExpr;
    use crate::span::FileId;

    fn sp(a: u32, b: u32) -> Span {
        Span::new(FileId(0), a, b)
    }

    fn ident(name: &str) -> Ident {
        Ident::new(name, sp(0, 1))
    }

    #[test]
    fn simple_closure_with_integer_capture() {
        // int x = 3; CCClosure0 c = () => { return x + 1; }; int y = c();
        let closure_body = Stmt::Block(
            vec![Stmt::Return(
                Some(Expr::Binary {
                    op: crate::ast::BinOp::Add,
                    lhs: Box::new(Expr::Ident(ident("x"))),
                    rhs: Box::new(Expr::IntLiteral { value: 1, span: sp(0, 1) }),
                    span: sp(0, 1),
                }),
                sp(0, 1),
            )],
            sp(0, 1),
        );
        let body = vec![
            Stmt::Decl(Decl { name: ident("x"), ty: Some(TypeExpr::opaque("int")), init: Some(Expr::IntLiteral { value: 3, span: sp(0, 1) }), span: sp(0, 1) }),
            Stmt::Decl(Decl {
                name: ident("c"),
                ty: None,
                init: Some(Expr::Closure(ClosureLiteral { params: vec![], is_block: true, body: Box::new(closure_body), span: sp(0, 1) })),
                span: sp(0, 1),
            }),
            Stmt::Decl(Decl {
                name: ident("y"),
                ty: Some(TypeExpr::opaque("int")),
                init: Some(Expr::Call { callee: Box::new(Expr::Ident(ident("c"))), args: vec![], span: sp(0, 1) }),
                span: sp(0, 1),
            }),
        ];
        let func = crate::ast::FunctionDecl {
            name: ident("f"),
            params: vec![],
            return_type: TypeExpr::opaque("void"),
            body: Some(body),
            attrs: FnAttrs::empty(),
            span: sp(0, 1),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(func)]);
        let res = run(&mut file);
        assert!(res.is_ok(), "{:?}", res.errors);
        assert_eq!(file.closures.iter().count(), 1);
        let def = file.closures.get(0).unwrap();
        assert_eq!(def.captures.len(), 1);
        assert_eq!(def.captures[0].name.as_str(), "x");
        assert!(matches!(def.captures[0].ty, CapturedType::Integer));

        // the call site `c()` became `cc_closure0_call(c)`
        if let Item::Function(f) = &file.items[0] {
            let body = f.body.as_ref().unwrap();
            if let Stmt::Decl(d) = &body[2] {
                match d.init.as_ref().unwrap() {
                    Expr::Call { callee, args, .. } => {
                        assert!(matches!(callee.as_ref(), Expr::Ident(i) if i.as_str() == "cc_closure0_call"));
                        assert_eq!(args.len(), 1);
                    }
                    other => panic!("expected a rewritten call, got {:?}", other),
                }
            } else {
                panic!("expected decl");
            }
        }
    }

    #[test]
    fn no_closures_is_a_no_op() {
        let body = vec![Stmt::Return(Some(Expr::IntLiteral { value: 1, span: sp(0, 1) }), sp(0, 1))];
        let func = crate::ast::FunctionDecl {
            name: ident("f"),
            params: vec![],
            return_type: TypeExpr::opaque("int"),
            body: Some(body),
            attrs: FnAttrs::empty(),
            span: sp(0, 1),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(func)]);
        let res = run(&mut file);
        assert!(res.is_ok());
        assert!(file.closures.is_empty());
    }
}
