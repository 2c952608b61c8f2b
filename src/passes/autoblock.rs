//! Inside every `@async` function body, rewrites synchronous callee
//! invocations into awaits on a blocking-task dispatch, so a plain
//! call never stalls the cooperative scheduler. Adjacent statement-form
//! calls are batched into one dispatch; a trailing value-producing call
//! (a `return` or an assignment) immediately after a batch is folded
//! into the same dispatch.
//!
//! This pass only emits `Expr::Closure` literals for the dispatch body
//! — it never computes their captures itself. Capture analysis and
//! `make`-call lowering are the closure pass's job, which is why the
//! pipeline runs this pass before the closure pass: every closure this
//! pass manufactures gets lowered right alongside the user's own.
//!
//! A call already wrapped in `await` is ordinarily left alone — the
//! callee is assumed to already return a task, so rewrapping it would
//! double-dispatch. The channel primitives (`runtime::is_channel_primitive`)
//! are the one exception: `chan_send`/`chan_recv`/`chan_send_take*` are
//! blocking entry points, not task-returning ones, so a user who writes
//! `await chan_recv(ch)` still needs that call batched into a blocking
//! dispatch the same as an un-awaited one.

use crate::ast::ty::TypeExpr;
use crate::ast::{BinOp, ClosureLiteral, Decl, Expr, FnAttrs, FunctionDecl, Item, Stmt};
use crate::error::{err, ok, CompileError, CompileResult, CompileWarning, Warning};
use crate::ident::Ident;
use crate::runtime;
use crate::span::Span;
use crate::strset::StringMap;

struct FnSig {
    params: Vec<TypeExpr>,
    attrs: FnAttrs,
}

fn collect_signatures(items: &[Item]) -> StringMap<FnSig> {
    let mut sigs = StringMap::new();
    for item in items {
        if let Item::Function(f) = item {
            sigs.insert(
                f.name.as_str().to_string(),
                FnSig { params: f.params.iter().map(|p| p.ty.clone()).collect(), attrs: f.attrs },
            );
        }
    }
    sigs
}

fn is_blocking_callee(name: &str, sigs: &StringMap<FnSig>) -> bool {
    match sigs.get(name) {
        Some(sig) => !(sig.attrs.contains(FnAttrs::ASYNC) || sig.attrs.contains(FnAttrs::NOBLOCK)),
        None => true,
    }
}

fn collect_var_types(stmts: &[Stmt], out: &mut StringMap<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Decl(d) => {
                if let Some(ty) = &d.ty {
                    out.insert(d.name.as_str().to_string(), ty.text.clone());
                }
            }
            Stmt::Block(v, _) => collect_var_types(v, out),
            Stmt::If { then_branch, else_branch, .. } => {
                collect_var_types(std::slice::from_ref(then_branch.as_ref()), out);
                if let Some(e) = else_branch {
                    collect_var_types(std::slice::from_ref(e.as_ref()), out);
                }
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    collect_var_types(std::slice::from_ref(init.as_ref()), out);
                }
                collect_var_types(std::slice::from_ref(body.as_ref()), out);
            }
            Stmt::While { body, .. } => collect_var_types(std::slice::from_ref(body.as_ref()), out),
            Stmt::Defer { stmt, .. } => collect_var_types(std::slice::from_ref(stmt.as_ref()), out),
            Stmt::Match { arms, .. } => {
                for arm in arms {
                    collect_var_types(std::slice::from_ref(arm.body.as_ref()), out);
                }
            }
            Stmt::WithDeadline { body, .. } => collect_var_types(std::slice::from_ref(body.as_ref()), out),
            Stmt::Nursery { body, .. } => collect_var_types(std::slice::from_ref(body.as_ref()), out),
            _ => {}
        }
    }
}

pub fn run(file: &mut crate::ast::File) -> CompileResult<()> {
    let sigs = collect_signatures(&file.items);
    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    let mut counter = 0u32;

    for item in &mut file.items {
        if let Item::Function(f) = item {
            if !f.attrs.contains(FnAttrs::ASYNC) {
                continue;
            }
            lower_function(f, &sigs, &mut counter, &mut warnings, &mut errors);
        }
    }

    if errors.is_empty() {
        ok((), warnings, errors)
    } else {
        err(warnings, errors)
    }
}

fn ends_with_unparsed_tail(stmts: &[Stmt]) -> bool {
    matches!(stmts.last(), Some(Stmt::Verbatim(text, _)) if !text.trim().is_empty())
}

fn lower_function(
    f: &mut FunctionDecl,
    sigs: &StringMap<FnSig>,
    counter: &mut u32,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    let body = match &mut f.body {
        Some(body) => body,
        None => return,
    };

    if ends_with_unparsed_tail(body) {
        warnings.push(CompileWarning {
            span: f.span,
            content: Warning::AutoBlockDisabledConservatively { function: f.name.as_str().to_string() },
        });
        return;
    }

    let mut var_types = StringMap::new();
    collect_var_types(body, &mut var_types);

    lower_block(body, sigs, &f.return_type, &var_types, counter, warnings, errors);
}

fn lower_body_stmt(
    stmt: &mut Stmt,
    sigs: &StringMap<FnSig>,
    return_ty: &TypeExpr,
    var_types: &StringMap<String>,
    counter: &mut u32,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    match stmt {
        Stmt::Block(v, _) => lower_block(v, sigs, return_ty, var_types, counter, warnings, errors),
        Stmt::If { then_branch, else_branch, .. } => {
            lower_body_stmt(then_branch, sigs, return_ty, var_types, counter, warnings, errors);
            if let Some(e) = else_branch {
                lower_body_stmt(e, sigs, return_ty, var_types, counter, warnings, errors);
            }
        }
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                lower_body_stmt(init, sigs, return_ty, var_types, counter, warnings, errors);
            }
            lower_body_stmt(body, sigs, return_ty, var_types, counter, warnings, errors);
        }
        Stmt::While { body, .. } => lower_body_stmt(body, sigs, return_ty, var_types, counter, warnings, errors),
        Stmt::Defer { stmt, .. } => lower_body_stmt(stmt, sigs, return_ty, var_types, counter, warnings, errors),
        Stmt::Match { arms, .. } => {
            for arm in arms {
                lower_body_stmt(&mut arm.body, sigs, return_ty, var_types, counter, warnings, errors);
            }
        }
        Stmt::WithDeadline { body, .. } => lower_body_stmt(body, sigs, return_ty, var_types, counter, warnings, errors),
        Stmt::Nursery { body, .. } => lower_body_stmt(body, sigs, return_ty, var_types, counter, warnings, errors),
        leaf => {
            let span = leaf.span();
            let mut tmp = vec![std::mem::replace(leaf, Stmt::Verbatim(String::new(), span))];
            // Only the batching scan, not the full recursive descent: `leaf`
            // is already a non-compound statement, so re-running
            // `lower_body_stmt` over it here would just match this same arm
            // again and recurse without bound.
            batch_candidates(&mut tmp, sigs, return_ty, var_types, counter);
            *leaf = if tmp.len() == 1 { tmp.pop().unwrap() } else { Stmt::Block(tmp, span) };
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Candidate {
    None,
    Statement,
    Return,
    Assign,
}

/// True for a call to one of the channel primitives that must be
/// treated as a blocking candidate even nested inside `await` (the
/// exception spec.md §4.5 carves out of the normal await-operand
/// exclusion).
fn is_channel_primitive_call(e: &Expr) -> bool {
    match e {
        Expr::Call { callee, .. } => matches!(callee.as_ref(), Expr::Ident(name) if runtime::is_channel_primitive(name.as_str())),
        _ => false,
    }
}

fn classify(stmt: &Stmt, sigs: &StringMap<FnSig>) -> Candidate {
    match stmt {
        Stmt::Expr(Expr::Call { callee, .. }, _) => match callee.as_ref() {
            Expr::Ident(name) if is_blocking_callee(name.as_str(), sigs) => Candidate::Statement,
            _ => Candidate::None,
        },
        Stmt::Expr(Expr::Await { expr, .. }, _) if is_channel_primitive_call(expr) => Candidate::Statement,
        Stmt::Return(Some(Expr::Call { callee, .. }), _) => match callee.as_ref() {
            Expr::Ident(name) if is_blocking_callee(name.as_str(), sigs) => Candidate::Return,
            _ => Candidate::None,
        },
        Stmt::Return(Some(Expr::Await { expr, .. }), _) if is_channel_primitive_call(expr) => Candidate::Return,
        Stmt::Expr(Expr::Binary { op: BinOp::Assign, lhs, rhs, .. }, _) => match (lhs.as_ref(), rhs.as_ref()) {
            (Expr::Ident(_), Expr::Call { callee, .. }) => match callee.as_ref() {
                Expr::Ident(name) if is_blocking_callee(name.as_str(), sigs) => Candidate::Assign,
                _ => Candidate::None,
            },
            (Expr::Ident(_), Expr::Await { expr, .. }) if is_channel_primitive_call(expr) => Candidate::Assign,
            _ => Candidate::None,
        },
        _ => Candidate::None,
    }
}

fn fold_allowed(stmt: &Stmt, kind: Candidate, return_ty: &TypeExpr, var_types: &StringMap<String>) -> bool {
    let ty_text = match kind {
        Candidate::Return => Some(return_ty.text.as_str()),
        Candidate::Assign => {
            if let Stmt::Expr(Expr::Binary { lhs, .. }, _) = stmt {
                if let Expr::Ident(name) = lhs.as_ref() {
                    var_types.get(name.as_str()).map(String::as_str)
                } else {
                    None
                }
            } else {
                None
            }
        }
        _ => None,
    };
    match ty_text {
        None => false,
        Some(t) => {
            let t = t.trim();
            t != "void" && !t.starts_with("struct ")
        }
    }
}

fn lower_block(
    stmts: &mut Vec<Stmt>,
    sigs: &StringMap<FnSig>,
    return_ty: &TypeExpr,
    var_types: &StringMap<String>,
    counter: &mut u32,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    for s in stmts.iter_mut() {
        lower_body_stmt(s, sigs, return_ty, var_types, counter, warnings, errors);
    }
    batch_candidates(stmts, sigs, return_ty, var_types, counter);
}

/// Scans one statement list for runs of adjacent blocking-call
/// candidates (plus an optional folded return/assign tail) and
/// replaces each run with its synthesized dispatch. Split out of
/// `lower_block` so `lower_body_stmt`'s leaf arm can re-run just the
/// batching scan over a single wrapped statement without re-entering
/// the recursive descent into compound statements.
fn batch_candidates(stmts: &mut Vec<Stmt>, sigs: &StringMap<FnSig>, return_ty: &TypeExpr, var_types: &StringMap<String>, counter: &mut u32) {
    let mut i = 0;
    while i < stmts.len() {
        if classify(&stmts[i], sigs) != Candidate::Statement {
            i += 1;
            continue;
        }
        let mut end = i + 1;
        while end < stmts.len() && classify(&stmts[end], sigs) == Candidate::Statement {
            end += 1;
        }
        let mut tail_kind = Candidate::None;
        if end < stmts.len() {
            let k = classify(&stmts[end], sigs);
            if matches!(k, Candidate::Return | Candidate::Assign) && fold_allowed(&stmts[end], k, return_ty, var_types) {
                tail_kind = k;
                end += 1;
            }
        }

        let group: Vec<Stmt> = stmts.splice(i..end, std::iter::empty()).collect();
        let replacement = synth_dispatch(group, tail_kind, sigs, return_ty, var_types, counter);
        let repl_len = replacement.len();
        for (offset, s) in replacement.into_iter().enumerate() {
            stmts.insert(i + offset, s);
        }
        i += repl_len;
    }
}

struct ExtractedCall {
    callee: Ident,
    args: Vec<Expr>,
    span: Span,
    tail: Option<TailRole>,
}

enum TailRole {
    Return,
    Assign(Expr),
}

/// Unwraps a bare call or a channel-primitive call nested inside
/// `await` into its callee/args/span, the two shapes `classify` admits
/// as candidates.
fn unwrap_call(e: Expr) -> (Box<Expr>, Vec<Expr>, Span) {
    match e {
        Expr::Call { callee, args, span } => (callee, args, span),
        Expr::Await { expr, .. } => match *expr {
            Expr::Call { callee, args, span } => (callee, args, span),
            other => unreachable!("classify only admits a channel-primitive call under await: {:?}", other),
        },
        other => unreachable!("classify produced a candidate that unwrap_call cannot unpack: {:?}", other),
    }
}

fn extract_call(stmt: Stmt, is_tail: bool) -> ExtractedCall {
    match stmt {
        Stmt::Expr(e @ Expr::Call { .. }, _) | Stmt::Expr(e @ Expr::Await { .. }, _) => {
            let (callee, args, span) = unwrap_call(e);
            let name = match *callee {
                Expr::Ident(i) => i,
                _ => unreachable!("classify only accepts identifier callees"),
            };
            ExtractedCall { callee: name, args, span, tail: None }
        }
        Stmt::Return(Some(e @ Expr::Call { .. }), _) | Stmt::Return(Some(e @ Expr::Await { .. }), _) if is_tail => {
            let (callee, args, span) = unwrap_call(e);
            let name = match *callee {
                Expr::Ident(i) => i,
                _ => unreachable!("classify only accepts identifier callees"),
            };
            ExtractedCall { callee: name, args, span, tail: Some(TailRole::Return) }
        }
        Stmt::Expr(Expr::Binary { lhs, rhs, span, .. }, _) if is_tail => {
            let (callee, args, _) = unwrap_call(*rhs);
            let name = match *callee {
                Expr::Ident(i) => i,
                _ => unreachable!("classify only accepts identifier callees"),
            };
            ExtractedCall { callee: name, args, span, tail: Some(TailRole::Assign(*lhs)) }
        }
        other => unreachable!("classify produced a candidate that extract_call cannot unpack: {:?}", other),
    }
}

/// Builds the temp-decl + dispatch-closure + await replacement for one
/// batched group. `group` holds 1..n statement-form calls, with the
/// last one optionally folded as a `return`/assignment tail.
fn synth_dispatch(
    group: Vec<Stmt>,
    tail_kind: Candidate,
    sigs: &StringMap<FnSig>,
    return_ty: &TypeExpr,
    var_types: &StringMap<String>,
    counter: &mut u32,
) -> Vec<Stmt> {
    let group_len = group.len();
    let calls: Vec<ExtractedCall> = group
        .into_iter()
        .enumerate()
        .map(|(idx, s)| extract_call(s, tail_kind != Candidate::None && idx == group_len - 1))
        .collect();

    let group_id = *counter;
    *counter += 1;

    let mut pre_decls = Vec::new();
    let mut closure_body = Vec::new();
    let span = calls.first().map(|c| c.span).unwrap_or_else(|| Span::synthetic(crate::span::FileId(0)));

    for (call_idx, call) in calls.iter().enumerate() {
        let params = sigs.get(call.callee.as_str()).map(|s| s.params.as_slice()).unwrap_or(&[]);
        let mut cast_args = Vec::with_capacity(call.args.len());
        for (arg_idx, arg) in call.args.iter().enumerate() {
            let temp_name = format!("__cc_blk_arg_{}_{}_{}", group_id, call_idx, arg_idx);
            let temp_span = arg.span();
            pre_decls.push(Stmt::Decl(Decl {
                name: Ident::new(temp_name.clone(), temp_span),
                ty: Some(TypeExpr::opaque("intptr_t")),
                init: Some(Expr::Cast { ty: TypeExpr::opaque("intptr_t"), expr: Box::new(arg.clone()), span: temp_span }),
                span: temp_span,
            }));
            let temp_ident = Expr::Ident(Ident::new(temp_name, temp_span));
            cast_args.push(match params.get(arg_idx) {
                Some(ty) => Expr::Cast { ty: ty.clone(), expr: Box::new(temp_ident), span: temp_span },
                None => temp_ident,
            });
        }

        let call_expr = Expr::Call { callee: Box::new(Expr::Ident(call.callee.clone())), args: cast_args, span: call.span };
        closure_body.push(match &call.tail {
            None => Stmt::Expr(call_expr, call.span),
            Some(_) => Stmt::Return(Some(call_expr), call.span),
        });
    }

    let lit = ClosureLiteral {
        params: vec![],
        is_block: true,
        body: Box::new(Stmt::Block(closure_body, span)),
        span,
    };
    let dispatch_call = Expr::Call {
        callee: Box::new(Expr::Ident(Ident::new(runtime::RUN_BLOCKING_TASK_INTPTR, span))),
        args: vec![Expr::Closure(lit)],
        span,
    };
    let awaited = Expr::Await { expr: Box::new(dispatch_call), span };

    let mut out = pre_decls;
    match calls.into_iter().last().and_then(|c| c.tail) {
        None => out.push(Stmt::Expr(awaited, span)),
        Some(TailRole::Return) => {
            out.push(Stmt::Return(
                Some(Expr::Cast { ty: return_ty.clone(), expr: Box::new(awaited), span }),
                span,
            ));
        }
        Some(TailRole::Assign(lhs)) => {
            let ty = match &lhs {
                Expr::Ident(name) => var_types.get(name.as_str()).map(|t| TypeExpr::opaque(t.clone())).unwrap_or_else(|| TypeExpr::opaque("intptr_t")),
                _ => TypeExpr::opaque("intptr_t"),
            };
            out.push(Stmt::Expr(
                Expr::Binary {
                    op: BinOp::Assign,
                    lhs: Box::new(lhs),
                    rhs: Box::new(Expr::Cast { ty, expr: Box::new(awaited), span }),
                    span,
                },
                span,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{File, Param};
    use crate::span::FileId;

    fn sp(a: u32, b: u32) -> Span {
        Span::new(FileId(0), a, b)
    }

    fn ident(name: &str) -> Ident {
        Ident::new(name, sp(0, 1))
    }

    #[test]
    fn batch_plus_return_fold() {
        // @async int f() { g(); h(2); return k(7); }
        let g = FunctionDecl { name: ident("g"), params: vec![], return_type: TypeExpr::opaque("void"), body: None, attrs: FnAttrs::empty(), span: sp(0, 1) };
        let h = FunctionDecl { name: ident("h"), params: vec![Param { name: ident("n"), ty: TypeExpr::opaque("int") }], return_type: TypeExpr::opaque("void"), body: None, attrs: FnAttrs::empty(), span: sp(0, 1) };
        let k = FunctionDecl { name: ident("k"), params: vec![Param { name: ident("n"), ty: TypeExpr::opaque("int") }], return_type: TypeExpr::opaque("int"), body: None, attrs: FnAttrs::empty(), span: sp(0, 1) };

        let body = vec![
            Stmt::Expr(Expr::Call { callee: Box::new(Expr::Ident(ident("g"))), args: vec![], span: sp(0, 1) }, sp(0, 1)),
            Stmt::Expr(
                Expr::Call { callee: Box::new(Expr::Ident(ident("h"))), args: vec![Expr::IntLiteral { value: 2, span: sp(0, 1) }], span: sp(0, 1) },
                sp(0, 1),
            ),
            Stmt::Return(
                Some(Expr::Call { callee: Box::new(Expr::Ident(ident("k"))), args: vec![Expr::IntLiteral { value: 7, span: sp(0, 1) }], span: sp(0, 1) }),
                sp(0, 1),
            ),
        ];
        let f = FunctionDecl { name: ident("f"), params: vec![], return_type: TypeExpr::opaque("int"), body: Some(body), attrs: FnAttrs::ASYNC, span: sp(0, 1) };

        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(g), Item::Function(h), Item::Function(k), Item::Function(f)]);
        let res = run(&mut file);
        assert!(res.is_ok(), "{:?}", res.errors);

        let lowered = match &file.items[3] {
            Item::Function(f) => f.body.as_ref().unwrap(),
            _ => unreachable!(),
        };
        // 2 args across g()+h()+k() => 1 temp for h's arg, 1 for k's arg (g takes none);
        // plus the final folded return statement.
        assert_eq!(lowered.len(), 3);
        assert!(matches!(&lowered[0], Stmt::Decl(_)));
        assert!(matches!(&lowered[1], Stmt::Decl(_)));
        match &lowered[2] {
            Stmt::Return(Some(Expr::Cast { expr, .. }), _) => {
                assert!(matches!(expr.as_ref(), Expr::Await { .. }));
            }
            other => panic!("expected a cast-wrapped await return, got {:?}", other),
        }
    }

    #[test]
    fn async_callee_is_not_a_candidate() {
        let g = FunctionDecl { name: ident("g"), params: vec![], return_type: TypeExpr::opaque("void"), body: None, attrs: FnAttrs::ASYNC, span: sp(0, 1) };
        let body = vec![Stmt::Expr(Expr::Call { callee: Box::new(Expr::Ident(ident("g"))), args: vec![], span: sp(0, 1) }, sp(0, 1))];
        let f = FunctionDecl { name: ident("f"), params: vec![], return_type: TypeExpr::opaque("void"), body: Some(body), attrs: FnAttrs::ASYNC, span: sp(0, 1) };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(g), Item::Function(f)]);
        let res = run(&mut file);
        assert!(res.is_ok());
        let lowered = match &file.items[1] {
            Item::Function(f) => f.body.as_ref().unwrap(),
            _ => unreachable!(),
        };
        assert!(matches!(&lowered[0], Stmt::Expr(Expr::Call { .. }, _)), "an async callee must not be wrapped");
    }

    #[test]
    fn channel_primitive_under_await_is_still_batched() {
        // @async void f(int ch) { await chan_recv(ch); }
        let call = Expr::Call { callee: Box::new(Expr::Ident(ident(runtime::CHAN_RECV))), args: vec![Expr::Ident(ident("ch"))], span: sp(0, 1) };
        let awaited = Expr::Await { expr: Box::new(call), span: sp(0, 1) };
        let body = vec![Stmt::Expr(awaited, sp(0, 1))];
        let f = FunctionDecl { name: ident("f"), params: vec![], return_type: TypeExpr::opaque("void"), body: Some(body), attrs: FnAttrs::ASYNC, span: sp(0, 1) };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f)]);
        let res = run(&mut file);
        assert!(res.is_ok(), "{:?}", res.errors);

        let lowered = match &file.items[0] {
            Item::Function(f) => f.body.as_ref().unwrap(),
            _ => unreachable!(),
        };
        // one temp decl for chan_recv's sole argument, plus the dispatch await.
        assert_eq!(lowered.len(), 2);
        assert!(matches!(&lowered[0], Stmt::Decl(_)));
        match &lowered[1] {
            Stmt::Expr(Expr::Await { expr, .. }, _) => {
                assert!(matches!(expr.as_ref(), Expr::Call { callee, .. } if matches!(callee.as_ref(), Expr::Ident(n) if n.as_str() == runtime::RUN_BLOCKING_TASK_INTPTR)));
            }
            other => panic!("expected the channel-primitive await to be rewound into a blocking dispatch, got {:?}", other),
        }
    }
}
