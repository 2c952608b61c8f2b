//! Replaces every `@async` function body with a polled state machine:
//! a frame struct, a poll function, a drop function, an optional wait
//! function, and a constructor with the original signature that
//! returns a task handle.
//!
//! Runs after the auto-blocking pass, so every `await` operand already
//! evaluates to a task-typed expression — either a direct call to
//! another `@async` function (whose constructor already returns a
//! task) or the blocking-dispatch call the auto-blocking pass
//! synthesized. This pass never has to tell those two cases apart.
//!
//! Unlike a textual one-pass lowering, state ids here are plain Rust
//! values computed by a recursive descent that knows a branch's join
//! state before emitting the branch — there is no after-the-fact patch
//! of a fixed-width field in a text buffer. Every state transition is
//! an explicit `frame->state = N; continue;` rather than relying on
//! `case` labels falling through in textual order, so case emission
//! order never has to match control-flow order.
//!
//! Supported body shapes are a conservative subset (see `lower_stmt`);
//! anything wider fails the whole function with
//! `CompileError::UnsupportedAsyncConstruct` and leaves the function's
//! text untouched, per the function-at-a-time fallback this pass is
//! built around.
//!
//! Every poll call checks `cc_deadline_expired()` before touching the
//! frame's state: a `with_deadline` scope higher up the call stack may
//! have expired between two polls, and a state machine has no other
//! chance to notice short of being polled again.
//!
//! The stack of enclosing loops `break`/`continue` resolve against is
//! bounded at `MAX_LOOP_DEPTH`, the same fixed-resource-limit shape
//! `MAX_TASK_SLOTS` uses for outstanding awaits: a function nesting
//! loops past the bound fails with `CompileError::UnsupportedAsyncConstruct`
//! rather than growing the stack without limit.

use crate::ast::ty::{CapturedType, TypeExpr};
use crate::ast::{BinOp, Fixity, FnAttrs, FunctionDecl, Item, Stmt, UnOp};
use crate::error::{err, ok, CompileError, CompileResult, CompileWarning};
use crate::runtime;
use crate::span::Span;
use crate::strset::StringSet;

use crate::ast::Expr;

const DONE_STATE: u32 = 999_999_999;
const MAX_TASK_SLOTS: u32 = 16;
const MAX_LOOP_DEPTH: usize = 64;

pub fn run(file: &mut crate::ast::File) -> CompileResult<()> {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for item in &mut file.items {
        if let Item::Function(f) = item {
            if !f.attrs.contains(FnAttrs::ASYNC) {
                continue;
            }
            match render(f) {
                Ok(text) => *item = Item::Verbatim(text, f.span),
                Err((what, span)) => errors.push(CompileError::UnsupportedAsyncConstruct { what, span }),
            }
        }
    }

    if errors.is_empty() {
        ok((), warnings, errors)
    } else {
        err(warnings, errors)
    }
}

struct Local {
    name: String,
    ty_text: String,
}

struct Builder {
    fn_name: String,
    cases: Vec<(u32, String)>,
    next_state: u32,
    next_task_slot: u32,
    task_fields: Vec<u32>,
}

impl Builder {
    fn fresh_state(&mut self) -> u32 {
        let id = self.next_state;
        self.next_state += 1;
        id
    }

    fn fresh_task_slot(&mut self, span: Span) -> Result<u32, (String, Span)> {
        if self.next_task_slot >= MAX_TASK_SLOTS {
            return Err((format!("more than {} outstanding awaits in one function", MAX_TASK_SLOTS), span));
        }
        let id = self.next_task_slot;
        self.next_task_slot += 1;
        self.task_fields.push(id);
        Ok(id)
    }

    fn push(&mut self, state: u32, text: String) {
        self.cases.push((state, text));
    }
}

fn is_hoistable_type(ty: &TypeExpr) -> bool {
    matches!(CapturedType::classify(&ty.text), Some(CapturedType::Integer))
}

fn collect_locals(stmts: &[Stmt], out: &mut Vec<Local>) -> Result<(), (String, Span)> {
    for stmt in stmts {
        match stmt {
            Stmt::Decl(d) => {
                let ty = d.ty.as_ref().ok_or_else(|| ("local declaration with no written type".to_string(), d.span))?;
                if !is_hoistable_type(ty) {
                    return Err((format!("local \"{}\" has a non-integer-sized type", d.name.as_str()), d.span));
                }
                if out.iter().any(|l| l.name == d.name.as_str()) {
                    return Err((format!("local \"{}\" redeclared; the frame is a flat namespace", d.name.as_str()), d.span));
                }
                out.push(Local { name: d.name.as_str().to_string(), ty_text: ty.text.clone() });
            }
            Stmt::Block(v, _) => collect_locals(v, out)?,
            Stmt::If { then_branch, else_branch, .. } => {
                collect_locals(std::slice::from_ref(then_branch.as_ref()), out)?;
                if let Some(e) = else_branch {
                    collect_locals(std::slice::from_ref(e.as_ref()), out)?;
                }
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    collect_locals(std::slice::from_ref(init.as_ref()), out)?;
                }
                collect_locals(std::slice::from_ref(body.as_ref()), out)?;
            }
            Stmt::While { body, .. } => collect_locals(std::slice::from_ref(body.as_ref()), out)?,
            Stmt::Expr(..) | Stmt::Return(..) | Stmt::Break(_) | Stmt::Continue(_) => {}
            other => return Err(("unsupported statement inside an async body".to_string(), other.span())),
        }
    }
    Ok(())
}

fn contains_await(e: &Expr) -> bool {
    match e {
        Expr::Await { .. } => true,
        Expr::Call { callee, args, .. } => contains_await(callee) || args.iter().any(contains_await),
        Expr::Field { base, .. } => contains_await(base),
        Expr::Index { base, index, .. } => contains_await(base) || contains_await(index),
        Expr::Binary { lhs, rhs, .. } => contains_await(lhs) || contains_await(rhs),
        Expr::Unary { expr, .. } => contains_await(expr),
        Expr::Cast { expr, .. } => contains_await(expr),
        _ => false,
    }
}

fn binop_text(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Assign => "=",
        BinOp::Comma => ",",
    }
}

fn print_expr(e: &Expr, frame_vars: &StringSet) -> Result<String, (String, Span)> {
    if contains_await(e) && !matches!(e, Expr::Await { .. }) {
        return Err(("\"await\" nested inside a larger expression is not supported here".to_string(), e.span()));
    }
    match e {
        Expr::Ident(i) => Ok(if frame_vars.contains(i.as_str()) { format!("frame->{}", i.as_str()) } else { i.as_str().to_string() }),
        Expr::IntLiteral { value, .. } => Ok(value.to_string()),
        Expr::StringLiteral { value, .. } => Ok(format!("{:?}", value)),
        Expr::Call { callee, args, .. } => {
            let callee_text = print_expr(callee, frame_vars)?;
            let mut arg_texts = Vec::with_capacity(args.len());
            for a in args {
                arg_texts.push(print_expr(a, frame_vars)?);
            }
            Ok(format!("{}({})", callee_text, arg_texts.join(", ")))
        }
        Expr::Field { base, name, arrow, .. } => {
            Ok(format!("{}{}{}", print_expr(base, frame_vars)?, if *arrow { "->" } else { "." }, name.as_str()))
        }
        Expr::Index { base, index, .. } => Ok(format!("{}[{}]", print_expr(base, frame_vars)?, print_expr(index, frame_vars)?)),
        Expr::Binary { op, lhs, rhs, .. } => Ok(format!("({} {} {})", print_expr(lhs, frame_vars)?, binop_text(*op), print_expr(rhs, frame_vars)?)),
        Expr::Unary { op, fixity, expr, .. } => {
            let inner = print_expr(expr, frame_vars)?;
            let sym = match op {
                UnOp::Neg => "-",
                UnOp::Not => "!",
                UnOp::BitNot => "~",
                UnOp::Deref => "*",
                UnOp::AddrOf => "&",
                UnOp::PreIncr | UnOp::PostIncr => "++",
                UnOp::PreDecr | UnOp::PostDecr => "--",
            };
            Ok(match fixity {
                Fixity::Prefix => format!("({}{})", sym, inner),
                Fixity::Postfix => format!("({}{})", inner, sym),
            })
        }
        Expr::Cast { ty, expr, .. } => Ok(format!("(({}){})", ty.text, print_expr(expr, frame_vars)?)),
        other => Err(("unsupported expression form inside an async body".to_string(), other.span())),
    }
}

/// Emits the dispatch + poll pair for one `await expr`, returning the
/// printed (already frame-rewritten) value the awaited expression
/// produced. Advances `cur` to the poll state on return; the caller
/// still owns deciding what state runs after the value is available.
fn lower_await(b: &mut Builder, inner: &Expr, frame_vars: &StringSet, cur: &mut u32, span: Span) -> Result<String, (String, Span)> {
    let task_slot = b.fresh_task_slot(span)?;
    let poll_state = b.fresh_state();
    let dispatch_expr = print_expr(inner, frame_vars)?;

    b.push(
        *cur,
        format!(
            "    {{\n      {ty} __cc_task = {expr};\n      frame->__cc_task_{slot} = __cc_task;\n      frame->state = {poll};\n      return {pending};\n    }}\n",
            ty = runtime::TASK_INTPTR_TYPE,
            expr = dispatch_expr,
            slot = task_slot,
            poll = poll_state,
            pending = runtime::STATUS_PENDING,
        ),
    );

    let value_var = format!("__cc_value_{}", poll_state);
    b.push(
        poll_state,
        format!(
            "    intptr_t {value_var} = 0;\n    int __cc_err_{slot} = 0;\n    {status} __cc_poll_st_{slot} = {poll_fn}(&frame->__cc_task_{slot}, &{value_var}, &__cc_err_{slot});\n    if (__cc_poll_st_{slot} == {pending}) {{ return {pending}; }}\n    if (__cc_poll_st_{slot} == {errst}) {{ *out_error = __cc_err_{slot}; frame->state = {done}; return {errst}; }}\n",
            value_var = value_var,
            slot = task_slot,
            status = runtime::FUTURE_STATUS_TYPE,
            poll_fn = runtime::TASK_INTPTR_POLL,
            pending = runtime::STATUS_PENDING,
            errst = runtime::STATUS_ERR,
            done = DONE_STATE,
        ),
    );

    *cur = poll_state;
    Ok(value_var)
}

struct LoopTarget {
    continue_state: u32,
    break_state: u32,
}

/// Pushes one nesting level onto the enclosing-loop stack, rejecting
/// the function once it goes past the documented 64-deep bound the
/// same way `fresh_task_slot` rejects a function with too many
/// outstanding awaits.
fn push_loop(loops: &mut Vec<LoopTarget>, target: LoopTarget, span: Span) -> Result<(), (String, Span)> {
    if loops.len() >= MAX_LOOP_DEPTH {
        return Err((format!("more than {} nested loops in one async function", MAX_LOOP_DEPTH), span));
    }
    loops.push(target);
    Ok(())
}

fn lower_stmts(
    b: &mut Builder,
    stmts: &[Stmt],
    mut cur: u32,
    exit: u32,
    frame_vars: &StringSet,
    loops: &mut Vec<LoopTarget>,
) -> Result<(), (String, Span)> {
    for stmt in stmts {
        cur = lower_stmt(b, stmt, cur, exit, frame_vars, loops)?;
    }
    b.push(cur, format!("    frame->state = {};\n    continue;\n", exit));
    Ok(())
}

/// Lowers one statement, appending generated text at state `cur`, and
/// returns the state subsequent statements in the same list should be
/// appended to (usually `cur` itself, unless this statement opened a
/// new suspension or branch).
fn lower_stmt(
    b: &mut Builder,
    stmt: &Stmt,
    cur: u32,
    exit: u32,
    frame_vars: &StringSet,
    loops: &mut Vec<LoopTarget>,
) -> Result<u32, (String, Span)> {
    match stmt {
        Stmt::Decl(d) => {
            match &d.init {
                Some(Expr::Await { expr, .. }) => {
                    let mut cur = cur;
                    let value_var = lower_await(b, expr, frame_vars, &mut cur, d.span)?;
                    b.push(cur, format!("    frame->{} = {};\n", d.name.as_str(), value_var));
                    Ok(cur)
                }
                Some(e) => {
                    let text = print_expr(e, frame_vars)?;
                    b.push(cur, format!("    frame->{} = {};\n", d.name.as_str(), text));
                    Ok(cur)
                }
                None => Ok(cur),
            }
        }
        Stmt::Expr(Expr::Await { expr, .. }, span) => {
            let mut cur = cur;
            let _ = lower_await(b, expr, frame_vars, &mut cur, *span)?;
            Ok(cur)
        }
        Stmt::Expr(Expr::Binary { op: BinOp::Assign, lhs, rhs, span }, _) => match rhs.as_ref() {
            Expr::Await { expr, .. } => {
                let mut cur = cur;
                let value_var = lower_await(b, expr, frame_vars, &mut cur, *span)?;
                let lhs_text = print_expr(lhs, frame_vars)?;
                b.push(cur, format!("    {} = {};\n", lhs_text, value_var));
                Ok(cur)
            }
            _ => {
                let text = print_expr(stmt_expr(stmt), frame_vars)?;
                b.push(cur, format!("    {};\n", text));
                Ok(cur)
            }
        },
        Stmt::Expr(e, _) => {
            let text = print_expr(e, frame_vars)?;
            b.push(cur, format!("    {};\n", text));
            Ok(cur)
        }
        Stmt::Return(None, span) => {
            let _ = span;
            b.push(cur, format!("    *out_value = 0;\n    frame->state = {};\n    return {};\n", DONE_STATE, runtime::STATUS_READY));
            Ok(cur)
        }
        Stmt::Return(Some(Expr::Await { expr, .. }), span) => {
            let mut cur = cur;
            let value_var = lower_await(b, expr, frame_vars, &mut cur, *span)?;
            b.push(cur, format!("    *out_value = {};\n    frame->state = {};\n    return {};\n", value_var, DONE_STATE, runtime::STATUS_READY));
            Ok(cur)
        }
        Stmt::Return(Some(e), _) => {
            let text = print_expr(e, frame_vars)?;
            b.push(cur, format!("    *out_value = (intptr_t)({});\n    frame->state = {};\n    return {};\n", text, DONE_STATE, runtime::STATUS_READY));
            Ok(cur)
        }
        Stmt::Break(span) => {
            let target = loops.last().ok_or_else(|| ("\"break\" outside any loop".to_string(), *span))?.break_state;
            b.push(cur, format!("    frame->state = {};\n    continue;\n", target));
            Ok(b.fresh_state())
        }
        Stmt::Continue(span) => {
            let target = loops.last().ok_or_else(|| ("\"continue\" outside any loop".to_string(), *span))?.continue_state;
            b.push(cur, format!("    frame->state = {};\n    continue;\n", target));
            Ok(b.fresh_state())
        }
        Stmt::If { cond, then_branch, else_branch, span } => {
            if contains_await(cond) {
                return Err(("\"await\" inside an if-condition is not supported".to_string(), *span));
            }
            let else_branch = else_branch.as_ref().ok_or_else(|| ("\"if\" without an \"else\" inside an async body".to_string(), *span))?;
            let cond_text = print_expr(cond, frame_vars)?;
            let then_state = b.fresh_state();
            let else_state = b.fresh_state();
            b.push(
                cur,
                format!(
                    "    if ({}) {{ frame->state = {}; }} else {{ frame->state = {}; }}\n    continue;\n",
                    cond_text, then_state, else_state
                ),
            );
            lower_stmts(b, std::slice::from_ref(then_branch.as_ref()), then_state, exit, frame_vars, loops)?;
            lower_stmts(b, std::slice::from_ref(else_branch.as_ref()), else_state, exit, frame_vars, loops)?;
            Ok(b.fresh_state())
        }
        Stmt::While { cond, body, span } => {
            if contains_await(cond) {
                return Err(("\"await\" inside a while-condition is not supported".to_string(), *span));
            }
            let head_state = b.fresh_state();
            let body_state = b.fresh_state();
            b.push(cur, format!("    frame->state = {};\n    continue;\n", head_state));
            let cond_text = print_expr(cond, frame_vars)?;
            b.push(
                head_state,
                format!("    if ({}) {{ frame->state = {}; }} else {{ frame->state = {}; }}\n    continue;\n", cond_text, body_state, exit),
            );
            push_loop(loops, LoopTarget { continue_state: head_state, break_state: exit }, *span)?;
            lower_stmts(b, std::slice::from_ref(body.as_ref()), body_state, head_state, frame_vars, loops)?;
            loops.pop();
            Ok(b.fresh_state())
        }
        Stmt::For { init, cond, post, body, span } => {
            let mut cur_after_init = cur;
            if let Some(init) = init {
                cur_after_init = lower_stmt(b, init, cur_after_init, exit, frame_vars, loops)?;
            }
            let head_state = b.fresh_state();
            let body_state = b.fresh_state();
            let post_state = b.fresh_state();
            b.push(cur_after_init, format!("    frame->state = {};\n    continue;\n", head_state));
            let cond_text = match cond {
                Some(c) => {
                    if contains_await(c) {
                        return Err(("\"await\" inside a for-condition is not supported".to_string(), *span));
                    }
                    print_expr(c, frame_vars)?
                }
                None => "1".to_string(),
            };
            b.push(
                head_state,
                format!("    if ({}) {{ frame->state = {}; }} else {{ frame->state = {}; }}\n    continue;\n", cond_text, body_state, exit),
            );
            push_loop(loops, LoopTarget { continue_state: post_state, break_state: exit }, *span)?;
            lower_stmts(b, std::slice::from_ref(body.as_ref()), body_state, post_state, frame_vars, loops)?;
            loops.pop();
            match post {
                Some(p) => {
                    if contains_await(p) {
                        return Err(("\"await\" inside a for-post-expression is not supported".to_string(), *span));
                    }
                    let text = print_expr(p, frame_vars)?;
                    b.push(post_state, format!("    {};\n    frame->state = {};\n    continue;\n", text, head_state));
                }
                None => b.push(post_state, format!("    frame->state = {};\n    continue;\n", head_state)),
            }
            Ok(b.fresh_state())
        }
        Stmt::Block(v, _) => {
            lower_stmts(b, v, cur, exit, frame_vars, loops)?;
            Ok(b.fresh_state())
        }
        other => Err(("unsupported statement inside an async body".to_string(), other.span())),
    }
}

fn stmt_expr(stmt: &Stmt) -> &Expr {
    match stmt {
        Stmt::Expr(e, _) => e,
        _ => unreachable!("stmt_expr called on a non-expression statement"),
    }
}

fn render(f: &FunctionDecl) -> Result<String, (String, Span)> {
    let body = f.body.as_ref().ok_or_else(|| ("\"@async\" function has no body (prototype only)".to_string(), f.span))?;

    for p in &f.params {
        if !is_hoistable_type(&p.ty) {
            return Err((format!("parameter \"{}\" has a non-integer-sized type", p.name.as_str()), f.span));
        }
    }

    let mut locals = Vec::new();
    collect_locals(body, &mut locals)?;

    let mut frame_vars = StringSet::new();
    for p in &f.params {
        frame_vars.insert(p.name.as_str().to_string());
    }
    for l in &locals {
        frame_vars.insert(l.name.clone());
    }

    let mut b = Builder { fn_name: f.name.as_str().to_string(), cases: Vec::new(), next_state: 1, next_task_slot: 0, task_fields: Vec::new() };
    let mut loops = Vec::new();
    lower_stmts(&mut b, body, 1, DONE_STATE, &frame_vars, &mut loops)?;

    Ok(emit(&b, f, &locals))
}

fn emit(b: &Builder, f: &FunctionDecl, locals: &[Local]) -> String {
    let frame_ty = format!("struct __CCFrame_{}", b.fn_name);
    let mut out = String::new();

    out.push_str(&format!("{} {{\n", frame_ty));
    out.push_str("    unsigned int state;\n");
    for p in &f.params {
        out.push_str(&format!("    {} {};\n", p.ty.text, p.name.as_str()));
    }
    for l in locals {
        out.push_str(&format!("    {} {};\n", l.ty_text, l.name));
    }
    for slot in &b.task_fields {
        out.push_str(&format!("    {} __cc_task_{};\n", runtime::TASK_INTPTR_TYPE, slot));
    }
    out.push_str("};\n\n");

    out.push_str(&format!(
        "static {future_status_ty} __cc_poll_{name}({frame_ty} *frame, intptr_t *out_value, int *out_error) {{\n    for (;;) {{\n        if (frame->state != {done} && {expired}()) {{\n            *out_error = 0;\n            frame->state = {done};\n            return {errst};\n        }}\n        switch (frame->state) {{\n        case 0:\n            frame->state = 1;\n            continue;\n",
        future_status_ty = runtime::FUTURE_STATUS_TYPE,
        name = b.fn_name,
        frame_ty = frame_ty,
        done = DONE_STATE,
        expired = runtime::DEADLINE_EXPIRED,
        errst = runtime::STATUS_ERR,
    ));

    let mut sorted: Vec<&(u32, String)> = b.cases.iter().collect();
    sorted.sort_by_key(|(id, _)| *id);
    let mut seen = std::collections::BTreeMap::new();
    for (id, text) in sorted {
        seen.entry(*id).or_insert_with(String::new).push_str(text);
    }
    for (id, text) in &seen {
        out.push_str(&format!("        case {}:\n{}", id, text));
    }
    out.push_str(&format!(
        "        case {done}:\n            return {ready};\n        default:\n            *out_error = 0;\n            return {errst};\n        }}\n    }}\n}}\n\n",
        done = DONE_STATE,
        ready = runtime::STATUS_READY,
        errst = runtime::STATUS_ERR,
    ));

    out.push_str(&format!("static void __cc_drop_{name}({frame_ty} *frame) {{\n", name = b.fn_name, frame_ty = frame_ty));
    for slot in &b.task_fields {
        out.push_str(&format!("    if (frame->state != {} && frame->state != 0) {{ {}(&frame->__cc_task_{}); }}\n", DONE_STATE, runtime::TASK_INTPTR_FREE, slot));
    }
    out.push_str("    free(frame);\n}\n\n");

    out.push_str(&format!(
        "static {future_status_ty} __cc_wait_{name}({frame_ty} *frame) {{\n    if (frame->state == {done} || frame->state == 0) {{ return {ready}; }}\n",
        future_status_ty = runtime::FUTURE_STATUS_TYPE,
        name = b.fn_name,
        frame_ty = frame_ty,
        done = DONE_STATE,
        ready = runtime::STATUS_READY,
    ));
    if let Some(first_slot) = b.task_fields.first() {
        out.push_str(&format!("    return {}(&frame->__cc_task_{});\n", runtime::TASK_INTPTR_POLL.replace("poll", "wait"), first_slot));
    } else {
        out.push_str(&format!("    return {};\n", runtime::STATUS_READY));
    }
    out.push_str("}\n\n");

    let param_list = f
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty.text, p.name.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!(
        "{task_ty} {name}({params}) {{\n    {frame_ty} *frame = ({frame_ty}*)malloc(sizeof({frame_ty}));\n    frame->state = 0;\n",
        task_ty = runtime::TASK_INTPTR_TYPE,
        name = f.name.as_str(),
        params = param_list,
        frame_ty = frame_ty,
    ));
    for p in &f.params {
        out.push_str(&format!("    frame->{0} = {0};\n", p.name.as_str()));
    }
    out.push_str(&format!(
        "    return {make}((void*)__cc_poll_{name}, (void*)__cc_wait_{name}, (void*)frame, (void*)__cc_drop_{name});\n}}\n",
        make = runtime::TASK_INTPTR_MAKE_POLL_EX,
        name = b.fn_name,
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ty::TypeExpr;
    use crate::ast::{File, Item, Param};
    use crate::ident::Ident;
    use crate::span::FileId;

    fn sp(a: u32, b: u32) -> Span {
        Span::new(FileId(0), a, b)
    }

    fn ident(name: &str) -> Ident {
        Ident::new(name, sp(0, 1))
    }

    #[test]
    fn one_await_produces_a_frame_and_poll_function() {
        // @async int f(int n) { int k = await g(n); return k + 1; }
        let body = vec![
            Stmt::Decl(crate::ast::Decl {
                name: ident("k"),
                ty: Some(TypeExpr::opaque("int")),
                init: Some(Expr::Await {
                    expr: Box::new(Expr::Call { callee: Box::new(Expr::Ident(ident("g"))), args: vec![Expr::Ident(ident("n"))], span: sp(0, 1) }),
                    span: sp(0, 1),
                }),
                span: sp(0, 1),
            }),
            Stmt::Return(
                Some(Expr::Binary { op: BinOp::Add, lhs: Box::new(Expr::Ident(ident("k"))), rhs: Box::new(Expr::IntLiteral { value: 1, span: sp(0, 1) }), span: sp(0, 1) }),
                sp(0, 1),
            ),
        ];
        let f = FunctionDecl {
            name: ident("f"),
            params: vec![Param { name: ident("n"), ty: TypeExpr::opaque("int") }],
            return_type: TypeExpr::opaque("int"),
            body: Some(body),
            attrs: FnAttrs::ASYNC,
            span: sp(0, 1),
        };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f)]);
        let res = run(&mut file);
        assert!(res.is_ok(), "{:?}", res.errors);
        match &file.items[0] {
            Item::Verbatim(text, _) => {
                assert!(text.contains("struct __CCFrame_f"));
                assert!(text.contains("__cc_poll_f"));
                assert!(text.contains("CCTaskIntptr __cc_task_0"));
                assert!(text.contains("cc_deadline_expired()"), "poll function must short-circuit on an expired deadline");
            }
            other => panic!("expected the async function to lower into verbatim C text, got {:?}", other),
        }
    }

    #[test]
    fn more_than_max_loop_depth_nested_whiles_is_rejected() {
        let mut body = Stmt::Break(sp(0, 1));
        for _ in 0..(MAX_LOOP_DEPTH + 1) {
            body = Stmt::While { cond: Expr::IntLiteral { value: 1, span: sp(0, 1) }, body: Box::new(body), span: sp(0, 1) };
        }
        let f = FunctionDecl { name: ident("f"), params: vec![], return_type: TypeExpr::opaque("void"), body: Some(vec![body]), attrs: FnAttrs::ASYNC, span: sp(0, 1) };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f)]);
        let res = run(&mut file);
        assert!(!res.is_ok());
        match &res.errors[0] {
            CompileError::UnsupportedAsyncConstruct { what, .. } => assert!(what.contains("nested loops")),
            other => panic!("expected an unsupported-async-construct error, got {:?}", other),
        }
    }

    #[test]
    fn if_without_else_is_unsupported() {
        let body = vec![Stmt::If {
            cond: Expr::IntLiteral { value: 1, span: sp(0, 1) },
            then_branch: Box::new(Stmt::Return(None, sp(0, 1))),
            else_branch: None,
            span: sp(0, 1),
        }];
        let f = FunctionDecl { name: ident("f"), params: vec![], return_type: TypeExpr::opaque("void"), body: Some(body), attrs: FnAttrs::ASYNC, span: sp(0, 1) };
        let mut file = File::new("t.ccs", FileId(0), vec![Item::Function(f)]);
        let res = run(&mut file);
        assert!(!res.is_ok());
        assert!(matches!(res.errors[0], CompileError::UnsupportedAsyncConstruct { .. }));
    }
}
