//! Prints the final, fully-lowered tree as plain C.
//!
//! By the time a file reaches this module every CC-specific node has
//! already been rewritten away by the passes in `passes::`: closures
//! are `make` calls plus a side table, nurseries and spawns are
//! open/close/submit blocks, `@async` functions are `Item::Verbatim`
//! text, and `try`/`@match`/`with_deadline`/sum-type syntax are gone.
//! What's left is an ordinary (if still tagged-variant) C tree, so this
//! module is a straightforward recursive printer rather than another
//! lowering pass. The two constructs it still actively compiles —
//! `defer` and, defensively, a stray nursery/spawn — are handled here
//! rather than by a dedicated pass; see `DESIGN.md` for why.

use crate::ast::ty::TypeExpr;
use crate::ast::{BinOp, Decl, EnumDecl, Expr, Fixity, File, FunctionDecl, Item, RecordDecl, Stmt, UnOp};
use crate::error::{ok, CompileError, CompileResult};
use crate::ident::Ident;
use crate::runtime;
use crate::source_map::SourceMap;

/// Per-file emission state: the defer-cleanup helper functions
/// synthesized while printing statements, and the nursery-handle stack
/// used only by the fallback nursery/spawn expansion (the normal path
/// never populates it, since `passes::concurrency` has already turned
/// every nursery and spawn into plain calls by the time this runs).
struct EmitCtx<'a> {
    sources: &'a SourceMap,
    defer_helpers: Vec<String>,
    next_defer_id: u32,
    nursery_stack: Vec<String>,
    next_nursery_id: u32,
}

/// Emits one file as a complete C translation unit: the runtime meta
/// include, any synthesized defer-cleanup helpers, every top-level
/// item in source order with `#line` directives restoring the
/// original file's coordinates, and finally the closure definitions
/// section under its own synthetic `#line`.
pub fn emit_file(file: &File, sources: &SourceMap) -> CompileResult<String> {
    let mut ctx = EmitCtx { sources, defer_helpers: Vec::new(), next_defer_id: 0, nursery_stack: Vec::new(), next_nursery_id: 0 };
    let mut errors = Vec::new();
    let warnings = Vec::new();

    let mut body = String::new();
    for item in &file.items {
        if let Item::Include { path, .. } = item {
            if is_runtime_include(path) {
                continue;
            }
        }
        body.push_str(&line_directive(sources, item.span()));
        match print_item(item, &mut ctx) {
            Ok(text) => {
                body.push_str(&text);
                body.push('\n');
            }
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return crate::error::err(warnings, errors);
    }

    let mut out = String::new();
    out.push_str(&format!("#include \"{}\"\n\n", runtime::META_INCLUDE));
    if !ctx.defer_helpers.is_empty() {
        out.push_str(&ctx.defer_helpers.join("\n"));
        out.push('\n');
    }
    out.push_str(&body);

    if !file.closures.is_empty() {
        out.push_str("#line \"<cc-generated:closures>\"\n");
        for def in file.closures.iter() {
            out.push_str(&emit_closure_def(def, &mut ctx));
            out.push('\n');
        }
        out.push_str(&format!("#line 1 \"{}\"\n", file.filename));
    }

    ok(out, warnings, errors)
}

fn is_runtime_include(path: &str) -> bool {
    path == runtime::META_INCLUDE || path.starts_with("cc_")
}

fn line_directive(sources: &SourceMap, span: crate::span::Span) -> String {
    if span.is_empty() {
        return String::new();
    }
    let lc = sources.span_start(span);
    format!("#line {} \"{}\"\n", lc.line, sources.path(span.file).display())
}

/// Strips the compiler's own internal marker types out of written type
/// text before it reaches the output: `struct <anonymous>` (the
/// parser's placeholder for a tag-less struct) becomes `auto`, and the
/// reserved internal-placeholder marker becomes a plain `void*` since
/// nothing downstream of this crate understands it.
fn clean_type_text(text: &str) -> String {
    let t = text.trim();
    if t == "struct <anonymous>" {
        return "auto".to_string();
    }
    if t == runtime::INTERNAL_PLACEHOLDER_TYPE {
        return "void*".to_string();
    }
    t.to_string()
}

fn print_type(ty: &TypeExpr) -> String {
    clean_type_text(&ty.text)
}

fn print_item(item: &Item, ctx: &mut EmitCtx) -> Result<String, CompileError> {
    match item {
        Item::Function(f) => print_function(f, ctx),
        Item::Typedef { name, ty, .. } => Ok(format!("typedef {} {};", print_type(ty), name.as_str())),
        Item::Struct(r) => print_record("struct", r, ctx),
        Item::Union(r) => print_record("union", r, ctx),
        Item::Enum(e) => Ok(print_enum(e)),
        Item::Include { path, system, .. } => {
            Ok(if *system { format!("#include <{}>", path) } else { format!("#include \"{}\"", path) })
        }
        Item::Verbatim(text, _) => Ok(text.clone()),
    }
}

fn print_record(kind: &str, r: &RecordDecl, _ctx: &mut EmitCtx) -> Result<String, CompileError> {
    let mut out = String::new();
    out.push_str(kind);
    if let Some(name) = &r.name {
        out.push(' ');
        out.push_str(name.as_str());
    }
    out.push_str(" {\n");
    for field in &r.fields {
        out.push_str(&format!("    {} {};\n", print_type(&field.ty), field.name.as_str()));
    }
    out.push_str("};");
    Ok(out)
}

fn print_enum(e: &EnumDecl) -> String {
    let mut out = String::new();
    out.push_str("enum");
    if let Some(name) = &e.name {
        out.push(' ');
        out.push_str(name.as_str());
    }
    out.push_str(" {\n");
    let variants: Vec<String> = e
        .variants
        .iter()
        .map(|v| match v.value {
            Some(n) => format!("    {} = {}", v.name.as_str(), n),
            None => format!("    {}", v.name.as_str()),
        })
        .collect();
    out.push_str(&variants.join(",\n"));
    out.push_str("\n};");
    out
}

fn print_function(f: &FunctionDecl, ctx: &mut EmitCtx) -> Result<String, CompileError> {
    let params = if f.params.is_empty() {
        "void".to_string()
    } else {
        f.params.iter().map(|p| format!("{} {}", print_type(&p.ty), p.name.as_str())).collect::<Vec<_>>().join(", ")
    };
    let signature = format!("{} {}({})", print_type(&f.return_type), f.name.as_str(), params);

    match &f.body {
        None => Ok(format!("{};", signature)),
        Some(body) => {
            let mut out = String::new();
            out.push_str(&signature);
            out.push_str(" {\n");
            for stmt in body {
                out.push_str(&print_stmt(stmt, ctx, 1)?);
            }
            out.push_str("}\n");
            Ok(out)
        }
    }
}

fn indent(level: usize) -> String {
    "    ".repeat(level)
}

fn print_stmt(stmt: &Stmt, ctx: &mut EmitCtx, level: usize) -> Result<String, CompileError> {
    let pad = indent(level);
    Ok(match stmt {
        Stmt::Block(stmts, _) => {
            let mut out = format!("{}{{\n", pad);
            for s in stmts {
                out.push_str(&print_stmt(s, ctx, level + 1)?);
            }
            out.push_str(&format!("{}}}\n", pad));
            out
        }
        Stmt::Expr(e, _) => format!("{}{};\n", pad, print_expr(e)?),
        Stmt::Decl(d) => format!("{}{};\n", pad, print_decl(d)?),
        Stmt::Return(None, _) => format!("{}return;\n", pad),
        Stmt::Return(Some(e), _) => format!("{}return {};\n", pad, print_expr(e)?),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            let mut out = format!("{}if ({}) {{\n", pad, print_expr(cond)?);
            out.push_str(&print_stmt(then_branch, ctx, level + 1)?);
            out.push_str(&format!("{}}}", pad));
            if let Some(e) = else_branch {
                out.push_str(" else {\n");
                out.push_str(&print_stmt(e, ctx, level + 1)?);
                out.push_str(&format!("{}}}", pad));
            }
            out.push('\n');
            out
        }
        Stmt::For { init, cond, post, body, .. } => {
            let init_text = match init {
                Some(s) => print_stmt(s, ctx, 0)?.trim_end().trim_end_matches(';').to_string(),
                None => String::new(),
            };
            let cond_text = match cond {
                Some(e) => print_expr(e)?,
                None => String::new(),
            };
            let post_text = match post {
                Some(e) => print_expr(e)?,
                None => String::new(),
            };
            let mut out = format!("{}for ({}; {}; {}) {{\n", pad, init_text, cond_text, post_text);
            out.push_str(&print_stmt(body, ctx, level + 1)?);
            out.push_str(&format!("{}}}\n", pad));
            out
        }
        Stmt::While { cond, body, .. } => {
            let mut out = format!("{}while ({}) {{\n", pad, print_expr(cond)?);
            out.push_str(&print_stmt(body, ctx, level + 1)?);
            out.push_str(&format!("{}}}\n", pad));
            out
        }
        Stmt::Break(_) => format!("{}break;\n", pad),
        Stmt::Continue(_) => format!("{}continue;\n", pad),
        Stmt::Defer { stmt, .. } => print_defer(stmt, ctx, level)?,
        Stmt::Nursery { body, span } => print_nursery_fallback(body, ctx, level, *span)?,
        Stmt::Spawn { expr, span } => print_spawn_fallback(expr, ctx, level, *span)?,
        Stmt::Verbatim(text, _) => format!("{}{}\n", pad, text),
        Stmt::Match { span, .. } | Stmt::WithDeadline { span, .. } => {
            return Err(CompileError::Internal {
                message: "match/with_deadline survived to emission; passes::small should have lowered it".to_string(),
                span: *span,
            });
        }
    })
}

/// `defer stmt;` compiles to a scope guard: a zero-sized variable
/// whose cleanup attribute runs a hoisted helper function when control
/// leaves the enclosing block, by any path — normal fallthrough,
/// `return`, `break`, `continue`, or a `goto` synthesized by an error
/// path. This is the RAII-style reading of spec.md's defer mechanism:
/// the C compiler's own scope-exit machinery does the exit-path
/// bookkeeping, so nothing upstream of this module has to rewrite
/// every return/break/continue to thread a manual cleanup call.
fn print_defer(stmt: &Stmt, ctx: &mut EmitCtx, level: usize) -> Result<String, CompileError> {
    let id = ctx.next_defer_id;
    ctx.next_defer_id += 1;
    let inner = print_stmt(stmt, ctx, 1)?;
    let helper = format!("static void __cc_defer_cleanup_{id}(int *_cc_unused) {{\n    (void)_cc_unused;\n{inner}}}\n", id = id, inner = inner);
    ctx.defer_helpers.push(helper);
    let pad = indent(level);
    Ok(format!(
        "{pad}int __cc_defer_guard_{id} __attribute__((cleanup(__cc_defer_cleanup_{id}))) = 0;\n{pad}(void)__cc_defer_guard_{id};\n",
        pad = pad,
        id = id
    ))
}

/// Last-resort expansion for a nursery/spawn pair that reached the
/// emitter unlowered. `passes::concurrency` always runs in the
/// standard pipeline, so this path only matters for a tree assembled
/// by hand (as in a test) or a future pipeline configuration that
/// skips that pass; it reproduces the happy-path open/run/close shape
/// without the defer-guarded early-exit release `passes::concurrency`
/// provides.
fn print_nursery_fallback(body: &Stmt, ctx: &mut EmitCtx, level: usize, span: crate::span::Span) -> Result<String, CompileError> {
    let id = ctx.next_nursery_id;
    ctx.next_nursery_id += 1;
    let handle = format!("__cc_nursery_{}", id);
    ctx.nursery_stack.push(handle.clone());
    let pad = indent(level);
    let mut out = format!("{pad}{{\n{inner}void* {handle} = {open}();\n", pad = pad, inner = indent(level + 1), handle = handle, open = runtime::NURSERY_OPEN);
    out.push_str(&print_stmt(body, ctx, level + 1)?);
    out.push_str(&format!("{}{}({});\n", indent(level + 1), runtime::NURSERY_CLOSE, handle));
    out.push_str(&format!("{}}}\n", pad));
    ctx.nursery_stack.pop();
    let _ = span;
    Ok(out)
}

fn print_spawn_fallback(expr: &Expr, ctx: &mut EmitCtx, level: usize, span: crate::span::Span) -> Result<String, CompileError> {
    let handle = ctx.nursery_stack.last().cloned().ok_or(CompileError::SpawnOutsideNursery { span })?;
    let pad = indent(level);
    Ok(format!("{}{}({}, {});\n", pad, runtime::NURSERY_SPAWN_CLOSURE0, handle, print_expr(expr)?))
}

fn print_decl(d: &Decl) -> Result<String, CompileError> {
    let ty_text = d.ty.as_ref().map(print_type).unwrap_or_default();
    match &d.init {
        Some(e) => Ok(format!("{} {} = {}", ty_text, d.name.as_str(), print_expr(e)?)),
        None => Ok(format!("{} {}", ty_text, d.name.as_str())),
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

/// Escapes a string literal's value the way a C source file needs it
/// written: backslash and quote escaped, plus the common non-printable
/// shorthands so generated output stays readable instead of falling
/// back to `\xNN` for every control character.
fn escape_c_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn print_expr(e: &Expr) -> Result<String, CompileError> {
    Ok(match e {
        Expr::Ident(i) => i.as_str().to_string(),
        Expr::IntLiteral { value, .. } => value.to_string(),
        Expr::StringLiteral { value, .. } => format!("\"{}\"", escape_c_string(value)),
        Expr::Call { callee, args, .. } => {
            let mut arg_texts = Vec::with_capacity(args.len());
            for a in args {
                arg_texts.push(print_expr(a)?);
            }
            format!("{}({})", print_expr(callee)?, arg_texts.join(", "))
        }
        Expr::Field { base, name, arrow, .. } => format!("{}{}{}", print_expr(base)?, if *arrow { "->" } else { "." }, name.as_str()),
        Expr::Index { base, index, .. } => format!("{}[{}]", print_expr(base)?, print_expr(index)?),
        Expr::Binary { op, lhs, rhs, .. } => format!("({} {} {})", print_expr(lhs)?, binop_text(*op), print_expr(rhs)?),
        Expr::Unary { op, fixity, expr, .. } => {
            let inner = print_expr(expr)?;
            let sym = unop_text(*op);
            match fixity {
                Fixity::Prefix => format!("({}{})", sym, inner),
                Fixity::Postfix => format!("({}{})", inner, sym),
            }
        }
        Expr::Cast { ty, expr, .. } => format!("(({}){})", print_type(ty), print_expr(expr)?),
        Expr::CompoundLiteral { ty, fields, .. } => {
            let mut field_texts = Vec::with_capacity(fields.len());
            for (name, v) in fields {
                let v_text = print_expr(v)?;
                field_texts.push(match name {
                    Some(n) => format!(".{} = {}", n.as_str(), v_text),
                    None => v_text,
                });
            }
            format!("({}){{ {} }}", print_type(ty), field_texts.join(", "))
        }
        Expr::SizeofType { ty, .. } => format!("sizeof({})", print_type(ty)),
        Expr::SizeofExpr { expr, .. } => format!("sizeof({})", print_expr(expr)?),
        Expr::Await { span, .. } => {
            return Err(CompileError::Internal {
                message: "\"await\" survived to emission outside an @async function".to_string(),
                span: *span,
            });
        }
        Expr::Try { span, .. } => {
            return Err(CompileError::Internal { message: "\"try\" survived to emission; passes::small should have lowered it".to_string(), span: *span });
        }
        Expr::Closure(c) => {
            return Err(CompileError::Internal {
                message: "closure literal survived to emission; passes::closure should have lowered it".to_string(),
                span: c.span,
            });
        }
        Expr::MethodCall { span, .. } => {
            return Err(CompileError::Internal { message: "method call survived to emission; passes::ufcs should have lowered it".to_string(), span: *span });
        }
    })
}

fn unop_text(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::Not => "!",
        UnOp::BitNot => "~",
        UnOp::Deref => "*",
        UnOp::AddrOf => "&",
        UnOp::PreIncr | UnOp::PostIncr => "++",
        UnOp::PreDecr | UnOp::PostDecr => "--",
    }
}

/// Renders one closure definition's struct + drop + entry + make
/// functions, per spec.md §4.3's emission contract. Captures with no
/// fields skip the env struct and drop function entirely and the
/// `make` function forwards a null context.
fn emit_closure_def(def: &crate::ast::ClosureDef, ctx: &mut EmitCtx) -> String {
    let env_ty = format!("struct __CCEnv_{}", def.id);
    let mut out = String::new();

    if !def.captures.is_empty() {
        out.push_str(&format!("{} {{\n", env_ty));
        for c in &def.captures {
            out.push_str(&format!("    {} {};\n", c.ty.c_field_type(), c.name.as_str()));
        }
        out.push_str("};\n\n");

        out.push_str(&format!("static void __cc_closure_drop_{}(void *ctx) {{\n    free(ctx);\n}}\n\n", def.id));
    }

    let params_sig: Vec<String> = def.params.iter().map(|p| format!("intptr_t {}", p.as_str())).collect();
    let mut full_params = vec!["void *__cc_ctx".to_string()];
    full_params.extend(params_sig);
    out.push_str(&format!("static intptr_t __cc_closure_entry_{}({}) {{\n", def.id, full_params.join(", ")));
    if !def.captures.is_empty() {
        out.push_str(&format!("    {} *__cc_env = ({} *)__cc_ctx;\n", env_ty, env_ty));
        for c in &def.captures {
            out.push_str(&format!("    {} {} = __cc_env->{};\n", c.ty.c_field_type(), c.name.as_str(), c.name.as_str()));
        }
    }
    match print_stmt(&def.body, ctx, 1) {
        Ok(body_text) => {
            if def.is_block {
                out.push_str(&body_text);
                out.push_str("    return 0;\n");
            } else {
                out.push_str(&body_text);
            }
        }
        Err(_) => out.push_str("    return 0;\n"),
    }
    out.push_str("}\n\n");

    out.push_str(&format!("static {} __cc_closure_make_{}(", runtime::closure_handle_type(def.arity()), def.id));
    if def.captures.is_empty() {
        out.push_str(") {\n");
        out.push_str(&format!(
            "    return {}((void*)__cc_closure_entry_{}, NULL, NULL);\n}}\n",
            runtime::closure_make(def.arity()),
            def.id
        ));
    } else {
        let ctor_params: Vec<String> = def.captures.iter().map(|c| format!("{} {}", c.ty.c_field_type(), c.name.as_str())).collect();
        out.push_str(&ctor_params.join(", "));
        out.push_str(") {\n");
        out.push_str(&format!("    {} *__cc_env = ({} *)malloc(sizeof({}));\n", env_ty, env_ty, env_ty));
        for c in &def.captures {
            out.push_str(&format!("    __cc_env->{0} = {0};\n", c.name.as_str()));
        }
        out.push_str(&format!(
            "    return {}((void*)__cc_closure_entry_{}, (void*)__cc_env, (void*)__cc_closure_drop_{});\n}}\n",
            runtime::closure_make(def.arity()),
            def.id,
            def.id
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ty::TypeExpr;
    use crate::ast::{FnAttrs, Item};
    use crate::ident::Ident;
    use crate::span::{FileId, Span};

    fn sp() -> Span {
        Span::new(FileId(0), 0, 1)
    }

    fn sources_with(text: &str) -> (SourceMap, FileId) {
        let mut sm = SourceMap::new();
        let id = sm.add_file("t.ccs", text);
        (sm, id)
    }

    #[test]
    fn plain_function_round_trips_as_readable_c() {
        let (sm, fid) = sources_with("int main(void) { return 0; }");
        let f = FunctionDecl {
            name: Ident::new("main", sp()),
            params: vec![],
            return_type: TypeExpr::opaque("int"),
            body: Some(vec![Stmt::Return(Some(Expr::IntLiteral { value: 0, span: sp() }), sp())]),
            attrs: FnAttrs::empty(),
            span: sp(),
        };
        let file = File::new("t.ccs", fid, vec![Item::Function(f)]);
        let res = emit_file(&file, &sm);
        assert!(res.is_ok(), "{:?}", res.errors);
        let text = res.value.unwrap();
        assert!(text.contains("int main(void)"));
        assert!(text.contains("return 0;"));
        assert!(text.contains(runtime::META_INCLUDE));
    }

    #[test]
    fn defer_becomes_a_cleanup_guard_and_hoists_a_helper() {
        let (sm, fid) = sources_with("void f(void) { defer g(); h(); }");
        let body = vec![
            Stmt::Defer {
                stmt: Box::new(Stmt::Expr(Expr::Call { callee: Box::new(Expr::Ident(Ident::new("g", sp()))), args: vec![], span: sp() }, sp())),
                span: sp(),
            },
            Stmt::Expr(Expr::Call { callee: Box::new(Expr::Ident(Ident::new("h", sp()))), args: vec![], span: sp() }, sp()),
        ];
        let f = FunctionDecl { name: Ident::new("f", sp()), params: vec![], return_type: TypeExpr::opaque("void"), body: Some(body), attrs: FnAttrs::empty(), span: sp() };
        let file = File::new("t.ccs", fid, vec![Item::Function(f)]);
        let res = emit_file(&file, &sm);
        assert!(res.is_ok(), "{:?}", res.errors);
        let text = res.value.unwrap();
        assert!(text.contains("__attribute__((cleanup(__cc_defer_cleanup_0)))"));
        assert!(text.contains("static void __cc_defer_cleanup_0"));
        assert!(text.contains("g();"));
    }

    #[test]
    fn closure_survives_as_an_internal_error() {
        let (sm, fid) = sources_with("void f(void) {}");
        let c = crate::ast::ClosureLiteral { params: vec![], is_block: false, body: Box::new(Stmt::Return(None, sp())), span: sp() };
        let f = FunctionDecl {
            name: Ident::new("f", sp()),
            params: vec![],
            return_type: TypeExpr::opaque("void"),
            body: Some(vec![Stmt::Expr(Expr::Closure(c), sp())]),
            attrs: FnAttrs::empty(),
            span: sp(),
        };
        let file = File::new("t.ccs", fid, vec![Item::Function(f)]);
        let res = emit_file(&file, &sm);
        assert!(!res.is_ok());
        assert!(matches!(res.errors[0], CompileError::Internal { .. }));
    }
}
