//! Written type expressions.
//!
//! The parser is external, so by the time a `File` is handed to this
//! crate, every type has already been spelled out by the user as
//! ordinary text; we keep both that text (for C emission and as a
//! declaration-site cache) and a shallow structural decomposition (for
//! the sum-type passes, which only need to recognize `T?`, `T!E` and
//! `T[:]` wrappers, not full C type grammar).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    /// A type this crate doesn't need to look inside: a plain C type
    /// name, possibly with pointer/array declarator text folded in.
    Opaque,
    /// `T?`
    Optional(Box<TypeExpr>),
    /// `T!E`
    Result(Box<TypeExpr>, Box<TypeExpr>),
    /// `T[:]`
    Slice(Box<TypeExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    /// The exact text the user wrote, preserved so the emitter can
    /// reproduce untouched C types verbatim: constructs outside the
    /// supported subset pass through untouched.
    pub text: String,
    pub shape: TypeShape,
}

impl TypeExpr {
    pub fn opaque(text: impl Into<String>) -> Self {
        TypeExpr { text: text.into(), shape: TypeShape::Opaque }
    }

    pub fn optional(text: impl Into<String>, inner: TypeExpr) -> Self {
        TypeExpr { text: text.into(), shape: TypeShape::Optional(Box::new(inner)) }
    }

    pub fn result(text: impl Into<String>, ok: TypeExpr, err: TypeExpr) -> Self {
        TypeExpr { text: text.into(), shape: TypeShape::Result(Box::new(ok), Box::new(err)) }
    }

    pub fn slice(text: impl Into<String>, inner: TypeExpr) -> Self {
        TypeExpr { text: text.into(), shape: TypeShape::Slice(Box::new(inner)) }
    }

    pub fn is_sum_type(&self) -> bool {
        !matches!(self.shape, TypeShape::Opaque)
    }
}

/// The small, closed set of capture types the closure pass accepts.
/// A user capturing anything wider is expected to widen the binding
/// to one of these. A capture whose declared type doesn't map onto
/// one of these is a compile error, not a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedType {
    /// Any integer-sized scalar (`int`, `long`, `bool`, enum tags, …).
    Integer,
    /// Any single-level pointer.
    Pointer,
    /// A `T[:]` slice value.
    Slice,
    /// Another closure's handle, captured by value — a closure
    /// captured by an enclosing closure.
    Closure(u8),
}

impl CapturedType {
    /// C type used for the environment struct's field, keyed purely
    /// by the capture's classification, not its exact written type —
    /// captures are stored as a small fixed set of representations.
    pub fn c_field_type(self) -> String {
        match self {
            CapturedType::Integer => "intptr_t".to_string(),
            CapturedType::Pointer => "void*".to_string(),
            CapturedType::Slice => "CCSlice".to_string(),
            CapturedType::Closure(arity) => format!("CCClosure{}", arity),
        }
    }

    /// Best-effort classification from written type text. Returns
    /// `None` when the pass can't tell — the caller then emits
    /// `CompileError::UnresolvableCaptureType`.
    pub fn classify(written: &str) -> Option<CapturedType> {
        let t = written.trim();
        if let Some(arity) = parse_closure_handle_type(t) {
            return Some(CapturedType::Closure(arity));
        }
        if t.ends_with('*') {
            return Some(CapturedType::Pointer);
        }
        if t.ends_with("[:]") {
            return Some(CapturedType::Slice);
        }
        const INTEGER_LIKE: &[&str] = &[
            "int", "long", "short", "char", "bool", "size_t", "intptr_t", "uintptr_t", "int8_t",
            "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
            "unsigned", "signed",
        ];
        let base = t.split_whitespace().last().unwrap_or(t);
        if INTEGER_LIKE.contains(&base) || INTEGER_LIKE.iter().any(|k| t.split_whitespace().any(|w| w == *k)) {
            return Some(CapturedType::Integer);
        }
        None
    }
}

/// Parses `CCClosure0`, `CCClosure1`, `CCClosure2` — the synthetic
/// type names the closure pass assigns to a variable initialized from
/// a closure `make` call.
pub fn parse_closure_handle_type(text: &str) -> Option<u8> {
    let suffix = text.strip_prefix("CCClosure")?;
    suffix.parse::<u8>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_pointers_and_integers_and_slices() {
        assert_eq!(CapturedType::classify("int"), Some(CapturedType::Integer));
        assert_eq!(CapturedType::classify("unsigned long"), Some(CapturedType::Integer));
        assert_eq!(CapturedType::classify("struct Foo *"), Some(CapturedType::Pointer));
        assert_eq!(CapturedType::classify("int[:]"), Some(CapturedType::Slice));
        assert_eq!(CapturedType::classify("struct Foo"), None);
    }
}
