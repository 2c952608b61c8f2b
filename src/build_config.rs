//! Configuration for one translation unit's lowering run.

use std::path::{Path, PathBuf};

/// Selected by file extension: `.ccs` is a source file lowered to
/// `.c`, `.cch` is a header lowered to `.h` and routed through the
/// header sub-pipeline instead of the statement/expression passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Source,
    Header,
}

impl SourceKind {
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ccs") => Some(SourceKind::Source),
            Some("cch") => Some(SourceKind::Header),
            _ => None,
        }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            SourceKind::Source => "c",
            SourceKind::Header => "h",
        }
    }
}

/// Configuration for the overall lowering run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    canonicalized_manifest_path: PathBuf,
    kind: SourceKind,
    /// When true (the default), allocation failure inside a generated
    /// `make` function calls the runtime's panic path. When false, it
    /// instead returns a null closure handle — useful for embedding in
    /// environments where aborting on OOM is unacceptable; still a
    /// user-visible panic-mode switch, not a change to the lowering
    /// shape.
    panic_on_alloc_failure: bool,
}

impl BuildConfig {
    pub fn new(canonicalized_manifest_path: PathBuf, kind: SourceKind) -> Self {
        BuildConfig {
            canonicalized_manifest_path,
            kind,
            panic_on_alloc_failure: true,
        }
    }

    pub fn with_panic_on_alloc_failure(mut self, panic: bool) -> Self {
        self.panic_on_alloc_failure = panic;
        self
    }

    pub fn path(&self) -> &Path {
        &self.canonicalized_manifest_path
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn panics_on_alloc_failure(&self) -> bool {
        self.panic_on_alloc_failure
    }
}
