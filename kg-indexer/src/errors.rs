use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Root error type for graph construction.
///
/// Per-file failures (`Parse`, `SymbolExtraction`, `HierarchyBuild`) are
/// recorded in [`crate::stats::IndexingStats`] by the repo builder and do not
/// abort a full-repository pass.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The file extension (or well-known filename) maps to no grammar.
    #[error("unsupported language for {path}")]
    UnsupportedLanguage { path: PathBuf },

    /// Tree-sitter failed to produce a tree, or the file could not be read.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The language walker tripped an internal invariant (e.g. depth cap).
    #[error("symbol extraction failed [language={language}]: {message}")]
    SymbolExtraction { language: String, message: String },

    /// Span-stack hierarchy construction failed; symbols are kept, the
    /// CONTAINS_SYMBOL edges for the file are dropped.
    #[error("failed to build symbol hierarchy over {symbol_count} symbols: {message}")]
    HierarchyBuild { symbol_count: usize, message: String },

    #[error("repository root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("repository root is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
