//! Repository knowledge-graph construction with Tree-sitter.
//!
//! The crate turns a checked-out repository into an in-memory labeled
//! property graph: `FileNode`s for the directory tree, `SymbolNode`s for
//! code definitions, `TextNode`s for documentation chunks, plus the
//! structural and semantic edges between them (HAS_FILE, HAS_SYMBOL,
//! CONTAINS_SYMBOL, HAS_TEXT, NEXT_CHUNK, IMPORTS, CALLS).
//!
//! Tree-sitter parse trees are ephemeral: they live for the duration of a
//! single file and only the extracted symbol records survive.

pub mod errors;
pub mod extractor;
pub mod graph;
pub mod parser;
pub mod references;
pub mod stats;

pub use errors::{IndexerError, Result};
pub use graph::repo_builder::{RepoGraphBuilder, RepoGraphResult};
pub use graph::types::{
    EdgeType, FileNode, KnowledgeGraphEdge, KnowledgeGraphNode, NodePayload, SymbolKind,
    SymbolNode, TextNode,
};
pub use parser::Language;
pub use stats::{IndexingStats, PersistenceStats};
