//! Counters collected across an indexing or persistence pass.

use serde::{Deserialize, Serialize};

/// Statistics collected during repository indexing.
///
/// `total_files` counts every file the walker looked at, so
/// `total_files == indexed_files + skipped_files + failed_files` holds after
/// a completed pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingStats {
    pub total_files: usize,
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub total_directories: usize,
    pub total_symbols: usize,
    pub total_text_chunks: usize,
    /// Files above the soft size limit processed through the chunked path.
    pub large_files_chunked: usize,
    /// Symbol batches emitted by the chunked extractor, across all files.
    pub symbol_batches_processed: usize,
    /// Symbols dropped past the per-file cap.
    pub symbols_truncated: usize,
    pub imports_edges: usize,
    pub calls_edges: usize,
    pub errors: Vec<String>,
}

/// Statistics collected during knowledge-graph persistence.
///
/// Created vs. updated is derived from before/after node and edge counts, so
/// the split is an approximation when a run mixes both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceStats {
    pub nodes_created: usize,
    pub edges_created: usize,
    pub nodes_updated: usize,
    pub edges_updated: usize,
    pub errors: Vec<String>,
}
