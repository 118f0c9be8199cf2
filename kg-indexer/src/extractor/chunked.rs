//! Memory-bounded symbol extraction for oversize files.
//!
//! The file is parsed once (a full AST is unavoidable), the complete symbol
//! list is extracted so the hierarchy can be computed, and graph nodes are
//! then materialized lazily in batches through a pull iterator. At most one
//! batch of nodes/edges is alive at a time for the file; hierarchy edges
//! arrive as a final pseudo-batch with no nodes.

use std::path::Path;

use tracing::debug;

use crate::errors::{IndexerError, Result};
use crate::extractor::{self, ExtractedSymbol, SymbolHierarchy};
use crate::graph::file_builder::symbol_kg_node;
use crate::graph::types::{EdgeType, KnowledgeGraphEdge, KnowledgeGraphNode};
use crate::parser::{self, Language};

/// A batch of symbols ready for the caller to append and persist.
#[derive(Debug, Clone)]
pub struct SymbolBatch {
    pub nodes: Vec<KnowledgeGraphNode>,
    pub edges: Vec<KnowledgeGraphEdge>,
    pub batch_number: usize,
    pub symbols_in_batch: usize,
}

/// Extracts symbols from large files in bounded batches.
#[derive(Debug, Clone)]
pub struct ChunkedSymbolExtractor {
    batch_size: usize,
    gc_interval_batches: usize,
}

impl ChunkedSymbolExtractor {
    pub fn new(batch_size: usize, gc_interval_batches: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            gc_interval_batches: gc_interval_batches.max(1),
        }
    }

    /// Parse `file_path` and return the batch iterator.
    ///
    /// Symbols beyond `max_symbols` are dropped; the drop count is available
    /// on the returned iterator. Unsupported or non-actionable files yield an
    /// empty iterator rather than an error.
    ///
    /// # Errors
    /// [`IndexerError::Parse`] / [`IndexerError::SymbolExtraction`] surface
    /// here, before the first batch, so the caller's buffers are untouched on
    /// failure.
    #[allow(clippy::too_many_arguments)]
    pub fn extract_symbols_chunked(
        &self,
        file_path: &Path,
        parent_node_id: u64,
        file_relative_path: &str,
        repo_id: &str,
        commit_sha: Option<&str>,
        next_node_id: u64,
        max_symbols: usize,
    ) -> Result<SymbolBatches> {
        let parsed = match parser::parse_file(file_path) {
            Ok(parsed) => parsed,
            Err(IndexerError::UnsupportedLanguage { .. }) => {
                debug!(path = %file_path.display(), "unsupported language, no chunked batches");
                return Ok(SymbolBatches::empty(self.clone()));
            }
            Err(e) => return Err(e),
        };

        if !parsed.is_actionable() {
            debug!(path = %file_path.display(), "parse error or empty root, no chunked batches");
            return Ok(SymbolBatches::empty(self.clone()));
        }

        let Some(extractor) = extractor::for_language(parsed.language) else {
            return Ok(SymbolBatches::empty(self.clone()));
        };

        let mut symbols = extractor.extract_symbols(&parsed.tree, &parsed.source)?;
        let symbols_truncated = symbols.len().saturating_sub(max_symbols);
        symbols.truncate(max_symbols);

        // The hierarchy needs the complete (capped) list; compute it before
        // batching. The parse tree and source drop here.
        let hierarchy = extractor::build_symbol_hierarchy(&symbols)?;

        Ok(SymbolBatches {
            extractor: self.clone(),
            symbols,
            hierarchy,
            language: parsed.language,
            file_relative_path: file_relative_path.to_string(),
            repo_id: repo_id.to_string(),
            commit_sha: commit_sha.map(str::to_string),
            parent_node_id,
            base_node_id: next_node_id,
            cursor: 0,
            batch_number: 0,
            hierarchy_emitted: false,
            symbols_truncated,
        })
    }
}

/// Lazy pull iterator over [`SymbolBatch`]es of one file.
///
/// Node ids are assigned contiguously from the starting id, in symbol order,
/// so the final hierarchy batch can address earlier nodes by offset.
pub struct SymbolBatches {
    extractor: ChunkedSymbolExtractor,
    symbols: Vec<ExtractedSymbol>,
    hierarchy: Vec<SymbolHierarchy>,
    language: Language,
    file_relative_path: String,
    repo_id: String,
    commit_sha: Option<String>,
    parent_node_id: u64,
    base_node_id: u64,
    cursor: usize,
    batch_number: usize,
    hierarchy_emitted: bool,
    symbols_truncated: usize,
}

impl SymbolBatches {
    fn empty(extractor: ChunkedSymbolExtractor) -> Self {
        Self {
            extractor,
            symbols: Vec::new(),
            hierarchy: Vec::new(),
            language: Language::Unknown,
            file_relative_path: String::new(),
            repo_id: String::new(),
            commit_sha: None,
            parent_node_id: 0,
            base_node_id: 0,
            cursor: 0,
            batch_number: 0,
            hierarchy_emitted: true,
            symbols_truncated: 0,
        }
    }

    /// Total symbols this iterator will emit across all batches.
    pub fn total_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// Symbols dropped past the per-file cap during construction.
    pub fn symbols_truncated(&self) -> usize {
        self.symbols_truncated
    }
}

impl Iterator for SymbolBatches {
    type Item = SymbolBatch;

    fn next(&mut self) -> Option<SymbolBatch> {
        if self.cursor < self.symbols.len() {
            let upper = (self.cursor + self.extractor.batch_size).min(self.symbols.len());
            let mut nodes = Vec::with_capacity(upper - self.cursor);
            let mut edges = Vec::with_capacity(upper - self.cursor);

            for idx in self.cursor..upper {
                let node_id = self.base_node_id + idx as u64;
                let node = symbol_kg_node(
                    &self.symbols[idx],
                    node_id,
                    &self.repo_id,
                    self.commit_sha.as_deref(),
                    self.language,
                    &self.file_relative_path,
                );
                edges.push(KnowledgeGraphEdge::new(
                    self.parent_node_id,
                    node_id,
                    EdgeType::HasSymbol,
                ));
                nodes.push(node);
            }

            let batch = SymbolBatch {
                symbols_in_batch: nodes.len(),
                nodes,
                edges,
                batch_number: self.batch_number,
            };

            self.cursor = upper;
            self.batch_number += 1;
            if self.batch_number % self.extractor.gc_interval_batches == 0 {
                debug!(
                    file = %self.file_relative_path,
                    batches = self.batch_number,
                    "chunked extraction checkpoint"
                );
            }
            return Some(batch);
        }

        if !self.hierarchy_emitted {
            self.hierarchy_emitted = true;
            let edges: Vec<KnowledgeGraphEdge> = self
                .hierarchy
                .iter()
                .filter(|rel| {
                    rel.parent_index < self.symbols.len() && rel.child_index < self.symbols.len()
                })
                .map(|rel| {
                    KnowledgeGraphEdge::new(
                        self.base_node_id + rel.parent_index as u64,
                        self.base_node_id + rel.child_index as u64,
                        EdgeType::ContainsSymbol,
                    )
                })
                .collect();

            if !edges.is_empty() {
                let batch = SymbolBatch {
                    nodes: Vec::new(),
                    edges,
                    batch_number: self.batch_number,
                    symbols_in_batch: 0,
                };
                self.batch_number += 1;
                return Some(batch);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::io::Write as _;

    fn write_py_functions(count: usize) -> tempfile::NamedTempFile {
        let mut code = String::new();
        for i in 0..count {
            writeln!(code, "def f{i}():\n    return {i}\n").unwrap();
        }
        let mut f = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        f.write_all(code.as_bytes()).unwrap();
        f
    }

    #[test]
    fn batches_cover_all_symbols_with_contiguous_ids() {
        let file = write_py_functions(23);
        let extractor = ChunkedSymbolExtractor::new(10, 5);

        let batches: Vec<SymbolBatch> = extractor
            .extract_symbols_chunked(file.path(), 7, "big.py", "repo", Some("sha"), 100, 500)
            .unwrap()
            .collect();

        // 23 symbols in batches of 10 => 3 symbol batches; no nesting, so no
        // hierarchy pseudo-batch.
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].symbols_in_batch, 10);
        assert_eq!(batches[2].symbols_in_batch, 3);

        let ids: Vec<u64> = batches
            .iter()
            .flat_map(|b| b.nodes.iter().map(|n| n.node_id))
            .collect();
        assert_eq!(ids, (100..123).collect::<Vec<u64>>());

        for batch in &batches {
            for edge in &batch.edges {
                assert_eq!(edge.source_id, 7);
                assert_eq!(edge.edge_type, EdgeType::HasSymbol);
            }
        }
    }

    #[test]
    fn hierarchy_arrives_as_final_empty_batch() {
        let mut f = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        f.write_all(b"class C:\n    def m(self):\n        pass\n")
            .unwrap();

        let extractor = ChunkedSymbolExtractor::new(50, 5);
        let batches: Vec<SymbolBatch> = extractor
            .extract_symbols_chunked(f.path(), 0, "x.py", "repo", None, 1, 500)
            .unwrap()
            .collect();

        assert_eq!(batches.len(), 2);
        let last = batches.last().unwrap();
        assert!(last.nodes.is_empty());
        assert_eq!(last.symbols_in_batch, 0);
        assert_eq!(last.edges.len(), 1);
        assert_eq!(last.edges[0].edge_type, EdgeType::ContainsSymbol);
        assert_eq!(last.edges[0].source_id, 1);
        assert_eq!(last.edges[0].target_id, 2);
    }

    #[test]
    fn per_file_cap_truncates_and_counts() {
        let file = write_py_functions(30);
        let extractor = ChunkedSymbolExtractor::new(8, 5);

        let batches = extractor
            .extract_symbols_chunked(file.path(), 0, "big.py", "repo", None, 0, 20)
            .unwrap();
        assert_eq!(batches.total_symbols(), 20);
        assert_eq!(batches.symbols_truncated(), 10);
        assert_eq!(batches.map(|b| b.symbols_in_batch).sum::<usize>(), 20);
    }
}
