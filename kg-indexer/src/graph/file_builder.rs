//! Per-file subgraph construction.
//!
//! Source files go through Tree-sitter and the language extractors, yielding
//! SymbolNodes wired to their file with HAS_SYMBOL and nested with
//! CONTAINS_SYMBOL. Documentation files are split into overlapping character
//! chunks, yielding TextNodes chained by NEXT_CHUNK. Parse trees are used
//! ephemerally and never stored.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{IndexerError, Result};
use crate::extractor::{self, ExtractedSymbol};
use crate::graph::ids::{fingerprint_from_node_types, stable_symbol_id, symbol_version_id};
use crate::graph::types::{
    EdgeType, KnowledgeGraphEdge, KnowledgeGraphNode, NodePayload, SymbolNode, TextNode,
};
use crate::parser::{self, Language};

const TEXT_EXTENSIONS: [&str; 4] = ["md", "markdown", "txt", "rst"];

/// Everything one file contributed to the graph.
#[derive(Debug, Default)]
pub struct FileGraphOutput {
    pub next_node_id: u64,
    pub nodes: Vec<KnowledgeGraphNode>,
    pub edges: Vec<KnowledgeGraphEdge>,
    /// Symbols dropped past the per-file cap.
    pub symbols_truncated: usize,
}

impl FileGraphOutput {
    fn empty(next_node_id: u64) -> Self {
        Self {
            next_node_id,
            ..Self::default()
        }
    }
}

/// Builds knowledge-graph subgraphs for individual files.
pub struct FileGraphBuilder {
    repo_id: String,
    commit_sha: Option<String>,
    max_symbols: usize,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FileGraphBuilder {
    pub fn new(
        repo_id: impl Into<String>,
        commit_sha: Option<String>,
        max_symbols: usize,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            commit_sha,
            max_symbols,
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn support_code_file(&self, path: &Path) -> bool {
        parser::support_file(path)
    }

    pub fn support_text_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    /// Whether any graph can be built for this file.
    pub fn support_file(&self, path: &Path) -> bool {
        self.support_code_file(path) || self.support_text_file(path)
    }

    /// Build the subgraph for one file already represented by a FileNode.
    ///
    /// `parent_node_id` / `file_relative_path` identify that FileNode; every
    /// produced node takes an id from `next_node_id` onward and every edge
    /// references only the parent or nodes produced here.
    pub fn build_file_graph(
        &self,
        parent_node_id: u64,
        file_relative_path: &str,
        file_path: &Path,
        next_node_id: u64,
    ) -> Result<FileGraphOutput> {
        if self.support_code_file(file_path) {
            self.code_file_graph(parent_node_id, file_relative_path, file_path, next_node_id)
        } else {
            self.text_file_graph(parent_node_id, file_path, next_node_id)
        }
    }

    fn code_file_graph(
        &self,
        parent_node_id: u64,
        file_relative_path: &str,
        file_path: &Path,
        mut next_node_id: u64,
    ) -> Result<FileGraphOutput> {
        let parsed = match parser::parse_file(file_path) {
            Ok(parsed) => parsed,
            // Not parseable after all; the file stays indexed with no symbols.
            Err(IndexerError::UnsupportedLanguage { .. }) => {
                return Ok(FileGraphOutput::empty(next_node_id));
            }
            Err(e) => return Err(e),
        };

        if !parsed.is_actionable() {
            debug!(path = %file_path.display(), "root has errors or no children, indexing without symbols");
            return Ok(FileGraphOutput::empty(next_node_id));
        }

        let Some(extractor) = extractor::for_language(parsed.language) else {
            return Ok(FileGraphOutput::empty(next_node_id));
        };

        let mut symbols = extractor.extract_symbols(&parsed.tree, &parsed.source)?;
        let symbols_truncated = symbols.len().saturating_sub(self.max_symbols);
        symbols.truncate(self.max_symbols);

        // A hierarchy failure keeps the symbols and drops only the
        // CONTAINS_SYMBOL edges for this file.
        let hierarchy = match extractor::build_symbol_hierarchy(&symbols) {
            Ok(hierarchy) => hierarchy,
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "hierarchy build failed, dropping containment edges");
                Vec::new()
            }
        };

        let mut nodes = Vec::with_capacity(symbols.len());
        let mut edges = Vec::with_capacity(symbols.len() + hierarchy.len());
        let base_node_id = next_node_id;

        for symbol in &symbols {
            let node = symbol_kg_node(
                symbol,
                next_node_id,
                &self.repo_id,
                self.commit_sha.as_deref(),
                parsed.language,
                file_relative_path,
            );
            edges.push(KnowledgeGraphEdge::new(
                parent_node_id,
                next_node_id,
                EdgeType::HasSymbol,
            ));
            nodes.push(node);
            next_node_id += 1;
        }

        for rel in &hierarchy {
            if rel.parent_index < nodes.len() && rel.child_index < nodes.len() {
                edges.push(KnowledgeGraphEdge::new(
                    base_node_id + rel.parent_index as u64,
                    base_node_id + rel.child_index as u64,
                    EdgeType::ContainsSymbol,
                ));
            }
        }

        Ok(FileGraphOutput {
            next_node_id,
            nodes,
            edges,
            symbols_truncated,
        })
    }

    fn text_file_graph(
        &self,
        parent_node_id: u64,
        file_path: &Path,
        mut next_node_id: u64,
    ) -> Result<FileGraphOutput> {
        let raw = fs::read(file_path)?;
        let content = String::from_utf8_lossy(&raw);
        if content.trim().is_empty() {
            return Ok(FileGraphOutput::empty(next_node_id));
        }

        let chunks = self.split_text_into_chunks(&content);

        let mut nodes = Vec::with_capacity(chunks.len());
        let mut edges = Vec::with_capacity(chunks.len() * 2);
        let mut prev_node_id: Option<u64> = None;
        let mut current_line = 0usize;

        for chunk_text in chunks {
            let chunk_lines = chunk_text.matches('\n').count();
            let start_line = current_line;
            let end_line = current_line + chunk_lines;

            nodes.push(KnowledgeGraphNode {
                node_id: next_node_id,
                payload: NodePayload::Text(TextNode {
                    text: chunk_text,
                    start_line,
                    end_line,
                }),
            });
            edges.push(KnowledgeGraphEdge::new(
                parent_node_id,
                next_node_id,
                EdgeType::HasText,
            ));
            if let Some(prev) = prev_node_id {
                edges.push(KnowledgeGraphEdge::new(prev, next_node_id, EdgeType::NextChunk));
            }

            prev_node_id = Some(next_node_id);
            next_node_id += 1;
            current_line = end_line;
        }

        Ok(FileGraphOutput {
            next_node_id,
            nodes,
            edges,
            symbols_truncated: 0,
        })
    }

    /// Character-window splitting with overlap, preferring to break at a
    /// newline (else a space) found within the last 20% of the window.
    fn split_text_into_chunks(&self, text: &str) -> Vec<String> {
        if text.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let bytes = text.as_bytes();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < bytes.len() {
            let mut end = (start + self.chunk_size).min(bytes.len());

            if end < bytes.len() {
                let boundary_search_start = end.saturating_sub(self.chunk_size / 5);
                if let Some(pos) = rfind_byte(bytes, b'\n', boundary_search_start, end) {
                    if pos > start {
                        end = pos + 1;
                    }
                } else if let Some(pos) = rfind_byte(bytes, b' ', boundary_search_start, end) {
                    if pos > start {
                        end = pos + 1;
                    }
                }
            }

            chunks.push(String::from_utf8_lossy(&bytes[start..end]).into_owned());

            let next_start = end.saturating_sub(self.chunk_overlap);
            if next_start <= start || next_start >= bytes.len() {
                break;
            }
            start = next_start;
        }

        chunks
    }
}

fn rfind_byte(bytes: &[u8], needle: u8, from: usize, to: usize) -> Option<usize> {
    bytes[from..to]
        .iter()
        .rposition(|b| *b == needle)
        .map(|pos| from + pos)
}

/// Wrap one extracted symbol as a graph node, computing its fingerprint and
/// both identities.
pub(crate) fn symbol_kg_node(
    extracted: &ExtractedSymbol,
    node_id: u64,
    repo_id: &str,
    commit_sha: Option<&str>,
    language: Language,
    relative_path: &str,
) -> KnowledgeGraphNode {
    let fingerprint = if extracted.node_types.is_empty() {
        None
    } else {
        Some(fingerprint_from_node_types(&extracted.node_types))
    };

    let version_id = symbol_version_id(
        commit_sha,
        relative_path,
        extracted.kind,
        &extracted.name,
        extracted.qualified_name.as_deref(),
        extracted.start_line,
        extracted.end_line,
    );
    let stable_id = stable_symbol_id(
        repo_id,
        extracted.kind,
        extracted.qualified_name.as_deref(),
        &extracted.name,
        fingerprint.as_deref(),
    );

    KnowledgeGraphNode {
        node_id,
        payload: NodePayload::Symbol(SymbolNode {
            symbol_version_id: version_id,
            stable_symbol_id: stable_id,
            kind: extracted.kind,
            name: extracted.name.clone(),
            qualified_name: extracted.qualified_name.clone(),
            language,
            relative_path: relative_path.to_string(),
            start_line: extracted.start_line,
            end_line: extracted.end_line,
            signature: extracted.signature.clone(),
            docstring: extracted.docstring.clone(),
            fingerprint,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn builder() -> FileGraphBuilder {
        FileGraphBuilder::new("repo-1", Some("sha-1".to_string()), 500, 1000, 200)
    }

    #[test]
    fn code_file_yields_symbols_and_containment() {
        let mut f = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        f.write_all(b"class C:\n    def m(self):\n        pass\n")
            .unwrap();

        let out = builder().build_file_graph(3, "x.py", f.path(), 10).unwrap();
        assert_eq!(out.next_node_id, 12);
        assert_eq!(out.nodes.len(), 2);

        let class = out.nodes[0].payload.as_symbol().unwrap();
        assert_eq!(class.name, "C");
        assert_eq!(class.relative_path, "x.py");

        let has_symbol: Vec<_> = out
            .edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::HasSymbol)
            .collect();
        assert_eq!(has_symbol.len(), 2);
        assert!(has_symbol.iter().all(|e| e.source_id == 3));

        let contains: Vec<_> = out
            .edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::ContainsSymbol)
            .collect();
        assert_eq!(contains.len(), 1);
        assert_eq!(contains[0].source_id, 10);
        assert_eq!(contains[0].target_id, 11);
    }

    #[test]
    fn broken_parse_is_indexed_without_symbols() {
        let mut f = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        f.write_all(b"def broken((((:\n").unwrap();

        let out = builder().build_file_graph(0, "broken.py", f.path(), 5).unwrap();
        assert!(out.nodes.is_empty());
        assert!(out.edges.is_empty());
        assert_eq!(out.next_node_id, 5);
    }

    #[test]
    fn symbol_cap_truncates_and_reports() {
        let mut code = String::new();
        for i in 0..10 {
            code.push_str(&format!("def f{i}():\n    pass\n"));
        }
        let mut f = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
        f.write_all(code.as_bytes()).unwrap();

        let builder = FileGraphBuilder::new("repo-1", None, 4, 1000, 200);
        let out = builder.build_file_graph(0, "many.py", f.path(), 0).unwrap();
        assert_eq!(out.nodes.len(), 4);
        assert_eq!(out.symbols_truncated, 6);
    }

    #[test]
    fn text_file_chunks_chain_with_next_chunk() {
        let mut text = String::new();
        for i in 0..120 {
            text.push_str(&format!("line {i} of the documentation\n"));
        }
        let mut f = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        f.write_all(text.as_bytes()).unwrap();

        let out = builder().build_file_graph(1, "README.md", f.path(), 2).unwrap();
        assert!(out.nodes.len() > 1);

        let has_text = out
            .edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::HasText)
            .count();
        let next_chunk = out
            .edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::NextChunk)
            .count();
        assert_eq!(has_text, out.nodes.len());
        assert_eq!(next_chunk, out.nodes.len() - 1);

        let first = out.nodes[0].payload.as_text().unwrap();
        assert_eq!(first.start_line, 0);
        assert!(first.end_line >= first.start_line);
    }

    #[test]
    fn small_text_is_a_single_chunk() {
        let mut f = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        f.write_all(b"tiny note\n").unwrap();

        let out = builder().build_file_graph(0, "note.txt", f.path(), 0).unwrap();
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(out.edges.len(), 1);
    }

    #[test]
    fn chunks_overlap_and_prefer_newline_boundaries() {
        let builder = FileGraphBuilder::new("r", None, 500, 100, 20);
        let text = (0..40).map(|i| format!("word{i} ")).collect::<String>();
        let chunks = builder.split_text_into_chunks(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
        // Consecutive chunks share the overlap region.
        let tail: String = chunks[0].chars().rev().take(5).collect();
        let tail: String = tail.chars().rev().collect();
        assert!(chunks[1].contains(&tail));
    }
}
