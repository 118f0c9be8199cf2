//! Language-specific symbol extraction from Tree-sitter ASTs.
//!
//! Each language implements [`SymbolExtractor`], walking the tree and
//! producing uniform [`ExtractedSymbol`] records. The base module provides
//! the span-stack hierarchy builder, the pre-order node-type collector used
//! for fingerprinting, and shared text/signature helpers.

pub mod chunked;
mod javascript;
mod python;
mod rust;

use tree_sitter::{Node, Tree};

use crate::errors::Result;
use crate::graph::types::SymbolKind;
use crate::parser::Language;

/// Hard cap on AST recursion depth; exceeding it fails the file, not the run.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Intermediate representation of a code symbol, before graph-node creation.
///
/// Lines are 1-indexed and inclusive; byte offsets index the raw file bytes.
#[derive(Debug, Clone)]
pub struct ExtractedSymbol {
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub signature: String,
    pub docstring: Option<String>,
    /// Pre-order grammar node-type sequence of this symbol's subtree.
    pub node_types: Vec<String>,
}

/// Parent-child relation between symbols, by index into the extraction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolHierarchy {
    pub parent_index: usize,
    pub child_index: usize,
}

/// One language's walker over a parsed tree.
pub trait SymbolExtractor {
    fn language(&self) -> Language;

    /// Extract all definitions from the tree, sorted by
    /// `(start_line asc, end_line desc)` so parents precede children.
    fn extract_symbols(&self, tree: &Tree, source: &[u8]) -> Result<Vec<ExtractedSymbol>>;
}

/// Look up the extractor for a language, if one exists.
pub fn for_language(language: Language) -> Option<Box<dyn SymbolExtractor>> {
    match language {
        Language::Python => Some(Box::new(python::PythonSymbolExtractor)),
        Language::JavaScript | Language::TypeScript => {
            Some(Box::new(javascript::JavaScriptSymbolExtractor::new(language)))
        }
        Language::Rust => Some(Box::new(rust::RustSymbolExtractor)),
        Language::Dockerfile | Language::Unknown => None,
    }
}

/// Languages with symbol-extraction support.
pub fn supported_languages() -> Vec<Language> {
    vec![
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Rust,
    ]
}

/// Determine parent-child relations by span containment.
///
/// Span-stack algorithm: process symbols in `(start_line asc, end_line desc)`
/// order so larger spans come first, keep a stack of open scopes, pop every
/// scope that no longer contains the current symbol, and take the remaining
/// top as the parent. Indices in the result refer to positions in the input
/// slice, not the sorted order.
pub fn build_symbol_hierarchy(symbols: &[ExtractedSymbol]) -> Result<Vec<SymbolHierarchy>> {
    if symbols.is_empty() {
        return Ok(Vec::new());
    }

    let mut indexed: Vec<(usize, &ExtractedSymbol)> = symbols.iter().enumerate().collect();
    indexed.sort_by(|(_, a), (_, b)| {
        a.start_line
            .cmp(&b.start_line)
            .then(b.end_line.cmp(&a.end_line))
    });

    let mut hierarchy = Vec::new();
    let mut stack: Vec<(usize, &ExtractedSymbol)> = Vec::new();

    for (original_idx, symbol) in indexed {
        while let Some((_, parent)) = stack.last() {
            if parent.start_line <= symbol.start_line && parent.end_line >= symbol.end_line {
                break;
            }
            stack.pop();
        }

        if let Some((parent_idx, _)) = stack.last() {
            hierarchy.push(SymbolHierarchy {
                parent_index: *parent_idx,
                child_index: original_idx,
            });
        }

        stack.push((original_idx, symbol));
    }

    Ok(hierarchy)
}

/// Collect all node types of a subtree in pre-order, for fingerprinting.
///
/// Iterative with an explicit stack: fingerprinting runs over whole symbol
/// subtrees and must not depend on the walker's depth cap.
pub(crate) fn collect_node_types(node: Node<'_>) -> Vec<String> {
    let mut types = Vec::new();
    let mut stack = vec![node];

    while let Some(current) = stack.pop() {
        types.push(current.kind().to_string());
        for i in (0..current.child_count()).rev() {
            if let Some(child) = current.child(i) {
                stack.push(child);
            }
        }
    }

    types
}

/// Decode the byte span of a node, replacing invalid UTF-8.
pub(crate) fn node_text(source: &[u8], node: &Node<'_>) -> String {
    let start = node.start_byte().min(source.len());
    let end = node.end_byte().min(source.len());
    String::from_utf8_lossy(&source[start..end]).into_owned()
}

/// How multi-line signatures terminate per language family.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SignatureStyle {
    /// `def f(...):` style; continuation ends at `:` / `):`.
    Colon,
    /// `function f(...) {` style; continuation ends at `{` or `=>`.
    Brace,
}

/// First declaration line(s) of a definition.
///
/// When the opening line ends with `(` or `,`, up to nine continuation lines
/// are joined until the style's terminator appears.
pub(crate) fn signature_of(source: &[u8], node: &Node<'_>, style: SignatureStyle) -> String {
    let text = String::from_utf8_lossy(source);
    let lines: Vec<&str> = text.split('\n').collect();
    let start_line = node.start_position().row;

    let Some(first) = lines.get(start_line) else {
        return String::new();
    };
    let first = first.trim();

    if !(first.ends_with('(') || first.ends_with(',')) {
        return first.to_string();
    }

    let mut sig_lines = vec![first.to_string()];
    let upper = (start_line + 10).min(lines.len());
    for line in &lines[start_line + 1..upper] {
        let line = line.trim();
        sig_lines.push(line.to_string());
        let done = match style {
            SignatureStyle::Colon => line.ends_with(':') || line.contains("):"),
            SignatureStyle::Brace => line.ends_with('{') || line.ends_with("=>"),
        };
        if done {
            break;
        }
    }
    sig_lines.join(" ")
}
