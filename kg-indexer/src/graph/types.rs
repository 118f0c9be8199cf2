//! Node and edge types of the knowledge graph.
//!
//! Nodes live in an arena (`Vec<KnowledgeGraphNode>`) owned by the repo
//! builder during a pass; edges reference nodes by arena-scoped `node_id`
//! only, so cyclic relations need no back-pointers. Variant names serialize
//! to snake_case strings and edge labels to their SCREAMING_SNAKE storage
//! form; both are part of persisted artifacts, avoid renaming.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::parser::Language;

/// High-level kind of a code definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    Struct,
    Constant,
    Variable,
    Property,
    Constructor,
    Destructor,
}

impl SymbolKind {
    /// Parse the storage form back into the enum.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(SymbolKind::Function),
            "method" => Some(SymbolKind::Method),
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "enum" => Some(SymbolKind::Enum),
            "struct" => Some(SymbolKind::Struct),
            "constant" => Some(SymbolKind::Constant),
            "variable" => Some(SymbolKind::Variable),
            "property" => Some(SymbolKind::Property),
            "constructor" => Some(SymbolKind::Constructor),
            "destructor" => Some(SymbolKind::Destructor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Struct => "struct",
            SymbolKind::Constant => "constant",
            SymbolKind::Variable => "variable",
            SymbolKind::Property => "property",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Destructor => "destructor",
        }
    }
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file or directory in the indexed repository.
///
/// Directories are distinguished structurally: they have outgoing HAS_FILE
/// edges and no parser-derived children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub basename: String,
    /// POSIX path relative to the repo root; `"."` for the root itself.
    pub relative_path: String,
}

/// A code definition extracted from a source file.
///
/// Carries dual identities: `symbol_version_id` is scoped to one snapshot
/// (commit) and changes whenever the symbol moves; `stable_symbol_id`
/// survives across snapshots while the AST structure is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub symbol_version_id: String,
    pub stable_symbol_id: String,
    pub kind: SymbolKind,
    pub name: String,
    /// Dotted path within the file scope (e.g. `Class.method`).
    pub qualified_name: Option<String>,
    pub language: Language,
    pub relative_path: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    /// 1-indexed, inclusive.
    pub end_line: usize,
    pub signature: String,
    pub docstring: Option<String>,
    /// Hash of the pre-order AST node-type sequence for this symbol.
    pub fingerprint: Option<String>,
}

/// A chunk of documentation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    /// 0-indexed, inclusive, within the source file.
    pub start_line: usize,
    /// 0-indexed, inclusive.
    pub end_line: usize,
}

/// Tagged payload of a graph node, pattern-matched at the persistence
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodePayload {
    File(FileNode),
    Symbol(SymbolNode),
    Text(TextNode),
}

impl NodePayload {
    pub fn node_type(&self) -> &'static str {
        match self {
            NodePayload::File(_) => "file",
            NodePayload::Symbol(_) => "symbol",
            NodePayload::Text(_) => "text",
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            NodePayload::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&SymbolNode> {
        match self {
            NodePayload::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            NodePayload::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// A node in the knowledge graph: an arena-scoped id plus the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraphNode {
    pub node_id: u64,
    #[serde(flatten)]
    pub payload: NodePayload,
}

/// Directed, typed relationship between two graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    HasFile,
    HasSymbol,
    HasText,
    NextChunk,
    ContainsSymbol,
    Calls,
    Imports,
}

impl EdgeType {
    /// Relationship label in the persisted graph.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::HasFile => "HAS_FILE",
            EdgeType::HasSymbol => "HAS_SYMBOL",
            EdgeType::HasText => "HAS_TEXT",
            EdgeType::NextChunk => "NEXT_CHUNK",
            EdgeType::ContainsSymbol => "CONTAINS_SYMBOL",
            EdgeType::Calls => "CALLS",
            EdgeType::Imports => "IMPORTS",
        }
    }
}

impl Display for EdgeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge between two arena node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraphEdge {
    pub source_id: u64,
    pub target_id: u64,
    pub edge_type: EdgeType,
}

impl KnowledgeGraphEdge {
    pub fn new(source_id: u64, target_id: u64, edge_type: EdgeType) -> Self {
        Self {
            source_id,
            target_id,
            edge_type,
        }
    }
}
