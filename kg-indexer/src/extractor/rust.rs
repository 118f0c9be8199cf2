//! Rust symbol extraction.
//!
//! Free functions, structs, enums, traits, consts/statics, and methods found
//! inside `impl` blocks (qualified as `Type.method`). Doc comments (`///`)
//! immediately preceding a definition are captured as the docstring.

use tree_sitter::{Node, Tree};

use crate::errors::{IndexerError, Result};
use crate::extractor::{
    DEFAULT_MAX_DEPTH, ExtractedSymbol, SignatureStyle, SymbolExtractor, collect_node_types,
    node_text, signature_of,
};
use crate::graph::types::SymbolKind;
use crate::parser::Language;

pub struct RustSymbolExtractor;

impl SymbolExtractor for RustSymbolExtractor {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extract_symbols(&self, tree: &Tree, source: &[u8]) -> Result<Vec<ExtractedSymbol>> {
        let mut symbols = Vec::new();
        self.walk_for_definitions(tree.root_node(), source, &mut symbols, 0, None)?;

        symbols.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then(b.end_line.cmp(&a.end_line))
        });
        Ok(symbols)
    }
}

impl RustSymbolExtractor {
    fn walk_for_definitions(
        &self,
        node: Node<'_>,
        source: &[u8],
        symbols: &mut Vec<ExtractedSymbol>,
        depth: usize,
        enclosing_type: Option<&str>,
    ) -> Result<()> {
        let depth = depth + 1;
        if depth > DEFAULT_MAX_DEPTH {
            return Err(IndexerError::SymbolExtraction {
                language: "rust".to_string(),
                message: format!("recursion depth exceeded: {depth} > {DEFAULT_MAX_DEPTH}"),
            });
        }

        match node.kind() {
            "function_item" => {
                let kind = if enclosing_type.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                if let Some(symbol) = self.extract_named(node, source, kind, enclosing_type) {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            "struct_item" => {
                if let Some(symbol) =
                    self.extract_named(node, source, SymbolKind::Struct, enclosing_type)
                {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            "enum_item" => {
                if let Some(symbol) =
                    self.extract_named(node, source, SymbolKind::Enum, enclosing_type)
                {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            "trait_item" => {
                if let Some(symbol) =
                    self.extract_named(node, source, SymbolKind::Interface, enclosing_type)
                {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            "const_item" | "static_item" => {
                if let Some(symbol) =
                    self.extract_named(node, source, SymbolKind::Constant, enclosing_type)
                {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            "impl_item" => {
                // The impl block itself is not a symbol; its functions become
                // methods qualified by the implemented type.
                let type_name = node
                    .child_by_field_name("type")
                    .map(|t| node_text(source, &t));
                if let Some(body) = node.child_by_field_name("body") {
                    self.walk_for_definitions(body, source, symbols, depth, type_name.as_deref())?;
                }
                return Ok(());
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_for_definitions(child, source, symbols, depth, enclosing_type)?;
        }
        Ok(())
    }

    fn extract_named(
        &self,
        node: Node<'_>,
        source: &[u8],
        kind: SymbolKind,
        enclosing_type: Option<&str>,
    ) -> Option<ExtractedSymbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(source, &name_node);
        let qualified_name = match enclosing_type {
            Some(owner) => format!("{owner}.{name}"),
            None => name.clone(),
        };

        Some(ExtractedSymbol {
            kind,
            qualified_name: Some(qualified_name),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            signature: signature_of(source, &node, SignatureStyle::Brace),
            docstring: doc_comment_of(node, source),
            node_types: collect_node_types(node),
            name,
        })
    }
}

/// Contiguous `///` line comments directly above the definition.
fn doc_comment_of(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        if sibling.kind() != "line_comment" {
            break;
        }
        let text = node_text(source, &sibling);
        let Some(stripped) = text.strip_prefix("///") else {
            break;
        };
        lines.push(stripped.trim().to_string());
        current = sibling.prev_sibling();
    }

    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}
