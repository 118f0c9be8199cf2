//! Python symbol extraction.
//!
//! Walks `class_definition` / `function_definition` nodes. Functions found
//! inside a class body become methods with a `Class.name` qualified name;
//! nested functions are not descended into.

use tree_sitter::{Node, Tree};

use crate::errors::{IndexerError, Result};
use crate::extractor::{
    DEFAULT_MAX_DEPTH, ExtractedSymbol, SignatureStyle, SymbolExtractor, collect_node_types,
    node_text, signature_of,
};
use crate::graph::types::SymbolKind;
use crate::parser::Language;

pub struct PythonSymbolExtractor;

impl SymbolExtractor for PythonSymbolExtractor {
    fn language(&self) -> Language {
        Language::Python
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

impl PythonSymbolExtractor {
    fn walk_for_definitions(
        &self,
        node: Node<'_>,
        source: &[u8],
        symbols: &mut Vec<ExtractedSymbol>,
        depth: usize,
        parent_class: Option<&str>,
    ) -> Result<()> {
        let depth = depth + 1;
        if depth > DEFAULT_MAX_DEPTH {
            return Err(IndexerError::SymbolExtraction {
                language: "python".to_string(),
                message: format!("recursion depth exceeded: {depth} > {DEFAULT_MAX_DEPTH}"),
            });
        }

        if node.kind() == "class_definition" {
            if let Some(symbol) = self.extract_class(node, source, parent_class) {
                let class_name = symbol.name.clone();
                symbols.push(symbol);
                // Methods live in the "block" child of the class body.
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "block" {
                        self.walk_for_definitions(
                            child,
                            source,
                            symbols,
                            depth,
                            Some(&class_name),
                        )?;
                    }
                }
            }
            return Ok(());
        }

        if node.kind() == "function_definition" {
            if let Some(symbol) = self.extract_function(node, source, parent_class) {
                symbols.push(symbol);
            }
            // Nested functions are intentionally not descended into.
            return Ok(());
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_for_definitions(child, source, symbols, depth, parent_class)?;
        }
        Ok(())
    }

    fn extract_class(
        &self,
        node: Node<'_>,
        source: &[u8],
        parent_class: Option<&str>,
    ) -> Option<ExtractedSymbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(source, &name_node);
        let qualified_name = match parent_class {
            Some(outer) => format!("{outer}.{name}"),
            None => name.clone(),
        };

        Some(ExtractedSymbol {
            kind: SymbolKind::Class,
            qualified_name: Some(qualified_name),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            signature: signature_of(source, &node, SignatureStyle::Colon),
            docstring: self.docstring_of(node, source),
            node_types: collect_node_types(node),
            name,
        })
    }

    fn extract_function(
        &self,
        node: Node<'_>,
        source: &[u8],
        parent_class: Option<&str>,
    ) -> Option<ExtractedSymbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(source, &name_node);

        let kind = if parent_class.is_some() {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        let qualified_name = match parent_class {
            Some(outer) => format!("{outer}.{name}"),
            None => name.clone(),
        };

        Some(ExtractedSymbol {
            kind,
            qualified_name: Some(qualified_name),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            signature: signature_of(source, &node, SignatureStyle::Colon),
            docstring: self.docstring_of(node, source),
            node_types: collect_node_types(node),
            name,
        })
    }

    /// A docstring is a string literal standing as the first statement of the
    /// body block; surrounding quotes are stripped.
    fn docstring_of(&self, node: Node<'_>, source: &[u8]) -> Option<String> {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "block" {
                continue;
            }
            let mut block_cursor = child.walk();
            for stmt in child.children(&mut block_cursor) {
                if stmt.kind() == "expression_statement" {
                    let expr = stmt.child(0)?;
                    if expr.kind() == "string" {
                        return Some(strip_quotes(&node_text(source, &expr)));
                    }
                }
                // A leading non-string statement means there is no docstring.
                break;
            }
        }
        None
    }
}

fn strip_quotes(raw: &str) -> String {
    let inner = if (raw.starts_with("\"\"\"") && raw.ends_with("\"\"\"") && raw.len() >= 6)
        || (raw.starts_with("'''") && raw.ends_with("'''") && raw.len() >= 6)
    {
        &raw[3..raw.len() - 3]
    } else if (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
        || (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    inner.trim().to_string()
}
