//! JavaScript / TypeScript symbol extraction.
//!
//! One walker serves both languages: the core constructs (classes,
//! functions, methods, arrow functions bound to `const`/`let`/`var`) share
//! grammar shapes. TypeScript additionally contributes interfaces and enums.
//! Leading comments are not captured as docstrings.

use tree_sitter::{Node, Tree};

use crate::errors::{IndexerError, Result};
use crate::extractor::{
    DEFAULT_MAX_DEPTH, ExtractedSymbol, SignatureStyle, SymbolExtractor, collect_node_types,
    node_text, signature_of,
};
use crate::graph::types::SymbolKind;
use crate::parser::Language;

pub struct JavaScriptSymbolExtractor {
    language: Language,
}

impl JavaScriptSymbolExtractor {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl SymbolExtractor for JavaScriptSymbolExtractor {
    fn language(&self) -> Language {
        self.language
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

impl JavaScriptSymbolExtractor {
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
                language: self.language.as_str().to_string(),
                message: format!("recursion depth exceeded: {depth} > {DEFAULT_MAX_DEPTH}"),
            });
        }

        match node.kind() {
            "class_declaration" | "abstract_class_declaration" => {
                if let Some(symbol) =
                    self.extract_named(node, source, SymbolKind::Class, parent_class)
                {
                    let class_name = symbol.name.clone();
                    symbols.push(symbol);
                    if let Some(body) = node.child_by_field_name("body") {
                        self.walk_for_definitions(
                            body,
                            source,
                            symbols,
                            depth,
                            Some(&class_name),
                        )?;
                    }
                }
                return Ok(());
            }
            "function_declaration" | "method_definition" => {
                let kind = if parent_class.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                if let Some(symbol) = self.extract_named(node, source, kind, parent_class) {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            // TypeScript-only constructs; absent from JavaScript trees.
            "interface_declaration" => {
                if let Some(symbol) =
                    self.extract_named(node, source, SymbolKind::Interface, parent_class)
                {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            "enum_declaration" => {
                if let Some(symbol) =
                    self.extract_named(node, source, SymbolKind::Enum, parent_class)
                {
                    symbols.push(symbol);
                }
                return Ok(());
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() != "variable_declarator" {
                        continue;
                    }
                    let name_node = child.child_by_field_name("name");
                    let value_node = child.child_by_field_name("value");
                    if let (Some(name_node), Some(value)) = (name_node, value_node) {
                        if value.kind() == "arrow_function" {
                            symbols.push(self.extract_arrow_function(child, name_node, source));
                        }
                    }
                }
                return Ok(());
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_for_definitions(child, source, symbols, depth, parent_class)?;
        }
        Ok(())
    }

    fn extract_named(
        &self,
        node: Node<'_>,
        source: &[u8],
        kind: SymbolKind,
        parent_class: Option<&str>,
    ) -> Option<ExtractedSymbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(source, &name_node);
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
            signature: signature_of(source, &node, SignatureStyle::Brace),
            docstring: None,
            node_types: collect_node_types(node),
            name,
        })
    }

    /// `const handler = () => {}` yields a function named by the binding.
    fn extract_arrow_function(
        &self,
        declarator: Node<'_>,
        name_node: Node<'_>,
        source: &[u8],
    ) -> ExtractedSymbol {
        let name = node_text(source, &name_node);
        ExtractedSymbol {
            kind: SymbolKind::Function,
            qualified_name: Some(name.clone()),
            start_line: declarator.start_position().row + 1,
            end_line: declarator.end_position().row + 1,
            start_byte: declarator.start_byte(),
            end_byte: declarator.end_byte(),
            signature: signature_of(source, &declarator, SignatureStyle::Brace),
            docstring: None,
            node_types: collect_node_types(declarator),
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source_for_tests;

    fn extract(code: &str, language: Language) -> Vec<ExtractedSymbol> {
        let parsed = parse_source_for_tests(code, language);
        JavaScriptSymbolExtractor::new(language)
            .extract_symbols(&parsed.tree, &parsed.source)
            .unwrap()
    }

    #[test]
    fn extracts_classes_methods_and_arrow_functions() {
        let symbols = extract(
            "class Router {\n  route(path) {\n    return path;\n  }\n}\nfunction go() {}\nconst handler = () => 42;\n",
            Language::JavaScript,
        );

        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Router", "route", "go", "handler"]);
        assert_eq!(symbols[1].kind, SymbolKind::Method);
        assert_eq!(symbols[1].qualified_name.as_deref(), Some("Router.route"));
        assert_eq!(symbols[3].kind, SymbolKind::Function);
    }

    #[test]
    fn typescript_interfaces_and_enums_are_extracted() {
        let symbols = extract(
            "interface Shape {\n  area(): number;\n}\nenum Color {\n  Red,\n  Green,\n}\nexport function helper(): void {}\n",
            Language::TypeScript,
        );

        let kinds: Vec<SymbolKind> = symbols.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SymbolKind::Interface, SymbolKind::Enum, SymbolKind::Function]
        );
        assert_eq!(symbols[2].name, "helper");
    }

    #[test]
    fn docstrings_stay_empty_for_js() {
        let symbols = extract("/** doc */\nfunction f() {}\n", Language::JavaScript);
        assert_eq!(symbols[0].docstring, None);
    }
}
