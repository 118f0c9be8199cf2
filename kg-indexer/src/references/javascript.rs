//! JavaScript / TypeScript reference extraction.
//!
//! Grammar shapes handled:
//! - `import_statement`: default, named (`{A, B as C}`), and namespace
//!   (`* as ns`) imports; bare side-effect imports keep an empty name list
//! - `call_expression`: bare calls and member calls (`obj.method(...)`)
//! - `variable_declarator` with a `new_expression` value for type tracking

use tree_sitter::{Node, Tree};

use crate::extractor::node_text;
use crate::references::{Assignment, CallSite, ExtractionResult, ImportReference};

pub(crate) fn extract(tree: &Tree, source: &[u8]) -> ExtractionResult {
    let mut result = ExtractionResult::default();
    walk(tree.root_node(), source, &mut result);
    result
}

fn walk(node: Node<'_>, source: &[u8], result: &mut ExtractionResult) {
    match node.kind() {
        "import_statement" => collect_import(node, source, result),
        "call_expression" => collect_call(node, source, result),
        "variable_declarator" => collect_assignment(node, source, result),
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, result);
    }
}

fn collect_import(node: Node<'_>, source: &[u8], result: &mut ExtractionResult) {
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    let module_path = strip_string_quotes(&node_text(source, &source_node));
    let is_relative = module_path.starts_with("./") || module_path.starts_with("../");
    let line_number = node.start_position().row + 1;

    let mut plain_names = Vec::new();
    let mut emitted_any = false;

    let mut cursor = node.walk();
    for clause in node.children(&mut cursor) {
        if clause.kind() != "import_clause" {
            continue;
        }
        let mut clause_cursor = clause.walk();
        for item in clause.children(&mut clause_cursor) {
            match item.kind() {
                // `import Default from "mod"` binds the default export.
                "identifier" => plain_names.push(node_text(source, &item)),
                "named_imports" => {
                    let mut spec_cursor = item.walk();
                    for spec in item.children(&mut spec_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        match spec.child_by_field_name("alias") {
                            Some(alias) => {
                                result.imports.push(ImportReference {
                                    module_path: module_path.clone(),
                                    imported_names: vec![node_text(source, &name)],
                                    alias: Some(node_text(source, &alias)),
                                    is_relative,
                                    is_wildcard: false,
                                    line_number,
                                });
                                emitted_any = true;
                            }
                            None => plain_names.push(node_text(source, &name)),
                        }
                    }
                }
                "namespace_import" => {
                    let alias = last_identifier(item).map(|id| node_text(source, &id));
                    result.imports.push(ImportReference {
                        module_path: module_path.clone(),
                        imported_names: Vec::new(),
                        alias,
                        is_relative,
                        is_wildcard: true,
                        line_number,
                    });
                    emitted_any = true;
                }
                _ => {}
            }
        }
    }

    if !plain_names.is_empty() || !emitted_any {
        result.imports.push(ImportReference {
            module_path,
            imported_names: plain_names,
            alias: None,
            is_relative,
            is_wildcard: false,
            line_number,
        });
    }
}

fn collect_call(node: Node<'_>, source: &[u8], result: &mut ExtractionResult) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let line_number = node.start_position().row + 1;

    match function.kind() {
        "identifier" => result.call_sites.push(CallSite {
            callee_name: node_text(source, &function),
            receiver: None,
            line_number,
        }),
        "member_expression" => {
            let Some(property) = function.child_by_field_name("property") else {
                return;
            };
            let receiver = function
                .child_by_field_name("object")
                .map(|o| node_text(source, &o));
            result.call_sites.push(CallSite {
                callee_name: node_text(source, &property),
                receiver,
                line_number,
            });
        }
        _ => {}
    }
}

/// `const svc = new Service()`: record the binding's constructed type.
fn collect_assignment(node: Node<'_>, source: &[u8], result: &mut ExtractionResult) {
    let (Some(name), Some(value)) = (
        node.child_by_field_name("name"),
        node.child_by_field_name("value"),
    ) else {
        return;
    };
    if name.kind() != "identifier" || value.kind() != "new_expression" {
        return;
    }
    let Some(constructor) = value.child_by_field_name("constructor") else {
        return;
    };
    if constructor.kind() != "identifier" {
        return;
    }

    result.assignments.push(Assignment {
        variable: node_text(source, &name),
        constructor: node_text(source, &constructor),
        line_number: node.start_position().row + 1,
    });
}

fn last_identifier<'a>(node: Node<'a>) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let mut found = None;
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" {
            found = Some(child);
        }
    }
    found
}

fn strip_string_quotes(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}
