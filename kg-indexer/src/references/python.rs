//! Python reference extraction.
//!
//! Grammar shapes handled:
//! - `import_statement`: `import a.b`, `import a.b as m`
//! - `import_from_statement`: `from .mod import A, B as C`, `from x import *`
//! - `call`: bare calls and attribute calls (`obj.method(...)`)
//! - `assignment`: `obj = Ctor()` constructor-style bindings

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
        "import_from_statement" => collect_import_from(node, source, result),
        "call" => collect_call(node, source, result),
        "assignment" => collect_assignment(node, source, result),
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, result);
    }
}

/// `import a.b` maps the module itself; `import a.b as m` binds the alias.
fn collect_import(node: Node<'_>, source: &[u8], result: &mut ExtractionResult) {
    let line_number = node.start_position().row + 1;
    let mut cursor = node.walk();
    for item in node.children_by_field_name("name", &mut cursor) {
        match item.kind() {
            "dotted_name" => result.imports.push(ImportReference {
                module_path: node_text(source, &item),
                line_number,
                ..Default::default()
            }),
            "aliased_import" => {
                let Some(name) = item.child_by_field_name("name") else {
                    continue;
                };
                let alias = item
                    .child_by_field_name("alias")
                    .map(|a| node_text(source, &a));
                result.imports.push(ImportReference {
                    module_path: node_text(source, &name),
                    alias,
                    line_number,
                    ..Default::default()
                });
            }
            _ => {}
        }
    }
}

fn collect_import_from(node: Node<'_>, source: &[u8], result: &mut ExtractionResult) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let module_path = node_text(source, &module_node);
    let is_relative = module_path.starts_with('.');
    let line_number = node.start_position().row + 1;

    let mut plain_names = Vec::new();
    let mut cursor = node.walk();
    for item in node.children_by_field_name("name", &mut cursor) {
        match item.kind() {
            "dotted_name" => plain_names.push(node_text(source, &item)),
            "aliased_import" => {
                // `from m import A as B` becomes its own single-name record
                // so the resolver can map B -> (m, A).
                let Some(name) = item.child_by_field_name("name") else {
                    continue;
                };
                let alias = item
                    .child_by_field_name("alias")
                    .map(|a| node_text(source, &a));
                result.imports.push(ImportReference {
                    module_path: module_path.clone(),
                    imported_names: vec![node_text(source, &name)],
                    alias,
                    is_relative,
                    is_wildcard: false,
                    line_number,
                });
            }
            _ => {}
        }
    }

    let is_wildcard = has_child_of_kind(node, "wildcard_import");
    if !plain_names.is_empty() || is_wildcard || !has_aliased_names(node) {
        result.imports.push(ImportReference {
            module_path,
            imported_names: plain_names,
            alias: None,
            is_relative,
            is_wildcard,
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
        "attribute" => {
            let Some(attribute) = function.child_by_field_name("attribute") else {
                return;
            };
            let receiver = function
                .child_by_field_name("object")
                .map(|o| node_text(source, &o));
            result.call_sites.push(CallSite {
                callee_name: node_text(source, &attribute),
                receiver,
                line_number,
            });
        }
        _ => {}
    }
}

/// `obj = Ctor()`: a bare name assigned from a direct call to a bare name.
fn collect_assignment(node: Node<'_>, source: &[u8], result: &mut ExtractionResult) {
    let (Some(left), Some(right)) = (
        node.child_by_field_name("left"),
        node.child_by_field_name("right"),
    ) else {
        return;
    };
    if left.kind() != "identifier" || right.kind() != "call" {
        return;
    }
    let Some(function) = right.child_by_field_name("function") else {
        return;
    };
    if function.kind() != "identifier" {
        return;
    }

    result.assignments.push(Assignment {
        variable: node_text(source, &left),
        constructor: node_text(source, &function),
        line_number: node.start_position().row + 1,
    });
}

fn has_child_of_kind(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

fn has_aliased_names(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .any(|c| c.kind() == "aliased_import")
}
