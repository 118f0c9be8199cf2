//! Import / call-site / assignment extraction for cross-file resolution.
//!
//! These walkers run in the resolver's second pass, after all nodes exist.
//! They only collect surface references; resolution against the graph
//! indices happens in [`crate::graph::cross_file`].

mod javascript;
mod python;

use tree_sitter::Tree;

use crate::parser::Language;

/// One import statement, normalized across languages.
#[derive(Debug, Clone, Default)]
pub struct ImportReference {
    /// Module specifier as written (`.a`, `pkg.mod`, `./lib`).
    pub module_path: String,
    /// Names pulled in by `from … import A, B` / `import {A, B}`.
    pub imported_names: Vec<String>,
    /// Local alias (`as` binding); for a single imported name when present.
    pub alias: Option<String>,
    pub is_relative: bool,
    pub is_wildcard: bool,
    pub line_number: usize,
}

/// One call site: `receiver.callee(…)` or a bare `callee(…)`.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub callee_name: String,
    pub receiver: Option<String>,
    /// 1-indexed line of the call expression.
    pub line_number: usize,
}

/// A simple constructor assignment (`obj = Service()` / `new Service()`),
/// recorded for best-effort variable-type tracking.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub variable: String,
    pub constructor: String,
    pub line_number: usize,
}

/// Everything one file contributed to reference resolution.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub imports: Vec<ImportReference>,
    pub call_sites: Vec<CallSite>,
    pub assignments: Vec<Assignment>,
}

/// Extract references from a parsed file; unsupported languages yield an
/// empty result.
pub fn extract_references(tree: &Tree, source: &[u8], language: Language) -> ExtractionResult {
    match language {
        Language::Python => python::extract(tree, source),
        Language::JavaScript | Language::TypeScript => javascript::extract(tree, source),
        _ => ExtractionResult::default(),
    }
}
