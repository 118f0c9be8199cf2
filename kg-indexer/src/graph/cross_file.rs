//! Second-pass IMPORTS / CALLS edge resolution.
//!
//! Runs once the full node set is in hand. Lookup indices are built up
//! front and treated as read-only; resolution emits an edge only when the
//! indices confirm the target, never speculatively. External imports and
//! unresolvable call sites produce no edge and no failure.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::graph::types::{EdgeType, KnowledgeGraphEdge, KnowledgeGraphNode, NodePayload, SymbolNode};
use crate::parser::{self, Language};
use crate::references::{self, CallSite, ExtractionResult, ImportReference};

const JS_TS_EXTENSIONS: [&str; 6] = [".js", ".ts", ".jsx", ".tsx", ".mjs", ".cjs"];
const JS_TS_INDEX_FILES: [&str; 4] = ["index.js", "index.ts", "index.jsx", "index.tsx"];

/// Imported names visible inside one file, for call resolution.
///
/// `name_to_source` maps a local name to `(target_file, original_name)`;
/// `module_aliases` maps a module binding (`import lib.utils`, `* as ns`) to
/// its resolved file.
#[derive(Debug, Default)]
struct LocalImportMap {
    name_to_source: HashMap<String, (String, String)>,
    module_aliases: HashMap<String, String>,
}

/// Best-effort `variable -> constructed type` facts from simple assignments.
#[derive(Debug, Default)]
struct LocalTypeMap {
    var_to_type: HashMap<String, String>,
}

/// Builds cross-file IMPORTS and CALLS edges over an existing node set.
pub struct CrossFileEdgeBuilder<'a> {
    repo_root: &'a Path,
    file_by_relpath: HashMap<&'a str, u64>,
    symbols_by_file: HashMap<&'a str, Vec<(u64, &'a SymbolNode)>>,
    symbols_by_name_in_file: HashMap<(&'a str, &'a str), Vec<u64>>,
    symbols_by_qname_in_file: HashMap<(&'a str, &'a str), u64>,
}

/// Cross-file edges plus how many of each type were emitted.
#[derive(Debug, Default)]
pub struct CrossFileEdges {
    pub edges: Vec<KnowledgeGraphEdge>,
    pub imports_count: usize,
    pub calls_count: usize,
}

impl<'a> CrossFileEdgeBuilder<'a> {
    pub fn new(repo_root: &'a Path, nodes: &'a [KnowledgeGraphNode]) -> Self {
        let mut file_by_relpath = HashMap::new();
        let mut symbols_by_file: HashMap<&str, Vec<(u64, &SymbolNode)>> = HashMap::new();
        let mut symbols_by_name_in_file: HashMap<(&str, &str), Vec<u64>> = HashMap::new();
        let mut symbols_by_qname_in_file = HashMap::new();

        for node in nodes {
            match &node.payload {
                NodePayload::File(file) => {
                    file_by_relpath.insert(file.relative_path.as_str(), node.node_id);
                }
                NodePayload::Symbol(symbol) => {
                    let relpath = symbol.relative_path.as_str();
                    symbols_by_file
                        .entry(relpath)
                        .or_default()
                        .push((node.node_id, symbol));
                    symbols_by_name_in_file
                        .entry((relpath, symbol.name.as_str()))
                        .or_default()
                        .push(node.node_id);
                    if let Some(qname) = &symbol.qualified_name {
                        symbols_by_qname_in_file
                            .entry((relpath, qname.as_str()))
                            .or_insert(node.node_id);
                    }
                }
                NodePayload::Text(_) => {}
            }
        }

        debug!(
            files = file_by_relpath.len(),
            files_with_symbols = symbols_by_file.len(),
            "built cross-file indices"
        );

        Self {
            repo_root,
            file_by_relpath,
            symbols_by_file,
            symbols_by_name_in_file,
            symbols_by_qname_in_file,
        }
    }

    /// Resolve references file by file and emit the edge set.
    pub fn build(&self) -> CrossFileEdges {
        let mut result = CrossFileEdges::default();

        // Deterministic file order keeps repeated passes byte-identical.
        let mut relpaths: Vec<&str> = self.file_by_relpath.keys().copied().collect();
        relpaths.sort_unstable();

        for relpath in relpaths {
            let language = Language::from_path(Path::new(relpath));
            if !language.supports_reference_extraction() {
                continue;
            }

            let abs_path = self.repo_root.join(relpath);
            if !abs_path.is_file() {
                continue;
            }

            let extraction = match self.extract_references(&abs_path, language) {
                Some(extraction) => extraction,
                None => continue,
            };

            let source_file_id = self.file_by_relpath[relpath];
            let mut import_map = LocalImportMap::default();
            let mut seen_imports: HashSet<u64> = HashSet::new();

            for import_ref in &extraction.imports {
                if let Some(target_relpath) =
                    self.resolve_import_path(relpath, &import_ref.module_path, import_ref.is_relative, language)
                {
                    let Some(&target_file_id) = self.file_by_relpath.get(target_relpath.as_str())
                    else {
                        continue;
                    };
                    if seen_imports.insert(target_file_id) {
                        result.edges.push(KnowledgeGraphEdge::new(
                            source_file_id,
                            target_file_id,
                            EdgeType::Imports,
                        ));
                        result.imports_count += 1;
                    }
                    update_import_map(&mut import_map, import_ref, &target_relpath);
                }
            }

            let type_map = build_type_map(&extraction);
            let mut seen_calls: HashSet<(u64, u64)> = HashSet::new();

            for call in &extraction.call_sites {
                let Some((caller_id, callee_id)) =
                    self.resolve_call(relpath, call, &import_map, &type_map)
                else {
                    continue;
                };
                if seen_calls.insert((caller_id, callee_id)) {
                    result.edges.push(KnowledgeGraphEdge::new(
                        caller_id,
                        callee_id,
                        EdgeType::Calls,
                    ));
                    result.calls_count += 1;
                }
            }
        }

        info!(
            imports = result.imports_count,
            calls = result.calls_count,
            "built cross-file edges"
        );
        result
    }

    fn extract_references(&self, abs_path: &Path, language: Language) -> Option<ExtractionResult> {
        match parser::parse_file(abs_path) {
            Ok(parsed) if parsed.is_actionable() => Some(references::extract_references(
                &parsed.tree,
                &parsed.source,
                language,
            )),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %abs_path.display(), error = %e, "skipping reference extraction");
                None
            }
        }
    }

    // ---------------------------------------------------------------------
    // Import path resolution
    // ---------------------------------------------------------------------

    fn resolve_import_path(
        &self,
        source_relpath: &str,
        module_path: &str,
        is_relative: bool,
        language: Language,
    ) -> Option<String> {
        match language {
            Language::Python => self.resolve_python_import(source_relpath, module_path, is_relative),
            _ => self.resolve_js_import(source_relpath, module_path, is_relative),
        }
    }

    /// Python: leading dots walk up from the importer's directory; the rest
    /// of the dotted path maps to directories. Candidates are `<base>.py`
    /// then `<base>/__init__.py`.
    fn resolve_python_import(
        &self,
        source_relpath: &str,
        module_path: &str,
        is_relative: bool,
    ) -> Option<String> {
        let base = if is_relative {
            let dots = module_path.chars().take_while(|c| *c == '.').count();
            let remaining = &module_path[dots..];

            let mut dir = parent_dir(source_relpath);
            // One dot is the importer's own package; each extra dot walks up.
            for _ in 0..dots.saturating_sub(1) {
                dir = parent_dir(&dir);
            }

            let module_parts = remaining.split('.').filter(|p| !p.is_empty());
            join_posix(&dir, module_parts)
        } else {
            join_posix("", module_path.split('.').filter(|p| !p.is_empty()))
        };

        self.find_python_file(&base)
    }

    fn find_python_file(&self, base_path: &str) -> Option<String> {
        let base_path = base_path.trim_start_matches("./");

        let candidate = format!("{base_path}.py");
        if self.file_by_relpath.contains_key(candidate.as_str()) {
            return Some(candidate);
        }

        let candidate = format!("{base_path}/__init__.py");
        if self.file_by_relpath.contains_key(candidate.as_str()) {
            return Some(candidate);
        }

        None
    }

    /// JS/TS: only relative specifiers resolve; bare specifiers are external
    /// packages and yield no edge.
    fn resolve_js_import(
        &self,
        source_relpath: &str,
        module_path: &str,
        is_relative: bool,
    ) -> Option<String> {
        if !is_relative {
            return None;
        }

        let mut dir = parent_dir(source_relpath);
        let mut remaining = module_path;

        if let Some(rest) = remaining.strip_prefix("./") {
            remaining = rest;
        }
        while let Some(rest) = remaining.strip_prefix("../") {
            dir = parent_dir(&dir);
            remaining = rest;
        }

        let base = join_posix(&dir, remaining.split('/').filter(|p| !p.is_empty()));
        self.find_js_file(&base)
    }

    fn find_js_file(&self, base_path: &str) -> Option<String> {
        let base_path = base_path.trim_start_matches("./");

        // The specifier may already carry its extension.
        if self.file_by_relpath.contains_key(base_path) {
            return Some(base_path.to_string());
        }

        for ext in JS_TS_EXTENSIONS {
            let candidate = format!("{base_path}{ext}");
            if self.file_by_relpath.contains_key(candidate.as_str()) {
                return Some(candidate);
            }
        }

        for index in JS_TS_INDEX_FILES {
            let candidate = format!("{base_path}/{index}");
            if self.file_by_relpath.contains_key(candidate.as_str()) {
                return Some(candidate);
            }
        }

        None
    }

    // ---------------------------------------------------------------------
    // Call resolution
    // ---------------------------------------------------------------------

    fn resolve_call(
        &self,
        source_relpath: &str,
        call: &CallSite,
        import_map: &LocalImportMap,
        type_map: &LocalTypeMap,
    ) -> Option<(u64, u64)> {
        // Module-level calls have no enclosing symbol and are skipped.
        let caller_id = self.find_enclosing_symbol(source_relpath, call.line_number)?;
        let callee_id = self.resolve_callee(call, import_map, type_map)?;

        // Never emit self-referential CALLS edges.
        if caller_id == callee_id {
            return None;
        }
        Some((caller_id, callee_id))
    }

    /// Tightest-span symbol in the file containing `line_number`; the same
    /// selection rule the hierarchy builder induces, so anchoring and
    /// containment agree.
    fn find_enclosing_symbol(&self, relpath: &str, line_number: usize) -> Option<u64> {
        let symbols = self.symbols_by_file.get(relpath)?;

        symbols
            .iter()
            .filter(|(_, s)| s.start_line <= line_number && line_number <= s.end_line)
            .min_by_key(|(node_id, s)| (s.end_line - s.start_line, *node_id))
            .map(|(node_id, _)| *node_id)
    }

    fn resolve_callee(
        &self,
        call: &CallSite,
        import_map: &LocalImportMap,
        type_map: &LocalTypeMap,
    ) -> Option<u64> {
        let Some(receiver) = call.receiver.as_deref() else {
            // Bare call to an imported name.
            let (target_file, original_name) = import_map.name_to_source.get(&call.callee_name)?;
            return self.find_symbol_in_file(target_file, original_name);
        };

        // Call through a module alias: `utils.helper()`.
        if let Some(target_file) = import_map.module_aliases.get(receiver) {
            return self.find_symbol_in_file(target_file, &call.callee_name);
        }

        // Static-style call on an imported class: `Calculator.add()`.
        if let Some((target_file, class_name)) = import_map.name_to_source.get(receiver) {
            let qname = format!("{class_name}.{}", call.callee_name);
            return self.find_symbol_by_qname(target_file, &qname);
        }

        // Method on a variable whose constructed type we tracked, when that
        // type itself resolves through the imports.
        if let Some(class_name) = type_map.var_to_type.get(receiver) {
            if let Some((target_file, original_name)) = import_map.name_to_source.get(class_name) {
                let qname = format!("{original_name}.{}", call.callee_name);
                return self.find_symbol_by_qname(target_file, &qname);
            }
        }

        None
    }

    fn find_symbol_in_file(&self, relpath: &str, name: &str) -> Option<u64> {
        self.symbols_by_name_in_file
            .get(&(relpath, name))
            .and_then(|ids| ids.first())
            .copied()
    }

    fn find_symbol_by_qname(&self, relpath: &str, qname: &str) -> Option<u64> {
        self.symbols_by_qname_in_file.get(&(relpath, qname)).copied()
    }
}

fn update_import_map(map: &mut LocalImportMap, import_ref: &ImportReference, target_relpath: &str) {
    if !import_ref.imported_names.is_empty() {
        for name in &import_ref.imported_names {
            map.name_to_source
                .insert(name.clone(), (target_relpath.to_string(), name.clone()));
        }
        // `from m import A as B` / `import {A as B}`: the alias resolves to
        // the original name in the target.
        if let (Some(alias), [original]) =
            (&import_ref.alias, import_ref.imported_names.as_slice())
        {
            map.name_to_source
                .insert(alias.clone(), (target_relpath.to_string(), original.clone()));
        }
        return;
    }

    if let Some(alias) = &import_ref.alias {
        map.module_aliases
            .insert(alias.clone(), target_relpath.to_string());
    } else if !import_ref.is_wildcard {
        // `import lib.utils` binds the dotted path as written at call sites.
        map.module_aliases
            .insert(import_ref.module_path.clone(), target_relpath.to_string());
    }
}

fn build_type_map(extraction: &ExtractionResult) -> LocalTypeMap {
    let mut type_map = LocalTypeMap::default();
    for assignment in &extraction.assignments {
        type_map
            .var_to_type
            .insert(assignment.variable.clone(), assignment.constructor.clone());
    }
    type_map
}

/// Parent directory of a repo-relative POSIX path; `""` for top level.
fn parent_dir(relpath: &str) -> String {
    match relpath.rfind('/') {
        Some(idx) => relpath[..idx].to_string(),
        None => String::new(),
    }
}

fn join_posix<'p>(dir: &str, parts: impl Iterator<Item = &'p str>) -> String {
    let mut out = dir.to_string();
    for part in parts {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{FileNode, SymbolKind};
    use crate::parser::Language as Lang;

    fn file_node(node_id: u64, relpath: &str) -> KnowledgeGraphNode {
        KnowledgeGraphNode {
            node_id,
            payload: NodePayload::File(FileNode {
                basename: relpath.rsplit('/').next().unwrap_or(relpath).to_string(),
                relative_path: relpath.to_string(),
            }),
        }
    }

    fn symbol_node(node_id: u64, relpath: &str, name: &str, qname: &str, span: (usize, usize)) -> KnowledgeGraphNode {
        KnowledgeGraphNode {
            node_id,
            payload: NodePayload::Symbol(SymbolNode {
                symbol_version_id: format!("v{node_id}"),
                stable_symbol_id: format!("s{node_id}"),
                kind: SymbolKind::Function,
                name: name.to_string(),
                qualified_name: Some(qname.to_string()),
                language: Lang::Python,
                relative_path: relpath.to_string(),
                start_line: span.0,
                end_line: span.1,
                signature: String::new(),
                docstring: None,
                fingerprint: None,
            }),
        }
    }

    #[test]
    fn python_import_candidates_follow_module_shape() {
        let nodes = vec![
            file_node(0, "pkg/a.py"),
            file_node(1, "pkg/sub/__init__.py"),
            file_node(2, "pkg/b.py"),
        ];
        let root = Path::new("/nonexistent");
        let builder = CrossFileEdgeBuilder::new(root, &nodes);

        assert_eq!(
            builder.resolve_python_import("pkg/b.py", ".a", true),
            Some("pkg/a.py".to_string())
        );
        assert_eq!(
            builder.resolve_python_import("pkg/b.py", ".sub", true),
            Some("pkg/sub/__init__.py".to_string())
        );
        assert_eq!(
            builder.resolve_python_import("pkg/b.py", "pkg.a", false),
            Some("pkg/a.py".to_string())
        );
        assert_eq!(builder.resolve_python_import("pkg/b.py", "os.path", false), None);
    }

    #[test]
    fn python_double_dot_walks_up_one_directory() {
        let nodes = vec![file_node(0, "util.py"), file_node(1, "pkg/deep/mod.py")];
        let builder = CrossFileEdgeBuilder::new(Path::new("/nonexistent"), &nodes);

        assert_eq!(
            builder.resolve_python_import("pkg/deep/mod.py", "..util", true),
            None
        );
        assert_eq!(
            builder.resolve_python_import("pkg/deep/mod.py", "...util", true),
            Some("util.py".to_string())
        );
    }

    #[test]
    fn js_resolution_tries_extensions_then_index() {
        let nodes = vec![
            file_node(0, "src/main.ts"),
            file_node(1, "src/lib/index.ts"),
            file_node(2, "src/util.ts"),
        ];
        let builder = CrossFileEdgeBuilder::new(Path::new("/nonexistent"), &nodes);

        assert_eq!(
            builder.resolve_js_import("src/main.ts", "./util", true),
            Some("src/util.ts".to_string())
        );
        assert_eq!(
            builder.resolve_js_import("src/main.ts", "./lib", true),
            Some("src/lib/index.ts".to_string())
        );
        assert_eq!(builder.resolve_js_import("src/main.ts", "lodash", false), None);
    }

    #[test]
    fn enclosing_symbol_picks_the_tightest_span() {
        let nodes = vec![
            file_node(0, "a.py"),
            symbol_node(1, "a.py", "outer", "outer", (1, 20)),
            symbol_node(2, "a.py", "inner", "outer.inner", (5, 10)),
        ];
        let builder = CrossFileEdgeBuilder::new(Path::new("/nonexistent"), &nodes);

        assert_eq!(builder.find_enclosing_symbol("a.py", 7), Some(2));
        assert_eq!(builder.find_enclosing_symbol("a.py", 15), Some(1));
        assert_eq!(builder.find_enclosing_symbol("a.py", 25), None);
    }

    #[test]
    fn import_map_binds_names_aliases_and_modules() {
        let mut map = LocalImportMap::default();

        update_import_map(
            &mut map,
            &ImportReference {
                module_path: ".utils".into(),
                imported_names: vec!["helper".into()],
                alias: None,
                is_relative: true,
                is_wildcard: false,
                line_number: 1,
            },
            "pkg/utils.py",
        );
        update_import_map(
            &mut map,
            &ImportReference {
                module_path: ".math".into(),
                imported_names: vec!["add".into()],
                alias: Some("plus".into()),
                is_relative: true,
                is_wildcard: false,
                line_number: 2,
            },
            "pkg/math.py",
        );
        update_import_map(
            &mut map,
            &ImportReference {
                module_path: "pkg.tools".into(),
                imported_names: vec![],
                alias: Some("t".into()),
                is_relative: false,
                is_wildcard: false,
                line_number: 3,
            },
            "pkg/tools.py",
        );

        assert_eq!(
            map.name_to_source.get("helper"),
            Some(&("pkg/utils.py".to_string(), "helper".to_string()))
        );
        assert_eq!(
            map.name_to_source.get("plus"),
            Some(&("pkg/math.py".to_string(), "add".to_string()))
        );
        assert_eq!(map.module_aliases.get("t"), Some(&"pkg/tools.py".to_string()));
    }
}
