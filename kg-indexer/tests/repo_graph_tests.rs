//! End-to-end graph construction over real on-disk repositories.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use kg_indexer::graph::repo_builder::{RepoGraphOptions, RepoGraphResult};
use kg_indexer::{EdgeType, NodePayload, RepoGraphBuilder, SymbolKind};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn file_id(result: &RepoGraphResult, relpath: &str) -> u64 {
    result
        .nodes
        .iter()
        .find(|n| n.payload.as_file().is_some_and(|f| f.relative_path == relpath))
        .unwrap_or_else(|| panic!("no file node for {relpath}"))
        .node_id
}

fn symbol_id(result: &RepoGraphResult, relpath: &str, name: &str) -> u64 {
    result
        .nodes
        .iter()
        .find(|n| {
            n.payload
                .as_symbol()
                .is_some_and(|s| s.relative_path == relpath && s.name == name)
        })
        .unwrap_or_else(|| panic!("no symbol node {name} in {relpath}"))
        .node_id
}

fn has_edge(result: &RepoGraphResult, source: u64, target: u64, edge_type: EdgeType) -> bool {
    result
        .edges
        .iter()
        .any(|e| e.source_id == source && e.target_id == target && e.edge_type == edge_type)
}

#[test]
fn two_file_python_import_produces_imports_and_calls() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/__init__.py", "");
    write(dir.path(), "pkg/a.py", "def f():\n    pass\n");
    write(
        dir.path(),
        "pkg/b.py",
        "from .a import f\ndef g():\n    f()\n",
    );

    let result = RepoGraphBuilder::new("repo", Some("sha".into()), dir.path())
        .build()
        .unwrap();

    for relpath in ["pkg", "pkg/__init__.py", "pkg/a.py", "pkg/b.py"] {
        file_id(&result, relpath);
    }

    let a_py = file_id(&result, "pkg/a.py");
    let b_py = file_id(&result, "pkg/b.py");
    let f = symbol_id(&result, "pkg/a.py", "f");
    let g = symbol_id(&result, "pkg/b.py", "g");

    assert!(has_edge(&result, a_py, f, EdgeType::HasSymbol));
    assert!(has_edge(&result, b_py, g, EdgeType::HasSymbol));
    assert!(has_edge(&result, b_py, a_py, EdgeType::Imports));
    assert!(has_edge(&result, g, f, EdgeType::Calls));

    assert_eq!(result.stats.imports_edges, 1);
    assert_eq!(result.stats.calls_edges, 1);
}

#[test]
fn js_relative_import_resolves_through_index_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/lib/index.ts", "export function helper() {}\n");
    write(
        dir.path(),
        "src/main.ts",
        "import {helper} from \"./lib\";\nfunction go() {\n  helper();\n}\n",
    );

    let result = RepoGraphBuilder::new("repo", None, dir.path())
        .build()
        .unwrap();

    let main_ts = file_id(&result, "src/main.ts");
    let index_ts = file_id(&result, "src/lib/index.ts");
    let go = symbol_id(&result, "src/main.ts", "go");
    let helper = symbol_id(&result, "src/lib/index.ts", "helper");

    assert!(has_edge(&result, main_ts, index_ts, EdgeType::Imports));
    assert!(has_edge(&result, go, helper, EdgeType::Calls));
}

#[test]
fn class_containment_yields_contains_symbol() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "x.py", "class C:\n    def m(self):\n        pass\n");

    let result = RepoGraphBuilder::new("repo", None, dir.path())
        .build()
        .unwrap();

    let x_py = file_id(&result, "x.py");
    let c = symbol_id(&result, "x.py", "C");
    let m = symbol_id(&result, "x.py", "m");

    let c_node = result.nodes.iter().find(|n| n.node_id == c).unwrap();
    let m_node = result.nodes.iter().find(|n| n.node_id == m).unwrap();
    let c_sym = c_node.payload.as_symbol().unwrap();
    let m_sym = m_node.payload.as_symbol().unwrap();

    assert_eq!(c_sym.kind, SymbolKind::Class);
    assert_eq!(m_sym.kind, SymbolKind::Method);
    assert_eq!(m_sym.qualified_name.as_deref(), Some("C.m"));

    assert!(has_edge(&result, c, m, EdgeType::ContainsSymbol));
    assert!(has_edge(&result, x_py, c, EdgeType::HasSymbol));
    assert!(has_edge(&result, x_py, m, EdgeType::HasSymbol));

    // Containment spans nest.
    assert!(c_sym.start_line <= m_sym.start_line);
    assert!(c_sym.end_line >= m_sym.end_line);
}

#[test]
fn self_call_is_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/__init__.py", "");
    write(dir.path(), "pkg/a.py", "from .b import unused\ndef g():\n    g()\n");
    write(dir.path(), "pkg/b.py", "def unused():\n    pass\n");

    let result = RepoGraphBuilder::new("repo", None, dir.path())
        .build()
        .unwrap();

    let a_py = file_id(&result, "pkg/a.py");
    let g = symbol_id(&result, "pkg/a.py", "g");

    assert!(has_edge(&result, a_py, g, EdgeType::HasSymbol));
    assert!(
        !result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::Calls && e.source_id == e.target_id),
        "self-referential CALLS edge emitted"
    );
}

#[test]
fn large_file_goes_through_the_chunked_path() {
    let dir = tempfile::tempdir().unwrap();

    let mut big = String::new();
    for i in 0..300 {
        big.push_str(&format!("def f{i}():\n    return {i}\n\n"));
    }
    write(dir.path(), "big.py", &big);
    write(dir.path(), "small.py", "def tiny():\n    pass\n");

    let options = RepoGraphOptions {
        soft_file_limit_bytes: 1000,
        ..RepoGraphOptions::default()
    };
    let result = RepoGraphBuilder::with_options("repo", Some("sha".into()), dir.path(), options)
        .build()
        .unwrap();

    assert_eq!(result.stats.large_files_chunked, 1);
    let symbol_count = result
        .nodes
        .iter()
        .filter(|n| {
            n.payload
                .as_symbol()
                .is_some_and(|s| s.relative_path == "big.py")
        })
        .count();
    assert_eq!(symbol_count, 300);
    assert!(result.stats.symbol_batches_processed >= 300usize.div_ceil(50));
    assert_eq!(
        result.stats.total_files,
        result.stats.indexed_files + result.stats.skipped_files + result.stats.failed_files
    );
}

#[test]
fn method_call_through_tracked_variable_type_resolves() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "utils.py",
        "class Calculator:\n    def add(self, a, b):\n        return a + b\n",
    );
    write(
        dir.path(),
        "main.py",
        "from utils import Calculator\ndef run():\n    calc = Calculator()\n    calc.add(1, 2)\n",
    );

    let result = RepoGraphBuilder::new("repo", None, dir.path())
        .build()
        .unwrap();

    let run = symbol_id(&result, "main.py", "run");
    let add = symbol_id(&result, "utils.py", "add");
    assert!(has_edge(&result, run, add, EdgeType::Calls));
}

#[test]
fn unresolvable_import_is_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "solo.py", "import requests\ndef f():\n    pass\n");

    let result = RepoGraphBuilder::new("repo", None, dir.path())
        .build()
        .unwrap();

    assert_eq!(result.stats.imports_edges, 0);
    assert_eq!(result.stats.failed_files, 0);
    assert_eq!(result.stats.indexed_files, 1);
}

#[test]
fn rebuilding_an_unchanged_tree_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/__init__.py", "");
    write(dir.path(), "pkg/a.py", "def f():\n    return 1\n");
    write(
        dir.path(),
        "pkg/b.py",
        "from .a import f\ndef g():\n    f()\n",
    );
    write(dir.path(), "README.md", "# docs\n\nsome text\n");

    let builder = RepoGraphBuilder::new("repo", Some("sha".into()), dir.path());
    let first = builder.build().unwrap();
    let second = builder.build().unwrap();

    assert_eq!(first.nodes, second.nodes);
    assert_eq!(first.edges, second.edges);

    // Fingerprints are byte-identical across runs.
    let fingerprints = |result: &RepoGraphResult| -> Vec<Option<String>> {
        result
            .nodes
            .iter()
            .filter_map(|n| n.payload.as_symbol())
            .map(|s| s.fingerprint.clone())
            .collect()
    };
    assert_eq!(fingerprints(&first), fingerprints(&second));
}

#[test]
fn build_for_paths_matches_per_file_subgraphs_of_full_build() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/__init__.py", "");
    write(dir.path(), "pkg/a.py", "def f():\n    return 1\n");
    write(dir.path(), "pkg/b.py", "class K:\n    def m(self):\n        pass\n");

    let builder = RepoGraphBuilder::new("repo", Some("sha".into()), dir.path());
    let full = builder.build().unwrap();

    let mut subset_symbols: HashSet<(String, String, String)> = HashSet::new();
    for rel in ["pkg/__init__.py", "pkg/a.py", "pkg/b.py"] {
        let partial = builder.build_for_paths(&[PathBuf::from(rel)]).unwrap();
        for node in &partial.nodes {
            if let NodePayload::Symbol(s) = &node.payload {
                subset_symbols.insert((
                    s.relative_path.clone(),
                    s.name.clone(),
                    s.symbol_version_id.clone(),
                ));
            }
        }
    }

    let full_symbols: HashSet<(String, String, String)> = full
        .nodes
        .iter()
        .filter_map(|n| n.payload.as_symbol())
        .map(|s| {
            (
                s.relative_path.clone(),
                s.name.clone(),
                s.symbol_version_id.clone(),
            )
        })
        .collect();

    assert_eq!(subset_symbols, full_symbols);
}

#[test]
fn symbols_share_stable_id_only_when_structure_matches() {
    let dir = tempfile::tempdir().unwrap();
    // Same structure, different location; the extra blank lines move the
    // second definition without changing its shape.
    write(dir.path(), "one.py", "def same():\n    return 1\n");
    write(dir.path(), "two.py", "\n\n\ndef same():\n    return 2\n");

    let result = RepoGraphBuilder::new("repo", None, dir.path())
        .build()
        .unwrap();

    let symbols: Vec<_> = result
        .nodes
        .iter()
        .filter_map(|n| n.payload.as_symbol())
        .collect();
    assert_eq!(symbols.len(), 2);
    assert_eq!(symbols[0].stable_symbol_id, symbols[1].stable_symbol_id);
    assert_ne!(symbols[0].symbol_version_id, symbols[1].symbol_version_id);
}
