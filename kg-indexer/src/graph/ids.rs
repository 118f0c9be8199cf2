//! Deterministic symbol identities and AST fingerprints.
//!
//! All three functions hash a `|`-delimited composite key with SHA-256 and
//! return lowercase hex. They are pure: same inputs, same output, on any
//! machine.

use sha2::{Digest, Sha256};

use crate::graph::types::SymbolKind;

fn sha256_hex(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{digest:x}")
}

/// Structural fingerprint over the pre-order AST node-type sequence.
///
/// Depends only on grammar node types, never on whitespace or identifier
/// text, so structurally identical code hashes identically.
pub fn fingerprint_from_node_types(node_types: &[String]) -> String {
    sha256_hex(&node_types.join("|"))
}

/// Snapshot-scoped symbol identity: changes when the symbol's location or
/// declaration span changes within a commit.
pub fn symbol_version_id(
    commit_sha: Option<&str>,
    relative_path: &str,
    kind: SymbolKind,
    name: &str,
    qualified_name: Option<&str>,
    start_line: usize,
    end_line: usize,
) -> String {
    let key = format!(
        "v1|{}|{}|{}|{}|{}|{}|{}",
        commit_sha.unwrap_or(""),
        relative_path,
        kind,
        name,
        qualified_name.unwrap_or(""),
        start_line,
        end_line,
    );
    sha256_hex(&key)
}

/// Cross-snapshot logical identity: stable while the symbol's qualified name
/// and AST structure are stable, regardless of where it moved in the file.
pub fn stable_symbol_id(
    repo_id: &str,
    kind: SymbolKind,
    qualified_name: Option<&str>,
    name: &str,
    fingerprint: Option<&str>,
) -> String {
    let key = format!(
        "s1|{}|{}|{}|{}|{}",
        repo_id,
        kind,
        qualified_name.unwrap_or(""),
        name,
        fingerprint.unwrap_or(""),
    );
    sha256_hex(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_id_is_a_pure_function_of_inputs() {
        let a = symbol_version_id(
            Some("abc123"),
            "pkg/a.py",
            SymbolKind::Function,
            "f",
            Some("f"),
            1,
            2,
        );
        let b = symbol_version_id(
            Some("abc123"),
            "pkg/a.py",
            SymbolKind::Function,
            "f",
            Some("f"),
            1,
            2,
        );
        assert_eq!(a, b);

        let moved = symbol_version_id(
            Some("abc123"),
            "pkg/a.py",
            SymbolKind::Function,
            "f",
            Some("f"),
            10,
            11,
        );
        assert_ne!(a, moved);
    }

    #[test]
    fn stable_id_ignores_location_but_not_structure() {
        let fp1 = fingerprint_from_node_types(&[
            "function_definition".into(),
            "identifier".into(),
            "parameters".into(),
            "block".into(),
        ]);
        let fp2 = fingerprint_from_node_types(&[
            "function_definition".into(),
            "identifier".into(),
            "parameters".into(),
            "block".into(),
            "return_statement".into(),
        ]);

        let a = stable_symbol_id("repo", SymbolKind::Function, Some("f"), "f", Some(&fp1));
        let b = stable_symbol_id("repo", SymbolKind::Function, Some("f"), "f", Some(&fp1));
        let c = stable_symbol_id("repo", SymbolKind::Function, Some("f"), "f", Some(&fp2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_depends_only_on_the_type_sequence() {
        let seq: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(
            fingerprint_from_node_types(&seq),
            fingerprint_from_node_types(&seq.clone())
        );
        let reordered: Vec<String> = vec!["b".into(), "a".into(), "c".into()];
        assert_ne!(
            fingerprint_from_node_types(&seq),
            fingerprint_from_node_types(&reordered)
        );
    }
}
