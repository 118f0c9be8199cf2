//! Parsing façade: extension → language mapping and Tree-sitter invocation.
//!
//! A new `Parser` is created per call; grammar handles are cheap and this
//! keeps the façade safe to use from parallel per-file tasks.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tree_sitter::{Parser, Tree};

use crate::errors::{IndexerError, Result};

/// Language discriminator for indexed files.
///
/// `Dockerfile` is detected by filename; it carries no grammar here, so such
/// files are recognized but skipped by the symbol pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Dockerfile,
    Unknown,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case("dockerfile"))
        {
            return Language::Dockerfile;
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("py") => Language::Python,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            Some("ts") | Some("tsx") => Language::TypeScript,
            Some("rs") => Language::Rust,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Dockerfile => "dockerfile",
            Language::Unknown => "unknown",
        }
    }

    /// Parse the storage form back into the enum.
    pub fn parse(s: &str) -> Self {
        match s {
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "rust" => Language::Rust,
            "dockerfile" => Language::Dockerfile,
            _ => Language::Unknown,
        }
    }

    /// True when a Tree-sitter grammar is wired up for this language.
    pub fn has_grammar(&self) -> bool {
        self.grammar().is_some()
    }

    fn grammar(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Dockerfile | Language::Unknown => None,
        }
    }

    /// Languages the cross-file reference resolver understands.
    pub fn supports_reference_extraction(&self) -> bool {
        matches!(
            self,
            Language::Python | Language::JavaScript | Language::TypeScript
        )
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed file: the ephemeral tree, the detected language, and the raw
/// bytes the tree's byte offsets refer to.
#[derive(Debug)]
pub struct ParsedFile {
    pub tree: Tree,
    pub language: Language,
    pub source: Vec<u8>,
}

impl ParsedFile {
    /// A parse whose root has errors or no children is non-actionable: the
    /// caller records the file as indexed with zero symbols and moves on.
    pub fn is_actionable(&self) -> bool {
        let root = self.tree.root_node();
        !root.has_error() && root.child_count() > 0
    }
}

/// Check whether the façade can parse this file at all.
pub fn support_file(path: &Path) -> bool {
    Language::from_path(path).has_grammar()
}

/// Parse a source file, returning the tree together with its language.
///
/// # Errors
/// - [`IndexerError::UnsupportedLanguage`] when no grammar maps to the file.
/// - [`IndexerError::Parse`] wrapping I/O or parser failures.
pub fn parse_file(path: &Path) -> Result<ParsedFile> {
    let language = Language::from_path(path);
    let Some(grammar) = language.grammar() else {
        return Err(IndexerError::UnsupportedLanguage {
            path: path.to_path_buf(),
        });
    };

    let source = fs::read(path).map_err(|e| IndexerError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexerError::Parse {
            path: path.to_path_buf(),
            message: format!("grammar rejected: {e}"),
        })?;

    let tree = parser
        .parse(&source, None)
        .ok_or_else(|| IndexerError::Parse {
            path: path.to_path_buf(),
            message: "tree-sitter returned no tree".to_string(),
        })?;

    debug!(path = %path.display(), language = %language, "parsed file");
    Ok(ParsedFile {
        tree,
        language,
        source,
    })
}

/// Parse an in-memory snippet for unit tests, bypassing the filesystem.
#[cfg(test)]
pub(crate) fn parse_source_for_tests(code: &str, language: Language) -> ParsedFile {
    let grammar = language.grammar().expect("test language must have a grammar");
    let mut parser = Parser::new();
    parser.set_language(&grammar).expect("grammar loads");
    let source = code.as_bytes().to_vec();
    let tree = parser.parse(&source, None).expect("parse succeeds");
    ParsedFile {
        tree,
        language,
        source,
    }
}
