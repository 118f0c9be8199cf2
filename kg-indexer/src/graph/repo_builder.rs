//! Whole-repository graph construction.
//!
//! Drives a deterministic depth-first walk of the repo root: directories and
//! files become FileNodes linked with HAS_FILE, per-file subgraphs come from
//! [`FileGraphBuilder`], oversize files stream through the chunked extractor,
//! and a final second pass adds cross-file IMPORTS/CALLS edges.
//!
//! Node ids come from a single monotonically increasing allocator that moves
//! in lockstep with the node buffer: rollback of a failed chunked file
//! truncates both, so the id space never has holes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::errors::{IndexerError, Result};
use crate::extractor::chunked::ChunkedSymbolExtractor;
use crate::graph::cross_file::CrossFileEdgeBuilder;
use crate::graph::file_builder::FileGraphBuilder;
use crate::graph::types::{
    EdgeType, FileNode, KnowledgeGraphEdge, KnowledgeGraphNode, NodePayload,
};
use crate::stats::IndexingStats;

/// Directory names never descended into (build output, VCS, caches).
pub const DEFAULT_EXCLUDED_DIRS: [&str; 21] = [
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "build",
    "dist",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".dart_tool",
    "coverage",
    ".next",
    "*.egg-info",
    ".cache",
];

/// File names never indexed (lock files and similar).
pub const DEFAULT_EXCLUDED_FILES: [&str; 10] = [
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "poetry.lock",
    "pipfile.lock",
    "cargo.lock",
    "composer.lock",
    "gemfile.lock",
    "go.sum",
    ".ds_store",
];

/// Hidden entries that stay indexable despite the leading dot.
const HIDDEN_ALLOWLIST: [&str; 2] = [".env", ".envrc"];

/// Tunables for a repository pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoGraphOptions {
    pub excluded_dirs: Vec<String>,
    pub excluded_files: Vec<String>,
    /// Above this size a file takes the memory-bounded chunked path.
    pub soft_file_limit_bytes: u64,
    /// Above this size a file is skipped outright.
    pub hard_file_limit_bytes: u64,
    pub max_symbols_per_file: usize,
    pub text_chunk_size: usize,
    pub text_chunk_overlap: usize,
    pub symbol_batch_size: usize,
    pub gc_interval_batches: usize,
}

impl Default for RepoGraphOptions {
    fn default() -> Self {
        Self {
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            excluded_files: DEFAULT_EXCLUDED_FILES.iter().map(|s| s.to_string()).collect(),
            soft_file_limit_bytes: 1_000_000,
            hard_file_limit_bytes: 10_000_000,
            max_symbols_per_file: 500,
            text_chunk_size: 1000,
            text_chunk_overlap: 200,
            symbol_batch_size: 50,
            gc_interval_batches: 5,
        }
    }
}

/// Result of building a repository knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoGraphResult {
    /// Node id of the repository root FileNode.
    pub root_node_id: u64,
    pub nodes: Vec<KnowledgeGraphNode>,
    pub edges: Vec<KnowledgeGraphEdge>,
    pub stats: IndexingStats,
}

/// Growing buffers of one pass; the allocator and the node buffer only ever
/// move together.
struct GraphBuffers {
    nodes: Vec<KnowledgeGraphNode>,
    edges: Vec<KnowledgeGraphEdge>,
    stats: IndexingStats,
    next_node_id: u64,
}

impl GraphBuffers {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            stats: IndexingStats::default(),
            next_node_id: 0,
        }
    }

    fn push_node(&mut self, payload: NodePayload) -> u64 {
        let node_id = self.next_node_id;
        self.nodes.push(KnowledgeGraphNode { node_id, payload });
        self.next_node_id += 1;
        node_id
    }

    fn watermark(&self) -> (usize, usize, usize, u64) {
        (
            self.nodes.len(),
            self.edges.len(),
            self.stats.symbol_batches_processed,
            self.next_node_id,
        )
    }

    /// Truncate buffers, counters, and the id allocator back to a watermark.
    fn rollback_to(&mut self, watermark: (usize, usize, usize, u64)) {
        let (nodes_len, edges_len, batches, next_node_id) = watermark;
        self.nodes.truncate(nodes_len);
        self.edges.truncate(edges_len);
        self.stats.symbol_batches_processed = batches;
        self.next_node_id = next_node_id;
    }
}

/// Builds the complete knowledge graph for a repository checkout.
pub struct RepoGraphBuilder {
    repo_id: String,
    commit_sha: Option<String>,
    repo_root: PathBuf,
    options: RepoGraphOptions,
    dir_globs: Option<GlobSet>,
    file_builder: FileGraphBuilder,
    chunked_extractor: ChunkedSymbolExtractor,
}

impl RepoGraphBuilder {
    pub fn new(
        repo_id: impl Into<String>,
        commit_sha: Option<String>,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self::with_options(repo_id, commit_sha, repo_root, RepoGraphOptions::default())
    }

    pub fn with_options(
        repo_id: impl Into<String>,
        commit_sha: Option<String>,
        repo_root: impl Into<PathBuf>,
        options: RepoGraphOptions,
    ) -> Self {
        let repo_id = repo_id.into();
        let file_builder = FileGraphBuilder::new(
            repo_id.clone(),
            commit_sha.clone(),
            options.max_symbols_per_file,
            options.text_chunk_size,
            options.text_chunk_overlap,
        );
        let chunked_extractor =
            ChunkedSymbolExtractor::new(options.symbol_batch_size, options.gc_interval_batches);
        let dir_globs = build_globset(&options.excluded_dirs);

        Self {
            repo_id,
            commit_sha,
            repo_root: repo_root.into(),
            options,
            dir_globs,
            file_builder,
            chunked_extractor,
        }
    }

    /// Build the full repository graph, including the cross-file pass.
    pub fn build(&self) -> Result<RepoGraphResult> {
        if !self.repo_root.exists() {
            return Err(IndexerError::RootNotFound(self.repo_root.clone()));
        }
        if !self.repo_root.is_dir() {
            return Err(IndexerError::RootNotADirectory(self.repo_root.clone()));
        }

        let mut buf = GraphBuffers::new();

        let basename = self
            .repo_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("root")
            .to_string();
        let root_node_id = buf.push_node(NodePayload::File(FileNode {
            basename,
            relative_path: ".".to_string(),
        }));
        buf.stats.total_directories += 1;

        self.build_directory_graph(&self.repo_root, root_node_id, &mut buf);
        self.add_cross_file_edges(&mut buf);

        info!(
            repo_id = %self.repo_id,
            indexed = buf.stats.indexed_files,
            symbols = buf.stats.total_symbols,
            text_chunks = buf.stats.total_text_chunks,
            chunked = buf.stats.large_files_chunked,
            skipped = buf.stats.skipped_files,
            failed = buf.stats.failed_files,
            "finished building repo graph"
        );

        Ok(RepoGraphResult {
            root_node_id,
            nodes: buf.nodes,
            edges: buf.edges,
            stats: buf.stats,
        })
    }

    /// Build a graph covering only the given repo-relative files, creating
    /// the minimal directory chain needed to anchor each under the root.
    pub fn build_for_paths(&self, file_paths: &[PathBuf]) -> Result<RepoGraphResult> {
        let mut buf = GraphBuffers::new();
        let mut dir_nodes: HashMap<String, u64> = HashMap::new();

        let basename = self
            .repo_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("root")
            .to_string();
        let root_node_id = buf.push_node(NodePayload::File(FileNode {
            basename,
            relative_path: ".".to_string(),
        }));
        dir_nodes.insert(".".to_string(), root_node_id);
        buf.stats.total_directories += 1;

        for file_path in file_paths {
            let abs_path = self.repo_root.join(file_path);
            let relative_path = posix_relative(file_path);

            if !abs_path.exists() {
                warn!(path = %abs_path.display(), "requested file does not exist");
                buf.stats.total_files += 1;
                buf.stats.skipped_files += 1;
                continue;
            }
            if !abs_path.is_file() {
                continue;
            }

            buf.stats.total_files += 1;

            let Some(strategy) = self.classify_file(&abs_path, &mut buf.stats) else {
                continue;
            };

            let parent_node_id =
                self.ensure_directory_chain(&relative_path, root_node_id, &mut buf, &mut dir_nodes);
            let file_node_id = self.create_file_node(&abs_path, &relative_path, parent_node_id, &mut buf);

            match strategy {
                FileStrategy::Chunked => {
                    self.process_large_file(&abs_path, file_node_id, &relative_path, &mut buf)
                }
                FileStrategy::Regular => {
                    self.process_regular_file(&abs_path, file_node_id, &relative_path, &mut buf)
                }
            }
        }

        self.add_cross_file_edges(&mut buf);

        Ok(RepoGraphResult {
            root_node_id,
            nodes: buf.nodes,
            edges: buf.edges,
            stats: buf.stats,
        })
    }

    fn build_directory_graph(&self, dir_path: &Path, parent_node_id: u64, buf: &mut GraphBuffers) {
        let mut entries = match fs::read_dir(dir_path) {
            Ok(iter) => iter.filter_map(|e| e.ok()).collect::<Vec<_>>(),
            Err(e) => {
                warn!(path = %dir_path.display(), error = %e, "cannot read directory");
                buf.stats
                    .errors
                    .push(format!("cannot read directory {}: {e}", dir_path.display()));
                return;
            }
        };

        // Deterministic order: directories first, then files, each sorted by
        // lowercased name.
        entries.sort_by_key(|entry| {
            (
                !entry.path().is_dir(),
                entry.file_name().to_string_lossy().to_lowercase(),
            )
        });

        for entry in entries {
            let path = entry.path();
            let is_dir = path.is_dir();

            if self.should_exclude(&path, is_dir) {
                if path.is_file() {
                    buf.stats.total_files += 1;
                    buf.stats.skipped_files += 1;
                }
                continue;
            }

            let relative_path = self.relative_path_of(&path);

            if is_dir {
                let dir_node_id = buf.push_node(NodePayload::File(FileNode {
                    basename: entry.file_name().to_string_lossy().into_owned(),
                    relative_path,
                }));
                buf.stats.total_directories += 1;
                buf.edges.push(KnowledgeGraphEdge::new(
                    parent_node_id,
                    dir_node_id,
                    EdgeType::HasFile,
                ));
                self.build_directory_graph(&path, dir_node_id, buf);
            } else if path.is_file() {
                buf.stats.total_files += 1;

                let Some(strategy) = self.classify_file(&path, &mut buf.stats) else {
                    continue;
                };

                let file_node_id =
                    self.create_file_node(&path, &relative_path, parent_node_id, buf);

                match strategy {
                    FileStrategy::Chunked => {
                        self.process_large_file(&path, file_node_id, &relative_path, buf)
                    }
                    FileStrategy::Regular => {
                        self.process_regular_file(&path, file_node_id, &relative_path, buf)
                    }
                }
            }
        }
    }

    /// Apply the size policy and support check; `None` means skip (already
    /// counted).
    fn classify_file(&self, path: &Path, stats: &mut IndexingStats) -> Option<FileStrategy> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                stats.skipped_files += 1;
                return None;
            }
        };

        if size >= self.options.hard_file_limit_bytes {
            warn!(
                path = %path.display(),
                size,
                limit = self.options.hard_file_limit_bytes,
                "skipping file at or over the hard size limit"
            );
            stats.skipped_files += 1;
            return None;
        }

        if !self.file_builder.support_file(path) {
            stats.skipped_files += 1;
            return None;
        }

        if size > self.options.soft_file_limit_bytes {
            Some(FileStrategy::Chunked)
        } else {
            Some(FileStrategy::Regular)
        }
    }

    fn create_file_node(
        &self,
        path: &Path,
        relative_path: &str,
        parent_node_id: u64,
        buf: &mut GraphBuffers,
    ) -> u64 {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative_path.to_string());
        let file_node_id = buf.push_node(NodePayload::File(FileNode {
            basename,
            relative_path: relative_path.to_string(),
        }));
        buf.edges.push(KnowledgeGraphEdge::new(
            parent_node_id,
            file_node_id,
            EdgeType::HasFile,
        ));
        file_node_id
    }

    fn process_regular_file(
        &self,
        path: &Path,
        file_node_id: u64,
        relative_path: &str,
        buf: &mut GraphBuffers,
    ) {
        match self
            .file_builder
            .build_file_graph(file_node_id, relative_path, path, buf.next_node_id)
        {
            Ok(output) => {
                for node in &output.nodes {
                    match &node.payload {
                        NodePayload::Symbol(_) => buf.stats.total_symbols += 1,
                        NodePayload::Text(_) => buf.stats.total_text_chunks += 1,
                        NodePayload::File(_) => {}
                    }
                }
                buf.stats.symbols_truncated += output.symbols_truncated;
                buf.next_node_id = output.next_node_id;
                buf.nodes.extend(output.nodes);
                buf.edges.extend(output.edges);
                buf.stats.indexed_files += 1;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to build file graph");
                buf.stats.failed_files += 1;
                buf.stats
                    .errors
                    .push(format!("failed to parse {relative_path}: {e}"));
            }
        }
    }

    fn process_large_file(
        &self,
        path: &Path,
        file_node_id: u64,
        relative_path: &str,
        buf: &mut GraphBuffers,
    ) {
        info!(path = %path.display(), "processing large file with chunked extraction");
        let watermark = buf.watermark();

        let batches = match self.chunked_extractor.extract_symbols_chunked(
            path,
            file_node_id,
            relative_path,
            &self.repo_id,
            self.commit_sha.as_deref(),
            buf.next_node_id,
            self.options.max_symbols_per_file,
        ) {
            Ok(batches) => batches,
            Err(e) => {
                // Revert everything this file appended so the id allocator
                // and the node buffer stay in lockstep.
                buf.rollback_to(watermark);
                error!(path = %path.display(), error = %e, "chunked extraction failed");
                buf.stats.failed_files += 1;
                buf.stats
                    .errors
                    .push(format!("failed to parse large file {relative_path}: {e}"));
                return;
            }
        };

        buf.stats.symbols_truncated += batches.symbols_truncated();

        let mut symbol_count = 0usize;
        for batch in batches {
            debug!(
                batch = batch.batch_number,
                symbols = batch.symbols_in_batch,
                file = relative_path,
                "appending chunked batch"
            );
            buf.next_node_id += batch.nodes.len() as u64;
            symbol_count += batch.symbols_in_batch;
            buf.nodes.extend(batch.nodes);
            buf.edges.extend(batch.edges);
            buf.stats.symbol_batches_processed += 1;
        }

        buf.stats.total_symbols += symbol_count;
        buf.stats.indexed_files += 1;
        buf.stats.large_files_chunked += 1;
    }

    /// Synthesize (and dedupe) the directory chain anchoring `relative_path`.
    fn ensure_directory_chain(
        &self,
        relative_path: &str,
        root_node_id: u64,
        buf: &mut GraphBuffers,
        dir_nodes: &mut HashMap<String, u64>,
    ) -> u64 {
        let mut parent_id = root_node_id;
        let mut current = String::new();

        let Some((dirs, _file)) = relative_path.rsplit_once('/') else {
            return parent_id;
        };

        for part in dirs.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);

            let dir_id = match dir_nodes.get(current.as_str()) {
                Some(id) => *id,
                None => {
                    let dir_id = buf.push_node(NodePayload::File(FileNode {
                        basename: part.to_string(),
                        relative_path: current.clone(),
                    }));
                    buf.stats.total_directories += 1;
                    buf.edges
                        .push(KnowledgeGraphEdge::new(parent_id, dir_id, EdgeType::HasFile));
                    dir_nodes.insert(current.clone(), dir_id);
                    dir_id
                }
            };
            parent_id = dir_id;
        }

        parent_id
    }

    fn add_cross_file_edges(&self, buf: &mut GraphBuffers) {
        let cross = CrossFileEdgeBuilder::new(&self.repo_root, &buf.nodes).build();
        buf.stats.imports_edges += cross.imports_count;
        buf.stats.calls_edges += cross.calls_count;
        buf.edges.extend(cross.edges);
    }

    fn relative_path_of(&self, path: &Path) -> String {
        match path.strip_prefix(&self.repo_root) {
            Ok(rel) => posix_relative(rel),
            Err(_) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    fn should_exclude(&self, path: &Path, is_dir: bool) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };
        let lower = name.to_lowercase();

        if is_dir {
            if self.options.excluded_dirs.iter().any(|d| d == &lower) {
                return true;
            }
            if let Some(globs) = &self.dir_globs {
                if globs.is_match(&lower) {
                    return true;
                }
            }
        } else if self.options.excluded_files.iter().any(|f| f == &lower) {
            return true;
        }

        // Hidden entries are excluded except for a small allowlist.
        lower.starts_with('.') && !HIDDEN_ALLOWLIST.contains(&lower.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum FileStrategy {
    Regular,
    Chunked,
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    let wildcard: Vec<&String> = patterns.iter().filter(|p| p.contains('*')).collect();
    if wildcard.is_empty() {
        return None;
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in wildcard {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "ignoring invalid exclusion glob"),
        }
    }
    builder.build().ok()
}

fn posix_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
