//! Batched idempotent node/edge upserts and TTL cleanup.

use std::collections::BTreeMap;

use chrono::Utc;
use duckdb::{Connection, params};
use kg_indexer::{
    KnowledgeGraphEdge, KnowledgeGraphNode, NodePayload, PersistenceStats,
};
use tracing::{debug, info, warn};

use crate::errors::{Result, StoreError};
use crate::SharedConnection;

/// Rows per statement loop inside one transaction; tuned for the transport.
const UPSERT_BATCH_SIZE: usize = 400;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Store for the repository-scoped labeled property graph.
///
/// Constructed per activity invocation; the underlying connection is shared
/// behind a mutex and dropped when the last store handle goes away.
pub struct KnowledgeGraphStore {
    conn: SharedConnection,
}

impl KnowledgeGraphStore {
    /// Wrap a shared connection and bootstrap the schema (idempotent).
    pub async fn with_connection(conn: SharedConnection) -> Result<Self> {
        {
            let guard = conn.lock().await;
            Self::initialize_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kg_nodes (
                repo_id TEXT NOT NULL,
                node_id BIGINT NOT NULL,
                node_type TEXT NOT NULL,
                basename TEXT,
                relative_path TEXT,
                kind TEXT,
                name TEXT,
                qualified_name TEXT,
                language TEXT,
                start_line BIGINT,
                end_line BIGINT,
                signature TEXT,
                docstring TEXT,
                fingerprint TEXT,
                symbol_version_id TEXT,
                stable_symbol_id TEXT,
                chunk_text TEXT,
                last_indexed_at BIGINT NOT NULL,
                PRIMARY KEY (repo_id, node_id)
            );

            -- Repository-scoped filtering
            CREATE INDEX IF NOT EXISTS idx_kg_nodes_repo
            ON kg_nodes(repo_id);

            -- Cleanup horizon scans
            CREATE INDEX IF NOT EXISTS idx_kg_nodes_last_indexed
            ON kg_nodes(last_indexed_at);

            CREATE TABLE IF NOT EXISTS kg_edges (
                repo_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                source_node_id BIGINT NOT NULL,
                target_node_id BIGINT NOT NULL,
                PRIMARY KEY (repo_id, edge_type, source_node_id, target_node_id)
            );

            CREATE INDEX IF NOT EXISTS idx_kg_edges_repo
            ON kg_edges(repo_id);
            "#,
        )
        .map_err(|e| StoreError::Storage(format!("failed to initialize kg schema: {e}")))?;

        debug!("knowledge-graph schema initialized");
        Ok(())
    }

    /// Upsert the full graph, nodes before edges, and report created/updated
    /// counts derived from before/after totals.
    pub async fn persist_graph(
        &self,
        repo_id: &str,
        nodes: &[KnowledgeGraphNode],
        edges: &[KnowledgeGraphEdge],
    ) -> Result<PersistenceStats> {
        info!(
            repo_id,
            nodes = nodes.len(),
            edges = edges.len(),
            "persisting knowledge graph"
        );

        let initial_nodes = self.count_nodes(repo_id).await?;
        let initial_edges = self.count_edges(repo_id).await?;

        self.batch_upsert_nodes(repo_id, nodes, Utc::now().timestamp_micros())
            .await?;
        self.batch_upsert_edges(repo_id, edges).await?;

        let final_nodes = self.count_nodes(repo_id).await?;
        let final_edges = self.count_edges(repo_id).await?;

        let nodes_created = final_nodes.saturating_sub(initial_nodes);
        let edges_created = final_edges.saturating_sub(initial_edges);

        let stats = PersistenceStats {
            nodes_created,
            nodes_updated: nodes.len().saturating_sub(nodes_created),
            edges_created,
            edges_updated: edges.len().saturating_sub(edges_created),
            errors: Vec::new(),
        };

        info!(
            repo_id,
            nodes_created = stats.nodes_created,
            nodes_updated = stats.nodes_updated,
            edges_created = stats.edges_created,
            edges_updated = stats.edges_updated,
            "persistence complete"
        );
        Ok(stats)
    }

    /// Upsert nodes grouped by node type.
    ///
    /// Every row, created or matched, gets `last_indexed_at` refreshed to
    /// `indexed_at_micros`; cleanup depends on this.
    pub async fn batch_upsert_nodes(
        &self,
        repo_id: &str,
        nodes: &[KnowledgeGraphNode],
        indexed_at_micros: i64,
    ) -> Result<()> {
        if nodes.is_empty() {
            debug!("no nodes to upsert");
            return Ok(());
        }

        let mut by_type: BTreeMap<&'static str, Vec<&KnowledgeGraphNode>> = BTreeMap::new();
        for node in nodes {
            by_type.entry(node.payload.node_type()).or_default().push(node);
        }

        let mut conn = self.conn.lock().await;
        for (node_type, group) in by_type {
            debug!(repo_id, node_type, count = group.len(), "upserting node group");
            for chunk in group.chunks(UPSERT_BATCH_SIZE) {
                let tx = conn
                    .transaction()
                    .map_err(|e| StoreError::Storage(format!("failed to begin transaction: {e}")))?;
                {
                    let mut stmt = tx
                        .prepare(
                            r#"INSERT INTO kg_nodes (
                                repo_id, node_id, node_type,
                                basename, relative_path,
                                kind, name, qualified_name, language,
                                start_line, end_line, signature, docstring,
                                fingerprint, symbol_version_id, stable_symbol_id,
                                chunk_text, last_indexed_at
                            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                            ON CONFLICT (repo_id, node_id) DO UPDATE SET
                                node_type = excluded.node_type,
                                basename = excluded.basename,
                                relative_path = excluded.relative_path,
                                kind = excluded.kind,
                                name = excluded.name,
                                qualified_name = excluded.qualified_name,
                                language = excluded.language,
                                start_line = excluded.start_line,
                                end_line = excluded.end_line,
                                signature = excluded.signature,
                                docstring = excluded.docstring,
                                fingerprint = excluded.fingerprint,
                                symbol_version_id = excluded.symbol_version_id,
                                stable_symbol_id = excluded.stable_symbol_id,
                                chunk_text = excluded.chunk_text,
                                last_indexed_at = excluded.last_indexed_at
                            "#,
                        )
                        .map_err(|e| {
                            StoreError::Storage(format!("failed to prepare node upsert: {e}"))
                        })?;

                    for node in chunk {
                        let row = NodeRow::from_node(node);
                        stmt.execute(params![
                            repo_id,
                            node.node_id as i64,
                            row.node_type,
                            row.basename,
                            row.relative_path,
                            row.kind,
                            row.name,
                            row.qualified_name,
                            row.language,
                            row.start_line,
                            row.end_line,
                            row.signature,
                            row.docstring,
                            row.fingerprint,
                            row.symbol_version_id,
                            row.stable_symbol_id,
                            row.chunk_text,
                            indexed_at_micros,
                        ])
                        .map_err(|e| {
                            StoreError::Storage(format!("failed to upsert node: {e}"))
                        })?;
                    }
                }
                tx.commit()
                    .map_err(|e| StoreError::Storage(format!("failed to commit nodes: {e}")))?;
            }
        }

        Ok(())
    }

    /// Upsert edges grouped by edge type. An edge whose endpoints are not
    /// both present is silently skipped; the upstream invariant is that all
    /// endpoints were written in an earlier or the same batch.
    pub async fn batch_upsert_edges(
        &self,
        repo_id: &str,
        edges: &[KnowledgeGraphEdge],
    ) -> Result<()> {
        if edges.is_empty() {
            debug!("no edges to upsert");
            return Ok(());
        }

        // Endpoints must already be in the store; edges whose endpoints are
        // missing are skipped, not errors.
        let known_nodes = self.node_id_set(repo_id).await?;

        let mut by_type: BTreeMap<&'static str, Vec<&KnowledgeGraphEdge>> = BTreeMap::new();
        let mut skipped = 0usize;
        for edge in edges {
            if !known_nodes.contains(&edge.source_id) || !known_nodes.contains(&edge.target_id) {
                skipped += 1;
                continue;
            }
            by_type.entry(edge.edge_type.as_str()).or_default().push(edge);
        }
        if skipped > 0 {
            warn!(repo_id, skipped, "skipped edges with missing endpoints");
        }

        let mut conn = self.conn.lock().await;
        for (edge_type, group) in by_type {
            debug!(repo_id, edge_type, count = group.len(), "upserting edge group");
            for chunk in group.chunks(UPSERT_BATCH_SIZE) {
                let tx = conn
                    .transaction()
                    .map_err(|e| StoreError::Storage(format!("failed to begin transaction: {e}")))?;
                {
                    let mut stmt = tx
                        .prepare(
                            r#"INSERT INTO kg_edges (
                                repo_id, edge_type, source_node_id, target_node_id
                            ) VALUES (?, ?, ?, ?)
                            ON CONFLICT (repo_id, edge_type, source_node_id, target_node_id)
                            DO NOTHING
                            "#,
                        )
                        .map_err(|e| {
                            StoreError::Storage(format!("failed to prepare edge upsert: {e}"))
                        })?;

                    for edge in chunk {
                        stmt.execute(params![
                            repo_id,
                            edge_type,
                            edge.source_id as i64,
                            edge.target_id as i64,
                        ])
                        .map_err(|e| {
                            StoreError::Storage(format!("failed to upsert edge: {e}"))
                        })?;
                    }
                }
                tx.commit()
                    .map_err(|e| StoreError::Storage(format!("failed to commit edges: {e}")))?;
            }
        }

        Ok(())
    }

    /// All node ids currently stored for a repository.
    async fn node_id_set(&self, repo_id: &str) -> Result<std::collections::HashSet<u64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT node_id FROM kg_nodes WHERE repo_id = ?")
            .map_err(|e| StoreError::Storage(format!("failed to prepare node id query: {e}")))?;

        let rows = stmt
            .query_map(params![repo_id], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Storage(format!("failed to query node ids: {e}")))?;

        let mut ids = std::collections::HashSet::new();
        for row in rows {
            let id = row.map_err(|e| StoreError::Storage(format!("failed to read node id: {e}")))?;
            ids.insert(id as u64);
        }
        Ok(ids)
    }

    /// Delete nodes whose `last_indexed_at` fell outside the TTL window,
    /// detaching every edge that touches them. Returns the node count.
    pub async fn cleanup_stale_nodes(&self, repo_id: &str, ttl_days: i64) -> Result<usize> {
        let cutoff = Utc::now().timestamp_micros() - ttl_days * MICROS_PER_DAY;
        self.cleanup_nodes_older_than(repo_id, cutoff).await
    }

    /// TTL cleanup against an explicit cutoff timestamp (micros since epoch).
    pub async fn cleanup_nodes_older_than(
        &self,
        repo_id: &str,
        cutoff_micros: i64,
    ) -> Result<usize> {
        info!(repo_id, cutoff_micros, "cleaning up stale nodes");
        let conn = self.conn.lock().await;

        // Detach first: no edge may survive a deleted endpoint.
        conn.execute(
            r#"DELETE FROM kg_edges
               WHERE repo_id = ?
                 AND (source_node_id IN (
                        SELECT node_id FROM kg_nodes
                        WHERE repo_id = ? AND last_indexed_at < ?)
                   OR target_node_id IN (
                        SELECT node_id FROM kg_nodes
                        WHERE repo_id = ? AND last_indexed_at < ?))"#,
            params![repo_id, repo_id, cutoff_micros, repo_id, cutoff_micros],
        )
        .map_err(|e| StoreError::Storage(format!("failed to detach stale edges: {e}")))?;

        let deleted = conn
            .execute(
                "DELETE FROM kg_nodes WHERE repo_id = ? AND last_indexed_at < ?",
                params![repo_id, cutoff_micros],
            )
            .map_err(|e| StoreError::Storage(format!("failed to delete stale nodes: {e}")))?;

        info!(repo_id, deleted, "stale node cleanup complete");
        Ok(deleted)
    }

    /// Delete the whole graph for a repository. Returns the node count.
    pub async fn clear_repo_graph(&self, repo_id: &str) -> Result<usize> {
        warn!(repo_id, "clearing entire repository graph");
        let conn = self.conn.lock().await;

        conn.execute("DELETE FROM kg_edges WHERE repo_id = ?", params![repo_id])
            .map_err(|e| StoreError::Storage(format!("failed to delete edges: {e}")))?;
        let deleted = conn
            .execute("DELETE FROM kg_nodes WHERE repo_id = ?", params![repo_id])
            .map_err(|e| StoreError::Storage(format!("failed to delete nodes: {e}")))?;

        Ok(deleted)
    }

    pub async fn count_nodes(&self, repo_id: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM kg_nodes WHERE repo_id = ?",
                params![repo_id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Storage(format!("failed to count nodes: {e}")))?;
        Ok(count as usize)
    }

    pub async fn count_edges(&self, repo_id: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM kg_edges WHERE repo_id = ?",
                params![repo_id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Storage(format!("failed to count edges: {e}")))?;
        Ok(count as usize)
    }

    /// Nodes anchored to one relative path (the file node plus its symbols).
    pub async fn count_nodes_for_path(&self, repo_id: &str, relative_path: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM kg_nodes WHERE repo_id = ? AND relative_path = ?",
                params![repo_id, relative_path],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Storage(format!("failed to count nodes by path: {e}")))?;
        Ok(count as usize)
    }

    /// Read back every node anchored to one relative path, in id order.
    pub async fn nodes_for_path(
        &self,
        repo_id: &str,
        relative_path: &str,
    ) -> Result<Vec<KnowledgeGraphNode>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "{NODE_SELECT} WHERE repo_id = ? AND relative_path = ? ORDER BY node_id"
            ))
            .map_err(|e| StoreError::Storage(format!("failed to prepare node query: {e}")))?;

        let rows = stmt
            .query_map(params![repo_id, relative_path], node_from_row)
            .map_err(|e| StoreError::Storage(format!("failed to query nodes by path: {e}")))?;

        collect_nodes(rows)
    }

    /// Symbols of a file whose span contains `line`, tightest span first.
    ///
    /// This is the anchoring lookup: a changed line maps to the innermost
    /// definition enclosing it.
    pub async fn symbols_containing_line(
        &self,
        repo_id: &str,
        relative_path: &str,
        line: usize,
    ) -> Result<Vec<KnowledgeGraphNode>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "{NODE_SELECT}
                 WHERE repo_id = ? AND relative_path = ? AND node_type = 'symbol'
                   AND start_line <= ? AND end_line >= ?
                 ORDER BY (end_line - start_line) ASC, node_id ASC"
            ))
            .map_err(|e| StoreError::Storage(format!("failed to prepare span query: {e}")))?;

        let rows = stmt
            .query_map(
                params![repo_id, relative_path, line as i64, line as i64],
                node_from_row,
            )
            .map_err(|e| StoreError::Storage(format!("failed to query symbols by span: {e}")))?;

        collect_nodes(rows)
    }

    /// `last_indexed_at` of one node, if present.
    pub async fn last_indexed_at(&self, repo_id: &str, node_id: u64) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        match conn.query_row(
            "SELECT last_indexed_at FROM kg_nodes WHERE repo_id = ? AND node_id = ?",
            params![repo_id, node_id as i64],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(ts) => Ok(Some(ts)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Storage(format!(
                "failed to read last_indexed_at: {e}"
            ))),
        }
    }
}

const NODE_SELECT: &str = "SELECT node_id, node_type, basename, relative_path, kind, name, \
     qualified_name, language, start_line, end_line, signature, docstring, fingerprint, \
     symbol_version_id, stable_symbol_id, chunk_text FROM kg_nodes";

/// Reconstruct one graph node from its stored row.
fn node_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<KnowledgeGraphNode> {
    use kg_indexer::{FileNode, Language, SymbolKind, SymbolNode, TextNode};

    let node_id = row.get::<_, i64>(0)? as u64;
    let node_type: String = row.get(1)?;

    let payload = match node_type.as_str() {
        "file" => NodePayload::File(FileNode {
            basename: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            relative_path: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        }),
        "symbol" => NodePayload::Symbol(SymbolNode {
            // Kinds outside the known set collapse to function.
            kind: row
                .get::<_, Option<String>>(4)?
                .as_deref()
                .and_then(SymbolKind::parse)
                .unwrap_or(SymbolKind::Function),
            name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            qualified_name: row.get(6)?,
            language: Language::parse(
                row.get::<_, Option<String>>(7)?.as_deref().unwrap_or(""),
            ),
            relative_path: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            start_line: row.get::<_, Option<i64>>(8)?.unwrap_or_default() as usize,
            end_line: row.get::<_, Option<i64>>(9)?.unwrap_or_default() as usize,
            signature: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            docstring: row.get(11)?,
            fingerprint: row.get(12)?,
            symbol_version_id: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
            stable_symbol_id: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
        }),
        _ => NodePayload::Text(TextNode {
            text: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
            start_line: row.get::<_, Option<i64>>(8)?.unwrap_or_default() as usize,
            end_line: row.get::<_, Option<i64>>(9)?.unwrap_or_default() as usize,
        }),
    };

    Ok(KnowledgeGraphNode { node_id, payload })
}

fn collect_nodes(
    rows: impl Iterator<Item = duckdb::Result<KnowledgeGraphNode>>,
) -> Result<Vec<KnowledgeGraphNode>> {
    let mut nodes = Vec::new();
    for row in rows {
        nodes.push(row.map_err(|e| StoreError::Storage(format!("failed to read node row: {e}")))?);
    }
    Ok(nodes)
}

/// Flattened property bag of one node, ready for binding.
struct NodeRow {
    node_type: &'static str,
    basename: Option<String>,
    relative_path: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    qualified_name: Option<String>,
    language: Option<String>,
    start_line: Option<i64>,
    end_line: Option<i64>,
    signature: Option<String>,
    docstring: Option<String>,
    fingerprint: Option<String>,
    symbol_version_id: Option<String>,
    stable_symbol_id: Option<String>,
    chunk_text: Option<String>,
}

impl NodeRow {
    fn from_node(node: &KnowledgeGraphNode) -> Self {
        let mut row = Self {
            node_type: node.payload.node_type(),
            basename: None,
            relative_path: None,
            kind: None,
            name: None,
            qualified_name: None,
            language: None,
            start_line: None,
            end_line: None,
            signature: None,
            docstring: None,
            fingerprint: None,
            symbol_version_id: None,
            stable_symbol_id: None,
            chunk_text: None,
        };

        match &node.payload {
            NodePayload::File(file) => {
                row.basename = Some(file.basename.clone());
                row.relative_path = Some(file.relative_path.clone());
            }
            NodePayload::Symbol(symbol) => {
                row.kind = Some(symbol.kind.as_str().to_string());
                row.name = Some(symbol.name.clone());
                row.qualified_name = symbol.qualified_name.clone();
                row.language = Some(symbol.language.as_str().to_string());
                row.relative_path = Some(symbol.relative_path.clone());
                row.start_line = Some(symbol.start_line as i64);
                row.end_line = Some(symbol.end_line as i64);
                row.signature = Some(symbol.signature.clone());
                row.docstring = symbol.docstring.clone();
                row.fingerprint = symbol.fingerprint.clone();
                row.symbol_version_id = Some(symbol.symbol_version_id.clone());
                row.stable_symbol_id = Some(symbol.stable_symbol_id.clone());
            }
            NodePayload::Text(text) => {
                row.chunk_text = Some(text.text.clone());
                row.start_line = Some(text.start_line as i64);
                row.end_line = Some(text.end_line as i64);
            }
        }

        row
    }
}
