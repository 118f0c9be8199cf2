//! Durable knowledge-graph persistence.
//!
//! Nodes and edges land in an embedded DuckDB database shaped as a labeled
//! property graph: one `kg_nodes` table keyed by `(repo_id, node_id)` with
//! the flattened property bag, and one `kg_edges` table keyed by the full
//! `(repo_id, edge_type, source, target)` tuple. Upserts are idempotent and
//! always refresh `last_indexed_at`, which is what makes TTL cleanup
//! correct.

pub mod errors;
pub mod kg_store;
pub mod metadata;

use std::sync::Arc;

use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

pub use errors::{Result, StoreError};
pub use kg_store::KnowledgeGraphStore;
pub use metadata::{MetadataStore, SnapshotRecord};

/// Shared handle to one graph database.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Dial the graph database.
///
/// `uri` is a filesystem path, or `:memory:` for an ephemeral database (used
/// by tests). The stores layered on top share this single connection.
pub fn open_database(uri: &str) -> Result<SharedConnection> {
    let conn = if uri == ":memory:" {
        Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("failed to open in-memory database: {e}")))?
    } else {
        Connection::open(uri)
            .map_err(|e| StoreError::Storage(format!("failed to open database at {uri}: {e}")))?
    };

    info!(uri, "opened graph database");
    Ok(Arc::new(Mutex::new(conn)))
}
