//! Persistence round trips against an in-memory graph database.

use std::fs;
use std::path::Path;

use chrono::Utc;
use kg_indexer::graph::repo_builder::RepoGraphResult;
use kg_indexer::{
    EdgeType, FileNode, KnowledgeGraphEdge, KnowledgeGraphNode, NodePayload, RepoGraphBuilder,
};
use kg_store::{KnowledgeGraphStore, MetadataStore, open_database};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn build_repo(root: &Path) -> RepoGraphResult {
    RepoGraphBuilder::new("repo-1", Some("sha-1".into()), root)
        .build()
        .unwrap()
}

async fn store() -> KnowledgeGraphStore {
    let conn = open_database(":memory:").unwrap();
    KnowledgeGraphStore::with_connection(conn).await.unwrap()
}

#[tokio::test]
async fn persisting_twice_creates_nothing_new_and_advances_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\n");
    write(dir.path(), "b.py", "from a import f\ndef g():\n    f()\n");
    let result = build_repo(dir.path());

    let store = store().await;

    let first = store
        .persist_graph("repo-1", &result.nodes, &result.edges)
        .await
        .unwrap();
    assert_eq!(first.nodes_created, result.nodes.len());
    assert_eq!(first.edges_created, result.edges.len());
    assert_eq!(first.nodes_updated, 0);

    let ts_before = store.last_indexed_at("repo-1", 0).await.unwrap().unwrap();

    let second = store
        .persist_graph("repo-1", &result.nodes, &result.edges)
        .await
        .unwrap();
    assert_eq!(second.nodes_created, 0);
    assert_eq!(second.edges_created, 0);
    assert_eq!(second.nodes_updated, result.nodes.len());

    let ts_after = store.last_indexed_at("repo-1", 0).await.unwrap().unwrap();
    assert!(ts_after >= ts_before, "timestamp must be refreshed on match");

    assert_eq!(store.count_nodes("repo-1").await.unwrap(), result.nodes.len());
    assert_eq!(store.count_edges("repo-1").await.unwrap(), result.edges.len());
}

#[tokio::test]
async fn cleanup_after_file_deletion_removes_its_nodes_and_edges() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f1():\n    pass\n");
    write(dir.path(), "b.py", "from a import f1\ndef f2():\n    f1()\n");

    let store = store().await;

    // First index: both files present.
    let at_t0 = build_repo(dir.path());
    store
        .persist_graph("repo-1", &at_t0.nodes, &at_t0.edges)
        .await
        .unwrap();
    assert!(store.count_nodes_for_path("repo-1", "b.py").await.unwrap() > 0);

    // Second index: b.py is gone; only still-present nodes get refreshed.
    fs::remove_file(dir.path().join("b.py")).unwrap();
    let cutoff = Utc::now().timestamp_micros();
    let at_t1 = build_repo(dir.path());
    store
        .persist_graph("repo-1", &at_t1.nodes, &at_t1.edges)
        .await
        .unwrap();

    let deleted = store
        .cleanup_nodes_older_than("repo-1", cutoff)
        .await
        .unwrap();
    assert!(deleted > 0);

    // All nodes anchored to the removed file are gone.
    assert_eq!(store.count_nodes_for_path("repo-1", "b.py").await.unwrap(), 0);
    // Survivors kept their refreshed timestamps.
    assert!(store.count_nodes_for_path("repo-1", "a.py").await.unwrap() > 0);
    let surviving_ts = store.last_indexed_at("repo-1", 0).await.unwrap().unwrap();
    assert!(surviving_ts >= cutoff);

    // DETACH semantics: no edge may reference a deleted node. All remaining
    // edges connect surviving nodes only.
    let remaining_nodes = store.count_nodes("repo-1").await.unwrap();
    assert_eq!(remaining_nodes, at_t1.nodes.len());
    let remaining_edges = store.count_edges("repo-1").await.unwrap();
    assert_eq!(remaining_edges, at_t1.edges.len());
}

#[tokio::test]
async fn edges_with_missing_endpoints_are_silently_skipped() {
    let store = store().await;

    let node = KnowledgeGraphNode {
        node_id: 0,
        payload: NodePayload::File(FileNode {
            basename: "a.py".into(),
            relative_path: "a.py".into(),
        }),
    };
    let dangling = KnowledgeGraphEdge::new(0, 999, EdgeType::HasFile);

    store
        .batch_upsert_nodes("repo-1", &[node], Utc::now().timestamp_micros())
        .await
        .unwrap();
    store
        .batch_upsert_edges("repo-1", &[dangling])
        .await
        .unwrap();

    assert_eq!(store.count_edges("repo-1").await.unwrap(), 0);
}

#[tokio::test]
async fn repositories_are_isolated_by_repo_id() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\n");
    let result = build_repo(dir.path());

    let store = store().await;
    store
        .persist_graph("repo-1", &result.nodes, &result.edges)
        .await
        .unwrap();
    store
        .persist_graph("repo-2", &result.nodes, &result.edges)
        .await
        .unwrap();

    let deleted = store.clear_repo_graph("repo-1").await.unwrap();
    assert_eq!(deleted, result.nodes.len());

    assert_eq!(store.count_nodes("repo-1").await.unwrap(), 0);
    assert_eq!(store.count_edges("repo-1").await.unwrap(), 0);
    assert_eq!(store.count_nodes("repo-2").await.unwrap(), result.nodes.len());
}

#[tokio::test]
async fn ttl_zero_against_a_future_cutoff_empties_the_repo() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\n");
    let result = build_repo(dir.path());

    let store = store().await;
    store
        .persist_graph("repo-1", &result.nodes, &result.edges)
        .await
        .unwrap();

    let deleted = store
        .cleanup_nodes_older_than("repo-1", Utc::now().timestamp_micros() + 1_000_000)
        .await
        .unwrap();
    assert_eq!(deleted, result.nodes.len());
    assert_eq!(store.count_edges("repo-1").await.unwrap(), 0);
}

#[tokio::test]
async fn stored_nodes_read_back_with_their_payloads() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "x.py",
        "class C:\n    \"\"\"Holder.\"\"\"\n    def m(self):\n        pass\n",
    );
    let result = build_repo(dir.path());

    let store = store().await;
    store
        .persist_graph("repo-1", &result.nodes, &result.edges)
        .await
        .unwrap();

    let nodes = store.nodes_for_path("repo-1", "x.py").await.unwrap();
    // The file node plus two symbols share the path.
    assert_eq!(nodes.len(), 3);

    let class = nodes
        .iter()
        .filter_map(|n| n.payload.as_symbol())
        .find(|s| s.name == "C")
        .unwrap();
    assert_eq!(class.qualified_name.as_deref(), Some("C"));
    assert_eq!(class.docstring.as_deref(), Some("Holder."));
    assert!(class.fingerprint.is_some());

    let round_tripped = result
        .nodes
        .iter()
        .filter_map(|n| n.payload.as_symbol())
        .find(|s| s.name == "C")
        .unwrap();
    assert_eq!(class, round_tripped);
}

#[tokio::test]
async fn line_anchoring_returns_the_tightest_symbol_first() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "x.py",
        "class C:\n    def m(self):\n        pass\n\ndef free():\n    pass\n",
    );
    let result = build_repo(dir.path());

    let store = store().await;
    store
        .persist_graph("repo-1", &result.nodes, &result.edges)
        .await
        .unwrap();

    // Line 3 sits inside both C and C.m; the method wins on span.
    let symbols = store
        .symbols_containing_line("repo-1", "x.py", 3)
        .await
        .unwrap();
    let names: Vec<&str> = symbols
        .iter()
        .filter_map(|n| n.payload.as_symbol())
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(names, vec!["m", "C"]);

    // A line outside every definition anchors to nothing.
    let symbols = store
        .symbols_containing_line("repo-1", "x.py", 4)
        .await
        .unwrap();
    assert!(symbols.is_empty());
}

#[tokio::test]
async fn metadata_snapshot_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\n");
    let result = build_repo(dir.path());

    let conn = open_database(":memory:").unwrap();
    let store = MetadataStore::with_connection(conn).await.unwrap();

    assert!(store.latest_snapshot("repo-1").await.unwrap().is_none());

    let snapshot_id = store
        .persist_indexing_metadata("repo-1", Some("sha-1"), &result, &result.stats)
        .await
        .unwrap();

    let snapshot = store.latest_snapshot("repo-1").await.unwrap().unwrap();
    assert_eq!(snapshot.id, snapshot_id);
    assert_eq!(snapshot.repository_id, "repo-1");
    assert_eq!(snapshot.commit_sha.as_deref(), Some("sha-1"));
    assert_eq!(snapshot.nodes_count, result.nodes.len() as i64);

    let last_indexed = store
        .repository_last_indexed_at("repo-1")
        .await
        .unwrap()
        .unwrap();
    assert!(last_indexed <= Utc::now().timestamp_micros());
}
