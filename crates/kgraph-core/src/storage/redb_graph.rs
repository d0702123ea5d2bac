//! # redb-backed Graph Storage
//!
//! A disk-backed graph store using the redb embedded database.
//!
//! Every `GraphStore::write` maps onto exactly one redb write transaction:
//! it commits when the operation succeeds and aborts otherwise, so the
//! compound operations built on top (mention replacement, cascading deletes)
//! are crash-safe and all-or-nothing.
//!
//! ## Layout
//!
//! - `nodes`: `<Label>/<id>` -> postcard `NodeRecord`
//! - `edges`: edge id -> postcard `EdgeRecord`
//! - `adjacency`: `<Label>/<id>` -> ids of incident edges (multimap)
//! - `provenance`: source statement id -> ids of tagged edges (multimap)
//! - `metadata`: `next_edge_id`, `schema_version`

use crate::graph::{GraphRead, GraphStore, GraphTxn};
use crate::primitives::SCHEMA_VERSION;
use crate::{
    EdgeId, EdgePattern, EdgeRecord, GraphError, NewEdge, NodeKind, NodePattern, NodeRecord,
    NodeRef,
};
use redb::{
    Database, MultimapTable, MultimapTableDefinition, ReadTransaction, ReadableDatabase,
    ReadableMultimapTable, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::path::Path;

/// Table for nodes: storage key -> serialized NodeRecord bytes
const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Table for edges: EdgeId(u64) -> serialized EdgeRecord bytes
const EDGES: TableDefinition<u64, &[u8]> = TableDefinition::new("edges");

/// Index: node storage key -> incident edge ids
const ADJACENCY: MultimapTableDefinition<&str, u64> = MultimapTableDefinition::new("adjacency");

/// Index: statement id -> derived edge ids tagged with it
const PROVENANCE: MultimapTableDefinition<&str, u64> = MultimapTableDefinition::new("provenance");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_EDGE_ID_KEY: &str = "next_edge_id";
const SCHEMA_VERSION_KEY: &str = "schema_version";

// =============================================================================
// HELPERS
// =============================================================================

fn store_err(e: impl Display) -> GraphError {
    GraphError::StoreUnavailable(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, GraphError> {
    postcard::to_allocvec(value).map_err(|e| GraphError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GraphError> {
    postcard::from_bytes(bytes).map_err(|e| GraphError::SerializationError(e.to_string()))
}

/// Key range covering every node of one kind: `<Label>/` up to `<Label>0`.
fn kind_bounds(kind: NodeKind) -> (String, String) {
    (format!("{}/", kind.label()), format!("{}0", kind.label()))
}

fn read_node<T>(nodes: &T, key: &NodeRef) -> Result<Option<NodeRecord>, GraphError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let storage_key = key.storage_key();
    nodes
        .get(storage_key.as_str())
        .map_err(store_err)?
        .map(|data| decode(data.value()))
        .transpose()
}

fn scan_nodes<T>(nodes: &T, pattern: &NodePattern) -> Result<Vec<NodeRecord>, GraphError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let (start, end) = kind_bounds(pattern.kind);
    let mut matched = Vec::new();
    for entry in nodes
        .range(start.as_str()..end.as_str())
        .map_err(store_err)?
    {
        let (_, data) = entry.map_err(store_err)?;
        let node: NodeRecord = decode(data.value())?;
        if pattern.matches(&node) {
            matched.push(node);
        }
    }
    Ok(matched)
}

fn count_nodes<T>(nodes: &T, kind: Option<NodeKind>) -> Result<usize, GraphError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let Some(kind) = kind else {
        return Ok(nodes.len().map_err(store_err)? as usize);
    };
    let (start, end) = kind_bounds(kind);
    let mut count = 0;
    for entry in nodes
        .range(start.as_str()..end.as_str())
        .map_err(store_err)?
    {
        entry.map_err(store_err)?;
        count += 1;
    }
    Ok(count)
}

fn index_ids<M>(index: &M, key: &str) -> Result<Vec<u64>, GraphError>
where
    M: ReadableMultimapTable<&'static str, u64>,
{
    let mut ids = Vec::new();
    for id in index.get(key).map_err(store_err)? {
        ids.push(id.map_err(store_err)?.value());
    }
    Ok(ids)
}

/// Match edges, narrowing the candidates through the provenance or
/// adjacency index when the pattern allows it.
fn scan_edges<E, M>(
    edges: &E,
    adjacency: &M,
    provenance: &M,
    pattern: &EdgePattern,
) -> Result<Vec<EdgeRecord>, GraphError>
where
    E: ReadableTable<u64, &'static [u8]>,
    M: ReadableMultimapTable<&'static str, u64>,
{
    let candidates = if let Some(statement) = &pattern.source_statement_id {
        Some(index_ids(provenance, statement.as_str())?)
    } else if let Some(node) = pattern.from.as_ref().or(pattern.to.as_ref()) {
        Some(index_ids(adjacency, &node.storage_key())?)
    } else {
        None
    };

    let mut matched = Vec::new();
    match candidates {
        Some(ids) => {
            for id in ids {
                let Some(data) = edges.get(id).map_err(store_err)? else {
                    continue;
                };
                let edge: EdgeRecord = decode(data.value())?;
                if pattern.matches(&edge) {
                    matched.push(edge);
                }
            }
        }
        None => {
            for entry in edges.iter().map_err(store_err)? {
                let (_, data) = entry.map_err(store_err)?;
                let edge: EdgeRecord = decode(data.value())?;
                if pattern.matches(&edge) {
                    matched.push(edge);
                }
            }
        }
    }
    Ok(matched)
}

fn remove_edge(
    edges: &mut Table<'_, u64, &'static [u8]>,
    adjacency: &mut MultimapTable<'_, &'static str, u64>,
    provenance: &mut MultimapTable<'_, &'static str, u64>,
    id: u64,
) -> Result<bool, GraphError> {
    let edge: EdgeRecord = match edges.remove(id).map_err(store_err)? {
        Some(data) => decode(data.value())?,
        None => return Ok(false),
    };
    for endpoint in [&edge.from, &edge.to] {
        adjacency
            .remove(endpoint.storage_key().as_str(), id)
            .map_err(store_err)?;
    }
    if let Some(statement) = &edge.source_statement_id {
        provenance
            .remove(statement.as_str(), id)
            .map_err(store_err)?;
    }
    Ok(true)
}

// =============================================================================
// REDB GRAPH
// =============================================================================

/// A disk-backed graph store using redb.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path and make sure its
    /// schema is in place.
    ///
    /// Fails with `GraphError::StoreUnavailable` when the file cannot be
    /// opened (for example while another process holds it).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let db = Database::create(path.as_ref()).map_err(store_err)?;
        let mut graph = Self { db };
        graph.ensure_schema()?;
        Ok(graph)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), GraphError> {
        self.db.compact().map_err(store_err)?;
        Ok(())
    }
}

impl GraphStore for RedbGraph {
    fn read<T>(
        &self,
        op: impl FnOnce(&dyn GraphRead) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let reader = RedbReader { txn };
        op(&reader)
    }

    fn write<T>(
        &mut self,
        op: impl FnOnce(&mut dyn GraphTxn) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let txn = self.db.begin_write().map_err(store_err)?;
        let next_edge_id = {
            let meta = txn.open_table(METADATA).map_err(store_err)?;
            meta.get(NEXT_EDGE_ID_KEY)
                .map_err(store_err)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        let mut writer = RedbWriter {
            txn: &txn,
            next_edge_id,
        };
        match op(&mut writer) {
            Ok(value) => {
                let next_edge_id = writer.next_edge_id;
                {
                    let mut meta = txn.open_table(METADATA).map_err(store_err)?;
                    meta.insert(NEXT_EDGE_ID_KEY, next_edge_id)
                        .map_err(store_err)?;
                }
                txn.commit().map_err(store_err)?;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, "aborting redb transaction");
                txn.abort().map_err(store_err)?;
                Err(e)
            }
        }
    }

    fn ensure_schema(&mut self) -> Result<(), GraphError> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            txn.open_table(NODES).map_err(store_err)?;
            txn.open_table(EDGES).map_err(store_err)?;
            txn.open_multimap_table(ADJACENCY).map_err(store_err)?;
            txn.open_multimap_table(PROVENANCE).map_err(store_err)?;

            let mut meta = txn.open_table(METADATA).map_err(store_err)?;
            let stored = meta
                .get(SCHEMA_VERSION_KEY)
                .map_err(store_err)?
                .map(|v| v.value());
            match stored {
                None => {
                    meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)
                        .map_err(store_err)?;
                }
                Some(version) if version == SCHEMA_VERSION => {}
                Some(version) => {
                    return Err(GraphError::SerializationError(format!(
                        "unsupported schema version {version} (expected {SCHEMA_VERSION})"
                    )));
                }
            }
        }
        txn.commit().map_err(store_err)?;
        tracing::debug!(version = SCHEMA_VERSION, "redb schema ready");
        Ok(())
    }
}

// =============================================================================
// TRANSACTION VIEWS
// =============================================================================

/// Read-only view over one redb read transaction.
struct RedbReader {
    txn: ReadTransaction,
}

impl GraphRead for RedbReader {
    fn get_node(&self, key: &NodeRef) -> Result<Option<NodeRecord>, GraphError> {
        let nodes = self.txn.open_table(NODES).map_err(store_err)?;
        read_node(&nodes, key)
    }

    fn match_nodes(&self, pattern: &NodePattern) -> Result<Vec<NodeRecord>, GraphError> {
        let nodes = self.txn.open_table(NODES).map_err(store_err)?;
        scan_nodes(&nodes, pattern)
    }

    fn match_edges(&self, pattern: &EdgePattern) -> Result<Vec<EdgeRecord>, GraphError> {
        let edges = self.txn.open_table(EDGES).map_err(store_err)?;
        let adjacency = self.txn.open_multimap_table(ADJACENCY).map_err(store_err)?;
        let provenance = self.txn.open_multimap_table(PROVENANCE).map_err(store_err)?;
        scan_edges(&edges, &adjacency, &provenance, pattern)
    }

    fn node_count(&self, kind: Option<NodeKind>) -> Result<usize, GraphError> {
        let nodes = self.txn.open_table(NODES).map_err(store_err)?;
        count_nodes(&nodes, kind)
    }

    fn edge_count(&self) -> Result<usize, GraphError> {
        let edges = self.txn.open_table(EDGES).map_err(store_err)?;
        Ok(edges.len().map_err(store_err)? as usize)
    }
}

/// Mutable view over one redb write transaction.
///
/// Tables are opened per call and dropped before returning; redb refuses to
/// open the same table twice within one transaction.
struct RedbWriter<'a> {
    txn: &'a WriteTransaction,
    next_edge_id: u64,
}

impl GraphRead for RedbWriter<'_> {
    fn get_node(&self, key: &NodeRef) -> Result<Option<NodeRecord>, GraphError> {
        let nodes = self.txn.open_table(NODES).map_err(store_err)?;
        read_node(&nodes, key)
    }

    fn match_nodes(&self, pattern: &NodePattern) -> Result<Vec<NodeRecord>, GraphError> {
        let nodes = self.txn.open_table(NODES).map_err(store_err)?;
        scan_nodes(&nodes, pattern)
    }

    fn match_edges(&self, pattern: &EdgePattern) -> Result<Vec<EdgeRecord>, GraphError> {
        let edges = self.txn.open_table(EDGES).map_err(store_err)?;
        let adjacency = self.txn.open_multimap_table(ADJACENCY).map_err(store_err)?;
        let provenance = self.txn.open_multimap_table(PROVENANCE).map_err(store_err)?;
        scan_edges(&edges, &adjacency, &provenance, pattern)
    }

    fn node_count(&self, kind: Option<NodeKind>) -> Result<usize, GraphError> {
        let nodes = self.txn.open_table(NODES).map_err(store_err)?;
        count_nodes(&nodes, kind)
    }

    fn edge_count(&self) -> Result<usize, GraphError> {
        let edges = self.txn.open_table(EDGES).map_err(store_err)?;
        Ok(edges.len().map_err(store_err)? as usize)
    }
}

impl GraphTxn for RedbWriter<'_> {
    fn create_node(&mut self, node: NodeRecord) -> Result<(), GraphError> {
        let mut nodes = self.txn.open_table(NODES).map_err(store_err)?;
        let storage_key = node.key.storage_key();
        if nodes.get(storage_key.as_str()).map_err(store_err)?.is_some() {
            return Err(GraphError::conflict(&node.key));
        }
        let bytes = encode(&node)?;
        nodes
            .insert(storage_key.as_str(), bytes.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    fn update_node(&mut self, node: NodeRecord) -> Result<bool, GraphError> {
        let mut nodes = self.txn.open_table(NODES).map_err(store_err)?;
        let storage_key = node.key.storage_key();
        if nodes.get(storage_key.as_str()).map_err(store_err)?.is_none() {
            return Ok(false);
        }
        let bytes = encode(&node)?;
        nodes
            .insert(storage_key.as_str(), bytes.as_slice())
            .map_err(store_err)?;
        Ok(true)
    }

    fn detach_delete_node(&mut self, key: &NodeRef) -> Result<bool, GraphError> {
        let storage_key = key.storage_key();
        {
            let mut nodes = self.txn.open_table(NODES).map_err(store_err)?;
            if nodes
                .remove(storage_key.as_str())
                .map_err(store_err)?
                .is_none()
            {
                return Ok(false);
            }
        }

        let mut edges = self.txn.open_table(EDGES).map_err(store_err)?;
        let mut adjacency = self.txn.open_multimap_table(ADJACENCY).map_err(store_err)?;
        let mut provenance = self.txn.open_multimap_table(PROVENANCE).map_err(store_err)?;
        for id in index_ids(&adjacency, &storage_key)? {
            remove_edge(&mut edges, &mut adjacency, &mut provenance, id)?;
        }
        Ok(true)
    }

    fn create_edge(&mut self, edge: NewEdge) -> Result<Option<EdgeId>, GraphError> {
        {
            let nodes = self.txn.open_table(NODES).map_err(store_err)?;
            if read_node(&nodes, &edge.from)?.is_none() || read_node(&nodes, &edge.to)?.is_none()
            {
                return Ok(None);
            }
        }

        let id = self.next_edge_id;
        let record = edge.into_record(EdgeId(id));
        let bytes = encode(&record)?;

        let mut edges = self.txn.open_table(EDGES).map_err(store_err)?;
        edges.insert(id, bytes.as_slice()).map_err(store_err)?;

        let mut adjacency = self.txn.open_multimap_table(ADJACENCY).map_err(store_err)?;
        for endpoint in [&record.from, &record.to] {
            adjacency
                .insert(endpoint.storage_key().as_str(), id)
                .map_err(store_err)?;
        }
        if let Some(statement) = &record.source_statement_id {
            let mut provenance = self.txn.open_multimap_table(PROVENANCE).map_err(store_err)?;
            provenance
                .insert(statement.as_str(), id)
                .map_err(store_err)?;
        }

        self.next_edge_id = id.saturating_add(1);
        Ok(Some(EdgeId(id)))
    }

    fn delete_edges(&mut self, pattern: &EdgePattern) -> Result<usize, GraphError> {
        let doomed = self.match_edges(pattern)?;

        let mut edges = self.txn.open_table(EDGES).map_err(store_err)?;
        let mut adjacency = self.txn.open_multimap_table(ADJACENCY).map_err(store_err)?;
        let mut provenance = self.txn.open_multimap_table(PROVENANCE).map_err(store_err)?;
        let mut removed = 0;
        for edge in doomed {
            if remove_edge(&mut edges, &mut adjacency, &mut provenance, edge.id.0)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdgeType, EntityId, RelationshipKind, StatementId};
    use tempfile::tempdir;

    fn entity(id: &str) -> NodeRef {
        NodeRef::entity(&EntityId::new(id))
    }

    fn derived(from: &str, to: &str, source: &str) -> NewEdge {
        NewEdge::derived(
            &EntityId::new(from),
            &EntityId::new(to),
            RelationshipKind::default(),
            &StatementId::new(source),
        )
    }

    fn seed(graph: &mut RedbGraph, ids: &[&str]) {
        graph
            .write(|txn| {
                for id in ids {
                    txn.create_node(NodeRecord::new(entity(id)))?;
                }
                Ok(())
            })
            .expect("seed");
    }

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut graph = RedbGraph::open(temp.path().join("test.redb")).expect("open db");
        seed(&mut graph, &["a", "b"]);

        let id = graph
            .write(|txn| txn.create_edge(derived("a", "b", "s1")))
            .expect("edge");
        assert_eq!(id, Some(EdgeId(0)));

        graph
            .read(|view| {
                assert_eq!(view.node_count(None)?, 2);
                assert_eq!(view.edge_count()?, 1);
                assert!(view.contains_node(&entity("a"))?);
                Ok(())
            })
            .expect("read");
    }

    #[test]
    fn create_node_conflict() {
        let temp = tempdir().expect("temp dir");
        let mut graph = RedbGraph::open(temp.path().join("test.redb")).expect("open db");
        seed(&mut graph, &["a"]);

        let result = graph.write(|txn| txn.create_node(NodeRecord::new(entity("a"))));
        assert!(matches!(result, Err(GraphError::Conflict { .. })));
    }

    #[test]
    fn node_count_by_kind_uses_prefix() {
        let temp = tempdir().expect("temp dir");
        let mut graph = RedbGraph::open(temp.path().join("test.redb")).expect("open db");
        seed(&mut graph, &["a", "b"]);
        graph
            .write(|txn| {
                txn.create_node(NodeRecord::new(NodeRef::statement(&StatementId::new("s1"))))
            })
            .expect("statement");

        graph
            .read(|view| {
                assert_eq!(view.node_count(Some(NodeKind::NamedEntity))?, 2);
                assert_eq!(view.node_count(Some(NodeKind::Statement))?, 1);
                assert_eq!(view.node_count(Some(NodeKind::Topic))?, 0);
                let entities = view.match_nodes(&NodePattern::of_kind(NodeKind::NamedEntity))?;
                assert_eq!(entities.len(), 2);
                Ok(())
            })
            .expect("read");
    }

    #[test]
    fn failed_write_aborts() {
        let temp = tempdir().expect("temp dir");
        let mut graph = RedbGraph::open(temp.path().join("test.redb")).expect("open db");
        seed(&mut graph, &["a", "b"]);

        let result: Result<(), GraphError> = graph.write(|txn| {
            txn.create_edge(derived("a", "b", "s1"))?;
            txn.detach_delete_node(&entity("a"))?;
            Err(GraphError::Validation("abort".to_string()))
        });
        assert!(result.is_err());

        graph
            .read(|view| {
                assert!(view.contains_node(&entity("a"))?);
                assert_eq!(view.edge_count()?, 0);
                Ok(())
            })
            .expect("read");

        // The aborted transaction must not consume edge ids.
        let id = graph
            .write(|txn| txn.create_edge(derived("a", "b", "s1")))
            .expect("edge");
        assert_eq!(id, Some(EdgeId(0)));
    }

    #[test]
    fn tag_retraction_and_detach_delete() {
        let temp = tempdir().expect("temp dir");
        let mut graph = RedbGraph::open(temp.path().join("test.redb")).expect("open db");
        seed(&mut graph, &["a", "b", "c"]);

        graph
            .write(|txn| {
                txn.create_edge(derived("a", "b", "s1"))?;
                txn.create_edge(derived("b", "a", "s1"))?;
                txn.create_edge(derived("b", "c", "s2"))?;
                txn.create_edge(NewEdge::structural(
                    entity("c"),
                    entity("a"),
                    EdgeType::Mentions,
                ))?;
                Ok(())
            })
            .expect("edges");

        let removed = graph
            .write(|txn| txn.delete_edges(&EdgePattern::tagged(&StatementId::new("s1"))))
            .expect("retract");
        assert_eq!(removed, 2);

        let deleted = graph
            .write(|txn| txn.detach_delete_node(&entity("c")))
            .expect("delete");
        assert!(deleted);

        graph
            .read(|view| {
                assert_eq!(view.edge_count()?, 0);
                let from_b = view.match_edges(&EdgePattern::any().from_node(entity("b")))?;
                assert!(from_b.is_empty());
                Ok(())
            })
            .expect("read");
    }

    #[test]
    fn dangling_edges_are_not_created() {
        let temp = tempdir().expect("temp dir");
        let mut graph = RedbGraph::open(temp.path().join("test.redb")).expect("open db");
        seed(&mut graph, &["a"]);

        let id = graph
            .write(|txn| txn.create_edge(derived("a", "ghost", "s1")))
            .expect("edge");
        assert!(id.is_none());
    }

    #[test]
    fn recovery_persistence_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut graph = RedbGraph::open(&db_path).expect("open db");
            seed(&mut graph, &["a", "b"]);
            graph
                .write(|txn| txn.create_edge(derived("a", "b", "s1")))
                .expect("edge");
        }

        {
            let mut graph = RedbGraph::open(&db_path).expect("reopen db");
            let tagged = graph
                .read(|view| view.match_edges(&EdgePattern::tagged(&StatementId::new("s1"))))
                .expect("read");
            assert_eq!(tagged.len(), 1);

            // next_edge_id survives the reopen.
            let id = graph
                .write(|txn| txn.create_edge(derived("b", "a", "s1")))
                .expect("edge");
            assert_eq!(id, Some(EdgeId(1)));
        }
    }

    #[test]
    fn compact_and_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        {
            let mut graph = RedbGraph::open(&db_path).expect("open db");
            seed(&mut graph, &["a"]);
            graph.compact().expect("compact");
        }
        let graph = RedbGraph::open(&db_path).expect("reopen db");
        let count = graph.read(|view| view.node_count(None)).expect("read");
        assert_eq!(count, 1);
    }
}
