//! # Graph Store
//!
//! The transactional property-graph interface the engine is written against,
//! and the deterministic in-memory backend.
//!
//! Components never hold a store directly. They receive a `GraphRead` view or
//! a `GraphTxn` for the duration of one `GraphStore::read` / `GraphStore::write`
//! call, so every compound operation is applied atomically or not at all.

use crate::{
    EdgeId, EdgePattern, EdgeRecord, GraphError, NewEdge, NodeKind, NodePattern, NodeRecord,
    NodeRef, StatementId,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Read operations available inside any store transaction.
pub trait GraphRead {
    /// Fetch a node by kind and id.
    fn get_node(&self, key: &NodeRef) -> Result<Option<NodeRecord>, GraphError>;

    /// All nodes matching the pattern, in key order.
    fn match_nodes(&self, pattern: &NodePattern) -> Result<Vec<NodeRecord>, GraphError>;

    /// All edges matching the pattern, in edge id (creation) order.
    fn match_edges(&self, pattern: &EdgePattern) -> Result<Vec<EdgeRecord>, GraphError>;

    /// Number of nodes, optionally restricted to one kind.
    fn node_count(&self, kind: Option<NodeKind>) -> Result<usize, GraphError>;

    /// Total number of edges.
    fn edge_count(&self) -> Result<usize, GraphError>;

    /// Check if a node exists.
    fn contains_node(&self, key: &NodeRef) -> Result<bool, GraphError> {
        Ok(self.get_node(key)?.is_some())
    }
}

/// Mutations available inside a write transaction.
pub trait GraphTxn: GraphRead {
    /// Create a node. Fails with `GraphError::Conflict` if the key is taken.
    fn create_node(&mut self, node: NodeRecord) -> Result<(), GraphError>;

    /// Replace labels and properties of an existing node.
    /// Returns `false` if the node does not exist.
    fn update_node(&mut self, node: NodeRecord) -> Result<bool, GraphError>;

    /// Delete a node together with every edge incident to it.
    /// Returns `false` if the node does not exist.
    fn detach_delete_node(&mut self, key: &NodeRef) -> Result<bool, GraphError>;

    /// Create an edge. Returns `None` (and creates nothing) when either
    /// endpoint is missing.
    fn create_edge(&mut self, edge: NewEdge) -> Result<Option<EdgeId>, GraphError>;

    /// Delete every edge matching the pattern. Returns the number removed.
    fn delete_edges(&mut self, pattern: &EdgePattern) -> Result<usize, GraphError>;
}

/// A transactional graph backend.
///
/// `write` commits when `op` returns `Ok` and rolls back every change made by
/// `op` when it returns `Err`.
pub trait GraphStore {
    /// Run a read-only operation against a consistent view.
    fn read<T>(
        &self,
        op: impl FnOnce(&dyn GraphRead) -> Result<T, GraphError>,
    ) -> Result<T, GraphError>;

    /// Run a mutating operation as a single atomic transaction.
    fn write<T>(
        &mut self,
        op: impl FnOnce(&mut dyn GraphTxn) -> Result<T, GraphError>,
    ) -> Result<T, GraphError>;

    /// Create tables and record the schema version. Idempotent.
    fn ensure_schema(&mut self) -> Result<(), GraphError>;
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// The in-memory graph.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
/// Keeps two secondary indexes so that tag retraction and detach deletion
/// touch only the affected edges:
/// - adjacency: node -> incident edge ids (both directions)
/// - provenance: source statement -> tagged edge ids
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node storage: NodeRef -> NodeRecord
    nodes: BTreeMap<NodeRef, NodeRecord>,

    /// Edge storage: EdgeId -> EdgeRecord
    edges: BTreeMap<EdgeId, EdgeRecord>,

    adjacency: BTreeMap<NodeRef, BTreeSet<EdgeId>>,

    provenance: BTreeMap<StatementId, BTreeSet<EdgeId>>,

    /// Next available EdgeId
    next_edge_id: u64,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all nodes in deterministic order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Get all edges in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.values()
    }

    /// Candidate edge ids for a pattern, narrowed through the indexes.
    /// `None` means the pattern needs a full scan.
    fn candidates(&self, pattern: &EdgePattern) -> Option<Vec<EdgeId>> {
        let index = if let Some(statement) = &pattern.source_statement_id {
            self.provenance.get(statement)
        } else if let Some(node) = pattern.from.as_ref().or(pattern.to.as_ref()) {
            self.adjacency.get(node)
        } else {
            return None;
        };
        Some(index.map(|ids| ids.iter().copied().collect()).unwrap_or_default())
    }

    /// Store an edge record and index it.
    fn insert_edge(&mut self, record: EdgeRecord) {
        let id = record.id;
        self.adjacency
            .entry(record.from.clone())
            .or_default()
            .insert(id);
        self.adjacency.entry(record.to.clone()).or_default().insert(id);
        if let Some(statement) = &record.source_statement_id {
            self.provenance
                .entry(statement.clone())
                .or_default()
                .insert(id);
        }
        self.edges.insert(id, record);
    }

    /// Undo the logged steps newest first, then give back consumed edge ids.
    fn rollback(&mut self, log: Vec<Undo>, next_edge_id: u64) {
        for step in log.into_iter().rev() {
            match step {
                Undo::RemoveNode(key) => {
                    self.nodes.remove(&key);
                    self.adjacency.remove(&key);
                }
                Undo::RestoreNode(node) => {
                    self.nodes.insert(node.key.clone(), node);
                }
                Undo::RemoveEdge(id) => {
                    self.remove_edge(id);
                }
                Undo::RestoreEdge(edge) => self.insert_edge(edge),
            }
        }
        self.next_edge_id = next_edge_id;
    }

    fn remove_edge(&mut self, id: EdgeId) -> Option<EdgeRecord> {
        let edge = self.edges.remove(&id)?;
        for endpoint in [&edge.from, &edge.to] {
            if let Some(ids) = self.adjacency.get_mut(endpoint) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.adjacency.remove(endpoint);
                }
            }
        }
        if let Some(statement) = &edge.source_statement_id
            && let Some(ids) = self.provenance.get_mut(statement)
        {
            ids.remove(&id);
            if ids.is_empty() {
                self.provenance.remove(statement);
            }
        }
        Some(edge)
    }
}

impl GraphRead for Graph {
    fn get_node(&self, key: &NodeRef) -> Result<Option<NodeRecord>, GraphError> {
        Ok(self.nodes.get(key).cloned())
    }

    fn match_nodes(&self, pattern: &NodePattern) -> Result<Vec<NodeRecord>, GraphError> {
        Ok(self
            .nodes
            .values()
            .filter(|node| pattern.matches(node))
            .cloned()
            .collect())
    }

    fn match_edges(&self, pattern: &EdgePattern) -> Result<Vec<EdgeRecord>, GraphError> {
        let matched = match self.candidates(pattern) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.edges.get(id))
                .filter(|edge| pattern.matches(edge))
                .cloned()
                .collect(),
            None => self
                .edges
                .values()
                .filter(|edge| pattern.matches(edge))
                .cloned()
                .collect(),
        };
        Ok(matched)
    }

    fn node_count(&self, kind: Option<NodeKind>) -> Result<usize, GraphError> {
        Ok(match kind {
            Some(kind) => self.nodes.keys().filter(|k| k.kind == kind).count(),
            None => self.nodes.len(),
        })
    }

    fn edge_count(&self) -> Result<usize, GraphError> {
        Ok(self.edges.len())
    }
}

impl GraphTxn for Graph {
    fn create_node(&mut self, node: NodeRecord) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.key) {
            return Err(GraphError::conflict(&node.key));
        }
        self.nodes.insert(node.key.clone(), node);
        Ok(())
    }

    fn update_node(&mut self, node: NodeRecord) -> Result<bool, GraphError> {
        match self.nodes.get_mut(&node.key) {
            Some(existing) => {
                *existing = node;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn detach_delete_node(&mut self, key: &NodeRef) -> Result<bool, GraphError> {
        if self.nodes.remove(key).is_none() {
            return Ok(false);
        }
        let incident = self.adjacency.get(key).cloned().unwrap_or_default();
        for id in incident {
            self.remove_edge(id);
        }
        self.adjacency.remove(key);
        Ok(true)
    }

    fn create_edge(&mut self, edge: NewEdge) -> Result<Option<EdgeId>, GraphError> {
        if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
            return Ok(None);
        }

        let id = EdgeId(self.next_edge_id);
        self.next_edge_id = self.next_edge_id.saturating_add(1);

        self.insert_edge(edge.into_record(id));
        Ok(Some(id))
    }

    fn delete_edges(&mut self, pattern: &EdgePattern) -> Result<usize, GraphError> {
        let doomed: Vec<EdgeId> = self
            .match_edges(pattern)?
            .into_iter()
            .map(|edge| edge.id)
            .collect();
        Ok(doomed
            .into_iter()
            .filter_map(|id| self.remove_edge(id))
            .count())
    }
}

impl GraphStore for Graph {
    fn read<T>(
        &self,
        op: impl FnOnce(&dyn GraphRead) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        op(self)
    }

    fn write<T>(
        &mut self,
        op: impl FnOnce(&mut dyn GraphTxn) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let next_edge_id = self.next_edge_id;
        let mut txn = UndoTxn {
            graph: self,
            log: Vec::new(),
        };
        let result = op(&mut txn);
        let log = txn.log;
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(error = %e, steps = log.len(), "rolling back in-memory transaction");
                self.rollback(log, next_edge_id);
                Err(e)
            }
        }
    }

    fn ensure_schema(&mut self) -> Result<(), GraphError> {
        Ok(())
    }
}

// =============================================================================
// IN-MEMORY TRANSACTIONS
// =============================================================================

/// One reversible step of an in-memory write.
#[derive(Debug)]
enum Undo {
    RemoveNode(NodeRef),
    /// Put back a node as it was before an update or delete.
    RestoreNode(NodeRecord),
    RemoveEdge(EdgeId),
    RestoreEdge(EdgeRecord),
}

/// Write transaction over a `Graph` that logs how to reverse each change,
/// so rollback costs only what the transaction touched.
struct UndoTxn<'a> {
    graph: &'a mut Graph,
    log: Vec<Undo>,
}

impl GraphRead for UndoTxn<'_> {
    fn get_node(&self, key: &NodeRef) -> Result<Option<NodeRecord>, GraphError> {
        self.graph.get_node(key)
    }

    fn match_nodes(&self, pattern: &NodePattern) -> Result<Vec<NodeRecord>, GraphError> {
        self.graph.match_nodes(pattern)
    }

    fn match_edges(&self, pattern: &EdgePattern) -> Result<Vec<EdgeRecord>, GraphError> {
        self.graph.match_edges(pattern)
    }

    fn node_count(&self, kind: Option<NodeKind>) -> Result<usize, GraphError> {
        self.graph.node_count(kind)
    }

    fn edge_count(&self) -> Result<usize, GraphError> {
        self.graph.edge_count()
    }
}

impl GraphTxn for UndoTxn<'_> {
    fn create_node(&mut self, node: NodeRecord) -> Result<(), GraphError> {
        let key = node.key.clone();
        self.graph.create_node(node)?;
        self.log.push(Undo::RemoveNode(key));
        Ok(())
    }

    fn update_node(&mut self, node: NodeRecord) -> Result<bool, GraphError> {
        let Some(previous) = self.graph.nodes.get(&node.key).cloned() else {
            return Ok(false);
        };
        self.graph.update_node(node)?;
        self.log.push(Undo::RestoreNode(previous));
        Ok(true)
    }

    fn detach_delete_node(&mut self, key: &NodeRef) -> Result<bool, GraphError> {
        let Some(node) = self.graph.nodes.get(key).cloned() else {
            return Ok(false);
        };
        let incident: Vec<EdgeRecord> = self
            .graph
            .adjacency
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.graph.edges.get(id))
            .cloned()
            .collect();

        self.graph.detach_delete_node(key)?;
        self.log.push(Undo::RestoreNode(node));
        self.log.extend(incident.into_iter().map(Undo::RestoreEdge));
        Ok(true)
    }

    fn create_edge(&mut self, edge: NewEdge) -> Result<Option<EdgeId>, GraphError> {
        let created = self.graph.create_edge(edge)?;
        if let Some(id) = created {
            self.log.push(Undo::RemoveEdge(id));
        }
        Ok(created)
    }

    fn delete_edges(&mut self, pattern: &EdgePattern) -> Result<usize, GraphError> {
        let doomed = self.graph.match_edges(pattern)?;
        let mut removed = 0;
        for edge in doomed {
            if let Some(record) = self.graph.remove_edge(edge.id) {
                self.log.push(Undo::RestoreEdge(record));
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdgeType, EntityId, RelationshipKind};

    fn entity(id: &str) -> NodeRef {
        NodeRef::entity(&EntityId::new(id))
    }

    fn graph_with_entities(ids: &[&str]) -> Graph {
        let mut graph = Graph::new();
        for id in ids {
            graph
                .create_node(NodeRecord::new(entity(id)))
                .expect("create");
        }
        graph
    }

    fn derived(from: &str, to: &str, source: &str) -> NewEdge {
        NewEdge::derived(
            &EntityId::new(from),
            &EntityId::new(to),
            RelationshipKind::default(),
            &StatementId::new(source),
        )
    }

    #[test]
    fn create_node_enforces_uniqueness() {
        let mut graph = graph_with_entities(&["ne1"]);
        let result = graph.create_node(NodeRecord::new(entity("ne1")));
        assert!(matches!(result, Err(GraphError::Conflict { .. })));
        assert_eq!(graph.node_count(None).expect("count"), 1);
    }

    #[test]
    fn same_id_different_kind_is_not_a_conflict() {
        let mut graph = graph_with_entities(&["x"]);
        graph
            .create_node(NodeRecord::new(NodeRef::statement(&StatementId::new("x"))))
            .expect("create");
        assert_eq!(graph.node_count(None).expect("count"), 2);
        assert_eq!(
            graph
                .node_count(Some(NodeKind::NamedEntity))
                .expect("count"),
            1
        );
    }

    #[test]
    fn create_edge_ignores_dangling_nodes() {
        let mut graph = graph_with_entities(&["ne1"]);
        let created = graph.create_edge(derived("ne1", "missing", "s1")).expect("edge");
        assert!(created.is_none());
        assert_eq!(graph.edge_count().expect("count"), 0);
    }

    #[test]
    fn delete_edges_by_tag_touches_only_tagged() {
        let mut graph = graph_with_entities(&["a", "b", "c"]);
        graph.create_edge(derived("a", "b", "s1")).expect("edge");
        graph.create_edge(derived("b", "a", "s1")).expect("edge");
        graph.create_edge(derived("b", "c", "s2")).expect("edge");

        let removed = graph
            .delete_edges(&EdgePattern::tagged(&StatementId::new("s1")))
            .expect("delete");

        assert_eq!(removed, 2);
        assert_eq!(graph.edge_count().expect("count"), 1);
        let again = graph
            .delete_edges(&EdgePattern::tagged(&StatementId::new("s1")))
            .expect("delete");
        assert_eq!(again, 0);
    }

    #[test]
    fn detach_delete_removes_incident_edges() {
        let mut graph = graph_with_entities(&["a", "b", "c"]);
        graph.create_edge(derived("a", "b", "s1")).expect("edge");
        graph.create_edge(derived("c", "a", "s1")).expect("edge");
        graph.create_edge(derived("b", "c", "s2")).expect("edge");

        assert!(graph.detach_delete_node(&entity("a")).expect("delete"));
        assert!(!graph.detach_delete_node(&entity("a")).expect("delete"));

        let remaining = graph.match_edges(&EdgePattern::any()).expect("match");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].from, entity("b"));
        let tagged = graph
            .match_edges(&EdgePattern::tagged(&StatementId::new("s1")))
            .expect("match");
        assert!(tagged.is_empty());
    }

    #[test]
    fn match_edges_in_creation_order() {
        let mut graph = graph_with_entities(&["a", "b", "c"]);
        graph
            .create_edge(NewEdge::structural(entity("a"), entity("c"), EdgeType::Mentions))
            .expect("edge");
        graph
            .create_edge(NewEdge::structural(entity("a"), entity("b"), EdgeType::Mentions))
            .expect("edge");

        let targets: Vec<_> = graph
            .match_edges(&EdgePattern::any().from_node(entity("a")))
            .expect("match")
            .into_iter()
            .map(|e| e.to)
            .collect();
        assert_eq!(targets, vec![entity("c"), entity("b")]);
    }

    #[test]
    fn failed_write_rolls_back_everything() {
        let mut graph = graph_with_entities(&["a", "b"]);

        let result: Result<(), GraphError> = graph.write(|txn| {
            txn.create_edge(derived("a", "b", "s1"))?;
            txn.detach_delete_node(&entity("b"))?;
            Err(GraphError::Validation("abort".to_string()))
        });

        assert!(result.is_err());
        assert!(graph.contains_node(&entity("b")).expect("contains"));
        assert_eq!(graph.edge_count().expect("count"), 0);
    }

    #[test]
    fn rollback_restores_updates_deletes_and_edge_ids() {
        let mut graph = graph_with_entities(&["a", "b", "c"]);
        graph.create_edge(derived("a", "b", "s1")).expect("edge");
        graph.create_edge(derived("b", "c", "s2")).expect("edge");
        let before_nodes: Vec<NodeRecord> = graph.nodes().cloned().collect();
        let before_edges: Vec<EdgeRecord> = graph.edges().cloned().collect();
        let before_adjacency = graph.adjacency.clone();
        let before_provenance = graph.provenance.clone();

        let result: Result<(), GraphError> = graph.write(|txn| {
            txn.update_node(NodeRecord::new(entity("a")).with_property("name", "changed"))?;
            txn.delete_edges(&EdgePattern::tagged(&StatementId::new("s1")))?;
            txn.detach_delete_node(&entity("c"))?;
            txn.create_node(NodeRecord::new(entity("d")))?;
            txn.create_edge(derived("a", "d", "s3"))?;
            Err(GraphError::Validation("abort".to_string()))
        });
        assert!(result.is_err());

        assert_eq!(graph.nodes().cloned().collect::<Vec<_>>(), before_nodes);
        assert_eq!(graph.edges().cloned().collect::<Vec<_>>(), before_edges);
        assert_eq!(graph.adjacency, before_adjacency);
        assert_eq!(graph.provenance, before_provenance);
        let s1 = graph
            .match_edges(&EdgePattern::tagged(&StatementId::new("s1")))
            .expect("match");
        assert_eq!(s1.len(), 1);
        let from_c = graph
            .match_edges(&EdgePattern::any().to_node(entity("c")))
            .expect("match");
        assert_eq!(from_c.len(), 1);
        assert!(
            graph
                .match_edges(&EdgePattern::tagged(&StatementId::new("s3")))
                .expect("match")
                .is_empty()
        );

        let next = graph.create_edge(derived("a", "c", "s4")).expect("edge");
        assert_eq!(next, Some(EdgeId(2)));
    }

    #[test]
    fn successful_write_commits() {
        let mut graph = graph_with_entities(&["a", "b"]);
        let id = graph
            .write(|txn| txn.create_edge(derived("a", "b", "s1")))
            .expect("write");
        assert!(id.is_some());
        assert_eq!(graph.edge_count().expect("count"), 1);
    }

    #[test]
    fn update_node_replaces_labels() {
        let mut graph = graph_with_entities(&["a"]);
        let mut labels = BTreeSet::new();
        labels.insert("NamedEntity".to_string());
        labels.insert("Person".to_string());
        let updated = NodeRecord::new(entity("a")).with_labels(labels.clone());

        assert!(graph.update_node(updated).expect("update"));
        let node = graph.get_node(&entity("a")).expect("get").expect("node");
        assert_eq!(node.labels, labels);
        assert!(
            !graph
                .update_node(NodeRecord::new(entity("zzz")))
                .expect("update")
        );
    }
}
