//! # Session Module
//!
//! The owned handle callers hold: a graph store plus the relation
//! classifier. Every public operation here is exactly one store transaction,
//! so compound steps (create-then-mention, retract-then-derive, cascading
//! deletes) either apply completely or not at all.
//!
//! ## Storage Backends
//!
//! Session supports two storage backends:
//! - `InMemory`: uses the in-memory `Graph` (fast, volatile)
//! - `Persistent`: uses `RedbGraph` for disk-backed ACID storage
//!
//! Any other `GraphStore` can be plugged in with `Session::with_store`.

use crate::bootstrap::{self, RetryPolicy};
use crate::cascade::CascadeReport;
use crate::classifier::{DefaultClassifier, RelationClassifier};
use crate::derivation::DerivedRelationManager;
use crate::graph::{Graph, GraphRead, GraphStore, GraphTxn};
use crate::registry::EntityRegistry;
use crate::statement::StatementEngine;
use crate::storage::RedbGraph;
use crate::{
    DerivedRelation, EdgePattern, EntityId, GraphError, NamedEntity, NodeKind, Statement,
    StatementId, Topic, TopicId,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend chosen at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory graph (fast, volatile).
    InMemory(Graph),
    /// Disk-backed graph using redb (ACID, persistent).
    Persistent(RedbGraph),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(Graph::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbGraph (database handle) cannot be safely cloned.

impl GraphStore for StorageBackend {
    fn read<T>(
        &self,
        op: impl FnOnce(&dyn GraphRead) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        match self {
            Self::InMemory(graph) => graph.read(op),
            Self::Persistent(redb) => redb.read(op),
        }
    }

    fn write<T>(
        &mut self,
        op: impl FnOnce(&mut dyn GraphTxn) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        match self {
            Self::InMemory(graph) => graph.write(op),
            Self::Persistent(redb) => redb.write(op),
        }
    }

    fn ensure_schema(&mut self) -> Result<(), GraphError> {
        match self {
            Self::InMemory(graph) => graph.ensure_schema(),
            Self::Persistent(redb) => redb.ensure_schema(),
        }
    }
}

// =============================================================================
// SUMMARY
// =============================================================================

/// Counts describing the current graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub entities: usize,
    pub statements: usize,
    pub topics: usize,
    pub edges: usize,
    /// Edges carrying a source statement tag.
    pub derived_edges: usize,
}

// =============================================================================
// SESSION
// =============================================================================

/// A store handle plus the classifier used for derivation.
///
/// Note: Session does NOT implement Clone; the store handle is owned.
pub struct Session<S = StorageBackend> {
    store: S,
    classifier: Box<dyn RelationClassifier>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_store(StorageBackend::default())
    }
}

impl Session {
    /// Create a new empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with an existing in-memory graph.
    #[must_use]
    pub fn with_graph(graph: Graph) -> Self {
        Self::with_store(StorageBackend::InMemory(graph))
    }

    /// Create a session with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path. No retry.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let redb = RedbGraph::open(path)?;
        Ok(Self::with_store(StorageBackend::Persistent(redb)))
    }

    /// Open a redb database, retrying per `policy` while it is unavailable.
    pub fn open_redb(path: impl AsRef<Path>, policy: RetryPolicy) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let redb = bootstrap::with_retry(policy, || RedbGraph::open(path))?;
        tracing::info!(path = %path.display(), "opened redb graph");
        Ok(Self::with_store(StorageBackend::Persistent(redb)))
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.store, StorageBackend::Persistent(_))
    }
}

impl<S: GraphStore> Session<S> {
    /// Wrap any store, using the default classifier.
    #[must_use]
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            classifier: Box::new(DefaultClassifier),
        }
    }

    /// Replace the relation classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl RelationClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Make sure the schema exists, retrying while the store is unreachable.
    pub fn ensure_schema(&mut self, policy: RetryPolicy) -> Result<(), GraphError> {
        bootstrap::ensure_schema(&mut self.store, policy)
    }

    /// Run several component operations as one transaction with this
    /// session's classifier. Nothing is committed unless `op` returns `Ok`.
    pub fn transaction<T>(
        &mut self,
        op: impl FnOnce(&mut dyn GraphTxn, &dyn RelationClassifier) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let classifier = self.classifier.as_ref();
        self.store.write(|txn| op(txn, classifier))
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    pub fn create_entity(
        &mut self,
        name: &str,
        id: Option<EntityId>,
        labels: &[String],
    ) -> Result<EntityId, GraphError> {
        self.store
            .write(|txn| EntityRegistry::create(txn, name, id, labels))
    }

    pub fn entity_exists(&self, id: &EntityId) -> Result<bool, GraphError> {
        self.store.read(|view| EntityRegistry::exists(view, id))
    }

    pub fn get_entity(&self, id: &EntityId) -> Result<NamedEntity, GraphError> {
        self.store.read(|view| EntityRegistry::get(view, id))
    }

    /// All entities with this name; empty when there are none.
    pub fn find_entities_by_name(&self, name: &str) -> Result<Vec<NamedEntity>, GraphError> {
        self.store.read(|view| EntityRegistry::find_by_name(view, name))
    }

    /// Exactly one entity with this name, else `NotFound` / `Validation`.
    pub fn find_entity_by_name(&self, name: &str) -> Result<NamedEntity, GraphError> {
        self.store
            .read(|view| EntityRegistry::find_one_by_name(view, name))
    }

    pub fn relabel_entity(
        &mut self,
        id: &EntityId,
        labels: &[String],
    ) -> Result<NamedEntity, GraphError> {
        self.store
            .write(|txn| EntityRegistry::relabel(txn, id, labels))
    }

    /// Delete an entity, cascading into the statements about it.
    pub fn delete_entity(&mut self, id: &EntityId) -> Result<CascadeReport, GraphError> {
        self.store.write(|txn| EntityRegistry::delete(txn, id))
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    pub fn create_statement(
        &mut self,
        text: &str,
        about: &EntityId,
        id: Option<StatementId>,
    ) -> Result<StatementId, GraphError> {
        self.store
            .write(|txn| StatementEngine::create(txn, text, about, id))
    }

    /// Create a statement and set its initial mentions in one transaction.
    pub fn create_statement_with_mentions(
        &mut self,
        text: &str,
        about: &EntityId,
        id: Option<StatementId>,
        mentions: &[EntityId],
    ) -> Result<(StatementId, Vec<DerivedRelation>), GraphError> {
        let classifier = self.classifier.as_ref();
        self.store.write(|txn| {
            let id = StatementEngine::create(txn, text, about, id)?;
            let derived = StatementEngine::replace_mentions(txn, classifier, &id, mentions)?;
            Ok((id, derived))
        })
    }

    pub fn get_statement(&self, id: &StatementId) -> Result<Statement, GraphError> {
        self.store.read(|view| StatementEngine::get(view, id))
    }

    pub fn update_statement_text(
        &mut self,
        id: &StatementId,
        text: &str,
    ) -> Result<Statement, GraphError> {
        self.store
            .write(|txn| StatementEngine::update_text(txn, id, text))
    }

    /// Set or clear (`None`) the statement's topic.
    pub fn set_statement_topic(
        &mut self,
        id: &StatementId,
        topic: Option<&TopicId>,
    ) -> Result<Statement, GraphError> {
        self.store
            .write(|txn| StatementEngine::set_topic(txn, id, topic))
    }

    pub fn statement_mentions(&self, id: &StatementId) -> Result<Vec<NamedEntity>, GraphError> {
        self.store
            .read(|view| StatementEngine::mentioned_entities(view, id))
    }

    /// Replace the mention set and re-derive relations atomically.
    pub fn replace_mentions(
        &mut self,
        id: &StatementId,
        mentions: &[EntityId],
    ) -> Result<Vec<DerivedRelation>, GraphError> {
        let classifier = self.classifier.as_ref();
        self.store
            .write(|txn| StatementEngine::replace_mentions(txn, classifier, id, mentions))
    }

    pub fn delete_statement(&mut self, id: &StatementId) -> Result<(), GraphError> {
        self.store.write(|txn| StatementEngine::delete(txn, id))
    }

    pub fn statements_about(&self, entity: &EntityId) -> Result<Vec<Statement>, GraphError> {
        self.store
            .read(|view| StatementEngine::list_about(view, entity))
    }

    pub fn statements_mentioning(&self, entity: &EntityId) -> Result<Vec<StatementId>, GraphError> {
        self.store
            .read(|view| StatementEngine::list_mentioning(view, entity))
    }

    // =========================================================================
    // DERIVED RELATIONS
    // =========================================================================

    /// Relations produced by one statement.
    pub fn derived_relations(&self, id: &StatementId) -> Result<Vec<DerivedRelation>, GraphError> {
        self.store
            .read(|view| DerivedRelationManager::tagged(view, id))
    }

    /// Relations leaving an entity, from any statement.
    pub fn relations_of(&self, entity: &EntityId) -> Result<Vec<DerivedRelation>, GraphError> {
        self.store
            .read(|view| DerivedRelationManager::relations_of(view, entity))
    }

    // =========================================================================
    // TOPICS
    // =========================================================================

    pub fn create_topic(&mut self, name: &str, id: Option<TopicId>) -> Result<TopicId, GraphError> {
        self.store
            .write(|txn| EntityRegistry::create_topic(txn, name, id))
    }

    pub fn get_topic(&self, id: &TopicId) -> Result<Topic, GraphError> {
        self.store.read(|view| EntityRegistry::get_topic(view, id))
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>, GraphError> {
        self.store.read(|view| EntityRegistry::list_topics(view))
    }

    pub fn rename_topic(&mut self, id: &TopicId, name: &str) -> Result<Topic, GraphError> {
        self.store
            .write(|txn| EntityRegistry::rename_topic(txn, id, name))
    }

    pub fn delete_topic(&mut self, id: &TopicId) -> Result<(), GraphError> {
        self.store
            .write(|txn| EntityRegistry::delete_topic(txn, id))
    }

    // =========================================================================
    // SUMMARY
    // =========================================================================

    /// Node and edge counts, read from one consistent view.
    pub fn describe(&self) -> Result<GraphSummary, GraphError> {
        self.store.read(|view| {
            let derived_edges = view
                .match_edges(&EdgePattern::any())?
                .iter()
                .filter(|edge| edge.source_statement_id.is_some())
                .count();
            Ok(GraphSummary {
                nodes: view.node_count(None)?,
                entities: view.node_count(Some(NodeKind::NamedEntity))?,
                statements: view.node_count(Some(NodeKind::Statement))?,
                topics: view.node_count(Some(NodeKind::Topic))?,
                edges: view.edge_count()?,
                derived_edges,
            })
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
