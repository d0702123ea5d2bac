//! # kgraph-core
//!
//! The graph-consistency engine for kgraph.
//!
//! kgraph stores named entities, free-text statements about them, topics,
//! and the symmetric relationships a statement establishes between the
//! entities it is about and the entities it mentions. This crate owns the
//! rules that keep those derived relationships in sync with their source
//! statements as entities, statements and mentions are created, updated and
//! deleted.
//!
//! ## Architecture
//!
//! - `graph` / `storage`: the transactional store interface, with an
//!   in-memory and a redb backend
//! - `registry`: entities, their label sets, and topics
//! - `statement`: statements and the edges they own
//! - `derivation`: derive, tag and retract statement relations
//! - `cascade`: entity deletes that cascade into statements
//! - `session`: the owned handle that runs each operation as one transaction
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: NO async, NO network dependencies
//! - Deterministic: `BTreeMap`/`BTreeSet` only
//! - Components are stateless; the store is the only shared mutable state

// =============================================================================
// MODULES
// =============================================================================

pub mod bootstrap;
pub mod cascade;
pub mod classifier;
pub mod derivation;
pub mod graph;
pub mod primitives;
pub mod registry;
pub mod session;
pub mod statement;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    DerivedRelation, EdgeId, EdgePattern, EdgeRecord, EdgeType, EntityId, GraphError, NamedEntity,
    NewEdge, NodeKind, NodePattern, NodeRecord, NodeRef, RelationshipKind, Statement, StatementId,
    Topic, TopicId,
};

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use bootstrap::{RetryPolicy, with_retry};
pub use cascade::{CascadeCoordinator, CascadeReport};
pub use classifier::{DefaultClassifier, KeywordClassifier, KeywordRule, RelationClassifier};
pub use derivation::DerivedRelationManager;
pub use graph::{Graph, GraphRead, GraphStore, GraphTxn};
pub use registry::EntityRegistry;
pub use session::{GraphSummary, Session, StorageBackend};
pub use statement::StatementEngine;
pub use storage::RedbGraph;
