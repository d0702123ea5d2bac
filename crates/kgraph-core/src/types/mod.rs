//! # Core Type Definitions
//!
//! This module contains all core types for the kgraph consistency engine:
//! - Domain identifiers (`EntityId`, `StatementId`, `TopicId`, `EdgeId`)
//! - Store-level records and match patterns (`NodeRecord`, `EdgeRecord`,
//!   `NodePattern`, `EdgePattern`)
//! - Domain views returned to callers (`NamedEntity`, `Statement`, `Topic`,
//!   `DerivedRelation`)
//! - Error types (`GraphError`)
//!
//! ## Determinism Guarantees
//!
//! All collections are `BTreeMap`/`BTreeSet` and every identifier implements
//! `Ord`, so store iteration order never depends on hashing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

// =============================================================================
// DOMAIN IDENTIFIERS
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Use the caller-supplied id, or generate one when it is absent or blank.
            #[must_use]
            pub fn or_generate(id: Option<Self>) -> Self {
                match id {
                    Some(id) if !id.0.trim().is_empty() => id,
                    _ => Self::generate(),
                }
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Unique, immutable identifier of a NamedEntity.
    EntityId
);
string_id!(
    /// Unique identifier of a Statement.
    StatementId
);
string_id!(
    /// Unique identifier of a Topic.
    TopicId
);

/// Store-assigned handle of a single edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

// =============================================================================
// NODES
// =============================================================================

/// The base label of every node kind.
///
/// Each kind carries its own uniqueness constraint on `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    NamedEntity,
    Statement,
    Topic,
}

impl NodeKind {
    /// The label string stored on nodes of this kind.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NamedEntity => "NamedEntity",
            Self::Statement => "Statement",
            Self::Topic => "Topic",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to a node by kind and id: the unit of uniqueness in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub id: String,
}

impl NodeRef {
    #[must_use]
    pub fn entity(id: &EntityId) -> Self {
        Self {
            kind: NodeKind::NamedEntity,
            id: id.0.clone(),
        }
    }

    #[must_use]
    pub fn statement(id: &StatementId) -> Self {
        Self {
            kind: NodeKind::Statement,
            id: id.0.clone(),
        }
    }

    #[must_use]
    pub fn topic(id: &TopicId) -> Self {
        Self {
            kind: NodeKind::Topic,
            id: id.0.clone(),
        }
    }

    /// Flat key used by persistent backends: `<Label>/<id>`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.kind.label(), self.id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

/// A labeled node with string properties, as held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub key: NodeRef,
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, String>,
}

impl NodeRecord {
    /// Create a record carrying only its base label.
    #[must_use]
    pub fn new(key: NodeRef) -> Self {
        let mut labels = BTreeSet::new();
        labels.insert(key.kind.label().to_string());
        Self {
            key,
            labels,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: BTreeSet<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Read a property value.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Pattern for matching nodes of one kind, optionally by an exact property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePattern {
    pub kind: NodeKind,
    pub property: Option<(String, String)>,
}

impl NodePattern {
    #[must_use]
    pub fn of_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            property: None,
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.property = Some((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn matches(&self, node: &NodeRecord) -> bool {
        node.key.kind == self.kind
            && self
                .property
                .as_ref()
                .is_none_or(|(k, v)| node.property(k) == Some(v.as_str()))
    }
}

// =============================================================================
// EDGES
// =============================================================================

/// Kind of a derived relationship, e.g. `MARRIED_TO`.
///
/// A usable kind is UPPER_SNAKE_CASE and never shadows a structural edge type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipKind(pub String);

impl RelationshipKind {
    /// Generic kind used when no better classification is available.
    pub const DEFAULT: &'static str = "ASSOCIATED_WITH";

    /// Parse a kind, returning `None` when it is not usable as an edge type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let leading_letter = chars.next().is_some_and(|c| c.is_ascii_uppercase());
        let well_formed = chars.all(|c| c.is_ascii_uppercase() || c == '_');
        if !leading_letter || !well_formed || EdgeType::is_structural_name(s) {
            return None;
        }
        Some(Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keep this kind if usable, else fall back to the default kind.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self::parse(&self.0).unwrap_or_default()
    }
}

impl Default for RelationshipKind {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of a directed edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// Statement -> NamedEntity, exactly one per statement.
    IsAbout,
    /// Statement -> NamedEntity, zero or more per statement.
    Mentions,
    /// Statement -> Topic, at most one per statement.
    HasTopic,
    /// NamedEntity -> NamedEntity, produced by a statement.
    Derived(RelationshipKind),
}

impl EdgeType {
    const STRUCTURAL: [&'static str; 3] = ["IS_ABOUT", "MENTIONS", "HAS_TOPIC"];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::IsAbout => "IS_ABOUT",
            Self::Mentions => "MENTIONS",
            Self::HasTopic => "HAS_TOPIC",
            Self::Derived(kind) => kind.as_str(),
        }
    }

    #[must_use]
    pub fn is_structural_name(name: &str) -> bool {
        Self::STRUCTURAL.contains(&name)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub from: NodeRef,
    pub to: NodeRef,
    pub edge_type: EdgeType,
    /// Provenance tag; set on derived edges only.
    pub source_statement_id: Option<StatementId>,
}

/// An edge to be created; the store assigns its `EdgeId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEdge {
    pub from: NodeRef,
    pub to: NodeRef,
    pub edge_type: EdgeType,
    pub source_statement_id: Option<StatementId>,
}

impl NewEdge {
    /// An untagged structural edge.
    #[must_use]
    pub fn structural(from: NodeRef, to: NodeRef, edge_type: EdgeType) -> Self {
        Self {
            from,
            to,
            edge_type,
            source_statement_id: None,
        }
    }

    /// A derived edge between two entities, tagged with its source statement.
    #[must_use]
    pub fn derived(
        from: &EntityId,
        to: &EntityId,
        kind: RelationshipKind,
        source: &StatementId,
    ) -> Self {
        Self {
            from: NodeRef::entity(from),
            to: NodeRef::entity(to),
            edge_type: EdgeType::Derived(kind),
            source_statement_id: Some(source.clone()),
        }
    }

    #[must_use]
    pub fn into_record(self, id: EdgeId) -> EdgeRecord {
        EdgeRecord {
            id,
            from: self.from,
            to: self.to,
            edge_type: self.edge_type,
            source_statement_id: self.source_statement_id,
        }
    }
}

/// Pattern for matching edges. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgePattern {
    pub from: Option<NodeRef>,
    pub to: Option<NodeRef>,
    pub edge_type: Option<EdgeType>,
    pub source_statement_id: Option<StatementId>,
}

impl EdgePattern {
    /// Match every edge.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Match every edge carrying the given provenance tag.
    #[must_use]
    pub fn tagged(statement: &StatementId) -> Self {
        Self {
            source_statement_id: Some(statement.clone()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_node(mut self, node: NodeRef) -> Self {
        self.from = Some(node);
        self
    }

    #[must_use]
    pub fn to_node(mut self, node: NodeRef) -> Self {
        self.to = Some(node);
        self
    }

    #[must_use]
    pub fn of_type(mut self, edge_type: EdgeType) -> Self {
        self.edge_type = Some(edge_type);
        self
    }

    #[must_use]
    pub fn matches(&self, edge: &EdgeRecord) -> bool {
        self.from.as_ref().is_none_or(|n| *n == edge.from)
            && self.to.as_ref().is_none_or(|n| *n == edge.to)
            && self.edge_type.as_ref().is_none_or(|t| *t == edge.edge_type)
            && self
                .source_statement_id
                .as_ref()
                .is_none_or(|s| edge.source_statement_id.as_ref() == Some(s))
    }
}

// =============================================================================
// DOMAIN VIEWS
// =============================================================================

/// A person, organization or other named thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: EntityId,
    pub name: String,
    /// Type tags; always contains the base tag `NamedEntity`.
    pub labels: BTreeSet<String>,
}

impl NamedEntity {
    /// Labels other than the base tag.
    pub fn additional_labels(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .map(String::as_str)
            .filter(|l| *l != NodeKind::NamedEntity.label())
    }
}

/// Free text about exactly one subject entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: StatementId,
    pub text: String,
    pub about_entity_id: EntityId,
    pub topic_id: Option<TopicId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
}

/// One direction of a symmetric relationship produced by a statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DerivedRelation {
    pub from: EntityId,
    pub to: EntityId,
    pub kind: RelationshipKind,
    pub source_statement_id: StatementId,
}

impl DerivedRelation {
    /// Read a derived relation back from a tagged entity-to-entity edge.
    #[must_use]
    pub fn from_edge(edge: &EdgeRecord) -> Option<Self> {
        let EdgeType::Derived(kind) = &edge.edge_type else {
            return None;
        };
        if edge.from.kind != NodeKind::NamedEntity || edge.to.kind != NodeKind::NamedEntity {
            return None;
        }
        Some(Self {
            from: EntityId::new(edge.from.id.clone()),
            to: EntityId::new(edge.to.id.clone()),
            kind: kind.clone(),
            source_statement_id: edge.source_statement_id.clone()?,
        })
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the kgraph engine.
///
/// Every component-level operation returns either its result or exactly one
/// of these; store failures are never swallowed.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Malformed input, e.g. empty statement text or an invalid label.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced entity, statement or topic does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: NodeKind, id: String },

    /// Id collision on create.
    #[error("{kind} already exists: {id}")]
    Conflict { kind: NodeKind, id: String },

    /// Transport-level failure talking to the backing store.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl GraphError {
    #[must_use]
    pub fn not_found(node: &NodeRef) -> Self {
        Self::NotFound {
            kind: node.kind,
            id: node.id.clone(),
        }
    }

    #[must_use]
    pub fn conflict(node: &NodeRef) -> Self {
        Self::Conflict {
            kind: node.kind,
            id: node.id.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
