//! # Entity Registry
//!
//! Manages NamedEntity and Topic nodes: creation, existence checks, lookups
//! and the dynamic label set of entities.
//!
//! Labels are stored as an explicit set on the node record. The base tag
//! `NamedEntity` is inserted here and nowhere else, so every path that writes
//! an entity goes through `normalize_labels`.

use crate::cascade::{CascadeCoordinator, CascadeReport};
use crate::graph::{GraphRead, GraphTxn};
use crate::primitives::{MAX_LABEL_LENGTH, MAX_LABELS, MAX_NAME_LENGTH, NAME_PROPERTY};
use crate::{EntityId, GraphError, NamedEntity, NodeKind, NodePattern, NodeRecord, NodeRef};
use crate::{Topic, TopicId};
use std::collections::BTreeSet;

/// Registry for entities and topics.
pub struct EntityRegistry;

impl EntityRegistry {
    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Validate an entity or topic name.
    ///
    /// A name is valid if it is not blank and within `MAX_NAME_LENGTH` bytes.
    pub fn validate_name(name: &str) -> Result<(), GraphError> {
        if name.trim().is_empty() {
            return Err(GraphError::Validation("name must not be empty".to_string()));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(GraphError::Validation(format!(
                "name exceeds {MAX_NAME_LENGTH} bytes"
            )));
        }
        Ok(())
    }

    /// Validate a single label.
    ///
    /// Labels become part of the graph's type vocabulary, so each one must be
    /// an identifier: an ASCII letter followed by ASCII alphanumerics or `_`.
    pub fn validate_label(label: &str) -> Result<(), GraphError> {
        let mut chars = label.chars();
        let leading = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        if !leading || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GraphError::Validation(format!("invalid label: {label:?}")));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(GraphError::Validation(format!(
                "label exceeds {MAX_LABEL_LENGTH} bytes"
            )));
        }
        if label == NodeKind::Statement.label() || label == NodeKind::Topic.label() {
            return Err(GraphError::Validation(format!("reserved label: {label}")));
        }
        Ok(())
    }

    /// Validate caller labels and return the full set, base tag included.
    pub fn normalize_labels(labels: &[String]) -> Result<BTreeSet<String>, GraphError> {
        let mut set = BTreeSet::new();
        set.insert(NodeKind::NamedEntity.label().to_string());
        for label in labels {
            Self::validate_label(label)?;
            set.insert(label.clone());
        }
        if set.len() > MAX_LABELS {
            return Err(GraphError::Validation(format!(
                "an entity carries at most {MAX_LABELS} labels"
            )));
        }
        Ok(set)
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    /// Create a named entity.
    ///
    /// Uses `id` when supplied and non-blank, otherwise generates one.
    /// Fails with `GraphError::Conflict` when the id is already taken.
    pub fn create<T: GraphTxn + ?Sized>(
        txn: &mut T,
        name: &str,
        id: Option<EntityId>,
        labels: &[String],
    ) -> Result<EntityId, GraphError> {
        Self::validate_name(name)?;
        let labels = Self::normalize_labels(labels)?;
        let id = EntityId::or_generate(id);

        let node = NodeRecord::new(NodeRef::entity(&id))
            .with_labels(labels)
            .with_property(NAME_PROPERTY, name);
        txn.create_node(node)?;

        tracing::debug!(entity = %id, "entity created");
        Ok(id)
    }

    /// Check whether an entity exists.
    pub fn exists<R: GraphRead + ?Sized>(view: &R, id: &EntityId) -> Result<bool, GraphError> {
        view.contains_node(&NodeRef::entity(id))
    }

    /// Fetch an entity. Fails with `GraphError::NotFound` when absent.
    pub fn get<R: GraphRead + ?Sized>(view: &R, id: &EntityId) -> Result<NamedEntity, GraphError> {
        let key = NodeRef::entity(id);
        view.get_node(&key)?
            .map(entity_from_node)
            .ok_or_else(|| GraphError::not_found(&key))
    }

    /// All entities with exactly this name, in id order. May be empty.
    pub fn find_by_name<R: GraphRead + ?Sized>(
        view: &R,
        name: &str,
    ) -> Result<Vec<NamedEntity>, GraphError> {
        let pattern =
            NodePattern::of_kind(NodeKind::NamedEntity).with_property(NAME_PROPERTY, name);
        Ok(view
            .match_nodes(&pattern)?
            .into_iter()
            .map(entity_from_node)
            .collect())
    }

    /// The single entity with this name.
    ///
    /// Fails with `NotFound` when there is none and `Validation` when the
    /// name is ambiguous.
    pub fn find_one_by_name<R: GraphRead + ?Sized>(
        view: &R,
        name: &str,
    ) -> Result<NamedEntity, GraphError> {
        let mut matches = Self::find_by_name(view, name)?;
        match matches.len() {
            0 => Err(GraphError::NotFound {
                kind: NodeKind::NamedEntity,
                id: name.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            n => Err(GraphError::Validation(format!(
                "name {name:?} matches {n} entities"
            ))),
        }
    }

    /// Replace the entity's whole label set.
    ///
    /// Afterwards the labels are exactly `labels` plus the base tag,
    /// whatever they were before. Idempotent.
    pub fn relabel<T: GraphTxn + ?Sized>(
        txn: &mut T,
        id: &EntityId,
        labels: &[String],
    ) -> Result<NamedEntity, GraphError> {
        let labels = Self::normalize_labels(labels)?;
        let key = NodeRef::entity(id);
        let node = txn
            .get_node(&key)?
            .ok_or_else(|| GraphError::not_found(&key))?
            .with_labels(labels);

        if !txn.update_node(node.clone())? {
            return Err(GraphError::not_found(&key));
        }
        tracing::debug!(entity = %id, labels = node.labels.len(), "entity relabeled");
        Ok(entity_from_node(node))
    }

    /// Delete an entity and cascade into its statements.
    pub fn delete<T: GraphTxn + ?Sized>(
        txn: &mut T,
        id: &EntityId,
    ) -> Result<CascadeReport, GraphError> {
        CascadeCoordinator::delete_entity(txn, id)
    }

    // =========================================================================
    // TOPICS
    // =========================================================================

    /// Create a topic, generating an id when none is supplied.
    pub fn create_topic<T: GraphTxn + ?Sized>(
        txn: &mut T,
        name: &str,
        id: Option<TopicId>,
    ) -> Result<TopicId, GraphError> {
        Self::validate_name(name)?;
        let id = TopicId::or_generate(id);
        txn.create_node(NodeRecord::new(NodeRef::topic(&id)).with_property(NAME_PROPERTY, name))?;
        tracing::debug!(topic = %id, "topic created");
        Ok(id)
    }

    pub fn topic_exists<R: GraphRead + ?Sized>(view: &R, id: &TopicId) -> Result<bool, GraphError> {
        view.contains_node(&NodeRef::topic(id))
    }

    pub fn get_topic<R: GraphRead + ?Sized>(view: &R, id: &TopicId) -> Result<Topic, GraphError> {
        let key = NodeRef::topic(id);
        view.get_node(&key)?
            .map(topic_from_node)
            .ok_or_else(|| GraphError::not_found(&key))
    }

    /// Every topic, in id order.
    pub fn list_topics<R: GraphRead + ?Sized>(view: &R) -> Result<Vec<Topic>, GraphError> {
        Ok(view
            .match_nodes(&NodePattern::of_kind(NodeKind::Topic))?
            .into_iter()
            .map(topic_from_node)
            .collect())
    }

    pub fn rename_topic<T: GraphTxn + ?Sized>(
        txn: &mut T,
        id: &TopicId,
        name: &str,
    ) -> Result<Topic, GraphError> {
        Self::validate_name(name)?;
        let key = NodeRef::topic(id);
        let node = txn
            .get_node(&key)?
            .ok_or_else(|| GraphError::not_found(&key))?
            .with_property(NAME_PROPERTY, name);
        if !txn.update_node(node.clone())? {
            return Err(GraphError::not_found(&key));
        }
        Ok(topic_from_node(node))
    }

    /// Delete a topic. Statements that referenced it lose their topic edge.
    pub fn delete_topic<T: GraphTxn + ?Sized>(txn: &mut T, id: &TopicId) -> Result<(), GraphError> {
        let key = NodeRef::topic(id);
        if !txn.detach_delete_node(&key)? {
            return Err(GraphError::not_found(&key));
        }
        tracing::debug!(topic = %id, "topic deleted");
        Ok(())
    }
}

fn entity_from_node(node: NodeRecord) -> NamedEntity {
    NamedEntity {
        id: EntityId::new(node.key.id.clone()),
        name: node.property(NAME_PROPERTY).unwrap_or_default().to_string(),
        labels: node.labels,
    }
}

fn topic_from_node(node: NodeRecord) -> Topic {
    Topic {
        id: TopicId::new(node.key.id.clone()),
        name: node.property(NAME_PROPERTY).unwrap_or_default().to_string(),
    }
}
