//! # Statement Engine
//!
//! Manages Statement nodes and the edges a statement owns:
//! - `IS_ABOUT`: exactly one, set at creation, never changed
//! - `MENTIONS`: replaced wholesale by `replace_mentions`
//! - `HAS_TOPIC`: at most one, set or cleared by `set_topic`
//!
//! Mention replacement hands over to the `DerivedRelationManager` in the
//! same transaction, so the retract-then-derive step is never observable
//! half done.

use crate::classifier::RelationClassifier;
use crate::derivation::DerivedRelationManager;
use crate::graph::{GraphRead, GraphTxn};
use crate::primitives::{MAX_MENTIONS, MAX_TEXT_LENGTH, TEXT_PROPERTY};
use crate::registry::EntityRegistry;
use crate::{
    DerivedRelation, EdgePattern, EdgeType, EntityId, GraphError, NamedEntity, NewEdge, NodeKind,
    NodeRecord, NodeRef, Statement, StatementId, TopicId,
};

/// Engine for statement lifecycle and mention tracking.
pub struct StatementEngine;

impl StatementEngine {
    /// Validate statement text.
    ///
    /// Text must contain at least one non-whitespace character and stay
    /// within `MAX_TEXT_LENGTH` bytes.
    pub fn validate_text(text: &str) -> Result<(), GraphError> {
        if text.trim().is_empty() {
            return Err(GraphError::Validation(
                "statement text must not be empty".to_string(),
            ));
        }
        if text.len() > MAX_TEXT_LENGTH {
            return Err(GraphError::Validation(format!(
                "statement text exceeds {MAX_TEXT_LENGTH} bytes"
            )));
        }
        Ok(())
    }

    /// Create a statement about an existing entity.
    ///
    /// Creates the node and its `IS_ABOUT` edge only. Mentions and derived
    /// relations are a separate step.
    pub fn create<T: GraphTxn + ?Sized>(
        txn: &mut T,
        text: &str,
        about: &EntityId,
        id: Option<StatementId>,
    ) -> Result<StatementId, GraphError> {
        Self::validate_text(text)?;
        if !EntityRegistry::exists(&*txn, about)? {
            return Err(GraphError::not_found(&NodeRef::entity(about)));
        }

        let id = StatementId::or_generate(id);
        let key = NodeRef::statement(&id);
        txn.create_node(NodeRecord::new(key.clone()).with_property(TEXT_PROPERTY, text))?;
        txn.create_edge(NewEdge::structural(
            key,
            NodeRef::entity(about),
            EdgeType::IsAbout,
        ))?
        .ok_or_else(|| GraphError::not_found(&NodeRef::entity(about)))?;

        tracing::debug!(statement = %id, about = %about, "statement created");
        Ok(id)
    }

    pub fn exists<R: GraphRead + ?Sized>(view: &R, id: &StatementId) -> Result<bool, GraphError> {
        view.contains_node(&NodeRef::statement(id))
    }

    /// Fetch a statement with its subject and topic.
    ///
    /// A statement node without an `IS_ABOUT` edge is reported as not found.
    pub fn get<R: GraphRead + ?Sized>(view: &R, id: &StatementId) -> Result<Statement, GraphError> {
        let key = NodeRef::statement(id);
        let node = view
            .get_node(&key)?
            .ok_or_else(|| GraphError::not_found(&key))?;

        let about = view
            .match_edges(
                &EdgePattern::any()
                    .from_node(key.clone())
                    .of_type(EdgeType::IsAbout),
            )?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::not_found(&key))?;

        let topic = view
            .match_edges(
                &EdgePattern::any()
                    .from_node(key.clone())
                    .of_type(EdgeType::HasTopic),
            )?
            .into_iter()
            .next()
            .map(|edge| TopicId::new(edge.to.id));

        Ok(Statement {
            id: id.clone(),
            text: node.property(TEXT_PROPERTY).unwrap_or_default().to_string(),
            about_entity_id: EntityId::new(about.to.id),
            topic_id: topic,
        })
    }

    /// Replace the statement's text in place. Edges are left untouched.
    pub fn update_text<T: GraphTxn + ?Sized>(
        txn: &mut T,
        id: &StatementId,
        text: &str,
    ) -> Result<Statement, GraphError> {
        Self::validate_text(text)?;
        let key = NodeRef::statement(id);
        let node = txn
            .get_node(&key)?
            .ok_or_else(|| GraphError::not_found(&key))?
            .with_property(TEXT_PROPERTY, text);
        if !txn.update_node(node)? {
            return Err(GraphError::not_found(&key));
        }
        Self::get(&*txn, id)
    }

    /// Set, replace or clear the statement's topic.
    ///
    /// `None` or a blank id clears the topic. An id that does not resolve to
    /// a topic also leaves the statement without one.
    pub fn set_topic<T: GraphTxn + ?Sized>(
        txn: &mut T,
        id: &StatementId,
        topic: Option<&TopicId>,
    ) -> Result<Statement, GraphError> {
        let key = NodeRef::statement(id);
        if !txn.contains_node(&key)? {
            return Err(GraphError::not_found(&key));
        }

        txn.delete_edges(
            &EdgePattern::any()
                .from_node(key.clone())
                .of_type(EdgeType::HasTopic),
        )?;

        if let Some(topic) = topic.filter(|t| !t.as_str().trim().is_empty()) {
            let edge = NewEdge::structural(key, NodeRef::topic(topic), EdgeType::HasTopic);
            if txn.create_edge(edge)?.is_some() {
                tracing::debug!(statement = %id, topic = %topic, "topic set");
            } else {
                tracing::debug!(statement = %id, topic = %topic, "unknown topic, topic cleared");
            }
        } else {
            tracing::debug!(statement = %id, "topic cleared");
        }
        Self::get(&*txn, id)
    }

    /// Entities the statement currently mentions, in mention order.
    pub fn mentioned_entities<R: GraphRead + ?Sized>(
        view: &R,
        id: &StatementId,
    ) -> Result<Vec<NamedEntity>, GraphError> {
        let key = NodeRef::statement(id);
        if !view.contains_node(&key)? {
            return Err(GraphError::not_found(&key));
        }
        view.match_edges(&EdgePattern::any().from_node(key).of_type(EdgeType::Mentions))?
            .into_iter()
            .map(|edge| EntityRegistry::get(view, &EntityId::new(edge.to.id)))
            .collect()
    }

    /// Replace the statement's full mention set and re-derive its relations.
    ///
    /// Duplicate ids collapse to one mention and ids that do not resolve to
    /// an entity are skipped. An empty list clears every mention and
    /// retracts every relation the statement produced.
    pub fn replace_mentions<T: GraphTxn + ?Sized>(
        txn: &mut T,
        classifier: &dyn RelationClassifier,
        id: &StatementId,
        mentions: &[EntityId],
    ) -> Result<Vec<DerivedRelation>, GraphError> {
        if mentions.len() > MAX_MENTIONS {
            return Err(GraphError::Validation(format!(
                "at most {MAX_MENTIONS} mentions per statement"
            )));
        }
        let statement = Self::get(&*txn, id)?;
        let key = NodeRef::statement(id);

        let mut resolved: Vec<EntityId> = Vec::with_capacity(mentions.len());
        for entity in mentions {
            if resolved.contains(entity) {
                continue;
            }
            if EntityRegistry::exists(&*txn, entity)? {
                resolved.push(entity.clone());
            } else {
                tracing::debug!(statement = %id, entity = %entity, "skipping unknown mention");
            }
        }

        txn.delete_edges(
            &EdgePattern::any()
                .from_node(key.clone())
                .of_type(EdgeType::Mentions),
        )?;
        for entity in &resolved {
            txn.create_edge(NewEdge::structural(
                key.clone(),
                NodeRef::entity(entity),
                EdgeType::Mentions,
            ))?;
        }

        DerivedRelationManager::retract(txn, id)?;
        let derived = DerivedRelationManager::derive_and_apply(txn, classifier, &statement, &resolved)?;

        tracing::debug!(
            statement = %id,
            mentions = resolved.len(),
            derived = derived.len(),
            "mentions replaced"
        );
        Ok(derived)
    }

    /// Delete a statement: retract its relations, then remove the node and
    /// every edge it owns.
    pub fn delete<T: GraphTxn + ?Sized>(txn: &mut T, id: &StatementId) -> Result<(), GraphError> {
        let key = NodeRef::statement(id);
        if !txn.contains_node(&key)? {
            return Err(GraphError::not_found(&key));
        }
        let retracted = DerivedRelationManager::retract(txn, id)?;
        txn.detach_delete_node(&key)?;
        tracing::debug!(statement = %id, retracted, "statement deleted");
        Ok(())
    }

    /// Statements whose subject is the entity, in id order.
    pub fn list_about<R: GraphRead + ?Sized>(
        view: &R,
        entity: &EntityId,
    ) -> Result<Vec<Statement>, GraphError> {
        let ids = Self::statement_ids_with(view, entity, EdgeType::IsAbout)?;
        ids.iter().map(|id| Self::get(view, id)).collect()
    }

    /// Ids of statements that mention the entity, in id order.
    pub fn list_mentioning<R: GraphRead + ?Sized>(
        view: &R,
        entity: &EntityId,
    ) -> Result<Vec<StatementId>, GraphError> {
        Self::statement_ids_with(view, entity, EdgeType::Mentions)
    }

    fn statement_ids_with<R: GraphRead + ?Sized>(
        view: &R,
        entity: &EntityId,
        edge_type: EdgeType,
    ) -> Result<Vec<StatementId>, GraphError> {
        let key = NodeRef::entity(entity);
        if !view.contains_node(&key)? {
            return Err(GraphError::not_found(&key));
        }
        let mut ids: Vec<StatementId> = view
            .match_edges(&EdgePattern::any().to_node(key).of_type(edge_type))?
            .into_iter()
            .filter(|edge| edge.from.kind == NodeKind::Statement)
            .map(|edge| StatementId::new(edge.from.id))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DefaultClassifier;
    use crate::{Graph, GraphStore};

    fn graph_with(entities: &[&str]) -> Graph {
        let mut graph = Graph::new();
        for id in entities {
            EntityRegistry::create(&mut graph, id, Some((*id).into()), &[]).expect("entity");
        }
        graph
    }

    fn ids(items: &[&str]) -> Vec<EntityId> {
        items.iter().map(|s| EntityId::new(*s)).collect()
    }

    #[test]
    fn create_requires_text_and_subject() {
        let mut graph = graph_with(&["ne1"]);
        assert!(matches!(
            StatementEngine::create(&mut graph, "   ", &EntityId::new("ne1"), None),
            Err(GraphError::Validation(_))
        ));
        assert!(matches!(
            StatementEngine::create(&mut graph, "likes tea", &EntityId::new("ghost"), None),
            Err(GraphError::NotFound { .. })
        ));
        assert_eq!(graph.node_count(Some(NodeKind::Statement)).expect("count"), 0);
    }

    #[test]
    fn create_links_subject_only() {
        let mut graph = graph_with(&["ne1"]);
        let id = StatementEngine::create(&mut graph, "likes tea", &EntityId::new("ne1"), Some("s1".into()))
            .expect("create");

        let statement = StatementEngine::get(&graph, &id).expect("get");
        assert_eq!(statement.text, "likes tea");
        assert_eq!(statement.about_entity_id.as_str(), "ne1");
        assert!(statement.topic_id.is_none());
        assert_eq!(graph.edge_count().expect("count"), 1);
    }

    #[test]
    fn create_duplicate_id_conflicts() {
        let mut graph = graph_with(&["ne1"]);
        StatementEngine::create(&mut graph, "a", &EntityId::new("ne1"), Some("s1".into()))
            .expect("create");
        let result = graph.write(|txn| {
            StatementEngine::create(txn, "b", &EntityId::new("ne1"), Some("s1".into()))
        });
        assert!(matches!(result, Err(GraphError::Conflict { .. })));
        assert_eq!(graph.edge_count().expect("count"), 1);
    }

    #[test]
    fn update_text_keeps_edges() {
        let mut graph = graph_with(&["ne1", "ne2"]);
        let s1 = StatementEngine::create(&mut graph, "old", &EntityId::new("ne1"), None)
            .expect("create");
        StatementEngine::replace_mentions(&mut graph, &DefaultClassifier, &s1, &ids(&["ne2"]))
            .expect("mentions");
        let before = graph.edge_count().expect("count");

        let updated = StatementEngine::update_text(&mut graph, &s1, "new").expect("update");
        assert_eq!(updated.text, "new");
        assert_eq!(graph.edge_count().expect("count"), before);

        assert!(matches!(
            StatementEngine::update_text(&mut graph, &s1, ""),
            Err(GraphError::Validation(_))
        ));
    }

    #[test]
    fn set_topic_replaces_and_clears() {
        let mut graph = graph_with(&["ne1"]);
        let t1 = EntityRegistry::create_topic(&mut graph, "Food", Some("t1".into())).expect("topic");
        let t2 = EntityRegistry::create_topic(&mut graph, "Pets", Some("t2".into())).expect("topic");
        let s1 = StatementEngine::create(&mut graph, "text", &EntityId::new("ne1"), None)
            .expect("create");

        StatementEngine::set_topic(&mut graph, &s1, Some(&t1)).expect("set");
        let replaced = StatementEngine::set_topic(&mut graph, &s1, Some(&t2)).expect("set");
        assert_eq!(replaced.topic_id, Some(t2));

        let topic_edges = EdgePattern::any()
            .from_node(NodeRef::statement(&s1))
            .of_type(EdgeType::HasTopic);
        assert_eq!(graph.match_edges(&topic_edges).expect("match").len(), 1);

        let cleared = StatementEngine::set_topic(&mut graph, &s1, None).expect("clear");
        assert!(cleared.topic_id.is_none());
        assert!(graph.match_edges(&topic_edges).expect("match").is_empty());

        StatementEngine::set_topic(&mut graph, &s1, Some(&TopicId::new(""))).expect("blank clears");
    }

    #[test]
    fn set_unknown_topic_clears_previous() {
        let mut graph = graph_with(&["ne1"]);
        let t1 = EntityRegistry::create_topic(&mut graph, "Food", None).expect("topic");
        let s1 = StatementEngine::create(&mut graph, "text", &EntityId::new("ne1"), None)
            .expect("create");
        StatementEngine::set_topic(&mut graph, &s1, Some(&t1)).expect("set");

        let updated = graph
            .write(|txn| StatementEngine::set_topic(txn, &s1, Some(&TopicId::new("missing"))))
            .expect("unknown topic is not an error");
        assert!(updated.topic_id.is_none());

        let statement = StatementEngine::get(&graph, &s1).expect("get");
        assert!(statement.topic_id.is_none());
        let topic_edges = EdgePattern::any()
            .from_node(NodeRef::statement(&s1))
            .of_type(EdgeType::HasTopic);
        assert!(graph.match_edges(&topic_edges).expect("match").is_empty());
    }

    #[test]
    fn replace_mentions_skips_unknown_and_duplicates() {
        let mut graph = graph_with(&["ne1", "ne2"]);
        let s1 = StatementEngine::create(&mut graph, "text", &EntityId::new("ne1"), None)
            .expect("create");

        StatementEngine::replace_mentions(
            &mut graph,
            &DefaultClassifier,
            &s1,
            &ids(&["ne2", "ghost", "ne2"]),
        )
        .expect("mentions");

        let mentioned = StatementEngine::mentioned_entities(&graph, &s1).expect("mentions");
        assert_eq!(mentioned.len(), 1);
        assert_eq!(mentioned[0].id.as_str(), "ne2");
    }

    #[test]
    fn replace_mentions_is_not_a_merge() {
        let mut graph = graph_with(&["ne1", "ne2", "ne3"]);
        let s1 = StatementEngine::create(&mut graph, "text", &EntityId::new("ne1"), None)
            .expect("create");

        StatementEngine::replace_mentions(&mut graph, &DefaultClassifier, &s1, &ids(&["ne2"]))
            .expect("first");
        StatementEngine::replace_mentions(&mut graph, &DefaultClassifier, &s1, &ids(&["ne3"]))
            .expect("second");

        let mentioned: Vec<_> = StatementEngine::mentioned_entities(&graph, &s1)
            .expect("mentions")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(mentioned, ids(&["ne3"]));
        assert_eq!(
            StatementEngine::list_mentioning(&graph, &EntityId::new("ne2")).expect("list"),
            Vec::<StatementId>::new()
        );
    }

    #[test]
    fn replace_mentions_on_missing_statement() {
        let mut graph = graph_with(&["ne1"]);
        let result = StatementEngine::replace_mentions(
            &mut graph,
            &DefaultClassifier,
            &StatementId::new("ghost"),
            &ids(&["ne1"]),
        );
        assert!(matches!(result, Err(GraphError::NotFound { .. })));
    }

    #[test]
    fn delete_removes_node_and_edges() {
        let mut graph = graph_with(&["ne1", "ne2"]);
        let t1 = EntityRegistry::create_topic(&mut graph, "Food", None).expect("topic");
        let s1 = StatementEngine::create(&mut graph, "text", &EntityId::new("ne1"), None)
            .expect("create");
        StatementEngine::set_topic(&mut graph, &s1, Some(&t1)).expect("topic");
        StatementEngine::replace_mentions(&mut graph, &DefaultClassifier, &s1, &ids(&["ne2"]))
            .expect("mentions");

        StatementEngine::delete(&mut graph, &s1).expect("delete");
        assert_eq!(graph.edge_count().expect("count"), 0);
        assert!(!StatementEngine::exists(&graph, &s1).expect("exists"));
        assert!(matches!(
            StatementEngine::delete(&mut graph, &s1),
            Err(GraphError::NotFound { .. })
        ));
    }

    #[test]
    fn list_about_orders_by_id() {
        let mut graph = graph_with(&["ne1", "ne2"]);
        for sid in ["s2", "s1"] {
            StatementEngine::create(&mut graph, "text", &EntityId::new("ne1"), Some(sid.into()))
                .expect("create");
        }
        StatementEngine::create(&mut graph, "other", &EntityId::new("ne2"), Some("s3".into()))
            .expect("create");

        let about: Vec<_> = StatementEngine::list_about(&graph, &EntityId::new("ne1"))
            .expect("list")
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(about, vec![StatementId::new("s1"), StatementId::new("s2")]);
        assert!(matches!(
            StatementEngine::list_about(&graph, &EntityId::new("ghost")),
            Err(GraphError::NotFound { .. })
        ));
    }
}
