//! # Derived Relation Manager
//!
//! Keeps the relations a statement produces in sync with the statement.
//!
//! For a statement S the tagged edge set is always the symmetric closure over
//! `{S.about} ∪ S.mentions`: one edge per direction for every unordered pair
//! of distinct participants, each tagged with `S.id` and carrying the kind the
//! classifier assigns to `S.text`.
//!
//! Retraction goes by tag through the store's provenance index, never by
//! traversal from the current participants, because those may already have
//! changed by the time a statement is retracted.
//!
//! The manager does not deduplicate: deriving twice without an intervening
//! `retract` yields parallel duplicate edges. Every public path in this crate
//! retracts first.

use crate::classifier::RelationClassifier;
use crate::graph::{GraphRead, GraphTxn};
use crate::{
    DerivedRelation, EdgePattern, EntityId, GraphError, NewEdge, NodeRef, RelationshipKind,
    Statement, StatementId,
};

/// Derivation and retraction of statement-tagged relations.
pub struct DerivedRelationManager;

impl DerivedRelationManager {
    /// Participants of a statement: the subject first, then each mention
    /// once, in order.
    #[must_use]
    pub fn participants(about: &EntityId, mentions: &[EntityId]) -> Vec<EntityId> {
        let mut participants = vec![about.clone()];
        for entity in mentions {
            if !participants.contains(entity) {
                participants.push(entity.clone());
            }
        }
        participants
    }

    /// Unordered pairs `(a, b)` with `a` before `b` in participant order.
    #[must_use]
    pub fn pairs(participants: &[EntityId]) -> Vec<(EntityId, EntityId)> {
        let mut pairs = Vec::new();
        for (i, a) in participants.iter().enumerate() {
            for b in participants.iter().skip(i + 1) {
                pairs.push((a.clone(), b.clone()));
            }
        }
        pairs
    }

    /// Classify the statement's text and reject kinds that are not usable as
    /// an edge type.
    pub fn kind_for(classifier: &dyn RelationClassifier, text: &str) -> RelationshipKind {
        classifier.classify(text).sanitized()
    }

    /// Create both directed edges for every participant pair.
    ///
    /// Returns the relations created. A statement with no participants
    /// besides its subject yields nothing.
    pub fn derive_and_apply<T: GraphTxn + ?Sized>(
        txn: &mut T,
        classifier: &dyn RelationClassifier,
        statement: &Statement,
        mentions: &[EntityId],
    ) -> Result<Vec<DerivedRelation>, GraphError> {
        let participants = Self::participants(&statement.about_entity_id, mentions);
        let pairs = Self::pairs(&participants);
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let kind = Self::kind_for(classifier, &statement.text);
        let mut created = Vec::with_capacity(pairs.len() * 2);
        for (a, b) in pairs {
            for (from, to) in [(&a, &b), (&b, &a)] {
                let edge = NewEdge::derived(from, to, kind.clone(), &statement.id);
                if txn.create_edge(edge)?.is_some() {
                    created.push(DerivedRelation {
                        from: from.clone(),
                        to: to.clone(),
                        kind: kind.clone(),
                        source_statement_id: statement.id.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            statement = %statement.id,
            kind = %kind,
            edges = created.len(),
            "relations derived"
        );
        Ok(created)
    }

    /// Remove every edge tagged with `statement`, in any direction and of any
    /// kind. Returns the number removed; a second call removes nothing.
    pub fn retract<T: GraphTxn + ?Sized>(
        txn: &mut T,
        statement: &StatementId,
    ) -> Result<usize, GraphError> {
        let removed = txn.delete_edges(&EdgePattern::tagged(statement))?;
        if removed > 0 {
            tracing::debug!(statement = %statement, removed, "relations retracted");
        }
        Ok(removed)
    }

    /// Relations currently tagged with `statement`.
    pub fn tagged<R: GraphRead + ?Sized>(
        view: &R,
        statement: &StatementId,
    ) -> Result<Vec<DerivedRelation>, GraphError> {
        Ok(view
            .match_edges(&EdgePattern::tagged(statement))?
            .iter()
            .filter_map(DerivedRelation::from_edge)
            .collect())
    }

    /// Derived relations leaving `entity`, from any statement.
    pub fn relations_of<R: GraphRead + ?Sized>(
        view: &R,
        entity: &EntityId,
    ) -> Result<Vec<DerivedRelation>, GraphError> {
        Ok(view
            .match_edges(&EdgePattern::any().from_node(NodeRef::entity(entity)))?
            .iter()
            .filter_map(DerivedRelation::from_edge)
            .collect())
    }
}
