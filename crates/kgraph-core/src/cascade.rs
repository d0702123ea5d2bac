//! # Cascade Coordinator
//!
//! Multi-step deletes. Deleting an entity:
//! 1. fully deletes every statement about it (retracting their relations),
//! 2. detaches it from statements that merely mention it,
//! 3. detach-deletes the entity node.
//!
//! Relations derived from a surviving statement that mentioned the entity
//! are not re-derived. Step 3 physically removes every such edge incident to
//! the entity; edges between the statement's remaining participants stay.

use crate::graph::GraphTxn;
use crate::statement::StatementEngine;
use crate::{EdgePattern, EdgeType, EntityId, GraphError, NodeRef};
use serde::{Deserialize, Serialize};

/// What a cascading entity delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Statements about the entity that were deleted.
    pub statements_deleted: usize,
    /// Mention edges from surviving statements that were removed.
    pub mentions_detached: usize,
}

pub struct CascadeCoordinator;

impl CascadeCoordinator {
    /// Delete an entity and everything that exists only because of it.
    ///
    /// Fails with `GraphError::NotFound` when the entity does not exist.
    pub fn delete_entity<T: GraphTxn + ?Sized>(
        txn: &mut T,
        id: &EntityId,
    ) -> Result<CascadeReport, GraphError> {
        let key = NodeRef::entity(id);
        if !txn.contains_node(&key)? {
            return Err(GraphError::not_found(&key));
        }

        let about = StatementEngine::list_about(&*txn, id)?;
        for statement in &about {
            StatementEngine::delete(txn, &statement.id)?;
        }

        let mentions_detached = txn.delete_edges(
            &EdgePattern::any()
                .to_node(key.clone())
                .of_type(EdgeType::Mentions),
        )?;

        if !txn.detach_delete_node(&key)? {
            return Err(GraphError::not_found(&key));
        }

        let report = CascadeReport {
            statements_deleted: about.len(),
            mentions_detached,
        };
        tracing::debug!(
            entity = %id,
            statements = report.statements_deleted,
            mentions = report.mentions_detached,
            "entity deleted"
        );
        Ok(report)
    }
}
