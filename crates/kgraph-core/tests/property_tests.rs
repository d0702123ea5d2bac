//! # Property-Based Tests
//!
//! Consistency invariants checked with proptest over random entity sets,
//! label sets and mention lists.

use kgraph_core::{EntityId, GraphRead, GraphStore, RelationshipKind, Session, StatementId};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use std::collections::BTreeSet;

const POOL: usize = 8;

/// A session holding entities e0..e7 and one statement `s` about e0.
fn seeded_session() -> Session {
    let mut session = Session::new();
    for i in 0..POOL {
        session
            .create_entity(&format!("Entity {i}"), Some(EntityId::new(format!("e{i}"))), &[])
            .expect("entity");
    }
    session
        .create_statement("text", &EntityId::new("e0"), Some("s".into()))
        .expect("statement");
    session
}

fn label_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z0-9_]{0,11}".prop_filter("reserved", |l| l != "Statement" && l != "Topic")
}

/// Mention ids: mostly known entities, sometimes ids that do not resolve.
fn mention_strategy() -> impl Strategy<Value = Vec<EntityId>> {
    vec(0..POOL + 3, 0..10).prop_map(|picks| {
        picks
            .into_iter()
            .map(|i| EntityId::new(format!("e{i}")))
            .collect()
    })
}

fn expected_closure(mentions: &[EntityId]) -> BTreeSet<(String, String)> {
    let mut participants: BTreeSet<String> = BTreeSet::new();
    participants.insert("e0".to_string());
    for m in mentions {
        let index: usize = m.as_str()[1..].parse().expect("numeric suffix");
        if index < POOL {
            participants.insert(m.0.clone());
        }
    }
    let mut pairs = BTreeSet::new();
    for a in &participants {
        for b in &participants {
            if a != b {
                pairs.insert((a.clone(), b.clone()));
            }
        }
    }
    pairs
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// relabel(E, L) leaves exactly L plus the base tag, whatever came before.
    #[test]
    fn relabel_yields_exact_label_set(
        before in btree_set(label_strategy(), 0..6),
        after in btree_set(label_strategy(), 0..6),
    ) {
        let mut session = Session::new();
        let before: Vec<String> = before.into_iter().collect();
        let id = session.create_entity("E", None, &before).expect("entity");

        let after_list: Vec<String> = after.iter().cloned().collect();
        session.relabel_entity(&id, &after_list).expect("relabel");

        let mut expected = after;
        expected.insert("NamedEntity".to_string());
        prop_assert_eq!(session.get_entity(&id).expect("get").labels, expected);
    }

    /// After replace_mentions the tagged edges are the symmetric closure over
    /// the subject and the resolvable mentions.
    #[test]
    fn tagged_edges_are_symmetric_closure(rounds in vec(mention_strategy(), 1..4)) {
        let mut session = seeded_session();
        let s = StatementId::new("s");

        for mentions in &rounds {
            session.replace_mentions(&s, mentions).expect("replace");

            let tagged: Vec<(String, String)> = session
                .derived_relations(&s)
                .expect("relations")
                .into_iter()
                .map(|r| (r.from.0, r.to.0))
                .collect();
            let unique: BTreeSet<(String, String)> = tagged.iter().cloned().collect();

            prop_assert_eq!(tagged.len(), unique.len(), "no duplicate edges after re-derivation");
            prop_assert_eq!(unique, expected_closure(mentions));
        }
    }

    /// Every derived edge carries the kind of the default classifier.
    #[test]
    fn derived_kind_is_default(mentions in mention_strategy()) {
        let mut session = seeded_session();
        let created = session
            .replace_mentions(&StatementId::new("s"), &mentions)
            .expect("replace");
        prop_assert!(created.iter().all(|r| r.kind == RelationshipKind::default()));
    }

    /// Deleting the statement leaves no edge tagged with it, and a second
    /// retraction through a cleared mention list is a no-op.
    #[test]
    fn delete_leaves_no_tagged_edges(mentions in mention_strategy()) {
        let mut session = seeded_session();
        let s = StatementId::new("s");
        session.replace_mentions(&s, &mentions).expect("replace");
        session.replace_mentions(&s, &[]).expect("clear");
        prop_assert!(session.derived_relations(&s).expect("relations").is_empty());
        session.replace_mentions(&s, &[]).expect("clear again");

        session.replace_mentions(&s, &mentions).expect("replace");
        session.delete_statement(&s).expect("delete");

        let summary = session.describe().expect("describe");
        prop_assert_eq!(summary.derived_edges, 0);
        prop_assert_eq!(summary.edges, 0);
    }

    /// Identical operation sequences produce identical graphs.
    #[test]
    fn determinism_identical_input_produces_identical_output(mentions in mention_strategy()) {
        let mut first = seeded_session();
        let mut second = seeded_session();
        let s = StatementId::new("s");

        first.replace_mentions(&s, &mentions).expect("replace");
        second.replace_mentions(&s, &mentions).expect("replace");

        let a = first.store().read(|view| view.node_count(None)).expect("count");
        let b = second.store().read(|view| view.node_count(None)).expect("count");
        prop_assert_eq!(a, b);
        prop_assert_eq!(
            first.derived_relations(&s).expect("relations"),
            second.derived_relations(&s).expect("relations")
        );
    }
}
