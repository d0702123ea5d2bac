//! # CLI Command Implementations
//!
//! Every command opens its own session, runs one operation and prints the
//! result as plain text or, with `--json-mode`, as pretty-printed JSON.

use crate::config::{Backend, Config};
use crate::error::AppError;
use kgraph_core::{
    DerivedRelation, EntityId, EntityRegistry, GraphError, GraphStore, KeywordClassifier,
    NamedEntity, Session, Statement, StatementEngine, StatementId, Topic, TopicId,
};
use serde::Serialize;

// =============================================================================
// SESSION SETUP
// =============================================================================

/// Open a session for the configured backend with the configured classifier.
///
/// redb opens go through the bootstrap retry policy; the in-memory graph
/// starts empty on every invocation.
pub fn open_session(config: &Config) -> Result<Session, AppError> {
    let session = match config.store.backend {
        Backend::Redb => Session::open_redb(&config.store.path, config.bootstrap)?,
        Backend::Memory => {
            let mut session = Session::new();
            session.ensure_schema(config.bootstrap)?;
            session
        }
    };
    Ok(session.with_classifier(config.classifier.clone()))
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_entity(entity: &NamedEntity) {
    let labels: Vec<&str> = entity.additional_labels().collect();
    if labels.is_empty() {
        println!("{}  {}", entity.id, entity.name);
    } else {
        println!("{}  {}  [{}]", entity.id, entity.name, labels.join(", "));
    }
}

fn print_statement(statement: &Statement) {
    match &statement.topic_id {
        Some(topic) => println!(
            "{}  about {}  topic {}  \"{}\"",
            statement.id, statement.about_entity_id, topic, statement.text
        ),
        None => println!(
            "{}  about {}  \"{}\"",
            statement.id, statement.about_entity_id, statement.text
        ),
    }
}

fn print_relations(relations: &[DerivedRelation]) {
    if relations.is_empty() {
        println!("No derived relations.");
        return;
    }
    for relation in relations {
        println!(
            "{} -[{}]-> {}  (from {})",
            relation.from, relation.kind, relation.to, relation.source_statement_id
        );
    }
}

fn entity_ids(raw: &[String]) -> Vec<EntityId> {
    raw.iter().map(|id| EntityId::new(id.as_str())).collect()
}

// =============================================================================
// INIT / STATUS
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(config: &Config, force: bool) -> Result<(), AppError> {
    let path = &config.store.path;

    if config.store.backend == Backend::Redb && path.exists() {
        if !force {
            return Err(AppError::Usage(format!(
                "Database already exists at {:?}. Use --force to overwrite.",
                path
            )));
        }
        std::fs::remove_file(path)?;
        tracing::info!(path = %path.display(), "removed existing database");
    }

    let session = open_session(config)?;

    match config.store.backend {
        Backend::Redb => println!("Initialized new redb database at {:?}", path),
        Backend::Memory => println!("Initialized in-memory graph (discarded on exit)"),
    }
    tracing::debug!(persistent = session.is_persistent(), "schema ready");
    Ok(())
}

/// Show graph status.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), AppError> {
    let session = open_session(config)?;
    let summary = session.describe()?;

    if json_mode {
        print_json(&serde_json::json!({
            "backend": config.store.backend.to_string(),
            "database": config.store.path.display().to_string(),
            "summary": summary,
        }))?;
    } else {
        println!("kgraph status");
        println!("  Backend:        {}", config.store.backend);
        if config.store.backend == Backend::Redb {
            println!("  Database:       {:?}", config.store.path);
        }
        println!("  Nodes:          {}", summary.nodes);
        println!("    Entities:     {}", summary.entities);
        println!("    Statements:   {}", summary.statements);
        println!("    Topics:       {}", summary.topics);
        println!("  Edges:          {}", summary.edges);
        println!("    Derived:      {}", summary.derived_edges);
    }
    Ok(())
}

// =============================================================================
// SEED
// =============================================================================

/// Classifier used by `seed`: the configured rules plus `married -> MARRIED_TO`.
#[must_use]
pub fn demo_classifier(config: &Config) -> KeywordClassifier {
    config
        .classifier
        .clone()
        .with_rule("married", "MARRIED_TO")
}

/// Load the demo graph: three people and three statements, one of which
/// mentions a second person. All or nothing: a conflict on any fixture id
/// leaves the store untouched.
pub fn seed_demo<S: GraphStore>(
    session: &mut Session<S>,
) -> Result<Vec<DerivedRelation>, GraphError> {
    session.transaction(|txn, classifier| {
        let person = ["Person".to_string()];
        let bob = EntityRegistry::create(txn, "Bob", Some(EntityId::new("ne1")), &person)?;
        let caroline =
            EntityRegistry::create(txn, "Caroline", Some(EntityId::new("ne2")), &person)?;
        let anna = EntityRegistry::create(txn, "Anna", Some(EntityId::new("ne3")), &person)?;

        StatementEngine::create(txn, "Lieblingseis: Zitrone", &bob, Some(StatementId::new("s1")))?;
        StatementEngine::create(txn, "has a dog", &caroline, Some(StatementId::new("s2")))?;
        let s3 = StatementEngine::create(
            txn,
            "Married @Anna in Venice on 26.05.2023",
            &bob,
            Some(StatementId::new("s3")),
        )?;
        StatementEngine::replace_mentions(txn, classifier, &s3, &[anna])
    })
}

/// Seed the configured store with the demo graph.
pub fn cmd_seed(config: &Config, json_mode: bool) -> Result<(), AppError> {
    let mut session = open_session(config)?.with_classifier(demo_classifier(config));
    let relations = seed_demo(&mut session)?;
    let summary = session.describe()?;

    if json_mode {
        print_json(&serde_json::json!({
            "relations": relations,
            "summary": summary,
        }))?;
    } else {
        println!(
            "Seeded {} entities and {} statements.",
            summary.entities, summary.statements
        );
        print_relations(&relations);
    }
    Ok(())
}

// =============================================================================
// ENTITY COMMANDS
// =============================================================================

pub fn cmd_entity_create(
    session: &mut Session,
    json_mode: bool,
    name: &str,
    id: Option<String>,
    labels: &[String],
) -> Result<(), AppError> {
    let id = session.create_entity(name, id.map(EntityId::new), labels)?;
    if json_mode {
        print_json(&session.get_entity(&id)?)?;
    } else {
        println!("Created entity {}", id);
    }
    Ok(())
}

pub fn cmd_entity_get(session: &Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    let entity = session.get_entity(&EntityId::new(id))?;
    if json_mode {
        print_json(&entity)?;
    } else {
        print_entity(&entity);
    }
    Ok(())
}

pub fn cmd_entity_find(
    session: &Session,
    json_mode: bool,
    name: &str,
    one: bool,
) -> Result<(), AppError> {
    let entities = if one {
        vec![session.find_entity_by_name(name)?]
    } else {
        session.find_entities_by_name(name)?
    };

    if json_mode {
        print_json(&entities)?;
    } else if entities.is_empty() {
        println!("No entity named {:?}.", name);
    } else {
        entities.iter().for_each(print_entity);
    }
    Ok(())
}

pub fn cmd_entity_relabel(
    session: &mut Session,
    json_mode: bool,
    id: &str,
    labels: &[String],
) -> Result<(), AppError> {
    let entity = session.relabel_entity(&EntityId::new(id), labels)?;
    if json_mode {
        print_json(&entity)?;
    } else {
        print_entity(&entity);
    }
    Ok(())
}

pub fn cmd_entity_delete(session: &mut Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    let report = session.delete_entity(&EntityId::new(id))?;
    if json_mode {
        print_json(&report)?;
    } else {
        println!(
            "Deleted entity {} ({} statements removed, {} mentions detached)",
            id, report.statements_deleted, report.mentions_detached
        );
    }
    Ok(())
}

pub fn cmd_entity_statements(session: &Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    let statements = session.statements_about(&EntityId::new(id))?;
    if json_mode {
        print_json(&statements)?;
    } else if statements.is_empty() {
        println!("No statements about {}.", id);
    } else {
        statements.iter().for_each(print_statement);
    }
    Ok(())
}

pub fn cmd_entity_mentioned_in(
    session: &Session,
    json_mode: bool,
    id: &str,
) -> Result<(), AppError> {
    let statements = session.statements_mentioning(&EntityId::new(id))?;
    if json_mode {
        print_json(&statements)?;
    } else if statements.is_empty() {
        println!("No statement mentions {}.", id);
    } else {
        statements.iter().for_each(|s| println!("{}", s));
    }
    Ok(())
}

pub fn cmd_entity_relations(session: &Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    let relations = session.relations_of(&EntityId::new(id))?;
    if json_mode {
        print_json(&relations)?;
    } else {
        print_relations(&relations);
    }
    Ok(())
}

// =============================================================================
// STATEMENT COMMANDS
// =============================================================================

pub fn cmd_statement_create(
    session: &mut Session,
    json_mode: bool,
    about: &str,
    text: &str,
    id: Option<String>,
    mentions: &[String],
) -> Result<(), AppError> {
    let (id, relations) = session.create_statement_with_mentions(
        text,
        &EntityId::new(about),
        id.map(StatementId::new),
        &entity_ids(mentions),
    )?;

    if json_mode {
        print_json(&serde_json::json!({
            "statement": session.get_statement(&id)?,
            "relations": relations,
        }))?;
    } else {
        println!("Created statement {}", id);
        if !relations.is_empty() {
            print_relations(&relations);
        }
    }
    Ok(())
}

pub fn cmd_statement_get(session: &Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    let statement = session.get_statement(&StatementId::new(id))?;
    if json_mode {
        print_json(&statement)?;
    } else {
        print_statement(&statement);
    }
    Ok(())
}

pub fn cmd_statement_update_text(
    session: &mut Session,
    json_mode: bool,
    id: &str,
    text: &str,
) -> Result<(), AppError> {
    let statement = session.update_statement_text(&StatementId::new(id), text)?;
    if json_mode {
        print_json(&statement)?;
    } else {
        print_statement(&statement);
    }
    Ok(())
}

pub fn cmd_statement_set_topic(
    session: &mut Session,
    json_mode: bool,
    id: &str,
    topic: Option<&str>,
) -> Result<(), AppError> {
    let topic = topic.map(TopicId::new);
    let statement = session.set_statement_topic(&StatementId::new(id), topic.as_ref())?;
    if json_mode {
        print_json(&statement)?;
    } else {
        print_statement(&statement);
    }
    Ok(())
}

pub fn cmd_statement_mentions(session: &Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    let entities = session.statement_mentions(&StatementId::new(id))?;
    if json_mode {
        print_json(&entities)?;
    } else if entities.is_empty() {
        println!("Statement {} mentions nobody.", id);
    } else {
        entities.iter().for_each(print_entity);
    }
    Ok(())
}

pub fn cmd_statement_replace_mentions(
    session: &mut Session,
    json_mode: bool,
    id: &str,
    mentions: &[String],
) -> Result<(), AppError> {
    let relations = session.replace_mentions(&StatementId::new(id), &entity_ids(mentions))?;
    if json_mode {
        print_json(&relations)?;
    } else {
        print_relations(&relations);
    }
    Ok(())
}

pub fn cmd_statement_delete(
    session: &mut Session,
    json_mode: bool,
    id: &str,
) -> Result<(), AppError> {
    session.delete_statement(&StatementId::new(id))?;
    if json_mode {
        print_json(&serde_json::json!({ "deleted": id }))?;
    } else {
        println!("Deleted statement {}", id);
    }
    Ok(())
}

pub fn cmd_statement_relations(
    session: &Session,
    json_mode: bool,
    id: &str,
) -> Result<(), AppError> {
    let relations = session.derived_relations(&StatementId::new(id))?;
    if json_mode {
        print_json(&relations)?;
    } else {
        print_relations(&relations);
    }
    Ok(())
}

// =============================================================================
// TOPIC COMMANDS
// =============================================================================

fn print_topic(topic: &Topic) {
    println!("{}  {}", topic.id, topic.name);
}

pub fn cmd_topic_create(
    session: &mut Session,
    json_mode: bool,
    name: &str,
    id: Option<String>,
) -> Result<(), AppError> {
    let id = session.create_topic(name, id.map(TopicId::new))?;
    if json_mode {
        print_json(&session.get_topic(&id)?)?;
    } else {
        println!("Created topic {}", id);
    }
    Ok(())
}

pub fn cmd_topic_get(session: &Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    let topic = session.get_topic(&TopicId::new(id))?;
    if json_mode {
        print_json(&topic)?;
    } else {
        print_topic(&topic);
    }
    Ok(())
}

pub fn cmd_topic_list(session: &Session, json_mode: bool) -> Result<(), AppError> {
    let topics = session.list_topics()?;
    if json_mode {
        print_json(&topics)?;
    } else if topics.is_empty() {
        println!("No topics.");
    } else {
        topics.iter().for_each(print_topic);
    }
    Ok(())
}

pub fn cmd_topic_rename(
    session: &mut Session,
    json_mode: bool,
    id: &str,
    name: &str,
) -> Result<(), AppError> {
    let topic = session.rename_topic(&TopicId::new(id), name)?;
    if json_mode {
        print_json(&topic)?;
    } else {
        print_topic(&topic);
    }
    Ok(())
}

pub fn cmd_topic_delete(session: &mut Session, json_mode: bool, id: &str) -> Result<(), AppError> {
    session.delete_topic(&TopicId::new(id))?;
    if json_mode {
        print_json(&serde_json::json!({ "deleted": id }))?;
    } else {
        println!("Deleted topic {}", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn print_json_reports_unserializable_values() {
        let mut keyed_by_pair: BTreeMap<(u8, u8), u8> = BTreeMap::new();
        keyed_by_pair.insert((1, 2), 3);

        let result = print_json(&keyed_by_pair);
        assert!(matches!(result, Err(AppError::Json(_))));
    }

    #[test]
    fn print_json_accepts_domain_values() {
        let summary = kgraph_core::GraphSummary::default();
        print_json(&summary).expect("summary serializes");
    }
}
