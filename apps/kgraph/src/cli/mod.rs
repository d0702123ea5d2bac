//! # kgraph CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `status` - Show graph counts
//! - `seed` - Load a small demo graph
//! - `entity ...` - Create, inspect, relabel and delete named entities
//! - `statement ...` - Create statements and manage their mentions and topic
//! - `topic ...` - Manage topics

mod commands;

use crate::config::{Backend, Config};
use crate::error::AppError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// kgraph - knowledge graph consistency engine
///
/// Statements about named entities, with symmetric relations derived from
/// each statement's mentions.
#[derive(Parser, Debug)]
#[command(name = "kgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML config file (default: ./kgraph.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply `--database` / `--backend` on top of file and environment settings.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(path) = &self.database {
            config.store.path = path.clone();
        }
        if let Some(backend) = self.backend {
            config.store.backend = backend;
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show graph status
    Status,

    /// Load the demo graph (Bob, Caroline, Anna and three statements)
    Seed,

    /// Named entity operations
    Entity {
        #[command(subcommand)]
        command: EntityCommand,
    },

    /// Statement operations
    Statement {
        #[command(subcommand)]
        command: StatementCommand,
    },

    /// Topic operations
    Topic {
        #[command(subcommand)]
        command: TopicCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum EntityCommand {
    /// Create a named entity
    Create {
        name: String,

        /// Identifier (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Additional type label, repeatable
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },

    /// Show an entity
    Get { id: String },

    /// Find entities by exact name
    Find {
        name: String,

        /// Fail unless exactly one entity matches
        #[arg(long)]
        one: bool,
    },

    /// Replace the additional labels of an entity
    Relabel {
        id: String,

        /// New label, repeatable; none clears all additional labels
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },

    /// Delete an entity with its statements and derived relations
    Delete { id: String },

    /// List statements about an entity
    Statements { id: String },

    /// List ids of statements mentioning an entity
    MentionedIn { id: String },

    /// List derived relations touching an entity
    Relations { id: String },
}

#[derive(Subcommand, Debug)]
pub enum StatementCommand {
    /// Create a statement about an entity
    Create {
        /// Subject entity id
        about: String,

        text: String,

        /// Identifier (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Mentioned entity id, repeatable
        #[arg(short, long = "mention")]
        mentions: Vec<String>,
    },

    /// Show a statement
    Get { id: String },

    /// Replace the text of a statement
    UpdateText { id: String, text: String },

    /// Assign a topic; omit the topic to clear it
    SetTopic { id: String, topic: Option<String> },

    /// List entities a statement mentions
    Mentions { id: String },

    /// Replace the mention list and re-derive relations
    ReplaceMentions { id: String, mentions: Vec<String> },

    /// Delete a statement and the relations it produced
    Delete { id: String },

    /// List relations a statement produced
    Relations { id: String },
}

#[derive(Subcommand, Debug)]
pub enum TopicCommand {
    /// Create a topic
    Create {
        name: String,

        #[arg(long)]
        id: Option<String>,
    },

    /// Show a topic
    Get { id: String },

    /// List all topics
    List,

    /// Rename a topic
    Rename { id: String, name: String },

    /// Delete a topic, detaching its statements
    Delete { id: String },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments against the resolved configuration.
pub fn execute(cli: Cli, config: &Config) -> Result<(), AppError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(config, force),
        Some(Commands::Status) | None => cmd_status(config, json_mode),
        Some(Commands::Seed) => cmd_seed(config, json_mode),
        Some(Commands::Entity { command }) => execute_entity(config, json_mode, command),
        Some(Commands::Statement { command }) => execute_statement(config, json_mode, command),
        Some(Commands::Topic { command }) => execute_topic(config, json_mode, command),
    }
}

fn execute_entity(config: &Config, json_mode: bool, command: EntityCommand) -> Result<(), AppError> {
    let mut session = open_session(config)?;
    match command {
        EntityCommand::Create { name, id, labels } => {
            cmd_entity_create(&mut session, json_mode, &name, id, &labels)
        }
        EntityCommand::Get { id } => cmd_entity_get(&session, json_mode, &id),
        EntityCommand::Find { name, one } => cmd_entity_find(&session, json_mode, &name, one),
        EntityCommand::Relabel { id, labels } => {
            cmd_entity_relabel(&mut session, json_mode, &id, &labels)
        }
        EntityCommand::Delete { id } => cmd_entity_delete(&mut session, json_mode, &id),
        EntityCommand::Statements { id } => cmd_entity_statements(&session, json_mode, &id),
        EntityCommand::MentionedIn { id } => cmd_entity_mentioned_in(&session, json_mode, &id),
        EntityCommand::Relations { id } => cmd_entity_relations(&session, json_mode, &id),
    }
}

fn execute_statement(
    config: &Config,
    json_mode: bool,
    command: StatementCommand,
) -> Result<(), AppError> {
    let mut session = open_session(config)?;
    match command {
        StatementCommand::Create {
            about,
            text,
            id,
            mentions,
        } => cmd_statement_create(&mut session, json_mode, &about, &text, id, &mentions),
        StatementCommand::Get { id } => cmd_statement_get(&session, json_mode, &id),
        StatementCommand::UpdateText { id, text } => {
            cmd_statement_update_text(&mut session, json_mode, &id, &text)
        }
        StatementCommand::SetTopic { id, topic } => {
            cmd_statement_set_topic(&mut session, json_mode, &id, topic.as_deref())
        }
        StatementCommand::Mentions { id } => cmd_statement_mentions(&session, json_mode, &id),
        StatementCommand::ReplaceMentions { id, mentions } => {
            cmd_statement_replace_mentions(&mut session, json_mode, &id, &mentions)
        }
        StatementCommand::Delete { id } => cmd_statement_delete(&mut session, json_mode, &id),
        StatementCommand::Relations { id } => cmd_statement_relations(&session, json_mode, &id),
    }
}

fn execute_topic(config: &Config, json_mode: bool, command: TopicCommand) -> Result<(), AppError> {
    let mut session = open_session(config)?;
    match command {
        TopicCommand::Create { name, id } => cmd_topic_create(&mut session, json_mode, &name, id),
        TopicCommand::Get { id } => cmd_topic_get(&session, json_mode, &id),
        TopicCommand::List => cmd_topic_list(&session, json_mode),
        TopicCommand::Rename { id, name } => cmd_topic_rename(&mut session, json_mode, &id, &name),
        TopicCommand::Delete { id } => cmd_topic_delete(&mut session, json_mode, &id),
    }
}
