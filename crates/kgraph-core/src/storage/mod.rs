//! # Storage
//!
//! Persistent graph backends.

mod redb_graph;

pub use redb_graph::RedbGraph;
