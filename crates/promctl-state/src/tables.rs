//! redb table definitions for the promctl state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized types).
//! Every table holds a single well-known key.

use redb::TableDefinition;

/// Peer registry under [`REGISTRY_KEY`].
pub const REGISTRY: TableDefinition<&str, &[u8]> = TableDefinition::new("registry");

/// Last applied configuration under [`APPLIED_KEY`].
pub const APPLIED: TableDefinition<&str, &[u8]> = TableDefinition::new("applied");

/// Boolean flags, currently only [`READY_KEY`].
pub const FLAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("flags");

pub const REGISTRY_KEY: &str = "peers";
pub const APPLIED_KEY: &str = "current";
pub const READY_KEY: &str = "ready";
