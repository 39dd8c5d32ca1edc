//! redb table definitions for the Berth state store.

use redb::TableDefinition;

/// Nodes keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Allocations keyed by `{node_id}:{alloc_id}`.
pub const ALLOCS: TableDefinition<&str, &[u8]> = TableDefinition::new("allocs");

/// Node currently holding each allocation, keyed by `{alloc_id}`.
pub const ALLOC_NODES: TableDefinition<&str, &str> = TableDefinition::new("alloc_nodes");

/// Last modify index per table, keyed by table name.
pub const INDEX: TableDefinition<&str, u64> = TableDefinition::new("index");
