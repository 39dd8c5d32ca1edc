//! StateStore: redb-backed cluster state.
//!
//! Provides indexed writes and typed reads over nodes and allocations. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, Table};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::snapshot::Snapshot;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

const NODES_TABLE: &str = "nodes";
const ALLOCS_TABLE: &str = "allocs";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        txn.open_table(ALLOC_NODES).map_err(map_err!(Table))?;
        txn.open_table(INDEX).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Indexes ────────────────────────────────────────────────────

    /// Highest modify index written to any table.
    pub fn latest_index(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INDEX).map_err(map_err!(Table))?;
        let mut latest = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            latest = latest.max(value.value());
        }
        Ok(latest)
    }

    /// Last modify index of a single table (0 if never written).
    pub fn table_index(&self, table_name: &str) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INDEX).map_err(map_err!(Table))?;
        Ok(table
            .get(table_name)
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(0))
    }

    /// Record `index` as the table's latest, rejecting non-increasing indexes.
    fn bump_index(
        table: &mut Table<'_, &'static str, u64>,
        name: &'static str,
        index: u64,
    ) -> StateResult<()> {
        let current = table
            .get(name)
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(0);
        if index <= current {
            return Err(StateError::StaleIndex {
                table: name,
                index,
                current,
            });
        }
        table.insert(name, index).map_err(map_err!(Write))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node.
    pub fn upsert_node(&self, index: u64, node: &Node) -> StateResult<()> {
        let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut idx = txn.open_table(INDEX).map_err(map_err!(Table))?;
            Self::bump_index(&mut idx, NODES_TABLE, index)?;
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %node.id, index, "node stored");
        Ok(())
    }

    /// Get a node by ID.
    pub fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        table
            .get(node_id)
            .map_err(map_err!(Read))?
            .map(|guard| decode(guard.value()))
            .transpose()
    }

    /// List all nodes, ordered by ID.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: Node = decode(value.value())?;
            results.push(node);
        }
        Ok(results)
    }

    /// Delete a node by ID. Returns true if it existed.
    pub fn delete_node(&self, index: u64, node_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut idx = txn.open_table(INDEX).map_err(map_err!(Table))?;
            Self::bump_index(&mut idx, NODES_TABLE, index)?;
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = table.remove(node_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %node_id, index, existed, "node deleted");
        Ok(existed)
    }

    // ── Allocations ────────────────────────────────────────────────

    /// Insert or update a batch of allocations in one transaction.
    ///
    /// New allocations get `create_index = index`; every written allocation
    /// gets `modify_index = index`. An allocation written under a different
    /// node than before is moved: the old record is removed and its
    /// `create_index` carried over.
    pub fn upsert_allocs(&self, index: u64, allocs: &[Allocation]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut idx = txn.open_table(INDEX).map_err(map_err!(Table))?;
            Self::bump_index(&mut idx, ALLOCS_TABLE, index)?;
            let mut table = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
            let mut by_id = txn.open_table(ALLOC_NODES).map_err(map_err!(Table))?;
            for alloc in allocs {
                let key = alloc.table_key();
                let previous_node: Option<String> = by_id
                    .get(alloc.id.as_str())
                    .map_err(map_err!(Read))?
                    .map(|guard| guard.value().to_string());

                let existing: Option<Allocation> = match previous_node {
                    Some(from) if from != alloc.node_id => {
                        debug!(alloc = %alloc.id, %from, to = %alloc.node_id, "allocation moved");
                        table
                            .remove(alloc_key(&from, &alloc.id).as_str())
                            .map_err(map_err!(Write))?
                            .map(|guard| decode(guard.value()))
                            .transpose()?
                    }
                    _ => table
                        .get(key.as_str())
                        .map_err(map_err!(Read))?
                        .map(|guard| decode(guard.value()))
                        .transpose()?,
                };

                let mut stored = alloc.clone();
                stored.create_index = existing.map(|e| e.create_index).unwrap_or(index);
                stored.modify_index = index;

                let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                by_id
                    .insert(alloc.id.as_str(), alloc.node_id.as_str())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = allocs.len(), index, "allocations stored");
        Ok(())
    }

    /// Get one allocation by node and allocation ID.
    pub fn get_alloc(&self, node_id: &str, alloc_id: &str) -> StateResult<Option<Allocation>> {
        let key = alloc_key(node_id, alloc_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        table
            .get(key.as_str())
            .map_err(map_err!(Read))?
            .map(|guard| decode(guard.value()))
            .transpose()
    }

    /// List every allocation bound to a node, terminal ones included.
    pub fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        let prefix = format!("{node_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let alloc: Allocation = decode(value.value())?;
                // Node IDs may themselves contain ':'.
                if alloc.node_id == node_id {
                    results.push(alloc);
                }
            }
        }
        Ok(results)
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Materialize every node and allocation within one read transaction.
    pub fn snapshot(&self) -> StateResult<Snapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;

        let index_table = txn.open_table(INDEX).map_err(map_err!(Table))?;
        let mut index = 0;
        for entry in index_table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            index = index.max(value.value());
        }

        let mut builder = Snapshot::builder().index(index);

        let nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
        for entry in nodes.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: Node = decode(value.value())?;
            builder = builder.node(node);
        }

        let allocs = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        for entry in allocs.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let alloc: Allocation = decode(value.value())?;
            builder = builder.alloc(alloc);
        }

        let snapshot = builder.build();
        debug!(
            index,
            nodes = snapshot.nodes().len(),
            allocs = snapshot.alloc_count(),
            "state snapshot taken"
        );
        Ok(snapshot)
    }
}
