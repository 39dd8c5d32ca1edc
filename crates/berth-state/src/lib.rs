//! berth-state: durable cluster state for Berth.
//!
//! Backed by [redb](https://docs.rs/redb), stores the nodes of a cluster and
//! the allocations bound to them. Every write carries a modify index that
//! must increase monotonically; [`StateStore::snapshot`] materializes the
//! whole state at one index into an immutable [`Snapshot`] that ranking
//! pipelines read without touching the database.
//!
//! # Architecture
//!
//! Domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Allocations are keyed `{node_id}:{alloc_id}` so the allocations of one
//! node are a prefix scan.

pub mod error;
pub mod snapshot;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use snapshot::{Snapshot, SnapshotBuilder};
pub use store::StateStore;
pub use types::*;
