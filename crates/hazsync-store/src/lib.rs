//! # hazsync-store
//!
//! SQLite persistence layer for the hazsync collaboration engine.
//!
//! Layout mirrors the storage responsibilities:
//!
//! - [`sqlite::connection`] — r2d2 pool with WAL / foreign-key pragmas
//! - [`sqlite::migrations`] — embedded, versioned schema migrations
//! - [`sqlite::repositories`] — stateless per-table repositories
//! - [`store`] — the transactional [`store::CollabStore`] facade used by
//!   the engine; composes repository calls into atomic commits
//!
//! All write paths run inside a single transaction; callers never observe
//! partial state. Entry mutations use an atomic conditional update on the
//! `version` column for optimistic concurrency.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use sqlite::repositories::entry::{CreateEntryOptions, EntryPatch};
pub use sqlite::row_types::{
    AnalysisRow, EntryRow, NodeRow, ParticipantRow, RiskAggregate, SessionRow, UserRow,
};
pub use store::{CollabStore, JoinResult, LeaveResult};
