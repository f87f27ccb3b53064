//! High-level transactional store API.

mod collab_store;

pub use collab_store::{CollabStore, JoinResult, LeaveResult};
