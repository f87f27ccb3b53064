//! # hazsync-engine
//!
//! The collaborative hazard-analysis session engine.
//!
//! Components (dependency order, leaves first):
//!
//! - [`collaborators`] — contracts consumed from external systems (project
//!   access, analysis state, risk calculation, identity lookup), with
//!   store-backed implementations
//! - [`publisher`] — per-session ordered event emission
//! - [`aggregate`] — pure risk aggregate recomputation
//! - [`registry`] — session lifecycle (get-or-create, transitions)
//! - [`presence`] — participant join/leave/heartbeat and idle eviction
//! - [`coordinator`] — the optimistic-concurrency gatekeeper for all
//!   entry mutations
//! - [`sweep`] — periodic idle-eviction background task
//!
//! The engine holds no process-wide mutable state: every component is
//! constructed from an injected [`hazsync_store::CollabStore`] and
//! collaborator implementations, so multiple engine instances can coexist
//! (tests, multi-tenant embedding).

#![deny(unsafe_code)]

pub mod aggregate;
pub mod collaborators;
pub mod coordinator;
pub mod errors;
pub mod presence;
pub mod publisher;
pub mod registry;
pub mod sweep;

pub use errors::{EngineError, Result};

use std::sync::Arc;

use hazsync_settings::EmptySessionPolicy;
use hazsync_store::CollabStore;

use crate::aggregate::RiskAggregator;
use crate::collaborators::Collaborators;
use crate::coordinator::EntryCoordinator;
use crate::presence::PresenceTracker;
use crate::publisher::EventPublisher;
use crate::registry::SessionRegistry;

/// The assembled engine: one instance per store.
pub struct CollabEngine {
    /// Session lifecycle component.
    pub registry: Arc<SessionRegistry>,
    /// Participant presence component.
    pub presence: Arc<PresenceTracker>,
    /// Entry mutation component.
    pub coordinator: Arc<EntryCoordinator>,
    /// Derived risk aggregate component.
    pub aggregator: Arc<RiskAggregator>,
    /// Ordered event emission; subscribe here for fan-out.
    pub publisher: Arc<EventPublisher>,
}

impl CollabEngine {
    /// Assemble an engine over a store and collaborator set.
    pub fn new(
        store: Arc<CollabStore>,
        collaborators: Collaborators,
        on_empty_session: EmptySessionPolicy,
    ) -> Self {
        let publisher = Arc::new(EventPublisher::new(1024));
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&store),
            collaborators.clone(),
            Arc::clone(&publisher),
        ));
        let presence = Arc::new(PresenceTracker::new(
            Arc::clone(&store),
            collaborators.clone(),
            Arc::clone(&publisher),
            on_empty_session,
        ));
        let coordinator = Arc::new(EntryCoordinator::new(
            Arc::clone(&store),
            collaborators,
            Arc::clone(&publisher),
        ));
        let aggregator = Arc::new(RiskAggregator::new(store));
        Self {
            registry,
            presence,
            coordinator,
            aggregator,
            publisher,
        }
    }
}
