//! # hazsync-core
//!
//! Foundation types for the hazsync collaborative hazard-analysis engine.
//!
//! This crate provides the shared vocabulary the other hazsync crates
//! depend on:
//!
//! - **Session status**: [`status::SessionStatus`] and its legal-transition map
//! - **Risk model**: [`risk::Severity`], [`risk::Likelihood`], [`risk::RiskRank`]
//!   and the ranking matrix
//! - **Mutation events**: [`events::EntryEvent`] pushed to live connections
//! - **Logging**: [`logging::init_logging`] tracing-subscriber setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other hazsync crates.

#![deny(unsafe_code)]

pub mod events;
pub mod logging;
pub mod risk;
pub mod status;
