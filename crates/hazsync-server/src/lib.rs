//! # hazsync-server
//!
//! Axum HTTP + WebSocket surface for the hazsync collaboration engine.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Server bind and limit configuration |
//! | `health` | `/health` endpoint payload |
//! | `shutdown` | Graceful shutdown coordination |
//! | `rpc` | Request envelope, method registry, handlers |
//! | `websocket` | Connection registry, fan-out, heartbeat, session loop |
//! | `server` | Router assembly and the serve loop |
//!
//! ## Data Flow
//!
//! Client text frames → `websocket::handler` → `rpc::registry` dispatch →
//! engine. Engine commits emit events → `websocket::event_bridge` →
//! `websocket::registry` fan-out → bound connections, in per-session
//! commit order.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, HazsyncServer};
