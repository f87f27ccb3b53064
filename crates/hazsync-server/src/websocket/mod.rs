//! WebSocket connection management, heartbeat, message dispatch, and
//! event fan-out.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-client handle: bound session, watched analyses, send channel |
//! | `registry` | Fan-out: register/unregister, per-session and per-analysis filtering |
//! | `handler` | RPC parsing and dispatch for incoming text frames |
//! | `event_bridge` | Engine events → registry fan-out (order-preserving) |
//! | `heartbeat` | Periodic ping/pong liveness detection |
//! | `session` | Per-client lifecycle from upgrade through disconnect |

pub mod connection;
pub mod event_bridge;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod session;
