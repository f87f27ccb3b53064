//! Settings type definitions.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HazsyncSettings {
    /// HTTP / WebSocket server settings.
    pub server: ServerSettings,
    /// SQLite storage settings.
    pub storage: StorageSettings,
    /// Collaboration engine policy settings.
    pub collaboration: CollaborationSettings,
}

/// Server bind and connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `7410`; `0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (disconnect after this much silence).
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7410,
            max_connections: 100,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
        }
    }
}

/// SQLite storage settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSettings {
    /// Database file path. `":memory:"` selects an in-memory database.
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "hazsync.db".into(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
        }
    }
}

/// What to do with a session when its last active participant leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptySessionPolicy {
    /// Leave the session active (default).
    #[default]
    Keep,
    /// Pause the session; a later join requires an explicit resume.
    Pause,
    /// End the session.
    End,
}

/// Collaboration engine policy settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollaborationSettings {
    /// Seconds of heartbeat silence before the sweep marks a participant
    /// inactive.
    pub idle_threshold_secs: u64,
    /// Cadence of the idle-eviction sweep.
    pub sweep_interval_secs: u64,
    /// Policy applied when a leave empties the session roster.
    pub on_empty_session: EmptySessionPolicy,
}

impl Default for CollaborationSettings {
    fn default() -> Self {
        Self {
            idle_threshold_secs: 300,
            sweep_interval_secs: 60,
            on_empty_session: EmptySessionPolicy::Keep,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
