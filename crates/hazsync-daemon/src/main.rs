//! # hazsyncd
//!
//! The hazsync collaboration daemon — wires together storage, the session
//! engine, the idle-eviction sweep, and the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use hazsync_engine::CollabEngine;
use hazsync_engine::collaborators::Collaborators;
use hazsync_engine::sweep::{SweepConfig, run_idle_sweep};
use hazsync_server::{HazsyncServer, ServerConfig};
use hazsync_settings::{HazsyncSettings, load_settings, load_settings_from_path};
use hazsync_store::{AnalysisRow, CollabStore, ConnectionConfig, NodeRow, UserRow};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// hazsync collaboration daemon.
#[derive(Parser, Debug)]
#[command(name = "hazsyncd", about = "Collaborative hazard-analysis session server", version)]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 auto-assigns).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (`:memory:` for ephemeral).
    #[arg(long)]
    db: Option<String>,

    /// Explicit settings file path (default: `~/.hazsync/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Tracing filter (overrides `RUST_LOG`).
    #[arg(long)]
    log: Option<String>,

    /// Seed the directory tables from a JSON fixture file at startup.
    #[arg(long)]
    seed: Option<PathBuf>,
}

/// Directory fixture file: users, analyses, nodes, and project members.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedFile {
    #[serde(default)]
    users: Vec<UserRow>,
    #[serde(default)]
    analyses: Vec<AnalysisRow>,
    #[serde(default)]
    nodes: Vec<NodeRow>,
    #[serde(default)]
    members: Vec<SeedMember>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedMember {
    project_id: String,
    user_id: String,
    #[serde(default = "default_role")]
    role: String,
}

fn default_role() -> String {
    "member".to_string()
}

fn resolve_settings(cli: &Cli) -> Result<HazsyncSettings> {
    let mut settings = match cli.settings {
        Some(ref path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    if let Some(ref host) = cli.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(ref db) = cli.db {
        settings.storage.db_path = db.clone();
    }
    Ok(settings)
}

fn open_store(settings: &HazsyncSettings) -> Result<CollabStore> {
    let storage = &settings.storage;
    if storage.db_path == ":memory:" {
        return CollabStore::in_memory().context("failed to open in-memory store");
    }
    ensure_parent_dir(Path::new(&storage.db_path))?;
    CollabStore::open(
        &storage.db_path,
        &ConnectionConfig {
            pool_size: storage.pool_size,
            busy_timeout_ms: storage.busy_timeout_ms,
            ..Default::default()
        },
    )
    .with_context(|| format!("failed to open database at {}", storage.db_path))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Load a fixture file into the directory tables. Upserts, so reseeding
/// an existing database refreshes rather than duplicates.
fn seed_directory(store: &CollabStore, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed file {}", path.display()))?;

    for user in &seed.users {
        store.upsert_user(user)?;
    }
    for analysis in &seed.analyses {
        store.upsert_analysis(analysis)?;
    }
    for node in &seed.nodes {
        store.upsert_node(node)?;
    }
    for member in &seed.members {
        store.add_project_member(&member.project_id, &member.user_id, &member.role)?;
    }
    info!(
        users = seed.users.len(),
        analyses = seed.analyses.len(),
        nodes = seed.nodes.len(),
        members = seed.members.len(),
        "directory seeded"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = hazsync_core::logging::init_logging(cli.log.as_deref());

    let settings = resolve_settings(&cli)?;
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        db = %settings.storage.db_path,
        "starting hazsyncd"
    );

    let metrics_handle = match hazsync_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "metrics disabled");
            None
        }
    };

    let store = Arc::new(open_store(&settings)?);
    if let Some(ref seed_path) = cli.seed {
        seed_directory(&store, seed_path)?;
    }

    let engine = CollabEngine::new(
        Arc::clone(&store),
        Collaborators::store_backed(Arc::clone(&store)),
        settings.collaboration.on_empty_session,
    );

    let mut server = HazsyncServer::new(
        ServerConfig::from(&settings.server),
        &engine,
        Arc::clone(&store),
    );
    if let Some(handle) = metrics_handle {
        server = server.with_metrics(handle);
    }

    let sweep = tokio::spawn(run_idle_sweep(
        Arc::clone(&engine.presence),
        SweepConfig {
            idle_threshold: Duration::from_secs(settings.collaboration.idle_threshold_secs),
            interval: Duration::from_secs(settings.collaboration.sweep_interval_secs),
        },
        server.shutdown().token(),
    ));

    let shutdown = Arc::clone(server.shutdown());
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.shutdown();
        }
    });

    server.run().await.context("server failed")?;
    let _ = sweep.await;
    info!("hazsyncd stopped");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
