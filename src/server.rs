// src/server.rs
//! Process bootstrap shared by the three binaries.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::Router;
use tracing_subscriber::EnvFilter;

use crate::config::ServerArgs;
use crate::db;
use crate::store::{MemoryStore, PgStore, RecordStore};

pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("poll_backend=info,tower_http=info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

pub async fn open_store(args: &ServerArgs) -> anyhow::Result<Arc<dyn RecordStore>> {
    let url = args.store_url.as_str();
    if url.starts_with("memory://") {
        tracing::warn!("Using in-memory store; documents are lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let pool = db::create_pool(url, args.db_max_connections)
            .await
            .context("Failed to connect to the document store")?;
        return Ok(Arc::new(PgStore::new(pool)));
    }
    bail!("unsupported store URL {url:?}; expected memory:// or postgres://")
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone()));

    tracing::info!(%addr, "Listening");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: axum_server::Handle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutting down");
        handle.graceful_shutdown(Some(Duration::from_secs(10)));
    }
}
