//! Polilingo · Learning-content Admin Backend
//!
//! - Axum HTTP API over the hosted relational backend (PostgREST surface)
//! - In-memory backend with demo data for local runs
//! - Static SPA fallback for the dashboard bundle (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   SUPABASE_URL      : project URL of the hosted backend
//!   SUPABASE_ANON_KEY : public API key; callers' bearer tokens are forwarded
//!   ADMIN_BACKEND     : "postgrest" (default) or "memory"
//!   ADMIN_SEED_PATH   : JSON dataset for the memory backend
//!   ADMIN_CONFIG_PATH : path to TOML config ([backend], [server], [dashboard])
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod backend;
mod config;
mod dashboard;
mod domain;
mod error;
mod ordering;
mod pool;
mod protocol;
mod provider;
mod records;
mod routes;
mod seeds;
mod sessions;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Load config and connect the table store.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "admin_backend", %addr, backend = state.store.kind(), "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "admin_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "admin_backend", "Shutdown signal received");
}
