//! Application state: the configured table store and service configuration.
//!
//! The store is chosen once at startup. Each request gets a `DataProvider`
//! bound to the caller's bearer token so the backend evaluates row-level
//! policies as that user.

use std::{sync::Arc, time::Duration};

use tracing::{error, info, instrument};

use crate::backend::{MemoryStore, PostgrestStore, TableStore};
use crate::config::{load_admin_config_from_env, AdminConfig, BackendCfg, BackendKind};
use crate::provider::DataProvider;
use crate::seeds::demo_dataset;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TableStore>,
    pub config: AdminConfig,
}

impl AppState {
    /// Build state from env: load config, then connect the chosen backend.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_admin_config_from_env();
        let store = build_store(&config.backend);
        info!(target: "admin_backend", backend = store.kind(), require_auth = config.server.require_auth, "Application state ready");
        Self { store, config }
    }

    pub fn with_store(store: Arc<dyn TableStore>, config: AdminConfig) -> Self {
        Self { store, config }
    }

    /// Adapter acting for `bearer`, or with the anon key when there is none.
    pub fn provider(&self, bearer: Option<&str>) -> DataProvider {
        DataProvider::new(self.store.authorized(bearer))
    }
}

fn memory_store(cfg: &BackendCfg) -> Arc<dyn TableStore> {
    let store = match cfg.seed_path.as_deref() {
        Some(path) => MemoryStore::from_json_file(path).unwrap_or_else(|e| {
            error!(target: "admin_backend", %path, error = %e, "Failed to load seed file; using demo dataset");
            MemoryStore::from_dataset(demo_dataset()).unwrap_or_default()
        }),
        None => MemoryStore::from_dataset(demo_dataset()).unwrap_or_default(),
    };
    Arc::new(store)
}

/// Hosted backend when fully configured; the memory store otherwise.
fn build_store(cfg: &BackendCfg) -> Arc<dyn TableStore> {
    if cfg.kind == BackendKind::Memory {
        return memory_store(cfg);
    }
    let (Some(url), Some(key)) = (cfg.url.as_deref(), cfg.anon_key.as_deref()) else {
        error!(target: "admin_backend", "SUPABASE_URL / SUPABASE_ANON_KEY missing; falling back to the memory store");
        return memory_store(cfg);
    };
    match PostgrestStore::new(url, key, Duration::from_secs(cfg.timeout_secs)) {
        Ok(store) => {
            info!(target: "admin_backend", base_url = %store.base_url, "Hosted backend configured");
            Arc::new(store)
        }
        Err(e) => {
            error!(target: "admin_backend", error = %e, "Failed to build backend client; falling back to the memory store");
            memory_store(cfg)
        }
    }
}
