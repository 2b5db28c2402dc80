//! Service configuration from an optional TOML file plus environment overrides.
//!
//! ```toml
//! [backend]
//! kind = "postgrest"          # or "memory"
//! url = "https://xyz.supabase.co"
//! anon_key = "…"
//! timeout_secs = 20
//! seed_path = "fixtures/demo.json"
//!
//! [server]
//! default_per_page = 25
//! max_per_page = 1000
//! require_auth = false
//! static_dir = "./static"
//!
//! [dashboard]
//! low_question_threshold = 10
//! recent_limit = 5
//! ```

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::AdminError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  #[default]
  Postgrest,
  Memory,
}

impl BackendKind {
  fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "postgrest" | "supabase" => Some(BackendKind::Postgrest),
      "memory" => Some(BackendKind::Memory),
      _ => None,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BackendCfg {
  pub kind: BackendKind,
  pub url: Option<String>,
  pub anon_key: Option<String>,
  pub timeout_secs: u64,
  /// JSON dataset for the memory backend; the built-in demo data otherwise.
  pub seed_path: Option<String>,
}

impl Default for BackendCfg {
  fn default() -> Self {
    Self { kind: BackendKind::default(), url: None, anon_key: None, timeout_secs: 20, seed_path: None }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
  pub default_per_page: u64,
  pub max_per_page: u64,
  /// Reject data requests that carry no bearer token.
  pub require_auth: bool,
  pub static_dir: String,
}

impl Default for ServerCfg {
  fn default() -> Self {
    Self { default_per_page: 25, max_per_page: 1000, require_auth: false, static_dir: "./static".into() }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DashboardCfg {
  pub low_question_threshold: u64,
  pub recent_limit: u64,
}

impl Default for DashboardCfg {
  fn default() -> Self {
    Self { low_question_threshold: 10, recent_limit: 5 }
  }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
  pub backend: BackendCfg,
  pub server: ServerCfg,
  pub dashboard: DashboardCfg,
}

impl AdminConfig {
  /// Overlay `SUPABASE_URL`, `SUPABASE_ANON_KEY`, `ADMIN_BACKEND` and
  /// `ADMIN_SEED_PATH`. Empty values are ignored.
  pub fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
    let var = |k: &str| var(k).filter(|v| !v.trim().is_empty());
    if let Some(url) = var("SUPABASE_URL") {
      self.backend.url = Some(url);
    }
    if let Some(key) = var("SUPABASE_ANON_KEY") {
      self.backend.anon_key = Some(key);
    }
    if let Some(kind) = var("ADMIN_BACKEND") {
      match BackendKind::parse(&kind) {
        Some(k) => self.backend.kind = k,
        None => warn!(target: "admin_backend", %kind, "Unknown ADMIN_BACKEND; keeping configured backend"),
      }
    }
    if let Some(path) = var("ADMIN_SEED_PATH") {
      self.backend.seed_path = Some(path);
    }
    self
  }

  /// Clamp a requested page size to the configured bounds.
  pub fn per_page(&self, requested: Option<u64>) -> u64 {
    requested
      .filter(|n| *n > 0)
      .unwrap_or(self.server.default_per_page)
      .min(self.server.max_per_page)
  }
}

/// Read and parse a TOML config file.
fn read_config_file(path: &str) -> Result<AdminConfig, AdminError> {
  let text = std::fs::read_to_string(path).map_err(|e| AdminError::Config(format!("{path}: {e}")))?;
  toml::from_str(&text).map_err(|e| AdminError::Config(format!("{path}: {e}")))
}

/// The TOML at `ADMIN_CONFIG_PATH`, if set. Read and parse errors are logged
/// and yield `None`.
fn load_file_from_env() -> Option<AdminConfig> {
  let path = std::env::var("ADMIN_CONFIG_PATH").ok()?;
  match read_config_file(&path) {
    Ok(cfg) => {
      info!(target: "admin_backend", %path, "Loaded admin config (TOML)");
      Some(cfg)
    }
    Err(e) => {
      error!(target: "admin_backend", error = %e, "Ignoring admin config file");
      None
    }
  }
}

/// File config (or defaults) with environment overrides applied.
pub fn load_admin_config_from_env() -> AdminConfig {
  load_file_from_env()
    .unwrap_or_default()
    .apply_env(|k| std::env::var(k).ok())
}
