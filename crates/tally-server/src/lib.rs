//! Configuration and service wiring for the `tally` binary.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use axum::Router;
use serde::Deserialize;
use tally_api::{ApiState, api_router};
use tally_core::{
  clock::{Clock, ZonedClock},
  validate::{DuplicatePolicy, SnapshotValidator},
};
use tally_ops::{
  RetryPolicy, SearchEngine, SnapshotIntake, SweepConfig, Sweeper, UsernameRepair,
  sweep::DEFAULT_LEASE_TTL,
};
use tally_store_sqlite::SqliteStore;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `TALLY__*`
/// environment variables. Every key has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  /// Fixed UTC offset all calendar dates are computed in.
  pub time_zone:        String,
  pub duplicate_policy: DuplicatePolicy,
  pub store_timeout_ms: u64,
  pub retry:            RetrySettings,
  pub sweep:            SweepSettings,
  pub search:           SearchSettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      host:             "127.0.0.1".into(),
      port:             8080,
      store_path:       PathBuf::from("tally.db"),
      time_zone:        "UTC".into(),
      duplicate_policy: DuplicatePolicy::Reject,
      store_timeout_ms: 5000,
      retry:            RetrySettings::default(),
      sweep:            SweepSettings::default(),
      search:           SearchSettings::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
  pub max_attempts:       u32,
  pub initial_backoff_ms: u64,
  pub max_backoff_ms:     u64,
}

impl Default for RetrySettings {
  fn default() -> Self { Self { max_attempts: 4, initial_backoff_ms: 50, max_backoff_ms: 2000 } }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
  pub fetch_batch:    usize,
  pub mutate_batch:   usize,
  /// Lifetime of the cross-process sweep lease between renewals.
  pub lease_ttl_secs: u64,
}

impl Default for SweepSettings {
  fn default() -> Self {
    let defaults = SweepConfig::default();
    Self {
      fetch_batch:    defaults.fetch_batch,
      mutate_batch:   defaults.mutate_batch,
      lease_ttl_secs: DEFAULT_LEASE_TTL.as_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
  pub default_limit: usize,
}

impl Default for SearchSettings {
  fn default() -> Self { Self { default_limit: tally_core::rank::DEFAULT_LIMIT } }
}

impl Settings {
  /// Read `path` (if it exists) and layer `TALLY__*` variables over it.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("TALLY")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts:    self.retry.max_attempts,
      initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
      max_backoff:     Duration::from_millis(self.retry.max_backoff_ms),
    }
  }

  /// Batch sizes, clamped to the sweeper's limits.
  pub fn sweep_config(&self) -> SweepConfig {
    SweepConfig::new(self.sweep.fetch_batch, self.sweep.mutate_batch)
  }

  pub fn sweep_lease_ttl(&self) -> Duration { Duration::from_secs(self.sweep.lease_ttl_secs) }

  pub fn clock(&self) -> tally_core::Result<ZonedClock> { ZonedClock::from_config(&self.time_zone) }
}

// ─── Services ─────────────────────────────────────────────────────────────────

/// Every service, wired to one store.
#[derive(Clone)]
pub struct Services {
  pub store:   Arc<SqliteStore>,
  pub search:  SearchEngine<SqliteStore>,
  pub intake:  SnapshotIntake<SqliteStore>,
  pub repair:  UsernameRepair<SqliteStore>,
  pub sweeper: Sweeper<SqliteStore>,
}

impl Services {
  /// Open the configured store and build the services around it.
  pub async fn open(settings: &Settings) -> anyhow::Result<Self> {
    let clock = settings
      .clock()
      .with_context(|| format!("invalid time_zone {:?}", settings.time_zone))?;

    let store_path = expand_tilde(&settings.store_path);
    let store = SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?
      .with_timeout(settings.store_timeout());

    tracing::info!(
      store = %store_path.display(),
      time_zone = %clock.offset(),
      duplicate_policy = ?settings.duplicate_policy,
      "store opened"
    );
    Ok(Self::from_store(Arc::new(store), Arc::new(clock), settings))
  }

  pub fn from_store(store: Arc<SqliteStore>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
    let retry = settings.retry_policy();
    Self {
      search:  SearchEngine::new(Arc::clone(&store))
        .with_policy(retry)
        .with_default_limit(settings.search.default_limit),
      intake:  SnapshotIntake::new(
        Arc::clone(&store),
        SnapshotValidator::new(settings.duplicate_policy),
        Arc::clone(&clock),
      )
      .with_policy(retry),
      repair:  UsernameRepair::new(Arc::clone(&store)).with_policy(retry),
      sweeper: Sweeper::new(Arc::clone(&store), clock)
        .with_policy(retry)
        .with_config(settings.sweep_config())
        .with_lease_ttl(settings.sweep_lease_ttl()),
      store,
    }
  }

  /// The HTTP application: the JSON API mounted under `/api`.
  pub fn router(&self) -> Router {
    let state = ApiState {
      store:  Arc::clone(&self.store),
      search: self.search.clone(),
      intake: self.intake.clone(),
    };
    Router::new().nest("/api", api_router(state))
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
