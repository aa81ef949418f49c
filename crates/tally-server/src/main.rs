//! `tally` binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, and either serves the JSON API or runs one operation and prints
//! its result as JSON.
//!
//! ```text
//! tally serve
//! tally search "Mr.Beast" --platform youtube --limit 5
//! tally repair-usernames --sentinel undefined
//! tally sweep
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tally_core::identity::Platform;
use tally_ops::CancelToken;
use tally_server::{Services, Settings};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally creator statistics service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API under `/api`.
  Serve,

  /// Run one search and print the ranked identities.
  Search {
    query:    String,
    /// Restrict results to one platform.
    #[arg(long)]
    platform: Option<String>,
    #[arg(long)]
    limit:    Option<usize>,
  },

  /// Re-derive usernames that were overwritten with a sentinel value.
  RepairUsernames {
    /// The bogus username to look for, e.g. `undefined`.
    #[arg(long)]
    sentinel: String,
  },

  /// Scan all snapshots and remove, correct, or flag invalid ones.
  Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  let services = Services::open(&settings).await?;

  match cli.command {
    Command::Serve => serve(&settings, &services).await,
    Command::Search { query, platform, limit } => {
      let platform = platform
        .as_deref()
        .map(Platform::parse)
        .transpose()
        .context("invalid --platform")?;
      let found = services.search.search(&query, platform, limit).await?;
      print_json(&found)
    }
    Command::RepairUsernames { sentinel } => {
      let cancel = cancel_on_ctrl_c();
      let report = services.repair.repair_usernames_with(&sentinel, &cancel).await?;
      print_json(&report)
    }
    Command::Sweep => {
      let cancel = cancel_on_ctrl_c();
      let report = services.sweeper.sweep_with(&cancel).await?;
      print_json(&report)
    }
  }
}

async fn serve(settings: &Settings, services: &Services) -> anyhow::Result<()> {
  let app = services.router();
  let address = settings.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      tracing::info!("shutting down");
    })
    .await
    .context("server error")?;

  Ok(())
}

/// A token that is cancelled on the first Ctrl-C. Batch jobs stop after the
/// batch in flight.
fn cancel_on_ctrl_c() -> CancelToken {
  let token = CancelToken::new();
  let handle = token.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupt received, stopping after the current batch");
      handle.cancel();
    }
  });
  token
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
