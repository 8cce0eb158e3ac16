//! Attest API server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and serves the JSON API over HTTP.
//!
//! # Bootstrapping the first admin
//!
//! ```text
//! attest-server --init-admin admin@example.com
//! ```
//!
//! reads a password from stdin, creates the admin account, and exits.

use std::{
  io::{self, BufRead as _, Write as _},
  path::PathBuf,
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use attest_api::{AppState, ServerConfig, auth::hash_password};
use attest_core::{store::ControlStore as _, user::NewUser};
use attest_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Attest internal-controls tracker server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Create an admin account with this email (password read from stdin)
  /// and exit.
  #[arg(long, value_name = "EMAIL")]
  init_admin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ATTEST"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", server_cfg.store_path)
    })?;

  // Helper mode: create the first admin and exit.
  if let Some(email) = cli.init_admin {
    let password = read_password()?;
    let user = store
      .add_user(NewUser {
        email,
        display_name: "Administrator".to_string(),
        company: String::new(),
        password_hash: hash_password(&password)
          .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?,
        is_admin: true,
        expires_at: None,
      })
      .await
      .context("failed to create admin user")?;
    println!("created admin {} ({})", user.email, user.user_id);
    return Ok(());
  }

  let state = AppState {
    store:  Arc::new(store),
    config: Arc::new(server_cfg.clone()),
  };

  let app = attest_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}
