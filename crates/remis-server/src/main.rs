//! remis-server binary.
//!
//! Reads `remis.toml` (or the path given with `--config`) layered under
//! `REMIS_*` environment variables, restores state from the SQLite snapshot
//! and serves the REST API and WebSocket endpoint over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `login_password_hash`:
//!
//! ```
//! cargo run -p remis-server -- --hash-password
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use chrono::Utc;
use clap::Parser;
use rand_core::OsRng;
use remis_api::AppState;
use remis_core::{Collaborators, Coordinator, collab::NotificationQueue, rate_limit::RateLimiter};
use remis_server::{
  ServerConfig, http_client, nominatim::NominatimGeocoder, notify::HttpNotifier, osrm::OsrmRouter,
};
use remis_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Remis ride dispatch server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "remis.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
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

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("REMIS"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(dir) = store_path.parent().filter(|d| !d.as_os_str().is_empty()) {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("failed to create store directory {dir:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  match store.written_at().await.context("failed to read snapshot header")? {
    Some(at) => tracing::info!(path = ?store_path, %at, "restoring snapshot"),
    None => tracing::info!(path = ?store_path, "starting with an empty store"),
  }

  // Collaborators share one HTTP client; notifications drain in the
  // background.
  let client = http_client().context("failed to build HTTP client")?;
  let notifier = HttpNotifier::new(client.clone(), server_cfg.notifier());
  let (notifications, _worker) = NotificationQueue::spawn(Arc::new(notifier));
  let collaborators = Collaborators {
    geocoder: Arc::new(NominatimGeocoder::new(
      client.clone(),
      &server_cfg.nominatim_url,
      server_cfg.geocode_region(),
    )),
    router: Arc::new(OsrmRouter::new(client, &server_cfg.osrm_url)),
    notifications,
  };

  let coordinator_cfg = server_cfg.coordinator()?;
  let limiter = Arc::new(server_cfg.rate_limiter()?);

  let hub = Coordinator::open(store, coordinator_cfg, collaborators)
    .await
    .context("failed to restore state")?;

  spawn_limiter_pruning(Arc::clone(&limiter));

  let state = AppState {
    hub,
    limiter,
    auth: Arc::new(server_cfg.auth()),
    push_public_key: server_cfg.web_push_public_key.as_deref().map(Arc::from),
  };

  let app = remis_api::router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .await
    .context("server error")?;

  Ok(())
}

/// Drop closed rate-limit windows once per window length.
fn spawn_limiter_pruning(limiter: Arc<RateLimiter>) {
  let period = limiter
    .window()
    .to_std()
    .ok()
    .filter(|d| !d.is_zero())
    .unwrap_or(Duration::from_secs(60));
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    loop {
      ticker.tick().await;
      let dropped = limiter.prune(Utc::now()).await;
      if dropped > 0 {
        tracing::debug!(dropped, "pruned rate-limit windows");
      }
    }
  });
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
