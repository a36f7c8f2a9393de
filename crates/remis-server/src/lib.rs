//! Server-side wiring for Remis: runtime configuration and the HTTP-backed
//! collaborators (Nominatim geocoding, OSRM routing, Telegram and Twilio
//! delivery).

pub mod nominatim;
pub mod notify;
pub mod osrm;

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use chrono::TimeDelta;
use remis_api::AuthConfig;
use remis_core::{CoordinatorConfig, dispatch::DispatchPolicy, rate_limit::RateLimiter};
use serde::Deserialize;

use crate::notify::NotifierConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `remis.toml` and
/// `REMIS_*` environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                    String,
  pub port:                    u16,
  /// Public origin used in tracking links.
  pub base_url:                String,
  pub store_path:              PathBuf,
  pub location_ttl_secs:       u64,
  pub rate_limit_max:          u32,
  pub rate_limit_window_ms:    u64,
  pub auto_dispatch:           bool,
  pub dispatch_policy:         DispatchPolicy,
  /// argon2 PHC string; see `--hash-password`.
  pub login_password_hash:     Option<String>,
  /// Nominatim `countrycodes` filter, e.g. `ar`.
  pub geocode_region:          Option<String>,
  /// Appended to a failed geocoding query for one retry.
  pub geocode_fallback_suffix: Option<String>,
  pub nominatim_url:           String,
  pub osrm_url:                String,
  pub telegram_bot_token:      Option<String>,
  pub telegram_chat_id:        Option<String>,
  pub twilio_account_sid:      Option<String>,
  pub twilio_auth_token:       Option<String>,
  pub twilio_from_sms:         Option<String>,
  pub dispatcher_phone:        Option<String>,
  pub web_push_public_key:     Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                    "0.0.0.0".into(),
      port:                    3000,
      base_url:                "http://localhost:3000".into(),
      store_path:              PathBuf::from("~/.local/share/remis/remis.db"),
      location_ttl_secs:       30,
      rate_limit_max:          remis_core::rate_limit::DEFAULT_MAX_REQUESTS,
      rate_limit_window_ms:    60_000,
      auto_dispatch:           false,
      dispatch_policy:         DispatchPolicy::Nearest,
      login_password_hash:     None,
      geocode_region:          None,
      geocode_fallback_suffix: None,
      nominatim_url:           "https://nominatim.openstreetmap.org".into(),
      osrm_url:                "https://router.project-osrm.org".into(),
      telegram_bot_token:      None,
      telegram_chat_id:        None,
      twilio_account_sid:      None,
      twilio_auth_token:       None,
      twilio_from_sms:         None,
      dispatcher_phone:        None,
      web_push_public_key:     None,
    }
  }
}

/// Treat `Some("")` (an empty env var, say) as unset.
fn present(value: Option<&str>) -> Option<String> {
  value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

impl ServerConfig {
  pub fn coordinator(&self) -> anyhow::Result<CoordinatorConfig> {
    let location_ttl = i64::try_from(self.location_ttl_secs)
      .ok()
      .and_then(TimeDelta::try_seconds)
      .context("location_ttl_secs is out of range")?;
    Ok(CoordinatorConfig {
      base_url: self.base_url.clone(),
      location_ttl,
      auto_dispatch: self.auto_dispatch,
      dispatch_policy: self.dispatch_policy,
      geocode_fallback_suffix: present(self.geocode_fallback_suffix.as_deref()),
    })
  }

  pub fn rate_limiter(&self) -> anyhow::Result<RateLimiter> {
    let window = i64::try_from(self.rate_limit_window_ms)
      .ok()
      .and_then(TimeDelta::try_milliseconds)
      .context("rate_limit_window_ms is out of range")?;
    Ok(RateLimiter::new(self.rate_limit_max, window))
  }

  pub fn auth(&self) -> AuthConfig {
    AuthConfig { password_hash: present(self.login_password_hash.as_deref()) }
  }

  pub fn notifier(&self) -> NotifierConfig {
    NotifierConfig {
      telegram_bot_token: present(self.telegram_bot_token.as_deref()),
      telegram_chat_id:   present(self.telegram_chat_id.as_deref()),
      twilio_account_sid: present(self.twilio_account_sid.as_deref()),
      twilio_auth_token:  present(self.twilio_auth_token.as_deref()),
      twilio_from_sms:    present(self.twilio_from_sms.as_deref()),
      dispatcher_phone:   present(self.dispatcher_phone.as_deref()),
    }
  }

  pub fn geocode_region(&self) -> Option<String> { present(self.geocode_region.as_deref()) }
}

/// Shared outbound HTTP client.
///
/// Cheap to clone; every collaborator holds its own handle.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
  reqwest::Client::builder()
    .timeout(Duration::from_secs(10))
    .user_agent(concat!("remis/", env!("CARGO_PKG_VERSION")))
    .build()
}
