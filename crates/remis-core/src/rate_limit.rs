//! Fixed-window request counting per client identity.
//!
//! Bursty at window boundaries: a client can spend a full allowance just
//! before a reset and another right after it.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::{Error, Result};

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW: TimeDelta = TimeDelta::milliseconds(60_000);

#[derive(Debug, Clone, Copy)]
struct Window {
  count:    u32,
  reset_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RateLimiter {
  max:     u32,
  window:  TimeDelta,
  clients: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
  fn default() -> Self { Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW) }
}

impl RateLimiter {
  pub fn new(max: u32, window: TimeDelta) -> Self {
    Self { max, window, clients: Mutex::new(HashMap::new()) }
  }

  /// Count one request from `client` at `now`, rejecting it with
  /// [`Error::RateLimited`] once the window's allowance is spent.
  pub async fn check(&self, client: &str, now: DateTime<Utc>) -> Result<()> {
    let mut clients = self.clients.lock().await;
    let reset_at = self.window_end(now);
    let Some(window) = clients.get_mut(client) else {
      clients.insert(client.to_owned(), Window { count: 1, reset_at });
      return Ok(());
    };

    if now > window.reset_at {
      *window = Window { count: 1, reset_at };
      return Ok(());
    }
    if window.count >= self.max {
      return Err(Error::RateLimited);
    }
    window.count += 1;
    Ok(())
  }

  /// Saturates at the latest representable instant.
  fn window_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_signed(self.window).unwrap_or(DateTime::<Utc>::MAX_UTC)
  }

  /// Forget clients whose window has already closed. Returns how many were
  /// dropped.
  pub async fn prune(&self, now: DateTime<Utc>) -> usize {
    let mut clients = self.clients.lock().await;
    let before = clients.len();
    clients.retain(|_, w| now <= w.reset_at);
    before - clients.len()
  }

  pub fn window(&self) -> TimeDelta { self.window }
}
