//! Driver positions and the last-known-location cache.
//!
//! The tracker keeps exactly one entry per driver (last write wins, no
//! ordering check on out-of-order timestamps). Stale entries are never
//! evicted; they are only filtered out of [`LocationTracker::list_active`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Default age after which a cached location no longer counts as active.
pub const DEFAULT_TTL: TimeDelta = TimeDelta::seconds(30);

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
  pub lat: f64,
  pub lng: f64,
}

impl Coord {
  pub fn new(lat: f64, lng: f64) -> Self { Self { lat, lng } }

  pub fn is_finite(&self) -> bool { self.lat.is_finite() && self.lng.is_finite() }
}

/// One position fix reported by a driver device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
  pub lat:       f64,
  pub lng:       f64,
  /// Horizontal accuracy in metres.
  #[serde(default)]
  pub accuracy:  Option<f64>,
  #[serde(default)]
  pub heading:   Option<f64>,
  #[serde(default)]
  pub speed:     Option<f64>,
  /// Device time of the fix, carried on the wire as epoch milliseconds.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
}

impl DriverLocation {
  pub fn coord(&self) -> Coord { Coord::new(self.lat, self.lng) }
}

/// A tracker entry as returned by the "active drivers" read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDriver {
  pub driver_id: String,
  #[serde(flatten)]
  pub location:  DriverLocation,
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

/// Per-driver last-known-position cache.
#[derive(Debug, Default)]
pub struct LocationTracker {
  entries: RwLock<HashMap<String, DriverLocation>>,
}

impl LocationTracker {
  pub fn new() -> Self { Self::default() }

  /// Build a tracker pre-populated from a snapshot.
  pub fn restore(entries: BTreeMap<String, DriverLocation>) -> Self {
    Self { entries: RwLock::new(entries.into_iter().collect()) }
  }

  /// Store `location` for `driver_id`, replacing whatever was there.
  pub async fn update(&self, driver_id: &str, location: DriverLocation) {
    self
      .entries
      .write()
      .await
      .insert(driver_id.to_owned(), location);
  }

  pub async fn get(&self, driver_id: &str) -> Option<DriverLocation> {
    self.entries.read().await.get(driver_id).cloned()
  }

  /// Entries younger than `ttl` at `now` with finite coordinates, ordered by
  /// driver id.
  pub async fn list_active(
    &self,
    now: DateTime<Utc>,
    ttl: TimeDelta,
  ) -> Vec<ActiveDriver> {
    let entries = self.entries.read().await;
    let mut active: Vec<ActiveDriver> = entries
      .iter()
      .filter(|(_, loc)| loc.coord().is_finite() && now - loc.timestamp < ttl)
      .map(|(id, loc)| ActiveDriver {
        driver_id: id.clone(),
        location:  loc.clone(),
      })
      .collect();
    active.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
    active
  }

  /// Copy of the whole cache, keyed by driver id.
  pub async fn snapshot(&self) -> BTreeMap<String, DriverLocation> {
    self
      .entries
      .read()
      .await
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}
