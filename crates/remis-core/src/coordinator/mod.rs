//! The [`Coordinator`]: one handle over every core component, wiring them
//! along the ride, location and safety flows.
//!
//! Every mutation that should survive a restart ends with a full-state
//! snapshot written through the [`SnapshotStore`]. Snapshot writes are
//! serialised so that a later state is never overwritten by an earlier one.
//! Location fixes are the exception: they update memory only and reach disk
//! with the next persisted mutation.

mod drivers;
mod rides;
mod safety;

use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  alert::AlertCenter,
  channel::ChannelRegistry,
  collab::{Geocoder, NotificationQueue, Offline, Outbound, RouteProvider},
  directory::Directory,
  dispatch::DispatchPolicy,
  location::{self, LocationTracker},
  ride::RideStore,
  snapshot::{Snapshot, SnapshotStore},
};

pub use rides::{StatusMode, Suggestion};
pub use safety::AlertReport;

/// Behavioural knobs, usually filled from the server configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
  /// Public origin used to build tracking links.
  pub base_url:                String,
  /// Age after which a driver's fix no longer counts as active.
  pub location_ttl:            TimeDelta,
  /// Assign the selected driver as soon as the pickup is geocoded.
  pub auto_dispatch:           bool,
  pub dispatch_policy:         DispatchPolicy,
  /// Appended to a query that failed to geocode, for one retry.
  pub geocode_fallback_suffix: Option<String>,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      base_url:                "http://localhost:3000".into(),
      location_ttl:            location::DEFAULT_TTL,
      auto_dispatch:           false,
      dispatch_policy:         DispatchPolicy::default(),
      geocode_fallback_suffix: None,
    }
  }
}

/// External services the coordinator calls out to.
#[derive(Clone)]
pub struct Collaborators {
  pub geocoder:      Arc<dyn Geocoder>,
  pub router:        Arc<dyn RouteProvider>,
  pub notifications: NotificationQueue,
}

impl Collaborators {
  /// No geocoding, no routing, and notifications handed to `notifications`.
  pub fn offline(notifications: NotificationQueue) -> Self {
    Self {
      geocoder: Arc::new(Offline),
      router: Arc::new(Offline),
      notifications,
    }
  }
}

struct Inner<S> {
  config:        CoordinatorConfig,
  store:         S,
  persist_lock:  Mutex<()>,
  rides:         RideStore,
  tracker:       LocationTracker,
  channels:      ChannelRegistry,
  alerts:        AlertCenter,
  directory:     Directory,
  collaborators: Collaborators,
}

/// Cheaply cloneable handle to the shared engine state.
pub struct Coordinator<S> {
  inner: Arc<Inner<S>>,
}

impl<S> Clone for Coordinator<S> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<S: SnapshotStore + 'static> Coordinator<S> {
  /// Load the last snapshot from `store` (if any) and rebuild every
  /// component from it.
  pub async fn open(
    store: S,
    config: CoordinatorConfig,
    collaborators: Collaborators,
  ) -> Result<Self> {
    let snapshot = store
      .load()
      .await
      .map_err(|e| Error::Persistence(Box::new(e)))?
      .unwrap_or_default();

    info!(
      rides = snapshot.rides.len(),
      alerts = snapshot.alerts.len(),
      drivers = snapshot.drivers.len(),
      "restored snapshot"
    );

    let inner = Inner {
      rides: RideStore::restore(snapshot.rides),
      tracker: LocationTracker::restore(snapshot.last_location_by_driver),
      channels: ChannelRegistry::new(),
      alerts: AlertCenter::restore(snapshot.alerts),
      directory: Directory::restore(snapshot.drivers, snapshot.sessions, snapshot.push_subs),
      persist_lock: Mutex::new(()),
      config,
      store,
      collaborators,
    };
    Ok(Self { inner: Arc::new(inner) })
  }

  pub fn config(&self) -> &CoordinatorConfig { &self.inner.config }

  pub fn channels(&self) -> &ChannelRegistry { &self.inner.channels }

  /// Link a rider can open to follow `ride_id`.
  pub fn track_url(&self, ride_id: Uuid) -> String {
    let base = self.inner.config.base_url.trim_end_matches('/');
    format!("{base}/client.html?rideId={ride_id}")
  }

  /// The full in-memory state as one document.
  pub async fn snapshot(&self) -> Snapshot {
    let inner = &self.inner;
    Snapshot {
      rides:                   inner.rides.snapshot().await,
      last_location_by_driver: inner.tracker.snapshot().await,
      push_subs:               inner.directory.push_subscriptions().await,
      alerts:                  inner.alerts.snapshot().await,
      drivers:                 inner.directory.drivers_snapshot().await,
      sessions:                inner.directory.sessions_snapshot().await,
    }
  }

  /// Overwrite the stored snapshot with the current state.
  pub async fn persist(&self) -> Result<()> {
    let _guard = self.inner.persist_lock.lock().await;
    let snapshot = self.snapshot().await;
    self
      .inner
      .store
      .save(&snapshot)
      .await
      .map_err(|e| Error::Persistence(Box::new(e)))
  }

  fn notify(&self, message: Outbound) { self.inner.collaborators.notifications.enqueue(message); }

  /// Web push to every subscriber; skipped when nobody subscribed.
  async fn push(&self, payload: serde_json::Value) {
    let subscriptions = self.inner.directory.push_subscriptions().await;
    if !subscriptions.is_empty() {
      self.notify(Outbound::Push { subscriptions, payload });
    }
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use std::{future::Future, time::Duration};

  use tokio::sync::mpsc;

  use super::*;
  use crate::snapshot::MemorySnapshotStore;

  pub type TestHub = Coordinator<MemorySnapshotStore>;

  pub async fn hub_with(
    config: CoordinatorConfig,
    geocoder: Arc<dyn Geocoder>,
  ) -> (TestHub, MemorySnapshotStore, mpsc::UnboundedReceiver<Outbound>) {
    let store = MemorySnapshotStore::new();
    let (queue, outbox) = NotificationQueue::channel();
    let collaborators = Collaborators { geocoder, ..Collaborators::offline(queue) };
    let hub = Coordinator::open(store.clone(), config, collaborators).await.unwrap();
    (hub, store, outbox)
  }

  pub async fn hub() -> (TestHub, MemorySnapshotStore, mpsc::UnboundedReceiver<Outbound>) {
    hub_with(CoordinatorConfig::default(), Arc::new(Offline)).await
  }

  pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
      out.push(item);
    }
    out
  }

  /// Poll `check` until it holds, yielding to spawned tasks in between.
  pub async fn eventually<F, Fut>(mut check: F)
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
  {
    for _ in 0..400 {
      if check().await {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
  }
}
