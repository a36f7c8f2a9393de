//! The persisted state document and the [`SnapshotStore`] abstraction.
//!
//! Every save is a full-state overwrite; restoring is "load the last
//! snapshot". Backends live in other crates (e.g. `remis-store-sqlite`).

use std::{collections::BTreeMap, convert::Infallible, future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
  alert::Alert,
  directory::{DriverProfile, PushSubscription, Session},
  location::DriverLocation,
  ride::Ride,
};

/// Everything the coordinator needs to come back after a restart.
///
/// Missing collections deserialize as empty so older documents still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
  pub rides:                   BTreeMap<Uuid, Ride>,
  pub last_location_by_driver: BTreeMap<String, DriverLocation>,
  pub push_subs:               Vec<PushSubscription>,
  pub alerts:                  BTreeMap<Uuid, Alert>,
  pub drivers:                 BTreeMap<String, DriverProfile>,
  pub sessions:                BTreeMap<String, Session>,
}

/// Durable home for the latest [`Snapshot`].
pub trait SnapshotStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The most recently saved snapshot, or `None` on first start.
  fn load(&self) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  /// Replace the stored snapshot wholesale.
  fn save<'a>(
    &'a self,
    snapshot: &'a Snapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Keeps the last snapshot in memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
  slot: Arc<Mutex<Option<Snapshot>>>,
}

impl MemorySnapshotStore {
  pub fn new() -> Self { Self::default() }

  pub fn with_snapshot(snapshot: Snapshot) -> Self {
    Self { slot: Arc::new(Mutex::new(Some(snapshot))) }
  }
}

impl SnapshotStore for MemorySnapshotStore {
  type Error = Infallible;

  async fn load(&self) -> Result<Option<Snapshot>, Infallible> {
    Ok(self.slot.lock().await.clone())
  }

  async fn save(&self, snapshot: &Snapshot) -> Result<(), Infallible> {
    *self.slot.lock().await = Some(snapshot.clone());
    Ok(())
  }
}
