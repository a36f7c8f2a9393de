//! Driver profiles, login sessions and web-push subscriptions.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Client,
  Driver,
  Dispatcher,
}

/// Contact details a driver registers before going online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
  pub driver_id:         String,
  pub name:              String,
  pub phone:             String,
  pub emergency_contact: String,
  pub updated_at:        DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDriverProfile {
  pub driver_id:         String,
  pub name:              String,
  pub phone:             String,
  pub emergency_contact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub token:     String,
  pub role:      Role,
  /// Driver id for driver sessions; free-form otherwise.
  pub subject:   Option<String>,
  pub issued_at: DateTime<Utc>,
}

/// A browser push subscription. Only `endpoint` is interpreted; the key
/// material is kept verbatim for the delivery side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscription {
  pub endpoint: String,
  #[serde(flatten)]
  pub extra:    serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct Directory {
  drivers:  RwLock<HashMap<String, DriverProfile>>,
  sessions: RwLock<HashMap<String, Session>>,
  push:     RwLock<Vec<PushSubscription>>,
}

impl Directory {
  pub fn new() -> Self { Self::default() }

  pub fn restore(
    drivers: BTreeMap<String, DriverProfile>,
    sessions: BTreeMap<String, Session>,
    push: Vec<PushSubscription>,
  ) -> Self {
    Self {
      drivers:  RwLock::new(drivers.into_iter().collect()),
      sessions: RwLock::new(sessions.into_iter().collect()),
      push:     RwLock::new(push),
    }
  }

  // ── Drivers ───────────────────────────────────────────────────────────────

  /// Create or replace the profile for `input.driver_id`.
  pub async fn register_driver(&self, input: NewDriverProfile) -> Result<DriverProfile> {
    if input.driver_id.is_empty() {
      return Err(Error::InvalidArgument("missing_driverId".into()));
    }
    let profile = DriverProfile {
      driver_id:         input.driver_id,
      name:              input.name,
      phone:             input.phone,
      emergency_contact: input.emergency_contact,
      updated_at:        Utc::now(),
    };
    self
      .drivers
      .write()
      .await
      .insert(profile.driver_id.clone(), profile.clone());
    Ok(profile)
  }

  pub async fn get_driver(&self, driver_id: &str) -> Result<DriverProfile> {
    self
      .drivers
      .read()
      .await
      .get(driver_id)
      .cloned()
      .ok_or_else(|| Error::DriverNotFound(driver_id.to_owned()))
  }

  /// Like [`Self::get_driver`] but absent profiles are not an error.
  pub async fn find_driver(&self, driver_id: &str) -> Option<DriverProfile> {
    self.drivers.read().await.get(driver_id).cloned()
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// Record a session under a caller-generated token.
  pub async fn open_session(&self, token: String, role: Role, subject: Option<String>) -> Session {
    let session = Session { token, role, subject, issued_at: Utc::now() };
    self
      .sessions
      .write()
      .await
      .insert(session.token.clone(), session.clone());
    session
  }

  /// Returns whether a session was removed.
  pub async fn close_session(&self, token: &str) -> bool {
    self.sessions.write().await.remove(token).is_some()
  }

  pub async fn session(&self, token: &str) -> Result<Session> {
    self
      .sessions
      .read()
      .await
      .get(token)
      .cloned()
      .ok_or(Error::Unauthenticated)
  }

  // ── Push ──────────────────────────────────────────────────────────────────

  /// Store a subscription, replacing any existing one with the same
  /// endpoint. Returns `true` when the endpoint was new.
  pub async fn add_push_subscription(&self, sub: PushSubscription) -> Result<bool> {
    if sub.endpoint.is_empty() {
      return Err(Error::InvalidArgument("missing_endpoint".into()));
    }
    let mut push = self.push.write().await;
    match push.iter_mut().find(|s| s.endpoint == sub.endpoint) {
      Some(existing) => {
        *existing = sub;
        Ok(false)
      }
      None => {
        push.push(sub);
        Ok(true)
      }
    }
  }

  pub async fn push_subscriptions(&self) -> Vec<PushSubscription> {
    self.push.read().await.clone()
  }

  // ── Snapshot ──────────────────────────────────────────────────────────────

  pub async fn drivers_snapshot(&self) -> BTreeMap<String, DriverProfile> {
    self
      .drivers
      .read()
      .await
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  pub async fn sessions_snapshot(&self) -> BTreeMap<String, Session> {
    self
      .sessions
      .read()
      .await
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn profile(id: &str, phone: &str) -> NewDriverProfile {
    NewDriverProfile {
      driver_id: id.into(),
      name: "Ana".into(),
      phone: phone.into(),
      emergency_contact: "+5491100000000".into(),
    }
  }

  #[tokio::test]
  async fn register_replaces_profile() {
    let dir = Directory::new();
    dir.register_driver(profile("D1", "111")).await.unwrap();
    dir.register_driver(profile("D1", "222")).await.unwrap();
    assert_eq!(dir.get_driver("D1").await.unwrap().phone, "222");
    assert!(matches!(dir.get_driver("D2").await, Err(Error::DriverNotFound(_))));
    assert!(dir.find_driver("D2").await.is_none());
  }

  #[tokio::test]
  async fn register_requires_driver_id() {
    let dir = Directory::new();
    assert!(matches!(
      dir.register_driver(profile("", "1")).await,
      Err(Error::InvalidArgument(_))
    ));
  }

  #[tokio::test]
  async fn session_lifecycle() {
    let dir = Directory::new();
    dir.open_session("abc".into(), Role::Dispatcher, None).await;
    assert_eq!(dir.session("abc").await.unwrap().role, Role::Dispatcher);
    assert!(dir.close_session("abc").await);
    assert!(!dir.close_session("abc").await);
    assert!(matches!(dir.session("abc").await, Err(Error::Unauthenticated)));
  }

  #[tokio::test]
  async fn push_subscriptions_deduplicate_by_endpoint() {
    let dir = Directory::new();
    let sub: PushSubscription = serde_json::from_value(serde_json::json!({
      "endpoint": "https://push.example/1",
      "keys": { "p256dh": "k", "auth": "a" },
    }))
    .unwrap();
    assert!(dir.add_push_subscription(sub.clone()).await.unwrap());
    assert!(!dir.add_push_subscription(sub).await.unwrap());
    let subs = dir.push_subscriptions().await;
    assert_eq!(subs.len(), 1);
    assert!(subs[0].extra.contains_key("keys"));
  }

  #[test]
  fn role_parses_lowercase() {
    assert_eq!("driver".parse::<Role>().unwrap(), Role::Driver);
    assert!("admin".parse::<Role>().is_err());
  }
}
