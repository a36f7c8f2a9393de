//! Safety alerts and the [`AlertCenter`] registry.
//!
//! Alerts are created active and can only move to resolved. Resolving an
//! already-resolved alert overwrites `resolved_at` again.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
  Error, Result,
  location::{Coord, DriverLocation},
  ride::Ride,
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
  DriverSuspicious,
  PathSuspicious,
  PassengerSuspicious,
  Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
  Active,
  Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
  pub alert_id:    Uuid,
  pub ride_id:     Option<Uuid>,
  #[serde(rename = "type")]
  pub kind:        AlertKind,
  pub description: String,
  #[serde(rename = "timestamp")]
  pub created_at:  DateTime<Utc>,
  /// Best-effort: the reporter, else the ride's driver.
  pub driver_id:   Option<String>,
  pub last_coord:  Option<Coord>,
  pub status:      AlertStatus,
  pub resolved_at: Option<DateTime<Utc>>,
}

/// Input to [`AlertCenter::raise`], already resolved against ride and
/// tracker state.
#[derive(Debug, Clone)]
pub struct NewAlert {
  pub ride_id:     Option<Uuid>,
  pub kind:        AlertKind,
  pub description: String,
  pub driver_id:   Option<String>,
  pub last_coord:  Option<Coord>,
}

/// Explicit reporter first, then the ride's assigned driver.
pub fn resolve_driver(reporter: Option<&str>, ride: Option<&Ride>) -> Option<String> {
  reporter
    .filter(|r| !r.is_empty())
    .map(str::to_owned)
    .or_else(|| ride.and_then(|r| r.driver_id.clone()))
}

/// The ride's last location first, then the driver's cached fix.
pub fn resolve_coord(ride: Option<&Ride>, tracked: Option<&DriverLocation>) -> Option<Coord> {
  ride
    .and_then(|r| r.last_location.as_ref())
    .or(tracked)
    .map(DriverLocation::coord)
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct AlertCenter {
  alerts: RwLock<HashMap<Uuid, Alert>>,
}

impl AlertCenter {
  pub fn new() -> Self { Self::default() }

  pub fn restore(alerts: BTreeMap<Uuid, Alert>) -> Self {
    Self { alerts: RwLock::new(alerts.into_iter().collect()) }
  }

  pub async fn raise(&self, input: NewAlert) -> Alert {
    let alert = Alert {
      alert_id:    Uuid::new_v4(),
      ride_id:     input.ride_id,
      kind:        input.kind,
      description: input.description,
      created_at:  Utc::now(),
      driver_id:   input.driver_id,
      last_coord:  input.last_coord,
      status:      AlertStatus::Active,
      resolved_at: None,
    };
    self.alerts.write().await.insert(alert.alert_id, alert.clone());
    alert
  }

  pub async fn resolve(&self, alert_id: Uuid) -> Result<Alert> {
    let mut alerts = self.alerts.write().await;
    let alert = alerts.get_mut(&alert_id).ok_or(Error::AlertNotFound(alert_id))?;
    alert.status = AlertStatus::Resolved;
    alert.resolved_at = Some(Utc::now());
    Ok(alert.clone())
  }

  pub async fn get(&self, alert_id: Uuid) -> Result<Alert> {
    self
      .alerts
      .read()
      .await
      .get(&alert_id)
      .cloned()
      .ok_or(Error::AlertNotFound(alert_id))
  }

  /// Every alert, newest first.
  pub async fn list_all(&self) -> Vec<Alert> {
    let mut list: Vec<Alert> = self.alerts.read().await.values().cloned().collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    list
  }

  /// Active alerts, newest first.
  pub async fn list_active(&self) -> Vec<Alert> {
    let mut list = self.list_all().await;
    list.retain(|a| a.status == AlertStatus::Active);
    list
  }

  pub async fn snapshot(&self) -> BTreeMap<Uuid, Alert> {
    self
      .alerts
      .read()
      .await
      .iter()
      .map(|(k, v)| (*k, v.clone()))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ride::{NewRide, RideStore};

  fn new_alert(kind: AlertKind) -> NewAlert {
    NewAlert {
      ride_id: None,
      kind,
      description: "black car following".into(),
      driver_id: None,
      last_coord: None,
    }
  }

  fn fix(lat: f64) -> DriverLocation {
    DriverLocation {
      lat,
      lng: 0.0,
      accuracy: None,
      heading: None,
      speed: None,
      timestamp: Utc::now(),
    }
  }

  #[tokio::test]
  async fn raise_starts_active_and_resolve_is_one_way() {
    let center = AlertCenter::new();
    let alert = center.raise(new_alert(AlertKind::PathSuspicious)).await;
    assert_eq!(alert.status, AlertStatus::Active);
    assert_eq!(center.list_active().await.len(), 1);

    let resolved = center.resolve(alert.alert_id).await.unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert!(center.list_active().await.is_empty());
    assert_eq!(center.list_all().await.len(), 1);
  }

  #[tokio::test]
  async fn resolving_twice_overwrites_timestamp() {
    let center = AlertCenter::new();
    let alert = center.raise(new_alert(AlertKind::Danger)).await;
    let first = center.resolve(alert.alert_id).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = center.resolve(alert.alert_id).await.unwrap();
    assert_eq!(second.status, AlertStatus::Resolved);
    assert!(second.resolved_at > first.resolved_at);
  }

  #[tokio::test]
  async fn unknown_alert_is_not_found() {
    let center = AlertCenter::new();
    assert!(matches!(
      center.resolve(Uuid::new_v4()).await,
      Err(Error::AlertNotFound(_))
    ));
  }

  #[tokio::test]
  async fn newest_first() {
    let center = AlertCenter::new();
    let old = center.raise(new_alert(AlertKind::Danger)).await;
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let new = center.raise(new_alert(AlertKind::Danger)).await;
    let ids: Vec<Uuid> = center.list_all().await.iter().map(|a| a.alert_id).collect();
    assert_eq!(ids, vec![new.alert_id, old.alert_id]);
  }

  #[tokio::test]
  async fn driver_and_coordinate_resolution_order() {
    let rides = RideStore::new();
    let ride = rides.create(NewRide::default()).await;
    let assigned = rides.try_assign(ride.ride_id, "D1", None, None).await.unwrap();

    assert_eq!(resolve_driver(Some("D7"), Some(&assigned)).as_deref(), Some("D7"));
    assert_eq!(resolve_driver(None, Some(&assigned)).as_deref(), Some("D1"));
    assert_eq!(resolve_driver(Some(""), None), None);

    // No ride location yet: fall back to the tracker.
    let tracked = fix(2.0);
    assert_eq!(resolve_coord(Some(&assigned), Some(&tracked)).map(|c| c.lat), Some(2.0));

    let located = rides.attach_location(ride.ride_id, fix(1.0)).await.unwrap();
    assert_eq!(resolve_coord(Some(&located), Some(&tracked)).map(|c| c.lat), Some(1.0));
    assert_eq!(resolve_coord(None, None), None);
  }

  #[test]
  fn kind_tags() {
    let json = serde_json::to_value(AlertKind::PassengerSuspicious).unwrap();
    assert_eq!(json, "passenger_suspicious");
    assert_eq!("danger".parse::<AlertKind>().unwrap(), AlertKind::Danger);
  }
}
