//! Safety alerts: raising, fan-out, notification and resolution.

use tracing::{info, warn};
use uuid::Uuid;

use super::Coordinator;
use crate::{
  Result,
  alert::{self, Alert, AlertKind, NewAlert},
  channel::Channel,
  collab::Outbound,
  event::Event,
  ride::Ride,
  snapshot::SnapshotStore,
};

/// A safety report from a rider, driver or dispatcher.
#[derive(Debug, Clone)]
pub struct AlertReport {
  pub ride_id:     Option<Uuid>,
  pub kind:        AlertKind,
  pub description: String,
  /// Driver who raised it, when a driver did.
  pub reporter:    Option<String>,
}

impl<S: SnapshotStore + 'static> Coordinator<S> {
  /// Record an alert and fan it out: the ride's channel, the system-wide
  /// alert channel, Telegram, and SMS to the emergency contacts on file.
  pub async fn raise_alert(&self, report: AlertReport) -> Result<Alert> {
    let inner = &self.inner;
    let ride = match report.ride_id {
      Some(id) => inner.rides.get(id).await.ok(),
      None => None,
    };
    let driver_id = alert::resolve_driver(report.reporter.as_deref(), ride.as_ref());
    let tracked = match &driver_id {
      Some(id) => inner.tracker.get(id).await,
      None => None,
    };
    let last_coord = alert::resolve_coord(ride.as_ref(), tracked.as_ref());

    let alert = inner
      .alerts
      .raise(NewAlert {
        ride_id: report.ride_id,
        kind: report.kind,
        description: report.description,
        driver_id,
        last_coord,
      })
      .await;
    self.persist().await?;
    warn!(alert_id = %alert.alert_id, kind = %alert.kind, "safety alert raised");

    if let Some(ride_id) = alert.ride_id {
      inner
        .channels
        .publish(&Channel::Ride(ride_id), Event::SuspiciousActivity(alert.clone()))
        .await;
    }
    inner
      .channels
      .publish(&Channel::Alerts, Event::GlobalAlert(alert.clone()))
      .await;

    self.notify_alert(&alert, ride.as_ref()).await;
    Ok(alert)
  }

  /// A driver's panic button: a `danger` alert also broadcast to every
  /// online driver.
  pub async fn raise_driver_alert(
    &self,
    driver_id: &str,
    ride_id: Option<Uuid>,
    description: Option<String>,
  ) -> Result<Alert> {
    let alert = self
      .raise_alert(AlertReport {
        ride_id,
        kind: AlertKind::Danger,
        description: description
          .filter(|d| !d.is_empty())
          .unwrap_or_else(|| format!("Driver {driver_id} pressed the panic button")),
        reporter: Some(driver_id.to_owned()),
      })
      .await?;
    self
      .inner
      .channels
      .publish(&Channel::Drivers, Event::DriverAlert(alert.clone()))
      .await;
    Ok(alert)
  }

  async fn notify_alert(&self, alert: &Alert, ride: Option<&Ride>) {
    let text = alert_message(alert, ride);
    self.notify(Outbound::Telegram { text: text.clone() });

    let mut contacts: Vec<String> = Vec::new();
    if let Some(ride) = ride {
      contacts.push(ride.emergency_contact.clone());
    }
    if let Some(driver_id) = &alert.driver_id {
      if let Some(profile) = self.inner.directory.find_driver(driver_id).await {
        contacts.push(profile.emergency_contact);
      }
    }
    contacts.retain(|c| !c.trim().is_empty());
    contacts.dedup();
    for to in contacts {
      self.notify(Outbound::Sms { to, text: text.clone() });
    }
  }

  pub async fn resolve_alert(&self, alert_id: Uuid) -> Result<Alert> {
    let alert = self.inner.alerts.resolve(alert_id).await?;
    self.persist().await?;
    info!(%alert_id, "alert resolved");
    self
      .inner
      .channels
      .publish(&Channel::Alerts, Event::AlertResolved { alert_id })
      .await;
    Ok(alert)
  }

  pub async fn get_alert(&self, alert_id: Uuid) -> Result<Alert> {
    self.inner.alerts.get(alert_id).await
  }

  pub async fn active_alerts(&self) -> Vec<Alert> { self.inner.alerts.list_active().await }

  pub async fn all_alerts(&self) -> Vec<Alert> { self.inner.alerts.list_all().await }
}

/// Human-readable alert text for Telegram and SMS.
fn alert_message(alert: &Alert, ride: Option<&Ride>) -> String {
  let mut text = format!("ALERT [{}]: {}", alert.kind, alert.description);
  if let Some(ride) = ride {
    text.push_str(&format!(
      "\nRide {} ({} → {})\nRider: {} {}",
      ride.ride_id, ride.pickup_text, ride.dest_text, ride.rider_name, ride.rider_phone
    ));
  }
  if let Some(driver_id) = &alert.driver_id {
    text.push_str(&format!("\nDriver: {driver_id}"));
  }
  if let Some(coord) = alert.last_coord {
    text.push_str(&format!(
      "\nLast position: https://maps.google.com/?q={},{}",
      coord.lat, coord.lng
    ));
  }
  text
}
