//! Driver presence and tracking, chat relay, profiles, sessions, push
//! registrations and route lookups.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::Coordinator;
use crate::{
  Error, Result,
  channel::{Channel, ConnectionId},
  collab::{CollaboratorError, Route},
  directory::{DriverProfile, NewDriverProfile, PushSubscription, Role, Session},
  event::{Event, RideUpdate},
  location::{ActiveDriver, Coord, DriverLocation},
  snapshot::SnapshotStore,
};

impl<S: SnapshotStore + 'static> Coordinator<S> {
  /// Ingest a position fix from `driver_id`.
  ///
  /// The fix is relayed on the driver's channel (skipping `origin`, the
  /// connection that sent it) and copied into every live ride the driver
  /// holds. Returns the ids of those rides.
  pub async fn report_location(
    &self,
    origin: Option<ConnectionId>,
    driver_id: &str,
    location: DriverLocation,
  ) -> Result<Vec<Uuid>> {
    if driver_id.is_empty() {
      return Err(Error::InvalidArgument("missing_driverId".into()));
    }
    if !location.coord().is_finite() {
      return Err(Error::InvalidArgument("invalid_coordinates".into()));
    }
    let inner = &self.inner;
    inner.tracker.update(driver_id, location.clone()).await;

    let channel = Channel::Driver(driver_id.to_owned());
    let event = Event::Location(location.clone());
    match origin {
      Some(conn) => inner.channels.publish_except(&channel, event, conn).await,
      None => inner.channels.publish(&channel, event).await,
    };

    let ride_ids = inner.rides.attach_driver_location(driver_id, &location).await;
    for &ride_id in &ride_ids {
      inner
        .channels
        .publish(
          &Channel::Ride(ride_id),
          Event::RideUpdate(RideUpdate::Location {
            ride_id,
            last_location: location.clone(),
          }),
        )
        .await;
    }
    Ok(ride_ids)
  }

  /// Relay a chat line to everyone on the ride's channel, unmodified.
  pub async fn relay_chat(&self, ride_id: Uuid, message: String, from: Option<String>) -> usize {
    self
      .inner
      .channels
      .publish(&Channel::Ride(ride_id), Event::ChatMessage {
        message,
        from,
        timestamp: Utc::now(),
      })
      .await
  }

  /// Drivers with a fresh, finite fix.
  pub async fn active_drivers(&self) -> Vec<ActiveDriver> {
    self
      .inner
      .tracker
      .list_active(Utc::now(), self.inner.config.location_ttl)
      .await
  }

  /// Drivers with at least one live driver connection.
  pub async fn online_drivers(&self) -> Vec<String> { self.inner.channels.online_drivers().await }

  /// Cached fix for `driver_id`, however old.
  pub async fn last_location(&self, driver_id: &str) -> Result<Option<DriverLocation>> {
    if driver_id.is_empty() {
      return Err(Error::InvalidArgument("missing_driverId".into()));
    }
    Ok(self.inner.tracker.get(driver_id).await)
  }

  // ── Profiles ──────────────────────────────────────────────────────────────

  pub async fn register_driver(&self, input: NewDriverProfile) -> Result<DriverProfile> {
    let profile = self.inner.directory.register_driver(input).await?;
    self.persist().await?;
    info!(driver_id = %profile.driver_id, "driver registered");
    Ok(profile)
  }

  pub async fn get_driver(&self, driver_id: &str) -> Result<DriverProfile> {
    self.inner.directory.get_driver(driver_id).await
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// Store a session under `token`. Driver sessions must name the driver.
  pub async fn open_session(
    &self,
    token: String,
    role: Role,
    subject: Option<String>,
  ) -> Result<Session> {
    let subject = subject.filter(|s| !s.is_empty());
    if role == Role::Driver && subject.is_none() {
      return Err(Error::InvalidArgument("missing_driverId".into()));
    }
    let session = self.inner.directory.open_session(token, role, subject).await;
    self.persist().await?;
    info!(%role, "session opened");
    Ok(session)
  }

  /// Returns whether a session existed.
  pub async fn close_session(&self, token: &str) -> Result<bool> {
    let closed = self.inner.directory.close_session(token).await;
    if closed {
      self.persist().await?;
    }
    Ok(closed)
  }

  pub async fn session(&self, token: &str) -> Result<Session> {
    self.inner.directory.session(token).await
  }

  // ── Push ──────────────────────────────────────────────────────────────────

  /// Returns `true` when the endpoint was not yet registered.
  pub async fn subscribe_push(&self, subscription: PushSubscription) -> Result<bool> {
    let added = self.inner.directory.add_push_subscription(subscription).await?;
    self.persist().await?;
    debug!(added, "push subscription stored");
    Ok(added)
  }

  // ── Routing ───────────────────────────────────────────────────────────────

  pub async fn route(&self, from: Coord, to: Coord) -> Result<Route, CollaboratorError> {
    self.inner.collaborators.router.route(from, to).await
  }
}
