//! Ride lifecycle: creation, enrichment, assignment, status and rating.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Coordinator;
use crate::{
  Error, Result,
  channel::Channel,
  collab::Outbound,
  dispatch::{self, Candidate, DispatchPolicy},
  event::{Event, RideUpdate},
  location::{Coord, DriverLocation},
  ride::{NewRide, Rating, Ride, RideStatus},
  snapshot::SnapshotStore,
};

/// Which status write path to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMode {
  /// Checked against the lifecycle state machine.
  Validated,
  /// Administrative: writes whatever it is given.
  Override,
}

/// A dispatch preview for one ride.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
  pub driver_id:   String,
  pub policy:      DispatchPolicy,
  pub distance_km: Option<f64>,
  pub score:       f64,
  pub eta_min:     Option<u32>,
}

impl<S: SnapshotStore + 'static> Coordinator<S> {
  /// Create a ride, offer it to every online driver and tell the
  /// dispatcher. Geocoding runs in the background and never fails the call.
  pub async fn create_ride(&self, input: NewRide) -> Result<Ride> {
    let ride = self.inner.rides.create(input).await;
    self.persist().await?;
    info!(ride_id = %ride.ride_id, "ride requested");

    self
      .inner
      .channels
      .publish(&Channel::Drivers, Event::RideOffer(ride.clone()))
      .await;

    let summary = self.ride_summary(&ride);
    self.notify(Outbound::Telegram { text: summary.clone() });
    self.notify(Outbound::Dispatcher { text: summary });
    self
      .push(json!({
        "type": "ride_offer",
        "title": "New ride",
        "body": format!("{} → {}", ride.pickup_text, ride.dest_text),
        "rideId": ride.ride_id,
      }))
      .await;

    let hub = self.clone();
    let ride_id = ride.ride_id;
    tokio::spawn(async move { hub.enrich_ride(ride_id).await });

    Ok(ride)
  }

  fn ride_summary(&self, ride: &Ride) -> String {
    format!(
      "New ride {}\nPickup: {}\nDestination: {}\nRider: {} ({})\nTrack: {}",
      ride.ride_id,
      ride.pickup_text,
      ride.dest_text,
      ride.rider_name,
      ride.rider_phone,
      self.track_url(ride.ride_id),
    )
  }

  /// Geocode both endpoints, publish the route, and auto-dispatch when
  /// enabled. Failures are logged and otherwise ignored.
  pub async fn enrich_ride(&self, ride_id: Uuid) {
    let Ok(ride) = self.inner.rides.get(ride_id).await else {
      return;
    };
    let pickup = self.geocode(&ride.pickup_text).await;
    let dest = self.geocode(&ride.dest_text).await;
    if pickup.is_none() && dest.is_none() {
      debug!(%ride_id, "neither endpoint geocoded");
      return;
    }

    let ride = match self.inner.rides.attach_coords(ride_id, pickup, dest).await {
      Ok(ride) => ride,
      Err(e) => {
        warn!(%ride_id, error = %e, "could not attach coordinates");
        return;
      }
    };
    if let Err(e) = self.persist().await {
      warn!(%ride_id, error = %e, "snapshot after geocoding failed");
    }
    self
      .inner
      .channels
      .publish(
        &Channel::Ride(ride_id),
        Event::RideUpdate(RideUpdate::Route {
          ride_id,
          pickup_coord: ride.pickup_coord,
          dest_coord: ride.dest_coord,
        }),
      )
      .await;

    if self.inner.config.auto_dispatch && ride.status == RideStatus::Requested {
      self.auto_dispatch(&ride).await;
    }
  }

  /// One lookup, then one retry with the fallback suffix.
  async fn geocode(&self, text: &str) -> Option<Coord> {
    let text = text.trim();
    if text.is_empty() {
      return None;
    }
    let geocoder = &self.inner.collaborators.geocoder;
    if let Some(coord) = geocoder.geocode(text).await.filter(Coord::is_finite) {
      return Some(coord);
    }
    let suffix = self.inner.config.geocode_fallback_suffix.as_deref()?;
    let retry = format!("{text}{suffix}");
    geocoder.geocode(&retry).await.filter(Coord::is_finite)
  }

  async fn auto_dispatch(&self, ride: &Ride) {
    let ride_id = ride.ride_id;
    let Some(pickup) = ride.pickup_coord else {
      return;
    };
    let candidates = self.candidates().await;
    let policy = self.inner.config.dispatch_policy;
    let Some(selection) = dispatch::select(pickup, &candidates, policy) else {
      info!(%ride_id, %policy, "no driver available for auto-dispatch");
      return;
    };
    let driver_id = selection.candidate.driver_id.clone();
    let eta_sec = selection
      .distance_km
      .map(|km| dispatch::estimate_eta_minutes(km) * 60);

    match self.accept_ride(ride_id, &driver_id, None, None).await {
      Ok(_) => info!(%ride_id, %driver_id, %policy, "auto-dispatched"),
      Err(e) => {
        debug!(%ride_id, error = %e, "auto-dispatch lost the ride");
        return;
      }
    }
    if let Some(eta) = eta_sec {
      let updated = self.update_status(ride_id, None, Some(eta), StatusMode::Validated).await;
      if let Err(e) = updated {
        warn!(%ride_id, error = %e, "could not record auto-dispatch ETA");
      }
    }
  }

  /// Active drivers not already holding a live ride, each rated by the
  /// mean of their rated rides.
  async fn candidates(&self) -> Vec<Candidate> {
    let now = Utc::now();
    let active = self
      .inner
      .tracker
      .list_active(now, self.inner.config.location_ttl)
      .await;
    let ratings = self.inner.rides.driver_ratings().await;
    let busy = self.inner.rides.busy_drivers().await;
    active
      .into_iter()
      .filter(|a| !busy.contains(&a.driver_id))
      .map(|a| Candidate {
        position:  Some(a.location.coord()),
        rating:    ratings.get(&a.driver_id).copied(),
        driver_id: a.driver_id,
      })
      .collect()
  }

  /// Preview which driver `policy` (or the configured one) would pick.
  pub async fn suggest_driver(
    &self,
    ride_id: Uuid,
    policy: Option<DispatchPolicy>,
  ) -> Result<Option<Suggestion>> {
    let ride = self.inner.rides.get(ride_id).await?;
    let pickup = ride
      .pickup_coord
      .ok_or_else(|| Error::InvalidArgument("pickup_not_geocoded".into()))?;
    let policy = policy.unwrap_or(self.inner.config.dispatch_policy);
    let candidates = self.candidates().await;
    Ok(dispatch::select(pickup, &candidates, policy).map(|s| Suggestion {
      driver_id: s.candidate.driver_id.clone(),
      policy,
      distance_km: s.distance_km,
      score: s.score,
      eta_min: s.distance_km.map(dispatch::estimate_eta_minutes),
    }))
  }

  /// First-wins acceptance by a driver.
  ///
  /// The driver's phone falls back to their registered profile and the
  /// location to their cached fix, if that fix is still fresh.
  pub async fn accept_ride(
    &self,
    ride_id: Uuid,
    driver_id: &str,
    driver_phone: Option<String>,
    location: Option<DriverLocation>,
  ) -> Result<Ride> {
    let location = location.filter(|l| l.coord().is_finite());
    let driver_phone = match driver_phone.filter(|p| !p.is_empty()) {
      Some(phone) => Some(phone),
      None => self
        .inner
        .directory
        .find_driver(driver_id)
        .await
        .map(|p| p.phone)
        .filter(|p| !p.is_empty()),
    };
    let ride_location = match &location {
      Some(loc) => Some(loc.clone()),
      None => {
        let ttl = self.inner.config.location_ttl;
        let now = Utc::now();
        self
          .inner
          .tracker
          .get(driver_id)
          .await
          .filter(|cached| now - cached.timestamp < ttl)
      }
    };

    let ride = self
      .inner
      .rides
      .try_assign(ride_id, driver_id, driver_phone, ride_location)
      .await?;
    if let Some(loc) = location {
      self.inner.tracker.update(driver_id, loc).await;
    }
    self.persist().await?;
    info!(%ride_id, driver_id, "ride accepted");

    self.publish_assigned(&ride, driver_id).await;
    self.announce_taken(&ride, driver_id).await;
    Ok(ride)
  }

  /// Dispatcher assignment: always records the driver, advancing the
  /// status only from `requested`.
  pub async fn assign_ride(
    &self,
    ride_id: Uuid,
    driver_id: &str,
    driver_phone: Option<String>,
  ) -> Result<Ride> {
    let ride = self
      .inner
      .rides
      .assign(ride_id, driver_id, driver_phone.filter(|p| !p.is_empty()))
      .await?;
    self.persist().await?;
    info!(%ride_id, driver_id, "ride assigned by dispatcher");

    // Only the ride's watchers hear about an override.
    self.publish_assigned(&ride, driver_id).await;
    Ok(ride)
  }

  async fn publish_assigned(&self, ride: &Ride, driver_id: &str) {
    let ride_id = ride.ride_id;
    self
      .inner
      .channels
      .publish(
        &Channel::Ride(ride_id),
        Event::RideUpdate(RideUpdate::Assigned {
          ride_id,
          driver_id: driver_id.to_owned(),
        }),
      )
      .await;
  }

  /// Withdraw the offer from other drivers and tell the rider.
  async fn announce_taken(&self, ride: &Ride, driver_id: &str) {
    let ride_id = ride.ride_id;
    self
      .inner
      .channels
      .publish(&Channel::Drivers, Event::RideTaken {
        ride_id,
        driver_id: driver_id.to_owned(),
      })
      .await;
    self
      .push(json!({
        "type": "ride_assigned",
        "title": "Driver on the way",
        "body": format!("Driver {driver_id} accepted your ride"),
        "rideId": ride_id,
      }))
      .await;
  }

  /// Change status and/or ETA. At least one must be present.
  pub async fn update_status(
    &self,
    ride_id: Uuid,
    status: Option<RideStatus>,
    eta_sec: Option<u32>,
    mode: StatusMode,
  ) -> Result<Ride> {
    if status.is_none() && eta_sec.is_none() {
      return Err(Error::InvalidArgument("missing_status".into()));
    }
    let rides = &self.inner.rides;
    let ride = match mode {
      StatusMode::Validated => rides.advance_status(ride_id, status, eta_sec).await?,
      StatusMode::Override => rides.update_status(ride_id, status, eta_sec).await?,
    };
    self.persist().await?;
    if let Some(status) = status {
      info!(%ride_id, %status, ?mode, "ride status changed");
    }

    let event = Event::RideUpdate(RideUpdate::Status {
      ride_id,
      status: ride.status,
      eta_sec: ride.eta_sec,
    });
    let channels = &self.inner.channels;
    channels.publish(&Channel::Ride(ride_id), event.clone()).await;
    if let Some(driver_id) = &ride.driver_id {
      channels.publish(&Channel::Driver(driver_id.clone()), event).await;
    }

    if status == Some(RideStatus::Arrived) {
      self
        .push(json!({
          "type": "ride_arrived",
          "title": "Your driver has arrived",
          "body": ride.pickup_text,
          "rideId": ride_id,
        }))
        .await;
    }
    Ok(ride)
  }

  /// Record a 1–5 star rating with optional tip and comment.
  pub async fn rate_ride(&self, ride_id: Uuid, rating: Rating) -> Result<Ride> {
    if !(1..=5).contains(&rating.stars) {
      return Err(Error::InvalidArgument("invalid_rating".into()));
    }
    if rating.tip.is_some_and(|t| !t.is_finite() || t < 0.0) {
      return Err(Error::InvalidArgument("invalid_tip".into()));
    }
    let ride = self.inner.rides.rate(ride_id, rating).await?;
    self.persist().await?;
    Ok(ride)
  }

  pub async fn get_ride(&self, ride_id: Uuid) -> Result<Ride> { self.inner.rides.get(ride_id).await }

  /// Every ride, newest first.
  pub async fn list_rides(&self) -> Vec<Ride> { self.inner.rides.list().await }
}
