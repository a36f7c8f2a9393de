//! Ride entities and the [`RideStore`] that owns them.
//!
//! Lifecycle: `requested → assigned → arrived → completed`, plus
//! cancellation from any non-terminal state. The only transition guarded
//! against concurrent callers is `requested → assigned`
//! ([`RideStore::try_assign`]): the check and the write happen under one
//! write lock, so the first acceptance wins.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
  Error, Result,
  location::{Coord, DriverLocation},
};

// ─── Status ──────────────────────────────────────────────────────────────────

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
pub enum RideStatus {
  Requested,
  Assigned,
  Arrived,
  Completed,
  Canceled,
}

impl RideStatus {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Canceled) }

  /// Whether the state machine permits moving from `self` to `next`.
  ///
  /// Re-asserting the current non-terminal state is allowed so that an ETA
  /// refresh can carry the status along.
  pub fn can_transition_to(self, next: Self) -> bool {
    use RideStatus::*;
    match (self, next) {
      (a, b) if a == b => !a.is_terminal(),
      (Requested, Assigned) | (Assigned, Arrived) | (Arrived, Completed) => true,
      (Requested | Assigned | Arrived, Canceled) => true,
      _ => false,
    }
  }

  /// States in which a ride must carry a driver.
  pub fn requires_driver(self) -> bool {
    matches!(self, Self::Assigned | Self::Arrived | Self::Completed)
  }
}

// ─── Ride ────────────────────────────────────────────────────────────────────

/// One rider request from creation to a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
  pub ride_id:           Uuid,
  pub status:            RideStatus,
  pub created_at:        DateTime<Utc>,
  #[serde(rename = "name")]
  pub rider_name:        String,
  #[serde(rename = "phone")]
  pub rider_phone:       String,
  pub emergency_contact: String,
  pub pickup_text:       String,
  pub dest_text:         String,
  /// Filled in asynchronously once geocoding succeeds.
  pub pickup_coord:      Option<Coord>,
  pub dest_coord:        Option<Coord>,
  pub driver_id:         Option<String>,
  pub driver_phone:      Option<String>,
  pub last_location:     Option<DriverLocation>,
  pub eta_sec:           Option<u32>,
  pub rating:            Option<u8>,
  pub tip:               Option<f64>,
  pub comment:           Option<String>,
  pub rated_at:          Option<DateTime<Utc>>,
}

/// Input to [`RideStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewRide {
  pub pickup_text:       String,
  pub dest_text:         String,
  pub rider_name:        String,
  pub rider_phone:       String,
  pub emergency_contact: String,
}

/// Input to [`RideStore::rate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
  pub stars:   u8,
  pub tip:     Option<f64>,
  pub comment: Option<String>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Authoritative map of ride entities.
#[derive(Debug, Default)]
pub struct RideStore {
  rides: RwLock<HashMap<Uuid, Ride>>,
}

impl RideStore {
  pub fn new() -> Self { Self::default() }

  pub fn restore(rides: BTreeMap<Uuid, Ride>) -> Self {
    Self { rides: RwLock::new(rides.into_iter().collect()) }
  }

  /// Allocate a new ride in the `requested` state with no driver.
  pub async fn create(&self, input: NewRide) -> Ride {
    let ride = Ride {
      ride_id:           Uuid::new_v4(),
      status:            RideStatus::Requested,
      created_at:        Utc::now(),
      rider_name:        input.rider_name,
      rider_phone:       input.rider_phone,
      emergency_contact: input.emergency_contact,
      pickup_text:       input.pickup_text,
      dest_text:         input.dest_text,
      pickup_coord:      None,
      dest_coord:        None,
      driver_id:         None,
      driver_phone:      None,
      last_location:     None,
      eta_sec:           None,
      rating:            None,
      tip:               None,
      comment:           None,
      rated_at:          None,
    };
    self.rides.write().await.insert(ride.ride_id, ride.clone());
    ride
  }

  /// First-wins acceptance. Succeeds only while the ride is `requested`;
  /// otherwise returns [`Error::AlreadyTaken`] naming the current holder and
  /// leaves the ride untouched.
  pub async fn try_assign(
    &self,
    ride_id: Uuid,
    driver_id: &str,
    driver_phone: Option<String>,
    location: Option<DriverLocation>,
  ) -> Result<Ride> {
    require_driver_id(driver_id)?;
    let mut rides = self.rides.write().await;
    let ride = rides.get_mut(&ride_id).ok_or(Error::RideNotFound(ride_id))?;

    if ride.status != RideStatus::Requested {
      return Err(Error::AlreadyTaken {
        ride_id,
        driver_id: ride.driver_id.clone(),
      });
    }

    ride.status = RideStatus::Assigned;
    ride.driver_id = Some(driver_id.to_owned());
    if driver_phone.is_some() {
      ride.driver_phone = driver_phone;
    }
    if let Some(location) = location.filter(|l| l.coord().is_finite()) {
      ride.last_location = Some(location);
    }
    Ok(ride.clone())
  }

  /// Administrative assignment: always sets the driver, and advances the
  /// status only when the ride is still `requested`.
  pub async fn assign(
    &self,
    ride_id: Uuid,
    driver_id: &str,
    driver_phone: Option<String>,
  ) -> Result<Ride> {
    require_driver_id(driver_id)?;
    let mut rides = self.rides.write().await;
    let ride = rides.get_mut(&ride_id).ok_or(Error::RideNotFound(ride_id))?;

    ride.driver_id = Some(driver_id.to_owned());
    if ride.status == RideStatus::Requested {
      ride.status = RideStatus::Assigned;
    }
    if driver_phone.is_some() {
      ride.driver_phone = driver_phone;
    }
    Ok(ride.clone())
  }

  /// Permissive status/ETA write: sets whichever fields are present without
  /// consulting the state machine.
  pub async fn update_status(
    &self,
    ride_id: Uuid,
    status: Option<RideStatus>,
    eta_sec: Option<u32>,
  ) -> Result<Ride> {
    let mut rides = self.rides.write().await;
    let ride = rides.get_mut(&ride_id).ok_or(Error::RideNotFound(ride_id))?;
    if let Some(eta) = eta_sec {
      ride.eta_sec = Some(eta);
    }
    if let Some(status) = status {
      ride.status = status;
    }
    Ok(ride.clone())
  }

  /// Validated status/ETA write. Rejects any status change the state machine
  /// does not allow, and refuses to enter a driver-bearing state without a
  /// driver. Cancelling releases the driver.
  pub async fn advance_status(
    &self,
    ride_id: Uuid,
    status: Option<RideStatus>,
    eta_sec: Option<u32>,
  ) -> Result<Ride> {
    let mut rides = self.rides.write().await;
    let ride = rides.get_mut(&ride_id).ok_or(Error::RideNotFound(ride_id))?;

    if let Some(next) = status {
      let legal = ride.status.can_transition_to(next)
        && (!next.requires_driver() || ride.driver_id.is_some());
      if !legal {
        return Err(Error::IllegalTransition { from: ride.status, to: next });
      }
    }

    if let Some(eta) = eta_sec {
      ride.eta_sec = Some(eta);
    }
    if let Some(next) = status {
      ride.status = next;
      if next == RideStatus::Canceled {
        ride.driver_id = None;
        ride.driver_phone = None;
      }
    }
    Ok(ride.clone())
  }

  /// Overwrite the ride's last known location unconditionally.
  pub async fn attach_location(
    &self,
    ride_id: Uuid,
    location: DriverLocation,
  ) -> Result<Ride> {
    let mut rides = self.rides.write().await;
    let ride = rides.get_mut(&ride_id).ok_or(Error::RideNotFound(ride_id))?;
    ride.last_location = Some(location);
    Ok(ride.clone())
  }

  /// Copy `location` into every non-terminal ride held by `driver_id`.
  /// Returns the ids of the rides touched.
  pub async fn attach_driver_location(
    &self,
    driver_id: &str,
    location: &DriverLocation,
  ) -> Vec<Uuid> {
    let mut rides = self.rides.write().await;
    rides
      .values_mut()
      .filter(|r| r.driver_id.as_deref() == Some(driver_id) && !r.status.is_terminal())
      .map(|r| {
        r.last_location = Some(location.clone());
        r.ride_id
      })
      .collect()
  }

  /// Record the geocoded endpoints. `None` leaves the existing value alone.
  pub async fn attach_coords(
    &self,
    ride_id: Uuid,
    pickup: Option<Coord>,
    dest: Option<Coord>,
  ) -> Result<Ride> {
    let mut rides = self.rides.write().await;
    let ride = rides.get_mut(&ride_id).ok_or(Error::RideNotFound(ride_id))?;
    if pickup.is_some() {
      ride.pickup_coord = pickup;
    }
    if dest.is_some() {
      ride.dest_coord = dest;
    }
    Ok(ride.clone())
  }

  /// Set the rating fields regardless of the ride's status.
  // TODO: decide whether rating a ride that is not `completed` should be
  // rejected; today any existing ride can be rated.
  pub async fn rate(&self, ride_id: Uuid, rating: Rating) -> Result<Ride> {
    let mut rides = self.rides.write().await;
    let ride = rides.get_mut(&ride_id).ok_or(Error::RideNotFound(ride_id))?;
    ride.rating = Some(rating.stars);
    ride.tip = Some(rating.tip.unwrap_or(0.0));
    ride.comment = Some(rating.comment.unwrap_or_default());
    ride.rated_at = Some(Utc::now());
    Ok(ride.clone())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn get(&self, ride_id: Uuid) -> Result<Ride> {
    self
      .rides
      .read()
      .await
      .get(&ride_id)
      .cloned()
      .ok_or(Error::RideNotFound(ride_id))
  }

  /// All rides, newest first.
  pub async fn list(&self) -> Vec<Ride> {
    let mut rides: Vec<Ride> = self.rides.read().await.values().cloned().collect();
    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rides
  }

  /// Mean star rating per driver over every rated ride they held.
  pub async fn driver_ratings(&self) -> HashMap<String, f64> {
    let rides = self.rides.read().await;
    let mut sums: HashMap<String, (f64, u32)> = HashMap::new();
    for ride in rides.values() {
      if let (Some(driver), Some(stars)) = (&ride.driver_id, ride.rating) {
        let entry = sums.entry(driver.clone()).or_default();
        entry.0 += f64::from(stars);
        entry.1 += 1;
      }
    }
    sums
      .into_iter()
      .map(|(driver, (sum, n))| (driver, sum / f64::from(n)))
      .collect()
  }

  /// Drivers holding a ride that has not reached a terminal state.
  pub async fn busy_drivers(&self) -> HashSet<String> {
    self
      .rides
      .read()
      .await
      .values()
      .filter(|r| !r.status.is_terminal())
      .filter_map(|r| r.driver_id.clone())
      .collect()
  }

  pub async fn snapshot(&self) -> BTreeMap<Uuid, Ride> {
    self
      .rides
      .read()
      .await
      .iter()
      .map(|(k, v)| (*k, v.clone()))
      .collect()
  }
}

fn require_driver_id(driver_id: &str) -> Result<()> {
  if driver_id.trim().is_empty() {
    return Err(Error::InvalidArgument("missing_driverId".into()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  fn new_ride() -> NewRide {
    NewRide {
      pickup_text: "Main St".into(),
      dest_text: "Oak Ave".into(),
      rider_name: "Ana".into(),
      rider_phone: "+5491100000000".into(),
      emergency_contact: "+5491100000001".into(),
    }
  }

  fn fix(lat: f64, lng: f64) -> DriverLocation {
    DriverLocation {
      lat,
      lng,
      accuracy: Some(5.0),
      heading: None,
      speed: None,
      timestamp: Utc::now(),
    }
  }

  // ─── State machine ─────────────────────────────────────────────────────────

  #[test]
  fn forward_transitions() {
    use RideStatus::*;
    assert!(Requested.can_transition_to(Assigned));
    assert!(Assigned.can_transition_to(Arrived));
    assert!(Arrived.can_transition_to(Completed));
    assert!(!Requested.can_transition_to(Arrived));
    assert!(!Assigned.can_transition_to(Completed));
    assert!(!Arrived.can_transition_to(Assigned));
  }

  #[test]
  fn cancellation_and_terminality() {
    use RideStatus::*;
    for from in [Requested, Assigned, Arrived] {
      assert!(from.can_transition_to(Canceled), "{from} -> canceled");
    }
    for from in [Completed, Canceled] {
      for to in [Requested, Assigned, Arrived, Completed, Canceled] {
        assert!(!from.can_transition_to(to), "{from} -> {to}");
      }
    }
  }

  #[test]
  fn status_parses_lowercase() {
    assert_eq!("arrived".parse::<RideStatus>().unwrap(), RideStatus::Arrived);
    assert!("en_route".parse::<RideStatus>().is_err());
    assert_eq!(RideStatus::Canceled.to_string(), "canceled");
  }

  // ─── Store ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_starts_requested_without_driver() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;
    assert_eq!(ride.status, RideStatus::Requested);
    assert!(ride.driver_id.is_none());
    assert!(ride.pickup_coord.is_none());
    assert_eq!(store.get(ride.ride_id).await.unwrap(), ride);
  }

  #[tokio::test]
  async fn second_accept_conflicts_naming_winner() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;

    let won = store
      .try_assign(ride.ride_id, "D1", Some("+54 9 11".into()), Some(fix(1.0, 2.0)))
      .await
      .unwrap();
    assert_eq!(won.status, RideStatus::Assigned);
    assert_eq!(won.driver_id.as_deref(), Some("D1"));
    assert_eq!(won.last_location.as_ref().map(|l| l.lat), Some(1.0));

    let lost = store.try_assign(ride.ride_id, "D2", None, None).await;
    match lost {
      Err(Error::AlreadyTaken { driver_id, .. }) => {
        assert_eq!(driver_id.as_deref(), Some("D1"))
      }
      other => panic!("expected AlreadyTaken, got {other:?}"),
    }
    assert_eq!(store.get(ride.ride_id).await.unwrap(), won);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_accepts_have_exactly_one_winner() {
    let store = Arc::new(RideStore::new());
    let ride_id = store.create(new_ride()).await.ride_id;

    let handles: Vec<_> = (0..32)
      .map(|i| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
          store.try_assign(ride_id, &format!("D{i}"), None, None).await
        })
      })
      .collect();

    let mut winners = Vec::new();
    let mut conflicts = Vec::new();
    for handle in handles {
      match handle.await.unwrap() {
        Ok(r) => winners.push(r.driver_id.unwrap()),
        Err(Error::AlreadyTaken { driver_id, .. }) => conflicts.push(driver_id),
        Err(e) => panic!("unexpected error {e}"),
      }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts.len(), 31);
    assert!(conflicts.iter().all(|d| d.as_deref() == Some(winners[0].as_str())));
  }

  #[tokio::test]
  async fn terminal_rides_never_accept() {
    let store = RideStore::new();
    for terminal in [RideStatus::Completed, RideStatus::Canceled] {
      let ride = store.create(new_ride()).await;
      store.update_status(ride.ride_id, Some(terminal), None).await.unwrap();
      assert!(matches!(
        store.try_assign(ride.ride_id, "D1", None, None).await,
        Err(Error::AlreadyTaken { .. })
      ));
    }
  }

  #[tokio::test]
  async fn accept_requires_driver_id_and_known_ride() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;
    assert!(matches!(
      store.try_assign(ride.ride_id, "  ", None, None).await,
      Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
      store.try_assign(Uuid::new_v4(), "D1", None, None).await,
      Err(Error::RideNotFound(_))
    ));
  }

  #[tokio::test]
  async fn admin_assign_overrides_driver_but_keeps_advanced_status() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;
    store.try_assign(ride.ride_id, "D1", None, None).await.unwrap();
    store.advance_status(ride.ride_id, Some(RideStatus::Arrived), None).await.unwrap();

    let reassigned = store.assign(ride.ride_id, "D9", Some("+1".into())).await.unwrap();
    assert_eq!(reassigned.driver_id.as_deref(), Some("D9"));
    assert_eq!(reassigned.status, RideStatus::Arrived);

    let fresh = store.create(new_ride()).await;
    let assigned = store.assign(fresh.ride_id, "D2", None).await.unwrap();
    assert_eq!(assigned.status, RideStatus::Assigned);
  }

  #[tokio::test]
  async fn permissive_update_accepts_backward_moves() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;
    store.update_status(ride.ride_id, Some(RideStatus::Completed), None).await.unwrap();
    let back = store
      .update_status(ride.ride_id, Some(RideStatus::Requested), Some(120))
      .await
      .unwrap();
    assert_eq!(back.status, RideStatus::Requested);
    assert_eq!(back.eta_sec, Some(120));
  }

  #[tokio::test]
  async fn validated_update_rejects_skips_and_driverless_assignment() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;

    assert!(matches!(
      store.advance_status(ride.ride_id, Some(RideStatus::Assigned), None).await,
      Err(Error::IllegalTransition { .. })
    ));
    assert!(matches!(
      store.advance_status(ride.ride_id, Some(RideStatus::Completed), None).await,
      Err(Error::IllegalTransition { .. })
    ));

    // ETA-only updates never touch the status.
    let r = store.advance_status(ride.ride_id, None, Some(300)).await.unwrap();
    assert_eq!(r.status, RideStatus::Requested);
    assert_eq!(r.eta_sec, Some(300));
  }

  #[tokio::test]
  async fn validated_cancel_releases_driver() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;
    store.try_assign(ride.ride_id, "D1", Some("+1".into()), None).await.unwrap();

    let canceled = store
      .advance_status(ride.ride_id, Some(RideStatus::Canceled), None)
      .await
      .unwrap();
    assert_eq!(canceled.status, RideStatus::Canceled);
    assert!(canceled.driver_id.is_none());
    assert!(canceled.driver_phone.is_none());

    assert!(matches!(
      store.advance_status(ride.ride_id, Some(RideStatus::Arrived), None).await,
      Err(Error::IllegalTransition { from: RideStatus::Canceled, .. })
    ));
  }

  #[tokio::test]
  async fn driver_location_only_reaches_live_rides_of_that_driver() {
    let store = RideStore::new();
    let live = store.create(new_ride()).await;
    let done = store.create(new_ride()).await;
    let other = store.create(new_ride()).await;
    store.try_assign(live.ride_id, "D1", None, None).await.unwrap();
    store.try_assign(done.ride_id, "D1", None, None).await.unwrap();
    store.update_status(done.ride_id, Some(RideStatus::Completed), None).await.unwrap();
    store.try_assign(other.ride_id, "D2", None, None).await.unwrap();

    let touched = store.attach_driver_location("D1", &fix(3.0, 4.0)).await;
    assert_eq!(touched, vec![live.ride_id]);
    assert!(store.get(done.ride_id).await.unwrap().last_location.is_none());
    assert!(store.get(other.ride_id).await.unwrap().last_location.is_none());
  }

  #[tokio::test]
  async fn rate_ignores_status_and_defaults_optional_fields() {
    let store = RideStore::new();
    let ride = store.create(new_ride()).await;

    let rated = store
      .rate(ride.ride_id, Rating { stars: 5, tip: Some(100.0), comment: None })
      .await
      .unwrap();
    assert_eq!(rated.status, RideStatus::Requested);
    assert_eq!(rated.rating, Some(5));
    assert_eq!(rated.tip, Some(100.0));
    assert_eq!(rated.comment.as_deref(), Some(""));
    assert!(rated.rated_at.is_some());

    assert!(matches!(
      store.rate(Uuid::new_v4(), Rating { stars: 4, tip: None, comment: None }).await,
      Err(Error::RideNotFound(_))
    ));
  }

  #[tokio::test]
  async fn list_is_newest_first() {
    let store = RideStore::new();
    let first = store.create(new_ride()).await;
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = store.create(new_ride()).await;

    let ids: Vec<Uuid> = store.list().await.iter().map(|r| r.ride_id).collect();
    assert_eq!(ids, vec![second.ride_id, first.ride_id]);
  }

  #[tokio::test]
  async fn driver_ratings_average_rated_rides() {
    let store = RideStore::new();
    for stars in [5, 3] {
      let ride = store.create(new_ride()).await;
      store.try_assign(ride.ride_id, "D1", None, None).await.unwrap();
      store.rate(ride.ride_id, Rating { stars, tip: None, comment: None }).await.unwrap();
    }
    let unrated = store.create(new_ride()).await;
    store.try_assign(unrated.ride_id, "D2", None, None).await.unwrap();

    let ratings = store.driver_ratings().await;
    assert_eq!(ratings.get("D1"), Some(&4.0));
    assert!(!ratings.contains_key("D2"));
  }

  #[tokio::test]
  async fn busy_drivers_hold_live_rides() {
    let store = RideStore::new();
    let live = store.create(new_ride()).await;
    store.try_assign(live.ride_id, "D1", None, None).await.unwrap();
    let done = store.create(new_ride()).await;
    store.try_assign(done.ride_id, "D2", None, None).await.unwrap();
    store
      .advance_status(done.ride_id, Some(RideStatus::Canceled), None)
      .await
      .unwrap();
    let forced = store.create(new_ride()).await;
    store.assign(forced.ride_id, "D3", None).await.unwrap();
    store
      .update_status(forced.ride_id, Some(RideStatus::Completed), None)
      .await
      .unwrap();

    let busy = store.busy_drivers().await;
    assert_eq!(busy, HashSet::from(["D1".to_owned()]));
  }

  #[test]
  fn wire_names_match_clients() {
    let ride = Ride {
      ride_id:           Uuid::nil(),
      status:            RideStatus::Requested,
      created_at:        Utc::now(),
      rider_name:        "Ana".into(),
      rider_phone:       "+1".into(),
      emergency_contact: String::new(),
      pickup_text:       "Main St".into(),
      dest_text:         "Oak Ave".into(),
      pickup_coord:      None,
      dest_coord:        None,
      driver_id:         None,
      driver_phone:      None,
      last_location:     None,
      eta_sec:           None,
      rating:            None,
      tip:               None,
      comment:           None,
      rated_at:          None,
    };
    let json = serde_json::to_value(&ride).unwrap();
    assert_eq!(json["status"], "requested");
    assert_eq!(json["name"], "Ana");
    assert_eq!(json["pickupText"], "Main St");
    assert!(json["driverId"].is_null());
  }
}
