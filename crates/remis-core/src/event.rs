//! Events fanned out over the channel registry.
//!
//! On the wire an event is `{"event": "<name>", "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  alert::Alert,
  location::{Coord, DriverLocation},
  ride::{Ride, RideStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
  tag = "event",
  content = "data",
  rename_all = "snake_case",
  rename_all_fields = "camelCase"
)]
pub enum Event {
  /// A new ride, offered to every online driver.
  RideOffer(Ride),
  /// A ride left the offer pool.
  RideTaken { ride_id: Uuid, driver_id: String },
  RideUpdate(RideUpdate),
  /// A driver's connection came up or went down.
  DriverStatus { online: bool },
  /// A raw position fix relayed on the driver's own channel.
  Location(DriverLocation),
  ChatMessage {
    message:   String,
    from:      Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
  },
  SuspiciousActivity(Alert),
  GlobalAlert(Alert),
  DriverAlert(Alert),
  AlertResolved { alert_id: Uuid },
}

/// Per-ride change notifications, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RideUpdate {
  Route {
    ride_id:      Uuid,
    pickup_coord: Option<Coord>,
    dest_coord:   Option<Coord>,
  },
  Assigned { ride_id: Uuid, driver_id: String },
  Status {
    ride_id: Uuid,
    status:  RideStatus,
    eta_sec: Option<u32>,
  },
  Location {
    ride_id:       Uuid,
    last_location: DriverLocation,
  },
}

impl Event {
  /// The event name clients subscribe to.
  pub fn name(&self) -> &'static str {
    match self {
      Self::RideOffer(_) => "ride_offer",
      Self::RideTaken { .. } => "ride_taken",
      Self::RideUpdate(_) => "ride_update",
      Self::DriverStatus { .. } => "driver_status",
      Self::Location(_) => "location",
      Self::ChatMessage { .. } => "chat_message",
      Self::SuspiciousActivity(_) => "suspicious_activity",
      Self::GlobalAlert(_) => "global_alert",
      Self::DriverAlert(_) => "driver_alert",
      Self::AlertResolved { .. } => "alert_resolved",
    }
  }
}
