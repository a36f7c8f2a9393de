//! Handlers for `/rides` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/rides` | Body: [`CreateBody`]; 201 + ride and tracking link |
//! | `GET`  | `/rides` | Newest first |
//! | `GET`  | `/rides/{id}` | 404 if not found |
//! | `POST` | `/rides/{id}/accept` | First-wins; 409 `already_taken` with the holder |
//! | `POST` | `/rides/{id}/assign` | Dispatcher only |
//! | `POST` | `/rides/{id}/status` | Validated transition |
//! | `POST` | `/rides/{id}/status/override` | Dispatcher only; no transition check |
//! | `POST` | `/rides/{id}/rate` | Stars 1–5, optional tip and comment |
//! | `GET`  | `/rides/{id}/suggest` | Dispatcher only; `?policy=nearest\|rating\|balanced` |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use remis_core::{
  coordinator::StatusMode,
  dispatch::DispatchPolicy,
  location::DriverLocation,
  ride::{NewRide, Rating, RideStatus},
  snapshot::SnapshotStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  extract::{Dispatcher, Id, Params, Payload},
  sanitize,
};

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBody {
  pub pickup_text:       String,
  pub dest_text:         String,
  pub name:              String,
  pub phone:             String,
  pub emergency_contact: String,
}

/// `POST /rides`
pub async fn create<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Payload(body): Payload<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let ride = state
    .hub
    .create_ride(NewRide {
      pickup_text:       sanitize::text(&body.pickup_text),
      dest_text:         sanitize::text(&body.dest_text),
      rider_name:        sanitize::text(&body.name),
      rider_phone:       sanitize::text(&body.phone),
      emergency_contact: sanitize::text(&body.emergency_contact),
    })
    .await?;
  let track_url = state.hub.track_url(ride.ride_id);
  Ok((
    StatusCode::CREATED,
    Json(json!({
      "ok": true,
      "rideId": ride.ride_id,
      "trackUrl": track_url,
      "ride": ride,
    })),
  ))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET /rides`
pub async fn list<S: SnapshotStore + 'static>(State(state): State<AppState<S>>) -> Json<Value> {
  let rides = state.hub.list_rides().await;
  Json(json!({ "ok": true, "rides": rides }))
}

/// `GET /rides/{id}`
pub async fn get_one<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Id(id): Id<Uuid>,
) -> Result<Json<Value>, ApiError> {
  let ride = state.hub.get_ride(id).await?;
  Ok(Json(json!({ "ok": true, "ride": ride })))
}

// ─── Accept / assign ──────────────────────────────────────────────────────────

/// Position reported alongside an acceptance. Missing timestamps mean "now".
#[derive(Debug, Deserialize)]
pub struct LocationBody {
  pub lat:       f64,
  pub lng:       f64,
  pub accuracy:  Option<f64>,
  pub heading:   Option<f64>,
  pub speed:     Option<f64>,
  /// Epoch milliseconds.
  pub timestamp: Option<i64>,
}

impl LocationBody {
  pub fn into_location(self) -> DriverLocation {
    DriverLocation {
      lat:       self.lat,
      lng:       self.lng,
      accuracy:  self.accuracy,
      heading:   self.heading,
      speed:     self.speed,
      timestamp: self
        .timestamp
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
  #[serde(default)]
  pub driver_id:       String,
  pub driver_phone:    Option<String>,
  pub driver_location: Option<LocationBody>,
}

/// `POST /rides/{id}/accept`
pub async fn accept<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Id(id): Id<Uuid>,
  Payload(body): Payload<AcceptBody>,
) -> Result<Json<Value>, ApiError> {
  let ride = state
    .hub
    .accept_ride(
      id,
      &sanitize::text(&body.driver_id),
      sanitize::optional(body.driver_phone.as_deref()),
      body.driver_location.map(LocationBody::into_location),
    )
    .await?;
  Ok(Json(json!({
    "ok": true,
    "rideId": ride.ride_id,
    "driverId": ride.driver_id,
    "ride": ride,
  })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
  #[serde(default)]
  pub driver_id:    String,
  pub driver_phone: Option<String>,
}

/// `POST /rides/{id}/assign`
pub async fn assign<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  _dispatcher: Dispatcher,
  Id(id): Id<Uuid>,
  Payload(body): Payload<AssignBody>,
) -> Result<Json<Value>, ApiError> {
  let ride = state
    .hub
    .assign_ride(
      id,
      &sanitize::text(&body.driver_id),
      sanitize::optional(body.driver_phone.as_deref()),
    )
    .await?;
  Ok(Json(json!({
    "ok": true,
    "rideId": ride.ride_id,
    "driverId": ride.driver_id,
    "driverPhone": ride.driver_phone,
  })))
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
  pub status:  Option<RideStatus>,
  pub eta_sec: Option<u32>,
}

async fn write_status<S: SnapshotStore + 'static>(
  state: &AppState<S>,
  id: Uuid,
  body: StatusBody,
  mode: StatusMode,
) -> Result<Json<Value>, ApiError> {
  let ride = state
    .hub
    .update_status(id, body.status, body.eta_sec, mode)
    .await?;
  Ok(Json(json!({ "ok": true, "ride": ride })))
}

/// `POST /rides/{id}/status`
pub async fn status<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Id(id): Id<Uuid>,
  Payload(body): Payload<StatusBody>,
) -> Result<Json<Value>, ApiError> {
  write_status(&state, id, body, StatusMode::Validated).await
}

/// `POST /rides/{id}/status/override`
pub async fn status_override<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  _dispatcher: Dispatcher,
  Id(id): Id<Uuid>,
  Payload(body): Payload<StatusBody>,
) -> Result<Json<Value>, ApiError> {
  write_status(&state, id, body, StatusMode::Override).await
}

// ─── Rate ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RateBody {
  pub rating:  u8,
  pub tip:     Option<f64>,
  pub comment: Option<String>,
}

/// `POST /rides/{id}/rate`
pub async fn rate<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Id(id): Id<Uuid>,
  Payload(body): Payload<RateBody>,
) -> Result<Json<Value>, ApiError> {
  let ride = state
    .hub
    .rate_ride(id, Rating {
      stars:   body.rating,
      tip:     body.tip,
      comment: body.comment.as_deref().map(sanitize::text),
    })
    .await?;
  Ok(Json(json!({ "ok": true, "ride": ride })))
}

// ─── Suggest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
  pub policy: Option<DispatchPolicy>,
}

/// `GET /rides/{id}/suggest[?policy=<policy>]`
pub async fn suggest<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  _dispatcher: Dispatcher,
  Id(id): Id<Uuid>,
  Params(params): Params<SuggestParams>,
) -> Result<Json<Value>, ApiError> {
  let suggestion = state.hub.suggest_driver(id, params.policy).await?;
  Ok(Json(json!({ "ok": true, "suggestion": suggestion })))
}
