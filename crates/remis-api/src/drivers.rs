//! Handlers for driver presence, tracking reads and profiles.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/drivers` | Fixes younger than the TTL |
//! | `GET`  | `/drivers/online` | Ids with a live driver connection |
//! | `POST` | `/drivers/register` | Body: [`RegisterBody`] |
//! | `GET`  | `/drivers/{id}` | 404 if not registered |
//! | `GET`  | `/lastLocation?driverId=` | `null` when unknown |

use axum::{Json, extract::State};
use remis_core::{directory::NewDriverProfile, snapshot::SnapshotStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  AppState,
  error::ApiError,
  extract::{Id, Params, Payload},
  sanitize,
};

/// `GET /drivers`
pub async fn active<S: SnapshotStore + 'static>(State(state): State<AppState<S>>) -> Json<Value> {
  let drivers = state.hub.active_drivers().await;
  Json(json!({ "ok": true, "drivers": drivers }))
}

/// `GET /drivers/online`
pub async fn online<S: SnapshotStore + 'static>(State(state): State<AppState<S>>) -> Json<Value> {
  let drivers = state.hub.online_drivers().await;
  Json(json!({ "ok": true, "drivers": drivers }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterBody {
  pub driver_id:         String,
  pub name:              String,
  pub phone:             String,
  pub emergency_contact: String,
}

/// `POST /drivers/register`
pub async fn register<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Payload(body): Payload<RegisterBody>,
) -> Result<Json<Value>, ApiError> {
  let driver = state
    .hub
    .register_driver(NewDriverProfile {
      driver_id:         sanitize::text(&body.driver_id),
      name:              sanitize::text(&body.name),
      phone:             sanitize::text(&body.phone),
      emergency_contact: sanitize::text(&body.emergency_contact),
    })
    .await?;
  Ok(Json(json!({ "ok": true, "driver": driver })))
}

/// `GET /drivers/{id}`
pub async fn get_one<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Id(driver_id): Id<String>,
) -> Result<Json<Value>, ApiError> {
  let driver = state.hub.get_driver(&driver_id).await?;
  Ok(Json(json!({ "ok": true, "driver": driver })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastLocationParams {
  #[serde(default)]
  pub driver_id: String,
}

/// `GET /lastLocation?driverId=<id>`
pub async fn last_location<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Params(params): Params<LastLocationParams>,
) -> Result<Json<Value>, ApiError> {
  let location = state.hub.last_location(&params.driver_id).await?;
  Ok(Json(json!(location)))
}
