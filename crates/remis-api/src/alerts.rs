//! Handlers for `/alerts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/alerts` | Every alert, newest first |
//! | `POST` | `/alerts` | Body: [`RaiseBody`]; 201 + alert |
//! | `GET`  | `/alerts/active` | Unresolved alerts, newest first |
//! | `GET`  | `/alerts/{id}` | 404 if not found |
//! | `POST` | `/alerts/{id}/resolve` | Resolving twice is allowed |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use remis_core::{alert::AlertKind, coordinator::AlertReport, snapshot::SnapshotStore};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  extract::{Id, Payload},
  sanitize,
};

/// `GET /alerts`
pub async fn list<S: SnapshotStore + 'static>(State(state): State<AppState<S>>) -> Json<Value> {
  let alerts = state.hub.all_alerts().await;
  Json(json!({ "ok": true, "alerts": alerts }))
}

/// `GET /alerts/active`
pub async fn active<S: SnapshotStore + 'static>(State(state): State<AppState<S>>) -> Json<Value> {
  let alerts = state.hub.active_alerts().await;
  Json(json!({ "ok": true, "alerts": alerts }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaiseBody {
  pub ride_id:     Option<Uuid>,
  #[serde(rename = "type")]
  pub kind:        AlertKind,
  #[serde(default)]
  pub description: String,
  pub driver_id:   Option<String>,
}

/// `POST /alerts`
pub async fn raise<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Payload(body): Payload<RaiseBody>,
) -> Result<impl IntoResponse, ApiError> {
  let alert = state
    .hub
    .raise_alert(AlertReport {
      ride_id:     body.ride_id,
      kind:        body.kind,
      description: sanitize::text(&body.description),
      reporter:    sanitize::optional(body.driver_id.as_deref()),
    })
    .await?;
  Ok((StatusCode::CREATED, Json(json!({ "ok": true, "alert": alert }))))
}

/// `GET /alerts/{id}`
pub async fn get_one<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Id(id): Id<Uuid>,
) -> Result<Json<Value>, ApiError> {
  let alert = state.hub.get_alert(id).await?;
  Ok(Json(json!({ "ok": true, "alert": alert })))
}

/// `POST /alerts/{id}/resolve`
pub async fn resolve<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Id(id): Id<Uuid>,
) -> Result<Json<Value>, ApiError> {
  let alert = state.hub.resolve_alert(id).await?;
  Ok(Json(json!({ "ok": true, "alert": alert })))
}
