//! Web-push registration.

use axum::{Json, extract::State};
use remis_core::{directory::PushSubscription, snapshot::SnapshotStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppState, error::ApiError, extract::Payload};

/// `GET /push/publicKey`
pub async fn public_key<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
) -> Json<Value> {
  Json(json!({ "publicKey": state.push_public_key.as_deref() }))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
  pub subscription: Option<PushSubscription>,
}

/// `POST /push/subscribe`
pub async fn subscribe<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Payload(body): Payload<SubscribeBody>,
) -> Result<Json<Value>, ApiError> {
  let subscription = body
    .subscription
    .ok_or_else(|| ApiError::invalid("missing_subscription"))?;
  let added = state.hub.subscribe_push(subscription).await?;
  Ok(Json(json!({ "ok": true, "added": added })))
}
