//! Per-client request throttling as axum middleware.

use std::net::SocketAddr;

use axum::{
  extract::{ConnectInfo, Request, State},
  middleware::Next,
  response::Response,
};
use chrono::Utc;
use remis_core::snapshot::SnapshotStore;
use tracing::debug;

use crate::{AppState, error::ApiError};

/// Key requests by peer IP; requests without connection info share one
/// bucket.
fn client_key(req: &Request) -> String {
  req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip().to_string())
    .unwrap_or_else(|| "unknown".to_owned())
}

pub async fn enforce<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Result<Response, ApiError> {
  let client = client_key(&req);
  if let Err(e) = state.limiter.check(&client, Utc::now()).await {
    debug!(client, "rate limited");
    return Err(e.into());
  }
  Ok(next.run(req).await)
}
