//! JSON REST API and WebSocket endpoint for Remis.
//!
//! Exposes an axum [`Router`] backed by a [`Coordinator`] over any
//! [`SnapshotStore`]. TLS and process concerns are the caller's
//! responsibility; rate limiting is applied here to every route.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = remis_api::router(state);
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
//! ```

pub mod alerts;
pub mod drivers;
pub mod error;
pub mod extract;
pub mod push;
pub mod rate_limit;
pub mod realtime;
pub mod rides;
pub mod routing;
pub mod sanitize;
pub mod session;

use std::sync::Arc;

use axum::{
  Json, Router, middleware,
  routing::{get, post},
};
use remis_core::{Coordinator, rate_limit::RateLimiter, snapshot::SnapshotStore};
use serde_json::{Value, json};

pub use error::ApiError;
pub use session::AuthConfig;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub hub:             Coordinator<S>,
  pub limiter:         Arc<RateLimiter>,
  pub auth:            Arc<AuthConfig>,
  pub push_public_key: Option<Arc<str>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      hub:             self.hub.clone(),
      limiter:         Arc::clone(&self.limiter),
      auth:            Arc::clone(&self.auth),
      push_public_key: self.push_public_key.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full router: `/health`, `/ws` and everything under `/api`.
pub fn router<S: SnapshotStore + 'static>(state: AppState<S>) -> Router {
  let api = Router::new()
    // Rides
    .route("/rides", get(rides::list::<S>).post(rides::create::<S>))
    .route("/rides/{id}", get(rides::get_one::<S>))
    .route("/rides/{id}/accept", post(rides::accept::<S>))
    .route("/rides/{id}/assign", post(rides::assign::<S>))
    .route("/rides/{id}/status", post(rides::status::<S>))
    .route("/rides/{id}/status/override", post(rides::status_override::<S>))
    .route("/rides/{id}/rate", post(rides::rate::<S>))
    .route("/rides/{id}/suggest", get(rides::suggest::<S>))
    // Drivers
    .route("/drivers", get(drivers::active::<S>))
    .route("/drivers/online", get(drivers::online::<S>))
    .route("/drivers/register", post(drivers::register::<S>))
    .route("/drivers/{id}", get(drivers::get_one::<S>))
    .route("/lastLocation", get(drivers::last_location::<S>))
    .route("/route", get(routing::handler::<S>))
    // Alerts
    .route("/alerts", get(alerts::list::<S>).post(alerts::raise::<S>))
    .route("/alerts/active", get(alerts::active::<S>))
    .route("/alerts/{id}", get(alerts::get_one::<S>))
    .route("/alerts/{id}/resolve", post(alerts::resolve::<S>))
    // Push
    .route("/push/publicKey", get(push::public_key::<S>))
    .route("/push/subscribe", post(push::subscribe::<S>))
    // Sessions
    .route("/login", post(session::login::<S>))
    .route("/logout", post(session::logout::<S>));

  Router::new()
    .route("/health", get(health))
    .route("/ws", get(realtime::upgrade::<S>))
    .nest("/api", api)
    .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce::<S>))
    .with_state(state)
}

async fn health() -> Json<Value> { Json(json!({ "ok": true })) }

#[cfg(test)]
mod tests {
  use std::net::SocketAddr;

  use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
  };
  use chrono::TimeDelta;
  use remis_core::{
    Collaborators, CoordinatorConfig, collab::NotificationQueue, snapshot::MemorySnapshotStore,
  };
  use tower::ServiceExt as _;

  use super::*;

  async fn make_state_with(limiter: RateLimiter) -> AppState<MemorySnapshotStore> {
    let (queue, _rx) = NotificationQueue::channel();
    let hub = Coordinator::open(
      MemorySnapshotStore::new(),
      CoordinatorConfig::default(),
      Collaborators::offline(queue),
    )
    .await
    .unwrap();
    AppState {
      hub,
      limiter: Arc::new(limiter),
      auth: Arc::new(AuthConfig::default()),
      push_public_key: Some(Arc::from("BPublicKey")),
    }
  }

  async fn make_state() -> AppState<MemorySnapshotStore> {
    make_state_with(RateLimiter::default()).await
  }

  async fn oneshot_raw(
    state: AppState<MemorySnapshotStore>,
    method: &str,
    uri: &str,
    headers: Vec<(header::HeaderName, &str)>,
    body: &str,
  ) -> axum::response::Response {
    let mut builder = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  async fn call(
    state: &AppState<MemorySnapshotStore>,
    method: &str,
    uri: &str,
    body: Value,
  ) -> (StatusCode, Value) {
    let body = if body.is_null() { String::new() } else { body.to_string() };
    let resp = oneshot_raw(state.clone(), method, uri, vec![], &body).await;
    read(resp).await
  }

  async fn read(resp: axum::response::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  async fn login(state: &AppState<MemorySnapshotStore>, role: &str) -> String {
    let (status, body) = call(state, "POST", "/api/login", json!({ "id": "u1", "role": role })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_owned()
  }

  async fn create_ride(state: &AppState<MemorySnapshotStore>) -> String {
    let (status, body) = call(
      state,
      "POST",
      "/api/rides",
      json!({ "pickupText": "Alsina 100", "destText": "Zelarrayán 500", "name": "Lucía" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["rideId"].as_str().unwrap().to_owned()
  }

  // ── Health ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_is_ok() {
    let state = make_state().await;
    let (status, body) = call(&state, "GET", "/health", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
  }

  // ── Rides ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_sanitises_and_returns_track_url() {
    let state = make_state().await;
    let (status, body) = call(
      &state,
      "POST",
      "/api/rides",
      json!({ "pickupText": "<b onclick=x>Alsina 100</b>", "destText": "Sarmiento 20" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["rideId"].as_str().unwrap();
    assert_eq!(
      body["trackUrl"],
      format!("http://localhost:3000/client.html?rideId={id}")
    );
    assert_eq!(body["ride"]["pickupText"], "b xAlsina 100/b");
    assert_eq!(body["ride"]["status"], "requested");
    assert_eq!(body["ride"]["driverId"], Value::Null);
  }

  #[tokio::test]
  async fn malformed_json_is_invalid_argument() {
    let state = make_state().await;
    let resp = oneshot_raw(state, "POST", "/api/rides", vec![], "{not json").await;
    let (status, body) = read(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");
    assert_eq!(body["ok"], false);
  }

  #[tokio::test]
  async fn unknown_ride_is_not_found() {
    let state = make_state().await;
    let uri = format!("/api/rides/{}", uuid::Uuid::new_v4());
    let (status, body) = call(&state, "GET", &uri, Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = call(&state, "GET", "/api/rides/not-a-uuid", Value::Null).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");
  }

  #[tokio::test]
  async fn second_accept_conflicts_with_holder() {
    let state = make_state().await;
    let id = create_ride(&state).await;
    let uri = format!("/api/rides/{id}/accept");

    let (status, body) = call(&state, "POST", &uri, json!({ "driverId": "D1" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["driverId"], "D1");

    let (status, body) = call(&state, "POST", &uri, json!({ "driverId": "D2" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_taken");
    assert_eq!(body["driverId"], "D1");

    let (status, body) = call(&state, "POST", &uri, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");
  }

  #[tokio::test]
  async fn validated_status_rejects_skips() {
    let state = make_state().await;
    let id = create_ride(&state).await;
    let uri = format!("/api/rides/{id}/status");

    let (status, body) = call(&state, "POST", &uri, json!({ "status": "completed" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "illegal_transition");

    let (status, body) = call(&state, "POST", &uri, json!({ "status": "canceled" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ride"]["status"], "canceled");

    let (status, _) = call(&state, "POST", &uri, json!({ "status": "flying" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn override_and_assign_need_a_dispatcher() {
    let state = make_state().await;
    let id = create_ride(&state).await;
    let override_uri = format!("/api/rides/{id}/status/override");
    let body = json!({ "status": "completed" }).to_string();

    let resp = oneshot_raw(state.clone(), "POST", &override_uri, vec![], &body).await;
    let (status, json_body) = read(resp).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body["error"], "unauthenticated");

    let client = format!("Bearer {}", login(&state, "client").await);
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      &override_uri,
      vec![(header::AUTHORIZATION, client.as_str())],
      &body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let dispatcher = format!("Bearer {}", login(&state, "dispatcher").await);
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      &override_uri,
      vec![(header::AUTHORIZATION, dispatcher.as_str())],
      &body,
    )
    .await;
    let (status, json_body) = read(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body["ride"]["status"], "completed");

    let resp = oneshot_raw(
      state.clone(),
      "POST",
      &format!("/api/rides/{id}/assign"),
      vec![(header::AUTHORIZATION, dispatcher.as_str())],
      &json!({ "driverId": "D7", "driverPhone": "555" }).to_string(),
    )
    .await;
    let (status, json_body) = read(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body["driverId"], "D7");
    assert_eq!(json_body["driverPhone"], "555");
  }

  #[tokio::test]
  async fn rating_bounds() {
    let state = make_state().await;
    let id = create_ride(&state).await;
    let uri = format!("/api/rides/{id}/rate");
    let (status, _) = call(&state, "POST", &uri, json!({ "rating": 9 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call(&state, "POST", &uri, json!({ "rating": 4, "tip": 500.0 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ride"]["rating"], 4);
    assert_eq!(body["ride"]["comment"], "");
  }

  // ── Drivers ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn driver_profile_and_last_location() {
    let state = make_state().await;
    let (status, _) = call(
      &state,
      "POST",
      "/api/drivers/register",
      json!({ "driverId": "D1", "name": "Ana", "phone": "291 555" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&state, "GET", "/api/drivers/D1", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["driver"]["phone"], "291 555");
    let (status, _) = call(&state, "GET", "/api/drivers/D9", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&state, "GET", "/api/lastLocation?driverId=D1", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
    let (status, _) = call(&state, "GET", "/api/lastLocation", Value::Null).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&state, "GET", "/api/drivers/online", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drivers"], json!([]));
  }

  #[tokio::test]
  async fn route_rejects_bad_coordinates_and_reports_offline_router() {
    let state = make_state().await;
    let (status, body) = call(&state, "GET", "/api/route?from=abc&to=1,2", Value::Null).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid argument: bad_coords");

    let (status, body) = call(&state, "GET", "/api/route?from=1,2&to=3,4", Value::Null).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstream_unavailable");
  }

  // ── Alerts ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn alert_lifecycle() {
    let state = make_state().await;
    let (status, body) = call(
      &state,
      "POST",
      "/api/alerts",
      json!({ "type": "driver_suspicious", "description": "otro auto" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["alert"]["alertId"].as_str().unwrap().to_owned();

    let (_, body) = call(&state, "GET", "/api/alerts/active", Value::Null).await;
    assert_eq!(body["alerts"].as_array().unwrap().len(), 1);

    let (status, body) = call(&state, "POST", &format!("/api/alerts/{id}/resolve"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alert"]["status"], "resolved");

    let (_, body) = call(&state, "GET", "/api/alerts/active", Value::Null).await;
    assert_eq!(body["alerts"], json!([]));
    let (_, body) = call(&state, "GET", &format!("/api/alerts/{id}"), Value::Null).await;
    assert_eq!(body["alert"]["type"], "driver_suspicious");

    let (status, _) = call(&state, "POST", "/api/alerts", json!({ "type": "aliens" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Push / sessions ─────────────────────────────────────────────────────────

  #[tokio::test]
  async fn push_registration() {
    let state = make_state().await;
    let (_, body) = call(&state, "GET", "/api/push/publicKey", Value::Null).await;
    assert_eq!(body["publicKey"], "BPublicKey");

    let sub = json!({ "subscription": { "endpoint": "https://push.example/1", "keys": {} } });
    let (_, body) = call(&state, "POST", "/api/push/subscribe", sub.clone()).await;
    assert_eq!(body["added"], true);
    let (_, body) = call(&state, "POST", "/api/push/subscribe", sub).await;
    assert_eq!(body["added"], false);

    let (status, _) = call(&state, "POST", "/api/push/subscribe", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn login_validation_and_logout() {
    let state = make_state().await;
    let (status, body) = call(&state, "POST", "/api/login", json!({ "id": "u1", "role": "admin" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid argument: invalid_role");

    let (status, _) = call(&state, "POST", "/api/login", json!({ "role": "client" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
      &state,
      "POST",
      "/api/login",
      json!({ "id": "u1", "role": "client", "password": "guess" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");

    let token = format!("Bearer {}", login(&state, "driver").await);
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/logout",
      vec![(header::AUTHORIZATION, token.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/api/logout",
      vec![(header::AUTHORIZATION, token.as_str())],
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  // ── Rate limiting ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn rate_limit_is_per_peer() {
    let state = make_state_with(RateLimiter::new(2, TimeDelta::seconds(60))).await;
    let request = |ip: [u8; 4]| {
      let mut req = Request::builder().uri("/health").body(Body::empty()).unwrap();
      req
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
      req
    };

    let app = router(state);
    for _ in 0..2 {
      let resp = app.clone().oneshot(request([10, 0, 0, 1])).await.unwrap();
      assert_eq!(resp.status(), StatusCode::OK);
    }
    let (status, body) = read(app.clone().oneshot(request([10, 0, 0, 1])).await.unwrap()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");

    let resp = app.oneshot(request([10, 0, 0, 2])).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }
}
