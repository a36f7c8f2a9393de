//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure renders as `{"ok": false, "error": "<tag>", "message": …}`.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use remis_core::collab::CollaboratorError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] remis_core::Error),

  /// A supplied login password did not verify.
  #[error("invalid credentials")]
  InvalidCredentials,

  /// Malformed body, query string or path.
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Upstream(#[from] CollaboratorError),
}

impl ApiError {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::Core(remis_core::Error::InvalidArgument(message.into()))
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    use remis_core::Error as E;

    let message = self.to_string();
    let (status, tag) = match &self {
      ApiError::Core(e) => match e {
        E::RideNotFound(_) | E::AlertNotFound(_) | E::DriverNotFound(_) => {
          (StatusCode::NOT_FOUND, "not_found")
        }
        E::AlreadyTaken { driver_id, .. } => {
          let body = json!({
            "ok": false,
            "error": "already_taken",
            "message": message,
            "driverId": driver_id,
          });
          return (StatusCode::CONFLICT, Json(body)).into_response();
        }
        E::IllegalTransition { .. } => (StatusCode::CONFLICT, "illegal_transition"),
        E::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        E::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
        E::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
        E::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        E::Persistence(_) | E::Serialization(_) => {
          error!(error = %e, "request failed");
          (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
      },
      ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
      ApiError::Upstream(CollaboratorError::NoRoute) => (StatusCode::NOT_FOUND, "no_route"),
      ApiError::Upstream(e) => {
        error!(error = %e, "collaborator failed");
        (StatusCode::BAD_GATEWAY, "upstream_unavailable")
      }
    };
    let body = json!({ "ok": false, "error": tag, "message": message });
    (status, Json(body)).into_response()
  }
}
