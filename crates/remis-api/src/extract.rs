//! Request extractors: JSON-error wrappers around axum's own, plus bearer
//! session checks.

use axum::{
  extract::{FromRequest, FromRequestParts},
  http::{header, request::Parts},
};
use remis_core::{
  directory::{Role, Session},
  snapshot::SnapshotStore,
};

use crate::{AppState, error::ApiError};

/// `axum::Json` whose rejection is an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Payload<T>(pub T);

/// `axum::extract::Query` whose rejection is an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Params<T>(pub T);

/// `axum::extract::Path` whose rejection is an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Id<T>(pub T);

fn bearer(parts: &Parts) -> Option<&str> {
  parts
    .headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

/// Any logged-in caller.
pub struct Authenticated(pub Session);

impl<S: SnapshotStore + 'static> FromRequestParts<AppState<S>> for Authenticated {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer(parts).ok_or(remis_core::Error::Unauthenticated)?;
    let session = state.hub.session(token).await?;
    Ok(Authenticated(session))
  }
}

/// A caller holding a dispatcher session.
pub struct Dispatcher(pub Session);

impl<S: SnapshotStore + 'static> FromRequestParts<AppState<S>> for Dispatcher {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let Authenticated(session) = Authenticated::from_request_parts(parts, state).await?;
    if session.role != Role::Dispatcher {
      return Err(remis_core::Error::Forbidden.into());
    }
    Ok(Dispatcher(session))
  }
}
