//! Login and logout.
//!
//! Sessions are opaque bearer tokens. A password, when supplied, must match
//! the configured argon2 hash; dispatcher logins always need one once a hash
//! is configured.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{Json, extract::State};
use rand_core::{OsRng, RngCore};
use remis_core::{directory::Role, snapshot::SnapshotStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  AppState,
  error::ApiError,
  extract::{Authenticated, Payload},
  sanitize,
};

/// Login policy for this server instance.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: Option<String>,
}

pub fn verify_password(
  config: &AuthConfig,
  role: Role,
  password: Option<&str>,
) -> Result<(), ApiError> {
  let password = password.filter(|p| !p.is_empty());
  let Some(hash) = config.password_hash.as_deref() else {
    // Without a configured hash there is nothing a password could match.
    return match password {
      Some(_) => Err(ApiError::InvalidCredentials),
      None => Ok(()),
    };
  };
  let Some(password) = password else {
    return match role {
      Role::Dispatcher => Err(ApiError::InvalidCredentials),
      Role::Client | Role::Driver => Ok(()),
    };
  };

  let parsed = PasswordHash::new(hash).map_err(|_| ApiError::InvalidCredentials)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .map_err(|_| ApiError::InvalidCredentials)
}

fn new_token() -> String {
  let mut bytes = [0u8; 24];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginBody {
  pub id:       String,
  pub role:     String,
  pub password: Option<String>,
}

/// `POST /login`
pub async fn login<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Payload(body): Payload<LoginBody>,
) -> Result<Json<Value>, ApiError> {
  let id = sanitize::text(&body.id);
  if id.is_empty() || body.role.is_empty() {
    return Err(ApiError::invalid("missing_fields"));
  }
  let role: Role = body
    .role
    .parse()
    .map_err(|_| ApiError::invalid("invalid_role"))?;
  verify_password(&state.auth, role, body.password.as_deref())?;

  let session = state.hub.open_session(new_token(), role, Some(id)).await?;
  Ok(Json(json!({
    "ok": true,
    "token": session.token,
    "role": session.role,
    "id": session.subject,
  })))
}

/// `POST /logout`
pub async fn logout<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Authenticated(session): Authenticated,
) -> Result<Json<Value>, ApiError> {
  state.hub.close_session(&session.token).await?;
  Ok(Json(json!({ "ok": true })))
}
