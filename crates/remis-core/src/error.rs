//! Error types for `remis-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::ride::RideStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("ride not found: {0}")]
  RideNotFound(Uuid),

  #[error("alert not found: {0}")]
  AlertNotFound(Uuid),

  #[error("driver not found: {0}")]
  DriverNotFound(String),

  /// A `tryAssign` lost the first-wins race, or the ride has already left
  /// the `requested` state.
  #[error("ride {ride_id} already taken")]
  AlreadyTaken {
    ride_id:   Uuid,
    driver_id: Option<String>,
  },

  #[error("illegal status transition {from} -> {to}")]
  IllegalTransition { from: RideStatus, to: RideStatus },

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("rate limit exceeded")]
  RateLimited,

  #[error("missing or unknown session token")]
  Unauthenticated,

  #[error("forbidden")]
  Forbidden,

  #[error("persistence error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
