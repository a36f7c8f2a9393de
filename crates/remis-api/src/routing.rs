//! `GET /route?from=LAT,LNG&to=LAT,LNG`: driving route between two points.

use axum::{Json, extract::State};
use remis_core::{location::Coord, snapshot::SnapshotStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppState, error::ApiError, extract::Params};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RouteParams {
  pub from: String,
  pub to:   String,
}

/// Parse `"lat,lng"`; anything else, including non-finite numbers, is `None`.
pub fn parse_coord(raw: &str) -> Option<Coord> {
  let (lat, lng) = raw.split_once(',')?;
  let coord = Coord::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
  coord.is_finite().then_some(coord)
}

pub async fn handler<S: SnapshotStore + 'static>(
  State(state): State<AppState<S>>,
  Params(params): Params<RouteParams>,
) -> Result<Json<Value>, ApiError> {
  let (Some(from), Some(to)) = (parse_coord(&params.from), parse_coord(&params.to)) else {
    return Err(ApiError::invalid("bad_coords"));
  };
  let route = state.hub.route(from, to).await?;
  Ok(Json(json!({
    "ok": true,
    "line": route.line,
    "duration": route.duration,
    "etaMin": route.eta_min,
  })))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coordinates_parse() {
    assert_eq!(parse_coord("-38.71, -62.26"), Some(Coord::new(-38.71, -62.26)));
    assert_eq!(parse_coord("-38.71"), None);
    assert_eq!(parse_coord("a,b"), None);
    assert_eq!(parse_coord("NaN,1"), None);
    assert_eq!(parse_coord(""), None);
  }
}
