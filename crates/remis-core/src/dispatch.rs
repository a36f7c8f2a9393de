//! Driver selection: a pure function over a candidate list.
//!
//! Nothing here touches shared state; the coordinator builds the candidate
//! list from the location cache and ride ratings and decides what to do with
//! the result. Every policy breaks ties by iteration order (the first
//! candidate reaching the best value wins).

use serde::{Deserialize, Serialize};

use crate::location::Coord;

/// Earth's mean radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Rating assumed for drivers without one.
pub const DEFAULT_RATING: f64 = 4.0;

/// Synthetic distance charged to positionless candidates under
/// [`DispatchPolicy::Balanced`].
pub const MISSING_POSITION_KM: f64 = 999.0;

/// Average urban speed used for ETA estimates.
pub const AVERAGE_SPEED_KMH: f64 = 30.0;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DispatchPolicy {
  /// Minimise great-circle distance to the pickup.
  #[default]
  Nearest,
  /// Maximise driver rating.
  Rating,
  /// `0.7 * distance score + 0.3 * rating score`.
  Balanced,
}

/// A driver eligible for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub driver_id: String,
  pub position:  Option<Coord>,
  pub rating:    Option<f64>,
}

/// The chosen candidate, with the figures that justified the choice.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'a> {
  pub candidate:   &'a Candidate,
  /// Distance to the pickup, when the candidate has a position.
  pub distance_km: Option<f64>,
  /// Policy-specific score: negated distance, rating, or balanced score.
  pub score:       f64,
}

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: Coord, b: Coord) -> f64 {
  let lat1 = a.lat.to_radians();
  let lat2 = b.lat.to_radians();
  let dlat = (b.lat - a.lat).to_radians();
  let dlng = (b.lng - a.lng).to_radians();

  let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
  EARTH_RADIUS_KM * 2.0 * h.sqrt().asin()
}

/// Balanced score for a candidate `distance_km` away with `rating` stars.
pub fn balanced_score(distance_km: f64, rating: f64) -> f64 {
  let distance_score = (10.0 - distance_km).max(0.0) / 10.0;
  let rating_score = rating / 5.0;
  0.7 * distance_score + 0.3 * rating_score
}

/// Minutes to cover `distance_km` at [`AVERAGE_SPEED_KMH`], never below 1.
pub fn estimate_eta_minutes(distance_km: f64) -> u32 {
  let minutes = (distance_km / AVERAGE_SPEED_KMH * 60.0).round();
  if minutes.is_finite() && minutes > 1.0 { minutes as u32 } else { 1 }
}

/// Pick a driver for `pickup` from `candidates` under `policy`.
pub fn select<'a>(
  pickup: Coord,
  candidates: &'a [Candidate],
  policy: DispatchPolicy,
) -> Option<Selection<'a>> {
  let distance_to = |c: &Candidate| {
    c.position
      .filter(Coord::is_finite)
      .map(|p| haversine_km(pickup, p))
  };

  let scored = candidates.iter().filter_map(|c| {
    let distance_km = distance_to(c);
    let rating = c.rating.unwrap_or(DEFAULT_RATING);
    let score = match policy {
      // Positionless drivers are not eligible for "nearest".
      DispatchPolicy::Nearest => -distance_km?,
      DispatchPolicy::Rating => rating,
      DispatchPolicy::Balanced => {
        balanced_score(distance_km.unwrap_or(MISSING_POSITION_KM), rating)
      }
    };
    Some(Selection { candidate: c, distance_km, score })
  });

  scored.fold(None, |best: Option<Selection<'a>>, current| match best {
    Some(b) if current.score <= b.score => Some(b),
    _ => Some(current),
  })
}
