//! Driving routes from an OSRM `route/v1/driving` endpoint.

use futures_util::future::{BoxFuture, FutureExt};
use remis_core::{
  collab::{CollaboratorError, Route, RouteProvider},
  location::Coord,
};
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RouteResponse {
  #[serde(default)]
  pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RouteEntry {
  /// Seconds.
  #[serde(default)]
  pub duration: f64,
  pub geometry: Geometry,
}

/// GeoJSON line string; positions are `[lng, lat]`.
#[derive(Debug, Deserialize)]
pub struct Geometry {
  pub coordinates: Vec<[f64; 2]>,
}

impl RouteResponse {
  /// The first route, with positions flipped to `{lat, lng}`.
  pub fn into_route(self) -> Result<Route, CollaboratorError> {
    let entry = self.routes.into_iter().next().ok_or(CollaboratorError::NoRoute)?;
    let line = entry
      .geometry
      .coordinates
      .into_iter()
      .map(|[lng, lat]| Coord::new(lat, lng))
      .collect();
    Ok(Route::new(line, entry.duration))
  }
}

#[derive(Clone)]
pub struct OsrmRouter {
  client:   Client,
  base_url: String,
}

impl OsrmRouter {
  pub fn new(client: Client, base_url: &str) -> Self {
    Self { client, base_url: base_url.trim_end_matches('/').to_owned() }
  }

  fn route_url(&self, from: Coord, to: Coord) -> String {
    format!(
      "{}/route/v1/driving/{},{};{},{}",
      self.base_url, from.lng, from.lat, to.lng, to.lat
    )
  }

  async fn fetch(&self, from: Coord, to: Coord) -> reqwest::Result<RouteResponse> {
    self
      .client
      .get(self.route_url(from, to))
      .query(&[("overview", "full"), ("geometries", "geojson")])
      .send()
      .await?
      .error_for_status()?
      .json()
      .await
  }
}

impl RouteProvider for OsrmRouter {
  fn route(&self, from: Coord, to: Coord) -> BoxFuture<'_, Result<Route, CollaboratorError>> {
    async move {
      self
        .fetch(from, to)
        .await
        .map_err(|e| CollaboratorError::request("osrm", e))?
        .into_route()
    }
    .boxed()
  }
}
