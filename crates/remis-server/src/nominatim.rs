//! Free-text geocoding against a Nominatim `/search` endpoint.

use futures_util::future::{BoxFuture, FutureExt};
use remis_core::{collab::Geocoder, location::Coord};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

/// One search hit. Nominatim reports coordinates as decimal strings.
#[derive(Debug, Deserialize)]
pub struct Place {
  pub lat: String,
  pub lon: String,
}

/// Coordinate of the first hit that parses to finite numbers.
pub fn first_coord(places: &[Place]) -> Option<Coord> {
  let place = places.first()?;
  let coord = Coord::new(place.lat.trim().parse().ok()?, place.lon.trim().parse().ok()?);
  coord.is_finite().then_some(coord)
}

#[derive(Clone)]
pub struct NominatimGeocoder {
  client:   Client,
  base_url: String,
  /// `countrycodes` filter.
  region:   Option<String>,
}

impl NominatimGeocoder {
  pub fn new(client: Client, base_url: &str, region: Option<String>) -> Self {
    Self {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
      region,
    }
  }

  fn search_url(&self) -> String { format!("{}/search", self.base_url) }

  fn query_params<'a>(&'a self, query: &'a str) -> Vec<(&'static str, &'a str)> {
    let mut params = vec![("format", "json"), ("limit", "1"), ("q", query)];
    if let Some(region) = &self.region {
      params.push(("countrycodes", region.as_str()));
    }
    params
  }

  async fn search(&self, query: &str) -> reqwest::Result<Vec<Place>> {
    self
      .client
      .get(self.search_url())
      .query(&self.query_params(query))
      .send()
      .await?
      .error_for_status()?
      .json()
      .await
  }
}

impl Geocoder for NominatimGeocoder {
  fn geocode<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Option<Coord>> {
    async move {
      match self.search(query).await {
        Ok(places) => first_coord(&places),
        Err(e) => {
          warn!(query, error = %e, "geocoding failed");
          None
        }
      }
    }
    .boxed()
  }
}
