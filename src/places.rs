use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{locator::LocatorError, models::TheaterInfo};

/// Foursquare venue category for movie theaters.
pub const MOVIE_THEATER_CATEGORY: &str = "4bf58dd8d48988d17f941735";

pub struct PlacesClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    base_url: String,
    version: String,
    locale: String,
    timeout: Duration,
}

impl PlacesClient {
    pub fn new(
        client: reqwest::Client,
        client_id: String,
        client_secret: String,
        base_url: String,
        version: String,
        locale: String,
        timeout: Duration,
    ) -> Self {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            tracing::warn!("no Foursquare credentials provided, theater search is disabled");
        }
        Self { client, client_id, client_secret, base_url, version, locale, timeout }
    }

    fn has_credentials(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    /// Radius search for movie theaters around a point. Request errors are
    /// stripped of their URL, which carries the client secret.
    pub async fn search_theaters(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: u32,
    ) -> Result<Vec<TheaterInfo>, LocatorError> {
        if !self.has_credentials() {
            return Err(LocatorError::MissingCredentials);
        }

        let url = format!("{}/venues/search", self.base_url.trim_end_matches('/'));
        let ll = format!("{latitude},{longitude}");
        let radius = radius_meters.to_string();

        let resp = self
            .client
            .get(url)
            .query(&[
                ("locale", self.locale.as_str()),
                ("ll", ll.as_str()),
                ("radius", radius.as_str()),
                ("categoryId", MOVIE_THEATER_CATEGORY),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("v", self.version.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| LocatorError::Transport(err.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LocatorError::Upstream(status));
        }

        let body: SearchEnvelope = resp.json().await.map_err(|err| {
            let err = err.without_url();
            if err.is_decode() { LocatorError::Decode(err) } else { LocatorError::Transport(err) }
        })?;

        let theaters: Vec<TheaterInfo> =
            body.response.venues.into_iter().filter_map(Venue::into_theater).collect();
        debug!(count = theaters.len(), "places search returned theaters");
        Ok(theaters)
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    venues: Vec<Venue>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    id: String,
    name: String,
    #[serde(default)]
    location: Location,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    address: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl Venue {
    fn into_theater(self) -> Option<TheaterInfo> {
        let (Some(latitude), Some(longitude)) = (self.location.lat, self.location.lng) else {
            debug!(venue_id = %self.id, "dropping venue without coordinates");
            return None;
        };
        Some(TheaterInfo {
            id: self.id,
            name: self.name,
            address: self.location.address.unwrap_or_default(),
            latitude,
            longitude,
        })
    }
}
