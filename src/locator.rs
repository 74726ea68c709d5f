use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::{models::TheaterInfo, places::PlacesClient};

pub const DEFAULT_RADIUS_METERS: u32 = 1000;
pub const MAX_RADIUS_METERS: u32 = 100_000;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("{0}")]
    Validation(String),
    #[error("places service credentials are not configured")]
    MissingCredentials,
    #[error("failed to fetch nearby theaters: places service returned {0}")]
    Upstream(reqwest::StatusCode),
    #[error("failed to reach places service: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unreadable places service response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Raw query string of a nearby-theater search. Values stay strings so that a
/// malformed number is reported as a validation failure.
#[derive(Debug, Default, Deserialize)]
pub struct NearbyQuery {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub radius: Option<String>,
}

pub async fn find_nearby_query(
    places: &PlacesClient,
    query: &NearbyQuery,
) -> Result<Vec<TheaterInfo>, LocatorError> {
    let latitude = param(query.latitude.as_deref(), "latitude")?;
    let longitude = param(query.longitude.as_deref(), "longitude")?;
    let radius = param(query.radius.as_deref(), "radius")?;
    find_nearby(places, latitude, longitude, radius).await
}

/// Theaters within `radius_meters` (default 1000) of the point. Both
/// coordinates are required; every upstream failure is returned as an error.
pub async fn find_nearby(
    places: &PlacesClient,
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius_meters: Option<u32>,
) -> Result<Vec<TheaterInfo>, LocatorError> {
    let latitude = latitude.ok_or_else(|| invalid("latitude is required"))?;
    let longitude = longitude.ok_or_else(|| invalid("longitude is required"))?;

    if !latitude.is_finite() || latitude.abs() > 90.0 {
        return Err(invalid("latitude must be between -90 and 90"));
    }
    if !longitude.is_finite() || longitude.abs() > 180.0 {
        return Err(invalid("longitude must be between -180 and 180"));
    }

    let radius = radius_meters.unwrap_or(DEFAULT_RADIUS_METERS);
    if radius == 0 || radius > MAX_RADIUS_METERS {
        return Err(invalid(format!("radius must be between 1 and {MAX_RADIUS_METERS} meters")));
    }

    places.search_theaters(latitude, longitude, radius).await
}

fn invalid(msg: impl Into<String>) -> LocatorError {
    LocatorError::Validation(msg.into())
}

fn param<T: FromStr>(raw: Option<&str>, name: &str) -> Result<Option<T>, LocatorError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| invalid(format!("{name} must be a number"))),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use axum::{
        Json, Router, extract::Query, http::StatusCode, response::IntoResponse, routing::get,
    };
    use serde_json::json;

    use super::*;
    use crate::{places::MOVIE_THEATER_CATEGORY, testing};

    fn venues() -> serde_json::Value {
        json!({
            "meta": { "code": 200 },
            "response": {
                "venues": [
                    {
                        "id": "4b5d",
                        "name": "TOHO Cinemas",
                        "location": { "address": "1-1 Kabukicho", "lat": 35.6951, "lng": 139.7017 }
                    },
                    {
                        "id": "4c2a",
                        "name": "Shinjuku Piccadilly",
                        "location": { "lat": 35.6917, "lng": 139.7035 }
                    },
                    { "id": "4d00", "name": "No Coordinates", "location": {} }
                ]
            }
        })
    }

    /// Fake places service. Counts hits and checks the fixed query shape.
    async fn places(
        status: StatusCode,
        body: &'static str,
        hits: Arc<AtomicUsize>,
    ) -> PlacesClient {
        let app = Router::new().route(
            "/venues/search",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    if q.get("categoryId").map(String::as_str) != Some(MOVIE_THEATER_CATEGORY)
                        || q.get("client_id").map(String::as_str) != Some("id")
                        || q.get("radius").is_none()
                        || q.get("ll").is_none()
                    {
                        return StatusCode::BAD_REQUEST.into_response();
                    }
                    if status != StatusCode::OK {
                        return status.into_response();
                    }
                    if body.is_empty() {
                        return Json(venues()).into_response();
                    }
                    body.into_response()
                }
            }),
        );
        let base_url = testing::spawn_upstream(app).await;
        client(base_url, "id")
    }

    fn client(base_url: String, client_id: &str) -> PlacesClient {
        PlacesClient::new(
            reqwest::Client::new(),
            client_id.to_string(),
            "secret".to_string(),
            base_url,
            "20240304".to_string(),
            "ja".to_string(),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn normalizes_venues() {
        let hits = Arc::new(AtomicUsize::new(0));
        let places = places(StatusCode::OK, "", hits.clone()).await;

        let theaters = find_nearby(&places, Some(35.6895), Some(139.6917), None).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(theaters.len(), 2);
        assert_eq!(
            theaters[0],
            TheaterInfo {
                id: "4b5d".into(),
                name: "TOHO Cinemas".into(),
                address: "1-1 Kabukicho".into(),
                latitude: 35.6951,
                longitude: 139.7017,
            }
        );
        assert_eq!(theaters[1].address, "");
    }

    #[tokio::test]
    async fn missing_coordinate_is_a_validation_error_without_upstream_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let places = places(StatusCode::OK, "", hits.clone()).await;

        let err = find_nearby(&places, Some(35.6895), None, None).await.unwrap_err();
        assert!(matches!(err, LocatorError::Validation(ref m) if m == "longitude is required"));

        let err = find_nearby(&places, None, Some(139.6917), None).await.unwrap_err();
        assert!(matches!(err, LocatorError::Validation(ref m) if m == "latitude is required"));

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn query_strings_are_parsed_and_checked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let places = places(StatusCode::OK, "", hits.clone()).await;

        let query = NearbyQuery {
            latitude: Some("35.6895".into()),
            longitude: Some("".into()),
            radius: None,
        };
        let err = find_nearby_query(&places, &query).await.unwrap_err();
        assert!(matches!(err, LocatorError::Validation(ref m) if m == "longitude is required"));

        let query = NearbyQuery {
            latitude: Some("north".into()),
            longitude: Some("139.6917".into()),
            radius: None,
        };
        let err = find_nearby_query(&places, &query).await.unwrap_err();
        assert!(matches!(err, LocatorError::Validation(ref m) if m == "latitude must be a number"));

        let query = NearbyQuery {
            latitude: Some("35.6895".into()),
            longitude: Some("139.6917".into()),
            radius: Some("0".into()),
        };
        assert!(matches!(
            find_nearby_query(&places, &query).await,
            Err(LocatorError::Validation(_))
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_success_status_is_an_upstream_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let places = places(StatusCode::SERVICE_UNAVAILABLE, "", hits).await;

        let err = find_nearby(&places, Some(35.0), Some(139.0), Some(500)).await.unwrap_err();
        assert!(matches!(err, LocatorError::Upstream(StatusCode::SERVICE_UNAVAILABLE)), "{err:?}");
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error_not_an_empty_list() {
        let hits = Arc::new(AtomicUsize::new(0));
        let places = places(StatusCode::OK, "{\"response\": 42}", hits).await;

        let err = find_nearby(&places, Some(35.0), Some(139.0), None).await.unwrap_err();
        assert!(matches!(err, LocatorError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_the_client_secret() {
        let places = client("http://127.0.0.1:9".to_string(), "id");
        let err = find_nearby(&places, Some(35.0), Some(139.0), None).await.unwrap_err();
        assert!(matches!(err, LocatorError::Transport(_)), "{err:?}");

        let rendered = format!("{err} {err:?}");
        assert!(!rendered.contains("client_secret"), "{rendered}");
        assert!(!rendered.contains("secret"), "{rendered}");
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast() {
        let places = client("http://127.0.0.1:9".to_string(), "");
        let err = find_nearby(&places, Some(35.0), Some(139.0), None).await.unwrap_err();
        assert!(matches!(err, LocatorError::MissingCredentials));
    }
}
