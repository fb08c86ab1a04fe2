//! Position sources for the "use my location" path.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{fmt::Debug, time::Duration};

use crate::{error::ForecastError, model::GeoPoint};

const IP_API_URL: &str = "http://ip-api.com/json/?fields=status,lat,lon";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Resolves the device position. Errors are limited to the geolocation
/// variants of [`ForecastError`].
#[async_trait]
pub trait Geolocator: Send + Sync + Debug {
    async fn current_position(&self) -> Result<GeoPoint, ForecastError>;
}

/// Position taken from configuration; `None` means no position source.
#[derive(Debug, Clone, Default)]
pub struct FixedGeolocator {
    position: Option<GeoPoint>,
}

impl FixedGeolocator {
    pub fn new(position: Option<GeoPoint>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self) -> Result<GeoPoint, ForecastError> {
        self.position.ok_or(ForecastError::GeolocationUnsupported)
    }
}

/// Approximate position from the public IP address.
#[derive(Debug, Clone)]
pub struct IpGeolocator {
    http: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpGeolocator {
    pub fn new() -> Result<Self, ForecastError> {
        Self::with_url(IP_API_URL.to_string())
    }

    pub fn with_url(url: String) -> Result<Self, ForecastError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Geolocator for IpGeolocator {
    async fn current_position(&self) -> Result<GeoPoint, ForecastError> {
        let res = self.http.get(&self.url).send().await.map_err(|e| {
            tracing::debug!("IP geolocation request failed: {}", e);
            ForecastError::GeolocationUnavailable
        })?;

        if !res.status().is_success() {
            tracing::debug!("IP geolocation returned status {}", res.status());
            return Err(ForecastError::GeolocationUnavailable);
        }

        let body: IpApiResponse = res.json().await.map_err(|e| {
            tracing::debug!("IP geolocation parse error: {}", e);
            ForecastError::GeolocationUnavailable
        })?;

        match (body.status.as_str(), body.lat, body.lon) {
            ("success", Some(lat), Some(lon)) => Ok(GeoPoint::new(lat, lon)),
            _ => Err(ForecastError::GeolocationUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fixed_without_position_is_unsupported() {
        let geo = FixedGeolocator::default();
        assert_eq!(
            geo.current_position().await,
            Err(ForecastError::GeolocationUnsupported)
        );

        let geo = FixedGeolocator::new(Some(GeoPoint::new(1.0, 2.0)));
        assert_eq!(geo.current_position().await, Ok(GeoPoint::new(1.0, 2.0)));
    }

    #[tokio::test]
    async fn ip_lookup_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success", "lat": 47.6, "lon": -122.3
            })))
            .mount(&server)
            .await;

        let geo = IpGeolocator::with_url(server.uri()).unwrap();
        assert_eq!(geo.current_position().await, Ok(GeoPoint::new(47.6, -122.3)));
    }

    #[tokio::test]
    async fn ip_lookup_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "fail" })))
            .mount(&server)
            .await;

        let geo = IpGeolocator::with_url(server.uri()).unwrap();
        assert_eq!(
            geo.current_position().await,
            Err(ForecastError::GeolocationUnavailable)
        );
    }
}
