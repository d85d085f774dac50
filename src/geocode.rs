//! Reverse geocoding: coordinates to place names.
//!
//! The geocoding service itself is external. [`ReverseGeocoder`] is the seam;
//! [`HttpGeocoder`] is the production implementation and tests supply fakes.
//!
//! [`LocationResolver`] sits in front of the geocoder with a cache keyed by a
//! rounded coordinate bucket, so a burst of photos taken at the same spot
//! costs one lookup. Only successful lookups are cached.
//!
//! Failures never stop a document: the place name stays empty, a warning is
//! attached and the failure is counted by kind.

use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::stats::RunStats;
use crate::types::{GeoPoint, Media};

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub trait ReverseGeocoder: Send + Sync {
    fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError>;
}

/// Response body of the name lookup endpoint.
#[derive(Debug, Deserialize)]
struct NameResponse {
    #[serde(alias = "fullDescription", alias = "displayName", alias = "display_name")]
    full_description: Option<String>,
}

/// Geocoder backed by the reverse-name HTTP service.
///
/// Calls `GET {base}/api/v1/name?lat=<lat>&lon=<lon>` and reads the place name
/// from the JSON body.
pub struct HttpGeocoder {
    client: Client,
    endpoint: String,
}

impl HttpGeocoder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeocodeError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/v1/name", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ReverseGeocoder for HttpGeocoder {
    fn lookup(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("lat", latitude), ("lon", longitude)])
            .send()
            .map_err(|e| GeocodeError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }
        let body = response
            .text()
            .map_err(|e| GeocodeError::Connection(e.to_string()))?;
        parse_name_response(&body)
    }
}

fn parse_name_response(body: &str) -> Result<String, GeocodeError> {
    let parsed: NameResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    parsed
        .full_description
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GeocodeError::Malformed("no place name in response".to_string()))
}

type Bucket = (i64, i64);

/// Caching front for a [`ReverseGeocoder`].
pub struct LocationResolver {
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    scale: f64,
    cache: Mutex<HashMap<Bucket, String>>,
    stats: Arc<RunStats>,
}

impl LocationResolver {
    /// `precision` is the number of decimal places two points must share to
    /// share a cache entry. With no geocoder every document passes through.
    pub fn new(
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
        precision: u32,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            geocoder,
            scale: 10f64.powi(precision as i32),
            cache: Mutex::new(HashMap::new()),
            stats,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.geocoder.is_some()
    }

    fn bucket(&self, point: &GeoPoint) -> Bucket {
        (
            (point.latitude * self.scale).round() as i64,
            (point.longitude * self.scale).round() as i64,
        )
    }

    fn cached(&self, bucket: &Bucket) -> Option<String> {
        self.cache.lock().ok()?.get(bucket).cloned()
    }

    /// Fill in `placename` when the document has a location.
    pub fn resolve(&self, media: &mut Media) {
        let (Some(geocoder), Some(point)) = (&self.geocoder, media.location) else {
            return;
        };

        let bucket = self.bucket(&point);
        if let Some(name) = self.cached(&bucket) {
            self.stats.location.cache_hits.incr();
            media.placename = Some(name);
            return;
        }

        self.stats.location.lookups.incr();
        match geocoder.lookup(point.latitude, point.longitude) {
            Ok(name) => {
                debug!(path = %media.path, place = %name, "resolved location");
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(bucket, name.clone());
                }
                media.placename = Some(name);
            }
            Err(e) => {
                let counter = match e {
                    GeocodeError::Connection(_) => &self.stats.location.failures,
                    GeocodeError::Status(_) => &self.stats.location.server_errors,
                    GeocodeError::Malformed(_) => &self.stats.location.malformed,
                };
                counter.incr();
                warn!(path = %media.path, error = %e, "location lookup failed");
                media.warnings.push(format!(
                    "Location lookup failed for {}, {}: {e}",
                    point.latitude, point.longitude
                ));
            }
        }
    }
}
