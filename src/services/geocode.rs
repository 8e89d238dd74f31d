//! Airport geocoding
//!
//! Fills in missing airport coordinates from a Nominatim-compatible search
//! endpoint. Lookups run concurrently in fixed-size batches with a pause
//! between batches, and each lookup is retried with exponential backoff.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GeocodingConfig;
use crate::db::repositories::AirportRepository;
use crate::models::Airport;
use crate::services::FlightService;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Rate limited by geocoding service")]
    RateLimited,

    #[error("Geocoding service returned {0}")]
    Status(u16),

    #[error("No match for '{0}'")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl GeocodeError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            GeocodeError::Request(_) | GeocodeError::RateLimited => true,
            GeocodeError::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

/// Resolves a free-text place query to `(latitude, longitude)`
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<(f64, f64), GeocodeError>;
}

#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeocodeError::InternalError(e.into()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(&self, query: &str) -> Result<(f64, f64), GeocodeError> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| GeocodeError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let places: Vec<Place> = response
            .json()
            .await
            .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;
        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(query.to_string()))?;

        parse_coordinates(&place.lat, &place.lon)
    }
}

fn parse_coordinates(lat: &str, lon: &str) -> Result<(f64, f64), GeocodeError> {
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| GeocodeError::InvalidResponse(format!("bad coordinate '{}'", value)))
    };
    let (lat, lon) = (parse(lat)?, parse(lon)?);
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(GeocodeError::InvalidResponse(format!(
            "coordinates out of range: {}, {}",
            lat, lon
        )));
    }
    Ok((lat, lon))
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Run `operation` up to `max_attempts` times, sleeping with exponential
/// backoff between attempts. Non-retryable errors return immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    max_attempts: usize,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, GeocodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeocodeError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt as usize >= max_attempts.max(1) => {
                return Err(e)
            }
            Err(e) => {
                let delay = backoff_delay(base_delay, attempt);
                tracing::debug!(attempt, ?delay, error = %e, "Retrying geocode lookup");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedAirport {
    pub iata_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedAirport {
    pub iata_code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeocodeReport {
    pub resolved: Vec<ResolvedAirport>,
    pub failed: Vec<FailedAirport>,
    pub batches: usize,
    pub dry_run: bool,
}

impl GeocodeReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct GeocodeService {
    airports: Arc<dyn AirportRepository>,
    flights: Arc<FlightService>,
    geocoder: Arc<dyn Geocoder>,
    config: GeocodingConfig,
}

impl GeocodeService {
    pub fn new(
        airports: Arc<dyn AirportRepository>,
        flights: Arc<FlightService>,
        geocoder: Arc<dyn Geocoder>,
        config: GeocodingConfig,
    ) -> Self {
        Self {
            airports,
            flights,
            geocoder,
            config,
        }
    }

    /// Geocode every airport without coordinates and fill in the distances
    /// of flights touching them. With `dry_run` the lookups still happen
    /// but nothing is written.
    pub async fn run(&self, dry_run: bool) -> Result<GeocodeReport, GeocodeError> {
        let pending = self.airports.list_missing_coordinates().await?;
        let mut report = GeocodeReport {
            dry_run,
            ..GeocodeReport::default()
        };
        if pending.is_empty() {
            tracing::info!("All airports already have coordinates");
            return Ok(report);
        }

        let batch_size = self.config.batch_size.max(1);
        let delay = Duration::from_millis(self.config.batch_delay_ms);
        tracing::info!(
            airports = pending.len(),
            batch_size,
            dry_run,
            "Geocoding airports"
        );

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            report.batches += 1;

            let results = join_all(batch.iter().map(|airport| self.resolve(airport))).await;
            for (airport, result) in batch.iter().zip(results) {
                match result {
                    Ok((latitude, longitude)) => {
                        if !dry_run {
                            self.flights
                                .locate_airport(airport.id, latitude, longitude)
                                .await
                                .map_err(|e| GeocodeError::InternalError(e.into()))?;
                        }
                        tracing::info!(iata = %airport.iata_code, latitude, longitude, "Resolved");
                        report.resolved.push(ResolvedAirport {
                            iata_code: airport.iata_code.clone(),
                            latitude,
                            longitude,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(iata = %airport.iata_code, error = %e, "Geocoding failed");
                        report.failed.push(FailedAirport {
                            iata_code: airport.iata_code.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(report)
    }

    async fn resolve(&self, airport: &Airport) -> Result<(f64, f64), GeocodeError> {
        let query = airport_query(airport);
        retry_with_backoff(
            self.config.max_attempts,
            Duration::from_millis(self.config.base_backoff_ms),
            || self.geocoder.lookup(&query),
        )
        .await
    }
}

/// Search text for an airport: its name plus whatever location is known
pub fn airport_query(airport: &Airport) -> String {
    let mut parts = vec![airport.name.trim()];
    for extra in [airport.city.trim(), airport.country.trim()] {
        if !extra.is_empty() && !airport.name.contains(extra) {
            parts.push(extra);
        }
    }
    parts.join(", ")
}
