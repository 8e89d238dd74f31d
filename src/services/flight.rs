//! Flight log service
//!
//! Airports are keyed by IATA code. A flight's distance is the
//! great-circle distance between its airports when both have coordinates;
//! its duration comes from the departure and arrival times.

use anyhow::Context;
use chrono::Datelike;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::db::repositories::{AirportRepository, FlightRepository, TripRepository};
use crate::models::{
    AirlineCount, Airport, CreateAirportInput, CreateFlightInput, CreateTripInput, Flight,
    FlightDetail, FlightStats, RouteCount, Trip, TripDetail,
};
use crate::services::{generate_slug, non_blank, slug_candidates};

/// Mean earth radius used by [`haversine_km`]
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const CACHE_KEY_STATS: &str = "flights:stats";
const STATS_TTL: Duration = Duration::from_secs(600);
const TOP_N: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum FlightServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Great-circle distance in kilometres between two `(lat, lon)` points
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Uppercased IATA code, if it is exactly three ASCII letters
pub fn normalize_iata(code: &str) -> Option<String> {
    let code = code.trim().to_ascii_uppercase();
    (code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())).then_some(code)
}

pub struct FlightService {
    airports: Arc<dyn AirportRepository>,
    flights: Arc<dyn FlightRepository>,
    trips: Arc<dyn TripRepository>,
    cache: Arc<MemoryCache>,
}

impl FlightService {
    pub fn new(
        airports: Arc<dyn AirportRepository>,
        flights: Arc<dyn FlightRepository>,
        trips: Arc<dyn TripRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            airports,
            flights,
            trips,
            cache,
        }
    }

    // ---- airports ----

    pub async fn create_airport(
        &self,
        input: CreateAirportInput,
    ) -> Result<Airport, FlightServiceError> {
        let iata_code = normalize_iata(&input.iata_code).ok_or_else(|| {
            FlightServiceError::ValidationError(format!(
                "IATA code must be three letters, got '{}'",
                input.iata_code
            ))
        })?;
        let name = non_blank(Some(input.name.as_str())).ok_or_else(|| {
            FlightServiceError::ValidationError("Airport name cannot be empty".to_string())
        })?;
        validate_coordinates(input.latitude, input.longitude)?;

        if self.airports.get_by_iata(&iata_code).await?.is_some() {
            return Err(FlightServiceError::Duplicate(iata_code));
        }

        let airport = self
            .airports
            .create(&CreateAirportInput {
                iata_code,
                name: name.to_string(),
                city: input.city.trim().to_string(),
                country: input.country.trim().to_string(),
                ..input
            })
            .await?;
        tracing::info!(iata = %airport.iata_code, "Airport created");
        self.invalidate().await;
        Ok(airport)
    }

    pub async fn list_airports(&self) -> Result<Vec<Airport>, FlightServiceError> {
        Ok(self.airports.list().await.context("Failed to list airports")?)
    }

    /// Store an airport's coordinates and fill in the distance of every
    /// flight touching it. Returns how many flights changed.
    pub async fn locate_airport(
        &self,
        airport_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<usize, FlightServiceError> {
        validate_coordinates(Some(latitude), Some(longitude))?;
        if self.airports.get_by_id(airport_id).await?.is_none() {
            return Err(FlightServiceError::NotFound(format!(
                "Airport with ID {}",
                airport_id
            )));
        }
        self.airports
            .update_coordinates(airport_id, latitude, longitude)
            .await?;

        let flights = self.flights.list_by_airport(airport_id).await?;
        let mut updated = 0;
        for detail in self.with_airports(flights).await? {
            let distance_km = flight_distance(&detail.departure, &detail.arrival);
            if distance_km != detail.flight.distance_km {
                self.flights
                    .update_distance(detail.flight.id, distance_km)
                    .await?;
                updated += 1;
            }
        }

        tracing::info!(airport_id, flights = updated, "Airport located");
        self.invalidate().await;
        Ok(updated)
    }

    // ---- flights ----

    pub async fn create_flight(
        &self,
        input: CreateFlightInput,
    ) -> Result<FlightDetail, FlightServiceError> {
        let flight_number = non_blank(Some(input.flight_number.as_str()))
            .ok_or_else(|| {
                FlightServiceError::ValidationError("Flight number cannot be empty".to_string())
            })?
            .to_ascii_uppercase();
        let airline = non_blank(Some(input.airline.as_str())).ok_or_else(|| {
            FlightServiceError::ValidationError("Airline cannot be empty".to_string())
        })?;

        let departure = self.airport_by_code(&input.departure_iata).await?;
        let arrival = self.airport_by_code(&input.arrival_iata).await?;
        if departure.id == arrival.id {
            return Err(FlightServiceError::ValidationError(
                "Departure and arrival airports must differ".to_string(),
            ));
        }
        if input.arrival_time <= input.departure_time {
            return Err(FlightServiceError::ValidationError(
                "Arrival must be after departure".to_string(),
            ));
        }
        if let Some(trip_id) = input.trip_id {
            if self.trips.get_by_id(trip_id).await?.is_none() {
                return Err(FlightServiceError::ValidationError(format!(
                    "Trip {} does not exist",
                    trip_id
                )));
            }
        }

        let distance_km = flight_distance(&departure, &arrival);

        let flight = Flight {
            id: 0,
            flight_number,
            airline: airline.to_string(),
            departure_airport_id: departure.id,
            arrival_airport_id: arrival.id,
            departure_time: input.departure_time,
            arrival_time: input.arrival_time,
            aircraft: non_blank(input.aircraft.as_deref()).map(str::to_string),
            cabin_class: input.cabin_class,
            seat: non_blank(input.seat.as_deref()).map(str::to_string),
            distance_km,
            duration_minutes: (input.arrival_time - input.departure_time).num_minutes(),
            trip_id: input.trip_id,
            notes: non_blank(input.notes.as_deref()).map(str::to_string),
        };

        let created = self.flights.create(&flight).await?;
        tracing::info!(
            id = created.id,
            route = %format!("{}-{}", departure.iata_code, arrival.iata_code),
            distance_km = ?created.distance_km,
            "Flight logged"
        );
        self.invalidate().await;

        Ok(FlightDetail {
            flight: created,
            departure,
            arrival,
        })
    }

    /// Every flight with its airports, latest departure first
    pub async fn list_flights(&self) -> Result<Vec<FlightDetail>, FlightServiceError> {
        let flights = self.flights.list().await.context("Failed to list flights")?;
        self.with_airports(flights).await
    }

    pub async fn delete_flight(&self, id: i64) -> Result<(), FlightServiceError> {
        if !self.flights.delete(id).await? {
            return Err(FlightServiceError::NotFound(format!("Flight with ID {}", id)));
        }
        self.invalidate().await;
        Ok(())
    }

    // ---- trips ----

    pub async fn create_trip(&self, input: CreateTripInput) -> Result<Trip, FlightServiceError> {
        let name = non_blank(Some(input.name.as_str())).ok_or_else(|| {
            FlightServiceError::ValidationError("Trip name cannot be empty".to_string())
        })?;
        if input.end_date < input.start_date {
            return Err(FlightServiceError::ValidationError(
                "Trip cannot end before it starts".to_string(),
            ));
        }

        let slug = match non_blank(input.slug.as_deref()) {
            Some(requested) => {
                let slug = generate_slug(requested);
                if slug.is_empty() {
                    return Err(FlightServiceError::ValidationError(format!(
                        "Invalid slug: {}",
                        requested
                    )));
                }
                if self.trips.get_by_slug(&slug).await?.is_some() {
                    return Err(FlightServiceError::Duplicate(slug));
                }
                slug
            }
            None => self.free_trip_slug(name).await?,
        };

        let trip = self
            .trips
            .create(&Trip {
                id: 0,
                slug,
                name: name.to_string(),
                description: non_blank(input.description.as_deref()).map(str::to_string),
                start_date: input.start_date,
                end_date: input.end_date,
            })
            .await?;
        tracing::info!(id = trip.id, slug = %trip.slug, "Trip created");
        Ok(trip)
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>, FlightServiceError> {
        Ok(self.trips.list().await.context("Failed to list trips")?)
    }

    /// A trip with its flights in departure order and their summed distance
    pub async fn get_trip(&self, slug: &str) -> Result<TripDetail, FlightServiceError> {
        let trip = self
            .trips
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| FlightServiceError::NotFound(format!("Trip {}", slug)))?;

        let flights = self.flights.list_by_trip(trip.id).await?;
        let flights = self.with_airports(flights).await?;
        let total_distance_km =
            round_tenth(total_distance(flights.iter().map(|f| &f.flight)));

        Ok(TripDetail {
            trip,
            flights,
            total_distance_km,
        })
    }

    // ---- stats ----

    pub async fn stats(&self) -> Result<FlightStats, FlightServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<FlightStats>(CACHE_KEY_STATS).await {
            return Ok(cached);
        }

        let flights = self.list_flights().await?;
        let stats = compute_stats(&flights);
        if let Err(e) = self.cache.set(CACHE_KEY_STATS, &stats, STATS_TTL).await {
            tracing::warn!(error = %e, "Failed to cache flight stats");
        }
        Ok(stats)
    }

    async fn airport_by_code(&self, code: &str) -> Result<Airport, FlightServiceError> {
        let iata = normalize_iata(code).ok_or_else(|| {
            FlightServiceError::ValidationError(format!("Invalid IATA code '{}'", code))
        })?;
        self.airports
            .get_by_iata(&iata)
            .await?
            .ok_or_else(|| FlightServiceError::ValidationError(format!("Unknown airport {}", iata)))
    }

    async fn with_airports(
        &self,
        flights: Vec<Flight>,
    ) -> Result<Vec<FlightDetail>, FlightServiceError> {
        let airports: HashMap<i64, Airport> = self
            .airports
            .list()
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        flights
            .into_iter()
            .map(|flight| {
                let flight_id = flight.id;
                let lookup = |id: i64| {
                    airports.get(&id).cloned().ok_or_else(|| {
                        FlightServiceError::InternalError(anyhow::anyhow!(
                            "Flight {} references missing airport {}",
                            flight_id,
                            id
                        ))
                    })
                };
                Ok(FlightDetail {
                    departure: lookup(flight.departure_airport_id)?,
                    arrival: lookup(flight.arrival_airport_id)?,
                    flight,
                })
            })
            .collect()
    }

    async fn free_trip_slug(&self, name: &str) -> Result<String, FlightServiceError> {
        let base = match generate_slug(name) {
            slug if slug.is_empty() => "trip".to_string(),
            slug => slug,
        };
        for candidate in slug_candidates(&base) {
            if self.trips.get_by_slug(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(FlightServiceError::Duplicate(base))
    }

    async fn invalidate(&self) {
        self.cache.delete_pattern("flights:*").await;
    }
}

fn validate_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<(), FlightServiceError> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(FlightServiceError::ValidationError(format!(
                    "Latitude {} out of range",
                    lat
                )));
            }
            if !(-180.0..=180.0).contains(&lon) {
                return Err(FlightServiceError::ValidationError(format!(
                    "Longitude {} out of range",
                    lon
                )));
            }
            Ok(())
        }
        _ => Err(FlightServiceError::ValidationError(
            "Latitude and longitude must be given together".to_string(),
        )),
    }
}

fn round_tenth(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

/// Great-circle distance rounded to 0.1 km, when both ends are located
fn flight_distance(departure: &Airport, arrival: &Airport) -> Option<f64> {
    let (from, to) = (departure.coordinates()?, arrival.coordinates()?);
    Some(round_tenth(haversine_km(from, to)))
}

/// Sum of known distances; `0.0` for an empty log
fn total_distance<'a>(flights: impl Iterator<Item = &'a Flight>) -> f64 {
    flights
        .filter_map(|f| f.distance_km)
        .fold(0.0, |total, km| total + km)
}

/// Aggregate a flight list. Ties in the top lists break alphabetically.
pub fn compute_stats(flights: &[FlightDetail]) -> FlightStats {
    let mut airports = HashSet::new();
    let mut countries = HashSet::new();
    let mut routes: HashMap<(&str, &str), usize> = HashMap::new();
    let mut airlines: HashMap<&str, usize> = HashMap::new();
    let mut per_year: BTreeMap<i32, usize> = BTreeMap::new();

    for detail in flights {
        for airport in [&detail.departure, &detail.arrival] {
            airports.insert(airport.id);
            if !airport.country.is_empty() {
                countries.insert(airport.country.as_str());
            }
        }
        *routes
            .entry((detail.departure.iata_code.as_str(), detail.arrival.iata_code.as_str()))
            .or_default() += 1;
        *airlines.entry(detail.flight.airline.as_str()).or_default() += 1;
        *per_year
            .entry(detail.flight.departure_time.year())
            .or_default() += 1;
    }

    let longest_flight = flights
        .iter()
        .filter(|f| f.flight.distance_km.is_some())
        .max_by(|a, b| {
            a.flight
                .distance_km
                .partial_cmp(&b.flight.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned();

    let mut top_routes: Vec<RouteCount> = routes
        .into_iter()
        .map(|((from, to), count)| RouteCount {
            from: from.to_string(),
            to: to.to_string(),
            count,
        })
        .collect();
    top_routes.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });
    top_routes.truncate(TOP_N);

    let mut top_airlines: Vec<AirlineCount> = airlines
        .into_iter()
        .map(|(airline, count)| AirlineCount {
            airline: airline.to_string(),
            count,
        })
        .collect();
    top_airlines.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.airline.cmp(&b.airline)));
    top_airlines.truncate(TOP_N);

    FlightStats {
        total_flights: flights.len(),
        total_distance_km: round_tenth(total_distance(flights.iter().map(|f| &f.flight))),
        total_duration_minutes: flights.iter().map(|f| f.flight.duration_minutes).sum(),
        unique_airports: airports.len(),
        unique_countries: countries.len(),
        longest_flight,
        top_routes,
        top_airlines,
        flights_per_year: per_year.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAirportRepository, SqlxFlightRepository, SqlxTripRepository,
    };
    use crate::db::{create_test_pool, migrations::run_migrations};
    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    async fn setup() -> FlightService {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        FlightService::new(
            SqlxAirportRepository::boxed(pool.clone()),
            SqlxFlightRepository::boxed(pool.clone()),
            SqlxTripRepository::boxed(pool),
            Arc::new(MemoryCache::default()),
        )
    }

    fn airport(code: &str, country: &str, coords: Option<(f64, f64)>) -> CreateAirportInput {
        CreateAirportInput {
            iata_code: code.into(),
            name: format!("{} Airport", code),
            city: String::new(),
            country: country.into(),
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
        }
    }

    fn flight(number: &str, from: &str, to: &str, day: u32) -> CreateFlightInput {
        let departure = Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap();
        CreateFlightInput {
            flight_number: number.into(),
            airline: "British Airways".into(),
            departure_iata: from.into(),
            arrival_iata: to.into(),
            departure_time: departure,
            arrival_time: departure + chrono::Duration::minutes(470),
            ..Default::default()
        }
    }

    async fn seed_airports(service: &FlightService) {
        service
            .create_airport(airport("LHR", "United Kingdom", Some((51.4700, -0.4543))))
            .await
            .unwrap();
        service
            .create_airport(airport("JFK", "United States", Some((40.6413, -73.7781))))
            .await
            .unwrap();
        service
            .create_airport(airport("KEF", "Iceland", None))
            .await
            .unwrap();
    }

    #[test]
    fn test_haversine_known_distance() {
        let d = haversine_km((51.4700, -0.4543), (40.6413, -73.7781));
        assert!((d - 5555.0).abs() < 15.0, "got {}", d);
        assert_eq!(haversine_km((10.0, 20.0), (10.0, 20.0)), 0.0);
    }

    #[test]
    fn test_normalize_iata() {
        assert_eq!(normalize_iata(" lhr "), Some("LHR".to_string()));
        assert_eq!(normalize_iata("LH"), None);
        assert_eq!(normalize_iata("LH1"), None);
        assert_eq!(normalize_iata("ÄBC"), None);
    }

    #[tokio::test]
    async fn test_airport_validation() {
        let service = setup().await;
        assert!(matches!(
            service.create_airport(airport("XX", "", None)).await,
            Err(FlightServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create_airport(airport("ABC", "", Some((91.0, 0.0)))).await,
            Err(FlightServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create_airport(airport("ABC", "", Some((0.0, -181.0)))).await,
            Err(FlightServiceError::ValidationError(_))
        ));
        let mut half = airport("ABC", "", None);
        half.latitude = Some(1.0);
        assert!(matches!(
            service.create_airport(half).await,
            Err(FlightServiceError::ValidationError(_))
        ));

        let created = service.create_airport(airport("abc", "", None)).await.unwrap();
        assert_eq!(created.iata_code, "ABC");
        assert!(matches!(
            service.create_airport(airport("ABC", "", None)).await,
            Err(FlightServiceError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_create_flight_computes_distance_and_duration() {
        let service = setup().await;
        seed_airports(&service).await;

        let detail = service
            .create_flight(flight("ba117", "LHR", "JFK", 1))
            .await
            .unwrap();
        assert_eq!(detail.flight.flight_number, "BA117");
        assert_eq!(detail.flight.duration_minutes, 470);
        let distance = detail.flight.distance_km.unwrap();
        assert!((distance - 5555.0).abs() < 15.0);

        let no_coords = service
            .create_flight(flight("FI451", "KEF", "JFK", 2))
            .await
            .unwrap();
        assert_eq!(no_coords.flight.distance_km, None);
    }

    #[tokio::test]
    async fn test_create_flight_rejections() {
        let service = setup().await;
        seed_airports(&service).await;

        let same = flight("BA1", "LHR", "LHR", 1);
        assert!(matches!(
            service.create_flight(same).await,
            Err(FlightServiceError::ValidationError(_))
        ));

        let unknown = flight("BA1", "LHR", "CDG", 1);
        assert!(matches!(
            service.create_flight(unknown).await,
            Err(FlightServiceError::ValidationError(_))
        ));

        let mut backwards = flight("BA1", "LHR", "JFK", 1);
        backwards.arrival_time = backwards.departure_time;
        assert!(matches!(
            service.create_flight(backwards).await,
            Err(FlightServiceError::ValidationError(_))
        ));

        let mut bad_trip = flight("BA1", "LHR", "JFK", 1);
        bad_trip.trip_id = Some(77);
        assert!(matches!(
            service.create_flight(bad_trip).await,
            Err(FlightServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_trips() {
        let service = setup().await;
        seed_airports(&service).await;

        let june = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        assert!(matches!(
            service
                .create_trip(CreateTripInput {
                    name: "Backwards".into(),
                    slug: None,
                    description: None,
                    start_date: june(10),
                    end_date: june(1),
                })
                .await,
            Err(FlightServiceError::ValidationError(_))
        ));

        let trip = service
            .create_trip(CreateTripInput {
                name: "New York 2024".into(),
                slug: None,
                description: None,
                start_date: june(1),
                end_date: june(8),
            })
            .await
            .unwrap();
        assert_eq!(trip.slug, "new-york-2024");

        let mut out = flight("BA117", "LHR", "JFK", 1);
        out.trip_id = Some(trip.id);
        let mut back = flight("BA112", "JFK", "LHR", 7);
        back.trip_id = Some(trip.id);
        service.create_flight(back).await.unwrap();
        service.create_flight(out).await.unwrap();

        let detail = service.get_trip("new-york-2024").await.unwrap();
        assert_eq!(detail.flights.len(), 2);
        assert_eq!(detail.flights[0].flight.flight_number, "BA117");
        assert!((detail.total_distance_km - 11110.0).abs() < 30.0);

        assert!(matches!(
            service.get_trip("nowhere").await,
            Err(FlightServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats() {
        let service = setup().await;
        seed_airports(&service).await;

        service.create_flight(flight("BA117", "LHR", "JFK", 1)).await.unwrap();
        service.create_flight(flight("BA117", "LHR", "JFK", 3)).await.unwrap();
        let mut icelandic = flight("FI451", "KEF", "JFK", 5);
        icelandic.airline = "Icelandair".into();
        service.create_flight(icelandic).await.unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total_flights, 3);
        assert_eq!(stats.unique_airports, 3);
        assert_eq!(stats.unique_countries, 3);
        assert_eq!(stats.total_duration_minutes, 3 * 470);
        assert_eq!(
            stats.top_routes[0],
            RouteCount {
                from: "LHR".into(),
                to: "JFK".into(),
                count: 2
            }
        );
        assert_eq!(stats.top_airlines[0].airline, "British Airways");
        assert_eq!(stats.flights_per_year, vec![(2024, 3)]);
        assert_eq!(
            stats.longest_flight.unwrap().departure.iata_code,
            "LHR"
        );

        // cached stats are dropped when a flight is removed
        let first = service.list_flights().await.unwrap()[0].flight.id;
        service.delete_flight(first).await.unwrap();
        assert_eq!(service.stats().await.unwrap().total_flights, 2);
    }

    #[test]
    fn test_stats_of_nothing() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total_flights, 0);
        assert!(stats.longest_flight.is_none());
        assert!(stats.top_routes.is_empty());
        assert!(stats.total_distance_km.is_sign_positive());
        assert_eq!(serde_json::to_value(&stats).unwrap()["total_distance_km"], 0.0);
    }

    #[tokio::test]
    async fn test_locate_airport_fills_flight_distances() {
        let service = setup().await;
        seed_airports(&service).await;
        service.create_flight(flight("FI451", "KEF", "JFK", 2)).await.unwrap();
        assert_eq!(service.stats().await.unwrap().total_distance_km, 0.0);

        let kef = service
            .list_airports()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.iata_code == "KEF")
            .unwrap();
        let updated = service.locate_airport(kef.id, 63.985, -22.6056).await.unwrap();
        assert_eq!(updated, 1);

        let logged = &service.list_flights().await.unwrap()[0];
        let distance = logged.flight.distance_km.unwrap();
        assert!((distance - 4163.1).abs() < 1.0, "got {}", distance);
        // stats were cached before the airport was located
        assert_eq!(service.stats().await.unwrap().total_distance_km, distance);

        // locating again with the same coordinates changes nothing
        assert_eq!(service.locate_airport(kef.id, 63.985, -22.6056).await.unwrap(), 0);
        assert!(matches!(
            service.locate_airport(kef.id, 95.0, 0.0).await,
            Err(FlightServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.locate_airport(9_999, 1.0, 1.0).await,
            Err(FlightServiceError::NotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_haversine_symmetric_and_bounded(
            lat1 in -90.0f64..90.0, lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lon2 in -180.0f64..180.0,
        ) {
            let ab = haversine_km((lat1, lon1), (lat2, lon2));
            let ba = haversine_km((lat2, lon2), (lat1, lon1));
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!(ab >= 0.0);
            prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }
    }
}
