//! Flight log models: airports, flights and trips

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Airport identified by its IATA code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Airport {
    pub id: i64,
    /// Three uppercase letters
    pub iata_code: String,
    pub name: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Airport {
    /// Both coordinates, when known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Input for creating an airport
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAirportInput {
    pub iata_code: String,
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Seat class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::PremiumEconomy => "premium_economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "economy" => Some(CabinClass::Economy),
            "premium_economy" => Some(CabinClass::PremiumEconomy),
            "business" => Some(CabinClass::Business),
            "first" => Some(CabinClass::First),
            _ => None,
        }
    }
}

/// One flown leg
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: i64,
    pub flight_number: String,
    pub airline: String,
    pub departure_airport_id: i64,
    pub arrival_airport_id: i64,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub aircraft: Option<String>,
    pub cabin_class: CabinClass,
    pub seat: Option<String>,
    /// Great-circle distance, when both airports have coordinates
    pub distance_km: Option<f64>,
    pub duration_minutes: i64,
    pub trip_id: Option<i64>,
    pub notes: Option<String>,
}

/// Input for logging a flight. Airports are referenced by IATA code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFlightInput {
    pub flight_number: String,
    pub airline: String,
    pub departure_iata: String,
    pub arrival_iata: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    #[serde(default)]
    pub aircraft: Option<String>,
    #[serde(default)]
    pub cabin_class: CabinClass,
    #[serde(default)]
    pub seat: Option<String>,
    #[serde(default)]
    pub trip_id: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Flight with both airports resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightDetail {
    #[serde(flatten)]
    pub flight: Flight,
    pub departure: Airport,
    pub arrival: Airport,
}

/// A named journey grouping flights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Input for creating a trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTripInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Trip with its flights and total distance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripDetail {
    #[serde(flatten)]
    pub trip: Trip,
    pub flights: Vec<FlightDetail>,
    pub total_distance_km: f64,
}

/// A route and how often it was flown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteCount {
    pub from: String,
    pub to: String,
    pub count: usize,
}

/// An airline and how often it was flown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AirlineCount {
    pub airline: String,
    pub count: usize,
}

/// Aggregate flight-log statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightStats {
    pub total_flights: usize,
    pub total_distance_km: f64,
    pub total_duration_minutes: i64,
    pub unique_airports: usize,
    pub unique_countries: usize,
    pub longest_flight: Option<FlightDetail>,
    pub top_routes: Vec<RouteCount>,
    pub top_airlines: Vec<AirlineCount>,
    /// (year, flights) in ascending year order
    pub flights_per_year: Vec<(i32, usize)>,
}
