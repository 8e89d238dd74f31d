//! Flight repository

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{CabinClass, Flight};

#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn create(&self, flight: &Flight) -> Result<Flight>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Flight>>;

    /// Most recent departure first
    async fn list(&self) -> Result<Vec<Flight>>;

    /// Flights of one trip in departure order
    async fn list_by_trip(&self, trip_id: i64) -> Result<Vec<Flight>>;

    /// Flights departing from or arriving at an airport
    async fn list_by_airport(&self, airport_id: i64) -> Result<Vec<Flight>>;

    async fn update_distance(&self, id: i64, distance_km: Option<f64>) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: i64,
    flight_number: String,
    airline: String,
    departure_airport_id: i64,
    arrival_airport_id: i64,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    aircraft: Option<String>,
    cabin_class: String,
    seat: Option<String>,
    distance_km: Option<f64>,
    duration_minutes: i64,
    trip_id: Option<i64>,
    notes: Option<String>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = anyhow::Error;

    fn try_from(row: FlightRow) -> Result<Self> {
        let cabin_class = CabinClass::parse(&row.cabin_class)
            .ok_or_else(|| anyhow!("Unknown cabin class '{}'", row.cabin_class))?;
        Ok(Flight {
            id: row.id,
            flight_number: row.flight_number,
            airline: row.airline,
            departure_airport_id: row.departure_airport_id,
            arrival_airport_id: row.arrival_airport_id,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            aircraft: row.aircraft,
            cabin_class,
            seat: row.seat,
            distance_km: row.distance_km,
            duration_minutes: row.duration_minutes,
            trip_id: row.trip_id,
            notes: row.notes,
        })
    }
}

const SELECT_FLIGHT: &str = r#"
    SELECT id, flight_number, airline, departure_airport_id, arrival_airport_id,
           departure_time, arrival_time, aircraft, cabin_class, seat, distance_km,
           duration_minutes, trip_id, notes
    FROM flights
"#;

pub struct SqlxFlightRepository {
    pool: DynDatabasePool,
}

impl SqlxFlightRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FlightRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FlightRepository for SqlxFlightRepository {
    async fn create(&self, flight: &Flight) -> Result<Flight> {
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO flights (flight_number, airline, departure_airport_id,
                                     arrival_airport_id, departure_time, arrival_time, aircraft,
                                     cabin_class, seat, distance_km, duration_minutes, trip_id,
                                     notes)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&flight.flight_number)
            .bind(&flight.airline)
            .bind(flight.departure_airport_id)
            .bind(flight.arrival_airport_id)
            .bind(flight.departure_time)
            .bind(flight.arrival_time)
            .bind(&flight.aircraft)
            .bind(flight.cabin_class.as_str())
            .bind(&flight.seat)
            .bind(flight.distance_km)
            .bind(flight.duration_minutes)
            .bind(flight.trip_id)
            .bind(&flight.notes)
            .execute(conn)
            .await
            .context("Failed to create flight")?
            .inserted_id()
        });

        Ok(Flight {
            id,
            ..flight.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Flight>> {
        let sql = format!("{} WHERE id = ?", SELECT_FLIGHT);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, FlightRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get flight by ID")?
        });
        row.map(Flight::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Flight>> {
        let sql = format!("{} ORDER BY departure_time DESC, id DESC", SELECT_FLIGHT);
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, FlightRow>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list flights")?
        });
        rows.into_iter().map(Flight::try_from).collect()
    }

    async fn list_by_trip(&self, trip_id: i64) -> Result<Vec<Flight>> {
        let sql = format!(
            "{} WHERE trip_id = ? ORDER BY departure_time, id",
            SELECT_FLIGHT
        );
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, FlightRow>(&sql)
                .bind(trip_id)
                .fetch_all(conn)
                .await
                .context("Failed to list flights for trip")?
        });
        rows.into_iter().map(Flight::try_from).collect()
    }

    async fn list_by_airport(&self, airport_id: i64) -> Result<Vec<Flight>> {
        let sql = format!(
            "{} WHERE departure_airport_id = ? OR arrival_airport_id = ? ORDER BY id",
            SELECT_FLIGHT
        );
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, FlightRow>(&sql)
                .bind(airport_id)
                .bind(airport_id)
                .fetch_all(conn)
                .await
                .context("Failed to list flights for airport")?
        });
        rows.into_iter().map(Flight::try_from).collect()
    }

    async fn update_distance(&self, id: i64, distance_km: Option<f64>) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("UPDATE flights SET distance_km = ? WHERE id = ?")
                .bind(distance_km)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update flight distance")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM flights WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete flight")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{AirportRepository, SqlxAirportRepository};
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::CreateAirportInput;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_create_list_delete() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let airports = SqlxAirportRepository::boxed(pool.clone());
        let repo = SqlxFlightRepository::boxed(pool);

        let mut ids = Vec::new();
        for code in ["AMS", "BCN"] {
            let airport = airports
                .create(&CreateAirportInput {
                    iata_code: code.into(),
                    name: code.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(airport.id);
        }

        let departure = Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap();
        let template = Flight {
            id: 0,
            flight_number: "KL1673".into(),
            airline: "KLM".into(),
            departure_airport_id: ids[0],
            arrival_airport_id: ids[1],
            departure_time: departure,
            arrival_time: departure + Duration::minutes(125),
            aircraft: Some("Boeing 737-800".into()),
            cabin_class: CabinClass::Economy,
            seat: Some("12A".into()),
            distance_km: Some(1240.5),
            duration_minutes: 125,
            trip_id: None,
            notes: None,
        };

        let first = repo.create(&template).await.unwrap();
        let later = repo
            .create(&Flight {
                departure_time: departure + Duration::days(7),
                arrival_time: departure + Duration::days(7) + Duration::minutes(130),
                departure_airport_id: ids[1],
                arrival_airport_id: ids[0],
                cabin_class: CabinClass::Business,
                ..template.clone()
            })
            .await
            .unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed[0].id, later.id);
        assert_eq!(listed[0].cabin_class, CabinClass::Business);
        assert_eq!(repo.get_by_id(first.id).await.unwrap(), Some(first.clone()));

        assert_eq!(repo.list_by_airport(ids[1]).await.unwrap().len(), 2);
        assert!(repo.update_distance(first.id, None).await.unwrap());
        assert_eq!(repo.get_by_id(first.id).await.unwrap().unwrap().distance_km, None);

        assert!(repo.delete(first.id).await.unwrap());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
