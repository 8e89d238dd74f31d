//! Airport repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{Airport, CreateAirportInput};

#[async_trait]
pub trait AirportRepository: Send + Sync {
    /// `iata_code` is stored as given; callers normalise it
    async fn create(&self, input: &CreateAirportInput) -> Result<Airport>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Airport>>;

    async fn get_by_iata(&self, iata_code: &str) -> Result<Option<Airport>>;

    /// All airports by IATA code
    async fn list(&self) -> Result<Vec<Airport>>;

    /// Airports lacking latitude or longitude
    async fn list_missing_coordinates(&self) -> Result<Vec<Airport>>;

    async fn update_coordinates(&self, id: i64, latitude: f64, longitude: f64) -> Result<()>;
}

#[derive(sqlx::FromRow)]
struct AirportRow {
    id: i64,
    iata_code: String,
    name: String,
    city: String,
    country: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<AirportRow> for Airport {
    fn from(row: AirportRow) -> Self {
        Airport {
            id: row.id,
            iata_code: row.iata_code,
            name: row.name,
            city: row.city,
            country: row.country,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

const SELECT_AIRPORT: &str =
    "SELECT id, iata_code, name, city, country, latitude, longitude FROM airports";

pub struct SqlxAirportRepository {
    pool: DynDatabasePool,
}

impl SqlxAirportRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AirportRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<Airport>> {
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, AirportRow>(sql)
                .fetch_all(conn)
                .await
                .context("Failed to list airports")?
        });
        Ok(rows.into_iter().map(Airport::from).collect())
    }
}

#[async_trait]
impl AirportRepository for SqlxAirportRepository {
    async fn create(&self, input: &CreateAirportInput) -> Result<Airport> {
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO airports (iata_code, name, city, country, latitude, longitude)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.iata_code)
            .bind(&input.name)
            .bind(&input.city)
            .bind(&input.country)
            .bind(input.latitude)
            .bind(input.longitude)
            .execute(conn)
            .await
            .context("Failed to create airport")?
            .inserted_id()
        });

        Ok(Airport {
            id,
            iata_code: input.iata_code.clone(),
            name: input.name.clone(),
            city: input.city.clone(),
            country: input.country.clone(),
            latitude: input.latitude,
            longitude: input.longitude,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Airport>> {
        let sql = format!("{} WHERE id = ?", SELECT_AIRPORT);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, AirportRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get airport by ID")?
        });
        Ok(row.map(Airport::from))
    }

    async fn get_by_iata(&self, iata_code: &str) -> Result<Option<Airport>> {
        let sql = format!("{} WHERE iata_code = ?", SELECT_AIRPORT);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, AirportRow>(&sql)
                .bind(iata_code)
                .fetch_optional(conn)
                .await
                .context("Failed to get airport by IATA code")?
        });
        Ok(row.map(Airport::from))
    }

    async fn list(&self) -> Result<Vec<Airport>> {
        self.fetch_all(&format!("{} ORDER BY iata_code", SELECT_AIRPORT))
            .await
    }

    async fn list_missing_coordinates(&self) -> Result<Vec<Airport>> {
        self.fetch_all(&format!(
            "{} WHERE latitude IS NULL OR longitude IS NULL ORDER BY iata_code",
            SELECT_AIRPORT
        ))
        .await
    }

    async fn update_coordinates(&self, id: i64, latitude: f64, longitude: f64) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE airports SET latitude = ?, longitude = ? WHERE id = ?")
                .bind(latitude)
                .bind(longitude)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update airport coordinates")?;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};

    #[tokio::test]
    async fn test_missing_coordinates_and_update() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqlxAirportRepository::boxed(pool);

        let lhr = repo
            .create(&CreateAirportInput {
                iata_code: "LHR".into(),
                name: "Heathrow".into(),
                city: "London".into(),
                country: "United Kingdom".into(),
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();
        repo.create(&CreateAirportInput {
            iata_code: "JFK".into(),
            name: "John F. Kennedy".into(),
            city: "New York".into(),
            country: "United States".into(),
            latitude: Some(40.6413),
            longitude: Some(-73.7781),
        })
        .await
        .unwrap();

        let missing = repo.list_missing_coordinates().await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].iata_code, "LHR");

        repo.update_coordinates(lhr.id, 51.47, -0.4543).await.unwrap();
        assert!(repo.list_missing_coordinates().await.unwrap().is_empty());

        let fetched = repo.get_by_iata("LHR").await.unwrap().unwrap();
        assert_eq!(fetched.coordinates(), Some((51.47, -0.4543)));
        assert_eq!(repo.list().await.unwrap()[0].iata_code, "JFK");
    }
}
