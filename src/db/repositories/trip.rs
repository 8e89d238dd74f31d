//! Trip repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::Trip;

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create(&self, trip: &Trip) -> Result<Trip>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Trip>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Trip>>;

    /// Most recent start first
    async fn list(&self) -> Result<Vec<Trip>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            id: row.id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
        }
    }
}

const SELECT_TRIP: &str = "SELECT id, slug, name, description, start_date, end_date FROM trips";

pub struct SqlxTripRepository {
    pool: DynDatabasePool,
}

impl SqlxTripRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TripRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TripRepository for SqlxTripRepository {
    async fn create(&self, trip: &Trip) -> Result<Trip> {
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO trips (slug, name, description, start_date, end_date) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&trip.slug)
            .bind(&trip.name)
            .bind(&trip.description)
            .bind(trip.start_date)
            .bind(trip.end_date)
            .execute(conn)
            .await
            .context("Failed to create trip")?
            .inserted_id()
        });

        Ok(Trip {
            id,
            ..trip.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Trip>> {
        let sql = format!("{} WHERE id = ?", SELECT_TRIP);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TripRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get trip by ID")?
        });
        Ok(row.map(Trip::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Trip>> {
        let sql = format!("{} WHERE slug = ?", SELECT_TRIP);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TripRow>(&sql)
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get trip by slug")?
        });
        Ok(row.map(Trip::from))
    }

    async fn list(&self) -> Result<Vec<Trip>> {
        let sql = format!("{} ORDER BY start_date DESC, id DESC", SELECT_TRIP);
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TripRow>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list trips")?
        });
        Ok(rows.into_iter().map(Trip::from).collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM trips WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete trip")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}
