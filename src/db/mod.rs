//! Database layer
//!
//! SQLite is the default backend; MySQL is selected through
//! `database.driver`. Both sit behind [`DatabasePool`], and repositories
//! dispatch to the concrete pool with [`with_driver!`].
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let posts = SqlxPostRepository::boxed(pool.clone());
//! ```

use sqlx::{mysql::MySqlQueryResult, sqlite::SqliteQueryResult};

/// Run `$body` with `$conn` bound to the concrete pool behind `$pool`.
///
/// The body is expanded once per backend, so the same sqlx query code is
/// type-checked against both SQLite and MySQL. Must be used inside a
/// function returning `anyhow::Result`.
macro_rules! with_driver {
    ($pool:expr, $conn:ident => $body:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool unavailable"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $conn = $pool
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool unavailable"))?;
                $body
            }
        }
    };
}

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, is_unavailable, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};

/// Id of the row created by an `INSERT`, for either backend.
pub(crate) trait InsertedId {
    fn inserted_id(&self) -> i64;
}

impl InsertedId for SqliteQueryResult {
    fn inserted_id(&self) -> i64 {
        self.last_insert_rowid()
    }
}

impl InsertedId for MySqlQueryResult {
    fn inserted_id(&self) -> i64 {
        self.last_insert_id() as i64
    }
}

/// SQL `IN (...)` placeholder list for `n` bound values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
