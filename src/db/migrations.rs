//! Embedded schema migrations
//!
//! Each migration carries SQL for both backends. Applied versions are
//! recorded in `_migrations`, so running the set again is a no-op.

use anyhow::{Context, Result};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A schema migration with SQL for SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, ascending
    pub version: i64,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

/// All migrations, applied in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_taxonomy",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(120) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(120) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(120) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(120) NOT NULL UNIQUE,
                name VARCHAR(120) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(300) NOT NULL,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                excerpt TEXT NOT NULL,
                cover_image VARCHAR(500),
                category_id INTEGER,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reading_minutes INTEGER NOT NULL DEFAULT 1,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
                CHECK ((status = 'published' AND published_at IS NOT NULL)
                    OR (status = 'draft' AND published_at IS NULL))
            );
            CREATE INDEX IF NOT EXISTS idx_posts_status_published ON posts(status, published_at);
            CREATE INDEX IF NOT EXISTS idx_posts_category_id ON posts(category_id);
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_post_tags_tag_id ON post_tags(tag_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(300) NOT NULL,
                content MEDIUMTEXT NOT NULL,
                content_html MEDIUMTEXT NOT NULL,
                excerpt TEXT NOT NULL,
                cover_image VARCHAR(500),
                category_id BIGINT,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                reading_minutes INT NOT NULL DEFAULT 1,
                published_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
                CHECK ((status = 'published' AND published_at IS NOT NULL)
                    OR (status = 'draft' AND published_at IS NULL))
            );
            CREATE INDEX idx_posts_status_published ON posts(status, published_at);
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_post_tags_tag_id ON post_tags(tag_id);
        "#,
    },
    Migration {
        version: 3,
        name: "create_portfolio",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(300) NOT NULL,
                summary TEXT NOT NULL,
                description TEXT NOT NULL,
                tech_stack TEXT NOT NULL,
                repo_url VARCHAR(500),
                live_url VARCHAR(500),
                image_url VARCHAR(500),
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                featured BOOLEAN NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                CHECK ((status = 'published' AND published_at IS NOT NULL)
                    OR (status = 'draft' AND published_at IS NULL))
            );
            CREATE INDEX IF NOT EXISTS idx_projects_featured ON projects(featured, sort_order);
            CREATE TABLE IF NOT EXISTS skills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                category VARCHAR(100) NOT NULL,
                proficiency INTEGER NOT NULL,
                icon VARCHAR(200),
                sort_order INTEGER NOT NULL DEFAULT 0,
                CHECK (proficiency BETWEEN 1 AND 5)
            );
            CREATE TABLE IF NOT EXISTS testimonials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                author_name VARCHAR(200) NOT NULL,
                author_role VARCHAR(200),
                company VARCHAR(200),
                content TEXT NOT NULL,
                rating INTEGER NOT NULL,
                featured BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                CHECK (rating BETWEEN 1 AND 5)
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS projects (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(300) NOT NULL,
                summary TEXT NOT NULL,
                description MEDIUMTEXT NOT NULL,
                tech_stack TEXT NOT NULL,
                repo_url VARCHAR(500),
                live_url VARCHAR(500),
                image_url VARCHAR(500),
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                featured BOOLEAN NOT NULL DEFAULT FALSE,
                sort_order INT NOT NULL DEFAULT 0,
                published_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                CHECK ((status = 'published' AND published_at IS NOT NULL)
                    OR (status = 'draft' AND published_at IS NULL))
            );
            CREATE INDEX idx_projects_featured ON projects(featured, sort_order);
            CREATE TABLE IF NOT EXISTS skills (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                category VARCHAR(100) NOT NULL,
                proficiency INT NOT NULL,
                icon VARCHAR(200),
                sort_order INT NOT NULL DEFAULT 0,
                CHECK (proficiency BETWEEN 1 AND 5)
            );
            CREATE TABLE IF NOT EXISTS testimonials (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                author_name VARCHAR(200) NOT NULL,
                author_role VARCHAR(200),
                company VARCHAR(200),
                content TEXT NOT NULL,
                rating INT NOT NULL,
                featured BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL,
                CHECK (rating BETWEEN 1 AND 5)
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_flight_log",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS airports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                iata_code CHAR(3) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                city VARCHAR(120) NOT NULL,
                country VARCHAR(120) NOT NULL,
                latitude REAL,
                longitude REAL
            );
            CREATE TABLE IF NOT EXISTS trips (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                description TEXT,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL
            );
            CREATE TABLE IF NOT EXISTS flights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                flight_number VARCHAR(20) NOT NULL,
                airline VARCHAR(120) NOT NULL,
                departure_airport_id INTEGER NOT NULL,
                arrival_airport_id INTEGER NOT NULL,
                departure_time TIMESTAMP NOT NULL,
                arrival_time TIMESTAMP NOT NULL,
                aircraft VARCHAR(120),
                cabin_class VARCHAR(20) NOT NULL DEFAULT 'economy',
                seat VARCHAR(10),
                distance_km REAL,
                duration_minutes INTEGER NOT NULL,
                trip_id INTEGER,
                notes TEXT,
                FOREIGN KEY (departure_airport_id) REFERENCES airports(id),
                FOREIGN KEY (arrival_airport_id) REFERENCES airports(id),
                FOREIGN KEY (trip_id) REFERENCES trips(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flights_departure_time ON flights(departure_time);
            CREATE INDEX IF NOT EXISTS idx_flights_trip_id ON flights(trip_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS airports (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                iata_code CHAR(3) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                city VARCHAR(120) NOT NULL,
                country VARCHAR(120) NOT NULL,
                latitude DOUBLE,
                longitude DOUBLE
            );
            CREATE TABLE IF NOT EXISTS trips (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                description TEXT,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL
            );
            CREATE TABLE IF NOT EXISTS flights (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                flight_number VARCHAR(20) NOT NULL,
                airline VARCHAR(120) NOT NULL,
                departure_airport_id BIGINT NOT NULL,
                arrival_airport_id BIGINT NOT NULL,
                departure_time TIMESTAMP NOT NULL,
                arrival_time TIMESTAMP NOT NULL,
                aircraft VARCHAR(120),
                cabin_class VARCHAR(20) NOT NULL DEFAULT 'economy',
                seat VARCHAR(10),
                distance_km DOUBLE,
                duration_minutes BIGINT NOT NULL,
                trip_id BIGINT,
                notes TEXT,
                FOREIGN KEY (departure_airport_id) REFERENCES airports(id),
                FOREIGN KEY (arrival_airport_id) REFERENCES airports(id),
                FOREIGN KEY (trip_id) REFERENCES trips(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_flights_departure_time ON flights(departure_time);
        "#,
    },
];

/// Apply pending migrations, returning how many ran.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;
    let mut count = 0;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<Vec<i64>> {
    with_driver!(pool, conn => {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _migrations ORDER BY version")
            .fetch_all(conn)
            .await
            .context("Failed to read applied migrations")
    })
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    with_driver!(pool, conn => {
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(conn)
            .await
            .context("Failed to record migration")?;
    });

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a script into statements on `;`, dropping comment-only fragments.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());
        let count = run_migrations(&pool).await.unwrap();
        assert_eq!(count, MIGRATIONS.len());

        assert_eq!(run_migrations(&pool).await.unwrap(), 0);
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_published_post_requires_date() {
        let pool = migrated_pool().await;
        let conn = pool.as_sqlite().unwrap();

        let result = sqlx::query(
            "INSERT INTO posts (slug, title, content, content_html, excerpt, status, created_at, updated_at)
             VALUES ('a', 'A', 'x', 'x', 'x', 'published', '2024-01-01', '2024-01-01')",
        )
        .execute(conn)
        .await;
        assert!(result.is_err());

        let result = sqlx::query(
            "INSERT INTO posts (slug, title, content, content_html, excerpt, status, published_at, created_at, updated_at)
             VALUES ('a', 'A', 'x', 'x', 'x', 'published', '2024-01-01', '2024-01-01', '2024-01-01')",
        )
        .execute(conn)
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_category_delete_detaches_posts() {
        let pool = migrated_pool().await;
        let conn = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO categories (slug, name, created_at) VALUES ('notes', 'Notes', '2024-01-01')")
            .execute(conn)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO posts (slug, title, content, content_html, excerpt, category_id, status, created_at, updated_at)
             VALUES ('a', 'A', 'x', 'x', 'x', 1, 'draft', '2024-01-01', '2024-01-01')",
        )
        .execute(conn)
        .await
        .unwrap();

        sqlx::query("DELETE FROM categories WHERE id = 1")
            .execute(conn)
            .await
            .unwrap();

        let category: Option<i64> = sqlx::query_scalar("SELECT category_id FROM posts WHERE slug = 'a'")
            .fetch_one(conn)
            .await
            .unwrap();
        assert_eq!(category, None);
    }

    #[tokio::test]
    async fn test_skill_proficiency_checked() {
        let pool = migrated_pool().await;
        let conn = pool.as_sqlite().unwrap();

        let result = sqlx::query(
            "INSERT INTO skills (name, category, proficiency) VALUES ('Rust', 'Languages', 6)",
        )
        .execute(conn)
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- just a comment\n;\nCREATE INDEX i ON a(id);  ";
        let statements = split_sql_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[test]
    fn test_versions_are_ascending_and_unique() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }
}
