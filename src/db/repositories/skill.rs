//! Skill repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{CreateSkillInput, Skill};

#[async_trait]
pub trait SkillRepository: Send + Sync {
    async fn create(&self, input: &CreateSkillInput) -> Result<Skill>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Skill>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Skill>>;

    /// Ordered by category, then `sort_order`, then name
    async fn list(&self) -> Result<Vec<Skill>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Skills whose name or category matches a lowercased `LIKE` pattern
    async fn search(&self, pattern: &str) -> Result<Vec<Skill>>;
}

#[derive(sqlx::FromRow)]
struct SkillRow {
    id: i64,
    name: String,
    category: String,
    proficiency: i32,
    icon: Option<String>,
    sort_order: i32,
}

impl From<SkillRow> for Skill {
    fn from(row: SkillRow) -> Self {
        Skill {
            id: row.id,
            name: row.name,
            category: row.category,
            proficiency: row.proficiency,
            icon: row.icon,
            sort_order: row.sort_order,
        }
    }
}

const SELECT_SKILL: &str = "SELECT id, name, category, proficiency, icon, sort_order FROM skills";
const SKILL_ORDER: &str = "ORDER BY category, sort_order, name";

pub struct SqlxSkillRepository {
    pool: DynDatabasePool,
}

impl SqlxSkillRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SkillRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SkillRepository for SqlxSkillRepository {
    async fn create(&self, input: &CreateSkillInput) -> Result<Skill> {
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO skills (name, category, proficiency, icon, sort_order) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&input.name)
            .bind(&input.category)
            .bind(input.proficiency)
            .bind(&input.icon)
            .bind(input.sort_order)
            .execute(conn)
            .await
            .context("Failed to create skill")?
            .inserted_id()
        });

        Ok(Skill {
            id,
            name: input.name.clone(),
            category: input.category.clone(),
            proficiency: input.proficiency,
            icon: input.icon.clone(),
            sort_order: input.sort_order,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Skill>> {
        let sql = format!("{} WHERE id = ?", SELECT_SKILL);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, SkillRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get skill by ID")?
        });
        Ok(row.map(Skill::from))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Skill>> {
        let sql = format!("{} WHERE name = ?", SELECT_SKILL);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, SkillRow>(&sql)
                .bind(name)
                .fetch_optional(conn)
                .await
                .context("Failed to get skill by name")?
        });
        Ok(row.map(Skill::from))
    }

    async fn list(&self) -> Result<Vec<Skill>> {
        let sql = format!("{} {}", SELECT_SKILL, SKILL_ORDER);
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, SkillRow>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list skills")?
        });
        Ok(rows.into_iter().map(Skill::from).collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM skills WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete skill")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn search(&self, pattern: &str) -> Result<Vec<Skill>> {
        let sql = format!(
            "{} WHERE LOWER(name) LIKE ? ESCAPE '!' OR LOWER(category) LIKE ? ESCAPE '!' {}",
            SELECT_SKILL, SKILL_ORDER
        );
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, SkillRow>(&sql)
                .bind(pattern)
                .bind(pattern)
                .fetch_all(conn)
                .await
                .context("Failed to search skills")?
        });
        Ok(rows.into_iter().map(Skill::from).collect())
    }
}
