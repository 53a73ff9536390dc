//! PostgreSQL user profiles.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use super::{UpsertOutcome, User, UserRepository, UserStoreError};
use crate::config::DatabaseConfig;
use crate::logging::OpTimer;

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    phone_no TEXT NOT NULL UNIQUE,
    interests JSONB,
    favorites JSONB
)";

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

fn parse_user(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone_no: row.try_get("phone_no")?,
        interests: row.try_get("interests")?,
        favorites: row.try_get("favorites")?,
    })
}

impl PgUserRepository {
    /// Connect and make sure the `users` table exists.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    pub async fn ensure_schema(&self) -> Result<(), UserStoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_column(
        &self,
        column: &'static str,
        id: i64,
        value: Value,
    ) -> Result<Option<User>, UserStoreError> {
        let sql = format!(
            "UPDATE users SET {column} = $2 WHERE id = $1 \
             RETURNING id, name, phone_no, interests, favorites"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_user).transpose()?)
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    /// `xmax = 0` holds only for a freshly inserted row.
    async fn upsert_by_phone(
        &self,
        name: &str,
        phone_no: &str,
    ) -> Result<(User, UpsertOutcome), UserStoreError> {
        let timer = OpTimer::new("postgres", "upsert_user");
        let result: Result<(User, UpsertOutcome), UserStoreError> = async {
            let row = sqlx::query(
                r"
                INSERT INTO users (name, phone_no)
                VALUES ($1, $2)
                ON CONFLICT (phone_no) DO UPDATE SET name = EXCLUDED.name
                RETURNING id, name, phone_no, interests, favorites, (xmax = 0) AS inserted
                ",
            )
            .bind(name)
            .bind(phone_no)
            .fetch_one(&self.pool)
            .await?;

            let inserted: bool = row.try_get("inserted")?;
            let outcome = if inserted {
                UpsertOutcome::Created
            } else {
                UpsertOutcome::Updated
            };
            Ok((parse_user(&row)?, outcome))
        }
        .await;
        timer.finish_with_result(&result);
        result
    }

    async fn find(&self, id: i64) -> Result<Option<User>, UserStoreError> {
        let row = sqlx::query(
            "SELECT id, name, phone_no, interests, favorites FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(parse_user).transpose()?)
    }

    async fn set_interests(
        &self,
        id: i64,
        interests: Value,
    ) -> Result<Option<User>, UserStoreError> {
        self.set_column("interests", id, interests).await
    }

    async fn set_favorites(
        &self,
        id: i64,
        favorites: Value,
    ) -> Result<Option<User>, UserStoreError> {
        self.set_column("favorites", id, favorites).await
    }
}
