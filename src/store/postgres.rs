use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

use super::{NewBusStatus, NewStop, Store, StoreError};

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    /// Total connection attempts before startup gives up.
    pub connect_attempts: u32,
    pub connect_delay: Duration,
}

/// [`Store`] backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Opens the pool, retrying while the database is still coming up.
    #[tracing::instrument(skip(settings), fields(attempts = settings.connect_attempts))]
    pub async fn connect(settings: &PoolSettings) -> Result<Self> {
        let mut attempt = 1;
        loop {
            let result = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&settings.url)
                .await;

            match result {
                Ok(pool) => {
                    info!(attempt, "Connected to database");
                    return Ok(Self { pool });
                }
                Err(e) if attempt < settings.connect_attempts => {
                    warn!(
                        attempt,
                        error = %e,
                        retry_in_secs = settings.connect_delay.as_secs(),
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(settings.connect_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to connect to the database after {attempt} attempts")
                    });
                }
            }
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to apply migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_bus(&self, vehicle_number: i32, operator: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
INSERT INTO bus (vehicle_number, operator)
VALUES ($1, $2)
ON CONFLICT (vehicle_number) DO UPDATE SET operator = EXCLUDED.operator
            "#,
        )
        .bind(vehicle_number)
        .bind(operator)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_stop_event(
        &self,
        id: i64,
        status: &str,
        arrival_time: Option<NaiveTime>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
INSERT INTO stop_event (id, status, arrival_time)
VALUES ($1, $2, $3)
ON CONFLICT (id) DO UPDATE
SET status = EXCLUDED.status, arrival_time = EXCLUDED.arrival_time
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(arrival_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_stop(&self, stop: &NewStop) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
INSERT INTO stop (tsi, stop_event, stop_name, stop_address, latitude, longitude)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING id
            "#,
        )
        .bind(stop.tsi)
        .bind(stop.stop_event)
        .bind(&stop.stop_name)
        .bind(&stop.stop_address)
        .bind(stop.latitude)
        .bind(stop.longitude)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn bus_exists(&self, vehicle_number: i32) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bus WHERE vehicle_number = $1)",
        )
        .bind(vehicle_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn stop_exists(&self, stop_id: i64) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM stop WHERE id = $1)")
                .bind(stop_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert_bus_status(&self, status: &NewBusStatus) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
INSERT INTO bus_status
    (vehicle_number, tsi, utc_timestamp, route_number, current_location,
     latitude, longitude, stop_id, destination)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
RETURNING id
            "#,
        )
        .bind(status.vehicle_number)
        .bind(status.tsi)
        .bind(status.utc_timestamp)
        .bind(&status.route_number)
        .bind(&status.current_location)
        .bind(status.latitude)
        .bind(status.longitude)
        .bind(status.stop_id)
        .bind(&status.destination)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn delete_bus_statuses(&self, vehicle_number: i32) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM bus_status WHERE vehicle_number = $1")
            .bind(vehicle_number)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn last_known_location(
        &self,
        vehicle_number: i32,
        unresolved: &str,
    ) -> Result<Option<String>, StoreError> {
        let location = sqlx::query_scalar::<_, String>(
            r#"
SELECT current_location FROM bus_status
WHERE vehicle_number = $1 AND current_location <> $2
ORDER BY tsi DESC
LIMIT 1
            "#,
        )
        .bind(vehicle_number)
        .bind(unresolved)
        .fetch_optional(&self.pool)
        .await?;
        Ok(location)
    }

    async fn truncate_all(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        // Children before parents.
        for table in ["bus_status", "stop", "stop_event", "bus"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
