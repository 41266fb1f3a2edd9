use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{MissingReference, StoreError};
use crate::models::{Campaign, DeliveryRecord, NewDelivery, Subscriber};
use crate::store::{EventStore, Written};

/// Initialize database connection pool with recommended pragmas.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("../migrations/001_create_deliveries.sql"))
        .execute(pool)
        .await?;
    Ok(())
}

const SELECT_DELIVERY: &str = r#"
    SELECT d.id, d.message_id, s.uuid AS subscriber_key, c.uuid AS campaign_key,
           d.source, d.meta, d.created_at
    FROM deliveries d
    JOIN subscribers s ON s.id = d.subscriber_id
    JOIN campaigns c ON c.id = d.campaign_id
"#;

/// SQLite-backed event store.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Decide what an insert that stored nothing means.
    ///
    /// One statement reads the delivery and both references, so the answer
    /// comes from a single snapshot. `AlreadyExists` is only returned when a
    /// row for the message id is actually present.
    async fn resolve_unwritten(&self, delivery: &NewDelivery) -> Result<Written, StoreError> {
        let (stored, subscriber_exists, campaign_exists): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT EXISTS(SELECT 1 FROM deliveries WHERE message_id = ?),
                   EXISTS(SELECT 1 FROM subscribers WHERE uuid = ?),
                   EXISTS(SELECT 1 FROM campaigns WHERE uuid = ?)
            "#,
        )
        .bind(&delivery.message_id)
        .bind(&delivery.subscriber_key)
        .bind(&delivery.campaign_key)
        .fetch_one(&self.pool)
        .await?;

        if stored != 0 {
            return Ok(Written::AlreadyExists);
        }

        // Nothing stored, so a reference was missing when the insert ran even
        // if it has reappeared since.
        let missing =
            MissingReference::from_presence(subscriber_exists != 0, campaign_exists != 0)
                .unwrap_or(MissingReference::Unknown);
        Err(StoreError::ReferenceNotFound(missing))
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn write(&self, delivery: &NewDelivery) -> Result<Written, StoreError> {
        let meta = serde_json::to_string(&delivery.meta)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Both keys are resolved inside the insert, so a missing reference
        // inserts nothing instead of failing.
        let result = sqlx::query(
            r#"
            INSERT INTO deliveries (message_id, subscriber_id, campaign_id, source, meta, created_at)
            SELECT ?, s.id, c.id, ?, ?, ?
            FROM subscribers s, campaigns c
            WHERE s.uuid = ? AND c.uuid = ?
            ON CONFLICT(message_id) DO NOTHING
            "#,
        )
        .bind(&delivery.message_id)
        .bind(&delivery.source)
        .bind(meta)
        .bind(delivery.created_at)
        .bind(&delivery.subscriber_key)
        .bind(&delivery.campaign_key)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(Written::Inserted),
            Ok(_) => self.resolve_unwritten(delivery).await,
            // A reference vanished between resolution and the FK check.
            Err(err) if is_foreign_key_violation(&err) => self.resolve_unwritten(delivery).await,
            Err(err) => Err(err.into()),
        }
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_foreign_key_violation())
        .unwrap_or(false)
}

/// Get a delivery by its provider message id.
pub async fn find_by_message_id(
    pool: &SqlitePool,
    message_id: &str,
) -> Result<Option<DeliveryRecord>, sqlx::Error> {
    let sql = format!("{} WHERE d.message_id = ?", SELECT_DELIVERY);
    sqlx::query_as::<_, DeliveryRecord>(&sql)
        .bind(message_id)
        .fetch_optional(pool)
        .await
}

/// Count all stored deliveries.
pub async fn count_deliveries(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM deliveries")
        .fetch_one(pool)
        .await
}

/// List deliveries in insertion order.
pub async fn list_deliveries(pool: &SqlitePool, limit: i64) -> Result<Vec<DeliveryRecord>, sqlx::Error> {
    let sql = format!("{} ORDER BY d.id ASC LIMIT ?", SELECT_DELIVERY);
    sqlx::query_as::<_, DeliveryRecord>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Create a subscriber with a fresh UUID key.
pub async fn create_subscriber(pool: &SqlitePool, email: &str) -> Result<Subscriber, sqlx::Error> {
    let uuid = Uuid::new_v4().to_string();

    sqlx::query_as::<_, Subscriber>(
        "INSERT INTO subscribers (uuid, email) VALUES (?, ?) RETURNING id, uuid, email",
    )
    .bind(uuid)
    .bind(email)
    .fetch_one(pool)
    .await
}

/// Create a campaign with a fresh UUID key.
pub async fn create_campaign(pool: &SqlitePool, name: &str) -> Result<Campaign, sqlx::Error> {
    let uuid = Uuid::new_v4().to_string();

    sqlx::query_as::<_, Campaign>(
        "INSERT INTO campaigns (uuid, name) VALUES (?, ?) RETURNING id, uuid, name",
    )
    .bind(uuid)
    .bind(name)
    .fetch_one(pool)
    .await
}

/// Delete a subscriber and its deliveries. Returns true if it existed.
pub async fn delete_subscriber(pool: &SqlitePool, uuid: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM subscribers WHERE uuid = ?")
        .bind(uuid)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a campaign and its deliveries. Returns true if it existed.
pub async fn delete_campaign(pool: &SqlitePool, uuid: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM campaigns WHERE uuid = ?")
        .bind(uuid)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
