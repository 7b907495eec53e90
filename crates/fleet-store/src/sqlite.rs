//! SQLite-backed record store

use crate::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fleet_common::{InstanceRecord, InstanceStatus, Quota, TenantId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS records (
        seq        INTEGER PRIMARY KEY AUTOINCREMENT,
        id         TEXT NOT NULL UNIQUE,
        status     TEXT NOT NULL,
        created_at TEXT NOT NULL,
        bucket     TEXT NOT NULL,
        url        TEXT NOT NULL,
        quota      TEXT NOT NULL,
        reason     TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS retired_ids (
        id         TEXT PRIMARY KEY,
        retired_at TEXT NOT NULL
    )"#,
];

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    status: String,
    created_at: String,
    bucket: String,
    url: String,
    quota: String,
    reason: Option<String>,
}

impl TryFrom<RecordRow> for InstanceRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let corrupt = |detail: String| StoreError::Corrupt { id: row.id.clone(), detail };

        let status = InstanceStatus::from_str(&row.status).map_err(corrupt)?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| corrupt(format!("created_at: {}", e)))?
            .with_timezone(&Utc);
        let quota = Quota::parse(&row.quota).map_err(|e| corrupt(e.to_string()))?;

        Ok(InstanceRecord {
            id: TenantId::from(row.id),
            status,
            created_at,
            bucket: row.bucket,
            url: row.url,
            quota,
            reason: row.reason,
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn require_row(rows_affected: u64, id: &TenantId) -> StoreResult<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(id.clone()))
    } else {
        Ok(())
    }
}

/// Record store on a sqlx SQLite pool
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database behind `url` and apply the schema.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let filename = opts.clone().get_filename();
        if let Some(dir) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
        }

        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(opts).await?;
        tracing::info!(url = %url, "record store opened");
        Self::with_pool(pool).await
    }

    /// Private in-memory database; one connection so every query sees it.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &InstanceRecord) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let retired: Option<(String,)> = sqlx::query_as("SELECT id FROM retired_ids WHERE id = ?")
            .bind(record.id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if retired.is_some() {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }

        let inserted = sqlx::query(
            "INSERT INTO records (id, status, created_at, bucket, url, quota, reason) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.as_str())
        .bind(record.status.as_str())
        .bind(timestamp(record.created_at))
        .bind(&record.bucket)
        .bind(&record.url)
        .bind(record.quota.to_string())
        .bind(record.reason.as_deref())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StoreError::AlreadyExists(record.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &TenantId) -> StoreResult<InstanceRecord> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT id, status, created_at, bucket, url, quota, reason FROM records WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(id.clone()))?.try_into()
    }

    async fn list(&self) -> StoreResult<Vec<InstanceRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT id, status, created_at, bucket, url, quota, reason FROM records ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InstanceRecord::try_from).collect()
    }

    async fn update_status(&self, id: &TenantId, status: InstanceStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE records SET status = ?, reason = NULL WHERE id = ?")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        require_row(result.rows_affected(), id)
    }

    async fn mark_failed(&self, id: &TenantId, reason: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE records SET status = ?, reason = ? WHERE id = ?")
            .bind(InstanceStatus::Error.as_str())
            .bind(reason)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        require_row(result.rows_affected(), id)
    }

    async fn update_quota_and_bucket(&self, id: &TenantId, bucket: &str, quota: &Quota) -> StoreResult<()> {
        let result = sqlx::query("UPDATE records SET bucket = ?, quota = ? WHERE id = ?")
            .bind(bucket)
            .bind(quota.to_string())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        require_row(result.rows_affected(), id)
    }

    async fn delete(&self, id: &TenantId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        require_row(result.rows_affected(), id)?;

        sqlx::query("INSERT OR IGNORE INTO retired_ids (id, retired_at) VALUES (?, ?)")
            .bind(id.as_str())
            .bind(timestamp(Utc::now()))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn id_taken(&self, id: &TenantId) -> StoreResult<bool> {
        let (taken,): (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1) OR EXISTS(SELECT 1 FROM retired_ids WHERE id = ?1)",
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(taken != 0)
    }
}
