//! SQLite-based build history store

use crate::core::{BuildResult, ExecutionStatus};
use crate::persistence::{BuildSummary, PersistenceBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const COLUMNS: &str = "job_name, number, execution_id, pipeline_name, branch, result, status, \
                       started_at, completed_at, succeeded, failed, skipped";

/// SQLite build store
pub struct SqliteBuildStore {
    pool: SqlitePool,
}

impl SqliteBuildStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("cigate");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        let db_path = db_dir.join("builds.db");
        let db_path = db_path
            .to_str()
            .context("Database path is not valid UTF-8")?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS builds (
                job_name TEXT NOT NULL,
                number INTEGER NOT NULL,
                execution_id TEXT NOT NULL,
                pipeline_name TEXT NOT NULL,
                branch TEXT NOT NULL,
                result TEXT,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                succeeded INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (job_name, number)
            );

            CREATE INDEX IF NOT EXISTS idx_builds_started_at ON builds(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn status_from_str(value: &str) -> ExecutionStatus {
        match value {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            "Cancelled" => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Pending,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<BuildSummary> {
        Ok(BuildSummary {
            job_name: row.get("job_name"),
            number: row.get::<i64, _>("number") as u64,
            execution_id: Uuid::parse_str(&row.get::<String, _>("execution_id"))?,
            pipeline_name: row.get("pipeline_name"),
            branch: row.get("branch"),
            result: row
                .get::<Option<String>, _>("result")
                .as_deref()
                .and_then(BuildResult::parse),
            status: Self::status_from_str(&row.get::<String, _>("status")),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            succeeded: row.get::<i64, _>("succeeded") as usize,
            failed: row.get::<i64, _>("failed") as usize,
            skipped: row.get::<i64, _>("skipped") as usize,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteBuildStore {
    async fn save_build(&self, build: &BuildSummary) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO builds ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            COLUMNS
        ))
        .bind(&build.job_name)
        .bind(build.number as i64)
        .bind(build.execution_id.to_string())
        .bind(&build.pipeline_name)
        .bind(&build.branch)
        .bind(build.result.map(|r| r.as_str()))
        .bind(format!("{:?}", build.status))
        .bind(Self::to_naive(build.started_at))
        .bind(build.completed_at.map(Self::to_naive))
        .bind(build.succeeded as i64)
        .bind(build.failed as i64)
        .bind(build.skipped as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save build")?;

        Ok(())
    }

    async fn load_build(&self, job_name: &str, number: u64) -> Result<Option<BuildSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM builds WHERE job_name = ?1 AND number = ?2",
            COLUMNS
        ))
        .bind(job_name)
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load build")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_builds(&self, job_name: &str) -> Result<Vec<BuildSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM builds WHERE job_name = ?1 ORDER BY number DESC",
            COLUMNS
        ))
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list builds")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_jobs(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT job_name FROM builds ORDER BY job_name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list jobs")?;

        Ok(rows.iter().map(|row| row.get("job_name")).collect())
    }
}
