//! SQLite-based persistence store

use crate::core::{ExecutionStatus, PipelineRun};
use crate::persistence::{PersistenceBackend, RunSummary};
use crate::trigger::{TriggerError, TriggerRule};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        pipeline_name TEXT NOT NULL,
        trigger_name TEXT,
        status TEXT NOT NULL,
        build_id TEXT,
        started_at TEXT,
        completed_at TEXT,
        completed_steps INTEGER NOT NULL DEFAULT 0,
        total_steps INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        run_json TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs(pipeline_name)",
    "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)",
    r#"
    CREATE TABLE IF NOT EXISTS triggers (
        name TEXT PRIMARY KEY,
        branch_pattern TEXT NOT NULL,
        pipeline TEXT NOT NULL,
        service_identity TEXT NOT NULL,
        description TEXT,
        substitutions_json TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
];

const SUMMARY_COLUMNS: &str = "id, pipeline_name, trigger_name, status, build_id, started_at, \
                               completed_at, completed_steps, total_steps, error";

/// SQLite store for run history and trigger rules
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store at `<data_dir>/history.db`
    pub async fn with_default_path(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        Self::new(&data_dir.join("history.db")).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize database schema")?;
        }
        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn summary_from_row(row: &SqliteRow) -> Result<RunSummary> {
        let status: String = row.get("status");
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            trigger: row.get("trigger_name"),
            status: ExecutionStatus::from_name(&status)
                .with_context(|| format!("Unknown run status '{}'", status))?,
            build_id: row.get("build_id"),
            started_at: row.get::<Option<NaiveDateTime>, _>("started_at").map(Self::from_naive),
            completed_at: row.get::<Option<NaiveDateTime>, _>("completed_at").map(Self::from_naive),
            completed_steps: row.get::<i64, _>("completed_steps") as usize,
            total_steps: row.get::<i64, _>("total_steps") as usize,
            error: row.get("error"),
        })
    }

    fn trigger_from_row(row: &SqliteRow) -> Result<TriggerRule> {
        let substitutions: String = row.get("substitutions_json");
        Ok(TriggerRule {
            name: row.get("name"),
            branch_pattern: row.get("branch_pattern"),
            pipeline: PathBuf::from(row.get::<String, _>("pipeline")),
            service_identity: row.get("service_identity"),
            substitutions: serde_json::from_str(&substitutions)
                .context("Corrupt trigger substitutions")?,
            description: row.get("description"),
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteStore {
    async fn save_run(&self, run: &PipelineRun) -> Result<()> {
        let run_json = serde_json::to_string(run).context("Failed to serialize run")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, trigger_name, status, build_id, started_at, completed_at,
             completed_steps, total_steps, error, run_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.pipeline_name)
        .bind(run.trigger.as_deref())
        .bind(format!("{:?}", run.status))
        .bind(run.build_id())
        .bind(run.started_at.map(Self::to_naive))
        .bind(run.completed_at.map(Self::to_naive))
        .bind(run.results.len() as i64)
        .bind(run.total_steps as i64)
        .bind(run.error.as_ref().map(|e| e.to_string()))
        .bind(run_json)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>> {
        let row = sqlx::query("SELECT run_json FROM runs WHERE id = ?1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.map(|row| {
            let json: String = row.get("run_json");
            serde_json::from_str(&json).context("Corrupt run record")
        })
        .transpose()
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM runs
            WHERE ?1 IS NULL OR pipeline_name = ?1
            ORDER BY started_at DESC, created_at DESC
            LIMIT ?2
            "#,
            SUMMARY_COLUMNS
        ))
        .bind(pipeline_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM runs
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }

    async fn create_trigger(&self, rule: &TriggerRule) -> Result<()> {
        rule.validate()?;

        let substitutions = serde_json::to_string(&rule.substitutions)?;
        let result = sqlx::query(
            r#"
            INSERT INTO triggers
            (name, branch_pattern, pipeline, service_identity, description, substitutions_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.branch_pattern)
        .bind(rule.pipeline.to_string_lossy().into_owned())
        .bind(&rule.service_identity)
        .bind(rule.description.as_deref())
        .bind(substitutions)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(TriggerError::DuplicateName(rule.name.clone()).into())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to save trigger")),
        }
    }

    async fn load_trigger(&self, name: &str) -> Result<Option<TriggerRule>> {
        let row = sqlx::query("SELECT * FROM triggers WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load trigger")?;

        row.as_ref().map(Self::trigger_from_row).transpose()
    }

    async fn delete_trigger(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM triggers WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .context("Failed to delete trigger")?;

        if result.rows_affected() == 0 {
            return Err(TriggerError::NotFound(name.to_string()).into());
        }
        Ok(())
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerRule>> {
        let rows = sqlx::query("SELECT * FROM triggers ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list triggers")?;

        rows.iter().map(Self::trigger_from_row).collect()
    }
}
