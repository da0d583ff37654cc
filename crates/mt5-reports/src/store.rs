//! SQLite store for saved report configurations and scheduled tasks
//!
//! Configurations are stored whole as JSON keyed by name. Tasks keep their
//! counters in `scheduled_tasks` and every execution is appended to
//! `task_runs`.

use chrono::{Local, NaiveDateTime, NaiveTime};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use crate::error::ReportError;
use crate::pipeline::ReportConfiguration;
use crate::scheduler::{Frequency, NewTask, ScheduledTask, TaskRun};

/// Configuration store wrapper
pub struct Store {
    pool: SqlitePool,
}

/// Row type for saved configurations
#[derive(FromRow)]
struct ConfigRow {
    payload: String,
}

/// Row type for scheduled tasks
#[derive(FromRow)]
struct TaskRow {
    id: i64,
    name: String,
    description: String,
    config_name: String,
    chat_id: String,
    send_time: String,
    frequency: String,
    active: bool,
    created_at: NaiveDateTime,
    last_run: Option<NaiveDateTime>,
    next_run: NaiveDateTime,
    run_count: i64,
    success_count: i64,
    error_count: i64,
    last_error: Option<String>,
}

/// Row type for the run history
#[derive(Debug, Clone, FromRow)]
pub struct TaskRunRow {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub success: bool,
    pub row_count: i64,
    pub artifact: Option<String>,
    pub error: Option<String>,
}

const TASK_COLUMNS: &str = "id, name, description, config_name, chat_id, send_time, frequency,
    active, created_at, last_run, next_run, run_count, success_count, error_count, last_error";

impl Store {
    /// Open or create the store database
    pub async fn open(path: &Path) -> Result<Self, ReportError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ReportError::Store(format!("{}: {}", parent.display(), e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        // WAL lets `task list` read while the scheduler daemon writes
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, one connection so every query sees it
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, ReportError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ReportError> {
        sqlx::query(
            "
            -- Named report configurations (JSON payload)
            CREATE TABLE IF NOT EXISTS report_configs (
                name TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            -- Scheduled deliveries of saved configurations
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                config_name TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                send_time TEXT NOT NULL,
                frequency TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_run TEXT,
                next_run TEXT NOT NULL,
                run_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            -- One row per task execution
            CREATE TABLE IF NOT EXISTS task_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES scheduled_tasks(id) ON DELETE CASCADE,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                success INTEGER NOT NULL,
                row_count INTEGER NOT NULL DEFAULT 0,
                artifact TEXT,
                error TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_runs_task ON task_runs(task_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Report Configurations
    // =========================================================================

    /// Insert or replace a configuration by name; stamps `saved_at`
    pub async fn save_config(&self, config: &ReportConfiguration) -> Result<(), ReportError> {
        if config.name.trim().is_empty() {
            return Err(ReportError::Store("configuration name is empty".to_string()));
        }

        let mut stamped = config.clone();
        stamped.saved_at = Some(Local::now().naive_local());
        let payload = serde_json::to_string(&stamped)
            .map_err(|e| ReportError::Store(format!("cannot encode '{}': {}", config.name, e)))?;

        sqlx::query(
            "INSERT INTO report_configs (name, payload) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET payload = excluded.payload,
                                             updated_at = datetime('now')",
        )
        .bind(&config.name)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_config(&self, name: &str) -> Result<Option<ReportConfiguration>, ReportError> {
        let row: Option<ConfigRow> =
            sqlx::query_as("SELECT payload FROM report_configs WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| decode_config(name, &r.payload)).transpose()
    }

    pub async fn list_configs(&self) -> Result<Vec<ReportConfiguration>, ReportError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, payload FROM report_configs ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        rows.iter()
            .map(|(name, payload)| decode_config(name, payload))
            .collect()
    }

    /// Returns false when no configuration had that name
    pub async fn delete_config(&self, name: &str) -> Result<bool, ReportError> {
        let result = sqlx::query("DELETE FROM report_configs WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Scheduled Tasks
    // =========================================================================

    pub async fn add_task(&self, task: &NewTask, next_run: NaiveDateTime) -> Result<i64, ReportError> {
        if self.load_config(&task.config_name).await?.is_none() {
            return Err(ReportError::Store(format!(
                "no saved configuration named '{}'",
                task.config_name
            )));
        }

        let result = sqlx::query(
            "INSERT INTO scheduled_tasks
             (name, description, config_name, chat_id, send_time, frequency, created_at, next_run)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.config_name)
        .bind(&task.chat_id)
        .bind(task.send_time.format("%H:%M").to_string())
        .bind(task.frequency.to_string())
        .bind(Local::now().naive_local())
        .bind(next_run)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
            if duplicate {
                ReportError::Store(format!("a task named '{}' already exists", task.name))
            } else {
                ReportError::Query(e)
            }
        })?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_task(&self, name: &str) -> Result<Option<ScheduledTask>, ReportError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM scheduled_tasks WHERE name = ?",
            TASK_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_task).transpose()
    }

    pub async fn list_tasks(&self) -> Result<Vec<ScheduledTask>, ReportError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM scheduled_tasks ORDER BY name",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_task).collect()
    }

    /// Active tasks whose next run is at or before `now`, earliest first
    pub async fn due_tasks(&self, now: NaiveDateTime) -> Result<Vec<ScheduledTask>, ReportError> {
        let mut due: Vec<ScheduledTask> = self
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| t.active && t.next_run <= now)
            .collect();
        due.sort_by_key(|t| (t.next_run, t.id));
        Ok(due)
    }

    /// Returns false when no task had that name
    pub async fn set_task_active(
        &self,
        name: &str,
        active: bool,
        next_run: Option<NaiveDateTime>,
    ) -> Result<bool, ReportError> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET active = ?, next_run = COALESCE(?, next_run) WHERE name = ?",
        )
        .bind(active)
        .bind(next_run)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_task(&self, name: &str) -> Result<bool, ReportError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM task_runs WHERE task_id IN (SELECT id FROM scheduled_tasks WHERE name = ?)",
        )
        .bind(name)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append a run and update the task counters (in a transaction for atomicity)
    pub async fn record_task_run(
        &self,
        run: &TaskRun,
        next_run: NaiveDateTime,
    ) -> Result<(), ReportError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO task_runs (task_id, started_at, finished_at, success, row_count, artifact, error)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.task_id)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.success())
        .bind(run.rows as i64)
        .bind(&run.artifact)
        .bind(&run.error)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE scheduled_tasks SET
                last_run = ?,
                next_run = ?,
                run_count = run_count + 1,
                success_count = success_count + ?,
                error_count = error_count + ?,
                last_error = COALESCE(?, last_error)
             WHERE id = ?",
        )
        .bind(run.started_at)
        .bind(next_run)
        .bind(i64::from(run.success()))
        .bind(i64::from(!run.success()))
        .bind(&run.error)
        .bind(run.task_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn recent_runs(&self, task_id: i64, limit: i64) -> Result<Vec<TaskRunRow>, ReportError> {
        let rows = sqlx::query_as(
            "SELECT started_at, finished_at, success, row_count, artifact, error
             FROM task_runs WHERE task_id = ?
             ORDER BY started_at DESC, id DESC
             LIMIT ?",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Get store statistics
    pub async fn stats(&self) -> Result<StoreStats, ReportError> {
        let configs: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM report_configs")
            .fetch_one(&self.pool)
            .await?;
        let tasks: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(active), 0) FROM scheduled_tasks",
        )
        .fetch_one(&self.pool)
        .await?;
        let runs: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_runs")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            configs: configs.0 as u64,
            tasks: tasks.0 as u64,
            active_tasks: tasks.1 as u64,
            runs: runs.0 as u64,
        })
    }
}

// =============================================================================
// Helper functions
// =============================================================================

fn decode_config(name: &str, payload: &str) -> Result<ReportConfiguration, ReportError> {
    serde_json::from_str(payload)
        .map_err(|e| ReportError::Store(format!("configuration '{}' is corrupt: {}", name, e)))
}

fn row_to_task(r: TaskRow) -> Result<ScheduledTask, ReportError> {
    let send_time = NaiveTime::parse_from_str(&r.send_time, "%H:%M").map_err(|e| {
        ReportError::Store(format!("task '{}' has bad send_time '{}': {}", r.name, r.send_time, e))
    })?;
    let frequency = Frequency::from_str(&r.frequency).map_err(ReportError::Store)?;

    Ok(ScheduledTask {
        id: r.id,
        name: r.name,
        description: r.description,
        config_name: r.config_name,
        chat_id: r.chat_id,
        send_time,
        frequency,
        active: r.active,
        created_at: r.created_at,
        last_run: r.last_run,
        next_run: r.next_run,
        run_count: r.run_count as u64,
        success_count: r.success_count as u64,
        error_count: r.error_count as u64,
        last_error: r.last_error,
    })
}

/// Store statistics
#[derive(Debug, Default)]
pub struct StoreStats {
    pub configs: u64,
    pub tasks: u64,
    pub active_tasks: u64,
    pub runs: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} saved configurations, {} tasks ({} active), {} runs",
            self.configs, self.tasks, self.active_tasks, self.runs
        )
    }
}
