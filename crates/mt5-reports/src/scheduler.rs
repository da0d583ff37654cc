//! Scheduled report tasks
//!
//! A single loop wakes every `SCHEDULER_TICK_SECS`, runs the due tasks one
//! after another and advances each task to its next slot whether or not the
//! run succeeded. A failed run delivers a short failure text, never a report.

use async_trait::async_trait;
use chrono::{Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::constants;
use crate::error::ReportError;
use crate::notifier::{self, Notifier};
use crate::pipeline::{self, OutputFormat};
use crate::source::{MySqlSource, RecordSource};
use crate::store::Store;

// =============================================================================
// Task Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Frequency {
    Daily,
    /// Mondays
    Weekly,
    /// First day of the month
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "Daily"),
            Frequency::Weekly => write!(f, "Weekly"),
            Frequency::Monthly => write!(f, "Monthly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(format!("unknown frequency '{}'", other)),
        }
    }
}

/// A task as submitted by `task add`
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub config_name: String,
    pub chat_id: String,
    pub send_time: NaiveTime,
    pub frequency: Frequency,
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub config_name: String,
    pub chat_id: String,
    pub send_time: NaiveTime,
    pub frequency: Frequency,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub last_run: Option<NaiveDateTime>,
    pub next_run: NaiveDateTime,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl ScheduledTask {
    /// "Weekly at 09:00"
    pub fn schedule_label(&self) -> String {
        format!("{} at {}", self.frequency, self.send_time.format("%H:%M"))
    }
}

/// One execution of a task
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub task_id: i64,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub rows: usize,
    /// Delivered file, if any
    pub artifact: Option<String>,
    pub error: Option<String>,
}

impl TaskRun {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Parse "HH:MM"
pub fn parse_send_time(s: &str) -> Result<NaiveTime, ReportError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| ReportError::Config(format!("send time '{}' is not HH:MM", s)))
}

/// Next slot strictly after `now`
pub fn next_run_after(now: NaiveDateTime, send_time: NaiveTime, frequency: Frequency) -> NaiveDateTime {
    let today = now.date();
    match frequency {
        Frequency::Daily => {
            let candidate = today.and_time(send_time);
            if candidate > now {
                candidate
            } else {
                candidate + Days::new(1)
            }
        }
        Frequency::Weekly => {
            let monday =
                today - Days::new(u64::from(today.weekday().num_days_from_monday()));
            let candidate = monday.and_time(send_time);
            if candidate > now {
                candidate
            } else {
                candidate + Days::new(7)
            }
        }
        Frequency::Monthly => {
            let first = first_of_month(today);
            let candidate = first.and_time(send_time);
            if candidate > now {
                candidate
            } else {
                (first + Months::new(1)).and_time(send_time)
            }
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

// =============================================================================
// Run Context
// =============================================================================

/// Opens a record source for a named database target
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn open(
        &self,
        database: Option<&str>,
    ) -> Result<(String, Box<dyn RecordSource>), ReportError>;
}

#[async_trait]
impl SourceProvider for Config {
    async fn open(
        &self,
        database: Option<&str>,
    ) -> Result<(String, Box<dyn RecordSource>), ReportError> {
        let (name, db) = self.database(database)?;
        let source =
            MySqlSource::connect(name, db, self.login_floor, self.max_logins_per_query).await?;
        Ok((name.to_string(), Box::new(source)))
    }
}

/// Everything a scheduled run needs; passed explicitly, never global
pub struct ReportContext<'a> {
    pub config: &'a Config,
    pub store: &'a Store,
    pub sources: &'a dyn SourceProvider,
    pub notifier: &'a dyn Notifier,
}

// =============================================================================
// Execution
// =============================================================================

struct Delivered {
    rows: usize,
    file: PathBuf,
}

async fn execute(
    ctx: &ReportContext<'_>,
    task: &ScheduledTask,
    today: NaiveDate,
) -> Result<Delivered, ReportError> {
    let config = ctx.store.load_config(&task.config_name).await?.ok_or_else(|| {
        ReportError::Store(format!("configuration '{}' no longer exists", task.config_name))
    })?;

    let (database, source) = ctx.sources.open(config.database.as_deref()).await?;
    let outcome = pipeline::run_report(
        source.as_ref(),
        &ctx.config.classifier,
        &config,
        &database,
        today,
    )
    .await?;

    let artifact = pipeline::render(&outcome, OutputFormat::Xlsx, &ctx.config.output_dir)?;
    let Some(file) = artifact.primary_file().map(PathBuf::from) else {
        return Err(ReportError::render(
            task.name.clone(),
            "spreadsheet output produced no file",
        ));
    };

    ctx.notifier
        .send_document(&task.chat_id, &file, &notifier::format_caption(&outcome))
        .await?;

    Ok(Delivered {
        rows: outcome.rows.len(),
        file,
    })
}

/// Run one task now, deliver the result and record the run
pub async fn run_task(
    ctx: &ReportContext<'_>,
    task: &ScheduledTask,
    now: NaiveDateTime,
) -> Result<TaskRun, ReportError> {
    info!(task = %task.name, config = %task.config_name, "running scheduled report");
    let started_at = Local::now().naive_local();

    let result = execute(ctx, task, now.date()).await;

    let run = match result {
        Ok(delivered) => {
            info!(task = %task.name, rows = delivered.rows, file = %delivered.file.display(), "report delivered");
            TaskRun {
                task_id: task.id,
                started_at,
                finished_at: Local::now().naive_local(),
                rows: delivered.rows,
                artifact: Some(delivered.file.display().to_string()),
                error: None,
            }
        }
        Err(e) => {
            error!(task = %task.name, error = %e, unreachable = e.is_connection(), "scheduled report failed");
            let text = notifier::format_failure(&task.name, &task.config_name, &e.to_string());
            if let Err(notify_err) = ctx.notifier.send_message(&task.chat_id, &text).await {
                warn!(task = %task.name, error = %notify_err, "could not send failure notice");
            }
            TaskRun {
                task_id: task.id,
                started_at,
                finished_at: Local::now().naive_local(),
                rows: 0,
                artifact: None,
                error: Some(e.to_string()),
            }
        }
    };

    let next_run = next_run_after(now, task.send_time, task.frequency);
    ctx.store.record_task_run(&run, next_run).await?;
    info!(task = %task.name, next_run = %next_run, "task rescheduled");
    Ok(run)
}

/// Run every due task in order; returns how many ran
pub async fn run_due_tasks(ctx: &ReportContext<'_>, now: NaiveDateTime) -> Result<usize, ReportError> {
    let due = ctx.store.due_tasks(now).await?;
    let mut ran = 0;

    for task in &due {
        match run_task(ctx, task, now).await {
            Ok(_) => ran += 1,
            Err(e) => error!(task = %task.name, error = %e, "could not record task run"),
        }
    }
    Ok(ran)
}

/// Scheduler loop; returns on Ctrl-C
pub async fn run_daemon(ctx: &ReportContext<'_>) -> Result<(), ReportError> {
    let stats = ctx.store.stats().await?;
    info!(%stats, tick_secs = constants::SCHEDULER_TICK_SECS, "scheduler started");

    let mut interval = tokio::time::interval(Duration::from_secs(constants::SCHEDULER_TICK_SECS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Local::now().naive_local();
                match run_due_tasks(ctx, now).await {
                    Ok(0) => {}
                    Ok(ran) => info!(ran, "scheduler tick complete"),
                    Err(e) => error!(error = %e, "scheduler tick failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("scheduler stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use crate::notifier::tests::RecordingNotifier;
    use crate::pipeline::ReportConfiguration;
    use crate::pipeline::tests::sample_source;
    use crate::source::tests::MemorySource;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    struct MemoryProvider(MemorySource);

    #[async_trait]
    impl SourceProvider for MemoryProvider {
        async fn open(
            &self,
            database: Option<&str>,
        ) -> Result<(String, Box<dyn RecordSource>), ReportError> {
            let name = database.unwrap_or("live").to_string();
            Ok((name, Box::new(self.0.clone())))
        }
    }

    fn test_config(output_dir: &std::path::Path) -> Config {
        let file = FileConfig::parse(
            r#"
[databases.live]
host = "127.0.0.1"
user = "report"
password = "pw"
database = "mt5gn_live"
"#,
        )
        .unwrap();
        let mut config = Config::from_file(&file).unwrap();
        config.output_dir = output_dir.to_path_buf();
        config
    }

    async fn store_with_task(name: &str) -> (Store, ScheduledTask) {
        let store = Store::open_in_memory().await.unwrap();
        store
            .save_config(&ReportConfiguration {
                name: "month".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .add_task(
                &NewTask {
                    name: name.to_string(),
                    description: String::new(),
                    config_name: "month".to_string(),
                    chat_id: "-100123".to_string(),
                    send_time: nine(),
                    frequency: Frequency::Daily,
                },
                at(2025, 7, 31, 9, 0),
            )
            .await
            .unwrap();
        let task = store.get_task(name).await.unwrap().unwrap();
        (store, task)
    }

    #[test]
    fn test_frequency_round_trips_through_text() {
        for f in [Frequency::Daily, Frequency::Weekly, Frequency::Monthly] {
            assert_eq!(f.to_string().parse::<Frequency>().unwrap(), f);
        }
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_parse_send_time() {
        assert_eq!(parse_send_time("09:00").unwrap(), nine());
        assert!(parse_send_time("9am").is_err());
        assert!(parse_send_time("25:00").is_err());
    }

    #[test]
    fn test_daily_next_run() {
        // Still ahead today
        assert_eq!(
            next_run_after(at(2025, 7, 31, 8, 59), nine(), Frequency::Daily),
            at(2025, 7, 31, 9, 0)
        );
        // Exactly on the slot moves to tomorrow
        assert_eq!(
            next_run_after(at(2025, 7, 31, 9, 0), nine(), Frequency::Daily),
            at(2025, 8, 1, 9, 0)
        );
    }

    #[test]
    fn test_weekly_next_run_is_monday() {
        // Thursday 2025-07-31
        assert_eq!(
            next_run_after(at(2025, 7, 31, 12, 0), nine(), Frequency::Weekly),
            at(2025, 8, 4, 9, 0)
        );
        // Monday before the send time
        assert_eq!(
            next_run_after(at(2025, 8, 4, 8, 0), nine(), Frequency::Weekly),
            at(2025, 8, 4, 9, 0)
        );
        assert_eq!(
            next_run_after(at(2025, 8, 4, 9, 30), nine(), Frequency::Weekly),
            at(2025, 8, 11, 9, 0)
        );
    }

    #[test]
    fn test_monthly_next_run_is_first_of_month() {
        assert_eq!(
            next_run_after(at(2025, 7, 31, 12, 0), nine(), Frequency::Monthly),
            at(2025, 8, 1, 9, 0)
        );
        assert_eq!(
            next_run_after(at(2025, 12, 15, 0, 0), nine(), Frequency::Monthly),
            at(2026, 1, 1, 9, 0)
        );
        assert_eq!(
            next_run_after(at(2025, 8, 1, 7, 0), nine(), Frequency::Monthly),
            at(2025, 8, 1, 9, 0)
        );
    }

    #[tokio::test]
    async fn test_due_task_delivers_spreadsheet() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (store, _) = store_with_task("eod").await;
        let provider = MemoryProvider(sample_source());
        let notifier = RecordingNotifier::default();
        let ctx = ReportContext {
            config: &config,
            store: &store,
            sources: &provider,
            notifier: &notifier,
        };

        let ran = run_due_tasks(&ctx, at(2025, 7, 31, 9, 0)).await.unwrap();
        assert_eq!(ran, 1);

        let documents = notifier.documents.lock().unwrap().clone();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].0, "-100123");
        assert!(documents[0].1.ends_with(".xlsx"));
        assert!(documents[0].2.contains("Daily Report: month"));

        let task = store.get_task("eod").await.unwrap().unwrap();
        assert_eq!(task.success_count, 1);
        assert_eq!(task.next_run, at(2025, 8, 1, 9, 0));

        let runs = store.recent_runs(task.id, 5).await.unwrap();
        assert_eq!(runs[0].row_count, 3);
    }

    #[tokio::test]
    async fn test_failed_run_sends_text_only_and_advances() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (store, task) = store_with_task("eod").await;
        let provider = MemoryProvider(MemorySource {
            unreachable: true,
            ..Default::default()
        });
        let notifier = RecordingNotifier::default();
        let ctx = ReportContext {
            config: &config,
            store: &store,
            sources: &provider,
            notifier: &notifier,
        };

        let run = run_task(&ctx, &task, at(2025, 7, 31, 9, 0)).await.unwrap();
        assert!(!run.success());
        assert!(notifier.documents.lock().unwrap().is_empty());

        let messages = notifier.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.starts_with("<b>Report failed: eod</b>"));

        let task = store.get_task("eod").await.unwrap().unwrap();
        assert_eq!(task.error_count, 1);
        assert_eq!(task.next_run, at(2025, 8, 1, 9, 0));
        assert!(task.last_error.unwrap().contains("memory"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (store, task) = store_with_task("eod").await;
        let provider = MemoryProvider(sample_source());
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let ctx = ReportContext {
            config: &config,
            store: &store,
            sources: &provider,
            notifier: &notifier,
        };

        let run = run_task(&ctx, &task, at(2025, 7, 31, 9, 0)).await.unwrap();
        assert!(run.error.unwrap().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_nothing_due_before_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (store, _) = store_with_task("eod").await;
        let provider = MemoryProvider(sample_source());
        let notifier = RecordingNotifier::default();
        let ctx = ReportContext {
            config: &config,
            store: &store,
            sources: &provider,
            notifier: &notifier,
        };

        let ran = run_due_tasks(&ctx, at(2025, 7, 31, 8, 59)).await.unwrap();
        assert_eq!(ran, 0);
        assert!(notifier.documents.lock().unwrap().is_empty());
    }
}
