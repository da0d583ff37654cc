//! MT5 Daily Reports
//!
//! Reads account snapshots and deals from an MT5 trade-server database,
//! categorizes cash-flow deals, computes per-account P/L and renders the
//! result to the console, CSV, JSON or a styled spreadsheet. Saved report
//! configurations can be scheduled for delivery to a Telegram chat.

mod assembler;
mod categorizer;
mod config;
mod constants;
mod deals;
mod error;
mod filters;
mod notifier;
mod pipeline;
mod reports;
mod scheduler;
mod source;
mod spreadsheet;
mod store;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use assembler::SortOrder;
use config::{Config, FileConfig, mask_secret};
use deals::{Category, PeriodGranularity};
use notifier::{Notifier, TelegramNotifier};
use pipeline::{Artifact, OutputFormat, ReportConfiguration};
use scheduler::{Frequency, NewTask, ReportContext, SourceProvider};
use source::MySqlSource;
use store::Store;

/// Load config file or exit with helpful message
fn load_config_file(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        bail!(
            "Config file '{}' not found.\n\n\
            To get started:\n\
            1. Copy config.toml.example to config.toml\n\
            2. Fill in your MT5 database credentials (and Telegram bot token for scheduling)\n\n\
            See config.toml.example for the required format.",
            path.display()
        );
    }

    FileConfig::load(path)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// RUST_LOG overrides the default `info` level. Logs go to stderr in both
/// formats; stdout carries report output only.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
}

#[derive(Parser, Debug)]
#[command(name = "mt5-reports")]
#[command(about = "Daily P/L and cash-flow reports for MetaTrader 5 accounts")]
struct Args {
    /// Path to config.toml
    #[arg(long, default_value = constants::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log output format (json for the scheduler daemon)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a report (default)
    Report(ReportArgs),

    /// List categorized deals with a per-category summary
    Deals(DealsArgs),

    /// List account groups and the login range
    Groups {
        #[arg(long)]
        database: Option<String>,

        /// Year of the daily table to inspect (default: current year)
        #[arg(long)]
        year: Option<i32>,
    },

    /// Manage saved report configurations
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Manage scheduled report tasks
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },

    /// Run the scheduler daemon
    Schedule,

    /// Telegram bot utilities
    Telegram {
        #[command(subcommand)]
        action: TelegramCommand,
    },
}

/// Report flags; when --saved is given, flags override the saved values
#[derive(clap::Args, Debug, Default, Clone)]
struct ReportArgs {
    /// Start from a saved configuration
    #[arg(long)]
    saved: Option<String>,

    /// Database target from config.toml
    #[arg(long)]
    database: Option<String>,

    /// Account group; repeatable, `*` is a wildcard
    #[arg(long = "group")]
    groups: Vec<String>,

    #[arg(long)]
    min_login: Option<u64>,

    #[arg(long)]
    max_login: Option<u64>,

    /// Minimum Net P/L
    #[arg(long, allow_negative_numbers = true)]
    min_profit: Option<Decimal>,

    /// Maximum Net P/L
    #[arg(long, allow_negative_numbers = true)]
    max_profit: Option<Decimal>,

    #[arg(long)]
    agent: Option<String>,

    #[arg(long)]
    zip: Option<String>,

    /// First day of the window (YYYY-MM-DD, default: first of the month)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last day of the window (YYYY-MM-DD, default: today)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Login to leave out; repeatable
    #[arg(long = "exclude-login")]
    excluded_logins: Vec<u64>,

    #[arg(long, value_enum)]
    sort: Option<SortOrder>,

    #[arg(long, value_enum)]
    output: Option<OutputFormat>,

    #[arg(long, value_enum)]
    granularity: Option<PeriodGranularity>,

    /// Maximum rows after filtering and sorting
    #[arg(long)]
    limit: Option<usize>,

    /// Include BUY/SELL deals
    #[arg(long)]
    include_trades: bool,

    /// Save these settings under a name
    #[arg(long)]
    save_as: Option<String>,
}

impl ReportArgs {
    /// Overlay the flags that were given onto `base`
    fn apply(&self, mut base: ReportConfiguration) -> ReportConfiguration {
        let criteria = &mut base.criteria;
        if !self.groups.is_empty() {
            criteria.groups = Some(self.groups.iter().cloned().collect());
        }
        if self.min_login.is_some() {
            criteria.min_login = self.min_login;
        }
        if self.max_login.is_some() {
            criteria.max_login = self.max_login;
        }
        if self.min_profit.is_some() {
            criteria.min_profit = self.min_profit;
        }
        if self.max_profit.is_some() {
            criteria.max_profit = self.max_profit;
        }
        if self.agent.is_some() {
            criteria.agent = self.agent.clone();
        }
        if self.zip.is_some() {
            criteria.zip = self.zip.clone();
        }
        if self.start_date.is_some() {
            criteria.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            criteria.end_date = self.end_date;
        }
        criteria.excluded_logins.extend(self.excluded_logins.iter().copied());

        if self.database.is_some() {
            base.database = self.database.clone();
        }
        if let Some(sort) = self.sort {
            base.sort = sort;
        }
        if let Some(output) = self.output {
            base.output = output;
        }
        if let Some(granularity) = self.granularity {
            base.granularity = granularity;
        }
        if self.limit.is_some() {
            base.limit = self.limit;
        }
        base.include_trades |= self.include_trades;
        base
    }
}

#[derive(clap::Args, Debug)]
struct DealsArgs {
    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    start_date: Option<NaiveDate>,

    #[arg(long)]
    end_date: Option<NaiveDate>,

    #[arg(long)]
    min_login: Option<u64>,

    #[arg(long)]
    max_login: Option<u64>,

    #[arg(long, value_enum, default_value_t = PeriodGranularity::Month)]
    granularity: PeriodGranularity,

    /// Include BUY/SELL deals
    #[arg(long)]
    include_trades: bool,

    /// Show the most frequent comments and how each is classified
    #[arg(long)]
    samples: bool,

    /// Number of distinct comments for --samples
    #[arg(long, default_value_t = 50)]
    sample_limit: u32,

    /// Skip the per-deal listing
    #[arg(long)]
    summary_only: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Save a report configuration (overwrites an existing one)
    Save {
        name: String,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// List saved configurations
    List,

    /// Show one configuration as JSON
    Show { name: String },

    /// Delete a configuration
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Schedule a saved configuration
    Add {
        name: String,

        /// Saved configuration to run
        #[arg(long)]
        report: String,

        /// Telegram chat (default: telegram.default_chat_id)
        #[arg(long)]
        chat_id: Option<String>,

        /// Send time, HH:MM local time
        #[arg(long, default_value = "09:00")]
        time: String,

        #[arg(long, value_enum, default_value_t = Frequency::Daily)]
        frequency: Frequency,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// List tasks and their recent runs
    List,

    /// Pause or resume a task
    Toggle { name: String },

    /// Delete a task and its history
    Delete { name: String },

    /// Run a task now
    Run { name: String },
}

#[derive(Subcommand, Debug)]
enum TelegramCommand {
    /// Verify the bot token and send a test message
    Test {
        /// Chat to message (default: telegram.default_chat_id)
        #[arg(long)]
        chat_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let file_config = load_config_file(&args.config)?;
    let config = Config::from_file(&file_config)?;

    match args.command.unwrap_or(Command::Report(ReportArgs::default())) {
        Command::Report(report) => handle_report(&config, report).await,
        Command::Deals(deals) => handle_deals(&config, deals).await,
        Command::Groups { database, year } => handle_groups(&config, database, year).await,
        Command::Config { action } => handle_config_command(&config, action).await,
        Command::Task { action } => handle_task_command(&config, action).await,
        Command::Schedule => handle_schedule(&config).await,
        Command::Telegram { action } => handle_telegram_command(&config, action).await,
    }
}

async fn open_store(config: &Config) -> Result<Store> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.data_dir.display())
    })?;
    Ok(Store::open(&config.store_path()).await?)
}

async fn connect(config: &Config, database: Option<&str>) -> Result<MySqlSource> {
    let (name, db) = config.database(database)?;
    info!(database = name, target = %db.describe(), "connecting");
    Ok(MySqlSource::connect(name, db, config.login_floor, config.max_logins_per_query).await?)
}

/// Handle the report command
async fn handle_report(config: &Config, args: ReportArgs) -> Result<()> {
    let store = open_store(config).await?;

    let base = match &args.saved {
        Some(name) => store
            .load_config(name)
            .await?
            .with_context(|| format!("No saved configuration named '{}'", name))?,
        None => ReportConfiguration::default(),
    };
    let mut report = args.apply(base);
    report.validate(Local::now().date_naive())?;

    if let Some(name) = &args.save_as {
        report.name = name.clone();
        store.save_config(&report).await?;
        println!("Saved configuration '{}'", name);
    }

    let (database, source) = config.open(report.database.as_deref()).await?;
    let outcome = pipeline::run_report(
        source.as_ref(),
        &config.classifier,
        &report,
        &database,
        Local::now().date_naive(),
    )
    .await?;

    match pipeline::render(&outcome, report.output, &config.output_dir)? {
        Artifact::Text(text) => println!("{}", text),
        Artifact::Files(files) => {
            println!(
                "Report '{}': {} accounts, Net P/L {}",
                report.display_name(),
                outcome.summary.accounts,
                reports::format_money(
                    outcome.summary.net_pl,
                    &reports::report_currency(&outcome.rows)
                )
            );
            for file in files {
                println!("  Generated: {}", file.display());
            }
        }
    }
    Ok(())
}

/// Handle the deals command
async fn handle_deals(config: &Config, args: DealsArgs) -> Result<()> {
    let source = connect(config, args.database.as_deref()).await?;
    let (database, _) = config.database(args.database.as_deref())?;

    if args.samples {
        let year = args.end_date.map_or_else(|| Local::now().year(), |d| d.year());
        let samples = source.comment_samples(year, args.sample_limit).await?;

        println!("\n============================================================");
        println!("  COMMENT SAMPLES ({}, {})", database, year);
        println!("============================================================\n");
        println!("{:<14} {:>8}  Comment", "Category", "Count");
        println!("{}", "-".repeat(70));
        for sample in &samples {
            let category: Category = config.classifier.classify_comment(&sample.comment);
            println!(
                "{:<14} {:>8}  {}",
                category.to_string(),
                sample.occurrences,
                sample.comment
            );
        }
        println!("\n{} distinct comment(s)", samples.len());
        return Ok(());
    }

    let report = ReportConfiguration {
        database: args.database.clone(),
        granularity: args.granularity,
        include_trades: args.include_trades,
        criteria: filters::FilterCriteria {
            min_login: args.min_login,
            max_login: args.max_login,
            start_date: args.start_date,
            end_date: args.end_date,
            ..Default::default()
        },
        ..Default::default()
    };

    let outcome = pipeline::run_deals(
        &source,
        &config.classifier,
        &report,
        database,
        Local::now().date_naive(),
    )
    .await?;
    println!("{}", reports::console_deals(&outcome, args.summary_only));
    Ok(())
}

/// Handle the groups command
async fn handle_groups(config: &Config, database: Option<String>, year: Option<i32>) -> Result<()> {
    let source = connect(config, database.as_deref()).await?;
    let year = year.unwrap_or_else(|| Local::now().year());

    let groups = source.available_groups(year).await?;
    let range = source.login_range(year).await?;

    println!("\n============================================================");
    println!("  ACCOUNT GROUPS: {} ({})", source.name(), year);
    println!("============================================================\n");

    if groups.is_empty() {
        println!("No groups found in {}{}.", constants::DAILY_TABLE_PREFIX, year);
        return Ok(());
    }

    println!("{:<50} {:>10}", "Group", "Accounts");
    println!("{}", "-".repeat(61));
    for group in &groups {
        println!("{:<50} {:>10}", group.group_name, group.accounts);
    }
    println!("{}", "-".repeat(61));
    println!("{} group(s)", groups.len());

    if let Some((min, max)) = range {
        println!("Login range: {} - {}", min, max);
    }
    Ok(())
}

/// Handle saved configuration subcommands
async fn handle_config_command(config: &Config, action: ConfigCommand) -> Result<()> {
    let store = open_store(config).await?;

    match action {
        ConfigCommand::Save { name, report } => {
            let base = match &report.saved {
                Some(from) => store
                    .load_config(from)
                    .await?
                    .with_context(|| format!("No saved configuration named '{}'", from))?,
                None => ReportConfiguration::default(),
            };
            let mut saved = report.apply(base);
            saved.name = name.clone();
            saved.validate(Local::now().date_naive())?;
            if let Some(db) = saved.database.as_deref() {
                config.database(Some(db))?;
            }

            store.save_config(&saved).await?;
            println!("Saved configuration '{}' ({})", name, saved.criteria.describe());
        }

        ConfigCommand::List => {
            let configs = store.list_configs().await?;
            if configs.is_empty() {
                println!("No saved configurations.");
                println!("\nUse 'mt5-reports config save <name> [flags]' to create one");
                return Ok(());
            }

            println!("{:<24} {:<12} {:<8} {:<20} Filters", "Name", "Database", "Output", "Saved");
            println!("{}", "-".repeat(90));
            for c in &configs {
                println!(
                    "{:<24} {:<12} {:<8} {:<20} {}",
                    c.name,
                    c.database.as_deref().unwrap_or(&config.default_database),
                    c.output.to_string(),
                    c.saved_at
                        .map(|t| t.format(constants::TIMESTAMP_FORMAT).to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    c.criteria.describe()
                );
            }
            println!("\n{} configuration(s)", configs.len());
        }

        ConfigCommand::Show { name } => {
            let saved = store
                .load_config(&name)
                .await?
                .with_context(|| format!("No saved configuration named '{}'", name))?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }

        ConfigCommand::Delete { name } => {
            if store.delete_config(&name).await? {
                println!("Deleted configuration '{}'", name);
            } else {
                println!("No configuration named '{}'", name);
            }
        }
    }
    Ok(())
}

fn default_chat(config: &Config, chat_id: Option<String>) -> Result<String> {
    match chat_id {
        Some(id) => Ok(id),
        None => config
            .telegram()?
            .default_chat_id
            .clone()
            .context("No --chat-id given and telegram.default_chat_id is not set"),
    }
}

/// Handle scheduled task subcommands
async fn handle_task_command(config: &Config, action: TaskCommand) -> Result<()> {
    let store = open_store(config).await?;

    match action {
        TaskCommand::Add {
            name,
            report,
            chat_id,
            time,
            frequency,
            description,
        } => {
            let task = NewTask {
                name: name.clone(),
                description,
                config_name: report,
                chat_id: default_chat(config, chat_id)?,
                send_time: scheduler::parse_send_time(&time)?,
                frequency,
            };
            let next_run =
                scheduler::next_run_after(Local::now().naive_local(), task.send_time, frequency);
            store.add_task(&task, next_run).await?;

            println!(
                "Scheduled '{}': {} {} at {}, next run {}",
                name,
                task.config_name,
                frequency,
                task.send_time.format("%H:%M"),
                next_run.format(constants::TIMESTAMP_FORMAT)
            );
        }

        TaskCommand::List => {
            let tasks = store.list_tasks().await?;
            if tasks.is_empty() {
                println!("No scheduled tasks.");
                return Ok(());
            }

            for task in &tasks {
                println!("\n=============================================");
                println!(
                    "{} [{}]",
                    task.name,
                    if task.active { "active" } else { "paused" }
                );
                println!("=============================================");
                if !task.description.is_empty() {
                    println!("  Description:   {}", task.description);
                }
                println!("  Configuration: {}", task.config_name);
                println!("  Chat:          {}", task.chat_id);
                println!("  Schedule:      {}", task.schedule_label());
                println!(
                    "  Created:       {}",
                    task.created_at.format(constants::TIMESTAMP_FORMAT)
                );
                println!(
                    "  Last run:      {}",
                    task.last_run.map_or_else(
                        || "never".to_string(),
                        |t| t.format(constants::TIMESTAMP_FORMAT).to_string()
                    )
                );
                println!(
                    "  Next run:      {}",
                    task.next_run.format(constants::TIMESTAMP_FORMAT)
                );
                println!(
                    "  Runs:          {} ({} ok, {} failed)",
                    task.run_count, task.success_count, task.error_count
                );
                if let Some(err) = &task.last_error {
                    println!("  Last error:    {}", err);
                }

                for run in store.recent_runs(task.id, constants::TASK_HISTORY_LIMIT).await? {
                    let detail = run.error.as_deref().or(run.artifact.as_deref()).unwrap_or("");
                    println!(
                        "    {} {:<6} {:>5} rows {:>4}s  {}",
                        run.started_at.format(constants::TIMESTAMP_FORMAT),
                        if run.success { "ok" } else { "FAILED" },
                        run.row_count,
                        (run.finished_at - run.started_at).num_seconds(),
                        detail
                    );
                }
            }
            println!("\n{}", store.stats().await?);
        }

        TaskCommand::Toggle { name } => {
            let task = store
                .get_task(&name)
                .await?
                .with_context(|| format!("No task named '{}'", name))?;
            let active = !task.active;
            // Resuming starts from the next slot instead of replaying missed ones
            let next_run = active.then(|| {
                scheduler::next_run_after(Local::now().naive_local(), task.send_time, task.frequency)
            });
            store.set_task_active(&name, active, next_run).await?;
            println!(
                "Task '{}' is now {}",
                name,
                if active { "active" } else { "paused" }
            );
        }

        TaskCommand::Delete { name } => {
            if store.delete_task(&name).await? {
                println!("Deleted task '{}'", name);
            } else {
                println!("No task named '{}'", name);
            }
        }

        TaskCommand::Run { name } => {
            let task = store
                .get_task(&name)
                .await?
                .with_context(|| format!("No task named '{}'", name))?;
            let notifier = TelegramNotifier::new(config.telegram()?);
            let ctx = ReportContext {
                config,
                store: &store,
                sources: config,
                notifier: &notifier,
            };

            let run = scheduler::run_task(&ctx, &task, Local::now().naive_local()).await?;
            match &run.error {
                None => println!(
                    "Task '{}' delivered {} rows ({})",
                    name,
                    run.rows,
                    run.artifact.as_deref().unwrap_or("-")
                ),
                Some(err) => bail!("Task '{}' failed: {}", name, err),
            }
        }
    }
    Ok(())
}

/// Run the scheduler until interrupted
async fn handle_schedule(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let telegram = config.telegram()?;
    info!(token = %mask_secret(&telegram.bot_token), "telegram configured");

    let notifier = TelegramNotifier::new(telegram);
    let ctx = ReportContext {
        config,
        store: &store,
        sources: config,
        notifier: &notifier,
    };
    scheduler::run_daemon(&ctx).await?;
    Ok(())
}

/// Handle telegram subcommands
async fn handle_telegram_command(config: &Config, action: TelegramCommand) -> Result<()> {
    match action {
        TelegramCommand::Test { chat_id } => {
            let telegram = config.telegram()?;
            let chat_id = default_chat(config, chat_id)?;
            println!("Using bot token {}", mask_secret(&telegram.bot_token));

            let notifier = TelegramNotifier::new(telegram);
            let bot = notifier.get_me().await?;
            println!(
                "Bot: {} (@{}, id {})",
                bot.first_name,
                bot.username.as_deref().unwrap_or("-"),
                bot.id
            );

            let text = format!(
                "<b>mt5-reports</b>\nTest message sent {}",
                Local::now().format(constants::TIMESTAMP_FORMAT)
            );
            notifier.send_message(&chat_id, &text).await?;
            println!("Sent test message to {}", chat_id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("mt5-reports").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_report_is_the_default_command() {
        let args = parse(&[]);
        assert!(args.command.is_none());
        assert_eq!(args.config, PathBuf::from(constants::CONFIG_FILE));
    }

    #[test]
    fn test_report_flags_build_a_configuration() {
        let args = parse(&[
            "report",
            "--group",
            "real\\vip",
            "--group",
            "real\\pro*",
            "--min-profit",
            "-500",
            "--exclude-login",
            "10001",
            "--sort",
            "descending",
            "--output",
            "xlsx",
            "--limit",
            "20",
        ]);
        let Some(Command::Report(report)) = args.command else {
            panic!("expected report command");
        };

        let config = report.apply(ReportConfiguration::default());
        assert_eq!(
            config.criteria.groups,
            Some(BTreeSet::from(["real\\vip".to_string(), "real\\pro*".to_string()]))
        );
        assert_eq!(config.criteria.min_profit, Some(dec!(-500)));
        assert!(config.criteria.excluded_logins.contains(&10_001));
        assert_eq!(config.sort, SortOrder::Descending);
        assert_eq!(config.output, OutputFormat::Xlsx);
        assert_eq!(config.limit, Some(20));
    }

    #[test]
    fn test_flags_override_saved_values_only_when_given() {
        let saved = ReportConfiguration {
            name: "vip".to_string(),
            database: Some("live".to_string()),
            sort: SortOrder::Descending,
            criteria: filters::FilterCriteria {
                agent: Some("501".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let flags = ReportArgs {
            zip: Some("10115".to_string()),
            ..Default::default()
        };

        let merged = flags.apply(saved);
        assert_eq!(merged.name, "vip");
        assert_eq!(merged.database.as_deref(), Some("live"));
        assert_eq!(merged.sort, SortOrder::Descending);
        assert_eq!(merged.criteria.agent.as_deref(), Some("501"));
        assert_eq!(merged.criteria.zip.as_deref(), Some("10115"));
    }

    #[test]
    fn test_task_add_parses_schedule() {
        let args = parse(&[
            "task", "add", "eod", "--report", "vip", "--time", "18:30", "--frequency", "weekly",
        ]);
        let Some(Command::Task {
            action: TaskCommand::Add {
                time, frequency, ..
            },
        }) = args.command
        else {
            panic!("expected task add");
        };
        assert_eq!(time, "18:30");
        assert_eq!(frequency, Frequency::Weekly);
    }

    #[test]
    fn test_missing_config_file_explains_setup() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("config.toml.example"));
    }
}
