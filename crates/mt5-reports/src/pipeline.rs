//! One report run: validate, fetch, categorize, assemble, filter, sort, render
//!
//! Runs are strictly sequential. Any error aborts the run before an
//! artifact exists, so a failed run never leaves a partial file behind for
//! the notifier.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::assembler::{self, ReportRow, ReportSummary, SortOrder, UserAccountSnapshot};
use crate::categorizer::{CategorizedDeals, Classifier};
use crate::constants;
use crate::deals::{PeriodGranularity, RawDeal};
use crate::error::ReportError;
use crate::filters::{self, FilterCriteria};
use crate::reports;
use crate::source::{DealQuery, RecordSource, SnapshotQuery};
use crate::spreadsheet;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Console,
    Xlsx,
    Csv,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Console => write!(f, "console"),
            OutputFormat::Xlsx => write!(f, "xlsx"),
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Named, persisted report definition. Immutable during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfiguration {
    pub name: String,
    /// Database target; None means the configured default
    pub database: Option<String>,
    pub criteria: FilterCriteria,
    pub sort: SortOrder,
    pub output: OutputFormat,
    pub granularity: PeriodGranularity,
    /// Maximum rows after filtering and sorting
    pub limit: Option<usize>,
    /// Include BUY/SELL deals alongside cash-flow deals
    pub include_trades: bool,
    pub saved_at: Option<NaiveDateTime>,
}

impl ReportConfiguration {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "ad-hoc"
        } else {
            &self.name
        }
    }

    /// Effective date window included, so it depends on `today`
    pub fn validate(&self, today: NaiveDate) -> Result<(), ReportError> {
        if self.limit == Some(0) {
            return Err(ReportError::Validation("limit must be at least 1".to_string()));
        }
        self.criteria.validate(today)
    }
}

/// Inclusive date window of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Date of the account snapshots used, when any exist in the window
    pub snapshot_date: Option<NaiveDate>,
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Everything a presenter needs from a finished run
#[derive(Debug)]
pub struct ReportOutcome {
    pub config: ReportConfiguration,
    pub database: String,
    pub window: DateWindow,
    pub rows: Vec<ReportRow>,
    /// Deals of the reported accounts only
    pub categorized: CategorizedDeals,
    pub summary: ReportSummary,
    pub generated_at: NaiveDateTime,
}

impl ReportOutcome {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn generated_label(&self) -> String {
        self.generated_at.format(constants::TIMESTAMP_FORMAT).to_string()
    }

    /// Base filename shared by every artifact of this run
    pub fn file_stem(&self) -> String {
        let name: String = self
            .config
            .display_name()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!(
            "{}_{}",
            name,
            self.generated_at.format(constants::FILENAME_TIMESTAMP_FORMAT)
        )
    }
}

/// Result of the deals-only listing
#[derive(Debug)]
pub struct DealsOutcome {
    pub database: String,
    pub window: DateWindow,
    pub categorized: CategorizedDeals,
}

/// Copy account attribution from the snapshot onto its deals
fn enrich_deals(deals: &mut [RawDeal], snapshots: &[UserAccountSnapshot]) {
    let by_login: HashMap<u64, &UserAccountSnapshot> =
        snapshots.iter().map(|s| (s.login, s)).collect();

    for deal in deals {
        let Some(snapshot) = deal.login.and_then(|login| by_login.get(&login)) else {
            continue;
        };
        if deal.currency.is_none() && !snapshot.currency.is_empty() {
            deal.currency = Some(snapshot.currency.clone());
        }
        if deal.agent.is_none() {
            deal.agent = snapshot.agent.clone();
        }
        if deal.zip.is_none() {
            deal.zip = snapshot.zip.clone();
        }
    }
}

/// Run the full report pipeline against a source
///
/// Equity P/L comes from the snapshot's `EquityPrevMonth`, so cash flows are
/// only counted from the first day of the snapshot's month. An earlier start
/// date is clamped and the returned window shows the effective start.
pub async fn run_report<S: RecordSource + ?Sized>(
    source: &S,
    classifier: &Classifier,
    config: &ReportConfiguration,
    database: &str,
    today: NaiveDate,
) -> Result<ReportOutcome, ReportError> {
    config.validate(today)?;
    let criteria = &config.criteria;
    let filter = criteria.compile()?;
    let (start, end) = criteria.window(today)?;

    let snapshot_date = source.latest_snapshot_date(start, end).await?;

    let Some(date) = snapshot_date else {
        let window = DateWindow {
            start,
            end,
            snapshot_date,
        };
        info!(report = %config.display_name(), %window, "no account snapshots in window");
        return Ok(ReportOutcome {
            config: config.clone(),
            database: database.to_string(),
            window,
            rows: Vec::new(),
            categorized: CategorizedDeals::default(),
            summary: ReportSummary::default(),
            generated_at: Local::now().naive_local(),
        });
    };

    let deals_start = start.max(filters::month_start(date));
    if deals_start > start {
        info!(requested = %start, effective = %deals_start, "cash-flow window clamped to the snapshot month");
    }
    let window = DateWindow {
        start: deals_start,
        end,
        snapshot_date,
    };

    let snapshots: Vec<UserAccountSnapshot> = source
        .fetch_snapshots(&SnapshotQuery::new(date, criteria))
        .await?
        .into_iter()
        .filter(|s| filter.matches_snapshot(s))
        .collect();

    let mut deal_query = DealQuery::new(deals_start, end, config.include_trades);
    deal_query.logins = Some(snapshots.iter().map(|s| s.login).collect());
    let mut raws = if snapshots.is_empty() {
        Vec::new()
    } else {
        source.fetch_deals(&deal_query).await?
    };

    enrich_deals(&mut raws, &snapshots);
    raws.retain(|d| filter.matches_raw(d));

    let categorized = classifier.categorize(raws.clone(), config.granularity);
    let skipped = categorized.skipped;
    if skipped > 0 {
        warn!(skipped, "deal rows without login or time were skipped");
    }

    let mut rows = criteria.apply(assembler::assemble(snapshots, &categorized))?;
    assembler::sort_rows(&mut rows, config.sort);
    if let Some(limit) = config.limit {
        rows.truncate(limit);
    }

    // Deal listings cover the reported accounts only
    let reported: HashSet<u64> = rows.iter().map(ReportRow::login).collect();
    raws.retain(|d| d.login.is_some_and(|login| reported.contains(&login)));
    let mut categorized = classifier.categorize(raws, config.granularity);
    categorized.skipped = skipped;

    let summary = ReportSummary::from_rows(&rows);
    info!(
        report = %config.display_name(),
        database,
        %window,
        rows = rows.len(),
        deals = categorized.total(),
        "report assembled"
    );

    Ok(ReportOutcome {
        config: config.clone(),
        database: database.to_string(),
        window,
        rows,
        categorized,
        summary,
        generated_at: Local::now().naive_local(),
    })
}

/// Categorize deals in the window without joining account snapshots
pub async fn run_deals<S: RecordSource + ?Sized>(
    source: &S,
    classifier: &Classifier,
    config: &ReportConfiguration,
    database: &str,
    today: NaiveDate,
) -> Result<DealsOutcome, ReportError> {
    config.validate(today)?;
    let criteria = &config.criteria;
    let filter = criteria.compile()?;
    let (start, end) = criteria.window(today)?;

    let mut query = DealQuery::new(start, end, config.include_trades);
    query.min_login = criteria.min_login;
    query.max_login = criteria.max_login;

    let mut raws = source.fetch_deals(&query).await?;
    raws.retain(|d| filter.matches_raw(d));
    let categorized = classifier.categorize(raws, config.granularity);

    info!(database, start = %start, end = %end, deals = categorized.total(), skipped = categorized.skipped, "deals categorized");

    Ok(DealsOutcome {
        database: database.to_string(),
        window: DateWindow {
            start,
            end,
            snapshot_date: None,
        },
        categorized,
    })
}

/// A rendered report
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Text(String),
    Files(Vec<PathBuf>),
}

impl Artifact {
    /// The file to attach when delivering, if any
    pub fn primary_file(&self) -> Option<&Path> {
        match self {
            Artifact::Files(files) => files.first().map(PathBuf::as_path),
            Artifact::Text(_) => None,
        }
    }
}

pub fn render(
    outcome: &ReportOutcome,
    format: OutputFormat,
    output_dir: &Path,
) -> Result<Artifact, ReportError> {
    let ensure_dir = || {
        std::fs::create_dir_all(output_dir)
            .map_err(|e| ReportError::render(output_dir.display().to_string(), e))
    };

    match format {
        OutputFormat::Console => Ok(Artifact::Text(reports::console_report(outcome))),
        OutputFormat::Xlsx => {
            ensure_dir()?;
            let path = output_dir.join(format!("{}.xlsx", outcome.file_stem()));
            spreadsheet::write_workbook(outcome, &path)?;
            Ok(Artifact::Files(vec![path]))
        }
        OutputFormat::Csv => {
            ensure_dir()?;
            Ok(Artifact::Files(reports::write_csv_reports(outcome, output_dir)?))
        }
        OutputFormat::Json => {
            ensure_dir()?;
            let path = output_dir.join(format!("{}.json", outcome.file_stem()));
            reports::write_json_report(outcome, &path)?;
            Ok(Artifact::Files(vec![path]))
        }
    }
}
