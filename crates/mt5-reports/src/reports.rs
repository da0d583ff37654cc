//! Report presentation (console tables, CSV and JSON outputs)
//!
//! Every output is built from the same `TableModel`, so console, CSV and
//! spreadsheet agree on columns. Logins and deal ids are plain integers;
//! money is rounded to two decimals.

use chrono::{NaiveDate, NaiveDateTime};
use csv::Writer;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Style};
use tracing::info;

use crate::assembler::{ReportRow, ReportSummary};
use crate::categorizer::{CategorizedDeals, PeriodAggregate};
use crate::constants;
use crate::deals::{Category, Deal, Period, PeriodGranularity};
use crate::error::ReportError;
use crate::filters::FilterCriteria;
use crate::pipeline::{DateWindow, DealsOutcome, ReportOutcome};

// =============================================================================
// Formatting
// =============================================================================

pub fn currency_symbol(code: &str) -> Option<&'static str> {
    match code.trim().to_ascii_uppercase().as_str() {
        "USD" | "USC" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    }
}

fn round_money(amount: Decimal) -> Decimal {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    // -0.00 prints as 0.00
    if rounded.is_zero() { Decimal::ZERO } else { rounded }
}

/// Insert thousands separators into the integer part of "1234567.89"
fn group_thousands(plain: &str) -> String {
    let (int_part, frac) = plain.split_once('.').unwrap_or((plain, ""));
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(plain.len() + digits.len() / 3);

    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    if !frac.is_empty() {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

/// Two decimals, no separators ("-1234.50"); used for CSV
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round_money(amount))
}

/// Two decimals, thousands separators and the currency's symbol
/// ("-$1,234.50", "1,234.50 AED")
pub fn format_money(amount: Decimal, currency: &str) -> String {
    let rounded = round_money(amount);
    let sign = if rounded < Decimal::ZERO { "-" } else { "" };
    let body = group_thousands(&format!("{:.2}", rounded.abs()));

    match currency_symbol(currency) {
        Some(symbol) => format!("{}{}{}", sign, symbol, body),
        None if currency.trim().is_empty() => format!("{}{}", sign, body),
        None => format!("{}{} {}", sign, body, currency.trim()),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// The single currency shared by every row, if there is one
pub fn report_currency(rows: &[ReportRow]) -> String {
    let mut currencies = rows.iter().map(|r| r.snapshot.currency.as_str());
    match currencies.next() {
        Some(first) if currencies.all(|c| c == first) => first.to_string(),
        _ => String::new(),
    }
}

// =============================================================================
// Table model
// =============================================================================

/// A typed cell; each sink decides how to render it
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    /// Login or deal id, never grouped
    Id(u64),
    Count(u64),
    Money { amount: Decimal, currency: String },
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Empty,
}

impl Cell {
    fn money(amount: Decimal, currency: &str) -> Self {
        Cell::Money {
            amount,
            currency: currency.to_string(),
        }
    }

    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn optional(value: &Option<String>) -> Self {
        value.as_ref().map_or(Cell::Empty, |v| Cell::Text(v.clone()))
    }

    /// Console rendering
    pub fn display(&self) -> String {
        match self {
            Cell::Money { amount, currency } => format_money(*amount, currency),
            other => other.plain(),
        }
    }

    /// Machine-friendly rendering for CSV
    pub fn plain(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Id(n) | Cell::Count(n) => n.to_string(),
            Cell::Money { amount, .. } => format_amount(*amount),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::DateTime(t) => t.format(constants::TIMESTAMP_FORMAT).to_string(),
            Cell::Empty => String::new(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Id(_) | Cell::Count(_) | Cell::Money { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TableModel {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl TableModel {
    fn new(headers: Vec<&'static str>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    fn to_console(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().map(|h| h.to_string()));
        for row in &self.rows {
            builder.push_record(row.iter().map(Cell::display));
        }

        let mut table = builder.build();
        table.with(Style::psql());
        if let Some(first) = self.rows.first() {
            for (i, cell) in first.iter().enumerate() {
                if cell.is_numeric() {
                    table.modify(Columns::new(i..=i), Alignment::right());
                }
            }
        }
        table.to_string()
    }

    fn write_csv(&self, path: &Path) -> Result<(), ReportError> {
        let err = |e: csv::Error| ReportError::render(path.display().to_string(), e);
        let mut wtr = Writer::from_path(path).map_err(err)?;

        wtr.write_record(&self.headers).map_err(err)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(Cell::plain)).map_err(err)?;
        }
        wtr.flush()
            .map_err(|e| ReportError::render(path.display().to_string(), e))?;
        Ok(())
    }
}

pub const DAILY_REPORT_HEADERS: [&str; 15] = [
    "Login",
    "Name",
    "Group",
    "Currency",
    "Agent",
    "ZIP",
    "Balance",
    "Prev Equity",
    "Current Equity",
    "Deposits",
    "Withdrawals",
    "Promotions",
    "Credit",
    "Equity P/L",
    "Net P/L",
];

pub fn daily_report_table(rows: &[ReportRow]) -> TableModel {
    let mut table = TableModel::new(DAILY_REPORT_HEADERS.to_vec());

    for row in rows {
        let s = &row.snapshot;
        let cur = s.currency.as_str();
        table.rows.push(vec![
            Cell::Id(s.login),
            Cell::text(&s.name),
            Cell::text(&s.group),
            Cell::text(&s.currency),
            Cell::optional(&s.agent),
            Cell::optional(&s.zip),
            Cell::money(s.balance, cur),
            Cell::money(s.previous_equity, cur),
            Cell::money(s.current_equity, cur),
            Cell::money(row.deposits(), cur),
            Cell::money(row.withdrawals(), cur),
            Cell::money(row.promotions(), cur),
            Cell::money(row.credits(), cur),
            Cell::money(row.equity_pl, cur),
            Cell::money(row.net_pl, cur),
        ]);
    }
    table
}

fn deal_cells(category: Category, deal: &Deal, comment_chars: Option<usize>) -> Vec<Cell> {
    let comment = match comment_chars {
        Some(max) => truncate(&deal.comment, max),
        None => deal.comment.clone(),
    };
    vec![
        Cell::Id(deal.id),
        Cell::Id(deal.login),
        Cell::DateTime(deal.time),
        Cell::text(category.to_string()),
        Cell::money(deal.amount, deal.currency.as_deref().unwrap_or_default()),
        deal.action.map_or(Cell::Empty, |a| Cell::Count(u64::from(a))),
        Cell::text(comment),
    ]
}

pub const DEAL_HEADERS: [&str; 7] = [
    "Deal ID", "Login", "Time", "Category", "Amount", "Action", "Comment",
];

pub fn deals_table(categorized: &CategorizedDeals) -> TableModel {
    let mut table = TableModel::new(DEAL_HEADERS.to_vec());
    for (category, deal) in categorized.sorted_deals() {
        table.rows.push(deal_cells(category, deal, None));
    }
    table
}

pub const CATEGORY_SUMMARY_HEADERS: [&str; 7] =
    ["Category", "Period", "Count", "Sum", "Average", "Min", "Max"];

fn aggregate_cells(label: Cell, period: Cell, a: &PeriodAggregate, currency: &str) -> Vec<Cell> {
    let bound = |v: Option<Decimal>| v.map_or(Cell::Empty, |v| Cell::money(v, currency));
    vec![
        label,
        period,
        Cell::Count(a.count),
        Cell::money(a.sum, currency),
        Cell::money(a.average(), currency),
        bound(a.min),
        bound(a.max),
    ]
}

/// One row per non-empty (category, period) bucket
pub fn category_summary_table(categorized: &CategorizedDeals, currency: &str) -> TableModel {
    let mut table = TableModel::new(CATEGORY_SUMMARY_HEADERS.to_vec());
    for ((category, period), aggregate) in &categorized.aggregates {
        table.rows.push(aggregate_cells(
            Cell::text(category.to_string()),
            Cell::text(period.to_string()),
            aggregate,
            currency,
        ));
    }
    table
}

/// Whole-window totals, one row per category (zero rows included)
pub fn category_totals_table(categorized: &CategorizedDeals, currency: &str) -> TableModel {
    let mut table = TableModel::new(CATEGORY_SUMMARY_HEADERS.to_vec());
    let label = match categorized.time_span() {
        Some((first, last)) => format!("{} to {}", first.date(), last.date()),
        None => "-".to_string(),
    };
    for (category, aggregate) in categorized.overall.iter() {
        table.rows.push(aggregate_cells(
            Cell::text(category.to_string()),
            Cell::text(label.clone()),
            &aggregate,
            currency,
        ));
    }
    table
}

/// Label/value pairs shown at the top of every artifact
pub fn summary_fields(outcome: &ReportOutcome) -> Vec<(&'static str, Cell)> {
    let cur = report_currency(&outcome.rows);
    let s: &ReportSummary = &outcome.summary;
    vec![
        ("Configuration", Cell::text(outcome.config.display_name())),
        ("Database", Cell::text(&outcome.database)),
        ("Generated", Cell::DateTime(outcome.generated_at)),
        ("Period", Cell::text(outcome.window.to_string())),
        (
            "Snapshot date",
            outcome.window.snapshot_date.map_or(Cell::Empty, Cell::Date),
        ),
        ("Filters", Cell::text(outcome.config.criteria.describe())),
        ("Sort", Cell::text(outcome.config.sort.to_string())),
        ("Accounts", Cell::Count(s.accounts as u64)),
        ("Profitable accounts", Cell::Count(s.profitable as u64)),
        ("Losing accounts", Cell::Count(s.losing as u64)),
        ("Total balance", Cell::money(s.balance, &cur)),
        ("Total equity", Cell::money(s.current_equity, &cur)),
        ("Deposits", Cell::money(s.deposits, &cur)),
        ("Withdrawals", Cell::money(s.withdrawals, &cur)),
        ("Promotions", Cell::money(s.promotions, &cur)),
        ("Credit", Cell::money(s.credits, &cur)),
        ("Equity P/L", Cell::money(s.equity_pl, &cur)),
        ("Net P/L", Cell::money(s.net_pl, &cur)),
        ("Deals", Cell::Count(outcome.categorized.total() as u64)),
        ("Skipped deal rows", Cell::Count(outcome.categorized.skipped as u64)),
    ]
}

// =============================================================================
// Console
// =============================================================================

fn banner(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n============================================================");
    let _ = writeln!(out, "  {}", title);
    let _ = writeln!(out, "============================================================\n");
}

/// Full console rendering of a report run
pub fn console_report(outcome: &ReportOutcome) -> String {
    let mut out = String::new();
    banner(
        &mut out,
        &format!("DAILY REPORT: {}", outcome.config.display_name()),
    );

    for (label, value) in summary_fields(outcome) {
        let _ = writeln!(out, "  {:<22} {}", format!("{}:", label), value.display());
    }

    if outcome.is_empty() {
        let _ = writeln!(out, "\nNo accounts matched.");
        return out;
    }

    let _ = writeln!(out, "\n{}", daily_report_table(&outcome.rows).to_console());

    let currency = report_currency(&outcome.rows);
    banner(&mut out, "CATEGORY TOTALS");
    let _ = writeln!(
        out,
        "{}",
        category_totals_table(&outcome.categorized, &currency).to_console()
    );

    out.push_str(&deal_listing(&outcome.categorized));
    out
}

fn deal_listing(categorized: &CategorizedDeals) -> String {
    let mut out = String::new();
    let deals = categorized.sorted_deals();
    if deals.is_empty() {
        return out;
    }

    banner(&mut out, "CATEGORIZED DEALS");
    let mut table = TableModel::new(DEAL_HEADERS.to_vec());
    for (category, deal) in deals.iter().take(constants::CONSOLE_MAX_DEAL_ROWS) {
        table
            .rows
            .push(deal_cells(*category, deal, Some(constants::CONSOLE_COMMENT_CHARS)));
    }
    let _ = writeln!(out, "{}", table.to_console());

    if deals.len() > constants::CONSOLE_MAX_DEAL_ROWS {
        let _ = writeln!(
            out,
            "  ... {} more deals (use --output xlsx or csv for the full listing)",
            deals.len() - constants::CONSOLE_MAX_DEAL_ROWS
        );
    }
    out
}

/// Console rendering of the deals-only listing
pub fn console_deals(outcome: &DealsOutcome, summary_only: bool) -> String {
    let categorized = &outcome.categorized;
    let mut out = String::new();
    banner(&mut out, &format!("DEALS CATEGORIZER: {}", outcome.database));

    let bucket = match categorized.granularity {
        PeriodGranularity::Month => "month",
        PeriodGranularity::Year => "year",
    };
    let _ = writeln!(out, "  Period:        {}", outcome.window);
    let _ = writeln!(out, "  Deals:         {}", categorized.total());
    let _ = writeln!(out, "  Skipped rows:  {}", categorized.skipped);
    let _ = writeln!(out, "  Buckets:       {} by {}", categorized.periods().len(), bucket);
    let _ = writeln!(out);

    for category in Category::ALL {
        let _ = writeln!(
            out,
            "  {:<14} {:>6} deals  {:>18}",
            format!("{}:", category),
            categorized.count(category),
            format_money(categorized.overall.sum(category), "")
        );
    }

    if !categorized.aggregates.is_empty() {
        let _ = writeln!(out, "\n{}", category_summary_table(categorized, "").to_console());
    }

    if !summary_only {
        out.push_str(&deal_listing(categorized));
    }
    out
}

// =============================================================================
// CSV
// =============================================================================

/// Write daily report, categorized deals and category summary CSVs
pub fn write_csv_reports(
    outcome: &ReportOutcome,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, ReportError> {
    let stem = outcome.file_stem();
    let currency = report_currency(&outcome.rows);
    let outputs = [
        (
            constants::DAILY_REPORT_FILENAME,
            daily_report_table(&outcome.rows),
        ),
        (constants::DEALS_FILENAME, deals_table(&outcome.categorized)),
        (
            constants::CATEGORY_SUMMARY_FILENAME,
            category_summary_table(&outcome.categorized, &currency),
        ),
    ];

    let mut paths = Vec::with_capacity(outputs.len());
    for (suffix, table) in outputs {
        let path = output_dir.join(format!("{}_{}", stem, suffix));
        table.write_csv(&path)?;
        info!(path = %path.display(), rows = table.rows.len(), "wrote csv");
        paths.push(path);
    }
    Ok(paths)
}

// =============================================================================
// JSON
// =============================================================================

#[derive(Serialize)]
struct JsonAggregate {
    category: Category,
    period: String,
    count: u64,
    sum: Decimal,
    average: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
}

#[derive(Serialize)]
struct JsonDeal<'a> {
    category: Category,
    #[serde(flatten)]
    deal: &'a Deal,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    configuration: &'a str,
    database: &'a str,
    generated_at: NaiveDateTime,
    window: &'a DateWindow,
    criteria: &'a FilterCriteria,
    summary: &'a ReportSummary,
    rows: &'a [ReportRow],
    categories: Vec<JsonAggregate>,
    deals: Vec<JsonDeal<'a>>,
    skipped: usize,
}

fn json_aggregates(categorized: &CategorizedDeals) -> Vec<JsonAggregate> {
    categorized
        .aggregates
        .iter()
        .map(|((category, period), a): (&(Category, Period), &PeriodAggregate)| JsonAggregate {
            category: *category,
            period: period.to_string(),
            count: a.count,
            sum: a.sum,
            average: a.average(),
            min: a.min,
            max: a.max,
        })
        .collect()
}

pub fn write_json_report(outcome: &ReportOutcome, path: &Path) -> Result<(), ReportError> {
    let report = JsonReport {
        configuration: outcome.config.display_name(),
        database: &outcome.database,
        generated_at: outcome.generated_at,
        window: &outcome.window,
        criteria: &outcome.config.criteria,
        summary: &outcome.summary,
        rows: &outcome.rows,
        categories: json_aggregates(&outcome.categorized),
        deals: outcome
            .categorized
            .sorted_deals()
            .into_iter()
            .map(|(category, deal)| JsonDeal { category, deal })
            .collect(),
        skipped: outcome.categorized.skipped,
    };

    let file = std::fs::File::create(path)
        .map_err(|e| ReportError::render(path.display().to_string(), e))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &report)
        .map_err(|e| ReportError::render(path.display().to_string(), e))?;

    info!(path = %path.display(), "wrote json");
    Ok(())
}
