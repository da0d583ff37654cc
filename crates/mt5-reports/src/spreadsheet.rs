//! Excel workbook output (Summary, Daily_Report, Categorized_Deals)

use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use std::path::Path;
use tracing::info;

use crate::constants;
use crate::error::ReportError;
use crate::pipeline::ReportOutcome;
use crate::reports::{self, Cell, TableModel};

const MIN_COLUMN_WIDTH: usize = 8;
const COLUMN_PADDING: usize = 2;

/// First row of the header line on every sheet (title, generated, configuration, blank)
const TABLE_START_ROW: u32 = 4;

struct Formats {
    title: Format,
    subtitle: Format,
    header: Format,
    label: Format,
    integer: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            title: Format::new()
                .set_bold()
                .set_font_size(16)
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(constants::HEADER_COLOR))
                .set_align(FormatAlign::VerticalCenter),
            subtitle: Format::new().set_italic().set_font_color(Color::Gray),
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(constants::HEADER_COLOR))
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center),
            label: Format::new().set_bold(),
            integer: Format::new().set_num_format("0"),
        }
    }
}

/// "#,##0.00" with the currency symbol, or the ISO code when there is none
fn money_pattern(currency: &str) -> String {
    let code = currency.trim();
    match reports::currency_symbol(code) {
        Some(symbol) => format!("\"{}\"#,##0.00", symbol),
        None if code.is_empty() => "#,##0.00".to_string(),
        None => format!("#,##0.00 \"{}\"", code),
    }
}

/// Column widths that fit the longest rendered value; never capped
pub fn column_widths(table: &TableModel) -> Vec<f64> {
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();

    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.display().chars().count();
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(len);
            }
        }
    }

    widths
        .into_iter()
        .map(|w| (w.max(MIN_COLUMN_WIDTH) + COLUMN_PADDING) as f64)
        .collect()
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    formats: &Formats,
) -> Result<(), XlsxError> {
    match cell {
        Cell::Id(n) | Cell::Count(n) => {
            sheet.write_number_with_format(row, col, *n as f64, &formats.integer)?;
        }
        Cell::Money { amount, currency } => {
            let value = amount.round_dp(2).to_f64().unwrap_or_default();
            let format = Format::new().set_num_format(money_pattern(currency));
            sheet.write_number_with_format(row, col, value, &format)?;
        }
        Cell::Empty => {}
        other => {
            sheet.write_string(row, col, other.plain())?;
        }
    }
    Ok(())
}

/// Title, generation time and configuration name above every table
fn write_heading(
    sheet: &mut Worksheet,
    title: &str,
    outcome: &ReportOutcome,
    last_col: u16,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let last_col = last_col.max(1);
    sheet.merge_range(0, 0, 0, last_col, title, &formats.title)?;
    sheet.set_row_height(0, 24)?;
    sheet.write_string_with_format(
        1,
        0,
        format!("Generated: {}", outcome.generated_label()),
        &formats.subtitle,
    )?;
    sheet.write_string_with_format(
        2,
        0,
        format!(
            "Configuration: {} | Database: {} | Period: {}",
            outcome.config.display_name(),
            outcome.database,
            outcome.window
        ),
        &formats.subtitle,
    )?;
    Ok(())
}

/// Write a table with its header at `start_row`; returns the next free row
fn write_table(
    sheet: &mut Worksheet,
    table: &TableModel,
    start_row: u32,
    formats: &Formats,
) -> Result<u32, XlsxError> {
    for (col, header) in table.headers.iter().enumerate() {
        sheet.write_string_with_format(start_row, col as u16, *header, &formats.header)?;
    }

    let mut row = start_row + 1;
    for cells in &table.rows {
        for (col, cell) in cells.iter().enumerate() {
            write_cell(sheet, row, col as u16, cell, formats)?;
        }
        row += 1;
    }
    Ok(row)
}

fn apply_widths(sheet: &mut Worksheet, widths: &[f64]) -> Result<(), XlsxError> {
    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }
    Ok(())
}

fn last_col(table: &TableModel) -> u16 {
    table.headers.len().saturating_sub(1) as u16
}

fn summary_sheet(
    workbook: &mut Workbook,
    outcome: &ReportOutcome,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let currency = reports::report_currency(&outcome.rows);
    let totals = reports::category_totals_table(&outcome.categorized, &currency);
    let periods = reports::category_summary_table(&outcome.categorized, &currency);

    let sheet = workbook.add_worksheet();
    sheet.set_name(constants::SHEET_SUMMARY)?;
    write_heading(
        sheet,
        &format!("Summary: {}", outcome.config.display_name()),
        outcome,
        last_col(&totals),
        formats,
    )?;

    let mut row = TABLE_START_ROW;
    for (label, value) in reports::summary_fields(outcome) {
        sheet.write_string_with_format(row, 0, label, &formats.label)?;
        write_cell(sheet, row, 1, &value, formats)?;
        row += 1;
    }

    row = write_table(sheet, &totals, row + 1, formats)?;
    if !periods.rows.is_empty() {
        write_table(sheet, &periods, row + 1, formats)?;
    }

    // Label column holds the long field names; the value column holds the filter description
    let mut widths = column_widths(&totals);
    for (label, value) in reports::summary_fields(outcome) {
        widths[0] = widths[0].max((label.len() + COLUMN_PADDING) as f64);
        widths[1] = widths[1].max((value.display().chars().count() + COLUMN_PADDING) as f64);
    }
    apply_widths(sheet, &widths)
}

fn table_sheet(
    workbook: &mut Workbook,
    name: &str,
    title: String,
    table: &TableModel,
    outcome: &ReportOutcome,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;
    write_heading(sheet, &title, outcome, last_col(table), formats)?;
    write_table(sheet, table, TABLE_START_ROW, formats)?;
    sheet.set_freeze_panes(TABLE_START_ROW + 1, 0)?;
    apply_widths(sheet, &column_widths(table))
}

fn build_workbook(outcome: &ReportOutcome, path: &Path) -> Result<(), XlsxError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    summary_sheet(&mut workbook, outcome, &formats)?;
    table_sheet(
        &mut workbook,
        constants::SHEET_DAILY_REPORT,
        format!("Daily Report: {}", outcome.config.display_name()),
        &reports::daily_report_table(&outcome.rows),
        outcome,
        &formats,
    )?;
    table_sheet(
        &mut workbook,
        constants::SHEET_DEALS,
        format!("Categorized Deals: {}", outcome.config.display_name()),
        &reports::deals_table(&outcome.categorized),
        outcome,
        &formats,
    )?;

    workbook.save(path)
}

/// Write the three-sheet workbook for a report run
pub fn write_workbook(outcome: &ReportOutcome, path: &Path) -> Result<(), ReportError> {
    build_workbook(outcome, path)
        .map_err(|e| ReportError::render(path.display().to_string(), e))?;
    info!(path = %path.display(), rows = outcome.rows.len(), "wrote workbook");
    Ok(())
}
