//! Headless presentation queries over tender records.
//!
//! Pure functions from `(record set, filter spec, sort spec, page)` to a
//! visible page, so any front end (or a test harness) owns only the current
//! parameter values. Also hosts the spreadsheet export.

use std::cmp::Ordering;
use std::path::Path;

use itr_core::{StatusLabel, TenderRecord};
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "itr-query";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("spreadsheet export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Conjunction of independent predicates; the default matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    pub it_only: bool,
    pub favorites_only: bool,
    /// Plain substring match on the date column.
    pub date_contains: String,
    /// Case-insensitive substring match on the title.
    pub title_contains: String,
    /// Case-insensitive substring match on the contracting body.
    pub body_contains: String,
    pub min_budget: Option<f64>,
    pub status: Option<StatusLabel>,
}

impl FilterSpec {
    pub fn matches(&self, record: &TenderRecord) -> bool {
        if self.it_only && !record.is_it {
            return false;
        }
        if self.favorites_only && !record.is_favorite {
            return false;
        }
        if !record.date.contains(&self.date_contains) {
            return false;
        }
        if !contains_ci(&record.title, &self.title_contains) {
            return false;
        }
        if !contains_ci(&record.contracting_body, &self.body_contains) {
            return false;
        }
        if let Some(min) = self.min_budget {
            if record.budget_amount < min {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        true
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn filter(records: &[TenderRecord], spec: &FilterSpec) -> Vec<TenderRecord> {
    records
        .iter()
        .filter(|r| spec.matches(r))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    Date,
    Title,
    ContractingBody,
    Budget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: Direction,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            column: SortColumn::Date,
            direction: Direction::Desc,
        }
    }
}

fn compare_column(a: &TenderRecord, b: &TenderRecord, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Date => a.date.cmp(&b.date),
        SortColumn::Title => a.title.cmp(&b.title),
        SortColumn::ContractingBody => a.contracting_body.cmp(&b.contracting_body),
        SortColumn::Budget => a.budget_amount.total_cmp(&b.budget_amount),
    }
}

/// Stable sort: ties keep their original order in either direction.
pub fn sort(records: &[TenderRecord], spec: SortSpec) -> Vec<TenderRecord> {
    let mut out = records.to_vec();
    out.sort_by(|a, b| {
        let ordering = compare_column(a, b, spec.column);
        match spec.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    });
    out
}

/// `ceil(len / page_size)`, never less than one page.
pub fn page_count(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size.max(1)).max(1)
}

/// Fixed-size slice of a sorted/filtered sequence; `page` is 1-based.
pub fn paginate(records: &[TenderRecord], page: usize, page_size: usize) -> &[TenderRecord] {
    let page_size = page_size.max(1);
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let end = start.saturating_add(page_size).min(records.len());
    if start >= records.len() {
        return &[];
    }
    &records[start..end]
}

#[derive(Debug, Clone)]
pub struct VisiblePage {
    pub records: Vec<TenderRecord>,
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
}

/// The one pure entry point composing filter, sort and pagination.
pub fn visible_page(
    records: &[TenderRecord],
    filter_spec: &FilterSpec,
    sort_spec: SortSpec,
    page: usize,
    page_size: usize,
) -> VisiblePage {
    let matched = filter(records, filter_spec);
    let ordered = sort(&matched, sort_spec);
    let total_pages = page_count(ordered.len(), page_size);
    let page = page.clamp(1, total_pages);
    VisiblePage {
        records: paginate(&ordered, page, page_size).to_vec(),
        page,
        total_pages,
        total_matches: ordered.len(),
    }
}

const XLSX_SHEET: &str = "Licitaciones";
const XLSX_HEADER: &[&str] = &[
    "id",
    "date",
    "title",
    "contracting_body",
    "budget_amount",
    "link",
    "cpv_code",
    "status",
    "is_it",
    "is_favorite",
];

fn build_workbook(records: &[TenderRecord]) -> Result<Workbook, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(XLSX_SHEET)?;

    for (col, header) in XLSX_HEADER.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    for (index, record) in records.iter().enumerate() {
        let row = index as u32 + 1;
        worksheet.write_string(row, 0, record.id.as_str())?;
        worksheet.write_string(row, 1, record.date.as_str())?;
        worksheet.write_string(row, 2, record.title.as_str())?;
        worksheet.write_string(row, 3, record.contracting_body.as_str())?;
        worksheet.write_number(row, 4, record.budget_amount)?;
        worksheet.write_string(row, 5, record.link.as_str())?;
        worksheet.write_string(row, 6, record.cpv_code.as_str())?;
        worksheet.write_string(row, 7, record.status.as_str())?;
        worksheet.write_boolean(row, 8, record.is_it)?;
        worksheet.write_boolean(row, 9, record.is_favorite)?;
    }
    Ok(workbook)
}

/// Render the given (already filtered) collection as an XLSX workbook,
/// one row per record, columns in field order.
pub fn export_xlsx(records: &[TenderRecord]) -> Result<Vec<u8>, ExportError> {
    Ok(build_workbook(records)?.save_to_buffer()?)
}

pub fn export_xlsx_file(records: &[TenderRecord], path: &Path) -> Result<(), ExportError> {
    build_workbook(records)?.save(path)?;
    Ok(())
}
