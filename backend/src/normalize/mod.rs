//! Typing of raw extract fields.
//!
//! Two passes:
//! - [`normalize`] turns a raw [`Extract`] into a typed [`Table`] right after
//!   ingestion (dates parsed, designated columns forced to text).
//! - [`reconcile_numeric`] runs later on derived sheets and converts
//!   numeric-looking text to numbers.
//!
//! Both report per-cell failures as [`Diagnostic::Coercion`] and never fail
//! on cell content.

use chrono::NaiveDate;

use crate::error::{SchemaError, SchemaResult};
use crate::models::{CellValue, CoercionTarget, CoercionWarning, Diagnostic, Outcome};
use crate::parser::Extract;
use crate::sheet::Table;
use crate::transform::dsl::config::IngestConfig;

/// Build the typed base table from a raw extract.
///
/// Fails with [`SchemaError::MissingField`] when a required field, a date
/// field or a forced-text column is absent.
/// Unparseable dates become blank and are reported.
pub fn normalize(
    extract: &Extract,
    config: &IngestConfig,
    sheet: &str,
) -> SchemaResult<Outcome<Table>> {
    for field in &config.required_fields {
        if extract.column_of(field).is_none() {
            return Err(SchemaError::MissingField(field.clone()));
        }
    }

    let headers = Table::new(extract.headers.clone()).map_err(|e| SchemaError::Format {
        line: 1,
        message: e.to_string(),
    })?;

    let text_columns = config
        .text_columns
        .iter()
        .map(|c| {
            c.resolve(&headers, sheet)
                .map_err(|_| SchemaError::MissingField(c.to_string()))
        })
        .collect::<SchemaResult<Vec<usize>>>()?;
    let date_columns = config
        .date_fields
        .iter()
        .map(|f| {
            extract
                .column_of(f)
                .ok_or_else(|| SchemaError::MissingField(f.clone()))
        })
        .collect::<SchemaResult<Vec<usize>>>()?;

    let mut diagnostics = Vec::new();
    let mut table = headers;

    for (row_idx, raw) in extract.rows.iter().enumerate() {
        let mut row = Vec::with_capacity(raw.len());
        for (col, value) in raw.iter().enumerate() {
            let cell = if date_columns.contains(&col) {
                match parse_date(value, &config.date_format) {
                    Some(date) => CellValue::Date(date),
                    None => {
                        if !is_empty_sentinel(value) {
                            diagnostics.push(Diagnostic::Coercion(CoercionWarning {
                                sheet: sheet.to_string(),
                                row: row_idx + 2,
                                column: extract.headers[col].clone(),
                                value: value.clone(),
                                target: CoercionTarget::Date,
                            }));
                        }
                        CellValue::Empty
                    }
                }
            } else if text_columns.contains(&col) || !is_na_marker(value) {
                CellValue::text(value.as_str())
            } else {
                CellValue::Empty
            };
            row.push(cell);
        }
        table.push_row(row);
    }

    Ok(Outcome::with_diagnostics(table, diagnostics))
}

/// Markers an extract uses for "no value". Designated text columns keep
/// them verbatim since identifiers like `NA` are legitimate there.
const NA_MARKERS: &[&str] = &[
    "#N/A", "N/A", "NA", "NULL", "null", "NaN", "nan", "-NaN", "-nan", "n/a", "None", "<NA>",
];

pub fn is_na_marker(value: &str) -> bool {
    NA_MARKERS.contains(&value.trim())
}

/// Parse a day-first date with the configured format.
pub fn parse_date(value: &str, format: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, format).ok()
}

/// Blank, whitespace, or one of the textual null markers an extract may carry.
pub fn is_empty_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == "NaT" || is_na_marker(trimmed)
}

/// Parse a numeric-looking string, ignoring thousands separators.
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Convert numeric-looking text cells to numbers.
///
/// Columns named in `exclude` are skipped; when `only` is non-empty just
/// those columns are touched. Whitespace-only cells become blank. Cells
/// that fail to parse stay text and are reported.
pub fn reconcile_numeric(
    table: &mut Table,
    sheet: &str,
    only: &[String],
    exclude: &[String],
) -> Vec<Diagnostic> {
    let columns: Vec<(usize, String)> = table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| !exclude.contains(h))
        .filter(|(_, h)| only.is_empty() || only.contains(h))
        .map(|(i, h)| (i, h.clone()))
        .collect();

    let mut diagnostics = Vec::new();
    for (col, header) in columns {
        for row in 0..table.height() {
            let Some(cell) = table.cell_mut(row, col) else {
                continue;
            };
            let CellValue::Text(text) = cell else {
                continue;
            };
            if text.trim().is_empty() {
                *cell = CellValue::Empty;
                continue;
            }
            match parse_number(text) {
                Some(n) => *cell = CellValue::Number(n),
                None => diagnostics.push(Diagnostic::Coercion(CoercionWarning {
                    sheet: sheet.to_string(),
                    row: row + 2,
                    column: header.clone(),
                    value: text.clone(),
                    target: CoercionTarget::Number,
                })),
            }
        }
    }
    diagnostics
}
