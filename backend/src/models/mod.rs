//! Domain models shared by every stage of the report pipeline.
//!
//! - [`CellValue`] - a typed cell (number, date, text, formula text or blank)
//! - [`RunContext`] - the run's wall-clock date, injected for determinism
//! - [`Diagnostic`] - non-fatal problems recovered locally by a stage
//! - [`Outcome`] - a stage result paired with its diagnostics
//! - [`address`] - A1 column letters, cell references and source ranges

pub mod address;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transform::pivot::Aggregation;

pub use address::{column_index, column_letters, CellRef, ColumnRef, ColumnSpan, SourceRange};

/// Display format for dates (day first, as in the extract).
pub const DATE_DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Format used for month names in helper columns and temporal expansion.
pub const MONTH_NAME_FORMAT: &str = "%b";

// =============================================================================
// Cell Values
// =============================================================================

/// The value held by one cell of a sheet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Date(NaiveDate),
    Text(String),
    /// Formula text, emitted for the consuming document engine. Never evaluated here.
    Formula(String),
}

impl CellValue {
    /// Build a text cell, mapping an empty string to [`CellValue::Empty`].
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_formula(&self) -> Option<&str> {
        match self {
            CellValue::Formula(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Date(d) => write!(f, "{}", d.format(DATE_DISPLAY_FORMAT)),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Formula(s) => f.write_str(s),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

// =============================================================================
// Run Context
// =============================================================================

/// Per-run context. "Current" year and month are evaluated from `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub today: NaiveDate,
}

impl RunContext {
    /// Context for a run happening now (local wall clock).
    pub fn now() -> Self {
        Self {
            today: Local::now().date_naive(),
        }
    }

    /// Context pinned to a fixed date.
    pub fn on(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn current_year(&self) -> i32 {
        self.today.year()
    }

    /// Current month name, in the same format as the Month helper column.
    pub fn current_month_name(&self) -> String {
        self.today.format(MONTH_NAME_FORMAT).to_string()
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Type a cell failed to coerce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionTarget {
    Date,
    Number,
}

/// A single cell failed type coercion. The value was nulled (dates) or
/// left as text (numbers).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoercionWarning {
    pub sheet: String,
    /// Sheet row (header is row 1).
    pub row: usize,
    pub column: String,
    pub value: String,
    pub target: CoercionTarget,
}

/// A requested aggregation could not apply to a field; `applied` was used instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationFieldError {
    pub pivot: String,
    pub field: String,
    pub requested: Aggregation,
    pub applied: Aggregation,
    pub reason: String,
}

/// A lookup key had no entry in its reference table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupMiss {
    pub sheet: String,
    pub row: usize,
    pub table: String,
    pub key: String,
}

/// A non-fatal problem recovered locally by a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    Coercion(CoercionWarning),
    AggregationFallback(AggregationFieldError),
    LookupMiss(LookupMiss),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Coercion(w) => write!(
                f,
                "{}!{} row {}: '{}' is not a valid {}",
                w.sheet,
                w.column,
                w.row,
                w.value,
                match w.target {
                    CoercionTarget::Date => "date",
                    CoercionTarget::Number => "number",
                }
            ),
            Diagnostic::AggregationFallback(e) => write!(
                f,
                "pivot '{}': {:?} of '{}' replaced by {:?} ({})",
                e.pivot, e.requested, e.field, e.applied, e.reason
            ),
            Diagnostic::LookupMiss(m) => write!(
                f,
                "{} row {}: key '{}' not found in lookup '{}'",
                m.sheet, m.row, m.key, m.table
            ),
        }
    }
}

/// A stage result together with the diagnostics it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }

    /// Move the diagnostics into `sink` and return the value.
    pub fn drain_into(self, sink: &mut Vec<Diagnostic>) -> T {
        sink.extend(self.diagnostics);
        self.value
    }
}
