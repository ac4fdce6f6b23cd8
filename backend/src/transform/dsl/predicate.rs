//! Row predicates for sheet derivation and flag columns.
//!
//! A [`Predicate`] names a column and a [`Condition`]. Conditions are typed:
//! text conditions only match text cells, `year_equals` only matches dates.
//! A cell of the wrong type fails the condition; it never raises.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::models::{CellValue, RunContext};

/// A condition on a column, identified by header name.
///
/// JSON form: `{"column": "Source", "op": "contains", "value": "MRP"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    #[serde(flatten)]
    pub condition: Condition,
}

impl Predicate {
    pub fn new(column: impl Into<String>, condition: Condition) -> Self {
        Self {
            column: column.into(),
            condition,
        }
    }
}

/// All available row conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Text contains `value` (case-insensitive unless told otherwise)
    Contains {
        value: String,
        #[serde(default = "default_true")]
        ignore_case: bool,
    },

    /// Text does not contain `value`. Non-text cells pass.
    NotContains {
        value: String,
        #[serde(default = "default_true")]
        ignore_case: bool,
    },

    /// Text starts with `value` (case-sensitive unless told otherwise)
    StartsWith {
        value: String,
        #[serde(default)]
        ignore_case: bool,
    },

    /// Text equals `value` exactly
    Equals { value: String },

    /// Text is one of `values`
    OneOf { values: Vec<String> },

    /// Cell holds anything other than blank or whitespace
    NotBlank,

    /// Cell is blank or whitespace
    Blank,

    /// Date cell falls in `year`; the run's current year when omitted
    YearEquals {
        #[serde(default)]
        year: Option<i32>,
    },
}

fn default_true() -> bool {
    true
}

impl Condition {
    pub fn contains(value: &str) -> Self {
        Condition::Contains {
            value: value.to_string(),
            ignore_case: true,
        }
    }

    pub fn not_contains(value: &str) -> Self {
        Condition::NotContains {
            value: value.to_string(),
            ignore_case: true,
        }
    }

    pub fn starts_with(value: &str) -> Self {
        Condition::StartsWith {
            value: value.to_string(),
            ignore_case: false,
        }
    }

    pub fn equals(value: &str) -> Self {
        Condition::Equals {
            value: value.to_string(),
        }
    }

    /// Evaluate against one cell
    pub fn matches(&self, cell: &CellValue, ctx: &RunContext) -> bool {
        match self {
            Condition::Contains { value, ignore_case } => {
                Self::text(cell).is_some_and(|s| Self::match_contains(s, value, *ignore_case))
            }
            Condition::NotContains { value, ignore_case } => {
                !Self::text(cell).is_some_and(|s| Self::match_contains(s, value, *ignore_case))
            }
            Condition::StartsWith { value, ignore_case } => {
                Self::text(cell).is_some_and(|s| Self::match_starts_with(s, value, *ignore_case))
            }
            Condition::Equals { value } => Self::text(cell).is_some_and(|s| s == value),
            Condition::OneOf { values } => Self::text(cell).is_some_and(|s| values.iter().any(|v| v == s)),
            Condition::NotBlank => !cell.is_blank(),
            Condition::Blank => cell.is_blank(),
            Condition::YearEquals { year } => {
                let wanted = year.unwrap_or_else(|| ctx.current_year());
                cell.as_date().is_some_and(|d| d.year() == wanted)
            }
        }
    }

    fn text(cell: &CellValue) -> Option<&str> {
        cell.as_text()
    }

    fn match_contains(haystack: &str, needle: &str, ignore_case: bool) -> bool {
        if ignore_case {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        } else {
            haystack.contains(needle)
        }
    }

    fn match_starts_with(haystack: &str, prefix: &str, ignore_case: bool) -> bool {
        if ignore_case {
            haystack.to_lowercase().starts_with(&prefix.to_lowercase())
        } else {
            haystack.starts_with(prefix)
        }
    }
}
