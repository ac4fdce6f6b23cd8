//! A1-style addressing: column letters, cell references, source ranges and
//! column references used by the configuration.
//!
//! All indices are 0-based internally. Column "A" is 0, row 1 is 0.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AddressError, SheetError, SheetResult};
use crate::sheet::Table;

/// Converts column letters ("A", "AA", "$Q") to a 0-based column index.
pub fn column_index(letters: &str) -> Result<usize, AddressError> {
    let trimmed = letters.trim().trim_start_matches('$');
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AddressError::Column(letters.to_string()));
    }

    let mut result: usize = 0;
    for c in trimmed.chars() {
        let digit = (c.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
        result = result
            .checked_mul(26)
            .and_then(|r| r.checked_add(digit))
            .ok_or_else(|| AddressError::Column(letters.to_string()))?;
    }
    Ok(result - 1)
}

/// Converts a 0-based column index to column letters.
/// 0 -> "A", 25 -> "Z", 26 -> "AA".
pub fn column_letters(mut index: usize) -> String {
    let mut result = String::new();
    loop {
        let remainder = index % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    result
}

// =============================================================================
// Cell references
// =============================================================================

/// A single cell position (0-based row and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Parse "O1", "$X$1".
    pub fn from_a1(a1: &str) -> Result<Self, AddressError> {
        let s = a1.trim();
        let bytes = s.as_bytes();
        let mut idx = 0usize;
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }
        if idx == col_start {
            return Err(AddressError::Cell(a1.to_string()));
        }
        let col_str = &s[col_start..idx];

        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }
        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == row_start || idx != bytes.len() {
            return Err(AddressError::Cell(a1.to_string()));
        }

        let row: usize = s[row_start..idx]
            .parse()
            .map_err(|_| AddressError::Cell(a1.to_string()))?;
        if row == 0 {
            return Err(AddressError::Cell(a1.to_string()));
        }

        Ok(Self {
            row: row - 1,
            col: column_index(col_str).map_err(|_| AddressError::Cell(a1.to_string()))?,
        })
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", column_letters(self.col), self.row + 1)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

impl TryFrom<String> for CellRef {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CellRef::from_a1(&value)
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_a1()
    }
}

// =============================================================================
// Source ranges
// =============================================================================

/// An inclusive span of whole columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub first: usize,
    pub last: usize,
}

impl ColumnSpan {
    /// A parsed span covers at least one column.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn contains(&self, col: usize) -> bool {
        (self.first..=self.last).contains(&col)
    }
}

/// A whole-column range on a named sheet, e.g. `'Inventory by WH'!$B:$H`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceRange {
    pub sheet: String,
    pub columns: ColumnSpan,
}

impl SourceRange {
    pub fn parse(expr: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::Range(expr.to_string());

        let (sheet_part, cols_part) = expr.trim().rsplit_once('!').ok_or_else(invalid)?;
        let sheet = match sheet_part.strip_prefix('\'') {
            Some(rest) => rest.strip_suffix('\'').ok_or_else(invalid)?.replace("''", "'"),
            None => sheet_part.to_string(),
        };
        if sheet.is_empty() {
            return Err(invalid());
        }

        let (first, last) = cols_part.split_once(':').ok_or_else(invalid)?;
        let first = column_index(first).map_err(|_| invalid())?;
        let last = column_index(last).map_err(|_| invalid())?;
        if last < first {
            return Err(invalid());
        }

        Ok(Self {
            sheet,
            columns: ColumnSpan { first, last },
        })
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let needs_quotes = self
            .sheet
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != '_');
        if needs_quotes {
            write!(f, "'{}'", self.sheet.replace('\'', "''"))?;
        } else {
            f.write_str(&self.sheet)?;
        }
        write!(
            f,
            "!${}:${}",
            column_letters(self.columns.first),
            column_letters(self.columns.last)
        )
    }
}

impl TryFrom<String> for SourceRange {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SourceRange::parse(&value)
    }
}

impl From<SourceRange> for String {
    fn from(value: SourceRange) -> Self {
        value.to_string()
    }
}

// =============================================================================
// Column references
// =============================================================================

/// How the configuration names a column.
///
/// `{"letter": "Q"}`, `{"number": 17}` (1-based) or `{"header": "Due Date"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "RawColumnRef")]
pub enum ColumnRef {
    Letter(String),
    Number(usize),
    Header(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawColumnRef {
    Letter(String),
    Number(usize),
    Header(String),
}

impl TryFrom<RawColumnRef> for ColumnRef {
    type Error = AddressError;

    fn try_from(raw: RawColumnRef) -> Result<Self, Self::Error> {
        match raw {
            RawColumnRef::Letter(l) => {
                column_index(&l)?;
                Ok(ColumnRef::Letter(l.trim_start_matches('$').to_ascii_uppercase()))
            }
            RawColumnRef::Number(0) => Err(AddressError::ZeroColumn),
            RawColumnRef::Number(n) => Ok(ColumnRef::Number(n)),
            RawColumnRef::Header(h) => Ok(ColumnRef::Header(h)),
        }
    }
}

impl ColumnRef {
    pub fn letter(letters: &str) -> Self {
        ColumnRef::Letter(letters.to_string())
    }

    pub fn header(name: &str) -> Self {
        ColumnRef::Header(name.to_string())
    }

    /// Resolve to a 0-based column index of `table`.
    ///
    /// Letters and numbers resolve positionally without a bounds check;
    /// headers must exist.
    pub fn resolve(&self, table: &Table, sheet: &str) -> SheetResult<usize> {
        match self {
            ColumnRef::Letter(l) => Ok(column_index(l)?),
            ColumnRef::Number(0) => Err(AddressError::ZeroColumn.into()),
            ColumnRef::Number(n) => Ok(n - 1),
            ColumnRef::Header(h) => table.column_of(h).ok_or_else(|| SheetError::ColumnNotFound {
                sheet: sheet.to_string(),
                column: h.clone(),
            }),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Letter(l) => f.write_str(l),
            ColumnRef::Number(n) => write!(f, "#{}", n),
            ColumnRef::Header(h) => write!(f, "'{}'", h),
        }
    }
}
