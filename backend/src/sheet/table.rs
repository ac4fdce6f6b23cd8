//! A rectangular grid of typed cells under a header row.
//!
//! Every row is kept at the table width. The header index and the header
//! extent (one past the last non-blank header) are maintained on every
//! structural change so lookups and insertion points are O(1).

use std::collections::{HashMap, HashSet};

use crate::error::{SheetError, SheetResult};
use crate::models::CellValue;

static EMPTY: CellValue = CellValue::Empty;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    index: HashMap<String, usize>,
    header_extent: usize,
}

impl Table {
    /// An empty table with the given header row. Blank headers are allowed
    /// (unnamed columns); named headers must be unique.
    pub fn new(headers: Vec<String>) -> SheetResult<Self> {
        check_unique(&headers)?;
        let mut table = Self {
            headers,
            ..Self::default()
        };
        table.reindex();
        Ok(table)
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> SheetResult<Self> {
        let mut table = Self::new(headers)?;
        for row in rows {
            table.push_row(row);
        }
        Ok(table)
    }

    /// Rebuild the header index and extent. Callers check uniqueness first.
    fn reindex(&mut self) {
        self.index = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (h.clone(), i))
            .collect();
        self.header_extent = self
            .headers
            .iter()
            .rposition(|h| !h.trim().is_empty())
            .map_or(0, |i| i + 1);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Number of data rows (the header is not counted).
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// One past the last non-blank header cell.
    pub fn header_extent(&self) -> usize {
        self.header_extent
    }

    pub fn column_of(&self, header: &str) -> Option<usize> {
        self.index.get(header).copied()
    }

    pub fn require_column(&self, header: &str) -> SheetResult<usize> {
        self.column_of(header).ok_or_else(|| SheetError::ColumnNotFound {
            sheet: String::new(),
            column: header.to_string(),
        })
    }

    /// Cell at a data row (0-based). Out-of-range cells read as blank.
    pub fn get(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut CellValue> {
        self.rows.get_mut(row).and_then(|r| r.get_mut(col))
    }

    /// Write a data cell, widening the table when `col` is past the edge.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) -> SheetResult<()> {
        if row >= self.rows.len() {
            return Err(SheetError::OutOfBounds {
                sheet: String::new(),
                row: row + 2,
                col: col + 1,
            });
        }
        self.ensure_width(col + 1);
        self.rows[row][col] = value;
        Ok(())
    }

    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        if row.len() > self.width() {
            let extra = row.len() - self.width();
            self.headers.extend(std::iter::repeat(String::new()).take(extra));
            for existing in &mut self.rows {
                existing.resize(self.headers.len(), CellValue::Empty);
            }
        }
        row.resize(self.width(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |r| r.get(col).unwrap_or(&EMPTY))
    }

    /// Sheet row number (header = 1) of the last non-blank cell in `col`,
    /// scanning upward from the bottom. Returns 1 when the column has no data.
    pub fn last_populated_row(&self, col: usize) -> usize {
        self.rows
            .iter()
            .rposition(|r| r.get(col).is_some_and(|c| !c.is_blank()))
            .map_or(1, |i| i + 2)
    }

    /// Pad every row and the header row with blanks up to `width`.
    pub fn ensure_width(&mut self, width: usize) {
        if width <= self.width() {
            return;
        }
        self.headers.resize(width, String::new());
        for row in &mut self.rows {
            row.resize(width, CellValue::Empty);
        }
    }

    /// Insert blank columns with `headers` at position `at`, shifting the
    /// columns at and after `at` to the right.
    pub fn insert_columns(&mut self, at: usize, headers: &[String]) -> SheetResult<()> {
        for header in headers.iter().filter(|h| !h.is_empty()) {
            if self.index.contains_key(header) || headers.iter().filter(|h2| *h2 == header).count() > 1 {
                return Err(SheetError::DuplicateHeader {
                    sheet: String::new(),
                    header: header.clone(),
                });
            }
        }
        self.ensure_width(at);
        let tail = self.headers.split_off(at);
        self.headers.extend(headers.iter().cloned());
        self.headers.extend(tail);
        for row in &mut self.rows {
            let tail = row.split_off(at);
            row.extend(std::iter::repeat(CellValue::Empty).take(headers.len()));
            row.extend(tail);
        }
        self.reindex();
        Ok(())
    }

    /// Remove one column. Columns past the edge are ignored.
    pub fn delete_column(&mut self, col: usize) {
        if col >= self.width() {
            return;
        }
        self.headers.remove(col);
        for row in &mut self.rows {
            row.remove(col);
        }
        self.reindex();
    }

    pub fn set_header(&mut self, col: usize, header: impl Into<String>) -> SheetResult<()> {
        let header = header.into();
        if !header.is_empty() {
            if let Some(existing) = self.column_of(&header) {
                if existing != col {
                    return Err(SheetError::DuplicateHeader {
                        sheet: String::new(),
                        header,
                    });
                }
            }
        }
        self.ensure_width(col + 1);
        self.headers[col] = header;
        self.reindex();
        Ok(())
    }

    /// Replace the whole header row. Must match the table width.
    pub fn relabel(&mut self, headers: Vec<String>) -> SheetResult<()> {
        let mut headers = headers;
        headers.resize(self.width(), String::new());
        check_unique(&headers)?;
        self.headers = headers;
        self.reindex();
        Ok(())
    }

    /// A new table with the same header row and only the rows accepted by
    /// `keep`, in their original order.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[CellValue]) -> bool,
    {
        Table {
            headers: self.headers.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
            index: self.index.clone(),
            header_extent: self.header_extent,
        }
    }

    /// A new table made of the given columns, in the given order.
    pub fn select_columns(&self, columns: &[usize]) -> SheetResult<Table> {
        let headers = columns
            .iter()
            .map(|&c| self.headers.get(c).cloned().unwrap_or_default())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|r| columns.iter().map(|&c| r.get(c).cloned().unwrap_or_default()).collect())
            .collect();
        Table::from_rows(headers, rows)
    }
}

/// Named headers must be unique; blank ones may repeat.
fn check_unique(headers: &[String]) -> SheetResult<()> {
    let mut seen = HashSet::with_capacity(headers.len());
    for header in headers.iter().filter(|h| !h.is_empty()) {
        if !seen.insert(header.as_str()) {
            return Err(SheetError::DuplicateHeader {
                sheet: String::new(),
                header: header.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            vec!["PartNum".into(), "Source".into(), "Receipts".into()],
            vec![
                vec!["P-1".into(), "Job: MRP".into(), "10".into()],
                vec!["P-2".into(), "PO: 123".into(), CellValue::Empty],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_headers_rejected() {
        let err = Table::new(vec!["A".into(), "A".into()]).unwrap_err();
        assert!(matches!(err, SheetError::DuplicateHeader { header, .. } if header == "A"));
        // Blank headers may repeat
        assert!(Table::new(vec!["".into(), "".into(), "A".into()]).is_ok());
    }

    #[test]
    fn test_header_extent_ignores_trailing_blanks() {
        let table = Table::new(vec!["A".into(), "B".into(), "".into(), "".into()]).unwrap();
        assert_eq!(table.width(), 4);
        assert_eq!(table.header_extent(), 2);
    }

    #[test]
    fn test_insert_columns_shifts_right_only() {
        let mut table = sample();
        table.insert_columns(1, &["MRP".into(), "MO".into()]).unwrap();
        assert_eq!(table.headers(), &["PartNum", "MRP", "MO", "Source", "Receipts"]);
        assert_eq!(table.get(0, 0), &CellValue::Text("P-1".into()));
        assert_eq!(table.get(0, 3), &CellValue::Text("Job: MRP".into()));
        assert_eq!(table.column_of("Receipts"), Some(4));
    }

    #[test]
    fn test_insert_rejects_existing_header() {
        let mut table = sample();
        assert!(table.insert_columns(3, &["Source".into()]).is_err());
        assert_eq!(table.width(), 3);
    }

    #[test]
    fn test_delete_column_reindexes() {
        let mut table = sample();
        table.delete_column(0);
        assert_eq!(table.column_of("Source"), Some(0));
        assert_eq!(table.column_of("PartNum"), None);
        table.delete_column(99);
        assert_eq!(table.width(), 2);
    }

    #[test]
    fn test_last_populated_row() {
        let table = sample();
        assert_eq!(table.last_populated_row(0), 3);
        assert_eq!(table.last_populated_row(2), 2);
        assert_eq!(Table::new(vec!["A".into()]).unwrap().last_populated_row(0), 1);
    }

    #[test]
    fn test_set_widens_and_rejects_missing_rows() {
        let mut table = sample();
        table.set(1, 5, CellValue::Number(1.0)).unwrap();
        assert_eq!(table.width(), 6);
        assert_eq!(table.header_extent(), 3);
        assert!(matches!(
            table.set(2, 0, CellValue::Empty),
            Err(SheetError::OutOfBounds { row: 4, .. })
        ));
    }

    #[test]
    fn test_set_header_rejects_duplicate_and_reindexes() {
        let mut table = sample();
        assert!(table.set_header(2, "Source").is_err());
        assert_eq!(table.headers(), &["PartNum", "Source", "Receipts"]);

        table.set_header(2, "Qty").unwrap();
        assert_eq!(table.column_of("Qty"), Some(2));
        assert_eq!(table.column_of("Receipts"), None);
        table.set_header(4, "Late").unwrap();
        assert_eq!(table.header_extent(), 5);
    }

    #[test]
    fn test_relabel_leaves_table_untouched_on_duplicate() {
        let mut table = sample();
        assert!(table.relabel(vec!["X".into(), "X".into(), "Y".into()]).is_err());
        assert_eq!(table.headers(), &["PartNum", "Source", "Receipts"]);
        assert_eq!(table.column_of("PartNum"), Some(0));
        table.relabel(vec!["Part".into(), "Src".into()]).unwrap();
        assert_eq!(table.headers(), &["Part", "Src", ""]);
    }

    #[test]
    fn test_filter_rows_preserves_order() {
        let table = sample();
        let kept = table.filter_rows(|r| !r[0].is_blank());
        assert_eq!(kept.height(), 2);
        assert_eq!(kept.get(1, 0), &CellValue::Text("P-2".into()));
    }

    #[test]
    fn test_select_columns() {
        let table = sample();
        let picked = table.select_columns(&[2, 0]).unwrap();
        assert_eq!(picked.headers(), &["Receipts", "PartNum"]);
        assert_eq!(picked.get(0, 1), &CellValue::Text("P-1".into()));
    }
}
