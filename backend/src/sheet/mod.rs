//! Sheet store: ordered, named sheets of typed cells.
//!
//! A [`Sheet`] is a [`Table`] (header row plus data rows) with optional
//! pivots attached at anchor cells and free-standing note cells
//! (annotations, legends). Column insertion and deletion keep the anchors
//! of pivots and notes in step with the table.

mod store;
mod table;

pub use store::SheetStore;
pub use table::Table;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{SheetError, SheetResult};
use crate::models::{column_letters, CellRef, CellValue};
use crate::transform::pivot::PivotTable;

/// A pivot attached to a sheet at `anchor` (its top-left cell).
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPivot {
    pub anchor: CellRef,
    pub pivot: PivotTable,
}

impl PlacedPivot {
    pub fn width(&self) -> usize {
        self.pivot.grid().iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.pivot.grid().len()
    }

    fn covers_col(&self, col: usize) -> bool {
        col >= self.anchor.col && col < self.anchor.col + self.width().max(1)
    }

    /// True when the 0-based sheet cell lies inside the rendered grid.
    pub fn covers(&self, row: usize, col: usize) -> bool {
        row >= self.anchor.row && row < self.anchor.row + self.height() && self.covers_col(col)
    }

    fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        let r = row.checked_sub(self.anchor.row)?;
        let c = col.checked_sub(self.anchor.col)?;
        self.pivot.grid().get(r).and_then(|line| line.get(c))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
    pub hidden: bool,
    pub pivots: Vec<PlacedPivot>,
    /// Cells written outside the table, keyed by 0-based (row, col) where
    /// row 0 is the header row.
    pub notes: BTreeMap<(usize, usize), CellValue>,
}

/// Full rendering of one sheet, used for output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSnapshot {
    pub name: String,
    pub hidden: bool,
    pub cells: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
            hidden: false,
            pivots: Vec::new(),
            notes: BTreeMap::new(),
        }
    }

    /// Value shown at a 0-based sheet position: notes first, then pivots,
    /// then the table (row 0 is the header row).
    pub fn value_at(&self, row: usize, col: usize) -> CellValue {
        if let Some(note) = self.notes.get(&(row, col)) {
            return note.clone();
        }
        if let Some(cell) = self.pivots.iter().find_map(|p| p.cell(row, col)) {
            return cell.clone();
        }
        if row == 0 {
            return self
                .table
                .headers()
                .get(col)
                .map(|h| CellValue::text(h.as_str()))
                .unwrap_or_default();
        }
        self.table.get(row - 1, col).clone()
    }

    /// (rows, cols) spanned by table, pivots and notes.
    pub fn used_extent(&self) -> (usize, usize) {
        let mut rows = if self.table.width() > 0 { self.table.height() + 1 } else { 0 };
        let mut cols = self.table.width();
        for placed in &self.pivots {
            rows = rows.max(placed.anchor.row + placed.height());
            cols = cols.max(placed.anchor.col + placed.width());
        }
        for &(r, c) in self.notes.keys() {
            rows = rows.max(r + 1);
            cols = cols.max(c + 1);
        }
        (rows, cols)
    }

    pub fn write_note(&mut self, at: CellRef, value: CellValue) {
        self.notes.insert((at.row, at.col), value);
    }

    /// Attach a pivot. A pivot already anchored at the same cell is replaced.
    pub fn place_pivot(&mut self, anchor: CellRef, pivot: PivotTable) {
        self.pivots.retain(|p| p.anchor != anchor);
        self.pivots.push(PlacedPivot { anchor, pivot });
    }

    pub fn pivot(&self) -> SheetResult<&PlacedPivot> {
        self.pivots
            .first()
            .ok_or_else(|| SheetError::PivotNotFound(self.name.clone()))
    }

    pub fn pivot_mut(&mut self) -> SheetResult<&mut PlacedPivot> {
        let name = self.name.clone();
        self.pivots
            .first_mut()
            .ok_or(SheetError::PivotNotFound(name))
    }

    /// Insert named columns at `at`, shifting pivots and notes to the right.
    pub fn insert_columns(&mut self, at: usize, headers: &[String]) -> SheetResult<()> {
        if let Some(placed) = self
            .pivots
            .iter()
            .find(|p| at > p.anchor.col && p.covers_col(at))
        {
            return Err(SheetError::PivotOverlap {
                sheet: self.name.clone(),
                column: column_letters(at),
                anchor: placed.anchor.to_a1(),
            });
        }
        self.table
            .insert_columns(at, headers)
            .map_err(|e| e.in_sheet(&self.name))?;

        let n = headers.len();
        for placed in &mut self.pivots {
            if placed.anchor.col >= at {
                placed.anchor.col += n;
            }
        }
        self.notes = std::mem::take(&mut self.notes)
            .into_iter()
            .map(|((r, c), v)| if c >= at { ((r, c + n), v) } else { ((r, c), v) })
            .collect();
        Ok(())
    }

    /// Delete columns (0-based), right to left. Fails without touching the
    /// sheet when any column cuts through a placed pivot.
    pub fn delete_columns(&mut self, columns: &[usize]) -> SheetResult<()> {
        let mut columns: Vec<usize> = columns.to_vec();
        columns.sort_unstable();
        columns.dedup();

        for &col in &columns {
            if let Some(placed) = self.pivots.iter().find(|p| p.covers_col(col)) {
                return Err(SheetError::PivotOverlap {
                    sheet: self.name.clone(),
                    column: column_letters(col),
                    anchor: placed.anchor.to_a1(),
                });
            }
        }

        for &col in columns.iter().rev() {
            self.table.delete_column(col);
            for placed in &mut self.pivots {
                if placed.anchor.col > col {
                    placed.anchor.col -= 1;
                }
            }
            self.notes = std::mem::take(&mut self.notes)
                .into_iter()
                .filter(|((_, c), _)| *c != col)
                .map(|((r, c), v)| if c > col { ((r, c - 1), v) } else { ((r, c), v) })
                .collect();
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SheetSnapshot {
        let (rows, cols) = self.used_extent();
        let cells = (0..rows)
            .map(|r| (0..cols).map(|c| self.value_at(r, c)).collect())
            .collect();
        SheetSnapshot {
            name: self.name.clone(),
            hidden: self.hidden,
            cells,
        }
    }
}
