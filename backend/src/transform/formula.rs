//! Formula engine: per-row instantiation of formula templates.
//!
//! Formulas are emitted as text for the consuming document engine; nothing
//! here evaluates them. A formula map is applied all-or-nothing: every
//! cell is staged first and the sheet is only written once all of them
//! are known to be assignable.

use crate::error::FormulaAssignmentError;
use crate::models::{column_letters, CellValue};
use crate::sheet::Sheet;
use crate::transform::dsl::config::FormulaColumn;

/// First sheet row that carries data (row 1 is the header row).
pub const FIRST_DATA_ROW: usize = 2;

/// Result of applying one formula map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaResult {
    pub sheet: String,
    /// Sheet rows written, `FIRST_DATA_ROW..=last`
    pub rows: usize,
    pub columns: usize,
}

impl FormulaResult {
    /// Total formula cells written
    pub fn cells(&self) -> usize {
        self.rows * self.columns
    }

    pub fn summary(&self) -> String {
        format!(
            "Wrote {} formulas to '{}' ({} rows x {} columns)",
            self.cells(),
            self.sheet,
            self.rows,
            self.columns
        )
    }
}

/// Assign every formula of `map` for sheet rows 2 through the last row with
/// a value in column A.
///
/// Target columns past the table edge widen the table with unnamed
/// columns. A target that cannot be resolved, or a cell covered by a
/// placed pivot, fails the whole map and leaves the sheet untouched.
pub fn apply_formulas(
    sheet: &mut Sheet,
    map: &[FormulaColumn],
) -> Result<FormulaResult, FormulaAssignmentError> {
    let last_row = sheet.table.last_populated_row(0);
    let rows = last_row.saturating_sub(FIRST_DATA_ROW - 1);

    let mut staged: Vec<(usize, usize, String)> = Vec::with_capacity(rows * map.len());
    for entry in map {
        let col = entry
            .column
            .resolve(&sheet.table, &sheet.name)
            .map_err(|e| FormulaAssignmentError {
                sheet: sheet.name.clone(),
                row: FIRST_DATA_ROW,
                column: entry.column.to_string(),
                formula: entry.template.to_string(),
                reason: e.to_string(),
            })?;

        for row in FIRST_DATA_ROW..=last_row {
            let formula = entry.template.instantiate(row);
            if let Some(placed) = sheet.pivots.iter().find(|p| p.covers(row - 1, col)) {
                return Err(FormulaAssignmentError {
                    sheet: sheet.name.clone(),
                    row,
                    column: column_letters(col),
                    formula,
                    reason: format!("cell lies inside the pivot at {}", placed.anchor.to_a1()),
                });
            }
            staged.push((row, col, formula));
        }
    }

    if let Some(widest) = staged.iter().map(|(_, col, _)| col + 1).max() {
        sheet.table.ensure_width(widest);
    }
    for (row, col, formula) in staged {
        let name = sheet.name.clone();
        sheet
            .table
            .set(row - FIRST_DATA_ROW, col, CellValue::Formula(formula.clone()))
            .map_err(|e| FormulaAssignmentError {
                sheet: name,
                row,
                column: column_letters(col),
                formula,
                reason: e.to_string(),
            })?;
    }

    Ok(FormulaResult {
        sheet: sheet.name.clone(),
        rows,
        columns: map.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellRef, ColumnRef, RunContext};
    use crate::sheet::Table;
    use crate::transform::dsl::config::FormulaTemplate;
    use crate::transform::pivot::{Aggregation, PivotSpec, PivotTable};
    use chrono::NaiveDate;

    fn formula(column: ColumnRef, template: &str) -> FormulaColumn {
        FormulaColumn {
            column,
            template: FormulaTemplate::new(template).unwrap(),
        }
    }

    fn summary_sheet() -> Sheet {
        let table = Table::from_rows(
            vec!["PartNum".into(), "On-hand Stock".into(), "SO".into()],
            vec![
                vec!["P-1".into(), CellValue::Number(4.0), CellValue::Empty],
                vec!["P-2".into(), CellValue::Number(1.0), CellValue::Empty],
                vec!["P-3".into(), CellValue::Empty, CellValue::Empty],
            ],
        )
        .unwrap();
        Sheet::new("Summary", table)
    }

    #[test]
    fn test_every_row_gets_its_own_row_number() {
        let mut sheet = summary_sheet();
        let map = vec![
            formula(ColumnRef::header("SO"), "=SUMIF(SO!$A:$A,$A{row},SO!$K:$K)"),
            formula(ColumnRef::Number(5), "=B{row}-C{row}+$B$1"),
        ];
        let result = apply_formulas(&mut sheet, &map).unwrap();

        assert_eq!(result.rows, 3);
        assert_eq!(result.cells(), 6);
        assert_eq!(sheet.table.width(), 5);
        for row in 0..3 {
            let r = row + 2;
            assert_eq!(
                sheet.table.get(row, 2),
                &CellValue::Formula(format!("=SUMIF(SO!$A:$A,$A{},SO!$K:$K)", r))
            );
            assert_eq!(
                sheet.table.get(row, 4),
                &CellValue::Formula(format!("=B{}-C{}+$B$1", r, r))
            );
        }
    }

    #[test]
    fn test_last_row_follows_column_a() {
        let mut sheet = summary_sheet();
        sheet.table.push_row(vec![CellValue::Empty, CellValue::Number(9.0)]);
        let result = apply_formulas(&mut sheet, &[formula(ColumnRef::letter("C"), "=B{row}")]).unwrap();
        assert_eq!(result.rows, 3);
        assert_eq!(sheet.table.get(3, 2), &CellValue::Empty);
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        let mut sheet = Sheet::new("Empty", Table::new(vec!["PartNum".into()]).unwrap());
        let result = apply_formulas(&mut sheet, &[formula(ColumnRef::Number(2), "=A{row}")]).unwrap();
        assert_eq!(result.cells(), 0);
        assert_eq!(sheet.table.width(), 1);
    }

    #[test]
    fn test_unknown_column_fails_whole_map() {
        let mut sheet = summary_sheet();
        let before = sheet.clone();
        let map = vec![
            formula(ColumnRef::letter("C"), "=B{row}"),
            formula(ColumnRef::header("Forecast"), "=A{row}"),
        ];
        let err = apply_formulas(&mut sheet, &map).unwrap_err();
        assert_eq!(err.row, 2);
        assert_eq!(err.column, "'Forecast'");
        assert_eq!(sheet, before);
    }

    #[test]
    fn test_cell_under_pivot_is_rejected() {
        let mut sheet = summary_sheet();
        let spec = PivotSpec::new("Summary", "Summary!$A:$B", "E3")
            .unwrap()
            .rows(&["PartNum"])
            .data("On-hand Stock", Aggregation::Sum);
        let ctx = RunContext::on(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        let pivot = PivotTable::build(&sheet.table, &spec, &ctx).unwrap().value;
        sheet.place_pivot(CellRef::from_a1("E3").unwrap(), pivot);
        let before = sheet.clone();

        let err = apply_formulas(&mut sheet, &[formula(ColumnRef::letter("E"), "=B{row}")]).unwrap_err();
        assert_eq!(err.row, 3);
        assert_eq!(err.column, "E");
        assert_eq!(err.formula, "=B3");
        assert_eq!(sheet, before);
    }
}
