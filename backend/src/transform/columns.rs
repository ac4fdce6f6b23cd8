//! Column engine: structural column edits and per-row column fills.
//!
//! Insertion points are computed from the table's maintained header extent
//! (one past the last non-blank header), so consecutive calls compose: each
//! call sees the columns added by the previous ones.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

use crate::error::SheetResult;
use crate::models::{
    CellRef, CellValue, ColumnRef, Diagnostic, LookupMiss, RunContext, MONTH_NAME_FORMAT,
};
use crate::normalize::is_empty_sentinel;
use crate::sheet::{Sheet, SheetStore, Table};
use crate::transform::dsl::config::{ColumnRename, FlagRule, WorkingSheet};

/// Resolve a list of column references on one sheet.
pub fn resolve_columns(table: &Table, sheet: &str, columns: &[ColumnRef]) -> SheetResult<Vec<usize>> {
    columns.iter().map(|c| c.resolve(table, sheet)).collect()
}

// ============================================================================
// Working sheet
// ============================================================================

/// Copy the raw sheet to the working sheet, hide the raw sheet, delete the
/// configured columns and relabel the survivors.
///
/// `labels` is a header row in the raw layout; a blank or missing label
/// keeps the raw header.
pub fn prepare_working_sheet(
    store: &mut SheetStore,
    raw_sheet: &str,
    working: &WorkingSheet,
    labels: Option<&[String]>,
) -> SheetResult<()> {
    store.copy_sheet(raw_sheet, &working.name)?;
    store.set_hidden(raw_sheet, true)?;

    let sheet = store.get_mut(&working.name)?;
    let mut deleted = resolve_columns(&sheet.table, &working.name, &working.delete_columns)?;
    deleted.retain(|&c| c < sheet.table.width());
    deleted.sort_unstable();
    deleted.dedup();

    let mut headers: Vec<String> = sheet
        .table
        .headers()
        .iter()
        .enumerate()
        .map(|(i, raw)| match labels.and_then(|l| l.get(i)) {
            Some(label) if !label.trim().is_empty() => label.trim().to_string(),
            _ => raw.clone(),
        })
        .collect();
    for &col in deleted.iter().rev() {
        headers.remove(col);
    }

    sheet.delete_columns(&deleted)?;
    let name = sheet.name.clone();
    sheet.table.relabel(headers).map_err(|e| e.in_sheet(&name))
}

// ============================================================================
// Adding columns
// ============================================================================

/// Insert headed columns into a sheet.
///
/// Columns go one past the last non-blank header, or right after `after`
/// when given. Each header listed in `reserve_after` is followed by one
/// blank, unnamed column. Returns the index of the first inserted column.
pub fn add_columns(
    sheet: &mut Sheet,
    headers: &[String],
    after: Option<usize>,
    reserve_after: &[String],
) -> SheetResult<usize> {
    let at = match after {
        Some(col) => col + 1,
        None => sheet.table.header_extent(),
    };

    let mut expanded = Vec::with_capacity(headers.len() + reserve_after.len());
    for header in headers {
        expanded.push(header.clone());
        if reserve_after.contains(header) {
            expanded.push(String::new());
        }
    }

    sheet.insert_columns(at, &expanded)?;
    Ok(at)
}

/// Append Year (number) and Month (abbreviated name) columns derived from
/// a date column. Non-date cells give blank helpers.
pub fn add_year_month(
    sheet: &mut Sheet,
    date_col: usize,
    year_header: &str,
    month_header: &str,
) -> SheetResult<usize> {
    let at = sheet.table.header_extent();
    sheet.insert_columns(at, &[year_header.to_string(), month_header.to_string()])?;

    let dates: Vec<Option<NaiveDate>> = sheet.table.column(date_col).map(CellValue::as_date).collect();
    for (row, date) in dates.into_iter().enumerate() {
        let (year, month) = match date {
            Some(d) => (
                CellValue::Number(f64::from(d.year())),
                CellValue::Text(d.format(MONTH_NAME_FORMAT).to_string()),
            ),
            None => (CellValue::Empty, CellValue::Empty),
        };
        sheet.table.set(row, at, year)?;
        sheet.table.set(row, at + 1, month)?;
    }
    Ok(at)
}

/// Create `to` from selected columns of `from`, placed before `before`
/// (appended when `None`), then apply header renames on the new sheet.
pub fn copy_columns(
    store: &mut SheetStore,
    from: &str,
    to: &str,
    columns: &[ColumnRef],
    before: Option<&str>,
    rename: &[ColumnRename],
) -> SheetResult<usize> {
    let source = &store.get(from)?.table;
    let indices = resolve_columns(source, from, columns)?;
    let mut table = source.select_columns(&indices).map_err(|e| e.in_sheet(to))?;

    for r in rename {
        let col = r.column.resolve(&table, to)?;
        table.set_header(col, r.header.as_str()).map_err(|e| e.in_sheet(to))?;
    }

    let width = table.width();
    let sheet = Sheet::new(to, table);
    match before {
        Some(anchor) => store.insert_before(sheet, anchor)?,
        None => store.insert(sheet)?,
    }
    Ok(width)
}

/// Append the visible column items of the pivot on `from_sheet` as headers
/// of `to_sheet`, followed by `trailing`.
pub fn append_pivot_labels(
    store: &mut SheetStore,
    from_sheet: &str,
    to_sheet: &str,
    trailing: &[String],
) -> SheetResult<Vec<String>> {
    let mut headers: Vec<String> = store
        .get(from_sheet)?
        .pivot()?
        .pivot
        .visible_column_items()
        .to_vec();
    headers.extend(trailing.iter().cloned());

    let sheet = store.get_mut(to_sheet)?;
    let at = sheet.table.header_extent();
    sheet.insert_columns(at, &headers)?;
    Ok(headers)
}

// ============================================================================
// Filling columns
// ============================================================================

/// Replace missing due dates with `sentinel`. Returns the number of cells
/// rewritten.
pub fn backfill_dates(table: &mut Table, col: usize, sentinel: NaiveDate) -> usize {
    let mut filled = 0;
    for row in 0..table.height() {
        let Some(cell) = table.cell_mut(row, col) else {
            continue;
        };
        let missing = match cell {
            CellValue::Empty => true,
            CellValue::Text(t) => is_empty_sentinel(t),
            _ => false,
        };
        if missing {
            *cell = CellValue::Date(sentinel);
            filled += 1;
        }
    }
    filled
}

/// Write each flag's label where all its conditions hold on the source
/// cell. Returns the count written per flag, in rule order.
pub fn fill_flags(
    table: &mut Table,
    sheet: &str,
    source_col: usize,
    flags: &[FlagRule],
    ctx: &RunContext,
) -> SheetResult<Vec<usize>> {
    let targets = flags
        .iter()
        .map(|f| table.require_column(&f.header).map_err(|e| e.in_sheet(sheet)))
        .collect::<SheetResult<Vec<usize>>>()?;

    let mut counts = vec![0; flags.len()];
    for row in 0..table.height() {
        let source = table.get(row, source_col).clone();
        for (i, (flag, &target)) in flags.iter().zip(&targets).enumerate() {
            if flag.all.iter().all(|c| c.matches(&source, ctx)) {
                table.set(row, target, CellValue::text(flag.label.as_str()))?;
                counts[i] += 1;
            }
        }
    }
    Ok(counts)
}

/// Fill `target` from `lookup`, keyed by the display text of `key`.
///
/// Rows up to the last populated key are filled. Misses get `missing` and
/// a [`Diagnostic::LookupMiss`]; blank keys get `missing` silently.
pub fn resolve_lookup(
    table: &mut Table,
    sheet: &str,
    key_col: usize,
    target_col: usize,
    table_name: &str,
    lookup: &HashMap<String, String>,
    missing: &str,
) -> SheetResult<Vec<Diagnostic>> {
    let last = table.last_populated_row(key_col).saturating_sub(1);
    let mut diagnostics = Vec::new();

    for row in 0..last {
        let key = table.get(row, key_col);
        let value = if key.is_blank() {
            CellValue::text(missing)
        } else {
            let key = key.to_string().trim().to_string();
            match lookup.get(&key) {
                Some(found) => CellValue::text(found.as_str()),
                None => {
                    diagnostics.push(Diagnostic::LookupMiss(LookupMiss {
                        sheet: sheet.to_string(),
                        row: row + 2,
                        table: table_name.to_string(),
                        key,
                    }));
                    CellValue::text(missing)
                }
            }
        };
        table.set(row, target_col, value).map_err(|e| e.in_sheet(sheet))?;
    }
    Ok(diagnostics)
}

/// Write the two-line legend two columns right of the used area starting
/// at `from_col`, on the third row. Returns the legend cell.
pub fn write_legend(sheet: &mut Sheet, from_col: usize) -> CellRef {
    let (rows, cols) = sheet.used_extent();
    let mut last_used = from_col;
    for row in 0..rows {
        for col in from_col..cols {
            if !sheet.value_at(row, col).is_blank() {
                last_used = last_used.max(col);
            }
        }
    }

    let at = CellRef::new(2, last_used + 2);
    sheet.write_note(at, CellValue::text("Legend"));
    sheet.write_note(CellRef::new(at.row + 1, at.col), CellValue::text("Overdue/Late"));
    at
}

/// Delete columns named by reference. Positions past the table edge are
/// ignored. Returns the number of columns removed.
pub fn delete_columns(sheet: &mut Sheet, columns: &[ColumnRef]) -> SheetResult<usize> {
    let width = sheet.table.width();
    let mut present: Vec<usize> = resolve_columns(&sheet.table, &sheet.name, columns)?
        .into_iter()
        .filter(|&c| c < width)
        .collect();
    present.sort_unstable();
    present.dedup();
    sheet.delete_columns(&present)?;
    Ok(present.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetError;
    use crate::transform::dsl::predicate::Condition;
    use crate::transform::pivot::{Aggregation, PivotSpec, PivotTable};

    fn ctx() -> RunContext {
        RunContext::on(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap())
    }

    fn t(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn date(y: i32, m: u32, d: u32) -> CellValue {
        CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn schedule() -> Sheet {
        let table = Table::from_rows(
            headers(&["PartNum", "Source", "Due Date"]),
            vec![
                vec![t("P-1"), t("Job: MRP 12"), date(2025, 6, 2)],
                vec![t("P-2"), t("Job: 77 expedite"), CellValue::Empty],
                vec![t("P-3"), t("Job: 78"), t("NaT")],
                vec![t("P-4"), t("Job: 79 Postpone"), t("   ")],
            ],
        )
        .unwrap();
        Sheet::new("Schedule", table)
    }

    #[test]
    fn test_add_columns_is_anchor_stable() {
        let mut sheet = schedule();
        let before = sheet.table.clone();

        let at = add_columns(&mut sheet, &headers(&["MRP", "MO"]), None, &[]).unwrap();
        assert_eq!(at, 3);
        let at = add_columns(&mut sheet, &headers(&["EXPEDITE"]), None, &[]).unwrap();
        assert_eq!(at, 5);

        assert_eq!(sheet.table.headers(), &["PartNum", "Source", "Due Date", "MRP", "MO", "EXPEDITE"]);
        for row in 0..before.height() {
            for col in 0..before.width() {
                assert_eq!(sheet.table.get(row, col), before.get(row, col));
            }
        }
    }

    #[test]
    fn test_add_columns_after_anchor_and_reserved_slot() {
        let mut sheet = schedule();
        add_columns(&mut sheet, &headers(&["Area"]), Some(0), &[]).unwrap();
        assert_eq!(sheet.table.headers(), &["PartNum", "Area", "Source", "Due Date"]);

        add_columns(
            &mut sheet,
            &headers(&["Suggestion", "Demand"]),
            None,
            &headers(&["Suggestion"]),
        )
        .unwrap();
        assert_eq!(sheet.table.headers()[4..], ["Suggestion", "", "Demand"]);
        assert_eq!(sheet.table.column_of("Demand"), Some(6));
    }

    #[test]
    fn test_backfill_dates() {
        let mut sheet = schedule();
        let sentinel = NaiveDate::from_ymd_opt(2030, 12, 31).unwrap();
        let filled = backfill_dates(&mut sheet.table, 2, sentinel);
        assert_eq!(filled, 3);
        assert_eq!(sheet.table.get(0, 2), &date(2025, 6, 2));
        for row in 1..4 {
            assert_eq!(sheet.table.get(row, 2), &CellValue::Date(sentinel));
        }
    }

    #[test]
    fn test_fill_flags() {
        let mut sheet = schedule();
        add_columns(&mut sheet, &headers(&["MRP", "MO", "EXPEDITE", "POSTPONE"]), None, &[]).unwrap();
        let flags = vec![
            FlagRule::new("MRP", vec![Condition::contains("MRP")]),
            FlagRule::new("MO", vec![Condition::starts_with("Job"), Condition::not_contains("MRP")]),
            FlagRule::new("EXPEDITE", vec![Condition::contains("expedite")]),
            FlagRule::new("POSTPONE", vec![Condition::contains("postpone")]),
        ];
        let counts = fill_flags(&mut sheet.table, "Schedule", 1, &flags, &ctx()).unwrap();
        assert_eq!(counts, vec![1, 3, 1, 1]);
        assert_eq!(sheet.table.get(0, 3), &t("Y"));
        assert_eq!(sheet.table.get(0, 4), &CellValue::Empty);
        assert_eq!(sheet.table.get(3, 6), &t("Y"));

        let missing = vec![FlagRule::new("LATE", vec![Condition::NotBlank])];
        assert!(matches!(
            fill_flags(&mut sheet.table, "Schedule", 1, &missing, &ctx()),
            Err(SheetError::ColumnNotFound { sheet, .. }) if sheet == "Schedule"
        ));
    }

    #[test]
    fn test_year_month_helpers() {
        let mut sheet = schedule();
        let at = add_year_month(&mut sheet, 2, "Year", "Month").unwrap();
        assert_eq!(at, 3);
        assert_eq!(sheet.table.get(0, 3), &CellValue::Number(2025.0));
        assert_eq!(sheet.table.get(0, 4), &t("Jun"));
        assert_eq!(sheet.table.get(2, 3), &CellValue::Empty);
        assert_eq!(sheet.table.get(2, 4), &CellValue::Empty);
    }

    #[test]
    fn test_resolve_lookup_reports_misses() {
        let mut table = Table::from_rows(
            headers(&["Part Num", "Warehouse", "Area"]),
            vec![
                vec![t("A-1"), t("WH1"), CellValue::Empty],
                vec![t("A-2"), t("WH9"), CellValue::Empty],
                vec![t("A-3"), CellValue::Empty, CellValue::Empty],
                vec![t("A-4"), CellValue::Number(101.0), CellValue::Empty],
            ],
        )
        .unwrap();
        let lookup: HashMap<String, String> = [("WH1", "North"), ("101", "South")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let misses = resolve_lookup(&mut table, "Inventory by WH", 1, 2, "Area", &lookup, "#N/A").unwrap();
        let area: Vec<String> = table.column(2).map(|c| c.to_string()).collect();
        assert_eq!(area, vec!["North", "#N/A", "#N/A", "South"]);
        assert!(matches!(
            &misses[..],
            [Diagnostic::LookupMiss(LookupMiss { key, row: 3, .. })] if key == "WH9"
        ));
    }

    #[test]
    fn test_copy_columns_with_rename() {
        let mut store = SheetStore::new();
        store.insert(schedule()).unwrap();
        let width = copy_columns(
            &mut store,
            "Schedule",
            "Summary",
            &[ColumnRef::Number(1), ColumnRef::Number(3)],
            Some("Schedule"),
            &[ColumnRename {
                column: ColumnRef::letter("B"),
                header: "Due".into(),
            }],
        )
        .unwrap();

        assert_eq!(width, 2);
        assert_eq!(store.names(), vec!["Summary", "Schedule"]);
        let summary = &store.get("Summary").unwrap().table;
        assert_eq!(summary.headers(), &["PartNum", "Due"]);
        assert_eq!(summary.get(0, 1), &date(2025, 6, 2));
    }

    #[test]
    fn test_prepare_working_relabels_raw_layout() {
        let mut store = SheetStore::new();
        let raw = Table::from_rows(
            headers(&["c1", "c2", "c3", "c4"]),
            vec![vec![t("x"), t("P-1"), t("y"), t("Job")]],
        )
        .unwrap();
        store.insert(Sheet::new("Sheet1", raw)).unwrap();

        let working = WorkingSheet {
            name: "Working".into(),
            header_source: Some("Header".into()),
            delete_columns: vec![ColumnRef::letter("A"), ColumnRef::letter("C")],
        };
        let labels = headers(&["", "PartNum", "Junk"]);
        prepare_working_sheet(&mut store, "Sheet1", &working, Some(&labels)).unwrap();

        let sheet = store.get("Working").unwrap();
        // Labels beyond the list keep the raw header
        assert_eq!(sheet.table.headers(), &["PartNum", "c4"]);
        assert_eq!(sheet.table.get(0, 1), &t("Job"));
        assert_eq!(store.visible_names(), vec!["Working"]);
    }

    #[test]
    fn test_legend_right_of_used_area() {
        let mut sheet = schedule();
        let spec = PivotSpec::new("Schedule", "Schedule!$A:$C", "E1")
            .unwrap()
            .rows(&["PartNum"])
            .data("Source", Aggregation::Count);
        let pivot = PivotTable::build(&sheet.table, &spec, &ctx()).unwrap().value;
        sheet.place_pivot(spec.anchor, pivot);

        let at = write_legend(&mut sheet, 3);
        // Pivot occupies E:F
        assert_eq!(at, CellRef::new(2, 7));
        assert_eq!(sheet.value_at(2, 7), t("Legend"));
        assert_eq!(sheet.value_at(3, 7), t("Overdue/Late"));
    }

    #[test]
    fn test_append_pivot_labels() {
        let inventory = Table::from_rows(
            headers(&["Part Num", "Area", "On Hand"]),
            vec![
                vec![t("A-1"), t("South"), CellValue::Number(1.0)],
                vec![t("A-1"), t("North"), CellValue::Number(2.0)],
            ],
        )
        .unwrap();
        let spec = PivotSpec::new("Inventory by WH", "'Inventory by WH'!$A:$C", "O1")
            .unwrap()
            .rows(&["Part Num"])
            .column("Area")
            .data("On Hand", Aggregation::Sum);
        let pivot = PivotTable::build(&inventory, &spec, &ctx()).unwrap().value;
        let mut inv = Sheet::new("Inventory by WH", inventory);
        inv.place_pivot(spec.anchor, pivot);

        let mut store = SheetStore::new();
        store.insert(inv).unwrap();
        store
            .insert(Sheet::new("TPR Inventory", Table::new(headers(&["PartNum", "Receipts"])).unwrap()))
            .unwrap();

        let added = append_pivot_labels(&mut store, "Inventory by WH", "TPR Inventory", &headers(&["Delta"])).unwrap();
        assert_eq!(added, vec!["North", "South", "Delta"]);
        assert_eq!(
            store.get("TPR Inventory").unwrap().table.headers(),
            &["PartNum", "Receipts", "North", "South", "Delta"]
        );

        assert!(matches!(
            append_pivot_labels(&mut store, "TPR Inventory", "Inventory by WH", &[]),
            Err(SheetError::PivotNotFound(_))
        ));
    }
}
