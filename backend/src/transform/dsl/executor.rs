//! Filter-derivation executor
//!
//! Applies derived-sheet specs to a source sheet and writes the surviving
//! rows to new sheets.

use crate::error::{SheetError, SheetResult};
use crate::models::RunContext;
use crate::sheet::{Sheet, SheetStore, Table};

use super::config::DerivedSheet;
use super::predicate::Predicate;

/// Result of deriving the sheets of one spec table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivationResult {
    /// (sheet name, rows kept), in spec order
    pub sheets: Vec<(String, usize)>,
    /// Rows in the source sheet
    pub source_rows: usize,
}

impl DerivationResult {
    pub fn rows_in(&self, sheet: &str) -> Option<usize> {
        self.sheets.iter().find(|(n, _)| n == sheet).map(|(_, c)| *c)
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .sheets
            .iter()
            .map(|(name, rows)| format!("{}: {}", name, rows))
            .collect();
        format!(
            "Derived {} sheets from {} rows ({})",
            self.sheets.len(),
            self.source_rows,
            parts.join(", ")
        )
    }
}

/// Keep the rows of `source` that satisfy every predicate, in source order.
///
/// Every predicate column must exist on `source`.
pub fn derive_table(
    source: &Table,
    predicates: &[Predicate],
    ctx: &RunContext,
) -> SheetResult<Table> {
    let resolved: Vec<(usize, &Predicate)> = predicates
        .iter()
        .map(|p| source.require_column(&p.column).map(|col| (col, p)))
        .collect::<SheetResult<_>>()?;

    Ok(source.filter_rows(|row| {
        resolved
            .iter()
            .all(|(col, p)| row.get(*col).is_some_and(|cell| p.condition.matches(cell, ctx)))
    }))
}

/// Derive every spec from `source_sheet` and write each result to the store,
/// replacing any sheet of the same name.
pub fn derive_sheets(
    store: &mut SheetStore,
    source_sheet: &str,
    specs: &[DerivedSheet],
    ctx: &RunContext,
) -> SheetResult<DerivationResult> {
    let mut result = DerivationResult::default();

    for spec in specs {
        let source_name = spec.source.as_deref().unwrap_or(source_sheet);
        let source = store.get(source_name)?;
        result.source_rows = source.table.height();
        let table = derive_table(&source.table, &spec.filters, ctx)
            .map_err(|e: SheetError| e.in_sheet(source_name))?;
        result.sheets.push((spec.name.clone(), table.height()));
        store.upsert(Sheet::new(spec.name.clone(), table));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;
    use crate::transform::dsl::predicate::Condition;
    use chrono::NaiveDate;

    fn ctx() -> RunContext {
        RunContext::on(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap())
    }

    fn working() -> Table {
        Table::from_rows(
            vec!["PartNum".into(), "Source".into(), "Type".into(), "Receipts".into()],
            vec![
                vec!["P-1".into(), "Job: MRP".into(), "M".into(), "10".into()],
                vec!["P-2".into(), "PO: 123".into(), "P".into(), "5".into()],
                vec!["P-3".into(), "Job: X".into(), "M".into(), CellValue::Empty],
                vec!["P-4".into(), "job: 7".into(), "M".into(), "2".into()],
            ],
        )
        .unwrap()
    }

    fn schedule_filters() -> Vec<Predicate> {
        vec![
            Predicate::new("Source", Condition::contains("Job")),
            Predicate::new("Type", Condition::equals("M")),
            Predicate::new("Receipts", Condition::NotBlank),
        ]
    }

    #[test]
    fn test_conjunction_preserves_order() {
        let derived = derive_table(&working(), &schedule_filters(), &ctx()).unwrap();
        let parts: Vec<String> = derived.column(0).map(|c| c.to_string()).collect();
        assert_eq!(parts, vec!["P-1", "P-4"]);
        assert_eq!(derived.headers(), working().headers());
    }

    #[test]
    fn test_predicate_order_does_not_change_result() {
        let mut reversed = schedule_filters();
        reversed.reverse();
        assert_eq!(
            derive_table(&working(), &schedule_filters(), &ctx()).unwrap(),
            derive_table(&working(), &reversed, &ctx()).unwrap()
        );
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let err = derive_table(
            &working(),
            &[Predicate::new("Due Date", Condition::NotBlank)],
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::ColumnNotFound { column, .. } if column == "Due Date"));
    }

    #[test]
    fn test_derive_sheets_replaces_existing() {
        let mut store = SheetStore::new();
        store.insert(Sheet::new("Working", working())).unwrap();
        store.insert(Sheet::new("Schedule", Table::new(vec!["Old".into()]).unwrap())).unwrap();

        let specs = vec![
            DerivedSheet::new("Schedule", schedule_filters()),
            DerivedSheet::new("PO", vec![Predicate::new("Source", Condition::contains("PO:"))]),
        ];
        let result = derive_sheets(&mut store, "Working", &specs, &ctx()).unwrap();

        assert_eq!(store.names(), vec!["Working", "Schedule", "PO"]);
        assert_eq!(result.rows_in("Schedule"), Some(2));
        assert_eq!(result.rows_in("PO"), Some(1));
        assert_eq!(store.get("Schedule").unwrap().table.headers()[0], "PartNum");
        // The source is untouched
        assert_eq!(store.get("Working").unwrap().table.height(), 4);
    }

    #[test]
    fn test_missing_source_sheet() {
        let mut store = SheetStore::new();
        let specs = vec![DerivedSheet::new("MRP", vec![])];
        assert!(matches!(
            derive_sheets(&mut store, "Working", &specs, &ctx()),
            Err(SheetError::SheetNotFound(_))
        ));
    }
}
