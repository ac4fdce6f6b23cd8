//! Aggregation engine (pivot tables).
//!
//! A pivot is built from a whole-column source range. The range is copied
//! into a cache (field names plus records) so that item visibility and
//! expand/collapse state can be changed and the grid re-rendered later
//! without reading the source again.
//!
//! The rendered grid follows the compact layout of spreadsheet pivots:
//!
//! ```text
//! Class        (All)           <- filter area, then one blank row
//!
//! Row Labels   Count of PartNum
//! 01           12
//! 41           3
//! Grand Total  15
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{AddressError, DimensionLookupError, SheetResult};
use crate::models::{
    AggregationFieldError, CellRef, CellValue, ColumnRef, Diagnostic, Outcome, RunContext,
    SourceRange,
};
use crate::sheet::{Sheet, Table};

/// Label shown for blank items.
pub const BLANK_ITEM: &str = "(blank)";

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ============================================================================
// SPEC
// ============================================================================

/// Aggregation function of a data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Count,
}

impl Aggregation {
    pub fn caption(&self, field: &str) -> String {
        match self {
            Aggregation::Sum => format!("Sum of {}", field),
            Aggregation::Count => format!("Count of {}", field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    pub field: String,
    pub aggregation: Aggregation,
}

/// Which items of a field stay visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRule {
    /// Only these items are visible.
    Allow(Vec<String>),
    /// These items are hidden.
    Hide(Vec<String>),
}

/// `{"field": "Class", "allow": ["01", "41"]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityRule {
    pub field: String,
    #[serde(flatten)]
    pub rule: ItemRule,
}

/// Keep only the current year and, inside it, the current month expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalExpand {
    pub year_field: String,
    pub month_field: String,
}

/// Part count and data horizon written under the pivot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryAnnotation {
    pub key_column: ColumnRef,
    pub due_date_column: ColumnRef,
}

/// Declarative description of one pivot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotSpec {
    /// Sheet the pivot is placed on.
    pub sheet: String,
    pub source: SourceRange,
    pub anchor: CellRef,
    #[serde(default)]
    pub rows: Vec<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    pub data: Vec<DataField>,
    #[serde(default)]
    pub visibility: Vec<VisibilityRule>,
    #[serde(default)]
    pub temporal: Option<TemporalExpand>,
    #[serde(default)]
    pub annotation: Option<SummaryAnnotation>,
}

impl PivotSpec {
    pub fn new(sheet: &str, source: &str, anchor: &str) -> Result<Self, AddressError> {
        Ok(Self {
            sheet: sheet.to_string(),
            source: SourceRange::parse(source)?,
            anchor: CellRef::from_a1(anchor)?,
            rows: Vec::new(),
            column: None,
            filters: Vec::new(),
            data: Vec::new(),
            visibility: Vec::new(),
            temporal: None,
            annotation: None,
        })
    }

    pub fn rows(mut self, fields: &[&str]) -> Self {
        self.rows = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn column(mut self, field: &str) -> Self {
        self.column = Some(field.to_string());
        self
    }

    pub fn filters(mut self, fields: &[&str]) -> Self {
        self.filters = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn data(mut self, field: &str, aggregation: Aggregation) -> Self {
        self.data.push(DataField {
            field: field.to_string(),
            aggregation,
        });
        self
    }

    pub fn allow(mut self, field: &str, items: &[&str]) -> Self {
        self.visibility.push(VisibilityRule {
            field: field.to_string(),
            rule: ItemRule::Allow(items.iter().map(|i| i.to_string()).collect()),
        });
        self
    }

    pub fn hide(mut self, field: &str, items: &[&str]) -> Self {
        self.visibility.push(VisibilityRule {
            field: field.to_string(),
            rule: ItemRule::Hide(items.iter().map(|i| i.to_string()).collect()),
        });
        self
    }

    pub fn temporal(mut self, year_field: &str, month_field: &str) -> Self {
        self.temporal = Some(TemporalExpand {
            year_field: year_field.to_string(),
            month_field: month_field.to_string(),
        });
        self
    }

    pub fn annotate(mut self, key_column: ColumnRef, due_date_column: ColumnRef) -> Self {
        self.annotation = Some(SummaryAnnotation {
            key_column,
            due_date_column,
        });
        self
    }

    /// Rows taken by the filter area (filter rows plus one blank row).
    pub fn filter_area_height(&self) -> usize {
        if self.filters.is_empty() {
            0
        } else {
            self.filters.len() + 1
        }
    }
}

// ============================================================================
// FIELDS AND ITEMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Row,
    Column,
    Filter,
    /// Restricts records without being displayed.
    Hidden,
}

/// A distinct value of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotItem {
    pub label: String,
    pub value: CellValue,
}

impl PivotItem {
    fn display(&self) -> CellValue {
        if self.value.is_blank() {
            CellValue::Text(BLANK_ITEM.to_string())
        } else {
            self.value.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PivotField {
    name: String,
    source_index: usize,
    axis: Axis,
    /// All distinct items in the cache, sorted.
    items: Vec<PivotItem>,
    hidden_items: Vec<String>,
    collapsed_items: Vec<String>,
}

impl PivotField {
    fn new(name: &str, source_index: usize, axis: Axis, records: &[Vec<CellValue>]) -> Self {
        let mut seen = HashSet::new();
        let mut items: Vec<PivotItem> = records
            .iter()
            .map(|r| r.get(source_index).cloned().unwrap_or_default())
            .filter_map(|value| {
                let label = item_label(&value);
                seen.insert(label.clone()).then_some(PivotItem { label, value })
            })
            .collect();
        items.sort_by(|a, b| compare_items(&a.value, &b.value));
        Self {
            name: name.to_string(),
            source_index,
            axis,
            items,
            hidden_items: Vec::new(),
            collapsed_items: Vec::new(),
        }
    }

    fn label_of(&self, record: &[CellValue]) -> String {
        record.get(self.source_index).map(item_label).unwrap_or_else(|| BLANK_ITEM.to_string())
    }

    fn is_hidden(&self, label: &str) -> bool {
        self.hidden_items.iter().any(|h| h == label)
    }

    fn is_collapsed(&self, label: &str) -> bool {
        self.collapsed_items.iter().any(|c| c == label)
    }

    fn apply_rule(&mut self, rule: &ItemRule) {
        self.hidden_items = match rule {
            ItemRule::Allow(allowed) => self
                .items
                .iter()
                .filter(|i| !allowed.contains(&i.label))
                .map(|i| i.label.clone())
                .collect(),
            ItemRule::Hide(hidden) => self
                .items
                .iter()
                .filter(|i| hidden.contains(&i.label))
                .map(|i| i.label.clone())
                .collect(),
        };
    }

    /// Collapse every item except `keep`.
    fn collapse_all_but(&mut self, keep: &str) {
        self.collapsed_items = self
            .items
            .iter()
            .filter(|i| i.label != keep)
            .map(|i| i.label.clone())
            .collect();
    }

    /// Filter-area caption for this field.
    fn selection(&self) -> CellValue {
        let visible: Vec<&PivotItem> = self.items.iter().filter(|i| !self.is_hidden(&i.label)).collect();
        if visible.len() == self.items.len() {
            CellValue::text("(All)")
        } else if visible.len() == 1 {
            visible[0].display()
        } else {
            CellValue::text("(Multiple Items)")
        }
    }
}

/// Item label: the display form of the value, `(blank)` for blanks.
pub fn item_label(value: &CellValue) -> String {
    if value.is_blank() {
        BLANK_ITEM.to_string()
    } else {
        value.to_string()
    }
}

fn month_rank(text: &str) -> Option<usize> {
    MONTHS.iter().position(|m| m.eq_ignore_ascii_case(text.trim()))
}

/// Item order: numbers, then dates, then text (month names in calendar
/// order ahead of other text), with blanks last.
fn compare_items(a: &CellValue, b: &CellValue) -> Ordering {
    fn rank(v: &CellValue) -> u8 {
        match v {
            _ if v.is_blank() => 4,
            CellValue::Number(_) => 0,
            CellValue::Date(_) => 1,
            CellValue::Text(t) if month_rank(t).is_some() => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (CellValue::Date(x), CellValue::Date(y)) => x.cmp(y),
        _ => match rank(a).cmp(&rank(b)) {
            Ordering::Equal => match (a, b) {
                (CellValue::Text(x), CellValue::Text(y)) => match (month_rank(x), month_rank(y)) {
                    (Some(mx), Some(my)) => mx.cmp(&my),
                    _ => x.to_lowercase().cmp(&y.to_lowercase()),
                },
                _ => a.to_string().cmp(&b.to_string()),
            },
            other => other,
        },
    }
}

// ============================================================================
// PIVOT TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct AppliedDataField {
    field: String,
    source_index: usize,
    aggregation: Aggregation,
}

impl AppliedDataField {
    fn caption(&self) -> String {
        self.aggregation.caption(&self.field)
    }

    fn aggregate(&self, records: &[&Vec<CellValue>]) -> CellValue {
        if records.is_empty() {
            return CellValue::Empty;
        }
        let values = records.iter().filter_map(|r| r.get(self.source_index));
        match self.aggregation {
            Aggregation::Sum => CellValue::Number(values.filter_map(CellValue::as_number).sum()),
            // A count with nothing to count renders blank, as in a spreadsheet pivot
            Aggregation::Count => match values.filter(|v| !v.is_blank()).count() {
                0 => CellValue::Empty,
                n => CellValue::Number(n as f64),
            },
        }
    }
}

/// A built pivot: cache, field state and the rendered grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    name: String,
    source_fields: Vec<String>,
    records: Vec<Vec<CellValue>>,
    fields: Vec<PivotField>,
    data: Vec<AppliedDataField>,
    grid: Vec<Vec<CellValue>>,
    column_labels: Vec<String>,
}

impl PivotTable {
    /// Build a pivot over `source` (the table of the range's sheet).
    ///
    /// Every dimension, data field and rule field must exist in the range.
    /// A `sum` over a field holding non-numeric values falls back to
    /// `count`, reported as a diagnostic.
    pub fn build(
        source: &Table,
        spec: &PivotSpec,
        ctx: &RunContext,
    ) -> Result<Outcome<PivotTable>, DimensionLookupError> {
        let span = spec.source.columns;
        let last = span.last.min(source.width().saturating_sub(1));
        let columns: Vec<usize> = if source.width() == 0 || span.first > last {
            Vec::new()
        } else {
            (span.first..=last).collect()
        };
        let source_fields: Vec<String> = columns.iter().map(|&c| source.headers()[c].clone()).collect();
        let records: Vec<Vec<CellValue>> = source
            .rows()
            .iter()
            .map(|r| columns.iter().map(|&c| r.get(c).cloned().unwrap_or_default()).collect())
            .collect();

        let lookup = |field: &str| -> Result<usize, DimensionLookupError> {
            source_fields.iter().position(|f| f == field).ok_or_else(|| DimensionLookupError {
                pivot: spec.sheet.clone(),
                field: field.to_string(),
                available: source_fields.iter().filter(|f| !f.is_empty()).cloned().collect(),
            })
        };

        let mut fields = Vec::new();
        for name in &spec.filters {
            fields.push(PivotField::new(name, lookup(name)?, Axis::Filter, &records));
        }
        for name in &spec.rows {
            fields.push(PivotField::new(name, lookup(name)?, Axis::Row, &records));
        }
        if let Some(name) = &spec.column {
            fields.push(PivotField::new(name, lookup(name)?, Axis::Column, &records));
        }

        for rule in &spec.visibility {
            let index = lookup(&rule.field)?;
            if !fields.iter().any(|f| f.name == rule.field) {
                fields.push(PivotField::new(&rule.field, index, Axis::Hidden, &records));
            }
            if let Some(field) = fields.iter_mut().find(|f| f.name == rule.field) {
                field.apply_rule(&rule.rule);
            }
        }

        if let Some(temporal) = &spec.temporal {
            lookup(&temporal.year_field)?;
            lookup(&temporal.month_field)?;
            let year = ctx.current_year().to_string();
            let month = ctx.current_month_name();
            for field in fields.iter_mut().filter(|f| f.axis == Axis::Row) {
                if field.name == temporal.year_field {
                    field.collapse_all_but(&year);
                } else if field.name == temporal.month_field {
                    field.collapse_all_but(&month);
                }
            }
        }

        let mut diagnostics = Vec::new();
        let mut data = Vec::with_capacity(spec.data.len());
        for requested in &spec.data {
            let source_index = lookup(&requested.field)?;
            let mut aggregation = requested.aggregation;
            if aggregation == Aggregation::Sum {
                let offending = records
                    .iter()
                    .filter_map(|r| r.get(source_index))
                    .find(|v| !v.is_blank() && v.as_number().is_none());
                if let Some(value) = offending {
                    aggregation = Aggregation::Count;
                    diagnostics.push(Diagnostic::AggregationFallback(AggregationFieldError {
                        pivot: spec.sheet.clone(),
                        field: requested.field.clone(),
                        requested: Aggregation::Sum,
                        applied: Aggregation::Count,
                        reason: format!("non-numeric value '{}'", value),
                    }));
                }
            }
            data.push(AppliedDataField {
                field: requested.field.clone(),
                source_index,
                aggregation,
            });
        }

        let mut pivot = PivotTable {
            name: spec.sheet.clone(),
            source_fields,
            records,
            fields,
            data,
            grid: Vec::new(),
            column_labels: Vec::new(),
        };
        pivot.refresh();
        Ok(Outcome::with_diagnostics(pivot, diagnostics))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &[Vec<CellValue>] {
        &self.grid
    }

    /// Number of visible top-level row groups.
    pub fn group_count(&self) -> usize {
        let visible = self.visible_records();
        match self.axis_fields(Axis::Row).first() {
            Some(field) => field
                .items
                .iter()
                .filter(|i| visible.iter().any(|r| field.label_of(r) == i.label))
                .count(),
            None => 0,
        }
    }

    /// Labels of the column items currently shown, in order.
    pub fn visible_column_items(&self) -> &[String] {
        &self.column_labels
    }

    /// Captions of the data fields, using the applied aggregations.
    pub fn captions(&self) -> Vec<String> {
        self.data.iter().map(AppliedDataField::caption).collect()
    }

    /// Show or hide one item of a field, then re-render.
    pub fn set_item_visible(&mut self, field: &str, item: &str, visible: bool) -> Result<(), DimensionLookupError> {
        let target = self.field_mut(field)?;
        target.hidden_items.retain(|h| h != item);
        if !visible {
            target.hidden_items.push(item.to_string());
        }
        self.refresh();
        Ok(())
    }

    /// Expand or collapse one item of a row field, then re-render.
    pub fn set_expanded(&mut self, field: &str, item: &str, expanded: bool) -> Result<(), DimensionLookupError> {
        let target = self.field_mut(field)?;
        target.collapsed_items.retain(|c| c != item);
        if !expanded {
            target.collapsed_items.push(item.to_string());
        }
        self.refresh();
        Ok(())
    }

    /// Re-render the grid from the cache and the current field state.
    pub fn refresh(&mut self) {
        let visible = self.visible_records();
        let row_fields = self.axis_fields(Axis::Row);
        let column_field = self.axis_fields(Axis::Column).into_iter().next();

        let column_items: Vec<PivotItem> = column_field
            .map(|field| {
                field
                    .items
                    .iter()
                    .filter(|i| visible.iter().any(|r| field.label_of(r) == i.label))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut grid = Vec::new();

        let filters = self.axis_fields(Axis::Filter);
        for field in &filters {
            grid.push(vec![CellValue::text(field.name.as_str()), field.selection()]);
        }
        if !filters.is_empty() {
            grid.push(Vec::new());
        }

        let captions = self.captions();
        match column_field {
            Some(_) => {
                let corner = match captions.as_slice() {
                    [single] => CellValue::text(single.as_str()),
                    _ => CellValue::Empty,
                };
                grid.push(vec![corner, CellValue::text("Column Labels")]);

                let mut header = vec![CellValue::text("Row Labels")];
                for item in &column_items {
                    if captions.len() == 1 {
                        header.push(item.display());
                    } else {
                        for caption in &captions {
                            header.push(CellValue::Text(format!("{} - {}", item.label, caption)));
                        }
                    }
                }
                if captions.len() == 1 {
                    header.push(CellValue::text("Grand Total"));
                } else {
                    for caption in &captions {
                        header.push(CellValue::Text(format!("Total {}", caption)));
                    }
                }
                grid.push(header);
            }
            None => {
                let mut header = vec![CellValue::text("Row Labels")];
                header.extend(captions.iter().map(|c| CellValue::text(c.as_str())));
                grid.push(header);
            }
        }

        if !row_fields.is_empty() {
            self.render_rows(&visible, &row_fields, 0, column_field, &column_items, &mut grid);
        }

        let mut total = vec![CellValue::text("Grand Total")];
        total.extend(self.value_cells(&visible, column_field, &column_items));
        grid.push(total);

        self.column_labels = column_items.into_iter().map(|i| i.label).collect();
        self.grid = grid;
    }

    fn render_rows(
        &self,
        records: &[&Vec<CellValue>],
        row_fields: &[&PivotField],
        depth: usize,
        column_field: Option<&PivotField>,
        column_items: &[PivotItem],
        grid: &mut Vec<Vec<CellValue>>,
    ) {
        let field = row_fields[depth];
        for item in &field.items {
            let group: Vec<&Vec<CellValue>> = records
                .iter()
                .copied()
                .filter(|r| field.label_of(r) == item.label)
                .collect();
            if group.is_empty() {
                continue;
            }
            let mut line = vec![item.display()];
            line.extend(self.value_cells(&group, column_field, column_items));
            grid.push(line);

            if depth + 1 < row_fields.len() && !field.is_collapsed(&item.label) {
                self.render_rows(&group, row_fields, depth + 1, column_field, column_items, grid);
            }
        }
    }

    fn value_cells(
        &self,
        records: &[&Vec<CellValue>],
        column_field: Option<&PivotField>,
        column_items: &[PivotItem],
    ) -> Vec<CellValue> {
        let Some(column_field) = column_field else {
            return self.data.iter().map(|d| d.aggregate(records)).collect();
        };
        let mut cells = Vec::with_capacity((column_items.len() + 1) * self.data.len());
        for item in column_items {
            let slice: Vec<&Vec<CellValue>> = records
                .iter()
                .copied()
                .filter(|r| column_field.label_of(r) == item.label)
                .collect();
            cells.extend(self.data.iter().map(|d| d.aggregate(&slice)));
        }
        cells.extend(self.data.iter().map(|d| d.aggregate(records)));
        cells
    }

    fn visible_records(&self) -> Vec<&Vec<CellValue>> {
        self.records
            .iter()
            .filter(|r| {
                self.fields
                    .iter()
                    .all(|f| f.hidden_items.is_empty() || !f.is_hidden(&f.label_of(r)))
            })
            .collect()
    }

    fn axis_fields(&self, axis: Axis) -> Vec<&PivotField> {
        self.fields.iter().filter(|f| f.axis == axis).collect()
    }

    fn field_mut(&mut self, name: &str) -> Result<&mut PivotField, DimensionLookupError> {
        let available = self.fields.iter().map(|f| f.name.clone()).collect();
        let pivot = self.name.clone();
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| DimensionLookupError {
                pivot,
                field: name.to_string(),
                available,
            })
    }

    /// Fields of the source range, in range order.
    pub fn source_fields(&self) -> &[String] {
        &self.source_fields
    }
}

// ============================================================================
// SUMMARY ANNOTATION
// ============================================================================

/// Write the part count and data horizon under a placed pivot.
///
/// Scans the anchor column down from the top of the pivot body to the
/// first blank cell `b`; writes "Total No. of Parts" and the distinct count
/// of `key_column` on row `b + 1`, and "Data shown up till <Mon YYYY>"
/// (latest date of `due_date_column`) on row `b + 3`. Both columns are
/// resolved on `source`, the pivot's source table.
pub fn annotate(
    sheet: &mut Sheet,
    anchor: CellRef,
    body_offset: usize,
    annotation: &SummaryAnnotation,
    source: &Table,
    source_sheet: &str,
) -> SheetResult<()> {
    let key = annotation.key_column.resolve(source, source_sheet)?;
    let due = annotation.due_date_column.resolve(source, source_sheet)?;

    let mut blank = anchor.row + body_offset;
    while !sheet.value_at(blank, anchor.col).is_blank() {
        blank += 1;
    }

    let parts: HashSet<String> = source
        .column(key)
        .filter(|c| !c.is_blank())
        .map(CellValue::to_string)
        .collect();
    sheet.write_note(CellRef::new(blank + 1, anchor.col), CellValue::text("Total No. of Parts"));
    sheet.write_note(
        CellRef::new(blank + 1, anchor.col + 1),
        CellValue::Number(parts.len() as f64),
    );

    let latest: Option<NaiveDate> = source.column(due).filter_map(CellValue::as_date).max();
    if let Some(latest) = latest {
        sheet.write_note(
            CellRef::new(blank + 3, anchor.col),
            CellValue::Text(format!("Data shown up till {}", latest.format("%b %Y"))),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext::on(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> CellValue {
        CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn t(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn text_row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::text(*c)).collect()
    }

    fn inventory() -> Table {
        let headers = vec!["Part Num".to_string(), "Area".into(), "On Hand".into()];
        let rows = vec![
            vec![t("A-1"), t("North"), n(5.0)],
            vec![t("A-1"), t("South"), n(2.0)],
            vec![t("A-2"), t("North"), n(7.0)],
            vec![t("A-2"), t("#N/A"), n(1.0)],
            vec![t("A-3"), CellValue::Empty, n(4.0)],
        ];
        Table::from_rows(headers, rows).unwrap()
    }

    #[test]
    fn test_count_by_row_dimension() {
        let table = Table::from_rows(
            vec!["Class".into(), "PartNum".into()],
            vec![
                text_row(&["41", "P-1"]),
                text_row(&["01", "P-2"]),
                text_row(&["41", ""]),
                text_row(&["41", "P-4"]),
            ],
        )
        .unwrap();
        let spec = PivotSpec::new("MRP", "MRP!$A:$B", "O1")
            .unwrap()
            .rows(&["Class"])
            .data("PartNum", Aggregation::Count);
        let outcome = PivotTable::build(&table, &spec, &ctx()).unwrap();
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(
            outcome.value.grid(),
            &[
                text_row(&["Row Labels", "Count of PartNum"]),
                vec![t("01"), n(1.0)],
                vec![t("41"), n(2.0)],
                vec![t("Grand Total"), n(3.0)],
            ]
        );
        assert_eq!(outcome.value.group_count(), 2);
    }

    #[test]
    fn test_sum_with_column_dimension_and_hidden_items() {
        let spec = PivotSpec::new("Inventory by WH", "'Inventory by WH'!$A:$C", "O1")
            .unwrap()
            .rows(&["Part Num"])
            .column("Area")
            .data("On Hand", Aggregation::Sum)
            .hide("Area", &["0", "#N/A", "(blank)"]);
        let pivot = PivotTable::build(&inventory(), &spec, &ctx()).unwrap().value;

        assert_eq!(pivot.visible_column_items(), &["North", "South"]);
        let grid = pivot.grid();
        assert_eq!(grid[0], text_row(&["Sum of On Hand", "Column Labels"]));
        assert_eq!(grid[1], text_row(&["Row Labels", "North", "South", "Grand Total"]));
        assert_eq!(grid[2], vec![t("A-1"), n(5.0), n(2.0), n(7.0)]);
        assert_eq!(grid[3], vec![t("A-2"), n(7.0), CellValue::Empty, n(7.0)]);
        // A-3 only has a blank area, which is hidden
        assert_eq!(grid[4], vec![t("Grand Total"), n(12.0), n(2.0), n(14.0)]);
        assert_eq!(grid.len(), 5);
    }

    #[test]
    fn test_sum_of_text_falls_back_to_count() {
        let spec = PivotSpec::new("Inventory by WH", "'Inventory by WH'!$A:$C", "O1")
            .unwrap()
            .rows(&["Area"])
            .data("Part Num", Aggregation::Sum);
        let outcome = PivotTable::build(&inventory(), &spec, &ctx()).unwrap();

        assert_eq!(outcome.value.captions(), vec!["Count of Part Num"]);
        assert!(matches!(
            &outcome.diagnostics[..],
            [Diagnostic::AggregationFallback(AggregationFieldError { field, applied: Aggregation::Count, .. })]
                if field == "Part Num"
        ));
        let total = outcome.value.grid().last().unwrap().clone();
        assert_eq!(total, vec![t("Grand Total"), n(5.0)]);
    }

    #[test]
    fn test_missing_dimension_is_an_error() {
        let spec = PivotSpec::new("MRP", "MRP!$A:$B", "O1")
            .unwrap()
            .rows(&["Area"])
            .data("On Hand", Aggregation::Sum);
        // On Hand is column C, outside the range
        let err = PivotTable::build(&inventory(), &spec, &ctx()).unwrap_err();
        assert_eq!(err.field, "On Hand");
        assert_eq!(err.available, vec!["Part Num", "Area"]);
    }

    fn schedule() -> Table {
        let headers: Vec<String> = ["Class", "Year", "Month", "Due Date", "MO"].iter().map(|h| h.to_string()).collect();
        let rows = vec![
            vec![t("01"), n(2023.0), t("Mar"), date(2023, 3, 1), t("Y")],
            vec![t("01"), n(2025.0), t("Jun"), date(2025, 6, 2), t("Y")],
            vec![t("41"), n(2025.0), t("Jun"), date(2025, 6, 20), CellValue::Empty],
            vec![t("41"), n(2025.0), t("Jan"), date(2025, 1, 5), t("Y")],
            vec![t("99"), n(2024.0), t("Dec"), date(2024, 12, 31), t("Y")],
            vec![t("41"), n(2024.0), t("Nov"), date(2024, 11, 15), t("Y")],
        ];
        Table::from_rows(headers, rows).unwrap()
    }

    fn schedule_spec() -> PivotSpec {
        PivotSpec::new("Schedule", "Schedule!$A:$E", "X1")
            .unwrap()
            .filters(&["Class"])
            .rows(&["Year", "Month", "Due Date"])
            .data("MO", Aggregation::Count)
            .allow("Class", &["01", "41"])
            .temporal("Year", "Month")
    }

    #[test]
    fn test_temporal_expand_keeps_only_current_period_open() {
        let pivot = PivotTable::build(&schedule(), &schedule_spec(), &ctx()).unwrap().value;
        let grid = pivot.grid();

        assert_eq!(grid[0], vec![t("Class"), t("(Multiple Items)")]);
        assert!(grid[1].is_empty());
        assert_eq!(grid[2], text_row(&["Row Labels", "Count of MO"]));
        assert_eq!(
            &grid[3..],
            &[
                vec![n(2023.0), n(1.0)],
                vec![n(2024.0), n(1.0)],
                vec![n(2025.0), n(2.0)],
                vec![t("Jan"), n(1.0)],
                vec![t("Jun"), n(1.0)],
                vec![date(2025, 6, 2), n(1.0)],
                vec![date(2025, 6, 20), CellValue::Empty],
                vec![t("Grand Total"), n(4.0)],
            ]
        );

        // Past years stay collapsed: the next line after each is another year
        assert_eq!(grid[4][0], n(2024.0));
        assert_eq!(grid[5][0], n(2025.0));
        // Inside the current year only the current month shows its dates
        assert_eq!(grid[6][0], t("Jan"));
        assert_eq!(grid[7][0], t("Jun"));
    }

    #[test]
    fn test_empty_count_renders_blank() {
        let table = Table::from_rows(
            vec!["Class".into(), "MO".into()],
            vec![
                vec![t("01"), t("Y")],
                vec![t("41"), CellValue::Empty],
            ],
        )
        .unwrap();
        let spec = PivotSpec::new("Schedule", "Schedule!$A:$B", "X1")
            .unwrap()
            .rows(&["Class"])
            .data("MO", Aggregation::Count);
        let pivot = PivotTable::build(&table, &spec, &ctx()).unwrap().value;
        assert_eq!(pivot.grid()[2], vec![t("41"), CellValue::Empty]);
        assert_eq!(pivot.grid()[3], vec![t("Grand Total"), n(1.0)]);
    }

    #[test]
    fn test_toggles_refresh_from_cache() {
        let mut pivot = PivotTable::build(&schedule(), &schedule_spec(), &ctx()).unwrap().value;
        pivot.set_expanded("Year", "2025", false).unwrap();
        assert_eq!(pivot.grid().len(), 7);

        pivot.set_item_visible("Class", "99", true).unwrap();
        let grid = pivot.grid();
        assert_eq!(grid[4], vec![n(2024.0), n(2.0)]);
        assert_eq!(grid.last().unwrap(), &vec![t("Grand Total"), n(5.0)]);

        assert!(pivot.set_item_visible("Planner", "x", false).is_err());
    }

    #[test]
    fn test_item_order() {
        let mut values = vec![
            CellValue::Empty,
            t("Mar"),
            t("Zeta"),
            date(2024, 1, 1),
            n(10.0),
            t("Jan"),
            n(2.0),
        ];
        values.sort_by(compare_items);
        assert_eq!(
            values,
            vec![
                n(2.0),
                n(10.0),
                date(2024, 1, 1),
                t("Jan"),
                t("Mar"),
                t("Zeta"),
                CellValue::Empty,
            ]
        );
    }

    #[test]
    fn test_annotation_below_pivot() {
        let table = Table::from_rows(
            vec!["PartNum".into(), "Class".into(), "Due Date".into()],
            vec![
                vec![t("P-1"), t("01"), date(2025, 3, 4)],
                vec![t("P-1"), t("41"), t("n/a")],
                vec![t("P-2"), t("41"), date(2025, 8, 1)],
            ],
        )
        .unwrap();
        let spec = PivotSpec::new("MRP", "MRP!$A:$C", "O1")
            .unwrap()
            .rows(&["Class"])
            .data("PartNum", Aggregation::Count)
            .annotate(ColumnRef::header("PartNum"), ColumnRef::header("Due Date"));
        let pivot = PivotTable::build(&table, &spec, &ctx()).unwrap().value;

        let mut sheet = Sheet::new("MRP", table.clone());
        sheet.place_pivot(spec.anchor, pivot);
        let annotation = spec.annotation.clone().unwrap();
        annotate(&mut sheet, spec.anchor, 0, &annotation, &table, "MRP").unwrap();

        // Pivot spans rows 0..=3, first blank row is 4
        assert_eq!(sheet.value_at(5, 14), t("Total No. of Parts"));
        assert_eq!(sheet.value_at(5, 15), CellValue::Number(2.0));
        assert_eq!(sheet.value_at(7, 14), t("Data shown up till Aug 2025"));
    }

    #[test]
    fn test_spec_json_form() {
        let json = r##"{
            "sheet": "Inventory by WH",
            "source": "'Inventory by WH'!$B:$H",
            "anchor": "O1",
            "rows": ["Part Num"],
            "column": "Area",
            "data": [{"field": "On Hand", "aggregation": "sum"}],
            "visibility": [{"field": "Area", "hide": ["0", "#N/A", "(blank)"]}]
        }"##;
        let spec: PivotSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.anchor, CellRef::new(0, 14));
        assert_eq!(spec.source.columns.first, 1);
        assert_eq!(spec.visibility[0].rule, ItemRule::Hide(vec!["0".to_string(), "#N/A".into(), "(blank)".into()]));

        let bad = json.replace("\"sum\"", "\"average\"");
        assert!(serde_json::from_str::<PivotSpec>(&bad).is_err());
    }
}
