//! Report configuration.
//!
//! A [`ReportConfig`] describes one report variant end to end: how the
//! extract is typed, how the working sheet is prepared, which sheets are
//! derived, and the ordered list of [`Stage`]s applied afterwards.
//!
//! Configurations are plain JSON. Loading goes through three gates, all
//! before any sheet is touched:
//!
//! 1. JSON syntax (`serde_json`)
//! 2. the embedded JSON schema (`schemas/report-config.json`)
//! 3. typed deserialization, which also checks formula templates,
//!    A1 anchors, column letters and range expressions
//!
//! The two production variants are available as [`ReportConfig::detail`]
//! and [`ReportConfig::summary`].

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{column_index, column_letters, ColumnRef};
use crate::transform::pivot::{Aggregation, PivotSpec};
use crate::validation::validate_report_config;

use super::predicate::{Condition, Predicate};

// ============================================================================
// Ingestion
// ============================================================================

/// How raw extract fields are typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Fields that must be present in the extract header.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Fields parsed as dates with `date_format`.
    #[serde(default)]
    pub date_fields: Vec<String>,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Columns kept as literal text (identifiers that only look numeric).
    #[serde(default)]
    pub text_columns: Vec<ColumnRef>,
}

fn default_date_format() -> String {
    "%d/%m/%Y".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            required_fields: Vec::new(),
            date_fields: Vec::new(),
            date_format: default_date_format(),
            text_columns: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Typing rules of the planning extract.
    pub fn planning_extract() -> Self {
        Self {
            required_fields: vec!["txtDueDate".to_string()],
            date_fields: vec!["txtDueDate".to_string()],
            date_format: default_date_format(),
            text_columns: vec![ColumnRef::Number(2), ColumnRef::Number(13)],
        }
    }
}

// ============================================================================
// Sheets
// ============================================================================

/// How the working sheet is prepared from the raw sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingSheet {
    pub name: String,
    /// Reference header row used to relabel the raw layout.
    #[serde(default)]
    pub header_source: Option<String>,
    /// Raw-layout columns removed from the working sheet.
    #[serde(default)]
    pub delete_columns: Vec<ColumnRef>,
}

/// A sheet derived by filtering another sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedSheet {
    pub name: String,
    /// Source sheet; the working sheet when omitted.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub filters: Vec<Predicate>,
}

impl DerivedSheet {
    pub fn new(name: &str, filters: Vec<Predicate>) -> Self {
        Self {
            name: name.to_string(),
            source: None,
            filters,
        }
    }
}

/// A flag column filled with `label` where every condition holds on the
/// source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRule {
    pub header: String,
    #[serde(default = "default_flag_label")]
    pub label: String,
    pub all: Vec<Condition>,
}

fn default_flag_label() -> String {
    "Y".to_string()
}

impl FlagRule {
    pub fn new(header: &str, all: Vec<Condition>) -> Self {
        Self {
            header: header.to_string(),
            label: default_flag_label(),
            all,
        }
    }
}

/// New header for a column of the target sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub column: ColumnRef,
    pub header: String,
}

/// Position of a sheet relative to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Before(String),
    After(String),
}

// ============================================================================
// Formula templates
// ============================================================================

/// Placeholder substituted with the sheet row number.
pub const ROW_PLACEHOLDER: &str = "{row}";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// A formula with a `{row}` placeholder, validated at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormulaTemplate(String);

impl FormulaTemplate {
    pub fn new(template: &str) -> ConfigResult<Self> {
        let invalid = |message: String| ConfigError::InvalidTemplate {
            template: template.to_string(),
            message,
        };

        if !template.starts_with('=') {
            return Err(invalid("formula must start with '='".to_string()));
        }
        let mut has_row = false;
        for caps in PLACEHOLDER.captures_iter(template) {
            match &caps[1] {
                "row" => has_row = true,
                other => return Err(invalid(format!("unknown placeholder '{{{}}}'", other))),
            }
        }
        if !has_row {
            return Err(invalid(format!("missing {} placeholder", ROW_PLACEHOLDER)));
        }
        Ok(Self(template.to_string()))
    }

    /// Formula text for one sheet row.
    pub fn instantiate(&self, row: usize) -> String {
        self.0.replace(ROW_PLACEHOLDER, &row.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FormulaTemplate {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FormulaTemplate::new(&value)
    }
}

impl From<FormulaTemplate> for String {
    fn from(value: FormulaTemplate) -> Self {
        value.0
    }
}

impl fmt::Display for FormulaTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a formula map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaColumn {
    pub column: ColumnRef,
    pub template: FormulaTemplate,
}

// ============================================================================
// Stages
// ============================================================================

fn default_sentinel() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 12, 31).unwrap_or_default()
}

fn default_missing() -> String {
    "#N/A".to_string()
}

/// One step of a report run, applied in order after derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    /// Convert numeric-looking text to numbers.
    ReconcileNumeric {
        sheets: Vec<String>,
        #[serde(default)]
        only: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },

    /// Replace blank dates with a far-future sentinel.
    BackfillDates {
        sheet: String,
        column: ColumnRef,
        #[serde(default = "default_sentinel")]
        sentinel: NaiveDate,
    },

    /// Insert headed columns after the last header, or after `after`.
    AddColumns {
        sheet: String,
        headers: Vec<String>,
        #[serde(default)]
        after: Option<ColumnRef>,
        /// Headers followed by one reserved blank column.
        #[serde(default)]
        reserve_after: Vec<String>,
    },

    /// Fill flag columns from conditions on a source column.
    FillFlags {
        sheet: String,
        source: ColumnRef,
        flags: Vec<FlagRule>,
    },

    DeleteColumns {
        sheet: String,
        columns: Vec<ColumnRef>,
    },

    /// Add an auxiliary extract as a sheet.
    ImportSheet {
        input: String,
        sheet: String,
        #[serde(default)]
        before: Option<String>,
    },

    /// Fill `target` from a reference lookup keyed by `key`.
    ResolveLookup {
        sheet: String,
        key: ColumnRef,
        target: ColumnRef,
        table: String,
        #[serde(default = "default_missing")]
        missing: String,
    },

    /// Create a sheet from selected columns of another.
    CopyColumns {
        from: String,
        to: String,
        columns: Vec<ColumnRef>,
        #[serde(default)]
        before: Option<String>,
        #[serde(default)]
        rename: Vec<ColumnRename>,
    },

    /// Append Year and Month helper columns derived from a date column.
    YearMonth {
        sheet: String,
        date_column: ColumnRef,
        year_header: String,
        month_header: String,
    },

    Pivot(PivotSpec),

    /// Append the visible column items of a sheet's pivot as headers.
    AppendPivotLabels {
        from_sheet: String,
        to_sheet: String,
        #[serde(default)]
        trailing: Vec<String>,
    },

    Legend {
        sheet: String,
        from_column: ColumnRef,
    },

    Formulas {
        sheet: String,
        columns: Vec<FormulaColumn>,
    },

    Place {
        sheet: String,
        position: Placement,
    },
}

impl Stage {
    /// Short name for progress logs.
    pub fn describe(&self) -> String {
        match self {
            Stage::ReconcileNumeric { sheets, .. } => format!("reconcile numbers in {}", sheets.join(", ")),
            Stage::BackfillDates { sheet, column, .. } => format!("backfill {} dates in {}", column, sheet),
            Stage::AddColumns { sheet, headers, .. } => format!("add {} columns to {}", headers.len(), sheet),
            Stage::FillFlags { sheet, flags, .. } => format!("fill {} flags in {}", flags.len(), sheet),
            Stage::DeleteColumns { sheet, columns } => format!("delete {} columns from {}", columns.len(), sheet),
            Stage::ImportSheet { input, sheet, .. } => format!("import '{}' as {}", input, sheet),
            Stage::ResolveLookup { sheet, table, .. } => format!("resolve lookup '{}' in {}", table, sheet),
            Stage::CopyColumns { from, to, .. } => format!("copy columns of {} to {}", from, to),
            Stage::YearMonth { sheet, .. } => format!("year/month columns in {}", sheet),
            Stage::Pivot(spec) => format!("pivot on {}", spec.sheet),
            Stage::AppendPivotLabels { from_sheet, to_sheet, .. } => {
                format!("pivot labels of {} to {}", from_sheet, to_sheet)
            }
            Stage::Legend { sheet, .. } => format!("legend in {}", sheet),
            Stage::Formulas { sheet, columns } => format!("{} formula columns in {}", columns.len(), sheet),
            Stage::Place { sheet, .. } => format!("place {}", sheet),
        }
    }
}

// ============================================================================
// Report configuration
// ============================================================================

fn default_raw_sheet() -> String {
    "Sheet1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub name: String,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Hidden sheet holding the normalized extract.
    #[serde(default = "default_raw_sheet")]
    pub raw_sheet: String,
    pub working: WorkingSheet,
    #[serde(default)]
    pub derived: Vec<DerivedSheet>,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl ReportConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> ConfigResult<Self> {
        validate_report_config(&value).map_err(|errors| ConfigError::Schema { errors })?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Names of auxiliary extracts the stages expect.
    pub fn required_inputs(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::ImportSheet { input, .. } => Some(input.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The detailed TPR report.
    pub fn detail() -> ConfigResult<Self> {
        let mut working_deletions = letters(&["A"]);
        working_deletions.extend(letter_range("C", "J")?);
        working_deletions.extend(letters(&["O", "P"]));
        working_deletions.extend(letter_range("S", "AT")?);
        working_deletions.extend(letters(&["AV"]));
        working_deletions.extend(letter_range("BD", "BJ")?);

        let source = || "Source".to_string();
        let derived = vec![
            DerivedSheet::new(
                "MRP",
                vec![
                    Predicate::new(source(), Condition::contains("MRP")),
                    Predicate::new("Due Date", Condition::YearEquals { year: None }),
                    Predicate::new("Receipts", Condition::NotBlank),
                ],
            ),
            DerivedSheet::new(
                "Schedule",
                vec![
                    Predicate::new(source(), Condition::contains("Job")),
                    Predicate::new("Type", Condition::equals("M")),
                    Predicate::new("Receipts", Condition::NotBlank),
                ],
            ),
            DerivedSheet::new(
                "TPR Inventory",
                vec![Predicate::new(source(), Condition::contains("On-Hand Quantity"))],
            ),
        ];

        let flags = vec![
            FlagRule::new("MRP", vec![Condition::contains("MRP")]),
            FlagRule::new("MO", vec![Condition::starts_with("Job"), Condition::not_contains("MRP")]),
            FlagRule::new("EXPEDITE", vec![Condition::contains("expedite")]),
            FlagRule::new("POSTPONE", vec![Condition::contains("postpone")]),
        ];

        let mut stages = vec![
            Stage::ReconcileNumeric {
                sheets: strings(&["MRP", "Schedule", "TPR Inventory"]),
                only: Vec::new(),
                exclude: strings(&["PartNum", "Class", "Due Date"]),
            },
            Stage::BackfillDates {
                sheet: "Schedule".to_string(),
                column: ColumnRef::header("Due Date"),
                sentinel: default_sentinel(),
            },
            Stage::AddColumns {
                sheet: "Schedule".to_string(),
                headers: strings(&["MRP", "MO", "EXPEDITE", "POSTPONE"]),
                after: None,
                reserve_after: Vec::new(),
            },
            Stage::FillFlags {
                sheet: "Schedule".to_string(),
                source: ColumnRef::header("Source"),
                flags,
            },
            Stage::ImportSheet {
                input: "inventory".to_string(),
                sheet: "Inventory by WH".to_string(),
                before: Some("MRP".to_string()),
            },
            Stage::AddColumns {
                sheet: "Inventory by WH".to_string(),
                headers: strings(&["Area"]),
                after: Some(ColumnRef::letter("E")),
                reserve_after: Vec::new(),
            },
            Stage::ResolveLookup {
                sheet: "Inventory by WH".to_string(),
                key: ColumnRef::letter("E"),
                target: ColumnRef::header("Area"),
                table: "Area".to_string(),
                missing: default_missing(),
            },
            Stage::ReconcileNumeric {
                sheets: strings(&["Inventory by WH"]),
                only: strings(&["On Hand"]),
                exclude: Vec::new(),
            },
            Stage::DeleteColumns {
                sheet: "MRP".to_string(),
                columns: letter_range("L", "P")?,
            },
        ];

        stages.push(builtin_pivot("MRP", "MRP!$A:$K", "O1", |spec| {
            spec.rows(&["Class"])
                .data("PartNum", Aggregation::Count)
                .annotate(ColumnRef::header("PartNum"), ColumnRef::header("Due Date"))
        })?);
        stages.push(Stage::YearMonth {
            sheet: "Schedule".to_string(),
            date_column: ColumnRef::header("Due Date"),
            year_header: "Year".to_string(),
            month_header: "Month".to_string(),
        });
        stages.push(builtin_pivot("Schedule", "Schedule!$A:$V", "X1", |spec| {
            spec.filters(&["Class"])
                .rows(&["Year", "Month", "Due Date"])
                .data("MRP", Aggregation::Count)
                .data("MO", Aggregation::Count)
                .data("EXPEDITE", Aggregation::Count)
                .data("POSTPONE", Aggregation::Count)
                .allow("Class", &["01", "41"])
                .temporal("Year", "Month")
        })?);
        stages.push(Stage::DeleteColumns {
            sheet: "Schedule".to_string(),
            columns: letters(&["U", "V"]),
        });
        stages.push(Stage::Legend {
            sheet: "Schedule".to_string(),
            from_column: ColumnRef::letter("U"),
        });
        stages.push(Stage::DeleteColumns {
            sheet: "Inventory by WH".to_string(),
            columns: letters(&["A"]),
        });
        stages.push(builtin_pivot("Inventory by WH", "'Inventory by WH'!$B:$H", "O1", |spec| {
            spec.rows(&["Part Num"])
                .column("Area")
                .data("On Hand", Aggregation::Sum)
                .hide("Area", &["0", "#N/A", "(blank)"])
        })?);
        stages.push(Stage::AppendPivotLabels {
            from_sheet: "Inventory by WH".to_string(),
            to_sheet: "TPR Inventory".to_string(),
            trailing: strings(&["Delta", "Total", "Delta2"]),
        });
        stages.push(Stage::Formulas {
            sheet: "TPR Inventory".to_string(),
            columns: formula_map(&[
                (17, "=IFERROR(VLOOKUP($A{row}, 'Inventory by WH'!$O:$T,2,FALSE),0)"),
                (18, "=IFERROR(VLOOKUP($A{row}, 'Inventory by WH'!$O:$T,3,FALSE),0)"),
                (19, "=IFERROR(VLOOKUP($A{row}, 'Inventory by WH'!$O:$T,4,FALSE),0)"),
                (20, "=IFERROR(VLOOKUP($A{row}, 'Inventory by WH'!$O:$T,5,FALSE),0)"),
                (21, "=IFERROR(VLOOKUP($A{row}, 'Inventory by WH'!$O:$T,6,FALSE),0)"),
                (22, "=IFERROR(--(U{row}=K{row}), FALSE)"),
                (23, "=SUM(Q{row}:U{row})"),
                (24, "=IFERROR(--(K{row}=W{row}), FALSE)"),
            ])?,
        });

        Ok(Self {
            name: "detail".to_string(),
            ingest: IngestConfig::planning_extract(),
            raw_sheet: default_raw_sheet(),
            working: WorkingSheet {
                name: "Working".to_string(),
                header_source: Some("Header".to_string()),
                delete_columns: working_deletions,
            },
            derived,
            stages,
        })
    }

    /// The TPR summary report.
    pub fn summary() -> ConfigResult<Self> {
        let mut working_deletions = letters(&["A"]);
        working_deletions.extend(letter_range("C", "J")?);
        working_deletions.extend(letters(&["O", "P", "R"]));
        working_deletions.extend(letter_range("T", "Z")?);
        working_deletions.extend(letter_range("AC", "AT")?);
        working_deletions.extend(letter_range("BD", "BJ")?);

        let by_source = |name: &str, condition: Condition| {
            DerivedSheet::new(name, vec![Predicate::new("Source", condition)])
        };
        let derived = vec![
            by_source("OHS", Condition::contains("On-hand")),
            by_source("MO", Condition::starts_with("Job")),
            by_source("SO", Condition::contains("SO:")),
            by_source("PO", Condition::contains("PO:")),
            by_source("Forecast", Condition::contains("Forecast")),
            by_source("Suggestion", Condition::contains("Suggestion")),
        ];

        let mut copied: Vec<ColumnRef> = (1..=7).map(ColumnRef::Number).collect();
        copied.push(ColumnRef::Number(16));

        let stages = vec![
            Stage::CopyColumns {
                from: "OHS".to_string(),
                to: "Summary".to_string(),
                columns: copied,
                before: Some("OHS".to_string()),
                rename: vec![ColumnRename {
                    column: ColumnRef::letter("H"),
                    header: "On-hand Stock".to_string(),
                }],
            },
            Stage::ReconcileNumeric {
                sheets: strings(&["OHS", "MO", "SO", "PO", "Forecast", "Suggestion", "Summary"]),
                only: Vec::new(),
                exclude: strings(&["PartNum", "Class", "Due Date"]),
            },
            Stage::AddColumns {
                sheet: "Summary".to_string(),
                headers: strings(&[
                    "MO",
                    "PO",
                    "SO",
                    "Forecast",
                    "MO Comp",
                    "Available",
                    "Available with MRP",
                    "MRP",
                    "MRP Comp",
                    "Suggestion",
                    "Demand",
                    "Supply",
                ]),
                after: None,
                reserve_after: strings(&["Suggestion"]),
            },
            Stage::Formulas {
                sheet: "Summary".to_string(),
                columns: formula_map(&[
                    (9, r#"=IFERROR(SUMIFS(MO!$N:$N,MO!$A:$A,Summary!$A{row},MO!$L:$L,"<>Job: MRP*"),0)"#),
                    (10, "=IFERROR(SUMIFS(PO!N:N,PO!A:A,Summary!A{row}),0)"),
                    (11, "=IFERROR(SUMIFS(SO!O:O,SO!A:A,Summary!A{row}),0)"),
                    (12, "=IFERROR(SUMIFS(Forecast!O:O,Forecast!A:A,Summary!A{row}),0)"),
                    (13, r#"=IFERROR(SUMIFS(MO!$O:$O,MO!$A:$A,Summary!$A{row},MO!$L:$L,"<>Job: MRP*"),0)"#),
                    (14, "=H{row}+I{row}+J{row}-K{row}-L{row}-M{row}"),
                    (15, "=N{row}+P{row}+R{row}-Q{row}"),
                    (16, r#"=IFERROR(SUMIFS(MO!$N:$N,MO!$A:$A,Summary!$A{row},MO!$L:$L,"=Job: MRP*"),0)"#),
                    (17, r#"=IFERROR(SUMIFS(MO!$O:$O,MO!$A:$A,Summary!$A{row},MO!$L:$L,"=Job: MRP*"),0)"#),
                    (18, "=IFERROR(SUMIFS(Suggestion!N:N,Suggestion!A:A,Summary!A{row}),0)"),
                    (20, "=(K{row}+M{row}+L{row}+Q{row})"),
                    (21, "=H{row}+J{row}"),
                    (22, "=U{row}-T{row}"),
                    (23, "=IF(O{row}>0,TRUE,0)"),
                    (24, r#"=IF(R{row}>0, TRUE, "")"#),
                    (25, "=W{row}=X{row}"),
                ])?,
            },
        ];

        Ok(Self {
            name: "summary".to_string(),
            ingest: IngestConfig::planning_extract(),
            raw_sheet: default_raw_sheet(),
            working: WorkingSheet {
                name: "TPR Working".to_string(),
                header_source: Some("SummaryHeader".to_string()),
                delete_columns: working_deletions,
            },
            derived,
            stages,
        })
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn letters(values: &[&str]) -> Vec<ColumnRef> {
    values.iter().map(|l| ColumnRef::letter(l)).collect()
}

/// Inclusive run of column letters, e.g. `S..=AT`.
fn letter_range(first: &str, last: &str) -> ConfigResult<Vec<ColumnRef>> {
    let (first, last) = (column_index(first)?, column_index(last)?);
    Ok((first..=last)
        .map(|i| ColumnRef::Letter(column_letters(i)))
        .collect())
}

fn formula_map(entries: &[(usize, &str)]) -> ConfigResult<Vec<FormulaColumn>> {
    entries
        .iter()
        .map(|(column, template)| -> ConfigResult<FormulaColumn> {
            Ok(FormulaColumn {
                column: ColumnRef::Number(*column),
                template: FormulaTemplate::new(template)?,
            })
        })
        .collect()
}

fn builtin_pivot(
    sheet: &str,
    source: &str,
    anchor: &str,
    shape: impl FnOnce(PivotSpec) -> PivotSpec,
) -> ConfigResult<Stage> {
    Ok(Stage::Pivot(shape(PivotSpec::new(sheet, source, anchor)?)))
}

// ============================================================================
// Reference data
// ============================================================================

/// Reference document contents: header label rows and lookup tables.
///
/// ```json
/// {
///   "headers": {"Header": ["", "PartNum", "..."]},
///   "lookups": {"Area": {"WH1": "North"}}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub lookups: HashMap<String, HashMap<String, String>>,
}

impl ReferenceData {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn header_row(&self, name: &str) -> Option<&[String]> {
        self.headers.get(name).map(Vec::as_slice)
    }

    pub fn lookup(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.lookups.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_requires_row_placeholder() {
        let t = FormulaTemplate::new("=SUM(Q{row}:U{row})").unwrap();
        assert_eq!(t.instantiate(7), "=SUM(Q7:U7)");

        assert!(matches!(
            FormulaTemplate::new("=SUM(Q2:U2)"),
            Err(ConfigError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            FormulaTemplate::new("=A{row}+B{col}"),
            Err(ConfigError::InvalidTemplate { message, .. }) if message.contains("{col}")
        ));
        assert!(FormulaTemplate::new("SUM(A{row})").is_err());
    }

    #[test]
    fn test_template_keeps_literal_text() {
        let t = FormulaTemplate::new(r#"=IF(R{row}>0, TRUE, "")"#).unwrap();
        assert_eq!(t.instantiate(12), r#"=IF(R12>0, TRUE, "")"#);
    }

    #[test]
    fn test_builtin_formula_maps_are_complete() {
        let formulas = |config: ReportConfig| {
            config
                .stages
                .into_iter()
                .find_map(|s| match s {
                    Stage::Formulas { columns, .. } => Some(columns.len()),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(formulas(ReportConfig::detail().unwrap()), 8);
        assert_eq!(formulas(ReportConfig::summary().unwrap()), 16);
    }

    #[test]
    fn test_builtin_helpers_report_bad_literals() {
        assert_eq!(letter_range("S", "U").unwrap().len(), 3);
        assert!(matches!(letter_range("S", "A1"), Err(ConfigError::Address(_))));
        assert!(matches!(
            formula_map(&[(3, "=A{row}"), (4, "=SUM(A1:A9)")]),
            Err(ConfigError::InvalidTemplate { .. })
        ));
        assert!(builtin_pivot("MRP", "MRP!$A:$K", "not a cell", |spec| spec).is_err());
    }

    #[test]
    fn test_builtin_pivots_present() {
        let pivots: Vec<String> = ReportConfig::detail().unwrap()
            .stages
            .iter()
            .filter_map(|s| match s {
                Stage::Pivot(spec) => Some(spec.sheet.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(pivots, vec!["MRP", "Schedule", "Inventory by WH"]);
    }

    #[test]
    fn test_working_deletions_leave_sixteen_columns() {
        let config = ReportConfig::detail().unwrap();
        let deleted = config.working.delete_columns.len();
        // The planning extract spans A..=BK
        assert_eq!(column_index("BK").unwrap() + 1 - deleted, 16);
        assert_eq!(config.required_inputs(), vec!["inventory"]);

        let summary = ReportConfig::summary().unwrap();
        assert_eq!(column_index("BK").unwrap() + 1 - summary.working.delete_columns.len(), 19);
    }

    #[test]
    fn test_builtin_configs_round_trip_through_schema() {
        for config in [ReportConfig::detail().unwrap(), ReportConfig::summary().unwrap()] {
            let json = config.to_json().unwrap();
            let loaded = ReportConfig::from_json(&json).unwrap();
            assert_eq!(loaded, config);
        }
    }

    #[test]
    fn test_stage_json_form() {
        let stage: Stage = serde_json::from_str(
            r#"{"stage": "backfill_dates", "sheet": "Schedule", "column": {"header": "Due Date"}}"#,
        )
        .unwrap();
        assert_eq!(
            stage,
            Stage::BackfillDates {
                sheet: "Schedule".into(),
                column: ColumnRef::header("Due Date"),
                sentinel: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap(),
            }
        );

        let stage: Stage = serde_json::from_str(
            r#"{"stage": "place", "sheet": "Summary", "position": {"before": "OHS"}}"#,
        )
        .unwrap();
        assert_eq!(
            stage,
            Stage::Place {
                sheet: "Summary".into(),
                position: Placement::Before("OHS".into())
            }
        );
    }

    #[test]
    fn test_schema_errors_are_collected() {
        let err = ReportConfig::from_json(r#"{"name": 3, "stages": [{"stage": "explode"}]}"#).unwrap_err();
        match err {
            ConfigError::Schema { errors } => assert!(errors.len() >= 2, "{:?}", errors),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_bad_template_rejected_at_load() {
        let mut value = serde_json::to_value(ReportConfig::summary().unwrap()).unwrap();
        let stages = value["stages"].as_array_mut().unwrap();
        let formulas = stages.last_mut().unwrap();
        formulas["columns"][0]["template"] = Value::String("=SUM(A1:A9)".into());
        let err = ReportConfig::from_value(value).unwrap_err();
        assert!(err.to_string().contains("{row}"), "{}", err);
    }

    #[test]
    fn test_reference_data() {
        let reference = ReferenceData::from_json(
            r#"{"headers": {"Header": ["A", "B"]}, "lookups": {"Area": {"WH1": "North"}}}"#,
        )
        .unwrap();
        assert_eq!(reference.header_row("Header").unwrap().len(), 2);
        assert_eq!(reference.lookup("Area").unwrap()["WH1"], "North");
        assert!(reference.header_row("SummaryHeader").is_none());
    }
}
