//! Report orchestration: extract in, ordered sheet store out.
//!
//! The pipeline holds no business rules of its own. It runs, in order:
//! 1. normalization of the extract into the hidden raw sheet
//! 2. working-sheet preparation (copy, column deletion, relabelling)
//! 3. filter derivation of the configured sheets
//! 4. the configured stages, one at a time
//!
//! # Example
//!
//! ```rust,ignore
//! use tpr_report::parser::parse_file_auto;
//! use tpr_report::transform::dsl::config::{ReferenceData, ReportConfig};
//! use tpr_report::transform::pipeline::{run_report, ReportInputs};
//! use tpr_report::models::RunContext;
//!
//! let inputs = ReportInputs::new(parse_file_auto("extract.csv")?)
//!     .with_auxiliary("inventory", parse_file_auto("qoh.csv")?)
//!     .with_reference(ReferenceData::load("reference.json")?);
//! let output = run_report(&ReportConfig::detail()?, &inputs, &RunContext::now())?;
//! println!("{}", output.summary());
//! ```

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{DimensionLookupError, PipelineError, PipelineResult};
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_success_indent, log_warning};
use crate::models::{Diagnostic, RunContext};
use crate::normalize::{normalize, reconcile_numeric};
use crate::parser::Extract;
use crate::sheet::{Sheet, SheetSnapshot, SheetStore};
use crate::transform::columns::{
    add_columns, add_year_month, append_pivot_labels, backfill_dates, copy_columns, delete_columns,
    fill_flags, prepare_working_sheet, resolve_lookup, write_legend,
};
use crate::transform::dsl::config::{IngestConfig, Placement, ReferenceData, ReportConfig, Stage};
use crate::transform::dsl::executor::derive_sheets;
use crate::transform::formula::apply_formulas;
use crate::transform::pivot::{annotate, PivotSpec, PivotTable};

/// Diagnostics echoed to the log before the rest are summarized.
const LOGGED_DIAGNOSTICS: usize = 3;

/// Everything a run reads.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    /// The planning extract.
    pub extract: Extract,
    /// Auxiliary extracts by input name (e.g. `inventory`).
    pub auxiliary: HashMap<String, Extract>,
    pub reference: ReferenceData,
}

impl ReportInputs {
    pub fn new(extract: Extract) -> Self {
        Self {
            extract,
            auxiliary: HashMap::new(),
            reference: ReferenceData::default(),
        }
    }

    pub fn with_auxiliary(mut self, name: &str, extract: Extract) -> Self {
        self.auxiliary.insert(name.to_string(), extract);
        self
    }

    pub fn with_reference(mut self, reference: ReferenceData) -> Self {
        self.reference = reference;
        self
    }
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub report: String,
    /// Sheets in presentation order
    pub store: SheetStore,
    /// Every non-fatal problem, in the order it was found
    pub diagnostics: Vec<Diagnostic>,
    /// Pivots that could not be built; the rest of the run went on
    pub pivot_failures: Vec<DimensionLookupError>,
}

/// Serializable rendering of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    pub report: String,
    pub sheets: Vec<SheetSnapshot>,
    pub diagnostics: Vec<Diagnostic>,
    pub pivot_failures: Vec<String>,
}

impl ReportOutput {
    pub fn snapshot(&self) -> ReportSnapshot {
        ReportSnapshot {
            report: self.report.clone(),
            sheets: self.store.snapshot(),
            diagnostics: self.diagnostics.clone(),
            pivot_failures: self.pivot_failures.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        format!(
            "Report '{}': {} sheets ({} visible), {} diagnostics, {} failed pivots",
            self.report,
            self.store.len(),
            self.store.visible_names().len(),
            self.diagnostics.len(),
            self.pivot_failures.len()
        )
    }
}

/// Run one report end to end.
///
/// Structural problems (missing field, sheet or column, broken formula map,
/// missing input) abort the run. Cell-level problems are collected as
/// diagnostics; a pivot whose dimension is missing is recorded in
/// `pivot_failures` and the run continues.
pub fn run_report(
    config: &ReportConfig,
    inputs: &ReportInputs,
    ctx: &RunContext,
) -> PipelineResult<ReportOutput> {
    log_info(format!("📊 Building '{}' report", config.name));

    let mut diagnostics = Vec::new();
    let mut store = SheetStore::new();

    log_info("📖 Normalizing extract...");
    let raw = normalize(&inputs.extract, &config.ingest, &config.raw_sheet)?.drain_into(&mut diagnostics);
    log_success(format!(
        "{} rows x {} columns into '{}'",
        raw.height(),
        raw.width(),
        config.raw_sheet
    ));
    store.insert(Sheet::new(config.raw_sheet.clone(), raw))?;

    let labels = match &config.working.header_source {
        Some(name) => Some(
            inputs
                .reference
                .header_row(name)
                .ok_or_else(|| PipelineError::MissingReference(name.clone()))?,
        ),
        None => None,
    };
    prepare_working_sheet(&mut store, &config.raw_sheet, &config.working, labels)?;
    log_success(format!(
        "Working sheet '{}': {} columns",
        config.working.name,
        store.get(&config.working.name)?.table.width()
    ));

    log_info("🔀 Deriving sheets...");
    let derived = derive_sheets(&mut store, &config.working.name, &config.derived, ctx)?;
    for (name, rows) in &derived.sheets {
        log_success_indent(format!("{}: {} rows", name, rows), 1);
    }

    let mut runner = Runner {
        inputs,
        ctx,
        store,
        diagnostics,
        pivot_failures: Vec::new(),
        failed_pivots: HashSet::new(),
    };
    for (i, stage) in config.stages.iter().enumerate() {
        log_info(format!("⚙️  [{}/{}] {}", i + 1, config.stages.len(), stage.describe()));
        runner.apply(stage)?;
    }

    let output = ReportOutput {
        report: config.name.clone(),
        store: runner.store,
        diagnostics: runner.diagnostics,
        pivot_failures: runner.pivot_failures,
    };
    report_diagnostics(&output.diagnostics);
    log_success(output.summary());
    Ok(output)
}

fn report_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    log_warning(format!("{} diagnostics", diagnostics.len()));
    for d in diagnostics.iter().take(LOGGED_DIAGNOSTICS) {
        log_info_indent(d.to_string(), 1);
    }
    if diagnostics.len() > LOGGED_DIAGNOSTICS {
        log_info_indent(format!("... and {} more", diagnostics.len() - LOGGED_DIAGNOSTICS), 1);
    }
}

/// Mutable state threaded through the stages of one run.
struct Runner<'a> {
    inputs: &'a ReportInputs,
    ctx: &'a RunContext,
    store: SheetStore,
    diagnostics: Vec<Diagnostic>,
    pivot_failures: Vec<DimensionLookupError>,
    /// Sheets whose pivot failed to build
    failed_pivots: HashSet<String>,
}

impl Runner<'_> {
    fn apply(&mut self, stage: &Stage) -> PipelineResult<()> {
        match stage {
            Stage::ReconcileNumeric { sheets, only, exclude } => {
                let before = self.diagnostics.len();
                for name in sheets {
                    let sheet = self.store.get_mut(name)?;
                    let found = reconcile_numeric(&mut sheet.table, name, only, exclude);
                    self.diagnostics.extend(found);
                }
                let added = self.diagnostics.len() - before;
                if added > 0 {
                    log_warning(format!("{} cells left as text", added));
                }
            }

            Stage::BackfillDates { sheet, column, sentinel } => {
                let sheet = self.store.get_mut(sheet)?;
                let col = column.resolve(&sheet.table, &sheet.name)?;
                let filled = backfill_dates(&mut sheet.table, col, *sentinel);
                log_success_indent(format!("{} dates set to {}", filled, sentinel), 1);
            }

            Stage::AddColumns { sheet, headers, after, reserve_after } => {
                let sheet = self.store.get_mut(sheet)?;
                let after = match after {
                    Some(c) => Some(c.resolve(&sheet.table, &sheet.name)?),
                    None => None,
                };
                let at = add_columns(sheet, headers, after, reserve_after)?;
                log_success_indent(format!("{} columns inserted at index {}", headers.len(), at), 1);
            }

            Stage::FillFlags { sheet, source, flags } => {
                let sheet = self.store.get_mut(sheet)?;
                let col = source.resolve(&sheet.table, &sheet.name)?;
                let counts = fill_flags(&mut sheet.table, &sheet.name, col, flags, self.ctx)?;
                for (flag, count) in flags.iter().zip(counts) {
                    log_success_indent(format!("{}: {} rows", flag.header, count), 1);
                }
            }

            Stage::DeleteColumns { sheet, columns } => {
                let removed = delete_columns(self.store.get_mut(sheet)?, columns)?;
                log_success_indent(format!("{} columns removed", removed), 1);
            }

            Stage::ImportSheet { input, sheet, before } => {
                let extract = self
                    .inputs
                    .auxiliary
                    .get(input)
                    .ok_or_else(|| PipelineError::MissingInput(input.clone()))?;
                let table = normalize(extract, &IngestConfig::default(), sheet)?
                    .drain_into(&mut self.diagnostics);
                let rows = table.height();
                let imported = Sheet::new(sheet.clone(), table);
                match before {
                    Some(anchor) => self.store.insert_before(imported, anchor)?,
                    None => self.store.insert(imported)?,
                }
                log_success_indent(format!("{}: {} rows", sheet, rows), 1);
            }

            Stage::ResolveLookup { sheet, key, target, table, missing } => {
                let lookup = self
                    .inputs
                    .reference
                    .lookup(table)
                    .ok_or_else(|| PipelineError::MissingReference(table.clone()))?;
                let sheet = self.store.get_mut(sheet)?;
                let key = key.resolve(&sheet.table, &sheet.name)?;
                let target = target.resolve(&sheet.table, &sheet.name)?;
                let misses = resolve_lookup(&mut sheet.table, &sheet.name, key, target, table, lookup, missing)?;
                if !misses.is_empty() {
                    log_warning(format!("{} keys not found in '{}'", misses.len(), table));
                }
                self.diagnostics.extend(misses);
            }

            Stage::CopyColumns { from, to, columns, before, rename } => {
                let width = copy_columns(&mut self.store, from, to, columns, before.as_deref(), rename)?;
                log_success_indent(format!("{}: {} columns", to, width), 1);
            }

            Stage::YearMonth { sheet, date_column, year_header, month_header } => {
                let sheet = self.store.get_mut(sheet)?;
                let col = date_column.resolve(&sheet.table, &sheet.name)?;
                add_year_month(sheet, col, year_header, month_header)?;
            }

            Stage::Pivot(spec) => self.pivot(spec)?,

            Stage::AppendPivotLabels { from_sheet, to_sheet, trailing } => {
                if self.failed_pivots.contains(from_sheet) {
                    log_warning(format!("Skipped: the pivot on '{}' was not built", from_sheet));
                    return Ok(());
                }
                let headers = append_pivot_labels(&mut self.store, from_sheet, to_sheet, trailing)?;
                log_success_indent(format!("Headers: {}", headers.join(", ")), 1);
            }

            Stage::Legend { sheet, from_column } => {
                let sheet = self.store.get_mut(sheet)?;
                let col = from_column.resolve(&sheet.table, &sheet.name)?;
                let at = write_legend(sheet, col);
                log_success_indent(format!("Legend at {}", at.to_a1()), 1);
            }

            Stage::Formulas { sheet, columns } => {
                let result = apply_formulas(self.store.get_mut(sheet)?, columns)?;
                log_success_indent(result.summary(), 1);
            }

            Stage::Place { sheet, position } => match position {
                Placement::Before(anchor) => self.store.move_before(sheet, anchor)?,
                Placement::After(anchor) => self.store.move_after(sheet, anchor)?,
            },
        }
        Ok(())
    }

    fn pivot(&mut self, spec: &PivotSpec) -> PipelineResult<()> {
        let source = self.store.get(&spec.source.sheet)?.table.clone();

        let outcome = match PivotTable::build(&source, spec, self.ctx) {
            Ok(outcome) => outcome,
            Err(e) => {
                log_error(e.to_string());
                self.failed_pivots.insert(spec.sheet.clone());
                self.pivot_failures.push(e);
                return Ok(());
            }
        };
        let pivot = outcome.drain_into(&mut self.diagnostics);
        let groups = pivot.group_count();

        let sheet = self.store.get_mut(&spec.sheet)?;
        sheet.place_pivot(spec.anchor, pivot);
        if let Some(annotation) = &spec.annotation {
            annotate(
                sheet,
                spec.anchor,
                spec.filter_area_height(),
                annotation,
                &source,
                &spec.source.sheet,
            )?;
        }
        log_success_indent(format!("{} groups at {}", groups, spec.anchor.to_a1()), 1);
        Ok(())
    }
}
