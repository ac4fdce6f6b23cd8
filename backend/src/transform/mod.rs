//! Transformation module.
//!
//! - DSL: configuration, predicates and sheet derivation
//! - Columns: structural column edits and column fills
//! - Formula: per-row formula templates
//! - Pivot: grouping and aggregation
//! - Pipeline: the report orchestrator

pub mod columns;
pub mod dsl;
pub mod formula;
pub mod pipeline;
pub mod pivot;

pub use dsl::*;
pub use formula::{apply_formulas, FormulaResult};
pub use pipeline::{run_report, ReportInputs, ReportOutput, ReportSnapshot};
pub use pivot::{Aggregation, PivotSpec, PivotTable};
