//! # TPR Report - planning extract to multi-sheet report
//!
//! Turns a periodic planning/inventory extract into the TPR detail and
//! summary reports: typed sheets, filter-derived views, computed columns,
//! formula columns and pivots, in presentation order.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Extract   │────▶│   Parser    │────▶│  Normalize  │────▶│ Sheet Store │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │  (typed)    │     │  (ordered)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                     │
//!        derive sheets → add/delete columns → formulas → pivots ◀─────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tpr_report::{parse_file_auto, run_report, ReportConfig, ReportInputs, RunContext};
//!
//! let inputs = ReportInputs::new(parse_file_auto("extract.csv")?);
//! let output = run_report(&ReportConfig::summary()?, &inputs, &RunContext::now())?;
//! println!("{}", output.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Stage-progress logging helpers
//! - [`models`] - Cell values, run context, diagnostics, A1 addressing
//! - [`parser`] - Extract parsing with auto-detection
//! - [`normalize`] - Typing of extract fields
//! - [`sheet`] - Tables, sheets and the ordered sheet store
//! - [`transform`] - Configuration, derivation, columns, formulas, pivots, pipeline
//! - [`validation`] - Configuration schema validation

// Core modules
pub mod error;
pub mod logs;
pub mod models;

// Ingestion
pub mod normalize;
pub mod parser;

// Sheets
pub mod sheet;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AddressError, ConfigError, DimensionLookupError, FormulaAssignmentError, PipelineError,
    SchemaError, SheetError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{CellRef, CellValue, ColumnRef, Diagnostic, Outcome, RunContext, SourceRange};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{detect_delimiter, detect_encoding, parse_bytes_auto, parse_file_auto, parse_str, Extract};

// =============================================================================
// Re-exports - Sheets
// =============================================================================

pub use sheet::{Sheet, SheetSnapshot, SheetStore, Table};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::dsl::{ReferenceData, ReportConfig, Stage};
pub use transform::pipeline::{run_report, ReportInputs, ReportOutput, ReportSnapshot};
pub use transform::pivot::{Aggregation, PivotSpec, PivotTable};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, is_valid_report_config, validate, validate_report_config};
