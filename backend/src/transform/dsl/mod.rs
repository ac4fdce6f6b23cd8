//! Declarative report configuration and the filter-derivation engine.
//!
//! - `config`: typed, schema-validated configuration tables
//! - `predicate`: row conditions used by derived sheets and flag rules
//! - `executor`: applies derived-sheet specs to a source sheet
//!
//! ## Usage Flow
//!
//! ```text
//! JSON → validate against schema → ReportConfig → derive_sheets → stages
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tpr_report::transform::dsl::{derive_sheets, ReportConfig};
//!
//! let config = ReportConfig::load("detail.json")?;
//! let result = derive_sheets(&mut store, &config.working.name, &config.derived, &ctx)?;
//! println!("{}", result.summary());
//! ```

pub mod config;
pub mod executor;
pub mod predicate;

// Re-exports for convenience
pub use config::{
    ColumnRename, DerivedSheet, FlagRule, FormulaColumn, FormulaTemplate, IngestConfig, Placement,
    ReferenceData, ReportConfig, Stage, WorkingSheet,
};
pub use executor::{derive_sheets, derive_table, DerivationResult};
pub use predicate::{Condition, Predicate};
