//! Error types for the TPR report pipeline.
//!
//! Each layer owns one error type:
//!
//! - [`SchemaError`] - extract ingestion errors (fatal, before any sheet exists)
//! - [`AddressError`] - malformed A1 column letters, cell references and ranges
//! - [`SheetError`] - structural sheet-store errors (unknown sheet/column, broken anchors)
//! - [`FormulaAssignmentError`] - a formula map could not be applied
//! - [`DimensionLookupError`] - a pivot dimension is missing from its source
//! - [`ConfigError`] - configuration loading and validation errors
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Cell-level problems (coercion failures, aggregation fallbacks) are not
//! errors; see [`crate::models::Diagnostic`].

use thiserror::Error;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while reading and normalizing the source extract.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Failed to read the extract.
    #[error("Failed to read extract: {0}")]
    Io(#[from] std::io::Error),

    /// The extract bytes could not be decoded.
    #[error("Failed to decode extract: {0}")]
    Encoding(String),

    /// The extract could not be tokenized.
    #[error("Invalid extract format at line {line}: {message}")]
    Format { line: usize, message: String },

    /// Empty extract.
    #[error("Extract is empty")]
    EmptyFile,

    /// No header row.
    #[error("No headers found in extract")]
    NoHeaders,

    /// A required field is absent from the header row.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

// =============================================================================
// Addressing Errors
// =============================================================================

/// Errors while parsing A1-style addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Column letters were empty or contained non-letters.
    #[error("Invalid column letters: '{0}'")]
    Column(String),

    /// Column number zero (column numbers are 1-based).
    #[error("Column numbers start at 1")]
    ZeroColumn,

    /// Cell reference could not be parsed.
    #[error("Invalid cell reference: '{0}'")]
    Cell(String),

    /// Range expression could not be parsed.
    #[error("Invalid range: '{0}'")]
    Range(String),
}

// =============================================================================
// Sheet Store Errors
// =============================================================================

/// Structural errors raised by the sheet store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    /// Sheet not found.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// A sheet with this name already exists.
    #[error("Sheet already exists: {0}")]
    DuplicateSheet(String),

    /// Placement anchor sheet not found.
    #[error("Anchor sheet '{anchor}' not found while placing '{sheet}'")]
    AnchorNotFound { sheet: String, anchor: String },

    /// Column not found in a sheet.
    #[error("Column '{column}' not found in sheet '{sheet}'")]
    ColumnNotFound { sheet: String, column: String },

    /// Header already used by another column.
    #[error("Duplicate header '{header}' in sheet '{sheet}'")]
    DuplicateHeader { sheet: String, header: String },

    /// Cell outside the table.
    #[error("Cell (row {row}, column {col}) is outside sheet '{sheet}'")]
    OutOfBounds { sheet: String, row: usize, col: usize },

    /// Column deletion would cut through a placed pivot.
    #[error("Deleting column {column} of '{sheet}' would cut through the pivot at {anchor}")]
    PivotOverlap { sheet: String, column: String, anchor: String },

    /// The sheet carries no pivot.
    #[error("Sheet '{0}' has no pivot table")]
    PivotNotFound(String),

    /// Invalid address in a sheet operation.
    #[error("Address error: {0}")]
    Address(#[from] AddressError),
}

impl SheetError {
    /// Fill in the sheet name on errors raised below the sheet level.
    pub fn in_sheet(self, name: &str) -> Self {
        match self {
            SheetError::ColumnNotFound { sheet, column } if sheet.is_empty() => {
                SheetError::ColumnNotFound { sheet: name.to_string(), column }
            }
            SheetError::DuplicateHeader { sheet, header } if sheet.is_empty() => {
                SheetError::DuplicateHeader { sheet: name.to_string(), header }
            }
            SheetError::OutOfBounds { sheet, row, col } if sheet.is_empty() => {
                SheetError::OutOfBounds { sheet: name.to_string(), row, col }
            }
            other => other,
        }
    }
}

// =============================================================================
// Formula Errors
// =============================================================================

/// A formula template could not be instantiated or assigned.
///
/// Fatal for the whole formula map: no cell of the map is written.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Failed to assign formula in '{sheet}' at row {row}, column {column}: {reason} ({formula})")]
pub struct FormulaAssignmentError {
    pub sheet: String,
    pub row: usize,
    pub column: String,
    pub formula: String,
    pub reason: String,
}

// =============================================================================
// Pivot Errors
// =============================================================================

/// A configured pivot dimension does not exist on the pivot source.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Pivot on '{pivot}': field '{field}' not found in source (available: {})", .available.join(", "))]
pub struct DimensionLookupError {
    pub pivot: String,
    pub field: String,
    pub available: Vec<String>,
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading or validating a report configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON or a value rejected during deserialization.
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema validation failed.
    #[error("Configuration does not match schema: {}", .errors.join("; "))]
    Schema { errors: Vec<String> },

    /// A formula template is malformed.
    #[error("Invalid formula template '{template}': {message}")]
    InvalidTemplate { template: String, message: String },

    /// Bad A1 address in the configuration.
    #[error("Invalid address in configuration: {0}")]
    Address(#[from] AddressError),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run_report`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Extract ingestion failed.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Sheet structure error.
    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    /// Formula map could not be applied.
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaAssignmentError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An auxiliary input named by the configuration was not supplied.
    #[error("Missing input extract: {0}")]
    MissingInput(String),

    /// A reference table named by the configuration was not supplied.
    #[error("Missing reference table: {0}")]
    MissingReference(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for sheet operations.
pub type SheetResult<T> = Result<T, SheetError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let schema_err = SchemaError::MissingField("txtDueDate".into());
        let pipeline_err: PipelineError = schema_err.into();
        assert!(pipeline_err.to_string().contains("txtDueDate"));

        let sheet_err = SheetError::SheetNotFound("MRP".into());
        let pipeline_err: PipelineError = sheet_err.into();
        assert!(pipeline_err.to_string().contains("MRP"));
    }

    #[test]
    fn test_dimension_error_lists_available_fields() {
        let err = DimensionLookupError {
            pivot: "MRP".into(),
            field: "Klass".into(),
            available: vec!["PartNum".into(), "Class".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Klass"));
        assert!(msg.contains("PartNum, Class"));
    }

    #[test]
    fn test_formula_error_format() {
        let err = FormulaAssignmentError {
            sheet: "Summary".into(),
            row: 4,
            column: "{\"header\":\"Nope\"}".into(),
            formula: "=A4".into(),
            reason: "column not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Summary"));
        assert!(msg.contains("row 4"));
        assert!(msg.contains("=A4"));
    }
}
