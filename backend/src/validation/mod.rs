//! JSON Schema validation for report configurations.
//!
//! Configuration documents are checked against a JSON Schema (Draft 7)
//! before they are deserialized, so that every structural problem is
//! reported at once instead of stopping at the first serde error.
//!
//! # Embedded Schemas
//!
//! Schemas are embedded at compile time from the `schemas/` directory:
//! - `report-config.json`
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tpr_report::validation::validate_report_config;
//!
//! let config = json!({
//!     "name": "detail",
//!     "working": { "name": "Working" }
//! });
//! assert!(validate_report_config(&config).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

static REPORT_CONFIG_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/report-config.json"))
        .map_err(|e| format!("Invalid embedded schema: {}", e))
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with every violation otherwise
///
/// # Example
/// ```ignore
/// use serde_json::json;
/// use tpr_report::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": {
///         "name": { "type": "string" }
///     }
/// });
///
/// assert!(validate(&schema, &json!({ "name": "detail" })).is_ok());
/// assert!(validate(&schema, &json!({ "stages": [] })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick yes/no check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate against the embedded report configuration schema.
pub fn validate_report_config(data: &Value) -> Result<(), Vec<String>> {
    match REPORT_CONFIG_SCHEMA.as_ref() {
        Ok(schema) => validate(schema, data),
        Err(e) => Err(vec![e.clone()]),
    }
}

/// Quick check against the report configuration schema.
pub fn is_valid_report_config(data: &Value) -> bool {
    validate_report_config(data).is_ok()
}
