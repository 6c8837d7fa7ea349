//! Decoding of validation job output.

use crate::crd::ValidationResponse;
use crate::error::{OperatorError, Result};

/// Decode the verdict from a job's combined output.
///
/// Only the last non-empty line is the result payload; everything before it
/// is free-form logging from the validator.
pub fn decode_validation_output(output: &str) -> Result<ValidationResponse> {
    let line = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| OperatorError::Decode("validation job produced no output".to_string()))?;

    serde_json::from_str(line).map_err(|e| {
        OperatorError::Decode(format!("last output line is not a validation result: {}", e))
    })
}
