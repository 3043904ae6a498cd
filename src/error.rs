//! Error types for Locus

use std::fmt;

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse event batch: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid event batch: {0}")]
    Validation(#[from] ValidationError),

    #[error("Event budget exceeded: {actual} events, limit is {limit}")]
    BudgetExceeded { limit: usize, actual: usize },

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),
}

/// A single malformed field in one input record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Position of the record in the input batch
    pub index: usize,
    /// Offending field name
    pub field: String,
    pub reason: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: `{}` {}", self.index, self.field, self.reason)
    }
}

/// Every field problem found in a batch. A batch with any issue is rejected whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Names of all offending fields, deduplicated, in first-seen order
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for issue in &self.issues {
            if !fields.contains(&issue.field.as_str()) {
                fields.push(issue.field.as_str());
            }
        }
        fields
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_fields_once() {
        let err = ValidationError {
            issues: vec![
                FieldIssue {
                    index: 0,
                    field: "lat".to_string(),
                    reason: "is missing".to_string(),
                },
                FieldIssue {
                    index: 2,
                    field: "lat".to_string(),
                    reason: "must be a number".to_string(),
                },
                FieldIssue {
                    index: 2,
                    field: "user_id".to_string(),
                    reason: "is missing".to_string(),
                },
            ],
        };

        assert_eq!(err.fields(), vec!["lat", "user_id"]);
        assert!(err.to_string().contains("record 2: `lat` must be a number"));
    }

    #[test]
    fn test_compute_error_wraps_validation() {
        let err = ComputeError::from(ValidationError {
            issues: vec![FieldIssue {
                index: 1,
                field: "timestamp".to_string(),
                reason: "is missing".to_string(),
            }],
        });
        assert_eq!(
            err.to_string(),
            "Invalid event batch: record 1: `timestamp` is missing"
        );
    }
}
