// ⛔ Fatal pipeline errors
// Anything here aborts the run before durable state is touched.
// Recoverable conditions (unmatched names, sentinel cells) are counted, not raised.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input table not found: {}", .0.display())]
    MissingTable(PathBuf),

    #[error("table {table} has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("table {table} is malformed at line {line}: {reason}")]
    MalformedTable {
        table: String,
        line: usize,
        reason: String,
    },

    /// Two alias keys normalize to the same form but point at different targets
    #[error("alias collision: '{first}' and '{second}' normalize to '{normalized}' with different targets")]
    AliasCollision {
        first: String,
        second: String,
        normalized: String,
    },

    /// Alias target that cannot name a record file
    #[error("alias '{name}' points at '{id}', which is not a snake_case identifier")]
    InvalidIdentifier { name: String, id: String },

    #[error("no provenance configured for metric layer '{0}'")]
    UnknownLayer(String),

    #[error("record store error for '{id}': {reason}")]
    Store { id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::MissingColumn {
            table: "population".to_string(),
            column: "COMMUNE_NOM".to_string(),
        };
        assert_eq!(err.to_string(), "table population has no column 'COMMUNE_NOM'");

        let err = PipelineError::MissingTable(PathBuf::from("data/raw/x.csv"));
        assert!(err.to_string().contains("data/raw/x.csv"));
    }
}
