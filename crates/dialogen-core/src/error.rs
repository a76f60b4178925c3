//! Generation error taxonomy
//!
//! These never abort a run: each is converted to an error-severity
//! feedback event at its point of origin and the run keeps producing
//! whatever partial output it can.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Missing template {0}")]
    MissingTemplate(String),

    #[error("Property {0} has no $entities")]
    MissingEntities(String),

    #[error("Unresolved expression {expression} at {path}")]
    UnresolvedExpression { expression: String, path: String },

    #[error("Missing data in generated {0}")]
    MissingData(String),
}
