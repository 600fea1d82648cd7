//! Error taxonomy shared by every engine operation.
//!
//! Each variant maps to one user-actionable failure class; operations never
//! surface a generic fault.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested transition is illegal from the entity's current state.
    /// No mutation has been performed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed input, e.g. an unrecognized enum value or out-of-range
    /// coordinates.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A downstream collaborator (charge gateway) failed. For payments the
    /// failure is recorded on the record before this error is raised.
    #[error("downstream failure: {0}")]
    Downstream(String),
}

impl DispatchError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn downstream(message: impl Into<String>) -> Self {
        Self::Downstream(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_entity() {
        let err = DispatchError::not_found("ride", "abc");
        assert_eq!(err.to_string(), "ride not found: abc");
    }

    #[test]
    fn variants_render_their_class() {
        assert!(DispatchError::invalid_state("x")
            .to_string()
            .starts_with("invalid state"));
        assert!(DispatchError::validation("x")
            .to_string()
            .starts_with("validation failed"));
        assert!(DispatchError::conflict("x").to_string().starts_with("conflict"));
        assert!(DispatchError::downstream("x")
            .to_string()
            .starts_with("downstream failure"));
    }
}
