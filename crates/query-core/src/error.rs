use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Unbound parameter: {0}")]
    UnboundParameter(String),

    #[error("Binding mode mismatch: expected {expected} parameter, found {found}")]
    BindingModeMismatch { expected: String, found: String },

    #[error("Shape application error: {0}")]
    ShapeApplication(String),

    #[error("Compile error: {0}")]
    CompileError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl QueryError {
    /// Whether the error came from building a cache identity rather than
    /// from compiling or running the query.
    pub fn is_identity_error(&self) -> bool {
        matches!(
            self,
            QueryError::UnboundParameter(_) | QueryError::BindingModeMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::UnboundParameter(":name".to_string());
        assert_eq!(err.to_string(), "Unbound parameter: :name");

        let err = QueryError::BindingModeMismatch {
            expected: "positional".to_string(),
            found: "named".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Binding mode mismatch: expected positional parameter, found named"
        );
    }

    #[test]
    fn test_identity_errors() {
        assert!(QueryError::UnboundParameter("?1".into()).is_identity_error());
        assert!(!QueryError::ShapeApplication("projection".into()).is_identity_error());
        assert!(!QueryError::ExecutionError("boom".into()).is_identity_error());
    }
}
