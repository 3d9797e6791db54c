//! Error types for the choices pipeline.

/// Result type alias for choices operations.
pub type Result<T> = std::result::Result<T, ChoicesError>;

/// Errors that can occur while building or refreshing a choices widget.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChoicesError {
    /// The repeat binding does not have the `<item> in <collection>` shape.
    ///
    /// Fatal at construction time.
    #[error("Malformed repeat expression '{expression}': {message}")]
    MalformedExpression { expression: String, message: String },

    /// A track-by, disable or group-by expression failed to evaluate for an item.
    ///
    /// Reported per refresh; the widget stays usable.
    #[error("Failed to evaluate '{expression}': {source}")]
    KeyEvaluation {
        expression: String,
        #[source]
        source: EvalError,
    },

    /// The data source or refresh collaborator failed during a refresh.
    #[error("Refresh failed: {0}")]
    RefreshFailure(#[from] SourceError),

    /// A configuration document or attribute could not be applied.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChoicesError {
    /// Create a malformed-expression error.
    pub fn malformed(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a key-evaluation error.
    pub fn key_evaluation(expression: impl Into<String>, source: EvalError) -> Self {
        Self::KeyEvaluation {
            expression: expression.into(),
            source,
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error prevents the widget from being used at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedExpression { .. } | Self::InvalidConfig(_)
        )
    }
}

/// Failure reported by an [`ExpressionEvaluator`](crate::expression::ExpressionEvaluator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    /// Create an evaluation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by a [`DataSource`](crate::source::DataSource) or
/// [`RefreshHandler`](crate::source::RefreshHandler).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    /// Create a source error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = ChoicesError::malformed("person people", "expected '<item> in <collection>'");
        assert_eq!(
            err.to_string(),
            "Malformed repeat expression 'person people': expected '<item> in <collection>'"
        );
        assert!(err.is_fatal());

        let err = ChoicesError::key_evaluation("person.id", EvalError::new("no such field"));
        assert_eq!(err.to_string(), "Failed to evaluate 'person.id': no such field");
        assert!(!err.is_fatal());

        let err: ChoicesError = SourceError::new("backend offline").into();
        assert_eq!(err.to_string(), "Refresh failed: backend offline");
    }
}
