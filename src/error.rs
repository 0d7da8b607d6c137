use thiserror::Error;

/// Broad class of a [`FormulaError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The formula text could not be split into tokens.
    Lexical,
    /// The tokens do not form a valid expression.
    Syntax,
    /// The expression is well-formed but could not be evaluated against the record.
    Runtime,
}

/// Failure to compile or evaluate a formula.
///
/// The `Display` output is what rule authors see in the formula tester, so the
/// messages are written for them.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FormulaError {
    // Lexical.
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { found: char, position: usize },

    // Syntax.
    #[error("Empty expression")]
    EmptyExpression,
    #[error("Formula exceeds maximum length of {limit} characters")]
    TooLong { limit: usize },
    #[error("Expression nesting exceeds maximum depth of {limit}")]
    TooDeep { limit: usize },
    #[error("Unmatched '(' at position {position}")]
    UnclosedParen { position: usize },
    #[error("Unmatched ')' at position {position}")]
    UnopenedParen { position: usize },
    #[error("Comparison operators cannot be chained at position {position}; combine comparisons with AND")]
    ChainedComparison { position: usize },
    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("Unexpected end of input at position {position}")]
    UnexpectedEnd { position: usize },

    // Runtime.
    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },
    #[error("{name} expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("Cannot compare {left} with {right} using '{op}'")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

impl FormulaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnterminatedString { .. } | Self::UnexpectedCharacter { .. } => {
                ErrorKind::Lexical
            }
            Self::EmptyExpression
            | Self::TooLong { .. }
            | Self::TooDeep { .. }
            | Self::UnclosedParen { .. }
            | Self::UnopenedParen { .. }
            | Self::ChainedComparison { .. }
            | Self::UnexpectedToken { .. }
            | Self::UnexpectedEnd { .. } => ErrorKind::Syntax,
            Self::UnknownFunction { .. } | Self::Arity { .. } | Self::TypeMismatch { .. } => {
                ErrorKind::Runtime
            }
        }
    }
}

/// Failure to build a [`Record`](crate::Record) from JSON.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record must be a JSON object")]
    NotAnObject,
    #[error("field '{field}' holds a nested value; only scalars are supported")]
    NestedValue { field: String },
    #[error("invalid record JSON")]
    Json(#[from] serde_json::Error),
}

/// Failure to load an [`EvaluatorConfig`](crate::EvaluatorConfig).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = FormulaError::UnknownFunction {
            name: "UNKNOWN_FN".into(),
        };
        assert_eq!(err.to_string(), "Unknown function: UNKNOWN_FN");
        assert_eq!(err.kind(), ErrorKind::Runtime);

        let err = FormulaError::UnterminatedString { position: 7 };
        assert_eq!(err.to_string(), "Unterminated string literal at position 7");
        assert_eq!(err.kind(), ErrorKind::Lexical);
    }

    #[test]
    fn arity_message() {
        let err = FormulaError::Arity {
            name: "LEN".into(),
            expected: "1".into(),
            found: 2,
        };
        assert_eq!(err.to_string(), "LEN expects 1 argument(s), got 2");
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }
}
