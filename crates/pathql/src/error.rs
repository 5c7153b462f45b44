//! Error types for pathql

use thiserror::Error;

/// Result type alias for pathql operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while building, planning, rendering or executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// An unqualified attribute could be resolved from more than one FROM root.
    #[error("Ambiguous path '{path}': attribute is available on aliases {}", .candidates.join(", "))]
    AmbiguousPath {
        path: String,
        candidates: Vec<String>,
    },

    /// A CTE type is used as a query source but was never declared.
    #[error("CTE '{0}' is used but was never declared with with()/with_recursive()")]
    UndefinedCte(String),

    /// Bound attributes of a CTE, or of an INSERT target, do not match what
    /// the type requires. `cte` names the CTE or the target type.
    #[error("Attribute mismatch on '{cte}': {}", .attributes.join(", "))]
    CteColumnMismatch { cte: String, attributes: Vec<String> },

    /// Read operation on a modification statement or the other way around.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The target dialect does not support a requested feature.
    #[error("Dialect '{dialect}' does not support {feature}")]
    UnsupportedDialectFeature { dialect: String, feature: String },

    /// An alias is already taken in the current query scope.
    #[error("Alias '{0}' is already in use")]
    AliasCollision(String),

    /// A type name the metamodel does not know.
    #[error("Unknown managed type '{0}'")]
    UnknownType(String),

    /// An attribute path that cannot be resolved on the given type.
    #[error("Unknown attribute '{attribute}' on type '{owner}'")]
    UnknownAttribute { owner: String, attribute: String },

    /// Expression text could not be parsed.
    #[error("Parse error in '{input}': {message}")]
    Parse { input: String, message: String },

    /// A named parameter is referenced but has no value.
    #[error("Parameter ':{0}' is referenced but not bound")]
    UnboundParameter(String),

    /// Invalid page request.
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Config error: {0}")]
    Config(String),

    /// A single-row read returned no rows.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A single-row read returned more rows than expected.
    #[error("Expected {expected} row(s), got {got}")]
    TooManyRows { expected: usize, got: usize },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Error reported by the execution provider.
    #[error("Execution error: {0}")]
    Execution(String),
}

impl QueryError {
    /// Create an unknown attribute error
    pub fn unknown_attribute(owner: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            owner: owner.into(),
            attribute: attribute.into(),
        }
    }

    /// Create a parse error
    pub fn parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported dialect feature error
    pub fn unsupported_feature(dialect: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::UnsupportedDialectFeature {
            dialect: dialect.into(),
            feature: feature.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Check if this error comes from a dialect capability check
    pub fn is_unsupported_feature(&self) -> bool {
        matches!(self, Self::UnsupportedDialectFeature { .. })
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a read/write misuse error
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }
}

impl From<toml::de::Error> for QueryError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
