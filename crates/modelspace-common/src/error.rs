//! The error taxonomy shared by the parser and the engine.
//!
//! [`ModelError`] carries a human readable message per category; callers
//! that only care about the category match on [`ModelError::kind`].

use std::fmt;

use thiserror::Error;

/// Category of a [`ModelError`], cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Name,
    Inheritance,
    Lookup,
    Unsupported,
    Arity,
    Type,
    DeepReference,
    Formula,
    Serialization,
    Restore,
    Stale,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Name => "NameError",
            ErrorKind::Inheritance => "InheritanceError",
            ErrorKind::Lookup => "LookupError",
            ErrorKind::Unsupported => "UnsupportedOperationError",
            ErrorKind::Arity => "ArityError",
            ErrorKind::Type => "TypeError",
            ErrorKind::DeepReference => "DeepReferenceError",
            ErrorKind::Formula => "FormulaError",
            ErrorKind::Serialization => "SerializationError",
            ErrorKind::Restore => "RestoreError",
            ErrorKind::Stale => "StaleHandleError",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Invalid or duplicate name, or assignment to a name that cannot take a scalar.
    #[error("name error: {0}")]
    Name(String),

    /// No consistent linearization exists for the requested bases.
    #[error("inheritance error: {0}")]
    Inheritance(String),

    /// A formula read a name that is not in the namespace.
    #[error("lookup error: '{name}' not found in {scope}")]
    Lookup { name: String, scope: String },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("arity error: {0}")]
    Arity(String),

    #[error("type error: {0}")]
    Type(String),

    /// The formula call stack exceeded the configured depth.
    #[error("formula call stack exceeded {max_depth} frames")]
    DeepReference { max_depth: usize, trace: Vec<String> },

    #[error("formula error at position {position}: {message}")]
    Formula { message: String, position: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("restore error: {0}")]
    Restore(String),

    /// The handle points at a space or cells that has been removed.
    #[error("stale handle: {0}")]
    Stale(String),
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Name(_) => ErrorKind::Name,
            ModelError::Inheritance(_) => ErrorKind::Inheritance,
            ModelError::Lookup { .. } => ErrorKind::Lookup,
            ModelError::Unsupported(_) => ErrorKind::Unsupported,
            ModelError::Arity(_) => ErrorKind::Arity,
            ModelError::Type(_) => ErrorKind::Type,
            ModelError::DeepReference { .. } => ErrorKind::DeepReference,
            ModelError::Formula { .. } => ErrorKind::Formula,
            ModelError::Serialization(_) => ErrorKind::Serialization,
            ModelError::Restore(_) => ErrorKind::Restore,
            ModelError::Stale(_) => ErrorKind::Stale,
        }
    }

    pub fn name(msg: impl Into<String>) -> Self {
        ModelError::Name(msg.into())
    }

    pub fn lookup(name: impl Into<String>, scope: impl Into<String>) -> Self {
        ModelError::Lookup {
            name: name.into(),
            scope: scope.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        ModelError::Unsupported(msg.into())
    }

    pub fn arity(msg: impl Into<String>) -> Self {
        ModelError::Arity(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        ModelError::Type(msg.into())
    }

    pub fn stale(msg: impl Into<String>) -> Self {
        ModelError::Stale(msg.into())
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ModelError::lookup("x", "A").kind(), ErrorKind::Lookup);
        assert_eq!(
            ModelError::lookup("x", "Model1.A").to_string(),
            "lookup error: 'x' not found in Model1.A"
        );
        assert_eq!(ErrorKind::Unsupported.to_string(), "UnsupportedOperationError");
    }
}
