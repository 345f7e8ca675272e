use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    InvalidState,
    Internal,
    Corrupted,
    /// Record value does not fit the declared field type
    SchemaMismatch,
    /// Query string violates the grammar
    Syntax { token: String, position: usize },
    UnknownField,
    /// Storage failure while persisting; safe to retry
    WriteFailure,
    EvaluationTimeout,
    Cancelled,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn schema_mismatch(field: &str, context: impl Into<String>) -> Self {
        Error::new(
            ErrorKind::SchemaMismatch,
            format!("field '{}': {}", field, context.into()),
        )
    }

    pub fn syntax(token: impl Into<String>, position: usize, context: impl Into<String>) -> Self {
        let token = token.into();
        let context = format!("{} at position {} (near '{}')", context.into(), position, token);
        Error::new(ErrorKind::Syntax { token, position }, context)
    }

    pub fn unknown_field(field: &str) -> Self {
        Error::new(ErrorKind::UnknownField, format!("field '{}' is not in the schema", field))
    }

    pub fn corrupted(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Corrupted, context.into())
    }

    /// Re-tag storage errors raised on a write path so callers can retry them.
    pub fn into_write_failure(self) -> Self {
        match self.kind {
            ErrorKind::Io | ErrorKind::Parse | ErrorKind::Internal => Error {
                kind: ErrorKind::WriteFailure,
                context: self.context,
            },
            _ => self,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self.kind, ErrorKind::WriteFailure)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("TOML error: {}", err),
        }
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error {
            kind: ErrorKind::Internal,
            context: format!("FST error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_becomes_write_failure() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.kind, ErrorKind::Io);

        let err = err.into_write_failure();
        assert_eq!(err.kind, ErrorKind::WriteFailure);
        assert!(err.is_retriable());
        assert!(err.context.contains("disk full"));
    }

    #[test]
    fn test_syntax_error_carries_position() {
        let err = Error::syntax(")", 7, "unexpected token");
        match &err.kind {
            ErrorKind::Syntax { token, position } => {
                assert_eq!(token, ")");
                assert_eq!(*position, 7);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("position 7"));
    }

    #[test]
    fn test_schema_mismatch_is_not_rewrapped() {
        let err = Error::schema_mismatch("price", "expected number").into_write_failure();
        assert_eq!(err.kind, ErrorKind::SchemaMismatch);
    }
}
