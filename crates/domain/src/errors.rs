use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Absence of a key is never fatal; callers match on this sentinel.
    #[error("record not found")]
    NotFound,

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("parse error at offset {offset}: {message}")]
    ParseError { offset: usize, message: String },

    #[error("invalid endpoint rule: {0}")]
    InvalidEndpointRule(String),

    #[error("type mismatch on field {field}: {message}")]
    TypeMismatch { field: String, message: String },

    #[error("key {0} resolves outside the storage base directory")]
    PathViolation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid DNS message: {0}")]
    InvalidDnsMessage(String),

    #[error("query timeout")]
    QueryTimeout,

    #[error("shutting down")]
    ShuttingDown,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// True for the not-found sentinel, even after a round of wrapping by
    /// storage layers that preserve it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound)
    }

    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        CoreError::ParseError {
            offset,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::NotFound
        } else {
            CoreError::Io(e.to_string())
        }
    }
}
