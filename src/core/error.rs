use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Archive table '{archive}' does not mirror the columns of '{table}'")]
    SchemaMismatch { table: String, archive: String },

    #[error("Move of {expected} rows from '{from}' to '{to}' affected {actual}")]
    MoveMismatch {
        from: String,
        to: String,
        expected: usize,
        actual: usize,
    },

    #[error("Dependency cycle detected: {0}")]
    CyclicDependency(String),

    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for ArchiveError {
    fn from(err: tokio_postgres::Error) -> Self {
        // SQLSTATE class 23: integrity constraint violation
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code();
            if code.starts_with("23") {
                return Self::ConstraintViolation(db_err.message().to_string());
            }
        }
        Self::Storage(err.to_string())
    }
}
