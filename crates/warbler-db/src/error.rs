use rusqlite::ffi;
use thiserror::Error;

/// Persistence failures, split the way callers need to react to them.
#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE, PRIMARY KEY, FOREIGN KEY or NOT NULL constraint was violated.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A value-domain (CHECK) constraint was violated, e.g. message length.
    #[error("data error: {0}")]
    Data(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl DbError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, DbError::Integrity(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, DbError::Data(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let msg = msg.unwrap_or_else(|| err.to_string());
                match err.extended_code {
                    ffi::SQLITE_CONSTRAINT_CHECK => DbError::Data(msg),
                    _ => DbError::Integrity(msg),
                }
            }
            other => DbError::Sqlite(other),
        }
    }
}
