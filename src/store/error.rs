use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Unique(String),

    #[error("row not found")]
    NotFound,

    #[error("transaction serialization failure, retries exhausted")]
    Serialization,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Maps a raw sqlx error from an insert into the Unique/Database split,
    /// recognising Postgres's `23505` (unique_violation) code.
    pub fn from_insert(err: sqlx::Error, constraint_hint: &str) -> StoreError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Unique(constraint_hint.to_string());
            }
        }
        StoreError::Database(err)
    }

    /// True for Postgres serialization/deadlock failures (`40001`, `40P01`),
    /// which the caller should retry up to 3 times per `spec.md` §7.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(sqlx::Error::Database(db_err))
            if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")))
    }
}
