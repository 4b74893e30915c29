use thiserror::Error;

/// Errors raised by a [`HabitStore`](crate::HabitStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A write targeted a row that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row violates a basic invariant (e.g. negative streak).
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Store connection poisoned")]
    Poisoned,

    /// Backend-specific failure from a non-SQLite implementation.
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
