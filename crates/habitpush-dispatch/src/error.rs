use habitpush_store::StoreError;
use thiserror::Error;

/// Errors surfaced to callers that wait on a definitive answer (test sends).
///
/// Scan passes and entity triggers record failures instead of returning them.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
