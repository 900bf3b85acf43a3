use std::fmt;

use thiserror::Error;

/// Malformed upstream data: an offset or clock-time string we cannot read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unrecognized utc_offset format: {raw:?}")]
    Offset { raw: String },

    #[error("utc_offset {raw:?} is outside the +/-14:00 range")]
    OffsetOutOfRange { raw: String },

    #[error("observation time {raw:?} does not match 'HH:MM AM/PM'")]
    ClockTime { raw: String },

    #[error("observation instant out of range for {raw:?}")]
    InstantOutOfRange { raw: String },
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("connection already closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Faults that end an ingestion cycle.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("database not ready after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("weather fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("{operation} failed: {source}")]
    Storage {
        operation: StorageOperation,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Provision,
    Insert,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageOperation::Provision => "schema provisioning",
            StorageOperation::Insert => "insert",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Format,
    Unavailable,
    Fetch,
    Storage,
}

impl IngestError {
    pub fn kind(&self) -> FaultKind {
        match self {
            IngestError::Format(_) => FaultKind::Format,
            IngestError::Unavailable { .. } => FaultKind::Unavailable,
            IngestError::Fetch(_) => FaultKind::Fetch,
            IngestError::Storage { .. } => FaultKind::Storage,
        }
    }

    /// Whether the next scheduled trigger has a chance of succeeding without
    /// anyone fixing data or permissions first.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FaultKind::Unavailable | FaultKind::Fetch)
    }

    pub(crate) fn storage(operation: StorageOperation, source: StoreError) -> Self {
        IngestError::Storage { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_are_not_retryable() {
        let err: IngestError = FormatError::Offset { raw: "banana".into() }.into();

        assert_eq!(err.kind(), FaultKind::Format);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("banana"));
    }

    #[test]
    fn storage_error_names_operation() {
        let err = IngestError::storage(
            StorageOperation::Provision,
            StoreError::Other("permission denied for database".into()),
        );

        assert_eq!(err.kind(), FaultKind::Storage);
        assert_eq!(
            err.to_string(),
            "schema provisioning failed: permission denied for database"
        );
    }
}
