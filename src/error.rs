use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::client::ClientOperation;

/// Boxed error type carried as the cause of SDK and body failures
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors produced by an object client
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("{operation} returned status {status}: {message}")]
    Service {
        operation: ClientOperation,
        status: u16,
        message: String,
    },

    #[error("{operation} failed: {source}")]
    Sdk {
        operation: ClientOperation,
        #[source]
        source: BoxError,
    },

    #[error("Failed to read object body: {source}")]
    Body {
        #[source]
        source: BoxError,
    },

    #[error("{operation} was dropped before it settled")]
    Cancelled { operation: ClientOperation },

    #[error("Client dispatch queue failed: {0}")]
    Dispatch(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        match self {
            BackendError::NotFound { .. } => true,
            BackendError::Service { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Result type alias for object client calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Main error type for adapter operations
#[derive(Error, Debug)]
pub enum BucketFsError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("{operation} failed for {path}: {source}")]
    Backend {
        operation: ClientOperation,
        path: String,
        #[source]
        source: BackendError,
    },

    #[error("Unexpected status {status} for {path}")]
    UnexpectedStatus { path: String, status: u16 },

    /// The copy half of a rename succeeded but removing the source failed,
    /// so both keys are present in the bucket.
    #[error("Rename of {from} to {to} copied the object but left the source in place: {source}")]
    PartialRename {
        from: String,
        to: String,
        #[source]
        source: Box<BucketFsError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a `BucketFsError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed something the adapter cannot act on
    Argument,
    /// The object client reported a failure
    Backend,
    /// The operation has no meaning for an object store
    Unsupported,
    Io,
    Config,
}

impl BucketFsError {
    /// Wrap a client failure for `operation` on `path`
    pub fn backend(operation: ClientOperation, path: impl Into<String>, source: BackendError) -> Self {
        BucketFsError::Backend {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Rejection used by operations the adapter does not implement
    pub fn not_intended(operation: &str) -> Self {
        BucketFsError::NotSupported(format!(
            "{} is not implemented for object storage, not intended for use",
            operation
        ))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BucketFsError::InvalidArgument(_) => ErrorKind::Argument,
            BucketFsError::NotSupported(_) => ErrorKind::Unsupported,
            BucketFsError::Backend { .. }
            | BucketFsError::UnexpectedStatus { .. }
            | BucketFsError::PartialRename { .. } => ErrorKind::Backend,
            BucketFsError::Io(_) => ErrorKind::Io,
            BucketFsError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            BucketFsError::Backend { source, .. } => source.is_not_found(),
            BucketFsError::UnexpectedStatus { status, .. } => *status == 404,
            BucketFsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<BucketFsError> for io::Error {
    fn from(err: BucketFsError) -> Self {
        let kind = match &err {
            BucketFsError::Io(e) => e.kind(),
            e if e.is_not_found() => io::ErrorKind::NotFound,
            e => match e.kind() {
                ErrorKind::Argument | ErrorKind::Config => io::ErrorKind::InvalidInput,
                ErrorKind::Unsupported => io::ErrorKind::Unsupported,
                ErrorKind::Backend | ErrorKind::Io => io::ErrorKind::Other,
            },
        };
        match err {
            BucketFsError::Io(e) => e,
            err => io::Error::new(kind, err),
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, BucketFsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            BucketFsError::InvalidArgument("mode".into()).kind(),
            ErrorKind::Argument
        );
        assert_eq!(BucketFsError::not_intended("chown").kind(), ErrorKind::Unsupported);
        assert_eq!(
            BucketFsError::UnexpectedStatus {
                path: "a".into(),
                status: 304
            }
            .kind(),
            ErrorKind::Backend
        );
    }

    #[test]
    fn test_backend_error_keeps_cause() {
        let err = BucketFsError::backend(
            ClientOperation::DeleteObject,
            "photos/cat.jpg",
            BackendError::Service {
                operation: ClientOperation::DeleteObject,
                status: 503,
                message: "slow down".into(),
            },
        );

        let source = err.source().expect("cause is preserved");
        assert!(source.to_string().contains("slow down"));
        assert!(err.to_string().contains("photos/cat.jpg"));
    }

    #[test]
    fn test_partial_rename_chain() {
        let delete_failure = BucketFsError::backend(
            ClientOperation::DeleteObject,
            "a",
            BackendError::NotFound { key: "a".into() },
        );
        let err = BucketFsError::PartialRename {
            from: "a".into(),
            to: "b".into(),
            source: Box::new(delete_failure),
        };

        let first = err.source().unwrap();
        let second = first.source().unwrap();
        assert!(second.to_string().contains("Object not found"));
    }

    #[test]
    fn test_into_io_error() {
        let err: io::Error = BucketFsError::not_intended("write").into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let err: io::Error = BucketFsError::backend(
            ClientOperation::GetObject,
            "missing",
            BackendError::NotFound {
                key: "missing".into(),
            },
        )
        .into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
