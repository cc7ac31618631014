use thiserror::Error;

use crate::types::ServiceType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloneyError {
    #[error("unsupported service: {0}, did you mean s3, gcs, azure or oss?")]
    UnsupportedService(String),
    #[error("{variable} must be set as an environment variable for {service}.")]
    MissingCredential {
        service: ServiceType,
        variable: String,
    },
    #[error(
        "{} bucket {bucket} not found.",
        .service.display_name()
    )]
    BucketNotFound { service: ServiceType, bucket: String },
    #[error(
        "access denied to {} bucket {bucket}. check your permissions.",
        .service.display_name()
    )]
    AccessDenied { service: ServiceType, bucket: String },
    #[error("{} error: {message}", .service.display_name())]
    Provider {
        service: ServiceType,
        message: String,
    },
    #[error("a object references a parent directory. key={key}")]
    DirectoryTraversal { key: String },
    #[error("invalid object key. key={key:?}")]
    InvalidObjectKey { key: String },
    #[error("path is not under the local root. path={path}")]
    PathOutsideRoot { path: String },
    #[error("cancelled")]
    Cancelled,
    #[error("transfer timed out after {milliseconds} milliseconds")]
    Timeout { milliseconds: u64 },
}

impl CloneyError {
    /// Errors that abort an invocation before any transfer starts.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CloneyError::UnsupportedService(_) | CloneyError::MissingCredential { .. }
        )
    }
}
