use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use zeroize_derive::{Zeroize, ZeroizeOnDrop};

use crate::types::error::CloneyError;

pub mod async_callback;
pub mod error;
pub mod token;

pub const TRANSFER_REPORT_SUMMARY_NAME: &str = "TRANSFER_SUMMARY";

/// Forward-slash separated identifier of an object within a bucket.
pub type ObjectKey = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    S3,
    Gcs,
    Azure,
    Oss,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [
        ServiceType::S3,
        ServiceType::Gcs,
        ServiceType::Azure,
        ServiceType::Oss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::S3 => "s3",
            ServiceType::Gcs => "gcs",
            ServiceType::Azure => "azure",
            ServiceType::Oss => "oss",
        }
    }

    /// Human readable provider name used in operator-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceType::S3 => "S3",
            ServiceType::Gcs => "GCS",
            ServiceType::Azure => "Azure Blob Storage",
            ServiceType::Oss => "OSS",
        }
    }
}

impl FromStr for ServiceType {
    type Err = CloneyError;

    fn from_str(service: &str) -> Result<Self, Self::Err> {
        match service {
            "s3" => Ok(ServiceType::S3),
            "gcs" => Ok(ServiceType::Gcs),
            "azure" => Ok(ServiceType::Azure),
            "oss" => Ok(ServiceType::Oss),
            _ => Err(CloneyError::UnsupportedService(service.to_string())),
        }
    }
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    Download,
    Upload,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

/// One object-level move. Consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransferUnit {
    Download {
        bucket: String,
        key: ObjectKey,
        dest_root: PathBuf,
    },
    Upload {
        bucket: String,
        local_path: PathBuf,
        source_root: PathBuf,
    },
}

impl TransferUnit {
    pub fn bucket(&self) -> &str {
        match self {
            Self::Download { bucket, .. } => bucket,
            Self::Upload { bucket, .. } => bucket,
        }
    }

    /// The object key for downloads, the local path for uploads.
    pub fn name(&self) -> String {
        match self {
            Self::Download { key, .. } => key.clone(),
            Self::Upload { local_path, .. } => local_path.to_string_lossy().to_string(),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Download { .. } => Direction::Download,
            Self::Upload { .. } => Direction::Upload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferResult {
    Success { bytes: u64 },
    Failure { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub unit: TransferUnit,
    pub worker_index: u16,
    pub result: TransferResult,
}

impl TransferOutcome {
    pub fn success(unit: TransferUnit, worker_index: u16, bytes: u64) -> Self {
        Self {
            unit,
            worker_index,
            result: TransferResult::Success { bytes },
        }
    }

    pub fn failure(unit: TransferUnit, worker_index: u16, reason: String) -> Self {
        Self {
            unit,
            worker_index,
            result: TransferResult::Failure { reason },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, TransferResult::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            TransferResult::Failure { reason } => Some(reason),
            TransferResult::Success { .. } => None,
        }
    }

    pub fn bytes(&self) -> u64 {
        match &self.result {
            TransferResult::Success { bytes } => *bytes,
            TransferResult::Failure { .. } => 0,
        }
    }
}

/// Aggregate view of a finished batch.
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub number_of_units: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub transferred_bytes: u64,
    pub duration: Duration,
    pub failures: Vec<TransferOutcome>,
}

impl TransferReport {
    pub fn from_outcomes(outcomes: &[TransferOutcome], duration: Duration) -> Self {
        let mut report = TransferReport {
            number_of_units: outcomes.len() as u64,
            duration,
            ..Default::default()
        };

        for outcome in outcomes {
            if outcome.is_success() {
                report.succeeded += 1;
                report.transferred_bytes += outcome.bytes();
            } else {
                report.failed += 1;
                report.failures.push(outcome.clone());
            }
        }

        report
    }

    pub fn has_failure(&self) -> bool {
        0 < self.failed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferStatistics {
    TransferBytes(u64),
    TransferComplete { key: String },
    TransferError { key: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AzureConnectionString {
    pub value: String,
}

impl Debug for AzureConnectionString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AzureConnectionString");
        keys.field("value", &"** redacted **");
        keys.finish()
    }
}
