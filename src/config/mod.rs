use std::path::PathBuf;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::types::{
    AccessKeys, AzureConnectionString, ClientConfigLocation, Direction, S3Credentials,
    ServiceType,
};

pub mod args;

#[derive(Debug, Clone)]
pub struct Config {
    pub direction: Direction,
    pub service: ServiceType,
    pub bucket: String,
    pub local_dir: PathBuf,
    pub create_destination_bucket: bool,
    pub worker_size: u16,
    pub transfer_timeout_milliseconds: Option<u64>,
    pub fail_on_transfer_error: bool,
    pub follow_symlinks: bool,
    pub storage_config: StorageConfig,
    pub tracing_config: Option<TracingConfig>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

/// Provider settings. Only the entry for the selected service is populated by the CLI.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub s3: Option<ClientConfig>,
    pub oss: Option<OssConfig>,
    pub gcs: Option<GcsConfig>,
    pub azure: Option<AzureConfig>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Alibaba Cloud OSS, reached through its S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OssConfig {
    pub access_keys: AccessKeys,
    pub endpoint: String,
    pub region: Option<String>,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
}

#[derive(Debug, Clone, Default)]
pub struct GcsConfig {
    /// Project new buckets are created in.
    pub project_id: Option<String>,
    /// `host:port` of a local emulator. Authentication is skipped when set.
    pub storage_emulator_host: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub connection_string: AzureConnectionString,
}

#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

impl Config {
    /// Minimal configuration for library use: default pool width, no provider settings.
    pub fn new(direction: Direction, service: ServiceType, bucket: &str, local_dir: PathBuf) -> Self {
        Config {
            direction,
            service,
            bucket: bucket.to_string(),
            local_dir,
            create_destination_bucket: false,
            worker_size: args::DEFAULT_WORKER_SIZE,
            transfer_timeout_milliseconds: None,
            fail_on_transfer_error: false,
            follow_symlinks: false,
            storage_config: StorageConfig::default(),
            tracing_config: None,
            auto_complete_shell: None,
        }
    }
}
