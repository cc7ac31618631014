use crate::Config;
use crate::config::args::value_parser::{service, url};
use crate::config::{
    AzureConfig, CLITimeoutConfig, ClientConfig, GcsConfig, OssConfig, RetryConfig, StorageConfig,
    TracingConfig,
};
use crate::types::error::CloneyError;
use crate::types::{
    AccessKeys, AzureConnectionString, ClientConfigLocation, Direction, S3Credentials, ServiceType,
};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::Parser;
use clap::builder::{ArgPredicate, NonEmptyStringValueParser};
use clap_verbosity_flag::{Verbosity, WarnLevel};
#[cfg(feature = "version")]
use shadow_rs::shadow;
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

mod value_parser;

pub const DEFAULT_WORKER_SIZE: u16 = 16;
pub const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_CREATE_DESTINATION_BUCKET: bool = false;
const DEFAULT_FAIL_ON_TRANSFER_ERROR: bool = false;
const DEFAULT_FOLLOW_SYMLINKS: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;

const DOWNLOAD_SOURCE_REQUIRED: &str =
    "with download, --source-service and --source-bucket are required\n";
const UPLOAD_DESTINATION_REQUIRED: &str =
    "with upload, --destination-service and --destination-bucket are required\n";
const DOWNLOAD_WITH_DESTINATION_OPTION: &str =
    "with download, --destination-service/--destination-bucket cannot be specified\n";
const UPLOAD_WITH_SOURCE_OPTION: &str =
    "with upload, --source-service/--source-bucket cannot be specified\n";
const DOWNLOAD_WITH_CREATE_DESTINATION_BUCKET: &str =
    "--create-destination-bucket is only available with upload\n";
const DOWNLOAD_WITH_FOLLOW_SYMLINKS: &str = "--follow-symlinks is only available with upload\n";
const LOCAL_DIR_REQUIRED: &str = "--local-dir is required\n";
const UPLOAD_LOCAL_DIR_NOT_FOUND: &str = "with upload, --local-dir must be an existing directory\n";
const DOWNLOAD_LOCAL_DIR_NOT_DIRECTORY: &str =
    "with download, --local-dir must be a directory or a path that does not exist yet\n";

#[cfg(feature = "version")]
shadow!(build);

#[derive(Parser, Clone, Debug)]
#[cfg_attr(feature = "version", command(version=format!("{} ({} {}), {}", build::PKG_VERSION, build::SHORT_COMMIT, build::BUILD_TARGET, build::RUST_VERSION)))]
pub struct CLIArgs {
    #[arg(env, value_enum, help = "transfer direction", default_value_if("auto_complete_shell", ArgPredicate::IsPresent, "download"), required = false)]
    direction: Direction,

    /// service of the bucket to download from
    #[arg(long, env, value_parser = service::parse_service, value_name = "s3|gcs|azure|oss", help_heading = "General")]
    source_service: Option<ServiceType>,

    /// bucket (or container) to download from
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "General")]
    source_bucket: Option<String>,

    /// service of the bucket to upload to
    #[arg(long, env, value_parser = service::parse_service, value_name = "s3|gcs|azure|oss", help_heading = "General")]
    destination_service: Option<ServiceType>,

    /// bucket (or container) to upload to
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "General")]
    destination_bucket: Option<String>,

    /// create the destination bucket if it does not exist
    #[arg(long, env, default_value_t = DEFAULT_CREATE_DESTINATION_BUCKET, help_heading = "General")]
    create_destination_bucket: bool,

    /// local directory to download into or to upload from
    #[arg(long, env, value_name = "DIR", help_heading = "General")]
    local_dir: Option<PathBuf>,

    /// number of concurrent transfers
    #[arg(long, env, default_value_t = DEFAULT_WORKER_SIZE, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    worker_size: u16,

    /// per-object transfer timeout (milliseconds). The default has no timeout.
    #[arg(long, env, value_name = "transfer_timeout", value_parser = clap::value_parser!(u64).range(1..), help_heading = "Performance")]
    transfer_timeout_milliseconds: Option<u64>,

    /// exit with status 3 when any object failed to transfer
    #[arg(long, env, default_value_t = DEFAULT_FAIL_ON_TRANSFER_ERROR, help_heading = "Advanced")]
    fail_on_transfer_error: bool,

    /// follow symbolic links while walking --local-dir for upload
    #[arg(long, env, default_value_t = DEFAULT_FOLLOW_SYMLINKS, help_heading = "Advanced")]
    follow_symlinks: bool,

    /// location of the file that the AWS CLI uses to store configuration profiles
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_config_file: Option<PathBuf>,

    /// location of the file that the AWS CLI uses to store access keys
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_shared_credentials_file: Option<PathBuf>,

    /// AWS CLI profile
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS Configuration")]
    aws_profile: Option<String>,

    /// AWS region
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS Configuration")]
    aws_region: Option<String>,

    /// S3 endpoint url
    #[arg(long, env, value_parser = url::check_scheme, help_heading = "AWS Configuration")]
    aws_endpoint_url: Option<String>,

    /// force path-style addressing for the S3 endpoint
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS Configuration")]
    aws_force_path_style: bool,

    /// disable stalled stream protection of the AWS SDK
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS Configuration")]
    disable_stalled_stream_protection: bool,

    /// OSS access key id
    #[arg(long, env, hide_env_values = true, help_heading = "OSS Configuration")]
    oss_access_key_id: Option<String>,

    /// OSS access key secret
    #[arg(long, env, hide_env_values = true, help_heading = "OSS Configuration")]
    oss_access_key_secret: Option<String>,

    /// OSS endpoint (e.g. oss-cn-hangzhou.aliyuncs.com)
    #[arg(long, env, value_parser = url::check_host_or_url, help_heading = "OSS Configuration")]
    oss_endpoint: Option<String>,

    /// OSS region. The default is derived from --oss-endpoint.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "OSS Configuration")]
    oss_region: Option<String>,

    /// Azure Storage connection string
    #[arg(long, env, hide_env_values = true, help_heading = "Azure Configuration")]
    azure_storage_connection_string: Option<String>,

    /// Google Cloud project new buckets are created in
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "GCS Configuration")]
    google_cloud_project: Option<String>,

    /// GCS emulator host (e.g. localhost:4443). Authentication is skipped.
    #[arg(long, env, value_parser = url::check_host_or_url, help_heading = "GCS Configuration")]
    storage_emulator_host: Option<String>,

    /// trace verbosity(-v: show info, -vv: show debug, -vvv show trace)
    #[clap(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// show trace as json format
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    json_tracing: bool,

    /// enable provider sdk tracing
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Tracing/Logging")]
    sdk_tracing: bool,

    /// show span event tracing
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Tracing/Logging")]
    span_events_tracing: bool,

    /// disable ANSI terminal colors
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    disable_color_tracing: bool,

    /// maximum retry attempts of the AWS SDK retry handler (S3/OSS)
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, value_name = "max_attempts", help_heading = "Retry Options")]
    aws_max_attempts: u32,

    /// a multiplier value used when calculating backoff times as part of an exponential backoff with jitter strategy.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, value_name = "initial_backoff", help_heading = "Retry Options")]
    initial_backoff_milliseconds: u64,

    /// operation timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_timeout",
        help_heading = "Timeout Options"
    )]
    operation_timeout_milliseconds: Option<u64>,

    /// operation attempt timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_attempt_timeout",
        help_heading = "Timeout Options"
    )]
    operation_attempt_timeout_milliseconds: Option<u64>,

    /// connect timeout (milliseconds).
    /// The default has AWS SDK default timeout (Currently 3100 milliseconds).
    #[arg(
        long,
        env,
        value_name = "connect_timeout",
        help_heading = "Timeout Options"
    )]
    connect_timeout_milliseconds: Option<u64>,

    /// read timeout (milliseconds).
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "read_timeout",
        help_heading = "Timeout Options"
    )]
    read_timeout_milliseconds: Option<u64>,

    /// generate a auto completions script.
    /// Valid choices: bash, fish, zsh, powershell, elvish.
    #[arg(long, env, value_name = "SHELL", value_parser = clap_complete::shells::Shell::from_str, help_heading = "Advanced")]
    auto_complete_shell: Option<clap_complete::shells::Shell>,
}

pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    crate::Config::try_from(config_args)
}

impl CLIArgs {
    fn validate_config(&self) -> Result<(), String> {
        self.check_direction_options()?;
        self.check_download_only_upload_options()?;
        self.check_local_dir()?;

        Ok(())
    }

    fn check_direction_options(&self) -> Result<(), String> {
        match self.direction {
            Direction::Download => {
                if self.source_service.is_none() || self.source_bucket.is_none() {
                    return Err(DOWNLOAD_SOURCE_REQUIRED.to_string());
                }
                if self.destination_service.is_some() || self.destination_bucket.is_some() {
                    return Err(DOWNLOAD_WITH_DESTINATION_OPTION.to_string());
                }
            }
            Direction::Upload => {
                if self.destination_service.is_none() || self.destination_bucket.is_none() {
                    return Err(UPLOAD_DESTINATION_REQUIRED.to_string());
                }
                if self.source_service.is_some() || self.source_bucket.is_some() {
                    return Err(UPLOAD_WITH_SOURCE_OPTION.to_string());
                }
            }
        }

        Ok(())
    }

    fn check_download_only_upload_options(&self) -> Result<(), String> {
        if self.direction != Direction::Download {
            return Ok(());
        }

        if self.create_destination_bucket {
            return Err(DOWNLOAD_WITH_CREATE_DESTINATION_BUCKET.to_string());
        }
        if self.follow_symlinks {
            return Err(DOWNLOAD_WITH_FOLLOW_SYMLINKS.to_string());
        }

        Ok(())
    }

    fn check_local_dir(&self) -> Result<(), String> {
        let Some(local_dir) = &self.local_dir else {
            return Err(LOCAL_DIR_REQUIRED.to_string());
        };

        match self.direction {
            Direction::Upload if !local_dir.is_dir() => {
                Err(UPLOAD_LOCAL_DIR_NOT_FOUND.to_string())
            }
            Direction::Download if local_dir.exists() && !local_dir.is_dir() => {
                Err(DOWNLOAD_LOCAL_DIR_NOT_DIRECTORY.to_string())
            }
            _ => Ok(()),
        }
    }

    fn service_and_bucket(&self) -> (ServiceType, String) {
        // Presence is checked by check_direction_options().
        let (service, bucket) = match self.direction {
            Direction::Download => (self.source_service, self.source_bucket.clone()),
            Direction::Upload => (self.destination_service, self.destination_bucket.clone()),
        };

        (
            service.unwrap_or(ServiceType::S3),
            bucket.unwrap_or_default(),
        )
    }

    fn build_storage_config(&self, service: ServiceType) -> Result<StorageConfig, String> {
        let mut storage_config = StorageConfig::default();

        match service {
            ServiceType::S3 => storage_config.s3 = Some(self.build_s3_client_config()),
            ServiceType::Oss => storage_config.oss = Some(self.build_oss_config()?),
            ServiceType::Azure => {
                let connection_string =
                    required_credential(&self.azure_storage_connection_string, service, "AZURE_STORAGE_CONNECTION_STRING")?;
                storage_config.azure = Some(AzureConfig {
                    connection_string: AzureConnectionString {
                        value: connection_string,
                    },
                });
            }
            ServiceType::Gcs => {
                storage_config.gcs = Some(GcsConfig {
                    project_id: self.google_cloud_project.clone(),
                    storage_emulator_host: self.storage_emulator_host.clone(),
                })
            }
        }

        Ok(storage_config)
    }

    fn build_s3_client_config(&self) -> ClientConfig {
        let credential = if let Some(aws_profile) = self.aws_profile.clone() {
            S3Credentials::Profile(aws_profile)
        } else {
            S3Credentials::FromEnvironment
        };

        ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: self.aws_region.clone(),
            endpoint_url: self.aws_endpoint_url.clone(),
            force_path_style: self.aws_force_path_style,
            retry_config: self.build_retry_config(),
            cli_timeout_config: self.build_cli_timeout_config(),
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        }
    }

    fn build_oss_config(&self) -> Result<OssConfig, String> {
        let access_key =
            required_credential(&self.oss_access_key_id, ServiceType::Oss, "OSS_ACCESS_KEY_ID")?;
        let secret_access_key = required_credential(
            &self.oss_access_key_secret,
            ServiceType::Oss,
            "OSS_ACCESS_KEY_SECRET",
        )?;
        let endpoint = required_credential(&self.oss_endpoint, ServiceType::Oss, "OSS_ENDPOINT")?;

        Ok(OssConfig {
            access_keys: AccessKeys {
                access_key,
                secret_access_key,
                session_token: None,
            },
            endpoint,
            region: self.oss_region.clone(),
            retry_config: self.build_retry_config(),
            cli_timeout_config: self.build_cli_timeout_config(),
        })
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig {
            aws_max_attempts: self.aws_max_attempts,
            initial_backoff_milliseconds: self.initial_backoff_milliseconds,
        }
    }

    fn build_cli_timeout_config(&self) -> CLITimeoutConfig {
        CLITimeoutConfig {
            operation_timeout_milliseconds: self.operation_timeout_milliseconds,
            operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
            connect_timeout_milliseconds: self.connect_timeout_milliseconds,
            read_timeout_milliseconds: self.read_timeout_milliseconds,
        }
    }
}

fn required_credential(
    value: &Option<String>,
    service: ServiceType,
    variable: &str,
) -> Result<String, String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(format!(
            "{}\n",
            CloneyError::MissingCredential {
                service,
                variable: variable.to_string(),
            }
        )),
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(value: CLIArgs) -> Result<Self, Self::Error> {
        let tracing_config = value.verbosity.log_level().map(|log_level| TracingConfig {
            tracing_level: log_level,
            json_tracing: value.json_tracing,
            aws_sdk_tracing: value.sdk_tracing,
            span_events_tracing: value.span_events_tracing,
            disable_color_tracing: value.disable_color_tracing,
        });

        if value.auto_complete_shell.is_some() {
            return Ok(Config {
                auto_complete_shell: value.auto_complete_shell,
                tracing_config,
                ..Config::new(value.direction, ServiceType::S3, "", PathBuf::new())
            });
        }

        value.validate_config()?;

        let (service, bucket) = value.service_and_bucket();
        let storage_config = value.build_storage_config(service)?;

        Ok(Config {
            direction: value.direction,
            service,
            bucket,
            local_dir: value.local_dir.clone().unwrap_or_default(),
            create_destination_bucket: value.create_destination_bucket,
            worker_size: value.worker_size,
            transfer_timeout_milliseconds: value.transfer_timeout_milliseconds,
            fail_on_transfer_error: value.fail_on_transfer_error,
            follow_symlinks: value.follow_symlinks,
            storage_config,
            tracing_config,
            auto_complete_shell: None,
        })
    }
}
