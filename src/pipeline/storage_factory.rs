use anyhow::{Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::config::args::{DEFAULT_AWS_MAX_ATTEMPTS, DEFAULT_INITIAL_BACKOFF_MILLISECONDS};
use crate::config::{CLITimeoutConfig, ClientConfig, RetryConfig, StorageConfig};
use crate::storage::azure::AzureGatewayFactory;
use crate::storage::gcs::GcsGatewayFactory;
use crate::storage::oss::OssGatewayFactory;
use crate::storage::s3::S3GatewayFactory;
use crate::storage::{Gateway, GatewayFactory};
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ClientConfigLocation, S3Credentials, ServiceType, TransferStatistics};

const AZURE_CONNECTION_STRING_VARIABLE: &str = "AZURE_STORAGE_CONNECTION_STRING";
const OSS_ACCESS_KEY_ID_VARIABLE: &str = "OSS_ACCESS_KEY_ID";

/// Builds the gateway for a service from the provider settings in [`StorageConfig`].
///
/// S3 and GCS fall back to their ambient credential chains when no settings are given. Azure and
/// OSS have no ambient chain, so missing settings are a configuration error.
#[derive(Clone)]
pub struct DefaultGatewayFactory {
    storage_config: StorageConfig,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

impl DefaultGatewayFactory {
    pub fn new(
        storage_config: StorageConfig,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Self {
        Self {
            storage_config,
            cancellation_token,
            stats_sender,
        }
    }
}

#[async_trait]
impl GatewayFactory for DefaultGatewayFactory {
    async fn create(&self, service: ServiceType) -> Result<Gateway> {
        let cancellation_token = self.cancellation_token.clone();
        let stats_sender = self.stats_sender.clone();

        match service {
            ServiceType::S3 => {
                let client_config = self
                    .storage_config
                    .s3
                    .clone()
                    .unwrap_or_else(ambient_s3_client_config);
                Ok(S3GatewayFactory::create(&client_config, cancellation_token, stats_sender).await)
            }
            ServiceType::Gcs => {
                let gcs_config = self.storage_config.gcs.clone().unwrap_or_default();
                GcsGatewayFactory::create(&gcs_config, cancellation_token, stats_sender).await
            }
            ServiceType::Azure => {
                let azure_config = self
                    .storage_config
                    .azure
                    .as_ref()
                    .ok_or_else(|| missing_credential(service, AZURE_CONNECTION_STRING_VARIABLE))?;
                AzureGatewayFactory::create(azure_config, cancellation_token, stats_sender).await
            }
            ServiceType::Oss => {
                let oss_config = self
                    .storage_config
                    .oss
                    .as_ref()
                    .ok_or_else(|| missing_credential(service, OSS_ACCESS_KEY_ID_VARIABLE))?;
                OssGatewayFactory::create(oss_config, cancellation_token, stats_sender).await
            }
        }
    }
}

fn missing_credential(service: ServiceType, variable: &str) -> anyhow::Error {
    anyhow!(CloneyError::MissingCredential {
        service,
        variable: variable.to_string(),
    })
}

fn ambient_s3_client_config() -> ClientConfig {
    ClientConfig {
        client_config_location: ClientConfigLocation {
            aws_config_file: None,
            aws_shared_credentials_file: None,
        },
        credential: S3Credentials::FromEnvironment,
        region: None,
        endpoint_url: None,
        force_path_style: false,
        retry_config: RetryConfig {
            aws_max_attempts: DEFAULT_AWS_MAX_ATTEMPTS,
            initial_backoff_milliseconds: DEFAULT_INITIAL_BACKOFF_MILLISECONDS,
        },
        cli_timeout_config: CLITimeoutConfig {
            operation_timeout_milliseconds: None,
            operation_attempt_timeout_milliseconds: None,
            connect_timeout_milliseconds: None,
            read_timeout_milliseconds: None,
        },
        disable_stalled_stream_protection: false,
        request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
    }
}
