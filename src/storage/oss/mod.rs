//! Alibaba Cloud OSS through its S3-compatible API.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_channel::Sender;
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use url::Url;

use crate::config::{ClientConfig, OssConfig};
use crate::storage::Gateway;
use crate::storage::s3::S3Gateway;
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ClientConfigLocation, S3Credentials, ServiceType, TransferStatistics};

const OSS_REGION_PREFIX: &str = "oss-";
const OSS_INTERNAL_SUFFIX: &str = "-internal";

pub struct OssGatewayFactory {}

impl OssGatewayFactory {
    pub async fn create(
        oss_config: &OssConfig,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Result<Gateway> {
        let client_config = oss_config.to_client_config()?;

        Ok(S3Gateway::boxed_new(
            ServiceType::Oss,
            Arc::new(client_config.create_client().await),
            cancellation_token,
            stats_sender,
        ))
    }
}

impl OssConfig {
    pub fn to_client_config(&self) -> Result<ClientConfig> {
        let endpoint_url = normalize_endpoint(&self.endpoint);
        let region = match &self.region {
            Some(region) => region.clone(),
            None => derive_region(&endpoint_url).ok_or_else(|| {
                anyhow!(CloneyError::MissingCredential {
                    service: ServiceType::Oss,
                    variable: "OSS_REGION".to_string(),
                })
            })?,
        };

        Ok(ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: None,
                aws_shared_credentials_file: None,
            },
            credential: S3Credentials::Credentials {
                access_keys: self.access_keys.clone(),
            },
            region: Some(region),
            endpoint_url: Some(endpoint_url),
            // OSS only accepts virtual hosted-style requests.
            force_path_style: false,
            retry_config: self.retry_config.clone(),
            cli_timeout_config: self.cli_timeout_config.clone(),
            disable_stalled_stream_protection: false,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        })
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

/// `https://oss-cn-hangzhou.aliyuncs.com` -> `oss-cn-hangzhou`
fn derive_region(endpoint_url: &str) -> Option<String> {
    let url = Url::parse(endpoint_url).ok()?;
    let first_label = url.host_str()?.split('.').next()?;
    if !first_label.starts_with(OSS_REGION_PREFIX) {
        return None;
    }

    Some(
        first_label
            .strip_suffix(OSS_INTERNAL_SUFFIX)
            .unwrap_or(first_label)
            .to_string(),
    )
}
