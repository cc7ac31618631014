use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use aws_smithy_types::body::SdkBody;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::storage::{
    Gateway, ObjectReader, StorageGateway, convert_to_buf_byte_stream_with_callback,
};
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ObjectKey, ServiceType, TransferStatistics};

mod client_builder;

// Buckets in this region must be created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3GatewayFactory {}

impl S3GatewayFactory {
    pub async fn create(
        client_config: &ClientConfig,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Gateway {
        S3Gateway::boxed_new(
            ServiceType::S3,
            Arc::new(client_config.create_client().await),
            cancellation_token,
            stats_sender,
        )
    }
}

/// Gateway over any endpoint speaking the S3 API.
#[derive(Clone)]
pub(crate) struct S3Gateway {
    service: ServiceType,
    client: Arc<Client>,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

impl S3Gateway {
    pub(crate) fn boxed_new(
        service: ServiceType,
        client: Arc<Client>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Gateway {
        Box::new(S3Gateway {
            service,
            client,
            cancellation_token,
            stats_sender,
        })
    }

    fn build_create_bucket_configuration(&self) -> Option<CreateBucketConfiguration> {
        if self.service != ServiceType::S3 {
            return None;
        }

        let region = self.client.config().region()?.to_string();
        if region == DEFAULT_REGION {
            return None;
        }

        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region.as_str()))
                .build(),
        )
    }
}

#[async_trait]
impl StorageGateway for S3Gateway {
    fn service(&self) -> ServiceType {
        self.service
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let result = self.client.head_bucket().bucket(bucket).send().await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => convert_head_bucket_error(self.service, bucket, e),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(self.build_create_bucket_configuration())
            .send()
            .await
            .map_err(|e| {
                anyhow!(CloneyError::Provider {
                    service: self.service,
                    message: DisplayErrorContext(&e).to_string(),
                })
            })?;

        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;
        loop {
            if self.cancellation_token.is_cancelled() {
                trace!("list_objects() canceled.");
                break;
            }

            let list_objects_output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token)
                .send()
                .await
                .context("aws_sdk_s3::client::list_objects_v2() failed.")?;

            keys.extend(
                list_objects_output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(|key| key.to_string())),
            );

            if !list_objects_output.is_truncated().unwrap_or(false) {
                break;
            }

            continuation_token = list_objects_output
                .next_continuation_token()
                .map(|token| token.to_string());
        }

        let service = self.service.as_str();
        debug!(
            service = service,
            bucket = bucket,
            count = keys.len(),
            "list_objects() completed."
        );

        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let get_object_output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context("aws_sdk_s3::client::get_object() failed.")?;

        Ok(Box::pin(get_object_output.body.into_async_read()))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader,
        content_length: u64,
    ) -> Result<u64> {
        let byte_stream =
            convert_to_buf_byte_stream_with_callback(reader, self.stats_sender.clone());

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(content_length as i64)
            .body(byte_stream)
            .send()
            .await
            .context("aws_sdk_s3::client::put_object() failed.")?;

        Ok(content_length)
    }
}

/// Maps a HeadBucket failure onto not-found (`Ok(false)`), access denied, or a provider error.
pub(crate) fn convert_head_bucket_error(
    service: ServiceType,
    bucket: &str,
    e: SdkError<HeadBucketError, Response<SdkBody>>,
) -> Result<bool> {
    if let SdkError::ServiceError(service_error) = &e {
        let status = service_error.raw().status().as_u16();
        let code = service_error.err().meta().code();

        if status == 404 || code == Some("NoSuchBucket") || service_error.err().is_not_found() {
            return Ok(false);
        }

        if status == 403 || code == Some("AccessDenied") {
            return Err(anyhow!(CloneyError::AccessDenied {
                service,
                bucket: bucket.to_string(),
            }));
        }
    }

    Err(anyhow!(CloneyError::Provider {
        service,
        message: DisplayErrorContext(&e).to_string(),
    }))
}
