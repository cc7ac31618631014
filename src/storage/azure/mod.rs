use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use azure_core::StatusCode;
use azure_core::error::ErrorKind;
use azure_storage::{CloudLocation, ConnectionString};
use azure_storage_blobs::prelude::{
    BlobBlockType, BlobServiceClient, BlockId, BlockList, ClientBuilder,
};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::config::AzureConfig;
use crate::storage::{Gateway, ObjectReader, StorageGateway, object_body_channel, read_chunk};
use crate::types::async_callback::AsyncReadWithCallback;
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ObjectKey, ServiceType, TransferStatistics};

const ACCESS_DENIED_ERROR_CODES: [&str; 4] = [
    "AuthorizationFailure",
    "AuthenticationFailed",
    "AuthorizationPermissionMismatch",
    "InsufficientAccountPermissions",
];

const DOWNLOAD_CHUNK_SIZE: u64 = 4 * 1024 * 1024;
const MIN_BLOCK_SIZE: u64 = 8 * 1024 * 1024;
// A block blob holds at most this many blocks.
const MAX_BLOCKS: u64 = 50_000;

pub struct AzureGatewayFactory {}

impl AzureGatewayFactory {
    pub async fn create(
        azure_config: &AzureConfig,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Result<Gateway> {
        let blob_service_client = build_blob_service_client(&azure_config.connection_string.value)?;

        Ok(Box::new(AzureGateway {
            blob_service_client,
            cancellation_token,
            stats_sender,
        }))
    }
}

fn build_blob_service_client(connection_string: &str) -> Result<BlobServiceClient> {
    let connection_string = ConnectionString::new(connection_string)
        .map_err(|e| anyhow!("invalid Azure storage connection string: {e}"))?;

    if connection_string.use_development_storage == Some(true) {
        return Ok(ClientBuilder::emulator().blob_service_client());
    }

    let account = connection_string
        .account_name
        .ok_or_else(|| anyhow!("AccountName is missing in the Azure storage connection string."))?
        .to_string();
    let storage_credentials = connection_string
        .storage_credentials()
        .map_err(|e| anyhow!("invalid Azure storage credentials: {e}"))?;

    let client_builder = match connection_string.blob_endpoint {
        Some(blob_endpoint) => ClientBuilder::with_location(
            CloudLocation::Custom {
                account,
                uri: blob_endpoint.trim_end_matches('/').to_string(),
            },
            storage_credentials,
        ),
        None => ClientBuilder::new(account, storage_credentials),
    };

    Ok(client_builder.blob_service_client())
}

#[derive(Clone)]
struct AzureGateway {
    blob_service_client: BlobServiceClient,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

#[async_trait]
impl StorageGateway for AzureGateway {
    fn service(&self) -> ServiceType {
        ServiceType::Azure
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.blob_service_client
            .container_client(bucket)
            .exists()
            .await
            .map_err(|e| convert_error(bucket, &e))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.blob_service_client
            .container_client(bucket)
            .create()
            .await
            .map_err(|e| convert_error(bucket, &e))
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>> {
        let mut keys = Vec::new();
        let mut stream = self
            .blob_service_client
            .container_client(bucket)
            .list_blobs()
            .into_stream();

        while let Some(page) = stream.next().await {
            if self.cancellation_token.is_cancelled() {
                trace!("list_objects() canceled.");
                break;
            }

            let page = page.context("azure_storage_blobs::list_blobs() failed.")?;
            keys.extend(page.blobs.blobs().map(|blob| blob.name.clone()));
        }

        debug!(
            service = "azure",
            bucket = bucket,
            count = keys.len(),
            "list_objects() completed."
        );

        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let blob_client = self
            .blob_service_client
            .container_client(bucket)
            .blob_client(key);

        let (body_sender, reader) = object_body_channel();
        let (opened_sender, opened_receiver) = oneshot::channel();
        tokio::spawn(async move {
            let mut chunks = blob_client
                .get()
                .chunk_size(DOWNLOAD_CHUNK_SIZE)
                .into_stream()
                .then(|response| async move { response?.data.collect().await })
                .boxed();

            match chunks.next().await {
                Some(Err(e)) => {
                    let _ = opened_sender.send(Err(e));
                }
                first => {
                    let _ = opened_sender.send(Ok(()));
                    body_sender
                        .forward(futures::stream::iter(first).chain(chunks))
                        .await;
                }
            }
        });

        opened_receiver
            .await
            .context("Azure download task has been aborted.")?
            .context("azure_storage_blobs::get() failed.")?;

        Ok(reader)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader,
        content_length: u64,
    ) -> Result<u64> {
        let blob_client = self
            .blob_service_client
            .container_client(bucket)
            .blob_client(key);

        let mut reader = AsyncReadWithCallback::new(reader, self.stats_sender.clone());
        let block_size = block_size(content_length);
        let mut blocks = Vec::new();
        let mut size = 0;
        loop {
            let chunk = read_chunk(&mut reader, block_size).await?;
            if chunk.is_empty() {
                break;
            }
            size += chunk.len() as u64;

            let block_id = block_id(blocks.len());
            blob_client
                .put_block(block_id.clone(), chunk)
                .await
                .context("azure_storage_blobs::put_block() failed.")?;
            blocks.push(BlobBlockType::new_uncommitted(block_id));
        }

        if blocks.is_empty() {
            blob_client
                .put_block_blob(Bytes::new())
                .await
                .context("azure_storage_blobs::put_block_blob() failed.")?;
        } else {
            blob_client
                .put_block_list(BlockList { blocks })
                .await
                .context("azure_storage_blobs::put_block_list() failed.")?;
        }

        Ok(size)
    }
}

fn block_size(content_length: u64) -> usize {
    content_length.div_ceil(MAX_BLOCKS).max(MIN_BLOCK_SIZE) as usize
}

// Every block id of a blob must have the same length.
fn block_id(index: usize) -> BlockId {
    BlockId::new(format!("{index:08}"))
}

fn convert_error(bucket: &str, e: &azure_core::Error) -> anyhow::Error {
    if let ErrorKind::HttpResponse { status, error_code } = e.kind() {
        if is_access_denied(*status, error_code.as_deref()) {
            return anyhow!(CloneyError::AccessDenied {
                service: ServiceType::Azure,
                bucket: bucket.to_string(),
            });
        }
    }

    anyhow!(CloneyError::Provider {
        service: ServiceType::Azure,
        message: e.to_string(),
    })
}

fn is_access_denied(status: StatusCode, error_code: Option<&str>) -> bool {
    if status == StatusCode::Forbidden || status == StatusCode::Unauthorized {
        return true;
    }

    error_code.is_some_and(|code| ACCESS_DENIED_ERROR_CODES.contains(&code))
}
