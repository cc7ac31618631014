use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use gcloud_storage::client::{Client, ClientConfig};
use gcloud_storage::http::Error as GcsHttpError;
use gcloud_storage::http::buckets::get::GetBucketRequest;
use gcloud_storage::http::buckets::insert::{InsertBucketParam, InsertBucketRequest};
use gcloud_storage::http::objects::download::Range;
use gcloud_storage::http::objects::get::GetObjectRequest;
use gcloud_storage::http::objects::list::ListObjectsRequest;
use gcloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};

use crate::config::GcsConfig;
use crate::storage::{Gateway, ObjectReader, StorageGateway, object_body_channel};
use crate::types::async_callback::AsyncReadWithCallback;
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ObjectKey, ServiceType, TransferStatistics};

const PROJECT_ID_VARIABLE: &str = "GOOGLE_CLOUD_PROJECT";

pub struct GcsGatewayFactory {}

impl GcsGatewayFactory {
    pub async fn create(
        gcs_config: &GcsConfig,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Result<Gateway> {
        let client_config = if let Some(emulator_host) = &gcs_config.storage_emulator_host {
            debug!(endpoint = emulator_host, "using GCS emulator endpoint.");

            ClientConfig {
                storage_endpoint: emulator_endpoint(emulator_host),
                ..ClientConfig::default()
            }
            .anonymous()
        } else {
            ClientConfig::default()
                .with_auth()
                .await
                .map_err(|e| anyhow!("failed to initialize GCS authentication: {e}"))?
        };

        let project_id = gcs_config
            .project_id
            .clone()
            .or_else(|| client_config.project_id.clone());

        Ok(Box::new(GcsGateway {
            client: Arc::new(Client::new(client_config)),
            project_id,
            cancellation_token,
            stats_sender,
        }))
    }
}

#[derive(Clone)]
struct GcsGateway {
    client: Arc<Client>,
    project_id: Option<String>,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

#[async_trait]
impl StorageGateway for GcsGateway {
    fn service(&self) -> ServiceType {
        ServiceType::Gcs
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let result = self
            .client
            .get_bucket(&GetBucketRequest {
                bucket: bucket.to_string(),
                ..Default::default()
            })
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(GcsHttpError::Response(response)) => {
                classify_status(response.code, bucket, &response.message)
            }
            Err(e) => Err(anyhow!(CloneyError::Provider {
                service: ServiceType::Gcs,
                message: e.to_string(),
            })),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let project = self.project_id.clone().ok_or_else(|| {
            anyhow!(CloneyError::MissingCredential {
                service: ServiceType::Gcs,
                variable: PROJECT_ID_VARIABLE.to_string(),
            })
        })?;

        self.client
            .insert_bucket(&InsertBucketRequest {
                name: bucket.to_string(),
                param: InsertBucketParam {
                    project,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .map_err(|e| {
                anyhow!(CloneyError::Provider {
                    service: ServiceType::Gcs,
                    message: e.to_string(),
                })
            })?;

        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            if self.cancellation_token.is_cancelled() {
                trace!("list_objects() canceled.");
                break;
            }

            let response = self
                .client
                .list_objects(&ListObjectsRequest {
                    bucket: bucket.to_string(),
                    page_token: page_token.clone(),
                    ..Default::default()
                })
                .await
                .context("gcloud_storage::client::list_objects() failed.")?;

            if let Some(items) = response.items {
                keys.extend(items.into_iter().map(|object| object.name));
            }

            match response.next_page_token {
                Some(next_page_token) => page_token = Some(next_page_token),
                None => break,
            }
        }

        debug!(
            service = "gcs",
            bucket = bucket,
            count = keys.len(),
            "list_objects() completed."
        );

        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let client = self.client.clone();
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        let (body_sender, reader) = object_body_channel();
        let (opened_sender, opened_receiver) = oneshot::channel();
        tokio::spawn(async move {
            match client
                .download_streamed_object(&request, &Range::default())
                .await
            {
                Ok(stream) => {
                    let _ = opened_sender.send(Ok(()));
                    body_sender.forward(stream).await;
                }
                Err(e) => {
                    let _ = opened_sender.send(Err(e));
                }
            }
        });

        opened_receiver
            .await
            .context("GCS download task has been aborted.")?
            .context("gcloud_storage::client::download_streamed_object() failed.")?;

        Ok(reader)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader,
        content_length: u64,
    ) -> Result<u64> {
        let reader = AsyncReadWithCallback::new(reader, self.stats_sender.clone());
        let mut media = Media::new(key.to_string());
        media.content_length = Some(content_length);

        let object = self
            .client
            .upload_streamed_object(
                &UploadObjectRequest {
                    bucket: bucket.to_string(),
                    ..Default::default()
                },
                ReaderStream::new(reader),
                &UploadType::Simple(media),
            )
            .await
            .context("gcloud_storage::client::upload_streamed_object() failed.")?;

        Ok(u64::try_from(object.size).unwrap_or(content_length))
    }
}

fn emulator_endpoint(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn classify_status(status: u16, bucket: &str, message: &str) -> Result<bool> {
    match status {
        404 => Ok(false),
        401 | 403 => Err(anyhow!(CloneyError::AccessDenied {
            service: ServiceType::Gcs,
            bucket: bucket.to_string(),
        })),
        _ => Err(anyhow!(CloneyError::Provider {
            service: ServiceType::Gcs,
            message: format!("status={status} {message}"),
        })),
    }
}
