use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Error, Result, anyhow};
use async_channel::{Receiver, Sender};
use tracing::{error, info, trace};

use crate::Config;
use crate::storage::{Gateway, GatewayFactory};
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{Direction, TransferReport, TransferStatistics};

pub use bucket_sync::BucketSync;
pub use storage_factory::DefaultGatewayFactory;
pub use transfer_pool::TransferPool;

mod bucket_sync;
mod enumerator;
mod storage_factory;
mod transfer_pool;
mod worker;

/// One invocation: checks the bucket, then runs a [`BucketSync`] in the configured direction.
///
/// Errors that stop the invocation before any transfer (configuration, missing bucket, access
/// denied) are stored and reported by [`Pipeline::has_error`]. Per-unit failures are not errors
/// of the pipeline; they are found in [`Pipeline::get_transfer_report`].
pub struct Pipeline {
    config: Config,
    factory: Arc<dyn GatewayFactory + Send + Sync>,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
    stats_receiver: Receiver<TransferStatistics>,
    has_error: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    transfer_report: Option<TransferReport>,
    ready: bool,
}

impl Pipeline {
    pub fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let factory = Arc::new(DefaultGatewayFactory::new(
            config.storage_config.clone(),
            cancellation_token.clone(),
            stats_sender.clone(),
        ));

        Self::build(config, factory, cancellation_token, stats_sender, stats_receiver)
    }

    /// Uses `factory` instead of the provider settings in `config`.
    pub fn with_gateway_factory(
        config: Config,
        factory: Arc<dyn GatewayFactory + Send + Sync>,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        Self::build(config, factory, cancellation_token, stats_sender, stats_receiver)
    }

    fn build(
        config: Config,
        factory: Arc<dyn GatewayFactory + Send + Sync>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
        stats_receiver: Receiver<TransferStatistics>,
    ) -> Self {
        Self {
            config,
            factory,
            cancellation_token,
            stats_sender,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::<Error>::new())),
            transfer_report: None,
            ready: true,
        }
    }

    pub async fn run(&mut self) {
        if !self.ready {
            panic!("it can be executed only once.")
        }
        self.ready = false;

        trace!(
            direction = self.config.direction.to_string(),
            service = self.config.service.as_str(),
            bucket = self.config.bucket,
            "pipeline has started."
        );

        match self.transfer().await {
            Ok(transfer_report) => self.transfer_report = Some(transfer_report),
            Err(e) => {
                let message = format!("{} failed.", self.config.direction);
                self.print_and_store_error(e, &message);
            }
        }

        self.shutdown();
    }

    async fn transfer(&self) -> Result<TransferReport> {
        let gateway = self.factory.create(self.config.service).await?;
        self.check_bucket(&gateway).await?;

        let bucket_sync = BucketSync::new(
            self.factory.clone(),
            self.cancellation_token.clone(),
            self.stats_sender.clone(),
        )
        .worker_size(self.config.worker_size)
        .transfer_timeout(
            self.config
                .transfer_timeout_milliseconds
                .map(Duration::from_millis),
        )
        .follow_symlinks(self.config.follow_symlinks);

        match self.config.direction {
            Direction::Download => {
                bucket_sync
                    .download_with_gateway(&gateway, &self.config.bucket, &self.config.local_dir)
                    .await
            }
            Direction::Upload => {
                bucket_sync
                    .upload_with_gateway(&gateway, &self.config.bucket, &self.config.local_dir)
                    .await
            }
        }
    }

    async fn check_bucket(&self, gateway: &Gateway) -> Result<()> {
        let service = gateway.service();
        let bucket = &self.config.bucket;

        if gateway.bucket_exists(bucket).await? {
            return Ok(());
        }

        let not_found = anyhow!(CloneyError::BucketNotFound {
            service,
            bucket: bucket.to_string(),
        });

        match self.config.direction {
            Direction::Download => Err(not_found.context("source bucket does not exist.")),
            Direction::Upload => {
                if !self.config.create_destination_bucket {
                    return Err(not_found.context(
                        "destination bucket does not exist. pass --create-destination-bucket to create it.",
                    ));
                }

                gateway
                    .create_bucket(bucket)
                    .await
                    .context("failed to create destination bucket.")?;
                info!(
                    service = service.as_str(),
                    bucket = bucket,
                    "Created {} bucket {}.",
                    service.display_name(),
                    bucket
                );

                Ok(())
            }
        }
    }

    fn shutdown(&self) {
        self.close_stats_sender();
    }

    fn print_and_store_error(&self, e: Error, message: &str) {
        self.has_error.store(true, Ordering::SeqCst);

        let error = format!("{e:#}");
        let source = e.source();
        error!(error = error, source = source, message);

        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(e);
    }

    pub fn get_stats_receiver(&self) -> Receiver<TransferStatistics> {
        self.stats_receiver.clone()
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn get_errors_and_consume(&self) -> Option<Vec<Error>> {
        if !self.has_error() {
            return None;
        }

        let mut errors = self
            .errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Some(errors.drain(..).collect())
    }

    /// Available after a run that passed the pre-flight checks.
    pub fn get_transfer_report(&self) -> Option<&TransferReport> {
        self.transfer_report.as_ref()
    }

    /// True when at least one unit failed.
    pub fn has_transfer_failure(&self) -> bool {
        self.transfer_report
            .as_ref()
            .is_some_and(|transfer_report| transfer_report.has_failure())
    }

    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }
}
