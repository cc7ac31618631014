use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use futures::FutureExt;
use tracing::{info, trace, warn};

use crate::storage::Gateway;
use crate::storage::local::{LocalStorage, fs_util};
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{TransferOutcome, TransferStatistics, TransferUnit};

/// Pulls units off the shared queue and moves each one, one at a time.
///
/// Every unit received yields exactly one outcome. Errors and panics are contained here and never
/// reach sibling workers.
pub struct TransferWorker {
    worker_index: u16,
    gateway: Gateway,
    receiver: Receiver<TransferUnit>,
    transfer_timeout: Option<Duration>,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

impl TransferWorker {
    pub fn new(
        worker_index: u16,
        gateway: Gateway,
        receiver: Receiver<TransferUnit>,
        transfer_timeout: Option<Duration>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Self {
        Self {
            worker_index,
            gateway,
            receiver,
            transfer_timeout,
            cancellation_token,
            stats_sender,
        }
    }

    pub async fn run(self) -> Vec<TransferOutcome> {
        trace!(worker_index = self.worker_index, "transfer worker has started.");

        let mut outcomes = Vec::new();
        while let Ok(unit) = self.receiver.recv().await {
            outcomes.push(self.transfer_unit(unit).await);
        }

        trace!(
            worker_index = self.worker_index,
            count = outcomes.len(),
            "transfer worker has been completed."
        );

        outcomes
    }

    async fn transfer_unit(&self, unit: TransferUnit) -> TransferOutcome {
        let name = unit.name();

        let result = if self.cancellation_token.is_cancelled() {
            Err(anyhow!(CloneyError::Cancelled))
        } else {
            tokio::select! {
                result = AssertUnwindSafe(self.transfer_with_timeout(&unit)).catch_unwind() => {
                    result.unwrap_or_else(|_| Err(anyhow!("transfer panicked.")))
                },
                _ = self.cancellation_token.cancelled() => {
                    Err(anyhow!(CloneyError::Cancelled))
                }
            }
        };

        match result {
            Ok(bytes) => {
                let _ = self
                    .stats_sender
                    .send(TransferStatistics::TransferComplete { key: name.clone() })
                    .await;

                info!(
                    worker_index = self.worker_index,
                    direction = unit.direction().to_string(),
                    bucket = unit.bucket(),
                    key = name,
                    size = bytes,
                    "transfer completed."
                );

                TransferOutcome::success(unit, self.worker_index, bytes)
            }
            Err(e) => {
                let _ = self
                    .stats_sender
                    .send(TransferStatistics::TransferError { key: name.clone() })
                    .await;

                let error = format!("{e:#}");
                warn!(
                    worker_index = self.worker_index,
                    direction = unit.direction().to_string(),
                    bucket = unit.bucket(),
                    key = name,
                    error = error,
                    "transfer failed."
                );

                TransferOutcome::failure(unit, self.worker_index, error)
            }
        }
    }

    async fn transfer_with_timeout(&self, unit: &TransferUnit) -> Result<u64> {
        let Some(transfer_timeout) = self.transfer_timeout else {
            return self.transfer(unit).await;
        };

        tokio::time::timeout(transfer_timeout, self.transfer(unit))
            .await
            .unwrap_or_else(|_| {
                Err(anyhow!(CloneyError::Timeout {
                    milliseconds: transfer_timeout.as_millis() as u64,
                }))
            })
    }

    async fn transfer(&self, unit: &TransferUnit) -> Result<u64> {
        match unit {
            TransferUnit::Download {
                bucket,
                key,
                dest_root,
            } => {
                // Reject keys that would escape the root before anything is fetched.
                fs_util::to_local_path(dest_root, key)?;

                let local_storage = self.local_storage(dest_root.clone());
                if fs_util::is_key_a_directory(key) {
                    return local_storage
                        .write(key, Box::pin(tokio::io::empty()))
                        .await;
                }

                let reader = self.gateway.get_object(bucket, key).await?;
                local_storage.write(key, reader).await
            }
            TransferUnit::Upload {
                bucket,
                local_path,
                source_root,
            } => {
                let key = fs_util::to_object_key(source_root, local_path)?;

                let (reader, content_length) = self
                    .local_storage(source_root.clone())
                    .open(local_path)
                    .await?;
                self.gateway
                    .put_object(bucket, &key, reader, content_length)
                    .await
            }
        }
    }

    fn local_storage(&self, root: std::path::PathBuf) -> LocalStorage {
        LocalStorage::new(
            root,
            false,
            self.cancellation_token.clone(),
            self.stats_sender.clone(),
        )
    }
}
