use std::collections::HashMap;
use std::time::Duration;

use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::pipeline::worker::TransferWorker;
use crate::storage::Gateway;
use crate::types::token::PipelineCancellationToken;
use crate::types::{TransferOutcome, TransferStatistics, TransferUnit};

/// Runs a batch of units over a bounded number of concurrent workers.
///
/// At most `worker_size` units are in flight at any instant. The returned outcomes cover every
/// input unit exactly once, in completion order.
pub struct TransferPool {
    worker_size: u16,
    transfer_timeout: Option<Duration>,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

impl TransferPool {
    pub fn new(
        worker_size: u16,
        transfer_timeout: Option<Duration>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Self {
        Self {
            worker_size: worker_size.max(1),
            transfer_timeout,
            cancellation_token,
            stats_sender,
        }
    }

    pub async fn run(&self, gateway: &Gateway, units: Vec<TransferUnit>) -> Vec<TransferOutcome> {
        if units.is_empty() {
            return vec![];
        }

        let number_of_units = units.len();
        let mut outcomes = Vec::with_capacity(number_of_units);

        let (sender, receiver) = async_channel::unbounded();
        for unit in units.iter().cloned() {
            if let Err(e) = sender.try_send(unit) {
                let unit = e.into_inner();
                outcomes.push(TransferOutcome::failure(
                    unit,
                    0,
                    "failed to enqueue transfer unit.".to_string(),
                ));
            }
        }
        // Workers stop once the queue drains.
        drop(sender);

        let number_of_workers = (self.worker_size as usize).min(number_of_units);
        debug!(
            number_of_units = number_of_units,
            number_of_workers = number_of_workers,
            "transfer pool has started."
        );

        let mut join_handles: Vec<JoinHandle<Vec<TransferOutcome>>> =
            Vec::with_capacity(number_of_workers);
        for worker_index in 0..number_of_workers {
            let worker = TransferWorker::new(
                worker_index as u16,
                dyn_clone::clone_box(&**gateway),
                receiver.clone(),
                self.transfer_timeout,
                self.cancellation_token.clone(),
                self.stats_sender.clone(),
            );
            join_handles.push(tokio::spawn(worker.run()));
        }
        drop(receiver);

        let mut has_aborted_worker = false;
        for join_handle in join_handles {
            match join_handle.await {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(e) => {
                    has_aborted_worker = true;
                    error!(error = e.to_string(), "transfer worker has been aborted.");
                }
            }
        }

        if has_aborted_worker {
            let missing = missing_outcomes(&units, &outcomes);
            outcomes.extend(missing);
        }

        debug!(
            number_of_outcomes = outcomes.len(),
            "transfer pool has been completed."
        );

        outcomes
    }
}

/// Failure outcomes for the units in `units` that have no outcome yet.
fn missing_outcomes(units: &[TransferUnit], outcomes: &[TransferOutcome]) -> Vec<TransferOutcome> {
    let mut reported: HashMap<&TransferUnit, usize> = HashMap::new();
    for outcome in outcomes {
        *reported.entry(&outcome.unit).or_default() += 1;
    }

    units
        .iter()
        .filter(|unit| match reported.get_mut(unit) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .map(|unit| {
            TransferOutcome::failure(
                unit.clone(),
                0,
                "transfer worker has been aborted.".to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryGateway;
    use crate::types::ServiceType;
    use crate::types::token::create_pipeline_cancellation_token;
    use std::collections::HashSet;
    use std::path::Path;
    use tracing_subscriber::EnvFilter;

    fn create_pool(worker_size: u16, transfer_timeout: Option<Duration>) -> TransferPool {
        let (stats_sender, _) = async_channel::unbounded();
        TransferPool::new(
            worker_size,
            transfer_timeout,
            create_pipeline_cancellation_token(),
            stats_sender,
        )
    }

    fn download_units(keys: &[String], dest_root: &Path) -> Vec<TransferUnit> {
        keys.iter()
            .map(|key| TransferUnit::Download {
                bucket: "bucket1".to_string(),
                key: key.clone(),
                dest_root: dest_root.to_path_buf(),
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_batch() {
        init_dummy_tracing_subscriber();

        let gateway = InMemoryGateway::new(ServiceType::S3);
        let outcomes = create_pool(16, None).run(&gateway.boxed(), vec![]).await;

        assert!(outcomes.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_unit_has_one_outcome() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::S3);
        let keys: Vec<String> = (0..200).map(|i| format!("dir{}/file{i}", i % 7)).collect();
        for key in &keys {
            gateway.insert_object("bucket1", key, key.as_bytes());
        }

        let outcomes = create_pool(4, None)
            .run(&gateway.boxed(), download_units(&keys, temp_dir.path()))
            .await;

        assert_eq!(outcomes.len(), keys.len());
        assert!(outcomes.iter().all(|outcome| outcome.is_success()));
        assert!(outcomes.iter().all(|outcome| outcome.worker_index < 4));

        let names: HashSet<String> = outcomes.iter().map(|outcome| outcome.unit.name()).collect();
        assert_eq!(names.len(), keys.len());

        for key in &keys {
            assert_eq!(
                std::fs::read(fs_path(temp_dir.path(), key)).unwrap(),
                key.as_bytes()
            );
        }
    }

    #[tokio::test]
    async fn fewer_units_than_workers() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::Gcs);
        let keys = vec!["a".to_string(), "b".to_string()];
        for key in &keys {
            gateway.insert_object("bucket1", key, b"x");
        }

        let outcomes = create_pool(16, None)
            .run(&gateway.boxed(), download_units(&keys, temp_dir.path()))
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| outcome.worker_index < 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failures_do_not_affect_siblings() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::Azure);
        let keys: Vec<String> = (0..20).map(|i| format!("file{i}")).collect();
        for key in &keys {
            gateway.insert_object("bucket1", key, b"data");
        }
        gateway.fail_key("file3");
        gateway.fail_key("file11");

        let outcomes = create_pool(4, None)
            .run(&gateway.boxed(), download_units(&keys, temp_dir.path()))
            .await;

        assert_eq!(outcomes.len(), 20);
        let failed: HashSet<String> = outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| outcome.unit.name())
            .collect();
        assert_eq!(
            failed,
            HashSet::from(["file3".to_string(), "file11".to_string()])
        );
    }

    #[test]
    fn aborted_worker_units_are_reported_as_failures() {
        init_dummy_tracing_subscriber();

        let keys: Vec<String> = ["a", "b", "c", "b"].iter().map(|k| k.to_string()).collect();
        let units = download_units(&keys, Path::new("/tmp/out"));
        let outcomes = vec![
            TransferOutcome::success(units[0].clone(), 1, 10),
            TransferOutcome::failure(units[1].clone(), 2, "access denied".to_string()),
        ];

        let missing = missing_outcomes(&units, &outcomes);

        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].unit.name(), "c");
        assert_eq!(missing[1].unit.name(), "b");
        assert!(missing.iter().all(|outcome| {
            outcome.error() == Some("transfer worker has been aborted.")
        }));

        let mut all_outcomes = outcomes;
        all_outcomes.extend(missing);
        assert!(missing_outcomes(&units, &all_outcomes).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_unit_times_out_alone() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::S3);
        let keys: Vec<String> = (0..5).map(|i| format!("file{i}")).collect();
        for key in &keys {
            gateway.insert_object("bucket1", key, b"data");
        }
        gateway.delay_key("file2", Duration::from_secs(30));

        let outcomes = create_pool(2, Some(Duration::from_millis(200)))
            .run(&gateway.boxed(), download_units(&keys, temp_dir.path()))
            .await;

        assert_eq!(outcomes.len(), 5);
        let failed: Vec<&TransferOutcome> = outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].unit.name(), "file2");
        assert!(failed[0].error().unwrap().contains("timed out"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancellation_reports_remaining_units() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::S3);
        let keys: Vec<String> = (0..10).map(|i| format!("file{i}")).collect();
        for key in &keys {
            gateway.insert_object("bucket1", key, b"data");
            gateway.delay_key(key, Duration::from_secs(30));
        }

        let cancellation_token = create_pipeline_cancellation_token();
        let (stats_sender, _) = async_channel::unbounded();
        let pool = TransferPool::new(2, None, cancellation_token.clone(), stats_sender);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancellation_token.cancel();
        });

        let outcomes = pool
            .run(&gateway.boxed(), download_units(&keys, temp_dir.path()))
            .await;
        canceller.await.unwrap();

        assert_eq!(outcomes.len(), 10);
        assert!(
            outcomes
                .iter()
                .all(|outcome| outcome.error() == Some("cancelled"))
        );
    }

    fn fs_path(root: &Path, key: &str) -> std::path::PathBuf {
        key.split('/').fold(root.to_path_buf(), |path, segment| path.join(segment))
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .or_else(|_| EnvFilter::try_new("dummy=trace"))
                    .unwrap(),
            )
            .try_init();
    }
}
