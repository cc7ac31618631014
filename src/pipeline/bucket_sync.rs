use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_channel::Sender;
use tracing::info;

use crate::config::args::DEFAULT_WORKER_SIZE;
use crate::pipeline::enumerator::{enumerate_downloads, enumerate_uploads};
use crate::pipeline::transfer_pool::TransferPool;
use crate::storage::local::LocalStorage;
use crate::storage::{Gateway, GatewayFactory};
use crate::types::token::PipelineCancellationToken;
use crate::types::{
    Direction, ServiceType, TRANSFER_REPORT_SUMMARY_NAME, TransferReport, TransferStatistics,
    TransferUnit,
};

/// Moves a whole bucket to local disk or a whole local tree to a bucket.
///
/// The service tag is resolved once per call, before anything else happens, so an unknown tag
/// fails with [`crate::types::error::CloneyError::UnsupportedService`] and zero transfers.
/// Per-unit failures never fail the call; they are counted in the returned [`TransferReport`].
#[derive(Clone)]
pub struct BucketSync {
    factory: Arc<dyn GatewayFactory + Send + Sync>,
    worker_size: u16,
    transfer_timeout: Option<Duration>,
    follow_symlinks: bool,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

impl BucketSync {
    pub fn new(
        factory: Arc<dyn GatewayFactory + Send + Sync>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Self {
        Self {
            factory,
            worker_size: DEFAULT_WORKER_SIZE,
            transfer_timeout: None,
            follow_symlinks: false,
            cancellation_token,
            stats_sender,
        }
    }

    pub fn worker_size(mut self, worker_size: u16) -> Self {
        self.worker_size = worker_size;
        self
    }

    pub fn transfer_timeout(mut self, transfer_timeout: Option<Duration>) -> Self {
        self.transfer_timeout = transfer_timeout;
        self
    }

    pub fn follow_symlinks(mut self, follow_symlinks: bool) -> Self {
        self.follow_symlinks = follow_symlinks;
        self
    }

    pub async fn download(
        &self,
        service: &str,
        bucket: &str,
        local_root: &Path,
    ) -> Result<TransferReport> {
        let service = ServiceType::from_str(service)?;
        let gateway = self.factory.create(service).await?;

        self.download_with_gateway(&gateway, bucket, local_root)
            .await
    }

    pub async fn upload(
        &self,
        service: &str,
        bucket: &str,
        local_root: &Path,
    ) -> Result<TransferReport> {
        let service = ServiceType::from_str(service)?;
        let gateway = self.factory.create(service).await?;

        self.upload_with_gateway(&gateway, bucket, local_root).await
    }

    pub(crate) async fn download_with_gateway(
        &self,
        gateway: &Gateway,
        bucket: &str,
        local_root: &Path,
    ) -> Result<TransferReport> {
        let start_time = Instant::now();

        let units = enumerate_downloads(gateway, bucket, local_root).await?;
        let report = self.transfer(gateway, units, start_time).await;
        log_report(Direction::Download, gateway.service(), bucket, local_root, &report);

        Ok(report)
    }

    pub(crate) async fn upload_with_gateway(
        &self,
        gateway: &Gateway,
        bucket: &str,
        local_root: &Path,
    ) -> Result<TransferReport> {
        let start_time = Instant::now();

        let local_storage = LocalStorage::new(
            local_root.to_path_buf(),
            self.follow_symlinks,
            self.cancellation_token.clone(),
            self.stats_sender.clone(),
        );
        let units = enumerate_uploads(&local_storage, bucket).await?;
        let report = self.transfer(gateway, units, start_time).await;
        log_report(Direction::Upload, gateway.service(), bucket, local_root, &report);

        Ok(report)
    }

    async fn transfer(
        &self,
        gateway: &Gateway,
        units: Vec<TransferUnit>,
        start_time: Instant,
    ) -> TransferReport {
        let pool = TransferPool::new(
            self.worker_size,
            self.transfer_timeout,
            self.cancellation_token.clone(),
            self.stats_sender.clone(),
        );
        let outcomes = pool.run(gateway, units).await;

        TransferReport::from_outcomes(&outcomes, start_time.elapsed())
    }
}

fn log_report(
    direction: Direction,
    service: ServiceType,
    bucket: &str,
    local_root: &Path,
    report: &TransferReport,
) {
    info!(
        name = TRANSFER_REPORT_SUMMARY_NAME,
        direction = direction.to_string(),
        service = service.as_str(),
        bucket = bucket,
        local_dir = local_root.to_string_lossy().to_string(),
        number_of_units = report.number_of_units,
        succeeded = report.succeeded,
        failed = report.failed,
        transferred_bytes = report.transferred_bytes,
        duration_sec = report.duration.as_secs_f32(),
        "{direction} completed."
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryGateway, InMemoryGatewayFactory};
    use crate::types::error::CloneyError;
    use crate::types::token::create_pipeline_cancellation_token;
    use tracing_subscriber::EnvFilter;

    fn create_bucket_sync(gateway: &InMemoryGateway) -> BucketSync {
        let (stats_sender, _) = async_channel::unbounded();
        BucketSync::new(
            Arc::new(InMemoryGatewayFactory::new(gateway.clone())),
            create_pipeline_cancellation_token(),
            stats_sender,
        )
    }

    #[tokio::test]
    async fn download_bucket() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::S3);
        gateway.insert_object("mybucket", "a.txt", b"alpha");
        gateway.insert_object("mybucket", "dir/b.txt", b"bravo");

        // The destination root does not exist yet.
        let out = temp_dir.path().join("tmp").join("out");
        let report = create_bucket_sync(&gateway)
            .download("s3", "mybucket", &out)
            .await
            .unwrap();

        assert_eq!(report.number_of_units, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.transferred_bytes, 10);
        assert!(!report.has_failure());
        assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(
            std::fs::read(out.join("dir").join("b.txt")).unwrap(),
            b"bravo"
        );
    }

    #[tokio::test]
    async fn upload_tree() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("in");
        std::fs::create_dir_all(source.join("y")).unwrap();
        std::fs::write(source.join("x.bin"), b"x-content").unwrap();
        std::fs::write(source.join("y").join("z.bin"), b"z-content").unwrap();

        let gateway = InMemoryGateway::new(ServiceType::Gcs);
        gateway.insert_bucket("mybucket");

        let report = create_bucket_sync(&gateway)
            .worker_size(1)
            .upload("gcs", "mybucket", &source)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(
            gateway.keys("mybucket"),
            vec!["x.bin".to_string(), "y/z.bin".to_string()]
        );
        assert_eq!(gateway.object("mybucket", "x.bin").unwrap(), b"x-content");
        assert_eq!(gateway.object("mybucket", "y/z.bin").unwrap(), b"z-content");
    }

    #[tokio::test]
    #[cfg(target_family = "unix")]
    async fn upload_symlinked_file() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("in");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("x.bin"), b"x-content").unwrap();
        std::fs::write(temp_dir.path().join("outside.bin"), b"outside-content").unwrap();
        std::os::unix::fs::symlink("../outside.bin", source.join("link.bin")).unwrap();

        let gateway = InMemoryGateway::new(ServiceType::S3);
        gateway.insert_bucket("mybucket");

        let report = create_bucket_sync(&gateway)
            .upload("s3", "mybucket", &source)
            .await
            .unwrap();

        assert_eq!(report.number_of_units, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(
            gateway.keys("mybucket"),
            vec!["link.bin".to_string(), "x.bin".to_string()]
        );
        assert_eq!(
            gateway.object("mybucket", "link.bin").unwrap(),
            b"outside-content"
        );
    }

    #[tokio::test]
    async fn unsupported_service() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::S3);
        gateway.insert_object("mybucket", "a.txt", b"alpha");

        let bucket_sync = create_bucket_sync(&gateway);
        for result in [
            bucket_sync
                .download("ftp", "mybucket", temp_dir.path())
                .await,
            bucket_sync.upload("ftp", "mybucket", temp_dir.path()).await,
        ] {
            let error = result.unwrap_err();
            let error = error.downcast_ref::<CloneyError>().unwrap();
            assert_eq!(error, &CloneyError::UnsupportedService("ftp".to_string()));
            assert!(error.is_configuration_error());
        }

        assert!(!temp_dir.path().join("a.txt").exists());
        assert_eq!(gateway.keys("mybucket"), vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn partial_failure_is_reported() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::Azure);
        gateway.insert_object("mybucket", "k1", b"1");
        gateway.insert_object("mybucket", "k2", b"2");
        gateway.insert_object("mybucket", "k3", b"3");
        gateway.insert_object("mybucket", "../k4", b"4");
        gateway.fail_key("k2");

        let report = create_bucket_sync(&gateway)
            .download("azure", "mybucket", &temp_dir.path().join("out"))
            .await
            .unwrap();

        assert_eq!(report.number_of_units, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);
        assert!(report.has_failure());
        assert!(temp_dir.path().join("out").join("k1").exists());
        assert!(temp_dir.path().join("out").join("k3").exists());
        assert!(!temp_dir.path().join("k4").exists());
    }

    #[tokio::test]
    async fn empty_bucket() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::Oss);
        gateway.insert_bucket("mybucket");

        let report = create_bucket_sync(&gateway)
            .download("oss", "mybucket", temp_dir.path())
            .await
            .unwrap();

        assert_eq!(report.number_of_units, 0);
        assert!(!report.has_failure());
    }

    #[tokio::test]
    async fn upload_missing_local_root() {
        init_dummy_tracing_subscriber();

        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = InMemoryGateway::new(ServiceType::S3);
        gateway.insert_bucket("mybucket");

        assert!(
            create_bucket_sync(&gateway)
                .upload("s3", "mybucket", &temp_dir.path().join("missing"))
                .await
                .is_err()
        );
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
