#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time;

use async_channel::Receiver;
use aws_config::meta::region::{ProvideRegion, RegionProviderChain};
use aws_config::{BehaviorVersion, ConfigLoader};
use aws_sdk_s3::client::Client;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_types::SdkConfig;
use once_cell::sync::Lazy;
use tokio::sync::Semaphore;
use uuid::Uuid;
use walkdir::WalkDir;

use cloney::types::TransferStatistics;

pub const REGION: &str = "ap-northeast-1";
pub const PROFILE_NAME: &str = "cloney-e2e-test";

pub static BUCKET1: Lazy<String> = Lazy::new(|| format!("cloney-bucket1-{}", Uuid::new_v4()));
pub static BUCKET2: Lazy<String> = Lazy::new(|| format!("cloney-bucket2-{}", Uuid::new_v4()));

pub static SEMAPHORE: Lazy<Arc<Semaphore>> = Lazy::new(|| Arc::new(Semaphore::new(1)));

pub const SLEEP_SECS_AFTER_DELETE_BUCKET: u64 = 10;

/// Objects written by [`TestHelper::put_test_objects`], as `(key, size)`.
pub const TEST_OBJECTS: [(&str, usize); 5] = [
    ("data1", 1024),
    ("dir1/data2", 2048),
    ("dir1/dir2/data3", 0),
    ("dir1/dir2/dir3/data4", 5 * 1024 * 1024 + 1),
    ("dir5/", 0),
];

#[derive(Debug, Default)]
pub struct StatsCount {
    pub transfer_complete: u64,
    pub transfer_error: u64,
    pub transfer_bytes: u64,
}

#[cfg(feature = "e2e_test")]
pub struct TestHelper {
    client: Client,
}

#[cfg(feature = "e2e_test")]
impl TestHelper {
    pub async fn new() -> Self {
        Self {
            client: Self::create_client().await,
        }
    }

    pub async fn create_client() -> Client {
        Client::from_conf(Builder::from(&Self::load_sdk_config().await).build())
    }

    async fn load_sdk_config() -> SdkConfig {
        let config_loader =
            Self::load_config_credential(aws_config::defaults(BehaviorVersion::latest()))
                .region(Self::build_provider_region());

        config_loader.load().await
    }

    fn load_config_credential(config_loader: ConfigLoader) -> ConfigLoader {
        let builder = aws_config::profile::ProfileFileCredentialsProvider::builder();

        config_loader.credentials_provider(builder.profile_name(PROFILE_NAME).build())
    }

    fn build_provider_region() -> Box<dyn ProvideRegion> {
        let builder =
            aws_config::profile::ProfileFileRegionProvider::builder().profile_name(PROFILE_NAME);

        Box::new(RegionProviderChain::first_try(builder.build()))
    }

    pub async fn create_bucket(&self, bucket: &str, region: &str) {
        let constraint = BucketLocationConstraint::from(region);
        let cfg = CreateBucketConfiguration::builder()
            .location_constraint(constraint)
            .build();

        self.client
            .create_bucket()
            .create_bucket_configuration(cfg)
            .bucket(bucket)
            .send()
            .await
            .unwrap();
    }

    pub async fn is_bucket_exist(&self, bucket: &str) -> bool {
        let head_bucket_result = self.client.head_bucket().bucket(bucket).send().await;

        if head_bucket_result.is_ok() {
            return true;
        }

        !head_bucket_result
            .err()
            .unwrap()
            .into_service_error()
            .is_not_found()
    }

    pub async fn delete_bucket_with_cascade(&self, bucket: &str) {
        if !self.is_bucket_exist(bucket).await {
            return;
        }

        for key in self.list_keys(bucket).await {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .unwrap();
        }

        let result = self.client.delete_bucket().bucket(bucket).send().await;
        if let Err(e) = result {
            let service_error = e.into_service_error();
            assert_eq!(service_error.meta().code(), Some("NoSuchBucket"));
        }

        tokio::time::sleep(time::Duration::from_secs(SLEEP_SECS_AFTER_DELETE_BUCKET)).await;
    }

    /// All keys of `bucket`, following continuation tokens.
    pub async fn list_keys(&self, bucket: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token)
                .send()
                .await
                .unwrap();

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            continuation_token = output.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        keys.sort();
        keys
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .unwrap();
    }

    pub async fn get_object_bytes(&self, bucket: &str, key: &str) -> Vec<u8> {
        self.client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap()
            .body
            .collect()
            .await
            .unwrap()
            .into_bytes()
            .to_vec()
    }

    pub async fn put_test_objects(&self, bucket: &str) {
        for (key, size) in TEST_OBJECTS {
            self.put_object(bucket, key, Self::test_body(key, size))
                .await;
        }
    }

    pub async fn put_many_objects(&self, bucket: &str, prefix: &str, count: usize) {
        for i in 0..count {
            let key = format!("{prefix}{i:05}");
            self.put_object(bucket, &key, key.as_bytes().to_vec()).await;
        }
    }

    /// Deterministic content, so that a downloaded file can be compared without a fixture.
    pub fn test_body(key: &str, size: usize) -> Vec<u8> {
        key.as_bytes().iter().cycle().take(size).copied().collect()
    }

    pub fn create_test_tree(root: &Path) {
        for (key, size) in TEST_OBJECTS {
            let path = root.join(key);
            if key.ends_with('/') {
                std::fs::create_dir_all(&path).unwrap();
                continue;
            }

            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, Self::test_body(key, size)).unwrap();
        }
    }

    /// Regular files under `root` as forward-slash keys.
    pub fn list_all_files(root: &Path) -> Vec<String> {
        let mut keys: Vec<String> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect();

        keys.sort();
        keys
    }

    pub fn local_path(root: &Path, key: &str) -> PathBuf {
        key.split('/').fold(root.to_path_buf(), |path, c| path.join(c))
    }

    pub fn get_stats_count(stats_receiver: Receiver<TransferStatistics>) -> StatsCount {
        let mut stats = StatsCount::default();
        while let Ok(transfer_stats) = stats_receiver.try_recv() {
            match transfer_stats {
                TransferStatistics::TransferComplete { .. } => stats.transfer_complete += 1,
                TransferStatistics::TransferError { .. } => stats.transfer_error += 1,
                TransferStatistics::TransferBytes(size) => stats.transfer_bytes += size,
            }
        }

        stats
    }

    pub fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
