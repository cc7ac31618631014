//! A provider kept entirely in process memory.
//!
//! Useful for embedding the transfer pipeline without a cloud account and for exercising it in
//! tests. Individual keys can be configured to fail so that isolation between units is observable.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::storage::{Gateway, GatewayFactory, ObjectReader, StorageGateway};
use crate::types::error::CloneyError;
use crate::types::{ObjectKey, ServiceType};

type Buckets = BTreeMap<String, BTreeMap<ObjectKey, Vec<u8>>>;

#[derive(Default)]
struct MemoryState {
    buckets: Buckets,
    denied_buckets: HashSet<String>,
    failing_keys: HashSet<String>,
    delays: HashMap<String, Duration>,
}

/// Cloning shares the underlying state, like cloning a client handle.
#[derive(Clone)]
pub struct InMemoryGateway {
    service: ServiceType,
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryGateway {
    pub fn new(service: ServiceType) -> Self {
        InMemoryGateway {
            service,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    pub fn boxed(&self) -> Gateway {
        Box::new(self.clone())
    }

    pub fn insert_object(&self, bucket: &str, key: &str, data: &[u8]) {
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn insert_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn keys(&self, bucket: &str) -> Vec<ObjectKey> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every get or put of `key` fails.
    pub fn fail_key(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    /// Every operation on `bucket` is refused.
    pub fn deny_bucket(&self, bucket: &str) {
        self.lock().denied_buckets.insert(bucket.to_string());
    }

    /// Every get or put of `key` waits `delay` first.
    pub fn delay_key(&self, key: &str, delay: Duration) {
        self.lock().delays.insert(key.to_string(), delay);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves the maps consistent, so poisoning is ignored.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_access(&self, bucket: &str) -> Result<()> {
        if self.lock().denied_buckets.contains(bucket) {
            return Err(anyhow!(CloneyError::AccessDenied {
                service: self.service,
                bucket: bucket.to_string(),
            }));
        }

        Ok(())
    }

    async fn simulate_key(&self, key: &str) -> Result<()> {
        let (delay, failing) = {
            let state = self.lock();
            (
                state.delays.get(key).copied(),
                state.failing_keys.contains(key),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if failing {
            return Err(anyhow!(CloneyError::Provider {
                service: self.service,
                message: format!("simulated failure. key={key}"),
            }));
        }

        Ok(())
    }

    fn no_such_bucket(&self, bucket: &str) -> anyhow::Error {
        anyhow!(CloneyError::BucketNotFound {
            service: self.service,
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl StorageGateway for InMemoryGateway {
    fn service(&self) -> ServiceType {
        self.service
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.check_access(bucket)?;

        Ok(self.lock().buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.check_access(bucket)?;
        self.insert_bucket(bucket);

        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>> {
        self.check_access(bucket)?;

        let state = self.lock();
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| self.no_such_bucket(bucket))?;

        Ok(objects.keys().cloned().collect())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        self.check_access(bucket)?;
        self.simulate_key(key).await?;

        let data = {
            let state = self.lock();
            state
                .buckets
                .get(bucket)
                .ok_or_else(|| self.no_such_bucket(bucket))?
                .get(key)
                .cloned()
                .ok_or_else(|| anyhow!("object not found. bucket={bucket} key={key}"))?
        };

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut reader: ObjectReader,
        content_length: u64,
    ) -> Result<u64> {
        self.check_access(bucket)?;
        self.simulate_key(key).await?;

        let mut data = Vec::with_capacity(content_length as usize);
        reader.read_to_end(&mut data).await?;
        let size = data.len() as u64;

        let mut state = self.lock();
        state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| self.no_such_bucket(bucket))?
            .insert(key.to_string(), data);

        Ok(size)
    }
}

/// Hands out the same in-memory gateway for any service.
#[derive(Clone)]
pub struct InMemoryGatewayFactory {
    gateway: InMemoryGateway,
}

impl InMemoryGatewayFactory {
    pub fn new(gateway: InMemoryGateway) -> Self {
        InMemoryGatewayFactory { gateway }
    }
}

#[async_trait]
impl GatewayFactory for InMemoryGatewayFactory {
    async fn create(&self, _service: ServiceType) -> Result<Gateway> {
        Ok(self.gateway.boxed())
    }
}
