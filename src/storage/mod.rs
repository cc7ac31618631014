use std::pin::Pin;

use anyhow::{Context, Result};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::body::SdkBody;
use dyn_clone::DynClone;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt, TryStreamExt};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::trace;

use crate::types::async_callback::AsyncReadWithCallback;
use crate::types::{ObjectKey, ServiceType, TransferStatistics};

pub mod azure;
pub mod gcs;
pub mod local;
pub mod memory;
pub mod oss;
pub mod s3;

/// Body of an object being moved between a provider and the local disk.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + Sync>>;

pub type Gateway = Box<dyn StorageGateway + Send + Sync>;

/// Uniform view over one cloud provider.
///
/// `bucket_exists` returns `Ok(false)` only when the provider says the bucket
/// does not exist. Permission problems and any other provider error come back
/// as `Err` carrying a [`crate::types::error::CloneyError`].
#[async_trait]
pub trait StorageGateway: DynClone {
    fn service(&self) -> ServiceType;
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
    /// Every key in the bucket. Pagination is drained before returning.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader>;
    /// Stores `reader` under `key` and returns the number of bytes written.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: ObjectReader,
        content_length: u64,
    ) -> Result<u64>;
}

#[async_trait]
pub trait GatewayFactory {
    async fn create(&self, service: ServiceType) -> Result<Gateway>;
}

#[rustfmt::skip] // For coverage tool incorrectness
pub fn convert_to_buf_byte_stream_with_callback<R>(
    byte_stream: R,
    stats_sender: Sender<TransferStatistics>,
) -> ByteStream
where
    R: AsyncRead + Send + 'static + Sync,
{
    let async_read = AsyncReadWithCallback::new(byte_stream, stats_sender);

    let buf_reader = BufReader::new(async_read);

    let reader_stream = ReaderStream::new(buf_reader).map_ok(Frame::data);

    let stream_body = StreamBody::new(reader_stream);

    let boxed_body = BodyExt::boxed(stream_body);

    let sdk_body = SdkBody::from_body_1_x(boxed_body);

    ByteStream::new(sdk_body)
}

/// Number of chunks a streamed download holds ahead of the reader.
const OBJECT_BODY_BUFFER_CHUNKS: usize = 4;

/// Feeds the chunks of a provider response into the [`ObjectReader`] returned alongside it.
///
/// The channel is bounded, so a download holds at most a few chunks in memory however large the
/// object is. A provider error surfaces as a read error on the reader.
pub fn object_body_channel() -> (ObjectBodySender, ObjectReader) {
    let (sender, receiver) = async_channel::bounded(OBJECT_BODY_BUFFER_CHUNKS);

    (
        ObjectBodySender { sender },
        Box::pin(StreamReader::new(receiver)),
    )
}

pub struct ObjectBodySender {
    sender: Sender<std::io::Result<Bytes>>,
}

impl ObjectBodySender {
    /// Forwards `stream` until it ends, fails, or the reader is dropped.
    pub async fn forward<S, E>(self, stream: S)
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut stream = Box::pin(stream);
        while let Some(chunk) = stream.next().await {
            let is_error = chunk.is_err();
            if self
                .sender
                .send(chunk.map_err(std::io::Error::other))
                .await
                .is_err()
            {
                trace!("object reader has been dropped.");
                return;
            }
            if is_error {
                return;
            }
        }
    }
}

/// Reads up to `chunk_size` bytes. A shorter chunk means the reader is exhausted.
pub async fn read_chunk<R>(reader: &mut R, chunk_size: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(chunk_size);
    reader
        .take(chunk_size as u64)
        .read_to_end(&mut buffer)
        .await
        .context("AsyncReadExt::read_to_end() failed.")?;

    Ok(Bytes::from(buffer))
}
