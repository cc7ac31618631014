use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::storage::ObjectReader;
use crate::types::TransferStatistics;
use crate::types::async_callback::AsyncReadWithCallback;
use crate::types::error::CloneyError;
use crate::types::token::PipelineCancellationToken;

pub mod fs_util;

// Cancellation is checked after every chunk of this size.
const CANCELLATION_CHECK_INTERVAL: u64 = 8 * 1024 * 1024;

/// The local side of a transfer: the directory tree under `root`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    follow_symlinks: bool,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
}

impl LocalStorage {
    pub fn new(
        root: PathBuf,
        follow_symlinks: bool,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<TransferStatistics>,
    ) -> Self {
        LocalStorage {
            root,
            follow_symlinks,
            cancellation_token,
            stats_sender,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks `root` recursively and returns every regular file.
    ///
    /// Entries that cannot be read are logged and skipped.
    pub async fn list_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(anyhow!(
                "local directory not found. path={}",
                self.root.display()
            ));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if let Some(inner) = e.io_error() {
                        if inner.kind() == io::ErrorKind::NotFound {
                            continue;
                        }
                    }

                    let path = e
                        .path()
                        .unwrap_or_else(|| Path::new(""))
                        .to_string_lossy()
                        .to_string();
                    let error = e.to_string();
                    warn!(path = path, error = error, "failed to list local files.");

                    continue;
                }
            };

            if self.cancellation_token.is_cancelled() {
                trace!("list_files() cancelled.");
                break;
            }

            if !self.check_dir_entry(&entry).await {
                continue;
            }

            files.push(entry.into_path());
        }

        Ok(files)
    }

    // A symlink to a file is uploaded through the link. Without `follow_symlinks` a symlink to a
    // directory is not descended and is skipped as a non regular file.
    async fn check_dir_entry(&self, entry: &DirEntry) -> bool {
        if entry.file_type().is_dir() {
            return false;
        }

        match fs_util::is_regular_file(entry.path()).await {
            Ok(true) => true,
            Ok(false) => {
                let path = entry.path().to_string_lossy().to_string();
                debug!(path = path, "skip non regular file.");

                false
            }
            Err(e) => {
                let path = entry.path().to_string_lossy().to_string();
                let error = e.to_string();
                let source = e.source();

                warn!(
                    path = path,
                    error = error,
                    source = source,
                    "failed to access file."
                );

                false
            }
        }
    }

    /// Opens a local file for upload and returns it with its size.
    pub async fn open(&self, local_path: &Path) -> Result<(ObjectReader, u64)> {
        let file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("tokio::fs::File::open() failed. path={}", local_path.display()))?;
        let content_length = file
            .metadata()
            .await
            .context("tokio::fs::File::metadata() failed.")?
            .len();

        Ok((Box::pin(file), content_length))
    }

    /// Writes an object body to the path `key` maps to under `root`.
    ///
    /// The body goes to a temporary file in the destination directory first and is
    /// renamed into place once complete. A key ending in `/` only creates the directory.
    pub async fn write(&self, key: &str, reader: ObjectReader) -> Result<u64> {
        let real_path = fs_util::to_local_path(&self.root, key)?;

        if fs_util::is_key_a_directory(key) {
            fs_util::create_directory(&real_path).await?;
            return Ok(0);
        }

        let mut temp_file = fs_util::create_temp_file(&real_path).await?;
        let mut file = tokio::fs::File::from_std(
            temp_file
                .as_file_mut()
                .try_clone()
                .context("std::fs::File::try_clone() failed.")?,
        );

        let mut buf_reader =
            BufReader::new(AsyncReadWithCallback::new(reader, self.stats_sender.clone()));

        let mut written: u64 = 0;
        let mut chunked_remaining: u64 = 0;
        loop {
            let buffer = buf_reader.fill_buf().await?;
            if buffer.is_empty() {
                break;
            }

            let buffer_len = buffer.len();
            file.write_all(buffer).await?;
            buf_reader.consume(buffer_len);

            written += buffer_len as u64;
            chunked_remaining += buffer_len as u64;
            if chunked_remaining > CANCELLATION_CHECK_INTERVAL {
                chunked_remaining = 0;

                if self.cancellation_token.is_cancelled() {
                    warn!(key = key, "transfer cancelled.");
                    return Err(anyhow!(CloneyError::Cancelled));
                }
            }
        }

        file.flush().await?;
        drop(file);

        temp_file
            .persist(&real_path)
            .context("NamedTempFile::persist() failed.")?;

        let real_path = real_path.to_string_lossy().to_string();
        trace!(key = key, real_path = real_path, size = written, "file written.");

        Ok(written)
    }
}
