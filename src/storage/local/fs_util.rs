use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tracing::trace;

use crate::types::error::CloneyError;

static DIRECTORY_TRAVERSAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[/\\])\.\.([/\\]|$)").unwrap());

pub fn check_directory_traversal(key: &str) -> bool {
    DIRECTORY_TRAVERSAL_REGEX.is_match(key)
}

pub fn is_key_a_directory(key: &str) -> bool {
    if cfg!(windows) && key.ends_with('\\') {
        return true;
    }

    key.ends_with('/')
}

/// Maps an object key to a path under `root`.
///
/// Leading slashes and empty segments are dropped, so `/a//b` lands at
/// `root/a/b`. Keys that climb out of `root` or carry an absolute/drive
/// prefix in a segment are rejected.
pub fn to_local_path(root: &Path, key: &str) -> Result<PathBuf> {
    if check_directory_traversal(key) {
        return Err(anyhow!(CloneyError::DirectoryTraversal {
            key: key.to_string(),
        }));
    }

    let mut path = root.to_path_buf();
    let mut pushed = false;
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }

        if !is_plain_segment(segment) {
            return Err(anyhow!(CloneyError::InvalidObjectKey {
                key: key.to_string(),
            }));
        }

        path.push(segment);
        pushed = true;
    }

    if !pushed {
        return Err(anyhow!(CloneyError::InvalidObjectKey {
            key: key.to_string(),
        }));
    }

    if !path.starts_with(root) {
        return Err(anyhow!(CloneyError::PathOutsideRoot {
            path: path.to_string_lossy().to_string(),
        }));
    }

    Ok(path)
}

/// Inverse of [`to_local_path`]. The key always uses `/` regardless of the host separator.
pub fn to_object_key(root: &Path, local_path: &Path) -> Result<String> {
    let relative = local_path.strip_prefix(root).map_err(|_| {
        anyhow!(CloneyError::PathOutsideRoot {
            path: local_path.to_string_lossy().to_string(),
        })
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => {
                return Err(anyhow!(CloneyError::PathOutsideRoot {
                    path: local_path.to_string_lossy().to_string(),
                }));
            }
        }
    }

    if segments.is_empty() {
        return Err(anyhow!(CloneyError::InvalidObjectKey {
            key: String::new(),
        }));
    }

    Ok(segments.join("/"))
}

/// Creates the parent directory of `path`. Safe to call from many workers at once.
pub async fn create_parent_directory(path: &Path) -> Result<bool> {
    let Some(directory_path) = path.parent() else {
        return Ok(false);
    };

    create_directory(directory_path).await
}

pub async fn create_directory(directory_path: &Path) -> Result<bool> {
    if directory_path.is_dir() {
        return Ok(false);
    }

    // create_dir_all() treats a directory created concurrently by a sibling as success.
    tokio::fs::create_dir_all(directory_path)
        .await
        .context("tokio::fs::create_dir_all() failed.")?;

    let directory = directory_path.to_string_lossy().to_string();
    trace!(directory = directory, "directory created.");

    Ok(true)
}

pub async fn is_regular_file(path: &Path) -> Result<bool> {
    Ok(File::open(path).await?.metadata().await?.is_file())
}

/// Creates a temporary file next to `real_path`, so that a later `persist()` is a same-directory rename.
pub async fn create_temp_file(real_path: &Path) -> Result<NamedTempFile> {
    create_parent_directory(real_path).await?;

    let temp_directory_path = real_path
        .parent()
        .ok_or_else(|| anyhow!("no parent directory. path={}", real_path.display()))?;
    let file =
        NamedTempFile::new_in(temp_directory_path).context("NamedTempFile::new_in failed.")?;
    Ok(file)
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
