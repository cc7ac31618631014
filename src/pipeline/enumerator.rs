use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::storage::Gateway;
use crate::storage::local::LocalStorage;
use crate::types::TransferUnit;

/// One download unit per object in `bucket`.
///
/// Keys are not validated here. A key that cannot be mapped under `dest_root` fails its own unit
/// and leaves the rest of the batch untouched.
pub async fn enumerate_downloads(
    gateway: &Gateway,
    bucket: &str,
    dest_root: &Path,
) -> Result<Vec<TransferUnit>> {
    let units: Vec<TransferUnit> = gateway
        .list_objects(bucket)
        .await?
        .into_iter()
        .map(|key| TransferUnit::Download {
            bucket: bucket.to_string(),
            key,
            dest_root: dest_root.to_path_buf(),
        })
        .collect();

    debug!(
        service = gateway.service().as_str(),
        bucket = bucket,
        count = units.len(),
        "download units enumerated."
    );

    Ok(units)
}

/// One upload unit per regular file under the local root.
pub async fn enumerate_uploads(
    local_storage: &LocalStorage,
    bucket: &str,
) -> Result<Vec<TransferUnit>> {
    let units: Vec<TransferUnit> = local_storage
        .list_files()
        .await?
        .into_iter()
        .map(|local_path| TransferUnit::Upload {
            bucket: bucket.to_string(),
            local_path,
            source_root: local_storage.root().to_path_buf(),
        })
        .collect();

    debug!(
        path = local_storage.root().to_string_lossy().to_string(),
        bucket = bucket,
        count = units.len(),
        "upload units enumerated."
    );

    Ok(units)
}
