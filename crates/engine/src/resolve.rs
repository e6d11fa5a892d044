//! Logical path to direct download link.

use panlink_transfer::split_remote_path;
use tracing::{debug, warn};

use crate::error::{Step, TransferError};
use crate::service::PanService;
use crate::types::{DirectLink, MAX_LIST_LIMIT, RemoteObjectHandle};

/// Finds the regular file at `logical_path` by scanning its parent directory.
///
/// Names match case-sensitively and directories never match. The scan stops
/// at the first hit or after the first short page.
pub async fn locate(
    service: &dyn PanService,
    token: &str,
    logical_path: &str,
) -> Result<RemoteObjectHandle, TransferError> {
    let (parent, name) = split_remote_path(logical_path)
        .map_err(|e| TransferError::ConfigInvalid(e.to_string()))?;

    let mut start = 0u64;
    loop {
        let page = service
            .list(token, parent, start, MAX_LIST_LIMIT)
            .await
            .map_err(|e| TransferError::from_service(Step::List, e))?;
        debug!(dir = parent, start, rows = page.len(), "listing page");

        if let Some(entry) = page
            .iter()
            .find(|e| !e.is_dir && e.server_filename == name)
        {
            return Ok(RemoteObjectHandle {
                fs_id: entry.fs_id,
                logical_path: logical_path.to_string(),
                size: entry.size,
                is_dir: entry.is_dir,
            });
        }

        if page.len() < MAX_LIST_LIMIT as usize {
            return Err(TransferError::NotFound(logical_path.to_string()));
        }
        start += u64::from(MAX_LIST_LIMIT);
    }
}

/// Resolves `logical_path` to a short-lived direct link.
pub async fn resolve(
    service: &dyn PanService,
    token: &str,
    logical_path: &str,
) -> Result<DirectLink, TransferError> {
    let handle = locate(service, token, logical_path).await?;
    link_for(service, token, &handle).await
}

/// Fetches the direct link of an already located object.
pub async fn link_for(
    service: &dyn PanService,
    token: &str,
    handle: &RemoteObjectHandle,
) -> Result<DirectLink, TransferError> {
    let metas = service
        .file_metas(token, &[handle.fs_id], true)
        .await
        .map_err(|e| TransferError::from_service(Step::Metadata, e))?;

    let Some(meta) = metas.into_iter().find(|m| m.fs_id == handle.fs_id) else {
        warn!(fs_id = handle.fs_id, path = handle.logical_path.as_str(), "metadata list is empty");
        return Err(TransferError::RemoteRejected {
            step: Step::Metadata,
            errno: 0,
        });
    };

    match meta.dlink {
        Some(url) if !url.is_empty() => Ok(DirectLink { url }),
        _ => Err(TransferError::NoLinkAvailable(handle.logical_path.clone())),
    }
}
