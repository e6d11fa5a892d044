use crate::TransferError;

/// Validates a remote (service-side) file path.
///
/// Remote paths always use `/` regardless of the local platform.
///
/// Rejects:
/// - Empty paths
/// - Relative paths (must start with `/`)
/// - A trailing `/` (a file name is required)
/// - `..` components
/// - Empty components (`//`)
pub fn validate_remote_path(remote_path: &str) -> Result<(), TransferError> {
    if remote_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if !remote_path.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "remote path must be absolute: {remote_path}"
        )));
    }

    if remote_path.ends_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "remote path has no file name: {remote_path}"
        )));
    }

    for component in remote_path[1..].split('/') {
        match component {
            "" => {
                return Err(TransferError::InvalidPath(format!(
                    "empty path component: {remote_path}"
                )));
            }
            ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {remote_path}"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Splits a validated remote path into its parent directory and base name.
///
/// `/apps/demo/a.bin` → (`/apps/demo`, `a.bin`); `/a.bin` → (`/`, `a.bin`).
pub fn split_remote_path(remote_path: &str) -> Result<(&str, &str), TransferError> {
    validate_remote_path(remote_path)?;
    // Validation guarantees a leading '/', so rfind always succeeds.
    let cut = remote_path.rfind('/').unwrap_or(0);
    let parent = if cut == 0 { "/" } else { &remote_path[..cut] };
    Ok((parent, &remote_path[cut + 1..]))
}
