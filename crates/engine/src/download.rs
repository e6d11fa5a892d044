//! Resolve-and-stream download pipeline.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::{Step, TransferError};
use crate::resolve::resolve;
use crate::service::PanService;
use crate::types::{DirectLink, TransferEvent, TransferTarget, publish};

/// Streams `link` into `dest`, returning the number of bytes written.
///
/// `dest` is only created once the service has answered 200.
pub async fn download(
    service: &dyn PanService,
    token: &str,
    link: &DirectLink,
    dest: &Path,
) -> Result<u64, TransferError> {
    service
        .download(token, &link.url, dest)
        .await
        .map_err(|e| TransferError::from_service(Step::Download, e))
}

/// Downloads `target.remote_path` into `target.local_path`.
pub async fn download_target(
    service: &dyn PanService,
    target: &TransferTarget,
    events: Option<&mpsc::Sender<TransferEvent>>,
) -> Result<u64, TransferError> {
    target.validate()?;
    let remote = target.remote_path.as_str();
    info!(remote, local = %target.local_path.display(), "starting download");

    let link = resolve(service, &target.access_token, remote).await?;
    publish(
        events,
        TransferEvent::LinkResolved {
            remote_path: remote.to_string(),
        },
    );

    let bytes = download(service, &target.access_token, &link, &target.local_path)
        .await
        .inspect_err(|e| error!(remote, error = %e, "download failed"))?;

    info!(remote, bytes, "download finished");
    publish(
        events,
        TransferEvent::Downloaded {
            remote_path: remote.to_string(),
            bytes,
        },
    );
    Ok(bytes)
}
