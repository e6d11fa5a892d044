//! Shared transfer context and the top-level façades.

use std::sync::Arc;

use panlink_xpan::Client;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::download::download_target;
use crate::error::{Step, TransferError};
use crate::service::PanService;
use crate::types::{CommittedFile, ListQuery, RemoteEntry, TransferEvent, TransferTarget, UploadOptions};
use crate::upload::Uploader;

/// Everything a transfer needs besides its target.
///
/// Cloning is cheap; clones share the same service connection.
#[derive(Clone)]
pub struct TransferContext {
    service: Arc<dyn PanService>,
    options: UploadOptions,
    events: Option<mpsc::Sender<TransferEvent>>,
    default_upload: Option<TransferTarget>,
    default_download: Option<TransferTarget>,
}

impl TransferContext {
    pub fn new(service: Arc<dyn PanService>) -> Self {
        Self {
            service,
            options: UploadOptions::default(),
            events: None,
            default_upload: None,
            default_download: None,
        }
    }

    /// Context backed by the HTTP client with default endpoints.
    pub fn from_client(client: Client) -> Self {
        Self::new(Arc::new(client))
    }

    pub fn with_upload_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Sends progress events to `tx` without waiting on it.
    ///
    /// Events that do not fit in the channel buffer are dropped and a closed
    /// receiver is ignored; the transfer itself never waits for the consumer.
    pub fn with_events(mut self, tx: mpsc::Sender<TransferEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Target used by [`upload_with_config`](Self::upload_with_config) when called with `None`.
    pub fn with_default_upload(mut self, target: TransferTarget) -> Self {
        self.default_upload = Some(target);
        self
    }

    /// Target used by [`download_with_config`](Self::download_with_config) when called with `None`.
    pub fn with_default_download(mut self, target: TransferTarget) -> Self {
        self.default_download = Some(target);
        self
    }

    /// Uploads `target`, or the registered default upload when `None`.
    pub async fn upload_with_config(
        &self,
        target: Option<TransferTarget>,
    ) -> Result<CommittedFile, TransferError> {
        let target = pick(target, self.default_upload.as_ref(), "upload")?;
        Uploader::new(&self.service, &self.options, self.events.as_ref())
            .upload(&target)
            .await
    }

    /// Downloads `target`, or the registered default download when `None`.
    pub async fn download_with_config(
        &self,
        target: Option<TransferTarget>,
    ) -> Result<u64, TransferError> {
        let target = pick(target, self.default_download.as_ref(), "download")?;
        download_target(self.service.as_ref(), &target, self.events.as_ref()).await
    }

    /// Fetches one page of `query.dir`.
    pub async fn list_directory(&self, query: &ListQuery) -> Result<Vec<RemoteEntry>, TransferError> {
        if query.access_token.is_empty() {
            return Err(TransferError::ConfigInvalid("access token is required".into()));
        }
        if !query.dir.starts_with('/') {
            return Err(TransferError::ConfigInvalid(format!(
                "directory must be absolute: {}",
                query.dir
            )));
        }

        let limit = query.effective_limit();
        let entries = self
            .service
            .list(&query.access_token, &query.dir, query.start, limit)
            .await
            .map_err(|e| TransferError::from_service(Step::List, e))?;
        info!(dir = query.dir.as_str(), start = query.start, limit, rows = entries.len(), "listed directory");
        Ok(entries)
    }
}

fn pick(
    explicit: Option<TransferTarget>,
    fallback: Option<&TransferTarget>,
    what: &str,
) -> Result<TransferTarget, TransferError> {
    match (explicit, fallback) {
        (Some(target), _) => Ok(target),
        (None, Some(target)) => {
            warn!(remote = target.remote_path.as_str(), "no {what} target given, using the default");
            Ok(target.clone())
        }
        (None, None) => Err(TransferError::ConfigInvalid(format!(
            "no {what} target given and no default registered"
        ))),
    }
}
