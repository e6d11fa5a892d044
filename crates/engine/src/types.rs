use std::path::PathBuf;

use panlink_transfer::{TierClass, TransferProgress};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::TransferError;

/// A listing row as returned by the service.
pub type RemoteEntry = panlink_xpan::ListEntry;

/// Largest page the listing call accepts, also the page size of path lookups.
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Page size used by [`ListQuery`] when none is given.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// One file transfer: where from, where to, and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub local_path: PathBuf,
    /// Absolute service-side path, `/`-separated.
    pub remote_path: String,
    pub access_token: String,
    pub tier: TierClass,
}

impl TransferTarget {
    pub fn new(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        access_token: impl Into<String>,
        tier: TierClass,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            access_token: access_token.into(),
            tier,
        }
    }

    /// Checks everything that can be checked before touching disk or network.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.access_token.is_empty() {
            return Err(TransferError::ConfigInvalid("access token is required".into()));
        }
        if self.local_path.as_os_str().is_empty() {
            return Err(TransferError::ConfigInvalid("local path is required".into()));
        }
        if self.remote_path.is_empty() {
            return Err(TransferError::ConfigInvalid("remote path is required".into()));
        }
        panlink_transfer::validate_remote_path(&self.remote_path)
            .map_err(|e| TransferError::ConfigInvalid(e.to_string()))
    }
}

/// Single-page directory listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub access_token: String,
    pub dir: String,
    pub start: u64,
    /// Clamped to `1..=1000` when sent.
    pub limit: u32,
}

impl ListQuery {
    pub fn new(access_token: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            dir: dir.into(),
            start: 0,
            limit: DEFAULT_LIST_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_LIST_LIMIT)
    }
}

/// Upload tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Shard transmissions allowed in flight at once; 1 sends strictly in order.
    pub concurrency: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// A service object located by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectHandle {
    pub fs_id: u64,
    pub logical_path: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Short-lived direct download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectLink {
    pub url: String,
}

/// The object created by a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFile {
    pub fs_id: u64,
    pub path: String,
    pub size: u64,
    pub md5: String,
}

/// Events emitted while a transfer runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// First pass finished.
    Fingerprinted { remote_path: String, shards: u64 },
    /// Service accepted the precreate.
    SessionOpened {
        remote_path: String,
        session_id: String,
    },
    /// One shard acknowledged.
    ShardSent {
        remote_path: String,
        index: u64,
        progress: TransferProgress,
    },
    /// Object assembled.
    Committed { remote_path: String, fs_id: u64 },
    /// Direct link obtained; the GET is next.
    LinkResolved { remote_path: String },
    /// Body fully written to disk.
    Downloaded { remote_path: String, bytes: u64 },
}

/// Hands `event` to the subscriber without waiting.
///
/// A full buffer drops the event and a closed receiver is ignored, so a
/// slow or absent consumer never holds up a transfer.
pub(crate) fn publish(events: Option<&mpsc::Sender<TransferEvent>>, event: TransferEvent) {
    let Some(tx) = events else {
        return;
    };
    match tx.try_send(event) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(event)) => {
            tracing::debug!(?event, "event buffer full, dropping event");
        }
    }
}
