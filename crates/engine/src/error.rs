//! Transfer error types.

use std::fmt;

/// Pipeline step an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stat,
    Fingerprint,
    Precreate,
    /// Reading a shard during the transmit pass.
    ReadShard(u64),
    SendShard(u64),
    Commit,
    List,
    Metadata,
    Download,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Stat => f.write_str("stat"),
            Step::Fingerprint => f.write_str("fingerprint"),
            Step::Precreate => f.write_str("precreate"),
            Step::ReadShard(index) => write!(f, "read shard {index}"),
            Step::SendShard(index) => write!(f, "send shard {index}"),
            Step::Commit => f.write_str("commit"),
            Step::List => f.write_str("list"),
            Step::Metadata => f.write_str("metadata"),
            Step::Download => f.write_str("download"),
        }
    }
}

/// Errors produced by a transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{step}: local I/O error: {source}")]
    LocalIo {
        step: Step,
        #[source]
        source: std::io::Error,
    },

    #[error("{step}: rejected by service with errno {errno}")]
    RemoteRejected { step: Step, errno: i64 },

    #[error("{step}: transport failure: {message}")]
    Transport {
        step: Step,
        /// HTTP status when the service answered with a non-success code.
        status: Option<u16>,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no direct link available for {0}")]
    NoLinkAvailable(String),

    #[error("shard {index}: content does not match its fingerprint")]
    ShardMismatch { index: u64 },
}

impl TransferError {
    /// Attaches `step` to an error reported by the service client.
    pub fn from_service(step: Step, err: panlink_xpan::Error) -> Self {
        use panlink_xpan::Error as E;
        match err {
            E::Remote { errno } => TransferError::RemoteRejected { step, errno },
            E::Io(source) => TransferError::LocalIo { step, source },
            E::Status { status, body } => TransferError::Transport {
                step,
                status: Some(status),
                message: format!("HTTP {status}: {body}"),
            },
            E::Http(e) => TransferError::Transport {
                step,
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            E::Json(e) => TransferError::Transport {
                step,
                status: None,
                message: format!("malformed reply: {e}"),
            },
            E::InvalidUrl(url) => TransferError::Transport {
                step,
                status: None,
                message: format!("invalid link: {url}"),
            },
        }
    }

    /// Attaches `step` to an error from the sharding layer.
    pub fn from_local(step: Step, err: panlink_transfer::TransferError) -> Self {
        use panlink_transfer::TransferError as E;
        match err {
            E::Io(source) => TransferError::LocalIo { step, source },
            E::InvalidPath(msg) => TransferError::ConfigInvalid(msg),
            E::ShardSize => TransferError::ConfigInvalid(E::ShardSize.to_string()),
        }
    }

    /// Service errno, when the failure was a service rejection.
    pub fn errno(&self) -> Option<i64> {
        match self {
            TransferError::RemoteRejected { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// Step the failure happened in, when known.
    pub fn step(&self) -> Option<Step> {
        match self {
            TransferError::LocalIo { step, .. }
            | TransferError::RemoteRejected { step, .. }
            | TransferError::Transport { step, .. } => Some(*step),
            TransferError::ShardMismatch { index } => Some(Step::SendShard(*index)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errno_is_surfaced() {
        let err = TransferError::from_service(
            Step::Precreate,
            panlink_xpan::Error::Remote { errno: -10 },
        );
        assert_eq!(err.errno(), Some(-10));
        assert_eq!(err.step(), Some(Step::Precreate));
        assert_eq!(
            err.to_string(),
            "precreate: rejected by service with errno -10"
        );
    }

    #[test]
    fn status_becomes_transport() {
        let err = TransferError::from_service(
            Step::Download,
            panlink_xpan::Error::Status {
                status: 404,
                body: "gone".into(),
            },
        );
        match err {
            TransferError::Transport {
                step,
                status,
                message,
            } => {
                assert_eq!(step, Step::Download);
                assert_eq!(status, Some(404));
                assert!(message.contains("gone"));
            }
            other => panic!("expected transport error, got {other}"),
        }
    }

    #[test]
    fn io_becomes_local_io() {
        let err = TransferError::from_service(
            Step::Download,
            panlink_xpan::Error::Io(std::io::Error::other("disk full")),
        );
        assert!(matches!(
            err,
            TransferError::LocalIo {
                step: Step::Download,
                ..
            }
        ));
    }

    #[test]
    fn shard_step_display() {
        assert_eq!(Step::SendShard(3).to_string(), "send shard 3");
        assert_eq!(Step::ReadShard(2).to_string(), "read shard 2");
        let err = TransferError::ShardMismatch { index: 3 };
        assert_eq!(err.step(), Some(Step::SendShard(3)));
    }
}
