//! Chunked upload: fingerprint, precreate, transmit, commit.

use std::collections::HashMap;
use std::sync::Arc;

use panlink_transfer::{
    Fingerprint, Shard, ShardReader, TransferProgress, UploadSession, fingerprint_file,
};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{Step, TransferError};
use crate::service::PanService;
use crate::types::{CommittedFile, TransferEvent, TransferTarget, UploadOptions, publish};

/// Opens an upload session for `file_size` bytes at `remote_path`.
///
/// `fingerprints` must already cover every shard of the file.
pub async fn precreate(
    service: &dyn PanService,
    token: &str,
    remote_path: &str,
    file_size: u64,
    fingerprints: Vec<Fingerprint>,
) -> Result<UploadSession, TransferError> {
    let reply = service
        .precreate(token, remote_path, file_size, &fingerprints)
        .await
        .map_err(|e| TransferError::from_service(Step::Precreate, e))?;

    if reply.upload_id.is_empty() {
        // The service answered errno 0 without a session.
        return Err(TransferError::RemoteRejected {
            step: Step::Precreate,
            errno: 0,
        });
    }

    Ok(UploadSession::new(reply.upload_id, fingerprints, file_size))
}

/// Sends one shard and checks the acknowledgment against its fingerprint.
pub async fn send_shard(
    service: &dyn PanService,
    token: &str,
    remote_path: &str,
    session_id: &str,
    shard: &Shard,
    data: Vec<u8>,
) -> Result<(), TransferError> {
    let reply = service
        .upload_part(token, remote_path, session_id, shard.index, data)
        .await
        .map_err(|e| TransferError::from_service(Step::SendShard(shard.index), e))?;

    if let Some(md5) = reply.md5.as_deref()
        && !md5.eq_ignore_ascii_case(&shard.fingerprint.to_hex())
    {
        error!(
            index = shard.index,
            expected = %shard.fingerprint,
            acknowledged = md5,
            "shard acknowledgment does not match"
        );
        return Err(TransferError::ShardMismatch { index: shard.index });
    }

    debug!(index = shard.index, bytes = shard.len, "shard acknowledged");
    Ok(())
}

/// Assembles the acknowledged shards of `session` into the object at `remote_path`.
pub async fn commit(
    service: &dyn PanService,
    token: &str,
    remote_path: &str,
    session: &UploadSession,
) -> Result<CommittedFile, TransferError> {
    let reply = service
        .create(
            token,
            remote_path,
            session.declared_size(),
            session.session_id(),
            session.fingerprints(),
        )
        .await
        .map_err(|e| TransferError::from_service(Step::Commit, e))?;

    Ok(CommittedFile {
        fs_id: reply.fs_id,
        path: if reply.path.is_empty() {
            remote_path.to_string()
        } else {
            reply.path
        },
        size: session.declared_size(),
        md5: reply.md5,
    })
}

/// Runs the full upload pipeline for one target.
pub struct Uploader<'a> {
    service: &'a Arc<dyn PanService>,
    options: &'a UploadOptions,
    events: Option<&'a mpsc::Sender<TransferEvent>>,
}

impl<'a> Uploader<'a> {
    pub fn new(
        service: &'a Arc<dyn PanService>,
        options: &'a UploadOptions,
        events: Option<&'a mpsc::Sender<TransferEvent>>,
    ) -> Self {
        Self {
            service,
            options,
            events,
        }
    }

    /// Uploads `target.local_path` to `target.remote_path`.
    ///
    /// Nothing is visible remotely unless this returns `Ok`. On failure any
    /// shards already sent stay with the service; nothing is retried.
    pub async fn upload(&self, target: &TransferTarget) -> Result<CommittedFile, TransferError> {
        target.validate()?;
        let remote = target.remote_path.as_str();
        let token = target.access_token.as_str();
        let shard_size = target.tier.shard_size();

        // 1. Stat
        let meta = tokio::fs::metadata(&target.local_path)
            .await
            .map_err(|source| TransferError::LocalIo {
                step: Step::Stat,
                source,
            })?;
        if !meta.is_file() {
            return Err(TransferError::ConfigInvalid(format!(
                "not a regular file: {}",
                target.local_path.display()
            )));
        }
        let file_size = meta.len();
        if file_size > target.tier.max_file_size() {
            return Err(TransferError::ConfigInvalid(format!(
                "{} is {file_size} bytes, over the {} tier limit of {} bytes",
                target.local_path.display(),
                target.tier,
                target.tier.max_file_size()
            )));
        }

        info!(
            local = %target.local_path.display(),
            remote,
            tier = %target.tier,
            shard_size,
            file_size,
            "starting upload"
        );

        // 2. Fingerprint (first full pass)
        let fingerprints = tokio::task::spawn_blocking({
            let path = target.local_path.clone();
            move || fingerprint_file(&path, shard_size)
        })
        .await
        .map_err(|e| join_error(Step::Fingerprint, e))?
        .map_err(|e| TransferError::from_local(Step::Fingerprint, e))?;

        self.emit(TransferEvent::Fingerprinted {
            remote_path: remote.to_string(),
            shards: fingerprints.len() as u64,
        });

        // 3. Precreate
        let mut session =
            precreate(self.service.as_ref(), token, remote, file_size, fingerprints).await?;
        info!(remote, session_id = session.session_id(), shards = session.shard_count(), "session opened");
        self.emit(TransferEvent::SessionOpened {
            remote_path: remote.to_string(),
            session_id: session.session_id().to_string(),
        });

        // 4. Transmit (second pass)
        let reader = ShardReader::open(&target.local_path, shard_size)
            .map_err(|e| TransferError::from_local(Step::ReadShard(0), e))?;
        if reader.file_size() != file_size {
            return Err(TransferError::ConfigInvalid(format!(
                "{} changed size during upload",
                target.local_path.display()
            )));
        }

        let result = if self.options.concurrency > 1 {
            self.transmit_concurrent(target, reader, &mut session).await
        } else {
            self.transmit_sequential(target, reader, &mut session).await
        };
        if let Err(e) = result {
            error!(remote, error = %e, "upload aborted");
            return Err(e);
        }

        // Barrier: commit only once every shard has acknowledged.
        if !session.is_complete() {
            let pending = session.pending();
            warn!(remote, ?pending, "shards missing acknowledgment");
            let index = pending.first().copied().unwrap_or_default();
            return Err(TransferError::ShardMismatch { index });
        }

        // 5. Commit
        let committed = commit(self.service.as_ref(), token, remote, &session)
            .await
            .inspect_err(|e| error!(remote, error = %e, "commit failed"))?;

        info!(remote, fs_id = committed.fs_id, size = committed.size, "upload committed");
        self.emit(TransferEvent::Committed {
            remote_path: remote.to_string(),
            fs_id: committed.fs_id,
        });

        Ok(committed)
    }

    /// Sends shards one at a time, each waiting for its acknowledgment.
    async fn transmit_sequential(
        &self,
        target: &TransferTarget,
        mut reader: ShardReader,
        session: &mut UploadSession,
    ) -> Result<(), TransferError> {
        let mut progress = TransferProgress::new(session.declared_size(), session.shard_count() as u64);

        loop {
            let (r, next) = read_next(reader).await?;
            reader = r;
            let Some((shard, data)) = next else {
                break;
            };
            check_against_session(session, &shard)?;

            send_shard(
                self.service.as_ref(),
                &target.access_token,
                &target.remote_path,
                session.session_id(),
                &shard,
                data,
            )
            .await?;

            session.acknowledge(shard.index);
            progress.shard_done(shard.len as u64);
            self.emit_shard(&target.remote_path, shard.index, progress);
        }
        Ok(())
    }

    /// Sends up to `concurrency` shards at once.
    ///
    /// Shards are still read in index order; at most `concurrency` shard
    /// buffers exist at any time. The first failure cancels everything left.
    async fn transmit_concurrent(
        &self,
        target: &TransferTarget,
        mut reader: ShardReader,
        session: &mut UploadSession,
    ) -> Result<(), TransferError> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut tasks: JoinSet<Result<Shard, TransferError>> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, u64> = HashMap::new();
        let mut progress = TransferProgress::new(session.declared_size(), session.shard_count() as u64);

        loop {
            // Collect finished sends without blocking.
            while let Some(joined) = tasks.try_join_next_with_id() {
                let shard = finish_send(joined, &mut in_flight)?;
                self.record_ack(target, session, &mut progress, &shard);
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| TransferError::LocalIo {
                    step: Step::SendShard(next_index(&reader)),
                    source: std::io::Error::other(e),
                })?;

            let (r, next) = read_next(reader).await?;
            reader = r;
            let Some((shard, data)) = next else {
                break;
            };
            check_against_session(session, &shard)?;

            let service = Arc::clone(self.service);
            let token = target.access_token.clone();
            let remote = target.remote_path.clone();
            let session_id = session.session_id().to_string();
            let index = shard.index;
            let handle = tasks.spawn(async move {
                let _permit = permit;
                send_shard(service.as_ref(), &token, &remote, &session_id, &shard, data).await?;
                Ok(shard)
            });
            in_flight.insert(handle.id(), index);
        }

        // Join barrier. Dropping the set on error aborts the remaining sends.
        while let Some(joined) = tasks.join_next_with_id().await {
            let shard = finish_send(joined, &mut in_flight)?;
            self.record_ack(target, session, &mut progress, &shard);
        }
        Ok(())
    }

    fn record_ack(
        &self,
        target: &TransferTarget,
        session: &mut UploadSession,
        progress: &mut TransferProgress,
        shard: &Shard,
    ) {
        session.acknowledge(shard.index);
        progress.shard_done(shard.len as u64);
        self.emit_shard(&target.remote_path, shard.index, *progress);
    }

    fn emit_shard(&self, remote: &str, index: u64, progress: TransferProgress) {
        self.emit(TransferEvent::ShardSent {
            remote_path: remote.to_string(),
            index,
            progress,
        });
    }

    fn emit(&self, event: TransferEvent) {
        publish(self.events, event);
    }
}

/// Reads the next shard off the blocking pool, handing the reader back.
async fn read_next(
    reader: ShardReader,
) -> Result<(ShardReader, Option<(Shard, Vec<u8>)>), TransferError> {
    let step = Step::ReadShard(next_index(&reader));
    let (reader, next) = tokio::task::spawn_blocking(move || {
        let mut reader = reader;
        let next = match reader.next_shard() {
            Ok(Some((shard, data))) => Ok(Some((shard, data.to_vec()))),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        (reader, next)
    })
    .await
    .map_err(|e| join_error(step, e))?;

    let next = next.map_err(|e| TransferError::from_local(step, e))?;
    Ok((reader, next))
}

fn next_index(reader: &ShardReader) -> u64 {
    reader.shard_count() - reader.remaining()
}

/// Unpacks one finished send, attributing a panicked task to its shard.
fn finish_send(
    joined: Result<(task::Id, Result<Shard, TransferError>), task::JoinError>,
    in_flight: &mut HashMap<task::Id, u64>,
) -> Result<Shard, TransferError> {
    match joined {
        Ok((id, result)) => {
            in_flight.remove(&id);
            result
        }
        Err(e) => {
            let index = in_flight.remove(&e.id()).unwrap_or_default();
            Err(join_error(Step::SendShard(index), e))
        }
    }
}

/// The second pass must see the same bytes the session was opened with.
fn check_against_session(session: &UploadSession, shard: &Shard) -> Result<(), TransferError> {
    if session.expected(shard.index) == Some(shard.fingerprint) {
        Ok(())
    } else {
        warn!(index = shard.index, "file changed since it was fingerprinted");
        Err(TransferError::ShardMismatch { index: shard.index })
    }
}

fn join_error(step: Step, err: task::JoinError) -> TransferError {
    TransferError::LocalIo {
        step,
        source: std::io::Error::other(format!("task join error: {err}")),
    }
}
