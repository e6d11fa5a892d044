use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::TransferError;
use crate::types::{Fingerprint, Shard};

// ---------------------------------------------------------------------------
// Fingerprint helpers
// ---------------------------------------------------------------------------

/// Computes the MD5 fingerprint of one shard's bytes.
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::from_bytes(Md5::digest(data).into())
}

/// Number of shards a file of `file_size` bytes splits into.
///
/// An empty file still has one (empty) shard.
pub fn shard_count(file_size: u64, shard_size: usize) -> u64 {
    let shard_size = shard_size as u64;
    if file_size == 0 {
        1
    } else {
        file_size.div_ceil(shard_size)
    }
}

/// First full pass: fingerprints of every shard of `path`, in index order.
pub fn fingerprint_file(path: &Path, shard_size: usize) -> Result<Vec<Fingerprint>, TransferError> {
    let mut fingerprints = Vec::new();
    for_each_shard(path, shard_size, |shard, _| {
        fingerprints.push(shard.fingerprint);
        Ok::<(), TransferError>(())
    })?;
    Ok(fingerprints)
}

/// Visits every shard of `path` in order.
///
/// The visitor's first error stops iteration and is returned as-is.
pub fn for_each_shard<E, F>(path: &Path, shard_size: usize, mut visit: F) -> Result<(), E>
where
    E: From<TransferError>,
    F: FnMut(&Shard, &[u8]) -> Result<(), E>,
{
    let mut reader = ShardReader::open(path, shard_size)?;
    while let Some((shard, data)) = reader.next_shard()? {
        visit(&shard, data)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ShardReader
// ---------------------------------------------------------------------------

/// Reads a file top to bottom in `shard_size` windows through one reused buffer.
#[derive(Debug)]
pub struct ShardReader {
    file: File,
    shard_size: usize,
    file_size: u64,
    shard_count: u64,
    next_index: u64,
    buf: Vec<u8>,
}

impl ShardReader {
    /// Opens `path` and records its size; the size is not re-read later.
    pub fn open(path: &Path, shard_size: usize) -> Result<Self, TransferError> {
        if shard_size == 0 {
            return Err(TransferError::ShardSize);
        }
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let buf_len = std::cmp::min(file_size, shard_size as u64) as usize;
        Ok(Self {
            file,
            shard_size,
            file_size,
            shard_count: shard_count(file_size, shard_size),
            next_index: 0,
            buf: vec![0u8; buf_len],
        })
    }

    /// Reads the next shard. Returns `None` after the last one.
    ///
    /// The returned slice borrows the internal buffer and is only valid until
    /// the next call.
    pub fn next_shard(&mut self) -> Result<Option<(Shard, &[u8])>, TransferError> {
        if self.next_index >= self.shard_count {
            return Ok(None);
        }

        let index = self.next_index;
        let offset = index * self.shard_size as u64;
        let len = std::cmp::min(self.file_size - offset, self.shard_size as u64) as usize;

        // A file that shrank underneath us surfaces as UnexpectedEof.
        let window = &mut self.buf[..len];
        self.file.read_exact(window)?;

        let shard = Shard {
            index,
            offset,
            len,
            fingerprint: fingerprint_bytes(window),
            is_last: index + 1 == self.shard_count,
        };
        self.next_index += 1;
        Ok(Some((shard, &self.buf[..len])))
    }

    /// File size captured at open time.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn shard_count(&self) -> u64 {
        self.shard_count
    }

    /// Shards not yet returned.
    pub fn remaining(&self) -> u64 {
        self.shard_count - self.next_index
    }
}
