//! The remote-service seam.
//!
//! `PanService` is implemented by [`panlink_xpan::Client`]. Keeping the
//! pipelines behind a trait keeps them decoupled from HTTP and testable
//! with an in-memory store.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use panlink_transfer::Fingerprint;
use panlink_xpan::{Client, CreateReply, Error, FileMeta, ListEntry, PartReply, PrecreateReply};

/// Boxed future returned by every [`PanService`] call.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Abstract connection to the object-storage service.
pub trait PanService: Send + Sync {
    /// Lists one page of `dir`.
    fn list<'a>(
        &'a self,
        token: &'a str,
        dir: &'a str,
        start: u64,
        limit: u32,
    ) -> ServiceFuture<'a, Vec<ListEntry>>;

    /// Fetches object details, optionally including direct links.
    fn file_metas<'a>(
        &'a self,
        token: &'a str,
        fs_ids: &'a [u64],
        with_link: bool,
    ) -> ServiceFuture<'a, Vec<FileMeta>>;

    /// Opens an upload session.
    fn precreate<'a>(
        &'a self,
        token: &'a str,
        path: &'a str,
        size: u64,
        block_list: &'a [Fingerprint],
    ) -> ServiceFuture<'a, PrecreateReply>;

    /// Sends one shard of an open session.
    fn upload_part<'a>(
        &'a self,
        token: &'a str,
        path: &'a str,
        upload_id: &'a str,
        part_seq: u64,
        data: Vec<u8>,
    ) -> ServiceFuture<'a, PartReply>;

    /// Assembles the shards of a session into the final object.
    fn create<'a>(
        &'a self,
        token: &'a str,
        path: &'a str,
        size: u64,
        upload_id: &'a str,
        block_list: &'a [Fingerprint],
    ) -> ServiceFuture<'a, CreateReply>;

    /// Streams a direct link into `dest`, returning the bytes written.
    fn download<'a>(
        &'a self,
        token: &'a str,
        link: &'a str,
        dest: &'a Path,
    ) -> ServiceFuture<'a, u64>;
}

impl PanService for Client {
    fn list<'a>(
        &'a self,
        token: &'a str,
        dir: &'a str,
        start: u64,
        limit: u32,
    ) -> ServiceFuture<'a, Vec<ListEntry>> {
        Box::pin(Client::list(self, token, dir, start, limit))
    }

    fn file_metas<'a>(
        &'a self,
        token: &'a str,
        fs_ids: &'a [u64],
        with_link: bool,
    ) -> ServiceFuture<'a, Vec<FileMeta>> {
        Box::pin(Client::file_metas(self, token, fs_ids, with_link))
    }

    fn precreate<'a>(
        &'a self,
        token: &'a str,
        path: &'a str,
        size: u64,
        block_list: &'a [Fingerprint],
    ) -> ServiceFuture<'a, PrecreateReply> {
        Box::pin(Client::precreate(self, token, path, size, block_list))
    }

    fn upload_part<'a>(
        &'a self,
        token: &'a str,
        path: &'a str,
        upload_id: &'a str,
        part_seq: u64,
        data: Vec<u8>,
    ) -> ServiceFuture<'a, PartReply> {
        Box::pin(Client::upload_part(self, token, path, upload_id, part_seq, data))
    }

    fn create<'a>(
        &'a self,
        token: &'a str,
        path: &'a str,
        size: u64,
        upload_id: &'a str,
        block_list: &'a [Fingerprint],
    ) -> ServiceFuture<'a, CreateReply> {
        Box::pin(Client::create(self, token, path, size, upload_id, block_list))
    }

    fn download<'a>(
        &'a self,
        token: &'a str,
        link: &'a str,
        dest: &'a Path,
    ) -> ServiceFuture<'a, u64> {
        Box::pin(Client::download(self, token, link, dest))
    }
}
