//! Transfer engine for the xpan object store.
//!
//! This crate holds the **business logic** of moving one file up or down.
//! It talks to the service only through [`PanService`], which the HTTP
//! client implements; tests substitute an in-memory store.
//!
//! # Upload pipeline
//!
//! 1. **Fingerprint**: first full pass over the file, one MD5 per shard
//! 2. **Precreate**: open a session with the complete fingerprint list
//! 3. **Transmit**: send every shard, tagged with session id and index
//! 4. **Commit**: assemble the shards, re-supplying size and fingerprints
//!
//! # Download pipeline
//!
//! 1. **Locate**: paginated scan of the parent directory for the name
//! 2. **Resolve**: metadata fetch for a short-lived direct link
//! 3. **Stream**: GET the link and copy the body to disk

pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod resolve;
pub mod service;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{Operate, PanConfig};
pub use context::TransferContext;
pub use error::{Step, TransferError};
pub use service::{PanService, ServiceFuture};
pub use types::{
    CommittedFile, DirectLink, ListQuery, RemoteEntry, RemoteObjectHandle, TransferEvent,
    TransferTarget, UploadOptions,
};
