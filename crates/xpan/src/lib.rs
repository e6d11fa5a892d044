//! Client for the xpan open API.
//!
//! Covers the five calls a chunked transfer needs (list, filemetas,
//! precreate, superfile2 upload, create) plus the streaming GET against a
//! resolved direct link. Every JSON reply carries an `errno`; zero is success
//! and anything else is surfaced verbatim as [`Error::Remote`].

pub mod client;
pub mod types;

pub use client::{Client, ClientOptions, DOWNLOAD_USER_AGENT, Endpoints, Error, build_download_url};
pub use types::{CreateReply, FileMeta, ListEntry, PartReply, PrecreateReply};
