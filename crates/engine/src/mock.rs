//! In-memory object store implementing [`PanService`] for tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use panlink_transfer::{Fingerprint, fingerprint_bytes};
use panlink_xpan::{CreateReply, Error, FileMeta, ListEntry, PartReply, PrecreateReply};

use crate::service::{PanService, ServiceFuture};

/// errno the mock returns when assembly verification fails.
pub(crate) const ASSEMBLY_ERRNO: i64 = 31190;

/// One recorded service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List { dir: String, start: u64, limit: u32 },
    Metas { fs_ids: Vec<u64> },
    Precreate { path: String, size: u64, block_list: Vec<Fingerprint> },
    Part { index: u64, len: usize },
    Create { path: String, size: u64, block_list: Vec<Fingerprint> },
    Download { link: String },
}

struct StoredFile {
    fs_id: u64,
    data: Vec<u8>,
}

struct PendingUpload {
    path: String,
    size: u64,
    block_list: Vec<Fingerprint>,
    parts: BTreeMap<u64, Vec<u8>>,
}

#[derive(Default)]
pub(crate) struct Faults {
    /// Reject listing pages starting at or after this offset.
    pub list_errno: Option<(u64, i64)>,
    pub precreate_errno: Option<i64>,
    pub create_errno: Option<i64>,
    pub metas_errno: Option<i64>,
    pub metas_empty: bool,
    pub no_link: bool,
    /// Fail the part with this index with an HTTP 500.
    pub fail_part: Option<u64>,
    /// Acknowledge parts with a wrong md5.
    pub bad_ack_md5: bool,
    pub download_status: Option<u16>,
    /// Artificial delay per part, to make transmissions overlap.
    pub part_delay: Option<Duration>,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, StoredFile>,
    /// Extra listing rows per directory (name, is_dir).
    extra: HashMap<String, Vec<(String, bool)>>,
    sessions: HashMap<String, PendingUpload>,
    next_id: u64,
    calls: Vec<Call>,
}

#[derive(Default)]
pub(crate) struct MockService {
    state: Mutex<State>,
    pub faults: Faults,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Stores a file directly, bypassing the upload protocol.
    pub fn put_file(&self, path: &str, data: &[u8]) -> u64 {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let fs_id = 1000 + s.next_id;
        s.files.insert(
            path.to_string(),
            StoredFile {
                fs_id,
                data: data.to_vec(),
            },
        );
        fs_id
    }

    /// Adds `count` filler rows named `{prefix}-NNNN` to `dir`.
    pub fn pad_dir(&self, dir: &str, prefix: &str, count: usize, is_dir: bool) {
        let mut s = self.state.lock().unwrap();
        let rows = s.extra.entry(dir.to_string()).or_default();
        for i in 0..count {
            rows.push((format!("{prefix}-{i:04}"), is_dir));
        }
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        let s = self.state.lock().unwrap();
        s.files.get(path).map(|f| f.data.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn part_calls(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Part { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn rows(&self, dir: &str) -> Vec<ListEntry> {
        let s = self.state.lock().unwrap();
        let mut rows: Vec<ListEntry> = s
            .files
            .iter()
            .filter(|(path, _)| parent_of(path) == dir)
            .map(|(path, f)| ListEntry {
                fs_id: f.fs_id,
                path: path.clone(),
                server_filename: name_of(path).to_string(),
                size: f.data.len() as u64,
                is_dir: false,
                server_mtime: 0,
            })
            .collect();
        if let Some(extra) = s.extra.get(dir) {
            for (i, (name, is_dir)) in extra.iter().enumerate() {
                rows.push(ListEntry {
                    fs_id: 500_000 + i as u64,
                    path: join(dir, name),
                    server_filename: name.clone(),
                    size: 0,
                    is_dir: *is_dir,
                    server_mtime: 0,
                });
            }
        }
        rows.sort_by(|a, b| a.server_filename.cmp(&b.server_filename));
        rows
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

fn link_for(fs_id: u64) -> String {
    format!("https://d.pcs.example/file/{fs_id}?fid={fs_id}")
}

impl PanService for MockService {
    fn list<'a>(
        &'a self,
        _token: &'a str,
        dir: &'a str,
        start: u64,
        limit: u32,
    ) -> ServiceFuture<'a, Vec<ListEntry>> {
        self.record(Call::List {
            dir: dir.to_string(),
            start,
            limit,
        });
        if let Some((from, errno)) = self.faults.list_errno
            && start >= from
        {
            return Box::pin(async move { Err(Error::Remote { errno }) });
        }
        let page = self
            .rows(dir)
            .into_iter()
            .skip(start as usize)
            .take(limit as usize)
            .collect();
        Box::pin(async move { Ok(page) })
    }

    fn file_metas<'a>(
        &'a self,
        _token: &'a str,
        fs_ids: &'a [u64],
        with_link: bool,
    ) -> ServiceFuture<'a, Vec<FileMeta>> {
        self.record(Call::Metas {
            fs_ids: fs_ids.to_vec(),
        });
        Box::pin(async move {
            if let Some(errno) = self.faults.metas_errno {
                return Err(Error::Remote { errno });
            }
            if self.faults.metas_empty {
                return Ok(Vec::new());
            }
            let s = self.state.lock().unwrap();
            let metas = s
                .files
                .iter()
                .filter(|(_, f)| fs_ids.contains(&f.fs_id))
                .map(|(path, f)| FileMeta {
                    fs_id: f.fs_id,
                    path: path.clone(),
                    filename: name_of(path).to_string(),
                    size: f.data.len() as u64,
                    dlink: (with_link && !self.faults.no_link).then(|| link_for(f.fs_id)),
                })
                .collect();
            Ok(metas)
        })
    }

    fn precreate<'a>(
        &'a self,
        _token: &'a str,
        path: &'a str,
        size: u64,
        block_list: &'a [Fingerprint],
    ) -> ServiceFuture<'a, PrecreateReply> {
        self.record(Call::Precreate {
            path: path.to_string(),
            size,
            block_list: block_list.to_vec(),
        });
        Box::pin(async move {
            if let Some(errno) = self.faults.precreate_errno {
                return Err(Error::Remote { errno });
            }
            let mut s = self.state.lock().unwrap();
            s.next_id += 1;
            let upload_id = format!("N1-mock-{}", s.next_id);
            s.sessions.insert(
                upload_id.clone(),
                PendingUpload {
                    path: path.to_string(),
                    size,
                    block_list: block_list.to_vec(),
                    parts: BTreeMap::new(),
                },
            );
            Ok(PrecreateReply {
                upload_id,
                return_type: 1,
                block_list: (0..block_list.len() as u64).collect(),
            })
        })
    }

    fn upload_part<'a>(
        &'a self,
        _token: &'a str,
        _path: &'a str,
        upload_id: &'a str,
        part_seq: u64,
        data: Vec<u8>,
    ) -> ServiceFuture<'a, PartReply> {
        self.record(Call::Part {
            index: part_seq,
            len: data.len(),
        });
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.faults.part_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.faults.fail_part == Some(part_seq) {
                return Err(Error::Status {
                    status: 500,
                    body: "part store unavailable".into(),
                });
            }

            let md5 = if self.faults.bad_ack_md5 {
                fingerprint_bytes(b"something else").to_hex()
            } else {
                fingerprint_bytes(&data).to_hex()
            };
            let mut s = self.state.lock().unwrap();
            let Some(session) = s.sessions.get_mut(upload_id) else {
                return Err(Error::Remote { errno: 31299 });
            };
            session.parts.insert(part_seq, data);
            Ok(PartReply { md5: Some(md5) })
        })
    }

    fn create<'a>(
        &'a self,
        _token: &'a str,
        path: &'a str,
        size: u64,
        upload_id: &'a str,
        block_list: &'a [Fingerprint],
    ) -> ServiceFuture<'a, CreateReply> {
        self.record(Call::Create {
            path: path.to_string(),
            size,
            block_list: block_list.to_vec(),
        });
        Box::pin(async move {
            if let Some(errno) = self.faults.create_errno {
                return Err(Error::Remote { errno });
            }
            let mut s = self.state.lock().unwrap();
            let Some(session) = s.sessions.remove(upload_id) else {
                return Err(Error::Remote { errno: 31299 });
            };
            if session.path != path || session.size != size || session.block_list != block_list {
                return Err(Error::Remote {
                    errno: ASSEMBLY_ERRNO,
                });
            }
            let mut data = Vec::with_capacity(size as usize);
            for (i, expected) in block_list.iter().enumerate() {
                let Some(part) = session.parts.get(&(i as u64)) else {
                    return Err(Error::Remote {
                        errno: ASSEMBLY_ERRNO,
                    });
                };
                if fingerprint_bytes(part) != *expected {
                    return Err(Error::Remote {
                        errno: ASSEMBLY_ERRNO,
                    });
                }
                data.extend_from_slice(part);
            }
            if data.len() as u64 != size {
                return Err(Error::Remote {
                    errno: ASSEMBLY_ERRNO,
                });
            }
            let md5 = fingerprint_bytes(&data).to_hex();
            s.next_id += 1;
            let fs_id = 1000 + s.next_id;
            s.files
                .insert(path.to_string(), StoredFile { fs_id, data });
            Ok(CreateReply {
                fs_id,
                path: path.to_string(),
                size,
                md5,
            })
        })
    }

    fn download<'a>(
        &'a self,
        _token: &'a str,
        link: &'a str,
        dest: &'a Path,
    ) -> ServiceFuture<'a, u64> {
        self.record(Call::Download {
            link: link.to_string(),
        });
        Box::pin(async move {
            if let Some(status) = self.faults.download_status {
                return Err(Error::Status {
                    status,
                    body: "{\"error_code\":31066}".into(),
                });
            }
            let data = {
                let s = self.state.lock().unwrap();
                s.files
                    .values()
                    .find(|f| link == link_for(f.fs_id))
                    .map(|f| f.data.clone())
            };
            let Some(data) = data else {
                return Err(Error::Status {
                    status: 404,
                    body: String::new(),
                });
            };
            tokio::fs::write(dest, &data).await?;
            Ok(data.len() as u64)
        })
    }
}
