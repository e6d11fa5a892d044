//! xpan API client.
//!
//! Async HTTP client using `reqwest`. The access token always travels as the
//! `access_token` query parameter; no `Authorization` header is ever sent.

use std::path::Path;
use std::time::Duration;

use panlink_transfer::Fingerprint;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};
use url::Url;

use crate::types::{
    CreateEnvelope, CreateReply, FileMeta, ListEntry, ListEnvelope, MetasEnvelope, PartEnvelope,
    PartReply, PrecreateEnvelope, PrecreateReply,
};

const DEFAULT_API_BASE: &str = "https://pan.baidu.com";
const DEFAULT_PCS_BASE: &str = "https://d.pcs.baidu.com";

const FILE_PATH: &str = "/rest/2.0/xpan/file";
const MULTIMEDIA_PATH: &str = "/rest/2.0/xpan/multimedia";
const SUPERFILE_PATH: &str = "/rest/2.0/pcs/superfile2";

/// Identifying string the service's download edge insists on.
pub const DOWNLOAD_USER_AGENT: &str = "pan.baidu.com";

/// Errors from the xpan client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned errno {errno}")]
    Remote { errno: i64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Base URLs of the two service hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Host serving list, filemetas, precreate and create.
    pub api_base: String,
    /// Host accepting `superfile2` part uploads.
    pub pcs_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            pcs_base: DEFAULT_PCS_BASE.into(),
        }
    }
}

impl Endpoints {
    /// Points both hosts at one base URL.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            api_base: base.clone(),
            pcs_base: base,
        }
    }
}

/// Transport tuning for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound for each API call (list, metas, precreate, part, create).
    pub request_timeout: Duration,
    /// TCP/TLS connect bound; the only bound applied to the download GET.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// xpan API client. Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoints: Endpoints,
    request_timeout: Duration,
}

impl Client {
    /// Creates a client against the public service with default options.
    pub fn new() -> Result<Self, Error> {
        Self::with_options(Endpoints::default(), ClientOptions::default())
    }

    /// Creates a client against custom hosts.
    pub fn with_options(endpoints: Endpoints, options: ClientOptions) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(DOWNLOAD_USER_AGENT)
            .connect_timeout(options.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            endpoints,
            request_timeout: options.request_timeout,
        })
    }

    /// Lists one page of `dir` starting at entry `start`.
    pub async fn list(
        &self,
        token: &str,
        dir: &str,
        start: u64,
        limit: u32,
    ) -> Result<Vec<ListEntry>, Error> {
        let url = format!("{}{}", self.endpoints.api_base, FILE_PATH);
        let params = [
            ("method", "list".to_string()),
            ("access_token", token.to_string()),
            ("dir", dir.to_string()),
            ("start", start.to_string()),
            ("limit", limit.to_string()),
        ];
        let req = self.http.get(&url).query(&params);
        let env: ListEnvelope = self.send_json(req).await?;
        check_errno(env.errno)?;
        debug!(dir, start, count = env.list.len(), "listed directory page");
        Ok(env.list)
    }

    /// Fetches details for `fs_ids`, including direct links when `with_link` is set.
    pub async fn file_metas(
        &self,
        token: &str,
        fs_ids: &[u64],
        with_link: bool,
    ) -> Result<Vec<FileMeta>, Error> {
        let url = format!("{}{}", self.endpoints.api_base, MULTIMEDIA_PATH);
        let params = [
            ("method", "filemetas".to_string()),
            ("access_token", token.to_string()),
            ("fsids", serde_json::to_string(fs_ids)?),
            ("dlink", if with_link { "1" } else { "0" }.to_string()),
        ];
        let req = self.http.get(&url).query(&params);
        let env: MetasEnvelope = self.send_json(req).await?;
        check_errno(env.errno)?;
        Ok(env.list)
    }

    /// Declares an upload of `size` bytes to `path` with the given shard fingerprints.
    pub async fn precreate(
        &self,
        token: &str,
        path: &str,
        size: u64,
        block_list: &[Fingerprint],
    ) -> Result<PrecreateReply, Error> {
        let url = format!("{}{}", self.endpoints.api_base, FILE_PATH);
        let form = [
            ("path", path.to_string()),
            ("size", size.to_string()),
            ("isdir", "0".to_string()),
            ("autoinit", "1".to_string()),
            ("block_list", serde_json::to_string(block_list)?),
        ];
        let req = self
            .http
            .post(&url)
            .query(&[("method", "precreate"), ("access_token", token)])
            .form(&form);
        let env: PrecreateEnvelope = self.send_json(req).await?;
        check_errno(env.errno)?;
        info!(path, upload_id = %env.reply.upload_id, "upload session opened");
        Ok(env.reply)
    }

    /// Sends part `part_seq` of session `upload_id`.
    pub async fn upload_part(
        &self,
        token: &str,
        path: &str,
        upload_id: &str,
        part_seq: u64,
        data: Vec<u8>,
    ) -> Result<PartReply, Error> {
        let url = format!("{}{}", self.endpoints.pcs_base, SUPERFILE_PATH);
        let len = data.len();
        let part_seq = part_seq.to_string();
        let params = [
            ("method", "upload"),
            ("access_token", token),
            ("type", "tmpfile"),
            ("path", path),
            ("uploadid", upload_id),
            ("partseq", part_seq.as_str()),
        ];
        let form = Form::new().part("file", Part::bytes(data).file_name("part"));
        let req = self.http.post(&url).query(&params).multipart(form);
        let env: PartEnvelope = self.send_json(req).await?;
        if env.error_code != 0 {
            error!(
                part_seq = %part_seq,
                error_code = env.error_code,
                error_msg = %env.error_msg,
                "part rejected"
            );
            return Err(Error::Remote {
                errno: env.error_code,
            });
        }
        debug!(part_seq = %part_seq, bytes = len, "part uploaded");
        Ok(env.reply)
    }

    /// Assembles the parts of `upload_id` into the final object at `path`.
    pub async fn create(
        &self,
        token: &str,
        path: &str,
        size: u64,
        upload_id: &str,
        block_list: &[Fingerprint],
    ) -> Result<CreateReply, Error> {
        let url = format!("{}{}", self.endpoints.api_base, FILE_PATH);
        let form = [
            ("path", path.to_string()),
            ("size", size.to_string()),
            ("isdir", "0".to_string()),
            ("uploadid", upload_id.to_string()),
            ("block_list", serde_json::to_string(block_list)?),
        ];
        let req = self
            .http
            .post(&url)
            .query(&[("method", "create"), ("access_token", token)])
            .form(&form);
        let env: CreateEnvelope = self.send_json(req).await?;
        check_errno(env.errno)?;
        info!(path, fs_id = env.reply.fs_id, "object committed");
        Ok(env.reply)
    }

    /// Streams the object behind `link` into `dest`, returning the bytes written.
    ///
    /// `dest` is only created once the service has answered 200.
    pub async fn download(&self, token: &str, link: &str, dest: &Path) -> Result<u64, Error> {
        let url = build_download_url(link, token)?;
        debug!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "requesting download"
        );

        let mut resp = self
            .http
            .get(url)
            .header(USER_AGENT, DOWNLOAD_USER_AGENT)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "download refused");
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let file = tokio::fs::File::create(dest).await?;
        let mut out = tokio::io::BufWriter::new(file);
        let mut written: u64 = 0;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        info!(dest = %dest.display(), bytes = written, "download finished");
        Ok(written)
    }

    /// Sends an API request with the per-call timeout and decodes the JSON reply.
    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let resp = req.timeout(self.request_timeout).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Adds `access_token` to a direct link, replacing any token already present.
pub fn build_download_url(link: &str, token: &str) -> Result<Url, Error> {
    let mut url = Url::parse(link).map_err(|e| Error::InvalidUrl(format!("{link}: {e}")))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "access_token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("access_token", token);
    Ok(url)
}

fn check_errno(errno: i64) -> Result<(), Error> {
    if errno == 0 {
        Ok(())
    } else {
        Err(Error::Remote { errno })
    }
}
