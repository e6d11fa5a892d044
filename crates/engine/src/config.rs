//! Configuration file management.
//!
//! Configuration lives in a JSON file, by default
//! `~/.config/panlink/config.json`:
//!
//! ```json
//! {
//!   "access_token": "...",
//!   "operate": "uploadFile",
//!   "is_svip": false,
//!   "log_path": "/var/log/panlink.log",
//!   "local_path": "./a.bin",
//!   "remote_path": "/apps/demo/a.bin"
//! }
//! ```

use std::path::{Path, PathBuf};

use panlink_transfer::TierClass;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::types::{ListQuery, TransferTarget};

/// Environment variable that replaces the token from the file.
pub const TOKEN_ENV: &str = "PANLINK_ACCESS_TOKEN";

/// Operation a configuration file is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operate {
    #[serde(rename = "uploadFile")]
    UploadFile,
    #[serde(rename = "downloadFile")]
    DownloadFile,
    #[serde(rename = "queryDir")]
    QueryDir,
}

/// Contents of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanConfig {
    pub access_token: String,
    pub operate: Operate,
    /// Selects the elevated tier.
    #[serde(default)]
    pub is_svip: bool,
    /// Additional log file; empty means console only.
    #[serde(default)]
    pub log_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    /// Directory for `queryDir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PanConfig {
    /// Reads and validates the file at `path`, then applies the environment override.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TransferError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::parse(&content)
            .map_err(|e| TransferError::ConfigInvalid(format!("{}: {e}", path.display())))?;
        config.apply_env();
        tracing::debug!(path = %path.display(), operate = ?config.operate, "configuration loaded");
        Ok(config)
    }

    /// Parses configuration JSON.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        config_base_dir().join("panlink").join("config.json")
    }

    /// Replaces the token with `PANLINK_ACCESS_TOKEN` when it is set.
    pub fn apply_env(&mut self) {
        self.with_token_override(std::env::var(TOKEN_ENV).ok());
    }

    /// Replaces the token with `token` unless it is `None` or empty.
    pub fn with_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.access_token = token;
        }
    }

    pub fn tier(&self) -> TierClass {
        TierClass::from_svip(self.is_svip)
    }

    /// Builds an upload target, falling back to the file's paths.
    pub fn upload_target(
        &self,
        local: Option<PathBuf>,
        remote: Option<String>,
    ) -> Result<TransferTarget, TransferError> {
        self.target(local, remote)
    }

    /// Builds a download target, falling back to the file's paths.
    pub fn download_target(
        &self,
        local: Option<PathBuf>,
        remote: Option<String>,
    ) -> Result<TransferTarget, TransferError> {
        self.target(local, remote)
    }

    /// Builds a listing query, falling back to the file's `dir` and `limit`.
    pub fn list_query(
        &self,
        dir: Option<String>,
        limit: Option<u32>,
    ) -> Result<ListQuery, TransferError> {
        let dir = dir
            .or_else(|| self.dir.clone())
            .ok_or_else(|| TransferError::ConfigInvalid("dir is required".into()))?;
        let mut query = ListQuery::new(&self.access_token, dir);
        if let Some(limit) = limit.or(self.limit) {
            query = query.with_limit(limit);
        }
        Ok(query)
    }

    fn target(
        &self,
        local: Option<PathBuf>,
        remote: Option<String>,
    ) -> Result<TransferTarget, TransferError> {
        let local = local
            .or_else(|| self.local_path.clone())
            .ok_or_else(|| TransferError::ConfigInvalid("local_path is required".into()))?;
        let remote = remote
            .or_else(|| self.remote_path.clone())
            .ok_or_else(|| TransferError::ConfigInvalid("remote_path is required".into()))?;
        let target = TransferTarget::new(local, remote, &self.access_token, self.tier());
        target.validate()?;
        Ok(target)
    }
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }
}
