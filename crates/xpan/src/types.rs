//! Reply types for the xpan open API.

use serde::{Deserialize, Deserializer, Serialize};

/// One row of a directory listing (`method=list`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    pub fs_id: u64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub server_filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, rename = "isdir", deserialize_with = "flag_from_int")]
    pub is_dir: bool,
    #[serde(default)]
    pub server_mtime: u64,
}

/// File details from `method=filemetas`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub fs_id: u64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    /// Short-lived direct download link; only present when requested.
    #[serde(default)]
    pub dlink: Option<String>,
}

/// Reply to `method=precreate`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PrecreateReply {
    #[serde(default, rename = "uploadid")]
    pub upload_id: String,
    #[serde(default)]
    pub return_type: i32,
    /// Part sequence numbers the service still wants.
    #[serde(default)]
    pub block_list: Vec<u64>,
}

/// Acknowledgment of one `superfile2` part.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PartReply {
    /// MD5 the service computed over the received part.
    #[serde(default)]
    pub md5: Option<String>,
}

/// Reply to `method=create`: the committed object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateReply {
    #[serde(default)]
    pub fs_id: u64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub md5: String,
}

// ---------------------------------------------------------------------------
// Envelopes (internal)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ListEnvelope {
    #[serde(default)]
    pub errno: i64,
    #[serde(default)]
    pub list: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetasEnvelope {
    #[serde(default)]
    pub errno: i64,
    #[serde(default)]
    pub list: Vec<FileMeta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrecreateEnvelope {
    #[serde(default)]
    pub errno: i64,
    #[serde(flatten)]
    pub reply: PrecreateReply,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateEnvelope {
    #[serde(default)]
    pub errno: i64,
    #[serde(flatten)]
    pub reply: CreateReply,
}

/// The PCS upload host reports failures as `error_code` instead of `errno`.
#[derive(Debug, Deserialize)]
pub(crate) struct PartEnvelope {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
    #[serde(flatten)]
    pub reply: PartReply,
}

/// Accepts `0`/`1` as well as JSON booleans.
fn flag_from_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(i64),
        Bool(bool),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Int(n) => n != 0,
        Flag::Bool(b) => b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_entry_isdir_from_int() {
        let json = r#"{"fs_id":1,"server_filename":"a","isdir":1,"size":0}"#;
        let entry: ListEntry = serde_json::from_str(json).unwrap();
        assert!(entry.is_dir);

        let json = r#"{"fs_id":2,"server_filename":"b","isdir":0,"size":9}"#;
        let entry: ListEntry = serde_json::from_str(json).unwrap();
        assert!(!entry.is_dir);
        assert_eq!(entry.size, 9);
    }

    #[test]
    fn list_envelope_tolerates_extra_fields() {
        let json = r#"{"errno":0,"guid":0,"request_id":123,"guid_info":"","list":[
            {"fs_id":7,"path":"/apps/a.bin","server_filename":"a.bin","size":3,"isdir":0,
             "category":6,"local_mtime":1,"server_mtime":2}
        ]}"#;
        let env: ListEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.errno, 0);
        assert_eq!(env.list[0].fs_id, 7);
        assert_eq!(env.list[0].server_mtime, 2);
    }

    #[test]
    fn metas_without_dlink() {
        let json = r#"{"errno":0,"list":[{"fs_id":7,"filename":"a.bin","size":3}]}"#;
        let env: MetasEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.list[0].dlink, None);
    }

    #[test]
    fn precreate_envelope_flattens_reply() {
        let json = r#"{"errno":0,"path":"/apps/a.bin","uploadid":"N1-abc","return_type":1,"block_list":[0,1]}"#;
        let env: PrecreateEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.reply.upload_id, "N1-abc");
        assert_eq!(env.reply.block_list, vec![0, 1]);
    }

    #[test]
    fn part_envelope_error_code() {
        let json = r#"{"error_code":31363,"error_msg":"block miss in superfile2","request_id":1}"#;
        let env: PartEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.error_code, 31363);
        assert_eq!(env.reply.md5, None);
    }
}
