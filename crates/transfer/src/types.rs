use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    ELEVATED_MAX_FILE_SIZE, ELEVATED_SHARD_SIZE, STANDARD_MAX_FILE_SIZE, STANDARD_SHARD_SIZE,
};

/// Account tier that fixes the shard size and the per-file ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TierClass {
    #[default]
    Standard,
    Elevated,
}

impl TierClass {
    /// Maps the service's `is_svip` flag onto a tier.
    pub fn from_svip(is_svip: bool) -> Self {
        if is_svip {
            TierClass::Elevated
        } else {
            TierClass::Standard
        }
    }

    /// Shard size in bytes used for every shard except possibly the last.
    pub fn shard_size(self) -> usize {
        match self {
            TierClass::Standard => STANDARD_SHARD_SIZE,
            TierClass::Elevated => ELEVATED_SHARD_SIZE,
        }
    }

    /// Largest file size in bytes this tier may upload.
    pub fn max_file_size(self) -> u64 {
        match self {
            TierClass::Standard => STANDARD_MAX_FILE_SIZE,
            TierClass::Elevated => ELEVATED_MAX_FILE_SIZE,
        }
    }
}

impl fmt::Display for TierClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierClass::Standard => f.write_str("standard"),
            TierClass::Elevated => f.write_str("elevated"),
        }
    }
}

/// 128-bit MD5 digest of one shard's bytes.
///
/// Rendered as 32 lowercase hex characters, which is also its wire form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 16];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One contiguous window of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// Zero-based position; also the remote `partseq`.
    pub index: u64,
    /// Byte offset of the first byte within the file.
    pub offset: u64,
    /// Number of bytes in this shard.
    pub len: usize,
    pub fingerprint: Fingerprint,
    /// True only for the final shard of the file.
    pub is_last: bool,
}

impl Shard {
    /// Byte range covered by this shard.
    pub fn byte_range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.len as u64
    }
}

/// An upload in progress on the remote side.
///
/// Held in memory only: a new process starts a new session from shard 0.
/// Acknowledgments are tracked by index so shards may complete in any order.
#[derive(Debug, Clone)]
pub struct UploadSession {
    session_id: String,
    fingerprints: Vec<Fingerprint>,
    declared_size: u64,
    acknowledged: Vec<bool>,
}

impl UploadSession {
    pub fn new(session_id: String, fingerprints: Vec<Fingerprint>, declared_size: u64) -> Self {
        let acknowledged = vec![false; fingerprints.len()];
        Self {
            session_id,
            fingerprints,
            declared_size,
            acknowledged,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Fingerprints in shard index order.
    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn shard_count(&self) -> usize {
        self.fingerprints.len()
    }

    /// Expected fingerprint of shard `index`, if it exists.
    pub fn expected(&self, index: u64) -> Option<Fingerprint> {
        self.fingerprints.get(index as usize).copied()
    }

    /// Records that the remote side accepted shard `index`.
    ///
    /// Returns `false` for an index outside the session.
    pub fn acknowledge(&mut self, index: u64) -> bool {
        match self.acknowledged.get_mut(index as usize) {
            Some(slot) => {
                *slot = true;
                true
            }
            None => false,
        }
    }

    /// True once every shard has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.acknowledged.iter().all(|a| *a)
    }

    /// Indices not yet acknowledged, ascending.
    pub fn pending(&self) -> Vec<u64> {
        self.acknowledged
            .iter()
            .enumerate()
            .filter(|(_, a)| !**a)
            .map(|(i, _)| i as u64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 16])
    }

    #[test]
    fn tier_policy_constants() {
        assert_eq!(TierClass::Elevated.shard_size(), 32 * 1024 * 1024);
        assert_eq!(TierClass::Standard.shard_size(), 4 * 1024 * 1024);
        assert_eq!(TierClass::Elevated.max_file_size(), 20 * 1024 * 1024 * 1024);
        assert_eq!(TierClass::Standard.max_file_size(), 4 * 1024 * 1024 * 1024);
    }

    #[test]
    fn svip_flag_selects_elevated() {
        assert_eq!(TierClass::from_svip(true), TierClass::Elevated);
        assert_eq!(TierClass::from_svip(false), TierClass::Standard);
    }

    #[test]
    fn fingerprint_hex_roundtrip() {
        let f = fp(0xab);
        let hex = f.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(hex.parse::<Fingerprint>().unwrap(), f);
    }

    #[test]
    fn fingerprint_rejects_short_hex() {
        assert!("abcd".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn fingerprint_list_serializes_as_json_strings() {
        let list = vec![fp(0), fp(0xff)];
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(
            json,
            r#"["00000000000000000000000000000000","ffffffffffffffffffffffffffffffff"]"#
        );
        let back: Vec<Fingerprint> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn shard_byte_range() {
        let shard = Shard {
            index: 1,
            offset: 4,
            len: 4,
            fingerprint: fp(1),
            is_last: false,
        };
        assert_eq!(shard.byte_range(), 4..8);
    }

    #[test]
    fn session_acknowledges_out_of_order() {
        let mut session = UploadSession::new("up-1".into(), vec![fp(1), fp(2), fp(3)], 30);
        assert!(!session.is_complete());
        assert!(session.acknowledge(2));
        assert!(session.acknowledge(0));
        assert_eq!(session.pending(), vec![1]);
        assert!(session.acknowledge(1));
        assert!(session.is_complete());
    }

    #[test]
    fn session_rejects_unknown_index() {
        let mut session = UploadSession::new("up-1".into(), vec![fp(1)], 1);
        assert!(!session.acknowledge(5));
        assert_eq!(session.expected(0), Some(fp(1)));
        assert_eq!(session.expected(1), None);
    }
}
