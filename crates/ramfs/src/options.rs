//! Configuration options for the RAM filesystem.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::inode::BLOCK_SIZE;

/// Default quota: 4GB worth of blocks.
pub const DEFAULT_QUOTA_BLOCKS: u64 = 4 * 1024 * 1024 * 1024 / BLOCK_SIZE;

/// Default maximum entry name length (POSIX NAME_MAX).
pub const DEFAULT_MAX_NAME_LEN: usize = 255;

/// Default idle time before an abandoned readdir session is reaped.
pub const DEFAULT_READDIR_SESSION_TTL_SECS: u64 = 300;

/// Filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsOptions {
    /// Maximum number of blocks the filesystem may use.
    pub quota_blocks: u64,
    /// Maximum length of a single entry name in bytes.
    pub max_name_len: usize,
    /// Idle seconds after which an unfinished readdir session is dropped.
    pub readdir_session_ttl_secs: u64,
    /// Permission bits of the root directory.
    pub root_mode: u32,
    /// Owner of the root directory.
    pub root_uid: u32,
    /// Group of the root directory.
    pub root_gid: u32,
    /// Attribute/entry TTL handed to the kernel (FUSE adapter only).
    pub attr_timeout_secs: u64,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            quota_blocks: DEFAULT_QUOTA_BLOCKS,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            readdir_session_ttl_secs: DEFAULT_READDIR_SESSION_TTL_SECS,
            root_mode: 0o755,
            root_uid: 0,
            root_gid: 0,
            attr_timeout_secs: 1,
        }
    }
}

impl FsOptions {
    /// Parse options from a JSON document. Missing fields take defaults.
    ///
    /// # Arguments
    /// * `json` - JSON object text
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set the block quota.
    ///
    /// # Arguments
    /// * `blocks` - Maximum number of blocks
    pub fn with_quota_blocks(mut self, blocks: u64) -> Self {
        self.quota_blocks = blocks;
        self
    }

    /// Set the quota in bytes, rounded up to whole blocks.
    ///
    /// # Arguments
    /// * `bytes` - Maximum number of bytes
    pub fn with_quota_bytes(mut self, bytes: u64) -> Self {
        self.quota_blocks = crate::inode::blocks_for(bytes);
        self
    }

    /// Set the maximum entry name length.
    pub fn with_max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    /// Set the readdir session idle timeout.
    ///
    /// # Arguments
    /// * `ttl` - Idle time before an unfinished session is reaped
    pub fn with_readdir_session_ttl(mut self, ttl: Duration) -> Self {
        self.readdir_session_ttl_secs = ttl.as_secs();
        self
    }

    /// Set root directory ownership.
    ///
    /// # Arguments
    /// * `uid` - Owner user id
    /// * `gid` - Owner group id
    pub fn with_root_owner(mut self, uid: u32, gid: u32) -> Self {
        self.root_uid = uid;
        self.root_gid = gid;
        self
    }

    /// Readdir session idle timeout as a `Duration`.
    pub fn readdir_session_ttl(&self) -> Duration {
        Duration::from_secs(self.readdir_session_ttl_secs)
    }

    /// Attribute TTL as a `Duration`.
    pub fn attr_timeout(&self) -> Duration {
        Duration::from_secs(self.attr_timeout_secs)
    }
}
