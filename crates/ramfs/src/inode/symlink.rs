//! Symlink inode implementation.

use super::meta::InodeMeta;
use super::types::InodeId;
use crate::error::FsResult;
use crate::quota::BlockQuota;

/// Symlink permissions (always 0o777 - target determines access).
pub const SYMLINK_PERMS: u32 = 0o777;

/// Fixed per-symlink memory overhead.
pub const SYMLINK_OVERHEAD: u64 = std::mem::size_of::<SymlinkNode>() as u64;

/// Symlink inode representing a symbolic link.
#[derive(Debug, Clone)]
pub struct SymlinkNode {
    /// Attribute block.
    meta: InodeMeta,
    /// Target path, never changed after construction.
    target: String,
}

impl SymlinkNode {
    /// Create a new symlink inode and charge its size to `quota`.
    ///
    /// # Arguments
    /// * `quota` - Global block counter
    /// * `ino` - Inode number
    /// * `target` - Target path
    /// * `uid` - Owner user id
    /// * `gid` - Owner group id
    pub fn new(
        quota: &BlockQuota,
        ino: InodeId,
        target: String,
        uid: u32,
        gid: u32,
    ) -> FsResult<Self> {
        let mode: u32 = libc::S_IFLNK as u32 | SYMLINK_PERMS;
        let meta: InodeMeta = InodeMeta::new(ino, mode, 1, uid, gid);
        meta.resize(quota, target.len() as u64)?;
        Ok(Self { meta, target })
    }

    /// Attribute block.
    pub fn meta(&self) -> &InodeMeta {
        &self.meta
    }

    /// Get the symlink target path.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Estimated memory cost of this link.
    pub fn footprint(&self) -> u64 {
        self.target.len() as u64 + SYMLINK_OVERHEAD
    }
}
