//! Regular file inode.

use parking_lot::RwLock;

use super::meta::InodeMeta;
use super::types::InodeId;
use crate::error::{FsError, FsResult};
use crate::quota::BlockQuota;

/// Default file permissions (rw-r--r--).
pub const DEFAULT_FILE_PERMS: u32 = 0o644;

/// Fixed per-file memory overhead used by [`FileNode::footprint`].
pub const FILE_OVERHEAD: u64 = std::mem::size_of::<FileNode>() as u64;

/// Regular file backed by an exclusively owned byte buffer.
///
/// The attribute `size` always equals the buffer length. The data lock is
/// held across the attribute update so the two never disagree for writers.
#[derive(Debug)]
pub struct FileNode {
    /// Attribute block.
    meta: InodeMeta,
    /// File contents.
    data: RwLock<Vec<u8>>,
}

impl FileNode {
    /// Create an empty file.
    ///
    /// # Arguments
    /// * `ino` - Inode number
    /// * `perm` - Permission bits (type bits are ignored)
    /// * `uid` - Owner user id
    /// * `gid` - Owner group id
    pub fn new(ino: InodeId, perm: u32, uid: u32, gid: u32) -> Self {
        let mode: u32 = libc::S_IFREG as u32 | (perm & 0o7777);
        Self {
            meta: InodeMeta::new(ino, mode, 1, uid, gid),
            data: RwLock::new(Vec::new()),
        }
    }

    /// Attribute block.
    pub fn meta(&self) -> &InodeMeta {
        &self.meta
    }

    /// Estimated memory cost of this file.
    pub fn footprint(&self) -> u64 {
        self.data.read().len() as u64 + FILE_OVERHEAD
    }

    /// Read up to `size` bytes starting at `offset`.
    ///
    /// # Returns
    /// The bytes read; empty if `offset` is at or past the end.
    pub fn read(&self, offset: u64, size: usize) -> Vec<u8> {
        let data = self.data.read();
        let len: u64 = data.len() as u64;
        if offset >= len {
            return Vec::new();
        }
        let start: usize = offset as usize;
        let end: usize = offset.saturating_add(size as u64).min(len) as usize;
        let out: Vec<u8> = data[start..end].to_vec();
        drop(data);
        self.meta.touch_accessed();
        out
    }

    /// Write `buf` at `offset`, extending the file if needed.
    ///
    /// Any gap between the old end and `offset` is zero-filled. Growth is
    /// charged to `quota` before the buffer changes.
    ///
    /// # Arguments
    /// * `quota` - Global block counter
    /// * `offset` - Byte offset to write at
    /// * `buf` - Bytes to write
    ///
    /// # Returns
    /// Number of bytes written, `OutOfSpace` with the file untouched, or
    /// `InvalidArgument` if the write would end past `u64::MAX`.
    pub fn write(&self, quota: &BlockQuota, offset: u64, buf: &[u8]) -> FsResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end: u64 = offset.checked_add(buf.len() as u64).ok_or_else(|| {
            FsError::InvalidArgument(format!("write at offset {} overflows", offset))
        })?;
        let end_idx: usize = usize::try_from(end).map_err(|_| {
            FsError::InvalidArgument(format!("write end {} exceeds address space", end))
        })?;

        let mut data = self.data.write();
        if end > data.len() as u64 {
            self.meta.resize(quota, end)?;
            data.resize(end_idx, 0);
        }
        let start: usize = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        drop(data);

        self.meta.touch_modified();
        Ok(buf.len())
    }

    /// Set the file length.
    ///
    /// Shrinking drops the tail and releases its blocks; growing zero-fills
    /// and reserves blocks first.
    ///
    /// # Arguments
    /// * `quota` - Global block counter
    /// * `new_size` - New length in bytes
    pub fn truncate(&self, quota: &BlockQuota, new_size: u64) -> FsResult<()> {
        let mut data = self.data.write();
        let old_size: u64 = data.len() as u64;
        if new_size == old_size {
            return Ok(());
        }
        self.meta.resize(quota, new_size)?;
        data.resize(new_size as usize, 0);
        if new_size < old_size {
            data.shrink_to_fit();
        }
        drop(data);

        self.meta.touch_modified();
        Ok(())
    }

    /// Copy of the whole buffer.
    pub fn contents(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl Clone for FileNode {
    fn clone(&self) -> Self {
        let data = self.data.read();
        Self {
            meta: self.meta.clone(),
            data: RwLock::new(data.clone()),
        }
    }
}
