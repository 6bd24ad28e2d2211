//! Attribute block shared by every inode variant.

use std::time::SystemTime;

use parking_lot::RwLock;

use super::types::{blocks_for, InodeAttr, InodeId, BLOCK_SIZE};
use crate::error::FsResult;
use crate::quota::BlockQuota;

/// Identity plus the lock-guarded attribute block of one inode.
///
/// `size` and `blocks` only change together through [`InodeMeta::resize`],
/// which keeps `blocks == ceil(size / BLOCK_SIZE)` and forwards the block
/// delta to the quota.
#[derive(Debug)]
pub struct InodeMeta {
    /// Inode number, fixed for the node's lifetime.
    ino: InodeId,
    /// Attribute block.
    attr: RwLock<InodeAttr>,
}

impl InodeMeta {
    /// Create a fully initialized attribute block.
    ///
    /// # Arguments
    /// * `ino` - Inode number
    /// * `mode` - File type and permission bits
    /// * `nlink` - Initial link count
    /// * `uid` - Owner user id
    /// * `gid` - Owner group id
    pub fn new(ino: InodeId, mode: u32, nlink: u32, uid: u32, gid: u32) -> Self {
        let now: SystemTime = SystemTime::now();
        Self {
            ino,
            attr: RwLock::new(InodeAttr {
                ino,
                mode,
                nlink,
                uid,
                gid,
                size: 0,
                blocks: 0,
                rdev: 0,
                blksize: BLOCK_SIZE as u32,
                atime: now,
                mtime: now,
                ctime: now,
            }),
        }
    }

    /// Inode number.
    pub fn ino(&self) -> InodeId {
        self.ino
    }

    /// Snapshot of the attribute block.
    pub fn attr(&self) -> InodeAttr {
        self.attr.read().clone()
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.attr.read().size
    }

    /// Size in blocks.
    pub fn blocks(&self) -> u64 {
        self.attr.read().blocks
    }

    /// File type and permission bits.
    pub fn mode(&self) -> u32 {
        self.attr.read().mode
    }

    /// Hard link count.
    pub fn nlink(&self) -> u32 {
        self.attr.read().nlink
    }

    /// Set the size, recompute blocks and charge the difference to `quota`.
    ///
    /// Growth reserves the extra blocks first; on `OutOfSpace` neither the
    /// attributes nor the quota change.
    ///
    /// # Arguments
    /// * `quota` - Global block counter
    /// * `new_size` - New size in bytes
    pub fn resize(&self, quota: &BlockQuota, new_size: u64) -> FsResult<()> {
        let mut attr = self.attr.write();
        set_size(&mut attr, quota, new_size, 0)
    }

    /// Grow the size by `bytes`, requiring `blocks_for(bytes)` free blocks
    /// under the quota even when the growth fits in already charged blocks.
    ///
    /// Only the real block delta is charged.
    ///
    /// # Arguments
    /// * `quota` - Global block counter
    /// * `bytes` - Bytes to add
    pub fn grow_reserving(&self, quota: &BlockQuota, bytes: u64) -> FsResult<()> {
        let mut attr = self.attr.write();
        let new_size: u64 = attr.size.saturating_add(bytes);
        set_size(&mut attr, quota, new_size, blocks_for(bytes))
    }

    /// Grow or shrink the size by a signed byte delta.
    ///
    /// # Panics
    /// If a negative delta is larger than the current size.
    pub fn apply_size_delta(&self, quota: &BlockQuota, delta: i64) -> FsResult<()> {
        let mut attr = self.attr.write();
        let new_size: u64 = if delta >= 0 {
            attr.size + delta as u64
        } else {
            let shrink: u64 = delta.unsigned_abs();
            if shrink > attr.size {
                tracing::error!(ino = self.ino, size = attr.size, delta, "size delta underflow");
                panic!(
                    "size delta {} on inode {} would make size negative (size {})",
                    delta, self.ino, attr.size
                );
            }
            attr.size - shrink
        };
        set_size(&mut attr, quota, new_size, 0)
    }

    /// Give every charged block back to the quota. Used when the inode is
    /// dropped from the registry.
    pub fn release_blocks(&self, quota: &BlockQuota) {
        let mut attr = self.attr.write();
        quota.release(attr.blocks);
        attr.blocks = 0;
        attr.size = 0;
    }

    /// Refresh mtime and ctime.
    pub fn touch_modified(&self) {
        let now: SystemTime = SystemTime::now();
        let mut attr = self.attr.write();
        attr.mtime = now;
        attr.ctime = now;
    }

    /// Refresh ctime.
    pub fn touch_changed(&self) {
        self.attr.write().ctime = SystemTime::now();
    }

    /// Refresh atime.
    pub fn touch_accessed(&self) {
        self.attr.write().atime = SystemTime::now();
    }

    /// Replace the permission bits, keeping the file type.
    pub fn set_permissions(&self, perm: u32) {
        let mut attr = self.attr.write();
        attr.mode = (attr.mode & super::types::S_IFMT) | (perm & 0o7777);
        attr.ctime = SystemTime::now();
    }

    /// Change ownership. `None` leaves the field as is.
    pub fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) {
        let mut attr = self.attr.write();
        if let Some(uid) = uid {
            attr.uid = uid;
        }
        if let Some(gid) = gid {
            attr.gid = gid;
        }
        attr.ctime = SystemTime::now();
    }

    /// Set access and modification times. `None` leaves the field as is.
    pub fn set_times(&self, atime: Option<SystemTime>, mtime: Option<SystemTime>) {
        let mut attr = self.attr.write();
        if let Some(atime) = atime {
            attr.atime = atime;
        }
        if let Some(mtime) = mtime {
            attr.mtime = mtime;
        }
        attr.ctime = SystemTime::now();
    }

    pub(crate) fn set_rdev(&self, rdev: u64) {
        self.attr.write().rdev = rdev;
    }

    /// Increment the link count.
    ///
    /// # Returns
    /// The new link count.
    pub fn inc_nlink(&self) -> u32 {
        let mut attr = self.attr.write();
        attr.nlink += 1;
        attr.ctime = SystemTime::now();
        attr.nlink
    }

    /// Decrement the link count, saturating at zero.
    ///
    /// # Returns
    /// The new link count.
    pub fn dec_nlink(&self) -> u32 {
        let mut attr = self.attr.write();
        attr.nlink = attr.nlink.saturating_sub(1);
        attr.ctime = SystemTime::now();
        attr.nlink
    }
}

/// Update size and blocks together under an already held write lock.
///
/// Growth must also leave `check_blocks` of headroom under the quota.
fn set_size(
    attr: &mut InodeAttr,
    quota: &BlockQuota,
    new_size: u64,
    check_blocks: u64,
) -> FsResult<()> {
    let old_blocks: u64 = attr.blocks;
    let new_blocks: u64 = blocks_for(new_size);
    if new_blocks > old_blocks || (new_size > attr.size && check_blocks > 0) {
        quota.try_reserve_checked(check_blocks, new_blocks - old_blocks)?;
    } else {
        quota.release(old_blocks - new_blocks);
    }
    attr.size = new_size;
    attr.blocks = new_blocks;
    Ok(())
}

impl Clone for InodeMeta {
    fn clone(&self) -> Self {
        Self {
            ino: self.ino,
            attr: RwLock::new(self.attr.read().clone()),
        }
    }
}
