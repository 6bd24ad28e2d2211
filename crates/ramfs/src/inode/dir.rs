//! Directory inode implementation.
//!
//! A directory has two independent locks: the attribute block inside
//! [`InodeMeta`] and the children table. Children mutations hold the table
//! lock for the whole search-then-modify step and take the attribute lock
//! only briefly to apply the size delta, so `stat`-like readers never wait
//! behind a full children mutation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::meta::InodeMeta;
use super::types::{InodeId, INO_NOTFOUND};
use crate::error::{FsError, FsResult};
use crate::fs::RamFs;
use crate::readdir::{Cookie, ReaddirHandle, START_COOKIE};

/// Default directory permissions (rwxr-xr-x).
pub const DEFAULT_DIR_PERMS: u32 = 0o755;

/// Size charged to a directory with no entries.
pub const DIR_BASE_SIZE: u64 = std::mem::size_of::<BTreeMap<String, InodeId>>() as u64;

/// Fixed part of the size charged per entry (tree node links, key and value),
/// on top of the name length.
pub const DIRENT_OVERHEAD: u64 = (std::mem::size_of::<String>()
    + std::mem::size_of::<InodeId>()
    + 4 * std::mem::size_of::<usize>()) as u64;

/// Fixed per-directory memory overhead used by [`DirNode::footprint`].
pub const DIR_OVERHEAD: u64 = std::mem::size_of::<DirNode>() as u64;

/// Size charged for an entry named `name`.
///
/// # Arguments
/// * `name` - Entry name
pub fn dirent_size(name: &str) -> u64 {
    DIRENT_OVERHEAD + name.len() as u64
}

/// Directory inode: a sorted name → inode number table.
#[derive(Debug)]
pub struct DirNode {
    /// Attribute block.
    meta: InodeMeta,
    /// Child entries: name → inode ID. Includes "." and "..".
    children: RwLock<BTreeMap<String, InodeId>>,
    /// Set under the children write lock once the directory is being
    /// removed; no entry can be added afterwards.
    retired: AtomicBool,
}

impl DirNode {
    /// Create an empty directory and charge its base size to the quota.
    ///
    /// "." and ".." are not added here; the registry links them in.
    ///
    /// # Arguments
    /// * `fs` - Owning filesystem
    /// * `ino` - Inode number
    /// * `perm` - Permission bits
    /// * `uid` - Owner user id
    /// * `gid` - Owner group id
    pub fn new(fs: &RamFs, ino: InodeId, perm: u32, uid: u32, gid: u32) -> FsResult<Self> {
        let mode: u32 = libc::S_IFDIR as u32 | (perm & 0o7777);
        let meta: InodeMeta = InodeMeta::new(ino, mode, 2, uid, gid);
        meta.resize(fs.quota(), DIR_BASE_SIZE)?;
        Ok(Self {
            meta,
            children: RwLock::new(BTreeMap::new()),
            retired: AtomicBool::new(false),
        })
    }

    /// Attribute block.
    pub fn meta(&self) -> &InodeMeta {
        &self.meta
    }

    /// Estimated memory cost of this directory.
    pub fn footprint(&self) -> u64 {
        self.meta.size() + DIR_OVERHEAD
    }

    /// Add a child entry.
    ///
    /// # Arguments
    /// * `fs` - Owning filesystem (quota)
    /// * `name` - Child entry name
    /// * `ino` - Child inode number
    ///
    /// # Returns
    /// `AlreadyExists` if the name is taken, `OutOfSpace` unless the quota
    /// has `blocks_for(dirent_size(name))` free blocks, even when the entry
    /// fits in the directory's last block. `NotFound` once the directory
    /// has been retired. On failure nothing changes.
    pub fn add_child(&self, fs: &RamFs, name: &str, ino: InodeId) -> FsResult<()> {
        let mut children = self.children.write();
        if self.retired.load(Ordering::Acquire) {
            return Err(FsError::NotFound(format!("directory {}", self.meta.ino())));
        }
        if children.contains_key(name) {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        self.meta.grow_reserving(fs.quota(), dirent_size(name))?;
        children.insert(name.to_string(), ino);
        drop(children);

        self.meta.touch_modified();
        tracing::trace!(dir = self.meta.ino(), name, ino, "added child");
        Ok(())
    }

    /// Point an existing entry at a different inode.
    ///
    /// The directory size is left alone; the entry count does not change.
    ///
    /// # Arguments
    /// * `name` - Child entry name
    /// * `ino` - New inode number
    pub fn update_child(&self, name: &str, ino: InodeId) -> FsResult<()> {
        let mut children = self.children.write();
        match children.get_mut(name) {
            Some(slot) => *slot = ino,
            None => return Err(FsError::NotFound(name.to_string())),
        }
        drop(children);

        self.meta.touch_modified();
        tracing::trace!(dir = self.meta.ino(), name, ino, "updated child");
        Ok(())
    }

    /// Remove a child entry.
    ///
    /// Does not check whether a removed directory is empty; the caller must.
    ///
    /// # Arguments
    /// * `fs` - Owning filesystem (quota)
    /// * `name` - Child entry name
    ///
    /// # Returns
    /// The removed inode number.
    pub fn remove_child(&self, fs: &RamFs, name: &str) -> FsResult<InodeId> {
        let mut children = self.children.write();
        let ino: InodeId = children
            .remove(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        // Shrinking never fails.
        self.meta
            .apply_size_delta(fs.quota(), -(dirent_size(name) as i64))?;
        drop(children);

        self.meta.touch_modified();
        tracing::trace!(dir = self.meta.ino(), name, ino, "removed child");
        Ok(ino)
    }

    /// Remove `name` only if it still maps to `ino`.
    ///
    /// # Returns
    /// `NotFound` if the entry is gone or now names another inode.
    pub fn remove_child_matching(&self, fs: &RamFs, name: &str, ino: InodeId) -> FsResult<()> {
        let mut children = self.children.write();
        if children.get(name) != Some(&ino) {
            return Err(FsError::NotFound(name.to_string()));
        }
        children.remove(name);
        self.meta
            .apply_size_delta(fs.quota(), -(dirent_size(name) as i64))?;
        drop(children);

        self.meta.touch_modified();
        tracing::trace!(dir = self.meta.ino(), name, ino, "removed child");
        Ok(())
    }

    /// Inode number of the child called `name`, or [`INO_NOTFOUND`].
    pub fn child_inode_number_with_name(&self, name: &str) -> InodeId {
        self.child(name).unwrap_or(INO_NOTFOUND)
    }

    /// Inode number of the child called `name`.
    pub fn child(&self, name: &str) -> Option<InodeId> {
        self.children.read().get(name).copied()
    }

    /// Whether the directory has no live entries besides "." and "..".
    ///
    /// Entries whose inode is gone from the registry, or whose link count
    /// dropped to zero, do not count.
    ///
    /// # Arguments
    /// * `fs` - Owning filesystem (inode table)
    pub fn is_empty(&self, fs: &RamFs) -> bool {
        let children = self.children.read();
        only_dead_entries(&children, fs)
    }

    /// Atomically check emptiness and block further additions.
    ///
    /// # Returns
    /// False, leaving the directory untouched, if it has live entries.
    pub fn retire_if_empty(&self, fs: &RamFs) -> bool {
        let children = self.children.write();
        if !only_dead_entries(&children, fs) {
            return false;
        }
        self.retired.store(true, Ordering::Release);
        true
    }

    /// Undo [`DirNode::retire_if_empty`] when the removal is abandoned.
    pub fn revive(&self) {
        let _children = self.children.write();
        self.retired.store(false, Ordering::Release);
    }

    /// Whether the directory has been retired.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Start or resume a paginated enumeration.
    ///
    /// With `cookie == 0` a new session is created over a snapshot of the
    /// current children. Otherwise the live session is returned, or
    /// `NotFound` if the cookie is unknown or its session is exhausted (the
    /// session is then removed).
    ///
    /// # Arguments
    /// * `fs` - Owning filesystem (session table)
    /// * `cookie` - 0 to start, or a cookie from a previous call
    pub fn prepare_readdir(&self, fs: &RamFs, cookie: Cookie) -> FsResult<ReaddirHandle> {
        if cookie != START_COOKIE {
            return fs.readdir_sessions().resume(cookie);
        }

        fs.reap_readdir_sessions();
        let snapshot: Vec<(String, InodeId)> = self.children();
        self.meta.touch_accessed();
        Ok(fs.readdir_sessions().start(self.meta.ino(), snapshot))
    }

    /// Copy of all children as (name, inode_id) pairs, sorted by name.
    pub fn children(&self) -> Vec<(String, InodeId)> {
        let children = self.children.read();
        children.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Get the number of children, "." and ".." included.
    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    /// Directories are not byte-addressable.
    pub fn read(&self, _offset: u64, _size: usize) -> FsResult<Vec<u8>> {
        Err(FsError::IsADirectory(self.meta.ino()))
    }

    /// Directories are not byte-addressable.
    pub fn write(&self, _offset: u64, _buf: &[u8]) -> FsResult<usize> {
        Err(FsError::IsADirectory(self.meta.ino()))
    }
}

impl Clone for DirNode {
    fn clone(&self) -> Self {
        let children = self.children.read();
        Self {
            meta: self.meta.clone(),
            children: RwLock::new(children.clone()),
            retired: AtomicBool::new(self.retired.load(Ordering::Acquire)),
        }
    }
}

/// Whether every entry besides "." and ".." is dangling or has no links.
fn only_dead_entries(children: &BTreeMap<String, InodeId>, fs: &RamFs) -> bool {
    children
        .iter()
        .filter(|(name, _)| !is_dot_entry(name))
        .all(|(_, &ino)| fs.get_inode(ino).map_or(true, |node| node.nlink() == 0))
}

/// Whether `name` is "." or "..".
pub fn is_dot_entry(name: &str) -> bool {
    name == "." || name == ".."
}
