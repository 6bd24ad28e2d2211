//! Filesystem registry: inode table, inode number allocation, block quota
//! and the namespace operations built on top of directories.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use dashmap::DashMap;

use crate::error::{FsError, FsResult};
use crate::inode::{
    is_dot_entry, DirNode, FileNode, Inode, InodeAttr, InodeId, InodeKind, SpecialKind,
    SpecialNode, SymlinkNode, BLOCK_SIZE, ROOT_INODE,
};
use crate::options::FsOptions;
use crate::quota::BlockQuota;
use crate::readdir::{Cookie, ReaddirHandle, ReaddirSessions};

/// Attribute changes requested by a `setattr` call. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetAttr {
    /// New permission bits.
    pub mode: Option<u32>,
    /// New owner.
    pub uid: Option<u32>,
    /// New group.
    pub gid: Option<u32>,
    /// New length (regular files only).
    pub size: Option<u64>,
    /// New access time.
    pub atime: Option<SystemTime>,
    /// New modification time.
    pub mtime: Option<SystemTime>,
}

/// Point-in-time statistics of the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsStats {
    /// Size of one accounting block.
    pub block_size: u64,
    /// Block quota.
    pub total_blocks: u64,
    /// Blocks currently charged.
    pub used_blocks: u64,
    /// Blocks still available.
    pub free_blocks: u64,
    /// Number of registered inodes.
    pub inode_count: usize,
    /// Number of live readdir sessions.
    pub readdir_sessions: usize,
    /// Sum of per-inode memory estimates.
    pub footprint_bytes: u64,
    /// Seconds since the filesystem was created.
    pub uptime_secs: u64,
}

/// RAM-backed filesystem.
///
/// Owns every inode and the resources shared between them. Directories and
/// files call back into it for inode resolution, the block quota and the
/// readdir session table.
#[derive(Debug)]
pub struct RamFs {
    /// Next inode ID to allocate.
    next_id: AtomicU64,
    /// All inodes by ID.
    inodes: DashMap<InodeId, Arc<Inode>>,
    /// Global block counter.
    quota: BlockQuota,
    /// Live readdir sessions for every directory.
    readdir_sessions: ReaddirSessions,
    /// Configuration.
    options: FsOptions,
    /// Creation time.
    start_time: Instant,
}

impl RamFs {
    /// Create a filesystem holding only the root directory.
    ///
    /// # Arguments
    /// * `options` - Filesystem configuration
    ///
    /// # Returns
    /// `OutOfSpace` if the quota cannot even hold the root directory.
    pub fn new(options: FsOptions) -> FsResult<Self> {
        let fs = Self {
            next_id: AtomicU64::new(ROOT_INODE + 1),
            inodes: DashMap::new(),
            quota: BlockQuota::new(options.quota_blocks),
            readdir_sessions: ReaddirSessions::new(),
            options,
            start_time: Instant::now(),
        };

        let root: DirNode = DirNode::new(
            &fs,
            ROOT_INODE,
            fs.options.root_mode,
            fs.options.root_uid,
            fs.options.root_gid,
        )?;
        fs.init_dot_entries(&root, ROOT_INODE, ROOT_INODE)?;
        fs.inodes.insert(ROOT_INODE, Arc::new(Inode::Directory(root)));

        tracing::debug!(quota_blocks = fs.quota.limit(), "ramfs created");
        Ok(fs)
    }

    /// Allocate a new inode ID.
    fn allocate_id(&self) -> InodeId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Configuration in effect.
    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    /// Global block counter.
    pub fn quota(&self) -> &BlockQuota {
        &self.quota
    }

    /// Live readdir sessions.
    pub fn readdir_sessions(&self) -> &ReaddirSessions {
        &self.readdir_sessions
    }

    /// Drop readdir sessions idle longer than the configured TTL.
    ///
    /// # Returns
    /// Number of sessions removed.
    pub fn reap_readdir_sessions(&self) -> usize {
        self.readdir_sessions
            .reap_expired(self.options.readdir_session_ttl())
    }

    /// Whether `bytes` more would currently fit under the quota.
    ///
    /// Advisory; growth paths reserve atomically through [`BlockQuota`].
    pub fn check_has_space_for(&self, bytes: u64) -> bool {
        self.quota.has_space_for(bytes)
    }

    /// Adjust the used-block counter by a signed delta.
    pub fn update_used_blocks(&self, delta: i64) {
        self.quota.update_used_blocks(delta);
    }

    /// Get an inode by ID.
    ///
    /// # Arguments
    /// * `ino` - Inode ID to look up
    ///
    /// # Returns
    /// The inode if found.
    pub fn get_inode(&self, ino: InodeId) -> Option<Arc<Inode>> {
        self.inodes.get(&ino).map(|entry| entry.value().clone())
    }

    /// Get an inode by ID or fail with `InodeNotFound`.
    pub fn inode(&self, ino: InodeId) -> FsResult<Arc<Inode>> {
        self.get_inode(ino).ok_or(FsError::InodeNotFound(ino))
    }

    /// Get the total number of inodes.
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Get a directory inode by ID.
    fn directory(&self, ino: InodeId) -> FsResult<Arc<Inode>> {
        let node: Arc<Inode> = self.inode(ino)?;
        node.as_dir()?;
        Ok(node)
    }

    /// Reject names that cannot be stored as a directory entry.
    fn validate_name(&self, name: &str) -> FsResult<()> {
        if name.is_empty() || name.contains('/') || name.contains('\0') || is_dot_entry(name) {
            return Err(FsError::InvalidName(name.to_string()));
        }
        if name.len() > self.options.max_name_len {
            return Err(FsError::NameTooLong {
                len: name.len(),
                max: self.options.max_name_len,
            });
        }
        Ok(())
    }

    /// Add "." and ".." to a fresh directory, releasing its blocks on
    /// failure.
    fn init_dot_entries(&self, dir: &DirNode, ino: InodeId, parent: InodeId) -> FsResult<()> {
        let result: FsResult<()> = dir
            .add_child(self, ".", ino)
            .and_then(|_| dir.add_child(self, "..", parent));
        if result.is_err() {
            dir.meta().release_blocks(&self.quota);
        }
        result
    }

    /// Register `node` and link it into `parent` under `name`.
    ///
    /// On failure the node is unregistered and its blocks released.
    fn register(&self, parent: &DirNode, name: &str, node: Inode) -> FsResult<Arc<Inode>> {
        let node: Arc<Inode> = Arc::new(node);
        let ino: InodeId = node.ino();
        self.inodes.insert(ino, node.clone());

        if let Err(e) = parent.add_child(self, name, ino) {
            self.inodes.remove(&ino);
            node.meta().release_blocks(&self.quota);
            return Err(e);
        }
        Ok(node)
    }

    /// Remove an inode from the table and return its blocks.
    fn drop_inode(&self, ino: InodeId) {
        if let Some((_, node)) = self.inodes.remove(&ino) {
            node.meta().release_blocks(&self.quota);
            tracing::debug!(ino, kind = ?node.kind(), "inode dropped");
        }
    }

    /// Resolve `name` inside `parent` and check the parent can take a new
    /// entry called `name`.
    fn prepare_create(&self, parent: InodeId, name: &str) -> FsResult<Arc<Inode>> {
        self.validate_name(name)?;
        let parent_node: Arc<Inode> = self.directory(parent)?;
        if parent_node.as_dir()?.child(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        Ok(parent_node)
    }

    // ========================================================================
    // Namespace operations
    // ========================================================================

    /// Look up `name` in directory `parent`.
    pub fn lookup(&self, parent: InodeId, name: &str) -> FsResult<Arc<Inode>> {
        let parent_node: Arc<Inode> = self.directory(parent)?;
        let ino: InodeId = parent_node
            .as_dir()?
            .child(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        self.get_inode(ino)
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    /// Create an empty regular file.
    ///
    /// # Arguments
    /// * `parent` - Directory to create it in
    /// * `name` - Entry name
    /// * `perm` - Permission bits
    /// * `uid` - Owner user id
    /// * `gid` - Owner group id
    pub fn create_file(
        &self,
        parent: InodeId,
        name: &str,
        perm: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<Arc<Inode>> {
        let parent_node: Arc<Inode> = self.prepare_create(parent, name)?;
        let ino: InodeId = self.allocate_id();
        let node: Inode = Inode::File(FileNode::new(ino, perm, uid, gid));
        let node: Arc<Inode> = self.register(parent_node.as_dir()?, name, node)?;
        tracing::debug!(parent, name, ino, "file created");
        Ok(node)
    }

    /// Create a directory with "." and ".." entries.
    pub fn mkdir(
        &self,
        parent: InodeId,
        name: &str,
        perm: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<Arc<Inode>> {
        let parent_node: Arc<Inode> = self.prepare_create(parent, name)?;
        let ino: InodeId = self.allocate_id();
        let dir: DirNode = DirNode::new(self, ino, perm, uid, gid)?;
        self.init_dot_entries(&dir, ino, parent)?;

        let node: Arc<Inode> = self.register(parent_node.as_dir()?, name, Inode::Directory(dir))?;
        parent_node.meta().inc_nlink();
        tracing::debug!(parent, name, ino, "directory created");
        Ok(node)
    }

    /// Create a symbolic link pointing at `target`.
    pub fn symlink(
        &self,
        parent: InodeId,
        name: &str,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> FsResult<Arc<Inode>> {
        let parent_node: Arc<Inode> = self.prepare_create(parent, name)?;
        let ino: InodeId = self.allocate_id();
        let link: SymlinkNode = SymlinkNode::new(&self.quota, ino, target.to_string(), uid, gid)?;
        let node: Arc<Inode> = self.register(parent_node.as_dir()?, name, Inode::Symlink(link))?;
        tracing::debug!(parent, name, ino, target, "symlink created");
        Ok(node)
    }

    /// Create a device node, fifo or socket.
    pub fn mknod(
        &self,
        parent: InodeId,
        name: &str,
        special: SpecialKind,
        perm: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<Arc<Inode>> {
        let parent_node: Arc<Inode> = self.prepare_create(parent, name)?;
        let ino: InodeId = self.allocate_id();
        let node: Inode = Inode::Special(SpecialNode::new(ino, special, perm, uid, gid));
        let node: Arc<Inode> = self.register(parent_node.as_dir()?, name, node)?;
        tracing::debug!(parent, name, ino, ?special, "special node created");
        Ok(node)
    }

    /// Add another name for an existing non-directory inode.
    pub fn link(&self, ino: InodeId, new_parent: InodeId, new_name: &str) -> FsResult<Arc<Inode>> {
        let node: Arc<Inode> = self.inode(ino)?;
        if node.kind() == InodeKind::Directory {
            return Err(FsError::IsADirectory(ino));
        }
        let parent_node: Arc<Inode> = self.prepare_create(new_parent, new_name)?;
        parent_node.as_dir()?.add_child(self, new_name, ino)?;
        node.meta().inc_nlink();
        tracing::debug!(ino, new_parent, new_name, "hard link added");
        Ok(node)
    }

    /// Remove a non-directory entry. The inode goes away with its last link.
    pub fn unlink(&self, parent: InodeId, name: &str) -> FsResult<()> {
        if is_dot_entry(name) {
            return Err(FsError::InvalidName(name.to_string()));
        }
        let parent_node: Arc<Inode> = self.directory(parent)?;
        let dir: &DirNode = parent_node.as_dir()?;
        let ino: InodeId = dir
            .child(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let node: Option<Arc<Inode>> = self.get_inode(ino);
        if let Some(node) = &node {
            if node.kind() == InodeKind::Directory {
                return Err(FsError::IsADirectory(ino));
            }
        }

        dir.remove_child_matching(self, name, ino)?;
        if let Some(node) = node {
            if node.meta().dec_nlink() == 0 {
                self.drop_inode(ino);
            }
        }
        tracing::debug!(parent, name, ino, "unlinked");
        Ok(())
    }

    /// Remove an empty directory.
    ///
    /// The directory is retired before it is unlinked, so an entry created
    /// concurrently either lands first (and the call fails `NotEmpty`) or is
    /// refused.
    pub fn rmdir(&self, parent: InodeId, name: &str) -> FsResult<()> {
        if is_dot_entry(name) {
            return Err(FsError::InvalidName(name.to_string()));
        }
        let parent_node: Arc<Inode> = self.directory(parent)?;
        let dir: &DirNode = parent_node.as_dir()?;
        let ino: InodeId = dir
            .child(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let node: Arc<Inode> = self.inode(ino)?;
        let target: &DirNode = node.as_dir()?;
        if !target.retire_if_empty(self) {
            return Err(FsError::NotEmpty(name.to_string()));
        }

        if let Err(e) = dir.remove_child_matching(self, name, ino) {
            target.revive();
            return Err(e);
        }
        parent_node.meta().dec_nlink();
        self.drop_inode(ino);
        tracing::debug!(parent, name, ino, "directory removed");
        Ok(())
    }

    /// Move `name` in `parent` to `new_name` in `new_parent`, replacing an
    /// existing compatible target.
    pub fn rename(
        &self,
        parent: InodeId,
        name: &str,
        new_parent: InodeId,
        new_name: &str,
    ) -> FsResult<()> {
        if is_dot_entry(name) {
            return Err(FsError::InvalidName(name.to_string()));
        }
        self.validate_name(new_name)?;

        let src_node: Arc<Inode> = self.directory(parent)?;
        let dst_node: Arc<Inode> = self.directory(new_parent)?;
        let src: &DirNode = src_node.as_dir()?;
        let dst: &DirNode = dst_node.as_dir()?;

        let ino: InodeId = src
            .child(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        if parent == new_parent && name == new_name {
            return Ok(());
        }
        let node: Arc<Inode> = self.inode(ino)?;
        let is_dir: bool = node.kind() == InodeKind::Directory;
        if is_dir && self.is_ancestor(ino, new_parent) {
            return Err(FsError::InvalidArgument(format!(
                "cannot move directory {} under itself",
                ino
            )));
        }

        // Link the destination first; nothing is dropped until the source
        // entry is confirmed gone.
        let replaced: Option<(InodeId, Option<Arc<Inode>>)> = match dst.child(new_name) {
            // Both names already refer to the same inode.
            Some(existing) if existing == ino => return Ok(()),
            Some(existing) => {
                let replaced: Option<Arc<Inode>> = self.get_inode(existing);
                if let Some(replaced) = &replaced {
                    let replaced_is_dir: bool = replaced.kind() == InodeKind::Directory;
                    if is_dir && !replaced_is_dir {
                        return Err(FsError::NotADirectory(existing));
                    }
                    if !is_dir && replaced_is_dir {
                        return Err(FsError::IsADirectory(existing));
                    }
                    if replaced_is_dir && !replaced.as_dir()?.retire_if_empty(self) {
                        return Err(FsError::NotEmpty(new_name.to_string()));
                    }
                }
                if let Err(e) = dst.update_child(new_name, ino) {
                    revive_dir(replaced.as_deref());
                    return Err(e);
                }
                Some((existing, replaced))
            }
            None => {
                dst.add_child(self, new_name, ino)?;
                None
            }
        };

        if let Err(e) = src.remove_child_matching(self, name, ino) {
            let rollback: FsResult<()> = match &replaced {
                Some((existing, node)) => {
                    revive_dir(node.as_deref());
                    dst.update_child(new_name, *existing)
                }
                None => dst.remove_child_matching(self, new_name, ino),
            };
            if let Err(rollback_err) = rollback {
                tracing::warn!(new_parent, new_name, %rollback_err, "rename rollback failed");
            }
            return Err(e);
        }

        if let Some((existing, Some(replaced))) = replaced {
            if replaced.kind() == InodeKind::Directory {
                dst_node.meta().dec_nlink();
                self.drop_inode(existing);
            } else if replaced.meta().dec_nlink() == 0 {
                self.drop_inode(existing);
            }
        }

        if is_dir && parent != new_parent {
            node.as_dir()?.update_child("..", new_parent)?;
            src_node.meta().dec_nlink();
            dst_node.meta().inc_nlink();
        }
        node.meta().touch_changed();
        tracing::debug!(parent, name, new_parent, new_name, ino, "renamed");
        Ok(())
    }

    /// Whether directory `ancestor` is `dir` or one of its parents.
    fn is_ancestor(&self, ancestor: InodeId, dir: InodeId) -> bool {
        let mut current: InodeId = dir;
        loop {
            if current == ancestor {
                return true;
            }
            if current == ROOT_INODE {
                return false;
            }
            let parent: Option<InodeId> = self
                .get_inode(current)
                .and_then(|node| node.as_dir().ok().and_then(|d| d.child("..")));
            match parent {
                Some(p) if p != current => current = p,
                _ => return false,
            }
        }
    }

    // ========================================================================
    // Data and attribute operations
    // ========================================================================

    /// Read from a regular file.
    pub fn read(&self, ino: InodeId, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        self.inode(ino)?.read(offset, size)
    }

    /// Write to a regular file.
    pub fn write(&self, ino: InodeId, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.inode(ino)?.write(&self.quota, offset, data)
    }

    /// Set the length of a regular file.
    pub fn truncate(&self, ino: InodeId, size: u64) -> FsResult<()> {
        self.inode(ino)?.truncate(&self.quota, size)
    }

    /// Target of a symbolic link.
    pub fn readlink(&self, ino: InodeId) -> FsResult<String> {
        let node: Arc<Inode> = self.inode(ino)?;
        match node.as_symlink() {
            Some(link) => Ok(link.target().to_string()),
            None => Err(FsError::InvalidArgument(format!("inode {} is not a symlink", ino))),
        }
    }

    /// Apply attribute changes.
    ///
    /// # Returns
    /// The attributes after the change.
    pub fn setattr(&self, ino: InodeId, changes: &SetAttr) -> FsResult<InodeAttr> {
        let node: Arc<Inode> = self.inode(ino)?;
        if let Some(size) = changes.size {
            node.truncate(&self.quota, size)?;
        }
        if let Some(mode) = changes.mode {
            node.meta().set_permissions(mode);
        }
        if changes.uid.is_some() || changes.gid.is_some() {
            node.meta().set_owner(changes.uid, changes.gid);
        }
        if changes.atime.is_some() || changes.mtime.is_some() {
            node.meta().set_times(changes.atime, changes.mtime);
        }
        Ok(node.attr())
    }

    /// Start (`cookie == 0`) or resume a paginated listing of `dir`.
    pub fn readdir(&self, dir: InodeId, cookie: Cookie) -> FsResult<ReaddirHandle> {
        let node: Arc<Inode> = self.directory(dir)?;
        node.as_dir()?.prepare_readdir(self, cookie)
    }

    /// Drop a readdir session the caller will not finish.
    pub fn release_readdir(&self, cookie: Cookie) -> bool {
        self.readdir_sessions.remove(cookie)
    }

    /// Current statistics.
    pub fn stats(&self) -> FsStats {
        let footprint_bytes: u64 = self
            .inodes
            .iter()
            .map(|entry| entry.value().footprint())
            .sum();
        FsStats {
            block_size: BLOCK_SIZE,
            total_blocks: self.quota.limit(),
            used_blocks: self.quota.used(),
            free_blocks: self.quota.available(),
            inode_count: self.inodes.len(),
            readdir_sessions: self.readdir_sessions.len(),
            footprint_bytes,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

/// Clear the retired flag of a directory a failed rename had claimed.
fn revive_dir(node: Option<&Inode>) {
    if let Some(Inode::Directory(dir)) = node {
        dir.revive();
    }
}
