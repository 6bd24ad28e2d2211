//! FUSE front end.
//!
//! Translates kernel requests into [`RamFs`] calls and [`FsError`] values
//! into errno replies. Directory listing offsets are readdir session
//! cookies, so a listing that spans several `readdir` requests keeps
//! reading the snapshot taken by the first one.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};

use crate::error::{FsError, FsResult};
use crate::fs::{FsStats, RamFs, SetAttr};
use crate::inode::{Inode, InodeAttr, InodeKind, SpecialKind, S_IFMT};
use crate::readdir::{Cookie, ReaddirHandle};

/// `fuser::Filesystem` adapter over a shared [`RamFs`].
pub struct RamFsFuse {
    fs: Arc<RamFs>,
}

impl RamFsFuse {
    /// Wrap a filesystem for mounting.
    pub fn new(fs: Arc<RamFs>) -> Self {
        Self { fs }
    }

    /// Filesystem behind this adapter.
    pub fn fs(&self) -> &Arc<RamFs> {
        &self.fs
    }

    fn ttl(&self) -> Duration {
        self.fs.options().attr_timeout()
    }
}

/// Map a node type to the FUSE file type.
fn file_type(kind: InodeKind) -> FileType {
    match kind {
        InodeKind::File => FileType::RegularFile,
        InodeKind::Directory => FileType::Directory,
        InodeKind::Symlink => FileType::Symlink,
        InodeKind::CharDevice => FileType::CharDevice,
        InodeKind::BlockDevice => FileType::BlockDevice,
        InodeKind::Fifo => FileType::NamedPipe,
        InodeKind::Socket => FileType::Socket,
    }
}

/// Convert an attribute snapshot to FUSE file attributes.
fn to_file_attr(attr: &InodeAttr) -> FileAttr {
    let kind: FileType = InodeKind::from_mode(attr.mode)
        .map(file_type)
        .unwrap_or(FileType::RegularFile);
    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: UNIX_EPOCH,
        kind,
        perm: attr.permissions(),
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev as u32,
        blksize: attr.blksize,
        flags: 0,
    }
}

fn to_system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn name_str(name: &OsStr) -> FsResult<&str> {
    name.to_str()
        .ok_or_else(|| FsError::InvalidName(name.to_string_lossy().into_owned()))
}

/// Reply with the node's attributes or the error's errno.
fn reply_entry(ttl: &Duration, result: FsResult<Arc<Inode>>, reply: ReplyEntry) {
    match result {
        Ok(node) => reply.entry(ttl, &to_file_attr(&node.attr()), 0),
        Err(e) => reply.error(e.errno()),
    }
}

fn reply_empty(result: FsResult<()>, reply: ReplyEmpty) {
    match result {
        Ok(()) => reply.ok(),
        Err(e) => reply.error(e.errno()),
    }
}

impl Filesystem for RamFsFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result: FsResult<Arc<Inode>> =
            name_str(name).and_then(|name| self.fs.lookup(parent, name));
        reply_entry(&self.ttl(), result, reply);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.fs.inode(ino) {
            Ok(node) => reply.attr(&self.ttl(), &to_file_attr(&node.attr())),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let changes: SetAttr = SetAttr {
            mode,
            uid,
            gid,
            size,
            atime: atime.map(to_system_time),
            mtime: mtime.map(to_system_time),
        };
        match self.fs.setattr(ino, &changes) {
            Ok(attr) => reply.attr(&self.ttl(), &to_file_attr(&attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        match self.fs.readlink(ino) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let perm: u32 = mode & !umask & 0o7777;
        let result: FsResult<Arc<Inode>> = name_str(name).and_then(|name| {
            if mode & S_IFMT == libc::S_IFREG as u32 {
                return self.fs.create_file(parent, name, perm, req.uid(), req.gid());
            }
            let special: SpecialKind = SpecialKind::from_mode(mode, rdev as u64)
                .ok_or_else(|| FsError::InvalidArgument(format!("mode {:o}", mode)))?;
            self.fs
                .mknod(parent, name, special, perm, req.uid(), req.gid())
        });
        reply_entry(&self.ttl(), result, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let perm: u32 = mode & !umask & 0o7777;
        let result: FsResult<Arc<Inode>> = name_str(name)
            .and_then(|name| self.fs.mkdir(parent, name, perm, req.uid(), req.gid()));
        reply_entry(&self.ttl(), result, reply);
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        reply_empty(
            name_str(name).and_then(|name| self.fs.unlink(parent, name)),
            reply,
        );
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        reply_empty(
            name_str(name).and_then(|name| self.fs.rmdir(parent, name)),
            reply,
        );
    }

    fn symlink(
        &mut self,
        req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let target: String = target.to_string_lossy().into_owned();
        let result: FsResult<Arc<Inode>> = name_str(link_name)
            .and_then(|name| self.fs.symlink(parent, name, &target, req.uid(), req.gid()));
        reply_entry(&self.ttl(), result, reply);
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let result: FsResult<()> = name_str(name).and_then(|name| {
            let newname: &str = name_str(newname)?;
            self.fs.rename(parent, name, newparent, newname)
        });
        reply_empty(result, reply);
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let result: FsResult<Arc<Inode>> =
            name_str(newname).and_then(|name| self.fs.link(ino, newparent, name));
        reply_entry(&self.ttl(), result, reply);
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.inode(ino) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let perm: u32 = mode & !umask & 0o7777;
        let result: FsResult<Arc<Inode>> = name_str(name)
            .and_then(|name| self.fs.create_file(parent, name, perm, req.uid(), req.gid()));
        match result {
            Ok(node) => reply.created(&self.ttl(), &to_file_attr(&node.attr()), 0, 0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.fs.read(ino, offset as u64, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.fs.write(ino, offset as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let handle: ReaddirHandle = match self.fs.readdir(ino, offset as Cookie) {
            Ok(handle) => handle,
            // Unknown or exhausted cookie: end of listing.
            Err(FsError::NotFound(_)) => {
                reply.ok();
                return;
            }
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        let mut session = handle.lock();
        let cookie: i64 = session.cookie() as i64;
        while let Some((name, child)) = session.current().cloned() {
            let kind: FileType = self
                .fs
                .get_inode(child)
                .map(|node| file_type(node.kind()))
                .unwrap_or(FileType::RegularFile);
            if reply.add(child, cookie, kind, &name) {
                break;
            }
            session.advance();
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let stats: FsStats = self.fs.stats();
        reply.statfs(
            stats.total_blocks,
            stats.free_blocks,
            stats.free_blocks,
            stats.inode_count as u64,
            u64::MAX - stats.inode_count as u64,
            stats.block_size as u32,
            self.fs.options().max_name_len as u32,
            stats.block_size as u32,
        );
    }
}

fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName("ramfs".into()),
        MountOption::AutoUnmount,
        MountOption::DefaultPermissions,
    ]
}

/// Mount a filesystem and serve it until unmounted.
///
/// # Arguments
/// * `fs` - The filesystem to mount
/// * `mountpoint` - Path to mount at
pub fn mount(fs: Arc<RamFs>, mountpoint: &Path) -> Result<(), FsError> {
    tracing::info!(mountpoint = %mountpoint.display(), "mounting ramfs");
    fuser::mount2(RamFsFuse::new(fs), mountpoint, &mount_options())
        .map_err(|e| FsError::MountFailed(e.to_string()))
}

/// Spawn a mount in the background.
///
/// # Arguments
/// * `fs` - The filesystem to mount
/// * `mountpoint` - Path to mount at
///
/// # Returns
/// Background session handle; dropping it unmounts.
pub fn spawn_mount(
    fs: Arc<RamFs>,
    mountpoint: &Path,
) -> Result<fuser::BackgroundSession, FsError> {
    tracing::info!(mountpoint = %mountpoint.display(), "spawning ramfs mount");
    fuser::spawn_mount2(RamFsFuse::new(fs), mountpoint, &mount_options())
        .map_err(|e| FsError::MountFailed(e.to_string()))
}
