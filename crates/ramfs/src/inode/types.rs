//! Core inode types and constants.

use std::time::SystemTime;

/// Unique identifier for an inode.
pub type InodeId = u64;

/// Root directory inode ID (always 1 per FUSE convention).
pub const ROOT_INODE: InodeId = 1;

/// Inode number returned by lookups that find nothing.
pub const INO_NOTFOUND: InodeId = 0;

/// Accounting unit for `blocks` and the quota.
pub const BLOCK_SIZE: u64 = 512;

/// File type bits of `mode`.
pub const S_IFMT: u32 = libc::S_IFMT as u32;

/// Number of blocks needed to hold `size` bytes.
///
/// # Arguments
/// * `size` - Size in bytes
pub fn blocks_for(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE)
}

/// Type of inode entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
}

impl InodeKind {
    /// File type bits for this kind.
    pub fn mode_bits(self) -> u32 {
        let bits = match self {
            InodeKind::File => libc::S_IFREG,
            InodeKind::Directory => libc::S_IFDIR,
            InodeKind::Symlink => libc::S_IFLNK,
            InodeKind::CharDevice => libc::S_IFCHR,
            InodeKind::BlockDevice => libc::S_IFBLK,
            InodeKind::Fifo => libc::S_IFIFO,
            InodeKind::Socket => libc::S_IFSOCK,
        };
        bits as u32
    }

    /// Decode the file type bits of a full `mode`.
    ///
    /// # Returns
    /// None if the type bits are not recognized.
    pub fn from_mode(mode: u32) -> Option<Self> {
        [
            InodeKind::File,
            InodeKind::Directory,
            InodeKind::Symlink,
            InodeKind::CharDevice,
            InodeKind::BlockDevice,
            InodeKind::Fifo,
            InodeKind::Socket,
        ]
        .into_iter()
        .find(|k| k.mode_bits() == mode & S_IFMT)
    }
}

/// Snapshot of an inode's attribute block (the `stat` view).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeAttr {
    /// Inode number.
    pub ino: InodeId,
    /// File type and permission bits.
    pub mode: u32,
    /// Hard link count.
    pub nlink: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Size in `BLOCK_SIZE` units, rounded up.
    pub blocks: u64,
    /// Device id for device nodes, 0 otherwise.
    pub rdev: u64,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// Last access time.
    pub atime: SystemTime,
    /// Last content modification time.
    pub mtime: SystemTime,
    /// Last attribute change time.
    pub ctime: SystemTime,
}

impl InodeAttr {
    /// Permission bits without the file type.
    pub fn permissions(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}
