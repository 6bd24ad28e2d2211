//! The closed set of inode variants.

use super::dir::DirNode;
use super::file::FileNode;
use super::meta::InodeMeta;
use super::special::SpecialNode;
use super::symlink::SymlinkNode;
use super::types::{InodeAttr, InodeId, InodeKind};
use crate::error::{FsError, FsResult};
use crate::quota::BlockQuota;

/// A filesystem node.
///
/// Every per-variant behavior (copy, size estimate, byte I/O) is an
/// exhaustive match over this enum. `Clone` is a deep copy: file buffers
/// and children tables are duplicated, never shared.
#[derive(Debug, Clone)]
pub enum Inode {
    /// Regular file.
    File(FileNode),
    /// Directory.
    Directory(DirNode),
    /// Symbolic link.
    Symlink(SymlinkNode),
    /// Device, fifo or socket.
    Special(SpecialNode),
}

impl Inode {
    /// Attribute block.
    pub fn meta(&self) -> &InodeMeta {
        match self {
            Inode::File(f) => f.meta(),
            Inode::Directory(d) => d.meta(),
            Inode::Symlink(s) => s.meta(),
            Inode::Special(s) => s.meta(),
        }
    }

    /// Inode number.
    pub fn ino(&self) -> InodeId {
        self.meta().ino()
    }

    /// Snapshot of the attributes.
    pub fn attr(&self) -> InodeAttr {
        self.meta().attr()
    }

    /// Hard link count.
    pub fn nlink(&self) -> u32 {
        self.meta().nlink()
    }

    /// Node type.
    pub fn kind(&self) -> InodeKind {
        match self {
            Inode::File(_) => InodeKind::File,
            Inode::Directory(_) => InodeKind::Directory,
            Inode::Symlink(_) => InodeKind::Symlink,
            Inode::Special(s) => s.special().kind(),
        }
    }

    /// Estimated memory cost of this node in bytes.
    pub fn footprint(&self) -> u64 {
        match self {
            Inode::File(f) => f.footprint(),
            Inode::Directory(d) => d.footprint(),
            Inode::Symlink(s) => s.footprint(),
            Inode::Special(s) => s.footprint(),
        }
    }

    /// Directory view of this node.
    pub fn as_dir(&self) -> FsResult<&DirNode> {
        match self {
            Inode::Directory(d) => Ok(d),
            _ => Err(FsError::NotADirectory(self.ino())),
        }
    }

    /// File view of this node, if it is a regular file.
    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Inode::File(f) => Some(f),
            _ => None,
        }
    }

    /// Symlink view of this node, if it is a symlink.
    pub fn as_symlink(&self) -> Option<&SymlinkNode> {
        match self {
            Inode::Symlink(s) => Some(s),
            _ => None,
        }
    }

    /// Read up to `size` bytes at `offset`.
    ///
    /// Only regular files hold data. Directories and symlinks answer
    /// `IsADirectory`, special nodes `NotFound`.
    pub fn read(&self, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        match self {
            Inode::File(f) => Ok(f.read(offset, size)),
            Inode::Directory(d) => d.read(offset, size),
            Inode::Symlink(s) => Err(FsError::IsADirectory(s.meta().ino())),
            Inode::Special(s) => Err(FsError::NotFound(format!("data of inode {}", s.meta().ino()))),
        }
    }

    /// Write `buf` at `offset`. Same variant rules as [`Inode::read`].
    pub fn write(&self, quota: &BlockQuota, offset: u64, buf: &[u8]) -> FsResult<usize> {
        match self {
            Inode::File(f) => f.write(quota, offset, buf),
            Inode::Directory(d) => d.write(offset, buf),
            Inode::Symlink(s) => Err(FsError::IsADirectory(s.meta().ino())),
            Inode::Special(s) => Err(FsError::NotFound(format!("data of inode {}", s.meta().ino()))),
        }
    }

    /// Set the data length. Same variant rules as [`Inode::read`].
    pub fn truncate(&self, quota: &BlockQuota, new_size: u64) -> FsResult<()> {
        match self {
            Inode::File(f) => f.truncate(quota, new_size),
            Inode::Directory(d) => Err(FsError::IsADirectory(d.meta().ino())),
            Inode::Symlink(s) => Err(FsError::IsADirectory(s.meta().ino())),
            Inode::Special(s) => Err(FsError::NotFound(format!("data of inode {}", s.meta().ino()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::file::DEFAULT_FILE_PERMS;
    use crate::inode::special::SpecialKind;

    #[test]
    fn test_kind_dispatch() {
        let quota: BlockQuota = BlockQuota::new(10);
        let file: Inode = Inode::File(FileNode::new(2, DEFAULT_FILE_PERMS, 0, 0));
        let link: Inode =
            Inode::Symlink(SymlinkNode::new(&quota, 3, "t".to_string(), 0, 0).unwrap());
        let sock: Inode = Inode::Special(SpecialNode::new(4, SpecialKind::Socket, 0o600, 0, 0));

        assert_eq!(file.kind(), InodeKind::File);
        assert_eq!(link.kind(), InodeKind::Symlink);
        assert_eq!(sock.kind(), InodeKind::Socket);
        assert!(file.as_file().is_some());
        assert!(link.as_symlink().is_some());
        assert_eq!(sock.as_dir().unwrap_err(), FsError::NotADirectory(4));
    }

    #[test]
    fn test_io_rules() {
        let quota: BlockQuota = BlockQuota::new(10);
        let link: Inode =
            Inode::Symlink(SymlinkNode::new(&quota, 3, "t".to_string(), 0, 0).unwrap());
        let fifo: Inode = Inode::Special(SpecialNode::new(4, SpecialKind::Fifo, 0o600, 0, 0));

        assert_eq!(link.read(0, 1), Err(FsError::IsADirectory(3)));
        assert!(matches!(fifo.write(&quota, 0, b"x"), Err(FsError::NotFound(_))));

        let file: Inode = Inode::File(FileNode::new(2, DEFAULT_FILE_PERMS, 0, 0));
        assert_eq!(file.write(&quota, 0, b"abc").unwrap(), 3);
        assert_eq!(file.read(1, 10).unwrap(), b"bc");
    }

    #[test]
    fn test_deep_copy() {
        let quota: BlockQuota = BlockQuota::new(10);
        let file: Inode = Inode::File(FileNode::new(2, DEFAULT_FILE_PERMS, 0, 0));
        file.write(&quota, 0, b"abc").unwrap();

        let copy: Inode = file.clone();
        copy.write(&quota, 0, b"xyz").unwrap();
        assert_eq!(file.read(0, 3).unwrap(), b"abc");
        assert_eq!(copy.read(0, 3).unwrap(), b"xyz");
        assert_eq!(copy.ino(), file.ino());
    }
}
