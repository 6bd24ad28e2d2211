//! Device, fifo and socket nodes.

use super::meta::InodeMeta;
use super::types::{InodeId, InodeKind};

/// Fixed memory overhead of a special node.
pub const SPECIAL_OVERHEAD: u64 = std::mem::size_of::<SpecialNode>() as u64;

/// What a special node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    /// Character device with its device id.
    CharDevice(u64),
    /// Block device with its device id.
    BlockDevice(u64),
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
}

impl SpecialKind {
    /// Build from the type bits of a `mknod` mode.
    ///
    /// # Returns
    /// None for types that are not special nodes.
    pub fn from_mode(mode: u32, rdev: u64) -> Option<Self> {
        match InodeKind::from_mode(mode)? {
            InodeKind::CharDevice => Some(SpecialKind::CharDevice(rdev)),
            InodeKind::BlockDevice => Some(SpecialKind::BlockDevice(rdev)),
            InodeKind::Fifo => Some(SpecialKind::Fifo),
            InodeKind::Socket => Some(SpecialKind::Socket),
            InodeKind::File | InodeKind::Directory | InodeKind::Symlink => None,
        }
    }

    /// Corresponding inode kind.
    pub fn kind(self) -> InodeKind {
        match self {
            SpecialKind::CharDevice(_) => InodeKind::CharDevice,
            SpecialKind::BlockDevice(_) => InodeKind::BlockDevice,
            SpecialKind::Fifo => InodeKind::Fifo,
            SpecialKind::Socket => InodeKind::Socket,
        }
    }

    /// Device id, 0 for fifos and sockets.
    pub fn rdev(self) -> u64 {
        match self {
            SpecialKind::CharDevice(dev) | SpecialKind::BlockDevice(dev) => dev,
            SpecialKind::Fifo | SpecialKind::Socket => 0,
        }
    }
}

/// Special inode. Carries no data.
#[derive(Debug, Clone)]
pub struct SpecialNode {
    meta: InodeMeta,
    special: SpecialKind,
}

impl SpecialNode {
    /// Create a special node.
    ///
    /// # Arguments
    /// * `ino` - Inode number
    /// * `special` - Node type and device id
    /// * `perm` - Permission bits
    /// * `uid` - Owner user id
    /// * `gid` - Owner group id
    pub fn new(ino: InodeId, special: SpecialKind, perm: u32, uid: u32, gid: u32) -> Self {
        let mode: u32 = special.kind().mode_bits() | (perm & 0o7777);
        let meta: InodeMeta = InodeMeta::new(ino, mode, 1, uid, gid);
        meta.set_rdev(special.rdev());
        Self { meta, special }
    }

    /// Attribute block.
    pub fn meta(&self) -> &InodeMeta {
        &self.meta
    }

    /// Node type.
    pub fn special(&self) -> SpecialKind {
        self.special
    }

    /// Estimated memory cost of this node.
    pub fn footprint(&self) -> u64 {
        SPECIAL_OVERHEAD
    }
}
