//! Inode primitives for the RAM filesystem.
//!
//! This module provides the node variants (file, directory, symlink,
//! special node), their shared attribute block and the size/block
//! accounting rules.

mod dir;
mod file;
mod meta;
mod node;
mod special;
mod symlink;
mod types;

pub use dir::{
    dirent_size, is_dot_entry, DirNode, DEFAULT_DIR_PERMS, DIRENT_OVERHEAD, DIR_BASE_SIZE,
    DIR_OVERHEAD,
};
pub use file::{FileNode, DEFAULT_FILE_PERMS, FILE_OVERHEAD};
pub use meta::InodeMeta;
pub use node::Inode;
pub use special::{SpecialKind, SpecialNode, SPECIAL_OVERHEAD};
pub use symlink::{SymlinkNode, SYMLINK_OVERHEAD, SYMLINK_PERMS};
pub use types::{
    blocks_for, InodeAttr, InodeId, InodeKind, BLOCK_SIZE, INO_NOTFOUND, ROOT_INODE, S_IFMT,
};
