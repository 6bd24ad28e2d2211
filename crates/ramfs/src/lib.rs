//! RAM-backed filesystem core.
//!
//! Every node lives in memory. Sizes are tracked in 512-byte blocks and
//! charged against a single global quota, directories charge a fixed cost
//! per entry, and directory listings are served through cookie-keyed
//! sessions that each read a private snapshot of the directory.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FUSE Interface (fuser::Filesystem impl, feature "fuse")
//! Layer 2: Namespace operations (RamFs: lookup, mkdir, rename, readdir)
//! Layer 1: Primitives (Inode variants, BlockQuota, ReaddirSessions)
//! ```
//!
//! # Example
//!
//! ```
//! use ramfs::{FsOptions, RamFs, ROOT_INODE};
//!
//! let fs = RamFs::new(FsOptions::default()).unwrap();
//! let dir = fs.mkdir(ROOT_INODE, "docs", 0o755, 0, 0).unwrap();
//! let file = fs.create_file(dir.ino(), "a.txt", 0o644, 0, 0).unwrap();
//! fs.write(file.ino(), 0, b"hello").unwrap();
//! assert_eq!(fs.read(file.ino(), 0, 5).unwrap(), b"hello");
//! ```

pub mod error;
pub mod fs;
pub mod inode;
pub mod options;
pub mod quota;
pub mod readdir;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use error::{FsError, FsResult};
pub use fs::{FsStats, RamFs, SetAttr};
pub use inode::{
    DirNode, FileNode, Inode, InodeAttr, InodeId, InodeKind, SpecialKind, SpecialNode,
    SymlinkNode, BLOCK_SIZE, INO_NOTFOUND, ROOT_INODE,
};
pub use options::FsOptions;
pub use quota::BlockQuota;
pub use readdir::{Cookie, ReaddirHandle, ReaddirSession, ReaddirSessions, START_COOKIE};

#[cfg(feature = "fuse")]
pub use fuse::{mount, spawn_mount, RamFsFuse};
