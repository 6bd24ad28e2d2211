//! Error types for the RAM filesystem.

use thiserror::Error;

use crate::inode::InodeId;

/// Errors returned by filesystem operations.
///
/// Bookkeeping corruption (a size delta that would drive a size or the
/// used-block counter negative) is not represented here: it panics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// A directory entry with this name already exists.
    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    /// Entry or readdir cookie not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Inode number is not registered.
    #[error("Inode not found: {0}")]
    InodeNotFound(InodeId),

    /// Growth would exceed the block quota.
    #[error("Out of space: requested {requested} blocks, {available} available")]
    OutOfSpace {
        /// Blocks the operation needed.
        requested: u64,
        /// Blocks left under the quota when the request was made.
        available: u64,
    },

    /// Byte-level I/O attempted on a directory.
    #[error("Is a directory: {0}")]
    IsADirectory(InodeId),

    /// Directory operation attempted on a non-directory.
    #[error("Not a directory: {0}")]
    NotADirectory(InodeId),

    /// Directory still has live entries.
    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    /// Name is empty, contains '/', or is "." / "..".
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// Operation does not apply to this node or these arguments.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Name exceeds the configured maximum length.
    #[error("Name too long: {len} bytes (max {max})")]
    NameTooLong {
        /// Length of the rejected name.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The FUSE session could not be set up.
    #[error("Mount failed: {0}")]
    MountFailed(String),
}

impl FsError {
    /// Translate into the errno the request layer should reply with.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotFound(_) | FsError::InodeNotFound(_) => libc::ENOENT,
            FsError::OutOfSpace { .. } => libc::ENOSPC,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::InvalidName(_) | FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::NameTooLong { .. } => libc::ENAMETOOLONG,
            FsError::MountFailed(_) => libc::EIO,
        }
    }
}

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;
