//! Global block quota.
//!
//! Every inode that grows or shrinks forwards its block delta here. Growth
//! goes through [`BlockQuota::try_reserve`], which checks and commits in a
//! single compare-and-swap so concurrent growers can never jointly overrun
//! the quota.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{FsError, FsResult};
use crate::inode::blocks_for;

/// Used-block counter bounded by a fixed quota.
#[derive(Debug)]
pub struct BlockQuota {
    /// Maximum number of blocks.
    limit: u64,
    /// Blocks currently charged.
    used: AtomicU64,
}

impl BlockQuota {
    /// Create an empty counter with the given limit.
    ///
    /// # Arguments
    /// * `limit` - Maximum number of blocks
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Maximum number of blocks.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Blocks currently charged.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Blocks still available.
    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }

    /// Whether `bytes` more would fit right now.
    ///
    /// Advisory only: another thread may consume the space before the caller
    /// acts. Use [`BlockQuota::try_reserve`] to actually claim it.
    ///
    /// # Arguments
    /// * `bytes` - Requested size in bytes
    pub fn has_space_for(&self, bytes: u64) -> bool {
        self.used()
            .checked_add(blocks_for(bytes))
            .map_or(false, |total| total <= self.limit)
    }

    /// Charge `blocks` if they fit under the limit; otherwise leave the
    /// counter untouched.
    ///
    /// # Arguments
    /// * `blocks` - Number of blocks to claim
    ///
    /// # Returns
    /// `OutOfSpace` if the reservation would exceed the limit.
    pub fn try_reserve(&self, blocks: u64) -> FsResult<()> {
        self.try_reserve_checked(blocks, blocks)
    }

    /// Charge `blocks` provided `check_blocks` more would still fit.
    ///
    /// The check and the commit happen in one compare-and-swap. With
    /// `blocks == 0` nothing is charged but the check still applies.
    ///
    /// # Arguments
    /// * `check_blocks` - Headroom that must be available
    /// * `blocks` - Number of blocks to claim
    ///
    /// # Returns
    /// `OutOfSpace` if `max(check_blocks, blocks)` does not fit.
    pub fn try_reserve_checked(&self, check_blocks: u64, blocks: u64) -> FsResult<()> {
        let needed: u64 = check_blocks.max(blocks);
        if needed == 0 {
            return Ok(());
        }
        let mut current: u64 = self.used.load(Ordering::Acquire);
        loop {
            match current.checked_add(needed) {
                Some(n) if n <= self.limit => {}
                _ => {
                    tracing::warn!(
                        requested = needed,
                        used = current,
                        limit = self.limit,
                        "block quota exhausted"
                    );
                    return Err(FsError::OutOfSpace {
                        requested: needed,
                        available: self.limit.saturating_sub(current),
                    });
                }
            }
            if blocks == 0 {
                return Ok(());
            }
            match self.used.compare_exchange_weak(
                current,
                current + blocks,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Return `blocks` to the pool.
    ///
    /// # Panics
    /// If more blocks are released than are charged.
    pub fn release(&self, blocks: u64) {
        if blocks == 0 {
            return;
        }
        let previous: u64 = self.used.fetch_sub(blocks, Ordering::AcqRel);
        if previous < blocks {
            tracing::error!(previous, blocks, "used-block counter underflow");
            panic!(
                "released {} blocks but only {} were charged",
                blocks, previous
            );
        }
    }

    /// Apply a signed delta unconditionally.
    ///
    /// Positive deltas are not checked against the limit; growth paths
    /// should prefer [`BlockQuota::try_reserve`].
    ///
    /// # Arguments
    /// * `delta` - Signed block delta
    pub fn update_used_blocks(&self, delta: i64) {
        if delta >= 0 {
            self.used.fetch_add(delta as u64, Ordering::AcqRel);
        } else {
            self.release(delta.unsigned_abs());
        }
    }
}
