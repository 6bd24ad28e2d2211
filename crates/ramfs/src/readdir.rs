//! Paginated directory enumeration sessions.
//!
//! A session is created on the first readdir call (cookie 0) with a private
//! copy of the directory's children, then looked up by cookie on every
//! following call. The copy is never refreshed, so an enumeration sees the
//! directory exactly as it was when the session started.
//!
//! ```text
//!   cookie == 0 ──► Start ──► Paging ──(cursor at end)──► Exhausted
//!                              ▲   │                        │
//!                              └───┘ resume(cookie)         └─► removed, NotFound
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;

use crate::error::{FsError, FsResult};
use crate::inode::InodeId;

/// Opaque session identifier.
///
/// Always in `1..=i64::MAX` so it can double as a FUSE directory offset.
pub type Cookie = u64;

/// Cookie value that asks for a new session.
pub const START_COOKIE: Cookie = 0;

const MAX_COOKIE: Cookie = i64::MAX as Cookie;

/// Shared handle to a live session.
pub type ReaddirHandle = Arc<Mutex<ReaddirSession>>;

/// One in-progress directory enumeration.
#[derive(Debug)]
pub struct ReaddirSession {
    /// Key in the session table.
    cookie: Cookie,
    /// Directory being enumerated.
    dir: InodeId,
    /// Children as of session start, sorted by name.
    entries: Vec<(String, InodeId)>,
    /// Index of the next entry to hand out.
    cursor: usize,
    /// Last time the session was created or resumed.
    last_access: Instant,
}

impl ReaddirSession {
    fn new(cookie: Cookie, dir: InodeId, entries: Vec<(String, InodeId)>) -> Self {
        Self {
            cookie,
            dir,
            entries,
            cursor: 0,
            last_access: Instant::now(),
        }
    }

    /// Session cookie.
    pub fn cookie(&self) -> Cookie {
        self.cookie
    }

    /// Directory inode this session enumerates.
    pub fn dir(&self) -> InodeId {
        self.dir
    }

    /// Entry under the cursor, or None once exhausted.
    pub fn current(&self) -> Option<&(String, InodeId)> {
        self.entries.get(self.cursor)
    }

    /// Move the cursor forward by one.
    ///
    /// # Returns
    /// True if the cursor now points at a valid entry.
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
        !self.is_exhausted()
    }

    /// Whether the cursor has reached the end of the snapshot.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.entries.len()
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Entries not yet handed out.
    pub fn remaining(&self) -> &[(String, InodeId)] {
        &self.entries[self.cursor.min(self.entries.len())..]
    }

    /// Total number of entries in the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_access.elapsed()
    }
}

/// Table of live sessions, shared by every directory of a filesystem.
#[derive(Debug, Default)]
pub struct ReaddirSessions {
    sessions: DashMap<Cookie, ReaddirHandle>,
}

impl ReaddirSessions {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session over `entries` under a fresh random cookie.
    ///
    /// # Arguments
    /// * `dir` - Directory being enumerated
    /// * `entries` - Snapshot of its children
    pub fn start(&self, dir: InodeId, entries: Vec<(String, InodeId)>) -> ReaddirHandle {
        let mut rng = rand::rng();
        loop {
            let cookie: Cookie = rng.random_range(1..=MAX_COOKIE);
            match self.sessions.entry(cookie) {
                Entry::Occupied(_) => {
                    tracing::warn!(cookie, "readdir cookie collision, retrying");
                }
                Entry::Vacant(slot) => {
                    tracing::debug!(cookie, dir, entries = entries.len(), "readdir session started");
                    let handle: ReaddirHandle =
                        Arc::new(Mutex::new(ReaddirSession::new(cookie, dir, entries)));
                    slot.insert(handle.clone());
                    return handle;
                }
            }
        }
    }

    /// Look up a session by cookie.
    ///
    /// An exhausted session is removed from the table and reported as
    /// `NotFound`, as is a cookie that was never issued.
    ///
    /// # Arguments
    /// * `cookie` - Cookie from a previous call
    pub fn resume(&self, cookie: Cookie) -> FsResult<ReaddirHandle> {
        let handle: ReaddirHandle = match self.sessions.get(&cookie) {
            Some(entry) => entry.value().clone(),
            None => return Err(FsError::NotFound(format!("readdir cookie {}", cookie))),
        };

        let exhausted: bool = {
            let mut session = handle.lock();
            session.touch();
            session.is_exhausted()
        };
        if exhausted {
            self.sessions.remove(&cookie);
            tracing::debug!(cookie, "readdir session exhausted");
            return Err(FsError::NotFound(format!("readdir cookie {}", cookie)));
        }
        Ok(handle)
    }

    /// Drop a session before it is exhausted.
    ///
    /// # Returns
    /// True if the cookie was live.
    pub fn remove(&self, cookie: Cookie) -> bool {
        self.sessions.remove(&cookie).is_some()
    }

    /// Drop sessions idle for longer than `ttl`.
    ///
    /// Sessions whose lock is currently held by a caller are kept.
    ///
    /// # Returns
    /// Number of sessions removed.
    pub fn reap_expired(&self, ttl: Duration) -> usize {
        let before: usize = self.sessions.len();
        self.sessions.retain(|_, handle| match handle.try_lock() {
            Some(session) => session.idle_for() <= ttl,
            None => true,
        });
        let reaped: usize = before.saturating_sub(self.sessions.len());
        if reaped > 0 {
            tracing::debug!(reaped, "reaped idle readdir sessions");
        }
        reaped
    }

    /// Whether `cookie` names a live session.
    pub fn contains(&self, cookie: Cookie) -> bool {
        self.sessions.contains_key(&cookie)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn entries(names: &[&str]) -> Vec<(String, InodeId)> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i as InodeId + 10))
            .collect()
    }

    #[test]
    fn test_session_cursor() {
        let table: ReaddirSessions = ReaddirSessions::new();
        let handle: ReaddirHandle = table.start(1, entries(&["a", "b"]));
        let mut session = handle.lock();

        assert_ne!(session.cookie(), START_COOKIE);
        assert!(session.cookie() <= MAX_COOKIE);
        assert_eq!(session.dir(), 1);
        assert_eq!(session.len(), 2);
        assert_eq!(session.current().unwrap().0, "a");
        assert!(session.advance());
        assert_eq!(session.current().unwrap().0, "b");
        assert_eq!(session.remaining().len(), 1);
        assert!(!session.advance());
        assert!(session.is_exhausted());
        assert!(session.current().is_none());
        assert!(!session.advance());
        assert_eq!(session.position(), 2);
    }

    #[test]
    fn test_resume_and_exhaust() {
        let table: ReaddirSessions = ReaddirSessions::new();
        let handle: ReaddirHandle = table.start(1, entries(&["x"]));
        let cookie: Cookie = handle.lock().cookie();

        let resumed: ReaddirHandle = table.resume(cookie).unwrap();
        assert!(Arc::ptr_eq(&handle, &resumed));

        resumed.lock().advance();
        assert!(matches!(table.resume(cookie), Err(FsError::NotFound(_))));
        assert!(!table.contains(cookie));
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_cookie() {
        let table: ReaddirSessions = ReaddirSessions::new();
        assert!(matches!(table.resume(12345), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_empty_snapshot_session() {
        let table: ReaddirSessions = ReaddirSessions::new();
        let handle: ReaddirHandle = table.start(1, Vec::new());
        let cookie: Cookie = handle.lock().cookie();
        assert!(handle.lock().is_empty());
        assert!(table.resume(cookie).is_err());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_cookies_unique() {
        let table: ReaddirSessions = ReaddirSessions::new();
        let mut seen: HashSet<Cookie> = HashSet::new();
        for _ in 0..1000 {
            let handle: ReaddirHandle = table.start(1, entries(&["a"]));
            assert!(seen.insert(handle.lock().cookie()));
        }
        assert_eq!(table.len(), 1000);
    }

    #[test]
    fn test_reap_expired() {
        let table: ReaddirSessions = ReaddirSessions::new();
        table.start(1, entries(&["a"]));
        table.start(2, entries(&["b"]));

        assert_eq!(table.reap_expired(Duration::from_secs(60)), 0);
        assert_eq!(table.len(), 2);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(table.reap_expired(Duration::ZERO), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_reap_skips_locked_session() {
        let table: ReaddirSessions = ReaddirSessions::new();
        let handle: ReaddirHandle = table.start(1, entries(&["a"]));
        std::thread::sleep(Duration::from_millis(5));

        let guard = handle.lock();
        assert_eq!(table.reap_expired(Duration::ZERO), 0);
        drop(guard);
        assert_eq!(table.reap_expired(Duration::ZERO), 1);
    }

    #[test]
    fn test_remove() {
        let table: ReaddirSessions = ReaddirSessions::new();
        let cookie: Cookie = table.start(1, entries(&["a"])).lock().cookie();
        assert!(table.remove(cookie));
        assert!(!table.remove(cookie));
    }
}
