//! Reentrant reader / upgradable-reader / writer locks
//!
//! `ReentrantRwLock` is the logical lock behind the block collection and every
//! block. Ownership is tracked per OS thread so that a thread already inside a
//! lock scope can re-enter it with the same or a weaker mode without blocking
//! on itself. Waits are bounded by [`LockConfig::timeout`]; an expired wait is
//! reported as [`EditorError::LockTimeout`].

use crate::core::errors::{EditorError, Result};
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{error, trace};

/// Access mode requested from a [`ReentrantRwLock`]
///
/// Modes are ordered by strength: `Read < UpgradableRead < Write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    /// Shared access, any number of holders, no writer
    Read,
    /// Shared access with the exclusive right to upgrade to `Write`
    UpgradableRead,
    /// Exclusive access
    Write,
}

impl LockMode {
    /// Short lowercase name used in logs and error messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::UpgradableRead => "upgradable-read",
            Self::Write => "write",
        }
    }

    /// Whether data may be mutated under this mode
    #[must_use]
    pub const fn permits_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration shared by every lock of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Upper bound on a single blocking acquisition
    pub timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl LockConfig {
    /// Set the acquisition timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

thread_local! {
    static HELD_LOCKS: Cell<usize> = const { Cell::new(0) };
}

/// Whether the current thread holds any document lock
///
/// The deferred command queue is only drained by threads for which this is
/// `false`.
#[must_use]
pub fn held_by_current_thread() -> bool {
    held_count() > 0
}

/// Number of lock acquisitions (including reentrant ones) the current thread holds
#[must_use]
pub fn held_count() -> usize {
    HELD_LOCKS.with(Cell::get)
}

fn note_acquired() {
    HELD_LOCKS.with(|held| held.set(held.get() + 1));
}

fn note_released() {
    HELD_LOCKS.with(|held| held.set(held.get().saturating_sub(1)));
}

#[derive(Debug, Default)]
struct LockState {
    readers: HashMap<ThreadId, usize>,
    upgradable: Option<(ThreadId, usize)>,
    writer: Option<(ThreadId, usize)>,
    waiting_writers: usize,
}

impl LockState {
    fn held_by(&self, thread: ThreadId) -> Option<LockMode> {
        if matches!(self.writer, Some((owner, _)) if owner == thread) {
            Some(LockMode::Write)
        } else if matches!(self.upgradable, Some((owner, _)) if owner == thread) {
            Some(LockMode::UpgradableRead)
        } else if self.readers.contains_key(&thread) {
            Some(LockMode::Read)
        } else {
            None
        }
    }

    fn can_grant(&self, thread: ThreadId, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.writer.is_none() && self.waiting_writers == 0,
            LockMode::UpgradableRead => self.writer.is_none() && self.upgradable.is_none(),
            LockMode::Write => {
                self.writer.is_none()
                    && self.upgradable.map_or(true, |(owner, _)| owner == thread)
                    && self.readers.keys().all(|owner| *owner == thread)
            }
        }
    }

    fn grant(&mut self, thread: ThreadId, mode: LockMode) {
        match mode {
            LockMode::Read => *self.readers.entry(thread).or_insert(0) += 1,
            LockMode::UpgradableRead => {
                let count = self.upgradable.map_or(0, |(_, count)| count);
                self.upgradable = Some((thread, count + 1));
            }
            LockMode::Write => {
                let count = self.writer.map_or(0, |(_, count)| count);
                self.writer = Some((thread, count + 1));
            }
        }
    }

    fn release(&mut self, thread: ThreadId, mode: LockMode) {
        match mode {
            LockMode::Read => {
                if let Some(count) = self.readers.get_mut(&thread) {
                    *count -= 1;
                    if *count == 0 {
                        self.readers.remove(&thread);
                    }
                }
            }
            LockMode::UpgradableRead => {
                self.upgradable = match self.upgradable {
                    Some((owner, count)) if owner == thread && count > 1 => {
                        Some((owner, count - 1))
                    }
                    Some((owner, _)) if owner == thread => None,
                    other => other,
                };
            }
            LockMode::Write => {
                self.writer = match self.writer {
                    Some((owner, count)) if owner == thread && count > 1 => {
                        Some((owner, count - 1))
                    }
                    Some((owner, _)) if owner == thread => None,
                    other => other,
                };
            }
        }
    }
}

/// Reentrant read / upgradable-read / write lock with bounded waits
pub struct ReentrantRwLock {
    resource: String,
    timeout: Duration,
    state: Mutex<LockState>,
    released: Condvar,
}

impl ReentrantRwLock {
    /// Create a lock guarding the named resource
    pub fn new(resource: impl Into<String>, config: &LockConfig) -> Self {
        Self {
            resource: resource.into(),
            timeout: config.timeout,
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    /// Name of the guarded resource, as used in errors and logs
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Acquire the lock, blocking up to the configured timeout
    pub fn acquire(&self, mode: LockMode) -> Result<LockGuard<'_>> {
        self.enter(mode, true)?;
        Ok(LockGuard::new(self, mode))
    }

    /// Acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when the lock is currently incompatible. A thread
    /// holding only `Read` still gets [`EditorError::LockUpgradeForbidden`].
    pub fn try_acquire(&self, mode: LockMode) -> Result<Option<LockGuard<'_>>> {
        Ok(self
            .enter(mode, false)?
            .then(|| LockGuard::new(self, mode)))
    }

    /// Acquire the lock through an `Arc`, producing a guard that owns it
    pub fn acquire_owned(self: &Arc<Self>, mode: LockMode) -> Result<OwnedLockGuard> {
        self.enter(mode, true)?;
        Ok(OwnedLockGuard {
            lock: Arc::clone(self),
            mode,
            _thread_bound: PhantomData,
        })
    }

    /// Strongest mode the current thread holds, if any
    #[must_use]
    pub fn held_mode(&self) -> Option<LockMode> {
        self.state.lock().held_by(thread::current().id())
    }

    /// Whether any thread holds the lock in any mode
    #[must_use]
    pub fn is_locked(&self) -> bool {
        let state = self.state.lock();
        state.writer.is_some() || state.upgradable.is_some() || !state.readers.is_empty()
    }

    fn enter(&self, mode: LockMode, blocking: bool) -> Result<bool> {
        let thread = thread::current().id();
        let mut state = self.state.lock();

        match state.held_by(thread) {
            Some(held) if held >= mode => {
                state.grant(thread, mode);
                drop(state);
                note_acquired();
                trace!(resource = %self.resource, %mode, "reentrant lock acquisition");
                return Ok(true);
            }
            Some(LockMode::Read) => {
                return Err(EditorError::LockUpgradeForbidden {
                    resource: self.resource.clone(),
                    held: LockMode::Read,
                    requested: mode,
                });
            }
            _ => {}
        }

        if !state.can_grant(thread, mode) {
            if !blocking {
                return Ok(false);
            }

            let started = Instant::now();
            let deadline = started + self.timeout;
            let writer = mode == LockMode::Write;
            if writer {
                state.waiting_writers += 1;
            }

            while !state.can_grant(thread, mode) {
                if self.released.wait_until(&mut state, deadline).timed_out()
                    && !state.can_grant(thread, mode)
                {
                    if writer {
                        state.waiting_writers -= 1;
                        self.released.notify_all();
                    }
                    let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    error!(resource = %self.resource, %mode, waited_ms, "lock acquisition timed out");
                    return Err(EditorError::LockTimeout {
                        mode,
                        resource: self.resource.clone(),
                        waited_ms,
                    });
                }
            }

            if writer {
                state.waiting_writers -= 1;
            }
        }

        state.grant(thread, mode);
        drop(state);
        note_acquired();
        trace!(resource = %self.resource, %mode, "lock acquired");
        Ok(true)
    }

    fn exit(&self, mode: LockMode) {
        let thread = thread::current().id();
        self.state.lock().release(thread, mode);
        self.released.notify_all();
        note_released();
        trace!(resource = %self.resource, %mode, "lock released");
    }
}

impl fmt::Debug for ReentrantRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReentrantRwLock")
            .field("resource", &self.resource)
            .field("timeout", &self.timeout)
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Borrowed guard; releases its mode on drop
///
/// Guards are bound to the acquiring thread and therefore `!Send`.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a ReentrantRwLock,
    mode: LockMode,
    _thread_bound: PhantomData<*const ()>,
}

impl<'a> LockGuard<'a> {
    fn new(lock: &'a ReentrantRwLock, mode: LockMode) -> Self {
        Self {
            lock,
            mode,
            _thread_bound: PhantomData,
        }
    }

    /// Mode this guard holds
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Resource name of the underlying lock
    #[must_use]
    pub fn resource(&self) -> &str {
        self.lock.resource()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.exit(self.mode);
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource", &self.lock.resource)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Guard keeping its lock alive through an `Arc`
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct OwnedLockGuard {
    lock: Arc<ReentrantRwLock>,
    mode: LockMode,
    _thread_bound: PhantomData<*const ()>,
}

impl OwnedLockGuard {
    /// Mode this guard holds
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for OwnedLockGuard {
    fn drop(&mut self) {
        self.lock.exit(self.mode);
    }
}

impl fmt::Debug for OwnedLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedLockGuard")
            .field("resource", &self.lock.resource)
            .field("mode", &self.mode)
            .finish()
    }
}

static_assertions::assert_impl_all!(ReentrantRwLock: Send, Sync);
static_assertions::assert_not_impl_any!(LockGuard<'static>: Send);
static_assertions::assert_not_impl_any!(OwnedLockGuard: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn lock() -> ReentrantRwLock {
        ReentrantRwLock::new("test", &LockConfig::default())
    }

    #[test]
    fn mode_ordering() {
        assert!(LockMode::Read < LockMode::UpgradableRead);
        assert!(LockMode::UpgradableRead < LockMode::Write);
        assert!(LockMode::Write.permits_write());
        assert!(!LockMode::UpgradableRead.permits_write());
    }

    #[test]
    fn reentrant_same_and_weaker_modes() {
        let lock = lock();
        let write = lock.acquire(LockMode::Write).unwrap();
        let read = lock.acquire(LockMode::Read).unwrap();
        let write_again = lock.acquire(LockMode::Write).unwrap();
        assert_eq!(lock.held_mode(), Some(LockMode::Write));
        drop(write_again);
        drop(write);
        assert_eq!(lock.held_mode(), Some(LockMode::Read));
        drop(read);
        assert_eq!(lock.held_mode(), None);
        assert!(!lock.is_locked());
    }

    #[test]
    fn upgradable_can_upgrade_to_write() {
        let lock = lock();
        let _upgradable = lock.acquire(LockMode::UpgradableRead).unwrap();
        let write = lock.acquire(LockMode::Write).unwrap();
        assert_eq!(write.mode(), LockMode::Write);
    }

    #[test]
    fn read_only_holder_cannot_upgrade() {
        let lock = lock();
        let _read = lock.acquire(LockMode::Read).unwrap();
        let err = lock.acquire(LockMode::Write).unwrap_err();
        assert!(matches!(err, EditorError::LockUpgradeForbidden { .. }));
        let err = lock.acquire(LockMode::UpgradableRead).unwrap_err();
        assert!(matches!(err, EditorError::LockUpgradeForbidden { .. }));
    }

    #[test]
    fn held_counter_tracks_guards() {
        let lock = lock();
        assert!(!held_by_current_thread());
        {
            let _a = lock.acquire(LockMode::Read).unwrap();
            let _b = lock.acquire(LockMode::Read).unwrap();
            assert_eq!(held_count(), 2);
        }
        assert!(!held_by_current_thread());
    }

    #[test]
    fn writer_excludes_other_threads() {
        let lock = Arc::new(lock());
        let _write = lock.acquire(LockMode::Write).unwrap();

        let other = Arc::clone(&lock);
        let observed = thread::spawn(move || {
            let read = other.try_acquire(LockMode::Read).unwrap().is_some();
            let upgradable = other
                .try_acquire(LockMode::UpgradableRead)
                .unwrap()
                .is_some();
            (read, upgradable)
        })
        .join()
        .unwrap();

        assert_eq!(observed, (false, false));
    }

    #[test]
    fn readers_share_with_upgradable() {
        let lock = Arc::new(lock());
        let _upgradable = lock.acquire(LockMode::UpgradableRead).unwrap();

        let other = Arc::clone(&lock);
        let shared = thread::spawn(move || other.try_acquire(LockMode::Read).unwrap().is_some())
            .join()
            .unwrap();
        assert!(shared);
    }

    #[test]
    fn blocked_writer_proceeds_after_release() {
        let lock = Arc::new(lock());
        let read = lock.acquire(LockMode::Read).unwrap();
        let (tx, rx) = mpsc::channel();

        let other = Arc::clone(&lock);
        let writer = thread::spawn(move || {
            let guard = other.acquire(LockMode::Write).unwrap();
            tx.send(guard.mode()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(read);
        assert_eq!(rx.recv().unwrap(), LockMode::Write);
        writer.join().unwrap();
    }

    #[test]
    fn bounded_wait_times_out() {
        let lock = Arc::new(ReentrantRwLock::new(
            "slow",
            &LockConfig::default().with_timeout(Duration::from_millis(20)),
        ));
        let _write = lock.acquire(LockMode::Write).unwrap();

        let other = Arc::clone(&lock);
        let err = thread::spawn(move || other.acquire(LockMode::Read).map(|_| ()))
            .join()
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            EditorError::LockTimeout {
                mode: LockMode::Read,
                ..
            }
        ));
    }

    #[test]
    fn owned_guard_releases_on_drop() {
        let lock = Arc::new(lock());
        let guard = lock.acquire_owned(LockMode::Write).unwrap();
        assert!(lock.is_locked());
        drop(guard);
        assert!(!lock.is_locked());
    }
}
