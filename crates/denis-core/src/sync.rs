//! Locking primitives for driver instances and bus implementations
//!
//! [`InstanceLock`] follows the RTOS semaphore shape: `lock` may fail
//! (an interrupted wait), `unlock` is called by the holder. [`InstanceGuard`]
//! pairs the two so the lock is released on every exit path.
//!
//! Hosted bus implementations use [`BlockingLock`], which parks waiters and
//! only lets the holding thread release it.

use crate::error::Result;

/// Exclusive-access primitive guarding one driver instance
pub trait InstanceLock: Send + Sync {
    /// Block until the lock is held
    ///
    /// Returns [`Error::Interrupted`](crate::Error::Interrupted) if the
    /// wait was interrupted; the lock is not held in that case.
    fn lock(&self) -> Result<()>;

    /// Release a lock held by the caller
    fn unlock(&self);
}

/// Spinning lock usable without an operating system
///
/// Never fails to acquire. Used as the default instance lock, where the
/// only caller of `unlock` is the [`InstanceGuard`] that took it.
#[derive(Default)]
pub struct SpinLock {
    inner: spin::Mutex<()>,
}

impl SpinLock {
    /// Create an unlocked lock
    pub const fn new() -> Self {
        Self {
            inner: spin::Mutex::new(()),
        }
    }

    /// Returns true if some holder currently owns the lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl InstanceLock for SpinLock {
    fn lock(&self) -> Result<()> {
        // The guard is forgotten; ownership is tracked by the caller and
        // ended by `unlock`.
        core::mem::forget(self.inner.lock());
        Ok(())
    }

    fn unlock(&self) {
        // SAFETY: callers only unlock a lock they acquired with `lock`,
        // whose guard was forgotten above.
        unsafe { self.inner.force_unlock() }
    }
}

/// Held instance lock, released on drop
pub struct InstanceGuard<'a> {
    lock: &'a dyn InstanceLock,
}

impl<'a> InstanceGuard<'a> {
    /// Acquire `lock`, propagating an interrupted wait
    pub fn acquire(lock: &'a dyn InstanceLock) -> Result<Self> {
        lock.lock()?;
        Ok(Self { lock })
    }
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Sleeping lock that remembers its holder
///
/// Waiters block on a condition variable instead of spinning. Only the
/// thread that acquired the lock may release it; any other release, and a
/// second acquire by the holder, fail with
/// [`Error::BusLockFailed`](crate::Error::BusLockFailed).
#[cfg(feature = "std")]
#[derive(Default)]
pub struct BlockingLock {
    holder: std::sync::Mutex<Option<std::thread::ThreadId>>,
    released: std::sync::Condvar,
}

#[cfg(feature = "std")]
impl BlockingLock {
    /// Create an unlocked lock
    pub const fn new() -> Self {
        Self {
            holder: std::sync::Mutex::new(None),
            released: std::sync::Condvar::new(),
        }
    }

    fn holder(&self) -> std::sync::MutexGuard<'_, Option<std::thread::ThreadId>> {
        self.holder
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Block until the calling thread holds the lock
    pub fn acquire(&self) -> Result<()> {
        let me = std::thread::current().id();
        let mut holder = self.holder();
        if *holder == Some(me) {
            log::error!("lock: acquired twice by the same thread");
            return Err(crate::Error::BusLockFailed);
        }
        while holder.is_some() {
            holder = self
                .released
                .wait(holder)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        *holder = Some(me);
        Ok(())
    }

    /// Release the lock; fails unless the calling thread holds it
    pub fn release(&self) -> Result<()> {
        let mut holder = self.holder();
        if *holder != Some(std::thread::current().id()) {
            return Err(crate::Error::BusLockFailed);
        }
        *holder = None;
        drop(holder);
        self.released.notify_one();
        Ok(())
    }

    /// Returns true if some thread holds the lock
    pub fn is_locked(&self) -> bool {
        self.holder().is_some()
    }

    /// Returns true if the calling thread holds the lock
    pub fn is_held_by_current_thread(&self) -> bool {
        *self.holder() == Some(std::thread::current().id())
    }
}

#[cfg(feature = "std")]
impl InstanceLock for BlockingLock {
    fn lock(&self) -> Result<()> {
        self.acquire()
    }

    fn unlock(&self) {
        if let Err(e) = self.release() {
            log::warn!("lock: release by a thread that does not hold it: {}", e);
        }
    }
}
