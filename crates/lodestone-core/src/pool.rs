//! Spin lock and scratch-vector pool.
//!
//! Block drivers that run many small kernel calls reuse their gather
//! scratch through [`VecPool`] instead of allocating per call. The pool is
//! guarded by a [`SpinLock`]: the critical section is a `Vec` push/pop, far
//! cheaper than parking a thread.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// A minimal test-and-set spin lock.
///
/// Suitable only for critical sections of a few instructions; contended
/// waiters burn CPU with `spin_loop` hints rather than blocking.
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// Same bounds as std's Mutex.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning until it is free.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Consume the lock and return the inner value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// RAII guard returned by [`SpinLock::lock`].
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: the lock is held for the guard's lifetime.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the lock is held exclusively for the guard's lifetime.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// A pool of reusable `Vec<f64>` scratch buffers.
///
/// `take` hands out a zero-filled vector of the requested length, reusing a
/// previously returned allocation when one is large enough. `give` returns a
/// vector to the pool. Capacity is bounded so a burst of large requests does
/// not pin memory forever.
pub struct VecPool {
    free: SpinLock<Vec<Vec<f64>>>,
}

const POOL_MAX_FREE: usize = 32;

impl VecPool {
    pub const fn new() -> Self {
        Self {
            free: SpinLock::new(Vec::new()),
        }
    }

    /// Get a zero-filled scratch vector of exactly `len` elements.
    pub fn take(&self, len: usize) -> Vec<f64> {
        let recycled = {
            let mut free = self.free.lock();
            free.pop()
        };
        match recycled {
            Some(mut v) => {
                v.clear();
                v.resize(len, 0.0);
                v
            }
            None => vec![0.0; len],
        }
    }

    /// Return a scratch vector to the pool.
    pub fn give(&self, v: Vec<f64>) {
        let mut free = self.free.lock();
        if free.len() < POOL_MAX_FREE {
            free.push(v);
        }
    }
}

impl Default for VecPool {
    fn default() -> Self {
        Self::new()
    }
}
