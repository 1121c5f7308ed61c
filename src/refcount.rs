//! Atomic reference counts for proxies, stubs and local objects
//!
//! Increments are relaxed; the decrement that reaches zero synchronizes with
//! every earlier decrement before the owner tears anything down.

use std::sync::atomic::{fence, AtomicU32, Ordering};

#[derive(Debug)]
pub struct RefCounter {
    count: AtomicU32,
}

impl RefCounter {
    /// Counter holding one reference
    pub const fn new() -> Self {
        Self { count: AtomicU32::new(1) }
    }

    /// Increment, returning the new count
    #[inline]
    pub fn increment(&self) -> u32 {
        let old = self.count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(old < u32::MAX, "refcount overflow");
        old.wrapping_add(1)
    }

    /// Decrement, returning the new count; 0 means the caller must tear down
    ///
    /// Releasing an already-released counter stays at 0.
    #[inline]
    pub fn decrement(&self) -> u32 {
        let result = self
            .count
            .fetch_update(Ordering::Release, Ordering::Relaxed, |n| n.checked_sub(1));
        match result {
            Ok(1) => {
                fence(Ordering::Acquire);
                0
            }
            Ok(old) => old - 1,
            Err(_) => 0,
        }
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for RefCounter {
    fn default() -> Self {
        Self::new()
    }
}
