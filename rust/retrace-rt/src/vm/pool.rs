//! Reusable argument buffers for compute-module calls.
//!
//! Every call marshals a handful of large strings (config, shard account,
//! message, libraries). Buffers are kept sorted by capacity and handed back
//! on drop; the pool retains at most as many buffers as were ever in use at
//! once.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct ArgPool {
    free: Mutex<Vec<String>>,
    outstanding: AtomicUsize,
    high_water: AtomicUsize,
}

impl ArgPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest free buffer with at least `min_capacity`, or a new one.
    pub fn take(&self, min_capacity: usize) -> PooledString<'_> {
        let in_use = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(in_use, Ordering::SeqCst);

        let reused = {
            let mut free = self.free.lock();
            let idx = free.partition_point(|s| s.capacity() < min_capacity);
            (idx < free.len()).then(|| free.remove(idx))
        };
        PooledString {
            buf: Some(reused.unwrap_or_else(|| String::with_capacity(min_capacity))),
            pool: self,
        }
    }

    /// Buffers currently parked in the pool.
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }

    fn give_back(&self, mut buf: String) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        buf.clear();
        let limit = self.high_water.load(Ordering::SeqCst);
        let mut free = self.free.lock();
        let idx = free.partition_point(|s| s.capacity() < buf.capacity());
        free.insert(idx, buf);
        while free.len() > limit {
            free.remove(0);
        }
    }
}

/// A pool buffer returned on drop.
#[derive(Debug)]
pub struct PooledString<'a> {
    buf: Option<String>,
    pool: &'a ArgPool,
}

impl Deref for PooledString<'_> {
    type Target = String;

    fn deref(&self) -> &String {
        match &self.buf {
            Some(buf) => buf,
            None => unreachable!("buffer taken before drop"),
        }
    }
}

impl DerefMut for PooledString<'_> {
    fn deref_mut(&mut self) -> &mut String {
        match &mut self.buf {
            Some(buf) => buf,
            None => unreachable!("buffer taken before drop"),
        }
    }
}

impl Drop for PooledString<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_reused_by_capacity() {
        let pool = ArgPool::new();
        {
            let mut a = pool.take(16);
            a.push_str("config");
            let _b = pool.take(4096);
        }
        assert_eq!(pool.retained(), 2);
        let big = pool.take(1000);
        assert!(big.capacity() >= 4096);
        assert!(big.is_empty());
        assert_eq!(pool.retained(), 1);
    }

    #[test]
    fn retention_follows_peak_concurrency() {
        let pool = ArgPool::new();
        drop(pool.take(8));
        drop(pool.take(8));
        drop(pool.take(8));
        // Never more than one buffer in flight.
        assert_eq!(pool.retained(), 1);

        let held: Vec<_> = (0..3).map(|_| pool.take(8)).collect();
        drop(held);
        assert_eq!(pool.retained(), 3);
    }
}
