//! Reusable copy buffers for the relay hot path.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Size of every buffer handed out by [`BufferPool::default`].
pub const BUFFER_SIZE: usize = 32 * 1024;

/// Idle buffers kept around; anything released beyond this is dropped.
const MAX_IDLE: usize = 256;

#[derive(Debug)]
pub struct BufferPool {
    size: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BUFFER_SIZE)
    }
}

impl BufferPool {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Hand out a buffer of exactly `buffer_size()` bytes.
    pub fn acquire(&self) -> Vec<u8> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match reused {
            Some(mut buf) => {
                buf.resize(self.size, 0);
                buf
            }
            None => vec![0; self.size],
        }
    }

    /// Return a buffer to the pool.
    ///
    /// Buffers whose capacity no longer matches the pool size (a caller grew or
    /// replaced it) are dropped instead of being handed out again.
    pub fn release(&self, buf: Vec<u8>) {
        if buf.capacity() != self.size {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE {
            idle.push(buf);
        }
    }

    /// Acquire a buffer that goes back to the pool when dropped.
    pub fn checkout(&self) -> PooledBuffer<'_> {
        PooledBuffer {
            pool: self,
            buf: Some(self.acquire()),
        }
    }
}

pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_has_configured_size() {
        let pool = BufferPool::default();
        let buf = pool.acquire();
        assert_eq!(buf.len(), BUFFER_SIZE);
        assert_eq!(pool.buffer_size(), 32 * 1024);
    }

    #[test]
    fn test_release_reuses_matching_buffer() {
        let pool = BufferPool::new(1024);
        let mut buf = pool.acquire();
        buf[0] = 7;
        let ptr = buf.as_ptr();
        pool.release(buf);
        assert_eq!(pool.idle_count(), 1);

        let again = pool.acquire();
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_release_discards_mismatched_capacity() {
        let pool = BufferPool::new(1024);

        pool.release(Vec::with_capacity(10));
        assert_eq!(pool.idle_count(), 0);

        let mut grown = pool.acquire();
        grown.reserve_exact(4096);
        pool.release(grown);
        assert_eq!(pool.idle_count(), 0);

        let fresh = pool.acquire();
        assert_eq!(fresh.len(), 1024);
    }

    #[test]
    fn test_truncated_buffer_comes_back_full_length() {
        let pool = BufferPool::new(64);
        let mut buf = pool.acquire();
        buf.truncate(3);
        pool.release(buf);

        assert_eq!(pool.acquire().len(), 64);
    }

    #[test]
    fn test_checkout_returns_on_drop() {
        let pool = BufferPool::new(128);
        {
            let mut guard = pool.checkout();
            assert_eq!(guard.len(), 128);
            guard[..2].copy_from_slice(b"ok");
        }
        assert_eq!(pool.idle_count(), 1);
    }
}
