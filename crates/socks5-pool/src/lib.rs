//! A fixed-capacity pool of fixed-size byte buffers.
//!
//! Every session's handshake and relay phases borrow buffers from a single
//! pool shared across the whole server, so total buffer memory is capped
//! regardless of how many connections are open. Capacity is enforced with
//! a counting semaphore — the same building block the upstream connection
//! pools in this codebase use to cap concurrent connections — and the
//! underlying buffer memory itself is recycled through a lock-free queue
//! so steady-state load doesn't pay for repeated allocation.

use std::sync::{Arc, OnceLock};

use crossbeam_queue::SegQueue;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-buffer data area size. Sized to satisfy the relay loop's largest
/// single read request.
pub const HEV_BUFFER_DATA_SIZE: usize = 4092;

type BufData = Box<[u8; HEV_BUFFER_DATA_SIZE]>;

fn new_buf_data() -> BufData {
    Box::new([0u8; HEV_BUFFER_DATA_SIZE])
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("buffer pool exhausted: max_count reached")]
    Exhausted,
}

/// Allocator of [`PooledBuffer`]s, capped at `max_count` live buffers.
pub struct BufferPool {
    max_count: usize,
    slots: Arc<Semaphore>,
    free: Arc<SegQueue<BufData>>,
    zero: OnceLock<Arc<[u8; HEV_BUFFER_DATA_SIZE]>>,
}

impl BufferPool {
    pub fn new(max_count: usize) -> Self {
        Self {
            max_count,
            slots: Arc::new(Semaphore::new(max_count)),
            free: Arc::new(SegQueue::new()),
            zero: OnceLock::new(),
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Buffers still available to allocate, whether by reusing a freed
    /// buffer or by allocating fresh memory. Mirrors the pool's
    /// `free_count` invariant: `max_count - live_count`.
    pub fn free_count(&self) -> usize {
        self.slots.available_permits()
    }

    /// Takes one buffer from the free list, or allocates a fresh one if
    /// the free list is empty and the pool has not hit `max_count` live
    /// buffers. Fails with [`PoolError::Exhausted`] once it has.
    pub fn alloc(&self) -> Result<PooledBuffer, PoolError> {
        let permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| PoolError::Exhausted)?;
        let data = self.free.pop().unwrap_or_else(new_buf_data);
        Ok(PooledBuffer {
            data: Some(data),
            offset: 0,
            length: 0,
            _permit: permit,
            free: self.free.clone(),
        })
    }

    /// Returns a single shared, zero-initialised scratch buffer. Created
    /// lazily on first use and owned by the pool for its whole lifetime —
    /// it does not count against `max_count` and is never individually
    /// freed.
    pub fn alloc_zero(&self) -> Arc<[u8; HEV_BUFFER_DATA_SIZE]> {
        self.zero
            .get_or_init(|| Arc::new([0u8; HEV_BUFFER_DATA_SIZE]))
            .clone()
    }

    /// Drops every buffer currently sitting in the free list, releasing
    /// their memory back to the allocator. Live (checked-out) buffers are
    /// untouched. Capacity (`max_count`) is unaffected — a later `alloc`
    /// that misses the (now-empty) free list simply allocates fresh
    /// memory again.
    pub fn shrink(&self) {
        let mut dropped = 0usize;
        while self.free.pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "buffer pool shrink released reusable buffers");
        }
    }
}

/// A single pool-owned buffer, checked out for the duration of one I/O
/// operation (or one relay direction's worth of them).
///
/// `offset`/`length` describe the active window during incremental I/O —
/// a partial write advances `offset` and shrinks `length` without
/// touching the underlying bytes; a completed write resets both ahead of
/// the next read. Returned to the pool's free list on drop, so every
/// early-return/error path in the session releases its buffers for free.
pub struct PooledBuffer {
    data: Option<BufData>,
    offset: usize,
    length: usize,
    _permit: OwnedSemaphorePermit,
    free: Arc<SegQueue<BufData>>,
}

impl PooledBuffer {
    pub fn capacity(&self) -> usize {
        HEV_BUFFER_DATA_SIZE
    }

    /// The full data area, for reading fresh bytes into at offset 0.
    pub fn as_full_mut(&mut self) -> &mut [u8; HEV_BUFFER_DATA_SIZE] {
        self.data.as_mut().expect("buffer taken")
    }

    /// The full data area, read-only — for inspecting bytes accumulated so
    /// far without committing to a filled length yet.
    pub fn as_full(&self) -> &[u8; HEV_BUFFER_DATA_SIZE] {
        self.data.as_ref().expect("buffer taken")
    }

    /// The active `[offset, offset+length)` window, for writing out.
    pub fn active(&self) -> &[u8] {
        let data = self.data.as_ref().expect("buffer taken");
        &data[self.offset..self.offset + self.length]
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Marks `len` bytes starting at offset 0 as the active window, after
    /// a fresh read.
    pub fn set_filled(&mut self, len: usize) {
        self.offset = 0;
        self.length = len;
    }

    /// Advances the active window after a partial write of `n` bytes.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.length);
        self.offset += n;
        self.length -= n;
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.free.push(data);
        }
    }
}
