//! Reusable byte buffer pools
//!
//! Pools are explicit handles passed to the components that need them, never
//! process-wide singletons. A [`BufferFactory`] decides how new buffers are shaped
//! and how returned buffers are reset, so tests can substitute their own.
//!
//! Buffers are checked out as [`PooledBuffer`] guards and return to the pool when
//! the guard drops, on every exit path. Data that must outlive the guard has to be
//! copied out first.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

/// Shapes new buffers and resets returned ones.
pub trait BufferFactory: Send + Sync + fmt::Debug + 'static {
    /// Allocate a fresh buffer
    fn allocate(&self) -> Vec<u8>;

    /// Prepare a returned buffer for reuse
    fn reset(&self, buf: &mut Vec<u8>);
}

/// Fixed-length, zero-filled buffers for `read` calls.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBuffers {
    pub len: usize,
}

impl BufferFactory for ChunkBuffers {
    fn allocate(&self) -> Vec<u8> {
        vec![0; self.len]
    }

    fn reset(&self, buf: &mut Vec<u8>) {
        buf.resize(self.len, 0);
    }
}

/// Empty buffers with reserved capacity, for accumulating or staging bytes.
#[derive(Debug, Clone, Copy)]
pub struct StagingBuffers {
    pub capacity: usize,
}

impl BufferFactory for StagingBuffers {
    fn allocate(&self) -> Vec<u8> {
        Vec::with_capacity(self.capacity)
    }

    fn reset(&self, buf: &mut Vec<u8>) {
        buf.clear();
        // Oversized messages can balloon a buffer; do not keep that around
        if buf.capacity() > self.capacity * 4 {
            buf.shrink_to(self.capacity);
        }
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created by the factory
    pub allocated: u64,
    /// Acquisitions served from the idle list
    pub reused: u64,
    /// Buffers currently idle in the pool
    pub idle: usize,
}

struct Shared {
    factory: Box<dyn BufferFactory>,
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl Shared {
    fn idle(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        // A panic while holding the lock cannot leave the list inconsistent
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared pool handle. Cloning shares the same idle list.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<Shared>,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("factory", &self.shared.factory)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Default upper bound on idle buffers retained per pool.
pub const DEFAULT_MAX_IDLE: usize = 64;

impl BufferPool {
    /// Create a pool around a factory
    pub fn new(factory: impl BufferFactory) -> Self {
        Self::with_max_idle(factory, DEFAULT_MAX_IDLE)
    }

    /// Create a pool that keeps at most `max_idle` returned buffers
    pub fn with_max_idle(factory: impl BufferFactory, max_idle: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory: Box::new(factory),
                idle: Mutex::new(Vec::new()),
                max_idle,
                allocated: AtomicU64::new(0),
                reused: AtomicU64::new(0),
            }),
        }
    }

    /// Pool of zero-filled `len`-byte read buffers
    pub fn chunks(len: usize) -> Self {
        Self::new(ChunkBuffers { len })
    }

    /// Pool of empty buffers with `capacity` reserved
    pub fn staging(capacity: usize) -> Self {
        Self::new(StagingBuffers { capacity })
    }

    /// Check out a buffer, reusing an idle one when available.
    pub fn acquire(&self) -> PooledBuffer {
        let reused = self.shared.idle().pop();
        let buf = match reused {
            Some(buf) => {
                self.shared.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.shared.allocated.fetch_add(1, Ordering::Relaxed);
                trace!(factory = ?self.shared.factory, "Allocating pooled buffer");
                self.shared.factory.allocate()
            }
        };
        PooledBuffer { buf, pool: self.shared.clone() }
    }

    /// Current counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.shared.allocated.load(Ordering::Relaxed),
            reused: self.shared.reused.load(Ordering::Relaxed),
            idle: self.shared.idle().len(),
        }
    }
}

/// A checked-out buffer; returns to its pool on drop.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<Shared>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.buf.len()).finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        self.pool.factory.reset(&mut buf);
        let mut idle = self.pool.idle();
        if idle.len() < self.pool.max_idle {
            idle.push(buf);
        }
    }
}
