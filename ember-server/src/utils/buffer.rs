use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

/// A bounded pool of byte buffers for decompressed uploads.
///
/// Buffers are checked out with [`get`](Self::get) and returned automatically when the
/// [`PooledBuffer`] is dropped. Returned buffers are cleared and kept for reuse while the pool has
/// room, otherwise they are deallocated. Buffers that grew beyond the size limit are always
/// deallocated, so large uploads do not pin their memory in the pool.
pub struct BufferPool {
    buffers: Mutex<Vec<BytesMut>>,
    capacity: usize,
    max_buffer_size: usize,
}

impl BufferPool {
    /// Creates a pool that keeps at most `capacity` idle buffers of up to `max_buffer_size` bytes
    /// each.
    pub fn new(capacity: usize, max_buffer_size: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            max_buffer_size,
        }
    }

    /// Checks out an empty buffer, reusing an idle one if available.
    pub fn get(self: &Arc<Self>) -> PooledBuffer {
        let buffer = self.buffers.lock().pop().unwrap_or_default();
        debug_assert!(buffer.is_empty());

        PooledBuffer {
            buffer,
            pool: Arc::clone(self),
        }
    }

    fn put(&self, mut buffer: BytesMut) {
        if buffer.capacity() > self.max_buffer_size {
            return;
        }
        buffer.clear();

        let mut buffers = self.buffers.lock();
        if buffers.len() < self.capacity {
            buffers.push(buffer);
        }
    }

    /// Returns the number of idle buffers.
    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Returns `true` if there are no idle buffers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of idle buffers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the largest buffer capacity in bytes kept for reuse.
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.len())
            .field("capacity", &self.capacity)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish()
    }
}

/// A buffer checked out from a [`BufferPool`].
///
/// The buffer is cleared and returned to its pool on drop.
pub struct PooledBuffer {
    buffer: BytesMut,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buffer));
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}
