//! Reusable in-memory buffers for body capture. A `MemoryStreamFactory` produces reusable
//! buffer streams for body capture, and may pool them.

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

/// A reusable, growable byte buffer handed out by a [`MemoryStreamFactory`].
#[derive(Debug, Default)]
pub struct MemoryStream {
    buf: BytesMut,
}

impl MemoryStream {
    /// Appends `data` to the buffer.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Consumes the buffer, returning its contents as an immutable [`Bytes`].
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    /// Current buffered length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Produces [`MemoryStream`] buffers for capturing request/response bodies when direct
/// streaming is disabled. Implementations may pool buffers to avoid repeated allocation on
/// hot paths, the same motivation as the invoker's handler cache.
pub trait MemoryStreamFactory: Send + Sync + std::fmt::Debug {
    /// Hands out a fresh or recycled buffer.
    fn acquire(&self) -> MemoryStream;

    /// Returns a buffer's backing storage to the pool for reuse. The contents are discarded;
    /// only the allocation is recycled.
    fn release(&self, stream: MemoryStream);
}

/// A simple bounded pool of reusable buffers, backed by a mutex-guarded `Vec`, in the same
/// `Arc<Mutex<Vec<T>>>` pooling idiom as `diagnostics::MemorySink`.
#[derive(Debug, Clone)]
pub struct PooledMemoryStreamFactory {
    pool: Arc<Mutex<Vec<BytesMut>>>,
    capacity: usize,
}

impl PooledMemoryStreamFactory {
    /// Builds a pool that retains at most `capacity` recycled buffers.
    pub fn new(capacity: usize) -> Self {
        Self { pool: Arc::new(Mutex::new(Vec::with_capacity(capacity))), capacity }
    }

    /// Number of recycled buffers currently held.
    pub fn pooled_count(&self) -> usize {
        self.pool.lock().unwrap().len()
    }
}

impl Default for PooledMemoryStreamFactory {
    fn default() -> Self {
        Self::new(16)
    }
}

impl MemoryStreamFactory for PooledMemoryStreamFactory {
    fn acquire(&self) -> MemoryStream {
        let mut pool = self.pool.lock().unwrap();
        let buf = pool.pop().unwrap_or_default();
        MemoryStream { buf }
    }

    fn release(&self, stream: MemoryStream) {
        let mut buf = stream.buf;
        buf.clear();
        let mut pool = self.pool.lock().unwrap();
        if pool.len() < self.capacity {
            pool.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_stream_accumulates_writes() {
        let factory = PooledMemoryStreamFactory::default();
        let mut stream = factory.acquire();
        stream.write(b"hello");
        stream.write(b" world");
        assert_eq!(stream.freeze(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn released_buffer_is_recycled() {
        let factory = PooledMemoryStreamFactory::new(4);
        let stream = factory.acquire();
        factory.release(stream);
        assert_eq!(factory.pooled_count(), 1);

        let recycled = factory.acquire();
        assert!(recycled.is_empty());
        assert_eq!(factory.pooled_count(), 0);
    }

    #[test]
    fn pool_respects_capacity() {
        let factory = PooledMemoryStreamFactory::new(1);
        factory.release(factory.acquire());
        factory.release(factory.acquire());
        assert_eq!(factory.pooled_count(), 1);
    }
}
