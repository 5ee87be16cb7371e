use parking_lot::Mutex;
use tsgw_schema::PointFormat;

/// Initial capacity of buffers for full messages.
const FULL_CAPACITY: usize = 256;

/// The encoding a buffer is used for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BufferKind {
    /// Compact points of a fixed, small size.
    Compact,
    /// Full MessagePack encoded metrics.
    Full,
}

impl BufferKind {
    fn initial_capacity(self) -> usize {
        match self {
            Self::Compact => PointFormat::WithOrg.size(),
            Self::Full => FULL_CAPACITY,
        }
    }
}

/// A free list of message buffers of one [`BufferKind`].
///
/// At most `max_idle` released buffers are retained, additional ones are deallocated.
#[derive(Debug)]
pub struct BufferPool {
    kind: BufferKind,
    max_idle: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new(kind: BufferKind, max_idle: usize) -> Self {
        Self {
            kind,
            max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Returns the kind of buffers in this pool.
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Takes an empty buffer from the pool or allocates a new one.
    pub fn acquire(&self) -> Vec<u8> {
        self.idle
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.kind.initial_capacity()))
    }

    /// Returns a buffer to the pool.
    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buffer);
        }
    }

    /// Returns the number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// The buffer pools of a publisher, one per [`BufferKind`].
#[derive(Debug)]
pub struct BufferPools {
    compact: BufferPool,
    full: BufferPool,
}

impl BufferPools {
    /// Creates pools retaining up to `max_idle` buffers each.
    pub fn new(max_idle: usize) -> Self {
        Self {
            compact: BufferPool::new(BufferKind::Compact, max_idle),
            full: BufferPool::new(BufferKind::Full, max_idle),
        }
    }

    /// Returns the pool for `kind`.
    pub fn get(&self, kind: BufferKind) -> &BufferPool {
        match kind {
            BufferKind::Compact => &self.compact,
            BufferKind::Full => &self.full,
        }
    }
}

/// A buffer borrowed from [`BufferPools`] for one message.
#[derive(Debug)]
pub struct Message {
    /// The encoding of the payload.
    pub kind: BufferKind,
    /// The encoded payload.
    pub payload: Vec<u8>,
}

/// The messages of one batch.
///
/// All buffers go back to their pool when the batch is dropped, whichever way publishing
/// ends.
#[derive(Debug)]
pub struct MessageBatch<'a> {
    pools: &'a BufferPools,
    messages: Vec<Message>,
}

impl<'a> MessageBatch<'a> {
    /// Creates an empty batch with room for `capacity` messages.
    pub fn with_capacity(pools: &'a BufferPools, capacity: usize) -> Self {
        Self {
            pools,
            messages: Vec::with_capacity(capacity),
        }
    }

    /// Appends a message backed by a buffer of `kind` and returns its empty payload.
    pub fn push(&mut self, kind: BufferKind) -> &mut Vec<u8> {
        let payload = self.pools.get(kind).acquire();
        self.messages.push(Message { kind, payload });
        let index = self.messages.len() - 1;
        &mut self.messages[index].payload
    }

    /// Returns the messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the batch has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Drop for MessageBatch<'_> {
    fn drop(&mut self) {
        for message in self.messages.drain(..) {
            self.pools.get(message.kind).release(message.payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_buffers() {
        let pool = BufferPool::new(BufferKind::Compact, 4);

        let mut buffer = pool.acquire();
        assert_eq!(buffer.capacity(), 33);
        buffer.extend_from_slice(b"payload");
        let ptr = buffer.as_ptr();
        pool.release(buffer);

        let buffer = pool.acquire();
        assert!(buffer.is_empty());
        assert_eq!(buffer.as_ptr(), ptr);
    }

    #[test]
    fn test_bounded_retention() {
        let pool = BufferPool::new(BufferKind::Full, 2);
        let buffers: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        for buffer in buffers {
            pool.release(buffer);
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_batch_releases_by_kind() {
        let pools = BufferPools::new(16);

        {
            let mut batch = MessageBatch::with_capacity(&pools, 3);
            batch.push(BufferKind::Compact).push(2);
            batch.push(BufferKind::Full).push(0x89);
            batch.push(BufferKind::Compact).push(3);
            assert_eq!(batch.len(), 3);
            assert_eq!(batch.messages()[1].payload, [0x89]);
        }

        assert_eq!(pools.get(BufferKind::Compact).idle(), 2);
        assert_eq!(pools.get(BufferKind::Full).idle(), 1);
    }

    #[test]
    fn test_batch_releases_on_unwind() {
        let pools = BufferPools::new(16);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut batch = MessageBatch::with_capacity(&pools, 1);
            batch.push(BufferKind::Full);
            panic!("encoding failed");
        }));

        assert!(result.is_err());
        assert_eq!(pools.get(BufferKind::Full).idle(), 1);
    }
}
