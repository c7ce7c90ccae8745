//! Per-thread scratch memory.
//!
//! The resolver never mutates argument memory owned by the caller. When an argument needs
//! rewriting it builds a copy, and the buffers for those copies come from here. A
//! [`ScratchMemory`] lives for the whole thread, is reset at the start of every outermost call
//! and keeps its buffers between calls so steady-state interception does not allocate.

/// Default number of recycled value buffers kept per thread.
pub const DEFAULT_POOL_LIMIT: usize = 64;

/// Scratch buffers owned by one thread.
#[derive(Debug)]
pub struct ScratchMemory {
    free: Vec<Vec<crate::resolve::Value>>,
    encode: Vec<u8>,
    pool_limit: usize,
    allocations: usize,
    reused: usize,
    generation: u64,
}

impl ScratchMemory {
    /// Creates empty scratch memory that retains at most `pool_limit` free buffers.
    #[must_use]
    pub fn new(pool_limit: usize) -> Self {
        Self {
            free: Vec::new(),
            encode: Vec::new(),
            pool_limit,
            allocations: 0,
            reused: 0,
            generation: 0,
        }
    }

    /// Starts a new outermost call.
    ///
    /// Counters restart; pooled buffers and the encode buffer keep their capacity.
    pub fn reset(&mut self) {
        self.allocations = 0;
        self.reused = 0;
        self.generation = self.generation.wrapping_add(1);
        self.encode.clear();
    }

    /// Hands out an empty buffer able to hold `capacity` values.
    pub fn alloc_values(&mut self, capacity: usize) -> Vec<crate::resolve::Value> {
        self.allocations += 1;
        match self.free.pop() {
            Some(mut buffer) => {
                self.reused += 1;
                buffer.reserve(capacity);
                buffer
            }
            None => Vec::with_capacity(capacity),
        }
    }

    /// Returns a buffer to the pool. Its contents are dropped.
    pub fn recycle(&mut self, mut buffer: Vec<crate::resolve::Value>) {
        if self.free.len() < self.pool_limit && buffer.capacity() > 0 {
            buffer.clear();
            self.free.push(buffer);
        }
    }

    /// Takes the encode buffer, cleared. Give it back with [`ScratchMemory::restore_encode_buffer`].
    pub fn take_encode_buffer(&mut self) -> Vec<u8> {
        let mut buffer = std::mem::take(&mut self.encode);
        buffer.clear();
        buffer
    }

    /// Returns the encode buffer so its capacity is kept for the next record.
    pub fn restore_encode_buffer(&mut self, buffer: Vec<u8>) {
        if buffer.capacity() >= self.encode.capacity() {
            self.encode = buffer;
        }
    }

    /// Buffers handed out since the last [`ScratchMemory::reset`].
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Buffers served from the pool since the last reset.
    #[must_use]
    pub fn reused(&self) -> usize {
        self.reused
    }

    /// Number of outermost calls this scratch memory has served.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Free buffers currently pooled.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Changes the pool limit, dropping surplus buffers.
    pub fn set_pool_limit(&mut self, pool_limit: usize) {
        self.pool_limit = pool_limit;
        self.free.truncate(pool_limit);
    }
}

impl Default for ScratchMemory {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Value;

    #[test]
    fn test_alloc_counts_and_reuse() {
        let mut scratch = ScratchMemory::new(4);
        let mut buffer = scratch.alloc_values(8);
        buffer.push(Value::U32(1));
        assert_eq!(scratch.allocations(), 1);
        assert_eq!(scratch.reused(), 0);

        scratch.recycle(buffer);
        assert_eq!(scratch.pooled(), 1);

        let buffer = scratch.alloc_values(2);
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 8);
        assert_eq!(scratch.allocations(), 2);
        assert_eq!(scratch.reused(), 1);
    }

    #[test]
    fn test_reset_keeps_pool() {
        let mut scratch = ScratchMemory::new(4);
        let buffer = scratch.alloc_values(4);
        scratch.recycle(buffer);

        scratch.reset();
        assert_eq!(scratch.allocations(), 0);
        assert_eq!(scratch.generation(), 1);
        assert_eq!(scratch.pooled(), 1);
    }

    #[test]
    fn test_pool_limit() {
        let mut scratch = ScratchMemory::new(1);
        scratch.recycle(Vec::with_capacity(1));
        scratch.recycle(Vec::with_capacity(1));
        assert_eq!(scratch.pooled(), 1);

        scratch.set_pool_limit(0);
        assert_eq!(scratch.pooled(), 0);
    }

    #[test]
    fn test_encode_buffer_keeps_capacity() {
        let mut scratch = ScratchMemory::default();
        let mut buffer = scratch.take_encode_buffer();
        buffer.extend_from_slice(&[0u8; 256]);
        scratch.restore_encode_buffer(buffer);

        let buffer = scratch.take_encode_buffer();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 256);
    }
}
