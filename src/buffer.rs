use memchr::{memchr, memchr2};

/// How far the backing store may balloon past the initial capacity before
/// `compact` gives reserved memory back.
const SHRINK_FACTOR: usize = 8;

/// A growable byte buffer with a read cursor, used to stitch partial rows
/// across chunk boundaries.
///
/// Bytes are appended at the end and consumed from the front. The write
/// index is the length of the backing vector, so `read <= write <= capacity`
/// holds by construction. None of the operations fail; an empty buffer is
/// expressed through `None` or zero-length results.
#[derive(Clone, Debug)]
pub struct StreamBuffer {
    store: Vec<u8>,
    read_pos: usize,
    /// Capacity the store never shrinks below.
    floor: usize,
}

impl StreamBuffer {
    /// Create a buffer with the given initial capacity.
    ///
    /// The capacity also acts as a floor: compaction may release memory a
    /// long input has accumulated, but never below this.
    pub fn with_capacity(capacity: usize) -> StreamBuffer {
        StreamBuffer {
            store: Vec::with_capacity(capacity),
            read_pos: 0,
            floor: capacity,
        }
    }

    /// The number of readable (unconsumed) bytes.
    pub fn len(&self) -> usize {
        self.store.len() - self.read_pos
    }

    /// Returns true if there are no readable bytes.
    pub fn is_empty(&self) -> bool {
        self.read_pos == self.store.len()
    }

    /// The number of bytes already consumed from the front of the store.
    pub fn consumed(&self) -> usize {
        self.read_pos
    }

    /// A contiguous view of all readable bytes.
    pub fn readable(&self) -> &[u8] {
        &self.store[self.read_pos..]
    }

    /// Append `bytes` to the end of the buffer, growing the backing store
    /// as needed. Always writes everything; returns the number written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.store.extend_from_slice(bytes);
        bytes.len()
    }

    /// Return up to `count` readable bytes without advancing the cursor, or
    /// `None` if there are no readable bytes.
    pub fn peek(&self, count: usize) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        Some(&self.readable()[..count.min(self.len())])
    }

    /// Return up to `count` readable bytes and advance the cursor past
    /// them, or `None` if there are no readable bytes.
    pub fn read(&mut self, count: usize) -> Option<&[u8]> {
        let n = count.min(self.len());
        if n == 0 {
            return None;
        }
        let start = self.read_pos;
        self.read_pos += n;
        Some(&self.store[start..start + n])
    }

    /// Advance the cursor by up to `count` bytes, returning how many were
    /// actually skipped.
    pub fn skip(&mut self, count: usize) -> usize {
        let n = count.min(self.len());
        self.read_pos += n;
        n
    }

    /// Move the readable bytes to the front of the store and reset the
    /// cursor, reclaiming the space held by the consumed prefix.
    ///
    /// If the store has grown far beyond its initial capacity while holding
    /// little data, reserved memory is released back toward the floor.
    pub fn compact(&mut self) {
        if self.read_pos > 0 {
            let len = self.len();
            self.store.copy_within(self.read_pos.., 0);
            self.store.truncate(len);
            self.read_pos = 0;
        }
        if self.store.capacity() > self.floor.saturating_mul(SHRINK_FACTOR)
            && self.store.len() <= self.floor
        {
            self.store.shrink_to(self.floor);
        }
    }

    /// Find the first occurrence of `byte` in the readable region,
    /// returning its offset relative to the read cursor.
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, self.readable())
    }

    /// Find the first occurrence of either byte in the readable region.
    pub fn find_any(&self, byte1: u8, byte2: u8) -> Option<usize> {
        memchr2(byte1, byte2, self.readable())
    }

    /// Find the first occurrence of `pattern` in the readable region.
    pub fn find_pattern(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() || pattern.len() > self.len() {
            return None;
        }
        let hay = self.readable();
        let mut at = 0;
        while let Some(i) = memchr(pattern[0], &hay[at..]) {
            let start = at + i;
            if start + pattern.len() > hay.len() {
                return None;
            }
            if &hay[start..start + pattern.len()] == pattern {
                return Some(start);
            }
            at = start + 1;
        }
        None
    }
}
