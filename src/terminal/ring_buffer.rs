//! Bounded output buffer for session replay.
//!
//! Keeps the most recent `capacity` bytes of PTY output so callers can ask
//! for "the last N lines" without the host storing unbounded history.
//! Truncation happens on a byte boundary: the oldest retained line may be a
//! partial line, and a UTF-8 sequence cut in half renders as U+FFFD.

/// Default capacity for a session buffer (50 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 50 * 1024;

/// A fixed-capacity circular byte buffer.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
    /// Next write position (wraps around).
    write_pos: usize,
    /// Total bytes ever appended.
    total_written: u64,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl RingBuffer {
    /// Create a ring buffer holding at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            capacity,
            write_pos: 0,
            total_written: 0,
        }
    }

    /// Append a chunk, dropping the oldest bytes once capacity is exceeded.
    pub fn append(&mut self, data: &[u8]) {
        if self.capacity == 0 || data.is_empty() {
            return;
        }

        // Only the trailing `capacity` bytes of an oversized chunk can survive.
        let skip = data.len().saturating_sub(self.capacity);
        let data = &data[skip..];
        self.total_written += skip as u64;

        let first = data.len().min(self.capacity - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&data[first..]);
        }

        self.write_pos = (self.write_pos + data.len()) % self.capacity;
        self.total_written += data.len() as u64;
    }

    /// Retained bytes in chronological order.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        let len = self.len();
        let mut out = Vec::with_capacity(len);

        if self.total_written <= self.capacity as u64 {
            out.extend_from_slice(&self.buf[..len]);
        } else {
            // Wrapped: oldest byte sits at write_pos.
            out.extend_from_slice(&self.buf[self.write_pos..]);
            out.extend_from_slice(&self.buf[..self.write_pos]);
        }

        out
    }

    /// Whole buffer as text.
    #[must_use]
    pub fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    /// The last `lines` newline-delimited lines of the buffer.
    ///
    /// A trailing newline yields an empty final line, so `tail(1)` on
    /// `"a\nb\n"` is `""`.
    #[must_use]
    pub fn tail(&self, lines: usize) -> String {
        let text = self.snapshot();
        let all: Vec<&str> = text.split('\n').collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }

    /// Number of bytes currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.total_written).map_or(self.capacity, |n| n.min(self.capacity))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total bytes ever appended, including dropped ones.
    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}
