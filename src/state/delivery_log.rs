//! Delivery log buffer.
//!
//! Every successful delivery appends one `sender:recipient:text\n` record.
//! The Writer task drains the buffer to disk on a timer.

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

/// Capacity the buffer starts with and returns to after every drain.
pub const INITIAL_CAPACITY: usize = 1024;

/// Append-only record buffer.
///
/// Keeps its capacity at least twice its used length: before each append the
/// capacity doubles until the record fits below half of it.
#[derive(Debug)]
pub struct LogBuffer {
    buf: BytesMut,
    capacity: usize,
    records: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
            capacity: INITIAL_CAPACITY,
            records: 0,
        }
    }

    /// Append one delivery record.
    pub fn append(&mut self, sender: &str, recipient: &str, text: &str) {
        let record_len = sender.len() + recipient.len() + text.len() + 3;
        while self.buf.len() + record_len + 1 >= self.capacity / 2 {
            self.capacity *= 2;
        }
        if self.buf.capacity() < self.capacity {
            self.buf.reserve(self.capacity - self.buf.len());
        }

        self.buf.put_slice(sender.as_bytes());
        self.buf.put_u8(b':');
        self.buf.put_slice(recipient.as_bytes());
        self.buf.put_u8(b':');
        self.buf.put_slice(text.as_bytes());
        self.buf.put_u8(b'\n');
        self.records += 1;
    }

    /// Take everything appended so far and reset to the initial capacity.
    pub fn take(&mut self) -> Bytes {
        self.capacity = INITIAL_CAPACITY;
        self.records = 0;
        std::mem::replace(&mut self.buf, BytesMut::with_capacity(INITIAL_CAPACITY)).freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Logical capacity, always at least twice [`LogBuffer::len`].
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records appended since the last [`LogBuffer::take`].
    pub fn records(&self) -> usize {
        self.records
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Records taken out of the log by one [`DeliveryLog::drain`].
#[derive(Debug, Clone)]
pub struct Drained {
    pub bytes: Bytes,
    pub records: usize,
}

/// Shared handle over a [`LogBuffer`].
///
/// The lock is held only for the copy into or out of the buffer.
#[derive(Debug, Default)]
pub struct DeliveryLog {
    inner: Mutex<LogBuffer>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful delivery.
    pub fn record(&self, sender: &str, recipient: &str, text: &str) {
        self.inner.lock().append(sender, recipient, text);
    }

    /// Take the pending records for flushing.
    pub fn drain(&self) -> Drained {
        let mut buf = self.inner.lock();
        let records = buf.records();
        Drained {
            bytes: buf.take(),
            records,
        }
    }

    /// Bytes waiting to be flushed.
    pub fn pending(&self) -> usize {
        self.inner.lock().len()
    }
}
