//! OSC bundle framing for datagram transports.
//!
//! Bundle layout (16-byte header followed by length-prefixed messages):
//!
//! ```text
//! +------------+----------+--------------------------------------------+
//! | "#bundle"  | NUL      | timetag                                    |
//! | 7 bytes    | 1 byte   | 8 bytes, always 1 ("immediately")          |
//! +------------+----------+--------------------------------------------+
//! | length (4 bytes BE) | message | length | message | ...             |
//! +--------------------------------------------------------------------+
//! ```

use crate::frame::{put_length_prefixed, LENGTH_PREFIX_SIZE};
use crate::MAX_PACKET_SIZE;
use bytes::{BufMut, Bytes, BytesMut};

/// Bundle marker: "#bundle" followed by its NUL terminator.
pub const BUNDLE_MAGIC: [u8; 8] = *b"#bundle\0";

/// Timetag meaning "process immediately".
pub const IMMEDIATE_TIMETAG: u64 = 1;

/// Size of the bundle header in bytes (8 + 8 = 16).
pub const BUNDLE_HEADER_SIZE: usize = 16;

/// A bundle of OSC messages under construction.
#[derive(Debug, Clone)]
pub struct Bundle {
    buf: BytesMut,
    max_size: usize,
    messages: usize,
}

impl Bundle {
    /// Opens an empty bundle bounded by [`MAX_PACKET_SIZE`].
    pub fn open() -> Self {
        Self::with_max_size(MAX_PACKET_SIZE)
    }

    /// Opens an empty bundle bounded by `max_size` bytes.
    pub fn with_max_size(max_size: usize) -> Self {
        let mut buf = BytesMut::with_capacity(max_size);
        put_header(&mut buf);
        Self {
            buf,
            max_size,
            messages: 0,
        }
    }

    /// Appends an encoded message.
    ///
    /// If the message does not fit, the current contents are returned as a
    /// finished bundle and the message starts a fresh one. A message larger
    /// than an empty bundle can hold is still added on its own.
    pub fn append(&mut self, message: &[u8]) -> Option<Bytes> {
        if message.is_empty() {
            return None;
        }

        let flushed = if self.messages > 0
            && self.buf.len() + LENGTH_PREFIX_SIZE + message.len() > self.max_size
        {
            Some(self.take())
        } else {
            None
        };

        put_length_prefixed(&mut self.buf, message);
        self.messages += 1;
        flushed
    }

    /// Finishes the bundle.
    ///
    /// Returns `None` if no message was ever appended; an empty bundle is
    /// never emitted.
    pub fn close(self) -> Option<Bytes> {
        if self.is_empty() {
            None
        } else {
            Some(self.buf.freeze())
        }
    }

    /// Returns the number of messages in the bundle.
    pub fn message_count(&self) -> usize {
        self.messages
    }

    /// Returns the current encoded size, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns whether the bundle holds only its header.
    pub fn is_empty(&self) -> bool {
        self.messages == 0
    }

    fn take(&mut self) -> Bytes {
        let mut fresh = BytesMut::with_capacity(self.max_size);
        put_header(&mut fresh);
        self.messages = 0;
        std::mem::replace(&mut self.buf, fresh).freeze()
    }
}

impl Default for Bundle {
    fn default() -> Self {
        Self::open()
    }
}

fn put_header(buf: &mut BytesMut) {
    buf.put_slice(&BUNDLE_MAGIC);
    buf.put_u64(IMMEDIATE_TIMETAG);
}
