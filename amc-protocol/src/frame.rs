//! Length-prefixed framing for stream transports.
//!
//! OSC over a byte stream has no message boundaries of its own, so each
//! message is preceded by its length:
//!
//! ```text
//! +-------------+----------------------+
//! | length      | OSC message          |
//! | 4 bytes BE  | length bytes         |
//! +-------------+----------------------+
//! ```

use bytes::{BufMut, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Returns `message` preceded by its 4-byte big-endian length.
pub fn length_prefixed(message: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + message.len());
    put_length_prefixed(&mut buf, message);
    buf
}

/// Appends `message` preceded by its 4-byte big-endian length to `buf`.
pub fn put_length_prefixed(buf: &mut BytesMut, message: &[u8]) {
    buf.put_u32(message.len() as u32);
    buf.put_slice(message);
}
