//! OSC message encoding.
//!
//! Message layout (every section padded with NUL bytes to a 4-byte boundary):
//!
//! ```text
//! +-----------------+---------------------+--------------------------------+
//! | address         | ',' + type tags     | argument payloads              |
//! | NUL-terminated  | NUL-terminated      | big-endian, each 4-byte aligned|
//! +-----------------+---------------------+--------------------------------+
//! ```

use crate::error::ProtocolError;
use crate::ALIGNMENT;
use bytes::{BufMut, Bytes, BytesMut};

/// A typed OSC argument.
///
/// The last four variants are part of the OSC type set but are not
/// implemented by this encoder; encoding them fails with
/// [`ProtocolError::UnsupportedType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// `i`: 32-bit signed integer.
    Int32(i32),
    /// `h`: 64-bit signed integer.
    Int64(i64),
    /// `f`: 32-bit float.
    Float32(f32),
    /// `d`: 64-bit float.
    Float64(f64),
    /// `s`: string.
    String(String),
    /// `c`: single ASCII character.
    Char(u8),
    /// `T`
    True,
    /// `F`
    False,
    /// `N`
    Nil,
    /// `I`
    Infinitum,
    /// `b` (unsupported)
    Blob(Bytes),
    /// `t` (unsupported)
    TimeTag(u64),
    /// `r` (unsupported)
    Rgba(u32),
    /// `m` (unsupported)
    Midi([u8; 4]),
}

impl Argument {
    /// Returns the OSC type tag character.
    pub fn tag(&self) -> char {
        match self {
            Argument::Int32(_) => 'i',
            Argument::Int64(_) => 'h',
            Argument::Float32(_) => 'f',
            Argument::Float64(_) => 'd',
            Argument::String(_) => 's',
            Argument::Char(_) => 'c',
            Argument::True => 'T',
            Argument::False => 'F',
            Argument::Nil => 'N',
            Argument::Infinitum => 'I',
            Argument::Blob(_) => 'b',
            Argument::TimeTag(_) => 't',
            Argument::Rgba(_) => 'r',
            Argument::Midi(_) => 'm',
        }
    }

    /// Returns whether values of `tag` carry a payload.
    ///
    /// `T`, `F`, `N` and `I` are zero-width markers.
    pub fn takes_value(tag: char) -> bool {
        !matches!(tag, 'T' | 'F' | 'N' | 'I')
    }

    /// Builds an argument from a type tag and its textual value.
    ///
    /// Zero-width tags ignore `text`. Tags outside the implemented set,
    /// including the reserved `b`, `t`, `r` and `m`, are rejected.
    pub fn parse(tag: char, text: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidArgument {
            tag,
            value: text.to_string(),
        };

        let arg = match tag {
            'i' => Argument::Int32(text.parse().map_err(|_| invalid())?),
            'h' => Argument::Int64(text.parse().map_err(|_| invalid())?),
            'f' => Argument::Float32(text.parse().map_err(|_| invalid())?),
            'd' => Argument::Float64(text.parse().map_err(|_| invalid())?),
            's' => Argument::String(text.to_string()),
            'c' => match text.as_bytes() {
                [c] if c.is_ascii() => Argument::Char(*c),
                _ => return Err(invalid()),
            },
            'T' => Argument::True,
            'F' => Argument::False,
            'N' => Argument::Nil,
            'I' => Argument::Infinitum,
            other => return Err(ProtocolError::UnsupportedType(other)),
        };
        Ok(arg)
    }

    fn payload_size(&self) -> Result<usize, ProtocolError> {
        match self {
            Argument::Int32(_) | Argument::Float32(_) => Ok(4),
            Argument::Char(c) if c.is_ascii() => Ok(4),
            Argument::Char(c) => Err(ProtocolError::InvalidArgument {
                tag: 'c',
                value: format!("{:#04x}", c),
            }),
            Argument::Int64(_) | Argument::Float64(_) => Ok(8),
            Argument::String(s) => padded_str_len(s),
            Argument::True | Argument::False | Argument::Nil | Argument::Infinitum => Ok(0),
            unsupported => Err(ProtocolError::UnsupportedType(unsupported.tag())),
        }
    }

    fn put_payload(&self, buf: &mut BytesMut) {
        match self {
            Argument::Int32(v) => buf.put_i32(*v),
            Argument::Int64(v) => buf.put_i64(*v),
            Argument::Float32(v) => buf.put_f32(*v),
            Argument::Float64(v) => buf.put_f64(*v),
            Argument::String(s) => put_padded_str(buf, s.as_bytes()),
            Argument::Char(c) => buf.put_slice(&[*c, 0, 0, 0]),
            _ => {}
        }
    }
}

impl From<i32> for Argument {
    fn from(v: i32) -> Self {
        Argument::Int32(v)
    }
}

impl From<i64> for Argument {
    fn from(v: i64) -> Self {
        Argument::Int64(v)
    }
}

impl From<f32> for Argument {
    fn from(v: f32) -> Self {
        Argument::Float32(v)
    }
}

impl From<f64> for Argument {
    fn from(v: f64) -> Self {
        Argument::Float64(v)
    }
}

impl From<bool> for Argument {
    fn from(v: bool) -> Self {
        if v {
            Argument::True
        } else {
            Argument::False
        }
    }
}

impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Argument::String(v.to_string())
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Argument::String(v)
    }
}

/// An OSC message under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    address: String,
    args: Vec<Argument>,
}

impl Message {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<Argument>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn push(&mut self, arg: impl Into<Argument>) {
        self.args.push(arg.into());
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    /// Returns the type tag string, including the leading `,`.
    pub fn type_tags(&self) -> String {
        type_tags(&self.args)
    }

    /// Encodes the message into wire format.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        encode(&self.address, &self.args)
    }
}

/// Computes the encoded length of a message without encoding it.
///
/// Performs the same validation as [`encode`].
pub fn encoded_size(address: &str, args: &[Argument]) -> Result<usize, ProtocolError> {
    if !address.starts_with('/') {
        return Err(ProtocolError::InvalidAddress(address.to_string()));
    }

    let mut size = padded_str_len(address)?;
    // ',' plus one tag per argument
    size += padded_len(1 + args.len());
    for arg in args {
        size += arg.payload_size()?;
    }
    Ok(size)
}

/// Encodes `address` and `args` into an OSC message.
pub fn encode(address: &str, args: &[Argument]) -> Result<Bytes, ProtocolError> {
    let size = encoded_size(address, args)?;
    let mut buf = BytesMut::with_capacity(size);

    put_padded_str(&mut buf, address.as_bytes());
    put_padded_str(&mut buf, type_tags(args).as_bytes());
    for arg in args {
        arg.put_payload(&mut buf);
    }

    debug_assert_eq!(buf.len(), size);
    assert_eq!(buf.len() % ALIGNMENT, 0, "OSC message is not 4-byte aligned");

    Ok(buf.freeze())
}

fn type_tags(args: &[Argument]) -> String {
    let mut tags = String::with_capacity(1 + args.len());
    tags.push(',');
    tags.extend(args.iter().map(Argument::tag));
    tags
}

/// Length of a NUL-terminated string rounded up to the alignment.
///
/// A string whose length is already aligned still gets a full word of NULs
/// so that it stays terminated.
fn padded_len(len: usize) -> usize {
    (len / ALIGNMENT + 1) * ALIGNMENT
}

fn padded_str_len(s: &str) -> Result<usize, ProtocolError> {
    if s.as_bytes().contains(&0) {
        return Err(ProtocolError::EmbeddedNul);
    }
    Ok(padded_len(s.len()))
}

fn put_padded_str(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_slice(bytes);
    buf.put_bytes(0, padded_len(bytes.len()) - bytes.len());
}
