//! Incremental response writer.
//!
//! Writes the response header up to and including the opening of `msg`,
//! then lets the caller append entries one at a time. `finish` closes the
//! structure and hands back the complete frame payload, so arbitrarily large
//! result sets never need to exist as a `Value` tree.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{MwsError, Result};
use crate::protocol::response::ResponseType;

const INITIAL_CAPACITY: usize = 8096;

/// Shape of the streamed `msg` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamShape {
    Object,
    Array,
}

#[derive(Debug)]
pub struct StreamWriter {
    buf: BytesMut,
    shape: StreamShape,
    header_len: usize,
    entries: usize,
}

impl StreamWriter {
    pub(crate) fn open(
        instance: u64,
        rerid: i64,
        kind: ResponseType,
        op: &str,
        shape: StreamShape,
    ) -> Result<Self> {
        let mut w = Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
            shape,
            header_len: 0,
            entries: 0,
        };
        w.buf.put_slice(format!("{{\"id\":{instance},\"rerid\":{rerid},\"t\":").as_bytes());
        w.write_json(kind.code())?;
        w.buf.put_slice(b",\"op\":");
        w.write_json(op)?;
        w.buf.put_slice(match shape {
            StreamShape::Object => b",\"msg\":{",
            StreamShape::Array => b",\"msg\":[",
        });
        w.header_len = w.buf.len();
        Ok(w)
    }

    pub fn shape(&self) -> StreamShape {
        self.shape
    }

    /// Entries written since the header.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Bytes buffered so far, header included.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append `key: value` to an object-shaped payload.
    pub fn entry<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<&mut Self> {
        if self.shape != StreamShape::Object {
            return Err(MwsError::Unsupported("entry() on an array stream".into()));
        }
        let mark = self.buf.len();
        if self.entries > 0 {
            self.buf.put_u8(b',');
        }
        let res = self.write_json(key).and_then(|_| {
            self.buf.put_u8(b':');
            self.write_json(value)
        });
        if let Err(e) = res {
            self.buf.truncate(mark);
            return Err(e);
        }
        self.entries += 1;
        Ok(self)
    }

    /// Append one element to an array-shaped payload.
    pub fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        if self.shape != StreamShape::Array {
            return Err(MwsError::Unsupported("push() on an object stream".into()));
        }
        let mark = self.buf.len();
        if self.entries > 0 {
            self.buf.put_u8(b',');
        }
        if let Err(e) = self.write_json(value) {
            self.buf.truncate(mark);
            return Err(e);
        }
        self.entries += 1;
        Ok(self)
    }

    /// Discard every entry written so far; the header stays.
    pub fn reset(&mut self) {
        self.buf.truncate(self.header_len);
        self.entries = 0;
    }

    /// Close the payload and the envelope.
    pub fn finish(mut self) -> Bytes {
        self.buf.put_slice(match self.shape {
            StreamShape::Object => b"}}",
            StreamShape::Array => b"]}",
        });
        self.buf.freeze()
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer((&mut self.buf).writer(), value)
            .map_err(|e| MwsError::Internal(format!("stream encode failed: {e}")))
    }
}
