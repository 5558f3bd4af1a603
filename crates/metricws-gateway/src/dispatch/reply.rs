//! Response writer.
//!
//! A [`Reply`] pairs an envelope with its default target. Sending skips
//! targets that are no longer writable and hands back one [`Delivery`] per
//! queued frame.

use std::slice;

use bytes::Bytes;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use metricws_core::error::{MwsError, Result};
use metricws_core::protocol::{ResponseEnvelope, ResponseType, StreamShape, StreamWriter};

use crate::transport::{Connection, Delivery};

#[derive(Debug)]
pub struct Reply {
    env: ResponseEnvelope,
    target: Connection,
}

impl Reply {
    pub fn new(env: ResponseEnvelope, target: Connection) -> Self {
        Self { env, target }
    }

    pub fn envelope(&self) -> &ResponseEnvelope {
        &self.env
    }

    pub fn envelope_mut(&mut self) -> &mut ResponseEnvelope {
        &mut self.env
    }

    pub fn target(&self) -> &Connection {
        &self.target
    }

    pub fn set_op(&mut self, op: impl Into<String>) -> &mut Self {
        self.env.set_op(op);
        self
    }

    pub fn set_content<T: Serialize + ?Sized>(&mut self, content: &T) -> Result<&mut Self> {
        self.env.set_content(content)?;
        Ok(self)
    }

    /// Same correlation id, op and target under a new type tag, with an
    /// empty body.
    pub fn promote(&self, kind: ResponseType) -> Reply {
        Reply {
            env: self.env.clone_as(kind),
            target: self.target.clone(),
        }
    }

    /// Send to the default target.
    pub fn send(&self) -> Result<Vec<Delivery>> {
        self.send_to(slice::from_ref(&self.target))
    }

    pub fn send_to(&self, targets: &[Connection]) -> Result<Vec<Delivery>> {
        let text = frame_text(self.env.to_bytes()?)?;
        Ok(targets
            .iter()
            .filter(|t| t.is_writable())
            .filter_map(|t| t.write(Message::Text(text.clone())))
            .collect())
    }

    pub fn stream_object(self) -> Result<StreamingReply> {
        self.stream(StreamShape::Object)
    }

    pub fn stream_array(self) -> Result<StreamingReply> {
        self.stream(StreamShape::Array)
    }

    fn stream(mut self, shape: StreamShape) -> Result<StreamingReply> {
        let writer = self.env.begin_stream(shape)?;
        Ok(StreamingReply {
            writer,
            target: self.target,
        })
    }
}

/// Incrementally written payload. Nothing reaches the connection until
/// [`StreamingReply::finish`].
#[derive(Debug)]
pub struct StreamingReply {
    writer: StreamWriter,
    target: Connection,
}

impl StreamingReply {
    pub fn entry<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<&mut Self> {
        self.writer.entry(key, value)?;
        Ok(self)
    }

    pub fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        self.writer.push(value)?;
        Ok(self)
    }

    pub fn writer(&mut self) -> &mut StreamWriter {
        &mut self.writer
    }

    /// Close the structure and queue it. `None` when the target is gone.
    pub fn finish(self) -> Result<Option<Delivery>> {
        let text = frame_text(self.writer.finish())?;
        if !self.target.is_writable() {
            return Ok(None);
        }
        Ok(self.target.write(Message::Text(text)))
    }
}

fn frame_text(bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MwsError::Internal(format!("response is not utf-8: {e}")))
}
