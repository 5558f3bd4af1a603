//! Connection handle shared between the session loop, the dispatch router
//! and out-of-band publishers.
//!
//! Writes are queued on a bounded mpsc channel drained by the session's
//! writer task, so frames for one connection leave in enqueue order.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_tungstenite::tungstenite::Message;

pub type ConnectionId = u64;

/// One queued frame plus an optional flush acknowledgement.
#[derive(Debug)]
pub struct Outbound {
    pub msg: Message,
    pub done: Option<oneshot::Sender<bool>>,
}

/// Completion handle for one queued write.
#[derive(Debug)]
pub struct Delivery {
    conn_id: ConnectionId,
    rx: oneshot::Receiver<bool>,
}

impl Delivery {
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Resolves to `true` once the frame was written to the socket, `false`
    /// if the connection went away first.
    pub async fn flushed(self) -> bool {
        self.rx.await.unwrap_or(false)
    }
}

struct Inner {
    id: ConnectionId,
    peer: SocketAddr,
    tx: mpsc::Sender<Outbound>,
    closed: AtomicBool,
    close_notify: Notify,
    options: DashMap<String, Value>,
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("writable", &self.is_writable())
            .finish()
    }
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn open(id: ConnectionId, peer: SocketAddr, queue: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let conn = Self {
            inner: Arc::new(Inner {
                id,
                peer,
                tx,
                closed: AtomicBool::new(false),
                close_notify: Notify::new(),
                options: DashMap::new(),
            }),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.inner.peer
    }

    pub fn is_writable(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire) && !self.inner.tx.is_closed()
    }

    /// Queue a frame. Returns `None` when the connection is not writable or
    /// its outbound queue is full; the frame is dropped in both cases.
    pub fn write(&self, msg: Message) -> Option<Delivery> {
        if !self.is_writable() {
            return None;
        }
        let (done, rx) = oneshot::channel();
        match self.inner.tx.try_send(Outbound { msg, done: Some(done) }) {
            Ok(()) => Some(Delivery { conn_id: self.inner.id, rx }),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn_id = self.inner.id, "outbound queue full, frame dropped");
                None
            }
            Err(TrySendError::Closed(_)) => None,
        }
    }

    /// Mark the connection closed. The writer flushes what is already queued
    /// and then sends a close frame. Idempotent.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.close_notify.notify_waiters();
        }
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        loop {
            let notified = self.inner.close_notify.notified();
            if self.inner.closed.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    pub fn set_option(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.options.insert(key.into(), value)
    }

    pub fn option(&self, key: &str) -> Option<Value> {
        self.inner.options.get(key).map(|v| v.value().clone())
    }

    pub fn remove_option(&self, key: &str) -> Option<Value> {
        self.inner.options.remove(key).map(|(_, v)| v)
    }

    pub fn clear_options(&self) {
        self.inner.options.clear();
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

/// Live WebSocket connections by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    conns: DashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn insert(&self, conn: Connection) {
        self.conns.insert(conn.id(), conn);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.conns.remove(&id).map(|(_, c)| c)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.conns.get(&id).map(|c| c.value().clone())
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Close every registered connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let mut n = 0;
        for c in self.conns.iter() {
            c.value().close();
            n += 1;
        }
        n
    }
}
