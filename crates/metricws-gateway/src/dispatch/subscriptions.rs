//! Subscription table.
//!
//! Primary index `(connection, correlation id) -> subscription`, plus two
//! secondary indexes (by op, by connection) so that publishing and
//! connection cleanup do not scan the whole table.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::Serialize;

use metricws_core::error::{MwsError, Result};
use metricws_core::protocol::{ResponseEnvelope, ResponseType};

use super::Reply;
use crate::transport::{Connection, ConnectionId};

type SubKey = (ConnectionId, i64);

#[derive(Debug, Clone)]
pub struct Subscription {
    rerid: i64,
    op: String,
    conn: Connection,
}

impl Subscription {
    pub fn rerid(&self) -> i64 {
        self.rerid
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[derive(Default)]
pub struct SubscriptionTable {
    subs: DashMap<SubKey, Subscription>,
    by_op: DashMap<String, DashSet<SubKey>>,
    by_conn: DashMap<ConnectionId, DashSet<i64>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. A second one with the same correlation id on
    /// the same connection is a `Duplicate` error and leaves the first intact.
    pub fn subscribe(&self, conn: &Connection, rerid: i64, op: &str) -> Result<()> {
        let key = (conn.id(), rerid);
        match self.subs.entry(key) {
            Entry::Occupied(_) => {
                return Err(MwsError::Duplicate(format!(
                    "subscription {rerid} already active on this connection"
                )))
            }
            Entry::Vacant(v) => {
                v.insert(Subscription {
                    rerid,
                    op: op.to_string(),
                    conn: conn.clone(),
                });
            }
        }

        self.by_op
            .entry(op.to_string())
            .or_insert_with(DashSet::new)
            .insert(key);
        self.by_conn
            .entry(conn.id())
            .or_insert_with(DashSet::new)
            .insert(rerid);
        Ok(())
    }

    pub fn unsubscribe(&self, conn_id: ConnectionId, rerid: i64) -> Option<Subscription> {
        let (key, sub) = self.subs.remove(&(conn_id, rerid))?;
        self.unindex_op(&sub.op, &key);
        if let Some(set) = self.by_conn.get(&conn_id) {
            set.remove(&rerid);
            if set.is_empty() {
                drop(set);
                self.by_conn.remove_if(&conn_id, |_, s| s.is_empty());
            }
        }
        Some(sub)
    }

    /// Drop every subscription held by `conn_id`. Returns how many.
    pub fn purge(&self, conn_id: ConnectionId) -> usize {
        let Some((_, rerids)) = self.by_conn.remove(&conn_id) else {
            return 0;
        };
        let mut n = 0;
        for rerid in rerids.iter() {
            let key = (conn_id, *rerid);
            if let Some((_, sub)) = self.subs.remove(&key) {
                self.unindex_op(&sub.op, &key);
                n += 1;
            }
        }
        n
    }

    pub fn subscribers(&self, op: &str) -> Vec<Subscription> {
        let Some(keys) = self.by_op.get(op) else {
            return Vec::new();
        };
        let keys: Vec<SubKey> = keys.iter().map(|k| *k.key()).collect();
        keys.iter()
            .filter_map(|k| self.subs.get(k).map(|s| s.value().clone()))
            .collect()
    }

    pub fn is_subscribed(&self, conn_id: ConnectionId, rerid: i64) -> bool {
        self.subs.contains_key(&(conn_id, rerid))
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Push a `sub` event to every subscriber of `op`. Subscribers whose
    /// connection is no longer writable are skipped. Returns how many
    /// events were queued.
    pub fn publish<T: Serialize + ?Sized>(&self, op: &str, content: &T) -> Result<usize> {
        let content = serde_json::to_value(content)
            .map_err(|e| MwsError::Internal(format!("{op} event encode failed: {e}")))?;
        let mut queued = 0;
        for sub in self.subscribers(op) {
            let mut env = ResponseEnvelope::new(sub.rerid, ResponseType::Event).with_op(op);
            env.set_content(&content)?;
            queued += Reply::new(env, sub.conn).send()?.len();
        }
        Ok(queued)
    }

    fn unindex_op(&self, op: &str, key: &SubKey) {
        if let Some(set) = self.by_op.get(op) {
            set.remove(key);
            if set.is_empty() {
                drop(set);
                self.by_op.remove_if(op, |_, s| s.is_empty());
            }
        }
    }
}
