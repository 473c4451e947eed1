//! The persistence sink for chat history.
//!
//! Chat and group-chat messages are persisted by the CRUD plane and relayed
//! independently by the hub; the hub itself never writes here, and the dev
//! server binary, which serves no REST surface, wires no store at all. The
//! trait exists so the two planes agree on one interface; [`MemoryStore`]
//! backs the tests and embeddings that want history without a database.

use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{GroupId, UserId};
use crate::Result;

/// A persisted one-to-one chat message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Who sent the message.
    pub sender: UserId,
    /// Who it was addressed to.
    pub recipient: UserId,
    /// The message body.
    pub content: String,
    /// When the store accepted the message.
    pub sent_at: DateTime<Utc>,
}

/// A persisted group chat message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupMessage {
    /// The group the message was posted in.
    pub group: GroupId,
    /// Who sent the message.
    pub sender: UserId,
    /// The sender's display name at send time.
    pub sender_username: String,
    /// The message body.
    pub content: String,
    /// When the store accepted the message.
    pub sent_at: DateTime<Utc>,
}

/// Append-and-read access to chat history.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a one-to-one message.
    fn append_direct(&self, message: DirectMessage) -> impl Future<Output = Result<()>> + Send;

    /// Persist a group message.
    fn append_group(&self, message: GroupMessage) -> impl Future<Output = Result<()>> + Send;

    /// The conversation between two users, oldest first.
    fn direct_history(
        &self,
        user: UserId,
        other: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DirectMessage>>> + Send;

    /// A group's backlog, oldest first.
    fn group_history(
        &self,
        group: GroupId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<GroupMessage>>> + Send;
}

#[derive(Debug, Default)]
struct StoreInner {
    direct: Vec<DirectMessage>,
    group: Vec<GroupMessage>,
}

/// An in-memory [`MessageStore`] for the dev server and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl MessageStore for MemoryStore {
    async fn append_direct(&self, message: DirectMessage) -> Result<()> {
        self.inner.lock().unwrap().direct.push(message);
        Ok(())
    }

    async fn append_group(&self, message: GroupMessage) -> Result<()> {
        self.inner.lock().unwrap().group.push(message);
        Ok(())
    }

    async fn direct_history(
        &self,
        user: UserId,
        other: UserId,
        limit: usize,
    ) -> Result<Vec<DirectMessage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .direct
            .iter()
            .filter(|m| {
                (m.sender == user && m.recipient == other)
                    || (m.sender == other && m.recipient == user)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn group_history(&self, group: GroupId, limit: usize) -> Result<Vec<GroupMessage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .group
            .iter()
            .filter(|m| m.group == group)
            .take(limit)
            .cloned()
            .collect())
    }
}
