//! Live session handles and the connection registry.
//!
//! A session's send half is owned by a writer task; everything the hub wants
//! delivered is queued onto that task through an unbounded channel. Queueing
//! never suspends, so recipient handles can be collected and written to
//! without holding the hub lock across I/O. A queue whose writer task has
//! gone away marks the session as dead.

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use tokio::sync::mpsc;

use crate::model::UserId;

/// Close code sent when the URL path does not name an integer user id.
pub const CLOSE_INVALID_ID: u16 = 4001;
/// Close code sent to a session replaced by a newer one for the same user.
pub const CLOSE_SUPERSEDED: u16 = 4002;

/// A handle to one user's live session.
///
/// Handles are cheap to clone; all clones feed the same writer task. The
/// username recorded at connect time rides along so cascade notifications can
/// be decorated without going back to the directory.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    outbound: mpsc::UnboundedSender<Message>,
    username: String,
}

impl SessionHandle {
    /// Wrap an outbound queue as a session handle.
    pub fn new(outbound: mpsc::UnboundedSender<Message>, username: impl Into<String>) -> Self {
        SessionHandle {
            outbound,
            username: username.into(),
        }
    }

    /// The display name recorded when the session connected.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Queue one text frame. Returns false when the session is dead.
    pub(crate) fn send_text(&self, text: &str) -> bool {
        self.outbound
            .send(Message::Text(Utf8Bytes::from(text.to_owned())))
            .is_ok()
    }

    /// Queue a close frame with an application close code.
    pub(crate) fn close(&self, code: u16, reason: &'static str) {
        let _ = self.outbound.send(Message::Close(Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        })));
    }

    /// Whether two handles refer to the same underlying session.
    pub(crate) fn same_session(&self, other: &SessionHandle) -> bool {
        self.outbound.same_channel(&other.outbound)
    }
}

/// The map of live sessions, one per user.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    sessions: HashMap<UserId, SessionHandle>,
}

impl ConnectionRegistry {
    /// Install a session, returning the one it replaces, if any.
    pub fn insert(&mut self, user: UserId, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.insert(user, handle)
    }

    /// Remove a user's session unconditionally.
    pub fn remove(&mut self, user: UserId) -> Option<SessionHandle> {
        self.sessions.remove(&user)
    }

    /// Remove a user's session only if it is the given one.
    ///
    /// Keeps a stale session loop from tearing down the fresh session that
    /// superseded it.
    pub fn remove_if(&mut self, user: UserId, handle: &SessionHandle) -> Option<SessionHandle> {
        if self
            .sessions
            .get(&user)
            .is_some_and(|current| current.same_session(handle))
        {
            self.sessions.remove(&user)
        } else {
            None
        }
    }

    /// The session registered for `user`, if any.
    pub fn get(&self, user: UserId) -> Option<&SessionHandle> {
        self.sessions.get(&user)
    }

    /// Whether `user` has a live session.
    pub fn contains(&self, user: UserId) -> bool {
        self.sessions.contains_key(&user)
    }

    /// How many sessions are live.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Handles for every session, skipping `except` when one is provided.
    pub fn snapshot_except(&self, except: Option<UserId>) -> Vec<(UserId, SessionHandle)> {
        self.sessions
            .iter()
            .filter(|&(&user, _)| except != Some(user))
            .map(|(&user, handle)| (user, handle.clone()))
            .collect()
    }

    /// Handles for the listed users that are connected, skipping `except`.
    ///
    /// Order follows the input list, so per-roster notification order is
    /// stable.
    pub fn snapshot_of(
        &self,
        users: &[UserId],
        except: Option<UserId>,
    ) -> Vec<(UserId, SessionHandle)> {
        users
            .iter()
            .filter(|&&user| except != Some(user))
            .filter_map(|&user| self.sessions.get(&user).map(|h| (user, h.clone())))
            .collect()
    }

    /// Drain every session from the registry.
    pub fn drain_all(&mut self) -> Vec<(UserId, SessionHandle)> {
        self.sessions.drain().collect()
    }
}
