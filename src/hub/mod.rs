//! The signaling hub.
//!
//! One [`Hub`] exists per process. It owns the connection registry and the
//! call registry behind a single mutex, so a cascade (connection removal plus
//! per-group leaves) is one critical section and no task can observe a user
//! gone from the connection registry but still sitting in a call roster.
//!
//! Nothing is ever sent while the lock is held: every delivery first snapshots
//! the recipient handles and the frame under the lock, releases it, then
//! queues the writes. A queue that rejects a write marks that recipient dead;
//! the disconnect it earns is deferred onto a work list and processed after
//! the current delivery finishes, which keeps send-failure → disconnect →
//! leave-broadcast chains iterative instead of reentrant.

mod calls;
mod presence;
mod router;
mod sessions;

pub use calls::CallRegistry;
pub use sessions::{SessionHandle, CLOSE_INVALID_ID, CLOSE_SUPERSEDED};

use std::sync::Mutex;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::config::SignalingConfig;
use crate::directory::Directory;
use crate::model::{GroupId, LeaveOutcome, SendOutcome, UserId};

use sessions::ConnectionRegistry;

/// Close code for sessions torn down by process shutdown ("going away").
const CLOSE_GOING_AWAY: u16 = 1001;

/// The identity of a connected peer, as the router sees it.
#[derive(Clone, Debug)]
pub struct Peer {
    /// The peer's user id, parsed from the session URL.
    pub id: UserId,
    /// The display name resolved when the session connected.
    pub username: String,
}

#[derive(Debug, Default)]
struct HubState {
    connections: ConnectionRegistry,
    calls: CallRegistry,
}

/// The process-wide signaling coordinator.
///
/// Constructed once at startup with the membership oracle and passed
/// explicitly to every session; there is no hidden global.
pub struct Hub<D> {
    state: Mutex<HubState>,
    directory: D,
    relay_raw_text: bool,
}

impl<D: Directory> Hub<D> {
    /// Create a hub over the given membership oracle.
    pub fn new(directory: D, signaling: SignalingConfig) -> Hub<D> {
        Hub {
            state: Mutex::new(HubState::default()),
            directory,
            relay_raw_text: signaling.relay_raw_text,
        }
    }

    /// The membership oracle this hub consults.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Register a session for `user`, superseding any prior one.
    ///
    /// The prior session is closed with [`CLOSE_SUPERSEDED`] and fully
    /// cascaded (call leaves, derived notifications, `user_left`) before the
    /// new session is installed. Callers run the presence notifier after
    /// this returns.
    pub async fn connect(&self, user: UserId, handle: SessionHandle) {
        let prior = { self.state.lock().unwrap().connections.get(user).cloned() };
        if let Some(prior) = prior {
            warn!("user {} reconnected; superseding the previous session", user);
            prior.close(CLOSE_SUPERSEDED, "superseded by a newer session");
            self.run_disconnects(vec![(user, Some(prior))]).await;
        }

        let live = {
            let mut state = self.state.lock().unwrap();
            state.connections.insert(user, handle);
            state.connections.len()
        };
        debug!("user {} connected ({} live sessions)", user, live);
    }

    /// Disconnect `user`, whatever session they hold. Idempotent.
    pub async fn disconnect(&self, user: UserId) {
        self.run_disconnects(vec![(user, None)]).await;
    }

    /// Disconnect `user` only if `handle` is still their registered session.
    ///
    /// Session loops use this on termination so a loop outliving its
    /// superseded session cannot tear down the replacement.
    pub async fn disconnect_session(&self, user: UserId, handle: &SessionHandle) {
        self.run_disconnects(vec![(user, Some(handle.clone()))])
            .await;
    }

    /// Whether `user` currently holds a live session.
    pub fn is_connected(&self, user: UserId) -> bool {
        self.state.lock().unwrap().connections.contains(user)
    }

    /// Unicast one frame to `user`.
    ///
    /// A dead session is disconnected (with its full cascade) before this
    /// returns [`SendOutcome::Failed`].
    pub async fn send_to(&self, user: UserId, frame: &Value) -> SendOutcome {
        let handle = { self.state.lock().unwrap().connections.get(user).cloned() };
        let Some(handle) = handle else {
            debug!("user {} not connected; dropping unicast", user);
            return SendOutcome::Absent;
        };
        if handle.send_text(&frame.to_string()) {
            SendOutcome::Delivered
        } else {
            warn!("send to user {} failed; disconnecting", user);
            self.run_disconnects(vec![(user, Some(handle))]).await;
            SendOutcome::Failed
        }
    }

    /// Best-effort broadcast to every session.
    ///
    /// The sender is skipped iff `except` is provided and equal; user id 0 is
    /// a valid id and excludes like any other. A dead recipient is
    /// disconnected without aborting the rest of the broadcast.
    pub async fn broadcast_except(&self, frame: &Value, except: Option<UserId>) {
        let targets = {
            self.state
                .lock()
                .unwrap()
                .connections
                .snapshot_except(except)
        };
        self.fan_out(targets, frame).await;
    }

    /// Close every session and clear both registries.
    pub async fn shutdown(&self) {
        let (sessions, calls) = {
            let mut state = self.state.lock().unwrap();
            let sessions = state.connections.drain_all();
            let calls = state.calls.all_active().len();
            state.calls = CallRegistry::new();
            (sessions, calls)
        };
        debug!(
            "shutting down: closing {} sessions, ending {} calls",
            sessions.len(),
            calls
        );
        for (_, handle) in sessions {
            handle.close(CLOSE_GOING_AWAY, "server shutting down");
        }
    }

    /// Broadcast one frame to the participants of the call in `group`.
    pub(crate) async fn send_to_call(
        &self,
        group: GroupId,
        frame: &Value,
        except: Option<UserId>,
    ) {
        let targets = {
            let state = self.state.lock().unwrap();
            let roster = state.calls.participants(group);
            state.connections.snapshot_of(&roster, except)
        };
        self.fan_out(targets, frame).await;
    }

    /// Resolve a display name, falling back to the `user_{id}` form.
    pub(crate) async fn display_name(&self, user: UserId) -> String {
        match self.directory.username(user).await {
            Ok(Some(name)) => name,
            Ok(None) => format!("user_{}", user),
            Err(err) => {
                error!("username lookup for user {} failed: {}", user, err);
                format!("user_{}", user)
            }
        }
    }

    /// Snapshot connected handles for the listed users.
    fn snapshot_of(&self, users: &[UserId], except: Option<UserId>) -> Vec<(UserId, SessionHandle)> {
        self.state
            .lock()
            .unwrap()
            .connections
            .snapshot_of(users, except)
    }

    /// Queue `frame` onto every target, collecting dead sessions.
    fn deliver(
        &self,
        targets: &[(UserId, SessionHandle)],
        frame: &Value,
        dead: &mut Vec<(UserId, SessionHandle)>,
    ) {
        let text = frame.to_string();
        for (user, handle) in targets {
            if !handle.send_text(&text) {
                warn!("send to user {} failed; scheduling disconnect", user);
                dead.push((*user, handle.clone()));
            }
        }
    }

    /// Deliver to a snapshot and process any disconnects it earned.
    pub(crate) async fn fan_out(&self, targets: Vec<(UserId, SessionHandle)>, frame: &Value) {
        let mut dead = Vec::new();
        self.deliver(&targets, frame, &mut dead);
        if !dead.is_empty() {
            self.run_disconnects(dead.into_iter().map(|(u, h)| (u, Some(h))).collect())
                .await;
        }
    }

    /// Drain a disconnect work list, including victims found along the way.
    ///
    /// Each cascade removes one connected user, so the list shrinks toward
    /// empty instead of recursing.
    async fn run_disconnects(&self, mut queue: Vec<(UserId, Option<SessionHandle>)>) {
        while let Some((user, only)) = queue.pop() {
            let more = self.teardown(user, only.as_ref()).await;
            queue.extend(more.into_iter().map(|(u, h)| (u, Some(h))));
        }
    }

    /// One disconnect cascade.
    ///
    /// Removes the user from the connection registry and every call roster in
    /// a single critical section, then emits the derived notifications:
    /// `group-call-ended` to the whole membership when a roster emptied,
    /// `group-call-leave` to the remaining participants otherwise, and
    /// finally `user_left` to everyone still connected. Returns sessions
    /// found dead while notifying.
    async fn teardown(
        &self,
        user: UserId,
        only: Option<&SessionHandle>,
    ) -> Vec<(UserId, SessionHandle)> {
        let (removed, departures) = {
            let mut state = self.state.lock().unwrap();
            let removed = match only {
                Some(handle) => state.connections.remove_if(user, handle),
                None => state.connections.remove(user),
            };
            if only.is_some() && removed.is_none() {
                // a stale session ended; the user's live session stays intact
                return Vec::new();
            }
            let departures = state.calls.drop_user(user);
            (removed, departures)
        };
        if removed.is_none() && departures.is_empty() {
            return Vec::new();
        }

        let username = match removed.as_ref() {
            Some(handle) => handle.username().to_owned(),
            None => self.display_name(user).await,
        };

        let mut dead = Vec::new();
        for (group, outcome, remaining) in departures {
            match outcome {
                LeaveOutcome::Ended => {
                    let frame = json!({
                        "type": "group-call-ended",
                        "groupId": group.0,
                        "reason": format!("{} disconnected, ending the call.", username),
                    });
                    match self.directory.members(group).await {
                        Ok(members) => {
                            let targets = self.snapshot_of(&members, None);
                            self.deliver(&targets, &frame, &mut dead);
                        }
                        Err(err) => error!(
                            "membership lookup for group {} failed during cascade: {}",
                            group, err
                        ),
                    }
                }
                LeaveOutcome::Left => {
                    let frame = json!({
                        "type": "group-call-leave",
                        "userId": user.0,
                        "sender_username": username.as_str(),
                        "groupId": group.0,
                    });
                    let targets = self.snapshot_of(&remaining, None);
                    self.deliver(&targets, &frame, &mut dead);
                }
                LeaveOutcome::NotInCall => {}
            }
        }

        if removed.is_some() {
            let frame = presence::user_left_frame(user, &username);
            let targets = {
                self.state
                    .lock()
                    .unwrap()
                    .connections
                    .snapshot_except(None)
            };
            self.deliver(&targets, &frame, &mut dead);
            debug!("user {} disconnected", user);
        }
        dead
    }
}
