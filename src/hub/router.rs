//! Inbound envelope routing.
//!
//! Every text frame a session receives lands in [`Hub::dispatch`]. The
//! envelope is parsed once, stamped with the sender's identity, classified
//! into one of the four routing classes, and relayed. Group-call frames must
//! pass the membership gate first; the call registry transitions and the
//! recipient snapshots they imply happen under one lock acquisition so the
//! notifications match the state they describe.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::model::{Envelope, GroupId, Modality, Route, UserId};
use crate::Error;

use super::{presence, Hub, Peer};

/// Build the error envelope sent back to a misbehaving sender.
pub(crate) fn error_frame(detail: &str) -> Value {
    json!({ "type": "error", "detail": detail })
}

impl<D: Directory> Hub<D> {
    /// Route one inbound text frame from `peer`.
    ///
    /// Never fails: every error path ends in at most one error envelope to
    /// the sender, and the session stays open.
    pub async fn dispatch(&self, peer: &Peer, text: &str) {
        let mut envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(Error::Json(err)) => {
                debug!("undecodable frame from user {}: {}", peer.id, err);
                self.send_to(
                    peer.id,
                    &error_frame(&format!("Malformed JSON payload: {}", err)),
                )
                .await;
                if self.relay_raw_text {
                    let frame = json!({
                        "type": "text",
                        "from_user_id": peer.id.0,
                        "content": text,
                    });
                    self.broadcast_except(&frame, Some(peer.id)).await;
                }
                return;
            }
            Err(err) => {
                self.report_dispatch_error(peer, &err).await;
                return;
            }
        };

        if !envelope.has("sender_username") {
            envelope.set("sender_username", peer.username.clone());
        }

        let target = match envelope.target() {
            Ok(target) => target,
            Err(bad) => {
                self.send_to(
                    peer.id,
                    &error_frame(&format!("Invalid target user_id: {}", bad.raw)),
                )
                .await;
                return;
            }
        };
        let group = match envelope.group() {
            Ok(group) => group,
            Err(bad) => {
                self.send_to(
                    peer.id,
                    &error_frame(&format!("Invalid groupId: {}", bad.raw)),
                )
                .await;
                return;
            }
        };

        let result = match envelope.route() {
            Route::DirectCall => self.relay_direct_call(peer, envelope, target).await,
            Route::GroupCall => {
                self.relay_group_call(peer, envelope, group, target).await
            }
            Route::Chat => {
                match target {
                    Some(target) => {
                        self.send_to(target, &envelope.as_value()).await;
                    }
                    None => self.broadcast_except(&envelope.as_value(), Some(peer.id)).await,
                }
                Ok(())
            }
            Route::Announce => {
                let username = envelope
                    .get("username")
                    .and_then(Value::as_str)
                    .unwrap_or(&peer.username)
                    .to_owned();
                self.broadcast_except(
                    &presence::user_joined_frame(peer.id, &username),
                    Some(peer.id),
                )
                .await;
                Ok(())
            }
            Route::Other => {
                // best-effort pass-through for types this hub predates
                self.broadcast_except(&envelope.as_value(), Some(peer.id)).await;
                Ok(())
            }
        };

        if let Err(err) = result {
            self.report_dispatch_error(peer, &err).await;
        }
    }

    async fn report_dispatch_error(&self, peer: &Peer, err: &Error) {
        warn!("dispatch failed for user {}: {}", peer.id, err);
        self.send_to(
            peer.id,
            &error_frame(&format!("Error processing your message: {}", err)),
        )
        .await;
    }

    /// One-to-one call signaling: stamp the sender, unicast to the target.
    async fn relay_direct_call(
        &self,
        peer: &Peer,
        mut envelope: Envelope,
        target: Option<UserId>,
    ) -> crate::Result<()> {
        envelope.set("from", peer.id.0);
        match target {
            // an absent recipient stays silent: signaling is best-effort
            Some(target) => {
                self.send_to(target, &envelope.as_value()).await;
            }
            None => {
                let kind = envelope.kind().unwrap_or_default();
                let detail = if kind == "candidate" {
                    "ICE candidate requires either 'to' field or 'groupId' field.".to_owned()
                } else {
                    format!(
                        "{} requires a 'to' or 'targetUserId' field specifying the target user ID.",
                        kind
                    )
                };
                self.send_to(peer.id, &error_frame(&detail)).await;
            }
        }
        Ok(())
    }

    /// Group-call signaling: gate on membership, stamp, then dispatch by type.
    async fn relay_group_call(
        &self,
        peer: &Peer,
        mut envelope: Envelope,
        group: Option<GroupId>,
        target: Option<UserId>,
    ) -> crate::Result<()> {
        let kind = envelope.kind().unwrap_or_default().to_owned();
        let Some(group) = group else {
            self.send_to(
                peer.id,
                &error_frame(&format!("{} requires a 'groupId' field.", kind)),
            )
            .await;
            return Ok(());
        };

        if !self.directory.is_member(group, peer.id).await? {
            self.send_to(
                peer.id,
                &error_frame(&format!("You are not a member of group {}.", group)),
            )
            .await;
            return Ok(());
        }

        envelope.set("groupId", group.0);
        envelope.set("userId", peer.id.0);
        envelope.set("sender_username", peer.username.clone());

        match kind.as_str() {
            "group-call-start" => self.start_group_call(peer, &envelope, group).await?,
            "group-call-join" => self.join_group_call(peer, &envelope, group).await?,
            "group-call-leave" => self.leave_group_call(peer, group).await?,
            "group-call-offer" | "group-call-answer" => {
                self.relay_within_call(peer, &envelope, group, target).await;
            }
            "group-call-busy" => self.relay_busy(peer, &envelope, group, target).await,
            // candidates and forward-compatible group frames go to the roster
            _ => self.send_to_call(group, &envelope.as_value(), Some(peer.id)).await,
        }
        Ok(())
    }

    /// `group-call-start`: create the call, then tell every connected group
    /// member except the initiator.
    async fn start_group_call(
        &self,
        peer: &Peer,
        envelope: &Envelope,
        group: GroupId,
    ) -> crate::Result<()> {
        let modality = Modality::from_is_video(envelope.is_video());
        {
            let mut state = self.state.lock().unwrap();
            state.calls.start(group, peer.id, modality);
        }
        debug!(
            "user {} started a {:?} call in group {}",
            peer.id, modality, group
        );

        let members = self.directory.members(group).await?;
        let frame = json!({
            "type": "group-call-start",
            "userId": peer.id.0,
            "sender_username": peer.username.as_str(),
            "groupId": group.0,
            "groupName": envelope.get("groupName").cloned().unwrap_or(Value::Null),
            "isVideo": envelope.is_video(),
            "recipients": envelope.get("recipients").cloned().unwrap_or_else(|| json!([])),
        });
        let targets = {
            self.state
                .lock()
                .unwrap()
                .connections
                .snapshot_of(&members, Some(peer.id))
        };
        self.fan_out(targets, &frame).await;
        Ok(())
    }

    /// `group-call-join`: add the joiner, then tell the rest of the group.
    ///
    /// Like the start notification this reaches every connected member, not
    /// just the current participants; members outside the call track the
    /// roster for their ongoing-call display.
    async fn join_group_call(
        &self,
        peer: &Peer,
        envelope: &Envelope,
        group: GroupId,
    ) -> crate::Result<()> {
        let roster = {
            let mut state = self.state.lock().unwrap();
            state.calls.join(group, peer.id)
        };
        debug!("user {} joined the call in group {}", peer.id, group);

        let members = self.directory.members(group).await?;
        let frame = json!({
            "type": "group-call-join",
            "userId": peer.id.0,
            "sender_username": peer.username.as_str(),
            "groupId": group.0,
            "groupName": envelope.get("groupName").cloned().unwrap_or(Value::Null),
            "isVideo": envelope.is_video(),
            "activeParticipants": roster.iter().map(|u| u.0).collect::<Vec<_>>(),
        });
        let targets = {
            self.state
                .lock()
                .unwrap()
                .connections
                .snapshot_of(&members, Some(peer.id))
        };
        self.fan_out(targets, &frame).await;
        Ok(())
    }

    /// `group-call-leave`: apply the transition, then notify per its outcome.
    async fn leave_group_call(&self, peer: &Peer, group: GroupId) -> crate::Result<()> {
        use crate::model::LeaveOutcome;

        let (outcome, remaining_targets) = {
            let mut state = self.state.lock().unwrap();
            let outcome = state.calls.leave(group, peer.id);
            let targets = match outcome {
                LeaveOutcome::Left => {
                    let remaining = state.calls.participants(group);
                    state.connections.snapshot_of(&remaining, Some(peer.id))
                }
                _ => Vec::new(),
            };
            (outcome, targets)
        };

        match outcome {
            LeaveOutcome::Ended => {
                // the whole membership hears the end, not just the empty call
                let members = self.directory.members(group).await?;
                let frame = json!({
                    "type": "group-call-ended",
                    "userId": peer.id.0,
                    "sender_username": peer.username.as_str(),
                    "groupId": group.0,
                    "reason": "Last participant left the call",
                });
                let targets = {
                    self.state
                        .lock()
                        .unwrap()
                        .connections
                        .snapshot_of(&members, None)
                };
                self.fan_out(targets, &frame).await;
            }
            LeaveOutcome::Left => {
                let frame = json!({
                    "type": "group-call-leave",
                    "userId": peer.id.0,
                    "sender_username": peer.username.as_str(),
                    "groupId": group.0,
                });
                self.fan_out(remaining_targets, &frame).await;
            }
            LeaveOutcome::NotInCall => {}
        }
        Ok(())
    }

    /// `group-call-offer` / `group-call-answer`: a sender not yet in the call
    /// joins it implicitly, then the frame goes to its target or the roster.
    async fn relay_within_call(
        &self,
        peer: &Peer,
        envelope: &Envelope,
        group: GroupId,
        target: Option<UserId>,
    ) {
        let targets = {
            let mut state = self.state.lock().unwrap();
            if !state.calls.is_in(group, peer.id) {
                state.calls.join(group, peer.id);
            }
            match target {
                Some(_) => Vec::new(),
                None => {
                    let roster = state.calls.participants(group);
                    state.connections.snapshot_of(&roster, Some(peer.id))
                }
            }
        };
        match target {
            Some(target) => {
                self.send_to(target, &envelope.as_value()).await;
            }
            None => self.fan_out(targets, &envelope.as_value()).await,
        }
    }

    /// `group-call-busy`: a decline aimed at the ringer, or at the roster.
    async fn relay_busy(
        &self,
        peer: &Peer,
        envelope: &Envelope,
        group: GroupId,
        target: Option<UserId>,
    ) {
        let reason = envelope
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("User is busy")
            .to_owned();
        match target {
            Some(target) => {
                let frame = json!({
                    "type": "group-call-busy",
                    "userId": peer.id.0,
                    "sender_username": peer.username.as_str(),
                    "groupId": group.0,
                    "to": target.0,
                    "reason": reason,
                });
                self.send_to(target, &frame).await;
            }
            None => {
                let frame = json!({
                    "type": "group-call-busy",
                    "userId": peer.id.0,
                    "sender_username": peer.username.as_str(),
                    "groupId": group.0,
                    "reason": reason,
                });
                self.send_to_call(group, &frame, Some(peer.id)).await;
            }
        }
    }
}
