//! Presence announcements and the ongoing-call notification.

use serde_json::{json, Value};
use tracing::error;

use crate::directory::Directory;
use crate::model::UserId;

use super::Hub;

/// The frame announcing a user to the other sessions.
pub(crate) fn user_joined_frame(user: UserId, username: &str) -> Value {
    json!({ "type": "user_joined", "user_id": user.0, "username": username })
}

/// The frame announcing a departed user to the remaining sessions.
pub(crate) fn user_left_frame(user: UserId, username: &str) -> Value {
    json!({ "type": "user_left", "user_id": user.0, "username": username })
}

impl<D: Directory> Hub<D> {
    /// Tell a freshly connected user about calls already in progress in
    /// their groups.
    ///
    /// Runs after [`Hub::connect`] and before the session's receive loop, so
    /// the `ongoing-group-calls` frame is the first thing the client sees.
    /// Sends nothing when no relevant call is active. Oracle failures are
    /// logged and swallowed; a missed notification must not cost the session.
    pub async fn notify_ongoing_calls(&self, user: UserId) {
        let groups = match self.directory.groups_of(user).await {
            Ok(groups) => groups,
            Err(err) => {
                error!("group lookup for user {} failed: {}", user, err);
                return;
            }
        };

        let mut calls = Vec::new();
        {
            let state = self.state.lock().unwrap();
            for info in &groups {
                let roster = state.calls.participants(info.id);
                if roster.is_empty() {
                    continue;
                }
                let Some(modality) = state.calls.modality(info.id) else {
                    continue;
                };
                calls.push(json!({
                    "groupId": info.id.0,
                    "groupName": info.name.as_str(),
                    "participants": roster.iter().map(|u| u.0).collect::<Vec<_>>(),
                    "participantCount": roster.len(),
                    "isVideo": modality.is_video(),
                }));
            }
        }

        if calls.is_empty() {
            return;
        }
        self.send_to(user, &json!({ "type": "ongoing-group-calls", "calls": calls }))
            .await;
    }
}
