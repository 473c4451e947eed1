//! Identifier newtypes and small state enums shared across the hub.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$attr:meta] $name:ident;)*) => {
        $(
            #[$attr]
            ///
            /// Identifiers accept both JSON numbers and numeric strings on the
            /// wire, and always serialize back as numbers. They can be
            /// debug-printed using the `{:?}` specifier, or their raw number
            /// value printed using the `{}` specifier.
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug, Ord, PartialOrd)]
            #[derive(Serialize, Deserialize)]
            pub struct $name(#[serde(deserialize_with = "crate::serial::deserialize_id")] pub u64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    }
}

id_type! {
    /// An identifier for a user
    UserId;
    /// An identifier for a group
    GroupId;
}

/// The media modality of a group call, recorded when the call is created and
/// immutable for the call's lifetime.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub enum Modality {
    /// An audio-only call.
    Audio,
    /// A call with video.
    Video,
}

impl Modality {
    /// Map the wire-level `isVideo` flag onto a modality.
    pub fn from_is_video(is_video: bool) -> Modality {
        if is_video {
            Modality::Video
        } else {
            Modality::Audio
        }
    }

    /// The wire-level `isVideo` flag for this modality.
    pub fn is_video(self) -> bool {
        self == Modality::Video
    }
}

/// Result of a leave transition on a group call.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LeaveOutcome {
    /// The user left the call and other participants remain.
    Left,
    /// The user was the last participant, so the call ended.
    Ended,
    /// The user was not a participant; nothing changed.
    NotInCall,
}

/// Result of a unicast attempt through the connection registry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SendOutcome {
    /// The frame was handed to the recipient's session.
    Delivered,
    /// No session is registered for the recipient.
    Absent,
    /// The recipient's session is dead; it has been disconnected.
    Failed,
}
