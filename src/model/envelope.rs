//! Inbound signaling envelopes.
//!
//! Every frame received over a session is a JSON object with a `type`
//! discriminator and an otherwise open shape. Envelopes are parsed to a
//! generic tree and kept intact through relay, so fields this crate does not
//! know about (SDP blobs, ICE candidates, future client extensions) survive
//! the trip to the recipient unchanged.

use serde_json::Value;

use crate::serial;
use crate::{Error, Object, Result};

use super::{GroupId, UserId};

/// Frame types that belong to one-to-one call signaling.
///
/// `candidate` is special: it joins this class only when the envelope carries
/// no `groupId`, otherwise it is routed as group-call signaling.
pub const DIRECT_CALL_TYPES: [&str; 6] = [
    "call_offer",
    "call_answer",
    "candidate",
    "call_rejected",
    "call_busy",
    "call_ended",
];

/// The disjoint routing classes an envelope can fall into.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Route {
    /// One-to-one call signaling, relayed to a single target user.
    DirectCall,
    /// Group-call signaling, gated on group membership.
    GroupCall,
    /// A chat message, unicast or broadcast.
    Chat,
    /// The session-local "announce me" hint.
    Announce,
    /// Anything else; relayed best-effort to all other sessions.
    Other,
}

/// A `to`, `targetUserId` or `groupId` field that did not parse as an id.
///
/// Carries the offending value rendered for an error envelope.
#[derive(Clone, Debug)]
pub struct BadId {
    /// The rejected value, strings unquoted.
    pub raw: String,
}

/// A parsed inbound envelope.
#[derive(Clone, Debug)]
pub struct Envelope {
    raw: Object,
}

impl Envelope {
    /// Parse one text frame into an envelope.
    ///
    /// Syntax errors surface as [`Error::Json`]; valid JSON that is not an
    /// object surfaces as [`Error::Decode`].
    pub fn parse(text: &str) -> Result<Envelope> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(raw) => Ok(Envelope { raw }),
            other => Err(Error::Decode("envelope is not a JSON object", other)),
        }
    }

    /// The `type` discriminator, if the client sent one.
    pub fn kind(&self) -> Option<&str> {
        self.raw.get("type").and_then(Value::as_str)
    }

    /// Classify this envelope into its routing class.
    pub fn route(&self) -> Route {
        match self.kind() {
            Some("chat_message") => Route::Chat,
            Some("join") => Route::Announce,
            Some("candidate") => {
                if self.has_group() {
                    Route::GroupCall
                } else {
                    Route::DirectCall
                }
            }
            Some(t) if DIRECT_CALL_TYPES.contains(&t) => Route::DirectCall,
            Some(t) if t.starts_with("group-") => Route::GroupCall,
            _ => Route::Other,
        }
    }

    fn id_field(&self, key: &str) -> ::std::result::Result<Option<u64>, BadId> {
        match self.raw.get(key) {
            None | Some(&Value::Null) => Ok(None),
            Some(&Value::String(ref s)) if s.is_empty() => Ok(None),
            Some(value) => match serial::id_from_value(value) {
                Some(id) => Ok(Some(id)),
                None => Err(BadId {
                    raw: serial::value_for_display(value),
                }),
            },
        }
    }

    /// The target user named by `to` or `targetUserId`, if any.
    pub fn target(&self) -> ::std::result::Result<Option<UserId>, BadId> {
        if let Some(id) = self.id_field("to")? {
            return Ok(Some(UserId(id)));
        }
        Ok(self.id_field("targetUserId")?.map(UserId))
    }

    /// The group named by `groupId`, if any.
    pub fn group(&self) -> ::std::result::Result<Option<GroupId>, BadId> {
        Ok(self.id_field("groupId")?.map(GroupId))
    }

    /// Whether a usable `groupId` field is present (non-null, non-empty).
    pub fn has_group(&self) -> bool {
        match self.raw.get("groupId") {
            None | Some(&Value::Null) => false,
            Some(&Value::String(ref s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// The `isVideo` flag; absent or non-boolean reads as audio.
    pub fn is_video(&self) -> bool {
        self.raw
            .get("isVideo")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Read a field of the original payload.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Whether the client supplied the given field.
    pub fn has(&self, key: &str) -> bool {
        self.raw.contains_key(key)
    }

    /// Stamp a field, overwriting whatever the client sent.
    pub fn set<V: Into<Value>>(&mut self, key: &str, value: V) {
        self.raw.insert(key.to_owned(), value.into());
    }

    /// The full payload as a JSON value, ready to relay.
    pub fn as_value(&self) -> Value {
        Value::Object(self.raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        Envelope::parse(&value.to_string()).unwrap()
    }

    #[test]
    fn classifies_the_four_routes() {
        assert_eq!(
            envelope(json!({"type": "call_offer", "to": 9})).route(),
            Route::DirectCall
        );
        assert_eq!(
            envelope(json!({"type": "group-call-start", "groupId": 3})).route(),
            Route::GroupCall
        );
        assert_eq!(
            envelope(json!({"type": "chat_message"})).route(),
            Route::Chat
        );
        assert_eq!(envelope(json!({"type": "join"})).route(), Route::Announce);
        assert_eq!(
            envelope(json!({"type": "mystery-frame"})).route(),
            Route::Other
        );
        // future group frames pass through the group gate
        assert_eq!(
            envelope(json!({"type": "group-hand-raised", "groupId": 3})).route(),
            Route::GroupCall
        );
    }

    #[test]
    fn candidate_routes_by_group_presence() {
        assert_eq!(
            envelope(json!({"type": "candidate", "to": "9"})).route(),
            Route::DirectCall
        );
        assert_eq!(
            envelope(json!({"type": "candidate", "groupId": "3"})).route(),
            Route::GroupCall
        );
        // a null or empty groupId does not make it a group frame
        assert_eq!(
            envelope(json!({"type": "candidate", "groupId": null})).route(),
            Route::DirectCall
        );
        assert_eq!(
            envelope(json!({"type": "candidate", "groupId": ""})).route(),
            Route::DirectCall
        );
    }

    #[test]
    fn target_accepts_numbers_and_numeric_strings() {
        assert_eq!(
            envelope(json!({"to": 9})).target().unwrap(),
            Some(UserId(9))
        );
        assert_eq!(
            envelope(json!({"to": "9"})).target().unwrap(),
            Some(UserId(9))
        );
        assert_eq!(
            envelope(json!({"targetUserId": "12"})).target().unwrap(),
            Some(UserId(12))
        );
        // `to` wins over `targetUserId` when both are present
        assert_eq!(
            envelope(json!({"to": 1, "targetUserId": 2})).target().unwrap(),
            Some(UserId(1))
        );
        // zero is a valid id
        assert_eq!(
            envelope(json!({"to": 0})).target().unwrap(),
            Some(UserId(0))
        );
        assert_eq!(envelope(json!({})).target().unwrap(), None);
        assert_eq!(envelope(json!({"to": ""})).target().unwrap(), None);
    }

    #[test]
    fn garbage_ids_are_rejected_with_their_rendering() {
        let err = envelope(json!({"to": "abc"})).target().unwrap_err();
        assert_eq!(err.raw, "abc");
        let err = envelope(json!({"groupId": [3]})).group().unwrap_err();
        assert_eq!(err.raw, "[3]");
    }

    #[test]
    fn unknown_fields_survive_stamping() {
        let mut env = envelope(json!({"type": "call_offer", "to": 9, "sdp": "X"}));
        env.set("from", 7);
        let value = env.as_value();
        assert_eq!(value["sdp"], json!("X"));
        assert_eq!(value["from"], json!(7));
        assert_eq!(value["to"], json!(9));
    }

    #[test]
    fn non_object_payload_is_a_decode_error() {
        assert!(matches!(
            Envelope::parse("[1, 2]"),
            Err(Error::Decode(_, _))
        ));
        assert!(matches!(Envelope::parse("not json"), Err(Error::Json(_))));
    }
}
