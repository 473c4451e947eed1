//! Signaling and relay core for a real-time communication server.
//!
//! The server can be divided into three main planes: a RESTful CRUD layer
//! owning accounts, contacts, groups and message history; a websocket-based
//! permanent session per user over which chat and call-signaling frames are
//! relayed; and the WebRTC peer connections that clients establish among
//! themselves once signaling succeeds. This crate is the middle plane.
//!
//! The [`Hub`] is the process-wide coordinator: it tracks which users hold a
//! live session, which users participate in which group calls, and routes
//! every inbound envelope either to a single target, to a group's membership,
//! or to the participants of an active call. It never touches media; only
//! signaling envelopes pass through it.
//!
//! Construct a [`Hub`] with an implementation of the [`Directory`] oracle
//! (group membership and usernames live in the relational store, outside this
//! crate) and mount [`app`] to serve sessions at `/ws/{user_id}`. The
//! [`MemoryDirectory`] implementation backs the bundled dev server binary and
//! the test suite; [`MemoryStore`] backs the tests and any embedding that
//! wants chat history without a database.

#![warn(missing_docs)]

mod error;
mod serial;

mod config;
mod directory;
mod store;
mod ws;

mod hub;
pub use hub::*;

/// Struct and enum definitions of values in the signaling model.
pub mod model {
    mod envelope;
    pub use self::envelope::*;

    mod ids;
    pub use self::ids::*;
}

pub use config::{Config, DirectorySeed, GroupSeed, SignalingConfig, UserSeed};
pub use directory::{Directory, GroupInfo, MemoryDirectory};
pub use error::{Error, Result};
pub use store::{DirectMessage, GroupMessage, MemoryStore, MessageStore};
pub use ws::app;

type Object = serde_json::Map<String, serde_json::Value>;
