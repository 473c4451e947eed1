//! TOML-backed configuration for the server binary.
//!
//! The hub core consumes no process environment; everything tunable lives in
//! one file. The directory seed exists so the dev server can run standalone
//! against the in-memory oracle; a production embedding wires a real
//! [`Directory`](crate::Directory) instead and ignores it.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::Deserialize;

use crate::directory::MemoryDirectory;
use crate::model::{GroupId, UserId};
use crate::Result;

/// Top-level configuration for the server binary.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the server listens on.
    pub listen: SocketAddr,
    /// Signaling behavior knobs.
    pub signaling: SignalingConfig,
    /// Users and groups seeded into the in-memory directory.
    pub directory: DirectorySeed,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
            signaling: SignalingConfig::default(),
            directory: DirectorySeed::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(toml_str: &str) -> Result<Config> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let text = fs::read_to_string(path)?;
        Config::from_toml_str(&text)
    }
}

/// Behavior knobs for the signaling hub.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalingConfig {
    /// Relay undecodable frames to the other sessions as `text` envelopes,
    /// in addition to the error reply the sender always gets.
    pub relay_raw_text: bool,
}

impl Default for SignalingConfig {
    fn default() -> SignalingConfig {
        SignalingConfig {
            relay_raw_text: true,
        }
    }
}

/// Users and groups to preload into a [`MemoryDirectory`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectorySeed {
    /// Known users and their display names.
    pub users: Vec<UserSeed>,
    /// Groups and their member lists.
    pub groups: Vec<GroupSeed>,
}

impl DirectorySeed {
    /// Apply this seed to a directory.
    pub fn apply(&self, directory: &MemoryDirectory) {
        for user in &self.users {
            directory.add_user(UserId(user.id), &user.username);
        }
        for group in &self.groups {
            let members: Vec<UserId> = group.members.iter().map(|&id| UserId(id)).collect();
            directory.add_group(GroupId(group.id), &group.name, &members);
        }
    }
}

/// One seeded user.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSeed {
    /// The user's id.
    pub id: u64,
    /// The user's display name.
    pub username: String,
}

/// One seeded group.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSeed {
    /// The group's id.
    pub id: u64,
    /// The group's display name.
    pub name: String,
    /// The members' user ids.
    pub members: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_8000_and_relay_raw_text() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.listen.port(), 8000);
        assert!(config.signaling.relay_raw_text);
        assert!(config.directory.users.is_empty());
    }

    #[test]
    fn parses_a_full_file() {
        let config = Config::from_toml_str(
            r#"
            listen = "127.0.0.1:9100"

            [signaling]
            relay_raw_text = false

            [[directory.users]]
            id = 1
            username = "alice"

            [[directory.groups]]
            id = 3
            name = "weekend crew"
            members = [1, 2, 3]
            "#,
        )
        .unwrap();

        assert_eq!(config.listen.port(), 9100);
        assert!(!config.signaling.relay_raw_text);
        assert_eq!(config.directory.users.len(), 1);
        assert_eq!(config.directory.groups[0].members, vec![1, 2, 3]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::from_toml_str("lisen = \"0.0.0.0:1\"").is_err());
        assert!(Config::from_toml_str("[signaling]\nrelay = true").is_err());
    }

    #[test]
    fn seed_applies_to_a_directory() {
        let config = Config::from_toml_str(
            r#"
            [[directory.users]]
            id = 7
            username = "u7"

            [[directory.groups]]
            id = 3
            name = "g"
            members = [7]
            "#,
        )
        .unwrap();
        let directory = MemoryDirectory::new();
        config.directory.apply(&directory);

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            use crate::directory::Directory;
            assert!(directory
                .is_member(GroupId(3), UserId(7))
                .await
                .unwrap());
            assert_eq!(
                directory.username(UserId(7)).await.unwrap(),
                Some("u7".to_owned())
            );
        });
    }
}
