//! The membership oracle.
//!
//! Group membership, group names and usernames live in the relational store,
//! which belongs to the CRUD plane of the server. The hub consumes that store
//! read-only through the [`Directory`] trait: one implementation per backing
//! store, with [`MemoryDirectory`] covering the dev server and the tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::model::{GroupId, UserId};
use crate::Result;

/// A group's identity as the oracle reports it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupInfo {
    /// The group's identifier.
    pub id: GroupId,
    /// The group's display name.
    pub name: String,
}

/// Read-only queries about group membership and user display names.
///
/// Implementations must answer without mutating anything; the hub may issue
/// these queries concurrently from many sessions. Oracle failures surface as
/// errors and cost the offending envelope, never the session.
pub trait Directory: Send + Sync + 'static {
    /// Whether `user` is a member of `group`.
    fn is_member(&self, group: GroupId, user: UserId) -> impl Future<Output = Result<bool>> + Send;

    /// All members of `group`, including ones not currently connected.
    fn members(&self, group: GroupId) -> impl Future<Output = Result<Vec<UserId>>> + Send;

    /// Every group `user` belongs to, with display names.
    fn groups_of(&self, user: UserId) -> impl Future<Output = Result<Vec<GroupInfo>>> + Send;

    /// The display name of `user`, if the store knows them.
    fn username(&self, user: UserId) -> impl Future<Output = Result<Option<String>>> + Send;
}

#[derive(Debug, Default)]
struct DirectoryInner {
    usernames: HashMap<UserId, String>,
    groups: HashMap<GroupId, GroupRecord>,
}

#[derive(Debug)]
struct GroupRecord {
    name: String,
    members: Vec<UserId>,
}

/// An in-memory [`Directory`] for the dev server and tests.
///
/// Clones share the same underlying tables, so a test can keep a handle and
/// reshape the directory while the hub is running.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> MemoryDirectory {
        MemoryDirectory::default()
    }

    /// Register a user with a display name.
    pub fn add_user(&self, user: UserId, username: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.usernames.insert(user, username.to_owned());
    }

    /// Register a group with its member list.
    pub fn add_group(&self, group: GroupId, name: &str, members: &[UserId]) {
        let mut inner = self.inner.write().unwrap();
        inner.groups.insert(
            group,
            GroupRecord {
                name: name.to_owned(),
                members: members.to_vec(),
            },
        );
    }
}

impl Directory for MemoryDirectory {
    async fn is_member(&self, group: GroupId, user: UserId) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .groups
            .get(&group)
            .is_some_and(|record| record.members.contains(&user)))
    }

    async fn members(&self, group: GroupId) -> Result<Vec<UserId>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .groups
            .get(&group)
            .map(|record| record.members.clone())
            .unwrap_or_default())
    }

    async fn groups_of(&self, user: UserId) -> Result<Vec<GroupInfo>> {
        let inner = self.inner.read().unwrap();
        let mut groups: Vec<GroupInfo> = inner
            .groups
            .iter()
            .filter(|(_, record)| record.members.contains(&user))
            .map(|(&id, record)| GroupInfo {
                id,
                name: record.name.clone(),
            })
            .collect();
        groups.sort_by_key(|info| info.id);
        Ok(groups)
    }

    async fn username(&self, user: UserId) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.usernames.get(&user).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn membership_and_names() {
        let directory = MemoryDirectory::new();
        directory.add_user(UserId(1), "alice");
        directory.add_group(GroupId(3), "weekend crew", &[UserId(1), UserId(2)]);

        assert!(directory.is_member(GroupId(3), UserId(1)).await.unwrap());
        assert!(!directory.is_member(GroupId(3), UserId(9)).await.unwrap());
        assert!(!directory.is_member(GroupId(8), UserId(1)).await.unwrap());

        assert_eq!(
            directory.members(GroupId(3)).await.unwrap(),
            vec![UserId(1), UserId(2)]
        );
        assert_eq!(directory.members(GroupId(8)).await.unwrap(), vec![]);

        assert_eq!(
            directory.username(UserId(1)).await.unwrap(),
            Some("alice".to_owned())
        );
        assert_eq!(directory.username(UserId(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn groups_of_lists_memberships_in_id_order() {
        let directory = MemoryDirectory::new();
        directory.add_group(GroupId(7), "late", &[UserId(1)]);
        directory.add_group(GroupId(3), "early", &[UserId(1), UserId(2)]);
        directory.add_group(GroupId(5), "other", &[UserId(2)]);

        let groups = directory.groups_of(UserId(1)).await.unwrap();
        assert_eq!(
            groups,
            vec![
                GroupInfo {
                    id: GroupId(3),
                    name: "early".to_owned()
                },
                GroupInfo {
                    id: GroupId(7),
                    name: "late".to_owned()
                },
            ]
        );
    }
}
