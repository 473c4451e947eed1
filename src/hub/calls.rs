//! The call registry: which groups have a call up, and who is in it.
//!
//! Two coupled maps, always mutated together under the hub lock: the roster
//! of each active call and the modality recorded when the call was created.
//! A group is either idle (in neither map) or active with a non-empty roster;
//! the transition that empties a roster purges both maps before the lock is
//! released.

use std::collections::HashMap;

use crate::model::{GroupId, LeaveOutcome, Modality, UserId};

/// Per-group call state for the whole process.
#[derive(Debug, Default)]
pub struct CallRegistry {
    rosters: HashMap<GroupId, Vec<UserId>>,
    modalities: HashMap<GroupId, Modality>,
}

impl CallRegistry {
    /// Create an empty registry.
    pub fn new() -> CallRegistry {
        CallRegistry::default()
    }

    /// Begin a call in `group` with `user` as the initiator.
    ///
    /// If a call is already active this is a plain join and the existing
    /// modality wins; the explicit one is ignored. Returns the roster after
    /// the transition.
    pub fn start(&mut self, group: GroupId, user: UserId, modality: Modality) -> Vec<UserId> {
        if !self.rosters.contains_key(&group) {
            self.modalities.insert(group, modality);
        }
        self.join(group, user)
    }

    /// Add `user` to the call in `group`, creating the call if none is
    /// active.
    ///
    /// A call formed this way, without an observed start, defaults to audio.
    /// Joining twice is the same as joining once. Returns the roster after
    /// the transition, insertion-ordered with the initiator (or first joiner)
    /// first.
    pub fn join(&mut self, group: GroupId, user: UserId) -> Vec<UserId> {
        self.modalities.entry(group).or_insert(Modality::Audio);
        let roster = self.rosters.entry(group).or_default();
        if !roster.contains(&user) {
            roster.push(user);
        }
        roster.clone()
    }

    /// Remove `user` from the call in `group`.
    ///
    /// Removing the last participant ends the call and purges the modality in
    /// the same step.
    pub fn leave(&mut self, group: GroupId, user: UserId) -> LeaveOutcome {
        let Some(roster) = self.rosters.get_mut(&group) else {
            return LeaveOutcome::NotInCall;
        };
        let Some(position) = roster.iter().position(|&u| u == user) else {
            return LeaveOutcome::NotInCall;
        };
        roster.remove(position);
        if roster.is_empty() {
            self.rosters.remove(&group);
            self.modalities.remove(&group);
            LeaveOutcome::Ended
        } else {
            LeaveOutcome::Left
        }
    }

    /// Remove `user` from every call they participate in.
    ///
    /// Returns, per affected group in id order, the leave outcome and the
    /// roster remaining after it.
    pub fn drop_user(&mut self, user: UserId) -> Vec<(GroupId, LeaveOutcome, Vec<UserId>)> {
        let mut groups: Vec<GroupId> = self
            .rosters
            .iter()
            .filter(|(_, roster)| roster.contains(&user))
            .map(|(&group, _)| group)
            .collect();
        groups.sort();
        groups
            .into_iter()
            .map(|group| {
                let outcome = self.leave(group, user);
                (group, outcome, self.participants(group))
            })
            .collect()
    }

    /// Whether a call is active in `group`.
    pub fn is_active(&self, group: GroupId) -> bool {
        self.rosters.contains_key(&group)
    }

    /// Whether `user` participates in the call in `group`.
    pub fn is_in(&self, group: GroupId, user: UserId) -> bool {
        self.rosters
            .get(&group)
            .is_some_and(|roster| roster.contains(&user))
    }

    /// The roster of the call in `group`; empty when the group is idle.
    pub fn participants(&self, group: GroupId) -> Vec<UserId> {
        self.rosters.get(&group).cloned().unwrap_or_default()
    }

    /// The modality of the call in `group`, if one is active.
    pub fn modality(&self, group: GroupId) -> Option<Modality> {
        self.modalities.get(&group).copied()
    }

    /// A snapshot of every active call, in group id order.
    pub fn all_active(&self) -> Vec<(GroupId, Vec<UserId>)> {
        let mut calls: Vec<(GroupId, Vec<UserId>)> = self
            .rosters
            .iter()
            .map(|(&group, roster)| (group, roster.clone()))
            .collect();
        calls.sort_by_key(|&(group, _)| group);
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: GroupId = GroupId(3);

    #[test]
    fn start_creates_a_call_with_the_initiator_first() {
        let mut calls = CallRegistry::new();
        assert!(!calls.is_active(G));

        let roster = calls.start(G, UserId(1), Modality::Video);
        assert_eq!(roster, vec![UserId(1)]);
        assert!(calls.is_active(G));
        assert_eq!(calls.modality(G), Some(Modality::Video));

        calls.join(G, UserId(2));
        calls.join(G, UserId(3));
        assert_eq!(
            calls.participants(G),
            vec![UserId(1), UserId(2), UserId(3)]
        );
    }

    #[test]
    fn start_on_an_active_call_is_a_join_and_keeps_the_modality() {
        let mut calls = CallRegistry::new();
        calls.start(G, UserId(1), Modality::Video);
        let roster = calls.start(G, UserId(2), Modality::Audio);
        assert_eq!(roster, vec![UserId(1), UserId(2)]);
        assert_eq!(calls.modality(G), Some(Modality::Video));
    }

    #[test]
    fn join_without_start_defaults_to_audio() {
        let mut calls = CallRegistry::new();
        calls.join(G, UserId(2));
        assert_eq!(calls.modality(G), Some(Modality::Audio));
        assert_eq!(calls.participants(G), vec![UserId(2)]);
    }

    #[test]
    fn join_is_idempotent() {
        let mut calls = CallRegistry::new();
        calls.join(G, UserId(1));
        calls.join(G, UserId(2));
        let roster = calls.join(G, UserId(1));
        assert_eq!(roster, vec![UserId(1), UserId(2)]);
    }

    #[test]
    fn leave_distinguishes_left_ended_and_absent() {
        let mut calls = CallRegistry::new();
        calls.start(G, UserId(1), Modality::Audio);
        calls.join(G, UserId(2));

        assert_eq!(calls.leave(G, UserId(9)), LeaveOutcome::NotInCall);
        assert_eq!(calls.participants(G), vec![UserId(1), UserId(2)]);

        assert_eq!(calls.leave(G, UserId(1)), LeaveOutcome::Left);
        assert_eq!(calls.participants(G), vec![UserId(2)]);

        assert_eq!(calls.leave(G, UserId(2)), LeaveOutcome::Ended);
        assert!(!calls.is_active(G));
        assert_eq!(calls.modality(G), None);
        assert_eq!(calls.leave(G, UserId(2)), LeaveOutcome::NotInCall);
    }

    #[test]
    fn ending_a_call_purges_both_maps() {
        let mut calls = CallRegistry::new();
        calls.start(G, UserId(1), Modality::Video);
        assert_eq!(calls.leave(G, UserId(1)), LeaveOutcome::Ended);
        // idle groups are in neither map, so a later join gets a fresh default
        calls.join(G, UserId(2));
        assert_eq!(calls.modality(G), Some(Modality::Audio));
    }

    #[test]
    fn a_user_can_sit_in_several_calls() {
        let mut calls = CallRegistry::new();
        let other = GroupId(5);
        calls.start(G, UserId(1), Modality::Audio);
        calls.join(other, UserId(1));
        calls.join(other, UserId(4));
        assert!(calls.is_in(G, UserId(1)));
        assert!(calls.is_in(other, UserId(1)));
    }

    #[test]
    fn drop_user_sweeps_every_roster() {
        let mut calls = CallRegistry::new();
        let other = GroupId(5);
        calls.start(G, UserId(1), Modality::Audio);
        calls.join(G, UserId(2));
        calls.join(other, UserId(1));

        let departures = calls.drop_user(UserId(1));
        assert_eq!(
            departures,
            vec![
                (G, LeaveOutcome::Left, vec![UserId(2)]),
                (other, LeaveOutcome::Ended, vec![]),
            ]
        );
        assert!(!calls.is_active(other));
        assert_eq!(calls.participants(G), vec![UserId(2)]);

        assert!(calls.drop_user(UserId(1)).is_empty());
    }

    #[test]
    fn all_active_snapshots_every_roster() {
        let mut calls = CallRegistry::new();
        calls.start(GroupId(5), UserId(4), Modality::Audio);
        calls.start(G, UserId(1), Modality::Video);
        calls.join(G, UserId(2));

        assert_eq!(
            calls.all_active(),
            vec![
                (G, vec![UserId(1), UserId(2)]),
                (GroupId(5), vec![UserId(4)]),
            ]
        );
    }
}
