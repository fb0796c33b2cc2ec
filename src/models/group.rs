use serde::Serialize;
use std::collections::BTreeSet;

use super::user::UserId;

/// A listening group.
///
/// The name is the group's identity. While a group exists its member set is
/// non-empty and contains the leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub leader_id: UserId,
    pub members: BTreeSet<UserId>,
}

impl Group {
    /// A new group whose only member is its leader.
    pub fn founded_by(name: impl Into<String>, leader_id: UserId) -> Self {
        Self {
            name: name.into(),
            leader_id,
            members: BTreeSet::from([leader_id]),
        }
    }

    pub fn is_leader(&self, user_id: UserId) -> bool {
        self.leader_id == user_id
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    /// True when the group satisfies its membership invariants.
    pub fn is_consistent(&self) -> bool {
        !self.members.is_empty() && self.members.contains(&self.leader_id)
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            name: self.name.clone(),
            member_count: self.members.len(),
        }
    }
}

/// Public view of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub name: String,
    #[serde(rename = "user_count")]
    pub member_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_founded_by() {
        let group = Group::founded_by("Jazz", UserId(1));

        assert_eq!(group.name, "Jazz");
        assert!(group.is_leader(UserId(1)));
        assert!(group.contains(UserId(1)));
        assert!(group.is_consistent());
        assert_eq!(group.summary().member_count, 1);
    }

    #[test]
    fn test_inconsistent_when_leader_missing() {
        let mut group = Group::founded_by("Jazz", UserId(1));
        group.members.insert(UserId(2));
        group.members.remove(&UserId(1));

        assert!(!group.is_consistent());
    }

    #[test]
    fn test_summary_json() {
        let summary = Group::founded_by("Jazz", UserId(1)).summary();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["name"], "Jazz");
        assert_eq!(json["user_count"], 1);
    }
}
