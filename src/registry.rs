//! Listening group membership and leader succession.
//!
//! The registry keeps an explicit index: a group table (`name -> Group`) and
//! a membership map (`user -> group name`). Both are updated together inside
//! one critical section per transition:
//!
//! ```text
//! lock -> copy index -> mutate copy -> persist changes -> swap in copy -> unlock
//! ```
//!
//! If persisting fails the copy is dropped, so the in-memory index never gets
//! ahead of storage.

use async_trait::async_trait;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use crate::db::StoreError;
use crate::models::{Group, GroupSummary, UserId};

/// One persisted effect of a registry transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    /// Create the group or update its leader and members.
    Upsert(Group),
    /// Delete the group.
    Remove(String),
    /// Point a user's group reference at a group, or clear it.
    Assign {
        user_id: UserId,
        group_name: Option<String>,
    },
    /// Delete the user's account. Always the last change of its transition.
    DeleteUser(UserId),
}

/// Durable storage for groups and memberships.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// All existing groups with their members.
    async fn load_all(&self) -> Result<Vec<Group>, StoreError>;

    /// Applies the changes of one transition atomically, in order.
    async fn apply(&self, changes: &[GroupChange]) -> Result<(), StoreError>;
}

/// Picks the next leader when the current one leaves.
///
/// Implementations must return one of `candidates`, which is never empty.
pub trait LeaderSelector: Send + Sync {
    fn choose(&self, candidates: &[UserId]) -> UserId;
}

/// Uniformly random succession: no remaining member is privileged.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomLeader;

impl LeaderSelector for RandomLeader {
    fn choose(&self, candidates: &[UserId]) -> UserId {
        let index = rand::rng().random_range(0..candidates.len());
        candidates[index]
    }
}

/// Errors from registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// The user does not belong to any group.
    NotInGroup,
    /// The transition could not be persisted; nothing changed.
    Storage(StoreError),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotInGroup => write!(f, "User is not in a group"),
            RegistryError::Storage(e) => write!(f, "Failed to persist group change: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Storage(e) => Some(e),
            RegistryError::NotInGroup => None,
        }
    }
}

/// Group table plus its reverse membership map.
#[derive(Debug, Clone, Default)]
struct RegistryIndex {
    groups: HashMap<String, Group>,
    membership: HashMap<UserId, String>,
}

impl RegistryIndex {
    /// Rebuilds the index from stored groups, repairing anything that breaks
    /// the membership invariants.
    fn from_groups(mut stored: Vec<Group>) -> Self {
        stored.sort_by(|a, b| a.name.cmp(&b.name));

        let mut index = Self::default();
        for mut group in stored {
            group.members.retain(|member| {
                if let Some(other) = index.membership.get(member) {
                    tracing::warn!(
                        "User {} is stored in both '{}' and '{}', keeping '{}'",
                        member,
                        other,
                        group.name,
                        other
                    );
                    false
                } else {
                    true
                }
            });

            let Some(&lowest) = group.members.iter().next() else {
                tracing::warn!("Dropping stored group '{}' with no members", group.name);
                continue;
            };

            if !group.members.contains(&group.leader_id) {
                tracing::warn!(
                    "Leader {} of '{}' is not a member, promoting {}",
                    group.leader_id,
                    group.name,
                    lowest
                );
                group.leader_id = lowest;
            }

            for member in &group.members {
                index.membership.insert(*member, group.name.clone());
            }
            index.groups.insert(group.name.clone(), group);
        }

        index
    }

    /// Removes `user_id` from its group. Returns the group as it was before.
    fn leave(
        &mut self,
        user_id: UserId,
        selector: &dyn LeaderSelector,
        changes: &mut Vec<GroupChange>,
    ) -> Option<GroupSummary> {
        let name = self.membership.remove(&user_id)?;
        changes.push(GroupChange::Assign {
            user_id,
            group_name: None,
        });

        let Some(group) = self.groups.get_mut(&name) else {
            debug_assert!(false, "membership points at missing group '{}'", name);
            return None;
        };

        let before = group.summary();
        group.members.remove(&user_id);

        if group.members.is_empty() {
            self.groups.remove(&name);
            changes.push(GroupChange::Remove(name));
            return Some(before);
        }

        if group.leader_id == user_id {
            let candidates: Vec<UserId> = group.members.iter().copied().collect();
            let chosen = selector.choose(&candidates);
            group.leader_id = if group.members.contains(&chosen) {
                chosen
            } else {
                tracing::warn!("Leader selector returned non-member {}", chosen);
                candidates[0]
            };
            tracing::info!(
                "Leader {} left '{}', {} is the new leader",
                user_id,
                name,
                group.leader_id
            );
        }

        changes.push(GroupChange::Upsert(group.clone()));
        Some(before)
    }

    /// Adds `user_id` to `name`, leaving any current group first.
    fn join(
        &mut self,
        user_id: UserId,
        name: &str,
        selector: &dyn LeaderSelector,
        changes: &mut Vec<GroupChange>,
    ) -> GroupSummary {
        // Rejoining the current group still goes through a full leave.
        self.leave(user_id, selector, changes);

        let group = self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| Group::founded_by(name, user_id));
        group.members.insert(user_id);
        let summary = group.summary();

        changes.push(GroupChange::Upsert(group.clone()));
        changes.push(GroupChange::Assign {
            user_id,
            group_name: Some(name.to_string()),
        });
        self.membership.insert(user_id, name.to_string());

        summary
    }

    fn is_consistent(&self) -> bool {
        let groups_ok = self.groups.iter().all(|(name, group)| {
            *name == group.name
                && group.is_consistent()
                && group
                    .members
                    .iter()
                    .all(|m| self.membership.get(m) == Some(name))
        });
        let membership_ok = self.membership.iter().all(|(user, name)| {
            self.groups
                .get(name)
                .is_some_and(|group| group.contains(*user))
        });
        groups_ok && membership_ok
    }
}

/// Owns all groups and serializes every membership transition.
pub struct GroupRegistry {
    index: Mutex<RegistryIndex>,
    store: Arc<dyn GroupStore>,
    selector: Arc<dyn LeaderSelector>,
}

impl GroupRegistry {
    /// An empty registry.
    pub fn new(store: Arc<dyn GroupStore>, selector: Arc<dyn LeaderSelector>) -> Self {
        Self {
            index: Mutex::new(RegistryIndex::default()),
            store,
            selector,
        }
    }

    /// Builds the registry from whatever `store` currently holds.
    pub async fn load(
        store: Arc<dyn GroupStore>,
        selector: Arc<dyn LeaderSelector>,
    ) -> Result<Self, StoreError> {
        let groups = store.load_all().await?;
        let index = RegistryIndex::from_groups(groups);
        tracing::info!("Loaded {} group(s)", index.groups.len());

        Ok(Self {
            index: Mutex::new(index),
            store,
            selector,
        })
    }

    /// Puts `user_id` into `group_name`, creating the group with the user as
    /// leader if it does not exist. Any previous membership is left first.
    pub async fn join(
        &self,
        user_id: UserId,
        group_name: &str,
    ) -> Result<GroupSummary, RegistryError> {
        let mut index = self.index.lock().await;
        let mut work = index.clone();
        let mut changes = Vec::new();

        let summary = work.join(user_id, group_name, self.selector.as_ref(), &mut changes);
        self.commit(&mut index, work, &changes)
            .await
            .map_err(RegistryError::Storage)?;

        tracing::info!(
            "User {} joined '{}' ({} member(s))",
            user_id,
            summary.name,
            summary.member_count
        );
        Ok(summary)
    }

    /// Removes `user_id` from its group.
    ///
    /// Returns the group as it was just before the user left. An emptied
    /// group is destroyed; a departing leader is succeeded by a member chosen
    /// through the registry's [`LeaderSelector`].
    pub async fn leave(&self, user_id: UserId) -> Result<GroupSummary, RegistryError> {
        let mut index = self.index.lock().await;
        let mut work = index.clone();
        let mut changes = Vec::new();

        let summary = work
            .leave(user_id, self.selector.as_ref(), &mut changes)
            .ok_or(RegistryError::NotInGroup)?;
        self.commit(&mut index, work, &changes)
            .await
            .map_err(RegistryError::Storage)?;

        tracing::info!("User {} left '{}'", user_id, summary.name);
        Ok(summary)
    }

    /// Deletes the account of `user_id`, leaving its group first.
    ///
    /// Leaving and deleting commit as one transition, so a concurrent
    /// [`join`](Self::join) either lands before (and is undone by the leave)
    /// or after (and fails because the account is gone). Returns the group
    /// the user was in, if any.
    pub async fn remove_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<GroupSummary>, StoreError> {
        let mut index = self.index.lock().await;
        let mut work = index.clone();
        let mut changes = Vec::new();

        let left = work.leave(user_id, self.selector.as_ref(), &mut changes);
        changes.push(GroupChange::DeleteUser(user_id));

        self.commit(&mut index, work, &changes).await?;
        Ok(left)
    }

    /// Members of `group_name`; empty when the group does not exist.
    pub async fn get_members(&self, group_name: &str) -> BTreeSet<UserId> {
        let index = self.index.lock().await;
        index
            .groups
            .get(group_name)
            .map(|group| group.members.clone())
            .unwrap_or_default()
    }

    /// The group called `group_name`, if it exists.
    pub async fn find_group(&self, group_name: &str) -> Option<Group> {
        let index = self.index.lock().await;
        index.groups.get(group_name).cloned()
    }

    /// The group `user_id` belongs to, if any.
    pub async fn get_group(&self, user_id: UserId) -> Option<Group> {
        let index = self.index.lock().await;
        let name = index.membership.get(&user_id)?;
        index.groups.get(name).cloned()
    }

    /// Summaries of all groups, sorted by name.
    pub async fn list_groups(&self) -> Vec<GroupSummary> {
        let index = self.index.lock().await;
        let mut summaries: Vec<GroupSummary> =
            index.groups.values().map(Group::summary).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    async fn commit(
        &self,
        index: &mut RegistryIndex,
        work: RegistryIndex,
        changes: &[GroupChange],
    ) -> Result<(), StoreError> {
        debug_assert!(work.is_consistent(), "registry invariants broken");

        self.store.apply(changes).await?;
        *index = work;
        Ok(())
    }

    #[cfg(test)]
    async fn is_consistent(&self) -> bool {
        self.index.lock().await.is_consistent()
    }
}

/// Group storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    groups: StdMutex<HashMap<String, Group>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: Vec<Group>) -> Self {
        let groups = groups.into_iter().map(|g| (g.name.clone(), g)).collect();
        Self {
            groups: StdMutex::new(groups),
        }
    }

    /// A copy of a stored group.
    pub fn group(&self, name: &str) -> Option<Group> {
        self.groups.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn load_all(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.groups.lock().unwrap().values().cloned().collect())
    }

    async fn apply(&self, changes: &[GroupChange]) -> Result<(), StoreError> {
        let mut groups = self.groups.lock().unwrap();
        for change in changes {
            match change {
                GroupChange::Upsert(group) => {
                    groups.insert(group.name.clone(), group.clone());
                }
                GroupChange::Remove(name) => {
                    groups.remove(name);
                }
                // Membership is carried by the upserted member sets; no user table here
                GroupChange::Assign { .. } | GroupChange::DeleteUser(_) => {}
            }
        }
        Ok(())
    }
}
