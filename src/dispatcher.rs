//! Mirrors a leader's playback onto the rest of the group.
//!
//! Delivery is best-effort: members whose token cannot be resolved are
//! skipped and push failures are only logged. Once the leader's state is
//! known, [`SyncDispatcher::synchronize`] succeeds.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use crate::broker::TokenBroker;
use crate::models::{PlaybackInstruction, PlaybackState, UserId};
use crate::registry::GroupRegistry;
use crate::spotify::PlaybackClient;

/// Why a synchronize request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The requester is not in any group.
    NoGroup,
    /// The requester does not lead the named group.
    NotLeader,
    /// No access token could be obtained for the leader.
    Unlinked,
    /// The leader is not playing anything.
    NoActivePlayback,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::NoGroup => write!(f, "User is not in a group"),
            SyncError::NotLeader => write!(f, "Only the group leader can synchronize"),
            SyncError::Unlinked => write!(f, "Leader account is not linked"),
            SyncError::NoActivePlayback => write!(f, "Leader has no active playback"),
        }
    }
}

impl std::error::Error for SyncError {}

/// One member's entry in a group snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberPlayback {
    pub user_id: UserId,
    pub is_leader: bool,
    pub playback: Option<PlaybackState>,
}

pub struct SyncDispatcher {
    registry: Arc<GroupRegistry>,
    broker: Arc<TokenBroker>,
    playback: Arc<dyn PlaybackClient>,
}

impl SyncDispatcher {
    pub fn new(
        registry: Arc<GroupRegistry>,
        broker: Arc<TokenBroker>,
        playback: Arc<dyn PlaybackClient>,
    ) -> Self {
        Self {
            registry,
            broker,
            playback,
        }
    }

    /// Pushes the leader's current playback to every other member of
    /// `group_name`.
    ///
    /// Preconditions are checked in order: membership, leadership, the
    /// leader's token, then the leader's playback.
    pub async fn synchronize(&self, group_name: &str, user_id: UserId) -> Result<(), SyncError> {
        let group = self
            .registry
            .get_group(user_id)
            .await
            .ok_or(SyncError::NoGroup)?;
        if group.name != group_name || !group.is_leader(user_id) {
            return Err(SyncError::NotLeader);
        }

        let token = self
            .broker
            .get_access_token(user_id)
            .await
            .map_err(|_| SyncError::Unlinked)?;

        let state = match self.playback.get_state(&token).await {
            Ok(Some(state)) => state,
            Ok(None) => return Err(SyncError::NoActivePlayback),
            Err(e) => {
                tracing::warn!("Failed to read playback for leader {}: {}", user_id, e);
                return Err(SyncError::NoActivePlayback);
            }
        };

        let instruction = PlaybackInstruction::mirror(&state);
        let followers: Vec<UserId> = group
            .members
            .iter()
            .copied()
            .filter(|member| *member != user_id)
            .collect();

        let pushed = join_all(
            followers
                .iter()
                .map(|member| self.push_to(*member, &instruction)),
        )
        .await
        .into_iter()
        .filter(|attempted| *attempted)
        .count();

        tracing::info!(
            "Synchronized '{}' to {} ({} of {} member(s) reachable)",
            group.name,
            state.track_uri,
            pushed,
            followers.len()
        );
        Ok(())
    }

    /// Every member's current playback, resolved independently.
    ///
    /// Members without a usable token or an active player show `None`.
    /// Unknown groups yield an empty list.
    pub async fn snapshot(&self, group_name: &str) -> Vec<MemberPlayback> {
        let Some(group) = self.registry.find_group(group_name).await else {
            return Vec::new();
        };
        let group = &group;

        join_all(group.members.iter().map(|&member| async move {
            MemberPlayback {
                user_id: member,
                is_leader: group.is_leader(member),
                playback: self.current_playback(member).await,
            }
        }))
        .await
    }

    /// Returns whether a push was attempted.
    async fn push_to(&self, member: UserId, instruction: &PlaybackInstruction) -> bool {
        let Ok(token) = self.broker.get_access_token(member).await else {
            tracing::debug!("Skipping member {}: no access token", member);
            return false;
        };

        match self.playback.push_state(&token, instruction).await {
            Ok(()) => tracing::debug!("Pushed playback to member {}", member),
            Err(e) => tracing::warn!("Push to member {} failed: {}", member, e),
        }
        true
    }

    async fn current_playback(&self, member: UserId) -> Option<PlaybackState> {
        let token = self.broker.get_access_token(member).await.ok()?;
        match self.playback.get_state(&token).await {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!("No playback for member {}: {}", member, e);
                None
            }
        }
    }
}
