//! Access tokens for linked accounts.
//!
//! [`TokenBroker::get_access_token`] serves a cached token while it is valid
//! and otherwise refreshes it through the token endpoint, persisting the
//! result. At most one refresh per user is in flight: concurrent callers for
//! the same user queue on a per-user lock and reuse the refreshed token.
//!
//! Any failure (store, transport, rejected refresh) is reported as
//! [`Unlinked`]; callers only learn that the user cannot be served right now.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::db::StoreError;
use crate::models::{Credential, UserId};
use crate::spotify::TokenExchange;

/// Durable per-user credential record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`StoreError::NotFound`] for unknown users.
    async fn load(&self, user_id: UserId) -> Result<Credential, StoreError>;

    async fn save(&self, user_id: UserId, credential: &Credential) -> Result<(), StoreError>;
}

/// No usable access token can be produced for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unlinked;

impl fmt::Display for Unlinked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account is not linked")
    }
}

impl std::error::Error for Unlinked {}

/// Hands out valid access tokens, refreshing them when expired.
pub struct TokenBroker {
    credentials: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    /// One lock per user with a refresh in flight or queued.
    refresh_locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenBroker {
    pub fn new(credentials: Arc<dyn CredentialStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            credentials,
            exchange,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a currently valid access token for `user_id`.
    pub async fn get_access_token(&self, user_id: UserId) -> Result<String, Unlinked> {
        let credential = self.load(user_id).await?;
        if let Some(token) = credential.valid_access_token(Utc::now()) {
            tracing::debug!("Using cached access token for user {}", user_id);
            return Ok(token.to_string());
        }
        if !credential.is_linked() {
            return Err(Unlinked);
        }

        let lock = self.refresh_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_if_stale(user_id).await
        };
        self.release_refresh_lock(user_id, lock);
        result
    }

    async fn refresh_if_stale(&self, user_id: UserId) -> Result<String, Unlinked> {
        // Another caller may have refreshed while we waited
        let credential = self.load(user_id).await?;
        if let Some(token) = credential.valid_access_token(Utc::now()) {
            return Ok(token.to_string());
        }

        self.refresh(user_id, &credential).await
    }

    async fn refresh(&self, user_id: UserId, credential: &Credential) -> Result<String, Unlinked> {
        let refresh_token = credential.refresh_token().ok_or(Unlinked)?;

        let grant = match self.exchange.refresh(refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!("Token refresh failed for user {}: {}", user_id, e);
                return Err(Unlinked);
            }
        };

        // Keep the old refresh token unless the endpoint rotated it
        let refresh_token = grant
            .refresh_token
            .clone()
            .unwrap_or_else(|| refresh_token.to_string());
        let Some(refreshed) = Credential::issued(
            grant.access_token.clone(),
            grant.expires_in_secs,
            Some(refresh_token),
            Utc::now(),
        ) else {
            tracing::warn!(
                "Refresh for user {} returned unusable lifetime {}s",
                user_id,
                grant.expires_in_secs
            );
            return Err(Unlinked);
        };

        if let Err(e) = self.credentials.save(user_id, &refreshed).await {
            // The token is still good for this caller; the next one refreshes again.
            tracing::warn!(
                "Failed to persist refreshed token for user {}: {}",
                user_id,
                e
            );
        } else {
            tracing::info!("Refreshed access token for user {}", user_id);
        }

        Ok(grant.access_token)
    }

    async fn load(&self, user_id: UserId) -> Result<Credential, Unlinked> {
        self.credentials.load(user_id).await.map_err(|e| {
            tracing::warn!("Failed to load credential for user {}: {}", user_id, e);
            Unlinked
        })
    }

    fn refresh_lock(&self, user_id: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap();
        locks.entry(user_id).or_default().clone()
    }

    /// Drops the user's lock once no other caller holds or waits on it.
    fn release_refresh_lock(&self, user_id: UserId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().unwrap();
        drop(lock);
        if locks
            .get(&user_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(&user_id);
        }
    }

    #[cfg(test)]
    fn refresh_lock_count(&self) -> usize {
        self.refresh_locks.lock().unwrap().len()
    }
}

/// Credentials kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<UserId, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, credential: Credential) {
        self.credentials
            .write()
            .unwrap()
            .insert(user_id, credential);
    }

    pub fn get(&self, user_id: UserId) -> Option<Credential> {
        self.credentials.read().unwrap().get(&user_id).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, user_id: UserId) -> Result<Credential, StoreError> {
        self.get(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    async fn save(&self, user_id: UserId, credential: &Credential) -> Result<(), StoreError> {
        self.insert(user_id, credential.clone());
        Ok(())
    }
}
