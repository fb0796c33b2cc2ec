//! Account linking through the authorization-code flow.
//!
//! A user asks for an authorize URL carrying a signed, single-use `state`.
//! The provider redirects back with `code` and that `state`; completing the
//! link verifies the state, exchanges the code and stores the credential.
//!
//! State format: `{nonce}.{signature}` where the signature is
//! base64url(HMAC-SHA256(secret, "{nonce}:{user_id}")).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::broker::CredentialStore;
use crate::db::StoreError;
use crate::models::{Credential, UserId};
use crate::spotify::{SpotifyError, TokenExchange};

type HmacSha256 = Hmac<Sha256>;

/// A pending link attempt.
#[derive(Debug, Clone)]
struct PendingLink {
    user_id: UserId,
    expires_at: Instant,
}

/// Outstanding state nonces, each valid once until it expires.
#[derive(Debug)]
pub struct LinkStateStore {
    pending: RwLock<HashMap<String, PendingLink>>,
    default_expiry: Duration,
}

impl LinkStateStore {
    pub fn new(expiry_minutes: u64) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            default_expiry: Duration::from_secs(expiry_minutes * 60),
        }
    }

    /// Remembers a fresh nonce for `user_id`.
    pub fn issue(&self, user_id: UserId) -> String {
        self.issue_with_expiry(user_id, self.default_expiry)
    }

    pub fn issue_with_expiry(&self, user_id: UserId, expiry: Duration) -> String {
        let nonce = generate_nonce();
        let pending = PendingLink {
            user_id,
            expires_at: Instant::now() + expiry,
        };

        let mut states = self.pending.write().unwrap();
        states.insert(nonce.clone(), pending);

        nonce
    }

    /// Removes the nonce and returns its user if it had not expired.
    pub fn consume(&self, nonce: &str) -> Option<UserId> {
        let mut states = self.pending.write().unwrap();
        let pending = states.remove(nonce)?;

        if Instant::now() > pending.expires_at {
            return None;
        }

        Some(pending.user_id)
    }

    /// Returns the number of expired nonces removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut states = self.pending.write().unwrap();
        let now = Instant::now();

        let before = states.len();
        states.retain(|_, pending| pending.expires_at > now);
        before - states.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.read().unwrap().len()
    }
}

impl Default for LinkStateStore {
    fn default() -> Self {
        Self::new(10)
    }
}

/// 32 random bytes, base64url without padding.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Provider endpoints and client settings used to build authorize URLs.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub accounts_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub expiry_minutes: u64,
}

/// Errors completing a link.
#[derive(Debug)]
pub enum LinkError {
    /// The state is malformed, forged, expired or already used.
    InvalidState,
    /// The code could not be exchanged for tokens.
    Exchange(SpotifyError),
    /// The credential could not be saved.
    Storage(StoreError),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::InvalidState => write!(f, "Invalid or expired link state"),
            LinkError::Exchange(e) => write!(f, "Code exchange failed: {}", e),
            LinkError::Storage(e) => write!(f, "Failed to store credential: {}", e),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::InvalidState => None,
            LinkError::Exchange(e) => Some(e),
            LinkError::Storage(e) => Some(e),
        }
    }
}

/// Drives the authorization-code flow for users.
pub struct AccountLinker {
    key: HmacSha256,
    settings: LinkSettings,
    states: LinkStateStore,
    exchange: Arc<dyn TokenExchange>,
    credentials: Arc<dyn CredentialStore>,
}

impl AccountLinker {
    pub fn new(
        secret: &[u8],
        settings: LinkSettings,
        exchange: Arc<dyn TokenExchange>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let key = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
        let states = LinkStateStore::new(settings.expiry_minutes);
        Self {
            key,
            settings,
            states,
            exchange,
            credentials,
        }
    }

    /// URL the user opens to grant access.
    pub fn authorize_url(&self, user_id: UserId) -> String {
        let state = self.state_for(user_id);
        format!(
            "{}/authorize?response_type=code&client_id={}&scope={}&redirect_uri={}&state={}&show_dialog=true",
            self.settings.accounts_url.trim_end_matches('/'),
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.scopes.join(" ")),
            urlencoding::encode(&self.settings.redirect_uri),
            urlencoding::encode(&state),
        )
    }

    /// Finishes a link started by [`authorize_url`](Self::authorize_url).
    pub async fn complete(&self, code: &str, state: &str) -> Result<UserId, LinkError> {
        let user_id = self.verify_state(state)?;

        let grant = self
            .exchange
            .exchange_code(code, &self.settings.redirect_uri)
            .await
            .map_err(|e| {
                tracing::warn!("Code exchange failed for user {}: {}", user_id, e);
                LinkError::Exchange(e)
            })?;

        let expires_in = grant.expires_in_secs;
        let credential = Credential::issued(
            grant.access_token,
            expires_in,
            grant.refresh_token,
            Utc::now(),
        )
        .ok_or_else(|| {
            LinkError::Exchange(SpotifyError::Decode(format!(
                "token lifetime {}s out of range",
                expires_in
            )))
        })?;
        if !credential.is_linked() {
            tracing::warn!("Code exchange for user {} returned no refresh token", user_id);
        }

        self.credentials
            .save(user_id, &credential)
            .await
            .map_err(LinkError::Storage)?;

        tracing::info!("Linked account for user {}", user_id);
        Ok(user_id)
    }

    /// Drops expired pending states.
    pub fn cleanup_expired(&self) -> usize {
        self.states.cleanup_expired()
    }

    fn state_for(&self, user_id: UserId) -> String {
        let nonce = self.states.issue(user_id);
        let signature = self.sign(&nonce, user_id);
        format!("{}.{}", nonce, URL_SAFE_NO_PAD.encode(signature))
    }

    fn verify_state(&self, state: &str) -> Result<UserId, LinkError> {
        let (nonce, signature) = state.split_once('.').ok_or(LinkError::InvalidState)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| LinkError::InvalidState)?;

        // Consuming first means a forged signature still burns the nonce
        let user_id = self.states.consume(nonce).ok_or(LinkError::InvalidState)?;

        let mut mac = self.key.clone();
        mac.update(payload(nonce, user_id).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| LinkError::InvalidState)?;

        Ok(user_id)
    }

    fn sign(&self, nonce: &str, user_id: UserId) -> Vec<u8> {
        let mut mac = self.key.clone();
        mac.update(payload(nonce, user_id).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn payload(nonce: &str, user_id: UserId) -> String {
    format!("{}:{}", nonce, user_id)
}
