//! Bindings to the remote playback service and its token endpoint.
//!
//! The rest of the crate only sees the [`PlaybackClient`], [`LibraryClient`]
//! and [`TokenExchange`] traits; the reqwest-backed implementations live in
//! [`client`] and [`accounts`].

pub mod accounts;
pub mod client;
mod wire;

pub use accounts::SpotifyAccounts;
pub use client::SpotifyClient;

use async_trait::async_trait;
use std::fmt;

use crate::models::{AudioFeatures, PlaybackInstruction, PlaybackState};

/// Errors talking to the remote service.
#[derive(Debug)]
pub enum SpotifyError {
    /// The request could not be sent or the response not read.
    Http(String),
    /// The service answered with a non-success status.
    Status(u16),
    /// The response body did not have the expected shape.
    Decode(String),
}

impl fmt::Display for SpotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpotifyError::Http(e) => write!(f, "HTTP error: {}", e),
            SpotifyError::Status(code) => write!(f, "Unexpected status: {}", code),
            SpotifyError::Decode(e) => write!(f, "Malformed response: {}", e),
        }
    }
}

impl std::error::Error for SpotifyError {}

/// Tokens returned by a code or refresh exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in_secs: i64,
    /// Present when the service issued (or rotated) a refresh token.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("expires_in_secs", &self.expires_in_secs)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The remote player of a single user.
#[async_trait]
pub trait PlaybackClient: Send + Sync {
    /// Current playback, or `None` when nothing is playing on any device.
    async fn get_state(&self, access_token: &str) -> Result<Option<PlaybackState>, SpotifyError>;

    /// Starts playing `instruction` on the user's active device.
    async fn push_state(
        &self,
        access_token: &str,
        instruction: &PlaybackInstruction,
    ) -> Result<(), SpotifyError>;
}

/// Read access to a user's saved music.
#[async_trait]
pub trait LibraryClient: Send + Sync {
    /// Ids of the `limit` most recently saved tracks, newest first.
    async fn saved_track_ids(&self, access_token: &str, limit: u32)
        -> Result<Vec<String>, SpotifyError>;

    /// Audio analysis for `track_ids`. Tracks without analysis are omitted.
    async fn audio_features(
        &self,
        access_token: &str,
        track_ids: &[String],
    ) -> Result<Vec<AudioFeatures>, SpotifyError>;
}

/// The token endpoint. Client credentials are owned by the implementation.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, SpotifyError>;

    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<TokenGrant, SpotifyError>;
}
