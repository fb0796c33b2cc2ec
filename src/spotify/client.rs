//! HTTP client for the remote player API.

use async_trait::async_trait;
use reqwest::StatusCode;

use serde::de::DeserializeOwned;

use super::wire::{AudioFeaturesResponse, PlayRequest, PlayerResponse, SavedTracksResponse};
use super::{LibraryClient, PlaybackClient, SpotifyError};
use crate::models::{AudioFeatures, PlaybackInstruction, PlaybackState};

/// Default base URL of the remote Web API.
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Web API client. Stateless apart from the connection pool; the access
/// token is passed per call.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    api_url: String,
}

impl SpotifyClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), api_url)
    }

    pub fn with_http(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SpotifyError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| SpotifyError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpotifyError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| SpotifyError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PlaybackClient for SpotifyClient {
    async fn get_state(&self, access_token: &str) -> Result<Option<PlaybackState>, SpotifyError> {
        let response = self
            .http
            .get(self.url("/me/player"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SpotifyError::Http(e.to_string()))?;

        // 204 means no device is active
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SpotifyError::Status(response.status().as_u16()));
        }

        let body: PlayerResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Decode(e.to_string()))?;

        Ok(body.into_state())
    }

    async fn push_state(
        &self,
        access_token: &str,
        instruction: &PlaybackInstruction,
    ) -> Result<(), SpotifyError> {
        let response = self
            .http
            .put(self.url("/me/player/play"))
            .bearer_auth(access_token)
            .json(&PlayRequest::from(instruction))
            .send()
            .await
            .map_err(|e| SpotifyError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpotifyError::Status(response.status().as_u16()));
        }

        Ok(())
    }
}

#[async_trait]
impl LibraryClient for SpotifyClient {
    async fn saved_track_ids(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<Vec<String>, SpotifyError> {
        let limit = limit.to_string();
        let body: SavedTracksResponse = self
            .get_json(
                access_token,
                "/me/tracks",
                &[("offset", "0"), ("limit", limit.as_str())],
            )
            .await?;
        Ok(body.into_ids())
    }

    async fn audio_features(
        &self,
        access_token: &str,
        track_ids: &[String],
    ) -> Result<Vec<AudioFeatures>, SpotifyError> {
        if track_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = track_ids.join(",");
        let body: AudioFeaturesResponse = self
            .get_json(access_token, "/audio-features", &[("ids", ids.as_str())])
            .await?;
        Ok(body.into_features())
    }
}
