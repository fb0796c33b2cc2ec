//! Fakes for the collaborator traits, shared by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::db::StoreError;
use crate::models::{AudioFeatures, Group, PlaybackInstruction, PlaybackState, UserId};
use crate::registry::{GroupChange, GroupStore, LeaderSelector, MemoryGroupStore};
use crate::spotify::{LibraryClient, PlaybackClient, SpotifyError, TokenExchange, TokenGrant};

/// Always picks the candidate at a fixed position and records every call.
pub struct FixedLeader {
    position: usize,
    calls: Mutex<Vec<Vec<UserId>>>,
}

impl FixedLeader {
    pub fn new(position: usize) -> Self {
        Self {
            position,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<UserId>> {
        self.calls.lock().unwrap().clone()
    }
}

impl LeaderSelector for FixedLeader {
    fn choose(&self, candidates: &[UserId]) -> UserId {
        self.calls.lock().unwrap().push(candidates.to_vec());
        candidates[self.position.min(candidates.len() - 1)]
    }
}

/// In-memory group store whose next `apply` can be made to fail.
pub struct FailingGroupStore {
    inner: MemoryGroupStore,
    fail_next: AtomicBool,
}

impl FailingGroupStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryGroupStore::new(),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GroupStore for FailingGroupStore {
    async fn load_all(&self) -> Result<Vec<Group>, StoreError> {
        self.inner.load_all().await
    }

    async fn apply(&self, changes: &[GroupChange]) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.apply(changes).await
    }
}

/// Token endpoint that answers from canned grants and counts calls.
#[derive(Default)]
pub struct FakeExchange {
    refresh_grants: Mutex<HashMap<String, TokenGrant>>,
    code_grants: Mutex<HashMap<String, TokenGrant>>,
    delay: Option<Duration>,
    refresh_calls: AtomicUsize,
    code_calls: AtomicUsize,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every refresh waits this long before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn on_refresh(&self, refresh_token: &str, grant: TokenGrant) {
        self.refresh_grants
            .lock()
            .unwrap()
            .insert(refresh_token.to_string(), grant);
    }

    pub fn on_code(&self, code: &str, grant: TokenGrant) {
        self.code_grants
            .lock()
            .unwrap()
            .insert(code.to_string(), grant);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn code_calls(&self) -> usize {
        self.code_calls.load(Ordering::SeqCst)
    }
}

pub fn grant(access_token: &str, expires_in_secs: i64, refresh_token: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: access_token.to_string(),
        expires_in_secs,
        refresh_token: refresh_token.map(str::to_string),
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, SpotifyError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.refresh_grants
            .lock()
            .unwrap()
            .get(refresh_token)
            .cloned()
            .ok_or(SpotifyError::Status(400))
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant, SpotifyError> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        self.code_grants
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or(SpotifyError::Status(400))
    }
}

/// Remote player keyed by access token, recording every push.
#[derive(Default)]
pub struct FakePlayback {
    states: Mutex<HashMap<String, PlaybackState>>,
    offline: Mutex<HashSet<String>>,
    pushes: Mutex<Vec<(String, PlaybackInstruction)>>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self, access_token: &str, state: PlaybackState) {
        self.states
            .lock()
            .unwrap()
            .insert(access_token.to_string(), state);
    }

    /// Pushes to this token's player fail.
    pub fn offline(&self, access_token: &str) {
        self.offline
            .lock()
            .unwrap()
            .insert(access_token.to_string());
    }

    pub fn pushes(&self) -> Vec<(String, PlaybackInstruction)> {
        self.pushes.lock().unwrap().clone()
    }
}

pub fn sample_state(track: &str) -> PlaybackState {
    PlaybackState {
        device_name: "Speaker".to_string(),
        track_uri: format!("spotify:track:{}", track),
        track_title: track.to_string(),
        artist_names: vec!["Artist".to_string()],
        album_name: "Album".to_string(),
        context_uri: Some("spotify:playlist:p1".to_string()),
        progress_ms: 30_000,
        is_playing: true,
    }
}

#[async_trait]
impl PlaybackClient for FakePlayback {
    async fn get_state(&self, access_token: &str) -> Result<Option<PlaybackState>, SpotifyError> {
        if self.offline.lock().unwrap().contains(access_token) {
            return Err(SpotifyError::Http("connection refused".to_string()));
        }
        Ok(self.states.lock().unwrap().get(access_token).cloned())
    }

    async fn push_state(
        &self,
        access_token: &str,
        instruction: &PlaybackInstruction,
    ) -> Result<(), SpotifyError> {
        self.pushes
            .lock()
            .unwrap()
            .push((access_token.to_string(), instruction.clone()));
        if self.offline.lock().unwrap().contains(access_token) {
            return Err(SpotifyError::Status(404));
        }
        Ok(())
    }
}

/// Saved tracks and their analysis keyed by access token.
#[derive(Default)]
pub struct FakeLibrary {
    saved: Mutex<HashMap<String, Vec<String>>>,
    features: Mutex<HashMap<String, AudioFeatures>>,
    failing: Mutex<HashSet<String>>,
    limits: Mutex<Vec<u32>>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self, access_token: &str, tracks: &[(&str, AudioFeatures)]) {
        let ids = tracks.iter().map(|(id, _)| id.to_string()).collect();
        self.saved
            .lock()
            .unwrap()
            .insert(access_token.to_string(), ids);
        let mut features = self.features.lock().unwrap();
        for (id, analysis) in tracks {
            features.insert(id.to_string(), *analysis);
        }
    }

    /// Reads with this token fail.
    pub fn fail(&self, access_token: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(access_token.to_string());
    }

    /// Every `limit` asked of `saved_track_ids`.
    pub fn limits(&self) -> Vec<u32> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl LibraryClient for FakeLibrary {
    async fn saved_track_ids(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<Vec<String>, SpotifyError> {
        self.limits.lock().unwrap().push(limit);
        if self.failing.lock().unwrap().contains(access_token) {
            return Err(SpotifyError::Status(403));
        }
        let mut ids = self
            .saved
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .unwrap_or_default();
        ids.truncate(limit as usize);
        Ok(ids)
    }

    async fn audio_features(
        &self,
        _access_token: &str,
        track_ids: &[String],
    ) -> Result<Vec<AudioFeatures>, SpotifyError> {
        let features = self.features.lock().unwrap();
        Ok(track_ids
            .iter()
            .filter_map(|id| features.get(id).copied())
            .collect())
    }
}
