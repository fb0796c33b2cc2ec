use serde::{Deserialize, Serialize};

/// A user's current playback, as reported by the remote player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub device_name: String,
    pub track_uri: String,
    pub track_title: String,
    pub artist_names: Vec<String>,
    pub album_name: String,
    pub context_uri: Option<String>,
    pub progress_ms: u64,
    pub is_playing: bool,
}

/// What to play on a member's player to mirror someone else's playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackInstruction {
    pub context_uri: Option<String>,
    pub position_ms: u64,
    pub track_uris: Vec<String>,
}

impl PlaybackInstruction {
    /// Builds the instruction that reproduces `state` on another player.
    pub fn mirror(state: &PlaybackState) -> Self {
        Self {
            context_uri: state.context_uri.clone(),
            position_ms: state.progress_ms,
            track_uris: vec![state.track_uri.clone()],
        }
    }
}
