//! JSON shapes of the remote API. Only the fields we read are modelled.

use serde::{Deserialize, Serialize};

use crate::models::{AudioFeatures, PlaybackInstruction, PlaybackState};

#[derive(Debug, Deserialize)]
pub(crate) struct PlayerResponse {
    device: Option<DeviceObject>,
    item: Option<TrackObject>,
    context: Option<ContextObject>,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    is_playing: bool,
}

#[derive(Debug, Deserialize)]
struct DeviceObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    uri: String,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    album: Option<AlbumObject>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContextObject {
    uri: String,
}

impl PlayerResponse {
    /// `None` when no item is loaded (e.g. between tracks or during an ad).
    pub(crate) fn into_state(self) -> Option<PlaybackState> {
        let track = self.item?;
        Some(PlaybackState {
            device_name: self.device.map(|d| d.name).unwrap_or_default(),
            track_uri: track.uri,
            track_title: track.name,
            artist_names: track.artists.into_iter().map(|a| a.name).collect(),
            album_name: track.album.map(|a| a.name).unwrap_or_default(),
            context_uri: self.context.map(|c| c.uri),
            progress_ms: self.progress_ms.unwrap_or(0),
            is_playing: self.is_playing,
        })
    }
}

/// Body of `PUT /me/player/play`.
///
/// The remote API rejects `context_uri` combined with `uris`, so a context
/// is started at the track through `offset` instead.
#[derive(Debug, Serialize)]
pub(crate) struct PlayRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    context_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uris: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<PlayOffset<'a>>,
    position_ms: u64,
}

#[derive(Debug, Serialize)]
struct PlayOffset<'a> {
    uri: &'a str,
}

impl<'a> From<&'a PlaybackInstruction> for PlayRequest<'a> {
    fn from(instruction: &'a PlaybackInstruction) -> Self {
        match instruction.context_uri.as_deref() {
            Some(context_uri) => PlayRequest {
                context_uri: Some(context_uri),
                uris: None,
                offset: instruction
                    .track_uris
                    .first()
                    .map(|uri| PlayOffset { uri: uri.as_str() }),
                position_ms: instruction.position_ms,
            },
            None => PlayRequest {
                context_uri: None,
                uris: Some(&instruction.track_uris),
                offset: None,
                position_ms: instruction.position_ms,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Page of `GET /me/tracks`.
#[derive(Debug, Deserialize)]
pub(crate) struct SavedTracksResponse {
    #[serde(default)]
    items: Vec<SavedTrackObject>,
}

#[derive(Debug, Deserialize)]
struct SavedTrackObject {
    track: SavedTrack,
}

#[derive(Debug, Deserialize)]
struct SavedTrack {
    /// Absent for local files.
    id: Option<String>,
}

impl SavedTracksResponse {
    pub(crate) fn into_ids(self) -> Vec<String> {
        self.items.into_iter().filter_map(|i| i.track.id).collect()
    }
}

/// Body of `GET /audio-features?ids=`. Unknown ids come back as `null`.
#[derive(Debug, Deserialize)]
pub(crate) struct AudioFeaturesResponse {
    #[serde(default)]
    audio_features: Vec<Option<AudioFeatureObject>>,
}

#[derive(Debug, Deserialize)]
struct AudioFeatureObject {
    danceability: f32,
    tempo: f32,
    valence: f32,
    instrumentalness: f32,
    speechiness: f32,
}

impl AudioFeaturesResponse {
    pub(crate) fn into_features(self) -> Vec<AudioFeatures> {
        self.audio_features
            .into_iter()
            .flatten()
            .map(|f| AudioFeatures {
                danceability: f.danceability,
                tempo: f.tempo,
                valence: f.valence,
                instrumentalness: f.instrumentalness,
                speechiness: f.speechiness,
            })
            .collect()
    }
}
