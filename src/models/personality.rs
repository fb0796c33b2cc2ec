use serde::Serialize;

/// Audio analysis of one track, as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFeatures {
    pub danceability: f32,
    pub tempo: f32,
    pub valence: f32,
    pub instrumentalness: f32,
    pub speechiness: f32,
}

/// Listening profile derived from a user's recently saved tracks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Personality {
    /// Mean danceability on a 0-10 scale.
    pub likes_dance: f32,
    /// Mean tempo in BPM.
    pub tempo: f32,
    /// Mean valence (0 = sad, 1 = happy).
    pub valence: f32,
    pub prefer_instrumental_over_vocal: bool,
}

impl Personality {
    /// Averages `features`; `None` when there is nothing to average.
    pub fn from_features(features: &[AudioFeatures]) -> Option<Self> {
        if features.is_empty() {
            return None;
        }

        let mean = |field: fn(&AudioFeatures) -> f32| {
            features.iter().map(field).sum::<f32>() / features.len() as f32
        };

        Some(Self {
            likes_dance: mean(|f| f.danceability) * 10.0,
            tempo: mean(|f| f.tempo),
            valence: mean(|f| f.valence),
            prefer_instrumental_over_vocal: mean(|f| f.instrumentalness)
                > mean(|f| f.speechiness),
        })
    }
}
