//! Listening profile of a linked user, built from recently saved tracks.

use std::fmt;
use std::sync::Arc;

use crate::broker::TokenBroker;
use crate::models::{Personality, UserId};
use crate::spotify::{LibraryClient, SpotifyError};

/// How many saved tracks a profile is based on.
pub const SAMPLE_SIZE: u32 = 10;

#[derive(Debug)]
pub enum PersonalityError {
    /// No access token could be obtained for the user.
    Unlinked,
    /// The remote library could not be read.
    Remote(SpotifyError),
}

impl fmt::Display for PersonalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonalityError::Unlinked => write!(f, "Account is not linked"),
            PersonalityError::Remote(e) => write!(f, "Failed to read library: {}", e),
        }
    }
}

impl std::error::Error for PersonalityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersonalityError::Remote(e) => Some(e),
            PersonalityError::Unlinked => None,
        }
    }
}

impl From<SpotifyError> for PersonalityError {
    fn from(e: SpotifyError) -> Self {
        PersonalityError::Remote(e)
    }
}

pub struct PersonalityReader {
    broker: Arc<TokenBroker>,
    library: Arc<dyn LibraryClient>,
}

impl PersonalityReader {
    pub fn new(broker: Arc<TokenBroker>, library: Arc<dyn LibraryClient>) -> Self {
        Self { broker, library }
    }

    /// Profile of `user_id`, or `None` when none of its saved tracks has
    /// audio analysis.
    pub async fn personality(
        &self,
        user_id: UserId,
    ) -> Result<Option<Personality>, PersonalityError> {
        let token = self
            .broker
            .get_access_token(user_id)
            .await
            .map_err(|_| PersonalityError::Unlinked)?;

        let track_ids = self.library.saved_track_ids(&token, SAMPLE_SIZE).await?;
        let features = self.library.audio_features(&token, &track_ids).await?;

        tracing::debug!(
            "Profiling user {} from {} of {} saved track(s)",
            user_id,
            features.len(),
            track_ids.len()
        );
        Ok(Personality::from_features(&features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryCredentialStore;
    use crate::models::{AudioFeatures, Credential};
    use crate::test_support::{FakeExchange, FakeLibrary};
    use chrono::Utc;

    const A: UserId = UserId(1);

    fn reader(library: Arc<FakeLibrary>) -> (PersonalityReader, Arc<MemoryCredentialStore>) {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let broker = Arc::new(TokenBroker::new(
            credentials.clone(),
            Arc::new(FakeExchange::new()),
        ));
        (PersonalityReader::new(broker, library), credentials)
    }

    fn link(credentials: &MemoryCredentialStore, user: UserId) {
        let credential =
            Credential::issued("T1", 3600, Some("R1".to_string()), Utc::now()).unwrap();
        credentials.insert(user, credential);
    }

    fn track(danceability: f32) -> AudioFeatures {
        AudioFeatures {
            danceability,
            tempo: 120.0,
            valence: 0.4,
            instrumentalness: 0.0,
            speechiness: 0.2,
        }
    }

    #[tokio::test]
    async fn test_personality_from_saved_tracks() {
        let library = Arc::new(FakeLibrary::new());
        library.saved("T1", &[("t1", track(0.2)), ("t2", track(0.6))]);
        let (reader, credentials) = reader(library.clone());
        link(&credentials, A);

        let personality = reader.personality(A).await.unwrap().unwrap();

        assert!((personality.likes_dance - 4.0).abs() < 1e-4);
        assert!(!personality.prefer_instrumental_over_vocal);
        assert_eq!(library.limits(), vec![SAMPLE_SIZE]);
    }

    #[tokio::test]
    async fn test_no_saved_tracks_is_none() {
        let library = Arc::new(FakeLibrary::new());
        let (reader, credentials) = reader(library);
        link(&credentials, A);

        assert!(reader.personality(A).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unlinked_user() {
        let (reader, credentials) = reader(Arc::new(FakeLibrary::new()));
        credentials.insert(A, Credential::unlinked());

        let result = reader.personality(A).await;

        assert!(matches!(result, Err(PersonalityError::Unlinked)));
    }

    #[tokio::test]
    async fn test_library_failure_is_reported() {
        let library = Arc::new(FakeLibrary::new());
        library.fail("T1");
        let (reader, credentials) = reader(library);
        link(&credentials, A);

        let result = reader.personality(A).await;

        assert!(matches!(result, Err(PersonalityError::Remote(_))));
    }
}
