pub mod mock;
pub mod pkce;
pub mod spotify;

use crate::error::MusicServiceError;
use crate::models::{CreatedPlaylist, SearchResult, UserProfile};

/// The four Music Service calls the playlist builder depends on.
/// Implementations: spotify::SpotifyClient, mock::MockMusicService.
#[async_trait::async_trait]
pub trait MusicService: Send + Sync {
    /// Profile of the token's owner. Failure usually means the session is dead.
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, MusicServiceError>;

    /// Free-text track search. An empty result is not an error.
    async fn search_track(&self, token: &str, title: &str) -> Result<SearchResult, MusicServiceError>;

    async fn create_playlist(
        &self,
        token: &str,
        owner_id: &str,
        name: &str,
    ) -> Result<CreatedPlaylist, MusicServiceError>;

    /// Add URIs to a playlist in one request (batching done by caller).
    async fn add_tracks_to_playlist(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), MusicServiceError>;

    /// Return the service's name (for logging)
    fn name(&self) -> &str;
}
