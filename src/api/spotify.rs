use super::MusicService;
use crate::error::MusicServiceError;
use crate::models::{CreatedPlaylist, SearchResult, TrackMatch, UserProfile};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct ProfileBody {
    id: String,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct SearchBody {
    tracks: SearchTracks,
}

#[derive(Deserialize)]
struct SearchTracks {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Deserialize)]
struct TrackItem {
    id: String,
    uri: String,
}

#[derive(Deserialize)]
struct PlaylistBody {
    id: String,
    name: String,
    external_urls: ExternalUrls,
}

#[derive(Deserialize)]
struct ExternalUrls {
    spotify: String,
}

/// Spotify Web API client. Stateless: the caller passes the bearer token on
/// every call, so one client can serve any session.
pub struct SpotifyClient {
    client: Client,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// Turn a non-success response into a `Status` error, preferring the
    /// provider's `error.message` over a generic text.
    async fn status_error(resp: Response, what: &str) -> MusicServiceError {
        let status = resp.status();
        let txt = resp.text().await.unwrap_or_default();
        let provider_msg = serde_json::from_str::<serde_json::Value>(&txt)
            .ok()
            .and_then(|j| {
                j["error"]["message"]
                    .as_str()
                    .or_else(|| j["error_description"].as_str())
                    .map(|s| s.to_string())
            });
        warn!("{} failed: {} => {}", what, status, txt);
        MusicServiceError::Status {
            status: status.as_u16(),
            message: provider_msg.unwrap_or_else(|| format!("{} failed", what)),
        }
    }
}

#[async_trait]
impl MusicService for SpotifyClient {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, MusicServiceError> {
        let url = format!("{}/me", self.api_base);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp, "fetch profile").await);
        }
        let body: ProfileBody = resp
            .json()
            .await
            .map_err(|e| MusicServiceError::Decode(format!("profile: {}", e)))?;
        Ok(UserProfile {
            id: body.id,
            display_name: body.display_name,
        })
    }

    async fn search_track(&self, token: &str, title: &str) -> Result<SearchResult, MusicServiceError> {
        let url = format!(
            "{}/search?q={}&type=track&limit=1",
            self.api_base,
            urlencoding::encode(title)
        );
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp, "search").await);
        }
        let body: SearchBody = resp
            .json()
            .await
            .map_err(|e| MusicServiceError::Decode(format!("search: {}", e)))?;
        let matches: Vec<TrackMatch> = body
            .tracks
            .items
            .into_iter()
            .map(|t| TrackMatch { id: t.id, uri: t.uri })
            .collect();
        debug!("search {:?} -> {} match(es)", title, matches.len());
        Ok(SearchResult { matches })
    }

    async fn create_playlist(
        &self,
        token: &str,
        owner_id: &str,
        name: &str,
    ) -> Result<CreatedPlaylist, MusicServiceError> {
        let url = format!(
            "{}/users/{}/playlists",
            self.api_base,
            urlencoding::encode(owner_id)
        );
        let body = json!({
            "name": name,
            "description": "Created from a pasted song list",
            "public": false
        });
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp, "create playlist").await);
        }
        let pl: PlaylistBody = resp
            .json()
            .await
            .map_err(|e| MusicServiceError::Decode(format!("playlist: {}", e)))?;
        Ok(CreatedPlaylist {
            id: pl.id,
            name: pl.name,
            public_url: pl.external_urls.spotify,
        })
    }

    async fn add_tracks_to_playlist(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), MusicServiceError> {
        let url = format!(
            "{}/playlists/{}/tracks",
            self.api_base,
            urlencoding::encode(playlist_id)
        );
        let body = json!({ "uris": uris });
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp, "add tracks").await);
        }
        Ok(())
    }
}
