use super::MusicService;
use crate::error::MusicServiceError;
use crate::models::{CreatedPlaylist, SearchResult, TrackMatch, UserProfile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    FetchProfile,
    Search(String),
    CreatePlaylist { owner_id: String, name: String },
    AddTracks { playlist_id: String, uris: Vec<String> },
}

/// Which operation should fail, and with what provider message.
#[derive(Debug, Clone, Default)]
pub struct MockFailures {
    pub profile: Option<String>,
    pub search: Option<String>,
    pub create: Option<String>,
    pub add: Option<String>,
}

/// In-memory service used in tests: a title -> track catalog, scripted
/// failures, and a log of every call in order.
pub struct MockMusicService {
    catalog: HashMap<String, TrackMatch>,
    failures: MockFailures,
    calls: Mutex<Vec<MockCall>>,
    delay: Option<std::time::Duration>,
}

impl MockMusicService {
    pub fn new() -> Self {
        Self {
            catalog: HashMap::new(),
            failures: MockFailures::default(),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Register a title that resolves to `mock:track:{id}`.
    pub fn with_track(mut self, title: &str, id: &str) -> Self {
        self.catalog.insert(
            title.to_string(),
            TrackMatch {
                id: id.to_string(),
                uri: format!("mock:track:{}", id),
            },
        );
        self
    }

    pub fn with_failures(mut self, failures: MockFailures) -> Self {
        self.failures = failures;
        self
    }

    /// Make every search sleep first; lets tests observe a build in flight.
    pub fn with_search_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: MockCall) {
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
    }

    fn fail(msg: &Option<String>) -> Result<(), MusicServiceError> {
        match msg {
            Some(m) => Err(MusicServiceError::Status {
                status: 500,
                message: m.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for MockMusicService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicService for MockMusicService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_profile(&self, _token: &str) -> Result<UserProfile, MusicServiceError> {
        self.record(MockCall::FetchProfile);
        Self::fail(&self.failures.profile)?;
        Ok(UserProfile {
            id: "mock_user".into(),
            display_name: Some("Mock User".into()),
        })
    }

    async fn search_track(&self, _token: &str, title: &str) -> Result<SearchResult, MusicServiceError> {
        info!("MockMusicService: search {}", title);
        self.record(MockCall::Search(title.to_string()));
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Self::fail(&self.failures.search)?;
        Ok(SearchResult {
            matches: self.catalog.get(title).cloned().into_iter().collect(),
        })
    }

    async fn create_playlist(
        &self,
        _token: &str,
        owner_id: &str,
        name: &str,
    ) -> Result<CreatedPlaylist, MusicServiceError> {
        info!("MockMusicService: create_playlist {}", name);
        self.record(MockCall::CreatePlaylist {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
        });
        Self::fail(&self.failures.create)?;
        Ok(CreatedPlaylist {
            id: "mock-playlist".into(),
            name: name.to_string(),
            public_url: "https://open.example/playlist/mock-playlist".into(),
        })
    }

    async fn add_tracks_to_playlist(
        &self,
        _token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), MusicServiceError> {
        info!("MockMusicService: add_tracks {} -> {} tracks", playlist_id, uris.len());
        self.record(MockCall::AddTracks {
            playlist_id: playlist_id.to_string(),
            uris: uris.to_vec(),
        });
        Self::fail(&self.failures.add)
    }
}
