//! Turns a list of free-text titles into a populated playlist.
//!
//! Pipeline: `Idle -> Searching -> CreatingPlaylist -> AddingTracks -> Succeeded`,
//! with `Failed` reachable from every active phase. Searches run strictly one
//! after another in input order, so progress and the resolved URI order both
//! mirror the list the user pasted.
use crate::api::MusicService;
use crate::error::BuildError;
use crate::models::AuthSession;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Idle,
    Searching,
    CreatingPlaylist,
    AddingTracks,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Succeeded | BuildStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildProgress {
    /// `index` is 1-based.
    Searching { index: usize, total: usize, title: String },
    CreatingPlaylist,
    AddingTracks { count: usize, playlist_name: String },
    Succeeded { url: String },
    Failed { message: String },
}

impl std::fmt::Display for BuildProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildProgress::Searching { index, total, title } => {
                write!(f, "Searching for song {}/{}: \"{}\"", index, total, title)
            }
            BuildProgress::CreatingPlaylist => write!(f, "Creating new playlist..."),
            BuildProgress::AddingTracks { count, playlist_name } => {
                write!(f, "Adding {} songs to \"{}\"...", count, playlist_name)
            }
            BuildProgress::Succeeded { url } => write!(f, "Playlist created successfully! {}", url),
            BuildProgress::Failed { message } => write!(f, "An error occurred: {}", message),
        }
    }
}

/// One build invocation. Not persisted.
#[derive(Debug, Clone)]
pub struct PlaylistBuildJob {
    pub id: Uuid,
    titles: Vec<String>,
    playlist_name: String,
    resolved_uris: Vec<String>,
    status: BuildStatus,
    result_url: Option<String>,
    error_message: Option<String>,
}

impl PlaylistBuildJob {
    /// Blank entries are dropped; the rest keep the text as entered.
    /// A blank name falls back to `default_name`.
    pub fn new<I, S>(titles: I, playlist_name: &str, default_name: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let titles = titles
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.trim().is_empty())
            .collect();
        let playlist_name = if playlist_name.trim().is_empty() {
            default_name.to_string()
        } else {
            playlist_name.to_string()
        };
        Self {
            id: Uuid::new_v4(),
            titles,
            playlist_name,
            resolved_uris: Vec::new(),
            status: BuildStatus::Idle,
            result_url: None,
            error_message: None,
        }
    }

    /// Pasted text, one title per line.
    pub fn from_text(text: &str, playlist_name: &str, default_name: &str) -> Self {
        Self::new(text.lines(), playlist_name, default_name)
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }
    pub fn playlist_name(&self) -> &str {
        &self.playlist_name
    }
    pub fn resolved_uris(&self) -> &[String] {
        &self.resolved_uris
    }
    pub fn status(&self) -> BuildStatus {
        self.status
    }
    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    fn advance(&mut self, next: BuildStatus) {
        if self.status.is_terminal() {
            warn!("job {} already {:?}; ignoring move to {:?}", self.id, self.status, next);
            return;
        }
        debug!("job {}: {:?} -> {:?}", self.id, self.status, next);
        self.status = next;
    }

    fn succeed(&mut self, url: String) {
        self.advance(BuildStatus::Succeeded);
        self.result_url = Some(url);
    }

    fn fail(&mut self, message: String) {
        self.advance(BuildStatus::Failed);
        self.error_message = Some(message);
    }
}

pub struct PlaylistBuildOrchestrator {
    service: Arc<dyn MusicService>,
    add_batch_size: Option<usize>,
    progress: Option<mpsc::UnboundedSender<BuildProgress>>,
    in_flight: Mutex<()>,
}

impl PlaylistBuildOrchestrator {
    pub fn new(service: Arc<dyn MusicService>) -> Self {
        Self {
            service,
            add_batch_size: None,
            progress: None,
            in_flight: Mutex::new(()),
        }
    }

    /// Split the add phase into requests of at most `size` URIs.
    pub fn with_add_batch_size(mut self, size: Option<usize>) -> Self {
        self.add_batch_size = size.filter(|s| *s > 0);
        self
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<BuildProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    fn emit(&self, event: BuildProgress) {
        if let Some(tx) = &self.progress {
            // receiver gone just means nobody is watching
            let _ = tx.send(event);
        }
    }

    /// Run a job to completion. Returns the playlist's public URL.
    ///
    /// An empty title list is rejected before any call is made and the job
    /// stays `Idle`. Only one run may be in flight per orchestrator.
    pub async fn run(
        &self,
        job: &mut PlaylistBuildJob,
        session: &AuthSession,
    ) -> Result<String, BuildError> {
        if job.status != BuildStatus::Idle {
            return Err(BuildError::Validation(format!(
                "build job {} already ran",
                job.id
            )));
        }
        if job.titles.is_empty() {
            let msg = "Please enter at least one song title.".to_string();
            job.error_message = Some(msg.clone());
            return Err(BuildError::Validation(msg));
        }
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| BuildError::AlreadyRunning)?;

        info!(
            "building playlist {:?} from {} title(s) via {}",
            job.playlist_name,
            job.titles.len(),
            self.service.name()
        );
        match self.drive(job, session).await {
            Ok(url) => {
                info!("playlist ready: {}", url);
                job.succeed(url.clone());
                self.emit(BuildProgress::Succeeded { url: url.clone() });
                Ok(url)
            }
            Err(e) => {
                warn!("playlist build failed during {:?}: {}", job.status, e);
                job.fail(e.to_string());
                self.emit(BuildProgress::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job: &mut PlaylistBuildJob,
        session: &AuthSession,
    ) -> Result<String, BuildError> {
        let token = session.access_token.as_str();

        job.advance(BuildStatus::Searching);
        let total = job.titles.len();
        for index in 0..total {
            let title = job.titles[index].clone();
            self.emit(BuildProgress::Searching {
                index: index + 1,
                total,
                title: title.clone(),
            });
            let result = self
                .service
                .search_track(token, &title)
                .await
                .map_err(|source| BuildError::Search {
                    title: title.clone(),
                    source,
                })?;
            match result.matches.into_iter().next() {
                Some(m) => job.resolved_uris.push(m.uri),
                None => debug!("no match for {:?}; skipping", title),
            }
        }
        if job.resolved_uris.is_empty() {
            return Err(BuildError::NoMatches);
        }

        job.advance(BuildStatus::CreatingPlaylist);
        self.emit(BuildProgress::CreatingPlaylist);
        // owner of this run's token
        let owner = self
            .service
            .fetch_profile(token)
            .await
            .map_err(BuildError::ProfileFetch)?;
        let playlist = self
            .service
            .create_playlist(token, &owner.id, &job.playlist_name)
            .await
            .map_err(BuildError::PlaylistCreation)?;

        job.advance(BuildStatus::AddingTracks);
        self.emit(BuildProgress::AddingTracks {
            count: job.resolved_uris.len(),
            playlist_name: playlist.name.clone(),
        });
        // A failure here leaves the created playlist behind, empty or partial.
        let batch = self.add_batch_size.unwrap_or(job.resolved_uris.len());
        for chunk in job.resolved_uris.chunks(batch) {
            self.service
                .add_tracks_to_playlist(token, &playlist.id, chunk)
                .await
                .map_err(|source| BuildError::AddTracks {
                    playlist_id: playlist.id.clone(),
                    source,
                })?;
        }
        Ok(playlist.public_url)
    }
}
