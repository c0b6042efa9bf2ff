use thiserror::Error;

/// Failures of the authorization-code exchange (and of the refresh exchange).
#[derive(Debug, Error)]
pub enum AuthExchangeError {
    #[error("authentication failed: missing authorization code")]
    MissingCode,
    #[error("authentication failed: missing code verifier, start the login again")]
    MissingVerifier,
    #[error("authentication failed: no refresh token stored")]
    MissingRefreshToken,
    #[error("login failed: {0}")]
    Denied(String),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not generate code verifier: {0}")]
    Entropy(#[from] rand::Error),
    #[error("session storage: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Failure of a single Music Service API call.
#[derive(Debug, Error)]
pub enum MusicServiceError {
    #[error("{message} (status {status})")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl MusicServiceError {
    /// Provider message when there is one; used when surfacing build failures.
    pub fn detail(&self) -> String {
        match self {
            MusicServiceError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Why a playlist build stopped.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0}")]
    Validation(String),
    #[error("a playlist build is already running")]
    AlreadyRunning,
    #[error("failed to fetch user profile, your session might have expired: {0}")]
    ProfileFetch(MusicServiceError),
    #[error("search failed for \"{title}\": {source}")]
    Search {
        title: String,
        #[source]
        source: MusicServiceError,
    },
    #[error("couldn't find any of the songs")]
    NoMatches,
    #[error("failed to create playlist: {}", .0.detail())]
    PlaylistCreation(MusicServiceError),
    #[error("failed to add tracks to playlist {playlist_id}: {}", .source.detail())]
    AddTracks {
        playlist_id: String,
        #[source]
        source: MusicServiceError,
    },
}
