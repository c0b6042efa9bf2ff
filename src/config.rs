use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Public client id registered with the provider (PKCE, no secret).
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    // Endpoints
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,

    // path to database file backing the session storage
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_playlist_name")]
    pub default_playlist_name: String,
    #[serde(default = "default_logout_delay")]
    pub profile_failure_logout_delay_ms: u64,

    /// Max URIs per add-tracks request. None sends the whole list at once.
    #[serde(default)]
    pub add_tracks_batch_size: Option<usize>,
}

fn default_redirect_uri() -> String { "http://127.0.0.1:8888/callback".into() }
fn default_auth_base() -> String {
    env::var("SPOTIFY_AUTH_BASE").unwrap_or_else(|_| "https://accounts.spotify.com".into())
}
fn default_api_base() -> String {
    // include v1 path by default
    env::var("SPOTIFY_API_BASE").unwrap_or_else(|_| "https://api.spotify.com/v1".into())
}
fn default_playlist_name() -> String { "My Awesome Playlist".into() }
fn default_logout_delay() -> u64 { 3000 }

fn default_scopes() -> Vec<String> {
    vec!["playlist-modify-public", "playlist-modify-private"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songlist-playlist")
        .join("session.db")
}

fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songlist-playlist")
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        if cfg.client_id.trim().is_empty() {
            anyhow::bail!("client_id must not be empty");
        }
        if cfg.add_tracks_batch_size == Some(0) {
            anyhow::bail!("add_tracks_batch_size must be at least 1");
        }
        Ok(cfg)
    }

    /// Minimal config for tests and embedding: every field at its default.
    pub fn with_client_id(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            auth_base: default_auth_base(),
            api_base: default_api_base(),
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            default_playlist_name: default_playlist_name(),
            profile_failure_logout_delay_ms: default_logout_delay(),
            add_tracks_batch_size: None,
        }
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.auth_base.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/token", self.auth_base.trim_end_matches('/'))
    }

    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}
